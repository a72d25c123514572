//! vhostd - virtual-hosting HTTP/1.1 origin server.
//!
//! A single-threaded, readiness-driven connection engine with virtual
//! hosting, conditional GET, a whole-file static cache, and CGI execution.

pub mod admin;
pub mod cache;
pub mod cgi;
pub mod config;
pub mod http;
pub mod server;
pub mod vhost;
