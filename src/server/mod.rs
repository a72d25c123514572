pub mod listener;

pub use listener::Server;

use crate::cache::FileCache;
use crate::vhost::HostRegistry;
use std::sync::atomic::AtomicUsize;

/// Shared state every connection needs: the host table, the file cache,
/// and the live-connection counter behind the health probe. One instance
/// per server, behind an `Arc`.
pub struct ServerCtx {
    pub registry: HostRegistry,
    pub cache: FileCache,
    /// Configured listen port, echoed to CGI children as SERVER_PORT.
    pub server_port: u16,
    /// Health-probe threshold in concurrent connections.
    pub max_load: usize,
    /// Currently open connections.
    pub active: AtomicUsize,
}
