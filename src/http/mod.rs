//! HTTP/1.1 protocol implementation.
//!
//! Each connection serves exactly one request and then closes; there is no
//! keep-alive. The interesting part is that nothing here ever blocks on
//! client I/O: the request is parsed incrementally across arbitrarily
//! fragmented reads and the response is drained across arbitrarily
//! fragmented writes.
//!
//! # Connection state machine
//!
//! ```text
//!   READING_HEADER ──(blank line seen)──► READING_DATA
//!        │                                     │
//!        └──────────(EOF)──────────┬───────────┘
//!                                  │ request complete
//!                                  ▼
//!                        generate response (sync)
//!                          │               │
//!             body to send │               │ one-shot (errors, 304, probe)
//!                          ▼               ▼
//!                   RESPONSE_READY ──► LAST_RESPONSE_READY
//!                  (body slices through    (final drain,
//!                   the outbound buffer)    then close)
//!                                  │
//!                                  ▼
//!                            RESPONSE_SENT
//! ```
//!
//! The header/body boundary can be split across any number of TCP
//! segments, so its detector ([`parser::BoundaryDetector`]) is a counter
//! that lives in the connection, not a scan over a complete buffer.

pub mod connection;
pub mod mime;
pub mod parser;
pub mod request;
pub mod response;
