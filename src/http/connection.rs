use crate::cgi;
use crate::http::parser::{self, BoundaryDetector};
use crate::http::request::{DeviceClass, Method, ParsedRequest};
use crate::http::response::{self, StatusCode};
use crate::server::ServerCtx;
use anyhow::bail;
use bytes::Bytes;
use std::io;
use std::net::SocketAddr;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::io::Interest;
use tokio::net::TcpStream;
use tracing::{debug, error, warn};

/// Inbound scratch buffer size per read event.
pub const IN_BUFFER_SIZE: usize = 4096;

/// Outbound buffer size. The status line and headers are staged into it
/// without bound checking, so it must comfortably exceed any header block
/// this server produces; the body is staged through it in bounded slices.
pub const OUT_BUFFER_SIZE: usize = 4096;

/// A connection that produces no activity for this long is forcibly closed.
pub const MAX_LIFETIME: Duration = Duration::from_millis(3000);

/// Upper bound on any single readiness wait, so lifetime checks run at
/// least this often. Reclamation latency is bounded by
/// `MAX_LIFETIME + POLL_INTERVAL`.
pub const POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// Connection lifecycle. Response generation is not a resting state: it is
/// the synchronous transition executed inside the read handler the moment
/// reading completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    ReadingHeader,
    ReadingData,
    /// Headers staged; body bytes still flow through the outbound buffer.
    ResponseReady,
    /// Everything staged; drain the buffer once more, then close.
    LastResponseReady,
    ResponseSent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadPhase {
    Header,
    Body,
    Done,
}

/// The reading half of a connection: accumulates header and body bytes
/// across arbitrarily fragmented read events and decides when the request
/// is complete.
///
/// Socket-free so the fragmentation-invariance of the whole pipeline can be
/// tested byte-at-a-time.
#[derive(Debug)]
pub struct RequestReader {
    phase: ReadPhase,
    boundary: BoundaryDetector,
    header: Vec<u8>,
    body: Vec<u8>,
    content_length: Option<usize>,
}

impl RequestReader {
    pub fn new() -> Self {
        Self {
            phase: ReadPhase::Header,
            boundary: BoundaryDetector::new(),
            header: Vec::with_capacity(IN_BUFFER_SIZE),
            body: Vec::new(),
            content_length: None,
        }
    }

    /// Consumes one read event's worth of bytes. May cross the header/body
    /// boundary mid-buffer and may complete the request.
    pub fn consume(&mut self, buf: &[u8]) {
        let mut idx = 0;
        if self.phase == ReadPhase::Header {
            while idx < buf.len() {
                let byte = buf[idx];
                idx += 1;
                self.header.push(byte);
                if self.boundary.feed(byte) {
                    self.phase = ReadPhase::Body;
                    break;
                }
            }
        }
        if self.phase != ReadPhase::Header && idx < buf.len() {
            self.body.extend_from_slice(&buf[idx..]);
        }
        self.evaluate_progress();
    }

    /// End of stream forces the request complete no matter how far reading
    /// got; parsing decides whether what arrived is answerable.
    pub fn signal_eof(&mut self) {
        self.phase = ReadPhase::Done;
    }

    pub fn is_complete(&self) -> bool {
        self.phase == ReadPhase::Done
    }

    pub fn header_text(&self) -> String {
        String::from_utf8_lossy(&self.header).into_owned()
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    fn evaluate_progress(&mut self) {
        if self.phase != ReadPhase::Body {
            return;
        }
        if self.content_length.is_none() {
            match parser::content_length_hint(&self.header_text()) {
                // No Content-Length header: nothing more to wait for.
                None => {
                    self.phase = ReadPhase::Done;
                    return;
                }
                Some(n) => self.content_length = Some(n),
            }
        }
        // A body at or past the declared length completes the request; the
        // overshoot case guards against clients that keep sending.
        if let Some(n) = self.content_length {
            if self.body.len() >= n {
                self.phase = ReadPhase::Done;
            }
        }
    }
}

impl Default for RequestReader {
    fn default() -> Self {
        Self::new()
    }
}

/// What file resolution decided for the request.
enum Resolution {
    Static {
        path: PathBuf,
        modified: SystemTime,
    },
    Cgi {
        path: PathBuf,
    },
    Status(StatusCode),
}

/// One accepted socket's state machine, driven by readiness events until
/// the response is fully on the wire.
pub struct Connection {
    stream: TcpStream,
    peer: SocketAddr,
    ctx: Arc<ServerCtx>,
    state: ConnState,
    reader: RequestReader,
    /// Staged response bytes waiting for the socket, plus how many of them
    /// the socket has already accepted. A partially drained buffer is never
    /// cleared until every staged byte is gone.
    out: Vec<u8>,
    flushed: usize,
    /// Response body and the cursor marking how much of it has been copied
    /// into the outbound buffer. The cursor only ever advances.
    response_body: Option<Bytes>,
    body_cursor: usize,
    last_activity: Instant,
}

impl Connection {
    pub fn new(stream: TcpStream, peer: SocketAddr, ctx: Arc<ServerCtx>) -> Self {
        ctx.active.fetch_add(1, Ordering::SeqCst);
        Self {
            stream,
            peer,
            ctx,
            state: ConnState::ReadingHeader,
            reader: RequestReader::new(),
            out: Vec::with_capacity(OUT_BUFFER_SIZE),
            flushed: 0,
            response_body: None,
            body_cursor: 0,
            last_activity: Instant::now(),
        }
    }

    /// Drives the state machine to completion. All per-request errors are
    /// resolved here; nothing escapes to the accept loop.
    pub async fn run(mut self) {
        if let Err(e) = self.drive().await {
            debug!(peer = %self.peer, "connection closed: {e:#}");
        }
        self.ctx.active.fetch_sub(1, Ordering::SeqCst);
    }

    async fn drive(&mut self) -> anyhow::Result<()> {
        loop {
            let interest = match self.state {
                ConnState::ReadingHeader | ConnState::ReadingData => Interest::READABLE,
                ConnState::ResponseReady | ConnState::LastResponseReady => Interest::WRITABLE,
                ConnState::ResponseSent => return Ok(()),
            };

            let idle = self.last_activity.elapsed();
            if idle >= MAX_LIFETIME {
                warn!(peer = %self.peer, "connection exceeded max lifetime, closing");
                return Ok(());
            }
            let wait = POLL_INTERVAL.min(MAX_LIFETIME - idle);

            let readiness = tokio::time::timeout(wait, self.stream.ready(interest)).await;
            match readiness {
                // Bounded wait elapsed; loop around for the lifetime check.
                Err(_) => continue,
                Ok(ready) => {
                    let ready = ready?;
                    if ready.is_readable()
                        && matches!(
                            self.state,
                            ConnState::ReadingHeader | ConnState::ReadingData
                        )
                    {
                        self.handle_read()?;
                    }
                    if ready.is_writable()
                        && matches!(
                            self.state,
                            ConnState::ResponseReady | ConnState::LastResponseReady
                        )
                    {
                        self.handle_write()?;
                    }
                }
            }
        }
    }

    /// One read-readiness event: pull whatever the socket has, feed it to
    /// the reader, and generate the response the moment the request is
    /// complete.
    fn handle_read(&mut self) -> anyhow::Result<()> {
        let mut scratch = [0u8; IN_BUFFER_SIZE];
        match self.stream.try_read(&mut scratch) {
            Ok(0) => self.reader.signal_eof(),
            Ok(n) => {
                self.last_activity = Instant::now();
                self.reader.consume(&scratch[..n]);
            }
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
            Err(e) => return Err(e.into()),
        }

        if self.reader.is_complete() {
            self.generate_response();
        } else if self.state == ConnState::ReadingHeader
            && matches!(self.reader.phase, ReadPhase::Body)
        {
            self.state = ConnState::ReadingData;
        }
        Ok(())
    }

    /// One write-readiness event: drain staged bytes, then stage the next
    /// slice of the body. A partial socket write leaves everything in place
    /// for the next event.
    fn handle_write(&mut self) -> anyhow::Result<()> {
        while self.flushed < self.out.len() {
            match self.stream.try_write(&self.out[self.flushed..]) {
                Ok(0) => bail!("socket closed while writing response"),
                Ok(n) => {
                    self.flushed += n;
                    self.last_activity = Instant::now();
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(e) => return Err(e.into()),
            }
        }

        self.out.clear();
        self.flushed = 0;

        match self.state {
            ConnState::LastResponseReady => {
                self.state = ConnState::ResponseSent;
            }
            ConnState::ResponseReady => {
                self.stage_body_slice();
            }
            _ => {}
        }
        Ok(())
    }

    /// Copies `min(remaining body, remaining buffer capacity)` bytes into
    /// the outbound buffer; once the last body byte is staged the next
    /// drain is the final one.
    fn stage_body_slice(&mut self) {
        let body = match &self.response_body {
            Some(b) => b,
            None => {
                self.state = ConnState::LastResponseReady;
                return;
            }
        };
        let remaining = body.len() - self.body_cursor;
        let capacity = OUT_BUFFER_SIZE - self.out.len();
        let take = remaining.min(capacity);
        self.out
            .extend_from_slice(&body[self.body_cursor..self.body_cursor + take]);
        self.body_cursor += take;
        if self.body_cursor == body.len() {
            self.state = ConnState::LastResponseReady;
        }
    }

    /// The GENERATING_RESPONSE transition. Every per-request failure is
    /// converted to a staged response here; an unexpected error becomes a
    /// 500 and the connection is the only casualty.
    fn generate_response(&mut self) {
        match self.try_generate() {
            Ok(()) => {}
            Err(e) => {
                error!(peer = %self.peer, "error while generating response: {e:#}");
                self.out.clear();
                self.flushed = 0;
                self.response_body = None;
                self.stage(&response::bare_response(StatusCode::InternalServerError));
                self.state = ConnState::LastResponseReady;
            }
        }
    }

    fn try_generate(&mut self) -> anyhow::Result<()> {
        let req = match parser::parse_request(&self.reader.header_text(), &self.ctx.registry) {
            Ok(req) => req,
            Err(e) => {
                debug!(peer = %self.peer, "bad request: {e:?}");
                self.stage(&response::bare_response(StatusCode::BadRequest));
                self.state = ConnState::LastResponseReady;
                return Ok(());
            }
        };

        if req.health_probe {
            self.stage(&response::bare_response(self.probe_status()));
            self.state = ConnState::LastResponseReady;
            return Ok(());
        }

        match self.resolve_file(&req) {
            Resolution::Status(status) => {
                self.stage(&response::bare_response(status));
                self.state = ConnState::LastResponseReady;
            }
            Resolution::Cgi { path } => {
                let body = cgi::run(&cgi::CgiRequest {
                    script: &path,
                    method: req.method,
                    query_string: req.query_string.as_deref(),
                    content_length: req.content_length,
                    body: self.reader.body(),
                    server_name: &req.vhost.server_name,
                    server_port: self.ctx.server_port,
                    remote: self.peer,
                })?;
                self.stage(response::cgi_head().as_bytes());
                self.response_body = Some(Bytes::from(body));
                self.state = ConnState::ResponseReady;
            }
            Resolution::Static { path, modified } => {
                let body = match self.ctx.cache.get(&path) {
                    Some(bytes) => bytes,
                    None => {
                        let bytes = Bytes::from(std::fs::read(&path)?);
                        self.ctx.cache.put(&path, bytes.clone());
                        bytes
                    }
                };
                let head = response::static_file_head(&path, body.len() as u64, modified);
                self.stage(head.as_bytes());
                self.stage(b"\r\n");
                self.response_body = Some(body);
                self.state = ConnState::ResponseReady;
            }
        }
        Ok(())
    }

    /// 200 below the configured load threshold, 503 at or above it. Load is
    /// measured as concurrently open connections, this one included.
    fn probe_status(&self) -> StatusCode {
        let load = self.ctx.active.load(Ordering::SeqCst);
        if load < self.ctx.max_load {
            StatusCode::Ok
        } else {
            StatusCode::ServiceUnavailable
        }
    }

    /// Maps the request onto the virtual host's filesystem: directory index
    /// selection, the path-traversal guard, conditional GET, and the
    /// static-versus-CGI split.
    fn resolve_file(&self, req: &ParsedRequest) -> Resolution {
        let root = match std::fs::canonicalize(&req.vhost.document_root) {
            Ok(root) => root,
            Err(_) => return Resolution::Status(StatusCode::NotFound),
        };

        // Lexical containment check first, so traversal attempts are 403
        // whether or not the target exists.
        let candidate = normalize(&root.join(&req.path));
        if !candidate.starts_with(&root) {
            debug!(path = %candidate.display(), "target escapes document root");
            return Resolution::Status(StatusCode::Forbidden);
        }

        let candidate = if candidate.is_dir() {
            match req.device {
                DeviceClass::Mobile => {
                    let mobile = candidate.join("index_m.html");
                    if mobile.is_file() {
                        mobile
                    } else {
                        candidate.join("index.html")
                    }
                }
                _ => candidate.join("index.html"),
            }
        } else {
            candidate
        };

        // Re-check after resolving symlinks.
        let canonical = match std::fs::canonicalize(&candidate) {
            Ok(p) => p,
            Err(_) => return Resolution::Status(StatusCode::NotFound),
        };
        if !canonical.starts_with(&root) {
            return Resolution::Status(StatusCode::Forbidden);
        }

        let meta = match std::fs::metadata(&canonical) {
            Ok(m) if m.is_file() => m,
            _ => return Resolution::Status(StatusCode::NotFound),
        };

        if let (Some(ims), Ok(modified)) = (req.if_modified_since, meta.modified()) {
            // HTTP dates carry whole seconds; compare at that resolution.
            if unix_secs(ims) >= unix_secs(modified) {
                return Resolution::Status(StatusCode::NotModified);
            }
        }

        if is_executable(&meta) {
            return Resolution::Cgi { path: canonical };
        }

        // Non-executable targets only answer GET.
        if req.method == Method::POST {
            return Resolution::Status(StatusCode::Forbidden);
        }

        let modified = meta.modified().unwrap_or(UNIX_EPOCH);
        Resolution::Static {
            path: canonical,
            modified,
        }
    }

    /// Stages bytes into the outbound buffer without bound checking; the
    /// buffer is sized to exceed any realistic header block, and an
    /// overflow drops the data with a log line rather than killing the
    /// connection.
    fn stage(&mut self, bytes: &[u8]) {
        if self.out.len() + bytes.len() > OUT_BUFFER_SIZE {
            warn!(
                peer = %self.peer,
                staged = self.out.len(),
                dropped = bytes.len(),
                "outbound buffer overflow, data dropped"
            );
            return;
        }
        self.out.extend_from_slice(bytes);
    }
}

fn unix_secs(t: SystemTime) -> u64 {
    t.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(unix)]
fn is_executable(meta: &std::fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_meta: &std::fs::Metadata) -> bool {
    false
}

/// Resolves `.`/`..` segments lexically, without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for comp in path.components() {
        match comp {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reader_completes_get_without_body() {
        let mut reader = RequestReader::new();
        reader.consume(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n");
        assert!(reader.is_complete());
        assert!(reader.body().is_empty());
    }

    #[test]
    fn reader_waits_for_declared_body() {
        let mut reader = RequestReader::new();
        reader.consume(b"POST /u HTTP/1.1\r\nContent-Length: 5\r\n\r\nab");
        assert!(!reader.is_complete());
        reader.consume(b"cde");
        assert!(reader.is_complete());
        assert_eq!(reader.body(), b"abcde");
    }

    #[test]
    fn reader_advances_on_body_overshoot() {
        let mut reader = RequestReader::new();
        reader.consume(b"POST /u HTTP/1.1\r\nContent-Length: 2\r\n\r\nabcdef");
        assert!(reader.is_complete());
    }

    #[test]
    fn eof_forces_completion() {
        let mut reader = RequestReader::new();
        reader.consume(b"GET / HT");
        assert!(!reader.is_complete());
        reader.signal_eof();
        assert!(reader.is_complete());
    }

    #[test]
    fn normalize_strips_parent_segments() {
        assert_eq!(
            normalize(Path::new("/srv/www/../../etc/passwd")),
            PathBuf::from("/etc/passwd")
        );
        assert_eq!(
            normalize(Path::new("/srv/www/a/./b")),
            PathBuf::from("/srv/www/a/b")
        );
    }
}
