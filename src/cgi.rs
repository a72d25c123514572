//! Synchronous CGI bridge.
//!
//! Executable targets are run as child processes with the CGI environment
//! and their standard output re-framed as an HTTP chunked body. The bridge
//! blocks the calling thread until the child's output is fully drained --
//! on the single reactor thread that stalls every other connection for the
//! duration of the script. See the design notes before "fixing" this with
//! a worker thread.

use crate::http::request::Method;
use crate::http::response::SERVER_SOFTWARE;
use anyhow::Context;
use std::io::{BufRead, BufReader, Write};
use std::net::SocketAddr;
use std::path::Path;
use std::process::{Command, Stdio};
use tracing::debug;

pub struct CgiRequest<'a> {
    pub script: &'a Path,
    pub method: Method,
    pub query_string: Option<&'a str>,
    pub content_length: Option<usize>,
    /// Accumulated request body; for POST, exactly `content_length` of
    /// these bytes reach the child's stdin.
    pub body: &'a [u8],
    pub server_name: &'a str,
    pub server_port: u16,
    pub remote: SocketAddr,
}

/// Runs the script and returns the complete chunked-encoded response body,
/// terminal `0\r\n\r\n` chunk included.
///
/// Anything the child prints is body; its output is never promoted to
/// response headers.
pub fn run(req: &CgiRequest<'_>) -> anyhow::Result<Vec<u8>> {
    let mut cmd = Command::new(req.script);
    cmd.env("QUERY_STRING", req.query_string.unwrap_or(""))
        .env("REQUEST_METHOD", req.method.as_str())
        .env(
            "CONTENT_LENGTH",
            req.content_length.map(|n| n.to_string()).unwrap_or_default(),
        )
        .env("SERVER_NAME", req.server_name)
        .env("SERVER_PORT", req.server_port.to_string())
        .env("SERVER_PROTOCOL", "HTTP/1.1")
        .env("SERVER_SOFTWARE", SERVER_SOFTWARE)
        .env("REMOTE_ADDR", req.remote.ip().to_string())
        .env("REMOTE_HOST", req.remote.ip().to_string())
        .env("REMOTE_IDENT", "")
        .env("REMOTE_USER", "")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null());

    let mut child = cmd
        .spawn()
        .with_context(|| format!("spawning CGI script {}", req.script.display()))?;

    if req.method == Method::POST {
        if let Some(len) = req.content_length {
            let take = len.min(req.body.len());
            let mut stdin = child.stdin.take().context("CGI child has no stdin")?;
            stdin
                .write_all(&req.body[..take])
                .context("writing request body to CGI stdin")?;
        }
    }
    // Dropping the handle closes the child's stdin either way.
    drop(child.stdin.take());

    let stdout = child.stdout.take().context("CGI child has no stdout")?;
    let mut chunked = Vec::new();
    for line in BufReader::new(stdout).lines() {
        let line = line.context("reading CGI output")?;
        // The line terminator was consumed by the reader; one \n is put
        // back, hence len + 1.
        chunked.extend_from_slice(format!("{:x}\r\n", line.len() + 1).as_bytes());
        chunked.extend_from_slice(line.as_bytes());
        chunked.extend_from_slice(b"\n\r\n");
    }
    chunked.extend_from_slice(b"0\r\n\r\n");

    let status = child.wait().context("waiting for CGI child")?;
    debug!(script = %req.script.display(), %status, "CGI child finished");

    Ok(chunked)
}
