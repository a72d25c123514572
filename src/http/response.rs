use crate::http::mime;
use std::path::Path;
use std::time::SystemTime;

/// Server token sent in the `Server` header and as SERVER_SOFTWARE to CGI
/// children.
pub const SERVER_SOFTWARE: &str = "vhostd/1.0";

const HTTP_VERSION: &str = "HTTP/1.1";

/// The status codes this server can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    /// 200 OK
    Ok,
    /// 304 Not Modified
    NotModified,
    /// 400 Bad Request
    BadRequest,
    /// 403 Forbidden
    Forbidden,
    /// 404 Not Found
    NotFound,
    /// 500 Internal Server Error
    InternalServerError,
    /// 503 Service Unavailable
    ServiceUnavailable,
}

impl StatusCode {
    pub fn as_u16(&self) -> u16 {
        match self {
            StatusCode::Ok => 200,
            StatusCode::NotModified => 304,
            StatusCode::BadRequest => 400,
            StatusCode::Forbidden => 403,
            StatusCode::NotFound => 404,
            StatusCode::InternalServerError => 500,
            StatusCode::ServiceUnavailable => 503,
        }
    }

    pub fn reason_phrase(&self) -> &'static str {
        match self {
            StatusCode::Ok => "OK",
            StatusCode::NotModified => "Not Modified",
            StatusCode::BadRequest => "Bad Request",
            StatusCode::Forbidden => "Forbidden",
            StatusCode::NotFound => "Not Found",
            StatusCode::InternalServerError => "Internal Server Error",
            StatusCode::ServiceUnavailable => "Service Unavailable",
        }
    }
}

/// `HTTP/1.1 <code> <reason>\r\n` -- the first line of every response.
pub fn status_line(status: StatusCode) -> String {
    format!(
        "{} {} {}\r\n",
        HTTP_VERSION,
        status.as_u16(),
        status.reason_phrase()
    )
}

/// A bare status-line response terminated by the blank line. Used for every
/// error path, for 304, and for the health probe -- none of them carry a
/// body.
pub fn bare_response(status: StatusCode) -> Vec<u8> {
    let mut buf = status_line(status).into_bytes();
    buf.extend_from_slice(b"\r\n");
    buf
}

/// Status line and headers for a static file, up to but not including the
/// blank line. `len` and `modified` come from the file's metadata.
pub fn static_file_head(path: &Path, len: u64, modified: SystemTime) -> String {
    let mut head = status_line(StatusCode::Ok);
    head.push_str(&format!("Date: {}\r\n", httpdate::fmt_http_date(SystemTime::now())));
    head.push_str(&format!("Server: {}\r\n", SERVER_SOFTWARE));
    head.push_str(&format!("Last-Modified: {}\r\n", httpdate::fmt_http_date(modified)));
    head.push_str(&format!("Content-Type: {}\r\n", mime::content_type(path)));
    head.push_str(&format!("Content-Length: {}\r\n", len));
    head
}

/// Status line and headers ahead of a chunked CGI body, including the blank
/// line. The child's own output is never promoted to headers.
pub fn cgi_head() -> String {
    let mut head = status_line(StatusCode::Ok);
    head.push_str(&format!("Date: {}\r\n", httpdate::fmt_http_date(SystemTime::now())));
    head.push_str(&format!("Server: {}\r\n", SERVER_SOFTWARE));
    head.push_str("Content-Type: text/plain\r\n");
    head.push_str("Transfer-Encoding: chunked\r\n");
    head.push_str("\r\n");
    head
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_lines() {
        assert_eq!(status_line(StatusCode::Ok), "HTTP/1.1 200 OK\r\n");
        assert_eq!(
            status_line(StatusCode::NotModified),
            "HTTP/1.1 304 Not Modified\r\n"
        );
        assert_eq!(
            status_line(StatusCode::ServiceUnavailable),
            "HTTP/1.1 503 Service Unavailable\r\n"
        );
    }

    #[test]
    fn bare_response_is_terminated() {
        let buf = bare_response(StatusCode::NotFound);
        assert!(buf.ends_with(b"\r\n\r\n"));
        assert!(buf.starts_with(b"HTTP/1.1 404 Not Found\r\n"));
    }
}
