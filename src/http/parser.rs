use crate::http::request::{DeviceClass, Method, ParsedRequest};
use crate::vhost::HostRegistry;

/// Everything that can go wrong while parsing a request header block. All
/// variants are answered with 400 Bad Request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    MalformedRequestLine,
    UnsupportedMethod,
    MissingHeaderSeparator,
    BadContentLength,
    BadDate,
}

/// Detects the blank line that terminates the header section.
///
/// Each header line ends with CR LF, so the terminating blank line shows up
/// in the byte stream as the sequence LF CR LF straddling two line endings.
/// The detector is a counter over consumed bytes: LF always increments, CR
/// increments only when exactly one LF has been seen, any other byte resets.
/// Count 3 marks the boundary -- reached by LF CR LF, or by three straight
/// LFs (a degenerate framing some clients produce; accepted equivalently).
///
/// The counter lives in the connection, not in a parsing pass, because TCP
/// segmentation can split the boundary across any number of read events.
#[derive(Debug, Default)]
pub struct BoundaryDetector {
    count: u8,
}

impl BoundaryDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consumes one byte; returns true when this byte completes the
    /// header/body boundary.
    pub fn feed(&mut self, byte: u8) -> bool {
        if byte == b'\n' {
            self.count += 1;
        } else if byte == b'\r' && self.count == 1 {
            self.count += 1;
        } else {
            self.count = 0;
        }
        self.count >= 3
    }
}

/// First-pass scan of the accumulated header text for a Content-Length
/// value, used while deciding whether a body is expected at all. Full
/// validation happens in [`parse_request`].
pub fn content_length_hint(header_text: &str) -> Option<usize> {
    for line in header_text.split("\r\n").skip(1) {
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("content-length") {
                return value.trim().parse().ok();
            }
        }
    }
    None
}

/// Parses the complete header text of one request and resolves its virtual
/// host against `registry`. Runs exactly once per connection, when reading
/// finishes.
pub fn parse_request(
    header_text: &str,
    registry: &HostRegistry,
) -> Result<ParsedRequest, ParseError> {
    let mut lines = header_text.split("\r\n");

    let request_line = lines.next().ok_or(ParseError::MalformedRequestLine)?;
    let mut tokens = request_line.split_whitespace();
    let method_token = tokens.next().ok_or(ParseError::MalformedRequestLine)?;
    let target = tokens.next().ok_or(ParseError::MalformedRequestLine)?;

    let method = Method::from_token(method_token).ok_or(ParseError::UnsupportedMethod)?;

    // Split off a CGI query string; only GET targets carry one.
    let (mut path, query_string) = match (method, target.find('?')) {
        (Method::GET, Some(idx)) => (
            target[..idx].trim(),
            Some(target[idx + 1..].trim().to_string()),
        ),
        _ => (target.trim(), None),
    };
    path = path.strip_prefix('/').unwrap_or(path);

    let mut vhost = None;
    let mut device = DeviceClass::Unknown;
    let mut content_length = None;
    let mut if_modified_since = None;

    for line in lines {
        if line.is_empty() {
            continue;
        }
        let (name, value) = line
            .split_once(':')
            .ok_or(ParseError::MissingHeaderSeparator)?;
        let name = name.trim();
        let value = value.trim();

        if name.eq_ignore_ascii_case("host") {
            // Strip any :port suffix before the registry lookup.
            let host = value.split(':').next().unwrap_or(value).trim();
            vhost = Some(registry.resolve(host).clone());
        } else if name.eq_ignore_ascii_case("user-agent") {
            device = DeviceClass::from_user_agent(value);
        } else if name.eq_ignore_ascii_case("content-length") {
            content_length = Some(value.parse().map_err(|_| ParseError::BadContentLength)?);
        } else if name.eq_ignore_ascii_case("if-modified-since") {
            let date = httpdate::parse_http_date(value).map_err(|_| ParseError::BadDate)?;
            if_modified_since = Some(date);
        }
    }

    let vhost = vhost.unwrap_or_else(|| registry.default_host().clone());
    let health_probe = path == "load";

    Ok(ParsedRequest {
        method,
        path: path.to_string(),
        query_string,
        vhost,
        device,
        content_length,
        if_modified_since,
        health_probe,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundary_lf_cr_lf() {
        let mut det = BoundaryDetector::new();
        let bytes = b"GET / HTTP/1.1\r\nHost: x\r\n\r\n";
        let hit = bytes.iter().position(|&b| det.feed(b));
        assert_eq!(hit, Some(bytes.len() - 1));
    }

    #[test]
    fn boundary_survives_reset() {
        let mut det = BoundaryDetector::new();
        for &b in b"a\r\nb" {
            assert!(!det.feed(b));
        }
        for &b in b"\r\n\r" {
            assert!(!det.feed(b));
        }
        assert!(det.feed(b'\n'));
    }

    #[test]
    fn content_length_hint_is_case_insensitive() {
        let text = "POST /x HTTP/1.1\r\ncontent-LENGTH: 12\r\n\r\n";
        assert_eq!(content_length_hint(text), Some(12));
    }
}
