use crate::vhost::VirtualHost;
use std::sync::Arc;
use std::time::SystemTime;

/// HTTP request methods. This server accepts only GET and POST; anything
/// else is answered with 400 Bad Request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    GET,
    POST,
}

impl Method {
    /// Parses a request-line method token, case-insensitively.
    pub fn from_token(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Some(Method::GET),
            "POST" => Some(Method::POST),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::GET => "GET",
            Method::POST => "POST",
        }
    }
}

/// Client device class inferred from the User-Agent header, used to pick
/// between `index.html` and `index_m.html` for directory requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceClass {
    /// No User-Agent header seen. Treated like Desktop for index selection.
    #[default]
    Unknown,
    Mobile,
    Desktop,
}

impl DeviceClass {
    /// Substring match on "iphone"/"phone", case-insensitive. Any other
    /// User-Agent value classifies as desktop.
    pub fn from_user_agent(ua: &str) -> Self {
        let ua = ua.to_ascii_lowercase();
        if ua.contains("iphone") || ua.contains("phone") {
            DeviceClass::Mobile
        } else {
            DeviceClass::Desktop
        }
    }
}

/// The fields extracted from a complete request header block, resolved
/// against the virtual-host registry.
#[derive(Debug, Clone)]
pub struct ParsedRequest {
    pub method: Method,
    /// Request path with the leading `/` and any `?query` suffix removed.
    pub path: String,
    /// Raw query string for CGI, present only on GET requests whose target
    /// carried a `?`.
    pub query_string: Option<String>,
    pub vhost: Arc<VirtualHost>,
    pub device: DeviceClass,
    pub content_length: Option<usize>,
    pub if_modified_since: Option<SystemTime>,
    /// Set when the target path is exactly `load`: answer the health probe
    /// instead of resolving a file.
    pub health_probe: bool,
}
