use std::path::Path;

/// Content-Type by file extension. Everything unrecognized (including .txt)
/// is served as text/plain.
pub fn content_type(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("jpg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("html") | Some("htm") => "text/html",
        _ => "text/plain",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_extensions() {
        assert_eq!(content_type(Path::new("/srv/pic.jpg")), "image/jpeg");
        assert_eq!(content_type(Path::new("anim.gif")), "image/gif");
        assert_eq!(content_type(Path::new("index.html")), "text/html");
        assert_eq!(content_type(Path::new("page.htm")), "text/html");
    }

    #[test]
    fn unknown_extensions_fall_back_to_text_plain() {
        assert_eq!(content_type(Path::new("notes.txt")), "text/plain");
        assert_eq!(content_type(Path::new("script.cgi")), "text/plain");
        assert_eq!(content_type(Path::new("no_extension")), "text/plain");
    }
}
