//! HTTP response generation.

use bytes::{BufMut, Bytes, BytesMut};
use http::StatusCode;

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

/// Outbound response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: StatusCode,
    pub content_type: Option<&'static str>,
    pub body: Bytes,
}

impl Response {
    /// Plain UTF-8 text response.
    pub fn text(status: StatusCode, body: impl Into<String>) -> Self {
        Response {
            status,
            content_type: Some(TEXT_PLAIN),
            body: Bytes::from(body.into()),
        }
    }

    /// Response with no body.
    pub fn empty(status: StatusCode) -> Self {
        Response {
            status,
            content_type: None,
            body: Bytes::new(),
        }
    }

    /// Serialize status line, headers and body into `output`.
    ///
    /// Content-Length is always the exact byte length of the body.
    pub fn encode(&self, keep_alive: bool, output: &mut BytesMut) {
        let date = chrono::Utc::now().format("%a, %d %b %Y %H:%M:%S GMT");
        let head = format!(
            "HTTP/1.1 {} {}\r\nDate: {}\r\nContent-Length: {}\r\nConnection: {}\r\n",
            self.status.as_u16(),
            self.status.canonical_reason().unwrap_or(""),
            date,
            self.body.len(),
            if keep_alive { "keep-alive" } else { "close" },
        );

        output.reserve(head.len() + self.body.len() + 64);
        output.put_slice(head.as_bytes());
        if let Some(content_type) = self.content_type {
            output.put_slice(b"Content-Type: ");
            output.put_slice(content_type.as_bytes());
            output.put_slice(b"\r\n");
        }
        output.put_slice(b"\r\n");
        output.put_slice(&self.body);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(response: &Response, keep_alive: bool) -> String {
        let mut out = BytesMut::new();
        response.encode(keep_alive, &mut out);
        String::from_utf8(out.to_vec()).unwrap()
    }

    #[test]
    fn test_text_response() {
        let text = encoded(&Response::text(StatusCode::OK, "a = 1\n"), true);
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("\r\nContent-Length: 6\r\n"));
        assert!(text.contains("\r\nContent-Type: text/plain; charset=utf-8\r\n"));
        assert!(text.contains("\r\nConnection: keep-alive\r\n"));
        assert!(text.contains("\r\nDate: "));
        assert!(text.ends_with("\r\n\r\na = 1\n"));
    }

    #[test]
    fn test_content_length_counts_bytes() {
        let text = encoded(&Response::text(StatusCode::OK, "k = é\n"), false);
        assert!(text.contains("\r\nContent-Length: 7\r\n"));
        assert!(text.contains("\r\nConnection: close\r\n"));
    }

    #[test]
    fn test_empty_response() {
        let text = encoded(&Response::empty(StatusCode::NOT_FOUND), false);
        assert!(text.starts_with("HTTP/1.1 404 Not Found\r\n"));
        assert!(text.contains("\r\nContent-Length: 0\r\n"));
        assert!(!text.contains("Content-Type"));
        assert!(text.ends_with("\r\n\r\n"));
    }
}
