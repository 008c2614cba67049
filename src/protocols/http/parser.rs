//! HTTP/1.x request head parser.

use bytes::Bytes;
use http::{Method, StatusCode, Version};

/// Default cap on the size of a request head (request line + headers).
pub const MAX_HEADER_BYTES: usize = 16 * 1024;

/// Default cap on the size of a request body.
pub const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Request framing errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    /// Request line or a header line could not be parsed
    Malformed(String),
    /// Protocol version other than HTTP/1.0 or HTTP/1.1
    UnsupportedVersion(String),
    /// Request head exceeds the configured limit
    HeaderTooLarge { limit: usize },
    /// Declared body exceeds the configured limit
    BodyTooLarge { length: usize, limit: usize },
    /// Content-Length is not a number or appears with conflicting values
    InvalidContentLength(String),
    /// Transfer-Encoding bodies are not accepted
    UnsupportedTransferEncoding(String),
}

impl RequestError {
    /// Status code sent back for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            RequestError::Malformed(_) | RequestError::InvalidContentLength(_) => {
                StatusCode::BAD_REQUEST
            }
            RequestError::UnsupportedVersion(_) => StatusCode::HTTP_VERSION_NOT_SUPPORTED,
            RequestError::HeaderTooLarge { .. } => StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE,
            RequestError::BodyTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            RequestError::UnsupportedTransferEncoding(_) => StatusCode::NOT_IMPLEMENTED,
        }
    }
}

impl std::fmt::Display for RequestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestError::Malformed(msg) => write!(f, "Malformed request: {}", msg),
            RequestError::UnsupportedVersion(v) => write!(f, "Unsupported HTTP version: {}", v),
            RequestError::HeaderTooLarge { limit } => {
                write!(f, "Request head exceeds {} bytes", limit)
            }
            RequestError::BodyTooLarge { length, limit } => {
                write!(f, "Request body of {} bytes exceeds {} bytes", length, limit)
            }
            RequestError::InvalidContentLength(v) => write!(f, "Invalid Content-Length: {}", v),
            RequestError::UnsupportedTransferEncoding(v) => {
                write!(f, "Unsupported Transfer-Encoding: {}", v)
            }
        }
    }
}

impl std::error::Error for RequestError {}

/// Parsed request line and headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHead {
    pub method: Method,
    /// Request target exactly as sent, query undecoded
    pub target: String,
    pub version: Version,
    pub headers: Vec<(String, String)>,
    /// Bytes consumed by the head including the blank line
    pub header_len: usize,
    pub content_length: usize,
}

/// Parse result.
#[derive(Debug)]
pub enum ParseResult {
    /// Head is complete.
    Complete(RequestHead),
    /// Need more data for the head.
    Incomplete,
    /// Head cannot be served.
    Error(RequestError),
}

/// A complete request with its body.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub target: String,
    pub version: Version,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl Request {
    pub fn from_head(head: RequestHead, body: Bytes) -> Self {
        Request {
            method: head.method,
            target: head.target,
            version: head.version,
            headers: head.headers,
            body,
        }
    }

    /// Target in origin form: absolute-form targets (`http://host/p?q`)
    /// lose their scheme and authority.
    fn origin_form(&self) -> &str {
        let target = self.target.as_str();
        if let Some((scheme, rest)) = target.split_once("://") {
            if scheme.eq_ignore_ascii_case("http") || scheme.eq_ignore_ascii_case("https") {
                let start = rest.find(|c: char| c == '/' || c == '?').unwrap_or(rest.len());
                return &rest[start..];
            }
        }
        target
    }

    /// Target path, without the query.
    pub fn path(&self) -> &str {
        let target = self.origin_form();
        target.split_once('?').map_or(target, |(path, _)| path)
    }

    /// Undecoded text after the first `?`, or `None` when there is no `?`.
    pub fn raw_query(&self) -> Option<&str> {
        self.origin_form().split_once('?').map(|(_, query)| query)
    }

    /// First header with this name, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        header_value(&self.headers, name)
    }

    /// Whether the connection stays open after this request.
    pub fn keep_alive(&self) -> bool {
        let connection = self.header("connection").map(str::to_ascii_lowercase);
        match self.version {
            Version::HTTP_10 => connection
                .as_deref()
                .is_some_and(|c| c.split(',').any(|t| t.trim() == "keep-alive")),
            _ => !connection
                .as_deref()
                .is_some_and(|c| c.split(',').any(|t| t.trim() == "close")),
        }
    }
}

/// Parse a request head from the start of `input`.
pub fn parse_head(input: &[u8], max_header_bytes: usize) -> ParseResult {
    let header_len = match find_head_end(input) {
        Some(end) => end,
        None if input.len() > max_header_bytes => {
            return ParseResult::Error(RequestError::HeaderTooLarge {
                limit: max_header_bytes,
            })
        }
        None => return ParseResult::Incomplete,
    };

    if header_len > max_header_bytes {
        return ParseResult::Error(RequestError::HeaderTooLarge {
            limit: max_header_bytes,
        });
    }

    match parse_complete_head(&input[..header_len], header_len) {
        Ok(head) => ParseResult::Complete(head),
        Err(e) => ParseResult::Error(e),
    }
}

fn parse_complete_head(raw: &[u8], header_len: usize) -> Result<RequestHead, RequestError> {
    let text = std::str::from_utf8(raw)
        .map_err(|_| RequestError::Malformed("request head is not valid UTF-8".to_string()))?;

    let mut lines = text.split("\r\n");
    let request_line = lines.next().unwrap_or_default();
    let parts: Vec<&str> = request_line.split(' ').collect();
    if parts.len() != 3 || parts.iter().any(|p| p.is_empty()) {
        return Err(RequestError::Malformed(format!(
            "invalid request line: {}",
            request_line
        )));
    }

    let method = Method::from_bytes(parts[0].as_bytes())
        .map_err(|_| RequestError::Malformed(format!("invalid method: {}", parts[0])))?;
    let target = parts[1].to_string();
    let version = match parts[2] {
        "HTTP/1.1" => Version::HTTP_11,
        "HTTP/1.0" => Version::HTTP_10,
        other => return Err(RequestError::UnsupportedVersion(other.to_string())),
    };

    let mut headers = Vec::new();
    for line in lines {
        if line.is_empty() {
            continue;
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| RequestError::Malformed(format!("invalid header line: {}", line)))?;
        if name.is_empty() || name.contains(char::is_whitespace) {
            return Err(RequestError::Malformed(format!("invalid header name: {}", name)));
        }
        headers.push((name.to_string(), value.trim().to_string()));
    }

    if let Some(encoding) = header_value(&headers, "transfer-encoding") {
        return Err(RequestError::UnsupportedTransferEncoding(encoding.to_string()));
    }

    let content_length = content_length(&headers)?;

    Ok(RequestHead {
        method,
        target,
        version,
        headers,
        header_len,
        content_length,
    })
}

/// Declared body length; repeated headers must agree.
fn content_length(headers: &[(String, String)]) -> Result<usize, RequestError> {
    let mut length: Option<usize> = None;
    for (_, value) in headers
        .iter()
        .filter(|(name, _)| name.eq_ignore_ascii_case("content-length"))
    {
        let parsed: usize = value
            .parse()
            .map_err(|_| RequestError::InvalidContentLength(value.clone()))?;
        match length {
            Some(existing) if existing != parsed => {
                return Err(RequestError::InvalidContentLength(value.clone()))
            }
            _ => length = Some(parsed),
        }
    }
    Ok(length.unwrap_or(0))
}

fn header_value<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Find the end of the head (after `\r\n\r\n`).
fn find_head_end(buffer: &[u8]) -> Option<usize> {
    buffer
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map(|pos| pos + 4)
}
