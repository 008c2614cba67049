//! Receiver request handler.
//!
//! Decodes the query of each request on the configured path and answers with
//! one `key = value` line per occurrence. The body is only logged.

use super::parser::Request;
use super::response::Response;
use crate::query::QueryAggregator;
use http::StatusCode;
use tracing::{debug, trace, warn};

/// Default endpoint path.
pub const DEFAULT_PATH: &str = "/receiver";

/// Stateless handler shared by all connections.
#[derive(Debug, Clone)]
pub struct RequestHandler {
    path: String,
    aggregator: QueryAggregator,
}

impl RequestHandler {
    pub fn new(path: impl Into<String>, aggregator: QueryAggregator) -> Self {
        RequestHandler {
            path: path.into(),
            aggregator,
        }
    }

    /// Handle one request.
    pub fn handle(&self, request: &Request) -> Response {
        debug!(
            method = %request.method,
            target = %request.target,
            body_len = request.body.len(),
            "Handling request"
        );
        if !request.body.is_empty() {
            trace!(body = %String::from_utf8_lossy(&request.body), "Request body");
        }

        if request.path() != self.path {
            debug!(path = request.path(), "No endpoint for path");
            return Response::empty(StatusCode::NOT_FOUND);
        }

        match self.aggregator.aggregate(request.raw_query()) {
            Ok(params) => {
                if params.is_empty() {
                    debug!("Request carried no query");
                }
                trace!(keys = params.len(), "Parsed query");
                Response::text(StatusCode::OK, params.render())
            }
            Err(e) => {
                warn!(error = %e, target = %request.target, "Rejecting undecodable query");
                Response::text(StatusCode::BAD_REQUEST, format!("{}\n", e))
            }
        }
    }
}

impl Default for RequestHandler {
    fn default() -> Self {
        Self::new(DEFAULT_PATH, QueryAggregator::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocols::http::parser::{parse_head, ParseResult, MAX_HEADER_BYTES};
    use crate::query::QueryDecoder;
    use bytes::Bytes;

    fn request(target: &str, body: &'static [u8]) -> Request {
        let raw = format!("POST {} HTTP/1.1\r\nContent-Length: {}\r\n\r\n", target, body.len());
        match parse_head(raw.as_bytes(), MAX_HEADER_BYTES) {
            ParseResult::Complete(head) => Request::from_head(head, Bytes::from_static(body)),
            other => panic!("unexpected: {:?}", other),
        }
    }

    fn body(response: &Response) -> &str {
        std::str::from_utf8(&response.body).unwrap()
    }

    #[test]
    fn test_renders_each_occurrence() {
        let handler = RequestHandler::default();
        let response = handler.handle(&request("/receiver?x=1&y=2&x=3", b""));
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(body(&response), "x = 1\nx = 3\ny = 2\n");
    }

    #[test]
    fn test_absent_query_gives_empty_body() {
        let handler = RequestHandler::default();
        let response = handler.handle(&request("/receiver", b""));
        assert_eq!(response.status, StatusCode::OK);
        assert!(response.body.is_empty());
    }

    #[test]
    fn test_body_does_not_affect_response() {
        let handler = RequestHandler::default();
        let response = handler.handle(&request("/receiver?a=b", b"ignored=1"));
        assert_eq!(body(&response), "a = b\n");
    }

    #[test]
    fn test_decoding_error_is_bad_request() {
        let handler = RequestHandler::default();
        let response = handler.handle(&request("/receiver?a=%zz", b""));
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert!(body(&response).starts_with("Invalid hex digit"));
    }

    #[test]
    fn test_unknown_path() {
        let handler = RequestHandler::default();
        let response = handler.handle(&request("/other?a=1", b""));
        assert_eq!(response.status, StatusCode::NOT_FOUND);
        assert!(response.body.is_empty());
    }

    #[test]
    fn test_absolute_form_target_is_served() {
        let handler = RequestHandler::default();
        let response = handler.handle(&request("http://localhost:4000/receiver?a=1&a=2", b""));
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(body(&response), "a = 1\na = 2\n");
    }

    #[test]
    fn test_configured_encoding() {
        let decoder = QueryDecoder::for_label("latin1").unwrap();
        let handler = RequestHandler::new("/in", QueryAggregator::new(decoder));
        let response = handler.handle(&request("/in?city=M%FCnchen", b""));
        assert_eq!(body(&response), "city = München\n");
    }
}
