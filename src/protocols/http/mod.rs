//! HTTP/1.x receiver protocol.
//!
//! A single endpoint that echoes back the decoded query parameters:
//!
//! ```text
//! Request:  GET /receiver?a=1&b=x+y&a=2 HTTP/1.1\r\n\r\n
//! Response: HTTP/1.1 200 OK\r\n
//!           Content-Length: 20\r\n
//!           Content-Type: text/plain; charset=utf-8\r\n
//!           ...\r\n
//!           \r\n
//!           a = 1\n
//!           a = 2\n
//!           b = x y\n
//! ```
//!
//! Any method is accepted. Request bodies are framed by Content-Length, read,
//! logged and otherwise ignored. Queries that fail to decode get a 400.

pub mod handler;
pub mod parser;
pub mod response;

pub use handler::RequestHandler;
pub use parser::{parse_head, ParseResult, Request, RequestError};
pub use response::Response;
