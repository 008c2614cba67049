//! Protocol implementations.
//!
//! - `http`: HTTP/1.x framing and the query receiver endpoint

pub mod http;
