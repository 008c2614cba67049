//! Query string parsing.
//!
//! - `decoder`: percent-decoding of one key or value token
//! - `aggregator`: splitting a raw query into an ordered multi-map
//!
//! ```text
//! raw:      x=1&y=a+b&x=%33
//! params:   x -> [1, 3], y -> "a b"
//! rendered: x = 1
//!           x = 3
//!           y = a b
//! ```

pub mod aggregator;
pub mod decoder;

pub use aggregator::QueryAggregator;
pub use decoder::{DecodingError, QueryDecoder};
