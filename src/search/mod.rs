//! Search backend abstraction
//!
//! - `traits`: the [`SearchBackend`] seam and [`RawResponse`]
//! - `client`: HTTP client for the `/search/` endpoint
//! - `parser`: ranked document ids from a raw response
//! - `cache`: explicit, injectable response cache

pub mod cache;
pub mod client;
pub mod parser;
pub mod traits;

pub use cache::{CachedBackend, ResponseCache};
pub use client::{build_request_body, HttpSearchClient};
pub use parser::{parse, parse_hits, SearchHit};
pub use traits::{RawResponse, SearchBackend};
