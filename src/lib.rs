//! Ranking evaluation library
//!
//! Measures how well a search backend ranks the known relevant document for a
//! sample of judged queries, and compares ranking configurations side by side.

pub mod benchmark;
pub mod config;
pub mod corpus;
pub mod error;
pub mod queries;
pub mod search;
