//! Adapter implementations (hexagonal architecture)
//!
//! Adapters implement the port traits with concrete technologies.

pub mod duckdb;
pub mod feed;
pub mod gemini;
pub mod local_identity;
