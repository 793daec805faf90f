//! token-scout: discovery, enrichment, filtering and ranking of newly
//! listed tokens.
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod dashboard;
pub mod engine;
pub mod sources;
pub mod storage;
pub mod types;
