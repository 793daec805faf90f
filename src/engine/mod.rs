//! Core engine: the discover → enrich → filter → score → persist loop.

pub mod enricher;
pub mod filters;
pub mod report;
pub mod retry;
pub mod scheduler;
pub mod scoring;
