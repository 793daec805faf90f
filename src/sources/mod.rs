//! Upstream source interfaces.
//!
//! Defines the traits the core consumes: one feed that discovers
//! candidates and three kinds of per-candidate enrichment sources. Every
//! call returns either a typed payload or a typed `SourceError`; the core
//! never sees raw transport errors.

pub mod fixture;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::types::{
    AuxiliaryReport, Candidate, MarketSnapshot, SecurityReport, SourceError,
};

/// Discovery feed for newly listed assets.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Fetch the current batch of discovery candidates.
    async fn discover(&self) -> Result<Vec<Candidate>, SourceError>;
}

/// Primary market-data feed.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    async fn market(&self, candidate: &Candidate) -> Result<MarketSnapshot, SourceError>;
}

/// Security scoring service (0–100; direction set in configuration).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SecurityScoreSource: Send + Sync {
    async fn report(&self, candidate: &Candidate) -> Result<SecurityReport, SourceError>;
}

/// Auxiliary validation (liquidity lock, social presence).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AuxiliarySource: Send + Sync {
    async fn validate(&self, candidate: &Candidate) -> Result<AuxiliaryReport, SourceError>;
}

/// Source clients keyed by the ids used in configuration.
#[derive(Clone)]
pub struct SourceSet {
    pub market: Arc<dyn MarketDataSource>,
    pub security: HashMap<String, Arc<dyn SecurityScoreSource>>,
    pub auxiliary: HashMap<String, Arc<dyn AuxiliarySource>>,
}

impl SourceSet {
    pub fn new(market: Arc<dyn MarketDataSource>) -> Self {
        Self {
            market,
            security: HashMap::new(),
            auxiliary: HashMap::new(),
        }
    }

    pub fn with_security(mut self, id: &str, source: Arc<dyn SecurityScoreSource>) -> Self {
        self.security.insert(id.to_string(), source);
        self
    }

    pub fn with_auxiliary(mut self, id: &str, source: Arc<dyn AuxiliarySource>) -> Self {
        self.auxiliary.insert(id.to_string(), source);
        self
    }
}
