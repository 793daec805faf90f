//! JSON replay book implementing every source trait.
//!
//! Used for dry runs and demos: one file lists candidates together with
//! the payload each configured source should return for them. Missing
//! payloads surface as `SourceError::Unavailable`, so the normal retry
//! and fallback policies apply exactly as they would against a live API.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use super::{AuxiliarySource, FeedSource, MarketDataSource, SecurityScoreSource, SourceSet};
use crate::config::AppConfig;
use crate::types::{
    AuxiliaryReport, Candidate, MarketSnapshot, Origin, PresenceFlags, SecurityReport,
    SourceError,
};

// ---------------------------------------------------------------------------
// File format
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct FixtureFile {
    candidates: Vec<FixtureEntry>,
}

#[derive(Debug, Clone, Deserialize)]
struct FixtureEntry {
    id: String,
    origin: Origin,
    #[serde(default)]
    presence: PresenceFlags,
    #[serde(default)]
    market: Option<FixtureMarket>,
    #[serde(default)]
    security: HashMap<String, SecurityReport>,
    #[serde(default)]
    auxiliary: HashMap<String, AuxiliaryReport>,
}

/// Market data with the pool age given relative to "now".
#[derive(Debug, Clone, Deserialize)]
struct FixtureMarket {
    price_usd: f64,
    liquidity_usd: f64,
    volume_24h_usd: f64,
    market_cap_usd: f64,
    age_minutes: f64,
    #[serde(default)]
    price_change_24h_pct: f64,
}

// ---------------------------------------------------------------------------
// Book
// ---------------------------------------------------------------------------

/// In-memory replay of a fixture file.
pub struct FixtureBook {
    entries: Vec<FixtureEntry>,
}

impl FixtureBook {
    /// Load a fixture file from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read fixture file {}", path.display()))?;
        let book = Self::from_json(&json)
            .with_context(|| format!("Failed to parse fixture file {}", path.display()))?;
        info!(path = %path.display(), candidates = book.entries.len(), "Fixture book loaded");
        Ok(book)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let file: FixtureFile = serde_json::from_str(json)?;
        Ok(Self {
            entries: file.candidates,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn entry(&self, id: &str) -> Result<&FixtureEntry, SourceError> {
        self.entries
            .iter()
            .find(|e| e.id == id)
            .ok_or_else(|| SourceError::Unavailable(format!("no fixture entry for {id}")))
    }

    /// Wire this book as every source named in the configuration.
    pub fn source_set(self: &Arc<Self>, config: &AppConfig) -> SourceSet {
        let mut set = SourceSet::new(self.clone());
        for src in &config.sources.security {
            set = set.with_security(
                &src.id,
                Arc::new(FixtureSecurity {
                    book: self.clone(),
                    source: src.id.clone(),
                }),
            );
        }
        for src in &config.sources.auxiliary {
            set = set.with_auxiliary(
                &src.id,
                Arc::new(FixtureAuxiliary {
                    book: self.clone(),
                    source: src.id.clone(),
                }),
            );
        }
        set
    }
}

#[async_trait]
impl FeedSource for FixtureBook {
    async fn discover(&self) -> Result<Vec<Candidate>, SourceError> {
        let now = Utc::now();
        Ok(self
            .entries
            .iter()
            .map(|e| Candidate {
                id: e.id.clone(),
                discovered_at: now,
                origin: e.origin.clone(),
                presence: e.presence,
            })
            .collect())
    }
}

#[async_trait]
impl MarketDataSource for FixtureBook {
    async fn market(&self, candidate: &Candidate) -> Result<MarketSnapshot, SourceError> {
        let entry = self.entry(&candidate.id)?;
        let m = entry
            .market
            .as_ref()
            .ok_or_else(|| SourceError::Unavailable(format!("no market data for {}", entry.id)))?;
        let bad_age = || SourceError::Malformed(format!("age_minutes {} for {}", m.age_minutes, entry.id));
        let secs = m.age_minutes * 60.0;
        if !secs.is_finite() || secs < 0.0 {
            return Err(bad_age());
        }
        let pair_created_at = Duration::try_seconds(secs as i64)
            .and_then(|age| Utc::now().checked_sub_signed(age))
            .ok_or_else(bad_age)?;
        Ok(MarketSnapshot {
            price_usd: m.price_usd,
            liquidity_usd: m.liquidity_usd,
            volume_24h_usd: m.volume_24h_usd,
            market_cap_usd: m.market_cap_usd,
            pair_created_at,
            price_change_24h_pct: m.price_change_24h_pct,
        })
    }
}

/// One security source served from the book.
struct FixtureSecurity {
    book: Arc<FixtureBook>,
    source: String,
}

#[async_trait]
impl SecurityScoreSource for FixtureSecurity {
    async fn report(&self, candidate: &Candidate) -> Result<SecurityReport, SourceError> {
        self.book
            .entry(&candidate.id)?
            .security
            .get(&self.source)
            .cloned()
            .ok_or_else(|| {
                SourceError::Unavailable(format!("{} has no report for {}", self.source, candidate.id))
            })
    }
}

/// One auxiliary source served from the book.
struct FixtureAuxiliary {
    book: Arc<FixtureBook>,
    source: String,
}

#[async_trait]
impl AuxiliarySource for FixtureAuxiliary {
    async fn validate(&self, candidate: &Candidate) -> Result<AuxiliaryReport, SourceError> {
        self.book
            .entry(&candidate.id)?
            .auxiliary
            .get(&self.source)
            .cloned()
            .ok_or_else(|| {
                SourceError::Unavailable(format!("{} has no report for {}", self.source, candidate.id))
            })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
