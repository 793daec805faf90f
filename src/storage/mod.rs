//! Persistence layer for qualified tokens.
//!
//! A `QualifiedSink` keeps the current qualified set (one snapshot per
//! identity, later cycles supersede earlier ones) and an append-only
//! history. `query_best` applies the one total order used everywhere:
//! score descending, then qualification time descending, then id.

pub mod sqlite;

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::config::{StorageBackend, StorageConfig};
use crate::types::{QualifiedToken, ScannerError};

/// Store for qualified tokens. Every method is atomic with respect to
/// readers.
#[async_trait]
pub trait QualifiedSink: Send + Sync {
    /// Insert or replace the current snapshot for `token.id` and append it
    /// to the history.
    async fn upsert(&self, token: &QualifiedToken) -> Result<(), ScannerError>;

    /// Every snapshot ever written for `id`, oldest first.
    async fn history(&self, id: &str) -> Result<Vec<QualifiedToken>, ScannerError>;

    /// Flag the top `n` current tokens trading-ready (clearing the flag on
    /// the rest) and return them in rank order.
    async fn query_best(&self, n: usize) -> Result<Vec<QualifiedToken>, ScannerError>;

    async fn get(&self, id: &str) -> Result<Option<QualifiedToken>, ScannerError>;

    /// Remove `id` from the current set. History is kept.
    async fn revoke(&self, id: &str) -> Result<bool, ScannerError>;

    /// Current tokens in rank order without touching the trading-ready flags.
    async fn ranked(&self, limit: usize) -> Result<Vec<QualifiedToken>, ScannerError>;

    async fn count(&self) -> Result<usize, ScannerError>;
}

/// The ranking order: score desc, qualified_at desc, id asc.
pub fn rank_order(a: &QualifiedToken, b: &QualifiedToken) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| b.qualified_at.cmp(&a.qualified_at))
        .then_with(|| a.id.cmp(&b.id))
}

/// Open the sink selected in configuration.
pub async fn open_sink(config: &StorageConfig) -> Result<Arc<dyn QualifiedSink>> {
    match config.backend {
        StorageBackend::Memory => {
            info!("Using in-memory qualified sink");
            Ok(Arc::new(MemorySink::new()))
        }
        StorageBackend::Sqlite => {
            let sink = sqlite::SqliteSink::connect(&config.database_url)
                .await
                .with_context(|| format!("Failed to open database {}", config.database_url))?;
            info!(url = %config.database_url, "Using SQLite qualified sink");
            Ok(Arc::new(sink))
        }
    }
}

// ---------------------------------------------------------------------------
// In-memory sink
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MemoryState {
    current: HashMap<String, QualifiedToken>,
    history: HashMap<String, Vec<QualifiedToken>>,
}

/// Process-local sink guarded by a single `RwLock`.
#[derive(Default)]
pub struct MemorySink {
    state: RwLock<MemoryState>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QualifiedSink for MemorySink {
    async fn upsert(&self, token: &QualifiedToken) -> Result<(), ScannerError> {
        let mut state = self.state.write().await;
        state
            .history
            .entry(token.id.clone())
            .or_default()
            .push(token.clone());

        let mut token = token.clone();
        // Keep the flag until the next ranking pass decides.
        token.trading_ready = state
            .current
            .get(&token.id)
            .map(|t| t.trading_ready)
            .unwrap_or(false);
        debug!(id = %token.id, score = token.score, "Qualified token upserted");
        state.current.insert(token.id.clone(), token);
        Ok(())
    }

    async fn history(&self, id: &str) -> Result<Vec<QualifiedToken>, ScannerError> {
        let state = self.state.read().await;
        Ok(state.history.get(id).cloned().unwrap_or_default())
    }

    async fn query_best(&self, n: usize) -> Result<Vec<QualifiedToken>, ScannerError> {
        let mut state = self.state.write().await;
        let mut ranked: Vec<&mut QualifiedToken> = state.current.values_mut().collect();
        ranked.sort_by(|a, b| rank_order(a, b));

        let mut best = Vec::with_capacity(n);
        for (i, token) in ranked.into_iter().enumerate() {
            token.trading_ready = i < n;
            if token.trading_ready {
                best.push(token.clone());
            }
        }
        Ok(best)
    }

    async fn get(&self, id: &str) -> Result<Option<QualifiedToken>, ScannerError> {
        Ok(self.state.read().await.current.get(id).cloned())
    }

    async fn revoke(&self, id: &str) -> Result<bool, ScannerError> {
        Ok(self.state.write().await.current.remove(id).is_some())
    }

    async fn ranked(&self, limit: usize) -> Result<Vec<QualifiedToken>, ScannerError> {
        let state = self.state.read().await;
        let mut all: Vec<QualifiedToken> = state.current.values().cloned().collect();
        all.sort_by(rank_order);
        all.truncate(limit);
        Ok(all)
    }

    async fn count(&self) -> Result<usize, ScannerError> {
        Ok(self.state.read().await.current.len())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
