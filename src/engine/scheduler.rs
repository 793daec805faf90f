//! Scan scheduler: the discover → enrich → filter → score → persist loop.
//!
//! Cycles run on a fixed interval and never overlap. A tick that fires
//! while a cycle is still running is skipped and logged. Inside a cycle
//! at most `max_concurrency` candidates are in flight; a candidate that
//! panics or fails is recorded as a drop and never aborts the cycle.

use chrono::Utc;
use futures::stream::{self, StreamExt};
use futures::FutureExt;
use serde::Serialize;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use super::enricher::EnrichmentAggregator;
use super::filters::FilterChain;
use super::report::{CycleLog, CycleReport};
use super::retry::with_retry;
use super::scoring::ScoringEngine;
use crate::config::AppConfig;
use crate::sources::{FeedSource, SourceSet};
use crate::storage::QualifiedSink;
use crate::types::{Candidate, Enrichment, ScannerError};

/// Scheduler state as seen from outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    Idle,
    Running,
}

/// Snapshot served by the status API.
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub name: String,
    pub state: SchedulerState,
    pub cycles_started: u64,
    pub ticks_skipped: u64,
    pub last_cycle: Option<CycleReport>,
}

/// What happened to one candidate.
#[derive(Debug)]
enum CandidateOutcome {
    Dropped,
    Failed { revoked: bool },
    Persisted,
    PersistFailed,
    Cancelled,
}

/// Clears the running flag when a cycle ends, however it ends.
struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct ScanScheduler {
    config: Arc<AppConfig>,
    feed: Arc<dyn FeedSource>,
    aggregator: EnrichmentAggregator,
    chain: FilterChain,
    scoring: ScoringEngine,
    sink: Arc<dyn QualifiedSink>,
    running: Arc<AtomicBool>,
    cycles_started: AtomicU64,
    ticks_skipped: AtomicU64,
    log: RwLock<CycleLog>,
}

impl ScanScheduler {
    pub fn new(
        config: Arc<AppConfig>,
        feed: Arc<dyn FeedSource>,
        sources: SourceSet,
        sink: Arc<dyn QualifiedSink>,
    ) -> Result<Self, ScannerError> {
        let aggregator = EnrichmentAggregator::new(config.clone(), sources)?;
        Ok(Self {
            aggregator,
            chain: FilterChain::new(config.clone()),
            scoring: ScoringEngine::new(config.clone()),
            log: RwLock::new(CycleLog::new(config.scanner.cycle_log_size)),
            config,
            feed,
            sink,
            running: Arc::new(AtomicBool::new(false)),
            cycles_started: AtomicU64::new(0),
            ticks_skipped: AtomicU64::new(0),
        })
    }

    pub fn sink(&self) -> Arc<dyn QualifiedSink> {
        self.sink.clone()
    }

    pub fn state(&self) -> SchedulerState {
        if self.running.load(Ordering::SeqCst) {
            SchedulerState::Running
        } else {
            SchedulerState::Idle
        }
    }

    pub async fn status(&self) -> SchedulerStatus {
        SchedulerStatus {
            name: self.config.scanner.name.clone(),
            state: self.state(),
            cycles_started: self.cycles_started.load(Ordering::SeqCst),
            ticks_skipped: self.ticks_skipped.load(Ordering::SeqCst),
            last_cycle: self.log.read().await.last().cloned(),
        }
    }

    /// Recent cycle reports, newest first.
    pub async fn recent_cycles(&self) -> Vec<CycleReport> {
        self.log.read().await.recent()
    }

    // -- Loop ------------------------------------------------------------

    /// Tick until `shutdown` flips to true, then give the in-flight cycle
    /// `shutdown_grace_secs` to finish before aborting it.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.scan_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut current: Option<JoinHandle<CycleReport>> = None;

        info!(
            name = %self.config.scanner.name,
            interval_secs = self.config.scanner.scan_interval_secs,
            "Scheduler started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = ticker.tick() => {
                    if let Some(handle) = self.on_tick(shutdown.clone()) {
                        current = Some(handle);
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        warn!("Shutdown sender dropped; stopping scheduler");
                    }
                    break;
                }
            }
        }

        info!("Scheduler stopping; no new cycles will start");
        if let Some(mut handle) = current {
            if handle.is_finished() {
                return;
            }
            let grace = self.config.shutdown_grace();
            info!(grace_secs = grace.as_secs(), "Waiting for in-flight cycle");
            match tokio::time::timeout(grace, &mut handle).await {
                Ok(Ok(_)) => info!("In-flight cycle finished"),
                Ok(Err(e)) => error!(error = %e, "In-flight cycle task failed"),
                Err(_) => {
                    warn!("Grace period elapsed; aborting in-flight cycle");
                    handle.abort();
                }
            }
        }
    }

    /// Start a cycle unless one is already running.
    pub fn on_tick(self: &Arc<Self>, shutdown: watch::Receiver<bool>) -> Option<JoinHandle<CycleReport>> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            let skipped = self.ticks_skipped.fetch_add(1, Ordering::SeqCst) + 1;
            warn!(skipped, "Previous cycle still running; skipping tick");
            return None;
        }

        let guard = RunningGuard(self.running.clone());
        let this = Arc::clone(self);
        Some(tokio::spawn(async move {
            let _guard = guard;
            this.run_cycle(shutdown).await
        }))
    }

    // -- Cycle -----------------------------------------------------------

    /// Run one full cycle and record its report.
    pub async fn run_cycle(self: Arc<Self>, shutdown: watch::Receiver<bool>) -> CycleReport {
        let cycle_id = uuid::Uuid::new_v4();
        let cycle_no = self.cycles_started.fetch_add(1, Ordering::SeqCst) + 1;
        let mut report = CycleReport::new(cycle_id, Utc::now());
        info!(cycle = %cycle_id, n = cycle_no, "Starting cycle");

        let candidates = self.discover(&mut report).await.unwrap_or_default();
        report.candidates = candidates.len();

        let concurrency = self.config.scanner.max_concurrency.max(1);
        let outcomes: Vec<CandidateOutcome> = stream::iter(candidates)
            .map(|candidate| {
                let this = Arc::clone(&self);
                let shutdown = shutdown.clone();
                async move { this.process(candidate, cycle_id, shutdown).await }
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;

        for outcome in &outcomes {
            match outcome {
                CandidateOutcome::Dropped => report.dropped += 1,
                CandidateOutcome::Failed { revoked } => {
                    report.enriched += 1;
                    report.failed += 1;
                    if *revoked {
                        report.revoked += 1;
                    }
                }
                CandidateOutcome::Persisted => {
                    report.enriched += 1;
                    report.passed += 1;
                    report.persisted += 1;
                }
                CandidateOutcome::PersistFailed => {
                    report.enriched += 1;
                    report.passed += 1;
                    report.persist_failures += 1;
                }
                CandidateOutcome::Cancelled => report.cancelled += 1,
            }
        }

        let top_n = self.config.scanner.top_n;
        let sink = &self.sink;
        let best = with_retry(&self.config.sources.storage, "query_best", || sink.query_best(top_n)).await;
        match best.result {
            Ok(tokens) => {
                for t in &tokens {
                    info!(rank_token = %t, "Trading-ready");
                }
                report.trading_ready = tokens.into_iter().map(|t| t.id).collect();
            }
            Err(e) => error!(cycle = %cycle_id, error = %e, "Failed to refresh trading-ready set"),
        }

        report.finished_at = Utc::now();
        report.log();
        self.log.write().await.push(report.clone());
        report
    }

    /// Pull the feed, collapse duplicate identities and apply the cap.
    async fn discover(&self, report: &mut CycleReport) -> Option<Vec<Candidate>> {
        let feed = &self.feed;
        let out = with_retry(&self.config.sources.feed, "feed", || feed.discover()).await;
        let raw = match out.result {
            Ok(raw) => raw,
            Err(e) => {
                error!(attempts = out.attempts, error = %e, "Feed exhausted; cycle has no candidates");
                report.feed_error = Some(e.to_string());
                return None;
            }
        };

        let total = raw.len();
        let mut seen = HashSet::new();
        let mut unique: Vec<Candidate> = raw.into_iter().filter(|c| seen.insert(c.id.clone())).collect();
        report.duplicates = total - unique.len();

        let cap = self.config.scanner.max_candidates_per_cycle;
        if unique.len() > cap {
            debug!(found = unique.len(), cap, "Truncating candidates to per-cycle cap");
            unique.truncate(cap);
        }
        info!(found = total, unique = unique.len(), "Candidates discovered");
        Some(unique)
    }

    /// Evaluate one candidate with panic isolation.
    async fn process(
        &self,
        candidate: Candidate,
        cycle_id: uuid::Uuid,
        shutdown: watch::Receiver<bool>,
    ) -> CandidateOutcome {
        if *shutdown.borrow() {
            debug!(candidate = %candidate.id, "Shutdown requested; not starting candidate");
            return CandidateOutcome::Cancelled;
        }

        match AssertUnwindSafe(self.evaluate(&candidate, cycle_id)).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(panic) => {
                let msg = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                error!(candidate = %candidate.id, panic = %msg, "Candidate evaluation panicked");
                info!(
                    target: "audit",
                    candidate = %candidate.id,
                    outcome = "drop",
                    reason = %format!("panicked: {msg}"),
                    "candidate isolated"
                );
                CandidateOutcome::Dropped
            }
        }
    }

    async fn evaluate(&self, candidate: &Candidate, cycle_id: uuid::Uuid) -> CandidateOutcome {
        let record = match self.aggregator.enrich(candidate).await {
            Enrichment::Enriched(record) => record,
            Enrichment::Dropped { reason, .. } => {
                debug!(candidate = %candidate.id, %reason, "Candidate dropped");
                return CandidateOutcome::Dropped;
            }
        };

        let chain = self.chain.apply(&record);
        let sink = &self.sink;
        let storage = &self.config.sources.storage;

        if !chain.passed() {
            // A token that qualified earlier no longer does.
            let out = with_retry(storage, "revoke", || sink.revoke(&candidate.id)).await;
            let revoked = match out.result {
                Ok(revoked) => revoked,
                Err(e) => {
                    warn!(candidate = %candidate.id, error = %e, "Failed to revoke stale qualification");
                    false
                }
            };
            if revoked {
                info!(candidate = %candidate.id, "Previously qualified token revoked");
            }
            return CandidateOutcome::Failed { revoked };
        }

        let token = match self.scoring.qualify(&record, &chain, cycle_id, Utc::now()) {
            Ok(token) => token,
            Err(e) => {
                error!(candidate = %candidate.id, error = %e, "Refusing to persist qualified token");
                return CandidateOutcome::PersistFailed;
            }
        };
        let out = with_retry(storage, "upsert", || sink.upsert(&token)).await;
        match out.result {
            Ok(()) => {
                info!(token = %token, "Qualified");
                CandidateOutcome::Persisted
            }
            Err(e) => {
                error!(
                    candidate = %candidate.id,
                    attempts = out.attempts,
                    error = %e,
                    "Failed to persist qualified token; skipping this cycle"
                );
                CandidateOutcome::PersistFailed
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
