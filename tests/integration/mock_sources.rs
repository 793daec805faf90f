//! Scripted in-memory sources for integration testing.
//!
//! Every source answers with a default payload unless a per-candidate
//! reply has been scripted. Replies can be changed between cycles and
//! every source counts its calls.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use token_scout::config::{AppConfig, RetryPolicy, StorageBackend};
use token_scout::sources::{
    AuxiliarySource, FeedSource, MarketDataSource, SecurityScoreSource, SourceSet,
};
use token_scout::types::*;

/// A scripted reply for one candidate.
#[derive(Clone)]
pub enum Reply<T> {
    Value(T),
    Error(SourceError),
    Panic,
}

impl<T: Clone> Reply<T> {
    fn resolve(&self, id: &str) -> Result<T, SourceError> {
        match self {
            Reply::Value(v) => Ok(v.clone()),
            Reply::Error(e) => Err(e.clone()),
            Reply::Panic => panic!("scripted panic for {id}"),
        }
    }
}

/// Per-candidate replies with a default and a call counter.
pub struct Script<T> {
    default: T,
    overrides: Mutex<HashMap<String, Reply<T>>>,
    calls: AtomicU32,
}

impl<T: Clone> Script<T> {
    fn new(default: T) -> Self {
        Self {
            default,
            overrides: Mutex::new(HashMap::new()),
            calls: AtomicU32::new(0),
        }
    }

    pub fn set(&self, id: &str, reply: Reply<T>) {
        self.overrides.lock().unwrap().insert(id.to_string(), reply);
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn answer(&self, id: &str) -> Result<T, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let reply = self.overrides.lock().unwrap().get(id).cloned();
        match reply {
            Some(r) => r.resolve(id),
            None => Ok(self.default.clone()),
        }
    }
}

// ---------------------------------------------------------------------------
// Sources
// ---------------------------------------------------------------------------

pub struct MockFeed {
    pub candidates: Mutex<Vec<Candidate>>,
    pub delay: std::time::Duration,
}

#[async_trait]
impl FeedSource for MockFeed {
    async fn discover(&self) -> Result<Vec<Candidate>, SourceError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(self.candidates.lock().unwrap().clone())
    }
}

pub struct MockMarket(pub Script<MarketSnapshot>);

#[async_trait]
impl MarketDataSource for MockMarket {
    async fn market(&self, candidate: &Candidate) -> Result<MarketSnapshot, SourceError> {
        self.0.answer(&candidate.id)
    }
}

/// Market source that sleeps on every call and records the peak number
/// of calls in flight at once.
pub struct SlowMarket {
    pub delay: std::time::Duration,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl SlowMarket {
    pub fn new(delay: std::time::Duration) -> Self {
        Self {
            delay,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MarketDataSource for SlowMarket {
    async fn market(&self, _candidate: &Candidate) -> Result<MarketSnapshot, SourceError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(market(5_000.0, 800.0))
    }
}

pub struct MockSecurity(pub Script<SecurityReport>);

#[async_trait]
impl SecurityScoreSource for MockSecurity {
    async fn report(&self, candidate: &Candidate) -> Result<SecurityReport, SourceError> {
        self.0.answer(&candidate.id)
    }
}

pub struct MockAuxiliary(pub Script<AuxiliaryReport>);

#[async_trait]
impl AuxiliarySource for MockAuxiliary {
    async fn validate(&self, candidate: &Candidate) -> Result<AuxiliaryReport, SourceError> {
        self.0.answer(&candidate.id)
    }
}

// ---------------------------------------------------------------------------
// World
// ---------------------------------------------------------------------------

/// All mock sources wired under the ids used in `config.toml`.
pub struct MockWorld {
    pub feed: Arc<MockFeed>,
    pub market: Arc<MockMarket>,
    pub rugcheck: Arc<MockSecurity>,
    pub solsniffer: Arc<MockSecurity>,
    pub lp_lock: Arc<MockAuxiliary>,
    pub twitter: Arc<MockAuxiliary>,
}

impl MockWorld {
    /// Healthy defaults: liquidity 5000, volume 800, rugcheck 40,
    /// solsniffer 70, 95% locked, 1200 followers.
    pub fn new(ids: &[&str]) -> Self {
        Self {
            feed: Arc::new(MockFeed {
                candidates: Mutex::new(ids.iter().map(|id| candidate(id)).collect()),
                delay: std::time::Duration::ZERO,
            }),
            market: Arc::new(MockMarket(Script::new(market(5_000.0, 800.0)))),
            rugcheck: Arc::new(MockSecurity(Script::new(security(40.0)))),
            solsniffer: Arc::new(MockSecurity(Script::new(security(70.0)))),
            lp_lock: Arc::new(MockAuxiliary(Script::new(auxiliary(95.0)))),
            twitter: Arc::new(MockAuxiliary(Script::new(auxiliary(1_200.0)))),
        }
    }

    pub fn sources(&self) -> SourceSet {
        self.sources_with_market(self.market.clone())
    }

    /// Every scripted source except the market, which is replaced.
    pub fn sources_with_market(&self, market: Arc<dyn MarketDataSource>) -> SourceSet {
        SourceSet::new(market)
            .with_security("rugcheck", self.rugcheck.clone())
            .with_security("solsniffer", self.solsniffer.clone())
            .with_auxiliary("lp_lock", self.lp_lock.clone())
            .with_auxiliary("twitter", self.twitter.clone())
    }
}

pub fn candidate(id: &str) -> Candidate {
    Candidate {
        id: id.to_string(),
        discovered_at: Utc::now(),
        origin: Origin {
            platform: "raydium".to_string(),
            dex_id: Some("raydium".to_string()),
            symbol: Some(id.to_uppercase()),
            name: Some(format!("{id} token")),
        },
        presence: PresenceFlags {
            website: true,
            twitter: true,
            telegram: true,
        },
    }
}

pub fn market(liquidity_usd: f64, volume_24h_usd: f64) -> MarketSnapshot {
    MarketSnapshot {
        price_usd: 0.002,
        liquidity_usd,
        volume_24h_usd,
        market_cap_usd: 60_000.0,
        pair_created_at: Utc::now() - Duration::minutes(25),
        price_change_24h_pct: 5.0,
    }
}

/// A clean report: top holder 12%, dump score 80, dev wallets quiet.
pub fn security(score: f64) -> SecurityReport {
    SecurityReport {
        score,
        flags: vec![],
        holders: Some(HolderProfile {
            top_holder_pct: 12.0,
            dump_score: 80.0,
            dev_wallet_activity: 10.0,
        }),
    }
}

pub fn auxiliary(metric: f64) -> AuxiliaryReport {
    AuxiliaryReport {
        metric,
        detail: None,
    }
}

/// The shipped configuration with millisecond retries and an in-memory sink.
pub fn test_config() -> AppConfig {
    let fast = RetryPolicy {
        max_attempts: 3,
        base_delay_ms: 1,
        max_delay_ms: 2,
        timeout_ms: 500,
    };
    let mut cfg = AppConfig::from_toml_str(include_str!("../../config.toml")).unwrap();
    cfg.sources.feed = fast.clone();
    cfg.sources.market_data = fast.clone();
    cfg.sources.storage = fast.clone();
    for s in &mut cfg.sources.security {
        s.retry = fast.clone();
    }
    for a in &mut cfg.sources.auxiliary {
        a.retry = fast.clone();
    }
    cfg.storage.backend = StorageBackend::Memory;
    cfg.dashboard.enabled = false;
    cfg.scanner.top_n = 2;
    cfg
}
