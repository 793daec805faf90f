//! Shared types for the scanner.
//!
//! These types form the data model used across all modules: candidates
//! coming out of the feed, enriched records, filter outcomes and the
//! qualified tokens persisted by the sink.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Candidate
// ---------------------------------------------------------------------------

/// A newly discovered asset, re-created every cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Opaque asset identity (mint / contract address).
    pub id: String,
    pub discovered_at: DateTime<Utc>,
    pub origin: Origin,
    #[serde(default)]
    pub presence: PresenceFlags,
}

/// Where a candidate was discovered.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Origin {
    /// Launch platform, e.g. "pumpfun" or "raydium".
    pub platform: String,
    #[serde(default)]
    pub dex_id: Option<String>,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

/// Social links advertised by the token profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PresenceFlags {
    #[serde(default)]
    pub website: bool,
    #[serde(default)]
    pub twitter: bool,
    #[serde(default)]
    pub telegram: bool,
}

impl PresenceFlags {
    /// Number of advertised links.
    pub fn count(&self) -> u32 {
        [self.website, self.twitter, self.telegram]
            .iter()
            .filter(|b| **b)
            .count() as u32
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} ({})",
            self.origin.platform,
            self.id,
            self.origin.symbol.as_deref().unwrap_or("?"),
        )
    }
}

impl Candidate {
    /// Helper to build a test candidate with sensible defaults.
    #[cfg(test)]
    pub fn sample(id: &str) -> Self {
        Candidate {
            id: id.to_string(),
            discovered_at: Utc::now(),
            origin: Origin {
                platform: "raydium".to_string(),
                dex_id: Some("raydium".to_string()),
                symbol: Some("SAMPLE".to_string()),
                name: Some("Sample Token".to_string()),
            },
            presence: PresenceFlags {
                website: true,
                twitter: true,
                telegram: false,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Source payloads
// ---------------------------------------------------------------------------

/// Market data for one asset, as reported by the primary feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub price_usd: f64,
    pub liquidity_usd: f64,
    pub volume_24h_usd: f64,
    pub market_cap_usd: f64,
    /// Pool creation time, used to derive the asset's age.
    pub pair_created_at: DateTime<Utc>,
    #[serde(default)]
    pub price_change_24h_pct: f64,
}

/// A security source's verdict on one asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityReport {
    /// Score on a 0–100 scale. Direction depends on the source.
    pub score: f64,
    /// Risk flags raised by the source (e.g. "mint_authority_enabled").
    #[serde(default)]
    pub flags: Vec<String>,
    /// Holder distribution, when the source reports it.
    #[serde(default)]
    pub holders: Option<HolderProfile>,
}

/// Holder concentration and dump-risk indicators, each on a 0–100 scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HolderProfile {
    /// Share of supply held by the largest wallet.
    pub top_holder_pct: f64,
    /// Dump score; lower means a dump is more likely.
    pub dump_score: f64,
    /// Developer wallet activity risk.
    pub dev_wallet_activity: f64,
}

impl HolderProfile {
    pub fn values(&self) -> [(&'static str, f64); 3] {
        [
            ("top_holder_pct", self.top_holder_pct),
            ("dump_score", self.dump_score),
            ("dev_wallet_activity", self.dev_wallet_activity),
        ]
    }
}

/// Kind of auxiliary validation source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuxiliaryKind {
    /// Share of pool liquidity that is locked or burnt (0–100).
    LiquidityLock,
    /// Follower count of the project's social account.
    SocialPresence,
}

impl fmt::Display for AuxiliaryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuxiliaryKind::LiquidityLock => write!(f, "liquidity_lock"),
            AuxiliaryKind::SocialPresence => write!(f, "social_presence"),
        }
    }
}

/// Result of an auxiliary validation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuxiliaryReport {
    /// Kind-specific metric (locked percentage or follower count).
    pub metric: f64,
    #[serde(default)]
    pub detail: Option<String>,
}

// ---------------------------------------------------------------------------
// Enrichment
// ---------------------------------------------------------------------------

/// The role a source plays in enrichment; decides its failure policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceRole {
    MarketData,
    SecurityLowerIsBetter,
    SecurityHigherIsBetter,
    Auxiliary,
}

impl fmt::Display for SourceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceRole::MarketData => write!(f, "market_data"),
            SourceRole::SecurityLowerIsBetter => write!(f, "security_lower_is_better"),
            SourceRole::SecurityHigherIsBetter => write!(f, "security_higher_is_better"),
            SourceRole::Auxiliary => write!(f, "auxiliary"),
        }
    }
}

/// How a source call was resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Resolution<T> {
    /// Genuine source data.
    Value { value: T },
    /// Retries exhausted; the policy substituted a value.
    FallbackApplied { value: T, reason: String },
    /// Retries exhausted; the policy drops the candidate.
    Dropped { reason: String },
}

impl<T> Resolution<T> {
    /// The usable value, genuine or fallback.
    pub fn value(&self) -> Option<&T> {
        match self {
            Resolution::Value { value } | Resolution::FallbackApplied { value, .. } => Some(value),
            Resolution::Dropped { .. } => None,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Resolution::FallbackApplied { .. })
    }

    pub fn is_dropped(&self) -> bool {
        matches!(self, Resolution::Dropped { .. })
    }

    /// Short label used in audit events.
    pub fn label(&self) -> &'static str {
        match self {
            Resolution::Value { .. } => "success",
            Resolution::FallbackApplied { .. } => "fallback_applied",
            Resolution::Dropped { .. } => "drop",
        }
    }
}

/// Outcome of one source for one candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubRecord<T> {
    pub source: String,
    pub role: SourceRole,
    pub attempts: u32,
    pub resolution: Resolution<T>,
}

impl<T> SubRecord<T> {
    pub fn value(&self) -> Option<&T> {
        self.resolution.value()
    }
}

/// Auxiliary sub-records also remember their kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuxiliaryRecord {
    pub kind: AuxiliaryKind,
    pub record: SubRecord<AuxiliaryReport>,
}

/// A candidate with every source's settled result attached.
///
/// Only built when no sub-record is `Dropped`; see
/// `EnrichmentAggregator::enrich`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedRecord {
    pub candidate: Candidate,
    pub fetched_at: DateTime<Utc>,
    /// Age of the pool at fetch time, in minutes.
    pub age_minutes: f64,
    pub market: SubRecord<MarketSnapshot>,
    pub security: Vec<SubRecord<SecurityReport>>,
    pub auxiliary: Vec<AuxiliaryRecord>,
}

impl EnrichedRecord {
    pub fn market(&self) -> Option<&MarketSnapshot> {
        self.market.value()
    }

    /// Security sub-record for a given source id.
    pub fn security(&self, source: &str) -> Option<&SubRecord<SecurityReport>> {
        self.security.iter().find(|s| s.source == source)
    }

    /// Holder profile from the first security source that genuinely
    /// reported one. Fallback reports never carry holders.
    pub fn holders(&self) -> Option<&HolderProfile> {
        self.security
            .iter()
            .filter(|s| !s.resolution.is_fallback())
            .find_map(|s| s.value().and_then(|r| r.holders.as_ref()))
    }

    /// First auxiliary sub-record of a given kind.
    pub fn auxiliary(&self, kind: AuxiliaryKind) -> Option<&SubRecord<AuxiliaryReport>> {
        self.auxiliary
            .iter()
            .find(|a| a.kind == kind)
            .map(|a| &a.record)
    }

    /// Whether any sub-record carries a fallback value.
    pub fn has_fallback(&self) -> bool {
        self.market.resolution.is_fallback()
            || self.security.iter().any(|s| s.resolution.is_fallback())
            || self.auxiliary.iter().any(|a| a.record.resolution.is_fallback())
    }
}

#[cfg(test)]
impl SecurityReport {
    /// Test report with no flags and a healthy holder profile: top holder
    /// 12%, dump score 80, dev wallet activity 10.
    pub fn clean(score: f64) -> Self {
        Self {
            score,
            flags: vec![],
            holders: Some(HolderProfile {
                top_holder_pct: 12.0,
                dump_score: 80.0,
                dev_wallet_activity: 10.0,
            }),
        }
    }
}

#[cfg(test)]
impl EnrichedRecord {
    /// Test record: 30 minutes old, rugcheck 40, solsniffer 70, 95% of
    /// liquidity locked, 1200 followers.
    pub fn sample(id: &str, liquidity_usd: f64, volume_24h_usd: f64) -> Self {
        let now = Utc::now();
        let value_of = |score: f64| Resolution::Value {
            value: SecurityReport::clean(score),
        };
        let aux = |kind: AuxiliaryKind, source: &str, metric: f64| AuxiliaryRecord {
            kind,
            record: SubRecord {
                source: source.to_string(),
                role: SourceRole::Auxiliary,
                attempts: 1,
                resolution: Resolution::Value {
                    value: AuxiliaryReport {
                        metric,
                        detail: None,
                    },
                },
            },
        };
        EnrichedRecord {
            candidate: Candidate::sample(id),
            fetched_at: now,
            age_minutes: 30.0,
            market: SubRecord {
                source: "market_data".to_string(),
                role: SourceRole::MarketData,
                attempts: 1,
                resolution: Resolution::Value {
                    value: MarketSnapshot {
                        price_usd: 0.001,
                        liquidity_usd,
                        volume_24h_usd,
                        market_cap_usd: 40_000.0,
                        pair_created_at: now - chrono::Duration::minutes(30),
                        price_change_24h_pct: 12.0,
                    },
                },
            },
            security: vec![
                SubRecord {
                    source: "rugcheck".to_string(),
                    role: SourceRole::SecurityLowerIsBetter,
                    attempts: 1,
                    resolution: value_of(40.0),
                },
                SubRecord {
                    source: "solsniffer".to_string(),
                    role: SourceRole::SecurityHigherIsBetter,
                    attempts: 1,
                    resolution: value_of(70.0),
                },
            ],
            auxiliary: vec![
                aux(AuxiliaryKind::LiquidityLock, "lp_lock", 95.0),
                aux(AuxiliaryKind::SocialPresence, "twitter", 1_200.0),
            ],
        }
    }

    /// Replace the resolution of one security source.
    pub fn with_security(mut self, source: &str, resolution: Resolution<SecurityReport>) -> Self {
        if let Some(sub) = self.security.iter_mut().find(|s| s.source == source) {
            sub.resolution = resolution;
        }
        self
    }

    pub fn market_mut(&mut self) -> &mut MarketSnapshot {
        match &mut self.market.resolution {
            Resolution::Value { value } | Resolution::FallbackApplied { value, .. } => value,
            Resolution::Dropped { .. } => panic!("sample market is never dropped"),
        }
    }
}

/// Why a candidate never produced an enriched record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DropReason {
    pub source: String,
    pub role: SourceRole,
    pub reason: String,
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.source, self.role, self.reason)
    }
}

/// Result of enriching one candidate.
#[derive(Debug, Clone, PartialEq)]
pub enum Enrichment {
    Enriched(Box<EnrichedRecord>),
    Dropped {
        candidate: Candidate,
        reason: DropReason,
    },
}

// ---------------------------------------------------------------------------
// Filter outcomes
// ---------------------------------------------------------------------------

/// Filter class; decides short-circuit behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterClass {
    Critical,
    Override,
    Quality,
    Special,
}

impl fmt::Display for FilterClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterClass::Critical => write!(f, "critical"),
            FilterClass::Override => write!(f, "override"),
            FilterClass::Quality => write!(f, "quality"),
            FilterClass::Special => write!(f, "special"),
        }
    }
}

/// Verdict of a single filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Pass,
    Fail,
    /// Filter disabled in configuration.
    Skipped,
    /// Informational result from a special filter.
    Annotated,
}

/// One entry of the audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterOutcome {
    pub filter_id: String,
    pub class: FilterClass,
    pub verdict: Verdict,
    pub reason: String,
    /// The evaluated value came from a fallback policy, not the source.
    #[serde(default)]
    pub fallback: bool,
}

impl FilterOutcome {
    pub fn new(
        filter_id: impl Into<String>,
        class: FilterClass,
        verdict: Verdict,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            filter_id: filter_id.into(),
            class,
            verdict,
            reason: reason.into(),
            fallback: false,
        }
    }

    pub fn with_fallback(mut self, fallback: bool) -> Self {
        self.fallback = fallback;
        self
    }
}

impl fmt::Display for FilterOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}[{}] {:?}: {}{}",
            self.filter_id,
            self.class,
            self.verdict,
            self.reason,
            if self.fallback { " (fallback)" } else { "" },
        )
    }
}

/// Overall chain decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainVerdict {
    Pass,
    Fail,
}

/// Chain decision plus the ordered audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainResult {
    pub verdict: ChainVerdict,
    pub trail: Vec<FilterOutcome>,
}

impl ChainResult {
    pub fn passed(&self) -> bool {
        self.verdict == ChainVerdict::Pass
    }

    /// The first failing outcome, if any.
    pub fn first_failure(&self) -> Option<&FilterOutcome> {
        self.trail.iter().find(|o| o.verdict == Verdict::Fail)
    }
}

// ---------------------------------------------------------------------------
// Scoring / qualified tokens
// ---------------------------------------------------------------------------

/// A categorical tag produced from configured cut points.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tier {
    pub label: String,
    /// Position in the tier table (0 = lowest band).
    pub rank: usize,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label)
    }
}

/// Output of the scoring engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreCard {
    pub value: f64,
    pub age_tier: Tier,
    pub cap_tier: Tier,
    pub risk_tier: Tier,
}

/// Metrics captured at qualification time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub price_usd: f64,
    pub liquidity_usd: f64,
    pub volume_24h_usd: f64,
    pub market_cap_usd: f64,
    pub age_minutes: f64,
    /// Resolved score per security source (fallbacks included).
    pub security_scores: BTreeMap<String, f64>,
}

/// A candidate that passed every critical filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualifiedToken {
    pub id: String,
    pub symbol: Option<String>,
    pub origin: String,
    pub metrics: MetricsSnapshot,
    pub age_tier: Tier,
    pub cap_tier: Tier,
    pub risk_tier: Tier,
    pub score: f64,
    pub trail: Vec<FilterOutcome>,
    pub qualified_at: DateTime<Utc>,
    pub cycle_id: uuid::Uuid,
    pub trading_ready: bool,
}

impl fmt::Display for QualifiedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}) score={:.2} liq=${:.0} vol=${:.0} [{}|{}|{}]{}",
            self.id,
            self.symbol.as_deref().unwrap_or("?"),
            self.score,
            self.metrics.liquidity_usd,
            self.metrics.volume_24h_usd,
            self.age_tier,
            self.cap_tier,
            self.risk_tier,
            if self.trading_ready { " READY" } else { "" },
        )
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Typed failure returned by a source client.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SourceError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("rate limited (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    #[error("malformed payload: {0}")]
    Malformed(String),

    #[error("source unavailable: {0}")]
    Unavailable(String),
}

impl SourceError {
    /// Transient failures are retried; the rest are terminal at once.
    pub fn is_transient(&self) -> bool {
        !matches!(self, SourceError::Malformed(_))
    }
}

/// Domain-specific error types for the scanner.
#[derive(Debug, thiserror::Error)]
pub enum ScannerError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid score: {0}")]
    InvalidScore(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
