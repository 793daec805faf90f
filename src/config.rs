//! Configuration loading from TOML with validation.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs. The
//! result is validated once at startup and then shared as an immutable
//! `Arc<AppConfig>`; no component reads ambient settings.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::time::Duration;

use crate::types::{AuxiliaryKind, ScannerError, SourceRole};

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub scanner: ScannerConfig,
    pub sources: SourcesConfig,
    pub filters: FiltersConfig,
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub dashboard: DashboardConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScannerConfig {
    pub name: String,
    pub scan_interval_secs: u64,
    pub max_candidates_per_cycle: usize,
    pub max_concurrency: usize,
    /// Number of tokens flagged trading-ready after each cycle.
    pub top_n: usize,
    #[serde(default = "default_grace_secs")]
    pub shutdown_grace_secs: u64,
    #[serde(default = "default_cycle_log_size")]
    pub cycle_log_size: usize,
    /// JSON replay book used as the feed and source clients.
    #[serde(default)]
    pub fixture_path: Option<String>,
}

fn default_grace_secs() -> u64 {
    10
}

fn default_cycle_log_size() -> usize {
    100
}

// ---------------------------------------------------------------------------
// Sources
// ---------------------------------------------------------------------------

/// Bounded exponential backoff with a per-attempt timeout.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub timeout_ms: u64,
}

impl RetryPolicy {
    /// Many attempts with a capped delay; used by the primary feed.
    pub fn primary() -> Self {
        Self {
            max_attempts: 8,
            base_delay_ms: 500,
            max_delay_ms: 30_000,
            timeout_ms: 10_000,
        }
    }

    /// A few quick retries; used by security and auxiliary sources.
    pub fn bounded() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 4_000,
            timeout_ms: 8_000,
        }
    }

    /// Delay before attempt `attempt` (1-based; attempt 1 has no delay).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let exp = (attempt - 2).min(31);
        let raw = self.base_delay_ms.saturating_mul(1u64 << exp);
        Duration::from_millis(raw.min(self.max_delay_ms))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    fn validate(&self, name: &str, errors: &mut Vec<String>) {
        if self.max_attempts == 0 {
            errors.push(format!("{name}: max_attempts must be at least 1"));
        }
        if self.base_delay_ms > self.max_delay_ms {
            errors.push(format!(
                "{name}: base_delay_ms ({}) exceeds max_delay_ms ({})",
                self.base_delay_ms, self.max_delay_ms
            ));
        }
        if self.timeout_ms == 0 {
            errors.push(format!("{name}: timeout_ms must be positive"));
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourcesConfig {
    #[serde(default = "RetryPolicy::primary")]
    pub feed: RetryPolicy,
    #[serde(default = "RetryPolicy::primary")]
    pub market_data: RetryPolicy,
    #[serde(default)]
    pub security: Vec<SecuritySourceConfig>,
    #[serde(default)]
    pub auxiliary: Vec<AuxiliarySourceConfig>,
    #[serde(default = "RetryPolicy::bounded")]
    pub storage: RetryPolicy,
}

/// Whether a security score improves upwards or downwards.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScoreDirection {
    LowerIsBetter,
    HigherIsBetter,
}

impl ScoreDirection {
    pub fn role(&self) -> SourceRole {
        match self {
            ScoreDirection::LowerIsBetter => SourceRole::SecurityLowerIsBetter,
            ScoreDirection::HigherIsBetter => SourceRole::SecurityHigherIsBetter,
        }
    }

    /// The comparator a gate on this source must use.
    pub fn gate_comparator(&self) -> Comparator {
        match self {
            ScoreDirection::LowerIsBetter => Comparator::GreaterThan,
            ScoreDirection::HigherIsBetter => Comparator::LessThan,
        }
    }

    /// Convert a score to a 0–100 risk figure (higher = riskier).
    pub fn risk(&self, score: f64) -> f64 {
        match self {
            ScoreDirection::LowerIsBetter => score,
            ScoreDirection::HigherIsBetter => 100.0 - score,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SecuritySourceConfig {
    pub id: String,
    pub direction: ScoreDirection,
    #[serde(default = "RetryPolicy::bounded")]
    pub retry: RetryPolicy,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuxiliarySourceConfig {
    pub id: String,
    pub kind: AuxiliaryKind,
    #[serde(default = "RetryPolicy::bounded")]
    pub retry: RetryPolicy,
}

// ---------------------------------------------------------------------------
// Filters
// ---------------------------------------------------------------------------

/// Rejection comparator carried by every threshold filter.
///
/// `reject_if = ">"` rejects values strictly above the threshold,
/// `reject_if = "<"` rejects values strictly below it.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    #[serde(rename = "<")]
    LessThan,
    #[serde(rename = ">")]
    GreaterThan,
}

impl Comparator {
    pub fn rejects(&self, value: f64, threshold: f64) -> bool {
        match self {
            Comparator::LessThan => value < threshold,
            Comparator::GreaterThan => value > threshold,
        }
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Comparator::LessThan => write!(f, "<"),
            Comparator::GreaterThan => write!(f, ">"),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct FiltersConfig {
    #[serde(default)]
    pub blacklist: Vec<String>,
    #[serde(default)]
    pub whitelist: Vec<String>,
    #[serde(default)]
    pub security_gates: Vec<SecurityGate>,
    #[serde(default)]
    pub scam: ScamConfig,
    #[serde(default)]
    pub quality: Vec<QualityFilter>,
    #[serde(default)]
    pub special: Vec<SpecialFilter>,
}

/// Critical threshold on one security source.
#[derive(Debug, Deserialize, Clone)]
pub struct SecurityGate {
    pub id: String,
    pub source: String,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    pub reject_if: Comparator,
    pub threshold: f64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScamConfig {
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    /// Security flags that count as a scam pattern.
    #[serde(default)]
    pub flag_patterns: Vec<String>,
    /// Case-insensitive substrings matched against symbol and name.
    #[serde(default)]
    pub name_patterns: Vec<String>,
}

impl Default for ScamConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            flag_patterns: Vec::new(),
            name_patterns: Vec::new(),
        }
    }
}

/// Metric a quality filter reads from an enriched record.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FilterMetric {
    LiquidityUsd,
    #[serde(rename = "volume_24h_usd")]
    Volume24hUsd,
    MarketCapUsd,
    #[serde(rename = "price_change_24h_pct")]
    PriceChange24hPct,
    AgeMinutes,
    LockedLiquidityPct,
    SocialFollowers,
    SocialLinks,
    TopHolderPct,
    DumpScore,
    DevWalletActivity,
}

impl FilterMetric {
    pub const ALL: [FilterMetric; 11] = [
        FilterMetric::LiquidityUsd,
        FilterMetric::Volume24hUsd,
        FilterMetric::MarketCapUsd,
        FilterMetric::PriceChange24hPct,
        FilterMetric::AgeMinutes,
        FilterMetric::LockedLiquidityPct,
        FilterMetric::SocialFollowers,
        FilterMetric::SocialLinks,
        FilterMetric::TopHolderPct,
        FilterMetric::DumpScore,
        FilterMetric::DevWalletActivity,
    ];

    /// Whether the metric comes from a security source's holder profile.
    pub fn reads_holders(&self) -> bool {
        matches!(
            self,
            FilterMetric::TopHolderPct | FilterMetric::DumpScore | FilterMetric::DevWalletActivity
        )
    }

    /// Auxiliary source kind this metric depends on, if any.
    pub fn required_auxiliary(&self) -> Option<AuxiliaryKind> {
        match self {
            FilterMetric::LockedLiquidityPct => Some(AuxiliaryKind::LiquidityLock),
            FilterMetric::SocialFollowers => Some(AuxiliaryKind::SocialPresence),
            _ => None,
        }
    }
}

impl fmt::Display for FilterMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FilterMetric::LiquidityUsd => "liquidity_usd",
            FilterMetric::Volume24hUsd => "volume_24h_usd",
            FilterMetric::MarketCapUsd => "market_cap_usd",
            FilterMetric::PriceChange24hPct => "price_change_24h_pct",
            FilterMetric::AgeMinutes => "age_minutes",
            FilterMetric::LockedLiquidityPct => "locked_liquidity_pct",
            FilterMetric::SocialFollowers => "social_followers",
            FilterMetric::SocialLinks => "social_links",
            FilterMetric::TopHolderPct => "top_holder_pct",
            FilterMetric::DumpScore => "dump_score",
            FilterMetric::DevWalletActivity => "dev_wallet_activity",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct QualityFilter {
    pub id: String,
    pub metric: FilterMetric,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    pub reject_if: Comparator,
    pub threshold: f64,
}

/// Annotation-only filters.
#[derive(Debug, Deserialize, Clone)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SpecialFilter {
    /// Market-cap to liquidity ratio for launchpad origins.
    OriginAnalysis {
        id: String,
        #[serde(default = "enabled_by_default")]
        enabled: bool,
        origins: Vec<String>,
        max_cap_to_liquidity: f64,
    },
    /// Momentum signal from price change and volume.
    Trend {
        id: String,
        #[serde(default = "enabled_by_default")]
        enabled: bool,
        min_price_change_pct: f64,
        min_volume_usd: f64,
    },
}

impl SpecialFilter {
    pub fn id(&self) -> &str {
        match self {
            SpecialFilter::OriginAnalysis { id, .. } | SpecialFilter::Trend { id, .. } => id,
        }
    }

    pub fn enabled(&self) -> bool {
        match self {
            SpecialFilter::OriginAnalysis { enabled, .. } | SpecialFilter::Trend { enabled, .. } => {
                *enabled
            }
        }
    }
}

fn enabled_by_default() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Scoring
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ScoreScale {
    Linear,
    #[default]
    Log,
}

impl ScoreScale {
    pub fn apply(&self, x: f64) -> f64 {
        match self {
            ScoreScale::Linear => x,
            ScoreScale::Log => (x.max(0.0) + 1.0).ln(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScoringConfig {
    pub liquidity_weight: f64,
    pub volume_weight: f64,
    #[serde(default)]
    pub scale: ScoreScale,
    pub age_tiers: TierTable,
    pub cap_tiers: TierTable,
    pub risk_tiers: TierTable,
}

/// Ascending cut points; values at or above the last cut get `overflow`.
#[derive(Debug, Deserialize, Clone)]
pub struct TierTable {
    pub cuts: Vec<TierCut>,
    pub overflow: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TierCut {
    pub label: String,
    /// Exclusive upper bound of this band.
    pub upper: f64,
}

impl TierTable {
    fn validate(&self, name: &str, errors: &mut Vec<String>) {
        if self.overflow.trim().is_empty() {
            errors.push(format!("{name}: overflow label must not be empty"));
        }
        let mut prev = f64::NEG_INFINITY;
        for cut in &self.cuts {
            if cut.label.trim().is_empty() {
                errors.push(format!("{name}: tier labels must not be empty"));
            }
            if !cut.upper.is_finite() || cut.upper <= prev {
                errors.push(format!(
                    "{name}: cut '{}' ({}) must be finite and strictly ascending",
                    cut.label, cut.upper
                ));
            }
            prev = cut.upper;
        }
    }
}

// ---------------------------------------------------------------------------
// Storage / dashboard
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    #[default]
    Sqlite,
    Memory,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    #[serde(default = "default_database_url")]
    pub database_url: String,
}

fn default_database_url() -> String {
    "sqlite://token_scout.db".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            database_url: default_database_url(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DashboardConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 8080,
        }
    }
}

// ---------------------------------------------------------------------------
// Loading / validation
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Load and validate configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let config = Self::from_toml_str(&contents)
            .with_context(|| format!("Invalid config file: {path}"))?;
        Ok(config)
    }

    /// Parse and validate configuration from TOML text.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: AppConfig =
            toml::from_str(contents).context("Failed to parse configuration TOML")?;
        config.validate()?;
        Ok(config)
    }

    /// Resolve an environment variable name to its value.
    /// Useful for loading secrets referenced in the config.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scanner.scan_interval_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.scanner.shutdown_grace_secs)
    }

    pub fn security_source(&self, id: &str) -> Option<&SecuritySourceConfig> {
        self.sources.security.iter().find(|s| s.id == id)
    }

    /// Threshold substituted when a higher-is-better source is exhausted:
    /// the threshold of the gate declared on that source.
    pub fn fallback_threshold(&self, source: &str) -> Option<f64> {
        self.filters
            .security_gates
            .iter()
            .find(|g| g.source == source)
            .map(|g| g.threshold)
    }

    /// Check cross-field invariants. Any violation is fatal at startup.
    pub fn validate(&self) -> Result<(), ScannerError> {
        let mut errors = Vec::new();

        let s = &self.scanner;
        if s.scan_interval_secs == 0 {
            errors.push("scanner.scan_interval_secs must be positive".to_string());
        }
        if s.max_concurrency == 0 {
            errors.push("scanner.max_concurrency must be at least 1".to_string());
        }
        if s.max_candidates_per_cycle == 0 {
            errors.push("scanner.max_candidates_per_cycle must be at least 1".to_string());
        }

        self.sources.feed.validate("sources.feed", &mut errors);
        self.sources.market_data.validate("sources.market_data", &mut errors);
        self.sources.storage.validate("sources.storage", &mut errors);

        let mut ids = HashSet::new();
        for src in &self.sources.security {
            src.retry.validate(&format!("sources.security.{}", src.id), &mut errors);
            if !ids.insert(src.id.as_str()) {
                errors.push(format!("duplicate source id '{}'", src.id));
            }
        }
        for src in &self.sources.auxiliary {
            src.retry.validate(&format!("sources.auxiliary.{}", src.id), &mut errors);
            if !ids.insert(src.id.as_str()) {
                errors.push(format!("duplicate source id '{}'", src.id));
            }
        }

        self.validate_filters(&mut errors);
        self.validate_scoring(&mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ScannerError::Config(errors.join("; ")))
        }
    }

    fn validate_filters(&self, errors: &mut Vec<String>) {
        let mut filter_ids = HashSet::new();

        for gate in &self.filters.security_gates {
            if !filter_ids.insert(gate.id.as_str()) {
                errors.push(format!("duplicate filter id '{}'", gate.id));
            }
            if !gate.threshold.is_finite() || !(0.0..=100.0).contains(&gate.threshold) {
                errors.push(format!(
                    "gate '{}': threshold {} must be within 0–100",
                    gate.id, gate.threshold
                ));
            }
            match self.security_source(&gate.source) {
                None => errors.push(format!(
                    "gate '{}' references unknown security source '{}'",
                    gate.id, gate.source
                )),
                Some(src) if src.direction.gate_comparator() != gate.reject_if => {
                    errors.push(format!(
                        "gate '{}': source '{}' is {:?} so reject_if must be '{}', got '{}'",
                        gate.id,
                        gate.source,
                        src.direction,
                        src.direction.gate_comparator(),
                        gate.reject_if
                    ));
                }
                Some(_) => {}
            }
        }

        for src in &self.sources.security {
            let gates = self
                .filters
                .security_gates
                .iter()
                .filter(|g| g.source == src.id)
                .count();
            if src.direction == ScoreDirection::HigherIsBetter && gates != 1 {
                errors.push(format!(
                    "higher-is-better source '{}' needs exactly one gate to define its fallback, found {gates}",
                    src.id
                ));
            }
        }

        for q in &self.filters.quality {
            if !filter_ids.insert(q.id.as_str()) {
                errors.push(format!("duplicate filter id '{}'", q.id));
            }
            if !q.threshold.is_finite() {
                errors.push(format!("quality filter '{}': threshold must be finite", q.id));
            }
            if let Some(kind) = q.metric.required_auxiliary() {
                if q.enabled && !self.sources.auxiliary.iter().any(|a| a.kind == kind) {
                    errors.push(format!(
                        "quality filter '{}' reads {} but no {kind} source is configured",
                        q.id, q.metric
                    ));
                }
            }
            if q.enabled && q.metric.reads_holders() && self.sources.security.is_empty() {
                errors.push(format!(
                    "quality filter '{}' reads {} but no security source is configured",
                    q.id, q.metric
                ));
            }
        }

        for sp in &self.filters.special {
            if !filter_ids.insert(sp.id()) {
                errors.push(format!("duplicate filter id '{}'", sp.id()));
            }
        }
    }

    fn validate_scoring(&self, errors: &mut Vec<String>) {
        let sc = &self.scoring;
        for (name, w) in [
            ("liquidity_weight", sc.liquidity_weight),
            ("volume_weight", sc.volume_weight),
        ] {
            if !w.is_finite() || w < 0.0 {
                errors.push(format!("scoring.{name} must be a non-negative number"));
            }
        }
        if sc.liquidity_weight == 0.0 && sc.volume_weight == 0.0 {
            errors.push("scoring weights must not both be zero".to_string());
        }
        sc.age_tiers.validate("scoring.age_tiers", errors);
        sc.cap_tiers.validate("scoring.cap_tiers", errors);
        sc.risk_tiers.validate("scoring.risk_tiers", errors);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = include_str!("../config.toml");

    fn sample() -> AppConfig {
        AppConfig::from_toml_str(SAMPLE).unwrap()
    }

    #[test]
    fn test_sample_config_is_valid() {
        let cfg = sample();
        assert_eq!(cfg.scanner.top_n, 3);
        assert_eq!(cfg.sources.security.len(), 2);
        assert_eq!(cfg.filters.security_gates[0].reject_if, Comparator::GreaterThan);
        assert_eq!(cfg.fallback_threshold("solsniffer"), Some(61.0));
        assert_eq!(cfg.scoring.scale, ScoreScale::Log);
    }

    #[test]
    fn test_load_missing_file() {
        assert!(AppConfig::load("/nonexistent/scout/config.toml").is_err());
    }

    #[test]
    fn test_comparator_boundary_never_rejects() {
        assert!(!Comparator::LessThan.rejects(61.0, 61.0));
        assert!(!Comparator::GreaterThan.rejects(55.0, 55.0));
        assert!(Comparator::LessThan.rejects(60.9, 61.0));
        assert!(Comparator::GreaterThan.rejects(100.0, 55.0));
    }

    #[test]
    fn test_retry_delay_is_capped() {
        let p = RetryPolicy {
            max_attempts: 20,
            base_delay_ms: 500,
            max_delay_ms: 5_000,
            timeout_ms: 1_000,
        };
        assert_eq!(p.delay_for(1), Duration::ZERO);
        assert_eq!(p.delay_for(2), Duration::from_millis(500));
        assert_eq!(p.delay_for(3), Duration::from_millis(1_000));
        assert_eq!(p.delay_for(4), Duration::from_millis(2_000));
        assert_eq!(p.delay_for(10), Duration::from_millis(5_000));
        assert_eq!(p.delay_for(60), Duration::from_millis(5_000));
    }

    #[test]
    fn test_rejects_mismatched_comparator() {
        let bad = SAMPLE.replacen("reject_if = \">\"", "reject_if = \"<\"", 1);
        let err = AppConfig::from_toml_str(&bad).unwrap_err();
        assert!(format!("{err:#}").contains("reject_if must be '>'"));
    }

    #[test]
    fn test_rejects_unknown_gate_source() {
        let mut cfg = sample();
        cfg.filters.security_gates[0].source = "nope".to_string();
        assert!(matches!(cfg.validate(), Err(ScannerError::Config(_))));
    }

    #[test]
    fn test_higher_is_better_source_needs_gate() {
        let mut cfg = sample();
        cfg.filters.security_gates.retain(|g| g.source != "solsniffer");
        let err = cfg.validate().unwrap_err().to_string();
        assert!(err.contains("needs exactly one gate"));
    }

    #[test]
    fn test_rejects_unsorted_tiers() {
        let mut cfg = sample();
        cfg.scoring.age_tiers.cuts.reverse();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_rejects_quality_filter_without_source() {
        let mut cfg = sample();
        cfg.sources.auxiliary.retain(|a| a.kind != AuxiliaryKind::SocialPresence);
        let err = cfg.validate().unwrap_err().to_string();
        assert!(err.contains("social_presence"));
    }

    #[test]
    fn test_rejects_zero_concurrency() {
        let mut cfg = sample();
        cfg.scanner.max_concurrency = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_direction_risk() {
        assert_eq!(ScoreDirection::LowerIsBetter.risk(40.0), 40.0);
        assert_eq!(ScoreDirection::HigherIsBetter.risk(70.0), 30.0);
    }

    #[test]
    fn test_every_metric_name_deserializes() {
        #[derive(Deserialize)]
        struct Probe {
            metric: FilterMetric,
        }
        for metric in FilterMetric::ALL {
            let parsed: Probe = toml::from_str(&format!("metric = \"{metric}\"")).unwrap();
            assert_eq!(parsed.metric, metric, "{metric}");
        }
    }

    #[test]
    fn test_shipped_config_loads_from_disk() {
        let cfg = AppConfig::load(concat!(env!("CARGO_MANIFEST_DIR"), "/config.toml")).unwrap();
        let metrics: Vec<_> = cfg.filters.quality.iter().map(|q| q.metric).collect();
        assert!(metrics.contains(&FilterMetric::Volume24hUsd));
        assert!(metrics.contains(&FilterMetric::TopHolderPct));
        assert!(metrics.contains(&FilterMetric::DumpScore));
    }

    #[test]
    fn test_holder_metric_needs_security_source() {
        let mut cfg = sample();
        cfg.sources.security.clear();
        cfg.filters.security_gates.clear();
        let err = cfg.validate().unwrap_err().to_string();
        assert!(err.contains("no security source"), "{err}");
    }

    #[test]
    fn test_resolve_env() {
        std::env::set_var("TOKEN_SCOUT_TEST_SECRET", "s3cret");
        assert_eq!(AppConfig::resolve_env("TOKEN_SCOUT_TEST_SECRET").unwrap(), "s3cret");
        let err = AppConfig::resolve_env("TOKEN_SCOUT_SURELY_UNSET").unwrap_err();
        assert!(err.to_string().contains("TOKEN_SCOUT_SURELY_UNSET"));
    }
}
