//! Composite scoring and tier tags for qualified records.
//!
//! `score = liquidity_weight * f(liquidity) + volume_weight * f(volume)`
//! where `f` is the configured scale. Tiers come from configured cut
//! points. Everything here is a pure function of the record and the
//! configuration.

use chrono::{DateTime, SubsecRound, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::{AppConfig, TierTable};
use crate::types::{
    ChainResult, EnrichedRecord, MetricsSnapshot, QualifiedToken, ScannerError, ScoreCard, Tier,
};

pub struct ScoringEngine {
    config: Arc<AppConfig>,
}

impl ScoringEngine {
    pub fn new(config: Arc<AppConfig>) -> Self {
        Self { config }
    }

    /// Score a record that passed the filter chain.
    pub fn score(&self, record: &EnrichedRecord) -> ScoreCard {
        let sc = &self.config.scoring;
        let (liquidity, volume, cap) = record
            .market()
            .map(|m| (m.liquidity_usd, m.volume_24h_usd, m.market_cap_usd))
            .unwrap_or_default();

        let value = sc.liquidity_weight * sc.scale.apply(liquidity)
            + sc.volume_weight * sc.scale.apply(volume);

        ScoreCard {
            value,
            age_tier: tier(&sc.age_tiers, record.age_minutes),
            cap_tier: tier(&sc.cap_tiers, cap),
            risk_tier: tier(&sc.risk_tiers, self.worst_risk(record)),
        }
    }

    /// Worst normalized security risk (0 = safest, 100 = riskiest).
    fn worst_risk(&self, record: &EnrichedRecord) -> f64 {
        record
            .security
            .iter()
            .filter_map(|sub| {
                let direction = self.config.security_source(&sub.source)?.direction;
                sub.value().map(|r| direction.risk(r.score))
            })
            .fold(0.0, f64::max)
    }

    /// Build the persisted token for a passing record.
    ///
    /// `qualified_at` is truncated to microseconds, the resolution every
    /// sink ranks on. A non-finite score is refused.
    pub fn qualify(
        &self,
        record: &EnrichedRecord,
        chain: &ChainResult,
        cycle_id: uuid::Uuid,
        qualified_at: DateTime<Utc>,
    ) -> Result<QualifiedToken, ScannerError> {
        let card = self.score(record);
        if !card.value.is_finite() {
            return Err(ScannerError::InvalidScore(format!(
                "{} scored {}",
                record.candidate.id, card.value
            )));
        }
        let market = record.market();
        let security_scores: BTreeMap<String, f64> = record
            .security
            .iter()
            .filter_map(|s| s.value().map(|r| (s.source.clone(), r.score)))
            .collect();

        Ok(QualifiedToken {
            id: record.candidate.id.clone(),
            symbol: record.candidate.origin.symbol.clone(),
            origin: record.candidate.origin.platform.clone(),
            metrics: MetricsSnapshot {
                price_usd: market.map(|m| m.price_usd).unwrap_or_default(),
                liquidity_usd: market.map(|m| m.liquidity_usd).unwrap_or_default(),
                volume_24h_usd: market.map(|m| m.volume_24h_usd).unwrap_or_default(),
                market_cap_usd: market.map(|m| m.market_cap_usd).unwrap_or_default(),
                age_minutes: record.age_minutes,
                security_scores,
            },
            age_tier: card.age_tier,
            cap_tier: card.cap_tier,
            risk_tier: card.risk_tier,
            score: card.value,
            trail: chain.trail.clone(),
            qualified_at: qualified_at.trunc_subsecs(6),
            cycle_id,
            trading_ready: false,
        })
    }
}

/// First band whose exclusive upper bound exceeds `value`, else overflow.
pub fn tier(table: &TierTable, value: f64) -> Tier {
    table
        .cuts
        .iter()
        .enumerate()
        .find(|(_, cut)| value < cut.upper)
        .map(|(rank, cut)| Tier {
            label: cut.label.clone(),
            rank,
        })
        .unwrap_or_else(|| Tier {
            label: table.overflow.clone(),
            rank: table.cuts.len(),
        })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
