//! Enrichment aggregator.
//!
//! For one candidate, queries every configured source concurrently, runs
//! each call through its role's retry policy and resolves exhausted calls
//! with that role's fallback:
//!
//! - market data: drop the candidate (no fabricated market data)
//! - security, lower is better: worst case, 100
//! - security, higher is better: the threshold of that source's gate
//! - auxiliary: drop the candidate
//!
//! One audit event (target `audit`) is emitted per source outcome.

use chrono::Utc;
use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, info};

use super::retry::with_retry;
use crate::config::{AppConfig, RetryPolicy, ScoreDirection};
use crate::sources::{AuxiliarySource, SecurityScoreSource, SourceSet};
use crate::types::{
    AuxiliaryKind, AuxiliaryRecord, AuxiliaryReport, Candidate, DropReason, EnrichedRecord,
    Enrichment, MarketSnapshot, Resolution, ScannerError, SecurityReport, SourceError,
    SourceRole, SubRecord,
};

/// Worst-case score substituted for an exhausted lower-is-better source.
const LOWER_IS_BETTER_FALLBACK: f64 = 100.0;

struct SecurityPlan {
    id: String,
    direction: ScoreDirection,
    retry: RetryPolicy,
    fallback: f64,
    client: Arc<dyn SecurityScoreSource>,
}

struct AuxiliaryPlan {
    id: String,
    kind: AuxiliaryKind,
    retry: RetryPolicy,
    client: Arc<dyn AuxiliarySource>,
}

/// Builds `EnrichedRecord`s from the configured sources.
pub struct EnrichmentAggregator {
    config: Arc<AppConfig>,
    sources: SourceSet,
    security: Vec<SecurityPlan>,
    auxiliary: Vec<AuxiliaryPlan>,
}

impl EnrichmentAggregator {
    /// Pair every configured source id with its client. A configured id
    /// without a client is a wiring error.
    pub fn new(config: Arc<AppConfig>, sources: SourceSet) -> Result<Self, ScannerError> {
        let mut security = Vec::new();
        for src in &config.sources.security {
            let client = sources.security.get(&src.id).cloned().ok_or_else(|| {
                ScannerError::Config(format!("no client wired for security source '{}'", src.id))
            })?;
            let fallback = match src.direction {
                ScoreDirection::LowerIsBetter => LOWER_IS_BETTER_FALLBACK,
                ScoreDirection::HigherIsBetter => {
                    config.fallback_threshold(&src.id).ok_or_else(|| {
                        ScannerError::Config(format!(
                            "higher-is-better source '{}' has no gate threshold",
                            src.id
                        ))
                    })?
                }
            };
            security.push(SecurityPlan {
                id: src.id.clone(),
                direction: src.direction,
                retry: src.retry.clone(),
                fallback,
                client,
            });
        }

        let mut auxiliary = Vec::new();
        for src in &config.sources.auxiliary {
            let client = sources.auxiliary.get(&src.id).cloned().ok_or_else(|| {
                ScannerError::Config(format!("no client wired for auxiliary source '{}'", src.id))
            })?;
            auxiliary.push(AuxiliaryPlan {
                id: src.id.clone(),
                kind: src.kind,
                retry: src.retry.clone(),
                client,
            });
        }

        Ok(Self {
            config,
            sources,
            security,
            auxiliary,
        })
    }

    /// Enrich one candidate. Waits for every source to settle.
    pub async fn enrich(&self, candidate: &Candidate) -> Enrichment {
        let (market, security, auxiliary) = tokio::join!(
            self.fetch_market(candidate),
            join_all(self.security.iter().map(|p| self.fetch_security(p, candidate))),
            join_all(self.auxiliary.iter().map(|p| self.fetch_auxiliary(p, candidate))),
        );

        if let Resolution::Dropped { reason } = &market.resolution {
            return Enrichment::Dropped {
                candidate: candidate.clone(),
                reason: DropReason {
                    source: market.source.clone(),
                    role: market.role,
                    reason: reason.clone(),
                },
            };
        }

        if let Some(dropped) = auxiliary.iter().find(|a| a.record.resolution.is_dropped()) {
            let reason = match &dropped.record.resolution {
                Resolution::Dropped { reason } => reason.clone(),
                _ => String::new(),
            };
            return Enrichment::Dropped {
                candidate: candidate.clone(),
                reason: DropReason {
                    source: dropped.record.source.clone(),
                    role: SourceRole::Auxiliary,
                    reason,
                },
            };
        }

        let fetched_at = Utc::now();
        let age_minutes = market
            .value()
            .map(|m| ((fetched_at - m.pair_created_at).num_seconds() as f64 / 60.0).max(0.0))
            .unwrap_or(0.0);

        debug!(candidate = %candidate.id, age_minutes, "Candidate enriched");

        Enrichment::Enriched(Box::new(EnrichedRecord {
            candidate: candidate.clone(),
            fetched_at,
            age_minutes,
            market,
            security,
            auxiliary,
        }))
    }

    async fn fetch_market(&self, candidate: &Candidate) -> SubRecord<MarketSnapshot> {
        let policy = &self.config.sources.market_data;
        let client = &self.sources.market;
        let out = with_retry(policy, "market_data", move || async move {
            let snapshot = client.market(candidate).await?;
            check_market(&snapshot)?;
            Ok::<_, SourceError>(snapshot)
        })
        .await;

        let resolution = match out.result {
            Ok(value) => Resolution::Value { value },
            Err(e) => Resolution::Dropped {
                reason: format!("market data unavailable after {} attempts: {e}", out.attempts),
            },
        };
        audit(candidate, "market_data", SourceRole::MarketData, out.attempts, &resolution);

        SubRecord {
            source: "market_data".to_string(),
            role: SourceRole::MarketData,
            attempts: out.attempts,
            resolution,
        }
    }

    async fn fetch_security(
        &self,
        plan: &SecurityPlan,
        candidate: &Candidate,
    ) -> SubRecord<SecurityReport> {
        let out = with_retry(&plan.retry, &plan.id, move || async move {
            let report = plan.client.report(candidate).await?;
            if !report.score.is_finite() || !(0.0..=100.0).contains(&report.score) {
                return Err(SourceError::Malformed(format!(
                    "score {} outside 0–100",
                    report.score
                )));
            }
            if let Some(h) = &report.holders {
                for (name, v) in h.values() {
                    if !v.is_finite() || !(0.0..=100.0).contains(&v) {
                        return Err(SourceError::Malformed(format!("{name} {v} outside 0–100")));
                    }
                }
            }
            Ok::<SecurityReport, SourceError>(report)
        })
        .await;

        let role = plan.direction.role();
        let resolution = match out.result {
            Ok(value) => Resolution::Value { value },
            Err(e) => Resolution::FallbackApplied {
                value: SecurityReport {
                    score: plan.fallback,
                    flags: Vec::new(),
                    holders: None,
                },
                reason: format!(
                    "{} failed after {} attempts ({e}); using fallback score {}",
                    plan.id, out.attempts, plan.fallback
                ),
            },
        };
        audit(candidate, &plan.id, role, out.attempts, &resolution);

        SubRecord {
            source: plan.id.clone(),
            role,
            attempts: out.attempts,
            resolution,
        }
    }

    async fn fetch_auxiliary(&self, plan: &AuxiliaryPlan, candidate: &Candidate) -> AuxiliaryRecord {
        let out = with_retry(&plan.retry, &plan.id, move || async move {
            let report = plan.client.validate(candidate).await?;
            if !report.metric.is_finite() || report.metric < 0.0 {
                return Err(SourceError::Malformed(format!("metric {}", report.metric)));
            }
            Ok::<AuxiliaryReport, SourceError>(report)
        })
        .await;

        let resolution = match out.result {
            Ok(value) => Resolution::Value { value },
            Err(e) => Resolution::Dropped {
                reason: format!("{} failed after {} attempts: {e}", plan.id, out.attempts),
            },
        };
        audit(candidate, &plan.id, SourceRole::Auxiliary, out.attempts, &resolution);

        AuxiliaryRecord {
            kind: plan.kind,
            record: SubRecord {
                source: plan.id.clone(),
                role: SourceRole::Auxiliary,
                attempts: out.attempts,
                resolution,
            },
        }
    }
}

fn check_market(m: &MarketSnapshot) -> Result<(), SourceError> {
    let fields = [
        ("price_usd", m.price_usd),
        ("liquidity_usd", m.liquidity_usd),
        ("volume_24h_usd", m.volume_24h_usd),
        ("market_cap_usd", m.market_cap_usd),
    ];
    for (name, v) in fields {
        if !v.is_finite() || v < 0.0 {
            return Err(SourceError::Malformed(format!("{name} = {v}")));
        }
    }
    Ok(())
}

fn audit<T>(
    candidate: &Candidate,
    source: &str,
    role: SourceRole,
    attempts: u32,
    resolution: &Resolution<T>,
) {
    let reason = match resolution {
        Resolution::Value { .. } => "",
        Resolution::FallbackApplied { reason, .. } | Resolution::Dropped { reason } => reason.as_str(),
    };
    info!(
        target: "audit",
        candidate = %candidate.id,
        source,
        role = %role,
        attempts,
        outcome = resolution.label(),
        reason,
        "source outcome"
    );
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
