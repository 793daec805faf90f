//! Ordered filter chain.
//!
//! Stages, in fixed precedence:
//!
//! 1. blacklist (critical): listed ids fail immediately
//! 2. whitelist (override): listed ids pass immediately
//! 3. security gates, then scam patterns (critical): first failure ends the chain
//! 4. quality filters: failures mark the verdict but evaluation continues
//! 5. special filters: annotations only, never change the verdict
//!
//! Every threshold comparison goes through the filter's own `reject_if`
//! comparator; a value exactly on the threshold is never rejected.

use std::sync::Arc;
use tracing::info;

use crate::config::{AppConfig, Comparator, FilterMetric, QualityFilter, SecurityGate, SpecialFilter};
use crate::types::{
    AuxiliaryKind, ChainResult, ChainVerdict, EnrichedRecord, FilterClass, FilterOutcome, Verdict,
};

/// Evaluates enriched records against the configured filters.
pub struct FilterChain {
    config: Arc<AppConfig>,
}

impl FilterChain {
    pub fn new(config: Arc<AppConfig>) -> Self {
        Self { config }
    }

    /// Run the chain and emit one audit event for the verdict.
    pub fn apply(&self, record: &EnrichedRecord) -> ChainResult {
        let result = self.evaluate(record);
        let failed_at = result.first_failure().map(|o| o.filter_id.as_str()).unwrap_or("");
        info!(
            target: "audit",
            candidate = %record.candidate.id,
            verdict = ?result.verdict,
            failed_at,
            evaluated = result.trail.len(),
            fallback = record.has_fallback(),
            "filter chain verdict"
        );
        result
    }

    fn evaluate(&self, record: &EnrichedRecord) -> ChainResult {
        let filters = &self.config.filters;
        let id = &record.candidate.id;
        let mut trail = Vec::new();

        // 1. Blacklist strictly precedes everything, whitelist included.
        if filters.blacklist.iter().any(|b| b == id) {
            trail.push(FilterOutcome::new(
                "blacklist",
                FilterClass::Critical,
                Verdict::Fail,
                "identity is blacklisted",
            ));
            return fail(trail);
        }
        trail.push(FilterOutcome::new(
            "blacklist",
            FilterClass::Critical,
            Verdict::Pass,
            "not blacklisted",
        ));

        // 2. Whitelist.
        if filters.whitelist.iter().any(|w| w == id) {
            trail.push(FilterOutcome::new(
                "whitelist",
                FilterClass::Override,
                Verdict::Pass,
                "identity is whitelisted",
            ));
            return ChainResult {
                verdict: ChainVerdict::Pass,
                trail,
            };
        }

        // 3. Critical gates.
        for gate in &filters.security_gates {
            let outcome = security_gate(gate, record);
            let failed = outcome.verdict == Verdict::Fail;
            trail.push(outcome);
            if failed {
                return fail(trail);
            }
        }

        let scam = self.scam_check(record);
        let failed = scam.verdict == Verdict::Fail;
        trail.push(scam);
        if failed {
            return fail(trail);
        }

        // 4. Quality filters: continue and record.
        let mut verdict = ChainVerdict::Pass;
        for q in &filters.quality {
            let outcome = quality_filter(q, record);
            if outcome.verdict == Verdict::Fail {
                verdict = ChainVerdict::Fail;
            }
            trail.push(outcome);
        }

        // 5. Special filters.
        for sp in &filters.special {
            trail.push(special_filter(sp, record));
        }

        ChainResult { verdict, trail }
    }

    fn scam_check(&self, record: &EnrichedRecord) -> FilterOutcome {
        let scam = &self.config.filters.scam;
        if !scam.enabled {
            return FilterOutcome::new("scam", FilterClass::Critical, Verdict::Skipped, "disabled");
        }

        for sub in &record.security {
            let Some(report) = sub.value() else { continue };
            if let Some(flag) = report.flags.iter().find(|f| scam.flag_patterns.contains(*f)) {
                return FilterOutcome::new(
                    "scam",
                    FilterClass::Critical,
                    Verdict::Fail,
                    format!("{} raised '{flag}'", sub.source),
                );
            }
        }

        let origin = &record.candidate.origin;
        let names = [origin.symbol.as_deref(), origin.name.as_deref()];
        for text in names.into_iter().flatten() {
            let lower = text.to_lowercase();
            if let Some(p) = scam
                .name_patterns
                .iter()
                .find(|p| lower.contains(&p.to_lowercase()))
            {
                return FilterOutcome::new(
                    "scam",
                    FilterClass::Critical,
                    Verdict::Fail,
                    format!("'{text}' matches scam pattern '{p}'"),
                );
            }
        }

        FilterOutcome::new("scam", FilterClass::Critical, Verdict::Pass, "no scam patterns")
    }
}

fn fail(trail: Vec<FilterOutcome>) -> ChainResult {
    ChainResult {
        verdict: ChainVerdict::Fail,
        trail,
    }
}

fn security_gate(gate: &SecurityGate, record: &EnrichedRecord) -> FilterOutcome {
    if !gate.enabled {
        return FilterOutcome::new(&gate.id, FilterClass::Critical, Verdict::Skipped, "disabled");
    }
    let Some(sub) = record.security(&gate.source) else {
        return FilterOutcome::new(
            &gate.id,
            FilterClass::Critical,
            Verdict::Fail,
            format!("{}: metric unavailable", gate.source),
        );
    };
    let fallback = sub.resolution.is_fallback();
    let Some(report) = sub.value() else {
        return FilterOutcome::new(
            &gate.id,
            FilterClass::Critical,
            Verdict::Fail,
            format!("{}: metric unavailable", gate.source),
        );
    };

    threshold_outcome(
        &gate.id,
        FilterClass::Critical,
        &gate.source,
        report.score,
        gate.reject_if,
        gate.threshold,
    )
    .with_fallback(fallback)
}

fn quality_filter(q: &QualityFilter, record: &EnrichedRecord) -> FilterOutcome {
    if !q.enabled {
        return FilterOutcome::new(&q.id, FilterClass::Quality, Verdict::Skipped, "disabled");
    }
    match metric_value(q.metric, record) {
        None => FilterOutcome::new(
            &q.id,
            FilterClass::Quality,
            Verdict::Fail,
            format!("{}: metric unavailable", q.metric),
        ),
        Some((value, fallback)) => threshold_outcome(
            &q.id,
            FilterClass::Quality,
            &q.metric.to_string(),
            value,
            q.reject_if,
            q.threshold,
        )
        .with_fallback(fallback),
    }
}

fn threshold_outcome(
    id: &str,
    class: FilterClass,
    what: &str,
    value: f64,
    reject_if: Comparator,
    threshold: f64,
) -> FilterOutcome {
    if reject_if.rejects(value, threshold) {
        FilterOutcome::new(
            id,
            class,
            Verdict::Fail,
            format!("{what} {value:.2} {reject_if} {threshold:.2}"),
        )
    } else {
        FilterOutcome::new(
            id,
            class,
            Verdict::Pass,
            format!("{what} {value:.2} ok (reject if {reject_if} {threshold:.2})"),
        )
    }
}

/// Metric value plus whether it came from a fallback.
fn metric_value(metric: FilterMetric, record: &EnrichedRecord) -> Option<(f64, bool)> {
    let market = || {
        record
            .market()
            .map(|m| (m, record.market.resolution.is_fallback()))
    };
    let aux = |kind: AuxiliaryKind| {
        record
            .auxiliary(kind)
            .and_then(|sub| sub.value().map(|r| (r.metric, sub.resolution.is_fallback())))
    };

    match metric {
        FilterMetric::LiquidityUsd => market().map(|(m, f)| (m.liquidity_usd, f)),
        FilterMetric::Volume24hUsd => market().map(|(m, f)| (m.volume_24h_usd, f)),
        FilterMetric::MarketCapUsd => market().map(|(m, f)| (m.market_cap_usd, f)),
        FilterMetric::PriceChange24hPct => market().map(|(m, f)| (m.price_change_24h_pct, f)),
        FilterMetric::AgeMinutes => market().map(|(_, f)| (record.age_minutes, f)),
        FilterMetric::LockedLiquidityPct => aux(AuxiliaryKind::LiquidityLock),
        FilterMetric::SocialFollowers => aux(AuxiliaryKind::SocialPresence),
        FilterMetric::SocialLinks => Some((record.candidate.presence.count() as f64, false)),
        FilterMetric::TopHolderPct => record.holders().map(|h| (h.top_holder_pct, false)),
        FilterMetric::DumpScore => record.holders().map(|h| (h.dump_score, false)),
        FilterMetric::DevWalletActivity => record.holders().map(|h| (h.dev_wallet_activity, false)),
    }
}

fn special_filter(sp: &SpecialFilter, record: &EnrichedRecord) -> FilterOutcome {
    if !sp.enabled() {
        return FilterOutcome::new(sp.id(), FilterClass::Special, Verdict::Skipped, "disabled");
    }
    let note = |reason: String| FilterOutcome::new(sp.id(), FilterClass::Special, Verdict::Annotated, reason);

    let Some(m) = record.market() else {
        return note("no market data".to_string());
    };

    match sp {
        SpecialFilter::OriginAnalysis {
            origins,
            max_cap_to_liquidity,
            ..
        } => {
            let platform = &record.candidate.origin.platform;
            if !origins.iter().any(|o| o.eq_ignore_ascii_case(platform)) {
                return note(format!("origin '{platform}' not analysed"));
            }
            if m.liquidity_usd <= 0.0 {
                return note(format!("{platform}: no liquidity, ratio undefined"));
            }
            let ratio = m.market_cap_usd / m.liquidity_usd;
            let health = if ratio > *max_cap_to_liquidity {
                "overextended"
            } else {
                "healthy"
            };
            note(format!(
                "{platform}: cap/liquidity {ratio:.2} {health} (max {max_cap_to_liquidity:.2})"
            ))
        }
        SpecialFilter::Trend {
            min_price_change_pct,
            min_volume_usd,
            ..
        } => {
            if m.price_change_24h_pct >= *min_price_change_pct && m.volume_24h_usd >= *min_volume_usd {
                note(format!(
                    "momentum: {:+.1}% on ${:.0} volume",
                    m.price_change_24h_pct, m.volume_24h_usd
                ))
            } else {
                note("no momentum".to_string())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
