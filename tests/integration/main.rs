//! End-to-end pipeline tests against scripted in-memory sources.

mod mock_sources;

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use mock_sources::*;
use token_scout::config::AppConfig;
use token_scout::engine::enricher::EnrichmentAggregator;
use token_scout::engine::filters::FilterChain;
use token_scout::engine::scheduler::{ScanScheduler, SchedulerState};
use token_scout::storage::sqlite::SqliteSink;
use token_scout::storage::{MemorySink, QualifiedSink};
use token_scout::types::*;

fn scheduler_with(cfg: AppConfig, world: &MockWorld, sink: Arc<dyn QualifiedSink>) -> Arc<ScanScheduler> {
    Arc::new(ScanScheduler::new(Arc::new(cfg), world.feed.clone(), world.sources(), sink).unwrap())
}

fn scheduler(world: &MockWorld) -> Arc<ScanScheduler> {
    scheduler_with(test_config(), world, Arc::new(MemorySink::new()))
}

fn live() -> (watch::Sender<bool>, watch::Receiver<bool>) {
    watch::channel(false)
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn scenario_a_healthy_candidate_is_qualified_and_ranked() {
    let world = MockWorld::new(&["alpha"]);
    let s = scheduler(&world);
    let (_tx, rx) = live();

    let report = s.clone().run_cycle(rx).await;
    assert_eq!(report.persisted, 1);
    assert_eq!(report.trading_ready, vec!["alpha".to_string()]);

    let token = s.sink().get("alpha").await.unwrap().unwrap();
    assert!(token.trading_ready);
    assert_eq!(token.metrics.security_scores["rugcheck"], 40.0);
    assert_eq!(token.metrics.security_scores["solsniffer"], 70.0);
    assert!(token.score > 0.0);
    assert!(token.trail.iter().all(|o| o.verdict != Verdict::Fail));
}

#[tokio::test]
async fn scenario_b_exhausted_security_source_rejects_with_fallback() {
    let world = MockWorld::new(&["beta"]);
    world
        .rugcheck
        .0
        .set("beta", Reply::Error(SourceError::Timeout(Duration::from_millis(5))));
    let cfg = Arc::new(test_config());

    let aggregator = EnrichmentAggregator::new(cfg.clone(), world.sources()).unwrap();
    let record = match aggregator.enrich(&candidate("beta")).await {
        Enrichment::Enriched(r) => r,
        Enrichment::Dropped { reason, .. } => panic!("unexpected drop: {reason}"),
    };
    assert_eq!(world.rugcheck.0.calls(), 3);
    assert_eq!(record.security("rugcheck").unwrap().value().unwrap().score, 100.0);

    let result = FilterChain::new(cfg.clone()).apply(&record);
    assert!(!result.passed());
    let failure = result.first_failure().unwrap();
    assert_eq!(failure.filter_id, "rugcheck_max");
    assert!(failure.fallback);
    assert_eq!(result.trail.last().unwrap().filter_id, "rugcheck_max");

    // Through the scheduler the candidate is never scored or persisted.
    let s = scheduler(&world);
    let (_tx, rx) = live();
    let report = s.clone().run_cycle(rx).await;
    assert_eq!(report.failed, 1);
    assert!(s.sink().get("beta").await.unwrap().is_none());
}

#[tokio::test]
async fn scenario_c_blacklist_precedes_whitelist() {
    let world = MockWorld::new(&["gamma"]);
    let mut cfg = test_config();
    cfg.filters.blacklist = vec!["gamma".into()];
    cfg.filters.whitelist = vec!["gamma".into()];
    let cfg = Arc::new(cfg);

    let aggregator = EnrichmentAggregator::new(cfg.clone(), world.sources()).unwrap();
    let Enrichment::Enriched(record) = aggregator.enrich(&candidate("gamma")).await else {
        panic!("expected enrichment");
    };
    let result = FilterChain::new(cfg).apply(&record);

    assert!(!result.passed());
    assert_eq!(result.trail.len(), 1);
    assert_eq!(result.trail[0].filter_id, "blacklist");
    assert!(result.trail.iter().all(|o| o.filter_id != "whitelist"));
}

// ---------------------------------------------------------------------------
// Failure policies and isolation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn higher_is_better_fallback_passes_on_boundary() {
    let world = MockWorld::new(&["delta"]);
    world
        .solsniffer
        .0
        .set("delta", Reply::Error(SourceError::Unavailable("503".into())));
    let s = scheduler(&world);
    let (_tx, rx) = live();

    let report = s.clone().run_cycle(rx).await;
    assert_eq!(report.persisted, 1);
    let token = s.sink().get("delta").await.unwrap().unwrap();
    assert_eq!(token.metrics.security_scores["solsniffer"], 61.0);
    assert!(token.trail.iter().any(|o| o.filter_id == "solsniffer_min" && o.fallback));
}

#[tokio::test]
async fn auxiliary_exhaustion_drops_only_that_candidate() {
    let world = MockWorld::new(&["ok", "nolock"]);
    world
        .lp_lock
        .0
        .set("nolock", Reply::Error(SourceError::RateLimited { retry_after: None }));
    let s = scheduler(&world);
    let (_tx, rx) = live();

    let report = s.clone().run_cycle(rx).await;
    assert_eq!(report.dropped, 1);
    assert_eq!(report.persisted, 1);
    assert!(s.sink().get("nolock").await.unwrap().is_none());
}

#[tokio::test]
async fn malformed_payload_is_not_retried() {
    let world = MockWorld::new(&["eps"]);
    world
        .market
        .0
        .set("eps", Reply::Error(SourceError::Malformed("truncated".into())));
    let s = scheduler(&world);
    let (_tx, rx) = live();

    let report = s.clone().run_cycle(rx).await;
    assert_eq!(report.dropped, 1);
    assert_eq!(world.market.0.calls(), 1);
}

#[tokio::test]
async fn panicking_source_is_isolated_to_its_candidate() {
    let world = MockWorld::new(&["one", "boom", "two"]);
    world.twitter.0.set("boom", Reply::Panic);
    let s = scheduler(&world);
    let (_tx, rx) = live();

    let report = s.clone().run_cycle(rx).await;
    assert_eq!(report.candidates, 3);
    assert_eq!(report.dropped, 1);
    assert_eq!(report.persisted, 2);
    assert_eq!(s.state(), SchedulerState::Idle);
}

// ---------------------------------------------------------------------------
// Ranking and lifecycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn trading_ready_set_follows_score_order() {
    let world = MockWorld::new(&["small", "large", "mid"]);
    world.market.0.set("small", Reply::Value(market(2_000.0, 600.0)));
    world.market.0.set("large", Reply::Value(market(90_000.0, 40_000.0)));
    world.market.0.set("mid", Reply::Value(market(20_000.0, 5_000.0)));
    let s = scheduler(&world);
    let (_tx, rx) = live();

    let report = s.clone().run_cycle(rx).await;
    assert_eq!(report.trading_ready, vec!["large".to_string(), "mid".to_string()]);
    assert!(!s.sink().get("small").await.unwrap().unwrap().trading_ready);

    let ranked = s.sink().ranked(10).await.unwrap();
    let ids: Vec<_> = ranked.iter().map(|t| t.id.as_str()).collect();
    assert_eq!(ids, vec!["large", "mid", "small"]);
}

#[tokio::test]
async fn later_failure_revokes_but_keeps_history() {
    let world = MockWorld::new(&["zeta"]);
    let s = scheduler(&world);

    let (_tx, rx) = live();
    s.clone().run_cycle(rx.clone()).await;
    assert!(s.sink().get("zeta").await.unwrap().is_some());

    world.market.0.set("zeta", Reply::Value(market(10.0, 800.0)));
    let report = s.clone().run_cycle(rx).await;

    assert_eq!(report.revoked, 1);
    assert!(s.sink().get("zeta").await.unwrap().is_none());
    assert_eq!(s.sink().history("zeta").await.unwrap().len(), 1);
}

#[tokio::test]
async fn repeated_cycles_supersede_snapshots() {
    let world = MockWorld::new(&["eta"]);
    let s = scheduler(&world);
    let (_tx, rx) = live();

    s.clone().run_cycle(rx.clone()).await;
    world.market.0.set("eta", Reply::Value(market(50_000.0, 800.0)));
    s.clone().run_cycle(rx).await;

    let history = s.sink().history("eta").await.unwrap();
    assert_eq!(history.len(), 2);
    let current = s.sink().get("eta").await.unwrap().unwrap();
    assert_eq!(current.metrics.liquidity_usd, 50_000.0);
    assert_ne!(history[0].cycle_id, history[1].cycle_id);
}

#[tokio::test]
async fn tick_is_skipped_while_cycle_runs() {
    let world = MockWorld::new(&["slow"]);
    let feed = Arc::new(MockFeed {
        candidates: std::sync::Mutex::new(vec![candidate("slow")]),
        delay: Duration::from_millis(150),
    });
    let s = Arc::new(
        ScanScheduler::new(
            Arc::new(test_config()),
            feed,
            world.sources(),
            Arc::new(MemorySink::new()),
        )
        .unwrap(),
    );
    let (_tx, rx) = live();

    let first = s.on_tick(rx.clone()).expect("first tick runs");
    assert!(s.on_tick(rx.clone()).is_none());
    let report = first.await.unwrap();

    assert_eq!(report.persisted, 1);
    let status = s.status().await;
    assert_eq!(status.ticks_skipped, 1);
    assert_eq!(status.cycles_started, 1);
}

#[tokio::test]
async fn sqlite_sink_runs_the_same_pipeline() {
    let world = MockWorld::new(&["a1", "a2", "a3"]);
    world.market.0.set("a1", Reply::Value(market(3_000.0, 900.0)));
    world.market.0.set("a3", Reply::Value(market(30_000.0, 9_000.0)));
    let sink = Arc::new(SqliteSink::connect("sqlite::memory:").await.unwrap());
    let s = scheduler_with(test_config(), &world, sink);
    let (_tx, rx) = live();

    let report = s.clone().run_cycle(rx).await;
    assert_eq!(report.persisted, 3);
    assert_eq!(report.trading_ready, vec!["a3".to_string(), "a2".to_string()]);
    assert_eq!(s.sink().count().await.unwrap(), 3);
}

// ---------------------------------------------------------------------------
// Concurrency and shutdown
// ---------------------------------------------------------------------------

fn numbered(prefix: &str, n: usize) -> Vec<String> {
    (0..n).map(|i| format!("{prefix}{i}")).collect()
}

#[tokio::test]
async fn in_flight_candidates_never_exceed_max_concurrency() {
    let ids = numbered("c", 20);
    let world = MockWorld::new(&ids.iter().map(String::as_str).collect::<Vec<_>>());
    let market = Arc::new(SlowMarket::new(Duration::from_millis(30)));
    let mut cfg = test_config();
    cfg.scanner.max_concurrency = 3;
    let s = Arc::new(
        ScanScheduler::new(
            Arc::new(cfg),
            world.feed.clone(),
            world.sources_with_market(market.clone()),
            Arc::new(MemorySink::new()),
        )
        .unwrap(),
    );
    let (_tx, rx) = live();

    let report = s.clone().run_cycle(rx).await;
    assert_eq!(report.candidates, 20);
    assert_eq!(report.persisted, 20);
    let peak = market.peak();
    assert!((2..=3).contains(&peak), "peak in flight was {peak}");
}

#[tokio::test]
async fn shutdown_aborts_cycle_after_grace_without_persisting() {
    let world = MockWorld::new(&["stuck1", "stuck2"]);
    let market = Arc::new(SlowMarket::new(Duration::from_secs(30)));
    let mut cfg = test_config();
    cfg.scanner.shutdown_grace_secs = 1;
    cfg.sources.market_data.timeout_ms = 60_000;
    let s = Arc::new(
        ScanScheduler::new(
            Arc::new(cfg),
            world.feed.clone(),
            world.sources_with_market(market.clone()),
            Arc::new(MemorySink::new()),
        )
        .unwrap(),
    );
    let (tx, rx) = live();
    let runner = tokio::spawn(s.clone().run(rx));

    // Wait until the first cycle is stuck on the market source.
    tokio::time::timeout(Duration::from_secs(5), async {
        while market.peak() == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("cycle never reached the market source");

    let started = std::time::Instant::now();
    tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(10), runner)
        .await
        .expect("run did not return after the grace period")
        .unwrap();

    assert!(started.elapsed() >= Duration::from_millis(900));
    assert_eq!(s.sink().count().await.unwrap(), 0);
    assert!(s.recent_cycles().await.is_empty());
}

#[tokio::test]
async fn concurrent_failures_never_leak_into_passing_trails() {
    let passing = numbered("pass", 6);
    let failing = numbered("fail", 6);
    let all: Vec<&str> = passing
        .iter()
        .zip(&failing)
        .flat_map(|(p, f)| [p.as_str(), f.as_str()])
        .collect();
    let world = MockWorld::new(&all);
    for id in &failing {
        world.market.0.set(id, Reply::Value(market(10.0, 5.0)));
        world.rugcheck.0.set(id, Reply::Value(security(50.0)));
    }
    let s = scheduler(&world);
    let (_tx, rx) = live();

    let report = s.clone().run_cycle(rx).await;
    assert_eq!(report.passed, 6);
    assert_eq!(report.failed, 6);

    let persisted = s.sink().ranked(100).await.unwrap();
    let mut ids: Vec<_> = persisted.iter().map(|t| t.id.clone()).collect();
    ids.sort();
    let mut expected = passing.clone();
    expected.sort();
    assert_eq!(ids, expected);
    for token in &persisted {
        assert!(
            token.trail.iter().all(|o| o.verdict != Verdict::Fail),
            "{} carries a failing outcome",
            token.id
        );
        assert_eq!(token.metrics.liquidity_usd, 5_000.0);
    }
}
