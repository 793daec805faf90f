//! Per-cycle reporting.
//!
//! Each finished cycle produces a `CycleReport`; the scheduler keeps the
//! most recent ones in a bounded `CycleLog` that the status API reads.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use tracing::info;

/// Summary of a single scan cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleReport {
    pub cycle_id: uuid::Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Candidates taken from the feed after dedupe and the per-cycle cap.
    pub candidates: usize,
    /// Feed entries collapsed because their identity repeated.
    pub duplicates: usize,
    pub enriched: usize,
    pub dropped: usize,
    pub passed: usize,
    pub failed: usize,
    pub persisted: usize,
    pub persist_failures: usize,
    pub revoked: usize,
    /// Candidates never started because shutdown was requested.
    pub cancelled: usize,
    pub trading_ready: Vec<String>,
    /// Set when the feed yielded nothing because its retries ran out.
    pub feed_error: Option<String>,
}

impl CycleReport {
    pub fn new(cycle_id: uuid::Uuid, started_at: DateTime<Utc>) -> Self {
        Self {
            cycle_id,
            started_at,
            finished_at: started_at,
            candidates: 0,
            duplicates: 0,
            enriched: 0,
            dropped: 0,
            passed: 0,
            failed: 0,
            persisted: 0,
            persist_failures: 0,
            revoked: 0,
            cancelled: 0,
            trading_ready: Vec::new(),
            feed_error: None,
        }
    }

    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }

    /// Log a one-line cycle summary.
    pub fn log(&self) {
        info!(
            cycle = %self.cycle_id,
            candidates = self.candidates,
            enriched = self.enriched,
            dropped = self.dropped,
            passed = self.passed,
            failed = self.failed,
            persisted = self.persisted,
            persist_failures = self.persist_failures,
            trading_ready = ?self.trading_ready,
            duration_ms = self.duration_ms(),
            "Cycle complete"
        );
    }
}

/// Ring buffer of the most recent cycle reports.
#[derive(Debug)]
pub struct CycleLog {
    capacity: usize,
    entries: VecDeque<CycleReport>,
}

impl CycleLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: VecDeque::new(),
        }
    }

    pub fn push(&mut self, report: CycleReport) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(report);
    }

    pub fn last(&self) -> Option<&CycleReport> {
        self.entries.back()
    }

    /// Reports, newest first.
    pub fn recent(&self) -> Vec<CycleReport> {
        self.entries.iter().rev().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_is_bounded_and_newest_first() {
        let mut log = CycleLog::new(2);
        let ids: Vec<_> = (0..3).map(|_| uuid::Uuid::new_v4()).collect();
        for id in &ids {
            log.push(CycleReport::new(*id, Utc::now()));
        }
        assert_eq!(log.len(), 2);
        let recent = log.recent();
        assert_eq!(recent[0].cycle_id, ids[2]);
        assert_eq!(recent[1].cycle_id, ids[1]);
        assert_eq!(log.last().unwrap().cycle_id, ids[2]);
    }

    #[test]
    fn test_zero_capacity_keeps_one() {
        let mut log = CycleLog::new(0);
        log.push(CycleReport::new(uuid::Uuid::new_v4(), Utc::now()));
        assert_eq!(log.len(), 1);
    }
}
