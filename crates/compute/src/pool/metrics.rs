use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use umbrella_core::StreamKind;

/// Operational counters for the analysis pool.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PoolMetrics {
    /// Successful analyses by stream kind.
    pub completed: HashMap<StreamKind, u64>,
    /// Failed analyses by stream kind (errors, panics, closed pool).
    pub failed: HashMap<StreamKind, u64>,
    /// Mean time spent waiting for admission plus running, by stream kind.
    pub avg_duration: HashMap<StreamKind, Duration>,
    pub last_completed: Option<DateTime<Utc>>,
}

impl PoolMetrics {
    /// Record one finished submission.
    pub fn record(&mut self, kind: StreamKind, duration: Duration, ok: bool) {
        let bucket = if ok { &mut self.completed } else { &mut self.failed };
        *bucket.entry(kind).or_default() += 1;
        self.last_completed = Some(Utc::now());

        let count = self.completed.get(&kind).copied().unwrap_or(0)
            + self.failed.get(&kind).copied().unwrap_or(0);
        let prev_avg = self.avg_duration.get(&kind).copied().unwrap_or_default();

        // Incremental mean: new_avg = prev_avg + (duration - prev_avg) / count
        let new_avg = if count == 1 {
            duration
        } else {
            let prev_nanos = prev_avg.as_nanos() as f64;
            let cur_nanos = duration.as_nanos() as f64;
            let avg_nanos = prev_nanos + (cur_nanos - prev_nanos) / count as f64;
            Duration::from_nanos(avg_nanos as u64)
        };
        self.avg_duration.insert(kind, new_avg);
    }

    pub fn total_completed(&self) -> u64 {
        self.completed.values().sum()
    }

    pub fn total_failed(&self) -> u64 {
        self.failed.values().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_single_execution() {
        let mut m = PoolMetrics::default();
        m.record(StreamKind::Genetic, Duration::from_millis(100), true);

        assert_eq!(m.completed[&StreamKind::Genetic], 1);
        assert!(m.last_completed.is_some());
        assert_eq!(m.avg_duration[&StreamKind::Genetic], Duration::from_millis(100));
    }

    #[test]
    fn failures_share_the_average() {
        let mut m = PoolMetrics::default();
        m.record(StreamKind::Physical, Duration::from_millis(100), true);
        m.record(StreamKind::Physical, Duration::from_millis(200), false);

        assert_eq!(m.total_completed(), 1);
        assert_eq!(m.total_failed(), 1);
        let avg = m.avg_duration[&StreamKind::Physical].as_millis();
        assert!((140..=160).contains(&avg), "expected ~150ms, got {}ms", avg);
    }

    #[test]
    fn default_metrics() {
        let m = PoolMetrics::default();
        assert_eq!(m.total_completed(), 0);
        assert!(m.last_completed.is_none());
    }
}
