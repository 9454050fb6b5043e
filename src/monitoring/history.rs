//! Bounded per-instance metric history.

use std::collections::{BTreeMap, VecDeque};

use dashmap::DashMap;
use serde::Serialize;

/// Metrics sampled for each instance every cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Memory,
    Cpu,
    Disk,
    BytesIn,
    BytesOut,
    LatencyMs,
    ErrorRate,
}

impl MetricKind {
    pub const ALL: [MetricKind; 7] = [
        MetricKind::Memory,
        MetricKind::Cpu,
        MetricKind::Disk,
        MetricKind::BytesIn,
        MetricKind::BytesOut,
        MetricKind::LatencyMs,
        MetricKind::ErrorRate,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MetricPoint {
    /// Unix millis.
    pub timestamp: u64,
    pub value: f64,
}

/// FIFO series per (instance, metric), each capped at `retained` points.
#[derive(Debug)]
pub struct MetricHistory {
    retained: usize,
    series: DashMap<String, BTreeMap<MetricKind, VecDeque<MetricPoint>>>,
}

impl MetricHistory {
    pub fn new(retained: usize) -> Self {
        Self {
            retained: retained.max(1),
            series: DashMap::new(),
        }
    }

    pub fn retained(&self) -> usize {
        self.retained
    }

    /// Append a point, dropping the oldest once the cap is exceeded.
    pub fn push(&self, id: &str, kind: MetricKind, point: MetricPoint) {
        let mut metrics = self.series.entry(id.to_string()).or_default();
        let series = metrics.entry(kind).or_default();
        series.push_back(point);
        while series.len() > self.retained {
            series.pop_front();
        }
    }

    /// Points of one series, oldest first.
    pub fn series(&self, id: &str, kind: MetricKind) -> Vec<MetricPoint> {
        self.series
            .get(id)
            .and_then(|metrics| metrics.get(&kind).map(|s| s.iter().copied().collect()))
            .unwrap_or_default()
    }

    /// Every series of one instance.
    pub fn instance(&self, id: &str) -> Option<BTreeMap<MetricKind, Vec<MetricPoint>>> {
        self.series.get(id).map(|metrics| {
            metrics
                .iter()
                .map(|(kind, series)| (*kind, series.iter().copied().collect()))
                .collect()
        })
    }

    pub fn forget(&self, ids: &[String]) {
        for id in ids {
            self.series.remove(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(timestamp: u64) -> MetricPoint {
        MetricPoint {
            timestamp,
            value: timestamp as f64,
        }
    }

    #[test]
    fn test_cap_drops_oldest() {
        let history = MetricHistory::new(3);
        for t in 0..5 {
            history.push("a", MetricKind::Cpu, point(t));
        }
        let stamps: Vec<_> = history.series("a", MetricKind::Cpu).iter().map(|p| p.timestamp).collect();
        assert_eq!(stamps, vec![2, 3, 4]);
        assert!(history.series("a", MetricKind::Memory).is_empty());
    }

    #[test]
    fn test_forget() {
        let history = MetricHistory::new(10);
        history.push("a", MetricKind::Disk, point(1));
        assert!(history.instance("a").is_some());
        history.forget(&["a".to_string()]);
        assert!(history.instance("a").is_none());
    }
}
