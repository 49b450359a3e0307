//! Advisory performance monitor for rule-store queries.
//!
//! Observations are recorded per query kind; latency over 1.5x the kind's
//! target emits a `tracing::warn!` alert. Rolling windows feed the tuning
//! recommendations. Everything here is advisory: nothing the monitor does
//! can alter a pipeline verdict.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Latency budget multiplier before an alert fires.
const ALERT_FACTOR: f64 = 1.5;

/// Observations retained per query kind.
const WINDOW_SIZE: usize = 64;

/// Which query shape produced an observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryKind {
    Comprehensive,
    Selective,
    Sourcing,
}

impl QueryKind {
    /// Latency target this kind is held to.
    pub fn latency_target(&self) -> Duration {
        match self {
            Self::Comprehensive => Duration::from_millis(200),
            Self::Selective => Duration::from_millis(50),
            Self::Sourcing => Duration::from_millis(100),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Comprehensive => "comprehensive",
            Self::Selective => "selective",
            Self::Sourcing => "sourcing",
        }
    }
}

/// One recorded query execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryObservation {
    pub kind: QueryKind,
    pub latency: Duration,
    pub result_count: usize,
    /// Fields the query filtered on.
    pub filter_fields: Vec<String>,
}

/// Tuning suggestions derived from the rolling windows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Recommendation {
    /// A field appears in filters often enough to deserve an index.
    AddIndex { field: String },
    /// Median result cardinality is high; callers should filter harder.
    NarrowResults { query_kind: QueryKind },
    /// The same query shape recurs often enough to cache.
    AddCache { query_kind: QueryKind },
}

/// Thresholds for the recommendation heuristics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorThresholds {
    /// Filter usages of a single field before AddIndex fires.
    pub index_usage: u64,
    /// Median result count before NarrowResults fires.
    pub median_results: usize,
    /// Observations of one kind in the window before AddCache fires.
    pub cache_frequency: usize,
}

impl Default for MonitorThresholds {
    fn default() -> Self {
        Self {
            index_usage: 20,
            median_results: 25,
            cache_frequency: 32,
        }
    }
}

#[derive(Debug, Default)]
struct MonitorWindows {
    /// Recent result counts per query kind.
    results: HashMap<QueryKind, VecDeque<usize>>,
    /// Total filter usages per field.
    field_usage: HashMap<String, u64>,
}

/// The monitor. Counters are lock-free; windows sit behind a std mutex
/// held only for short bookkeeping.
pub struct PerformanceMonitor {
    thresholds: MonitorThresholds,
    windows: Mutex<MonitorWindows>,
    queries_observed: AtomicU64,
    alerts_emitted: AtomicU64,
}

impl Default for PerformanceMonitor {
    fn default() -> Self {
        Self::new(MonitorThresholds::default())
    }
}

impl PerformanceMonitor {
    pub fn new(thresholds: MonitorThresholds) -> Self {
        Self {
            thresholds,
            windows: Mutex::new(MonitorWindows::default()),
            queries_observed: AtomicU64::new(0),
            alerts_emitted: AtomicU64::new(0),
        }
    }

    /// Record one query execution. May emit a latency alert.
    pub fn observe(&self, obs: QueryObservation) {
        self.queries_observed.fetch_add(1, Ordering::Relaxed);

        let target = obs.kind.latency_target();
        if obs.latency.as_secs_f64() > target.as_secs_f64() * ALERT_FACTOR {
            self.alerts_emitted.fetch_add(1, Ordering::Relaxed);
            warn!(
                query_kind = obs.kind.name(),
                latency_ms = obs.latency.as_millis() as u64,
                target_ms = target.as_millis() as u64,
                "query latency over target"
            );
        }

        let mut windows = self.windows.lock().expect("monitor lock poisoned");
        let window = windows.results.entry(obs.kind).or_default();
        if window.len() == WINDOW_SIZE {
            window.pop_front();
        }
        window.push_back(obs.result_count);
        for field in &obs.filter_fields {
            *windows.field_usage.entry(field.clone()).or_insert(0) += 1;
        }
    }

    /// Current tuning recommendations, recomputed from the windows.
    pub fn recommendations(&self) -> Vec<Recommendation> {
        let windows = self.windows.lock().expect("monitor lock poisoned");
        let mut out = Vec::new();

        let mut fields: Vec<(&String, &u64)> = windows.field_usage.iter().collect();
        fields.sort_by(|a, b| a.0.cmp(b.0));
        for (field, count) in fields {
            if *count >= self.thresholds.index_usage {
                out.push(Recommendation::AddIndex {
                    field: field.clone(),
                });
            }
        }

        let mut kinds: Vec<(&QueryKind, &VecDeque<usize>)> = windows.results.iter().collect();
        kinds.sort_by_key(|(k, _)| k.name());
        for (kind, window) in kinds {
            if window.is_empty() {
                continue;
            }
            let mut sorted: Vec<usize> = window.iter().copied().collect();
            sorted.sort_unstable();
            let median = sorted[sorted.len() / 2];
            if median >= self.thresholds.median_results {
                out.push(Recommendation::NarrowResults { query_kind: *kind });
            }
            if window.len() >= self.thresholds.cache_frequency {
                out.push(Recommendation::AddCache { query_kind: *kind });
            }
        }

        out
    }

    pub fn queries_observed(&self) -> u64 {
        self.queries_observed.load(Ordering::Relaxed)
    }

    pub fn alerts_emitted(&self) -> u64 {
        self.alerts_emitted.load(Ordering::Relaxed)
    }

    /// Emit the counter values and current recommendations as `info!`
    /// events. Call at the end of a run, not on every observation.
    pub fn flush(&self) {
        let recommendations = self.recommendations();
        tracing::info!(
            metric = "monitor_flush",
            queries_observed = self.queries_observed(),
            alerts_emitted = self.alerts_emitted(),
            recommendations = recommendations.len(),
        );
        for recommendation in recommendations {
            tracing::info!(
                metric = "monitor_recommendation",
                recommendation = ?recommendation,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(kind: QueryKind, latency_ms: u64, results: usize) -> QueryObservation {
        QueryObservation {
            kind,
            latency: Duration::from_millis(latency_ms),
            result_count: results,
            filter_fields: Vec::new(),
        }
    }

    #[test]
    fn test_alert_fires_over_one_point_five_times_target() {
        let m = PerformanceMonitor::default();
        // Selective target is 50ms; 74ms is under 1.5x, 80ms is over.
        m.observe(obs(QueryKind::Selective, 74, 1));
        assert_eq!(m.alerts_emitted(), 0);
        m.observe(obs(QueryKind::Selective, 80, 1));
        assert_eq!(m.alerts_emitted(), 1);
        assert_eq!(m.queries_observed(), 2);
    }

    #[test]
    fn test_add_index_after_usage_threshold() {
        let m = PerformanceMonitor::new(MonitorThresholds {
            index_usage: 3,
            median_results: 1000,
            cache_frequency: 1000,
        });
        for _ in 0..3 {
            m.observe(QueryObservation {
                kind: QueryKind::Comprehensive,
                latency: Duration::from_millis(1),
                result_count: 1,
                filter_fields: vec!["platform".to_string()],
            });
        }
        assert_eq!(
            m.recommendations(),
            vec![Recommendation::AddIndex {
                field: "platform".to_string()
            }]
        );
    }

    #[test]
    fn test_narrow_results_on_high_median() {
        let m = PerformanceMonitor::new(MonitorThresholds {
            index_usage: 1000,
            median_results: 10,
            cache_frequency: 1000,
        });
        for count in [2, 12, 15] {
            m.observe(obs(QueryKind::Comprehensive, 1, count));
        }
        assert_eq!(
            m.recommendations(),
            vec![Recommendation::NarrowResults {
                query_kind: QueryKind::Comprehensive
            }]
        );
    }

    #[test]
    fn test_add_cache_on_recurring_shape() {
        let m = PerformanceMonitor::new(MonitorThresholds {
            index_usage: 1000,
            median_results: 1000,
            cache_frequency: 4,
        });
        for _ in 0..4 {
            m.observe(obs(QueryKind::Selective, 1, 1));
        }
        assert_eq!(
            m.recommendations(),
            vec![Recommendation::AddCache {
                query_kind: QueryKind::Selective
            }]
        );
    }

    #[test]
    fn test_window_is_bounded() {
        let m = PerformanceMonitor::default();
        for i in 0..(WINDOW_SIZE + 10) {
            m.observe(obs(QueryKind::Sourcing, 1, i));
        }
        assert_eq!(m.queries_observed() as usize, WINDOW_SIZE + 10);
        let windows = m.windows.lock().unwrap();
        assert_eq!(windows.results[&QueryKind::Sourcing].len(), WINDOW_SIZE);
    }

    #[test]
    fn test_no_recommendations_when_quiet() {
        let m = PerformanceMonitor::default();
        m.observe(obs(QueryKind::Comprehensive, 1, 1));
        assert!(m.recommendations().is_empty());
    }
}
