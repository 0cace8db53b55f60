//! Telemetry Registry (C2): in-memory counters and timers with tag
//! dimensions, and a non-blocking snapshot.
//!
//! The teacher has no direct analogue here — its `MetricsCollector` trait
//! (`message_router/traits.rs`) is a thin recording interface with a
//! no-op implementation (`message_router/implementations/metrics_collector.rs`).
//! This module borrows the teacher's concurrent-map idiom (`DashMap`,
//! used throughout `message_router/implementations/agent_registry.rs`) to
//! give that interface a real, lock-light backing store.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Sentinel dimension key used for an empty tag set.
const ALL_DIMENSION: &str = "_all";

/// Builds the dimension key for a tag set: entries sorted by key, joined
/// as `k=v,k=v`; `_all` for an empty set.
fn dimension_key(tags: &[(&str, &str)]) -> String {
    if tags.is_empty() {
        return ALL_DIMENSION.to_string();
    }
    let mut sorted: Vec<(&str, &str)> = tags.to_vec();
    sorted.sort_unstable_by_key(|(k, _)| *k);
    sorted
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}

#[derive(Debug, Default)]
struct CounterMetric {
    total: AtomicU64,
    by_dimension: DashMap<String, AtomicU64>,
}

impl CounterMetric {
    fn increment(&self, delta: u64, dimension: &str) {
        self.total.fetch_add(delta, Ordering::Relaxed);
        self.by_dimension
            .entry(dimension.to_string())
            .or_default()
            .fetch_add(delta, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct TimerStatsInner {
    count: u64,
    total_ms: u64,
    min_ms: u64,
    max_ms: u64,
    last_ms: u64,
}

impl TimerStatsInner {
    fn record(&mut self, duration_ms: u64) {
        if self.count == 0 {
            self.min_ms = duration_ms;
            self.max_ms = duration_ms;
        } else {
            self.min_ms = self.min_ms.min(duration_ms);
            self.max_ms = self.max_ms.max(duration_ms);
        }
        self.count += 1;
        self.total_ms = self.total_ms.saturating_add(duration_ms);
        self.last_ms = duration_ms;
    }
}

#[derive(Debug, Default)]
struct TimerMetric {
    overall: Mutex<TimerStatsInner>,
    by_dimension: DashMap<String, Mutex<TimerStatsInner>>,
}

impl TimerMetric {
    fn record(&self, duration_ms: u64, dimension: &str) {
        self.overall.lock().unwrap_or_else(|e| e.into_inner()).record(duration_ms);
        self.by_dimension
            .entry(dimension.to_string())
            .or_default()
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .record(duration_ms);
    }
}

/// A point-in-time, deep copy of one counter's state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CounterSnapshot {
    /// Scalar total across every dimension.
    pub total: u64,
    /// Per-dimension sub-totals.
    pub by_dimension: BTreeMap<String, u64>,
}

/// A point-in-time, deep copy of one timer's state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimerSnapshot {
    /// Aggregate stats across every dimension.
    pub overall: TimerStatsSnapshot,
    /// Per-dimension stats.
    pub by_dimension: BTreeMap<String, TimerStatsSnapshot>,
}

/// Rounded-millisecond timer statistics.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TimerStatsSnapshot {
    /// Number of recorded samples.
    pub count: u64,
    /// Sum of all sample durations, in milliseconds.
    pub total_ms: u64,
    /// Minimum sample duration, in milliseconds.
    pub min_ms: u64,
    /// Maximum sample duration, in milliseconds.
    pub max_ms: u64,
    /// Most recently recorded sample duration, in milliseconds.
    pub last_ms: u64,
}

impl From<TimerStatsInner> for TimerStatsSnapshot {
    fn from(inner: TimerStatsInner) -> Self {
        Self {
            count: inner.count,
            total_ms: inner.total_ms,
            min_ms: inner.min_ms,
            max_ms: inner.max_ms,
            last_ms: inner.last_ms,
        }
    }
}

/// A deep copy of the whole registry at one instant.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TelemetrySnapshot {
    /// Counters keyed by metric name.
    pub counters: BTreeMap<String, CounterSnapshot>,
    /// Timers keyed by metric name.
    pub timers: BTreeMap<String, TimerSnapshot>,
}

/// An open timing measurement returned by [`Telemetry::start`].
///
/// `stop` records the elapsed wall time against the timer that created
/// this handle. Dropping it without calling `stop` silently discards the
/// measurement, matching the spec's "timers are opt-in to stop" framing.
#[must_use = "a started timer does nothing until stopped"]
pub struct TimerHandle<'a> {
    telemetry: &'a Telemetry,
    name: String,
    dimension: String,
    started_at: std::time::Instant,
}

impl TimerHandle<'_> {
    /// Record the elapsed duration since [`Telemetry::start`] was called.
    pub fn stop(self) {
        #[allow(clippy::cast_possible_truncation)]
        let elapsed_ms = self.started_at.elapsed().as_millis() as u64;
        self.telemetry.record_raw(&self.name, elapsed_ms, &self.dimension);
    }
}

/// The Telemetry Registry (C2): counters and timers with tag dimensions.
///
/// Mutators (`increment`, `record`, `start`/`stop`) never block on
/// `snapshot`, and vice versa: both sides operate on `DashMap` shards, not
/// a single global lock.
#[derive(Debug, Default)]
pub struct Telemetry {
    counters: DashMap<String, CounterMetric>,
    timers: DashMap<String, TimerMetric>,
}

impl Telemetry {
    /// A fresh, empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment `name` by `delta` under the dimension formed from `tags`.
    /// A zero or non-finite delta is a no-op.
    pub fn increment(&self, name: &str, delta: f64, tags: &[(&str, &str)]) {
        if delta == 0.0 || !delta.is_finite() {
            return;
        }
        #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
        let delta_u64 = delta.abs().round() as u64;
        let dimension = dimension_key(tags);
        self.counters
            .entry(name.to_string())
            .or_default()
            .increment(delta_u64, &dimension);
    }

    /// Record a pre-measured duration under the dimension formed from
    /// `tags`. Negative durations are clamped to zero.
    pub fn record(&self, name: &str, duration_ms: i64, tags: &[(&str, &str)]) {
        let dimension = dimension_key(tags);
        self.record_raw(name, duration_ms.max(0).unsigned_abs(), &dimension);
    }

    fn record_raw(&self, name: &str, duration_ms: u64, dimension: &str) {
        self.timers
            .entry(name.to_string())
            .or_default()
            .record(duration_ms, dimension);
    }

    /// Start a timing measurement; call [`TimerHandle::stop`] to record it.
    pub fn start<'a>(&'a self, name: &str, tags: &[(&str, &str)]) -> TimerHandle<'a> {
        TimerHandle {
            telemetry: self,
            name: name.to_string(),
            dimension: dimension_key(tags),
            started_at: std::time::Instant::now(),
        }
    }

    /// A deeply copied, point-in-time view of the whole registry.
    #[must_use]
    pub fn snapshot(&self) -> TelemetrySnapshot {
        let counters = self
            .counters
            .iter()
            .map(|entry| {
                let metric = entry.value();
                let by_dimension = metric
                    .by_dimension
                    .iter()
                    .map(|d| (d.key().clone(), d.value().load(Ordering::Relaxed)))
                    .collect();
                (
                    entry.key().clone(),
                    CounterSnapshot {
                        total: metric.total.load(Ordering::Relaxed),
                        by_dimension,
                    },
                )
            })
            .collect();

        let timers = self
            .timers
            .iter()
            .map(|entry| {
                let metric = entry.value();
                let overall = (*metric.overall.lock().unwrap_or_else(|e| e.into_inner())).into();
                let by_dimension = metric
                    .by_dimension
                    .iter()
                    .map(|d| {
                        let stats = *d.value().lock().unwrap_or_else(|e| e.into_inner());
                        (d.key().clone(), stats.into())
                    })
                    .collect();
                (entry.key().clone(), TimerSnapshot { overall, by_dimension })
            })
            .collect();

        TelemetrySnapshot { counters, timers }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dimension_key_sorts_and_joins_tags() {
        assert_eq!(dimension_key(&[("b", "2"), ("a", "1")]), "a=1,b=2");
        assert_eq!(dimension_key(&[]), "_all");
    }

    #[test]
    fn counter_tracks_total_and_per_dimension() {
        let t = Telemetry::new();
        t.increment("queue.enqueued", 1.0, &[("type", "analyst")]);
        t.increment("queue.enqueued", 1.0, &[("type", "scout")]);
        t.increment("queue.enqueued", 0.0, &[("type", "scout")]);

        let snap = t.snapshot();
        let c = &snap.counters["queue.enqueued"];
        assert_eq!(c.total, 2);
        assert_eq!(c.by_dimension["type=analyst"], 1);
        assert_eq!(c.by_dimension["type=scout"], 1);
    }

    #[test]
    fn timer_clamps_negative_durations() {
        let t = Telemetry::new();
        t.record("dispatch.latency", -50, &[]);
        let snap = t.snapshot();
        assert_eq!(snap.timers["dispatch.latency"].overall.min_ms, 0);
    }

    #[test]
    fn start_stop_records_elapsed_time() {
        let t = Telemetry::new();
        let handle = t.start("op.duration", &[("op", "poll")]);
        handle.stop();
        let snap = t.snapshot();
        assert_eq!(snap.timers["op.duration"].overall.count, 1);
    }
}
