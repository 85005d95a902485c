use serde::Serialize;
use std::sync::{Mutex, MutexGuard, PoisonError};

pub struct MetricsRecorder {
    inner: Mutex<Metrics>,
}

#[derive(Default)]
struct Metrics {
    cycles_completed: u64,
    fetch_failures: u64,
    detection_failures: u64,
    skipped_ticks: u64,
    total_processing_ms: u64,
    last_processing_ms: Option<u64>,
}

/// Point-in-time copy of the pipeline counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub cycles_completed: u64,
    pub fetch_failures: u64,
    pub detection_failures: u64,
    pub skipped_ticks: u64,
    pub last_processing_ms: Option<u64>,
    pub average_processing_ms: f64,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Metrics::default()),
        }
    }

    fn metrics(&self) -> MutexGuard<'_, Metrics> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn record_cycle(&self, processing_ms: u64) {
        let mut metrics = self.metrics();
        metrics.cycles_completed += 1;
        metrics.total_processing_ms += processing_ms;
        metrics.last_processing_ms = Some(processing_ms);
    }

    pub fn record_fetch_failure(&self) {
        self.metrics().fetch_failures += 1;
    }

    pub fn record_detection_failure(&self) {
        self.metrics().detection_failures += 1;
    }

    pub fn record_skipped_tick(&self) {
        self.metrics().skipped_ticks += 1;
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let metrics = self.metrics();
        let average_processing_ms = if metrics.cycles_completed == 0 {
            0.0
        } else {
            metrics.total_processing_ms as f64 / metrics.cycles_completed as f64
        };
        MetricsSnapshot {
            cycles_completed: metrics.cycles_completed,
            fetch_failures: metrics.fetch_failures,
            detection_failures: metrics.detection_failures,
            skipped_ticks: metrics.skipped_ticks,
            last_processing_ms: metrics.last_processing_ms,
            average_processing_ms,
        }
    }
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}
