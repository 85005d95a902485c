use crate::prelude::ConfigError;
use crate::processing::pipeline::ProcessingResult;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub const DEFAULT_HISTORY_CAPACITY: usize = 200;

/// Period during which every cycle since the last published result failed to fetch a frame.
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamOutage {
    pub since: DateTime<Utc>,
    pub last_failure: DateTime<Utc>,
    pub failures: u32,
    pub reason: String,
}

/// Consistent view of everything the status monitor needs, taken under one lock.
#[derive(Debug, Clone, Default)]
pub struct PublishedState {
    pub latest: Option<Arc<ProcessingResult>>,
    pub outage: Option<UpstreamOutage>,
}

#[derive(Default)]
struct HistoryState {
    entries: VecDeque<Arc<ProcessingResult>>,
    outage: Option<UpstreamOutage>,
}

/// Bounded FIFO of recent results plus the upstream-outage marker.
///
/// The newest entry doubles as the published "latest" result. All accessors copy
/// `Arc`s out under the lock and never hold it across I/O.
pub struct ResultHistory {
    capacity: usize,
    inner: Mutex<HistoryState>,
}

impl ResultHistory {
    pub fn new(capacity: usize) -> Result<Self, ConfigError> {
        if capacity == 0 {
            return Err(ConfigError::InvalidCapacity);
        }
        Ok(Self {
            capacity,
            inner: Mutex::new(HistoryState {
                entries: VecDeque::with_capacity(capacity),
                outage: None,
            }),
        })
    }

    pub fn with_default_capacity() -> Self {
        Self {
            capacity: DEFAULT_HISTORY_CAPACITY,
            inner: Mutex::new(HistoryState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, HistoryState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.state().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state().entries.is_empty()
    }

    /// Appends a result, evicting the oldest entry when full, and clears any outage.
    pub fn append(&self, result: ProcessingResult) -> Arc<ProcessingResult> {
        let result = Arc::new(result);
        let mut state = self.state();
        while state.entries.len() >= self.capacity {
            state.entries.pop_front();
        }
        state.entries.push_back(Arc::clone(&result));
        state.outage = None;
        result
    }

    /// Marks the frame source as unreachable until the next successful append.
    pub fn record_upstream_failure(&self, at: DateTime<Utc>, reason: impl Into<String>) {
        let reason = reason.into();
        let mut state = self.state();
        match state.outage.as_mut() {
            Some(outage) => {
                outage.last_failure = at;
                outage.failures = outage.failures.saturating_add(1);
                outage.reason = reason;
            }
            None => {
                state.outage = Some(UpstreamOutage {
                    since: at,
                    last_failure: at,
                    failures: 1,
                    reason,
                });
            }
        }
    }

    /// Clears the outage marker once the frame source answers again, whether or not
    /// the rest of the cycle succeeds.
    pub fn record_upstream_recovered(&self) {
        self.state().outage = None;
    }

    pub fn latest(&self) -> Option<Arc<ProcessingResult>> {
        self.state().entries.back().cloned()
    }

    /// Up to `n` results, most recent first.
    pub fn recent(&self, n: usize) -> Vec<Arc<ProcessingResult>> {
        self.state().entries.iter().rev().take(n).cloned().collect()
    }

    pub fn observe(&self) -> PublishedState {
        let state = self.state();
        PublishedState {
            latest: state.entries.back().cloned(),
            outage: state.outage.clone(),
        }
    }

    /// Renders up to `n` recent results as JSON lines in chronological order.
    pub fn export_json_lines(&self, n: usize) -> Result<String, serde_json::Error> {
        let mut recent = self.recent(n);
        recent.reverse();
        let mut out = String::new();
        for result in recent {
            out.push_str(&serde_json::to_string(result.as_ref())?);
            out.push('\n');
        }
        Ok(out)
    }
}

impl Default for ResultHistory {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}
