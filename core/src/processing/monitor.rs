use crate::prelude::ControlError;
use crate::processing::history::{PublishedState, ResultHistory};
use crate::processing::periodic::PeriodicTask;
use crate::telemetry::LogManager;
use chrono::{DateTime, Utc};
use log::Level;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

pub const DEFAULT_MONITOR_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_DISPLAY_LIMIT: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorSettings {
    pub interval_ms: u64,
    /// Number of available slot ids listed before the remainder is summarised.
    pub display_limit: usize,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_MONITOR_INTERVAL.as_millis() as u64,
            display_limit: DEFAULT_DISPLAY_LIMIT,
        }
    }
}

impl MonitorSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpstreamStatus {
    Available,
    Unreachable,
    NoDataYet,
}

/// One operator-facing status line, produced per monitor tick.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusReport {
    Waiting {
        at: DateTime<Utc>,
    },
    NotResponding {
        at: DateTime<Utc>,
        since: DateTime<Utc>,
        reason: String,
    },
    Available {
        at: DateTime<Utc>,
        available_count: usize,
        total_slots: usize,
        available_slot_ids: Vec<u32>,
        occupancy_rate: f64,
        processing_time_ms: u64,
        display_limit: usize,
    },
}

impl StatusReport {
    /// Classifies published state. An outage newer than the latest result wins over
    /// that result; no result and no outage means nothing has run yet.
    pub fn from_state(state: &PublishedState, at: DateTime<Utc>, display_limit: usize) -> Self {
        if let Some(outage) = &state.outage {
            return StatusReport::NotResponding {
                at,
                since: outage.since,
                reason: outage.reason.clone(),
            };
        }
        match &state.latest {
            None => StatusReport::Waiting { at },
            Some(latest) => StatusReport::Available {
                at,
                available_count: latest.available_count,
                total_slots: latest.total_slots,
                available_slot_ids: latest.available_slot_ids.clone(),
                occupancy_rate: latest.occupancy_rate,
                processing_time_ms: latest.processing_time_ms,
                display_limit,
            },
        }
    }

    pub fn status(&self) -> UpstreamStatus {
        match self {
            StatusReport::Waiting { .. } => UpstreamStatus::NoDataYet,
            StatusReport::NotResponding { .. } => UpstreamStatus::Unreachable,
            StatusReport::Available { .. } => UpstreamStatus::Available,
        }
    }

    pub fn at(&self) -> DateTime<Utc> {
        match self {
            StatusReport::Waiting { at }
            | StatusReport::NotResponding { at, .. }
            | StatusReport::Available { at, .. } => *at,
        }
    }
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusReport::Waiting { at } => {
                write!(f, "[{}] Waiting for parking data...", at.format("%H:%M:%S"))
            }
            StatusReport::NotResponding { at, since, reason } => write!(
                f,
                "[{}] Frame source not responding since {} ({})",
                at.format("%H:%M:%S"),
                since.format("%H:%M:%S"),
                reason
            ),
            StatusReport::Available {
                at,
                available_count,
                total_slots,
                available_slot_ids,
                occupancy_rate,
                processing_time_ms,
                display_limit,
            } => write!(
                f,
                "[{}] AVAILABLE SLOTS: {}/{} | Available slot numbers: {} | Occupancy: {:.1}% | Processing: {} ms",
                at.format("%H:%M:%S"),
                available_count,
                total_slots,
                format_slot_ids(available_slot_ids, *display_limit),
                occupancy_rate * 100.0,
                processing_time_ms
            ),
        }
    }
}

/// Lists ids, truncating after `limit` entries with a count of the rest.
/// A limit of zero lists everything.
pub fn format_slot_ids(ids: &[u32], limit: usize) -> String {
    if ids.is_empty() {
        return "None".to_string();
    }
    let join = |ids: &[u32]| {
        ids.iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    };
    if limit == 0 || ids.len() <= limit {
        join(ids)
    } else {
        format!("{}... (+{} more)", join(&ids[..limit]), ids.len() - limit)
    }
}

/// Destination for status reports.
pub trait ReportSink: Send + Sync {
    fn emit(&self, report: &StatusReport);
}

/// Writes reports through the `log` facade.
pub struct LogReportSink {
    logger: LogManager,
}

impl LogReportSink {
    pub fn new() -> Self {
        Self {
            logger: LogManager::new("status"),
        }
    }

    /// Warn while the frame source is down, info otherwise.
    pub fn level(report: &StatusReport) -> Level {
        match report.status() {
            UpstreamStatus::Unreachable => Level::Warn,
            UpstreamStatus::Available | UpstreamStatus::NoDataYet => Level::Info,
        }
    }
}

impl Default for LogReportSink {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportSink for LogReportSink {
    fn emit(&self, report: &StatusReport) {
        self.logger.log(Self::level(report), &report.to_string());
    }
}

struct MonitorCore {
    history: Arc<ResultHistory>,
    sink: Arc<dyn ReportSink>,
    display_limit: usize,
    last_report: Mutex<Option<StatusReport>>,
}

impl MonitorCore {
    fn tick(&self, at: DateTime<Utc>) -> StatusReport {
        let report = StatusReport::from_state(&self.history.observe(), at, self.display_limit);
        self.sink.emit(&report);
        *self
            .last_report
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(report.clone());
        report
    }
}

/// Samples published results on its own cadence, independent of the scheduler.
pub struct StatusMonitor {
    core: Arc<MonitorCore>,
    task: PeriodicTask,
}

impl StatusMonitor {
    pub fn new(history: Arc<ResultHistory>, sink: Arc<dyn ReportSink>, display_limit: usize) -> Self {
        Self {
            core: Arc::new(MonitorCore {
                history,
                sink,
                display_limit,
                last_report: Mutex::new(None),
            }),
            task: PeriodicTask::new("monitor"),
        }
    }

    pub fn with_log_sink(history: Arc<ResultHistory>) -> Self {
        Self::new(history, Arc::new(LogReportSink::new()), DEFAULT_DISPLAY_LIMIT)
    }

    /// Evaluates and emits one report immediately.
    pub fn tick(&self) -> StatusReport {
        self.core.tick(Utc::now())
    }

    pub fn start(&self, interval: Duration) -> Result<Duration, ControlError> {
        let core = Arc::clone(&self.core);
        self.task.start(interval, move |_| {
            let core = Arc::clone(&core);
            async move {
                core.tick(Utc::now());
            }
        })
    }

    pub fn stop(&self) -> bool {
        self.task.stop().is_some()
    }

    pub async fn stop_and_wait(&self) {
        if let Some(handle) = self.task.stop() {
            let _ = handle.await;
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.is_running()
    }

    pub fn interval(&self) -> Option<Duration> {
        self.task.interval()
    }

    pub fn last_report(&self) -> Option<StatusReport> {
        self.core
            .last_report
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::pipeline::tests::{car, three_slot_map, ScriptedDetector, StaticSource};
    use crate::processing::pipeline::{PipelineSettings, ProcessingPipeline};
    use std::sync::atomic::Ordering;
    use tokio::time;

    #[derive(Default)]
    struct CaptureSink {
        reports: Mutex<Vec<StatusReport>>,
    }

    impl ReportSink for CaptureSink {
        fn emit(&self, report: &StatusReport) {
            self.reports.lock().unwrap().push(report.clone());
        }
    }

    #[test]
    fn slot_ids_truncate_after_limit() {
        let ids: Vec<u32> = (1..=15).collect();
        assert_eq!(
            format_slot_ids(&ids, 10),
            "1, 2, 3, 4, 5, 6, 7, 8, 9, 10... (+5 more)"
        );
        assert_eq!(format_slot_ids(&ids[..3], 10), "1, 2, 3");
        assert_eq!(format_slot_ids(&[], 10), "None");
        assert_eq!(format_slot_ids(&ids[..4], 0), "1, 2, 3, 4");
    }

    #[test]
    fn waiting_before_any_cycle() {
        let history = Arc::new(ResultHistory::new(4).unwrap());
        let sink = Arc::new(CaptureSink::default());
        let monitor = StatusMonitor::new(history, sink.clone(), DEFAULT_DISPLAY_LIMIT);

        let report = monitor.tick();
        assert_eq!(report.status(), UpstreamStatus::NoDataYet);
        assert!(report.to_string().contains("Waiting for parking data"));
        assert_eq!(sink.reports.lock().unwrap().len(), 1);
        assert_eq!(monitor.last_report(), Some(report));
    }

    #[tokio::test]
    async fn upstream_failure_reports_not_responding_then_recovers() {
        let source = Arc::new(StaticSource::healthy());
        source.fail.store(true, Ordering::SeqCst);
        let pipeline = ProcessingPipeline::new(
            three_slot_map(),
            source.clone(),
            Arc::new(ScriptedDetector::new(vec![car(0.0, 10.0)])),
            &PipelineSettings::default(),
        )
        .unwrap();
        let monitor = StatusMonitor::new(
            pipeline.history(),
            Arc::new(CaptureSink::default()),
            DEFAULT_DISPLAY_LIMIT,
        );

        assert!(pipeline.run_once().await.is_err());
        assert!(pipeline.history().is_empty());
        let report = monitor.tick();
        assert_eq!(report.status(), UpstreamStatus::Unreachable);
        assert!(report.to_string().contains("not responding"));

        source.fail.store(false, Ordering::SeqCst);
        pipeline.run_once().await.unwrap();
        let report = monitor.tick();
        assert_eq!(report.status(), UpstreamStatus::Available);
        assert!(report.to_string().contains("AVAILABLE SLOTS: 2/3"));

        source.fail.store(true, Ordering::SeqCst);
        assert!(pipeline.run_once().await.is_err());
        assert_eq!(monitor.tick().status(), UpstreamStatus::Unreachable);
    }

    #[test]
    fn log_sink_warns_only_while_unreachable() {
        let at = Utc::now();
        let waiting = StatusReport::Waiting { at };
        let down = StatusReport::NotResponding {
            at,
            since: at,
            reason: "connection refused".into(),
        };
        let up = StatusReport::Available {
            at,
            available_count: 2,
            total_slots: 3,
            available_slot_ids: vec![2, 3],
            occupancy_rate: 1.0 / 3.0,
            processing_time_ms: 4,
            display_limit: DEFAULT_DISPLAY_LIMIT,
        };
        assert_eq!(LogReportSink::level(&waiting), Level::Info);
        assert_eq!(LogReportSink::level(&down), Level::Warn);
        assert_eq!(LogReportSink::level(&up), Level::Info);
    }

    #[test]
    fn log_sink_monitor_records_last_report() {
        let history = Arc::new(ResultHistory::new(2).unwrap());
        history.record_upstream_failure(Utc::now(), "timed out");
        let monitor = StatusMonitor::with_log_sink(Arc::clone(&history));

        let report = monitor.tick();
        assert_eq!(report.status(), UpstreamStatus::Unreachable);
        assert_eq!(monitor.last_report(), Some(report));
    }

    #[tokio::test]
    async fn detection_failure_after_outage_is_not_reported_as_unreachable() {
        let source = Arc::new(StaticSource::healthy());
        source.fail.store(true, Ordering::SeqCst);
        let mut detector = ScriptedDetector::new(vec![]);
        detector.fail = true;
        let pipeline = ProcessingPipeline::new(
            three_slot_map(),
            source.clone(),
            Arc::new(detector),
            &PipelineSettings::default(),
        )
        .unwrap();
        let monitor = StatusMonitor::new(
            pipeline.history(),
            Arc::new(CaptureSink::default()),
            DEFAULT_DISPLAY_LIMIT,
        );

        assert!(pipeline.run_once().await.unwrap_err().is_upstream());
        assert_eq!(monitor.tick().status(), UpstreamStatus::Unreachable);

        source.fail.store(false, Ordering::SeqCst);
        assert!(matches!(
            pipeline.run_once().await,
            Err(crate::prelude::PipelineError::DetectionFailure(_))
        ));
        let report = monitor.tick();
        assert_eq!(report.status(), UpstreamStatus::NoDataYet);
        assert!(!report.to_string().contains("not responding"));
    }

    #[test]
    fn available_report_lists_first_ten_ids() {
        let rects = (0..15)
            .map(|i| crate::prelude::Rect::new(i as f32 * 20.0, 0.0, i as f32 * 20.0 + 10.0, 10.0))
            .collect();
        let map = crate::occupancy::SlotMap::new(rects).unwrap();
        let snapshots = crate::occupancy::OccupancyEngine::with_default_threshold(Arc::new(map)).compute(&[]);
        let summary = crate::occupancy::OccupancySummary::from_snapshots(&snapshots);

        let history = Arc::new(ResultHistory::new(2).unwrap());
        history.append(crate::processing::pipeline::ProcessingResult {
            timestamp: Utc::now(),
            processed_at: Utc::now(),
            total_slots: summary.total_slots,
            occupied_count: summary.occupied_count,
            available_count: summary.available_count,
            available_slot_ids: summary.available_slot_ids,
            occupancy_rate: summary.occupancy_rate,
            vehicle_count: 0,
            processing_time_ms: 7,
            detection_stats: Default::default(),
            snapshots,
        });

        let monitor = StatusMonitor::new(history, Arc::new(CaptureSink::default()), 10);
        let text = monitor.tick().to_string();
        assert!(text.contains("AVAILABLE SLOTS: 15/15"));
        assert!(text.contains("1, 2, 3, 4, 5, 6, 7, 8, 9, 10... (+5 more)"));
        assert!(text.contains("Occupancy: 0.0%"));
        assert!(text.contains("Processing: 7 ms"));
    }

    #[tokio::test]
    async fn monitor_keeps_reporting_while_scheduler_is_idle() {
        let history = Arc::new(ResultHistory::new(4).unwrap());
        let sink = Arc::new(CaptureSink::default());
        let monitor = StatusMonitor::new(history, sink.clone(), DEFAULT_DISPLAY_LIMIT);

        monitor.start(Duration::from_millis(10)).unwrap();
        time::sleep(Duration::from_millis(55)).await;
        monitor.stop_and_wait().await;

        let reports = sink.reports.lock().unwrap();
        assert!(reports.len() >= 3);
        assert!(reports
            .iter()
            .all(|r| r.status() == UpstreamStatus::NoDataYet));
    }
}
