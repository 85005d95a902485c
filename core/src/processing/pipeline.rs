use crate::detection::{DetectionFilter, DetectionStats};
use crate::occupancy::{OccupancyEngine, OccupancySnapshot, OccupancySummary, SlotMap};
use crate::occupancy::engine::DEFAULT_OCCUPANCY_THRESHOLD;
use crate::prelude::{
    ConfigError, DetectionBox, Frame, FrameSource, PipelineError, PipelineResult, VehicleDetector,
};
use crate::processing::history::{ResultHistory, DEFAULT_HISTORY_CAPACITY};
use crate::telemetry::{LogManager, MetricsRecorder};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::{task, time};

/// Tunables for a pipeline instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    pub occupancy_threshold: f64,
    pub fetch_timeout_ms: u64,
    pub detect_timeout_ms: u64,
    pub history_capacity: usize,
    pub filter: DetectionFilter,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            occupancy_threshold: DEFAULT_OCCUPANCY_THRESHOLD,
            fetch_timeout_ms: 5_000,
            detect_timeout_ms: 10_000,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            filter: DetectionFilter::default(),
        }
    }
}

impl PipelineSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.occupancy_threshold > 0.0 && self.occupancy_threshold <= 1.0) {
            return Err(ConfigError::InvalidThreshold(self.occupancy_threshold));
        }
        if self.history_capacity == 0 {
            return Err(ConfigError::InvalidCapacity);
        }
        if self.fetch_timeout_ms == 0 || self.detect_timeout_ms == 0 {
            return Err(ConfigError::Invalid("I/O timeouts must be non-zero".into()));
        }
        Ok(())
    }
}

/// Outcome of one successful fetch/detect/compute cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingResult {
    /// Capture time reported by the frame source.
    pub timestamp: DateTime<Utc>,
    pub processed_at: DateTime<Utc>,
    pub total_slots: usize,
    pub occupied_count: usize,
    pub available_count: usize,
    pub available_slot_ids: Vec<u32>,
    pub occupancy_rate: f64,
    /// Vehicles that survived filtering, whether or not they cover a slot.
    pub vehicle_count: usize,
    pub processing_time_ms: u64,
    pub detection_stats: DetectionStats,
    pub snapshots: Vec<OccupancySnapshot>,
}

/// One fetch -> detect -> compute -> record cycle over external collaborators.
pub struct ProcessingPipeline {
    source: Arc<dyn FrameSource>,
    detector: Arc<dyn VehicleDetector>,
    engine: OccupancyEngine,
    filter: DetectionFilter,
    history: Arc<ResultHistory>,
    metrics: Arc<MetricsRecorder>,
    fetch_timeout: Duration,
    detect_timeout: Duration,
    logger: LogManager,
}

impl ProcessingPipeline {
    pub fn new(
        slot_map: Arc<SlotMap>,
        source: Arc<dyn FrameSource>,
        detector: Arc<dyn VehicleDetector>,
        settings: &PipelineSettings,
    ) -> Result<Self, ConfigError> {
        settings.validate()?;
        let engine = OccupancyEngine::new(slot_map, settings.occupancy_threshold)?;
        let history = Arc::new(ResultHistory::new(settings.history_capacity)?);

        Ok(Self {
            source,
            detector,
            engine,
            filter: settings.filter.clone(),
            history,
            metrics: Arc::new(MetricsRecorder::new()),
            fetch_timeout: Duration::from_millis(settings.fetch_timeout_ms),
            detect_timeout: Duration::from_millis(settings.detect_timeout_ms),
            logger: LogManager::new("pipeline"),
        })
    }

    pub fn history(&self) -> Arc<ResultHistory> {
        Arc::clone(&self.history)
    }

    pub fn metrics(&self) -> Arc<MetricsRecorder> {
        Arc::clone(&self.metrics)
    }

    /// Runs a single cycle. On failure nothing is published; an upstream failure is
    /// recorded so the status monitor can report it.
    pub async fn run_once(&self) -> PipelineResult<Arc<ProcessingResult>> {
        self.cycle(None).await
    }

    /// Like [`run_once`](Self::run_once), but abandons the cycle with
    /// [`PipelineError::Stopped`] when `stop` reads true after a blocking call returns.
    pub async fn run_once_until(&self, stop: &watch::Receiver<bool>) -> PipelineResult<Arc<ProcessingResult>> {
        self.cycle(Some(stop)).await
    }

    async fn cycle(&self, stop: Option<&watch::Receiver<bool>>) -> PipelineResult<Arc<ProcessingResult>> {
        let started = Instant::now();

        let frame = match self.fetch().await {
            Ok(frame) => frame,
            Err(err) => {
                self.metrics.record_fetch_failure();
                self.history.record_upstream_failure(Utc::now(), err.to_string());
                self.logger.warn(&format!("cycle aborted: {}", err));
                return Err(err);
            }
        };
        self.history.record_upstream_recovered();
        self.check_stop(stop, "after fetch")?;

        let detections = match self.detect(frame.image).await {
            Ok(detections) => detections,
            Err(err) => {
                self.metrics.record_detection_failure();
                self.logger.warn(&format!("cycle aborted: {}", err));
                return Err(err);
            }
        };
        self.check_stop(stop, "after detection")?;

        let detections = self.filter.apply(detections);
        let snapshots = self.engine.compute(&detections);
        let summary = OccupancySummary::from_snapshots(&snapshots);
        let processing_time_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let result = ProcessingResult {
            timestamp: frame.captured_at,
            processed_at: Utc::now(),
            total_slots: summary.total_slots,
            occupied_count: summary.occupied_count,
            available_count: summary.available_count,
            available_slot_ids: summary.available_slot_ids,
            occupancy_rate: summary.occupancy_rate,
            vehicle_count: detections.len(),
            processing_time_ms,
            detection_stats: DetectionStats::from_detections(&detections),
            snapshots,
        };

        let published = self.history.append(result);
        self.metrics.record_cycle(processing_time_ms);
        self.logger.record(&format!(
            "processed frame: occupied {}/{} ({:.1}%), {} vehicles, {} ms",
            published.occupied_count,
            published.total_slots,
            published.occupancy_rate * 100.0,
            published.vehicle_count,
            published.processing_time_ms
        ));

        Ok(published)
    }

    fn check_stop(&self, stop: Option<&watch::Receiver<bool>>, stage: &str) -> PipelineResult<()> {
        if stop.map_or(false, |rx| *rx.borrow()) {
            self.logger.debug(&format!("stop requested {}, cycle abandoned", stage));
            return Err(PipelineError::Stopped);
        }
        Ok(())
    }

    async fn fetch(&self) -> PipelineResult<Frame> {
        let source = Arc::clone(&self.source);
        let call = task::spawn_blocking(move || source.fetch_latest_frame());
        match time::timeout(self.fetch_timeout, call).await {
            Ok(Ok(Ok(frame))) => Ok(frame),
            Ok(Ok(Err(err))) => Err(PipelineError::UpstreamUnavailable(err.to_string())),
            Ok(Err(join_err)) => Err(PipelineError::UpstreamUnavailable(format!(
                "frame source task failed: {}",
                join_err
            ))),
            Err(_) => Err(PipelineError::UpstreamUnavailable(format!(
                "fetch timed out after {} ms",
                self.fetch_timeout.as_millis()
            ))),
        }
    }

    async fn detect(&self, image: Vec<u8>) -> PipelineResult<Vec<DetectionBox>> {
        let detector = Arc::clone(&self.detector);
        let call = task::spawn_blocking(move || detector.detect(&image));
        match time::timeout(self.detect_timeout, call).await {
            Ok(Ok(Ok(detections))) => Ok(detections),
            Ok(Ok(Err(err))) => Err(PipelineError::DetectionFailure(err.to_string())),
            Ok(Err(join_err)) => Err(PipelineError::DetectionFailure(format!(
                "detector task failed: {}",
                join_err
            ))),
            Err(_) => Err(PipelineError::DetectionFailure(format!(
                "detection timed out after {} ms",
                self.detect_timeout.as_millis()
            ))),
        }
    }
}
