use crate::generator::profile::{SyntheticDetector, SyntheticFrameSource};
use crate::upstream::HttpFrameSource;
use crate::workflow::config::{SourceConfig, WorkflowConfig};
use anyhow::Context;
use parkcore::prelude::{FrameSource, VehicleDetector};
use parkcore::processing::{ReportSink, StatusMonitor};
use parkcore::{AutoProcessingScheduler, ProcessingPipeline, ProcessingResult, SlotMap};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Wires configuration, collaborators and the core loops together.
pub struct Runner {
    config: WorkflowConfig,
    slot_map: Arc<SlotMap>,
    source: Arc<dyn FrameSource>,
    detector: Arc<dyn VehicleDetector>,
}

impl Runner {
    /// Builds collaborators eagerly; call outside the async runtime when the HTTP
    /// source is configured.
    pub fn new(config: WorkflowConfig) -> anyhow::Result<Self> {
        let slot_map = Arc::new(config.to_slot_map()?);
        let source: Arc<dyn FrameSource> = match &config.source {
            SourceConfig::Synthetic => Arc::new(SyntheticFrameSource::new(&config.generator)),
            SourceConfig::Http { base_url } => Arc::new(HttpFrameSource::new(
                base_url,
                Duration::from_millis(config.pipeline.fetch_timeout_ms),
            )?),
        };
        let detector: Arc<dyn VehicleDetector> =
            Arc::new(SyntheticDetector::new(&slot_map, &config.generator));

        Ok(Self {
            config,
            slot_map,
            source,
            detector,
        })
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    pub fn slot_map(&self) -> &SlotMap {
        &self.slot_map
    }

    pub fn build_pipeline(&self) -> anyhow::Result<Arc<ProcessingPipeline>> {
        let pipeline = ProcessingPipeline::new(
            Arc::clone(&self.slot_map),
            Arc::clone(&self.source),
            Arc::clone(&self.detector),
            &self.config.pipeline,
        )
        .context("building processing pipeline")?;
        Ok(Arc::new(pipeline))
    }

    /// Runs exactly one cycle.
    pub async fn run_offline(&self) -> anyhow::Result<Arc<ProcessingResult>> {
        let pipeline = self.build_pipeline()?;
        let result = pipeline
            .run_once()
            .await
            .context("running offline processing cycle")?;
        Ok(result)
    }

    /// Starts the scheduler and status monitor, waits for `shutdown`, then stops
    /// both loops and returns the pipeline so callers can read its history.
    pub async fn run_until<F>(
        &self,
        sink: Arc<dyn ReportSink>,
        shutdown: F,
    ) -> anyhow::Result<Arc<ProcessingPipeline>>
    where
        F: Future<Output = ()>,
    {
        let pipeline = self.build_pipeline()?;
        let scheduler = AutoProcessingScheduler::new(Arc::clone(&pipeline));
        let monitor = StatusMonitor::new(pipeline.history(), sink, self.config.monitor.display_limit);

        monitor
            .start(self.config.monitor.interval())
            .context("starting status monitor")?;
        scheduler
            .start(Duration::from_millis(self.config.processing_interval_ms))
            .context("starting auto-processing scheduler")?;

        shutdown.await;

        scheduler.stop_and_wait().await;
        monitor.stop_and_wait().await;
        Ok(pipeline)
    }
}
