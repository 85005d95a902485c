pub mod analytics;
pub mod history;
pub mod monitor;
pub(crate) mod periodic;
pub mod pipeline;
pub mod scheduler;

pub use history::{PublishedState, ResultHistory, UpstreamOutage};
pub use monitor::{LogReportSink, MonitorSettings, ReportSink, StatusMonitor, StatusReport, UpstreamStatus};
pub use pipeline::{PipelineSettings, ProcessingPipeline, ProcessingResult};
pub use scheduler::AutoProcessingScheduler;
