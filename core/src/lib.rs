//! Parking occupancy core: slot layout, occupancy inference, and the concurrent
//! fetch/detect/report pipeline.
//!
//! Frame capture and vehicle detection are external capabilities plugged in through
//! [`FrameSource`] and [`VehicleDetector`]; everything here is in-memory.

pub mod detection;
pub mod math;
pub mod occupancy;
pub mod prelude;
pub mod processing;
pub mod telemetry;

pub use occupancy::{OccupancyEngine, SlotMap, SlotMapConfig};
pub use prelude::{
    ConfigError, ControlError, DetectionBox, Frame, FrameSource, PipelineError, Rect, VehicleDetector,
};
pub use processing::{
    AutoProcessingScheduler, ProcessingPipeline, ProcessingResult, ResultHistory, StatusMonitor,
};
