use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle in source-image pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl Rect {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    /// Area in square pixels; zero for inverted or empty rectangles.
    pub fn area(&self) -> f64 {
        let w = f64::from(self.x2) - f64::from(self.x1);
        let h = f64::from(self.y2) - f64::from(self.y1);
        if w <= 0.0 || h <= 0.0 {
            0.0
        } else {
            w * h
        }
    }

    pub fn is_degenerate(&self) -> bool {
        !(self.x2 > self.x1 && self.y2 > self.y1)
            || !self.x1.is_finite()
            || !self.y1.is_finite()
            || !self.x2.is_finite()
            || !self.y2.is_finite()
    }
}

/// A vehicle bounding box reported by the detector for one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionBox {
    pub rect: Rect,
    pub confidence: f32,
    pub label: String,
}

impl DetectionBox {
    pub fn new(rect: Rect, confidence: f32, label: impl Into<String>) -> Self {
        Self {
            rect,
            confidence,
            label: label.into(),
        }
    }
}

/// Encoded image bytes together with the time the camera captured them.
#[derive(Debug, Clone)]
pub struct Frame {
    pub image: Vec<u8>,
    pub captured_at: DateTime<Utc>,
}

impl Frame {
    pub fn new(image: Vec<u8>, captured_at: DateTime<Utc>) -> Self {
        Self { image, captured_at }
    }
}

/// Invalid slot layout or settings, rejected before any loop starts.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("slot map is empty")]
    EmptySlotMap,
    #[error("slot {index} is degenerate: {rect:?}")]
    DegenerateSlot { index: usize, rect: Rect },
    #[error("slot {index} lies outside the {width}x{height} frame: {rect:?}")]
    SlotOutOfBounds {
        index: usize,
        rect: Rect,
        width: u32,
        height: u32,
    },
    #[error("slot entry {index} has {len} coordinates, expected 2 or 4")]
    MalformedSlot { index: usize, len: usize },
    #[error("occupancy threshold {0} outside (0, 1]")]
    InvalidThreshold(f64),
    #[error("history capacity must be at least 1")]
    InvalidCapacity,
    #[error("invalid setting: {0}")]
    Invalid(String),
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    #[error("frame source unreachable: {0}")]
    Unreachable(String),
    #[error("frame source returned a bad response: {0}")]
    BadResponse(String),
    #[error("frame payload could not be decoded: {0}")]
    Decode(String),
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum DetectError {
    #[error("inference failed: {0}")]
    Inference(String),
    #[error("image rejected by detector: {0}")]
    InvalidImage(String),
}

/// Recoverable failure of a single processing cycle.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),
    #[error("detection failure: {0}")]
    DetectionFailure(String),
    /// The owning loop was stopped while the cycle waited on I/O; nothing was published.
    #[error("cycle abandoned after stop was requested")]
    Stopped,
}

impl PipelineError {
    pub fn is_upstream(&self) -> bool {
        matches!(self, PipelineError::UpstreamUnavailable(_))
    }
}

/// Misuse of a loop's start/stop control surface.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ControlError {
    #[error("no async runtime is available to host the loop")]
    NoRuntime,
    #[error("loop interval must be greater than zero")]
    ZeroInterval,
}

pub type PipelineResult<T> = Result<T, PipelineError>;

/// Supplies the most recent camera frame. Implementations may block; the pipeline
/// runs them on the blocking pool under a timeout.
pub trait FrameSource: Send + Sync {
    fn fetch_latest_frame(&self) -> Result<Frame, FetchError>;
}

/// Black-box vehicle detector. Implementations may block.
pub trait VehicleDetector: Send + Sync {
    fn detect(&self, image: &[u8]) -> Result<Vec<DetectionBox>, DetectError>;
}
