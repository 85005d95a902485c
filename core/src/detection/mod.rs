//! Post-processing applied to raw detector output before occupancy inference.

pub mod filter;
pub mod stats;

pub use filter::DetectionFilter;
pub use stats::DetectionStats;
