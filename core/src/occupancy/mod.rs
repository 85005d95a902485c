pub mod engine;
pub mod slot_map;

pub use engine::{OccupancyEngine, OccupancySnapshot, OccupancySummary, DEFAULT_OCCUPANCY_THRESHOLD};
pub use slot_map::{Slot, SlotMap, SlotMapConfig};
