use crate::math::geometry::GeometryHelper;
use crate::occupancy::slot_map::{Slot, SlotMap};
use crate::prelude::{ConfigError, DetectionBox, Rect};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Fraction of a slot's own area a vehicle must cover for the slot to count as occupied.
pub const DEFAULT_OCCUPANCY_THRESHOLD: f64 = 0.30;

/// Occupancy of one slot for one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OccupancySnapshot {
    pub slot_id: u32,
    pub rect: Rect,
    pub occupied: bool,
    /// Largest slot coverage achieved by any single detection.
    pub best_overlap: f64,
}

/// Aggregate counts derived from a full set of snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OccupancySummary {
    pub total_slots: usize,
    pub occupied_count: usize,
    pub available_count: usize,
    pub available_slot_ids: Vec<u32>,
    pub occupancy_rate: f64,
}

impl OccupancySummary {
    pub fn from_snapshots(snapshots: &[OccupancySnapshot]) -> Self {
        let total_slots = snapshots.len();
        let mut available_slot_ids: Vec<u32> = snapshots
            .iter()
            .filter(|s| !s.occupied)
            .map(|s| s.slot_id)
            .collect();
        available_slot_ids.sort_unstable();

        let available_count = available_slot_ids.len();
        let occupied_count = total_slots - available_count;
        let occupancy_rate = if total_slots == 0 {
            0.0
        } else {
            occupied_count as f64 / total_slots as f64
        };

        Self {
            total_slots,
            occupied_count,
            available_count,
            available_slot_ids,
            occupancy_rate,
        }
    }
}

/// Maps detected vehicle boxes onto the configured slot grid.
#[derive(Debug, Clone)]
pub struct OccupancyEngine {
    slot_map: Arc<SlotMap>,
    threshold: f64,
}

impl OccupancyEngine {
    pub fn new(slot_map: Arc<SlotMap>, threshold: f64) -> Result<Self, ConfigError> {
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(ConfigError::InvalidThreshold(threshold));
        }
        Ok(Self {
            slot_map,
            threshold,
        })
    }

    pub fn with_default_threshold(slot_map: Arc<SlotMap>) -> Self {
        Self {
            slot_map,
            threshold: DEFAULT_OCCUPANCY_THRESHOLD,
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn compute(&self, detections: &[DetectionBox]) -> Vec<OccupancySnapshot> {
        compute(self.slot_map.slots(), detections, self.threshold)
    }
}

/// Coverage of `slot` by `detection`, relative to the slot's area.
pub fn overlap_ratio(slot: &Slot, detection: &DetectionBox) -> f64 {
    GeometryHelper::coverage(&slot.rect, &detection.rect)
}

/// Computes per-slot occupancy. A slot is occupied when any one detection covers at
/// least `threshold` of its area; extra overlapping vehicles do not change the result.
pub fn compute(slots: &[Slot], detections: &[DetectionBox], threshold: f64) -> Vec<OccupancySnapshot> {
    slots
        .iter()
        .map(|slot| {
            let best_overlap = detections
                .iter()
                .map(|detection| overlap_ratio(slot, detection))
                .fold(0.0_f64, f64::max);
            OccupancySnapshot {
                slot_id: slot.id,
                rect: slot.rect,
                occupied: best_overlap > 0.0 && best_overlap >= threshold,
                best_overlap,
            }
        })
        .collect()
}
