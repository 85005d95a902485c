use crate::prelude::DetectionBox;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Summary of the detections that fed one processing cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionStats {
    pub total: usize,
    pub by_label: BTreeMap<String, usize>,
    pub mean_confidence: f32,
    pub min_confidence: f32,
    pub max_confidence: f32,
}

impl DetectionStats {
    pub fn from_detections(detections: &[DetectionBox]) -> Self {
        if detections.is_empty() {
            return Self::default();
        }

        let mut by_label = BTreeMap::new();
        let mut sum = 0.0_f32;
        let mut min = f32::MAX;
        let mut max = f32::MIN;
        for detection in detections {
            *by_label.entry(detection.label.clone()).or_insert(0) += 1;
            sum += detection.confidence;
            min = min.min(detection.confidence);
            max = max.max(detection.confidence);
        }

        Self {
            total: detections.len(),
            by_label,
            mean_confidence: sum / detections.len() as f32,
            min_confidence: min,
            max_confidence: max,
        }
    }
}
