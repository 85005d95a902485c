use crate::math::geometry::GeometryHelper;
use crate::prelude::DetectionBox;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Rules for discarding detector output that should not count as a parked vehicle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionFilter {
    pub min_confidence: f32,
    /// Accepted labels; empty accepts every label.
    pub labels: Vec<String>,
    pub min_area: Option<f64>,
    pub max_area: Option<f64>,
    /// IoU above which the lower-confidence box of a pair is suppressed.
    pub nms_iou: Option<f64>,
}

impl Default for DetectionFilter {
    fn default() -> Self {
        Self {
            min_confidence: 0.0,
            labels: Vec::new(),
            min_area: None,
            max_area: None,
            nms_iou: None,
        }
    }
}

impl DetectionFilter {
    pub fn apply(&self, detections: Vec<DetectionBox>) -> Vec<DetectionBox> {
        let kept: Vec<DetectionBox> = detections
            .into_iter()
            .filter(|d| d.confidence >= self.min_confidence)
            .filter(|d| self.labels.is_empty() || self.labels.iter().any(|l| l == &d.label))
            .filter(|d| {
                let area = d.rect.area();
                self.min_area.map_or(true, |min| area >= min)
                    && self.max_area.map_or(true, |max| area <= max)
            })
            .collect();

        match self.nms_iou {
            Some(iou) => non_maximum_suppression(kept, iou),
            None => kept,
        }
    }
}

/// Greedy NMS: keep the most confident box, drop everything overlapping it by
/// `iou_threshold` or more, repeat.
pub fn non_maximum_suppression(mut detections: Vec<DetectionBox>, iou_threshold: f64) -> Vec<DetectionBox> {
    if detections.len() <= 1 {
        return detections;
    }
    detections.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(Ordering::Equal)
    });

    let mut keep: Vec<DetectionBox> = Vec::with_capacity(detections.len());
    for candidate in detections {
        let suppressed = keep
            .iter()
            .any(|kept| GeometryHelper::iou(&kept.rect, &candidate.rect) >= iou_threshold);
        if !suppressed {
            keep.push(candidate);
        }
    }
    keep
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prelude::Rect;

    fn det(x1: f32, x2: f32, confidence: f32, label: &str) -> DetectionBox {
        DetectionBox::new(Rect::new(x1, 0.0, x2, 10.0), confidence, label)
    }

    #[test]
    fn default_filter_keeps_everything() {
        let input = vec![det(0.0, 10.0, 0.1, "car"), det(5.0, 15.0, 0.9, "bus")];
        assert_eq!(DetectionFilter::default().apply(input.clone()), input);
    }

    #[test]
    fn confidence_label_and_area_rules_apply() {
        let filter = DetectionFilter {
            min_confidence: 0.25,
            labels: vec!["car".into(), "truck".into()],
            min_area: Some(50.0),
            max_area: Some(500.0),
            nms_iou: None,
        };
        let kept = filter.apply(vec![
            det(0.0, 10.0, 0.2, "car"),
            det(0.0, 10.0, 0.8, "bicycle"),
            det(0.0, 2.0, 0.8, "car"),
            det(0.0, 100.0, 0.8, "truck"),
            det(0.0, 10.0, 0.8, "truck"),
        ]);
        assert_eq!(kept, vec![det(0.0, 10.0, 0.8, "truck")]);
    }

    #[test]
    fn nms_keeps_highest_confidence_of_duplicates() {
        let kept = non_maximum_suppression(
            vec![
                det(0.0, 10.0, 0.6, "car"),
                det(1.0, 11.0, 0.9, "car"),
                det(40.0, 50.0, 0.5, "car"),
            ],
            0.5,
        );
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].confidence, 0.9);
        assert_eq!(kept[1].rect.x1, 40.0);
    }
}
