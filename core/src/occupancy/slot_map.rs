use crate::prelude::{ConfigError, Rect};
use log::info;
use serde::{Deserialize, Serialize};

pub const DEFAULT_SLOT_WIDTH: f32 = 107.0;
pub const DEFAULT_SLOT_HEIGHT: f32 = 48.0;

/// A configured parking slot. Ids are 1-based and follow configuration order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Slot {
    pub id: u32,
    pub rect: Rect,
}

/// Raw slot layout as read from configuration.
///
/// Each entry is either `[x1, y1, x2, y2]` or a top-left corner `[x, y]` that is
/// expanded with `slot_width` x `slot_height`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlotMapConfig {
    pub slots: Vec<Vec<f32>>,
    pub slot_width: f32,
    pub slot_height: f32,
    pub frame_width: Option<u32>,
    pub frame_height: Option<u32>,
}

impl Default for SlotMapConfig {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            slot_width: DEFAULT_SLOT_WIDTH,
            slot_height: DEFAULT_SLOT_HEIGHT,
            frame_width: None,
            frame_height: None,
        }
    }
}

impl SlotMapConfig {
    fn rects(&self) -> Result<Vec<Rect>, ConfigError> {
        self.slots
            .iter()
            .enumerate()
            .map(|(index, entry)| match entry.as_slice() {
                [x1, y1, x2, y2] => Ok(Rect::new(*x1, *y1, *x2, *y2)),
                [x, y] => Ok(Rect::new(*x, *y, x + self.slot_width, y + self.slot_height)),
                other => Err(ConfigError::MalformedSlot {
                    index,
                    len: other.len(),
                }),
            })
            .collect()
    }
}

/// Immutable, validated set of slots for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct SlotMap {
    slots: Vec<Slot>,
    frame_bounds: Option<(u32, u32)>,
}

impl SlotMap {
    pub fn new(rects: Vec<Rect>) -> Result<Self, ConfigError> {
        Self::build(rects, None)
    }

    /// Like [`SlotMap::new`] but also rejects slots that leave the declared frame.
    pub fn with_frame_bounds(rects: Vec<Rect>, width: u32, height: u32) -> Result<Self, ConfigError> {
        if width == 0 || height == 0 {
            return Err(ConfigError::Invalid(format!(
                "frame dimensions {}x{} must be non-zero",
                width, height
            )));
        }
        Self::build(rects, Some((width, height)))
    }

    pub fn from_config(config: &SlotMapConfig) -> Result<Self, ConfigError> {
        if config.slot_width <= 0.0 || config.slot_height <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "default slot size {}x{} must be positive",
                config.slot_width, config.slot_height
            )));
        }
        let rects = config.rects()?;
        let map = match (config.frame_width, config.frame_height) {
            (Some(w), Some(h)) => Self::with_frame_bounds(rects, w, h)?,
            (None, None) => Self::new(rects)?,
            _ => {
                return Err(ConfigError::Invalid(
                    "frame_width and frame_height must be given together".into(),
                ))
            }
        };
        info!("Loaded slot map with {} slots", map.len());
        Ok(map)
    }

    fn build(rects: Vec<Rect>, frame_bounds: Option<(u32, u32)>) -> Result<Self, ConfigError> {
        if rects.is_empty() {
            return Err(ConfigError::EmptySlotMap);
        }

        let mut slots = Vec::with_capacity(rects.len());
        for (index, rect) in rects.into_iter().enumerate() {
            if rect.is_degenerate() {
                return Err(ConfigError::DegenerateSlot { index, rect });
            }
            if let Some((width, height)) = frame_bounds {
                let inside = rect.x1 >= 0.0
                    && rect.y1 >= 0.0
                    && rect.x2 <= width as f32
                    && rect.y2 <= height as f32;
                if !inside {
                    return Err(ConfigError::SlotOutOfBounds {
                        index,
                        rect,
                        width,
                        height,
                    });
                }
            }
            slots.push(Slot {
                id: index as u32 + 1,
                rect,
            });
        }

        Ok(Self {
            slots,
            frame_bounds,
        })
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Always false for a constructed map.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn get(&self, id: u32) -> Option<&Slot> {
        id.checked_sub(1)
            .and_then(|index| self.slots.get(index as usize))
    }

    pub fn frame_bounds(&self) -> Option<(u32, u32)> {
        self.frame_bounds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_ids_are_one_based_in_order() {
        let map = SlotMap::new(vec![
            Rect::new(0.0, 0.0, 10.0, 10.0),
            Rect::new(20.0, 0.0, 30.0, 10.0),
        ])
        .unwrap();
        let ids: Vec<u32> = map.slots().iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(map.get(2).unwrap().rect.x1, 20.0);
        assert!(map.get(0).is_none());
        assert!(map.get(3).is_none());
    }

    #[test]
    fn empty_and_degenerate_layouts_are_rejected() {
        assert_eq!(SlotMap::new(vec![]), Err(ConfigError::EmptySlotMap));
        let err = SlotMap::new(vec![
            Rect::new(0.0, 0.0, 10.0, 10.0),
            Rect::new(5.0, 5.0, 5.0, 9.0),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::DegenerateSlot { index: 1, .. }));
    }

    #[test]
    fn frame_bounds_reject_slots_outside_image() {
        let err = SlotMap::with_frame_bounds(vec![Rect::new(0.0, 0.0, 130.0, 10.0)], 128, 72)
            .unwrap_err();
        assert!(matches!(err, ConfigError::SlotOutOfBounds { index: 0, .. }));

        let map = SlotMap::with_frame_bounds(vec![Rect::new(0.0, 0.0, 128.0, 72.0)], 128, 72)
            .unwrap();
        assert_eq!(map.frame_bounds(), Some((128, 72)));
    }

    #[test]
    fn config_accepts_point_and_rectangle_entries() {
        let config = SlotMapConfig {
            slots: vec![vec![0.0, 0.0, 10.0, 10.0], vec![50.0, 60.0]],
            ..Default::default()
        };
        let map = SlotMap::from_config(&config).unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(
            map.get(2).unwrap().rect,
            Rect::new(50.0, 60.0, 50.0 + DEFAULT_SLOT_WIDTH, 60.0 + DEFAULT_SLOT_HEIGHT)
        );
    }

    #[test]
    fn config_rejects_malformed_entries() {
        let config = SlotMapConfig {
            slots: vec![vec![0.0, 0.0, 10.0]],
            ..Default::default()
        };
        assert_eq!(
            SlotMap::from_config(&config),
            Err(ConfigError::MalformedSlot { index: 0, len: 3 })
        );

        let half_bounds = SlotMapConfig {
            slots: vec![vec![0.0, 0.0]],
            frame_width: Some(640),
            ..Default::default()
        };
        assert!(matches!(
            SlotMap::from_config(&half_bounds),
            Err(ConfigError::Invalid(_))
        ));
    }
}
