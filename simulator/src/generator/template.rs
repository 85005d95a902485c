use serde::{Deserialize, Serialize};

/// Regular lot layout used when the configuration lists no explicit slots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridTemplate {
    pub rows: usize,
    pub cols: usize,
    pub slot_width: f32,
    pub slot_height: f32,
    pub gap: f32,
    pub origin_x: f32,
    pub origin_y: f32,
}

impl Default for GridTemplate {
    fn default() -> Self {
        Self {
            rows: 4,
            cols: 6,
            slot_width: 107.0,
            slot_height: 48.0,
            gap: 8.0,
            origin_x: 10.0,
            origin_y: 10.0,
        }
    }
}

impl GridTemplate {
    /// `[x1, y1, x2, y2]` entries in row-major order, so ids run left to right.
    pub fn slot_entries(&self) -> Vec<Vec<f32>> {
        let mut entries = Vec::with_capacity(self.rows * self.cols);
        for row in 0..self.rows {
            let y = self.origin_y + row as f32 * (self.slot_height + self.gap);
            for col in 0..self.cols {
                let x = self.origin_x + col as f32 * (self.slot_width + self.gap);
                entries.push(vec![x, y, x + self.slot_width, y + self.slot_height]);
            }
        }
        entries
    }
}
