use crate::math::stats::StatsHelper;
use crate::processing::history::ResultHistory;
use serde::{Deserialize, Serialize};

pub const DEFAULT_PATTERN_WINDOW: usize = 30;
const TREND_SLOPE_CUTOFF: f64 = 0.1;

/// Aggregates over every result currently retained in the history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OccupancyStatistics {
    pub frames: usize,
    pub average_occupied: f64,
    pub min_occupied: usize,
    pub max_occupied: usize,
    pub average_vehicles: f64,
    pub average_occupancy_rate: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Trend {
    Increasing,
    Decreasing,
    Stable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternReport {
    pub window: usize,
    pub average_occupied: f64,
    pub occupied_std_dev: f64,
    pub trend: Trend,
    /// Standard deviation of the vehicle count across the window.
    pub detection_stability: f64,
    pub peak_occupied: usize,
    pub min_occupied: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PatternAnalysis {
    InsufficientData { frames_needed: usize, frames_available: usize },
    Ready(PatternReport),
}

pub fn occupancy_statistics(history: &ResultHistory) -> Option<OccupancyStatistics> {
    let results = history.recent(history.capacity());
    if results.is_empty() {
        return None;
    }

    let occupied: Vec<f64> = results.iter().map(|r| r.occupied_count as f64).collect();
    let vehicles: Vec<f64> = results.iter().map(|r| r.vehicle_count as f64).collect();
    let rates: Vec<f64> = results.iter().map(|r| r.occupancy_rate).collect();

    Some(OccupancyStatistics {
        frames: results.len(),
        average_occupied: StatsHelper::mean(&occupied),
        min_occupied: results.iter().map(|r| r.occupied_count).min().unwrap_or(0),
        max_occupied: results.iter().map(|r| r.occupied_count).max().unwrap_or(0),
        average_vehicles: StatsHelper::mean(&vehicles),
        average_occupancy_rate: StatsHelper::mean(&rates),
    })
}

/// Looks at the newest `window` results in chronological order.
pub fn analyze_patterns(history: &ResultHistory, window: usize) -> PatternAnalysis {
    let mut results = history.recent(window);
    if window == 0 || results.len() < window {
        return PatternAnalysis::InsufficientData {
            frames_needed: window.max(1),
            frames_available: results.len(),
        };
    }
    results.reverse();

    let occupied: Vec<f64> = results.iter().map(|r| r.occupied_count as f64).collect();
    let vehicles: Vec<f64> = results.iter().map(|r| r.vehicle_count as f64).collect();
    let slope = StatsHelper::slope(&occupied);
    let trend = if slope > TREND_SLOPE_CUTOFF {
        Trend::Increasing
    } else if slope < -TREND_SLOPE_CUTOFF {
        Trend::Decreasing
    } else {
        Trend::Stable
    };

    PatternAnalysis::Ready(PatternReport {
        window,
        average_occupied: StatsHelper::mean(&occupied),
        occupied_std_dev: StatsHelper::std_dev(&occupied),
        trend,
        detection_stability: StatsHelper::std_dev(&vehicles),
        peak_occupied: results.iter().map(|r| r.occupied_count).max().unwrap_or(0),
        min_occupied: results.iter().map(|r| r.occupied_count).min().unwrap_or(0),
    })
}
