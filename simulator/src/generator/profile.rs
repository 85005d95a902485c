use chrono::Utc;
use parkcore::prelude::{
    DetectError, DetectionBox, FetchError, Frame, FrameSource, Rect, VehicleDetector,
};
use parkcore::SlotMap;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::thread;
use std::time::Duration;

/// Configuration for the synthetic camera and detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub seed: u64,
    /// Chance that any given slot holds a parked vehicle in a frame.
    pub occupancy_probability: f64,
    /// Vehicles placed outside the slot grid each frame (driving lanes, entrances).
    pub stray_vehicles: usize,
    /// Maximum offset, in pixels, applied to each edge of a parked vehicle box.
    pub jitter: f32,
    /// Chance that a fetch fails as if the camera host were down.
    pub outage_probability: f64,
    pub fetch_delay_ms: u64,
    pub detect_delay_ms: u64,
    pub label: String,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            occupancy_probability: 0.6,
            stray_vehicles: 1,
            jitter: 4.0,
            outage_probability: 0.0,
            fetch_delay_ms: 0,
            detect_delay_ms: 0,
            label: "car".into(),
        }
    }
}

fn lock_rng(rng: &Mutex<StdRng>) -> std::sync::MutexGuard<'_, StdRng> {
    rng.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Frame source that fabricates numbered frames and can simulate outages.
pub struct SyntheticFrameSource {
    rng: Mutex<StdRng>,
    outage_probability: f64,
    delay: Duration,
    frames: AtomicU64,
}

impl SyntheticFrameSource {
    pub fn new(config: &GeneratorConfig) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(config.seed)),
            outage_probability: config.outage_probability.clamp(0.0, 1.0),
            delay: Duration::from_millis(config.fetch_delay_ms),
            frames: AtomicU64::new(0),
        }
    }

    pub fn frames_served(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }
}

impl FrameSource for SyntheticFrameSource {
    fn fetch_latest_frame(&self) -> Result<Frame, FetchError> {
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        if lock_rng(&self.rng).gen_bool(self.outage_probability) {
            return Err(FetchError::Unreachable("simulated camera outage".into()));
        }
        let index = self.frames.fetch_add(1, Ordering::Relaxed) + 1;
        let mut image = b"SYNTHETIC-FRAME:".to_vec();
        image.extend_from_slice(&index.to_be_bytes());
        Ok(Frame::new(image, Utc::now()))
    }
}

/// Detector stand-in that parks vehicles on a random subset of the known slots.
pub struct SyntheticDetector {
    slots: Vec<Rect>,
    extent: (f32, f32),
    rng: Mutex<StdRng>,
    config: GeneratorConfig,
}

impl SyntheticDetector {
    pub fn new(slot_map: &SlotMap, config: &GeneratorConfig) -> Self {
        let slots: Vec<Rect> = slot_map.slots().iter().map(|slot| slot.rect).collect();
        let extent = slot_map
            .frame_bounds()
            .map(|(w, h)| (w as f32, h as f32))
            .unwrap_or_else(|| {
                slots.iter().fold((1.0_f32, 1.0_f32), |(w, h), rect| {
                    (w.max(rect.x2 + 100.0), h.max(rect.y2 + 100.0))
                })
            });

        let mut config = config.clone();
        config.occupancy_probability = config.occupancy_probability.clamp(0.0, 1.0);
        config.jitter = config.jitter.max(0.0);

        Self {
            slots,
            extent,
            rng: Mutex::new(StdRng::seed_from_u64(config.seed.wrapping_add(1))),
            config,
        }
    }

    fn jittered(rng: &mut StdRng, rect: &Rect, jitter: f32) -> Rect {
        let mut offset = || {
            if jitter > 0.0 {
                rng.gen_range(-jitter..=jitter)
            } else {
                0.0
            }
        };
        Rect::new(
            rect.x1 + offset(),
            rect.y1 + offset(),
            rect.x2 + offset(),
            rect.y2 + offset(),
        )
    }
}

impl VehicleDetector for SyntheticDetector {
    fn detect(&self, image: &[u8]) -> Result<Vec<DetectionBox>, DetectError> {
        if image.is_empty() {
            return Err(DetectError::InvalidImage("empty frame".into()));
        }
        if self.config.detect_delay_ms > 0 {
            thread::sleep(Duration::from_millis(self.config.detect_delay_ms));
        }

        let mut rng = lock_rng(&self.rng);
        let mut detections = Vec::new();
        for rect in &self.slots {
            if rng.gen_bool(self.config.occupancy_probability) {
                let confidence = rng.gen_range(0.5_f32..0.99);
                let vehicle = Self::jittered(&mut rng, rect, self.config.jitter);
                detections.push(DetectionBox::new(vehicle, confidence, self.config.label.clone()));
            }
        }

        let (width, height) = self.extent;
        for _ in 0..self.config.stray_vehicles {
            let w = rng.gen_range(40.0_f32..120.0);
            let h = rng.gen_range(20.0_f32..60.0);
            let x = rng.gen_range(0.0..(width - w).max(1.0));
            let y = rng.gen_range(0.0..(height - h).max(1.0));
            let confidence = rng.gen_range(0.3_f32..0.9);
            detections.push(DetectionBox::new(
                Rect::new(x, y, x + w, y + h),
                confidence,
                self.config.label.clone(),
            ));
        }

        Ok(detections)
    }
}
