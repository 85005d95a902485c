use crate::prelude::{ControlError, PipelineError};
use crate::processing::periodic::PeriodicTask;
use crate::processing::pipeline::ProcessingPipeline;
use crate::telemetry::LogManager;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Released when the cycle that acquired it finishes, even if it panics.
struct InFlightGuard {
    flag: Arc<AtomicBool>,
}

impl InFlightGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self {
                flag: Arc::clone(flag),
            })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Drives [`ProcessingPipeline::run_once`] at a fixed interval with at most one
/// cycle in flight. A tick that lands on a running cycle is skipped and counted.
pub struct AutoProcessingScheduler {
    pipeline: Arc<ProcessingPipeline>,
    task: PeriodicTask,
    in_flight: Arc<AtomicBool>,
    current_cycle: Arc<Mutex<Option<JoinHandle<()>>>>,
    logger: LogManager,
}

impl AutoProcessingScheduler {
    pub fn new(pipeline: Arc<ProcessingPipeline>) -> Self {
        Self {
            pipeline,
            task: PeriodicTask::new("scheduler"),
            in_flight: Arc::new(AtomicBool::new(false)),
            current_cycle: Arc::new(Mutex::new(None)),
            logger: LogManager::new("scheduler"),
        }
    }

    pub fn pipeline(&self) -> &Arc<ProcessingPipeline> {
        &self.pipeline
    }

    /// Starts the cycle loop. Returns the interval in effect, which is the existing
    /// one when the scheduler is already running.
    pub fn start(&self, interval: Duration) -> Result<Duration, ControlError> {
        let pipeline = Arc::clone(&self.pipeline);
        let in_flight = Arc::clone(&self.in_flight);
        let current_cycle = Arc::clone(&self.current_cycle);
        let logger = self.logger;

        self.task.start(interval, move |stop| {
            let pipeline = Arc::clone(&pipeline);
            let in_flight = Arc::clone(&in_flight);
            let current_cycle = Arc::clone(&current_cycle);
            let stop = stop.clone();
            async move {
                let Some(guard) = InFlightGuard::acquire(&in_flight) else {
                    pipeline.metrics().record_skipped_tick();
                    logger.debug("previous cycle still running, tick skipped");
                    return;
                };
                let handle = tokio::spawn(async move {
                    let _guard = guard;
                    match pipeline.run_once_until(&stop).await {
                        Ok(_) => {}
                        Err(PipelineError::Stopped) => logger.debug("in-flight cycle abandoned on stop"),
                        Err(err) => logger.debug(&format!("cycle failed, retrying next tick: {}", err)),
                    }
                });
                *current_cycle.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
            }
        })
    }

    /// Signals the loop to stop. An in-flight cycle finishes its current I/O call and
    /// then exits without publishing. Returns false when the scheduler was already stopped.
    pub fn stop(&self) -> bool {
        self.task.stop().is_some()
    }

    /// Stops the loop and waits for it and any in-flight cycle to finish.
    pub async fn stop_and_wait(&self) {
        if let Some(handle) = self.task.stop() {
            let _ = handle.await;
        }
        let cycle = self
            .current_cycle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(cycle) = cycle {
            let _ = cycle.await;
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.is_running()
    }

    pub fn interval(&self) -> Option<Duration> {
        self.task.interval()
    }

    pub fn is_cycle_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn skipped_ticks(&self) -> u64 {
        self.pipeline.metrics().snapshot().skipped_ticks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::pipeline::tests::{car, three_slot_map, ScriptedDetector, StaticSource};
    use crate::processing::pipeline::PipelineSettings;
    use std::sync::atomic::Ordering;
    use tokio::time;

    fn scheduler_with(detector: Arc<ScriptedDetector>) -> AutoProcessingScheduler {
        let pipeline = ProcessingPipeline::new(
            three_slot_map(),
            Arc::new(StaticSource::healthy()),
            detector,
            &PipelineSettings::default(),
        )
        .unwrap();
        AutoProcessingScheduler::new(Arc::new(pipeline))
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn slow_cycles_never_overlap_and_skips_are_counted() {
        let mut detector = ScriptedDetector::new(vec![car(0.0, 10.0)]);
        detector.delay = Duration::from_millis(60);
        let detector = Arc::new(detector);
        let scheduler = scheduler_with(Arc::clone(&detector));

        scheduler.start(Duration::from_millis(10)).unwrap();
        time::sleep(Duration::from_millis(250)).await;
        scheduler.stop_and_wait().await;

        let calls = detector.calls.load(Ordering::SeqCst);
        assert_eq!(detector.max_active.load(Ordering::SeqCst), 1);
        assert!(calls >= 2);
        assert!(scheduler.skipped_ticks() > 0);
        assert!(!scheduler.is_cycle_in_flight());

        // A cycle caught mid-detection by the stop is discarded.
        let published = scheduler.pipeline().history().len();
        assert!(published == calls || published + 1 == calls);
        assert_eq!(
            scheduler.pipeline().metrics().snapshot().cycles_completed as usize,
            published
        );
    }

    #[tokio::test]
    async fn start_twice_keeps_first_interval() {
        let scheduler = scheduler_with(Arc::new(ScriptedDetector::new(vec![])));
        let first = scheduler.start(Duration::from_millis(50)).unwrap();
        let second = scheduler.start(Duration::from_millis(5)).unwrap();
        assert_eq!(first, Duration::from_millis(50));
        assert_eq!(second, Duration::from_millis(50));
        assert_eq!(scheduler.interval(), Some(Duration::from_millis(50)));

        assert!(scheduler.stop());
        assert!(!scheduler.stop());
        assert!(!scheduler.is_running());
    }

    #[tokio::test]
    async fn no_cycles_start_after_stop() {
        let detector = Arc::new(ScriptedDetector::new(vec![]));
        let scheduler = scheduler_with(Arc::clone(&detector));
        scheduler.start(Duration::from_millis(10)).unwrap();
        time::sleep(Duration::from_millis(45)).await;
        scheduler.stop_and_wait().await;

        let calls = detector.calls.load(Ordering::SeqCst);
        assert!(calls >= 1);
        time::sleep(Duration::from_millis(50)).await;
        assert_eq!(detector.calls.load(Ordering::SeqCst), calls);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn stop_during_fetch_skips_detection_and_publishing() {
        let source = StaticSource {
            fail: std::sync::atomic::AtomicBool::new(false),
            delay: Duration::from_millis(200),
        };
        let detector = Arc::new(ScriptedDetector::new(vec![car(0.0, 10.0)]));
        let pipeline = ProcessingPipeline::new(
            three_slot_map(),
            Arc::new(source),
            detector.clone(),
            &PipelineSettings::default(),
        )
        .unwrap();
        let scheduler = AutoProcessingScheduler::new(Arc::new(pipeline));

        scheduler.start(Duration::from_millis(10)).unwrap();
        time::sleep(Duration::from_millis(50)).await;
        assert!(scheduler.is_cycle_in_flight());
        assert!(scheduler.stop());
        time::sleep(Duration::from_millis(400)).await;

        assert_eq!(detector.calls.load(Ordering::SeqCst), 0);
        assert!(scheduler.pipeline().history().is_empty());
        assert!(!scheduler.is_cycle_in_flight());
        assert_eq!(scheduler.pipeline().metrics().snapshot().cycles_completed, 0);
    }

    #[tokio::test]
    async fn failing_cycles_do_not_stop_the_loop() {
        let source = StaticSource::healthy();
        source.fail.store(true, Ordering::SeqCst);
        let pipeline = ProcessingPipeline::new(
            three_slot_map(),
            Arc::new(source),
            Arc::new(ScriptedDetector::new(vec![])),
            &PipelineSettings::default(),
        )
        .unwrap();
        let scheduler = AutoProcessingScheduler::new(Arc::new(pipeline));

        scheduler.start(Duration::from_millis(10)).unwrap();
        time::sleep(Duration::from_millis(60)).await;
        assert!(scheduler.is_running());
        scheduler.stop_and_wait().await;

        let metrics = scheduler.pipeline().metrics().snapshot();
        assert!(metrics.fetch_failures >= 2);
        assert!(scheduler.pipeline().history().is_empty());
    }
}
