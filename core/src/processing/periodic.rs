use crate::prelude::ControlError;
use crate::telemetry::LogManager;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

struct RunningLoop {
    interval: Duration,
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Start/stop lifecycle shared by the background loops.
///
/// The loop checks the stop signal before every tick; a stop never interrupts a
/// callback that is already running.
pub(crate) struct PeriodicTask {
    name: &'static str,
    state: Mutex<Option<RunningLoop>>,
}

impl PeriodicTask {
    pub(crate) fn new(name: &'static str) -> Self {
        Self {
            name,
            state: Mutex::new(None),
        }
    }

    fn state(&self) -> MutexGuard<'_, Option<RunningLoop>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Spawns the loop, or returns the current interval if it is already running.
    ///
    /// Each tick receives the loop's stop receiver so work outliving the tick can
    /// notice a later stop.
    pub(crate) fn start<F, Fut>(&self, interval: Duration, mut on_tick: F) -> Result<Duration, ControlError>
    where
        F: FnMut(&watch::Receiver<bool>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if interval.is_zero() {
            return Err(ControlError::ZeroInterval);
        }

        let mut state = self.state();
        if let Some(running) = state.as_ref() {
            if !running.handle.is_finished() {
                return Ok(running.interval);
            }
        }

        let runtime = Handle::try_current().map_err(|_| ControlError::NoRuntime)?;
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let logger = LogManager::new(self.name);

        let handle = runtime.spawn(async move {
            logger.record(&format!("loop started ({} ms interval)", interval.as_millis()));
            let mut ticker = time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    biased;
                    _ = stop_rx.changed() => break,
                    _ = ticker.tick() => {}
                }
                if *stop_rx.borrow() {
                    break;
                }
                on_tick(&stop_rx).await;
            }
            logger.record("loop stopped");
        });

        *state = Some(RunningLoop {
            interval,
            stop_tx,
            handle,
        });
        Ok(interval)
    }

    /// Signals the loop to stop and hands back its task handle; `None` if it was not running.
    pub(crate) fn stop(&self) -> Option<JoinHandle<()>> {
        let running = self.state().take()?;
        let _ = running.stop_tx.send(true);
        Some(running.handle)
    }

    pub(crate) fn is_running(&self) -> bool {
        self.state()
            .as_ref()
            .map_or(false, |running| !running.handle.is_finished())
    }

    pub(crate) fn interval(&self) -> Option<Duration> {
        self.state().as_ref().map(|running| running.interval)
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        if let Some(running) = self.state().take() {
            let _ = running.stop_tx.send(true);
        }
    }
}
