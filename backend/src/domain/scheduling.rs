//! Injected timing capabilities and the periodic task runner.
//!
//! Every background loop runs through [`PeriodicTask`]: a tick runs to
//! completion, then the loop waits one interval before the next tick, so ticks
//! of the same job never overlap. Stopping waits for an in-flight tick rather
//! than cancelling it.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Async sleeping abstraction so timer-driven code can run on simulated time.
#[async_trait]
pub trait Sleeper: Send + Sync {
    /// Suspend execution for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// [`Sleeper`] backed by the tokio timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Work executed once per interval by a [`PeriodicTask`].
#[async_trait]
pub trait PeriodicJob: Send + Sync + 'static {
    /// Name used in log fields.
    fn name(&self) -> &'static str;

    /// Run one tick. Failures are logged by the job; a tick never aborts the loop.
    async fn run_tick(&self);
}

/// Handle on a spawned periodic loop.
pub struct PeriodicTask {
    name: &'static str,
    stop_tx: watch::Sender<bool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl PeriodicTask {
    /// Spawn `job`, running the first tick immediately.
    pub fn spawn(job: Arc<dyn PeriodicJob>, interval: Duration, sleeper: Arc<dyn Sleeper>) -> Self {
        let name = job.name();
        let (stop_tx, mut stop_rx) = watch::channel(false);
        info!(job = name, interval_secs = interval.as_secs(), "starting periodic task");

        let handle = tokio::spawn(async move {
            loop {
                if *stop_rx.borrow() {
                    break;
                }
                debug!(job = name, "tick started");
                job.run_tick().await;
                debug!(job = name, "tick finished");

                tokio::select! {
                    () = sleeper.sleep(interval) => {}
                    _ = stop_rx.changed() => break,
                }
            }
            info!(job = name, "periodic task stopped");
        });

        Self {
            name,
            stop_tx,
            handle: Mutex::new(Some(handle)),
        }
    }

    /// Job name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Stop the loop, waiting for an in-flight tick to finish.
    ///
    /// Calling `stop` more than once is harmless.
    pub async fn stop(&self) {
        self.stop_tx.send_replace(true);
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(handle) = handle else {
            return;
        };
        if let Err(err) = handle.await {
            warn!(job = self.name, error = %err, "periodic task ended abnormally");
        }
    }
}
