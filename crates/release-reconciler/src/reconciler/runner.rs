//! The loop around [`Reconciler::reconcile`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Notify;

use super::pass::Reconciler;
use crate::error::{ErrorClass, Result};
use crate::watchdog::Watchdog;

/// Stops a [`Runner`] between passes. Cloneable into signal handlers.
#[derive(Clone, Default)]
pub struct StopHandle {
    stopped: Arc<AtomicBool>,
    wake: Arc<Notify>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
        self.wake.notify_waiters();
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }
}

pub struct Runner {
    reconciler: Arc<Reconciler>,
    /// `None` runs a single pass.
    loop_every: Option<Duration>,
    stop: StopHandle,
}

impl Runner {
    pub fn new(reconciler: Arc<Reconciler>, loop_every: Option<Duration>) -> Self {
        Self {
            reconciler,
            loop_every,
            stop: StopHandle::default(),
        }
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Runs passes until stopped, reporting health after each one. A failed
    /// pass is logged and the loop carries on; only fatal errors end it.
    /// Returns the number of passes run.
    pub async fn run(&self, watchdog: Option<&Watchdog>) -> Result<usize> {
        let mut passes = 0;
        while !self.stop.is_stopped() {
            let started = Instant::now();
            match self.reconciler.reconcile().await {
                Ok(report) => log::debug!("Pass report: {:?}", report),
                Err(e) if e.class() == ErrorClass::Fatal => return Err(e),
                Err(e) => log::error!("Reconciliation pass failed: {}", e),
            }
            passes += 1;
            if let Some(watchdog) = watchdog {
                watchdog.report_healthy();
            }

            let Some(every) = self.loop_every else {
                break;
            };
            let remaining = every.saturating_sub(started.elapsed());
            log::debug!("Next pass in {:.0}s", remaining.as_secs_f64());
            let woken = self.stop.wake.notified();
            if self.stop.is_stopped() {
                break;
            }
            tokio::select! {
                _ = tokio::time::sleep(remaining) => {}
                _ = woken => {}
            }
        }
        log::info!("Reconciler stopped after {} passes", passes);
        Ok(passes)
    }
}
