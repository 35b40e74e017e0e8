//! Liveness of last resort.
//!
//! The loop reports health after every pass. If it stops doing so for longer
//! than the timeout, the expiry action runs on the watchdog thread; by
//! default it terminates the process so the supervisor restarts it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const MIN_TIMEOUT: Duration = Duration::from_secs(600);
const DEFAULT_TICK: Duration = Duration::from_secs(1);

/// Runs once when the deadline is missed, with the time since the last report.
pub type ExpiryAction = Box<dyn FnOnce(Duration) + Send + 'static>;

/// `max(600 s, 2 × loop interval)`.
pub fn default_timeout(loop_every: Duration) -> Duration {
    MIN_TIMEOUT.max(loop_every.saturating_mul(2))
}

fn exit_process(silence: Duration) {
    log::error!(
        "No healthy pass reported for {:.0}s, terminating",
        silence.as_secs_f64()
    );
    std::process::exit(1);
}

struct Shared {
    last_healthy: Mutex<Instant>,
    shutdown: AtomicBool,
}

/// Stops watching when dropped.
pub struct Watchdog {
    shared: Arc<Shared>,
    timeout: Duration,
    handle: Option<JoinHandle<()>>,
}

impl Watchdog {
    /// Starts a watchdog that exits the process on expiry.
    pub fn start(timeout: Duration) -> std::io::Result<Self> {
        Self::start_with(timeout, DEFAULT_TICK, Box::new(exit_process))
    }

    pub fn start_with(
        timeout: Duration,
        tick: Duration,
        on_expiry: ExpiryAction,
    ) -> std::io::Result<Self> {
        let shared = Arc::new(Shared {
            last_healthy: Mutex::new(Instant::now()),
            shutdown: AtomicBool::new(false),
        });
        let watched = Arc::clone(&shared);

        let handle = thread::Builder::new()
            .name("reconciler-watchdog".into())
            .spawn(move || watch(watched, timeout, tick, on_expiry))?;

        log::debug!("Watchdog started with a {}s timeout", timeout.as_secs());
        Ok(Self {
            shared,
            timeout,
            handle: Some(handle),
        })
    }

    pub fn report_healthy(&self) {
        let mut last = self
            .shared
            .last_healthy
            .lock()
            .unwrap_or_else(|p| p.into_inner());
        *last = Instant::now();
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

fn watch(shared: Arc<Shared>, timeout: Duration, tick: Duration, on_expiry: ExpiryAction) {
    loop {
        thread::sleep(tick);
        if shared.shutdown.load(Ordering::Acquire) {
            return;
        }
        let silence = shared
            .last_healthy
            .lock()
            .map(|last| last.elapsed())
            .unwrap_or_else(|p| p.into_inner().elapsed());
        if silence > timeout {
            on_expiry(silence);
            return;
        }
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.shared.shutdown.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::{bounded, RecvTimeoutError};

    #[test]
    fn test_default_timeout() {
        assert_eq!(default_timeout(Duration::from_secs(60)), Duration::from_secs(600));
        assert_eq!(default_timeout(Duration::from_secs(900)), Duration::from_secs(1800));
    }

    #[test]
    fn test_expires_without_reports() {
        let (tx, rx) = bounded(1);
        let _dog = Watchdog::start_with(
            Duration::from_millis(50),
            Duration::from_millis(5),
            Box::new(move |silence| {
                let _ = tx.send(silence);
            }),
        )
        .unwrap();
        let silence = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(silence > Duration::from_millis(50));
    }

    #[test]
    fn test_reports_keep_it_alive() {
        let (tx, rx) = bounded::<Duration>(1);
        let dog = Watchdog::start_with(
            Duration::from_millis(200),
            Duration::from_millis(5),
            Box::new(move |silence| {
                let _ = tx.send(silence);
            }),
        )
        .unwrap();
        for _ in 0..10 {
            thread::sleep(Duration::from_millis(30));
            dog.report_healthy();
        }
        assert!(matches!(
            rx.recv_timeout(Duration::from_millis(10)),
            Err(RecvTimeoutError::Timeout)
        ));
        drop(dog);
    }
}
