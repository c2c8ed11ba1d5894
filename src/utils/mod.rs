//! Small shared concurrency helpers for the background service loops.

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// One-way stop signal that interval loops sleep against, so shutdown does
/// not have to wait out a full interval.
pub(crate) struct StopLatch {
    stopped: Mutex<bool>,
    cv: Condvar,
}

impl StopLatch {
    pub fn new() -> Self {
        StopLatch {
            stopped: Mutex::new(false),
            cv: Condvar::new(),
        }
    }

    pub fn trigger(&self) {
        let mut stopped = self.stopped.lock();
        *stopped = true;
        self.cv.notify_all();
    }

    /// Sleeps up to `timeout` and reports whether the latch was triggered.
    pub fn wait_for(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut stopped = self.stopped.lock();
        while !*stopped {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            self.cv.wait_for(&mut stopped, deadline - now);
        }
        true
    }
}

/// Handle to a named background loop; stopping triggers the latch and joins
/// the thread. Dropping the handle stops the loop.
pub(crate) struct ServiceHandle {
    latch: Arc<StopLatch>,
    thread: Option<JoinHandle<()>>,
}

impl ServiceHandle {
    pub fn stop(&mut self) {
        self.latch.trigger();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for ServiceHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Spawns a named thread running `tick` once per `interval` until stopped.
pub(crate) fn spawn_interval<F>(
    name: String,
    interval: Duration,
    mut tick: F,
) -> io::Result<ServiceHandle>
where
    F: FnMut() + Send + 'static,
{
    let latch = Arc::new(StopLatch::new());
    let stop = latch.clone();
    let thread = thread::Builder::new().name(name).spawn(move || {
        while !stop.wait_for(interval) {
            tick();
        }
    })?;
    Ok(ServiceHandle {
        latch,
        thread: Some(thread),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn interval_loop_ticks_and_stops_promptly() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = ticks.clone();
        let mut handle = spawn_interval(
            "test-interval".to_string(),
            Duration::from_millis(20),
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
            },
        )
        .unwrap();
        thread::sleep(Duration::from_millis(110));
        let started = Instant::now();
        handle.stop();
        assert!(started.elapsed() < Duration::from_millis(100));
        assert!(ticks.load(Ordering::SeqCst) >= 3);
    }

    #[test]
    fn triggered_latch_returns_immediately() {
        let latch = StopLatch::new();
        latch.trigger();
        let started = Instant::now();
        assert!(latch.wait_for(Duration::from_secs(5)));
        assert!(started.elapsed() < Duration::from_millis(50));
    }
}
