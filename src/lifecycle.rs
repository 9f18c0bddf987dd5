//! In-flight callback accounting for safe teardown.
//!
//! Every hook body runs under an [`InflightGuard`]; deregistration waits
//! for the count to reach zero before completing so no callback touches
//! freed state. Early-filtered operations never enter the counter.

use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Process-wide counter of hook bodies currently executing.
#[derive(Default)]
pub struct InflightCounter {
    active: AtomicUsize,
    lock: Mutex<()>,
    idle: Condvar,
}

impl InflightCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter a hook body. The returned guard decrements on drop, so every
    /// exit path is covered.
    pub fn enter(&self) -> InflightGuard<'_> {
        self.active.fetch_add(1, Ordering::AcqRel);
        InflightGuard { counter: self }
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    /// Block until no hook body is executing.
    pub fn wait_idle(&self) {
        let mut guard = self.lock.lock();
        while self.active.load(Ordering::Acquire) != 0 {
            self.idle.wait(&mut guard);
        }
    }

    /// Block until idle or `timeout` elapses; returns whether the counter
    /// reached zero.
    pub fn wait_idle_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut guard = self.lock.lock();
        while self.active.load(Ordering::Acquire) != 0 {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            if self.idle.wait_for(&mut guard, deadline - now).timed_out() {
                return self.active.load(Ordering::Acquire) == 0;
            }
        }
        true
    }
}

/// RAII handle for one executing hook body.
pub struct InflightGuard<'a> {
    counter: &'a InflightCounter,
}

impl Drop for InflightGuard<'_> {
    fn drop(&mut self) {
        if self.counter.active.fetch_sub(1, Ordering::AcqRel) == 1 {
            // Takes the lock so a concurrent wait_idle cannot miss the
            // transition to zero.
            let _guard = self.counter.lock.lock();
            self.counter.idle.notify_all();
        }
    }
}
