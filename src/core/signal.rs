//! Stop/wake signal shared by the supervisor, the pipelines and the setters.
//!
//! Waiters sleep on a condition variable and wake early when a setpoint
//! changes ([`EngineSignal::notify`]) or the engine is stopped. Timed waits
//! remain the fallback for the periodic VPN reconciliation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
pub struct EngineSignal {
    stopped: AtomicBool,
    generation: Mutex<u64>,
    cond: Condvar,
}

impl EngineSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request shutdown. Idempotent.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.notify();
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Wake every waiter so it re-evaluates engine state.
    pub fn notify(&self) {
        let mut generation = self.generation.lock().unwrap_or_else(PoisonError::into_inner);
        *generation = generation.wrapping_add(1);
        self.cond.notify_all();
    }

    /// Sleep up to `timeout`. Returns `true` if woken by [`notify`](Self::notify)
    /// or [`stop`](Self::stop), `false` if the full timeout elapsed.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut generation = self.generation.lock().unwrap_or_else(PoisonError::into_inner);
        let start = *generation;
        loop {
            if self.is_stopped() || *generation != start {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = self
                .cond
                .wait_timeout(generation, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            generation = guard;
        }
    }
}
