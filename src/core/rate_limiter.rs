//! Dual token bucket rate limiter (one bucket per direction).
//!
//! Tokens are bytes and accrue at the direction's configured rate up to the
//! shared `max_burst` cap. A packet that finds too few tokens suspends the
//! calling pipeline until the deficit has been earned back, which is the
//! backpressure that holds throughput at the configured limit. A packet
//! larger than the bucket waits for a full bucket and pays the rest in
//! refill time.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::core::signal::EngineSignal;
use crate::core::state::{Direction, EngineState};

/// A single token bucket. All operations take the current time explicitly.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    tokens: f64,
    max_burst: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// A bucket holding exactly `max_burst` tokens.
    pub fn full(max_burst: f64, now: Instant) -> Self {
        Self {
            tokens: max_burst,
            max_burst,
            last_refill: now,
        }
    }

    pub fn tokens(&self) -> f64 {
        self.tokens
    }

    pub fn max_burst(&self) -> f64 {
        self.max_burst
    }

    /// Credit the time since the last refill at `rate` tokens/s, capped at `max_burst`.
    /// Moves `last_refill` to `now` so the same interval is never credited twice.
    pub fn refill(&mut self, now: Instant, rate: f64) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * rate).min(self.max_burst);
        if now > self.last_refill {
            self.last_refill = now;
        }
    }

    /// Tokens still missing before a packet of `size` may pass.
    /// Oversized packets only need a full bucket.
    pub fn deficit(&self, size: f64) -> f64 {
        (size.min(self.max_burst) - self.tokens).max(0.0)
    }

    /// Spend `size` tokens at `rate` tokens/s. Whatever the bucket cannot
    /// cover is charged as time: `last_refill` moves past `now` by
    /// `excess / rate`, so no tokens accrue until the excess is paid off.
    pub fn consume(&mut self, size: f64, now: Instant, rate: f64) {
        if now > self.last_refill {
            self.last_refill = now;
        }
        let excess = size - self.tokens;
        if excess <= 0.0 {
            self.tokens -= size;
            return;
        }
        self.tokens = 0.0;
        if rate > 0.0 {
            self.last_refill += Duration::from_secs_f64(excess / rate);
        }
    }

    /// Time already charged beyond `now` by oversized packets.
    pub fn charged_ahead(&self, now: Instant) -> Duration {
        self.last_refill.saturating_duration_since(now)
    }

    /// Refill to `max_burst` and restart the clock.
    pub fn reset(&mut self, now: Instant) {
        self.tokens = self.max_burst;
        self.last_refill = now;
    }
}

/// Per-direction buckets. Each bucket is only locked by its own pipeline
/// and by [`RateLimiter::update_limiting_state`].
#[derive(Debug)]
pub struct RateLimiter {
    buckets: [Mutex<TokenBucket>; 2],
    max_burst: f64,
}

impl RateLimiter {
    pub fn new(max_burst_bytes: u64) -> Self {
        let max_burst = max_burst_bytes as f64;
        let now = Instant::now();
        Self {
            buckets: [
                Mutex::new(TokenBucket::full(max_burst, now)),
                Mutex::new(TokenBucket::full(max_burst, now)),
            ],
            max_burst,
        }
    }

    pub fn max_burst(&self) -> f64 {
        self.max_burst
    }

    /// Current token level for `direction` (bytes).
    pub fn tokens(&self, direction: Direction) -> f64 {
        self.bucket(direction).tokens()
    }

    fn bucket(&self, direction: Direction) -> MutexGuard<'_, TokenBucket> {
        self.buckets[direction.index()]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Gate a packet of `size` bytes travelling in `direction`.
    ///
    /// Returns immediately when limiting is off or the direction is unlimited.
    /// Otherwise blocks until enough tokens have accrued, then consumes them.
    /// The bucket lock is released while suspended; the suspension wakes early
    /// on any engine signal and simply re-measures. Returns the time spent
    /// suspended.
    pub fn throttle(
        &self,
        state: &EngineState,
        direction: Direction,
        size: usize,
        signal: &EngineSignal,
    ) -> Duration {
        let started = Instant::now();
        let size = size as f64;
        let mut suspended = false;

        loop {
            if !state.limiting_active() {
                break;
            }
            let rate = state.limit_bytes_per_sec(direction) as f64;
            if rate <= 0.0 {
                break;
            }

            let wait = {
                let mut bucket = self.bucket(direction);
                let now = Instant::now();
                bucket.refill(now, rate);
                let deficit = bucket.deficit(size);
                if deficit <= 0.0 {
                    bucket.consume(size, now, rate);
                    break;
                }
                Duration::from_secs_f64(deficit / rate) + bucket.charged_ahead(now)
            };

            if signal.is_stopped() {
                break;
            }
            suspended = true;
            signal.wait_timeout(wait);
        }

        if suspended {
            started.elapsed()
        } else {
            Duration::ZERO
        }
    }

    /// Recompute `limiting_active` from the current limits. When limiting is
    /// (re)activated both buckets are reset to `max_burst` so tokens depleted
    /// under a previous configuration cannot stall the first packets.
    pub fn update_limiting_state(&self, state: &EngineState) -> bool {
        let active = state.download_limit() > 0 || state.upload_limit() > 0;
        state.set_limiting_active(active);
        if active {
            let now = Instant::now();
            for direction in Direction::ALL {
                self.bucket(direction).reset(now);
            }
        }
        tracing::debug!(
            "Limiting {} (download={} KiB/s, upload={} KiB/s)",
            if active { "active" } else { "inactive" },
            state.download_limit(),
            state.upload_limit()
        );
        active
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;

    fn state_with_limits(download_kib: u64, upload_kib: u64) -> EngineState {
        let state = EngineState::new(&EngineConfig::default());
        state.set_limit(Direction::Inbound, download_kib);
        state.set_limit(Direction::Outbound, upload_kib);
        state
    }

    #[test]
    fn test_refill_is_capped_at_max_burst() {
        let t0 = Instant::now();
        let mut bucket = TokenBucket::full(100.0, t0);
        bucket.consume(100.0, t0, 50.0);
        bucket.refill(t0 + Duration::from_secs(10), 50.0);
        assert_eq!(bucket.tokens(), 100.0);
    }

    #[test]
    fn test_refill_does_not_credit_the_same_interval_twice() {
        let t0 = Instant::now();
        let mut bucket = TokenBucket::full(1000.0, t0);
        bucket.consume(1000.0, t0, 10.0);
        let t1 = t0 + Duration::from_secs(1);
        bucket.refill(t1, 10.0);
        bucket.refill(t1, 10.0);
        assert!((bucket.tokens() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_oversized_consume_is_charged_as_refill_time() {
        // 25 tokens from a 10-token bucket at 10 tokens/s: 15 tokens (1.5 s) of excess.
        let t0 = Instant::now();
        let mut bucket = TokenBucket::full(10.0, t0);
        bucket.consume(25.0, t0, 10.0);
        assert_eq!(bucket.tokens(), 0.0);

        bucket.refill(t0 + Duration::from_secs(1), 10.0);
        assert_eq!(bucket.tokens(), 0.0);
        bucket.refill(t0 + Duration::from_secs(2), 10.0);
        assert!((bucket.tokens() - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_oversized_packet_only_needs_a_full_bucket() {
        let t0 = Instant::now();
        let mut bucket = TokenBucket::full(100.0, t0);
        assert_eq!(bucket.deficit(500.0), 0.0);
        bucket.consume(40.0, t0, 10.0);
        assert!((bucket.deficit(500.0) - 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_throttle_is_noop_when_limiting_inactive() {
        let limiter = RateLimiter::new(1024);
        let state = state_with_limits(0, 0);
        limiter.update_limiting_state(&state);
        assert!(!state.limiting_active());

        let signal = EngineSignal::new();
        let waited = limiter.throttle(&state, Direction::Outbound, 10 * 1024 * 1024, &signal);
        assert_eq!(waited, Duration::ZERO);
        assert_eq!(limiter.tokens(Direction::Outbound), 1024.0);
    }

    #[test]
    fn test_throttle_is_noop_for_unlimited_direction() {
        let limiter = RateLimiter::new(1024);
        let state = state_with_limits(0, 1);
        limiter.update_limiting_state(&state);
        assert!(state.limiting_active());

        let signal = EngineSignal::new();
        let waited = limiter.throttle(&state, Direction::Inbound, 1024 * 1024, &signal);
        assert_eq!(waited, Duration::ZERO);
        assert_eq!(limiter.tokens(Direction::Inbound), 1024.0);
    }

    #[test]
    fn test_burst_within_capacity_passes_without_suspension() {
        let limiter = RateLimiter::new(64 * 1024);
        let state = state_with_limits(1, 1);
        limiter.update_limiting_state(&state);

        let signal = EngineSignal::new();
        let start = Instant::now();
        for _ in 0..4 {
            let waited = limiter.throttle(&state, Direction::Inbound, 16 * 1024, &signal);
            assert_eq!(waited, Duration::ZERO);
        }
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[test]
    fn test_sustained_rate_converges_to_limit() {
        // 2 KiB burst, 100 KiB/s limit, 42 KiB offered in 1 KiB packets.
        let limiter = RateLimiter::new(2 * 1024);
        let state = state_with_limits(0, 100);
        limiter.update_limiting_state(&state);
        let signal = EngineSignal::new();

        let start = Instant::now();
        for _ in 0..42 {
            limiter.throttle(&state, Direction::Outbound, 1024, &signal);
        }
        let elapsed = start.elapsed().as_secs_f64();

        // 40 KiB beyond the burst at 100 KiB/s is 0.4 s.
        let rate = (40.0 * 1024.0) / elapsed;
        let limit = 100.0 * 1024.0;
        assert!(elapsed >= 0.35, "finished too fast: {elapsed:.3}s");
        assert!(rate <= limit * 1.15, "rate {rate:.0} B/s above limit");
        assert!(rate >= limit * 0.5, "rate {rate:.0} B/s far below limit");
    }

    #[test]
    fn test_packets_larger_than_burst_still_converge_to_limit() {
        // 1 KiB burst, 100 KiB/s limit, 40 packets of 2 KiB each.
        let limiter = RateLimiter::new(1024);
        let state = state_with_limits(0, 100);
        limiter.update_limiting_state(&state);
        let signal = EngineSignal::new();

        let start = Instant::now();
        for _ in 0..40 {
            limiter.throttle(&state, Direction::Outbound, 2048, &signal);
        }
        let elapsed = start.elapsed().as_secs_f64();

        // Everything beyond the initial 1 KiB burst is paid at 100 KiB/s: 0.78 s.
        let rate = (40.0 * 2048.0 - 1024.0) / elapsed;
        let limit = 100.0 * 1024.0;
        assert!(elapsed >= 0.7, "finished too fast: {elapsed:.3}s");
        assert!(rate <= limit * 1.15, "rate {rate:.0} B/s above limit");
        assert!(limiter.tokens(Direction::Outbound) >= 0.0);
    }

    #[test]
    fn test_directions_are_independent() {
        let limiter = RateLimiter::new(4096);
        let state = state_with_limits(1, 1);
        limiter.update_limiting_state(&state);
        let signal = EngineSignal::new();

        limiter.throttle(&state, Direction::Outbound, 4096, &signal);
        assert!(limiter.tokens(Direction::Outbound) < 100.0);

        let waited = limiter.throttle(&state, Direction::Inbound, 4096, &signal);
        assert_eq!(waited, Duration::ZERO);
    }

    #[test]
    fn test_update_limiting_state_resets_buckets_to_max_burst() {
        let limiter = RateLimiter::new(8192);
        let state = state_with_limits(1, 1);
        limiter.update_limiting_state(&state);
        let signal = EngineSignal::new();
        limiter.throttle(&state, Direction::Inbound, 8192, &signal);
        limiter.throttle(&state, Direction::Outbound, 8192, &signal);
        assert!(limiter.tokens(Direction::Inbound) < 8192.0);

        state.set_limit(Direction::Inbound, 0);
        state.set_limit(Direction::Outbound, 0);
        assert!(!limiter.update_limiting_state(&state));

        state.set_limit(Direction::Inbound, 50);
        assert!(limiter.update_limiting_state(&state));
        assert_eq!(limiter.tokens(Direction::Inbound), 8192.0);
        assert_eq!(limiter.tokens(Direction::Outbound), 8192.0);
    }

    #[test]
    fn test_stop_signal_releases_suspended_packet() {
        let limiter = std::sync::Arc::new(RateLimiter::new(1024));
        let state = std::sync::Arc::new(state_with_limits(0, 1));
        limiter.update_limiting_state(&state);
        let signal = std::sync::Arc::new(EngineSignal::new());
        limiter.throttle(&state, Direction::Outbound, 1024, &signal);

        // Next 1 KiB at 1 KiB/s would wait about a second.
        let worker = {
            let (limiter, state, signal) = (limiter.clone(), state.clone(), signal.clone());
            std::thread::spawn(move || limiter.throttle(&state, Direction::Outbound, 1024, &signal))
        };
        std::thread::sleep(Duration::from_millis(50));
        signal.stop();
        let waited = worker.join().unwrap();
        assert!(waited < Duration::from_millis(900));
    }
}
