/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Tick counters.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use super::TickSource;

/// Nanoseconds per second
const NSEC_PER_SEC: u64 = 1_000_000_000;

/// Tick counter derived from the monotonic clock.
///
/// Tick 0 is the instant the counter was created.  The value is truncated to
/// `u32`, so it wraps exactly like a 32-bit hardware counter.
#[derive(Debug)]
pub struct SystemTicks {
    epoch: Instant,
    rate_hz: u32,
}

impl SystemTicks {
    /// # Panics
    /// Panics if `rate_hz` is zero.
    pub fn new(rate_hz: u32) -> Self {
        assert!(rate_hz > 0, "Tick rate must be greater than 0");
        Self {
            epoch: Instant::now(),
            rate_hz,
        }
    }
}

impl TickSource for SystemTicks {
    fn now(&self) -> u32 {
        let elapsed = self.epoch.elapsed().as_nanos();
        (elapsed * self.rate_hz as u128 / NSEC_PER_SEC as u128) as u32
    }

    fn rate_hz(&self) -> u32 {
        self.rate_hz
    }
}

/// Tick counter that only moves when told to.
///
/// Used for simulation and for exercising the cycle waiter against exact
/// tick values.
#[derive(Debug)]
pub struct ManualTicks {
    now: AtomicU32,
    rate_hz: u32,
}

impl ManualTicks {
    pub fn new(rate_hz: u32) -> Self {
        Self {
            now: AtomicU32::new(0),
            rate_hz,
        }
    }

    pub fn set(&self, ticks: u32) {
        self.now.store(ticks, Ordering::SeqCst);
    }

    /// Advance by `ticks`, wrapping at `u32::MAX`.
    pub fn advance(&self, ticks: u32) {
        let _ = self
            .now
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| {
                Some(v.wrapping_add(ticks))
            });
    }
}

impl TickSource for ManualTicks {
    fn now(&self) -> u32 {
        self.now.load(Ordering::SeqCst)
    }

    fn rate_hz(&self) -> u32 {
        self.rate_hz
    }
}

/// Wall-clock length of `ticks` at `rate_hz`.
///
/// A zero rate is treated as 1 Hz.
pub fn ticks_to_duration(ticks: u32, rate_hz: u32) -> Duration {
    let rate = rate_hz.max(1) as u64;
    Duration::from_nanos(ticks as u64 * NSEC_PER_SEC / rate)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_ticks_start_near_zero_and_advance() {
        let ticks = SystemTicks::new(1_000);
        let t0 = ticks.now();
        assert!(t0 < 50, "fresh counter should be close to zero, got {t0}");
        std::thread::sleep(Duration::from_millis(20));
        let t1 = ticks.now();
        assert!(t1.wrapping_sub(t0) >= 15, "counter should have advanced");
    }

    #[test]
    fn manual_ticks_wrap_at_u32_max() {
        let ticks = ManualTicks::new(1_000);
        ticks.set(u32::MAX - 1);
        ticks.advance(3);
        assert_eq!(ticks.now(), 1);
    }

    #[test]
    fn ticks_to_duration_uses_rate() {
        assert_eq!(ticks_to_duration(10, 1_000), Duration::from_millis(10));
        assert_eq!(ticks_to_duration(1, 100), Duration::from_millis(10));
        assert_eq!(ticks_to_duration(5, 0), Duration::from_secs(5));
    }
}
