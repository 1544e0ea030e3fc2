/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Pure time-grid arithmetic.
//!
//! These are free functions rather than methods so the cycle waiter's
//! decisions can be tested against exact tick values without threads,
//! channels or clocks.

// ── Period conversion ─────────────────────────────────────────────────────────

/// Result of converting a period into grid units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridPeriod {
    /// Period in grid units, always ≥ 1.
    pub units: u32,
    /// `true` if the rounded value was below one unit and had to be raised.
    pub clamped: bool,
}

fn round_to_units(value: f64) -> GridPeriod {
    let rounded = value.round();
    if rounded < 1.0 || !rounded.is_finite() {
        GridPeriod {
            units: 1,
            clamped: true,
        }
    } else {
        GridPeriod {
            units: rounded.min(u32::MAX as f64) as u32,
            clamped: false,
        }
    }
}

/// `round(period_ms / 1000 × tick_rate_hz)`, at least 1 tick.
pub fn period_to_ticks(period_ms: f64, tick_rate_hz: u32) -> GridPeriod {
    round_to_units(period_ms * tick_rate_hz as f64 / 1000.0)
}

/// `round(period_ms × 1000 / pulse_period_us)`, at least 1 pulse.
///
/// A zero pulse period is rejected by the caller before this is reached; it
/// yields the clamped minimum here.
pub fn period_to_pulses(period_ms: f64, pulse_period_us: u32) -> GridPeriod {
    if pulse_period_us == 0 {
        return GridPeriod {
            units: 1,
            clamped: true,
        };
    }
    round_to_units(period_ms * 1000.0 / pulse_period_us as f64)
}

// ── Tick-mode wait planning ───────────────────────────────────────────────────

/// What the cycle waiter does for one tick-mode cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPlan {
    /// Grid instant the task wakes for.
    pub cycle_start: u32,
    /// Ticks to block, always ≥ 1.
    pub time_to_wait: u32,
    /// `now − scheduled start` when the grid had fallen behind, else 0.
    pub backlog: u32,
    /// Whole cycles skipped to re-synchronise with the grid.
    pub skipped: u32,
}

impl WaitPlan {
    pub fn has_backlog(&self) -> bool {
        self.backlog != 0
    }
}

/// Plan the wait for the cycle that follows the one that started at
/// `prev_cycle_start`.
///
/// All arithmetic wraps: a scheduled instant already in the past shows up
/// as a `time_to_wait` larger than one period.  A backlog of up to two
/// periods is caught up by waiting a single tick; anything larger skips
/// `backlog / period + 1` whole cycles so the next start lies in the future
/// again.
pub fn plan_tick_wait(prev_cycle_start: u32, period: u32, now: u32) -> WaitPlan {
    let period = period.max(1);
    let max_backlog = period.saturating_mul(2);

    let mut next = prev_cycle_start.wrapping_add(period);
    let mut time_to_wait = next.wrapping_sub(now);
    let mut backlog = 0;
    let mut skipped = 0;

    if time_to_wait == 0 {
        time_to_wait = 1;
    }

    if time_to_wait > period {
        backlog = now.wrapping_sub(next);
        if backlog <= max_backlog {
            time_to_wait = 1;
        } else {
            skipped = backlog / period + 1;
            next = next.wrapping_add(skipped.wrapping_mul(period));
            time_to_wait = next.wrapping_sub(now);
        }
    }

    WaitPlan {
        cycle_start: next,
        time_to_wait,
        backlog,
        skipped,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
