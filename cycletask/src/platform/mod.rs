/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Platform seams consumed by the engine.
//!
//! The engine never touches a hardware counter, a sync interrupt or a
//! watchdog timer directly.  Each of those is reached through a trait so the
//! same lifecycle / timing / waiter code runs against the hosted
//! implementations in this module, a board support package, or the test
//! doubles in `testing`.
//!
//! ```text
//! Platform
//! ├── ticks     : TickSource        – free-running tick counter (Cyclic mode)
//! ├── sync      : SyncSource        – external sync pulses      (Sync mode)
//! ├── watchdog  : WatchdogDriver    – supervisory timers
//! └── stats     : CycleStatistics   – cycle start / end hooks
//! ```

pub mod sync;
pub mod tick;
pub mod wdog;

#[cfg(test)]
pub(crate) mod testing;

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

pub use sync::SoftSync;
pub use tick::{ManualTicks, SystemTicks};
pub use wdog::SoftwareWatchdog;

// ── Identifiers ───────────────────────────────────────────────────────────────

/// Handle of an open sync session.  Sessions are scoped to a module name and
/// shared by every task of that module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SyncSession(pub u32);

/// Handle of one handler registration made with [`SyncSource::attach`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttachId(pub u32);

/// Handle of a watchdog created with [`WatchdogDriver::create`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchdogId(pub u32);

/// Edge of the sync signal a handler is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncEdge {
    Rising,
    /// The normal choice for application tasks.
    #[default]
    Falling,
}

impl fmt::Display for SyncEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncEdge::Rising => write!(f, "rising"),
            SyncEdge::Falling => write!(f, "falling"),
        }
    }
}

/// Sync pulse timing as reported by the platform: the signal is high for
/// `high_us` and low for `low_us`, one pulse period is their sum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SyncPulseTiming {
    pub high_us: u32,
    pub low_us: u32,
}

impl SyncPulseTiming {
    pub fn new(high_us: u32, low_us: u32) -> Self {
        Self { high_us, low_us }
    }

    /// Pulse period in µs.  Saturates instead of wrapping.
    pub fn period_us(&self) -> u32 {
        self.high_us.saturating_add(self.low_us)
    }

    /// A usable configuration has both sub-intervals non-zero.
    pub fn is_consistent(&self) -> bool {
        self.high_us != 0 && self.low_us != 0 && self.period_us() != 0
    }
}

/// Handler invoked from the sync pulse context.  Must not block.
pub type SyncHandler = Arc<dyn Fn() + Send + Sync>;

// ── Errors ────────────────────────────────────────────────────────────────────

/// Failures reported by the platform seams.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlatformError {
    #[error("could not start sync session for module '{module}'")]
    SyncSessionUnavailable { module: String },

    #[error("sync session {0:?} is not open")]
    UnknownSyncSession(SyncSession),

    #[error("could not attach handler to sync session {session:?}: {reason}")]
    AttachFailed { session: SyncSession, reason: String },

    #[error("could not create watchdog for '{owner}' ({period_us} µs)")]
    WatchdogUnavailable { owner: String, period_us: u32 },
}

// ── Traits ────────────────────────────────────────────────────────────────────

/// Free-running tick counter.
///
/// The counter wraps at `u32::MAX`; all grid arithmetic uses wrapping
/// subtraction so a wrap is invisible to the engine.
pub trait TickSource: Send + Sync {
    /// Current counter value.
    fn now(&self) -> u32;

    /// Ticks per second.
    fn rate_hz(&self) -> u32;
}

/// External sync pulse subsystem.
pub trait SyncSource: Send + Sync {
    /// Open (or join) the session of `module`.  Repeated calls for the same
    /// module return the same session.
    fn start_session(&self, module: &str) -> Result<SyncSession, PlatformError>;

    /// Release one reference to `session`.  The last release detaches every
    /// handler still registered on it.
    fn stop_session(&self, session: SyncSession);

    /// Timing of the sync signal as configured on this platform.
    fn pulse_timing(&self) -> SyncPulseTiming;

    /// Call `handler` every `divisor` pulses on `edge`.
    fn attach(
        &self,
        session: SyncSession,
        edge: SyncEdge,
        divisor: u32,
        handler: SyncHandler,
    ) -> Result<AttachId, PlatformError>;

    /// Remove a handler registration.  Unknown ids are ignored.
    fn detach(&self, id: AttachId);
}

/// Supervisory timers.
pub trait WatchdogDriver: Send + Sync {
    /// Create an armed watchdog that expires unless triggered within
    /// `period_us`.
    fn create(&self, owner: &str, period_us: u32) -> Result<WatchdogId, PlatformError>;

    /// Reset the expiry deadline.  Re-enables a disabled watchdog.
    fn trigger(&self, id: WatchdogId);

    /// Suspend supervision without releasing the watchdog.
    fn disable(&self, id: WatchdogId);

    /// Release the watchdog.  Unknown ids are ignored.
    fn delete(&self, id: WatchdogId);
}

/// Timing statistics hooks, called by the cycle waiter right before a task
/// goes idle and right after it wakes.
pub trait CycleStatistics: Send + Sync {
    fn cycle_end(&self, _task: &str) {}
    fn cycle_start(&self, _task: &str) {}
}

/// Statistics sink that records nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoStatistics;

impl CycleStatistics for NoStatistics {}

// ── Platform bundle ───────────────────────────────────────────────────────────

/// Everything the engine needs from the platform, shared by all tasks.
#[derive(Clone)]
pub struct Platform {
    pub ticks: Arc<dyn TickSource>,
    pub sync: Arc<dyn SyncSource>,
    pub watchdog: Arc<dyn WatchdogDriver>,
    pub stats: Arc<dyn CycleStatistics>,
}

impl Platform {
    /// Hosted platform: ticks from the monotonic clock, software sync pulses
    /// and a software watchdog supervisor.
    pub fn hosted(tick_rate_hz: u32, pulse: SyncPulseTiming) -> Self {
        Self {
            ticks: Arc::new(SystemTicks::new(tick_rate_hz)),
            sync: Arc::new(SoftSync::new(pulse)),
            watchdog: Arc::new(SoftwareWatchdog::new()),
            stats: Arc::new(NoStatistics),
        }
    }
}

impl fmt::Debug for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Platform")
            .field("tick_rate_hz", &self.ticks.rate_hz())
            .field("pulse", &self.sync.pulse_timing())
            .finish_non_exhaustive()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pulse_period_is_sum_of_sub_intervals() {
        assert_eq!(SyncPulseTiming::new(300, 700).period_us(), 1_000);
    }

    #[test]
    fn zero_sub_interval_is_inconsistent() {
        assert!(!SyncPulseTiming::new(0, 500).is_consistent());
        assert!(!SyncPulseTiming::new(500, 0).is_consistent());
        assert!(!SyncPulseTiming::default().is_consistent());
        assert!(SyncPulseTiming::new(500, 500).is_consistent());
    }

    #[test]
    fn falling_edge_is_default() {
        assert_eq!(SyncEdge::default(), SyncEdge::Falling);
    }
}
