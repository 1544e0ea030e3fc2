/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Cycle waiter: the end-of-cycle wait of every task.
//!
//! One call to [`CycleWaiter::wait`] per loop iteration, after the task's
//! own work:
//!
//! ```text
//! trigger watchdog
//!   → plan next grid instant (tick mode: backlog / skip policy)
//!   → cycle_end hook → block on wake primitive → cycle_start hook
//!   → persist grid, count backlog / skips
//!   → park on the run/stop gate if the module is not running
//! ```
//!
//! The wake primitive is a bounded channel of capacity one, which gives it
//! binary-semaphore semantics: any number of signals before the task waits
//! collapse into a single wake-up.  Tick mode relies on the receive timing
//! out; sync mode waits without a timeout for the sync handler's signal.

use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver, RecvError, RecvTimeoutError, Sender, TrySendError};
use tracing::trace;

use crate::gate::RunGate;
use crate::platform::tick::ticks_to_duration;
use crate::platform::{CycleStatistics, SyncHandler, TickSource};
use crate::task::TaskCounters;
use crate::timing::math::plan_tick_wait;
use crate::timing::Timing;
use crate::watchdog::Watchdog;

// ── Wake primitive ────────────────────────────────────────────────────────────

/// Sending half of a task's wake primitive.
pub type WakeSender = Sender<()>;

/// Receiving half of a task's wake primitive.
pub type WakeReceiver = Receiver<()>;

/// Create a binary wake primitive, initially unset.
pub fn wake_channel() -> (WakeSender, WakeReceiver) {
    bounded(1)
}

/// Signal the wake primitive.  Never blocks; a signal that is already
/// pending absorbs this one.
///
/// Returns `false` if the receiving task is gone.
pub fn signal(tx: &WakeSender) -> bool {
    match tx.try_send(()) {
        Ok(()) | Err(TrySendError::Full(())) => true,
        Err(TrySendError::Disconnected(())) => false,
    }
}

/// Sync handler that signals `tx`.  This is the whole interrupt-side work.
pub fn wake_handler(tx: WakeSender) -> SyncHandler {
    Arc::new(move || {
        signal(&tx);
    })
}

// ── CycleWaiter ───────────────────────────────────────────────────────────────

/// How one wait went.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CycleOutcome {
    /// Backlog in ticks detected for this cycle (tick mode only).
    pub backlog: u32,
    /// Cycles skipped in this call.
    pub skipped: u32,
    /// The wake primitive was signalled (rather than timing out).
    pub signalled: bool,
    /// The task parked on the run/stop gate.
    pub parked: bool,
}

/// Everything a task needs to wait for its next cycle.
pub struct CycleWaiter {
    name: String,
    timing: Timing,
    wake: WakeReceiver,
    watchdog: Option<Arc<Watchdog>>,
    counters: Arc<TaskCounters>,
    gate: Arc<RunGate>,
    ticks: Arc<dyn TickSource>,
    stats: Arc<dyn CycleStatistics>,
}

impl CycleWaiter {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<String>,
        timing: Timing,
        wake: WakeReceiver,
        watchdog: Option<Arc<Watchdog>>,
        counters: Arc<TaskCounters>,
        gate: Arc<RunGate>,
        ticks: Arc<dyn TickSource>,
        stats: Arc<dyn CycleStatistics>,
    ) -> Self {
        Self {
            name: name.into(),
            timing,
            wake,
            watchdog,
            counters,
            gate,
            ticks,
            stats,
        }
    }

    pub fn timing(&self) -> &Timing {
        &self.timing
    }

    pub fn into_timing(self) -> Timing {
        self.timing
    }

    pub fn counters(&self) -> &TaskCounters {
        &self.counters
    }

    /// Block until the next scheduled cycle start.
    pub fn wait(&mut self) -> CycleOutcome {
        let mut outcome = CycleOutcome::default();

        if let Some(wd) = &self.watchdog {
            wd.trigger();
        }

        // Keep the span between sampling the counter and blocking short.
        let plan = match &self.timing {
            Timing::Cyclic(ct) => Some(plan_tick_wait(
                ct.prev_cycle_start,
                ct.period_ticks,
                self.ticks.now(),
            )),
            Timing::Sync(_) => None,
        };

        self.stats.cycle_end(&self.name);

        outcome.signalled = match plan {
            Some(p) => {
                let timeout = ticks_to_duration(p.time_to_wait, self.ticks.rate_hz());
                match self.wake.recv_timeout(timeout) {
                    Ok(()) => true,
                    Err(RecvTimeoutError::Timeout) => false,
                    Err(RecvTimeoutError::Disconnected) => true,
                }
            }
            // A disconnected channel means the manager is gone: treat as a wake.
            None => match self.wake.recv() {
                Ok(()) => true,
                Err(RecvError) => {
                    trace!(task = %self.name, "Wake channel disconnected");
                    true
                }
            },
        };

        self.stats.cycle_start(&self.name);

        if let (Some(p), Timing::Cyclic(ct)) = (plan, &mut self.timing) {
            ct.prev_cycle_start = p.cycle_start;
            ct.next_cycle_start = p.cycle_start.wrapping_add(ct.period_ticks);
            outcome.backlog = p.backlog;
            outcome.skipped = p.skipped;

            self.counters.record_skipped(p.skipped);
            if p.has_backlog() {
                self.counters.record_backlog();
                trace!(
                    task = %self.name,
                    backlog = p.backlog,
                    skipped = p.skipped,
                    "Cycle backlog"
                );
            }
        }

        if !self.gate.is_running() && !self.counters.quit_requested() {
            if let Some(wd) = &self.watchdog {
                wd.disable();
            }
            outcome.parked = self.gate.wait_for_run(&self.counters);
        }

        outcome
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
