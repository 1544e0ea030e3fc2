/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Timing engine: builds the time grid a task runs on.
//!
//! Two mutually exclusive modes, carried by the [`Timing`] sum type:
//!
//! | Mode | Grid unit | Wake source |
//! |---|---|---|
//! | [`CyclicTiming`] | platform tick | timeout of the wake wait |
//! | [`SyncTiming`] | sync pulse | handler attached to the sync source |
//!
//! Both initialisations fail with a [`TimingError`] that names the task; the
//! lifecycle manager treats any of them as fatal to startup.

pub mod math;

use std::fmt;

use tracing::{debug, info, warn};

use crate::platform::{
    AttachId, Platform, PlatformError, SyncEdge, SyncHandler, SyncPulseTiming, SyncSession,
    SyncSource, TickSource,
};
use crate::task::{TaskDescriptor, TimeBase};
use math::{period_to_pulses, period_to_ticks};

// ── Error type ────────────────────────────────────────────────────────────────

/// Errors that can occur while initialising a task's time grid.
#[derive(Debug, Clone, PartialEq)]
pub enum TimingError {
    /// A cyclic task needs a cycle time.
    MissingCycleTime { task: String },

    /// The configured cycle time is zero, negative or not a number.
    InvalidCycleTime { task: String, value_ms: f64 },

    /// The sync session of the module could not be opened.
    SessionUnavailable { task: String, source: PlatformError },

    /// The platform reports a sync signal with a zero sub-interval.
    InconsistentSyncTiming {
        task: String,
        high_us: u32,
        low_us: u32,
    },

    /// The wake handler could not be attached to the sync source.  The
    /// session has been released again.
    AttachFailed { task: String, source: PlatformError },
}

impl fmt::Display for TimingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimingError::MissingCycleTime { task } => {
                write!(f, "task '{task}' has no cycle time configured")
            }
            TimingError::InvalidCycleTime { task, value_ms } => {
                write!(f, "task '{task}' has invalid cycle time {value_ms} ms")
            }
            TimingError::SessionUnavailable { task, source } => {
                write!(f, "could not start sync session for task '{task}': {source}")
            }
            TimingError::InconsistentSyncTiming {
                task,
                high_us,
                low_us,
            } => write!(
                f,
                "system sync configuration invalid (high {high_us} µs, low {low_us} µs), \
                 can't use sync for task '{task}'"
            ),
            TimingError::AttachFailed { task, source } => {
                write!(f, "could not attach to sync for task '{task}': {source}")
            }
        }
    }
}

impl std::error::Error for TimingError {}

// ── Timing blocks ─────────────────────────────────────────────────────────────

/// Tick-mode grid state.
#[derive(Debug, Clone, PartialEq)]
pub struct CyclicTiming {
    /// Configured period in ms.
    pub cycle_time_ms: f64,
    /// Period in ticks, ≥ 1.
    pub period_ticks: u32,
    /// Tick value at which the current cycle started (on the grid).
    pub prev_cycle_start: u32,
    /// Tick value at which the next cycle is scheduled.
    pub next_cycle_start: u32,
    /// The configured period was shorter than one tick.
    pub period_clamped: bool,
}

/// Sync-mode state.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncTiming {
    pub session: SyncSession,
    pub edge: SyncEdge,
    /// Sync pulses per task cycle, ≥ 1.
    pub pulses_per_cycle: u32,
    /// The configured cycle was shorter than one sync pulse.
    pub period_clamped: bool,
    /// Registration of the task's wake handler.
    pub attachment: AttachId,
}

/// The time grid of one task.
#[derive(Debug, Clone, PartialEq)]
pub enum Timing {
    Cyclic(CyclicTiming),
    Sync(SyncTiming),
}

impl Timing {
    /// Release platform resources held by the grid.  Tick mode holds none.
    pub fn release(self, sync: &dyn SyncSource) {
        if let Timing::Sync(st) = self {
            sync.detach(st.attachment);
            sync.stop_session(st.session);
        }
    }
}

// ── Initialisation ────────────────────────────────────────────────────────────

fn validate_cycle_time(task: &str, cycle_time_ms: Option<f64>) -> Result<Option<f64>, TimingError> {
    match cycle_time_ms {
        Some(ms) if !(ms.is_finite() && ms > 0.0) => Err(TimingError::InvalidCycleTime {
            task: task.to_string(),
            value_ms: ms,
        }),
        other => Ok(other),
    }
}

/// Initialise tick-mode timing.
///
/// The period is rounded to whole ticks and raised to one tick (with a
/// warning) when the platform's tick resolution cannot realise it.  The grid
/// starts at the current tick.
pub fn init_tick(
    task: &str,
    cycle_time_ms: Option<f64>,
    ticks: &dyn TickSource,
) -> Result<CyclicTiming, TimingError> {
    let cycle_time_ms = validate_cycle_time(task, cycle_time_ms)?.ok_or_else(|| {
        TimingError::MissingCycleTime {
            task: task.to_string(),
        }
    })?;

    let rate = ticks.rate_hz();
    let period = period_to_ticks(cycle_time_ms, rate);
    if period.clamped {
        warn!(
            task,
            cycle_time_ms,
            tick_rate_hz = rate,
            "Cycle time too small for tick rate, increased to 1 tick"
        );
    }

    let prev_cycle_start = ticks.now();
    let next_cycle_start = prev_cycle_start.wrapping_add(period.units);

    debug!(
        task,
        period_ticks = period.units,
        prev_cycle_start,
        next_cycle_start,
        "Tick timing initialised"
    );

    Ok(CyclicTiming {
        cycle_time_ms,
        period_ticks: period.units,
        prev_cycle_start,
        next_cycle_start,
        period_clamped: period.clamped,
    })
}

/// Initialise sync-mode timing.
///
/// Joins the module's sync session, derives the number of pulses per cycle
/// from the platform pulse period and attaches `wake` to be called once per
/// task cycle on `edge`.  Every failure after the session was opened
/// releases it again.
pub fn init_sync(
    task: &str,
    module: &str,
    cycle_time_ms: Option<f64>,
    edge: SyncEdge,
    sync: &dyn SyncSource,
    wake: SyncHandler,
) -> Result<SyncTiming, TimingError> {
    let cycle_time_ms = validate_cycle_time(task, cycle_time_ms)?;

    let session = sync
        .start_session(module)
        .map_err(|source| TimingError::SessionUnavailable {
            task: task.to_string(),
            source,
        })?;

    let pulse = sync.pulse_timing();
    if !pulse.is_consistent() {
        sync.stop_session(session);
        return Err(TimingError::InconsistentSyncTiming {
            task: task.to_string(),
            high_us: pulse.high_us,
            low_us: pulse.low_us,
        });
    }

    let (pulses_per_cycle, period_clamped) = match cycle_time_ms {
        Some(ms) => {
            let p = period_to_pulses(ms, pulse.period_us());
            if p.clamped {
                warn!(
                    task,
                    cycle_time_ms = ms,
                    sync_period_us = pulse.period_us(),
                    "Cycle time too small for sync cycle, increased to 1 sync"
                );
            }
            (p.units, p.clamped)
        }
        None => (1, false),
    };

    let attachment = match sync.attach(session, edge, pulses_per_cycle, wake) {
        Ok(id) => id,
        Err(source) => {
            warn!(task, "Could not attach to sync: {}", source);
            sync.stop_session(session);
            return Err(TimingError::AttachFailed {
                task: task.to_string(),
                source,
            });
        }
    };

    info!(
        task,
        session = session.0,
        edge = %edge,
        pulses_per_cycle,
        "Sync timing initialised"
    );

    Ok(SyncTiming {
        session,
        edge,
        pulses_per_cycle,
        period_clamped,
        attachment,
    })
}

/// Initialise the grid selected by `desc.time_base`.
pub fn init(
    desc: &TaskDescriptor,
    module: &str,
    platform: &Platform,
    wake: SyncHandler,
) -> Result<Timing, TimingError> {
    match desc.time_base {
        TimeBase::Cyclic => {
            init_tick(&desc.name, desc.cycle_time_ms, platform.ticks.as_ref()).map(Timing::Cyclic)
        }
        TimeBase::Sync | TimeBase::SyncCalculated => init_sync(
            &desc.name,
            module,
            desc.cycle_time_ms,
            desc.sync_edge,
            platform.sync.as_ref(),
            wake,
        )
        .map(Timing::Sync),
    }
}

/// Nominal length of one task cycle in µs, used to size the watchdog.
///
/// Sync tasks without a cycle time run once per pulse.  Returns `None` when
/// no usable value exists (cyclic task without cycle time).
pub fn nominal_cycle_us(
    time_base: TimeBase,
    cycle_time_ms: Option<f64>,
    pulse: SyncPulseTiming,
) -> Option<f64> {
    match (time_base, cycle_time_ms) {
        (_, Some(ms)) if ms.is_finite() && ms > 0.0 => Some(ms * 1000.0),
        (tb, None) if tb.is_sync() && pulse.period_us() > 0 => Some(pulse.period_us() as f64),
        _ => None,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
