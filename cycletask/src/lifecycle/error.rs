/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Structured error types for module configuration and task startup.
//!
//! * [`ConfigError`]: a configuration group could not be merged into its
//!   task descriptor.  Carries the module and group so the log line alone
//!   points at the offending YAML entry.
//! * [`StartupError`]: one variant per step of
//!   [`TaskManager::create_all`](super::TaskManager::create_all), always
//!   naming the task.
//!
//! Runtime overload (backlog, skipped cycles) is never an error; it shows up
//! only in the task diagnostics.

use thiserror::Error;

use crate::platform::PlatformError;
use crate::timing::TimingError;

// ── Configuration ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// A descriptor names a group but no configuration file was loaded.
    #[error("configuration is not loaded (module '{module}', group '{group}')")]
    NotLoaded { module: String, group: String },

    #[error("no configuration group '{group}' for module '{module}'")]
    MissingGroup { module: String, group: String },

    #[error("group '{module}/{group}' has no TaskMode")]
    MissingTaskMode { module: String, group: String },

    #[error("group '{module}/{group}' has unknown TaskMode '{value}' (valid: Cyclic, Sync, SyncCalculated)")]
    UnknownTaskMode {
        module: String,
        group: String,
        value: String,
    },

    #[error("group '{module}/{group}' is Cyclic but has no CycleTime")]
    MissingCycleTime { module: String, group: String },

    #[error("group '{module}/{group}' has invalid CycleTime {value} ms")]
    InvalidCycleTime {
        module: String,
        group: String,
        value: f64,
    },

    #[error("group '{module}/{group}' has unknown SyncEdge '{value}' (valid: Rising, Falling)")]
    UnknownSyncEdge {
        module: String,
        group: String,
        value: String,
    },

    /// Neither the group, the static descriptor nor the module provides a
    /// non-zero priority.
    #[error("task '{task}' has no valid priority")]
    ZeroPriority { task: String },
}

// ── Startup ───────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum StartupError {
    /// `create_all` was called while tasks of this manager are alive.
    #[error("tasks are already created")]
    AlreadyCreated,

    /// The descriptor's runnable was lost with an abandoned task thread.
    #[error("task '{task}' has no runnable")]
    MissingRunnable { task: String },

    #[error("task '{task}': process image bind failed: {reason}")]
    ProcessImage { task: String, reason: String },

    #[error("task '{task}': could not create watchdog")]
    Watchdog {
        task: String,
        #[source]
        source: PlatformError,
    },

    #[error(transparent)]
    Timing(#[from] TimingError),

    #[error("task '{task}': priority must be non-zero")]
    ZeroPriority { task: String },

    #[error("task '{task}': could not spawn thread")]
    Spawn {
        task: String,
        #[source]
        source: std::io::Error,
    },
}

impl StartupError {
    /// Name of the task the error belongs to, if any.
    pub fn task(&self) -> Option<&str> {
        match self {
            StartupError::AlreadyCreated => None,
            StartupError::MissingRunnable { task }
            | StartupError::ProcessImage { task, .. }
            | StartupError::Watchdog { task, .. }
            | StartupError::ZeroPriority { task }
            | StartupError::Spawn { task, .. } => Some(task),
            StartupError::Timing(e) => Some(match e {
                TimingError::MissingCycleTime { task }
                | TimingError::InvalidCycleTime { task, .. }
                | TimingError::SessionUnavailable { task, .. }
                | TimingError::InconsistentSyncTiming { task, .. }
                | TimingError::AttachFailed { task, .. } => task,
            }),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
