/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Run/Stop gate shared by all cyclic tasks of a module.
//!
//! The gate is a state variable plus a condition variable.  A task that
//! finds the state not `Run` at the end of its cycle parks on the gate;
//! switching the state to `Run` wakes **every** parked task at once, so the
//! command path never has to know how many tasks are waiting.

use std::fmt;
use std::sync::{Condvar, Mutex, MutexGuard};

use tracing::info;

use crate::task::TaskCounters;

/// Module run state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModuleState {
    /// Module created, end-of-init not yet reached.
    #[default]
    Init,
    Run,
    Stop,
    /// Module failed; tasks stay parked.
    Error,
}

impl fmt::Display for ModuleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleState::Init => write!(f, "INIT"),
            ModuleState::Run => write!(f, "RUN"),
            ModuleState::Stop => write!(f, "STOP"),
            ModuleState::Error => write!(f, "ERROR"),
        }
    }
}

/// State flag plus broadcast release.
#[derive(Debug, Default)]
pub struct RunGate {
    state: Mutex<ModuleState>,
    released: Condvar,
}

impl RunGate {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ModuleState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn state(&self) -> ModuleState {
        *self.lock()
    }

    pub fn is_running(&self) -> bool {
        self.state() == ModuleState::Run
    }

    /// Set the state.  Entering `Run` releases every parked task.
    pub fn set_state(&self, state: ModuleState) {
        let mut guard = self.lock();
        let old = *guard;
        *guard = state;
        if old != state {
            info!(from = %old, to = %state, "Module state changed");
        }
        if state == ModuleState::Run {
            self.released.notify_all();
        }
    }

    /// Run command: resume all tasks.
    pub fn run(&self) {
        self.set_state(ModuleState::Run);
    }

    /// Stop command: tasks park at the end of their current cycle.
    pub fn stop(&self) {
        self.set_state(ModuleState::Stop);
    }

    /// End-of-init: startup completed, start cycling.
    pub fn end_of_init(&self) {
        self.set_state(ModuleState::Run);
    }

    /// Wake all parked tasks without changing the state, so they can
    /// observe a quit request.
    ///
    /// Quit flags must be set before calling this; the lock taken here
    /// orders the wake-up after any task that is about to park.
    pub fn interrupt(&self) {
        let _guard = self.lock();
        self.released.notify_all();
    }

    /// Block while the module is not running and the task has not been asked
    /// to quit.  Returns immediately if neither holds.
    ///
    /// Returns `true` if the call actually parked.
    pub fn wait_for_run(&self, counters: &TaskCounters) -> bool {
        let mut guard = self.lock();
        let mut parked = false;
        while *guard != ModuleState::Run && !counters.quit_requested() {
            parked = true;
            guard = self
                .released
                .wait(guard)
                .unwrap_or_else(|p| p.into_inner());
        }
        parked
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn initial_state_is_init() {
        assert_eq!(RunGate::new().state(), ModuleState::Init);
    }

    #[test]
    fn wait_returns_immediately_when_running() {
        let gate = RunGate::new();
        gate.run();
        assert!(!gate.wait_for_run(&TaskCounters::new()));
    }

    #[test]
    fn wait_returns_immediately_when_quit_requested() {
        let gate = RunGate::new();
        gate.stop();
        let counters = TaskCounters::new();
        counters.request_quit();
        assert!(!gate.wait_for_run(&counters));
    }

    #[test]
    fn run_releases_all_parked_tasks() {
        let gate = Arc::new(RunGate::new());
        gate.stop();
        let released = Arc::new(AtomicU32::new(0));

        let handles: Vec<_> = (0..3)
            .map(|_| {
                let gate = Arc::clone(&gate);
                let released = Arc::clone(&released);
                thread::spawn(move || {
                    let counters = TaskCounters::new();
                    gate.wait_for_run(&counters);
                    released.fetch_add(1, Ordering::SeqCst);
                })
            })
            .collect();

        thread::sleep(Duration::from_millis(30));
        assert_eq!(released.load(Ordering::SeqCst), 0, "all tasks parked");

        gate.run();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(released.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn interrupt_wakes_task_with_quit_request() {
        let gate = Arc::new(RunGate::new());
        gate.stop();
        let counters = Arc::new(TaskCounters::new());

        let handle = {
            let gate = Arc::clone(&gate);
            let counters = Arc::clone(&counters);
            thread::spawn(move || gate.wait_for_run(&counters))
        };

        thread::sleep(Duration::from_millis(20));
        counters.request_quit();
        gate.interrupt();
        assert!(handle.join().unwrap());
        assert_eq!(gate.state(), ModuleState::Stop, "interrupt keeps the state");
    }
}
