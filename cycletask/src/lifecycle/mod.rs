/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Lifecycle manager: creates, runs and tears down a module's task set.
//!
//! # Startup
//! [`TaskManager::create_all`] walks the registered descriptors in order and,
//! for each one:
//!
//! 1. resolves its name and binds its process image,
//! 2. resets its counters,
//! 3. arms a watchdog if a ratio is configured,
//! 4. creates the wake primitive and initialises the timing grid,
//! 5. checks the priority,
//! 6. spawns the task thread.
//!
//! The first failure stops the walk and is returned.  Whatever was created
//! so far is released by [`TaskManager::delete_all`]; [`TaskManager::start`]
//! does both.
//!
//! # Teardown
//! ```text
//! destroy all watchdogs → request quit → signal wake + interrupt gate
//!   → poll for exit (1 ms, 500 ms total)
//!   → joined:  release timing, take runnable back, unbind
//!   → timeout: abandon thread, release timing, warn
//! ```
//!
//! A thread that does not exit in time cannot be killed from safe Rust.  It
//! is detached instead: its watchdog and sync attachment are released so it
//! can no longer reach platform resources, and its runnable is lost with it.

pub mod error;

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::bounded;
use tracing::{debug, error, info, warn};

use crate::config::{resolve_priority, ModuleParams, TaskConfigManager};
use crate::gate::RunGate;
use crate::platform::Platform;
use crate::task::{Runnable, TaskCounters, TaskDescriptor, TaskDiagnostics};
use crate::timing::{self, nominal_cycle_us, Timing};
use crate::waiter::{signal, wake_channel, wake_handler, CycleWaiter, WakeSender};
use crate::watchdog::{watchdog_period_us, Watchdog};
use error::{ConfigError, StartupError};

/// Aggregate time teardown waits for tasks to exit on their own.
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_millis(500);

/// Poll interval while waiting for tasks to exit.
pub const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Smallest stack handed to the OS.  Descriptor stack sizes are a lower
/// bound on top of this.
pub const MIN_THREAD_STACK: usize = 64 * 1024;

// ── Public types ──────────────────────────────────────────────────────────────

/// Outcome of [`TaskManager::delete_all`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TeardownReport {
    /// Tasks that exited within the shutdown timeout.
    pub self_terminated: usize,
    /// Tasks abandoned after the timeout.
    pub forced: usize,
}

/// Options handed to the thread spawner.  On hosted threads only the name
/// and stack size take effect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnOptions {
    pub name: String,
    pub priority: u32,
    pub stack_size: usize,
    pub use_fpu: bool,
}

impl SpawnOptions {
    fn from_descriptor(desc: &TaskDescriptor) -> Self {
        Self {
            name: desc.name.clone(),
            priority: desc.priority,
            stack_size: desc.stack_size.max(MIN_THREAD_STACK),
            use_fpu: desc.use_fpu,
        }
    }
}

// ── Internal bookkeeping ──────────────────────────────────────────────────────

/// What a task thread hands back when it leaves its loop.
struct TaskExit {
    runnable: Box<dyn Runnable>,
    timing: Timing,
}

struct RunningTask {
    handle: JoinHandle<Option<TaskExit>>,
    wake: WakeSender,
    watchdog: Option<Arc<Watchdog>>,
    /// Copy of the grid, used to release sync resources if the thread never
    /// hands its own back.
    timing: Timing,
}

struct Slot {
    desc: TaskDescriptor,
    counters: Arc<TaskCounters>,
    running: Option<RunningTask>,
    bound: bool,
}

// ── TaskManager ───────────────────────────────────────────────────────────────

/// Owns the ordered task set of one module.
pub struct TaskManager {
    params: ModuleParams,
    platform: Platform,
    gate: Arc<RunGate>,
    slots: Vec<Slot>,
}

impl TaskManager {
    pub fn new(params: ModuleParams, platform: Platform) -> Self {
        Self {
            params,
            platform,
            gate: Arc::new(RunGate::new()),
            slots: Vec::new(),
        }
    }

    /// Add a descriptor.  Registration order is creation order.
    pub fn register(&mut self, desc: TaskDescriptor) {
        self.slots.push(Slot {
            desc,
            counters: Arc::new(TaskCounters::new()),
            running: None,
            bound: false,
        });
    }

    /// Merge every descriptor with its configuration group.
    pub fn configure(&mut self, config: &TaskConfigManager) -> Result<(), ConfigError> {
        for (index, slot) in self.slots.iter_mut().enumerate() {
            slot.desc.resolve_name(&self.params.app_name, index);
            config.apply(&self.params, &mut slot.desc)?;
        }
        Ok(())
    }

    pub fn params(&self) -> &ModuleParams {
        &self.params
    }

    pub fn gate(&self) -> Arc<RunGate> {
        Arc::clone(&self.gate)
    }

    pub fn task_count(&self) -> usize {
        self.slots.len()
    }

    /// Number of task threads currently owned.
    pub fn running_count(&self) -> usize {
        self.slots.iter().filter(|s| s.running.is_some()).count()
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &TaskDescriptor> {
        self.slots.iter().map(|s| &s.desc)
    }

    /// Backlog and skip counters of every task, in registration order.
    pub fn diagnostics(&self) -> Vec<TaskDiagnostics> {
        self.slots
            .iter()
            .map(|s| TaskDiagnostics {
                name: s.desc.name.clone(),
                backlog_events: s.counters.backlog_events(),
                skipped_cycles: s.counters.skipped_cycles(),
            })
            .collect()
    }

    // ── Startup ───────────────────────────────────────────────────────────────

    /// Create every registered task.  Stops at the first failure without
    /// cleaning up; call [`delete_all`](Self::delete_all) afterwards.
    pub fn create_all(&mut self) -> Result<(), StartupError> {
        if self.running_count() > 0 {
            return Err(StartupError::AlreadyCreated);
        }

        for (index, slot) in self.slots.iter_mut().enumerate() {
            create_task(slot, index, &self.params, &self.platform, &self.gate)?;
        }

        info!(
            module = %self.params.app_name,
            tasks = self.slots.len(),
            "All tasks created"
        );
        Ok(())
    }

    /// [`create_all`](Self::create_all), tearing down again on failure.
    pub fn start(&mut self) -> Result<(), StartupError> {
        if let Err(e) = self.create_all() {
            error!(module = %self.params.app_name, "Task startup failed: {}", e);
            self.delete_all();
            return Err(e);
        }
        Ok(())
    }

    /// Startup complete: release the tasks into the Run state.
    pub fn end_of_init(&self) {
        self.gate.end_of_init();
    }

    pub fn run(&self) {
        self.gate.run();
    }

    pub fn stop(&self) {
        self.gate.stop();
    }

    // ── Teardown ──────────────────────────────────────────────────────────────

    /// Stop and release every task.  Never fails; a second call finds
    /// nothing to do.
    pub fn delete_all(&mut self) -> TeardownReport {
        let mut report = TeardownReport::default();
        if self.running_count() == 0 && !self.slots.iter().any(|s| s.bound) {
            debug!(module = %self.params.app_name, "Nothing to tear down");
            return report;
        }

        // Trigger and disable are no-ops once destroyed.
        for running in self.slots.iter().filter_map(|s| s.running.as_ref()) {
            if let Some(wd) = &running.watchdog {
                wd.destroy();
            }
        }

        for slot in &self.slots {
            if slot.running.is_some() {
                slot.counters.request_quit();
            }
        }

        for running in self.slots.iter().filter_map(|s| s.running.as_ref()) {
            signal(&running.wake);
        }
        self.gate.interrupt();

        let deadline = Instant::now() + SHUTDOWN_TIMEOUT;
        loop {
            let all_exited = self
                .slots
                .iter()
                .filter_map(|s| s.running.as_ref())
                .all(|r| r.handle.is_finished());
            if all_exited {
                break;
            }
            if Instant::now() >= deadline {
                warn!(
                    module = %self.params.app_name,
                    timeout_ms = SHUTDOWN_TIMEOUT.as_millis() as u64,
                    "Timeout waiting for tasks to terminate"
                );
                break;
            }
            thread::sleep(POLL_INTERVAL);
        }

        let sync = Arc::clone(&self.platform.sync);
        for slot in &mut self.slots {
            if let Some(running) = slot.running.take() {
                let RunningTask {
                    handle,
                    wake,
                    watchdog,
                    timing,
                } = running;

                if handle.is_finished() {
                    report.self_terminated += 1;
                    match handle.join() {
                        Ok(Some(exit)) => {
                            slot.desc.restore_runnable(exit.runnable);
                            exit.timing.release(sync.as_ref());
                        }
                        Ok(None) => timing.release(sync.as_ref()),
                        Err(_) => {
                            error!(task = %slot.desc.name, "Task thread panicked");
                            timing.release(sync.as_ref());
                        }
                    }
                } else {
                    report.forced += 1;
                    warn!(
                        task = %slot.desc.name,
                        "Task did not terminate in time, thread abandoned"
                    );
                    timing.release(sync.as_ref());
                    drop(handle);
                }

                drop(watchdog);
                drop(wake);
            }

            if slot.bound {
                match slot.desc.runnable_mut() {
                    Some(runnable) => runnable.unbind(),
                    None => warn!(
                        task = %slot.desc.name,
                        "Process image not unbound, runnable lost with its thread"
                    ),
                }
                slot.bound = false;
            }
        }

        info!(
            module = %self.params.app_name,
            self_terminated = report.self_terminated,
            forced = report.forced,
            "All tasks deleted"
        );
        report
    }
}

impl Drop for TaskManager {
    fn drop(&mut self) {
        self.delete_all();
    }
}

impl std::fmt::Debug for TaskManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskManager")
            .field("params", &self.params)
            .field("state", &self.gate.state())
            .field("tasks", &self.slots.len())
            .field("running", &self.running_count())
            .finish()
    }
}

// ── Task creation ─────────────────────────────────────────────────────────────

fn create_task(
    slot: &mut Slot,
    index: usize,
    params: &ModuleParams,
    platform: &Platform,
    gate: &Arc<RunGate>,
) -> Result<(), StartupError> {
    slot.desc.resolve_name(&params.app_name, index);
    let name = slot.desc.name.clone();

    let runnable = slot
        .desc
        .runnable_mut()
        .ok_or_else(|| StartupError::MissingRunnable { task: name.clone() })?;
    runnable.bind().map_err(|e| StartupError::ProcessImage {
        task: name.clone(),
        reason: format!("{:#}", e),
    })?;
    slot.bound = true;

    slot.counters.reset();

    let ratio = slot.desc.effective_wdog_ratio();
    if ratio != slot.desc.wdog_ratio {
        warn!(
            task = %name,
            configured = slot.desc.wdog_ratio,
            used = ratio,
            "Watchdog ratio too small, increased"
        );
        slot.desc.wdog_ratio = ratio;
    }
    let watchdog = arm_watchdog(&slot.desc, platform)?.map(Arc::new);

    let (wake_tx, wake_rx) = wake_channel();
    let timing = timing::init(
        &slot.desc,
        &params.app_name,
        platform,
        wake_handler(wake_tx.clone()),
    )?;

    let Some(priority) = resolve_priority(slot.desc.priority, params.default_priority) else {
        timing.release(platform.sync.as_ref());
        return Err(StartupError::ZeroPriority { task: name });
    };
    slot.desc.priority = priority;

    let opts = SpawnOptions::from_descriptor(&slot.desc);
    debug!(
        task = %opts.name,
        priority = opts.priority,
        stack_size = opts.stack_size,
        use_fpu = opts.use_fpu,
        "Spawn options"
    );

    // The payload is handed over after a successful spawn so a spawn failure
    // leaves it with us.
    let (start_tx, start_rx) = bounded::<(Box<dyn Runnable>, CycleWaiter)>(1);
    let spawned = thread::Builder::new()
        .name(opts.name.clone())
        .stack_size(opts.stack_size)
        .spawn(move || {
            let (runnable, waiter) = start_rx.recv().ok()?;
            Some(task_main(runnable, waiter))
        });

    let handle = match spawned {
        Ok(handle) => handle,
        Err(source) => {
            timing.release(platform.sync.as_ref());
            return Err(StartupError::Spawn { task: name, source });
        }
    };

    let runnable = slot
        .desc
        .take_runnable()
        .ok_or_else(|| StartupError::MissingRunnable { task: name.clone() })?;
    let waiter = CycleWaiter::new(
        name.clone(),
        timing.clone(),
        wake_rx,
        watchdog.clone(),
        Arc::clone(&slot.counters),
        Arc::clone(gate),
        Arc::clone(&platform.ticks),
        Arc::clone(&platform.stats),
    );
    if let Err(returned) = start_tx.send((runnable, waiter)) {
        let (runnable, _) = returned.into_inner();
        slot.desc.restore_runnable(runnable);
    }

    info!(
        task = %name,
        priority,
        time_base = %slot.desc.time_base,
        watchdog = watchdog.is_some(),
        "Task created"
    );

    slot.running = Some(RunningTask {
        handle,
        wake: wake_tx,
        watchdog,
        timing,
    });
    Ok(())
}

/// Watchdog for `desc`, or `None` if it has no ratio or no usable cycle
/// length.
fn arm_watchdog(desc: &TaskDescriptor, platform: &Platform) -> Result<Option<Watchdog>, StartupError> {
    let ratio = desc.wdog_ratio;
    if ratio == 0 {
        return Ok(None);
    }

    let Some(cycle_us) = nominal_cycle_us(
        desc.time_base,
        desc.cycle_time_ms,
        platform.sync.pulse_timing(),
    ) else {
        debug!(task = %desc.name, "No cycle length, watchdog not created");
        return Ok(None);
    };

    let period_us = watchdog_period_us(cycle_us, ratio);
    Watchdog::arm(Arc::clone(&platform.watchdog), &desc.name, period_us)
        .map(Some)
        .map_err(|source| StartupError::Watchdog {
            task: desc.name.clone(),
            source,
        })
}

/// Body of every task thread.
fn task_main(mut runnable: Box<dyn Runnable>, mut waiter: CycleWaiter) -> TaskExit {
    runnable.cycle_init();
    while !waiter.counters().quit_requested() {
        runnable.cycle();
        waiter.wait();
    }
    debug!("Task loop left");
    TaskExit {
        runnable,
        timing: waiter.into_timing(),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
