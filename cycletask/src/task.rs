/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Task descriptor and the capability a task runs.
//!
//! A [`TaskDescriptor`] is built once from static defaults, merged with the
//! configuration source at module init, and then handed to the
//! [`TaskManager`](crate::lifecycle::TaskManager), which owns it for the
//! lifetime of the module.
//!
//! ```text
//! static defaults ──► TaskDescriptor ──(config apply)──► TaskManager::create_all
//!                                                          │
//!                         TaskCounters  ◄── shared ──►  task thread
//! ```
//!
//! # Ownership model
//! Runtime state that the task thread mutates every cycle (the timing block,
//! the wake receiver) is **moved** into the thread at spawn and moved back on
//! join.  The only state the manager and the thread touch concurrently is
//! [`TaskCounters`]: the quit request (written by the manager) and the
//! backlog / skip counters (written by the thread, read by diagnostics).

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use anyhow::Result;

use crate::platform::SyncEdge;

// ── Constants ─────────────────────────────────────────────────────────────────

/// Maximum length of a task name in characters.
pub const MAX_TASK_NAME_LEN: usize = 14;

/// Default stack size for task threads, in bytes.
pub const DEFAULT_STACK_SIZE: usize = 10_000;

/// Default ratio watchdog period / cycle period.
pub const DEFAULT_WDOG_RATIO: u32 = 5;

/// Smallest useful watchdog ratio.  Configured non-zero ratios below it are
/// raised to it.
pub const MIN_WDOG_RATIO: u32 = 3;

// ── Time base ─────────────────────────────────────────────────────────────────

/// Time base a task is scheduled against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeBase {
    /// Free-running tick counter.
    #[default]
    Cyclic,
    /// External sync pulses.
    Sync,
    /// External sync pulses, cycle multiple calculated from `CycleTime`.
    SyncCalculated,
}

impl TimeBase {
    /// Parse the `TaskMode` configuration value.
    pub fn from_config_str(s: &str) -> Option<Self> {
        match s {
            "Cyclic" => Some(TimeBase::Cyclic),
            "Sync" => Some(TimeBase::Sync),
            "SyncCalculated" => Some(TimeBase::SyncCalculated),
            _ => None,
        }
    }

    pub fn is_sync(self) -> bool {
        matches!(self, TimeBase::Sync | TimeBase::SyncCalculated)
    }
}

impl fmt::Display for TimeBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeBase::Cyclic => write!(f, "Cyclic"),
            TimeBase::Sync => write!(f, "Sync"),
            TimeBase::SyncCalculated => write!(f, "SyncCalculated"),
        }
    }
}

// ── Runnable ──────────────────────────────────────────────────────────────────

/// Work executed by one periodic task.
///
/// The task thread calls [`cycle_init`](Self::cycle_init) once, then
/// [`cycle`](Self::cycle) once per period until quit is requested.  The cycle
/// waiter runs between two calls; `cycle` itself must not block.
pub trait Runnable: Send + 'static {
    /// Bind the task's process image.  Called by `create_all` before the
    /// thread is spawned; an error aborts startup.
    fn bind(&mut self) -> Result<()> {
        Ok(())
    }

    /// Called once on the task thread before the first cycle.
    fn cycle_init(&mut self) {}

    /// One cycle of work.
    fn cycle(&mut self);

    /// Release the process image.  Called during teardown, after the thread
    /// has terminated.
    fn unbind(&mut self) {}
}

impl<F> Runnable for F
where
    F: FnMut() + Send + 'static,
{
    fn cycle(&mut self) {
        self()
    }
}

// ── Shared counters ───────────────────────────────────────────────────────────

/// State shared between a running task and the rest of the module.
#[derive(Debug, Default)]
pub struct TaskCounters {
    quit: AtomicBool,
    backlogs: AtomicU32,
    skipped: AtomicU32,
}

impl TaskCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_quit(&self) {
        self.quit.store(true, Ordering::SeqCst);
    }

    pub fn quit_requested(&self) -> bool {
        self.quit.load(Ordering::SeqCst)
    }

    /// Cycles that started late.
    pub fn backlog_events(&self) -> u32 {
        self.backlogs.load(Ordering::Relaxed)
    }

    /// Whole cycles skipped to catch up.
    pub fn skipped_cycles(&self) -> u32 {
        self.skipped.load(Ordering::Relaxed)
    }

    pub(crate) fn record_backlog(&self) {
        self.backlogs.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_skipped(&self, cycles: u32) {
        if cycles > 0 {
            self.skipped.fetch_add(cycles, Ordering::Relaxed);
        }
    }

    pub(crate) fn reset(&self) {
        self.quit.store(false, Ordering::SeqCst);
        self.backlogs.store(0, Ordering::Relaxed);
        self.skipped.store(0, Ordering::Relaxed);
    }
}

/// Snapshot of one task's overload counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskDiagnostics {
    pub name: String,
    pub backlog_events: u32,
    pub skipped_cycles: u32,
}

// ── TaskDescriptor ────────────────────────────────────────────────────────────

/// Static configuration of one periodic task.
///
/// Field defaults correspond to the static task list;
/// [`TaskConfigManager::apply`](crate::config::TaskConfigManager::apply)
/// fills in what the configuration file provides.
pub struct TaskDescriptor {
    // ── Identity ──────────────────────────────────────────────────────────────
    /// Unique visible name.  Empty means "derive from the module name".
    pub name: String,

    /// Configuration group looked up in the configuration source.  Empty
    /// means "static defaults only".
    pub cfg_group: String,

    // ── Scheduling ────────────────────────────────────────────────────────────
    /// Requested priority.  Must be non-zero before spawn.
    pub priority: u32,

    /// Watchdog period = cycle period × ratio.  `0` disables the watchdog.
    pub wdog_ratio: u32,

    /// Stack size of the task thread in bytes.
    pub stack_size: usize,

    /// The task uses floating-point operations.
    pub use_fpu: bool,

    // ── Timing ────────────────────────────────────────────────────────────────
    pub time_base: TimeBase,

    /// Cycle period in ms.  Required for `Cyclic`; for sync time bases
    /// `None` means one sync pulse per cycle.
    pub cycle_time_ms: Option<f64>,

    /// Sync edge used by sync time bases.
    pub sync_edge: SyncEdge,

    // ── Work ──────────────────────────────────────────────────────────────────
    runnable: Option<Box<dyn Runnable>>,
}

impl TaskDescriptor {
    /// Descriptor with the static defaults of the task list.
    pub fn new(cfg_group: impl Into<String>, runnable: impl Runnable) -> Self {
        Self {
            name: String::new(),
            cfg_group: cfg_group.into(),
            priority: 0,
            wdog_ratio: DEFAULT_WDOG_RATIO,
            stack_size: DEFAULT_STACK_SIZE,
            use_fpu: true,
            time_base: TimeBase::Cyclic,
            cycle_time_ms: None,
            sync_edge: SyncEdge::default(),
            runnable: Some(Box::new(runnable)),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_wdog_ratio(mut self, ratio: u32) -> Self {
        self.wdog_ratio = ratio;
        self
    }

    pub fn with_cyclic(mut self, cycle_time_ms: f64) -> Self {
        self.time_base = TimeBase::Cyclic;
        self.cycle_time_ms = Some(cycle_time_ms);
        self
    }

    pub fn with_sync(mut self, cycle_time_ms: Option<f64>, edge: SyncEdge) -> Self {
        self.time_base = TimeBase::Sync;
        self.cycle_time_ms = cycle_time_ms;
        self.sync_edge = edge;
        self
    }

    pub fn with_stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = bytes;
        self
    }

    pub fn with_fpu(mut self, use_fpu: bool) -> Self {
        self.use_fpu = use_fpu;
        self
    }

    /// Effective watchdog ratio: `0` stays `0`, anything else is at least
    /// [`MIN_WDOG_RATIO`].
    pub fn effective_wdog_ratio(&self) -> u32 {
        match self.wdog_ratio {
            0 => 0,
            r => r.max(MIN_WDOG_RATIO),
        }
    }

    /// Fill in an empty name as `a<module>_<index + 1>`, then cut the name to
    /// [`MAX_TASK_NAME_LEN`] characters.
    pub fn resolve_name(&mut self, module: &str, index: usize) {
        if self.name.is_empty() {
            self.name = format!("a{}_{}", module, index + 1);
        }
        if self.name.chars().count() > MAX_TASK_NAME_LEN {
            self.name = self.name.chars().take(MAX_TASK_NAME_LEN).collect();
        }
    }

    pub(crate) fn runnable_mut(&mut self) -> Option<&mut Box<dyn Runnable>> {
        self.runnable.as_mut()
    }

    pub(crate) fn take_runnable(&mut self) -> Option<Box<dyn Runnable>> {
        self.runnable.take()
    }

    pub(crate) fn restore_runnable(&mut self, runnable: Box<dyn Runnable>) {
        self.runnable = Some(runnable);
    }

    /// `false` after the runnable was lost with a task that had to be
    /// abandoned.
    pub fn has_runnable(&self) -> bool {
        self.runnable.is_some()
    }
}

impl fmt::Debug for TaskDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskDescriptor")
            .field("name", &self.name)
            .field("cfg_group", &self.cfg_group)
            .field("priority", &self.priority)
            .field("wdog_ratio", &self.wdog_ratio)
            .field("stack_size", &self.stack_size)
            .field("use_fpu", &self.use_fpu)
            .field("time_base", &self.time_base)
            .field("cycle_time_ms", &self.cycle_time_ms)
            .field("sync_edge", &self.sync_edge)
            .finish_non_exhaustive()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> impl Runnable {
        || {}
    }

    // ── TimeBase ──────────────────────────────────────────────────────────────

    #[test]
    fn time_base_parses_known_modes() {
        assert_eq!(TimeBase::from_config_str("Cyclic"), Some(TimeBase::Cyclic));
        assert_eq!(TimeBase::from_config_str("Sync"), Some(TimeBase::Sync));
        assert_eq!(
            TimeBase::from_config_str("SyncCalculated"),
            Some(TimeBase::SyncCalculated)
        );
    }

    #[test]
    fn time_base_rejects_unknown_and_case_variants() {
        assert_eq!(TimeBase::from_config_str("cyclic"), None);
        assert_eq!(TimeBase::from_config_str("Event"), None);
        assert_eq!(TimeBase::from_config_str(""), None);
    }

    // ── Watchdog ratio ────────────────────────────────────────────────────────

    #[test]
    fn wdog_ratio_below_three_is_raised() {
        let d = TaskDescriptor::new("g", noop()).with_wdog_ratio(1);
        assert_eq!(d.effective_wdog_ratio(), 3);
        let d = TaskDescriptor::new("g", noop()).with_wdog_ratio(2);
        assert_eq!(d.effective_wdog_ratio(), 3);
    }

    #[test]
    fn wdog_ratio_zero_means_no_watchdog() {
        let d = TaskDescriptor::new("g", noop()).with_wdog_ratio(0);
        assert_eq!(d.effective_wdog_ratio(), 0);
    }

    #[test]
    fn wdog_ratio_above_minimum_is_kept() {
        let d = TaskDescriptor::new("g", noop()).with_wdog_ratio(7);
        assert_eq!(d.effective_wdog_ratio(), 7);
    }

    // ── Name ──────────────────────────────────────────────────────────────────

    #[test]
    fn empty_name_defaults_to_module_and_index() {
        let mut d = TaskDescriptor::new("g", noop());
        d.resolve_name("CTRL", 0);
        assert_eq!(d.name, "aCTRL_1");
    }

    #[test]
    fn long_name_is_truncated() {
        let mut d = TaskDescriptor::new("g", noop()).with_name("a_very_long_task_name");
        d.resolve_name("CTRL", 0);
        assert_eq!(d.name.len(), MAX_TASK_NAME_LEN);
        assert_eq!(d.name, "a_very_long_ta");
    }

    // ── Counters ──────────────────────────────────────────────────────────────

    #[test]
    fn counters_accumulate_and_reset() {
        let c = TaskCounters::new();
        c.record_backlog();
        c.record_backlog();
        c.record_skipped(3);
        c.record_skipped(0);
        c.request_quit();
        assert_eq!(c.backlog_events(), 2);
        assert_eq!(c.skipped_cycles(), 3);
        assert!(c.quit_requested());

        c.reset();
        assert_eq!(c.backlog_events(), 0);
        assert_eq!(c.skipped_cycles(), 0);
        assert!(!c.quit_requested());
    }

    #[test]
    fn closures_are_runnable() {
        let mut n = 0u32;
        let mut r = move || n += 1;
        Runnable::cycle(&mut r);
        Runnable::cycle(&mut r);
        // The closure owns its copy of `n`; just make sure the calls compile and run.
        assert!(r.bind().is_ok());
    }
}
