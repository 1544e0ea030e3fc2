/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Test doubles for the platform seams.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use super::{
    AttachId, CycleStatistics, ManualTicks, NoStatistics, Platform, PlatformError, SoftSync,
    SyncEdge, SyncHandler, SyncPulseTiming, SyncSession, SyncSource, WatchdogDriver, WatchdogId,
};

/// Watchdog call recorded by [`RecordingWatchdog`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WdogCall {
    Create { owner: String, period_us: u32 },
    Trigger(WatchdogId),
    Disable(WatchdogId),
    Delete(WatchdogId),
}

/// Watchdog driver that records every call.  `fail_create` makes
/// [`create`](WatchdogDriver::create) fail.
#[derive(Default)]
pub struct RecordingWatchdog {
    pub calls: Mutex<Vec<WdogCall>>,
    pub fail_create: bool,
    next_id: AtomicU32,
}

impl RecordingWatchdog {
    pub fn failing() -> Self {
        Self {
            fail_create: true,
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<WdogCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&WdogCall) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| pred(c)).count()
    }
}

impl WatchdogDriver for RecordingWatchdog {
    fn create(&self, owner: &str, period_us: u32) -> Result<WatchdogId, PlatformError> {
        self.calls.lock().unwrap().push(WdogCall::Create {
            owner: owner.to_string(),
            period_us,
        });
        if self.fail_create {
            return Err(PlatformError::WatchdogUnavailable {
                owner: owner.to_string(),
                period_us,
            });
        }
        Ok(WatchdogId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1))
    }

    fn trigger(&self, id: WatchdogId) {
        self.calls.lock().unwrap().push(WdogCall::Trigger(id));
    }

    fn disable(&self, id: WatchdogId) {
        self.calls.lock().unwrap().push(WdogCall::Disable(id));
    }

    fn delete(&self, id: WatchdogId) {
        self.calls.lock().unwrap().push(WdogCall::Delete(id));
    }
}

/// Sync source wrapping a manual [`SoftSync`] whose `attach` can be made to
/// fail and which counts session releases.
pub struct ScriptedSync {
    pub inner: SoftSync,
    pub fail_attach: bool,
    pub stopped: AtomicU32,
}

impl ScriptedSync {
    pub fn new(timing: SyncPulseTiming) -> Self {
        Self {
            inner: SoftSync::manual(timing),
            fail_attach: false,
            stopped: AtomicU32::new(0),
        }
    }

    pub fn failing_attach(timing: SyncPulseTiming) -> Self {
        Self {
            fail_attach: true,
            ..Self::new(timing)
        }
    }

    pub fn stopped(&self) -> u32 {
        self.stopped.load(Ordering::SeqCst)
    }
}

impl SyncSource for ScriptedSync {
    fn start_session(&self, module: &str) -> Result<SyncSession, PlatformError> {
        self.inner.start_session(module)
    }

    fn stop_session(&self, session: SyncSession) {
        self.stopped.fetch_add(1, Ordering::SeqCst);
        self.inner.stop_session(session);
    }

    fn pulse_timing(&self) -> SyncPulseTiming {
        self.inner.pulse_timing()
    }

    fn attach(
        &self,
        session: SyncSession,
        edge: SyncEdge,
        divisor: u32,
        handler: SyncHandler,
    ) -> Result<AttachId, PlatformError> {
        if self.fail_attach {
            return Err(PlatformError::AttachFailed {
                session,
                reason: "scripted failure".into(),
            });
        }
        self.inner.attach(session, edge, divisor, handler)
    }

    fn detach(&self, id: AttachId) {
        self.inner.detach(id);
    }
}

/// Counts cycle start / end hook calls.
#[derive(Default)]
pub struct CountingStatistics {
    pub ends: AtomicU32,
    pub starts: AtomicU32,
}

impl CycleStatistics for CountingStatistics {
    fn cycle_end(&self, _task: &str) {
        self.ends.fetch_add(1, Ordering::SeqCst);
    }

    fn cycle_start(&self, _task: &str) {
        self.starts.fetch_add(1, Ordering::SeqCst);
    }
}

/// Handles on the doubles behind a [`Platform`] built by [`test_platform`].
pub struct TestPlatform {
    pub platform: Platform,
    pub ticks: Arc<ManualTicks>,
    pub sync: Arc<ScriptedSync>,
    pub watchdog: Arc<RecordingWatchdog>,
}

/// 1000 Hz manual ticks, 500/500 µs sync pulses, recording watchdog.
pub fn test_platform() -> TestPlatform {
    build_platform(
        ScriptedSync::new(SyncPulseTiming::new(500, 500)),
        RecordingWatchdog::default(),
    )
}

pub fn build_platform(sync: ScriptedSync, watchdog: RecordingWatchdog) -> TestPlatform {
    let ticks = Arc::new(ManualTicks::new(1_000));
    let sync = Arc::new(sync);
    let watchdog = Arc::new(watchdog);
    let platform = Platform {
        ticks: ticks.clone(),
        sync: sync.clone(),
        watchdog: watchdog.clone(),
        stats: Arc::new(NoStatistics),
    };
    TestPlatform {
        platform,
        ticks,
        sync,
        watchdog,
    }
}
