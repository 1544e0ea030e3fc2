/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Watchdog bridge: one supervisory timer per task.
//!
//! The [`Watchdog`] is shared between the task thread (trigger / disable)
//! and the lifecycle manager (disable / destroy).  Once destroyed, every
//! further call is a no-op, so a task that outlives its teardown can never
//! reach a released driver handle.

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use crate::platform::{PlatformError, WatchdogDriver, WatchdogId};

/// Watchdog period in µs for a cycle of `cycle_us` and the given ratio.
///
/// Saturates at `u32::MAX`.
pub fn watchdog_period_us(cycle_us: f64, ratio: u32) -> u32 {
    let period = cycle_us * ratio as f64;
    if period.is_finite() && period > 0.0 {
        period.min(u32::MAX as f64) as u32
    } else {
        0
    }
}

/// Supervisory timer tied to one task's cadence.
pub struct Watchdog {
    driver: Arc<dyn WatchdogDriver>,
    id: WatchdogId,
    period_us: u32,
    /// Held across every driver call so none lands after the delete.
    destroyed: Mutex<bool>,
}

impl Watchdog {
    /// Create an armed watchdog that must be triggered at least once per
    /// `period_us`.
    pub fn arm(
        driver: Arc<dyn WatchdogDriver>,
        owner: &str,
        period_us: u32,
    ) -> Result<Self, PlatformError> {
        let id = driver.create(owner, period_us)?;
        debug!(owner, watchdog = id.0, period_us, "Watchdog armed");
        Ok(Self {
            driver,
            id,
            period_us,
            destroyed: Mutex::new(false),
        })
    }

    /// Signal that the task is alive for this cycle.
    pub fn trigger(&self) {
        if !*self.state() {
            self.driver.trigger(self.id);
        }
    }

    /// Suspend supervision.  The next [`trigger`](Self::trigger) resumes it.
    pub fn disable(&self) {
        if !*self.state() {
            self.driver.disable(self.id);
        }
    }

    /// Release the watchdog.  Safe to call more than once.
    pub fn destroy(&self) {
        let mut destroyed = self.state();
        if !*destroyed {
            *destroyed = true;
            self.driver.delete(self.id);
        }
    }

    pub fn is_destroyed(&self) -> bool {
        *self.state()
    }

    fn state(&self) -> MutexGuard<'_, bool> {
        self.destroyed.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn id(&self) -> WatchdogId {
        self.id
    }

    pub fn period_us(&self) -> u32 {
        self.period_us
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl std::fmt::Debug for Watchdog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watchdog")
            .field("id", &self.id)
            .field("period_us", &self.period_us)
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::testing::{RecordingWatchdog, WdogCall};

    #[test]
    fn period_is_cycle_times_ratio() {
        assert_eq!(watchdog_period_us(10_000.0, 5), 50_000);
        assert_eq!(watchdog_period_us(333.4, 3), 1_000);
        assert_eq!(watchdog_period_us(1.0e12, 5), u32::MAX);
        assert_eq!(watchdog_period_us(f64::NAN, 3), 0);
    }

    #[test]
    fn arm_trigger_disable_destroy_reach_the_driver() {
        let driver = Arc::new(RecordingWatchdog::default());
        let wd = Watchdog::arm(driver.clone(), "task", 30_000).unwrap();
        wd.trigger();
        wd.disable();
        wd.destroy();

        let id = wd.id();
        assert_eq!(
            driver.calls(),
            vec![
                WdogCall::Create {
                    owner: "task".into(),
                    period_us: 30_000
                },
                WdogCall::Trigger(id),
                WdogCall::Disable(id),
                WdogCall::Delete(id),
            ]
        );
    }

    #[test]
    fn calls_after_destroy_are_ignored() {
        let driver = Arc::new(RecordingWatchdog::default());
        let wd = Watchdog::arm(driver.clone(), "task", 30_000).unwrap();
        wd.destroy();
        wd.trigger();
        wd.disable();
        wd.destroy();
        drop(wd);

        assert_eq!(driver.count(|c| matches!(c, WdogCall::Delete(_))), 1);
        assert_eq!(driver.count(|c| matches!(c, WdogCall::Trigger(_))), 0);
    }

    #[test]
    fn concurrent_triggers_never_follow_the_delete() {
        let driver = Arc::new(RecordingWatchdog::default());
        let wd = Arc::new(Watchdog::arm(driver.clone(), "task", 30_000).unwrap());
        let triggering = {
            let wd = Arc::clone(&wd);
            std::thread::spawn(move || {
                for _ in 0..10_000 {
                    wd.trigger();
                }
            })
        };
        std::thread::sleep(std::time::Duration::from_millis(1));
        wd.destroy();
        triggering.join().unwrap();

        let calls = driver.calls();
        assert_eq!(calls.last(), Some(&WdogCall::Delete(wd.id())));
    }

    #[test]
    fn arm_failure_is_reported() {
        let driver = Arc::new(RecordingWatchdog::failing());
        assert!(Watchdog::arm(driver, "task", 30_000).is_err());
    }
}
