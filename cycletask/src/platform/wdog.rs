/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Software watchdog supervisor.
//!
//! Every watchdog holds an absolute deadline.  A supervisor thread, started
//! with the first watchdog, scans all enabled deadlines at
//! [`SUPERVISION_INTERVAL`] and reports each expiry once: an `error!` event
//! plus a per-watchdog expiration counter.  A trigger moves the deadline
//! forward by one period and clears the expired mark.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, error, warn};

use super::{PlatformError, WatchdogDriver, WatchdogId};

/// Resolution of the supervisor scan.
pub const SUPERVISION_INTERVAL: Duration = Duration::from_millis(2);

struct Dog {
    owner: String,
    period: Duration,
    deadline: Instant,
    enabled: bool,
    expired: bool,
    expirations: u32,
}

#[derive(Default)]
struct Kennel {
    dogs: HashMap<WatchdogId, Dog>,
    next_id: u32,
}

struct Shared {
    kennel: Mutex<Kennel>,
    running: AtomicBool,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Kennel> {
        self.kennel.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn scan(&self, now: Instant) {
        let mut kennel = self.lock();
        for (id, dog) in kennel.dogs.iter_mut() {
            if dog.enabled && !dog.expired && now > dog.deadline {
                dog.expired = true;
                dog.expirations += 1;
                error!(
                    watchdog = id.0,
                    owner = %dog.owner,
                    period_us = dog.period.as_micros() as u64,
                    "Watchdog expired"
                );
            }
        }
    }
}

/// Software implementation of [`WatchdogDriver`].
pub struct SoftwareWatchdog {
    shared: Arc<Shared>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

impl SoftwareWatchdog {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                kennel: Mutex::new(Kennel::default()),
                running: AtomicBool::new(false),
            }),
            supervisor: Mutex::new(None),
        }
    }

    /// How many times `id` has expired.  `None` for an unknown id.
    pub fn expirations(&self, id: WatchdogId) -> Option<u32> {
        self.shared.lock().dogs.get(&id).map(|d| d.expirations)
    }

    /// `Some(true)` while the watchdog is supervising.
    pub fn is_enabled(&self, id: WatchdogId) -> Option<bool> {
        self.shared.lock().dogs.get(&id).map(|d| d.enabled)
    }

    /// Number of live watchdogs.
    pub fn len(&self) -> usize {
        self.shared.lock().dogs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn ensure_supervisor(&self) -> std::io::Result<()> {
        let mut slot = self.supervisor.lock().unwrap_or_else(|p| p.into_inner());
        if slot.is_some() {
            return Ok(());
        }
        self.shared.running.store(true, Ordering::SeqCst);
        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name("soft-wdog".into())
            .spawn(move || {
                while shared.running.load(Ordering::Relaxed) {
                    thread::sleep(SUPERVISION_INTERVAL);
                    shared.scan(Instant::now());
                }
            })?;
        *slot = Some(handle);
        Ok(())
    }
}

impl Default for SoftwareWatchdog {
    fn default() -> Self {
        Self::new()
    }
}

impl WatchdogDriver for SoftwareWatchdog {
    fn create(&self, owner: &str, period_us: u32) -> Result<WatchdogId, PlatformError> {
        let unavailable = || PlatformError::WatchdogUnavailable {
            owner: owner.to_string(),
            period_us,
        };
        if period_us == 0 {
            return Err(unavailable());
        }
        if let Err(e) = self.ensure_supervisor() {
            warn!("Could not start watchdog supervisor: {}", e);
            return Err(unavailable());
        }

        let period = Duration::from_micros(period_us as u64);
        let mut kennel = self.shared.lock();
        kennel.next_id += 1;
        let id = WatchdogId(kennel.next_id);
        kennel.dogs.insert(
            id,
            Dog {
                owner: owner.to_string(),
                period,
                deadline: Instant::now() + period,
                enabled: true,
                expired: false,
                expirations: 0,
            },
        );
        debug!(watchdog = id.0, owner, period_us, "Watchdog created");
        Ok(id)
    }

    fn trigger(&self, id: WatchdogId) {
        if let Some(dog) = self.shared.lock().dogs.get_mut(&id) {
            dog.deadline = Instant::now() + dog.period;
            dog.enabled = true;
            dog.expired = false;
        }
    }

    fn disable(&self, id: WatchdogId) {
        if let Some(dog) = self.shared.lock().dogs.get_mut(&id) {
            dog.enabled = false;
        }
    }

    fn delete(&self, id: WatchdogId) {
        if self.shared.lock().dogs.remove(&id).is_some() {
            debug!(watchdog = id.0, "Watchdog deleted");
        }
    }
}

impl Drop for SoftwareWatchdog {
    fn drop(&mut self) {
        self.shared.running.store(false, Ordering::SeqCst);
        let slot = self.supervisor.get_mut().unwrap_or_else(|p| p.into_inner());
        if let Some(handle) = slot.take() {
            let _ = handle.join();
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn untriggered_watchdog_expires_once() {
        let wd = SoftwareWatchdog::new();
        let id = wd.create("t", 5_000).unwrap();
        thread::sleep(Duration::from_millis(40));
        assert_eq!(wd.expirations(id), Some(1), "expiry is reported once");
    }

    #[test]
    fn triggered_watchdog_does_not_expire() {
        let wd = SoftwareWatchdog::new();
        let id = wd.create("t", 20_000).unwrap();
        for _ in 0..10 {
            thread::sleep(Duration::from_millis(4));
            wd.trigger(id);
        }
        assert_eq!(wd.expirations(id), Some(0));
    }

    #[test]
    fn disabled_watchdog_is_not_supervised_until_triggered() {
        let wd = SoftwareWatchdog::new();
        let id = wd.create("t", 5_000).unwrap();
        wd.disable(id);
        assert_eq!(wd.is_enabled(id), Some(false));
        thread::sleep(Duration::from_millis(20));
        assert_eq!(wd.expirations(id), Some(0));

        wd.trigger(id);
        assert_eq!(wd.is_enabled(id), Some(true));
    }

    #[test]
    fn zero_period_is_rejected() {
        let wd = SoftwareWatchdog::new();
        assert!(wd.create("t", 0).is_err());
    }

    #[test]
    fn delete_is_idempotent() {
        let wd = SoftwareWatchdog::new();
        let id = wd.create("t", 10_000).unwrap();
        wd.delete(id);
        wd.delete(id);
        assert!(wd.is_empty());
        assert_eq!(wd.expirations(id), None);
    }
}
