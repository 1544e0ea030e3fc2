/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Software sync pulse generator.
//!
//! [`SoftSync`] stands in for a sync interrupt on hosts without one.  A
//! background thread walks an absolute time grid (high phase, then low
//! phase) so the pulse period does not drift with scheduling jitter.  On
//! every edge each matching attachment counts one pulse and, every
//! `divisor` pulses, its handler is called outside the internal lock.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::{AttachId, PlatformError, SyncEdge, SyncHandler, SyncPulseTiming, SyncSession, SyncSource};

struct Attachment {
    id: AttachId,
    session: SyncSession,
    edge: SyncEdge,
    divisor: u32,
    count: u32,
    handler: SyncHandler,
}

struct SessionEntry {
    id: SyncSession,
    refs: u32,
}

#[derive(Default)]
struct SyncState {
    /// module name → open session
    sessions: HashMap<String, SessionEntry>,
    attachments: Vec<Attachment>,
    next_session: u32,
    next_attach: u32,
}

struct Shared {
    state: Mutex<SyncState>,
    running: AtomicBool,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, SyncState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Count one pulse on `edge` and call every handler whose divisor is
    /// reached.
    fn emit(&self, edge: SyncEdge) {
        let due: Vec<SyncHandler> = {
            let mut state = self.lock();
            state
                .attachments
                .iter_mut()
                .filter(|a| a.edge == edge)
                .filter_map(|a| {
                    a.count += 1;
                    if a.count >= a.divisor {
                        a.count = 0;
                        Some(Arc::clone(&a.handler))
                    } else {
                        None
                    }
                })
                .collect()
        };
        for handler in due {
            handler();
        }
    }
}

/// Software implementation of [`SyncSource`].
pub struct SoftSync {
    timing: SyncPulseTiming,
    shared: Arc<Shared>,
    /// `false` for [`SoftSync::manual`] – pulses only come from [`emit`](Self::emit).
    free_running: bool,
    pulse_thread: Mutex<Option<JoinHandle<()>>>,
}

impl SoftSync {
    /// Pulse generator that starts its own thread on the first attachment
    /// and stops it again once the last session is closed.
    pub fn new(timing: SyncPulseTiming) -> Self {
        Self::build(timing, true)
    }

    /// Pulse generator without a thread; pulses are produced by calling
    /// [`emit`](Self::emit).
    pub fn manual(timing: SyncPulseTiming) -> Self {
        Self::build(timing, false)
    }

    fn build(timing: SyncPulseTiming, free_running: bool) -> Self {
        Self {
            timing,
            shared: Arc::new(Shared {
                state: Mutex::new(SyncState::default()),
                running: AtomicBool::new(false),
            }),
            free_running,
            pulse_thread: Mutex::new(None),
        }
    }

    /// Produce one edge by hand.
    pub fn emit(&self, edge: SyncEdge) {
        self.shared.emit(edge);
    }

    /// Number of handlers currently attached.
    pub fn attachment_count(&self) -> usize {
        self.shared.lock().attachments.len()
    }

    /// Number of open sessions.
    pub fn session_count(&self) -> usize {
        self.shared.lock().sessions.len()
    }

    /// `true` while the free-running pulse thread is alive.
    pub fn is_pulsing(&self) -> bool {
        self.pulse_thread
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .is_some()
    }

    fn ensure_pulse_thread(&self) {
        if !self.free_running || !self.timing.is_consistent() {
            return;
        }
        let mut slot = self.pulse_thread.lock().unwrap_or_else(|p| p.into_inner());
        if slot.is_some() {
            return;
        }

        self.shared.running.store(true, Ordering::SeqCst);
        let shared = Arc::clone(&self.shared);
        let high = Duration::from_micros(self.timing.high_us as u64);
        let low = Duration::from_micros(self.timing.low_us as u64);

        let spawned = thread::Builder::new()
            .name("soft-sync".into())
            .spawn(move || {
                let mut next = Instant::now();
                while shared.running.load(Ordering::Relaxed) {
                    next += high;
                    sleep_until(next);
                    shared.emit(SyncEdge::Rising);
                    next += low;
                    sleep_until(next);
                    shared.emit(SyncEdge::Falling);
                }
            });

        match spawned {
            Ok(handle) => {
                info!(period_us = self.timing.period_us(), "Software sync pulses started");
                *slot = Some(handle);
            }
            Err(e) => warn!("Could not start software sync thread: {}", e),
        }
    }

    /// Join the pulse thread if no session is left.
    fn stop_idle_pulse_thread(&self) {
        let mut slot = self.pulse_thread.lock().unwrap_or_else(|p| p.into_inner());
        // A session may have been opened since the caller saw none.
        if !self.shared.lock().sessions.is_empty() {
            return;
        }
        self.shared.running.store(false, Ordering::SeqCst);
        if let Some(handle) = slot.take() {
            let _ = handle.join();
            info!("Software sync pulses stopped");
        }
    }
}

fn sleep_until(deadline: Instant) {
    let now = Instant::now();
    if deadline > now {
        thread::sleep(deadline - now);
    }
}

impl SyncSource for SoftSync {
    fn start_session(&self, module: &str) -> Result<SyncSession, PlatformError> {
        let mut state = self.shared.lock();
        if let Some(entry) = state.sessions.get_mut(module) {
            entry.refs += 1;
            debug!(module, session = entry.id.0, refs = entry.refs, "Joined sync session");
            return Ok(entry.id);
        }

        state.next_session += 1;
        let id = SyncSession(state.next_session);
        state
            .sessions
            .insert(module.to_string(), SessionEntry { id, refs: 1 });
        debug!(module, session = id.0, "Opened sync session");
        Ok(id)
    }

    fn stop_session(&self, session: SyncSession) {
        let idle = {
            let mut state = self.shared.lock();
            let Some(module) = state
                .sessions
                .iter()
                .find(|(_, e)| e.id == session)
                .map(|(m, _)| m.clone())
            else {
                return;
            };

            let closed = match state.sessions.get_mut(&module) {
                Some(entry) => {
                    entry.refs = entry.refs.saturating_sub(1);
                    entry.refs == 0
                }
                None => false,
            };
            if closed {
                state.sessions.remove(&module);
                state.attachments.retain(|a| a.session != session);
                debug!(module = %module, session = session.0, "Closed sync session");
            }
            closed && state.sessions.is_empty()
        };
        // The pulse thread takes the state lock on every edge.
        if idle {
            self.stop_idle_pulse_thread();
        }
    }

    fn pulse_timing(&self) -> SyncPulseTiming {
        self.timing
    }

    fn attach(
        &self,
        session: SyncSession,
        edge: SyncEdge,
        divisor: u32,
        handler: SyncHandler,
    ) -> Result<AttachId, PlatformError> {
        let id = {
            let mut state = self.shared.lock();
            if !state.sessions.values().any(|e| e.id == session) {
                return Err(PlatformError::UnknownSyncSession(session));
            }
            state.next_attach += 1;
            let id = AttachId(state.next_attach);
            state.attachments.push(Attachment {
                id,
                session,
                edge,
                divisor: divisor.max(1),
                count: 0,
                handler,
            });
            id
        };
        self.ensure_pulse_thread();
        Ok(id)
    }

    fn detach(&self, id: AttachId) {
        self.shared.lock().attachments.retain(|a| a.id != id);
    }
}

impl Drop for SoftSync {
    fn drop(&mut self) {
        self.shared.running.store(false, Ordering::SeqCst);
        let slot = self.pulse_thread.get_mut().unwrap_or_else(|p| p.into_inner());
        if let Some(handle) = slot.take() {
            let _ = handle.join();
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    fn counter_handler() -> (Arc<AtomicU32>, SyncHandler) {
        let hits = Arc::new(AtomicU32::new(0));
        let h = Arc::clone(&hits);
        let handler: SyncHandler = Arc::new(move || {
            h.fetch_add(1, Ordering::SeqCst);
        });
        (hits, handler)
    }

    #[test]
    fn sessions_are_shared_per_module() {
        let sync = SoftSync::manual(SyncPulseTiming::new(500, 500));
        let a = sync.start_session("CTRL").unwrap();
        let b = sync.start_session("CTRL").unwrap();
        let c = sync.start_session("OTHER").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(sync.session_count(), 2);

        sync.stop_session(a);
        assert_eq!(sync.session_count(), 2, "one reference still open");
        sync.stop_session(b);
        assert_eq!(sync.session_count(), 1);
    }

    #[test]
    fn handler_fires_every_divisor_pulses_on_selected_edge() {
        let sync = SoftSync::manual(SyncPulseTiming::new(500, 500));
        let session = sync.start_session("CTRL").unwrap();
        let (hits, handler) = counter_handler();
        sync.attach(session, SyncEdge::Falling, 3, handler).unwrap();

        for _ in 0..7 {
            sync.emit(SyncEdge::Rising);
            sync.emit(SyncEdge::Falling);
        }
        // 7 falling edges / 3 → 2 calls
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn attach_to_unknown_session_fails() {
        let sync = SoftSync::manual(SyncPulseTiming::new(500, 500));
        let (_, handler) = counter_handler();
        let err = sync
            .attach(SyncSession(42), SyncEdge::Falling, 1, handler)
            .unwrap_err();
        assert_eq!(err, PlatformError::UnknownSyncSession(SyncSession(42)));
    }

    #[test]
    fn closing_last_session_reference_detaches_handlers() {
        let sync = SoftSync::manual(SyncPulseTiming::new(500, 500));
        let session = sync.start_session("CTRL").unwrap();
        let (hits, handler) = counter_handler();
        sync.attach(session, SyncEdge::Falling, 1, handler).unwrap();
        sync.stop_session(session);

        assert_eq!(sync.attachment_count(), 0);
        sync.emit(SyncEdge::Falling);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn free_running_generator_produces_pulses() {
        let sync = SoftSync::new(SyncPulseTiming::new(500, 500));
        let session = sync.start_session("CTRL").unwrap();
        let (hits, handler) = counter_handler();
        sync.attach(session, SyncEdge::Falling, 1, handler).unwrap();

        thread::sleep(Duration::from_millis(50));
        assert!(hits.load(Ordering::SeqCst) > 0, "expected pulses within 50 ms");
    }

    #[test]
    fn pulse_thread_stops_with_last_session_and_restarts_on_attach() {
        let sync = SoftSync::new(SyncPulseTiming::new(500, 500));
        let first = sync.start_session("CTRL").unwrap();
        let other = sync.start_session("OTHER").unwrap();
        let (_, handler) = counter_handler();
        sync.attach(first, SyncEdge::Falling, 1, handler).unwrap();
        assert!(sync.is_pulsing());

        sync.stop_session(first);
        assert!(sync.is_pulsing(), "OTHER is still open");
        sync.stop_session(other);
        assert!(!sync.is_pulsing());

        let (hits, handler) = counter_handler();
        let session = sync.start_session("CTRL").unwrap();
        assert!(!sync.is_pulsing(), "opening a session alone starts nothing");

        sync.attach(session, SyncEdge::Falling, 1, handler).unwrap();
        assert!(sync.is_pulsing());
        thread::sleep(Duration::from_millis(50));
        assert!(hits.load(Ordering::SeqCst) > 0, "pulses resume after restart");
    }
}
