/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! cycletask – periodic task engine for cyclic control applications
//!
//! Module layout:
//!
//! ```text
//! lib.rs
//! ├── task        – task descriptor, Runnable, counters
//! ├── timing/     – tick / sync time grid, grid arithmetic
//! ├── waiter      – per-cycle wait with backlog / skip policy
//! ├── watchdog    – per-task supervisory timer
//! ├── gate        – module Run/Stop gate
//! ├── lifecycle/  – TaskManager: create_all / delete_all
//! ├── platform/   – tick, sync and watchdog seams + hosted implementations
//! ├── config/     – YAML task configuration
//! └── app         – process image and ControlTask
//! ```

pub mod app;
pub mod config;
pub mod gate;
pub mod lifecycle;
pub mod platform;
pub mod task;
pub mod timing;
pub mod waiter;
pub mod watchdog;
