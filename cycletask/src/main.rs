/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use cycletask::app::{ControlTask, LoopbackImage};
use cycletask::config::{ModuleParams, TaskConfigManager};
use cycletask::lifecycle::TaskManager;
use cycletask::platform::{Platform, SyncEdge, SyncPulseTiming};
use cycletask::task::TaskDescriptor;

// ── CLI argument definition ───────────────────────────────────────────────────

/// Periodic task engine running a demo control module on the hosted platform.
///
/// Example:
///   cycletask --config tasks.yaml --module CTRL --run-for 10
#[derive(Debug, Parser)]
#[command(name = "cycletask", about = "Periodic task engine", long_about = None)]
struct Cli {
    /// Path to the YAML task configuration file.
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Module (application) name; selects the configuration section.
    #[arg(short = 'm', long = "module", default_value = "CTRL")]
    module: String,

    /// Tick rate of the hosted tick counter in Hz.
    #[arg(long = "tick-rate", default_value_t = 1000)]
    tick_rate: u32,

    /// High phase of the software sync pulse in µs.
    #[arg(long = "sync-high-us", default_value_t = 500)]
    sync_high_us: u32,

    /// Low phase of the software sync pulse in µs.
    #[arg(long = "sync-low-us", default_value_t = 500)]
    sync_low_us: u32,

    /// Priority for tasks that configure none.
    #[arg(short = 'p', long = "default-priority", default_value_t = 50)]
    default_priority: u32,

    /// Cycle time of the control task in ms when no configuration is loaded.
    #[arg(long = "cycle-ms", default_value_t = 10.0)]
    cycle_ms: f64,

    /// Stop after this many seconds instead of waiting for Ctrl-C.
    #[arg(long = "run-for")]
    run_for: Option<u64>,

    /// Seconds between diagnostics reports.
    #[arg(long = "diag-interval", default_value_t = 5)]
    diag_interval: u64,

    /// Default log level debug instead of info.
    #[arg(short = 'd', long = "debug", default_value_t = false)]
    debug: bool,
}

// ── Demo module ───────────────────────────────────────────────────────────────

fn register_tasks(mgr: &mut TaskManager, cli: &Cli) {
    mgr.register(
        TaskDescriptor::new(
            "ControlTask",
            ControlTask::new(LoopbackImage::new(), |i: &u64, o: &mut u64| {
                *o = i.wrapping_add(1)
            }),
        )
        .with_cyclic(cli.cycle_ms),
    );

    let mut pulses = 0u64;
    mgr.register(
        TaskDescriptor::new("SyncTask", move || {
            pulses = pulses.wrapping_add(1);
        })
        .with_name("sync")
        .with_sync(None, SyncEdge::Falling),
    );
}

fn report(mgr: &TaskManager) {
    for d in mgr.diagnostics() {
        info!(
            task = %d.name,
            backlog_events = d.backlog_events,
            skipped_cycles = d.skipped_cycles,
            "Task diagnostics"
        );
    }
}

// ── Run loop ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shutdown {
    RunTimeElapsed,
    Signal,
}

/// Call `on_tick` every `period` until `stop` or `signal` completes.
///
/// Both futures live across iterations, so a signal that arrives while
/// `on_tick` runs is seen on the next poll.
async fn wait_for_shutdown<S, C>(
    stop: S,
    signal: C,
    period: Duration,
    mut on_tick: impl FnMut(),
) -> Shutdown
where
    S: Future<Output = ()>,
    C: Future<Output = std::io::Result<()>>,
{
    tokio::pin!(stop);
    tokio::pin!(signal);

    let mut diag = tokio::time::interval(period);
    diag.tick().await;

    loop {
        tokio::select! {
            _ = diag.tick() => on_tick(),
            _ = &mut stop => return Shutdown::RunTimeElapsed,
            res = &mut signal => {
                if let Err(e) = res {
                    warn!("Failed to listen for Ctrl-C: {}", e);
                }
                return Shutdown::Signal;
            }
        }
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Level is controlled by RUST_LOG; --debug only changes the default.
    let default_level = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();

    info!(
        module = %cli.module,
        tick_rate = cli.tick_rate,
        sync_high_us = cli.sync_high_us,
        sync_low_us = cli.sync_low_us,
        default_priority = cli.default_priority,
        config = ?cli.config,
        "cycletask starting up"
    );

    anyhow::ensure!(cli.tick_rate > 0, "tick rate must be non-zero");

    let platform = Platform::hosted(
        cli.tick_rate,
        SyncPulseTiming::new(cli.sync_high_us, cli.sync_low_us),
    );
    let mut mgr = TaskManager::new(
        ModuleParams::new(cli.module.clone(), cli.default_priority),
        platform,
    );
    register_tasks(&mut mgr, &cli);

    match &cli.config {
        Some(path) => {
            let mut config = TaskConfigManager::new();
            config.load_from_file(path)?;
            mgr.configure(&config)
                .context("Failed to apply task configuration")?;
        }
        None => warn!("No task configuration file provided, using static task parameters"),
    }

    mgr.start().context("Task startup failed")?;
    mgr.end_of_init();

    let stop = async {
        match cli.run_for {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending().await,
        }
    };
    let how = wait_for_shutdown(
        stop,
        tokio::signal::ctrl_c(),
        Duration::from_secs(cli.diag_interval.max(1)),
        || report(&mgr),
    )
    .await;
    match how {
        Shutdown::RunTimeElapsed => info!("Run time elapsed, shutting down"),
        Shutdown::Signal => info!("Ctrl-C received, shutting down"),
    }

    mgr.stop();
    report(&mgr);
    let teardown = mgr.delete_all();
    info!(
        self_terminated = teardown.self_terminated,
        forced = teardown.forced,
        "cycletask stopped"
    );
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
