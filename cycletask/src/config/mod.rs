/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Task configuration loading and merging.
//!
//! The expected YAML structure is:
//! ```yaml
//! modules:
//!   CTRL:
//!     ControlTask:
//!       TaskMode: Cyclic
//!       CycleTime: 10.0
//!       Priority: 70
//!       WatchdogRatio: 5
//!     SyncTask:
//!       TaskMode: Sync
//!       SyncEdge: Rising
//! ```
//!
//! Parsing is permissive; validation happens per group in
//! [`TaskConfigManager::lookup`], so one bad group does not hide the others.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::lifecycle::error::ConfigError;
use crate::platform::SyncEdge;
use crate::task::{TaskDescriptor, TimeBase};

// ── Private YAML deserialization types ────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct TaskConfigFile {
    #[serde(default)]
    modules: HashMap<String, HashMap<String, Option<GroupEntry>>>,
}

/// Per-group fields as they appear in the YAML file.  Kept as raw strings
/// where an unknown value must be reported by name.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GroupEntry {
    task_mode: Option<String>,
    cycle_time: Option<f64>,
    priority: Option<u32>,
    watchdog_ratio: Option<u32>,
    sync_edge: Option<String>,
}

// ── Public data structures ────────────────────────────────────────────────────

/// Module-wide parameters the descriptors are merged against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleParams {
    /// Application (module) name, used as configuration section and for
    /// default task names.
    pub app_name: String,
    /// Priority used when neither the group nor the descriptor sets one.
    pub default_priority: u32,
}

impl ModuleParams {
    pub fn new(app_name: impl Into<String>, default_priority: u32) -> Self {
        Self {
            app_name: app_name.into(),
            default_priority,
        }
    }
}

/// Validated parameters of one configuration group.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskConfig {
    pub time_base: TimeBase,
    pub cycle_time_ms: Option<f64>,
    pub priority: Option<u32>,
    pub wdog_ratio: Option<u32>,
    pub sync_edge: Option<SyncEdge>,
}

// ── TaskConfigManager ─────────────────────────────────────────────────────────

/// Loads task configuration groups from YAML and merges them into
/// descriptors.
#[derive(Debug, Default)]
pub struct TaskConfigManager {
    /// module → group → raw entry
    modules: HashMap<String, HashMap<String, Option<GroupEntry>>>,
    loaded: bool,
}

impl TaskConfigManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `path`.  A second call replaces everything loaded before.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or is not valid YAML of
    /// the expected shape.
    pub fn load_from_file(&mut self, path: &Path) -> Result<()> {
        info!("Loading task configuration from: {}", path.display());

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot open configuration file: {}", path.display()))?;
        self.load_from_str(&content)
            .with_context(|| format!("Failed to parse YAML file: {}", path.display()))
    }

    pub fn load_from_str(&mut self, content: &str) -> Result<()> {
        self.modules.clear();
        self.loaded = false;

        let file: TaskConfigFile =
            serde_yaml::from_str(content).context("Invalid task configuration")?;

        if file.modules.is_empty() {
            warn!("No modules found in task configuration");
        }
        for (module, groups) in &file.modules {
            debug!(module = %module, groups = groups.len(), "Module configuration");
        }

        self.modules = file.modules;
        self.loaded = true;
        info!(
            "Successfully loaded configuration for {} module(s)",
            self.modules.len()
        );
        Ok(())
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Validated configuration of `module/group`.
    pub fn lookup(&self, module: &str, group: &str) -> Result<TaskConfig, ConfigError> {
        let at = || (module.to_string(), group.to_string());

        if !self.loaded {
            let (module, group) = at();
            return Err(ConfigError::NotLoaded { module, group });
        }

        let entry = match self.modules.get(module).and_then(|g| g.get(group)) {
            Some(entry) => entry.clone().unwrap_or_default(),
            None => {
                let (module, group) = at();
                return Err(ConfigError::MissingGroup { module, group });
            }
        };

        let time_base = match entry.task_mode.as_deref() {
            None => {
                let (module, group) = at();
                return Err(ConfigError::MissingTaskMode { module, group });
            }
            Some(s) => TimeBase::from_config_str(s).ok_or_else(|| {
                let (module, group) = at();
                ConfigError::UnknownTaskMode {
                    module,
                    group,
                    value: s.to_string(),
                }
            })?,
        };

        if let Some(ms) = entry.cycle_time {
            if !(ms.is_finite() && ms > 0.0) {
                let (module, group) = at();
                return Err(ConfigError::InvalidCycleTime {
                    module,
                    group,
                    value: ms,
                });
            }
        } else if time_base == TimeBase::Cyclic {
            let (module, group) = at();
            return Err(ConfigError::MissingCycleTime { module, group });
        }

        let sync_edge = match entry.sync_edge.as_deref() {
            None => None,
            Some(s) => Some(parse_edge(s).ok_or_else(|| {
                let (module, group) = at();
                ConfigError::UnknownSyncEdge {
                    module,
                    group,
                    value: s.to_string(),
                }
            })?),
        };

        Ok(TaskConfig {
            time_base,
            cycle_time_ms: entry.cycle_time,
            priority: entry.priority,
            wdog_ratio: entry.watchdog_ratio,
            sync_edge,
        })
    }

    /// Merge the descriptor's configuration group into `desc`.
    ///
    /// An empty group keeps the static values.  Priority resolves as
    /// configured value, then static descriptor value, then module default.
    pub fn apply(&self, params: &ModuleParams, desc: &mut TaskDescriptor) -> Result<(), ConfigError> {
        if desc.cfg_group.is_empty() {
            info!(task = %desc.name, "No configuration group, using static task parameters");
        } else {
            let cfg = self.lookup(&params.app_name, &desc.cfg_group)?;
            desc.time_base = cfg.time_base;
            if cfg.cycle_time_ms.is_some() {
                desc.cycle_time_ms = cfg.cycle_time_ms;
            }
            if let Some(ratio) = cfg.wdog_ratio {
                desc.wdog_ratio = ratio;
            }
            if let Some(edge) = cfg.sync_edge {
                desc.sync_edge = edge;
            }
            if let Some(p) = cfg.priority.filter(|p| *p != 0) {
                desc.priority = p;
            }
            debug!(
                task = %desc.name,
                group = %desc.cfg_group,
                time_base = %desc.time_base,
                cycle_time_ms = ?desc.cycle_time_ms,
                "Configuration applied"
            );
        }

        desc.priority = resolve_priority(desc.priority, params.default_priority).ok_or_else(|| {
            ConfigError::ZeroPriority {
                task: display_name(desc),
            }
        })?;
        Ok(())
    }
}

/// First non-zero of descriptor and module default.
pub fn resolve_priority(descriptor: u32, module_default: u32) -> Option<u32> {
    [descriptor, module_default].into_iter().find(|p| *p != 0)
}

fn parse_edge(s: &str) -> Option<SyncEdge> {
    match s {
        "Rising" => Some(SyncEdge::Rising),
        "Falling" => Some(SyncEdge::Falling),
        _ => None,
    }
}

fn display_name(desc: &TaskDescriptor) -> String {
    if desc.name.is_empty() {
        desc.cfg_group.clone()
    } else {
        desc.name.clone()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
