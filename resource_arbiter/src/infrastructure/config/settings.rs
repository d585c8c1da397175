// /////////////////////////////////////////////////////////////////////////////
// Resource Arbiter RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Daemon Settings
//!
//! Typed configuration of the arbiter daemon, loaded in layers:
//!
//! 1. compiled defaults,
//! 2. an optional TOML file,
//! 3. `ARBITER_*` environment overrides (`__` as section separator),
//! 4. CLI argument overrides applied by the composition root.
//!
//! ## Example Configuration File
//!
//! ```toml
//! [general]
//! var_dir = "/var/run/arbiter"
//! etc_dir = "/etc/arbiter"
//! log_level = "info"
//! log_format = "pretty"
//!
//! [scheduler]
//! policy = "naive"
//! opt_interval_ms = 0      # 0 = on-demand only
//!
//! [sync]
//! force_sync = false
//! agent_deadline_ms = 500
//! max_latency_ms = 1000
//!
//! [monitor]
//! period_ms = 0            # 0 disables the power monitor
//!
//! [[platform.layout]]
//! path = "sys0.cpu0.pe0"
//! units = "1"
//! amount = 100
//!
//! [[platform.layout]]
//! path = "sys0.mem0"
//! units = "Mb"
//! amount = 512
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;

use resource_arbiter_domain::ArbiterError;

/// One declared resource of the platform layout.
#[derive(Debug, Clone, Deserialize)]
pub struct LayoutEntry {
    /// Exact resource path, e.g. `sys0.cpu0.pe1`
    pub path: String,
    /// Declared capacity unit (`1`, `Kb`, `Mb`, `Gb`, `KHz`, `MHz`, `GHz`)
    #[serde(default)]
    pub units: String,
    /// Declared capacity amount
    pub amount: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    /// Runtime directory holding the command FIFO and the agent socket
    pub var_dir: PathBuf,
    /// Configuration directory holding recipes
    pub etc_dir: PathBuf,
    /// Log level filter
    pub log_level: String,
    /// Log output format (`pretty` or `json`)
    pub log_format: String,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            var_dir: PathBuf::from("/var/run/arbiter"),
            etc_dir: PathBuf::from("/etc/arbiter"),
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    /// Name of the scheduling policy to load from the registry
    pub policy: String,
    /// Periodic optimisation interval; 0 means on-demand only
    pub opt_interval_ms: u64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            policy: "naive".to_string(),
            opt_interval_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Synchronous-sleep protocol variant: PreChange first, then a settle
    /// sleep, SyncChange, SyncPlatform and DoChange
    pub force_sync: bool,
    /// Deadline for every workload-agent RPC
    pub agent_deadline_ms: u64,
    /// Clamp applied to agent-declared synchronisation latencies
    pub max_latency_ms: u32,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            force_sync: false,
            agent_deadline_ms: 500,
            max_latency_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PlatformSettings {
    /// Declared resource layout; empty means probe the host (one 100-unit
    /// processing element per logical CPU plus the physical memory)
    pub layout: Vec<LayoutEntry>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitorSettings {
    /// Power/thermal sampling period; 0 disables the monitor
    pub period_ms: u64,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self { period_ms: 0 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentChannelSettings {
    /// Core protocol version advertised during pairing
    pub major: u8,
    pub minor: u8,
}

impl Default for AgentChannelSettings {
    fn default() -> Self {
        Self { major: 1, minor: 3 }
    }
}

/// Complete daemon configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ArbiterSettings {
    pub general: GeneralSettings,
    pub scheduler: SchedulerSettings,
    pub sync: SyncSettings,
    pub platform: PlatformSettings,
    pub monitor: MonitorSettings,
    pub agent: AgentChannelSettings,
}

impl ArbiterSettings {
    /// Loads the layered configuration.
    ///
    /// # Errors
    /// Returns `InvalidConfiguration` when the file or an environment
    /// override cannot be parsed into the settings schema.
    pub fn load(file: Option<&Path>) -> Result<Self, ArbiterError> {
        let mut builder = config::Config::builder();
        if let Some(file) = file {
            builder = builder.add_source(config::File::from(file));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("ARBITER")
                .separator("__")
                .try_parsing(true),
        );
        let raw = builder
            .build()
            .map_err(|e| ArbiterError::InvalidConfiguration(e.to_string()))?;
        let settings: ArbiterSettings = raw
            .try_deserialize()
            .map_err(|e| ArbiterError::InvalidConfiguration(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validates cross-field constraints.
    pub fn validate(&self) -> Result<(), ArbiterError> {
        if self.sync.agent_deadline_ms == 0 {
            return Err(ArbiterError::InvalidConfiguration(
                "sync.agent_deadline_ms must be positive".into(),
            ));
        }
        match self.general.log_format.as_str() {
            "pretty" | "json" => {}
            other => {
                return Err(ArbiterError::InvalidConfiguration(format!(
                    "general.log_format '{}' is not one of pretty|json",
                    other
                )));
            }
        }
        for entry in &self.platform.layout {
            entry
                .path
                .parse::<resource_arbiter_domain::ResourcePath>()
                .map_err(|e| {
                    ArbiterError::InvalidConfiguration(format!("platform.layout: {}", e))
                })?;
            entry
                .units
                .parse::<resource_arbiter_domain::DeclaredUnit>()
                .map_err(|e| {
                    ArbiterError::InvalidConfiguration(format!("platform.layout: {}", e))
                })?;
        }
        Ok(())
    }

    /// The command FIFO path under the runtime directory.
    pub fn fifo_path(&self) -> PathBuf {
        self.general.var_dir.join("bbque_cmds")
    }

    /// The workload-agent socket path under the runtime directory.
    pub fn agent_socket_path(&self) -> PathBuf {
        self.general.var_dir.join("agent.sock")
    }

    /// The recipe directory under the configuration directory.
    pub fn recipe_dir(&self) -> PathBuf {
        self.general.etc_dir.join("recipes")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let settings = ArbiterSettings::default();
        assert_eq!(settings.scheduler.policy, "naive");
        assert_eq!(settings.scheduler.opt_interval_ms, 0);
        assert!(!settings.sync.force_sync);
        assert_eq!(settings.sync.agent_deadline_ms, 500);
        assert!(settings.platform.layout.is_empty());
        assert!(settings.fifo_path().ends_with("bbque_cmds"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        writeln!(
            file,
            r#"
[scheduler]
policy = "random"
opt_interval_ms = 1000

[sync]
force_sync = true

[[platform.layout]]
path = "sys0.cpu0.pe0"
units = "1"
amount = 100
"#
        )
        .unwrap();

        let settings = ArbiterSettings::load(Some(file.path())).unwrap();
        assert_eq!(settings.scheduler.policy, "random");
        assert_eq!(settings.scheduler.opt_interval_ms, 1000);
        assert!(settings.sync.force_sync);
        assert_eq!(settings.platform.layout.len(), 1);
    }

    #[test]
    fn test_validation_rejects_bad_layout() {
        let settings = ArbiterSettings {
            platform: PlatformSettings {
                layout: vec![LayoutEntry {
                    path: "sys0.banana0".to_string(),
                    units: String::new(),
                    amount: 1,
                }],
            },
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_zero_deadline() {
        let settings = ArbiterSettings {
            sync: SyncSettings {
                agent_deadline_ms: 0,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }
}
