// /////////////////////////////////////////////////////////////////////////////
// Resource Arbiter RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Daemon Argument Parsing
//!
//! CLI surface of the arbiter daemon. Arguments override the layered
//! configuration (defaults → file → environment → CLI).

use std::path::PathBuf;

use clap::Parser;

/// Run-time resource arbiter daemon.
#[derive(Debug, Parser)]
#[command(name = "resource_arbiter", version, about = "Run-time resource arbiter")]
pub struct Arguments {
    /// Path to the configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Scheduling policy to load (overrides the configuration)
    #[arg(short, long, value_name = "NAME")]
    pub policy: Option<String>,

    /// Runtime directory for the command FIFO and agent socket
    #[arg(long, value_name = "DIR")]
    pub var_dir: Option<PathBuf>,

    /// Log level filter (error, warn, info, debug, trace)
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Log output format
    #[arg(long, value_enum, value_name = "FORMAT")]
    pub log_format: Option<LogFormat>,

    /// Validate the configuration and exit
    #[arg(long)]
    pub check_config: bool,
}

/// Log output formats supported by the logging layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    /// Human-readable output for development
    Pretty,
    /// JSON lines for production log shipping
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Arguments::parse_from(["resource_arbiter"]);
        assert!(args.config.is_none());
        assert!(args.policy.is_none());
        assert!(!args.check_config);
    }

    #[test]
    fn test_overrides() {
        let args = Arguments::parse_from([
            "resource_arbiter",
            "--config",
            "/etc/arbiter.toml",
            "--policy",
            "random",
            "--var-dir",
            "/tmp/arbiter",
            "--log-format",
            "json",
            "--check-config",
        ]);
        assert_eq!(args.config, Some(PathBuf::from("/etc/arbiter.toml")));
        assert_eq!(args.policy.as_deref(), Some("random"));
        assert_eq!(args.log_format, Some(LogFormat::Json));
        assert!(args.check_config);
    }
}
