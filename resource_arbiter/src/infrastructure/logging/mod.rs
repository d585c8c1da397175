// /////////////////////////////////////////////////////////////////////////////
// Resource Arbiter RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Infrastructure Logging
//!
//! Structured logging for the arbiter daemon: `tracing` initialisation
//! (env-filter, pretty output for development, JSON lines for production)
//! plus the status-report renderers behind the `*_status` commands and
//! the USR1/USR2 signals.
//!
//! Status reports are plain text tables emitted one record per line at
//! `info`; their format is diagnostic output, not a contract.

use tracing::info;
use tracing_subscriber::EnvFilter;

use resource_arbiter_domain::{ArbiterError, ResourceStatus};

/// Initialises the global tracing subscriber.
///
/// # Errors
/// Returns `InvalidConfiguration` for an unknown format and
/// `InternalError` when a subscriber is already installed.
pub fn init_logging(level: &str, format: &str) -> Result<(), ArbiterError> {
    let filter = EnvFilter::try_new(level)
        .map_err(|e| ArbiterError::InvalidConfiguration(format!("log filter: {}", e)))?;
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let result = match format {
        "pretty" => builder.try_init(),
        "json" => builder.json().try_init(),
        other => {
            return Err(ArbiterError::InvalidConfiguration(format!(
                "log format '{}' is not one of pretty|json",
                other
            )));
        }
    };
    result.map_err(|e| ArbiterError::InternalError(e.to_string()))
}

/// One row of the workload status report.
#[derive(Debug, Clone)]
pub struct WorkloadStatusRow {
    /// Workload identifier (`name:pid[:exc]`)
    pub id: String,
    pub priority: u16,
    pub state: String,
    /// Current working mode, `-` when none
    pub current_awm: String,
    /// Scheduled working mode, `-` when none
    pub next_awm: String,
}

/// Renders the per-node accounting table of the committed view.
pub fn report_resources(rows: &[ResourceStatus]) {
    info!("========== Resources ==========================================");
    info!("| {:<28} | {:>12} | {:>12} |", "RESOURCE", "USED", "TOTAL");
    for row in rows {
        info!(
            "| {:<28} | {:>12} | {:>12} |",
            row.path.to_string(),
            row.used,
            row.total
        );
    }
    info!("===============================================================");
}

/// Renders the workload status table.
pub fn report_workloads(title: &str, rows: &[WorkloadStatusRow]) {
    info!("========== {} ", title);
    info!(
        "| {:<20} | {:>4} | {:<14} | {:<10} | {:<10} |",
        "WORKLOAD", "PRIO", "STATE", "AWM", "NEXT"
    );
    for row in rows {
        info!(
            "| {:<20} | {:>4} | {:<14} | {:<10} | {:<10} |",
            row.id, row.priority, row.state, row.current_awm, row.next_awm
        );
    }
    info!("===============================================================");
}

/// Renders the sync-queue population table.
pub fn report_sync_queues(counts: &[(String, usize)]) {
    info!("========== Sync queues ========================================");
    for (queue, count) in counts {
        info!("| {:<20} | {:>6} |", queue, count);
    }
    info!("===============================================================");
}
