// /////////////////////////////////////////////////////////////////////////////
// Resource Arbiter RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Scheduler & Synchronisation Metrics
//!
//! Prometheus counters and histograms mirroring the decisions the
//! scheduler and synchronisation managers take: run/completion counts,
//! per-transition totals, synchronisation misses and phase timings.
//!
//! The collector owns a private registry so several arbiter instances can
//! coexist in one process (integration tests run a few). Metrics are
//! surfaced through the periodic log dump; no HTTP endpoint is exposed.

use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry};
use tracing::info;

use resource_arbiter_domain::{ArbiterError, SyncState};

/// Label values used for the per-transition counter.
fn transition_label(sync: SyncState) -> &'static str {
    match sync {
        SyncState::Starting => "starting",
        SyncState::Reconf => "reconf",
        SyncState::MigRec => "migrec",
        SyncState::Migrate => "migrate",
        SyncState::Blocked => "blocked",
        SyncState::Disabled => "disabled",
    }
}

/// The metric set of the arbiter core.
pub struct ArbiterMetrics {
    registry: Registry,

    /// Scheduler executions
    pub sched_runs: IntCounter,
    /// Scheduler completions
    pub sched_completed: IntCounter,
    /// Scheduler runs that failed or were refused by the policy
    pub sched_failed: IntCounter,
    /// Scheduler runs delayed by the policy or an open sync session
    pub sched_delayed: IntCounter,
    /// Scheduling decisions per transition flavour
    pub sched_transitions: IntCounterVec,
    /// Scheduler execution time
    pub sched_time_ms: Histogram,

    /// Synchronisation sessions started
    pub sync_runs: IntCounter,
    /// Synchronisation sessions committed
    pub sync_completed: IntCounter,
    /// Synchronisation sessions aborted
    pub sync_aborted: IntCounter,
    /// Workloads disabled for missing a synchronisation point
    pub sync_misses: IntCounter,
    /// Synchronisation session time
    pub sync_time_ms: Histogram,
    /// Synchronisation latencies declared by agents
    pub agent_latency_ms: Histogram,
}

impl ArbiterMetrics {
    /// Creates and registers the metric set.
    ///
    /// # Errors
    /// Returns `InternalError` when a collector cannot be registered
    /// (duplicate names inside one registry).
    pub fn new() -> Result<Self, ArbiterError> {
        let registry = Registry::new();
        let err = |e: prometheus::Error| ArbiterError::InternalError(e.to_string());

        let sched_runs =
            IntCounter::new("arbiter_sched_runs_total", "Scheduler executions").map_err(err)?;
        let sched_completed =
            IntCounter::new("arbiter_sched_completed_total", "Scheduler completions")
                .map_err(err)?;
        let sched_failed =
            IntCounter::new("arbiter_sched_failed_total", "Failed scheduler runs").map_err(err)?;
        let sched_delayed =
            IntCounter::new("arbiter_sched_delayed_total", "Delayed scheduler runs")
                .map_err(err)?;
        let sched_transitions = IntCounterVec::new(
            Opts::new(
                "arbiter_sched_transitions_total",
                "Scheduling decisions per transition flavour",
            ),
            &["transition"],
        )
        .map_err(err)?;
        let sched_time_ms = Histogram::with_opts(HistogramOpts::new(
            "arbiter_sched_time_ms",
            "Scheduler execution time [ms]",
        ))
        .map_err(err)?;

        let sync_runs =
            IntCounter::new("arbiter_sync_runs_total", "Sync sessions started").map_err(err)?;
        let sync_completed =
            IntCounter::new("arbiter_sync_completed_total", "Sync sessions committed")
                .map_err(err)?;
        let sync_aborted =
            IntCounter::new("arbiter_sync_aborted_total", "Sync sessions aborted").map_err(err)?;
        let sync_misses = IntCounter::new(
            "arbiter_sync_misses_total",
            "Workloads disabled for missing a synchronisation point",
        )
        .map_err(err)?;
        let sync_time_ms = Histogram::with_opts(HistogramOpts::new(
            "arbiter_sync_time_ms",
            "Sync session time [ms]",
        ))
        .map_err(err)?;
        let agent_latency_ms = Histogram::with_opts(HistogramOpts::new(
            "arbiter_agent_latency_ms",
            "Agent-declared sync latency [ms]",
        ))
        .map_err(err)?;

        for collector in [
            Box::new(sched_runs.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(sched_completed.clone()),
            Box::new(sched_failed.clone()),
            Box::new(sched_delayed.clone()),
            Box::new(sched_transitions.clone()),
            Box::new(sched_time_ms.clone()),
            Box::new(sync_runs.clone()),
            Box::new(sync_completed.clone()),
            Box::new(sync_aborted.clone()),
            Box::new(sync_misses.clone()),
            Box::new(sync_time_ms.clone()),
            Box::new(agent_latency_ms.clone()),
        ] {
            registry.register(collector).map_err(err)?;
        }

        Ok(Self {
            registry,
            sched_runs,
            sched_completed,
            sched_failed,
            sched_delayed,
            sched_transitions,
            sched_time_ms,
            sync_runs,
            sync_completed,
            sync_aborted,
            sync_misses,
            sync_time_ms,
            agent_latency_ms,
        })
    }

    /// Accounts one scheduling decision of the given flavour.
    pub fn count_transition(&self, sync: SyncState, count: u64) {
        self.sched_transitions
            .with_label_values(&[transition_label(sync)])
            .inc_by(count);
    }

    /// Logs the current counter values, one record per metric family.
    pub fn dump(&self) {
        for family in self.registry.gather() {
            for metric in family.get_metric() {
                let labels: Vec<String> = metric
                    .get_label()
                    .iter()
                    .map(|l| format!("{}={}", l.get_name(), l.get_value()))
                    .collect();
                let value = if metric.get_counter().is_some() {
                    metric.get_counter().value()
                } else if metric.get_histogram().is_some() {
                    metric.get_histogram().get_sample_sum()
                } else {
                    continue;
                };
                info!(
                    metric = family.get_name(),
                    labels = labels.join(","),
                    value,
                    "metrics"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_set_registers() {
        let metrics = ArbiterMetrics::new().unwrap();
        metrics.sched_runs.inc();
        metrics.count_transition(SyncState::Starting, 2);
        metrics.count_transition(SyncState::Blocked, 1);
        assert_eq!(metrics.sched_runs.get(), 1);
        assert_eq!(
            metrics
                .sched_transitions
                .with_label_values(&["starting"])
                .get(),
            2
        );
    }

    #[test]
    fn test_two_instances_coexist() {
        let a = ArbiterMetrics::new().unwrap();
        let b = ArbiterMetrics::new().unwrap();
        a.sync_runs.inc();
        assert_eq!(b.sync_runs.get(), 0);
    }
}
