// /////////////////////////////////////////////////////////////////////////////
// Resource Arbiter RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Scheduler Manager
//!
//! Drives one allocation-policy run and hands the resulting candidate
//! view to the synchronisation manager:
//!
//! 1. bail out when nothing is ready or running (`NoOp`) or a sync
//!    session fences scheduling (`Delayed`);
//! 2. reap execution contexts whose hosting process vanished;
//! 3. mark the managers as scheduling, account the run, invoke the
//!    policy;
//! 4. clear the scheduled mode of every workload the policy left
//!    running untouched (`sync_continue`);
//! 5. record the scheduled view and the per-transition statistics.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use resource_arbiter_domain::{ArbiterError, Pid, State, ViewToken};

use crate::application::policy::SchedulerPolicy;
use crate::application::services::system::System;
use crate::infrastructure::metrics::ArbiterMetrics;

/// Outcome of one scheduler run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulingResult {
    /// Nothing to schedule
    NoOp,
    /// The policy produced a candidate view
    Done { view: ViewToken },
    /// The policy (or an accounting boundary) failed the run
    Failed,
    /// The run should be retried later
    Delayed,
}

/// Scheduler status, exposed for the status reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Ready,
    Scheduling,
}

/// Liveness probe for hosting processes.
#[cfg(target_os = "linux")]
fn pid_alive(pid: Pid) -> bool {
    std::path::Path::new(&format!("/proc/{}", pid)).exists()
}

#[cfg(not(target_os = "linux"))]
fn pid_alive(_pid: Pid) -> bool {
    true
}

/// Orchestrates allocation-policy runs.
pub struct SchedulerManager {
    system: Arc<System>,
    policy: Arc<dyn SchedulerPolicy>,
    metrics: Arc<ArbiterMetrics>,
    status: Mutex<Status>,
    sched_count: Mutex<u32>,
    scheduled_view: Mutex<Option<ViewToken>>,
}

impl SchedulerManager {
    pub fn new(
        system: Arc<System>,
        policy: Arc<dyn SchedulerPolicy>,
        metrics: Arc<ArbiterMetrics>,
    ) -> Self {
        info!(policy = policy.name(), "Scheduler manager ready");
        Self {
            system,
            policy,
            metrics,
            status: Mutex::new(Status::Ready),
            sched_count: Mutex::new(0),
            scheduled_view: Mutex::new(None),
        }
    }

    /// The number of completed-or-attempted scheduler runs.
    pub fn sched_count(&self) -> u32 {
        *self.sched_count.lock()
    }

    /// The view produced by the last successful run, if any.
    pub fn scheduled_view(&self) -> Option<ViewToken> {
        *self.scheduled_view.lock()
    }

    /// Runs the allocation policy once.
    pub fn schedule(&self) -> SchedulingResult {
        let apps = self.system.applications();
        let procs = self.system.processes();

        // A sync session fences new scheduler runs
        if self.system.accounter().lock().sync_active() {
            debug!("Scheduling delayed: sync session in progress");
            self.metrics.sched_delayed.inc();
            return SchedulingResult::Delayed;
        }

        if !apps.any_active() && !procs.any_active() {
            debug!("No active workload, re-scheduling not required");
            return SchedulingResult::NoOp;
        }

        // Reap execution contexts whose hosting process died
        apps.check_active(&pid_alive);

        *self.status.lock() = Status::Scheduling;
        let run = {
            let mut count = self.sched_count.lock();
            *count = count.saturating_add(1);
            *count
        };
        self.metrics.sched_runs.inc();
        let started = Instant::now();

        info!(run, policy = self.policy.name(), "Scheduling START");
        let result = self.policy.schedule(&self.system);
        let view = match result {
            Ok(view) => view,
            Err(ArbiterError::PolicyDelayed(reason)) => {
                warn!(run, reason, "Scheduling DELAYED");
                self.metrics.sched_delayed.inc();
                *self.status.lock() = Status::Ready;
                return SchedulingResult::Delayed;
            }
            Err(e) => {
                error!(run, error = %e, "Scheduling FAILED");
                self.metrics.sched_failed.inc();
                *self.status.lock() = Status::Ready;
                return SchedulingResult::Failed;
            }
        };

        // Workloads the policy left running keep their current mode; the
        // scheduled-mode slot must not leak into the next session
        for uid in apps.uids(State::Running) {
            if let Err(e) = apps.sync_continue(uid) {
                warn!(uid = uid, error = %e, "sync_continue failed");
            }
        }
        for uid in procs.uids(State::Running) {
            if let Err(e) = procs.sync_continue(uid) {
                warn!(uid = uid, error = %e, "sync_continue failed");
            }
        }

        *self.scheduled_view.lock() = Some(view);

        // Per-transition statistics of this run
        for (flavour, count) in apps.sync_queue_counts() {
            self.metrics.count_transition(flavour, count as u64);
        }
        for (flavour, count) in procs.sync_queue_counts() {
            self.metrics.count_transition(flavour, count as u64);
        }

        let elapsed = started.elapsed().as_secs_f64() * 1000.0;
        self.metrics.sched_time_ms.observe(elapsed);
        self.metrics.sched_completed.inc();
        *self.status.lock() = Status::Ready;
        info!(run, view = %view, "Scheduling DONE");
        SchedulingResult::Done { view }
    }
}
