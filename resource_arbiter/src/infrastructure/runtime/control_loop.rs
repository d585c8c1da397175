// /////////////////////////////////////////////////////////////////////////////
// Resource Arbiter RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Control Loop
//!
//! The single control loop of the daemon: external triggers (workload
//! start/stop, platform changes, optimisation requests, operator
//! signals) raise bits on the event bus; the loop drains them and
//! debounces optimisation work through the shared deferrable so a burst
//! of triggers costs one scheduler run.
//!
//! ## Debouncing Policy
//!
//! - **ExcStart**: `100 + 100 · prio(highest ready)` ms — high-priority
//!   arrivals reschedule sooner, while startup bursts still aggregate;
//! - **ExcStop**: `500 − 50 · (ready mod 8)` ms — the fuller the ready
//!   queue, the sooner freed resources are redistributed;
//! - **PlatformChange**: immediate;
//! - **OptRequest**: 250 ms with ready workloads, 500 ms otherwise.
//!
//! Every posted event leads to at least one subsequent scheduler run
//! unless the loop is shutting down.

use std::pin::pin;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use resource_arbiter_bootstrap::shutdown::CancellationToken;

use crate::application::services::{
    SchedulerManager, SchedulingResult, SyncResult, SynchronizationManager, System,
};
use crate::infrastructure::logging::{
    report_resources, report_sync_queues, report_workloads, WorkloadStatusRow,
};
use crate::infrastructure::metrics::ArbiterMetrics;
use crate::infrastructure::runtime::deferrable::Deferrable;

/// The events the control loop reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ControlEvent {
    /// A workload became ready to run
    ExcStart = 0,
    /// A workload stopped
    ExcStop = 1,
    /// The platform changed (resources appeared/degraded)
    PlatformChange = 2,
    /// Explicit optimisation request
    OptRequest = 3,
    /// Status-dump request
    Usr1 = 4,
    /// Extended status-dump request
    Usr2 = 5,
    /// Orderly shutdown
    Exit = 6,
    /// Fatal condition: terminate immediately
    Abort = 7,
}

impl ControlEvent {
    fn bit(self) -> u16 {
        1 << (self as u16)
    }
}

/// How the loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopOutcome {
    /// Orderly shutdown requested
    Exit,
    /// A fatal condition short-circuited the daemon
    Abort,
}

/// The pending-event bitset shared with every event source.
#[derive(Default)]
pub struct EventBus {
    pending: Mutex<u16>,
    notify: Notify,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises an event bit and wakes the loop.
    pub fn notify_event(&self, event: ControlEvent) {
        {
            let mut pending = self.pending.lock();
            *pending |= event.bit();
        }
        self.notify.notify_one();
    }

    /// Takes the pending bitset, waiting until at least one bit is set.
    async fn wait_pending(&self) -> u16 {
        loop {
            {
                let mut pending = self.pending.lock();
                if *pending != 0 {
                    return std::mem::take(&mut *pending);
                }
            }
            // Register before re-checking so a concurrent notify_event
            // between check and await is never lost
            let mut notified = pin!(self.notify.notified());
            notified.as_mut().enable();
            {
                let mut pending = self.pending.lock();
                if *pending != 0 {
                    return std::mem::take(&mut *pending);
                }
            }
            notified.await;
        }
    }

    /// Non-blocking look at the pending bitset (tests and diagnostics).
    pub fn pending(&self) -> u16 {
        *self.pending.lock()
    }
}

/// The daemon's control loop.
pub struct ControlLoop {
    bus: Arc<EventBus>,
    system: Arc<System>,
    scheduler: Arc<SchedulerManager>,
    synchronizer: Arc<SynchronizationManager>,
    metrics: Arc<ArbiterMetrics>,
    optimize_dfr: Deferrable,
    token: CancellationToken,
}

impl ControlLoop {
    /// Wires the loop and its optimisation deferrable.
    ///
    /// `opt_interval` enables periodic optimisation; `None` keeps the
    /// deferrable on-demand.
    pub fn new(
        system: Arc<System>,
        scheduler: Arc<SchedulerManager>,
        synchronizer: Arc<SynchronizationManager>,
        metrics: Arc<ArbiterMetrics>,
        opt_interval: Option<Duration>,
        token: CancellationToken,
    ) -> Arc<Self> {
        let bus = Arc::new(EventBus::new());
        Arc::new_cyclic(|weak: &std::sync::Weak<ControlLoop>| {
            let action_weak = weak.clone();
            let optimize_dfr = Deferrable::start(
                "rm.opt",
                opt_interval,
                token.clone(),
                Arc::new(move || {
                    let weak = action_weak.clone();
                    Box::pin(async move {
                        if let Some(control) = weak.upgrade() {
                            control.optimize().await;
                        }
                    })
                }),
            );
            ControlLoop {
                bus,
                system,
                scheduler,
                synchronizer,
                metrics,
                optimize_dfr,
                token,
            }
        })
    }

    /// The event bus handle given to event sources.
    pub fn bus(&self) -> Arc<EventBus> {
        Arc::clone(&self.bus)
    }

    /// Runs the loop until `Exit` or `Abort`.
    pub async fn run(&self) -> LoopOutcome {
        info!("Control loop running");
        loop {
            let bits = tokio::select! {
                bits = self.bus.wait_pending() => bits,
                _ = self.token.cancelled() => {
                    debug!("Control loop cancelled");
                    return LoopOutcome::Exit;
                }
            };

            if bits & ControlEvent::Abort.bit() != 0 {
                warn!("Abort event received");
                self.optimize_dfr.stop();
                return LoopOutcome::Abort;
            }
            if bits & ControlEvent::Exit.bit() != 0 {
                info!("Exit event received");
                self.optimize_dfr.stop();
                return LoopOutcome::Exit;
            }

            if bits & ControlEvent::ExcStart.bit() != 0 {
                self.on_exc_start();
            }
            if bits & ControlEvent::ExcStop.bit() != 0 {
                self.on_exc_stop();
            }
            if bits & ControlEvent::PlatformChange.bit() != 0 {
                info!("Platform change, immediate rescheduling");
                self.optimize_dfr.schedule_now();
            }
            if bits & ControlEvent::OptRequest.bit() != 0 {
                self.on_opt_request();
            }
            if bits & ControlEvent::Usr1.bit() != 0 {
                self.dump_status();
            }
            if bits & ControlEvent::Usr2.bit() != 0 {
                self.dump_status();
                self.metrics.dump();
            }
        }
    }

    /// One optimisation pass: a scheduler run followed, when anything
    /// entered a sync state, by a synchronisation session.
    pub async fn optimize(&self) {
        let apps = self.system.applications();
        let procs = self.system.processes();
        if !apps.any_active() && !procs.any_active() {
            debug!("No active workload, optimisation skipped");
            return;
        }

        info!("Optimisation run");
        match self.scheduler.schedule() {
            SchedulingResult::NoOp => return,
            SchedulingResult::Failed => {
                warn!("Schedule FAILED");
                return;
            }
            SchedulingResult::Delayed => {
                debug!("Schedule DELAYED");
                return;
            }
            SchedulingResult::Done { .. } => {}
        }

        if !apps.any_synching() && !procs.any_synching() {
            debug!("Nothing entered a sync state, synchronisation skipped");
            return;
        }
        match self.synchronizer.sync_schedule().await {
            SyncResult::Ok | SyncResult::NothingToSync => {}
            SyncResult::Aborted => warn!("Synchronisation ABORTED"),
        }
    }

    /// A workload became ready: reschedule within a window inversely
    /// proportional to the highest ready priority.
    fn on_exc_start(&self) {
        let apps = self.system.applications();
        let highest = match apps.highest_prio_ready() {
            Some(handle) => handle.read().priority(),
            None => {
                // The workload exited before the event was processed
                debug!("Overdue processing of a start event");
                return;
            }
        };
        let timeout = 100 + 100 * u64::from(highest);
        self.optimize_dfr.schedule_after(Duration::from_millis(timeout));
    }

    /// A workload stopped: redistribute sooner when ready workloads are
    /// queueing up.
    fn on_exc_stop(&self) {
        let ready = self.system.applications().count(resource_arbiter_domain::State::Ready)
            + self
                .system
                .processes()
                .count(resource_arbiter_domain::State::Ready);
        let timeout = 500u64.saturating_sub(50 * (ready as u64 % 8));
        self.optimize_dfr.schedule_after(Duration::from_millis(timeout));
    }

    /// An explicit optimisation request: aggregate, favouring systems
    /// with ready workloads.
    fn on_opt_request(&self) {
        let ready = self.system.applications().count(resource_arbiter_domain::State::Ready)
            + self
                .system
                .processes()
                .count(resource_arbiter_domain::State::Ready);
        let timeout = if ready > 0 { 250 } else { 500 };
        self.optimize_dfr.schedule_after(Duration::from_millis(timeout));
    }

    /// Renders the status reports through the logging layer.
    fn dump_status(&self) {
        let to_rows = |snapshot: Vec<crate::application::services::WorkloadSnapshot>| {
            snapshot
                .into_iter()
                .map(|s| WorkloadStatusRow {
                    id: s.id,
                    priority: s.priority,
                    state: s.state.to_string(),
                    current_awm: s.current_awm.unwrap_or_else(|| "-".to_string()),
                    next_awm: s.next_awm.unwrap_or_else(|| "-".to_string()),
                })
                .collect::<Vec<_>>()
        };
        report_workloads("Applications", &to_rows(self.system.applications().snapshot()));
        report_workloads("Processes", &to_rows(self.system.processes().snapshot()));
        report_resources(&self.system.accounter().lock().status_report());
        let queues: Vec<(String, usize)> = self
            .system
            .applications()
            .sync_queue_counts()
            .into_iter()
            .map(|(flavour, count)| (flavour.to_string(), count))
            .collect();
        report_sync_queues(&queues);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_event_bits_coalesce() {
        let bus = EventBus::new();
        bus.notify_event(ControlEvent::OptRequest);
        bus.notify_event(ControlEvent::OptRequest);
        bus.notify_event(ControlEvent::ExcStart);

        let bits = bus.wait_pending().await;
        assert_ne!(bits & ControlEvent::OptRequest.bit(), 0);
        assert_ne!(bits & ControlEvent::ExcStart.bit(), 0);
        assert_eq!(bus.pending(), 0);
    }

    #[tokio::test]
    async fn test_wait_wakes_on_late_event() {
        let bus = Arc::new(EventBus::new());
        let poster = Arc::clone(&bus);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            poster.notify_event(ControlEvent::Exit);
        });
        let bits = bus.wait_pending().await;
        assert_ne!(bits & ControlEvent::Exit.bit(), 0);
    }
}
