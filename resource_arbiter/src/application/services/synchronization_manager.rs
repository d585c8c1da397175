// /////////////////////////////////////////////////////////////////////////////
// Resource Arbiter RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Synchronisation Manager
//!
//! Converts the scheduler's candidate view into the running system. One
//! session walks every reconfiguring workload through the multi-phase
//! protocol, queue by queue as dictated by the sync policy, then commits
//! the speculative ledger atomically:
//!
//! - **SyncPlatform** maps (or reclaims) resources through the platform
//!   adapter — done first in the default variant so control groups are
//!   set up by the time the workload reconfigures itself;
//! - **PreChange** collects each agent's synchronisation latency;
//! - **SyncChange** / **DoChange** (force-sync variant only) drive the
//!   agent across its synchronisation point after a settle sleep;
//! - **PostChange** charges the sync view and finalises the workload's
//!   state machine.
//!
//! Agent misbehaviour (timeout, broken channel) disables the workload
//! and accounts a miss but keeps the session going; accounting failures
//! abort the whole session, leaving the committed view untouched.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use resource_arbiter_domain::{
    ArbiterError, Assignment, Binding, PlatformService, ResourceRequest, SchedUid, State,
    SyncState, WorkloadAgent, WorkloadDescriptor,
};

use crate::application::policy::SyncPolicy;
use crate::application::services::system::System;
use crate::infrastructure::metrics::ArbiterMetrics;

/// Outcome of one synchronisation session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncResult {
    /// Session committed
    Ok,
    /// No workload was waiting for synchronisation
    NothingToSync,
    /// Session aborted; the committed view is unchanged
    Aborted,
}

/// The per-workload data one protocol phase needs, snapshotted so no
/// lock is held across agent RPCs.
struct SyncTarget {
    uid: SchedUid,
    descriptor: WorkloadDescriptor,
    flavour: SyncState,
    reshuffling: bool,
    requests: Vec<ResourceRequest>,
    binding: Binding,
    assignment: Assignment,
    agent: Option<Arc<dyn WorkloadAgent>>,
}

/// Workload class a target belongs to, for dispatching manager calls.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Kind {
    Application,
    Process,
}

/// Drives the synchronisation protocol.
pub struct SynchronizationManager {
    system: Arc<System>,
    policy: Arc<dyn SyncPolicy>,
    platform: Arc<dyn PlatformService>,
    metrics: Arc<ArbiterMetrics>,
    force_sync: bool,
}

impl SynchronizationManager {
    pub fn new(
        system: Arc<System>,
        policy: Arc<dyn SyncPolicy>,
        platform: Arc<dyn PlatformService>,
        metrics: Arc<ArbiterMetrics>,
        force_sync: bool,
    ) -> Self {
        info!(
            policy = policy.name(),
            force_sync, "Synchronisation manager ready"
        );
        Self {
            system,
            policy,
            platform,
            metrics,
            force_sync,
        }
    }

    /// Runs one synchronisation session over everything in a sync state.
    pub async fn sync_schedule(&self) -> SyncResult {
        let apps = self.system.applications();
        let procs = self.system.processes();
        if !apps.any_synching() && !procs.any_synching() {
            debug!("No workload in a sync state, synchronisation not required");
            return SyncResult::NothingToSync;
        }

        self.metrics.sync_runs.inc();
        let started = Instant::now();

        // Seed the sync view with everything that keeps running unchanged
        let mut running: Vec<SchedUid> = apps.uids(State::Running);
        running.extend(procs.uids(State::Running));
        {
            let mut accounter = self.system.accounter().lock();
            if let Err(e) = accounter.sync_start(&running) {
                error!(error = %e, "Unable to start the sync session");
                self.metrics.sync_aborted.inc();
                return SyncResult::Aborted;
            }
        }
        let session = self.system.accounter().lock().sync_session_id();
        info!(session, policy = self.policy.name(), "Synchronisation START");

        let mut platform_failed: Vec<(Kind, SchedUid)> = Vec::new();

        // Adaptive applications, queue by queue
        for flavour in self.policy.queues() {
            let targets = self.collect_applications(flavour);
            if targets.is_empty() {
                continue;
            }
            debug!(session, queue = %flavour, count = targets.len(), "Serving sync queue");
            if let Err(e) = self
                .sync_queue(session, Kind::Application, targets, &mut platform_failed)
                .await
            {
                warn!(session, error = %e, "Session FAILED during application synchronisation");
                return self.abort_session(platform_failed).await;
            }
        }

        // Managed processes: platform and post-change passes only
        let proc_targets = self.collect_processes();
        if !proc_targets.is_empty() {
            debug!(session, count = proc_targets.len(), "Synchronising processes");
            if let Err(e) = self
                .sync_processes(session, proc_targets, &mut platform_failed)
                .await
            {
                warn!(session, error = %e, "Session FAILED during process synchronisation");
                return self.abort_session(platform_failed).await;
            }
        }

        // Promote the sync view to system view
        let committed = self.system.accounter().lock().sync_commit();
        if let Err(e) = committed {
            error!(session, error = %e, "Sync commit failed");
            return self.abort_session(platform_failed).await;
        }

        self.disable_platform_failed(&platform_failed);
        let elapsed = started.elapsed().as_secs_f64() * 1000.0;
        self.metrics.sync_time_ms.observe(elapsed);
        self.metrics.sync_completed.inc();
        info!(session, "Synchronisation DONE");
        SyncResult::Ok
    }

    // ------------------------------------------------------------------
    // Target collection (no lock survives this section)
    // ------------------------------------------------------------------

    fn collect_applications(&self, flavour: SyncState) -> Vec<SyncTarget> {
        let apps = self.system.applications();
        apps.handles(State::Sync(flavour))
            .into_iter()
            .filter_map(|handle| {
                let app = handle.read();
                let sched = app.schedulable();
                if sched.is_disabled() || !self.policy.do_sync(sched) {
                    return None;
                }
                let next = sched.next_awm();
                Some(SyncTarget {
                    uid: app.uid(),
                    descriptor: WorkloadDescriptor::from(sched),
                    flavour,
                    reshuffling: sched.is_reshuffling(),
                    requests: next.map(|m| m.requests().to_vec()).unwrap_or_default(),
                    binding: next.map(|m| m.binding().clone()).unwrap_or_default(),
                    assignment: next.map(|m| m.assignment().clone()).unwrap_or_default(),
                    agent: apps.agent_of(app.uid()),
                })
            })
            .collect()
    }

    fn collect_processes(&self) -> Vec<SyncTarget> {
        let procs = self.system.processes();
        SyncState::ALL
            .into_iter()
            .filter(|flavour| *flavour != SyncState::Disabled)
            .flat_map(|flavour| {
                procs
                    .handles(State::Sync(flavour))
                    .into_iter()
                    .filter_map(|handle| {
                        let proc = handle.read();
                        let sched = proc.schedulable();
                        if sched.is_disabled() {
                            return None;
                        }
                        let next = sched.next_awm();
                        Some(SyncTarget {
                            uid: proc.uid(),
                            descriptor: WorkloadDescriptor::from(sched),
                            flavour,
                            reshuffling: sched.is_reshuffling(),
                            requests: next.map(|m| m.requests().to_vec()).unwrap_or_default(),
                            binding: next.map(|m| m.binding().clone()).unwrap_or_default(),
                            assignment: next.map(|m| m.assignment().clone()).unwrap_or_default(),
                            agent: None,
                        })
                    })
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    // ------------------------------------------------------------------
    // Queue protocol
    // ------------------------------------------------------------------

    async fn sync_queue(
        &self,
        session: u32,
        kind: Kind,
        mut targets: Vec<SyncTarget>,
        platform_failed: &mut Vec<(Kind, SchedUid)>,
    ) -> Result<(), ArbiterError> {
        if self.force_sync {
            let latencies = self.phase_pre_change(session, &mut targets).await?;
            let settle = self.policy.estimated_sync_time(&latencies);
            if settle > 0 {
                debug!(session, settle_ms = settle, "Waiting for the sync point");
                tokio::time::sleep(Duration::from_millis(settle)).await;
            }
            self.phase_sync_change(session, &mut targets).await?;
            self.phase_platform(session, kind, &targets, platform_failed)
                .await;
            self.phase_do_change(session, &mut targets).await?;
        } else {
            // Platform first: per-workload platform state (control groups)
            // is ready by the time the agent reconfigures
            self.phase_platform(session, kind, &targets, platform_failed)
                .await;
            self.phase_pre_change(session, &mut targets).await?;
        }
        self.phase_post_change(session, kind, &targets).await
    }

    async fn sync_processes(
        &self,
        session: u32,
        targets: Vec<SyncTarget>,
        platform_failed: &mut Vec<(Kind, SchedUid)>,
    ) -> Result<(), ArbiterError> {
        self.phase_platform(session, Kind::Process, &targets, platform_failed)
            .await;
        self.phase_post_change(session, Kind::Process, &targets).await
    }

    /// STEP 1: collect agent latencies. Reshuffle-only transitions skip
    /// the agent round-trips entirely.
    async fn phase_pre_change(
        &self,
        session: u32,
        targets: &mut Vec<SyncTarget>,
    ) -> Result<Vec<u32>, ArbiterError> {
        let deadline = self.policy.agent_deadline();
        let mut latencies = Vec::new();
        for target in targets.iter_mut() {
            if target.reshuffling {
                continue;
            }
            let agent = match &target.agent {
                Some(agent) => Arc::clone(agent),
                None => continue,
            };
            debug!(session, workload = %target.descriptor.name, "STEP 1: preChange");
            match agent.pre_change(deadline).await {
                Ok(declared) => {
                    self.metrics.agent_latency_ms.observe(f64::from(declared));
                    let clamped = self.clamp_latency(target, declared);
                    debug!(
                        session,
                        workload = %target.descriptor.name,
                        declared, clamped, "STEP 1: latency declared"
                    );
                    latencies.push(clamped);
                }
                Err(e) => self.handle_agent_error(session, target, "preChange", e)?,
            }
        }
        Ok(latencies)
    }

    /// STEP 2 (force-sync only): drive agents across the sync point.
    async fn phase_sync_change(
        &self,
        session: u32,
        targets: &mut Vec<SyncTarget>,
    ) -> Result<(), ArbiterError> {
        let deadline = self.policy.agent_deadline();
        for target in targets.iter_mut() {
            if target.reshuffling {
                continue;
            }
            let agent = match &target.agent {
                Some(agent) => Arc::clone(agent),
                None => continue,
            };
            debug!(session, workload = %target.descriptor.name, "STEP 2: syncChange");
            if let Err(e) = agent.sync_change(deadline).await {
                self.handle_agent_error(session, target, "syncChange", e)?;
            }
        }
        Ok(())
    }

    /// STEP M: map or reclaim resources on the platform. Failures are
    /// recorded and settled after the session.
    async fn phase_platform(
        &self,
        session: u32,
        kind: Kind,
        targets: &[SyncTarget],
        platform_failed: &mut Vec<(Kind, SchedUid)>,
    ) {
        for target in targets {
            if self.is_disabled(kind, target.uid) {
                continue;
            }
            let result = match target.flavour {
                SyncState::Blocked | SyncState::Disabled => {
                    debug!(session, workload = %target.descriptor.name, "STEP M: reclaiming");
                    self.platform.reclaim_resources(&target.descriptor).await
                }
                _ => {
                    debug!(session, workload = %target.descriptor.name, "STEP M: mapping");
                    self.platform
                        .map_resources(&target.descriptor, &target.assignment)
                        .await
                }
            };
            if let Err(e) = result {
                warn!(
                    session,
                    workload = %target.descriptor.name,
                    error = %e,
                    "STEP M: platform synchronisation failed"
                );
                platform_failed.push((kind, target.uid));
            }
        }
    }

    /// STEP 3 (force-sync only): release agents into the new mode.
    async fn phase_do_change(
        &self,
        session: u32,
        targets: &mut Vec<SyncTarget>,
    ) -> Result<(), ArbiterError> {
        let deadline = self.policy.agent_deadline();
        for target in targets.iter_mut() {
            if target.reshuffling {
                continue;
            }
            let agent = match &target.agent {
                Some(agent) => Arc::clone(agent),
                None => continue,
            };
            debug!(session, workload = %target.descriptor.name, "STEP 3: doChange");
            if let Err(e) = agent.do_change(deadline).await {
                // doChange errors disable the workload but never the session
                let _ = self.handle_agent_error(session, target, "doChange", e.clone());
            }
        }
        Ok(())
    }

    /// STEP 4: charge the sync view and finalise the state machines.
    async fn phase_post_change(
        &self,
        session: u32,
        kind: Kind,
        targets: &[SyncTarget],
    ) -> Result<(), ArbiterError> {
        for target in targets {
            if self.is_disabled(kind, target.uid) {
                continue;
            }
            if !matches!(target.flavour, SyncState::Blocked | SyncState::Disabled) {
                debug!(session, workload = %target.descriptor.name, "STEP 4: charging sync view");
                self.system.accounter().lock().sync_acquire(
                    target.uid,
                    &target.requests,
                    &target.binding,
                    Some(&target.assignment),
                )?;
            }
            let committed = match kind {
                Kind::Application => self.system.applications().sync_commit(target.uid),
                Kind::Process => self.system.processes().sync_commit(target.uid),
            };
            if let Err(e) = committed {
                warn!(session, workload = %target.descriptor.name, error = %e, "STEP 4: commit failed");
            } else {
                info!(session, workload = %target.descriptor.name, "STEP 4: <--------- OK");
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Failure handling
    // ------------------------------------------------------------------

    fn clamp_latency(&self, target: &SyncTarget, declared: u32) -> u32 {
        let handle = self.system.applications().get(target.uid);
        match handle {
            Some(handle) => {
                let app = handle.read();
                self.policy.check_latency(app.schedulable(), declared)
            }
            None => declared,
        }
    }

    fn is_disabled(&self, kind: Kind, uid: SchedUid) -> bool {
        match kind {
            Kind::Application => self
                .system
                .applications()
                .get(uid)
                .map(|h| h.read().schedulable().is_disabled())
                .unwrap_or(true),
            Kind::Process => self
                .system
                .processes()
                .get(uid)
                .map(|h| h.read().schedulable().is_disabled())
                .unwrap_or(true),
        }
    }

    /// Channel-level agent errors disable the workload and count a miss;
    /// anything else is fatal to the session.
    fn handle_agent_error(
        &self,
        session: u32,
        target: &SyncTarget,
        phase: &str,
        error: ArbiterError,
    ) -> Result<(), ArbiterError> {
        match error {
            ArbiterError::AgentTimeout(_) | ArbiterError::AgentWriteError(_) => {
                warn!(
                    session,
                    workload = %target.descriptor.name,
                    phase,
                    error = %error,
                    "Agent unresponsive, disabling workload"
                );
                self.metrics.sync_misses.inc();
                let _ = self.system.applications().disable_exc(target.uid);
                Ok(())
            }
            fatal => Err(fatal),
        }
    }

    /// Aborts the session: drops the sync view and rolls every workload
    /// still synchronising back to its stable state.
    async fn abort_session(&self, platform_failed: Vec<(Kind, SchedUid)>) -> SyncResult {
        self.system.accounter().lock().sync_abort();
        let apps = self.system.applications();
        let procs = self.system.processes();
        for flavour in SyncState::ALL {
            if matches!(flavour, SyncState::Disabled) {
                continue;
            }
            for uid in apps.uids(State::Sync(flavour)) {
                let _ = apps.sync_abort(uid);
            }
            for uid in procs.uids(State::Sync(flavour)) {
                let _ = procs.sync_abort(uid);
            }
        }
        self.disable_platform_failed(&platform_failed);
        self.metrics.sync_aborted.inc();
        SyncResult::Aborted
    }

    fn disable_platform_failed(&self, platform_failed: &[(Kind, SchedUid)]) {
        for (kind, uid) in platform_failed {
            warn!(uid = uid, "Disabling platform-failed workload");
            match kind {
                Kind::Application => {
                    let _ = self.system.applications().disable_exc(*uid);
                }
                Kind::Process => {
                    let _ = self.system.processes().unschedule(*uid);
                }
            }
        }
    }
}
