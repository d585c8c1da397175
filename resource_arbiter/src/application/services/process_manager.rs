// /////////////////////////////////////////////////////////////////////////////
// Resource Arbiter RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Process Manager
//!
//! Registry of the plain OS processes under management. Operators name
//! the executables of interest (`bq.prm.add`); when a start notification
//! for a managed name arrives, a `Process` instance is created and
//! becomes schedulable with the fluid request currently attached to the
//! name.
//!
//! Scheduling and synchronisation mirror the application manager, with
//! the fluid request lowered into a synthesised working mode so the rest
//! of the core never special-cases processes.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};

use resource_arbiter_domain::{
    ArbiterError, AssignedMode, Pid, Process, ResourceAccounter, SchedUid, ScheduleRequest, State,
    SyncState, ViewToken, DEFAULT_PROCESS_PRIORITY, SYSTEM_VIEW,
};

use crate::application::services::application_manager::WorkloadSnapshot;
use crate::application::services::registry::{RetainedIterator, StateRegistry};

/// Per-name management record: the fluid request to apply to instances.
#[derive(Debug, Clone, Default)]
struct ManagedName {
    request: ScheduleRequest,
}

/// Registry and scheduling front-end for managed processes.
pub struct ProcessManager {
    managed: Mutex<HashMap<String, ManagedName>>,
    registry: Mutex<StateRegistry<Process>>,
    accounter: Arc<Mutex<ResourceAccounter>>,
}

impl ProcessManager {
    pub fn new(accounter: Arc<Mutex<ResourceAccounter>>) -> Self {
        Self {
            managed: Mutex::new(HashMap::new()),
            registry: Mutex::new(StateRegistry::new()),
            accounter,
        }
    }

    // ------------------------------------------------------------------
    // Managed-name table
    // ------------------------------------------------------------------

    /// Adds an executable name to the managed set.
    pub fn add(&self, name: &str) {
        let mut managed = self.managed.lock();
        if managed.contains_key(name) {
            debug!(name, "Process name already managed");
            return;
        }
        info!(name, "Process name added to the managed set");
        managed.insert(name.to_string(), ManagedName::default());
    }

    /// Removes an executable name; running instances stay until exit.
    pub fn remove(&self, name: &str) {
        if self.managed.lock().remove(name).is_some() {
            info!(name, "Process name removed from the managed set");
        }
    }

    /// Whether start events for this name are of interest.
    pub fn is_managed(&self, name: &str) -> bool {
        self.managed.lock().contains_key(name)
    }

    /// Sets the fluid request attached to a managed name (adding the
    /// name if needed). Running instances pick it up on the next
    /// scheduling cycle.
    pub fn set_sched_request(&self, name: &str, pid: Option<Pid>, request: ScheduleRequest) {
        {
            let mut managed = self.managed.lock();
            managed
                .entry(name.to_string())
                .or_default()
                .request = request;
        }
        info!(name, %request, "Process scheduling request updated");

        let targets: Vec<Arc<RwLock<Process>>> = {
            let registry = self.registry.lock();
            registry
                .all_uids()
                .into_iter()
                .filter_map(|uid| registry.get(uid))
                .filter(|h| {
                    let proc = h.read();
                    proc.name() == name && pid.map(|p| proc.pid() == p).unwrap_or(true)
                })
                .collect()
        };
        for handle in targets {
            handle.write().set_sched_request(request);
        }
    }

    // ------------------------------------------------------------------
    // Start/exit notifications
    // ------------------------------------------------------------------

    /// Records a started instance of a managed name as `Ready`.
    ///
    /// # Errors
    /// - `NotFound` when the name is not managed
    /// - `AlreadyExists` when the pid is already tracked
    pub fn notify_start(&self, name: &str, pid: Pid) -> Result<SchedUid, ArbiterError> {
        let request = self
            .managed
            .lock()
            .get(name)
            .map(|m| m.request)
            .ok_or_else(|| ArbiterError::NotFound(format!("'{}' is not a managed name", name)))?;

        let uid = Process::uid_for(pid);
        let mut registry = self.registry.lock();
        if registry.get(uid).is_some() {
            return Err(ArbiterError::AlreadyExists(format!("{}:{}", name, pid)));
        }
        let mut proc = Process::new(name, pid, DEFAULT_PROCESS_PRIORITY, request);
        proc.schedulable_mut().set_state(State::Ready)?;
        info!(proc = %proc, "Managed process started");
        registry.insert(uid, proc, State::Ready);
        Ok(uid)
    }

    /// Drops the instance tracked for a pid (process exit).
    pub fn notify_exit(&self, pid: Pid) -> Result<(), ArbiterError> {
        let uid = Process::uid_for(pid);
        let handle = self
            .registry
            .lock()
            .remove(uid)
            .ok_or_else(|| ArbiterError::NotFound(format!("pid {}", pid)))?;
        let _ = self.accounter.lock().release_resources(uid, SYSTEM_VIEW);
        info!(proc = %handle.read(), "Managed process exited");
        Ok(())
    }

    /// Drops every instance of a managed name (e.g. `remove` + sweep).
    pub fn notify_exit_by_name(&self, name: &str) -> usize {
        let uids: Vec<SchedUid> = {
            let registry = self.registry.lock();
            registry
                .all_uids()
                .into_iter()
                .filter(|uid| {
                    registry
                        .get(*uid)
                        .map(|h| h.read().name() == name)
                        .unwrap_or(false)
                })
                .collect()
        };
        for uid in &uids {
            if let Some(handle) = self.registry.lock().remove(*uid) {
                let _ = self.accounter.lock().release_resources(*uid, SYSTEM_VIEW);
                info!(proc = %handle.read(), "Managed process dropped");
            }
        }
        uids.len()
    }

    /// Drops every instance whose pid vanished from the OS.
    pub fn check_active(&self, alive: &dyn Fn(Pid) -> bool) -> usize {
        let stale: Vec<Pid> = {
            let registry = self.registry.lock();
            registry
                .all_uids()
                .into_iter()
                .filter_map(|uid| registry.get(uid))
                .map(|h| h.read().pid())
                .filter(|pid| !alive(*pid))
                .collect()
        };
        for pid in &stale {
            debug!(pid, "Managed process vanished, cleaning up");
            let _ = self.notify_exit(*pid);
        }
        stale.len()
    }

    // ------------------------------------------------------------------
    // Queries and iteration
    // ------------------------------------------------------------------

    fn handle(&self, uid: SchedUid) -> Result<Arc<RwLock<Process>>, ArbiterError> {
        self.registry
            .lock()
            .get(uid)
            .ok_or_else(|| ArbiterError::NotFound(format!("uid {:#x}", uid)))
    }

    /// The process tracked for a pid, if any.
    pub fn get_by_pid(&self, pid: Pid) -> Option<Arc<RwLock<Process>>> {
        self.registry.lock().get(Process::uid_for(pid))
    }

    pub fn get(&self, uid: SchedUid) -> Option<Arc<RwLock<Process>>> {
        self.registry.lock().get(uid)
    }

    pub fn count(&self, state: State) -> usize {
        self.registry.lock().count(state)
    }

    pub fn any_active(&self) -> bool {
        let registry = self.registry.lock();
        registry.any(State::Ready) || registry.any(State::Running)
    }

    pub fn any_synching(&self) -> bool {
        let registry = self.registry.lock();
        SyncState::ALL
            .iter()
            .any(|s| registry.any(State::Sync(*s)))
    }

    /// Population of each sync queue.
    pub fn sync_queue_counts(&self) -> Vec<(SyncState, usize)> {
        let registry = self.registry.lock();
        SyncState::ALL
            .iter()
            .map(|s| (*s, registry.count(State::Sync(*s))))
            .collect()
    }

    pub fn uids(&self, state: State) -> Vec<SchedUid> {
        self.registry.lock().uids(state)
    }

    pub fn handles(&self, state: State) -> Vec<Arc<RwLock<Process>>> {
        self.registry.lock().handles(state)
    }

    /// Opens a retained iteration over one state bucket.
    pub fn iter_first(&self, state: State) -> (RetainedIterator, Option<Arc<RwLock<Process>>>) {
        self.registry.lock().iter_first(state)
    }

    /// Advances a retained iteration.
    pub fn iter_next(&self, iter: &RetainedIterator) -> Option<Arc<RwLock<Process>>> {
        self.registry.lock().iter_next(iter)
    }

    /// Closes a retained iteration.
    pub fn iter_release(&self, iter: RetainedIterator) {
        self.registry.lock().iter_release(iter)
    }

    /// Status snapshot for the report renderers.
    pub fn snapshot(&self) -> Vec<WorkloadSnapshot> {
        let handles: Vec<Arc<RwLock<Process>>> = {
            let registry = self.registry.lock();
            registry
                .all_uids()
                .into_iter()
                .filter_map(|uid| registry.get(uid))
                .collect()
        };
        handles
            .into_iter()
            .map(|h| {
                let proc = h.read();
                WorkloadSnapshot {
                    id: proc.to_string(),
                    priority: proc.schedulable().priority(),
                    state: proc.state(),
                    current_awm: proc
                        .schedulable()
                        .current_awm()
                        .map(|m| m.name().to_string()),
                    next_awm: proc.schedulable().next_awm().map(|m| m.name().to_string()),
                }
            })
            .collect()
    }

    // ------------------------------------------------------------------
    // Scheduling front-end
    // ------------------------------------------------------------------

    /// Books the process's fluid request on a view and transitions it
    /// into the matching `Sync(…)` state.
    pub fn schedule_request(&self, uid: SchedUid, view: ViewToken) -> Result<(), ArbiterError> {
        let handle = self.handle(uid)?;
        let mut candidate = {
            let proc = handle.read();
            if proc.schedulable().is_disabled() {
                return Err(ArbiterError::AppDisabled(proc.to_string()));
            }
            let awm = proc.to_working_mode()?;
            AssignedMode::from_committed(&awm)
        };

        let booked = {
            let mut accounter = self.accounter.lock();
            if accounter.holding(uid, view).is_some() {
                let _ = accounter.release_resources(uid, view);
            }
            accounter.book_resources(uid, candidate.requests(), candidate.binding(), view, true)
        };
        let assignment = match booked {
            Ok(assignment) => assignment,
            Err(e) => {
                debug!(uid = uid, error = %e, "Booking refused, blocking");
                self.unschedule(uid)?;
                return Err(e);
            }
        };
        candidate.set_assignment(assignment);

        let mut proc = handle.write();
        let next_sync = proc.schedulable().next_sync_for(&candidate);
        let (next_sync, reshuffle) = match next_sync {
            Some(sync) => (Some(sync), false),
            None => {
                let committed = self
                    .accounter
                    .lock()
                    .holding(uid, SYSTEM_VIEW)
                    .map(|h| h.assignment.clone());
                if committed.as_ref() == Some(candidate.assignment()) {
                    (None, false)
                } else {
                    (Some(SyncState::Reconf), true)
                }
            }
        };
        proc.schedulable_mut().set_next_awm(Some(candidate), reshuffle);
        if let Some(sync) = next_sync {
            proc.schedulable_mut().set_state(State::Sync(sync))?;
            drop(proc);
            self.registry.lock().move_state(uid, State::Sync(sync));
        }
        Ok(())
    }

    /// Re-runs the scheduling request of a running process whose fluid
    /// demand changed.
    pub fn reschedule(&self, uid: SchedUid, view: ViewToken) -> Result<(), ArbiterError> {
        self.schedule_request(uid, view)
    }

    /// Blocks a process the policy could not serve.
    pub fn unschedule(&self, uid: SchedUid) -> Result<(), ArbiterError> {
        let handle = self.handle(uid)?;
        {
            let mut proc = handle.write();
            if proc.schedulable().is_disabled() {
                return Err(ArbiterError::AppDisabled(proc.to_string()));
            }
            proc.schedulable_mut()
                .set_state(State::Sync(SyncState::Blocked))?;
        }
        self.registry
            .lock()
            .move_state(uid, State::Sync(SyncState::Blocked));
        Ok(())
    }

    // ------------------------------------------------------------------
    // Synchronisation outcomes
    // ------------------------------------------------------------------

    /// Finalises a synchronised process (see the application manager
    /// counterpart).
    pub fn sync_commit(&self, uid: SchedUid) -> Result<(), ArbiterError> {
        let handle = self.handle(uid)?;
        let new_state = {
            let mut proc = handle.write();
            match proc.schedulable().sync_state() {
                Some(SyncState::Blocked) => {
                    proc.schedulable_mut().set_state(State::Ready)?;
                    State::Ready
                }
                Some(SyncState::Disabled) => return Ok(()),
                Some(_) => {
                    proc.schedulable_mut().set_state(State::Running)?;
                    State::Running
                }
                None => {
                    return Err(ArbiterError::InternalError(format!(
                        "{}: sync_commit outside a sync state",
                        proc
                    )));
                }
            }
        };
        self.registry.lock().move_state(uid, new_state);
        Ok(())
    }

    /// Rolls a synchronising process back to its previous stable state.
    pub fn sync_abort(&self, uid: SchedUid) -> Result<(), ArbiterError> {
        let handle = self.handle(uid)?;
        let new_state = {
            let mut proc = handle.write();
            proc.schedulable_mut().rollback_sync();
            proc.state()
        };
        self.registry.lock().move_state(uid, new_state);
        Ok(())
    }

    /// Clears the scheduled mode of a still-running process.
    pub fn sync_continue(&self, uid: SchedUid) -> Result<(), ArbiterError> {
        let handle = self.handle(uid)?;
        let mut proc = handle.write();
        if !proc.schedulable().is_running() {
            return Err(ArbiterError::InternalError(format!(
                "{}: sync_continue outside RUNNING",
                proc
            )));
        }
        proc.schedulable_mut().set_next_awm(None, false);
        Ok(())
    }
}
