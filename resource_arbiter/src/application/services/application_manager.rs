// /////////////////////////////////////////////////////////////////////////////
// Resource Arbiter RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Application Manager
//!
//! Registry of the adaptive applications paired over the workload-agent
//! channel. Owns their lifecycle (create/enable/disable/destroy), the
//! priority- and state-ordered iteration the scheduler and the
//! synchronisation manager rely on, and the `schedule_request` path that
//! turns a policy decision into a booked working mode plus the matching
//! `Sync(…)` transition.
//!
//! ## Locking
//!
//! The registry lock guards the uid map and the state queues; every
//! application sits behind its own `RwLock`. Lock order is registry →
//! application → accounter, and no lock is ever held across an `await`.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use resource_arbiter_domain::{
    Application, ArbiterError, AssignedMode, AwmId, Binding, BindingReference, ExcId, Pid,
    Priority, ResourceAccounter, SchedUid, State, SyncState, ViewToken, WorkingMode, WorkloadAgent,
    SYSTEM_VIEW,
};

use crate::application::services::registry::{RetainedIterator, StateRegistry};

/// Status snapshot of one application, for the report renderers.
#[derive(Debug, Clone)]
pub struct WorkloadSnapshot {
    pub id: String,
    pub priority: Priority,
    pub state: State,
    pub current_awm: Option<String>,
    pub next_awm: Option<String>,
}

/// Registry and scheduling front-end for adaptive applications.
pub struct ApplicationManager {
    registry: Mutex<StateRegistry<Application>>,
    accounter: Arc<Mutex<ResourceAccounter>>,
    agents: Mutex<HashMap<SchedUid, Arc<dyn WorkloadAgent>>>,
}

impl ApplicationManager {
    pub fn new(accounter: Arc<Mutex<ResourceAccounter>>) -> Self {
        Self {
            registry: Mutex::new(StateRegistry::new()),
            accounter,
            agents: Mutex::new(HashMap::new()),
        }
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Registers an execution context with its working-mode catalogue.
    ///
    /// The application starts in `New`; it becomes schedulable once the
    /// agent announces its start and `enable_exc` runs.
    ///
    /// # Errors
    /// - `AlreadyExists` when the `(pid, exc_id)` pair is registered
    /// - catalogue validation errors from the domain
    pub fn create_exc(
        &self,
        pid: Pid,
        exc_id: ExcId,
        name: &str,
        priority: Priority,
        recipe: &str,
        awms: Vec<WorkingMode>,
    ) -> Result<SchedUid, ArbiterError> {
        let uid = Application::uid_for(pid, exc_id);
        let mut registry = self.registry.lock();
        if registry.get(uid).is_some() {
            return Err(ArbiterError::AlreadyExists(format!(
                "{}:{:05}:exc{:02}",
                name, pid, exc_id
            )));
        }
        let app = Application::new(pid, exc_id, name, priority, recipe, awms)?;
        info!(app = %app, recipe, "EXC registered");
        registry.insert(uid, app, State::New);
        Ok(uid)
    }

    /// Unregisters an execution context and frees everything it holds.
    pub fn destroy_exc(&self, uid: SchedUid) -> Result<(), ArbiterError> {
        let handle = self
            .registry
            .lock()
            .remove(uid)
            .ok_or_else(|| ArbiterError::NotFound(format!("uid {:#x}", uid)))?;
        self.agents.lock().remove(&uid);
        // Release committed resources; a never-scheduled EXC holds nothing
        let _ = self.accounter.lock().release_resources(uid, SYSTEM_VIEW);
        info!(app = %handle.read(), "EXC unregistered");
        Ok(())
    }

    /// Unregisters every execution context of a hosting process
    /// (agent exit or channel loss).
    pub fn destroy_all_for_pid(&self, pid: Pid) -> Vec<SchedUid> {
        let uids: Vec<SchedUid> = {
            let registry = self.registry.lock();
            registry
                .all_uids()
                .into_iter()
                .filter(|uid| {
                    registry
                        .get(*uid)
                        .map(|h| h.read().pid() == pid)
                        .unwrap_or(false)
                })
                .collect()
        };
        for uid in &uids {
            let _ = self.destroy_exc(*uid);
        }
        uids
    }

    /// Makes a new or disabled execution context schedulable.
    pub fn enable_exc(&self, uid: SchedUid) -> Result<(), ArbiterError> {
        let handle = self.handle(uid)?;
        {
            let mut app = handle.write();
            match app.state() {
                State::New | State::Sync(SyncState::Disabled) => {
                    app.set_state(State::Ready)?;
                }
                other => {
                    return Err(ArbiterError::AppBlocking(format!(
                        "{}: cannot enable from {}",
                        app, other
                    )));
                }
            }
        }
        self.registry.lock().move_state(uid, State::Ready);
        debug!(uid = uid, "EXC enabled");
        Ok(())
    }

    /// Disables an execution context and reclaims its accounting.
    pub fn disable_exc(&self, uid: SchedUid) -> Result<(), ArbiterError> {
        let handle = self.handle(uid)?;
        {
            let mut app = handle.write();
            if app.schedulable().is_disabled() {
                return Ok(());
            }
            app.set_state(State::Sync(SyncState::Disabled))?;
            warn!(app = %app, "EXC disabled");
        }
        self.registry
            .lock()
            .move_state(uid, State::Sync(SyncState::Disabled));
        let _ = self.accounter.lock().release_resources(uid, SYSTEM_VIEW);
        Ok(())
    }

    /// Destroys every execution context whose hosting pid vanished.
    pub fn check_active(&self, alive: &dyn Fn(Pid) -> bool) -> usize {
        let stale: Vec<SchedUid> = {
            let registry = self.registry.lock();
            registry
                .all_uids()
                .into_iter()
                .filter(|uid| {
                    registry
                        .get(*uid)
                        .map(|h| !alive(h.read().pid()))
                        .unwrap_or(false)
                })
                .collect()
        };
        for uid in &stale {
            warn!(uid = uid, "EXC vanished, cleaning up");
            let _ = self.destroy_exc(*uid);
        }
        stale.len()
    }

    // ------------------------------------------------------------------
    // Agent channel attachment
    // ------------------------------------------------------------------

    /// Attaches the agent channel serving this execution context.
    pub fn attach_agent(&self, uid: SchedUid, agent: Arc<dyn WorkloadAgent>) {
        self.agents.lock().insert(uid, agent);
    }

    /// The agent channel of an execution context, if connected.
    pub fn agent_of(&self, uid: SchedUid) -> Option<Arc<dyn WorkloadAgent>> {
        self.agents.lock().get(&uid).cloned()
    }

    // ------------------------------------------------------------------
    // Queries and iteration
    // ------------------------------------------------------------------

    fn handle(&self, uid: SchedUid) -> Result<Arc<RwLock<Application>>, ArbiterError> {
        self.registry
            .lock()
            .get(uid)
            .ok_or_else(|| ArbiterError::NotFound(format!("uid {:#x}", uid)))
    }

    /// The application handle, when registered.
    pub fn get(&self, uid: SchedUid) -> Option<Arc<RwLock<Application>>> {
        self.registry.lock().get(uid)
    }

    pub fn count(&self, state: State) -> usize {
        self.registry.lock().count(state)
    }

    /// Whether any application is ready or running.
    pub fn any_active(&self) -> bool {
        let registry = self.registry.lock();
        registry.any(State::Ready) || registry.any(State::Running)
    }

    /// Whether any application is synchronising, in any flavour.
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

    /// Uids in one state bucket, in uid order.
    pub fn uids(&self, state: State) -> Vec<SchedUid> {
        self.registry.lock().uids(state)
    }

    /// Handles in one state bucket.
    pub fn handles(&self, state: State) -> Vec<Arc<RwLock<Application>>> {
        self.registry.lock().handles(state)
    }

    /// The ready application with the highest priority (lowest value).
    pub fn highest_prio_ready(&self) -> Option<Arc<RwLock<Application>>> {
        self.registry
            .lock()
            .handles(State::Ready)
            .into_iter()
            .min_by_key(|h| h.read().priority())
    }

    /// Active applications (ready and running) ordered by priority.
    pub fn active_by_priority(&self) -> Vec<Arc<RwLock<Application>>> {
        let registry = self.registry.lock();
        let mut handles: Vec<Arc<RwLock<Application>>> = registry
            .handles(State::Ready)
            .into_iter()
            .chain(registry.handles(State::Running))
            .collect();
        drop(registry);
        handles.sort_by_key(|h| {
            let app = h.read();
            (app.priority(), app.uid())
        });
        handles
    }

    /// Opens a retained iteration over one state bucket.
    pub fn iter_first(
        &self,
        state: State,
    ) -> (RetainedIterator, Option<Arc<RwLock<Application>>>) {
        self.registry.lock().iter_first(state)
    }

    /// Advances a retained iteration.
    pub fn iter_next(&self, iter: &RetainedIterator) -> Option<Arc<RwLock<Application>>> {
        self.registry.lock().iter_next(iter)
    }

    /// Closes a retained iteration.
    pub fn iter_release(&self, iter: RetainedIterator) {
        self.registry.lock().iter_release(iter)
    }

    /// Status snapshot for the report renderers.
    pub fn snapshot(&self) -> Vec<WorkloadSnapshot> {
        let handles: Vec<Arc<RwLock<Application>>> = {
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
                let app = h.read();
                WorkloadSnapshot {
                    id: app.to_string(),
                    priority: app.priority(),
                    state: app.state(),
                    current_awm: app
                        .schedulable()
                        .current_awm()
                        .map(|m| m.name().to_string()),
                    next_awm: app.schedulable().next_awm().map(|m| m.name().to_string()),
                }
            })
            .collect()
    }

    // ------------------------------------------------------------------
    // Scheduling front-end
    // ------------------------------------------------------------------

    /// Stages a binding on a working mode for a later `schedule_request`.
    pub fn stage_binding(
        &self,
        uid: SchedUid,
        awm_id: AwmId,
        reference: BindingReference,
        binding: Binding,
    ) -> Result<(), ArbiterError> {
        let handle = self.handle(uid)?;
        let mut app = handle.write();
        let display = app.to_string();
        let awm = app.awm_mut(awm_id).ok_or_else(|| {
            ArbiterError::MissingAwm(format!("{}: no working mode {}", display, awm_id))
        })?;
        awm.add_binding(reference, binding);
        Ok(())
    }

    /// Books a working mode on a view and transitions the application
    /// into the matching `Sync(…)` state.
    ///
    /// On an accounting refusal the application is *unscheduled*: it
    /// transitions to `Sync(Blocked)` and the original error is
    /// propagated to the policy.
    pub fn schedule_request(
        &self,
        uid: SchedUid,
        awm_id: AwmId,
        view: ViewToken,
        bind_reference: BindingReference,
    ) -> Result<(), ArbiterError> {
        let handle = self.handle(uid)?;
        let candidate = {
            let mut app = handle.write();
            if app.schedulable().is_disabled() {
                return Err(ArbiterError::AppDisabled(app.to_string()));
            }
            let display = app.to_string();
            let awm = app.awm_mut(awm_id).ok_or_else(|| {
                ArbiterError::MissingAwm(format!("{}: no working mode {}", display, awm_id))
            })?;
            let binding = match awm.staged_binding(bind_reference) {
                Some(binding) => {
                    let binding = binding.clone();
                    awm.set_binding(bind_reference)?;
                    binding
                }
                // Policies that never stage bindings get an open one
                None => Binding::new(),
            };
            AssignedMode::new(&*awm, binding)
        };
        self.book_and_transition(&handle, uid, candidate, view)
    }

    /// Re-books the current working mode on a view, for applications the
    /// policy wants to keep exactly where they are.
    pub fn schedule_request_as_prev(
        &self,
        uid: SchedUid,
        view: ViewToken,
    ) -> Result<(), ArbiterError> {
        let handle = self.handle(uid)?;
        let candidate = {
            let app = handle.read();
            if app.schedulable().is_disabled() {
                return Err(ArbiterError::AppDisabled(app.to_string()));
            }
            app.schedulable()
                .current_awm()
                .cloned()
                .ok_or_else(|| {
                    ArbiterError::MissingAwm(format!("{}: no current working mode", app))
                })?
        };
        self.book_and_transition(&handle, uid, candidate, view)
    }

    fn book_and_transition(
        &self,
        handle: &Arc<RwLock<Application>>,
        uid: SchedUid,
        mut candidate: AssignedMode,
        view: ViewToken,
    ) -> Result<(), ArbiterError> {
        let booked = {
            let mut accounter = self.accounter.lock();
            // Support policy retries: drop a previous booking on this view
            if accounter.holding(uid, view).is_some() {
                let _ = accounter.release_resources(uid, view);
            }
            accounter.book_resources(
                uid,
                candidate.requests(),
                candidate.binding(),
                view,
                true,
            )
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

        let mut app = handle.write();
        let next_sync = app.schedulable().next_sync_for(&candidate);
        // Same mode, same binding: an amounts-only reshuffle still needs
        // a (silent) reconfiguration pass
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
        app.schedulable_mut().set_next_awm(Some(candidate), reshuffle);
        if let Some(sync) = next_sync {
            app.set_state(State::Sync(sync))?;
            drop(app);
            self.registry.lock().move_state(uid, State::Sync(sync));
        }
        Ok(())
    }

    /// Blocks an application the policy could not (or would not) serve.
    pub fn unschedule(&self, uid: SchedUid) -> Result<(), ArbiterError> {
        let handle = self.handle(uid)?;
        {
            let mut app = handle.write();
            if app.schedulable().is_disabled() {
                return Err(ArbiterError::AppDisabled(app.to_string()));
            }
            app.set_state(State::Sync(SyncState::Blocked))?;
        }
        self.registry
            .lock()
            .move_state(uid, State::Sync(SyncState::Blocked));
        Ok(())
    }

    /// Policy-facing alias of [`unschedule`](Self::unschedule).
    pub fn no_schedule(&self, uid: SchedUid) -> Result<(), ArbiterError> {
        self.unschedule(uid)
    }

    // ------------------------------------------------------------------
    // Synchronisation outcomes
    // ------------------------------------------------------------------

    /// Finalises a synchronised application: reconfiguring flavours
    /// resume `Running` with the promoted mode, blocked ones fall back
    /// to `Ready`.
    pub fn sync_commit(&self, uid: SchedUid) -> Result<(), ArbiterError> {
        let handle = self.handle(uid)?;
        let new_state = {
            let mut app = handle.write();
            match app.schedulable().sync_state() {
                Some(SyncState::Blocked) => {
                    app.set_state(State::Ready)?;
                    State::Ready
                }
                Some(SyncState::Disabled) => return Ok(()),
                Some(_) => {
                    app.set_state(State::Running)?;
                    State::Running
                }
                None => {
                    return Err(ArbiterError::InternalError(format!(
                        "{}: sync_commit outside a sync state",
                        app
                    )));
                }
            }
        };
        self.registry.lock().move_state(uid, new_state);
        Ok(())
    }

    /// Rolls a synchronising application back to the stable state it
    /// left (aborted session).
    pub fn sync_abort(&self, uid: SchedUid) -> Result<(), ArbiterError> {
        let handle = self.handle(uid)?;
        let new_state = {
            let mut app = handle.write();
            app.schedulable_mut().rollback_sync();
            app.state()
        };
        self.registry.lock().move_state(uid, new_state);
        Ok(())
    }

    /// Clears the scheduled mode of a still-running application the
    /// policy left untouched.
    pub fn sync_continue(&self, uid: SchedUid) -> Result<(), ArbiterError> {
        let handle = self.handle(uid)?;
        let mut app = handle.write();
        if !app.schedulable().is_running() {
            return Err(ArbiterError::InternalError(format!(
                "{}: sync_continue outside RUNNING",
                app
            )));
        }
        app.schedulable_mut().set_next_awm(None, false);
        Ok(())
    }
}
