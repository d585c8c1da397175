// /////////////////////////////////////////////////////////////////////////////
// Resource Arbiter RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # System Facade
//!
//! The view of the arbiter handed to allocation policies: read-only
//! queries over the resource accounter and both workload registries,
//! plus the scheduling entry points a policy is allowed to drive
//! (`schedule_request` and friends, view management, binding staging).
//!
//! Workloads are always addressed by uid through the facade; nothing a
//! policy receives owns a workload.

use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use resource_arbiter_domain::{
    Application, ArbiterError, AwmId, Binding, BindingReference, Process, ResourceAccounter,
    ResourcePath, ResourceType, SchedUid, State, ViewToken,
};

use crate::application::services::application_manager::ApplicationManager;
use crate::application::services::process_manager::ProcessManager;

/// Policy-facing facade over accounter and workload managers.
pub struct System {
    accounter: Arc<Mutex<ResourceAccounter>>,
    apps: Arc<ApplicationManager>,
    procs: Arc<ProcessManager>,
}

impl System {
    pub fn new(
        accounter: Arc<Mutex<ResourceAccounter>>,
        apps: Arc<ApplicationManager>,
        procs: Arc<ProcessManager>,
    ) -> Self {
        Self {
            accounter,
            apps,
            procs,
        }
    }

    /// The application registry.
    pub fn applications(&self) -> &ApplicationManager {
        &self.apps
    }

    /// The process registry.
    pub fn processes(&self) -> &ProcessManager {
        &self.procs
    }

    /// The shared accounter handle (managers and workers only).
    pub fn accounter(&self) -> &Arc<Mutex<ResourceAccounter>> {
        &self.accounter
    }

    // ------------------------------------------------------------------
    // Resource queries
    // ------------------------------------------------------------------

    /// Total capacity under a path or template.
    pub fn resource_total(&self, path: &ResourcePath) -> u64 {
        self.accounter.lock().total(path)
    }

    /// Charged amount under a path in a view.
    pub fn resource_used(&self, path: &ResourcePath, view: ViewToken) -> Result<u64, ArbiterError> {
        self.accounter.lock().used(path, view)
    }

    /// Availability under a path in a view, optionally from an owner's
    /// perspective.
    pub fn resource_available(
        &self,
        path: &ResourcePath,
        view: ViewToken,
        owner: Option<SchedUid>,
    ) -> Result<u64, ArbiterError> {
        self.accounter.lock().available(path, view, owner)
    }

    /// Number of registered resources of a type.
    pub fn resource_count(&self, rtype: ResourceType) -> usize {
        self.accounter.lock().count_per_type(rtype)
    }

    /// The concrete ids of the registered resources of a type.
    pub fn resource_ids(&self, rtype: ResourceType) -> BTreeSet<u32> {
        let accounter = self.accounter.lock();
        accounter
            .paths()
            .filter_map(|p| {
                if p.last_type() == rtype {
                    p.concrete_id_of(rtype)
                } else {
                    None
                }
            })
            .collect()
    }

    // ------------------------------------------------------------------
    // View management
    // ------------------------------------------------------------------

    /// Creates (or resets) the policy's working view.
    pub fn get_view(&self, name: &str) -> Result<ViewToken, ArbiterError> {
        self.accounter.lock().get_view(name)
    }

    /// Releases a speculative view.
    pub fn put_view(&self, token: ViewToken) -> Result<(), ArbiterError> {
        self.accounter.lock().put_view(token)
    }

    // ------------------------------------------------------------------
    // Workload queries
    // ------------------------------------------------------------------

    /// Active applications (ready and running) ordered by priority.
    pub fn apps_by_priority(&self) -> Vec<Arc<RwLock<Application>>> {
        self.apps.active_by_priority()
    }

    /// Processes waiting for resources.
    pub fn ready_processes(&self) -> Vec<Arc<RwLock<Process>>> {
        self.procs.handles(State::Ready)
    }

    /// Running processes.
    pub fn running_processes(&self) -> Vec<Arc<RwLock<Process>>> {
        self.procs.handles(State::Running)
    }

    // ------------------------------------------------------------------
    // Scheduling entry points
    // ------------------------------------------------------------------

    /// Stages a binding on an application working mode.
    pub fn stage_binding(
        &self,
        uid: SchedUid,
        awm_id: AwmId,
        reference: BindingReference,
        binding: Binding,
    ) -> Result<(), ArbiterError> {
        self.apps.stage_binding(uid, awm_id, reference, binding)
    }

    /// Books a working mode for an application on the policy's view.
    pub fn schedule_request(
        &self,
        uid: SchedUid,
        awm_id: AwmId,
        view: ViewToken,
        bind_reference: BindingReference,
    ) -> Result<(), ArbiterError> {
        self.apps.schedule_request(uid, awm_id, view, bind_reference)
    }

    /// Re-books an application's current working mode on the policy's
    /// view.
    pub fn schedule_request_as_prev(
        &self,
        uid: SchedUid,
        view: ViewToken,
    ) -> Result<(), ArbiterError> {
        self.apps.schedule_request_as_prev(uid, view)
    }

    /// Declares that an application will not be scheduled this cycle.
    pub fn no_schedule(&self, uid: SchedUid) -> Result<(), ArbiterError> {
        self.apps.no_schedule(uid)
    }

    /// Books a process's fluid request on the policy's view.
    pub fn process_schedule_request(
        &self,
        uid: SchedUid,
        view: ViewToken,
    ) -> Result<(), ArbiterError> {
        self.procs.schedule_request(uid, view)
    }
}
