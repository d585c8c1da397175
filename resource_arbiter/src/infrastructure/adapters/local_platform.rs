// /////////////////////////////////////////////////////////////////////////////
// Resource Arbiter RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Local Platform Adapter
//!
//! The in-tree platform adapter: registers the declared (or probed)
//! resource layout with the accounter and tracks per-workload mappings
//! in memory. Mapping and reclaiming are logged bookkeeping here — the
//! enforcement backends (control groups, DVFS, accelerator firmware)
//! plug in behind the same port on production deployments.
//!
//! Sampling queries rely on the port's `NotSupported` defaults, which is
//! the thin-adapter contract: the power monitor records the answer once
//! and stops asking.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, info};

use resource_arbiter_domain::{
    ArbiterError, Assignment, DeclaredUnit, PlatformService, ResourceAccounter, SchedUid,
    WorkloadDescriptor,
};

use crate::infrastructure::config::LayoutEntry;

/// Capacity granted per probed logical CPU (percent quota).
const PROBED_PE_CAPACITY: u64 = 100;

/// In-memory platform adapter.
pub struct LocalPlatformAdapter {
    accounter: Arc<Mutex<ResourceAccounter>>,
    layout: Vec<LayoutEntry>,
    probed_cpus: usize,
    probed_memory_mb: Option<u64>,
    /// Current per-workload platform mappings
    held: Mutex<HashMap<SchedUid, Assignment>>,
}

impl LocalPlatformAdapter {
    /// Creates the adapter over a declared layout; an empty layout falls
    /// back to the probed host (one processing element per logical CPU
    /// plus the physical memory).
    pub fn new(
        accounter: Arc<Mutex<ResourceAccounter>>,
        layout: Vec<LayoutEntry>,
        probed_cpus: usize,
        probed_memory_mb: Option<u64>,
    ) -> Self {
        Self {
            accounter,
            layout,
            probed_cpus,
            probed_memory_mb,
            held: Mutex::new(HashMap::new()),
        }
    }

    /// The assignment currently mapped for a workload, if any.
    pub fn mapped(&self, uid: SchedUid) -> Option<Assignment> {
        self.held.lock().get(&uid).cloned()
    }
}

#[async_trait]
impl PlatformService for LocalPlatformAdapter {
    async fn load_platform_data(&self) -> Result<(), ArbiterError> {
        let mut accounter = self.accounter.lock();
        if self.layout.is_empty() {
            info!(
                cpus = self.probed_cpus,
                memory_mb = self.probed_memory_mb,
                "No declared layout, registering the probed host"
            );
            for pe in 0..self.probed_cpus {
                accounter.register(
                    &format!("sys0.cpu0.pe{}", pe),
                    DeclaredUnit::Count,
                    PROBED_PE_CAPACITY,
                )?;
            }
            if let Some(memory_mb) = self.probed_memory_mb {
                accounter.register("sys0.mem0", DeclaredUnit::Mb, memory_mb)?;
            }
            return Ok(());
        }

        for entry in &self.layout {
            let unit: DeclaredUnit = entry.units.parse()?;
            accounter.register(&entry.path, unit, entry.amount)?;
            debug!(path = entry.path, amount = entry.amount, "Resource registered");
        }
        info!(resources = self.layout.len(), "Platform layout registered");
        Ok(())
    }

    async fn start(&self) -> Result<(), ArbiterError> {
        Ok(())
    }

    async fn stop(&self) -> Result<(), ArbiterError> {
        self.held.lock().clear();
        Ok(())
    }

    async fn map_resources(
        &self,
        workload: &WorkloadDescriptor,
        assignment: &Assignment,
    ) -> Result<(), ArbiterError> {
        debug!(
            workload = %workload.name,
            pid = workload.pid,
            nodes = assignment.entries().len(),
            "Mapping resources"
        );
        self.held.lock().insert(workload.uid, assignment.clone());
        Ok(())
    }

    async fn reclaim_resources(&self, workload: &WorkloadDescriptor) -> Result<(), ArbiterError> {
        debug!(workload = %workload.name, pid = workload.pid, "Reclaiming resources");
        self.held.lock().remove(&workload.uid);
        Ok(())
    }
}
