// /////////////////////////////////////////////////////////////////////////////
// Resource Arbiter RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Random Policy
//!
//! Stress-testing policy: every active application gets a uniformly
//! random working mode from its catalogue, pinned to a uniformly random
//! CPU. The point is to exercise the accounting, binding and
//! synchronisation machinery with constantly changing decisions, not to
//! allocate well.

use rand::prelude::IndexedRandom;
use rand::Rng;
use tracing::debug;

use resource_arbiter_domain::{ArbiterError, Binding, ResourceType, ViewToken};

use crate::application::policy::SchedulerPolicy;
use crate::application::services::System;

/// Uniformly random working-mode and CPU selection.
pub struct RandomPolicy;

impl RandomPolicy {
    pub const NAME: &'static str = "random";

    pub fn new() -> Self {
        Self
    }
}

impl Default for RandomPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl SchedulerPolicy for RandomPolicy {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn schedule(&self, system: &System) -> Result<ViewToken, ArbiterError> {
        let view = system.get_view("schedpol.random")?;
        let cpu_ids: Vec<u32> = system.resource_ids(ResourceType::Cpu).into_iter().collect();
        let mut rng = rand::rng();

        for handle in system.apps_by_priority() {
            let (uid, awm_ids) = {
                let app = handle.read();
                let ids: Vec<u32> = app.awms().iter().map(|awm| awm.id()).collect();
                (app.uid(), ids)
            };
            let awm_id = match awm_ids.as_slice().choose(&mut rng) {
                Some(id) => *id,
                None => continue,
            };
            let reference = rng.random::<u32>() % 8;
            if let Some(cpu) = cpu_ids.as_slice().choose(&mut rng) {
                let mut binding = Binding::new();
                binding.bind(ResourceType::Cpu, [*cpu]);
                system.stage_binding(uid, awm_id, reference, binding)?;
            }
            if let Err(e) = system.schedule_request(uid, awm_id, view, reference) {
                debug!(uid, error = %e, "Random pick did not fit");
            }
        }

        for handle in system.ready_processes() {
            let uid = handle.read().uid();
            if let Err(e) = system.process_schedule_request(uid, view) {
                debug!(uid, error = %e, "Process not placed");
            }
        }

        Ok(view)
    }
}
