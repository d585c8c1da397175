// /////////////////////////////////////////////////////////////////////////////
// Resource Arbiter RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Naive First-Fit Policy
//!
//! The baseline allocation policy: serve active applications in priority
//! order, give each the first working mode of its catalogue that still
//! fits, leave the binder free to spread over the whole tree. Processes
//! are served after applications with their fluid requests.
//!
//! Workloads nothing fits for are blocked by the booking path; the
//! policy just moves on.

use tracing::debug;

use resource_arbiter_domain::{ArbiterError, ViewToken};

use crate::application::policy::SchedulerPolicy;
use crate::application::services::System;

/// Priority-ordered first-fit allocation.
pub struct NaivePolicy;

impl NaivePolicy {
    pub const NAME: &'static str = "naive";

    pub fn new() -> Self {
        Self
    }
}

impl Default for NaivePolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl SchedulerPolicy for NaivePolicy {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn schedule(&self, system: &System) -> Result<ViewToken, ArbiterError> {
        let view = system.get_view("schedpol.naive")?;

        for handle in system.apps_by_priority() {
            let (uid, awm_ids) = {
                let app = handle.read();
                let ids: Vec<u32> = app.awms().iter().map(|awm| awm.id()).collect();
                (app.uid(), ids)
            };
            let mut placed = false;
            for awm_id in awm_ids {
                match system.schedule_request(uid, awm_id, view, 0) {
                    Ok(()) => {
                        placed = true;
                        break;
                    }
                    Err(ArbiterError::Overbooked(_)) => continue,
                    Err(e) => {
                        debug!(uid, error = %e, "Skipping unschedulable application");
                        break;
                    }
                }
            }
            if !placed {
                debug!(uid, "No working mode fits, application stays blocked");
            }
        }

        for handle in system.ready_processes() {
            let uid = handle.read().uid();
            if let Err(e) = system.process_schedule_request(uid, view) {
                debug!(uid, error = %e, "Process not placed");
            }
        }
        // Running processes keep their allocation unless their demand
        // changed; re-booking settles the diff
        for handle in system.running_processes() {
            let uid = handle.read().uid();
            if let Err(e) = system.process_schedule_request(uid, view) {
                debug!(uid, error = %e, "Running process not re-placed");
            }
        }

        Ok(view)
    }
}
