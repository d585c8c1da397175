// /////////////////////////////////////////////////////////////////////////////
// Resource Arbiter RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Application
//!
//! An adaptive application: a schedulable created when its runtime pairs
//! with the arbiter over the workload-agent channel. Applications carry a
//! catalogue of working modes loaded from their recipe; the allocation
//! policy picks one (and a binding) on every scheduling cycle.
//!
//! One OS process may host several execution contexts, each registered as
//! its own application; the `(pid, exc_id)` pair is folded into the
//! registry-wide unique id.

use std::fmt;

use crate::entities::schedulable::{Pid, Priority, Schedulable, SchedUid, State};
use crate::entities::working_mode::{AwmId, WorkingMode};
use crate::error::ArbiterError;

/// Execution-context identifier inside one hosting process.
pub type ExcId = u32;

/// An adaptive application with a catalogue of working modes.
#[derive(Debug, Clone)]
pub struct Application {
    sched: Schedulable,
    exc_id: ExcId,
    /// Name of the recipe the catalogue was loaded from
    recipe: String,
    /// Enabled working modes, ordered by id
    awms: Vec<WorkingMode>,
}

impl Application {
    /// Folds a `(pid, exc_id)` pair into the registry-wide unique id.
    pub fn uid_for(pid: Pid, exc_id: ExcId) -> SchedUid {
        (u64::from(pid) << 16) | u64::from(exc_id & 0xffff)
    }

    /// Creates an application with its working-mode catalogue.
    ///
    /// # Errors
    /// Returns `MissingAwm` when the catalogue is empty and
    /// `InvalidConfiguration` when two modes share an id.
    pub fn new(
        pid: Pid,
        exc_id: ExcId,
        name: impl Into<String>,
        priority: Priority,
        recipe: impl Into<String>,
        mut awms: Vec<WorkingMode>,
    ) -> Result<Self, ArbiterError> {
        let name = name.into();
        if awms.is_empty() {
            return Err(ArbiterError::MissingAwm(format!(
                "{}: recipe declares no working mode",
                name
            )));
        }
        awms.sort_by_key(|awm| awm.id());
        for pair in awms.windows(2) {
            if pair[0].id() == pair[1].id() {
                return Err(ArbiterError::InvalidConfiguration(format!(
                    "{}: duplicate working mode id {}",
                    name,
                    pair[0].id()
                )));
            }
        }
        Ok(Self {
            sched: Schedulable::new(Self::uid_for(pid, exc_id), pid, name, priority),
            exc_id,
            recipe: recipe.into(),
            awms,
        })
    }

    pub fn uid(&self) -> SchedUid {
        self.sched.uid()
    }

    pub fn pid(&self) -> Pid {
        self.sched.pid()
    }

    pub fn exc_id(&self) -> ExcId {
        self.exc_id
    }

    pub fn name(&self) -> &str {
        self.sched.name()
    }

    pub fn priority(&self) -> Priority {
        self.sched.priority()
    }

    pub fn state(&self) -> State {
        self.sched.state()
    }

    pub fn recipe(&self) -> &str {
        &self.recipe
    }

    /// The shared workload model.
    pub fn schedulable(&self) -> &Schedulable {
        &self.sched
    }

    /// Mutable access to the shared workload model.
    ///
    /// Prefer [`set_state`](Self::set_state) for transitions: it keeps the
    /// catalogue counters in step with promotions.
    pub fn schedulable_mut(&mut self) -> &mut Schedulable {
        &mut self.sched
    }

    /// The enabled working modes, ordered by id.
    pub fn awms(&self) -> &[WorkingMode] {
        &self.awms
    }

    /// Looks up a working mode by id.
    pub fn awm(&self, id: AwmId) -> Option<&WorkingMode> {
        self.awms.iter().find(|awm| awm.id() == id)
    }

    /// Mutable lookup, used by policies staging bindings.
    pub fn awm_mut(&mut self, id: AwmId) -> Option<&mut WorkingMode> {
        self.awms.iter_mut().find(|awm| awm.id() == id)
    }

    /// Applies a state transition and accounts promotions on the
    /// catalogue entry of the promoted mode.
    pub fn set_state(&mut self, next_state: State) -> Result<(), ArbiterError> {
        let promoted = self.sched.set_state(next_state)?;
        if let Some(awm_id) = promoted {
            if let Some(awm) = self.awm_mut(awm_id) {
                awm.inc_schedule_count();
            }
        }
        Ok(())
    }
}

impl fmt::Display for Application {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{:05}:exc{:02}", self.name(), self.pid(), self.exc_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::schedulable::SyncState;
    use crate::entities::working_mode::AssignedMode;
    use crate::value_objects::{FillPolicy, ResourceRequest};

    fn awm(id: AwmId) -> WorkingMode {
        WorkingMode::new(
            id,
            format!("awm{}", id),
            id as f32,
            vec![ResourceRequest::new(
                "sys.cpu.pe".parse().unwrap(),
                100,
                FillPolicy::Sequential,
            )],
        )
        .unwrap()
    }

    #[test]
    fn test_uid_folding() {
        assert_eq!(Application::uid_for(1, 0), 0x10000);
        assert_eq!(Application::uid_for(1, 1), 0x10001);
        assert_ne!(Application::uid_for(2, 0), Application::uid_for(1, 0));
    }

    #[test]
    fn test_catalogue_validation() {
        assert!(Application::new(100, 0, "demo", 1, "r", vec![]).is_err());
        assert!(Application::new(100, 0, "demo", 1, "r", vec![awm(0), awm(0)]).is_err());

        let app = Application::new(100, 0, "demo", 1, "r", vec![awm(2), awm(0)]).unwrap();
        // Catalogue is kept ordered by id
        assert_eq!(app.awms()[0].id(), 0);
        assert_eq!(app.awms()[1].id(), 2);
    }

    /// Tests that promotions account on the catalogue entry, not only on
    /// the schedulable.
    #[test]
    fn test_promotion_accounts_on_catalogue() {
        let mut app = Application::new(100, 0, "demo", 1, "r", vec![awm(0), awm(1)]).unwrap();
        app.set_state(State::Ready).unwrap();

        let assigned = AssignedMode::from_committed(app.awm(1).unwrap());
        app.schedulable_mut().set_next_awm(Some(assigned), false);
        app.set_state(State::Sync(SyncState::Starting)).unwrap();
        app.set_state(State::Running).unwrap();

        assert_eq!(app.awm(1).unwrap().schedule_count(), 1);
        assert_eq!(app.awm(0).unwrap().schedule_count(), 0);
        assert_eq!(app.schedulable().schedule_count(), 1);
    }
}
