// /////////////////////////////////////////////////////////////////////////////
// Resource Arbiter RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Schedulable
//!
//! The workload model shared by managed applications and plain processes:
//! identity, priority, the scheduling state machine and the current/next
//! working-mode slots.
//!
//! ## State Machine
//!
//! A schedulable is in one of `New`, `Ready`, `Sync(flavour)`, `Running`,
//! `Finished`. The synchronisation flavour is part of the `Sync` variant,
//! so "in sync state without a sync flavour" is unrepresentable, as is a
//! stable state carrying one.
//!
//! Transition side effects:
//!
//! - entering `Sync(Blocked)`, `Sync(Disabled)` or stable `Ready` clears
//!   both working-mode slots;
//! - entering `Running` promotes `next` to `current`, clears `next` and
//!   accounts the scheduling on the schedulable;
//! - entering `Finished` clears the `next` slot.
//!
//! ## Locking
//!
//! The type is a plain state machine: mutating methods take `&mut self`,
//! projections take `&self`. The owning workload manager provides the
//! outer lock, so transitions are never re-entered.

use std::fmt;

use crate::entities::working_mode::{AssignedMode, AwmId};
use crate::error::ArbiterError;

/// OS process identifier type.
pub type Pid = u32;

/// Unique identifier of a schedulable across both registries.
pub type SchedUid = u64;

/// Priority value; 0 is the highest priority.
pub type Priority = u16;

/// Lowest priority admitted by the managers.
pub const LOWEST_PRIORITY: Priority = 15;

/// The synchronisation action a scheduled reconfiguration requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncState {
    /// The workload is entering the system
    Starting,
    /// Must change working mode
    Reconf,
    /// Must migrate and change working mode
    MigRec,
    /// Must migrate onto other resources
    Migrate,
    /// Must be blocked: resources are no longer available
    Blocked,
    /// Administratively disabled
    Disabled,
}

impl SyncState {
    /// All flavours, in the order sync queues are usually served.
    pub const ALL: [SyncState; 6] = [
        SyncState::Starting,
        SyncState::Reconf,
        SyncState::MigRec,
        SyncState::Migrate,
        SyncState::Blocked,
        SyncState::Disabled,
    ];
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SyncState::Starting => "STARTING",
            SyncState::Reconf => "RECONF",
            SyncState::MigRec => "MIGREC",
            SyncState::Migrate => "MIGRATE",
            SyncState::Blocked => "BLOCKED",
            SyncState::Disabled => "DISABLED",
        };
        f.write_str(s)
    }
}

/// The scheduling state of a workload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    /// Registered but never scheduled
    New,
    /// Waiting for resources
    Ready,
    /// (Re-)scheduled but not reconfigured yet
    Sync(SyncState),
    /// Running with its current working mode
    Running,
    /// Regular termination
    Finished,
}

impl State {
    /// The state bucket used by per-state queues: `Sync(x)` buckets by
    /// flavour, stable states by themselves.
    pub fn is_stable(&self) -> bool {
        !matches!(self, State::Sync(_))
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            State::New => f.write_str("NEW"),
            State::Ready => f.write_str("READY"),
            State::Sync(sync) => write!(f, "SYNC/{}", sync),
            State::Running => f.write_str("RUNNING"),
            State::Finished => f.write_str("FINISHED"),
        }
    }
}

/// A managed workload: the attributes and state shared by applications
/// and processes.
#[derive(Debug, Clone)]
pub struct Schedulable {
    uid: SchedUid,
    pid: Pid,
    name: String,
    priority: Priority,
    state: State,
    /// The stable state this workload last left for a sync state
    pre_sync_state: State,
    current_awm: Option<AssignedMode>,
    next_awm: Option<AssignedMode>,
    /// The pending transition only reshuffles amounts inside the same
    /// binding (no agent interaction required)
    reshuffling: bool,
    schedule_count: u64,
}

impl Schedulable {
    /// Creates a workload in state `New`.
    pub fn new(uid: SchedUid, pid: Pid, name: impl Into<String>, priority: Priority) -> Self {
        Self {
            uid,
            pid,
            name: name.into(),
            priority: priority.min(LOWEST_PRIORITY),
            state: State::New,
            pre_sync_state: State::New,
            current_awm: None,
            next_awm: None,
            reshuffling: false,
            schedule_count: 0,
        }
    }

    pub fn uid(&self) -> SchedUid {
        self.uid
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// The sync flavour, when the workload is synchronising.
    pub fn sync_state(&self) -> Option<SyncState> {
        match self.state {
            State::Sync(sync) => Some(sync),
            _ => None,
        }
    }

    /// The stable state this workload last left for a sync state.
    pub fn pre_sync_state(&self) -> State {
        self.pre_sync_state
    }

    /// Disabled workloads are skipped by scheduling and synchronisation.
    pub fn is_disabled(&self) -> bool {
        matches!(self.state, State::Sync(SyncState::Disabled) | State::Finished)
    }

    /// Ready or running: eligible for a scheduling decision.
    pub fn is_active(&self) -> bool {
        matches!(self.state, State::Ready | State::Running)
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state, State::Ready)
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, State::Running)
    }

    pub fn is_synching(&self) -> bool {
        matches!(self.state, State::Sync(_))
    }

    pub fn is_starting(&self) -> bool {
        matches!(self.state, State::Sync(SyncState::Starting))
    }

    pub fn is_blocking(&self) -> bool {
        matches!(self.state, State::Sync(SyncState::Blocked))
    }

    /// Whether the pending reconfiguration changes the working mode id.
    pub fn switching_awm(&self) -> bool {
        if !self.is_synching() {
            return false;
        }
        match (&self.current_awm, &self.next_awm) {
            (Some(current), Some(next)) => current.awm_id() != next.awm_id(),
            (None, Some(_)) => true,
            _ => false,
        }
    }

    /// Whether the pending transition only reshuffles amounts inside the
    /// same binding.
    pub fn is_reshuffling(&self) -> bool {
        self.reshuffling
    }

    pub fn current_awm(&self) -> Option<&AssignedMode> {
        self.current_awm.as_ref()
    }

    pub fn next_awm(&self) -> Option<&AssignedMode> {
        self.next_awm.as_ref()
    }

    /// Mutable access to the scheduled (next) working mode, used to attach
    /// the booked assignment.
    pub fn next_awm_mut(&mut self) -> Option<&mut AssignedMode> {
        self.next_awm.as_mut()
    }

    pub fn schedule_count(&self) -> u64 {
        self.schedule_count
    }

    /// Stages the scheduled working mode for the next transition.
    pub fn set_next_awm(&mut self, next: Option<AssignedMode>, reshuffling: bool) {
        self.next_awm = next;
        self.reshuffling = reshuffling;
    }

    /// Derives the synchronisation flavour required to move this workload
    /// onto `candidate`.
    ///
    /// Reshuffle-only transitions (same mode, same binding, different
    /// amounts) are not visible from the mode diff alone; the caller
    /// upgrades the `None` answer after comparing booked assignments.
    pub fn next_sync_for(&self, candidate: &AssignedMode) -> Option<SyncState> {
        let current = match &self.current_awm {
            None => return Some(SyncState::Starting),
            Some(current) => current,
        };

        let same_mode = current.awm_id() == candidate.awm_id();
        let same_cpus = current.cpu_ids() == candidate.cpu_ids();

        match (same_mode, same_cpus) {
            (false, false) => Some(SyncState::MigRec),
            (true, false) => Some(SyncState::Migrate),
            (false, true) => Some(SyncState::Reconf),
            (true, true) => None,
        }
    }

    /// Rolls a synchronising workload back to the stable state it left.
    ///
    /// Used when a sync session aborts: the scheduled working mode is
    /// dropped and the workload resumes `Running` with its unchanged
    /// current mode, or falls back to `Ready` when no mode survived
    /// (blocking and disabling cleared the slots).
    pub fn rollback_sync(&mut self) {
        if !self.is_synching() {
            return;
        }
        self.next_awm = None;
        self.reshuffling = false;
        if self.pre_sync_state == State::Running && self.current_awm.is_some() {
            self.state = State::Running;
        } else {
            self.current_awm = None;
            self.state = State::Ready;
        }
    }

    /// Applies a state transition, enforcing the machine's rules.
    ///
    /// Returns the id of the working mode promoted to `current`, when the
    /// transition entered `Running`; the owner uses it to account the
    /// scheduling on its catalogue entry.
    ///
    /// # Errors
    /// Returns `MissingAwm` when entering `Running` without a staged next
    /// working mode. The state is left unchanged on error.
    pub fn set_state(&mut self, next_state: State) -> Result<Option<AwmId>, ArbiterError> {
        if next_state == State::Running && self.next_awm.is_none() {
            return Err(ArbiterError::MissingAwm(format!(
                "{}: cannot enter RUNNING without a scheduled working mode",
                self
            )));
        }

        if self.state.is_stable() && !next_state.is_stable() {
            self.pre_sync_state = self.state;
        }
        self.state = next_state;

        match next_state {
            State::Sync(SyncState::Blocked) | State::Sync(SyncState::Disabled) | State::Ready => {
                self.current_awm = None;
                self.next_awm = None;
                self.reshuffling = false;
                Ok(None)
            }
            State::Running => {
                // Checked above: next_awm is present
                let next = self.next_awm.take();
                let promoted = next.as_ref().map(|m| m.awm_id());
                self.current_awm = next;
                self.schedule_count = self.schedule_count.saturating_add(1);
                self.reshuffling = false;
                Ok(promoted)
            }
            State::Finished => {
                self.next_awm = None;
                self.reshuffling = false;
                Ok(None)
            }
            _ => Ok(None),
        }
    }
}

impl fmt::Display for Schedulable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.pid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::working_mode::{Binding, WorkingMode};
    use crate::value_objects::{FillPolicy, ResourceRequest, ResourceType};

    fn assigned(awm_id: AwmId, cpu: u32) -> AssignedMode {
        let awm = WorkingMode::new(
            awm_id,
            format!("awm{}", awm_id),
            1.0,
            vec![ResourceRequest::new(
                "sys.cpu.pe".parse().unwrap(),
                100,
                FillPolicy::Sequential,
            )],
        )
        .unwrap();
        let mut binding = Binding::new();
        binding.bind(ResourceType::Cpu, [cpu]);
        AssignedMode::new(&awm, binding)
    }

    fn ready_schedulable() -> Schedulable {
        let mut sched = Schedulable::new(1, 100, "demo", 2);
        sched.set_state(State::Ready).unwrap();
        sched
    }

    /// Tests the coupling between the sync flavour and the Sync state.
    ///
    /// The flavour is only observable while the workload is in `Sync`,
    /// and every `Sync` state exposes one.
    #[test]
    fn test_sync_state_coupling() {
        let mut sched = ready_schedulable();
        assert_eq!(sched.sync_state(), None);

        sched.set_next_awm(Some(assigned(0, 0)), false);
        sched.set_state(State::Sync(SyncState::Starting)).unwrap();
        assert_eq!(sched.sync_state(), Some(SyncState::Starting));
        assert!(sched.is_synching());

        sched.set_state(State::Running).unwrap();
        assert_eq!(sched.sync_state(), None);
        assert!(!sched.is_synching());
    }

    /// Tests working-mode promotion on the transition into Running.
    ///
    /// After the transition: `current` is the old `next`, `next` is empty
    /// and the schedule counter advanced.
    #[test]
    fn test_running_promotes_next_awm() {
        let mut sched = ready_schedulable();
        sched.set_next_awm(Some(assigned(3, 1)), false);
        sched.set_state(State::Sync(SyncState::Starting)).unwrap();

        let promoted = sched.set_state(State::Running).unwrap();
        assert_eq!(promoted, Some(3));
        assert_eq!(sched.current_awm().map(|m| m.awm_id()), Some(3));
        assert!(sched.next_awm().is_none());
        assert_eq!(sched.schedule_count(), 1);
    }

    #[test]
    fn test_running_requires_next_awm() {
        let mut sched = ready_schedulable();
        let err = sched.set_state(State::Running);
        assert!(matches!(err, Err(ArbiterError::MissingAwm(_))));
        // The failed transition left the state untouched
        assert_eq!(sched.state(), State::Ready);
    }

    /// Tests that blocking and disabling clear both working-mode slots.
    #[test]
    fn test_blocked_and_ready_clear_awms() {
        let mut sched = ready_schedulable();
        sched.set_next_awm(Some(assigned(0, 0)), false);
        sched.set_state(State::Sync(SyncState::Starting)).unwrap();
        sched.set_state(State::Running).unwrap();
        assert!(sched.current_awm().is_some());

        sched.set_next_awm(Some(assigned(1, 0)), false);
        sched.set_state(State::Sync(SyncState::Blocked)).unwrap();
        assert!(sched.current_awm().is_none());
        assert!(sched.next_awm().is_none());

        sched.set_state(State::Ready).unwrap();
        assert!(sched.current_awm().is_none());
    }

    /// Tests the synchronisation-flavour derivation table.
    #[test]
    fn test_next_sync_for_table() {
        let mut sched = ready_schedulable();

        // No current working mode: the workload is starting
        assert_eq!(sched.next_sync_for(&assigned(0, 0)), Some(SyncState::Starting));

        sched.set_next_awm(Some(assigned(0, 0)), false);
        sched.set_state(State::Sync(SyncState::Starting)).unwrap();
        sched.set_state(State::Running).unwrap();

        // Different mode, different CPUs: migrate and reconfigure
        assert_eq!(sched.next_sync_for(&assigned(1, 1)), Some(SyncState::MigRec));
        // Same mode, different CPUs: migrate only
        assert_eq!(sched.next_sync_for(&assigned(0, 1)), Some(SyncState::Migrate));
        // Different mode, same CPUs: reconfigure only
        assert_eq!(sched.next_sync_for(&assigned(1, 0)), Some(SyncState::Reconf));
        // Same mode, same CPUs: nothing to synchronise
        assert_eq!(sched.next_sync_for(&assigned(0, 0)), None);
    }

    #[test]
    fn test_switching_awm() {
        let mut sched = ready_schedulable();
        sched.set_next_awm(Some(assigned(0, 0)), false);
        sched.set_state(State::Sync(SyncState::Starting)).unwrap();
        assert!(sched.switching_awm());

        sched.set_state(State::Running).unwrap();
        assert!(!sched.switching_awm());

        // Same-mode migration: not an AWM switch
        sched.set_next_awm(Some(assigned(0, 1)), false);
        sched.set_state(State::Sync(SyncState::Migrate)).unwrap();
        assert!(!sched.switching_awm());
    }

    #[test]
    fn test_pre_sync_state_tracking() {
        let mut sched = ready_schedulable();
        sched.set_next_awm(Some(assigned(0, 0)), false);
        sched.set_state(State::Sync(SyncState::Starting)).unwrap();
        assert_eq!(sched.pre_sync_state(), State::Ready);

        sched.set_state(State::Running).unwrap();
        sched.set_next_awm(Some(assigned(1, 0)), false);
        sched.set_state(State::Sync(SyncState::Reconf)).unwrap();
        assert_eq!(sched.pre_sync_state(), State::Running);
    }
}
