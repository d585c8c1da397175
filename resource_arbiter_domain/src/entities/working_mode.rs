// /////////////////////////////////////////////////////////////////////////////
// Resource Arbiter RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Working Mode (AWM)
//!
//! A working mode is a named alternative resource configuration of a
//! schedulable: a list of resource requests plus a user-supplied value the
//! allocation policy uses to rank alternatives. Applications declare a
//! catalogue of working modes in their recipe; managed processes get a
//! single working mode synthesised from their fluid request.
//!
//! ## Binding
//!
//! Requests address resources through open paths (`sys.cpu.pe`). Before a
//! working mode can be scheduled, a policy narrows those open levels to
//! concrete resources: a [`Binding`] restricts one or more resource types
//! to explicit id sets (CPU → {1}, PE → {0, 1}). Policies may stage several
//! alternative bindings under distinct numeric references and commit the
//! one they settle on — staging is cheap, only the committed binding is
//! ever booked.
//!
//! A working mode is immutable after creation except for its bindings and
//! its scheduling counter.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::error::ArbiterError;
use crate::value_objects::{ResourcePath, ResourceRequest, ResourceType};

/// Identifier of a working mode, unique within its owner.
pub type AwmId = u32;

/// Reference under which a staged binding is stored.
pub type BindingReference = u32;

/// Concrete per-node amounts produced by booking a bound request set.
///
/// The assignment is what the platform adapter maps onto the OS: exact
/// leaf paths with the amount charged on each.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Assignment {
    entries: Vec<(ResourcePath, u64)>,
}

impl Assignment {
    /// Creates an assignment from per-node amounts.
    pub fn new(entries: Vec<(ResourcePath, u64)>) -> Self {
        Self { entries }
    }

    /// The per-node amounts.
    pub fn entries(&self) -> &[(ResourcePath, u64)] {
        &self.entries
    }

    /// Whether the assignment charges anything at all.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The amount charged on one exact path.
    pub fn amount_on(&self, path: &ResourcePath) -> u64 {
        self.entries
            .iter()
            .filter(|(p, _)| p == path)
            .map(|(_, amount)| *amount)
            .sum()
    }

    /// The concrete ids of the given type appearing in the assignment.
    pub fn ids_of(&self, rtype: ResourceType) -> BTreeSet<u32> {
        self.entries
            .iter()
            .filter_map(|(p, _)| p.concrete_id_of(rtype))
            .collect()
    }

    /// Sum of all charged amounts.
    pub fn total(&self) -> u64 {
        self.entries.iter().map(|(_, amount)| amount).sum()
    }
}

/// A restriction of open path levels to concrete resource id sets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Binding {
    masks: BTreeMap<ResourceType, BTreeSet<u32>>,
}

impl Binding {
    /// Creates an empty (unrestricted) binding.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts a resource type to the given concrete ids.
    pub fn bind(&mut self, rtype: ResourceType, ids: impl IntoIterator<Item = u32>) -> &mut Self {
        self.masks.insert(rtype, ids.into_iter().collect());
        self
    }

    /// The id set a type is restricted to, if restricted.
    pub fn ids_of(&self, rtype: ResourceType) -> Option<&BTreeSet<u32>> {
        self.masks.get(&rtype)
    }

    /// Whether no restriction is in place.
    pub fn is_empty(&self) -> bool {
        self.masks.is_empty()
    }

    /// Whether an exact path satisfies every restriction.
    ///
    /// A restriction on a type the path does not mention is vacuously
    /// satisfied.
    pub fn allows(&self, path: &ResourcePath) -> bool {
        self.masks.iter().all(|(rtype, mask)| {
            path.concrete_id_of(*rtype)
                .map(|id| mask.contains(&id))
                .unwrap_or(true)
        })
    }
}

impl fmt::Display for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (rtype, mask) in &self.masks {
            if !first {
                f.write_str(" ")?;
            }
            first = false;
            write!(f, "{}:{:?}", rtype, mask)?;
        }
        Ok(())
    }
}

/// A named alternative resource configuration.
#[derive(Debug, Clone)]
pub struct WorkingMode {
    id: AwmId,
    name: String,
    /// Policy-facing value of this configuration (higher is better)
    value: f32,
    requests: Vec<ResourceRequest>,
    /// Staged bindings keyed by reference
    bindings: BTreeMap<BindingReference, Binding>,
    /// The committed binding, if any
    active_binding: Option<BindingReference>,
    /// How many times this mode has been scheduled to Running
    schedule_count: u64,
}

impl WorkingMode {
    /// Creates a working mode.
    ///
    /// # Errors
    /// Returns `InvalidConfiguration` when the value is negative or not
    /// finite, or when the request list is empty.
    pub fn new(
        id: AwmId,
        name: impl Into<String>,
        value: f32,
        requests: Vec<ResourceRequest>,
    ) -> Result<Self, ArbiterError> {
        if !value.is_finite() || value < 0.0 {
            return Err(ArbiterError::InvalidConfiguration(format!(
                "working mode {}: value must be a finite non-negative number",
                id
            )));
        }
        if requests.is_empty() {
            return Err(ArbiterError::InvalidConfiguration(format!(
                "working mode {}: no resource requests",
                id
            )));
        }
        Ok(Self {
            id,
            name: name.into(),
            value,
            requests,
            bindings: BTreeMap::new(),
            active_binding: None,
            schedule_count: 0,
        })
    }

    pub fn id(&self) -> AwmId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> f32 {
        self.value
    }

    pub fn requests(&self) -> &[ResourceRequest] {
        &self.requests
    }

    /// Stages a binding under a reference, replacing any previous one.
    pub fn add_binding(&mut self, reference: BindingReference, binding: Binding) {
        self.bindings.insert(reference, binding);
    }

    /// Commits the binding staged under `reference`.
    ///
    /// # Errors
    /// Returns `NotFound` when no binding was staged under the reference.
    pub fn set_binding(&mut self, reference: BindingReference) -> Result<(), ArbiterError> {
        if !self.bindings.contains_key(&reference) {
            return Err(ArbiterError::NotFound(format!(
                "working mode {}: no binding staged under reference {}",
                self.id, reference
            )));
        }
        self.active_binding = Some(reference);
        Ok(())
    }

    /// Drops every staged binding and the active selection.
    pub fn clear_bindings(&mut self) {
        self.bindings.clear();
        self.active_binding = None;
    }

    /// The committed binding, if any.
    pub fn binding(&self) -> Option<&Binding> {
        self.active_binding.and_then(|r| self.bindings.get(&r))
    }

    /// The binding staged under a reference, if any.
    pub fn staged_binding(&self, reference: BindingReference) -> Option<&Binding> {
        self.bindings.get(&reference)
    }

    /// The reference of the committed binding, if any.
    pub fn binding_reference(&self) -> Option<BindingReference> {
        self.active_binding
    }

    pub fn schedule_count(&self) -> u64 {
        self.schedule_count
    }

    /// Accounts one more scheduling of this mode.
    pub fn inc_schedule_count(&mut self) {
        self.schedule_count = self.schedule_count.saturating_add(1);
    }
}

/// Snapshot of a scheduled working mode attached to a schedulable.
///
/// The snapshot decouples the schedulable's `current`/`next` slots from
/// the owner's catalogue: promotion just moves the snapshot, while the
/// catalogue entry keeps the long-lived counters.
#[derive(Debug, Clone, PartialEq)]
pub struct AssignedMode {
    awm_id: AwmId,
    name: String,
    value: f32,
    requests: Vec<ResourceRequest>,
    binding: Binding,
    /// Concrete per-node amounts, filled once the request set is booked
    assignment: Assignment,
}

impl AssignedMode {
    /// Snapshots a working mode with an explicit binding.
    pub fn new(awm: &WorkingMode, binding: Binding) -> Self {
        Self {
            awm_id: awm.id(),
            name: awm.name().to_string(),
            value: awm.value(),
            requests: awm.requests().to_vec(),
            binding,
            assignment: Assignment::default(),
        }
    }

    /// Snapshots a working mode with its committed binding (empty when
    /// none was committed).
    pub fn from_committed(awm: &WorkingMode) -> Self {
        Self::new(awm, awm.binding().cloned().unwrap_or_default())
    }

    pub fn awm_id(&self) -> AwmId {
        self.awm_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> f32 {
        self.value
    }

    pub fn requests(&self) -> &[ResourceRequest] {
        &self.requests
    }

    pub fn binding(&self) -> &Binding {
        &self.binding
    }

    /// The booked per-node amounts (empty until booked).
    pub fn assignment(&self) -> &Assignment {
        &self.assignment
    }

    /// Records the booked per-node amounts.
    pub fn set_assignment(&mut self, assignment: Assignment) {
        self.assignment = assignment;
    }

    /// The CPUs this mode is pinned to: derived from the booked assignment
    /// when available, from the binding restriction otherwise.
    pub fn cpu_ids(&self) -> BTreeSet<u32> {
        if !self.assignment.is_empty() {
            return self.assignment.ids_of(ResourceType::Cpu);
        }
        self.binding
            .ids_of(ResourceType::Cpu)
            .cloned()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value_objects::FillPolicy;

    fn requests() -> Vec<ResourceRequest> {
        vec![ResourceRequest::new(
            "sys.cpu.pe".parse().unwrap(),
            200,
            FillPolicy::Balanced,
        )]
    }

    /// Tests working-mode validation rules.
    #[test]
    fn test_working_mode_validation() {
        assert!(WorkingMode::new(0, "base", 1.0, requests()).is_ok());
        assert!(WorkingMode::new(0, "neg", -1.0, requests()).is_err());
        assert!(WorkingMode::new(0, "nan", f32::NAN, requests()).is_err());
        assert!(WorkingMode::new(0, "empty", 1.0, vec![]).is_err());
    }

    /// Tests staging several bindings and committing one.
    #[test]
    fn test_binding_staging_and_commit() {
        let mut awm = WorkingMode::new(1, "fast", 0.8, requests()).unwrap();
        let mut on_cpu0 = Binding::new();
        on_cpu0.bind(ResourceType::Cpu, [0]);
        let mut on_cpu1 = Binding::new();
        on_cpu1.bind(ResourceType::Cpu, [1]);

        awm.add_binding(0, on_cpu0);
        awm.add_binding(1, on_cpu1.clone());
        assert!(awm.binding().is_none());

        awm.set_binding(1).unwrap();
        assert_eq!(awm.binding(), Some(&on_cpu1));
        assert_eq!(awm.binding_reference(), Some(1));

        assert!(awm.set_binding(7).is_err());
        // A failed commit keeps the previous selection
        assert_eq!(awm.binding_reference(), Some(1));
    }

    #[test]
    fn test_binding_path_filter() {
        let mut binding = Binding::new();
        binding.bind(ResourceType::Cpu, [0]);
        binding.bind(ResourceType::ProcessingElement, [0, 1]);

        let pe0: ResourcePath = "sys0.cpu0.pe0".parse().unwrap();
        let pe2: ResourcePath = "sys0.cpu0.pe2".parse().unwrap();
        let cpu1: ResourcePath = "sys0.cpu1.pe0".parse().unwrap();
        let mem: ResourcePath = "sys0.mem0".parse().unwrap();

        assert!(binding.allows(&pe0));
        assert!(!binding.allows(&pe2));
        assert!(!binding.allows(&cpu1));
        // Paths not mentioning a restricted type pass the filter
        assert!(binding.allows(&mem));
    }

    #[test]
    fn test_assignment_projections() {
        let assignment = Assignment::new(vec![
            ("sys0.cpu1.pe0".parse().unwrap(), 100),
            ("sys0.cpu1.pe1".parse().unwrap(), 50),
        ]);
        assert_eq!(assignment.total(), 150);
        assert_eq!(assignment.ids_of(ResourceType::Cpu), BTreeSet::from([1]));
        assert_eq!(
            assignment.ids_of(ResourceType::ProcessingElement),
            BTreeSet::from([0, 1])
        );
        assert_eq!(assignment.amount_on(&"sys0.cpu1.pe0".parse().unwrap()), 100);
    }

    #[test]
    fn test_assigned_mode_cpu_ids_prefer_assignment() {
        let mut awm = WorkingMode::new(2, "wide", 1.0, requests()).unwrap();
        let mut binding = Binding::new();
        binding.bind(ResourceType::Cpu, [0, 1]);
        awm.add_binding(0, binding.clone());
        awm.set_binding(0).unwrap();

        let mut assigned = AssignedMode::from_committed(&awm);
        assert_eq!(assigned.cpu_ids(), BTreeSet::from([0, 1]));

        // Once booked, the actually charged CPUs win over the restriction
        assigned.set_assignment(Assignment::new(vec![(
            "sys0.cpu1.pe0".parse().unwrap(),
            200,
        )]));
        assert_eq!(assigned.cpu_ids(), BTreeSet::from([1]));
    }
}
