// /////////////////////////////////////////////////////////////////////////////
// Resource Arbiter RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Resource Node
//!
//! One node of the platform resource tree, addressed by an exact resource
//! path. A node carries its declared capacity, a reserved share withheld
//! from allocation, and the last power/thermal readings sampled through the
//! platform adapter.
//!
//! Per-view usage accounting does **not** live on the node: the accounter
//! keeps usage in its view arena, keyed by token, so nodes never hold
//! references back into workload state. Nodes are created at
//! platform-discovery time and live for the process lifetime; after
//! construction only the reserved share and the power profile change.

use chrono::{DateTime, Utc};

use crate::error::ArbiterError;
use crate::value_objects::{DeclaredUnit, ResourceId, ResourcePath, ResourceType};

/// Last observed power/thermal readings of a resource.
///
/// All quantities are optional: thin platform adapters answer
/// `NotSupported` for most of them and the corresponding field simply
/// stays empty.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PowerProfile {
    /// Load percentage, 0..100
    pub load: Option<f32>,
    /// Temperature in millidegree Celsius
    pub temperature: Option<u32>,
    /// Clock frequency in KHz
    pub clock_khz: Option<u32>,
    /// Power consumption in milliwatts
    pub power_mw: Option<u32>,
    /// Fan speed percentage, 0..100
    pub fan_speed: Option<u8>,
    /// When the profile was last refreshed
    pub sampled_at: Option<DateTime<Utc>>,
}

/// A named resource of the platform.
#[derive(Debug, Clone)]
pub struct ResourceNode {
    path: ResourcePath,
    /// Capacity in internal units
    total: u64,
    /// Share withheld from allocation, `reserved <= total`
    reserved: u64,
    /// Unit the capacity was declared in (kept for idempotent re-register)
    declared_unit: DeclaredUnit,
    /// Amount the capacity was declared as (kept for idempotent re-register)
    declared_amount: u64,
    /// Performance degradation percentage, 0..100
    degradation: u8,
    power: PowerProfile,
}

impl ResourceNode {
    /// Creates a node at an exact path with a declared capacity.
    ///
    /// # Errors
    /// Returns `InvalidPath` when the path carries open identifiers: tree
    /// nodes are always addressed exactly.
    pub fn new(
        path: ResourcePath,
        declared_unit: DeclaredUnit,
        declared_amount: u64,
    ) -> Result<Self, ArbiterError> {
        if !path.is_exact() {
            return Err(ArbiterError::InvalidPath(format!(
                "'{}': tree nodes require concrete ids at every level",
                path
            )));
        }
        Ok(Self {
            path,
            total: declared_unit.to_internal(declared_amount),
            reserved: 0,
            declared_unit,
            declared_amount,
            degradation: 0,
            power: PowerProfile::default(),
        })
    }

    /// The exact path addressing this node.
    pub fn path(&self) -> &ResourcePath {
        &self.path
    }

    /// The type of this node (deepest path level).
    pub fn rtype(&self) -> ResourceType {
        self.path.last_type()
    }

    /// The id of this node (deepest path level).
    pub fn id(&self) -> ResourceId {
        self.path.last_id()
    }

    /// Total capacity in internal units.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Reserved share in internal units.
    pub fn reserved(&self) -> u64 {
        self.reserved
    }

    /// Capacity available for allocation: `total - reserved`.
    pub fn capacity(&self) -> u64 {
        self.total - self.reserved
    }

    /// Whether a registration with these parameters is a duplicate of this
    /// node (same declared unit and amount).
    pub fn same_declaration(&self, unit: DeclaredUnit, amount: u64) -> bool {
        self.declared_unit == unit && self.declared_amount == amount
    }

    /// Withholds a share of the capacity from allocation.
    ///
    /// # Errors
    /// Returns `Overbooked` when the reservation exceeds the total.
    pub fn set_reserved(&mut self, reserved: u64) -> Result<(), ArbiterError> {
        if reserved > self.total {
            return Err(ArbiterError::Overbooked(format!(
                "{}: reserve {} exceeds total {}",
                self.path, reserved, self.total
            )));
        }
        self.reserved = reserved;
        Ok(())
    }

    /// Grows the total capacity (aggregate nodes accumulate the capacity
    /// of contributing children as they are registered).
    pub(crate) fn add_total(&mut self, amount: u64) {
        self.total = self.total.saturating_add(amount);
    }

    /// Performance degradation percentage, 0..100.
    pub fn degradation(&self) -> u8 {
        self.degradation
    }

    /// Updates the degradation estimate, clamped to 100.
    pub fn set_degradation(&mut self, degradation: u8) {
        self.degradation = degradation.min(100);
    }

    /// Last sampled power/thermal readings.
    pub fn power(&self) -> &PowerProfile {
        &self.power
    }

    /// Replaces the sampled power/thermal readings.
    pub fn update_power(&mut self, power: PowerProfile) {
        self.power = power;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(s: &str) -> ResourcePath {
        s.parse().unwrap()
    }

    /// Tests node creation with unit conversion into internal capacity.
    #[test]
    fn test_node_creation_converts_units() {
        let node = ResourceNode::new(path("sys0.mem0"), DeclaredUnit::Mb, 512).unwrap();
        assert_eq!(node.total(), 512 * 1024 * 1024);
        assert_eq!(node.reserved(), 0);
        assert_eq!(node.capacity(), node.total());
        assert_eq!(node.rtype(), ResourceType::Memory);
    }

    #[test]
    fn test_node_requires_exact_path() {
        let err = ResourceNode::new(path("sys0.cpu.pe1"), DeclaredUnit::Count, 100);
        assert!(matches!(err, Err(ArbiterError::InvalidPath(_))));
    }

    #[test]
    fn test_reservation_bounds() {
        let mut node = ResourceNode::new(path("sys0.cpu0.pe0"), DeclaredUnit::Count, 100).unwrap();
        node.set_reserved(30).unwrap();
        assert_eq!(node.capacity(), 70);
        assert!(node.set_reserved(101).is_err());
        // A failed reservation leaves the previous one in place
        assert_eq!(node.reserved(), 30);
    }

    #[test]
    fn test_duplicate_declaration_detection() {
        let node = ResourceNode::new(path("sys0.cpu0.pe0"), DeclaredUnit::Count, 100).unwrap();
        assert!(node.same_declaration(DeclaredUnit::Count, 100));
        assert!(!node.same_declaration(DeclaredUnit::Count, 200));
        assert!(!node.same_declaration(DeclaredUnit::Kb, 100));
    }

    #[test]
    fn test_degradation_clamped() {
        let mut node = ResourceNode::new(path("sys0.gpu0.pe0"), DeclaredUnit::Count, 100).unwrap();
        node.set_degradation(250);
        assert_eq!(node.degradation(), 100);
    }
}
