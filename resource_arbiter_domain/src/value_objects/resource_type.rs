// /////////////////////////////////////////////////////////////////////////////
// Resource Arbiter RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Resource Type
//!
//! The closed set of resource categories a platform can expose. Every level
//! of a [`ResourcePath`](crate::value_objects::ResourcePath) is tagged with
//! one of these types, and a type may appear at most once along a path.
//!
//! ## String Forms
//!
//! The textual forms are the ones accepted in paths, recipes and FIFO
//! commands: `sys`, `grp`, `node`, `cpu`, `gpu`, `acc`, `pe`, `mem`, `net`,
//! `io`, `custom`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ArbiterError;

/// The category of a resource tree level.
///
/// Aggregate types (`System`, `Group`, `Node`, `Cpu`, `Gpu`, `Accelerator`)
/// own children whose computing capacity they summarise: the total of an
/// aggregate node equals the sum of the totals of its contributing children.
/// Leaf-like types (`ProcessingElement`, `Memory`, `Network`, `Io`,
/// `Custom`) carry capacity of their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    System,
    Group,
    Node,
    Cpu,
    Gpu,
    Accelerator,
    ProcessingElement,
    Memory,
    Network,
    Io,
    Custom,
}

impl ResourceType {
    /// All resource types, in path ordering.
    pub const ALL: [ResourceType; 11] = [
        ResourceType::System,
        ResourceType::Group,
        ResourceType::Node,
        ResourceType::Cpu,
        ResourceType::Gpu,
        ResourceType::Accelerator,
        ResourceType::ProcessingElement,
        ResourceType::Memory,
        ResourceType::Network,
        ResourceType::Io,
        ResourceType::Custom,
    ];

    /// Returns the canonical string form used in resource paths.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::System => "sys",
            ResourceType::Group => "grp",
            ResourceType::Node => "node",
            ResourceType::Cpu => "cpu",
            ResourceType::Gpu => "gpu",
            ResourceType::Accelerator => "acc",
            ResourceType::ProcessingElement => "pe",
            ResourceType::Memory => "mem",
            ResourceType::Network => "net",
            ResourceType::Io => "io",
            ResourceType::Custom => "custom",
        }
    }

    /// Whether nodes of this type aggregate the capacity of their children.
    pub fn is_aggregate(&self) -> bool {
        matches!(
            self,
            ResourceType::System
                | ResourceType::Group
                | ResourceType::Node
                | ResourceType::Cpu
                | ResourceType::Gpu
                | ResourceType::Accelerator
        )
    }

    /// Whether capacity registered at this type propagates into aggregate
    /// ancestors. Memory, network and I/O capacity is expressed in its own
    /// unit and never summed into processing totals.
    pub fn contributes_to_aggregates(&self) -> bool {
        matches!(
            self,
            ResourceType::Group
                | ResourceType::Node
                | ResourceType::Cpu
                | ResourceType::Gpu
                | ResourceType::Accelerator
                | ResourceType::ProcessingElement
        )
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = ArbiterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sys" => Ok(ResourceType::System),
            "grp" => Ok(ResourceType::Group),
            "node" => Ok(ResourceType::Node),
            "cpu" => Ok(ResourceType::Cpu),
            "gpu" => Ok(ResourceType::Gpu),
            "acc" => Ok(ResourceType::Accelerator),
            "pe" => Ok(ResourceType::ProcessingElement),
            "mem" => Ok(ResourceType::Memory),
            "net" => Ok(ResourceType::Network),
            "io" => Ok(ResourceType::Io),
            "custom" => Ok(ResourceType::Custom),
            other => Err(ArbiterError::InvalidPath(format!(
                "unknown resource type '{}'",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Tests the round-trip between resource types and their string forms.
    #[test]
    fn test_resource_type_round_trip() {
        for rtype in ResourceType::ALL {
            let parsed: ResourceType = rtype.as_str().parse().unwrap();
            assert_eq!(parsed, rtype);
        }
    }

    #[test]
    fn test_unknown_type_rejected() {
        assert!("fpga".parse::<ResourceType>().is_err());
        assert!("".parse::<ResourceType>().is_err());
        // Types are case sensitive in paths
        assert!("CPU".parse::<ResourceType>().is_err());
    }

    #[test]
    fn test_aggregate_classification() {
        assert!(ResourceType::Cpu.is_aggregate());
        assert!(ResourceType::System.is_aggregate());
        assert!(!ResourceType::ProcessingElement.is_aggregate());
        assert!(!ResourceType::Memory.is_aggregate());
    }

    #[test]
    fn test_aggregation_contribution() {
        assert!(ResourceType::ProcessingElement.contributes_to_aggregates());
        assert!(ResourceType::Cpu.contributes_to_aggregates());
        assert!(!ResourceType::Memory.contributes_to_aggregates());
        assert!(!ResourceType::System.contributes_to_aggregates());
    }
}
