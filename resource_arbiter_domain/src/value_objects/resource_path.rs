// /////////////////////////////////////////////////////////////////////////////
// Resource Arbiter RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Resource Path
//!
//! A resource path is the reference object for resource descriptors: a
//! namespace-like chain of `(type, id)` levels addressing one node of the
//! resource tree, or — when identifiers are left open — a whole family of
//! nodes.
//!
//! ## Overview
//!
//! For the path string `sys0.cpu1.pe2` this module builds three levels:
//! type `System` id 0, type `Cpu` id 1, type `ProcessingElement` id 2.
//! Leaving an identifier out (`sys.cpu.pe`) opens that level to any
//! concrete id, which is how queries and recipe requests address "all
//! processing elements of any CPU".
//!
//! ## Classification
//!
//! - **Exact**: every level carries a concrete id (`sys0.cpu1.pe2`).
//!   Exact paths address at most one tree node.
//! - **Template**: no level carries a concrete id (`sys.cpu.pe`).
//! - **Mixed**: anything in between (`sys0.cpu.pe`).
//!
//! Paths are totally ordered lexicographically on their levels, which
//! gives the resource tree a stable walking order.
//!
//! ## Examples
//!
//! ```
//! use resource_arbiter_domain::value_objects::{ResourcePath, ResourceType};
//!
//! let exact: ResourcePath = "sys0.cpu1.pe2".parse().unwrap();
//! assert!(exact.is_exact());
//! assert_eq!(exact.concrete_id_of(ResourceType::Cpu), Some(1));
//!
//! let template: ResourcePath = "sys.cpu.pe".parse().unwrap();
//! assert!(template.is_template());
//! assert!(template.matches(&exact));
//! ```

use std::fmt;
use std::str::FromStr;

use serde::de::Error as SerdeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ArbiterError;
use crate::value_objects::resource_type::ResourceType;

/// Maximum number of levels a resource path may carry.
pub const MAX_PATH_LEVELS: usize = 10;

/// The identifier of one path level: a concrete index, the open `Any`
/// marker used by templates, or `None` for an unassigned binding slot.
///
/// Ordering puts `None` before `Any` before concrete indexes, so template
/// paths sort ahead of the exact paths they cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResourceId {
    /// Unassigned slot (shown as `-`)
    None,
    /// Matches any concrete id (shown by omitting the index)
    Any,
    /// A concrete index
    Index(u32),
}

impl ResourceId {
    /// Whether this id is a concrete index.
    pub fn is_concrete(&self) -> bool {
        matches!(self, ResourceId::Index(_))
    }

    /// Returns the concrete index, if any.
    pub fn index(&self) -> Option<u32> {
        match self {
            ResourceId::Index(id) => Some(*id),
            _ => None,
        }
    }

    /// Whether this id accepts the given concrete id.
    pub fn accepts(&self, other: ResourceId) -> bool {
        match self {
            ResourceId::Any => true,
            _ => *self == other,
        }
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceId::None => f.write_str("-"),
            ResourceId::Any => Ok(()),
            ResourceId::Index(id) => write!(f, "{}", id),
        }
    }
}

/// One level of a resource path: a resource type plus an identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PathSegment {
    rtype: ResourceType,
    id: ResourceId,
}

impl PathSegment {
    /// Creates a new path level.
    pub fn new(rtype: ResourceType, id: ResourceId) -> Self {
        Self { rtype, id }
    }

    /// The resource type of this level.
    pub fn rtype(&self) -> ResourceType {
        self.rtype
    }

    /// The identifier of this level.
    pub fn id(&self) -> ResourceId {
        self.id
    }

    /// Whether this level accepts the other level under template matching.
    fn accepts(&self, other: &PathSegment) -> bool {
        self.rtype == other.rtype && self.id.accepts(other.id)
    }
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.rtype, self.id)
    }
}

/// A validated chain of path levels addressing resources in the tree.
///
/// Construction enforces the path grammar: at least one level, at most
/// [`MAX_PATH_LEVELS`], known types only, and no type repeated along the
/// chain. Instances are immutable; the narrowing helpers return new paths.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourcePath {
    segments: Vec<PathSegment>,
}

impl ResourcePath {
    /// Creates a path from pre-built levels.
    ///
    /// # Errors
    /// Returns `InvalidPath` when the chain is empty, too deep, or repeats
    /// a resource type.
    pub fn new(segments: Vec<PathSegment>) -> Result<Self, ArbiterError> {
        if segments.is_empty() {
            return Err(ArbiterError::InvalidPath("empty resource path".into()));
        }
        if segments.len() > MAX_PATH_LEVELS {
            return Err(ArbiterError::InvalidPath(format!(
                "path exceeds {} levels",
                MAX_PATH_LEVELS
            )));
        }
        for (pos, seg) in segments.iter().enumerate() {
            if segments[..pos].iter().any(|s| s.rtype() == seg.rtype()) {
                return Err(ArbiterError::InvalidPath(format!(
                    "type '{}' used twice in path",
                    seg.rtype()
                )));
            }
        }
        Ok(Self { segments })
    }

    /// Appends a level, returning the extended path.
    pub fn append(&self, rtype: ResourceType, id: ResourceId) -> Result<Self, ArbiterError> {
        let mut segments = self.segments.clone();
        segments.push(PathSegment::new(rtype, id));
        Self::new(segments)
    }

    /// The levels of this path.
    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    /// Number of levels.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Always false: a path carries at least one level.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// The type of the last (deepest) level.
    pub fn last_type(&self) -> ResourceType {
        // Invariant: segments is non-empty after construction
        self.segments[self.segments.len() - 1].rtype()
    }

    /// The id of the last (deepest) level.
    pub fn last_id(&self) -> ResourceId {
        self.segments[self.segments.len() - 1].id()
    }

    /// True when every level carries a concrete id.
    pub fn is_exact(&self) -> bool {
        self.segments.iter().all(|s| s.id().is_concrete())
    }

    /// True when no level carries a concrete id.
    pub fn is_template(&self) -> bool {
        self.segments.iter().all(|s| !s.id().is_concrete())
    }

    /// The id found at the level of the given type, if present.
    pub fn id_of(&self, rtype: ResourceType) -> Option<ResourceId> {
        self.segments
            .iter()
            .find(|s| s.rtype() == rtype)
            .map(|s| s.id())
    }

    /// The concrete id found at the level of the given type, if present.
    pub fn concrete_id_of(&self, rtype: ResourceType) -> Option<u32> {
        self.id_of(rtype).and_then(|id| id.index())
    }

    /// Returns a copy with the id of the given type replaced.
    ///
    /// Paths without a level of that type are returned unchanged; binding
    /// a type a request never mentions is a no-op by contract.
    pub fn with_id(&self, rtype: ResourceType, id: ResourceId) -> Self {
        let segments = self
            .segments
            .iter()
            .map(|s| {
                if s.rtype() == rtype {
                    PathSegment::new(rtype, id)
                } else {
                    *s
                }
            })
            .collect();
        Self { segments }
    }

    /// The parent path (all levels but the last), if any.
    pub fn parent(&self) -> Option<Self> {
        if self.segments.len() < 2 {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// Whether `prefix` is an ancestor-or-self of this path
    /// (segment-by-segment equality on the prefix).
    pub fn starts_with(&self, prefix: &ResourcePath) -> bool {
        prefix.segments.len() <= self.segments.len()
            && prefix
                .segments
                .iter()
                .zip(self.segments.iter())
                .all(|(p, s)| p == s)
    }

    /// Template matching against an exact path of the same depth.
    ///
    /// Each level must agree on the type, and open ids accept any concrete
    /// id at that level.
    pub fn matches(&self, exact: &ResourcePath) -> bool {
        self.segments.len() == exact.segments.len()
            && self
                .segments
                .iter()
                .zip(exact.segments.iter())
                .all(|(t, e)| t.accepts(e))
    }

    /// Prefix-template matching: this path, treated as a template, accepts
    /// the leading levels of `other`. Used for aggregate queries that sum
    /// over all leaves reachable under the matching prefix.
    pub fn prefix_matches(&self, other: &ResourcePath) -> bool {
        self.segments.len() <= other.segments.len()
            && self
                .segments
                .iter()
                .zip(other.segments.iter())
                .all(|(t, o)| t.accepts(o))
    }
}

impl fmt::Display for ResourcePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (pos, seg) in self.segments.iter().enumerate() {
            if pos > 0 {
                f.write_str(".")?;
            }
            write!(f, "{}", seg)?;
        }
        Ok(())
    }
}

impl FromStr for ResourcePath {
    type Err = ArbiterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ArbiterError::InvalidPath("empty resource path".into()));
        }
        let mut segments = Vec::new();
        for level in s.split('.') {
            let type_len = level.chars().take_while(|c| c.is_ascii_alphabetic()).count();
            if type_len == 0 {
                return Err(ArbiterError::InvalidPath(format!(
                    "'{}': level '{}' has no type",
                    s, level
                )));
            }
            let rtype: ResourceType = level[..type_len].parse()?;
            let id_str = &level[type_len..];
            let id = if id_str.is_empty() {
                ResourceId::Any
            } else {
                let index: u32 = id_str.parse().map_err(|_| {
                    ArbiterError::InvalidPath(format!("'{}': bad id '{}'", s, id_str))
                })?;
                ResourceId::Index(index)
            };
            segments.push(PathSegment::new(rtype, id));
        }
        Self::new(segments)
    }
}

impl Serialize for ResourcePath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ResourcePath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Tests parsing of an exact three-level path.
    ///
    /// Verifies type and id extraction for every level and the exact
    /// classification.
    #[test]
    fn test_parse_exact_path() {
        let path: ResourcePath = "sys0.cpu1.pe2".parse().unwrap();
        assert_eq!(path.len(), 3);
        assert!(path.is_exact());
        assert!(!path.is_template());
        assert_eq!(path.concrete_id_of(ResourceType::System), Some(0));
        assert_eq!(path.concrete_id_of(ResourceType::Cpu), Some(1));
        assert_eq!(path.concrete_id_of(ResourceType::ProcessingElement), Some(2));
        assert_eq!(path.to_string(), "sys0.cpu1.pe2");
    }

    /// Tests parsing of a template path (no ids anywhere).
    #[test]
    fn test_parse_template_path() {
        let path: ResourcePath = "sys.cpu.pe".parse().unwrap();
        assert!(path.is_template());
        assert!(!path.is_exact());
        assert_eq!(path.id_of(ResourceType::Cpu), Some(ResourceId::Any));
        assert_eq!(path.to_string(), "sys.cpu.pe");
    }

    /// Tests that a mixed path is neither exact nor template.
    #[test]
    fn test_mixed_path_classification() {
        let path: ResourcePath = "sys0.cpu.pe".parse().unwrap();
        assert!(!path.is_exact());
        assert!(!path.is_template());
    }

    #[test]
    fn test_parse_rejects_malformed_paths() {
        assert!("".parse::<ResourcePath>().is_err());
        assert!("sys0..pe1".parse::<ResourcePath>().is_err());
        assert!("sys0.fpga1".parse::<ResourcePath>().is_err());
        assert!("sys0.cpu1x".parse::<ResourcePath>().is_err());
        // A type may appear only once along a path
        assert!("sys0.cpu0.cpu1".parse::<ResourcePath>().is_err());
        assert!("0cpu".parse::<ResourcePath>().is_err());
    }

    /// Tests template matching against exact paths.
    ///
    /// A template accepts any concrete id at its open levels, but never
    /// matches a path of different depth or diverging types.
    #[test]
    fn test_template_matching() {
        let template: ResourcePath = "sys.cpu.pe".parse().unwrap();
        let mixed: ResourcePath = "sys0.cpu.pe".parse().unwrap();
        let a: ResourcePath = "sys0.cpu0.pe3".parse().unwrap();
        let b: ResourcePath = "sys0.cpu1.pe0".parse().unwrap();
        let short: ResourcePath = "sys0.cpu0".parse().unwrap();
        let mem: ResourcePath = "sys0.cpu0.mem0".parse().unwrap();

        assert!(template.matches(&a));
        assert!(template.matches(&b));
        assert!(mixed.matches(&a));
        assert!(!template.matches(&short));
        assert!(!template.matches(&mem));
    }

    #[test]
    fn test_prefix_matching() {
        let prefix: ResourcePath = "sys0.cpu0".parse().unwrap();
        let open_prefix: ResourcePath = "sys0.cpu".parse().unwrap();
        let leaf: ResourcePath = "sys0.cpu0.pe1".parse().unwrap();
        let other_cpu: ResourcePath = "sys0.cpu1.pe0".parse().unwrap();

        assert!(prefix.prefix_matches(&leaf));
        assert!(!prefix.prefix_matches(&other_cpu));
        assert!(open_prefix.prefix_matches(&leaf));
        assert!(open_prefix.prefix_matches(&other_cpu));
    }

    #[test]
    fn test_parent_and_starts_with() {
        let path: ResourcePath = "sys0.cpu1.pe2".parse().unwrap();
        let parent = path.parent().unwrap();
        assert_eq!(parent.to_string(), "sys0.cpu1");
        assert!(path.starts_with(&parent));
        assert!(!parent.starts_with(&path));
        assert!(parent.parent().unwrap().parent().is_none());
    }

    /// Tests that paths order lexicographically on their levels, putting
    /// sibling resources in index order.
    #[test]
    fn test_lexicographic_ordering() {
        let pe0: ResourcePath = "sys0.cpu0.pe0".parse().unwrap();
        let pe1: ResourcePath = "sys0.cpu0.pe1".parse().unwrap();
        let cpu1: ResourcePath = "sys0.cpu1.pe0".parse().unwrap();
        assert!(pe0 < pe1);
        assert!(pe1 < cpu1);
    }

    #[test]
    fn test_with_id_narrowing() {
        let template: ResourcePath = "sys0.cpu.pe".parse().unwrap();
        let narrowed = template.with_id(ResourceType::Cpu, ResourceId::Index(1));
        assert_eq!(narrowed.to_string(), "sys0.cpu1.pe");
        // Narrowing a type the path does not mention is a no-op
        let same = template.with_id(ResourceType::Gpu, ResourceId::Index(0));
        assert_eq!(same, template);
    }

    #[test]
    fn test_serde_round_trip() {
        let path: ResourcePath = "sys0.acc0.pe3".parse().unwrap();
        let json = serde_json::to_string(&path).unwrap();
        assert_eq!(json, "\"sys0.acc0.pe3\"");
        let back: ResourcePath = serde_json::from_str(&json).unwrap();
        assert_eq!(back, path);
    }
}
