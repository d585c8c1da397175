// /////////////////////////////////////////////////////////////////////////////
// Resource Arbiter RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Resource Request
//!
//! A resource request asks for an amount of capacity under a (usually open)
//! resource path, together with the policy the binder must follow when it
//! spreads the amount across the matching tree leaves.
//!
//! Requests are the building blocks of working modes and of the fluid
//! scheduling requests attached to managed processes. They are plain data:
//! binding a request to concrete resources never mutates it.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::value_objects::resource_path::ResourcePath;

/// How the binder spreads a requested amount across candidate leaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FillPolicy {
    /// Fill one leaf to saturation before moving to the next.
    #[default]
    Sequential,
    /// Spread the amount in proportion to per-leaf availability.
    Balanced,
}

impl fmt::Display for FillPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FillPolicy::Sequential => f.write_str("sequential"),
            FillPolicy::Balanced => f.write_str("balanced"),
        }
    }
}

/// A request for `amount` internal units under `path`.
///
/// The path is typically a template or mixed path; the binder expands it
/// over the tree and the fill policy decides the per-leaf split.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRequest {
    /// Path template addressing the candidate leaves
    pub path: ResourcePath,
    /// Requested amount, in the internal unit of the addressed resource
    pub amount: u64,
    /// Spreading policy across matching leaves
    #[serde(default)]
    pub policy: FillPolicy,
}

impl ResourceRequest {
    /// Creates a new resource request.
    pub fn new(path: ResourcePath, amount: u64, policy: FillPolicy) -> Self {
        Self { path, amount, policy }
    }
}

impl fmt::Display for ResourceRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{} = {} ({})}}", self.path, self.amount, self.policy)
    }
}
