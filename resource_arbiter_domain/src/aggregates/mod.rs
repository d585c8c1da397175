// /////////////////////////////////////////////////////////////////////////////
// Resource Arbiter RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Aggregates
//!
//! Consistency boundaries of the domain. The resource accounter is the
//! single aggregate: the resource tree and the view arena change together
//! or not at all.

pub mod resource_accounter;

pub use resource_accounter::{Holding, ResourceAccounter, ResourceStatus};
