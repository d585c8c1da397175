// /////////////////////////////////////////////////////////////////////////////
// Resource Arbiter RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Value Objects
//!
//! Immutable, self-validating values of the resource arbiter domain:
//! resource identifiers and paths, declared capacity units, resource
//! requests and the opaque view tokens of the accounting kernel.
//!
//! Value objects have no identity: two values with the same attributes are
//! interchangeable, and all operations are side-effect free.

pub mod resource_amount;
pub mod resource_path;
pub mod resource_request;
pub mod resource_type;
pub mod view_token;

pub use resource_amount::DeclaredUnit;
pub use resource_path::{PathSegment, ResourceId, ResourcePath, MAX_PATH_LEVELS};
pub use resource_request::{FillPolicy, ResourceRequest};
pub use resource_type::ResourceType;
pub use view_token::{ViewToken, MAX_TOKEN_PROBES, SYSTEM_VIEW};
