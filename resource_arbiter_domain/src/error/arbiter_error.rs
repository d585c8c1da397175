// /////////////////////////////////////////////////////////////////////////////
// Resource Arbiter RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Domain Error System
//!
//! This module provides the hierarchical error system for the resource
//! arbiter domain. It categorizes the failure modes of resource accounting,
//! workload management, scheduling and synchronisation, and provides
//! actionable error messages for both automated handling and diagnostics.
//!
//! ## Error Architecture
//!
//! Errors are grouped by the subsystem that raises them:
//!
//! - **Resource identifiers**: `InvalidPath`, `NotFound`, `AlreadyExists`
//! - **Accounting**: `Overbooked`, `AlreadyHolds`, `MissingView`,
//!   `TokenExhausted`
//! - **Schedulables / workload managers**: `MissingAwm`,
//!   `AwmNotSchedulable`, `AppBlocking`, `AppDisabled`
//! - **Scheduler manager**: `PolicyMissing`, `PolicyFailed`, `PolicyDelayed`
//! - **Synchronisation manager**: `SyncInitFailed`, `SyncMiss`,
//!   `SyncPlatformFailed`, `SyncAborted`
//! - **Workload-agent channel**: `AgentTimeout`, `AgentWriteError`,
//!   `VersionMismatch`
//! - **Ambient**: `InvalidConfiguration`, `SerializationError`, `IoError`,
//!   `NotSupported`, `InternalError`
//!
//! ## Propagation Strategy
//!
//! Accounting errors are local to the call that raised them. The scheduler
//! and synchronisation managers convert errors into their own
//! `Failed`/`Aborted` outcomes at their boundary and log the cause. Agent
//! errors during a sync session disable the offending schedulable but keep
//! the session going; accounting errors during a sync session abort the
//! whole session.

use thiserror::Error;

/// Domain-specific errors for the resource arbiter.
///
/// Each variant includes a descriptive message and is designed to provide
/// clear information about what went wrong and potentially how to fix it.
///
/// ## Design Principles
///
/// - **Specific**: Each error type represents a specific failure mode
/// - **Actionable**: Error messages provide enough context for debugging
/// - **Categorized**: Errors are grouped by subsystem for systematic handling
/// - **Recoverable**: Some errors indicate retry-able conditions
#[derive(Error, Debug, Clone)]
pub enum ArbiterError {
    #[error("Invalid resource path: {0}")]
    InvalidPath(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Resource already exists: {0}")]
    AlreadyExists(String),

    #[error("Overbooked: {0}")]
    Overbooked(String),

    #[error("Schedulable already holds a request set: {0}")]
    AlreadyHolds(String),

    #[error("Missing resource state view: {0}")]
    MissingView(String),

    #[error("View token space exhausted: {0}")]
    TokenExhausted(String),

    #[error("Missing working mode: {0}")]
    MissingAwm(String),

    #[error("Working mode not schedulable: {0}")]
    AwmNotSchedulable(String),

    #[error("Application is blocking: {0}")]
    AppBlocking(String),

    #[error("Application is disabled: {0}")]
    AppDisabled(String),

    #[error("Scheduling policy missing: {0}")]
    PolicyMissing(String),

    #[error("Scheduling policy failed: {0}")]
    PolicyFailed(String),

    #[error("Scheduling policy delayed: {0}")]
    PolicyDelayed(String),

    #[error("Synchronisation session initialisation failed: {0}")]
    SyncInitFailed(String),

    #[error("Synchronisation point missed: {0}")]
    SyncMiss(String),

    #[error("Platform synchronisation failed: {0}")]
    SyncPlatformFailed(String),

    #[error("Synchronisation session aborted: {0}")]
    SyncAborted(String),

    #[error("Workload agent timed out: {0}")]
    AgentTimeout(String),

    #[error("Workload agent channel write failed: {0}")]
    AgentWriteError(String),

    #[error("Workload agent version mismatch: {0}")]
    VersionMismatch(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Not supported: {0}")]
    NotSupported(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl ArbiterError {
    /// Creates a new invalid-path error
    pub fn invalid_path(msg: impl Into<String>) -> Self {
        Self::InvalidPath(msg.into())
    }

    /// Creates a new not-found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Creates a new overbooking error
    pub fn overbooked(msg: impl Into<String>) -> Self {
        Self::Overbooked(msg.into())
    }

    /// Creates a new missing-view error
    pub fn missing_view(msg: impl Into<String>) -> Self {
        Self::MissingView(msg.into())
    }

    /// Creates a new configuration error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    /// Creates a new IO error
    pub fn io_error(msg: impl Into<String>) -> Self {
        Self::IoError(msg.into())
    }

    /// Creates a new internal error
    pub fn internal_error(msg: impl Into<String>) -> Self {
        Self::InternalError(msg.into())
    }

    /// Checks if the error is recoverable
    ///
    /// Recoverable errors indicate transient conditions: the same request
    /// may succeed on a later scheduling cycle without operator action.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ArbiterError::Overbooked(_)
                | ArbiterError::PolicyDelayed(_)
                | ArbiterError::AgentTimeout(_)
                | ArbiterError::SyncMiss(_)
                | ArbiterError::IoError(_)
        )
    }

    /// Checks if the error must abort an open synchronisation session
    ///
    /// Accounting failures during a sync session leave the speculative view
    /// in an undefined state and force a rollback to the system view.
    pub fn is_sync_fatal(&self) -> bool {
        matches!(
            self,
            ArbiterError::Overbooked(_)
                | ArbiterError::AlreadyHolds(_)
                | ArbiterError::MissingView(_)
                | ArbiterError::SyncInitFailed(_)
        )
    }

    /// Gets the error category
    pub fn category(&self) -> &'static str {
        match self {
            ArbiterError::InvalidPath(_) => "resource",
            ArbiterError::NotFound(_) => "resource",
            ArbiterError::AlreadyExists(_) => "resource",
            ArbiterError::Overbooked(_) => "accounting",
            ArbiterError::AlreadyHolds(_) => "accounting",
            ArbiterError::MissingView(_) => "accounting",
            ArbiterError::TokenExhausted(_) => "accounting",
            ArbiterError::MissingAwm(_) => "workload",
            ArbiterError::AwmNotSchedulable(_) => "workload",
            ArbiterError::AppBlocking(_) => "workload",
            ArbiterError::AppDisabled(_) => "workload",
            ArbiterError::PolicyMissing(_) => "scheduler",
            ArbiterError::PolicyFailed(_) => "scheduler",
            ArbiterError::PolicyDelayed(_) => "scheduler",
            ArbiterError::SyncInitFailed(_) => "sync",
            ArbiterError::SyncMiss(_) => "sync",
            ArbiterError::SyncPlatformFailed(_) => "sync",
            ArbiterError::SyncAborted(_) => "sync",
            ArbiterError::AgentTimeout(_) => "agent",
            ArbiterError::AgentWriteError(_) => "agent",
            ArbiterError::VersionMismatch(_) => "agent",
            ArbiterError::InvalidConfiguration(_) => "configuration",
            ArbiterError::SerializationError(_) => "serialization",
            ArbiterError::IoError(_) => "io",
            ArbiterError::NotSupported(_) => "platform",
            ArbiterError::InternalError(_) => "internal",
        }
    }
}

// Implement conversion from standard library errors
impl From<std::io::Error> for ArbiterError {
    fn from(err: std::io::Error) -> Self {
        ArbiterError::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for ArbiterError {
    fn from(err: serde_json::Error) -> Self {
        ArbiterError::SerializationError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_includes_context() {
        let err = ArbiterError::Overbooked("sys0.cpu0.pe1 request 150 avail 100".to_string());
        let msg = format!("{}", err);
        assert!(msg.contains("Overbooked"));
        assert!(msg.contains("sys0.cpu0.pe1"));
    }

    #[test]
    fn test_error_categories() {
        assert_eq!(ArbiterError::InvalidPath("x".into()).category(), "resource");
        assert_eq!(ArbiterError::Overbooked("x".into()).category(), "accounting");
        assert_eq!(ArbiterError::PolicyFailed("x".into()).category(), "scheduler");
        assert_eq!(ArbiterError::SyncMiss("x".into()).category(), "sync");
        assert_eq!(ArbiterError::AgentTimeout("x".into()).category(), "agent");
    }

    #[test]
    fn test_recoverable_classification() {
        assert!(ArbiterError::Overbooked("x".into()).is_recoverable());
        assert!(ArbiterError::AgentTimeout("x".into()).is_recoverable());
        assert!(!ArbiterError::InvalidPath("x".into()).is_recoverable());
        assert!(!ArbiterError::VersionMismatch("x".into()).is_recoverable());
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "no fifo");
        let err: ArbiterError = io.into();
        assert!(matches!(err, ArbiterError::IoError(_)));
    }
}
