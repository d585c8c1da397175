// /////////////////////////////////////////////////////////////////////////////
// Resource Arbiter RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Exit Code Management
//!
//! Standardized Unix exit codes following BSD `sysexits.h` conventions,
//! used both by the daemon binary and as the reply codes of FIFO
//! commands.
//!
//! ## Exit Code Conventions
//!
//! - **0**: Success
//! - **1**: General error
//! - **64-78**: Specific error conditions (BSD sysexits.h)
//! - **128+N**: Fatal signal N (e.g., 130 = SIGINT)

use std::fmt;

/// Exit codes following Unix conventions (BSD sysexits.h)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(i32)]
pub enum ExitCode {
    /// Successful termination (0)
    #[default]
    Success = 0,

    /// General error (1)
    Error = 1,

    /// Command line usage error (64)
    /// - Invalid arguments
    /// - Missing required arguments
    UsageError = 64,

    /// Data format error (65)
    /// - Malformed configuration
    /// - Parse errors
    DataError = 65,

    /// Service unavailable (69)
    /// - Required worker not running
    /// - Platform adapter unreachable
    Unavailable = 69,

    /// Internal software error (70)
    /// - Broken invariant
    /// - Unexpected internal failure
    Software = 70,

    /// System error (71)
    /// - OS error
    /// - System call failed
    OsError = 71,

    /// Cannot create output (73)
    /// - Cannot create the command FIFO or socket
    CantCreate = 73,

    /// I/O error (74)
    IoError = 74,

    /// Remote error in protocol (76)
    /// - Workload-agent protocol violation
    /// - Version mismatch
    Protocol = 76,

    /// Permission denied (77)
    NoPerm = 77,

    /// Configuration error (78)
    Config = 78,
}

impl ExitCode {
    /// The numeric process exit code.
    pub fn as_i32(&self) -> i32 {
        *self as i32
    }

    /// Exit code for termination by signal `n` (128 + N convention).
    pub fn from_signal(signal: i32) -> i32 {
        128 + signal
    }
}

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExitCode::Success => "success",
            ExitCode::Error => "error",
            ExitCode::UsageError => "usage error",
            ExitCode::DataError => "data error",
            ExitCode::Unavailable => "unavailable",
            ExitCode::Software => "software error",
            ExitCode::OsError => "os error",
            ExitCode::CantCreate => "cannot create",
            ExitCode::IoError => "io error",
            ExitCode::Protocol => "protocol error",
            ExitCode::NoPerm => "permission denied",
            ExitCode::Config => "configuration error",
        };
        write!(f, "{} ({})", name, self.as_i32())
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code.as_i32()
    }
}
