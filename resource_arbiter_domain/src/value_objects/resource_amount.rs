// /////////////////////////////////////////////////////////////////////////////
// Resource Arbiter RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Resource Amount
//!
//! Declared-unit handling for resource registration. Platform descriptions
//! declare capacities in human units (`Gb` of memory, `MHz` of clock); the
//! accounting kernel works on plain integers in a canonical internal unit
//! per unit family:
//!
//! | Family     | Declared units     | Internal unit |
//! |------------|--------------------|---------------|
//! | Count      | `1` (or empty)     | 1             |
//! | Memory     | `Kb`, `Mb`, `Gb`   | bytes         |
//! | Frequency  | `KHz`, `MHz`, `GHz`| KHz           |
//!
//! Conversions use saturating arithmetic: a declared capacity can never
//! wrap, only clamp to the maximum representable amount.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ArbiterError;

/// A declared capacity unit from the fixed conversion table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeclaredUnit {
    /// Plain count (processing-element quota, device count)
    Count,
    /// Kibibytes
    Kb,
    /// Mebibytes
    Mb,
    /// Gibibytes
    Gb,
    /// Kilohertz
    KHz,
    /// Megahertz
    MHz,
    /// Gigahertz
    GHz,
}

impl DeclaredUnit {
    /// Multiplier into the internal unit of the family.
    pub fn multiplier(&self) -> u64 {
        match self {
            DeclaredUnit::Count => 1,
            DeclaredUnit::Kb => 1024,
            DeclaredUnit::Mb => 1024 * 1024,
            DeclaredUnit::Gb => 1024 * 1024 * 1024,
            DeclaredUnit::KHz => 1,
            DeclaredUnit::MHz => 1_000,
            DeclaredUnit::GHz => 1_000_000,
        }
    }

    /// Converts a declared amount into internal units, clamping on overflow.
    pub fn to_internal(&self, amount: u64) -> u64 {
        amount.saturating_mul(self.multiplier())
    }

    /// The canonical string form accepted in platform layouts.
    pub fn as_str(&self) -> &'static str {
        match self {
            DeclaredUnit::Count => "1",
            DeclaredUnit::Kb => "Kb",
            DeclaredUnit::Mb => "Mb",
            DeclaredUnit::Gb => "Gb",
            DeclaredUnit::KHz => "KHz",
            DeclaredUnit::MHz => "MHz",
            DeclaredUnit::GHz => "GHz",
        }
    }
}

impl fmt::Display for DeclaredUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeclaredUnit {
    type Err = ArbiterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "1" => Ok(DeclaredUnit::Count),
            "Kb" => Ok(DeclaredUnit::Kb),
            "Mb" => Ok(DeclaredUnit::Mb),
            "Gb" => Ok(DeclaredUnit::Gb),
            "KHz" => Ok(DeclaredUnit::KHz),
            "MHz" => Ok(DeclaredUnit::MHz),
            "GHz" => Ok(DeclaredUnit::GHz),
            other => Err(ArbiterError::InvalidConfiguration(format!(
                "unknown capacity unit '{}'",
                other
            ))),
        }
    }
}
