// /////////////////////////////////////////////////////////////////////////////
// Resource Arbiter RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Recipe Loader
//!
//! Loads working-mode catalogues from TOML recipes under
//! `<etc_dir>/recipes/<name>.toml`:
//!
//! ```toml
//! priority = 2
//!
//! [[awm]]
//! id = 0
//! name = "low"
//! value = 0.4
//!
//!   [[awm.request]]
//!   path = "sys.cpu.pe"
//!   amount = 100
//!   policy = "balanced"
//!
//! [[awm]]
//! id = 1
//! name = "high"
//! value = 1.0
//!
//!   [[awm.request]]
//!   path = "sys.cpu.pe"
//!   amount = 200
//!   policy = "balanced"
//! ```
//!
//! A missing or malformed recipe fails the registration that asked for
//! it; nothing is cached, so recipe edits apply to the next pairing.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use resource_arbiter_domain::{ArbiterError, Priority, ResourceRequest, WorkingMode};

/// One working-mode entry of a recipe file.
#[derive(Debug, Deserialize)]
struct AwmEntry {
    id: u32,
    name: String,
    value: f32,
    #[serde(rename = "request", default)]
    requests: Vec<ResourceRequest>,
}

/// The recipe file schema.
#[derive(Debug, Deserialize)]
struct RecipeFile {
    /// Priority granted to applications using this recipe (0 = highest)
    #[serde(default)]
    priority: Priority,
    #[serde(rename = "awm", default)]
    awms: Vec<AwmEntry>,
}

/// A loaded recipe: priority plus working-mode catalogue.
#[derive(Debug)]
pub struct Recipe {
    pub priority: Priority,
    pub awms: Vec<WorkingMode>,
}

/// Loads recipes from the configured directory.
pub struct RecipeLoader {
    recipe_dir: PathBuf,
}

impl RecipeLoader {
    pub fn new(recipe_dir: impl Into<PathBuf>) -> Self {
        Self {
            recipe_dir: recipe_dir.into(),
        }
    }

    /// The path a recipe name resolves to.
    pub fn path_of(&self, name: &str) -> PathBuf {
        self.recipe_dir.join(format!("{}.toml", name))
    }

    /// Loads and validates a recipe by name.
    ///
    /// # Errors
    /// - `NotFound` when the file does not exist
    /// - `SerializationError` when the TOML does not match the schema
    /// - domain validation errors for bad working modes
    pub fn load(&self, name: &str) -> Result<Recipe, ArbiterError> {
        let path = self.path_of(name);
        self.load_path(name, &path)
    }

    fn load_path(&self, name: &str, path: &Path) -> Result<Recipe, ArbiterError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ArbiterError::NotFound(format!("recipe '{}' ({})", name, path.display()))
            } else {
                ArbiterError::IoError(format!("recipe '{}': {}", name, e))
            }
        })?;
        let parsed: RecipeFile = toml::from_str(&raw)
            .map_err(|e| ArbiterError::SerializationError(format!("recipe '{}': {}", name, e)))?;
        if parsed.awms.is_empty() {
            return Err(ArbiterError::MissingAwm(format!(
                "recipe '{}' declares no working mode",
                name
            )));
        }

        let mut awms = Vec::with_capacity(parsed.awms.len());
        for entry in parsed.awms {
            let requests: Vec<ResourceRequest> = entry.requests;
            awms.push(WorkingMode::new(entry.id, entry.name, entry.value, requests)?);
        }
        debug!(recipe = name, modes = awms.len(), "Recipe loaded");
        Ok(Recipe {
            priority: parsed.priority,
            awms,
        })
    }
}
