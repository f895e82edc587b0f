//! Decider configuration, persisted as TOML.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{DecideError, DecideResult};
use crate::semantics::IndifferentSelection;

/// Default elaboration ceiling per phase.
pub const DEFAULT_MAX_ELABORATIONS: u32 = 100;

/// Configuration for a [`Decider`](crate::decide::Decider).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecideConfig {
    /// Elaboration steps allowed before the waterfall forces a phase change.
    #[serde(default = "default_max_elaborations")]
    pub max_elaborations: u32,
    /// How committed decisions pick among indifferent operators.
    #[serde(default)]
    pub indifferent_selection: IndifferentSelection,
    /// Seed for random indifferent selection.
    #[serde(default)]
    pub seed: u64,
    /// Verify the goal-stack invariant after every decision removal.
    #[serde(default = "default_check_invariants")]
    pub check_invariants: bool,
}

fn default_max_elaborations() -> u32 {
    DEFAULT_MAX_ELABORATIONS
}

fn default_check_invariants() -> bool {
    true
}

impl Default for DecideConfig {
    fn default() -> Self {
        Self {
            max_elaborations: DEFAULT_MAX_ELABORATIONS,
            indifferent_selection: IndifferentSelection::default(),
            seed: 0,
            check_invariants: true,
        }
    }
}

impl DecideConfig {
    /// Load from a TOML file.
    pub fn load(path: &Path) -> DecideResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| DecideError::ConfigRead {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_toml(&content).map_err(|e| match e {
            DecideError::ConfigParse { message, .. } => DecideError::ConfigParse {
                path: path.display().to_string(),
                message,
            },
            other => other,
        })
    }

    /// Parse from TOML text.
    pub fn from_toml(content: &str) -> DecideResult<Self> {
        toml::from_str(content).map_err(|e| DecideError::ConfigParse {
            path: "<inline>".into(),
            message: e.to_string(),
        })
    }

    pub fn to_toml(&self) -> DecideResult<String> {
        toml::to_string_pretty(self).map_err(|e| DecideError::ConfigParse {
            path: "<inline>".into(),
            message: e.to_string(),
        })
    }

    /// Save to a TOML file, creating parent directories.
    pub fn save(&self, path: &Path) -> DecideResult<()> {
        let content = self.to_toml()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| DecideError::ConfigWrite {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
        std::fs::write(path, content).map_err(|e| DecideError::ConfigWrite {
            path: path.display().to_string(),
            source: e,
        })
    }
}
