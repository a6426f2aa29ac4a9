//! Declaration file types

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use kiln_engine::{Graph, Node, TargetId};

use crate::error::{ManifestError, Result};
use crate::recipe::RecipeBook;

use super::defaults::{DEFAULT_JOBS, DEFAULT_SHELL};

/// Root of a `kiln.toml` / `kiln.yaml` file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Session-wide settings
    #[serde(default)]
    pub settings: Settings,

    /// Declared targets, in declaration order
    #[serde(default, rename = "target")]
    pub targets: Vec<TargetConfig>,
}

/// `[settings]` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Default number of parallel recipes
    pub jobs: usize,

    /// Keep building independent targets after a failure
    pub keep_going: bool,

    /// Default goal; the first declared target when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,

    /// Interpreter for `shell` recipes, invoked as `<shell> -c <line>`
    pub shell: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            jobs: DEFAULT_JOBS,
            keep_going: false,
            default: None,
            shell: DEFAULT_SHELL.to_string(),
        }
    }
}

/// One `[[target]]` entry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetConfig {
    /// Target name: an artifact path relative to the manifest, or a goal
    pub name: String,

    /// Targets that must be up to date first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deps: Vec<String>,

    /// Further artifacts written by the same recipe; other targets may
    /// depend on any of them
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<String>,

    /// Virtual goal without an artifact
    #[serde(default)]
    pub phony: bool,

    /// Recipe as an argument vector
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<Vec<String>>,

    /// Recipe as a shell command line
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shell: Option<String>,

    /// Working directory for the recipe, relative to the manifest
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<PathBuf>,
}

impl TargetConfig {
    /// Whether the target has a recipe
    pub fn has_recipe(&self) -> bool {
        self.command.is_some() || self.shell.is_some()
    }

    /// Whether `name` is this target or one of its outputs
    pub fn provides(&self, name: &str) -> bool {
        self.name == name || self.outputs.iter().any(|o| o == name)
    }
}

impl Manifest {
    /// Engine declarations; each recipe is referenced by its target name
    pub fn to_declarations(&self) -> Vec<Node> {
        self.targets
            .iter()
            .map(|target| {
                let mut node = if target.phony {
                    Node::phony(target.name.as_str())
                } else {
                    Node::file(target.name.as_str())
                };
                for output in &target.outputs {
                    node = node.produces(output.as_str());
                }
                for dep in &target.deps {
                    node = node.depends_on(dep.as_str());
                }
                if target.has_recipe() {
                    node = node.with_action(target.name.as_str());
                }
                node
            })
            .collect()
    }

    /// Build and validate the dependency graph
    pub fn graph(&self) -> Result<Graph> {
        Ok(Graph::from_declarations(self.to_declarations())?)
    }

    /// Recipes keyed by target name, with working directories resolved
    /// against `base_dir`
    pub fn recipes(&self, base_dir: &Path) -> RecipeBook {
        RecipeBook::from_manifest(self, base_dir)
    }

    /// The configured default goal, or the first declared target
    pub fn default_goal(&self) -> Result<TargetId> {
        if let Some(default) = &self.settings.default {
            return Ok(TargetId::from(default.as_str()));
        }
        self.targets
            .first()
            .map(|t| TargetId::from(t.name.as_str()))
            .ok_or_else(|| ManifestError::NoTargets.into())
    }

    /// Look up the target declaring `name`, as its name or an output
    pub fn target(&self, name: &str) -> Option<&TargetConfig> {
        self.targets.iter().find(|t| t.provides(name))
    }
}
