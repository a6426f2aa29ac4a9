//! kiln manifest - declaration front-end for the kiln build engine
//!
//! This crate loads `kiln.toml` / `kiln.yaml` declaration files, turns
//! them into engine declarations, and provides the recipe runners and the
//! compile database writer.

pub mod compile_db;
pub mod config;
pub mod error;
pub mod recipe;

pub use compile_db::{compile_commands, write_compile_db, CompileCommand};
pub use config::{
    find_manifest, load_manifest, load_manifest_from_dir, manifest_root, Manifest, Settings,
    TargetConfig,
};
pub use error::{ConfigError, KilnError, ManifestError, Result};
pub use recipe::{DryRunRunner, Recipe, RecipeBook, RecipeKind, RecipeRunner};
