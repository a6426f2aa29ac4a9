//! `compile_commands.json` generation for C/C++ language servers

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::COMPILE_DB_FILE;
use crate::error::{ManifestError, Result};
use crate::recipe::RecipeBook;

/// File extensions treated as translation units
pub const TU_EXTENSIONS: &[&str] = &[".c", ".cpp", ".cc", ".cxx", ".i", ".ii"];

/// One compilation database entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileCommand {
    /// Working directory of the compilation
    pub directory: String,
    /// Full argument vector
    pub arguments: Vec<String>,
    /// Translation unit being compiled
    pub file: String,
}

/// Whether an argument names a translation unit
pub fn is_translation_unit(arg: &str) -> bool {
    TU_EXTENSIONS.iter().any(|ext| arg.ends_with(*ext))
}

/// Entries for every recipe argument that names a translation unit, in
/// declaration order
pub fn compile_commands(book: &RecipeBook) -> Vec<CompileCommand> {
    let mut entries = Vec::new();
    for (key, recipe) in book.iter() {
        let arguments = recipe.arguments();
        for arg in arguments.iter().filter(|a| is_translation_unit(a)) {
            debug!(target_id = key, file = %arg, "compile command");
            entries.push(CompileCommand {
                directory: recipe.cwd.display().to_string(),
                arguments: arguments.clone(),
                file: arg.clone(),
            });
        }
    }
    entries
}

/// Write the compilation database as pretty JSON.
///
/// When `output` is a directory the file is named `compile_commands.json`
/// inside it. Returns the path written.
pub fn write_compile_db(book: &RecipeBook, output: &Path) -> Result<PathBuf> {
    let path = if output.is_dir() {
        output.join(COMPILE_DB_FILE)
    } else {
        output.to_path_buf()
    };

    let entries = compile_commands(book);
    let json = serde_json::to_string_pretty(&entries)?;
    std::fs::write(&path, json).map_err(|source| ManifestError::CompileDb {
        path: path.clone(),
        source,
    })?;

    info!(path = %path.display(), entries = entries.len(), "compile commands written");
    Ok(path)
}
