//! Compile database command

use std::path::PathBuf;

use clap::Args;

use kiln_manifest::{compile_commands, write_compile_db};

use crate::cli::output;
use crate::cli::{Cli, OutputFormat};
use crate::exit_codes;

/// Write compile_commands.json
#[derive(Debug, Default, Args)]
pub struct CompileDbCommand {
    /// Output file or directory (default: next to the declaration file)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl CompileDbCommand {
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<i32> {
        let project = cli.load_project()?;
        let book = project.manifest.recipes(&project.root);
        let output_path = self.output.clone().unwrap_or_else(|| project.root.clone());

        let written = write_compile_db(&book, &output_path)?;
        let entries = compile_commands(&book).len();

        if cli.format == OutputFormat::Json {
            let summary = serde_json::json!({
                "path": written.display().to_string(),
                "entries": entries,
            });
            println!("{}", serde_json::to_string_pretty(&summary)?);
        } else if !cli.quiet {
            output::success(&format!(
                "Wrote {} to {}",
                output::plural(entries, "compile command"),
                output::path_style().apply_to(written.display())
            ));
        }

        Ok(exit_codes::SUCCESS)
    }
}
