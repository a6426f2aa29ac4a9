//! List command - show declared targets

use clap::Args;
use console::style;

use crate::cli::output;
use crate::cli::{Cli, OutputFormat};
use crate::exit_codes;

/// List declared targets
#[derive(Debug, Default, Args)]
pub struct ListCommand {}

impl ListCommand {
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<i32> {
        let project = cli.load_project()?;
        let manifest = &project.manifest;

        if cli.format == OutputFormat::Json {
            println!("{}", serde_json::to_string_pretty(&manifest.targets)?);
            return Ok(exit_codes::SUCCESS);
        }
        if cli.quiet {
            return Ok(exit_codes::SUCCESS);
        }

        let default = manifest.default_goal().ok();
        println!(
            "{} {}",
            output::header(&output::plural(manifest.targets.len(), "target")),
            output::path_style().apply_to(project.path.display())
        );
        for target in &manifest.targets {
            let mut line = format!("  {}", output::target_style().apply_to(&target.name));
            if !target.outputs.is_empty() {
                line.push_str(&format!(" {} {}", style("+").dim(), target.outputs.join(", ")));
            }
            if target.phony {
                line.push_str(&format!(" {}", style("[phony]").yellow()));
            }
            if default.as_ref().is_some_and(|d| d.as_str() == target.name) {
                line.push_str(&format!(" {}", style("[default]").green()));
            }
            if !target.has_recipe() {
                line.push_str(&format!(" {}", style("(no recipe)").dim()));
            }
            if !target.deps.is_empty() {
                line.push_str(&format!(" {} {}", style("<-").dim(), target.deps.join(", ")));
            }
            println!("{}", line);
        }

        Ok(exit_codes::SUCCESS)
    }
}
