//! Plan command - show the execution order

use clap::Args;

use kiln_engine::{plan, render_plan};

use crate::cli::output;
use crate::cli::{Cli, OutputFormat};
use crate::exit_codes;

/// Show the waves a build would run in
#[derive(Debug, Default, Args)]
pub struct PlanCommand {
    /// Targets to plan (default goal when omitted)
    pub targets: Vec<String>,
}

impl PlanCommand {
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<i32> {
        let project = cli.load_project()?;
        let graph = project.manifest.graph()?;
        let targets = project.resolve_targets(&self.targets)?;
        let plan = plan(&graph, &targets)?;

        if cli.format == OutputFormat::Json {
            println!("{}", serde_json::to_string_pretty(&plan)?);
        } else if !cli.quiet {
            println!(
                "{} {} in {}",
                output::header("Plan:"),
                output::plural(plan.len(), "target"),
                output::plural(plan.waves.len(), "wave")
            );
            print!("{}", render_plan(&graph, &plan));
        }

        Ok(exit_codes::SUCCESS)
    }
}
