//! CLI definition and command handling

pub mod commands;
pub mod output;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};

use kiln_engine::TargetId;
use kiln_manifest::{load_manifest, load_manifest_from_dir, manifest_root, Manifest};

use commands::{BuildCommand, CompileDbCommand, ListCommand, PlanCommand};

/// kiln - incremental make-style build tool
#[derive(Debug, Parser)]
#[command(name = "kiln")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output format
    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Working directory
    #[arg(short = 'C', long, global = true)]
    pub directory: Option<PathBuf>,

    /// Declaration file (default: nearest kiln.toml / kiln.yaml)
    #[arg(short = 'f', long, global = true, env = "KILN_FILE")]
    pub file: Option<PathBuf>,

    /// Print debug logs to the console
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Output format for CLI
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output
    #[default]
    Text,
    /// JSON output
    Json,
}

/// Available commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Bring targets up to date (the default command)
    Build(BuildCommand),

    /// Show the execution order without running anything
    Plan(PlanCommand),

    /// List declared targets
    List(ListCommand),

    /// Write compile_commands.json for C/C++ tooling
    CompileDb(CompileDbCommand),
}

/// A loaded declaration file
#[derive(Debug)]
pub struct Project {
    pub manifest: Manifest,
    /// Path of the declaration file
    pub path: PathBuf,
    /// Directory target names are relative to
    pub root: PathBuf,
}

impl Project {
    /// Requested targets, or the default goal when none are given
    pub fn resolve_targets(&self, names: &[String]) -> anyhow::Result<Vec<TargetId>> {
        if names.is_empty() {
            return Ok(vec![self.manifest.default_goal()?]);
        }
        Ok(names.iter().map(|n| TargetId::from(n.as_str())).collect())
    }

    /// Every declared target, in declaration order
    pub fn all_targets(&self) -> Vec<TargetId> {
        self.manifest
            .targets
            .iter()
            .map(|t| TargetId::from(t.name.as_str()))
            .collect()
    }
}

impl Cli {
    /// Execute the CLI command, returning the process exit code
    pub fn execute(self) -> anyhow::Result<i32> {
        // Change to specified directory if provided
        if let Some(dir) = &self.directory {
            std::env::set_current_dir(dir)
                .with_context(|| format!("cannot enter directory {}", dir.display()))?;
        }

        match self.command {
            Some(Commands::Build(ref cmd)) => cmd.execute(&self),
            Some(Commands::Plan(ref cmd)) => cmd.execute(&self),
            Some(Commands::List(ref cmd)) => cmd.execute(&self),
            Some(Commands::CompileDb(ref cmd)) => cmd.execute(&self),
            None => BuildCommand::default().execute(&self),
        }
    }

    /// Load the declaration file named by `-f`, or the nearest one
    pub fn load_project(&self) -> anyhow::Result<Project> {
        let (manifest, path) = match &self.file {
            Some(path) => (load_manifest(path)?, path.clone()),
            None => {
                let cwd = std::env::current_dir()?;
                load_manifest_from_dir(&cwd)?
            }
        };
        let root = manifest_root(&path);
        tracing::debug!(path = %path.display(), root = %root.display(), "project loaded");
        Ok(Project {
            manifest,
            path,
            root,
        })
    }

    /// Whether human-readable progress should be printed
    pub fn prints_text(&self) -> bool {
        !self.quiet && self.format == OutputFormat::Text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_default_command() {
        let cli = Cli::try_parse_from(["kiln"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.format, OutputFormat::Text);
    }

    #[test]
    fn test_parse_global_flags() {
        let cli = Cli::try_parse_from(["kiln", "list", "-f", "other.toml", "--format", "json"])
            .unwrap();
        assert!(matches!(cli.command, Some(Commands::List(_))));
        assert_eq!(cli.file, Some(PathBuf::from("other.toml")));
        assert_eq!(cli.format, OutputFormat::Json);
        assert!(!cli.prints_text());
    }

    #[test]
    fn test_load_project_from_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("kiln.toml");
        std::fs::write(
            &path,
            "[[target]]\nname = \"all\"\nphony = true\n\n[[target]]\nname = \"x\"\n",
        )
        .unwrap();

        let cli = Cli::try_parse_from(["kiln", "-f", path.to_str().unwrap()]).unwrap();
        let project = cli.load_project().unwrap();

        assert_eq!(project.root, temp.path());
        assert_eq!(project.resolve_targets(&[]).unwrap(), vec![TargetId::from("all")]);
        assert_eq!(
            project.resolve_targets(&["x".to_string()]).unwrap(),
            vec![TargetId::from("x")]
        );
        assert_eq!(project.all_targets().len(), 2);
    }
}
