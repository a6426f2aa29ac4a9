//! Build command - bring targets up to date

use std::future::Future;
use std::sync::Arc;

use anyhow::Context;
use clap::Args;
use console::style;
use tracing::{info, warn};

use kiln_engine::{
    ActionRunner, BuildEvent, BuildReporter, BuildSession, CancelToken, FailurePolicy, FsMetadata,
    HaltReason, Report, ReporterRegistry, SessionOptions,
};
use kiln_manifest::{DryRunRunner, RecipeRunner};

use crate::cli::output;
use crate::cli::{Cli, OutputFormat};
use crate::exit_codes;

/// Build targets
#[derive(Debug, Default, Args)]
pub struct BuildCommand {
    /// Targets to build (default goal when omitted)
    pub targets: Vec<String>,

    /// Number of recipes to run in parallel
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Keep building targets that do not depend on a failure
    #[arg(short, long)]
    pub keep_going: bool,

    /// Rebuild everything regardless of timestamps
    #[arg(short = 'B', long)]
    pub always_make: bool,

    /// Print the recipes that would run without running them
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Do not echo recipes and capture their output
    #[arg(short, long)]
    pub silent: bool,
}

impl BuildCommand {
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<i32> {
        let runtime = tokio::runtime::Runtime::new()?;
        runtime.block_on(self.execute_async(cli))
    }

    async fn execute_async(&self, cli: &Cli) -> anyhow::Result<i32> {
        let project = cli.load_project()?;
        let graph = project
            .manifest
            .graph()
            .with_context(|| format!("invalid declarations in {}", project.path.display()))?;

        let targets = if self.targets.is_empty() && self.always_make {
            project.all_targets()
        } else {
            project.resolve_targets(&self.targets)?
        };

        let mut silent = self.silent;
        if self.dry_run && silent {
            output::warning("Turning off --silent, since --dry-run was also provided");
            silent = false;
        }

        let options = self.session_options(&project.manifest.settings);
        info!(
            targets = targets.len(),
            jobs = options.max_parallelism,
            policy = ?options.policy,
            dry_run = self.dry_run,
            "starting build"
        );

        let book = project.manifest.recipes(&project.root);
        let runner: Arc<dyn ActionRunner> = if self.dry_run {
            Arc::new(DryRunRunner::new(book))
        } else {
            Arc::new(RecipeRunner::new(book).silent(silent))
        };

        let mut reporters = ReporterRegistry::new();
        if cli.prints_text() {
            reporters.register(ConsoleReporter::new(cli.verbose, silent, self.dry_run));
        }

        let session = BuildSession::new(runner, Arc::new(FsMetadata::new(&project.root)))
            .with_reporter(Arc::new(reporters));

        let cancel = session.cancel_token();
        let interrupt = tokio::spawn(async move {
            if watch_interrupts(tokio::signal::ctrl_c, cancel).await {
                warn!("second interrupt received, abandoning running recipes");
                std::process::exit(exit_codes::CANCELLED);
            }
        });
        let result = session.run(&graph, &targets, &options).await;
        interrupt.abort();
        let report = result?;

        if cli.format == OutputFormat::Json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else if cli.prints_text() {
            print_outcome(&report, &targets);
        }

        Ok(exit_code(&report))
    }

    fn session_options(&self, settings: &kiln_manifest::Settings) -> SessionOptions {
        let policy = if self.keep_going || settings.keep_going {
            FailurePolicy::BestEffort
        } else {
            FailurePolicy::FailFast
        };
        SessionOptions::default()
            .jobs(self.jobs.unwrap_or(settings.jobs))
            .policy(policy)
            .always_make(self.always_make)
    }
}

/// Cancel the session on the first interrupt. Resolves to `true` when a
/// second interrupt arrives while running recipes drain, `false` if the
/// signal cannot be watched.
async fn watch_interrupts<F, Fut>(mut interrupt: F, cancel: CancelToken) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::io::Result<()>>,
{
    if interrupt().await.is_err() {
        return false;
    }
    warn!("interrupt received, waiting for running recipes");
    cancel.cancel();
    interrupt().await.is_ok()
}

fn exit_code(report: &Report) -> i32 {
    if report.cancelled {
        exit_codes::CANCELLED
    } else if report.is_success() {
        exit_codes::SUCCESS
    } else {
        exit_codes::BUILD_FAILED
    }
}

fn print_outcome(report: &Report, targets: &[kiln_engine::TargetId]) {
    if report.is_success() && report.rebuilt.is_empty() {
        for target in targets {
            output::info(&format!("'{}' is up to date", target));
        }
    } else if !report.failures.is_empty() {
        eprintln!();
        eprintln!(
            "  {} {} failed:",
            style("✗").red().bold(),
            output::plural(report.failures.len(), "target")
        );
        for (id, reason) in &report.failures {
            eprintln!("    {} {}: {}", style("✗").red(), id, reason);
        }
    }
}

/// Console reporter echoing recipes as they start
struct ConsoleReporter {
    verbose: bool,
    silent: bool,
    dry_run: bool,
}

impl ConsoleReporter {
    fn new(verbose: bool, silent: bool, dry_run: bool) -> Self {
        Self {
            verbose,
            silent,
            dry_run,
        }
    }
}

impl BuildReporter for ConsoleReporter {
    fn report(&self, event: &BuildEvent) {
        match event {
            BuildEvent::SessionStarted { reachable, .. } => {
                if self.verbose {
                    println!(
                        "  {} {} in scope",
                        style("─").dim(),
                        output::plural(*reachable, "target")
                    );
                }
            }
            BuildEvent::Started { id, action, reason } => {
                if self.dry_run {
                    println!("{}", action);
                } else if self.verbose {
                    println!(
                        "  {} {} {}",
                        style("▸").dim(),
                        output::target_style().apply_to(id),
                        style(format!("({})", reason)).dim()
                    );
                    println!("    {}", style(action).dim());
                } else if !self.silent {
                    println!("{}", action);
                }
            }
            BuildEvent::Completed { id, duration } => {
                if self.verbose && !self.dry_run {
                    println!(
                        "  {} {} {}",
                        style("✓").green(),
                        style(id).green(),
                        style(format!("{:.1}s", duration.as_secs_f64())).dim()
                    );
                }
            }
            BuildEvent::UpToDate { id } => {
                if self.verbose {
                    println!(
                        "  {} {} {}",
                        style("○").dim(),
                        id,
                        style("(up to date)").dim()
                    );
                }
            }
            BuildEvent::Failed {
                id,
                duration,
                reason,
            } => {
                eprintln!(
                    "  {} {} {} {}",
                    style("✗").red(),
                    style(id).red(),
                    style(format!("{:.1}s", duration.as_secs_f64())).dim(),
                    style(reason).red().dim()
                );
            }
            BuildEvent::Skipped { id, cause } => {
                eprintln!(
                    "  {} {} {}",
                    style("○").yellow(),
                    style(id).yellow(),
                    style(format!("(dependency '{}' failed)", cause)).dim()
                );
            }
            BuildEvent::Halted { reason } => match reason {
                HaltReason::FailFast => output::warning(
                    "Stopping after the first failure (use -k to keep going)",
                ),
                HaltReason::Cancelled => output::warning("Interrupted, waiting for running recipes"),
            },
            BuildEvent::AllCompleted {
                total,
                rebuilt,
                up_to_date,
                failed,
                skipped,
                pending,
                duration,
            } => {
                if !self.verbose && *failed == 0 {
                    return;
                }
                println!();
                println!(
                    "  {} {} rebuilt, {} up to date, {} failed, {} skipped, {} not started of {} ({:.1}s)",
                    if *failed == 0 {
                        style("✓").green().bold()
                    } else {
                        style("✗").red().bold()
                    },
                    rebuilt,
                    up_to_date,
                    failed,
                    skipped,
                    pending,
                    total,
                    duration.as_secs_f64()
                );
            }
        }
    }
}
