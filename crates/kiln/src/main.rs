//! kiln - incremental make-style build tool

mod cli;
mod exit_codes;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use cli::{output, Cli};

fn main() {
    let cli = Cli::parse();
    let guard = init_tracing(cli.debug);

    let code = match cli.execute() {
        Ok(code) => code,
        Err(e) => {
            tracing::debug!(error = ?e, "command failed");
            output::error(&format!("{:#}", e));
            exit_codes::for_error(&e)
        }
    };

    // Flush the file layer before exiting
    drop(guard);
    std::process::exit(code);
}

/// Set up tracing with two layers:
/// - Console: controlled by RUST_LOG (default: warn, or debug with --debug)
/// - File: always debug-level JSON to ~/.kiln/logs/
fn init_tracing(debug: bool) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let console_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(console_directives(debug)));

    if let Some(log_dir) = log_directory() {
        let file_appender = tracing_appender::rolling::daily(&log_dir, "kiln.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr)
                    .with_filter(console_filter),
            )
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(non_blocking)
                    .with_target(true)
                    .with_filter(EnvFilter::new("debug")),
            )
            .init();

        return Some(guard);
    }

    // Fallback: console only
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr)
                .with_filter(console_filter),
        )
        .init();

    None
}

/// Default console filter. Build events already reach the terminal through
/// the console reporter, so the tracing copies only go to the log file.
fn console_directives(debug: bool) -> &'static str {
    if debug {
        "debug"
    } else {
        "warn,kiln_engine::reporter=off"
    }
}

/// Returns the log directory path, creating it if needed.
fn log_directory() -> Option<std::path::PathBuf> {
    let log_dir = dirs::home_dir()?.join(".kiln").join("logs");
    std::fs::create_dir_all(&log_dir).ok()?;
    Some(log_dir)
}
