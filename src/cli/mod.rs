//! # Command Line
//!
//! `test` runs the selected modules once and exits with a CI-friendly code,
//! `ui` opens the dashboard and `history` lists recent runs.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tokio::sync::broadcast;

use crate::config::Settings;
use crate::history;
use crate::report::Report;
use crate::runner::Executor;
use crate::storage;
use crate::testing::{Module, TestStatus};

/// Exit code for configuration and setup failures.
pub const EXIT_SETUP: u8 = 2;

#[derive(Debug, Parser)]
#[command(name = "llm-api-harness", version, about = "Dependency-aware test harness for the LLM evaluation API")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run test modules against the API.
    Test {
        /// Modules to run; all of them when omitted.
        #[arg(long, short, value_enum, value_delimiter = ',', num_args = 1..)]
        modules: Vec<Module>,

        #[command(flatten)]
        settings: Settings,
    },
    /// Open the dashboard.
    Ui {
        #[command(flatten)]
        settings: Settings,
    },
    /// List recent runs.
    History {
        #[arg(long, default_value_t = 10)]
        limit: usize,

        #[arg(long, env = "LLM_REPORT_DIR", default_value = "reports")]
        report_dir: PathBuf,
    },
}

impl Command {
    pub fn log_level(&self) -> &str {
        match self {
            Command::Test { settings, .. } | Command::Ui { settings } => &settings.log_level,
            Command::History { .. } => "warn",
        }
    }
}

/// Runs the `test` command to completion and returns the exit code.
pub fn test(modules: &[Module], settings: &Settings) -> anyhow::Result<u8> {
    let config = settings.resolve(modules)?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async move {
        let executor = Executor::new(config)?;
        let (cancel_tx, cancel_rx) = broadcast::channel(1);

        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupted, cancelling run and cleaning up test data");
                let _ = cancel_tx.send(());
            }
        });

        let report = executor.run(cancel_rx).await?;
        let paths = storage::persist(&report, executor.config());
        print_summary(&report, &paths);
        Ok::<_, anyhow::Error>(report.exit_code())
    })
}

pub fn history(limit: usize, report_dir: &std::path::Path) -> anyhow::Result<u8> {
    let runs = history::load_recent(report_dir, limit).map_err(anyhow::Error::msg)?;
    if runs.is_empty() {
        println!("No runs recorded in {}", report_dir.display());
        return Ok(0);
    }

    println!(
        "{:<36}  {:<25}  {:>5}  {:>5}  {:>5}  {:>5}  {:>5}",
        "RUN", "STARTED", "TOTAL", "PASS", "FAIL", "ERR", "SKIP"
    );
    for run in runs {
        println!(
            "{:<36}  {:<25}  {:>5}  {:>5}  {:>5}  {:>5}  {:>5}{}",
            run.run_id,
            run.started_at,
            run.total,
            run.passed,
            run.failed,
            run.errors,
            run.skipped,
            if run.cancelled { "  (cancelled)" } else { "" }
        );
    }
    Ok(0)
}

fn print_summary(report: &Report, paths: &[PathBuf]) {
    let summary = &report.summary;
    println!();
    println!("{}", report.metadata.title);
    println!(
        "  total {}  passed {}  failed {}  errors {}  skipped {}  ({:.1}% pass rate)",
        summary.total, summary.passed, summary.failed, summary.errors, summary.skipped, summary.pass_rate
    );

    let failures: Vec<_> = report.failures().collect();
    if !failures.is_empty() {
        println!();
        for result in failures {
            let label = if result.status == TestStatus::Error { "ERROR" } else { "FAIL " };
            println!(
                "  {label} {:<32} {}",
                result.test_id,
                result.message.as_deref().unwrap_or_default()
            );
        }
    }

    if !report.cleanup_failures.is_empty() {
        println!();
        println!("  Leftover test data (cleanup failed):");
        for failure in &report.cleanup_failures {
            println!("    {} id={} {}", failure.instance, failure.id, failure.message);
        }
    }

    if report.metadata.cancelled {
        println!();
        println!("  Run cancelled; remaining cases were skipped.");
    }

    for path in paths {
        println!("  Report: {}", path.display());
    }
}
