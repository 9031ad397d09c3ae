// src/lib.rs

pub mod cli;
pub mod config;
pub mod control;
pub mod errors;
pub mod launcher;
pub mod listeners;
pub mod logging;
pub mod persist;
pub mod redirect;
pub mod restart;
pub mod runner;

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::debug;

use crate::cli::CliArgs;
use crate::config::{LauncherConfig, load_or_default};
use crate::launcher::{LaunchOutcome, Launcher};
use crate::listeners::ListenerSet;
use crate::restart::RestartPlan;
use crate::runner::RunnerHandle;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - restart plan capture (before anything changes the directory)
/// - config loading + CLI overrides
/// - listener binding / adoption
/// - runner selection
/// - the launcher main flow
pub async fn run(args: CliArgs) -> Result<LaunchOutcome> {
    let plan = RestartPlan::capture().context("capturing the restart plan")?;

    let mut raw = load_or_default(PathBuf::from(&args.config))
        .with_context(|| format!("loading config {}", args.config))?;
    args.apply_to(&mut raw);
    let config = LauncherConfig::try_from(raw)?;

    if args.dry_run {
        print_dry_run(&config, &plan);
        return Ok(LaunchOutcome::Exited);
    }

    let listeners = ListenerSet::bind_from_env(&config.binds)?;
    let runner = RunnerHandle::select(&config, &listeners, plan.restart_dir())?;

    let launcher = Launcher::new(config, listeners, runner, plan);
    Ok(launcher.run().await?)
}

/// Simple dry-run output: print the resolved configuration.
fn print_dry_run(config: &LauncherConfig, plan: &RestartPlan) {
    println!("respawn dry-run");
    println!("  binds: {:?}", config.bind_strings());
    println!("  command: {:?}", config.command);
    println!("  workers: {}", config.workers);
    println!("  environment: {}", config.environment);
    println!("  drain_timeout: {:?}", config.drain_timeout);
    if let Some(dir) = &config.directory {
        println!("  directory: {}", dir.display());
    }
    if let Some(control) = &config.control {
        println!("  control: {}", control.url);
    }
    println!("  restart argv: {:?}", plan.restart_argv(config.restart_cmd.as_deref()));
    println!("  restart dir: {}", plan.restart_dir().display());

    debug!("dry-run complete (no execution)");
}
