// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of mirror-upgrader.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

//! Mirror Upgrader - Entry point for the upgrader binary
//!
//! Meant to run once per logon or from a scheduled task. Exits with 0 when
//! nothing failed, 1 when the run failed and 2 on configuration errors.

use anyhow::Context;
use clap::Parser;
use mirror_upgrader::audit::{AuditRecord, append_record, host_identifier};
use mirror_upgrader::{UpgradeOrchestrator, load_config};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "mirror-upgrader")]
#[command(about = "Upgrade the installed application from its release mirror", long_about = None)]
struct Cli {
    /// Append the completion record to this file instead of printing it
    #[arg(short, long)]
    log: Option<PathBuf>,

    /// Reinstall the latest release even if the installed one is current
    #[arg(short, long, conflicts_with = "check")]
    force: bool,

    /// Only report whether an upgrade is needed
    #[arg(short, long)]
    check: bool,

    /// JSON config file; built-in defaults are used when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// Extra arguments passed to the installer after the silent flags
    #[arg(last = true)]
    installer_args: Vec<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("mirror_upgrader=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let orchestrator = match build_orchestrator(&cli) {
        Ok(orchestrator) => orchestrator,
        Err(e) => {
            error!("{e:#}");
            return ExitCode::from(2);
        }
    };

    let host = host_identifier();
    let (record, failed) = if cli.check {
        let decision = orchestrator.decide().await;
        let failed = decision.is_err();
        (AuditRecord::for_check(&decision, &host), failed)
    } else {
        let outcome = orchestrator.upgrade(cli.force).await;
        (AuditRecord::for_upgrade(&outcome, &host), outcome.is_failure())
    };

    if let Err(e) = write_record(cli.log.as_ref(), &record) {
        error!("Failed to write completion record: {e:#}");
        return ExitCode::FAILURE;
    }

    if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn build_orchestrator(cli: &Cli) -> anyhow::Result<UpgradeOrchestrator> {
    let config = load_config(cli.config.as_deref()).context("Failed to load configuration")?;
    info!(
        "Loaded config: product={}, mirror={}",
        config.product_name, config.mirror_base_url
    );

    let orchestrator = UpgradeOrchestrator::from_config(&config)
        .context("Failed to set up upgrader")?
        .with_extra_install_args(cli.installer_args.clone());
    Ok(orchestrator)
}

fn write_record(log: Option<&PathBuf>, record: &AuditRecord) -> anyhow::Result<()> {
    match log {
        Some(path) => append_record(path, record)
            .with_context(|| format!("cannot append to {}", path.display())),
        None => {
            println!("{}", record.to_line()?);
            Ok(())
        }
    }
}
