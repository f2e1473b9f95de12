// SPDX-License-Identifier: GPL-3.0-only

//! lptools - manage dynamic partitions in a super device

use std::process::ExitCode;

use anyhow::Context as _;
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use lptools::cli::Cli;
use lptools::{Config, Engine, LpError, Target, logging};
use lptools_sys::{SuperDeviceStore, SuperTable};

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            let _ = e.print();
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            let _ = e.print();
            eprintln!("\n{}", Cli::command().render_help());
            return ExitCode::from(1);
        }
    };

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("lptools: {e}");
            return ExitCode::from(e.exit_code());
        }
    };
    logging::init(&config, cli.verbose);

    match run(&cli, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            let code = e.downcast_ref::<LpError>().map_or(1, LpError::exit_code);
            ExitCode::from(code)
        }
    }
}

fn run(cli: &Cli, config: &Config) -> anyhow::Result<()> {
    if unsafe { libc::geteuid() } != 0 {
        tracing::warn!("not running as root, device access will probably fail");
    }

    let operation = cli.command.operation()?;
    let target = Target::resolve(&cli.context_args(), config.context_defaults()?)?;

    let store = SuperDeviceStore::new(&target.super_path);
    let table = SuperTable::load(store, target.slot).map_err(|source| LpError::LoadFailed {
        path: target.super_path.clone(),
        source,
    })?;
    let context = target.with_group(&table, cli.group.as_deref())?;

    tracing::info!(
        "slot {} suffix '{}' super {} group {}",
        context.slot,
        context.suffix,
        context.super_path.display(),
        context.group.as_deref().unwrap_or("<none>")
    );

    let mapper = config.mapper();
    let merge_gate = config.merge_gate();
    let engine = Engine::new(&context, &mapper, merge_gate.as_ref(), config.map_timeout());
    let outcome = engine.execute(table, operation)?;

    for warning in outcome.warnings() {
        eprintln!("Warning: {warning}");
    }

    if cli.json {
        let json = serde_json::to_string_pretty(&outcome).context("Failed to serialize result")?;
        println!("{json}");
    } else {
        println!("{outcome}");
    }
    Ok(())
}
