mod cli;
mod config;
mod logging;
mod run;

use std::io;
use std::process::ExitCode;

use clap::Parser;
use log::LevelFilter;

use crate::cli::Cli;
use crate::config::AppConfig;

fn main() -> ExitCode {
    let cli = Cli::parse();
    match try_main(&cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("wikifetch: {err:#}");
            ExitCode::from(2)
        }
    }
}

/// Returns whether every title was fetched.
fn try_main(cli: &Cli) -> anyhow::Result<bool> {
    let mut config = AppConfig::load(cli.config.as_deref())?;
    config.apply_cli(cli);

    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    logging::initialize(config.log, level);

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let reports = run::fetch_all(&config, &cli.titles, &mut out)?;
    let failed: Vec<&str> = reports
        .iter()
        .filter(|report| report.outcome.is_err())
        .map(|report| report.title.as_str())
        .collect();
    if !failed.is_empty() {
        eprintln!("wikifetch: failed: {}", failed.join(", "));
    }
    Ok(reports.len() == cli.titles.len() && failed.is_empty())
}
