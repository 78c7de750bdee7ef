use std::path::PathBuf;

use clap::Parser;

use crate::logging::LogDestination;

/// Fetch encyclopedia articles section by section and store them as JSON.
#[derive(Debug, Parser)]
#[command(name = "wikifetch", version, about)]
pub struct Cli {
    /// Article titles to fetch.
    #[arg(required = true)]
    pub titles: Vec<String>,

    /// Wikipedia language edition, e.g. `en` or `de`.
    #[arg(long)]
    pub lang: Option<String>,

    /// API endpoint to use instead of Wikipedia.
    #[arg(long)]
    pub api_url: Option<String>,

    /// Directory the articles are written to.
    #[arg(long)]
    pub out: Option<PathBuf>,

    /// RON configuration file.
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[arg(long, value_enum)]
    pub log: Option<LogDestination>,

    /// Log at debug level.
    #[arg(short, long)]
    pub verbose: bool,
}
