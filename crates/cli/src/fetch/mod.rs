//! `rgrid fetch`: pull employee data from HR directories.

pub(crate) mod bamboohr;
mod common;

use std::path::PathBuf;

use clap::{Args, Subcommand};

use crate::CliError;

/// BambooHR connection flags, shared by `fetch bamboohr` and `populate --bamboohr`.
#[derive(Args, Debug, Clone, Default)]
pub struct BambooArgs {
    /// BambooHR API key (default: keychain, then BAMBOOHR_API_KEY env)
    #[arg(long)]
    pub api_key: Option<String>,

    /// BambooHR company subdomain (default: BAMBOOHR_SUBDOMAIN env, then config)
    #[arg(long, env = "BAMBOOHR_SUBDOMAIN")]
    pub subdomain: Option<String>,

    /// API base URL override
    #[arg(long, env = "BAMBOOHR_BASE_URL", hide = true)]
    pub base_url: Option<String>,
}

#[derive(Subcommand)]
pub enum FetchCommands {
    /// Fetch the employee directory from BambooHR
    #[command(after_help = "\
Examples:
  rgrid fetch bamboohr --subdomain acme
  rgrid fetch bamboohr employees --out roster.json
  rgrid fetch bamboohr reports-to --out reports_to.json
  rgrid fetch bamboohr job-titles --out titles.csv
  BAMBOOHR_API_KEY=... BAMBOOHR_SUBDOMAIN=acme rgrid fetch bamboohr locations")]
    Bamboohr {
        /// What to extract from the directory
        #[arg(value_enum, default_value = "employees")]
        view: bamboohr::DirectoryView,

        /// Output file; `.csv` writes CSV, anything else JSON (default: JSON on stdout)
        #[arg(long)]
        out: Option<PathBuf>,

        #[command(flatten)]
        connection: BambooArgs,
    },
}

pub fn cmd_fetch(command: FetchCommands, config: Option<PathBuf>, quiet: bool) -> Result<(), CliError> {
    let settings = crate::load_settings(config.as_deref())?;
    match command {
        FetchCommands::Bamboohr { view, out, connection } => {
            bamboohr::cmd_fetch_bamboohr(view, out, connection, &settings, quiet)
        }
    }
}
