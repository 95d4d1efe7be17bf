// rgrid - install employee roster dropdowns in spreadsheets

mod auth;
mod exit_codes;
mod fetch;
mod populate;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use rostergrid_config::{ConfigError, Settings};
use rostergrid_engine::populate::PopulateError;

use exit_codes::{EXIT_ERROR, EXIT_FORMAT, EXIT_IO, EXIT_PARSE, EXIT_SUCCESS, EXIT_USAGE};

#[derive(Parser)]
#[command(name = "rgrid")]
#[command(about = "Add employee roster dropdowns to spreadsheets")]
#[command(long_version = long_version())]
#[command(version)]
#[command(subcommand_required = false)]
struct Cli {
    /// Config file (default: ~/.config/rostergrid/config.toml when present)
    #[arg(long, global = true, value_name = "PATH", env = "RGRID_CONFIG")]
    config: Option<PathBuf>,

    /// Only report warnings and errors on stderr
    #[arg(long, short = 'q', global = true)]
    quiet: bool,

    /// Log debug detail on stderr (RUST_LOG takes precedence)
    #[arg(long, short = 'v', global = true, conflicts_with = "quiet")]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Add the roster dropdown to a workbook column
    #[command(after_help = "\
Examples:
  rgrid populate onboarding.xlsx --roster reports_to.json
  rgrid populate onboarding.xlsx --roster staff.csv --column M --first-row 3
  rgrid populate onboarding.xlsx --roster staff.csv --span through-last-row -o out.xlsx
  rgrid populate onboarding.xlsx --bamboohr --subdomain acme
  rgrid populate onboarding.xlsx --roster staff.json --allow-invalid --json")]
    Populate(populate::PopulateArgs),

    /// Print the dropdown labels a roster produces
    #[command(after_help = "\
Examples:
  rgrid labels --roster reports_to.json
  rgrid labels --roster staff.csv --json")]
    Labels {
        /// Roster file (.json, .csv or .tsv)
        #[arg(long, value_name = "PATH")]
        roster: PathBuf,

        /// Print a JSON array instead of one label per line
        #[arg(long)]
        json: bool,
    },

    /// List the data validation rules in a workbook
    #[command(after_help = "\
Examples:
  rgrid validations onboarding.xlsx
  rgrid validations onboarding.xlsx --sheet Onboarding --json")]
    Validations {
        /// Workbook (.xlsx)
        file: PathBuf,

        /// Sheet name (default: the active sheet)
        #[arg(long)]
        sheet: Option<String>,

        /// Output JSON
        #[arg(long)]
        json: bool,
    },

    /// Pull data from an HR directory
    Fetch {
        #[command(subcommand)]
        command: fetch::FetchCommands,
    },

    /// Manage stored HR API keys
    Auth {
        #[command(subcommand)]
        command: auth::AuthCommands,
    },
}

fn long_version() -> &'static str {
    concat!(
        env!("CARGO_PKG_VERSION"),
        " (", env!("GIT_COMMIT_HASH"), ")",
        "\ntarget:  ", env!("TARGET"),
    )
}

fn init_logging(quiet: bool, verbose: bool) {
    let default_filter = if quiet {
        "warn"
    } else if verbose {
        "debug"
    } else {
        "info"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp(None)
        .format_target(false)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.quiet, cli.verbose);

    let result = match cli.command {
        None => {
            // No subcommand = show help
            eprintln!("Usage: rgrid <command> [options]");
            eprintln!("       rgrid --help for more information");
            Ok(())
        }
        Some(Commands::Populate(args)) => populate::cmd_populate(args, cli.config, cli.quiet),
        Some(Commands::Labels { roster, json }) => populate::cmd_labels(roster, json),
        Some(Commands::Validations { file, sheet, json }) => populate::cmd_validations(file, sheet, json),
        Some(Commands::Fetch { command }) => fetch::cmd_fetch(command, cli.config, cli.quiet),
        Some(Commands::Auth { command }) => auth::cmd_auth(command),
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

/// Load settings from `--config`, the default location, or built-in defaults.
pub(crate) fn load_settings(config: Option<&std::path::Path>) -> Result<Settings, CliError> {
    Settings::load(config).map_err(CliError::config)
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn args(msg: impl Into<String>) -> Self {
        Self { code: EXIT_USAGE, message: msg.into(), hint: None }
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self { code: EXIT_IO, message: msg.into(), hint: None }
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Self { code: EXIT_PARSE, message: msg.into(), hint: None }
    }

    pub fn format(msg: impl Into<String>) -> Self {
        Self { code: EXIT_FORMAT, message: msg.into(), hint: None }
    }

    pub fn general(msg: impl Into<String>) -> Self {
        Self { code: EXIT_ERROR, message: msg.into(), hint: None }
    }

    /// Create error from a populate failure with the matching exit code.
    pub fn populate(err: PopulateError) -> Self {
        let code = exit_codes::populate_exit_code(&err);
        let hint = match &err {
            PopulateError::DegenerateRange { .. } => {
                Some("the sheet has no rows below the header; add data or lower --first-row".to_string())
            }
            PopulateError::EmptyRoster => Some("check that the roster file lists at least one employee".to_string()),
            PopulateError::SheetNotFound(_) => {
                Some("run `rgrid validations <FILE>` to see the active sheet, or omit --sheet".to_string())
            }
            _ => None,
        };
        Self { code, message: err.to_string(), hint }
    }

    pub fn config(err: ConfigError) -> Self {
        let code = match err {
            ConfigError::Io { .. } => EXIT_IO,
            ConfigError::Parse(_) | ConfigError::Invalid(_) => EXIT_PARSE,
        };
        Self { code, message: err.to_string(), hint: None }
    }

    /// Add a hint to an existing error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}
