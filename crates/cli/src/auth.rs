//! `rgrid auth`: store, clear and inspect HR API keys.
//!
//! Keys go to the system keychain when built with the `keychain` feature.
//! Without it, only the environment variable is consulted.

use std::io::{self, BufRead};

use clap::{Subcommand, ValueEnum};

use rostergrid_config::credentials::{self, KeySource};

use crate::CliError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Provider {
    Bamboohr,
}

impl Provider {
    fn id(&self) -> &'static str {
        match self {
            Provider::Bamboohr => "bamboohr",
        }
    }

    fn display_name(&self) -> &'static str {
        match self {
            Provider::Bamboohr => "BambooHR",
        }
    }
}

#[derive(Subcommand)]
pub enum AuthCommands {
    /// Store an API key in the system keychain (key read from stdin)
    #[command(after_help = "\
Examples:
  echo \"$KEY\" | rgrid auth set bamboohr
  rgrid auth set bamboohr < key.txt")]
    Set {
        #[arg(value_enum, default_value = "bamboohr")]
        provider: Provider,
    },

    /// Remove a stored API key from the system keychain
    Clear {
        #[arg(value_enum, default_value = "bamboohr")]
        provider: Provider,
    },

    /// Show where the API key would be read from
    Status {
        #[arg(value_enum, default_value = "bamboohr")]
        provider: Provider,
    },
}

pub fn cmd_auth(command: AuthCommands) -> Result<(), CliError> {
    match command {
        AuthCommands::Set { provider } => {
            let key = read_key(io::stdin().lock())?;
            credentials::set_api_key(provider.id(), &key).map_err(CliError::general)?;
            println!("{} API key stored in keychain", provider.display_name());
            Ok(())
        }
        AuthCommands::Clear { provider } => {
            credentials::delete_api_key(provider.id()).map_err(CliError::general)?;
            println!("{} API key removed from keychain", provider.display_name());
            Ok(())
        }
        AuthCommands::Status { provider } => {
            let lookup = credentials::get_api_key(provider.id());
            match lookup.source {
                KeySource::None => println!(
                    "{}: no API key (set {} or run `rgrid auth set {}`)",
                    provider.display_name(),
                    credentials::env_var_name(provider.id()),
                    provider.id(),
                ),
                source => println!("{}: API key from {}", provider.display_name(), source.as_str()),
            }
            Ok(())
        }
    }
}

/// First non-empty line of `input`, trimmed.
fn read_key(input: impl BufRead) -> Result<String, CliError> {
    for line in input.lines() {
        let line = line.map_err(|e| CliError::io(format!("cannot read key from stdin: {}", e)))?;
        let key = line.trim();
        if !key.is_empty() {
            return Ok(key.to_string());
        }
    }
    Err(CliError::args("no API key on stdin"))
}
