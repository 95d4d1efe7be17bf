//! `rgrid fetch bamboohr`: read the BambooHR employee directory.
//!
//! One request to `/api/gateway.php/{subdomain}/v1/employees/directory`
//! feeds every view. The API key is the basic-auth user with an empty
//! password.

use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;

use clap::ValueEnum;
use reqwest::header::HeaderMap;
use serde::Serialize;

use rostergrid_config::Settings;
use rostergrid_engine::roster::EmployeeRecord;

use crate::exit_codes;
use crate::CliError;

use super::common::{self, FetchClient};
use super::BambooArgs;

// ── Constants ───────────────────────────────────────────────────────

const BAMBOOHR_API_BASE: &str = "https://api.bamboohr.com";
const PROVIDER: &str = "bamboohr";
const SUPERVISOR_UNKNOWN: &str = "Unknown";

// ── Views ───────────────────────────────────────────────────────────

/// What to extract from the directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DirectoryView {
    /// Roster records: employee_id, employee_name
    Employees,
    /// Each employee with their supervisor's id and name
    ReportsTo,
    /// Unique job titles
    JobTitles,
    /// Unique locations
    Locations,
}

/// One directory entry. BambooHR sends ids as strings, older accounts as numbers.
#[derive(Debug, Clone, Default, PartialEq)]
struct DirectoryEntry {
    id: String,
    display_name: Option<String>,
    supervisor_id: Option<String>,
    job_title: Option<String>,
    location: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
struct ReportsToRow {
    employee_id: String,
    employee_name: Option<String>,
    supervisor_id: Option<String>,
    supervisor_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
struct ValueRow {
    value: String,
}

// ── Parsing ─────────────────────────────────────────────────────────

/// Read a field that may be a string or a number; blank strings count as absent.
fn field_text(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn parse_directory(body: &serde_json::Value) -> Result<Vec<DirectoryEntry>, CliError> {
    let employees = body["employees"].as_array().ok_or_else(|| CliError {
        code: exit_codes::EXIT_FETCH_UPSTREAM,
        message: "BambooHR response missing 'employees' array".into(),
        hint: None,
    })?;

    let mut entries = Vec::with_capacity(employees.len());
    for emp in employees {
        let Some(id) = field_text(&emp["id"]) else {
            log::warn!("skipping BambooHR directory entry without an id");
            continue;
        };
        entries.push(DirectoryEntry {
            id,
            display_name: field_text(&emp["displayName"]),
            supervisor_id: field_text(&emp["supervisorId"]),
            job_title: field_text(&emp["jobTitle"]),
            location: field_text(&emp["location"]),
        });
    }
    Ok(entries)
}

fn extract_bamboohr_error(headers: &HeaderMap, body: &serde_json::Value, status: u16) -> String {
    headers
        .get("x-bamboohr-error-message")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| body["message"].as_str().map(str::to_string))
        .or_else(|| body["error"].as_str().map(str::to_string))
        .unwrap_or_else(|| format!("HTTP {}", status))
}

// ── View builders ───────────────────────────────────────────────────

/// Roster records in directory order. Entries without a name are skipped.
fn employees_view(entries: &[DirectoryEntry]) -> Vec<EmployeeRecord> {
    entries
        .iter()
        .filter_map(|e| {
            e.display_name
                .as_ref()
                .map(|name| EmployeeRecord::new(e.id.clone(), name.trim()))
        })
        .collect()
}

fn reports_to_view(entries: &[DirectoryEntry]) -> Vec<ReportsToRow> {
    let names: HashMap<&str, Option<&str>> = entries
        .iter()
        .map(|e| (e.id.as_str(), e.display_name.as_deref()))
        .collect();

    entries
        .iter()
        .map(|e| {
            // An id missing from the directory is "Unknown"; a listed
            // supervisor without a display name stays null.
            let supervisor_name = e.supervisor_id.as_deref().and_then(|sid| match names.get(sid) {
                Some(name) => name.map(str::to_string),
                None => Some(SUPERVISOR_UNKNOWN.to_string()),
            });
            ReportsToRow {
                employee_id: e.id.clone(),
                employee_name: e.display_name.clone(),
                supervisor_id: e.supervisor_id.clone(),
                supervisor_name,
            }
        })
        .collect()
}

fn job_title(e: &DirectoryEntry) -> Option<&str> {
    e.job_title.as_deref()
}

fn location(e: &DirectoryEntry) -> Option<&str> {
    e.location.as_deref()
}

/// Unique, trimmed, sorted values of one field.
fn distinct_view(entries: &[DirectoryEntry], field: fn(&DirectoryEntry) -> Option<&str>) -> Vec<ValueRow> {
    entries
        .iter()
        .filter_map(field)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(|v| ValueRow { value: v.to_string() })
        .collect()
}

// ── BambooHR client ─────────────────────────────────────────────────

pub struct BambooClient {
    client: FetchClient,
    api_key: String,
    base_url: String,
    subdomain: String,
}

impl BambooClient {
    pub fn new(api_key: String, subdomain: String) -> Result<Self, CliError> {
        Self::with_base_url(api_key, subdomain, BAMBOOHR_API_BASE.to_string())
    }

    pub fn with_base_url(api_key: String, subdomain: String, base_url: String) -> Result<Self, CliError> {
        Ok(Self {
            client: FetchClient::new("BambooHR", extract_bamboohr_error)?,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            subdomain,
        })
    }

    fn directory_url(&self) -> String {
        format!(
            "{}/api/gateway.php/{}/v1/employees/directory",
            self.base_url, self.subdomain
        )
    }

    fn fetch_directory(&self) -> Result<Vec<DirectoryEntry>, CliError> {
        let url = self.directory_url();
        log::debug!("GET {}", url);

        let body = self.client.get_json(|http| {
            http.get(&url)
                .header("Accept", "application/json")
                .basic_auth(&self.api_key, None::<&str>)
        })?;

        parse_directory(&body)
    }

    /// Employee roster for the dropdown.
    pub fn fetch_roster(&self) -> Result<Vec<EmployeeRecord>, CliError> {
        Ok(employees_view(&self.fetch_directory()?))
    }
}

// ── Credentials ─────────────────────────────────────────────────────

fn resolve_subdomain(flag: Option<String>, settings: &Settings) -> Result<String, CliError> {
    flag.filter(|s| !s.trim().is_empty())
        .or_else(|| settings.bamboohr.subdomain.clone())
        .map(|s| s.trim().to_string())
        .ok_or_else(|| CliError {
            code: exit_codes::EXIT_FETCH_NOT_AUTH,
            message: "missing BambooHR subdomain (use --subdomain, set BAMBOOHR_SUBDOMAIN, or add [bamboohr] subdomain to the config)".into(),
            hint: None,
        })
}

/// Build a client from flags, keychain, env and config.
pub(crate) fn client_from_args(args: BambooArgs, settings: &Settings) -> Result<BambooClient, CliError> {
    let key = common::resolve_api_key(args.api_key, "BambooHR", PROVIDER)?;
    let subdomain = resolve_subdomain(args.subdomain, settings)?;
    match args.base_url {
        Some(base) => BambooClient::with_base_url(key, subdomain, base),
        None => BambooClient::new(key, subdomain),
    }
}

// ── Entry point ─────────────────────────────────────────────────────

pub fn cmd_fetch_bamboohr(
    view: DirectoryView,
    out: Option<PathBuf>,
    args: BambooArgs,
    settings: &Settings,
    quiet: bool,
) -> Result<(), CliError> {
    let as_csv = out
        .as_ref()
        .and_then(|p| p.extension())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));

    let client = client_from_args(args, settings)?;

    let show_progress = !quiet && atty::is(atty::Stream::Stderr);
    if show_progress {
        eprintln!("Fetching BambooHR directory ({})...", client.subdomain);
    }

    let entries = client.fetch_directory()?;

    let (count, out_label) = match view {
        DirectoryView::Employees => {
            let rows = employees_view(&entries);
            let label = if as_csv {
                common::write_csv(&rows, &["employee_id", "employee_name"], &out)?
            } else {
                common::write_json(&rows, &out)?
            };
            (rows.len(), label)
        }
        DirectoryView::ReportsTo => {
            let rows = reports_to_view(&entries);
            let label = if as_csv {
                common::write_csv(
                    &rows,
                    &["employee_id", "employee_name", "supervisor_id", "supervisor_name"],
                    &out,
                )?
            } else {
                common::write_json(&rows, &out)?
            };
            (rows.len(), label)
        }
        DirectoryView::JobTitles | DirectoryView::Locations => {
            let rows = if view == DirectoryView::JobTitles {
                distinct_view(&entries, job_title)
            } else {
                distinct_view(&entries, location)
            };
            let header = if view == DirectoryView::JobTitles { "job_title" } else { "location" };
            let label = if as_csv {
                common::write_csv(&rows, &[header], &out)?
            } else {
                let values: Vec<&str> = rows.iter().map(|r| r.value.as_str()).collect();
                common::write_json(&values, &out)?
            };
            (rows.len(), label)
        }
    };

    if show_progress {
        eprintln!("Done: {} rows written to {}", count, out_label);
    }
    log::debug!("{} directory entries, {} rows for {:?}", entries.len(), count, view);

    Ok(())
}

// ── Tests ───────────────────────────────────────────────────────────
