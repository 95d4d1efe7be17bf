// populate, labels and validations commands

use std::path::{Path, PathBuf};

use clap::{Args, ValueEnum};
use serde::Serialize;

use rostergrid_engine::cell_ref::parse_column;
use rostergrid_engine::populate::{populate, target_sheet, PopulateError, RowSpanPolicy};
use rostergrid_engine::roster::{dropdown_labels, EmployeeRecord};
use rostergrid_engine::validation::{ErrorStyle, ListSource, ValidationRule, ValidationType};
use rostergrid_io::{roster, xlsx, xlsx_patch};

use crate::fetch::{bamboohr, BambooArgs};
use crate::{load_settings, CliError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SpanArg {
    /// Height equals the last occupied row number (reaches one row past the data)
    LastRowAsHeight,
    /// Stop at the last occupied row
    ThroughLastRow,
}

impl From<SpanArg> for RowSpanPolicy {
    fn from(arg: SpanArg) -> Self {
        match arg {
            SpanArg::LastRowAsHeight => RowSpanPolicy::LastRowAsHeight,
            SpanArg::ThroughLastRow => RowSpanPolicy::ThroughLastRow,
        }
    }
}

#[derive(Args)]
pub struct PopulateArgs {
    /// Workbook to update (.xlsx)
    pub file: PathBuf,

    /// Roster file (.json, .csv or .tsv)
    #[arg(long, value_name = "PATH", required_unless_present = "bamboohr", conflicts_with = "bamboohr")]
    pub roster: Option<PathBuf>,

    /// Read the roster from the BambooHR directory
    #[arg(long)]
    pub bamboohr: bool,

    /// Sheet name (default: config, then the workbook's active sheet)
    #[arg(long)]
    pub sheet: Option<String>,

    /// Target column as letters (L) or a 1-based number (12)
    #[arg(long, value_name = "COL")]
    pub column: Option<String>,

    /// First row of the dropdown range; rows above are headers
    #[arg(long, value_name = "N")]
    pub first_row: Option<usize>,

    /// How the range height follows the sheet's last row
    #[arg(long, value_enum)]
    pub span: Option<SpanArg>,

    /// Warn on values outside the list instead of rejecting them
    #[arg(long)]
    pub allow_invalid: bool,

    /// Output workbook (default: update FILE in place)
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,

    /// Output JSON summary
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub connection: BambooArgs,
}

#[derive(Serialize)]
struct PopulateReport<'a> {
    output: String,
    sheet: &'a str,
    range: String,
    span: RowSpanPolicy,
    allow_invalid: bool,
    label_count: usize,
    labels: &'a [String],
    lists_spilled: usize,
}

#[derive(Serialize)]
struct ValidationEntry {
    range: String,
    #[serde(rename = "type")]
    rule_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    items: Option<Vec<String>>,
    style: &'static str,
}

#[derive(Serialize)]
struct ValidationsReport<'a> {
    sheet: &'a str,
    validations: Vec<ValidationEntry>,
}

// ============================================================================
// populate
// ============================================================================

pub fn cmd_populate(args: PopulateArgs, config: Option<PathBuf>, quiet: bool) -> Result<(), CliError> {
    let settings = load_settings(config.as_deref())?;

    let mut target = settings.dropdown_target();
    if let Some(column) = &args.column {
        target.column = parse_column(column).ok_or_else(|| {
            CliError::args(format!("invalid --column {:?}: expected letters (L) or a number (12)", column))
        })?;
    }
    if let Some(first_row) = args.first_row {
        if first_row == 0 {
            return Err(CliError::args("--first-row is 1-based and must be at least 1"));
        }
        target.first_row = first_row;
    }
    if let Some(span) = args.span {
        target.span = span.into();
    }
    if args.allow_invalid {
        target.allow_invalid = true;
    }
    let sheet_name = args.sheet.clone().or_else(|| settings.target.sheet.clone());

    let output = args.output.clone().unwrap_or_else(|| args.file.clone());
    if !is_xlsx(&output) {
        return Err(CliError::format(format!(
            "cannot write {}: only .xlsx workbooks can be written",
            output.display()
        ))
        .with_hint("pass -o with an .xlsx path"));
    }
    if !args.file.exists() {
        return Err(CliError::io(format!("file not found: {}", args.file.display())));
    }

    let records = match &args.roster {
        Some(path) => load_roster(path)?,
        None => {
            let client = bamboohr::client_from_args(args.connection.clone(), &settings)?;
            if !quiet && atty::is(atty::Stream::Stderr) {
                eprintln!("Fetching roster from BambooHR...");
            }
            client.fetch_roster()?
        }
    };

    let (mut workbook, import) = xlsx::import(&args.file).map_err(CliError::io)?;
    log::debug!("imported {}: {}", args.file.display(), import.summary());
    for warning in &import.warnings {
        log::warn!("{}", warning);
    }

    let sheet = target_sheet(&mut workbook, sheet_name.as_deref()).map_err(CliError::populate)?;
    let sheet_title = sheet.name.clone();
    let outcome = populate(sheet, &records, &target).map_err(CliError::populate)?;

    // An xlsx source is patched so everything but the target rule is kept.
    // Other formats are converted from the imported values.
    let lists_spilled = if is_xlsx(&args.file) {
        let rule = target.rule_for(outcome.labels.clone());
        let patched = xlsx_patch::install_rule(&args.file, &output, &sheet_title, &outcome.range, &rule)
            .map_err(CliError::io)?;
        patched.lists_spilled
    } else {
        log::warn!(
            "{} is not an xlsx workbook; {} gets its values and dropdowns only",
            args.file.display(),
            output.display()
        );
        let export = xlsx::export(&workbook, &output).map_err(CliError::io)?;
        log::debug!("exported {}: {}", output.display(), export.summary());
        export.lists_spilled
    };

    if args.json {
        let report = PopulateReport {
            output: output.display().to_string(),
            sheet: &sheet_title,
            range: outcome.range.to_a1(),
            span: target.span,
            allow_invalid: target.allow_invalid,
            label_count: outcome.labels.len(),
            labels: &outcome.labels,
            lists_spilled,
        };
        print_json(&report)?;
    } else {
        println!(
            "{}!{}: {} labels -> {}",
            sheet_title,
            outcome.range,
            outcome.labels.len(),
            output.display()
        );
    }

    Ok(())
}

fn is_xlsx(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("xlsx"))
}

fn load_roster(path: &Path) -> Result<Vec<EmployeeRecord>, CliError> {
    if !path.exists() {
        return Err(CliError::io(format!("roster not found: {}", path.display())));
    }
    roster::read_roster(path).map_err(CliError::parse)
}

fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    let json = serde_json::to_string_pretty(value).map_err(|e| CliError::general(e.to_string()))?;
    println!("{}", json);
    Ok(())
}

// ============================================================================
// labels
// ============================================================================

pub fn cmd_labels(roster_path: PathBuf, json: bool) -> Result<(), CliError> {
    let records = load_roster(&roster_path)?;
    let labels = dropdown_labels(&records);
    if labels.is_empty() {
        return Err(CliError::populate(PopulateError::EmptyRoster));
    }

    if json {
        print_json(&labels)?;
    } else {
        for label in &labels {
            println!("{}", label);
        }
    }
    Ok(())
}

// ============================================================================
// validations
// ============================================================================

pub fn cmd_validations(file: PathBuf, sheet: Option<String>, json: bool) -> Result<(), CliError> {
    if !file.exists() {
        return Err(CliError::io(format!("file not found: {}", file.display())));
    }
    let (mut workbook, import) = xlsx::import(&file).map_err(CliError::io)?;
    if import.validations_skipped > 0 {
        log::info!(
            "{} validation rule(s) of other types not shown",
            import.validations_skipped
        );
    }

    let sheet = target_sheet(&mut workbook, sheet.as_deref()).map_err(CliError::populate)?;
    let entries: Vec<ValidationEntry> = sheet
        .validations
        .iter()
        .map(|(range, rule)| describe_rule(range.to_a1(), rule))
        .collect();

    if json {
        print_json(&ValidationsReport { sheet: &sheet.name, validations: entries })?;
        return Ok(());
    }

    if entries.is_empty() {
        println!("{}: no validation rules", sheet.name);
        return Ok(());
    }
    for entry in &entries {
        let detail = match (&entry.items, &entry.source) {
            (Some(items), _) => format!("{} items", items.len()),
            (None, Some(source)) => source.clone(),
            (None, None) => String::new(),
        };
        println!(
            "{}!{}  {} {} ({})",
            sheet.name, entry.range, entry.rule_type, detail, entry.style
        );
    }
    Ok(())
}

fn describe_rule(range: String, rule: &ValidationRule) -> ValidationEntry {
    let (rule_type, source, items) = match &rule.rule_type {
        ValidationType::AnyValue => ("any", None, None),
        ValidationType::List(ListSource::Inline(items)) => ("list", None, Some(items.clone())),
        ValidationType::List(ListSource::Range(r)) => ("list", Some(r.clone()), None),
        ValidationType::List(ListSource::NamedRange(n)) => ("list", Some(n.clone()), None),
    };
    // No alert at all means Excel's default Stop alert.
    let style = match &rule.error_alert {
        None => "stop",
        Some(alert) if alert.show => match alert.style {
            ErrorStyle::Stop => "stop",
            ErrorStyle::Warning => "warning",
            ErrorStyle::Information => "information",
        },
        _ => "no alert",
    };
    ValidationEntry { range, rule_type, source, items, style }
}
