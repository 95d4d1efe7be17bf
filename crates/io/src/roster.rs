// Roster files: JSON arrays or CSV with employee_id,employee_name headers

use std::fs::File;
use std::io::Read;
use std::path::Path;

use rostergrid_engine::roster::{parse_roster_json, EmployeeRecord};
use serde::Deserialize;

/// Delimited rows keep ids as text, so `0042` stays `0042`.
#[derive(Debug, Deserialize)]
struct CsvRow {
    employee_id: String,
    employee_name: String,
}

impl From<CsvRow> for EmployeeRecord {
    fn from(row: CsvRow) -> Self {
        EmployeeRecord::new(row.employee_id, row.employee_name)
    }
}

/// Load roster records, choosing the format from the file extension.
///
/// `.csv` and `.tsv` are read as delimited text; anything else as JSON.
pub fn read_roster(path: &Path) -> Result<Vec<EmployeeRecord>, String> {
    let content = read_file_as_utf8(path)?;
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    let records = match ext.as_deref() {
        Some("csv") => parse_roster_csv(&content, sniff_delimiter(&content)),
        Some("tsv") => parse_roster_csv(&content, b'\t'),
        _ => parse_roster_json(&content).map_err(|e| format!("Invalid roster JSON: {}", e)),
    }?;

    log::debug!("read {} roster record(s) from {}", records.len(), path.display());
    Ok(records)
}

/// Parse delimited roster text with a header row.
///
/// Column order does not matter; extra columns are ignored.
pub fn parse_roster_csv(content: &str, delimiter: u8) -> Result<Vec<EmployeeRecord>, String> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    let mut records = Vec::new();
    for (idx, result) in reader.deserialize::<CsvRow>().enumerate() {
        // Header is line 1.
        let row = result.map_err(|e| format!("Invalid roster row {}: {}", idx + 2, e))?;
        records.push(row.into());
    }
    Ok(records)
}

/// Pick comma, semicolon or tab from the header line.
fn sniff_delimiter(content: &str) -> u8 {
    let header = content.lines().next().unwrap_or_default();
    [b',', b';', b'\t']
        .into_iter()
        .max_by_key(|d| header.bytes().filter(|b| b == d).count())
        .filter(|d| header.bytes().any(|b| b == *d))
        .unwrap_or(b',')
}

/// Read file and convert to UTF-8 if needed (Excel often saves CSV as Windows-1252).
fn read_file_as_utf8(path: &Path) -> Result<String, String> {
    let mut file = File::open(path).map_err(|e| format!("Failed to open {}: {}", path.display(), e))?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes).map_err(|e| e.to_string())?;

    match String::from_utf8(bytes) {
        Ok(s) => Ok(s.strip_prefix('\u{feff}').map(str::to_string).unwrap_or(s)),
        Err(e) => {
            let bytes = e.into_bytes();
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(&bytes);
            Ok(decoded.into_owned())
        }
    }
}
