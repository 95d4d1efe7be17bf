// Excel import (calamine) and export (rust_xlsxwriter)
//
// Only cell values and list validations travel through here. Styles, formulas
// and layout are not carried over: export writes a values-and-validations
// snapshot of the workbook. Updating an existing xlsx in place goes through
// `xlsx_patch` instead.

use std::collections::{BTreeMap, HashMap};
use std::io::{Read, Seek};
use std::path::Path;
use std::time::Instant;

use calamine::{open_workbook_auto, Data, Reader, Sheets};
use rostergrid_engine::cell::CellValue;
use rostergrid_engine::cell_ref::col_to_letters;
use rostergrid_engine::sheet::Sheet;
use rostergrid_engine::validation::{CellRange, ListSource, ValidationRule, ValidationType};
use rostergrid_engine::workbook::Workbook;
use rust_xlsxwriter::{Workbook as XlsxWorkbook, Worksheet};

use crate::xlsx_validation::{self, rule_to_xlsx, rule_to_xlsx_with_source};

/// Hidden sheet holding list items too long for an inline list formula.
pub const LIST_SHEET: &str = "_rgrid_lists";

/// Result of an Excel import operation
#[derive(Debug, Default)]
pub struct ImportResult {
    /// Count of sheets imported (the hidden list sheet is not counted)
    pub sheets_imported: usize,
    /// Total non-empty cells imported
    pub cells_imported: usize,
    /// Total validation rules imported
    pub validations_imported: usize,
    /// Validation rules dropped (types other than list / any value)
    pub validations_skipped: usize,
    /// Index of the tab the workbook opens on
    pub active_sheet: usize,
    /// Actionable warnings
    pub warnings: Vec<String>,
    /// Total import duration in milliseconds
    pub import_duration_ms: u128,
}

impl ImportResult {
    /// Returns a summary message suitable for display
    pub fn summary(&self) -> String {
        let mut parts = vec![
            format!("{} sheet{}", self.sheets_imported, if self.sheets_imported == 1 { "" } else { "s" }),
            format!("{} cells", self.cells_imported),
        ];
        if self.validations_imported > 0 {
            parts.push(format!("{} validations", self.validations_imported));
        }
        if self.validations_skipped > 0 {
            parts.push(format!("{} validations skipped", self.validations_skipped));
        }
        parts.join(", ")
    }
}

/// Result of an Excel export operation
#[derive(Debug, Default)]
pub struct ExportResult {
    pub sheets_exported: usize,
    pub cells_exported: usize,
    pub validations_exported: usize,
    /// Validation rules that could not be expressed in Excel
    pub validations_skipped: usize,
    /// Lists written to the hidden list sheet
    pub lists_spilled: usize,
    pub export_duration_ms: u128,
}

impl ExportResult {
    pub fn summary(&self) -> String {
        let mut parts = vec![
            format!("{} sheet{}", self.sheets_exported, if self.sheets_exported == 1 { "" } else { "s" }),
            format!("{} cells", self.cells_exported),
            format!("{} validations", self.validations_exported),
        ];
        if self.lists_spilled > 0 {
            parts.push(format!("{} long lists on {}", self.lists_spilled, LIST_SHEET));
        }
        parts.join(", ")
    }
}

// ============================================================================
// Import
// ============================================================================

/// Import an Excel file (xlsx, xls, xlsb, ods).
///
/// Validations and the active tab are read from the xlsx package XML; for
/// the other formats they are left at their defaults.
pub fn import(path: &Path) -> Result<(Workbook, ImportResult), String> {
    let start_time = Instant::now();

    let mut workbook: Sheets<_> =
        open_workbook_auto(path).map_err(|e| format!("Failed to open Excel file: {}", e))?;

    let sheet_names: Vec<String> = workbook.sheet_names().to_vec();
    if sheet_names.is_empty() {
        return Err("Excel file contains no sheets".to_string());
    }

    let mut result = ImportResult::default();

    let spilled = read_list_columns(&mut workbook)?;

    let mut sheets: Vec<Sheet> = Vec::new();
    for sheet_name in sheet_names.iter().filter(|n| n.as_str() != LIST_SHEET) {
        let range = workbook
            .worksheet_range(sheet_name)
            .map_err(|e| format!("Failed to read sheet '{}': {}", sheet_name, e))?;

        let mut sheet = Sheet::new(sheet_name);
        let (data_start_row, data_start_col) = range.start().unwrap_or((0, 0));

        for (row_idx, row) in range.rows().enumerate() {
            for (col_idx, cell) in row.iter().enumerate() {
                if let Some(value) = data_to_value(cell) {
                    let target_row = data_start_row as usize + row_idx;
                    let target_col = data_start_col as usize + col_idx;
                    sheet.set_cell(target_row, target_col, value);
                    result.cells_imported += 1;
                }
            }
        }

        let (imported, skipped) = import_validation_rules(path, sheet_name, &mut sheet, &spilled);
        result.validations_imported += imported;
        result.validations_skipped += skipped;
        if skipped > 0 {
            result.warnings.push(format!(
                "Sheet '{}': {} unsupported validation rule(s) dropped",
                sheet_name, skipped
            ));
        }

        sheets.push(sheet);
        result.sheets_imported += 1;
    }

    let active = match xlsx_validation::read_active_tab(path) {
        Ok(tab) => tab,
        Err(e) => {
            log::debug!("no active tab for {}: {}", path.display(), e);
            0
        }
    };

    let workbook = Workbook::from_sheets(sheets, active);
    result.active_sheet = workbook.active_sheet_index();
    result.import_duration_ms = start_time.elapsed().as_millis();

    log::debug!("imported {}: {}", path.display(), result.summary());
    Ok((workbook, result))
}

/// Items of each list-sheet column, keyed by 0-based column. Empty when the
/// workbook has no list sheet.
pub(crate) fn read_list_columns<RS: Read + Seek>(
    workbook: &mut Sheets<RS>,
) -> Result<HashMap<usize, Vec<String>>, String> {
    let mut spilled: HashMap<usize, Vec<String>> = HashMap::new();
    if !workbook.sheet_names().iter().any(|n| n == LIST_SHEET) {
        return Ok(spilled);
    }

    let range = workbook
        .worksheet_range(LIST_SHEET)
        .map_err(|e| format!("Failed to read sheet '{}': {}", LIST_SHEET, e))?;
    let (start_row, start_col) = range.start().unwrap_or((0, 0));
    for (row_idx, row) in range.rows().enumerate() {
        for (col_idx, cell) in row.iter().enumerate() {
            let col = start_col as usize + col_idx;
            let items = spilled.entry(col).or_default();
            let target_row = start_row as usize + row_idx;
            if let Some(text) = data_to_value(cell).map(|v| v.display()) {
                items.resize(target_row, String::new());
                items.push(text);
            }
        }
    }
    Ok(spilled)
}

/// Typed value for a calamine cell, or None for an empty cell.
fn data_to_value(cell: &Data) -> Option<CellValue> {
    let value = match cell {
        Data::Empty => return None,
        Data::String(s) if s.is_empty() => return None,
        Data::String(s) => CellValue::Text(s.clone()),
        Data::Float(n) => CellValue::Number(*n),
        Data::Int(n) => CellValue::Number(*n as f64),
        Data::Bool(b) => CellValue::Bool(*b),
        // Serial date number; formatting is not carried over.
        Data::DateTime(dt) => CellValue::Number(dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::Text(s.clone()),
        Data::Error(e) => CellValue::Text(format!("#{:?}", e)),
    };
    Some(value)
}

/// Import validation rules for a sheet from XLSX.
///
/// Returns (imported_count, skipped_count). A sheet whose XML cannot be
/// read contributes nothing; this is the normal case for non-xlsx formats.
fn import_validation_rules(
    xlsx_path: &Path,
    sheet_name: &str,
    sheet: &mut Sheet,
    spilled: &HashMap<usize, Vec<String>>,
) -> (usize, usize) {
    match xlsx_validation::parse_sheet_validations(xlsx_path, sheet_name) {
        Ok(parsed) => {
            let mut imported = 0;
            for v in parsed.rules {
                sheet.validations.set(v.range, inline_spilled_list(v.rule, spilled));
                imported += 1;
            }
            (imported, parsed.skipped)
        }
        Err(e) => {
            log::debug!("no validations read for sheet '{}': {}", sheet_name, e);
            (0, 0)
        }
    }
}

/// Turn a range rule that points into the list sheet back into an inline list.
fn inline_spilled_list(rule: ValidationRule, spilled: &HashMap<usize, Vec<String>>) -> ValidationRule {
    let ValidationType::List(ListSource::Range(range_ref)) = &rule.rule_type else {
        return rule;
    };
    let Some(range) = list_sheet_range(range_ref) else {
        return rule;
    };
    let Some(column) = spilled.get(&range.start_col) else {
        return rule;
    };

    let end = (range.end_row + 1).min(column.len());
    let items: Vec<String> = column
        .get(range.start_row..end)
        .unwrap_or_default()
        .iter()
        .filter(|s| !s.is_empty())
        .cloned()
        .collect();

    ValidationRule {
        rule_type: ValidationType::List(ListSource::Inline(items)),
        ..rule
    }
}

/// The range part of `='_rgrid_lists'!$A$1:$A$40`, if the reference targets the list sheet.
fn list_sheet_range(range_ref: &str) -> Option<CellRange> {
    let formula = range_ref.strip_prefix('=').unwrap_or(range_ref);
    let (sheet, range) = formula.rsplit_once('!')?;
    if sheet.trim_matches('\'') != LIST_SHEET {
        return None;
    }
    xlsx_validation::parse_single_range(range)
}

// ============================================================================
// Export
// ============================================================================

/// Export a workbook to an XLSX file.
///
/// Inline lists that do not fit Excel's literal list formula are written to
/// a hidden `_rgrid_lists` sheet, one column per list, and referenced by range.
pub fn export(workbook: &Workbook, path: &Path) -> Result<ExportResult, String> {
    let start_time = Instant::now();
    let mut result = ExportResult::default();

    if workbook.sheet_count() == 0 {
        return Err("Workbook has no sheets to export".to_string());
    }
    if workbook.sheet_index_by_name(LIST_SHEET).is_some() {
        return Err(format!("Sheet name '{}' is reserved", LIST_SHEET));
    }

    // Assign list-sheet columns before any worksheet is borrowed.
    let mut spill_columns: Vec<Vec<String>> = Vec::new();
    let mut spill_refs: BTreeMap<(usize, CellRange), String> = BTreeMap::new();
    for (sheet_idx, sheet) in workbook.sheets().iter().enumerate() {
        for (range, rule) in sheet.validations.iter() {
            if let Some(items) = rule.inline_items() {
                if !xlsx_validation::fits_inline(items) && !items.is_empty() {
                    let col = spill_columns.len();
                    let letters = col_to_letters(col);
                    spill_refs.insert(
                        (sheet_idx, *range),
                        format!("'{}'!${}$1:${}${}", LIST_SHEET, letters, letters, items.len()),
                    );
                    spill_columns.push(items.to_vec());
                }
            }
        }
    }

    let mut xlsx_workbook = XlsxWorkbook::new();

    for (sheet_idx, sheet) in workbook.sheets().iter().enumerate() {
        let worksheet = xlsx_workbook
            .add_worksheet()
            .set_name(&sheet.name)
            .map_err(|e| format!("Failed to create sheet '{}': {}", sheet.name, e))?;

        result.cells_exported += export_sheet_cells(sheet, worksheet)?;

        let (exported, skipped) = export_validation_rules(worksheet, sheet_idx, sheet, &spill_refs)?;
        result.validations_exported += exported;
        result.validations_skipped += skipped;
        result.sheets_exported += 1;
    }

    if !spill_columns.is_empty() {
        let worksheet = xlsx_workbook
            .add_worksheet()
            .set_name(LIST_SHEET)
            .map_err(|e| format!("Failed to create sheet '{}': {}", LIST_SHEET, e))?;
        for (col, items) in spill_columns.iter().enumerate() {
            for (row, item) in items.iter().enumerate() {
                worksheet
                    .write_string(row as u32, col as u16, item)
                    .map_err(|e| format!("Failed to write list item: {}", e))?;
            }
        }
        worksheet.set_hidden(true);
        result.lists_spilled = spill_columns.len();
    }

    if let Ok(ws) = xlsx_workbook.worksheet_from_index(workbook.active_sheet_index()) {
        ws.set_active(true);
    }

    xlsx_workbook
        .save(path)
        .map_err(|e| format!("Failed to save XLSX file: {}", e))?;

    result.export_duration_ms = start_time.elapsed().as_millis();
    log::debug!("exported {}: {}", path.display(), result.summary());
    Ok(result)
}

/// Write a sheet's values. Returns the number of cells written.
fn export_sheet_cells(sheet: &Sheet, worksheet: &mut Worksheet) -> Result<usize, String> {
    let mut cells_exported = 0;

    for ((row, col), value) in sheet.cells_iter() {
        let row32 = *row as u32;
        let col16 = *col as u16;

        let written = match value {
            CellValue::Empty => continue,
            CellValue::Text(s) => worksheet.write_string(row32, col16, s),
            CellValue::Number(n) => worksheet.write_number(row32, col16, *n),
            CellValue::Bool(b) => worksheet.write_boolean(row32, col16, *b),
        };
        written.map_err(|e| format!("Failed to write cell ({}, {}): {}", row, col, e))?;
        cells_exported += 1;
    }

    Ok(cells_exported)
}

/// Export validation rules for a sheet.
///
/// Returns (exported_count, skipped_count).
fn export_validation_rules(
    worksheet: &mut Worksheet,
    sheet_idx: usize,
    sheet: &Sheet,
    spill_refs: &BTreeMap<(usize, CellRange), String>,
) -> Result<(usize, usize), String> {
    let mut exported = 0;
    let mut skipped = 0;

    for (range, rule) in sheet.validations.iter() {
        let dv = match spill_refs.get(&(sheet_idx, *range)) {
            Some(formula) => rule_to_xlsx_with_source(rule, formula),
            None => rule_to_xlsx(rule),
        };
        match dv {
            Some(dv) => {
                worksheet
                    .add_data_validation(
                        range.start_row as u32,
                        range.start_col as u16,
                        range.end_row as u32,
                        range.end_col as u16,
                        &dv,
                    )
                    .map_err(|e| format!("Failed to add validation on {}: {}", range, e))?;
                exported += 1;
            }
            None => {
                log::warn!("validation on {}!{} could not be exported", sheet.name, range);
                skipped += 1;
            }
        }
    }

    Ok((exported, skipped))
}

// ============================================================================
// Tests
// ============================================================================
