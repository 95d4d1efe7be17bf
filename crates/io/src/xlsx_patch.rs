//! Install a dropdown into an existing xlsx package without rebuilding it.
//!
//! [`install_rule`] rewrites the `<dataValidations>` block of one worksheet
//! part and raw-copies every other zip entry, so formulas, styles, layout and
//! validation kinds the engine does not model all survive. Rules already on
//! the sheet are cut back to the cells outside the new range.
//!
//! An inline list too long for Excel's literal form goes to the hidden
//! `_rgrid_lists` sheet, which is added to the package on first use. A column
//! holding exactly the same items is reused.
//!
//! Only the main `<dataValidations>` block is edited. Rules stored under
//! `<extLst>` are copied as they are.

use std::collections::BTreeMap;
use std::fmt;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use calamine::open_workbook_auto;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use rostergrid_engine::cell_ref::col_to_letters;
use rostergrid_engine::validation::{CellRange, ErrorStyle, ListSource, ValidationRule, ValidationType};
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

use crate::xlsx::{read_list_columns, LIST_SHEET};
use crate::xlsx_validation::{self, fits_inline, parse_single_range};

const WORKBOOK_PART: &str = "xl/workbook.xml";
const WORKBOOK_RELS_PART: &str = "xl/_rels/workbook.xml.rels";
const CONTENT_TYPES_PART: &str = "[Content_Types].xml";

const SPREADSHEETML_NS: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
const REL_TYPE_WORKSHEET: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet";
const WORKSHEET_CONTENT_TYPE: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml";

/// What [`install_rule`] changed.
#[derive(Debug, Default)]
pub struct PatchResult {
    /// Existing rules cut back or removed to make room for the new one
    pub rules_trimmed: usize,
    /// Lists written to the hidden list sheet
    pub lists_spilled: usize,
}

/// Elements that follow `<dataValidations>` in a worksheet.
fn after_validations(name: &[u8]) -> bool {
    matches!(
        name,
        b"hyperlinks"
            | b"printOptions"
            | b"pageMargins"
            | b"pageSetup"
            | b"headerFooter"
            | b"rowBreaks"
            | b"colBreaks"
            | b"customProperties"
            | b"cellWatches"
            | b"ignoredErrors"
            | b"smartTags"
            | b"drawing"
            | b"legacyDrawing"
            | b"legacyDrawingHF"
            | b"drawingHF"
            | b"picture"
            | b"oleObjects"
            | b"controls"
            | b"webPublishItems"
            | b"tableParts"
            | b"extLst"
    )
}

fn xml_error(e: impl fmt::Display) -> String {
    format!("XML write error: {}", e)
}

/// Copy `src` to `dst` with `rule` installed on `range` of `sheet_name`.
///
/// `src` and `dst` may be the same file: the package is written to a
/// temporary sibling and renamed over `dst`.
pub fn install_rule(
    src: &Path,
    dst: &Path,
    sheet_name: &str,
    range: &CellRange,
    rule: &ValidationRule,
) -> Result<PatchResult, String> {
    let mut archive = xlsx_validation::open_package(src)?;
    let workbook_xml = xlsx_validation::read_part(&mut archive, WORKBOOK_PART)?;
    let rels_xml = xlsx_validation::read_part(&mut archive, WORKBOOK_RELS_PART)?;
    let sheet_part = xlsx_validation::sheet_part(&workbook_xml, &rels_xml, sheet_name)?;

    let mut result = PatchResult::default();
    let mut parts: BTreeMap<String, Vec<u8>> = BTreeMap::new();

    let formula1 = match &rule.rule_type {
        ValidationType::AnyValue => None,
        ValidationType::List(ListSource::Inline(items)) if fits_inline(items) => {
            Some(format!("\"{}\"", items.join(",")))
        }
        ValidationType::List(ListSource::Inline(items)) => {
            result.lists_spilled = 1;
            Some(spill_list(src, &mut archive, &workbook_xml, &rels_xml, items, &mut parts)?)
        }
        ValidationType::List(ListSource::Range(formula)) => Some(formula.trim_start_matches('=').to_string()),
        ValidationType::List(ListSource::NamedRange(name)) => Some(name.clone()),
    };

    let sheet_xml = xlsx_validation::read_part(&mut archive, &sheet_part)?;
    let (patched, trimmed) = replace_sheet_validations(&sheet_xml, range, rule, formula1.as_deref())?;
    result.rules_trimmed = trimmed;
    parts.insert(sheet_part, patched);

    write_package(archive, dst, parts)?;
    log::debug!(
        "installed rule on {}!{} in {} ({} rule(s) trimmed)",
        sheet_name,
        range,
        dst.display(),
        result.rules_trimmed
    );
    Ok(result)
}

// ============================================================================
// Worksheet XML
// ============================================================================

/// An existing `<dataValidations>` block being rebuilt.
struct OpenBlock {
    start: BytesStart<'static>,
    kept: Writer<Vec<u8>>,
    count: usize,
}

enum Trim {
    Untouched,
    Cut(BytesStart<'static>),
    Removed,
}

/// Rewrite a worksheet so `range` carries only `rule`.
///
/// Returns the new XML and the number of existing rules that were cut back
/// or removed. Everything outside `<dataValidations>` is passed through.
fn replace_sheet_validations(
    xml: &str,
    range: &CellRange,
    rule: &ValidationRule,
    formula1: Option<&str>,
) -> Result<(Vec<u8>, usize), String> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false);
    let mut writer = Writer::new(Vec::new());

    let mut prefix: Option<String> = None;
    let mut depth = 0usize;
    let mut skip_depth = 0usize;
    let mut block: Option<OpenBlock> = None;
    let mut written = false;
    let mut trimmed = 0;

    loop {
        let event = reader.read_event().map_err(|e| format!("XML parse error: {}", e))?;
        if matches!(event, Event::Eof) {
            break;
        }
        if skip_depth > 0 {
            match event {
                Event::Start(_) => skip_depth += 1,
                Event::End(_) => skip_depth -= 1,
                _ => {}
            }
            continue;
        }

        match &event {
            Event::Start(e) | Event::Empty(e) => {
                let opens = matches!(event, Event::Start(_));
                let local = e.local_name();
                let local = local.as_ref();

                if depth == 0 && local == b"worksheet" {
                    prefix = e
                        .name()
                        .prefix()
                        .map(|p| String::from_utf8_lossy(p.as_ref()).into_owned());
                } else if depth == 1 && local == b"dataValidations" && !written {
                    let start = e.clone().into_owned();
                    if opens {
                        block = Some(OpenBlock { start, kept: Writer::new(Vec::new()), count: 0 });
                        depth += 1;
                    } else {
                        let empty = OpenBlock { start, kept: Writer::new(Vec::new()), count: 0 };
                        write_block(&mut writer, prefix.as_deref(), Some(empty), range, rule, formula1)?;
                        written = true;
                    }
                    continue;
                } else if depth == 1 && !written && after_validations(local) {
                    write_block(&mut writer, prefix.as_deref(), None, range, rule, formula1)?;
                    written = true;
                } else if depth == 2 && local == b"dataValidation" {
                    if let Some(open) = block.as_mut() {
                        match trim_rule(e, range) {
                            Trim::Untouched => open.kept.write_event(event.clone()).map_err(xml_error)?,
                            Trim::Cut(cut) => {
                                trimmed += 1;
                                let cut = if opens { Event::Start(cut) } else { Event::Empty(cut) };
                                open.kept.write_event(cut).map_err(xml_error)?;
                            }
                            Trim::Removed => {
                                trimmed += 1;
                                if opens {
                                    skip_depth = 1;
                                }
                                continue;
                            }
                        }
                        open.count += 1;
                        if opens {
                            depth += 1;
                        }
                        continue;
                    }
                }

                if opens {
                    depth += 1;
                }
            }
            Event::End(e) => {
                depth = depth.saturating_sub(1);
                let local = e.local_name();
                if depth == 1 && local.as_ref() == b"dataValidations" {
                    if let Some(open) = block.take() {
                        write_block(&mut writer, prefix.as_deref(), Some(open), range, rule, formula1)?;
                        written = true;
                        continue;
                    }
                }
                if depth == 0 && local.as_ref() == b"worksheet" && !written {
                    write_block(&mut writer, prefix.as_deref(), None, range, rule, formula1)?;
                    written = true;
                }
            }
            _ => {}
        }

        let out = match block.as_mut() {
            Some(open) => &mut open.kept,
            None => &mut writer,
        };
        out.write_event(event).map_err(xml_error)?;
    }

    if !written {
        return Err("worksheet XML has no <worksheet> element".to_string());
    }
    Ok((writer.into_inner(), trimmed))
}

/// Cut `range` out of a `<dataValidation>`'s sqref.
///
/// References that do not parse are kept as they are.
fn trim_rule(e: &BytesStart, range: &CellRange) -> Trim {
    let Some(sqref) = e
        .attributes()
        .flatten()
        .find(|attr| attr.key.as_ref() == b"sqref")
        .map(|attr| String::from_utf8_lossy(&attr.value).into_owned())
    else {
        return Trim::Untouched;
    };

    let mut touched = false;
    let mut rest: Vec<String> = Vec::new();
    for token in sqref.split_whitespace() {
        match parse_single_range(token) {
            Some(covered) if covered.overlaps(range) => {
                touched = true;
                rest.extend(covered.subtract(range).iter().map(CellRange::to_a1));
            }
            _ => rest.push(token.to_string()),
        }
    }

    if !touched {
        return Trim::Untouched;
    }
    if rest.is_empty() {
        return Trim::Removed;
    }

    let mut cut = BytesStart::new(String::from_utf8_lossy(e.name().as_ref()).into_owned());
    for attr in e.attributes().flatten() {
        if attr.key.as_ref() != b"sqref" {
            cut.push_attribute(attr);
        }
    }
    let joined = rest.join(" ");
    cut.push_attribute(("sqref", joined.as_str()));
    Trim::Cut(cut)
}

fn qualified(prefix: Option<&str>, local: &str) -> String {
    match prefix {
        Some(p) => format!("{}:{}", p, local),
        None => local.to_string(),
    }
}

/// Write `<dataValidations>`: the kept rules of `existing`, then the new one.
fn write_block(
    writer: &mut Writer<Vec<u8>>,
    prefix: Option<&str>,
    existing: Option<OpenBlock>,
    range: &CellRange,
    rule: &ValidationRule,
    formula1: Option<&str>,
) -> Result<(), String> {
    let tag = qualified(prefix, "dataValidations");
    let mut start = BytesStart::new(tag.as_str());
    let mut count = 1;
    let mut kept = Vec::new();

    if let Some(open) = existing {
        for attr in open.start.attributes().flatten() {
            if attr.key.as_ref() != b"count" {
                start.push_attribute(attr);
            }
        }
        count += open.count;
        kept = open.kept.into_inner();
    }
    let count = count.to_string();
    start.push_attribute(("count", count.as_str()));

    writer.write_event(Event::Start(start)).map_err(xml_error)?;
    writer.get_mut().extend_from_slice(&kept);
    write_rule(writer, prefix, range, rule, formula1)?;
    writer.write_event(Event::End(BytesEnd::new(tag.as_str()))).map_err(xml_error)
}

/// One `<dataValidation>` element for `rule`.
fn write_rule(
    writer: &mut Writer<Vec<u8>>,
    prefix: Option<&str>,
    range: &CellRange,
    rule: &ValidationRule,
    formula1: Option<&str>,
) -> Result<(), String> {
    let tag = qualified(prefix, "dataValidation");
    let mut el = BytesStart::new(tag.as_str());
    el.push_attribute(("type", if formula1.is_some() { "list" } else { "none" }));
    if rule.ignore_blank {
        el.push_attribute(("allowBlank", "1"));
    }
    // showDropDown="1" hides the arrow.
    if formula1.is_some() && !rule.show_dropdown {
        el.push_attribute(("showDropDown", "1"));
    }

    if let Some(prompt) = rule.input_message.as_ref().filter(|m| m.show) {
        el.push_attribute(("showInputMessage", "1"));
        el.push_attribute(("promptTitle", prompt.title.as_str()));
        el.push_attribute(("prompt", prompt.message.as_str()));
    }

    match &rule.error_alert {
        // No alert means Excel's default Stop alert, which only shows when enabled.
        None => el.push_attribute(("showErrorMessage", "1")),
        Some(alert) => {
            match alert.style {
                ErrorStyle::Stop => {}
                ErrorStyle::Warning => el.push_attribute(("errorStyle", "warning")),
                ErrorStyle::Information => el.push_attribute(("errorStyle", "information")),
            }
            if alert.show {
                el.push_attribute(("showErrorMessage", "1"));
                if !alert.title.is_empty() {
                    el.push_attribute(("errorTitle", alert.title.as_str()));
                }
                if !alert.message.is_empty() {
                    el.push_attribute(("error", alert.message.as_str()));
                }
            }
        }
    }

    let sqref = range.to_a1();
    el.push_attribute(("sqref", sqref.as_str()));

    let Some(formula1) = formula1 else {
        return writer.write_event(Event::Empty(el)).map_err(xml_error);
    };
    let formula_tag = qualified(prefix, "formula1");
    writer.write_event(Event::Start(el)).map_err(xml_error)?;
    writer
        .write_event(Event::Start(BytesStart::new(formula_tag.as_str())))
        .map_err(xml_error)?;
    writer.write_event(Event::Text(BytesText::new(formula1))).map_err(xml_error)?;
    writer
        .write_event(Event::End(BytesEnd::new(formula_tag.as_str())))
        .map_err(xml_error)?;
    writer.write_event(Event::End(BytesEnd::new(tag.as_str()))).map_err(xml_error)
}

// ============================================================================
// List sheet
// ============================================================================

/// Place `items` on the list sheet and return the range formula pointing at them.
fn spill_list(
    src: &Path,
    archive: &mut ZipArchive<File>,
    workbook_xml: &str,
    rels_xml: &str,
    items: &[String],
    parts: &mut BTreeMap<String, Vec<u8>>,
) -> Result<String, String> {
    let mut book = open_workbook_auto(src).map_err(|e| format!("Failed to open Excel file: {}", e))?;
    let mut spilled = read_list_columns(&mut book)?;
    let width = spilled.keys().max().map_or(0, |col| col + 1);
    let mut columns: Vec<Vec<String>> = (0..width).map(|col| spilled.remove(&col).unwrap_or_default()).collect();

    let col = match columns.iter().position(|column| column.as_slice() == items) {
        Some(col) => {
            log::debug!("reusing {} column {}", LIST_SHEET, col_to_letters(col));
            col
        }
        None => {
            columns.push(items.to_vec());
            let sheet_xml = list_sheet_xml(&columns)?;
            if xlsx_validation::find_sheet_rid(workbook_xml, LIST_SHEET).is_ok() {
                let part = xlsx_validation::sheet_part(workbook_xml, rels_xml, LIST_SHEET)?;
                parts.insert(part, sheet_xml);
            } else {
                add_list_sheet(archive, workbook_xml, rels_xml, sheet_xml, parts)?;
            }
            columns.len() - 1
        }
    };

    let letters = col_to_letters(col);
    Ok(format!("'{}'!${}$1:${}${}", LIST_SHEET, letters, letters, items.len()))
}

/// Worksheet XML with one inline-string column per list.
fn list_sheet_xml(columns: &[Vec<String>]) -> Result<Vec<u8>, String> {
    let mut writer = Writer::new(Vec::new());
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))
        .map_err(xml_error)?;
    let mut root = BytesStart::new("worksheet");
    root.push_attribute(("xmlns", SPREADSHEETML_NS));
    writer.write_event(Event::Start(root)).map_err(xml_error)?;
    writer
        .write_event(Event::Start(BytesStart::new("sheetData")))
        .map_err(xml_error)?;

    let height = columns.iter().map(Vec::len).max().unwrap_or(0);
    for row in 0..height {
        let row_number = (row + 1).to_string();
        let mut row_el = BytesStart::new("row");
        row_el.push_attribute(("r", row_number.as_str()));
        writer.write_event(Event::Start(row_el)).map_err(xml_error)?;

        for (col, items) in columns.iter().enumerate() {
            let Some(item) = items.get(row).filter(|item| !item.is_empty()) else {
                continue;
            };
            let cell_ref = format!("{}{}", col_to_letters(col), row_number);
            let mut cell = BytesStart::new("c");
            cell.push_attribute(("r", cell_ref.as_str()));
            cell.push_attribute(("t", "inlineStr"));
            writer.write_event(Event::Start(cell)).map_err(xml_error)?;
            writer.write_event(Event::Start(BytesStart::new("is"))).map_err(xml_error)?;
            writer.write_event(Event::Start(BytesStart::new("t"))).map_err(xml_error)?;
            writer.write_event(Event::Text(BytesText::new(item))).map_err(xml_error)?;
            writer.write_event(Event::End(BytesEnd::new("t"))).map_err(xml_error)?;
            writer.write_event(Event::End(BytesEnd::new("is"))).map_err(xml_error)?;
            writer.write_event(Event::End(BytesEnd::new("c"))).map_err(xml_error)?;
        }

        writer.write_event(Event::End(BytesEnd::new("row"))).map_err(xml_error)?;
    }

    writer.write_event(Event::End(BytesEnd::new("sheetData"))).map_err(xml_error)?;
    writer.write_event(Event::End(BytesEnd::new("worksheet"))).map_err(xml_error)?;
    Ok(writer.into_inner())
}

/// Register a new hidden list sheet in the workbook, its relationships and
/// the content types.
fn add_list_sheet(
    archive: &mut ZipArchive<File>,
    workbook_xml: &str,
    rels_xml: &str,
    sheet_xml: Vec<u8>,
    parts: &mut BTreeMap<String, Vec<u8>>,
) -> Result<(), String> {
    let file_name = (0..)
        .map(|n| match n {
            0 => "rgrid_lists.xml".to_string(),
            n => format!("rgrid_lists{}.xml", n),
        })
        .find(|name| archive.index_for_name(&format!("xl/worksheets/{}", name)).is_none())
        .unwrap_or_else(|| "rgrid_lists.xml".to_string());
    let part = format!("xl/worksheets/{}", file_name);
    let target = format!("worksheets/{}", file_name);

    let rel_number = xlsx_validation::collect_elements(rels_xml, b"Relationship")?
        .iter()
        .filter_map(|attrs| attrs.get("Id")?.strip_prefix("rId")?.parse::<u32>().ok())
        .max()
        .unwrap_or(0)
        + 1;
    let rid = format!("rId{}", rel_number);

    let sheets = xlsx_validation::collect_elements(workbook_xml, b"sheet")?;
    let sheet_id = sheets
        .iter()
        .filter_map(|attrs| attrs.get("sheetId")?.parse::<u32>().ok())
        .max()
        .unwrap_or(0)
        + 1;
    let rid_key = sheets
        .iter()
        .flat_map(|attrs| attrs.keys())
        .find(|key| key.ends_with(":id"))
        .cloned()
        .unwrap_or_else(|| "r:id".to_string());
    let sheet_id = sheet_id.to_string();

    let workbook = append_child(
        workbook_xml,
        b"sheets",
        "sheet",
        &[
            ("name", LIST_SHEET),
            ("sheetId", sheet_id.as_str()),
            ("state", "hidden"),
            (rid_key.as_str(), rid.as_str()),
        ],
    )?;
    let rels = append_child(
        rels_xml,
        b"Relationships",
        "Relationship",
        &[("Id", rid.as_str()), ("Type", REL_TYPE_WORKSHEET), ("Target", target.as_str())],
    )?;
    let content_types_xml = xlsx_validation::read_part(archive, CONTENT_TYPES_PART)?;
    let part_name = format!("/{}", part);
    let content_types = append_child(
        &content_types_xml,
        b"Types",
        "Override",
        &[("PartName", part_name.as_str()), ("ContentType", WORKSHEET_CONTENT_TYPE)],
    )?;

    parts.insert(WORKBOOK_PART.to_string(), workbook);
    parts.insert(WORKBOOK_RELS_PART.to_string(), rels);
    parts.insert(CONTENT_TYPES_PART.to_string(), content_types);
    parts.insert(part, sheet_xml);
    log::debug!("added hidden sheet {} as {}", LIST_SHEET, rid);
    Ok(())
}

/// Add an empty `child` element as the last child of the first `parent`.
fn append_child(xml: &str, parent: &[u8], child: &str, attrs: &[(&str, &str)]) -> Result<Vec<u8>, String> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false);
    let mut writer = Writer::new(Vec::new());
    let mut appended = false;

    loop {
        let event = reader.read_event().map_err(|e| format!("XML parse error: {}", e))?;
        match &event {
            Event::Eof => break,
            Event::End(e) if !appended && e.local_name().as_ref() == parent => {
                let prefix = e.name().prefix().map(|p| String::from_utf8_lossy(p.as_ref()).into_owned());
                let mut el = BytesStart::new(qualified(prefix.as_deref(), child));
                for attr in attrs {
                    el.push_attribute(*attr);
                }
                writer.write_event(Event::Empty(el)).map_err(xml_error)?;
                appended = true;
            }
            _ => {}
        }
        writer.write_event(event).map_err(xml_error)?;
    }

    if !appended {
        return Err(format!("no <{}> element to extend", String::from_utf8_lossy(parent)));
    }
    Ok(writer.into_inner())
}

// ============================================================================
// Package
// ============================================================================

/// Write the package to `dst`, replacing or adding `parts` and copying every
/// other entry byte for byte.
fn write_package(
    mut archive: ZipArchive<File>,
    dst: &Path,
    mut parts: BTreeMap<String, Vec<u8>>,
) -> Result<(), String> {
    let tmp_path = dst.with_extension("xlsx.tmp");
    let file = File::create(&tmp_path).map_err(|e| format!("Failed to create {}: {}", tmp_path.display(), e))?;

    let written = copy_entries(&mut archive, file, &mut parts);
    drop(archive);
    if let Err(e) = written {
        let _ = fs::remove_file(&tmp_path);
        return Err(e);
    }

    fs::rename(&tmp_path, dst).map_err(|e| format!("Failed to replace {}: {}", dst.display(), e))
}

fn copy_entries(
    archive: &mut ZipArchive<File>,
    file: File,
    parts: &mut BTreeMap<String, Vec<u8>>,
) -> Result<(), String> {
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default();
    let zip_error = |e: zip::result::ZipError| format!("Failed to write XLSX: {}", e);

    for i in 0..archive.len() {
        let entry = archive.by_index_raw(i).map_err(zip_error)?;
        let name = entry.name().to_string();
        match parts.remove(&name) {
            Some(bytes) => {
                zip.start_file(name.as_str(), options).map_err(zip_error)?;
                zip.write_all(&bytes).map_err(|e| format!("Failed to write {}: {}", name, e))?;
            }
            None => zip.raw_copy_file(entry).map_err(zip_error)?,
        }
    }

    // Parts that did not exist before.
    for (name, bytes) in std::mem::take(parts) {
        zip.start_file(name.as_str(), options).map_err(zip_error)?;
        zip.write_all(&bytes).map_err(|e| format!("Failed to write {}: {}", name, e))?;
    }

    zip.finish().map_err(zip_error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xlsx::{self, ImportResult};
    use rostergrid_engine::populate::{populate, DropdownTarget};
    use rostergrid_engine::roster::EmployeeRecord;
    use rostergrid_engine::workbook::Workbook;
    use rust_xlsxwriter::{DataValidation, DataValidationRule, Format};
    use std::io::Read;
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn reports_to() -> Vec<EmployeeRecord> {
        vec![
            EmployeeRecord::new("2379", "Hanifah Abolais"),
            EmployeeRecord::new("2345", "Byron Andino"),
            EmployeeRecord::new("2227", "Dean Antonio"),
        ]
    }

    /// Five data rows, a formula in C2, a bold header and a whole-number
    /// rule on D2:D50.
    fn write_onboarding(dir: &Path) -> PathBuf {
        let path = dir.join("onboarding.xlsx");
        let mut book = rust_xlsxwriter::Workbook::new();
        let sheet = book.add_worksheet();
        sheet.set_name("Onboarding").unwrap();
        let bold = Format::new().set_bold();
        sheet.write_string_with_format(0, 0, "Name", &bold).unwrap();
        sheet.write_string(0, 11, "Reports To").unwrap();
        for row in 1..5 {
            sheet.write_string(row, 0, format!("New Hire {}", row)).unwrap();
        }
        sheet.write_number(1, 1, 21).unwrap();
        sheet.write_formula(1, 2, "=B2*2").unwrap();
        let whole = DataValidation::new().allow_whole_number(DataValidationRule::Between(1, 100));
        sheet.add_data_validation(1, 3, 49, 3, &whole).unwrap();
        book.save(&path).unwrap();
        path
    }

    fn read_entry(path: &Path, name: &str) -> String {
        let mut archive = ZipArchive::new(File::open(path).unwrap()).unwrap();
        let mut xml = String::new();
        archive.by_name(name).unwrap().read_to_string(&mut xml).unwrap();
        xml
    }

    /// Import, populate in memory, and patch the result into `dst`.
    fn populate_file(src: &Path, dst: &Path, records: &[EmployeeRecord]) -> (CellRange, PatchResult, ImportResult) {
        let (mut workbook, import): (Workbook, ImportResult) = xlsx::import(src).unwrap();
        let target = DropdownTarget::default();
        let sheet = workbook.sheet_by_name_mut("Onboarding").unwrap();
        let outcome = populate(sheet, records, &target).unwrap();
        let rule = target.rule_for(outcome.labels);
        let patched = install_rule(src, dst, "Onboarding", &outcome.range, &rule).unwrap();
        (outcome.range, patched, import)
    }

    #[test]
    fn test_formula_style_and_other_rules_survive() {
        let dir = tempdir().unwrap();
        let path = write_onboarding(dir.path());
        let styles_before = read_entry(&path, "xl/styles.xml");

        let (range, patched, import) = populate_file(&path, &path, &reports_to());
        assert_eq!(import.validations_skipped, 1);
        assert_eq!(range.to_a1(), "L2:L6");
        assert_eq!(patched.rules_trimmed, 0);
        assert_eq!(patched.lists_spilled, 0);

        let sheet_xml = read_entry(&path, "xl/worksheets/sheet1.xml");
        assert!(sheet_xml.contains("<f>B2*2</f>"), "{}", sheet_xml);
        assert_eq!(read_entry(&path, "xl/styles.xml"), styles_before);

        let parsed = xlsx_validation::parse_sheet_validations(&path, "Onboarding").unwrap();
        assert_eq!(parsed.skipped, 1);
        assert_eq!(parsed.rules.len(), 1);
        assert_eq!(parsed.rules[0].range.to_a1(), "L2:L6");
        assert_eq!(
            parsed.rules[0].rule.inline_items().unwrap(),
            ["Hanifah Abolais (2379)", "Byron Andino (2345)", "Dean Antonio (2227)"]
        );
        assert!(parsed.rules[0].rule.rejects_invalid());
    }

    #[test]
    fn test_separate_output_leaves_source_alone() {
        let dir = tempdir().unwrap();
        let path = write_onboarding(dir.path());
        let out = dir.path().join("out.xlsx");
        let before = fs::read(&path).unwrap();

        populate_file(&path, &out, &reports_to());

        assert_eq!(fs::read(&path).unwrap(), before);
        let parsed = xlsx_validation::parse_sheet_validations(&out, "Onboarding").unwrap();
        assert_eq!(parsed.rules.len(), 1);
        assert!(!dir.path().join("out.xlsx.tmp").exists());
    }

    #[test]
    fn test_column_rule_is_cut_around_new_range() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("column.xlsx");
        let mut book = rust_xlsxwriter::Workbook::new();
        let sheet = book.add_worksheet();
        sheet.set_name("Onboarding").unwrap();
        for row in 0..5 {
            sheet.write_string(row, 0, format!("row {}", row + 1)).unwrap();
        }
        let old = DataValidation::new().allow_list_strings(&["Old Manager (1)"]).unwrap();
        sheet.add_data_validation(0, 11, 99, 11, &old).unwrap();
        book.save(&path).unwrap();

        let (range, patched, _) = populate_file(&path, &path, &reports_to());
        assert_eq!(range.to_a1(), "L2:L6");
        assert_eq!(patched.rules_trimmed, 1);

        let (workbook, _) = xlsx::import(&path).unwrap();
        let sheet = &workbook.sheets()[0];
        assert_eq!(sheet.list_items(0, 11).unwrap(), ["Old Manager (1)"]);
        assert_eq!(sheet.list_items(49, 11).unwrap(), ["Old Manager (1)"]);
        assert_eq!(sheet.list_items(1, 11).map(<[String]>::len), Some(3));
        assert_eq!(sheet.list_items(5, 11).map(<[String]>::len), Some(3));
        assert!(sheet.validations.get(100, 11).is_none());
    }

    #[test]
    fn test_repeat_install_keeps_one_rule() {
        let dir = tempdir().unwrap();
        let path = write_onboarding(dir.path());
        populate_file(&path, &path, &reports_to());
        let (_, patched, _) = populate_file(&path, &path, &reports_to());
        assert_eq!(patched.rules_trimmed, 1);

        let parsed = xlsx_validation::parse_sheet_validations(&path, "Onboarding").unwrap();
        assert_eq!(parsed.rules.len(), 1);
        assert_eq!(parsed.skipped, 1);
    }

    #[test]
    fn test_long_list_goes_to_hidden_sheet() {
        let dir = tempdir().unwrap();
        let path = write_onboarding(dir.path());
        let records: Vec<EmployeeRecord> = (0..20)
            .map(|i| EmployeeRecord::new((1000 + i).to_string(), format!("Employee Number{}", i)))
            .collect();

        let (_, patched, _) = populate_file(&path, &path, &records);
        assert_eq!(patched.lists_spilled, 1);
        assert!(read_entry(&path, "xl/workbook.xml").contains("state=\"hidden\""));
        assert!(read_entry(&path, CONTENT_TYPES_PART).contains("/xl/worksheets/rgrid_lists.xml"));

        let (workbook, import) = xlsx::import(&path).unwrap();
        assert_eq!(import.sheets_imported, 1);
        let items = workbook.sheets()[0].list_items(1, 11).unwrap();
        assert_eq!(items.len(), 20);
        assert_eq!(items[0], "Employee Number0 (1000)");

        // Same list again reuses the column; a different one adds a column.
        populate_file(&path, &path, &records);
        let columns = read_list_columns(&mut open_workbook_auto(&path).unwrap()).unwrap();
        assert_eq!(columns.len(), 1);

        let fewer = &records[1..];
        populate_file(&path, &path, fewer);
        let columns = read_list_columns(&mut open_workbook_auto(&path).unwrap()).unwrap();
        assert_eq!(columns.len(), 2);
        let (workbook, _) = xlsx::import(&path).unwrap();
        let items = workbook.sheets()[0].list_items(1, 11).unwrap();
        assert_eq!(items.len(), 19);
    }

    #[test]
    fn test_block_inserted_before_page_margins() {
        let xml = r#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData/><pageMargins left="0.7"/></worksheet>"#;
        let rule = ValidationRule::list_inline(vec!["A (1)".into(), "B (2)".into()]);
        let (out, trimmed) =
            replace_sheet_validations(xml, &CellRange::new(1, 11, 4, 11), &rule, Some("\"A (1),B (2)\"")).unwrap();
        let out = String::from_utf8(out).unwrap();

        assert_eq!(trimmed, 0);
        let block = out.find("<dataValidations count=\"1\">").unwrap();
        assert!(block < out.find("<pageMargins").unwrap());
        assert!(out.contains("sqref=\"L2:L5\""));
    }

    #[test]
    fn test_unparsed_sqref_tokens_are_kept() {
        let xml = r#"<worksheet><dataValidations count="1" disablePrompts="1"><dataValidation type="list" sqref="L1:L20 bogus"><formula1>"x"</formula1></dataValidation></dataValidations></worksheet>"#;
        let rule = ValidationRule::list_inline(vec!["A (1)".into()]);
        let (out, trimmed) =
            replace_sheet_validations(xml, &CellRange::new(1, 11, 4, 11), &rule, Some("\"A (1)\"")).unwrap();
        let out = String::from_utf8(out).unwrap();

        assert_eq!(trimmed, 1);
        assert!(out.contains("sqref=\"L1 L6:L20 bogus\""), "{}", out);
        assert!(out.contains("disablePrompts=\"1\""));
        assert!(out.contains("count=\"2\""));
    }

    #[test]
    fn test_fully_covered_rule_is_removed() {
        let xml = r#"<worksheet><dataValidations count="1"><dataValidation type="whole" sqref="L3"><formula1>1</formula1></dataValidation></dataValidations></worksheet>"#;
        let rule = ValidationRule::list_inline(vec!["A (1)".into()]);
        let (out, trimmed) =
            replace_sheet_validations(xml, &CellRange::new(1, 11, 4, 11), &rule, Some("\"A (1)\"")).unwrap();
        let out = String::from_utf8(out).unwrap();

        assert_eq!(trimmed, 1);
        assert!(!out.contains("whole"));
        assert!(out.contains("count=\"1\""));
    }

    #[test]
    fn test_append_child_keeps_prefix() {
        let xml = r#"<x:Types xmlns:x="urn:t"><x:Default Extension="xml"/></x:Types>"#;
        let out = append_child(xml, b"Types", "Override", &[("PartName", "/a.xml")]).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            r#"<x:Types xmlns:x="urn:t"><x:Default Extension="xml"/><x:Override PartName="/a.xml"/></x:Types>"#
        );
    }
}
