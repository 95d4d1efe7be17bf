//! Dropdown rules in and out of XLSX.
//!
//! Export goes through rust_xlsxwriter's `DataValidation`. Import reads the
//! `<dataValidation>` elements of a worksheet straight from the package,
//! since the sheet reader does not expose them.
//!
//! List rules (inline, range and named-range sources) and bare "any value"
//! rules are kept. Other rule kinds are counted in
//! [`SheetValidations::skipped`] and dropped.
//!
//! Excel attribute quirks:
//! - `showDropDown="1"` hides the arrow, the opposite of `show_dropdown`
//! - `allowBlank="1"` is `ignore_blank`
//! - inline lists are a quoted, comma-joined literal of at most 255 chars

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use quick_xml::encoding::Decoder;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use rostergrid_engine::cell_ref::parse_cell_ref;
use rostergrid_engine::validation::{
    CellRange, ErrorAlert, ErrorStyle, InputMessage, ListSource, ValidationRule, ValidationType,
};
use rust_xlsxwriter::{DataValidation, DataValidationErrorStyle, Formula};
use zip::ZipArchive;

/// Excel's limit on the text of an inline list formula.
pub const MAX_INLINE_LIST_CHARS: usize = 255;

pub(crate) type Attrs = HashMap<String, String>;

/// Whether `items` can be written as a literal `"a,b,c"` list.
pub fn fits_inline(items: &[String]) -> bool {
    let separators = items.len().saturating_sub(1);
    let chars = items.iter().map(|item| item.chars().count()).sum::<usize>() + separators;
    chars <= MAX_INLINE_LIST_CHARS && !items.iter().any(|item| item.contains([',', '"']))
}

/// Build the xlsx writer's form of a rule.
///
/// None means the rule has no direct form, which is the case for an inline
/// list that does not [`fits_inline`]. Those are written to a list sheet and
/// exported through [`rule_to_xlsx_with_source`].
pub fn rule_to_xlsx(rule: &ValidationRule) -> Option<DataValidation> {
    let dv = DataValidation::new();
    let dv = match &rule.rule_type {
        ValidationType::AnyValue => dv.allow_any_value(),
        ValidationType::List(ListSource::Inline(items)) if fits_inline(items) => {
            let items: Vec<&str> = items.iter().map(String::as_str).collect();
            dv.allow_list_strings(&items).ok()?
        }
        ValidationType::List(ListSource::Inline(_)) => return None,
        ValidationType::List(ListSource::Range(formula)) => {
            dv.allow_list_formula(Formula::new(formula.trim_start_matches('=')))
        }
        ValidationType::List(ListSource::NamedRange(name)) => dv.allow_list_formula(Formula::new(name)),
    };
    with_rule_options(dv, rule)
}

/// Export a list rule whose items live at `range_formula`.
pub fn rule_to_xlsx_with_source(rule: &ValidationRule, range_formula: &str) -> Option<DataValidation> {
    with_rule_options(DataValidation::new().allow_list_formula(Formula::new(range_formula)), rule)
}

fn xlsx_error_style(style: ErrorStyle) -> DataValidationErrorStyle {
    match style {
        ErrorStyle::Stop => DataValidationErrorStyle::Stop,
        ErrorStyle::Warning => DataValidationErrorStyle::Warning,
        ErrorStyle::Information => DataValidationErrorStyle::Information,
    }
}

fn with_rule_options(dv: DataValidation, rule: &ValidationRule) -> Option<DataValidation> {
    let mut dv = dv.ignore_blank(rule.ignore_blank);

    // The writer's show_dropdown(true) emits showDropDown="1", which hides it.
    if matches!(rule.rule_type, ValidationType::List(_)) && !rule.show_dropdown {
        dv = dv.show_dropdown(true);
    }

    dv = match &rule.input_message {
        Some(prompt) if prompt.show => dv
            .set_input_title(&prompt.title)
            .ok()?
            .set_input_message(&prompt.message)
            .ok()?,
        Some(_) => dv.show_input_message(false),
        None => dv,
    };

    dv = match &rule.error_alert {
        Some(alert) if alert.show => dv
            .set_error_title(&alert.title)
            .ok()?
            .set_error_message(&alert.message)
            .ok()?
            .set_error_style(xlsx_error_style(alert.style)),
        Some(alert) => dv.show_error_message(false).set_error_style(xlsx_error_style(alert.style)),
        None => dv,
    };

    Some(dv)
}

/// One rule read back from a worksheet, already split per sqref range.
#[derive(Debug, Clone)]
pub struct ImportedValidation {
    pub range: CellRange,
    pub rule: ValidationRule,
}

#[derive(Debug, Default)]
pub struct SheetValidations {
    pub rules: Vec<ImportedValidation>,
    /// `<dataValidation>` elements of a kind the engine does not model.
    pub skipped: usize,
}

impl SheetValidations {
    fn push(&mut self, attrs: &Attrs, formula1: Option<&str>) {
        let Some(sqref) = attrs.get("sqref") else {
            return;
        };
        let Some(rule) = rule_from_attrs(attrs, formula1) else {
            self.skipped += 1;
            return;
        };
        self.rules.extend(
            parse_sqref(sqref)
                .into_iter()
                .map(|range| ImportedValidation { range, rule: rule.clone() }),
        );
    }
}

pub(crate) fn open_package(path: &Path) -> Result<ZipArchive<File>, String> {
    let file = File::open(path).map_err(|e| format!("Failed to open XLSX file: {}", e))?;
    ZipArchive::new(file).map_err(|e| format!("Failed to read XLSX as ZIP: {}", e))
}

pub(crate) fn read_part(archive: &mut ZipArchive<File>, part: &str) -> Result<String, String> {
    let mut entry = archive
        .by_name(part)
        .map_err(|e| format!("File '{}' not found in XLSX: {}", part, e))?;
    let mut xml = String::new();
    entry
        .read_to_string(&mut xml)
        .map_err(|e| format!("Failed to read '{}': {}", part, e))?;
    Ok(xml)
}

/// Read the validation rules of the sheet called `sheet_name`.
pub fn parse_sheet_validations(xlsx_path: &Path, sheet_name: &str) -> Result<SheetValidations, String> {
    let mut archive = open_package(xlsx_path)?;

    let workbook = read_part(&mut archive, "xl/workbook.xml")?;
    let rels = read_part(&mut archive, "xl/_rels/workbook.xml.rels")?;
    let part = sheet_part(&workbook, &rels, sheet_name)?;
    parse_validations_from_xml(&read_part(&mut archive, &part)?)
}

/// Package path of the worksheet part behind `sheet_name`.
pub(crate) fn sheet_part(workbook_xml: &str, rels_xml: &str, sheet_name: &str) -> Result<String, String> {
    let rid = find_sheet_rid(workbook_xml, sheet_name)?;
    let target = find_relationship_target(rels_xml, &rid)?;

    // Relative targets hang off xl/; a leading slash means a package path.
    Ok(match target.strip_prefix('/') {
        Some(absolute) => absolute.to_string(),
        None => format!("xl/{}", target),
    })
}

/// Index of the tab the workbook opens on, from `<workbookView activeTab>`.
pub fn read_active_tab(xlsx_path: &Path) -> Result<usize, String> {
    let mut archive = open_package(xlsx_path)?;
    parse_active_tab(&read_part(&mut archive, "xl/workbook.xml")?)
}

fn parse_active_tab(workbook_xml: &str) -> Result<usize, String> {
    let view = find_element(workbook_xml, b"workbookView", |_| true)?;
    match view.as_ref().and_then(|attrs| attrs.get("activeTab")) {
        Some(tab) => tab.parse().map_err(|e| format!("Bad activeTab: {}", e)),
        None => Ok(0),
    }
}

pub(crate) fn find_sheet_rid(workbook_xml: &str, sheet_name: &str) -> Result<String, String> {
    find_element(workbook_xml, b"sheet", |attrs| {
        attrs.get("name").map(String::as_str) == Some(sheet_name)
    })?
    .and_then(|mut attrs| attrs.remove("r:id"))
    .ok_or_else(|| format!("Sheet '{}' not found in workbook.xml", sheet_name))
}

fn find_relationship_target(rels_xml: &str, rid: &str) -> Result<String, String> {
    find_element(rels_xml, b"Relationship", |attrs| attrs.get("Id").map(String::as_str) == Some(rid))?
        .and_then(|mut attrs| attrs.remove("Target"))
        .ok_or_else(|| format!("Relationship '{}' not found", rid))
}

/// Attributes of the first `tag` element accepted by `pick`.
fn find_element(xml: &str, tag: &[u8], mut pick: impl FnMut(&Attrs) -> bool) -> Result<Option<Attrs>, String> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) if e.name().as_ref() == tag => {
                let attrs = collect_attrs(e, reader.decoder());
                if pick(&attrs) {
                    return Ok(Some(attrs));
                }
            }
            Ok(Event::Eof) => return Ok(None),
            Err(e) => return Err(format!("XML parse error: {}", e)),
            _ => {}
        }
        buf.clear();
    }
}

/// Attributes of every `tag` element, in document order.
pub(crate) fn collect_elements(xml: &str, tag: &[u8]) -> Result<Vec<Attrs>, String> {
    let mut reader = Reader::from_str(xml);
    let mut found = Vec::new();
    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) if e.local_name().as_ref() == tag => {
                found.push(collect_attrs(e, reader.decoder()));
            }
            Ok(Event::Eof) => return Ok(found),
            Err(e) => return Err(format!("XML parse error: {}", e)),
            _ => {}
        }
    }
}

fn collect_attrs(e: &BytesStart, decoder: Decoder) -> Attrs {
    e.attributes()
        .flatten()
        .map(|attr| {
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = match attr.decode_and_unescape_value(decoder) {
                Ok(v) => v.into_owned(),
                Err(_) => String::from_utf8_lossy(&attr.value).into_owned(),
            };
            (key, value)
        })
        .collect()
}

/// Collect the `<dataValidation>` elements of a worksheet.
fn parse_validations_from_xml(xml: &str) -> Result<SheetValidations, String> {
    let mut reader = Reader::from_str(xml);
    let mut out = SheetValidations::default();
    let mut buf = Vec::new();
    // Attributes and formula text of the element being read.
    let mut open: Option<(Attrs, Option<String>)> = None;
    let mut in_formula1 = false;

    loop {
        match reader
            .read_event_into(&mut buf)
            .map_err(|e| format!("XML parse error: {}", e))?
        {
            Event::Empty(ref e) if e.name().as_ref() == b"dataValidation" => {
                out.push(&collect_attrs(e, reader.decoder()), None);
            }
            Event::Start(ref e) if e.name().as_ref() == b"dataValidation" => {
                open = Some((collect_attrs(e, reader.decoder()), None));
            }
            Event::Start(ref e) if e.name().as_ref() == b"formula1" => in_formula1 = open.is_some(),
            Event::End(ref e) if e.name().as_ref() == b"formula1" => in_formula1 = false,
            Event::Text(ref e) if in_formula1 => {
                if let Some((_, formula)) = open.as_mut() {
                    formula
                        .get_or_insert_with(String::new)
                        .push_str(&e.decode().unwrap_or_default());
                }
            }
            Event::GeneralRef(ref e) if in_formula1 => {
                let resolved = e.decode().ok().and_then(|name| resolve_entity(&name));
                if let (Some(c), Some((_, formula))) = (resolved, open.as_mut()) {
                    formula.get_or_insert_with(String::new).push(c);
                }
            }
            Event::End(ref e) if e.name().as_ref() == b"dataValidation" => {
                if let Some((attrs, formula)) = open.take() {
                    out.push(&attrs, formula.as_deref());
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(out)
}

/// Value of a named or numeric entity reference, given without `&` and `;`.
fn resolve_entity(name: &str) -> Option<char> {
    let named = match name {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        _ => {
            let code = name.strip_prefix('#')?;
            let value = match code.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => code.parse().ok()?,
            };
            return char::from_u32(value);
        }
    };
    Some(named)
}

fn flag(attrs: &Attrs, key: &str) -> bool {
    attrs.get(key).is_some_and(|v| v == "1" || v == "true")
}

fn text(attrs: &Attrs, key: &str) -> String {
    attrs.get(key).cloned().unwrap_or_default()
}

/// Build a rule from a `<dataValidation>` element, or None for a kind we drop.
fn rule_from_attrs(attrs: &Attrs, formula1: Option<&str>) -> Option<ValidationRule> {
    let rule_type = match attrs.get("type").map_or("none", String::as_str) {
        "none" => ValidationType::AnyValue,
        "list" => ValidationType::List(parse_list_source(formula1?)?),
        _ => return None,
    };

    let mut rule = ValidationRule::new(rule_type).with_ignore_blank(flag(attrs, "allowBlank"));
    rule.show_dropdown = !flag(attrs, "showDropDown");

    let (prompt_title, prompt) = (text(attrs, "promptTitle"), text(attrs, "prompt"));
    if flag(attrs, "showInputMessage") && !(prompt_title.is_empty() && prompt.is_empty()) {
        rule.input_message = Some(InputMessage::new(prompt_title, prompt));
    }

    let style = match attrs.get("errorStyle").map(String::as_str) {
        Some("warning") => ErrorStyle::Warning,
        Some("information") => ErrorStyle::Information,
        _ => ErrorStyle::Stop,
    };
    if flag(attrs, "showErrorMessage") {
        rule.error_alert = Some(ErrorAlert::new(style, text(attrs, "errorTitle"), text(attrs, "error")));
    } else if style != ErrorStyle::Stop {
        // Excel still lets a non-Stop style through without showing an alert.
        rule.error_alert = Some(ErrorAlert { show: false, ..ErrorAlert::new(style, "", "") });
    }

    Some(rule)
}

fn parse_list_source(formula1: &str) -> Option<ListSource> {
    let formula1 = formula1.trim();
    if formula1.is_empty() {
        return None;
    }

    if let Some(literal) = formula1.strip_prefix('"').and_then(|rest| rest.strip_suffix('"')) {
        return Some(ListSource::Inline(literal.split(',').map(|item| item.trim().to_string()).collect()));
    }
    if formula1.contains(['$', ':', '!']) {
        return Some(ListSource::Range(format!("={}", formula1)));
    }
    Some(ListSource::NamedRange(formula1.to_string()))
}

/// Space-separated sqref list (`"A1:A10 C1:C10"`) to ranges. Bad parts are skipped.
fn parse_sqref(sqref: &str) -> Vec<CellRange> {
    sqref.split_whitespace().filter_map(parse_single_range).collect()
}

/// `A1` or `A1:B10`.
pub(crate) fn parse_single_range(reference: &str) -> Option<CellRange> {
    let reference = reference.trim();
    let (first, last) = reference.split_once(':').unwrap_or((reference, reference));
    let (row_a, col_a) = parse_cell_ref(first)?;
    let (row_b, col_b) = parse_cell_ref(last)?;
    Some(CellRange::new(row_a, col_a, row_b, col_b))
}
