//! Cell data validation.
//!
//! A sheet keeps its rules in a [`ValidationStore`], keyed by the rectangle
//! each rule covers. Only list rules (dropdowns) are enforced; any other rule
//! kind read from a workbook is discarded on import.
//!
//! List membership is exact after trimming the candidate, so
//! `"byron andino (2345)"` does not match `"Byron Andino (2345)"`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::cell_ref::col_to_letters;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationRule {
    pub rule_type: ValidationType,
    /// Blank input passes regardless of the rule.
    pub ignore_blank: bool,
    /// Show the in-cell dropdown arrow (list rules only).
    pub show_dropdown: bool,
    pub input_message: Option<InputMessage>,
    /// None behaves like a Stop alert with the application's default text.
    pub error_alert: Option<ErrorAlert>,
}

impl ValidationRule {
    pub fn new(rule_type: ValidationType) -> Self {
        Self {
            show_dropdown: matches!(rule_type, ValidationType::List(_)),
            rule_type,
            ignore_blank: true,
            input_message: None,
            error_alert: None,
        }
    }

    /// Dropdown whose items are stored in the rule itself.
    pub fn list_inline(values: Vec<String>) -> Self {
        Self::new(ValidationType::List(ListSource::Inline(values)))
    }

    /// Dropdown reading its items from a cell range such as `=Lists!$A$1:$A$40`.
    pub fn list_range(range_ref: impl Into<String>) -> Self {
        Self::new(ValidationType::List(ListSource::Range(range_ref.into())))
    }

    pub fn with_ignore_blank(self, ignore_blank: bool) -> Self {
        Self { ignore_blank, ..self }
    }

    pub fn with_input_message(self, message: InputMessage) -> Self {
        Self { input_message: Some(message), ..self }
    }

    pub fn with_error_alert(self, alert: ErrorAlert) -> Self {
        Self { error_alert: Some(alert), ..self }
    }

    pub fn inline_items(&self) -> Option<&[String]> {
        match &self.rule_type {
            ValidationType::List(ListSource::Inline(items)) => Some(items.as_slice()),
            _ => None,
        }
    }

    /// Whether a failing value is refused instead of stored with a warning.
    pub fn rejects_invalid(&self) -> bool {
        self.error_alert
            .as_ref()
            .map_or(true, |alert| alert.show && alert.style == ErrorStyle::Stop)
    }

    /// Test `value` against the rule.
    ///
    /// Range and named-range sources live outside the rule, so they accept
    /// anything here.
    pub fn check(&self, value: &str) -> ValidationResult {
        let value = value.trim();
        let failure = if value.is_empty() {
            (!self.ignore_blank).then(|| "a value is required".to_string())
        } else {
            match &self.rule_type {
                ValidationType::List(ListSource::Inline(items))
                    if !items.iter().any(|item| item.trim() == value) =>
                {
                    Some(format!("'{value}' is not in the list"))
                }
                _ => None,
            }
        };

        match failure {
            None => ValidationResult::Valid,
            Some(reason) => ValidationResult::Invalid { rule: self.clone(), reason },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ValidationType {
    AnyValue,
    List(ListSource),
}

/// Where a dropdown gets its items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ListSource {
    Inline(Vec<String>),
    /// Formula text including the leading `=`.
    Range(String),
    NamedRange(String),
}

/// Prompt shown while a validated cell is selected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputMessage {
    pub show: bool,
    pub title: String,
    pub message: String,
}

impl InputMessage {
    pub fn new(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self { show: true, title: title.into(), message: message.into() }
    }
}

/// Alert raised when a value fails the rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorAlert {
    pub show: bool,
    pub style: ErrorStyle,
    pub title: String,
    pub message: String,
}

impl ErrorAlert {
    pub fn new(style: ErrorStyle, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self { show: true, style, title: title.into(), message: message.into() }
    }

    pub fn stop(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorStyle::Stop, title, message)
    }

    pub fn warning(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorStyle::Warning, title, message)
    }
}

impl Default for ErrorAlert {
    fn default() -> Self {
        Self::stop("Invalid Entry", "Pick a value from the dropdown list.")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ErrorStyle {
    /// Refuse the value.
    #[default]
    Stop,
    /// Ask before keeping the value.
    Warning,
    /// Keep the value and tell the user.
    Information,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ValidationResult {
    Valid,
    Invalid { rule: ValidationRule, reason: String },
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }

    pub fn is_invalid(&self) -> bool {
        !self.is_valid()
    }
}

/// Inclusive, 0-indexed rectangle of cells.
///
/// Field order gives the derived ordering: top-left corner first, then the
/// bottom-right corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CellRange {
    pub start_row: usize,
    pub start_col: usize,
    pub end_row: usize,
    pub end_col: usize,
}

impl CellRange {
    /// Build a range from any two opposite corners.
    pub fn new(row_a: usize, col_a: usize, row_b: usize, col_b: usize) -> Self {
        Self {
            start_row: row_a.min(row_b),
            start_col: col_a.min(col_b),
            end_row: row_a.max(row_b),
            end_col: col_a.max(col_b),
        }
    }

    pub fn single(row: usize, col: usize) -> Self {
        Self { start_row: row, start_col: col, end_row: row, end_col: col }
    }

    pub fn contains(&self, row: usize, col: usize) -> bool {
        (self.start_row..=self.end_row).contains(&row) && (self.start_col..=self.end_col).contains(&col)
    }

    pub fn overlaps(&self, other: &CellRange) -> bool {
        self.start_row <= other.end_row
            && other.start_row <= self.end_row
            && self.start_col <= other.end_col
            && other.start_col <= self.end_col
    }

    pub fn row_count(&self) -> usize {
        self.end_row - self.start_row + 1
    }

    /// The cells of `self` outside `other`, as at most four rectangles.
    ///
    /// Bands above and below the overlap span the full width; the left and
    /// right pieces cover only the overlapping rows.
    pub fn subtract(&self, other: &CellRange) -> Vec<CellRange> {
        if !self.overlaps(other) {
            return vec![*self];
        }
        let top = self.start_row.max(other.start_row);
        let bottom = self.end_row.min(other.end_row);
        let left = self.start_col.max(other.start_col);
        let right = self.end_col.min(other.end_col);

        let mut pieces = Vec::with_capacity(4);
        if self.start_row < top {
            pieces.push(CellRange::new(self.start_row, self.start_col, top - 1, self.end_col));
        }
        if bottom < self.end_row {
            pieces.push(CellRange::new(bottom + 1, self.start_col, self.end_row, self.end_col));
        }
        if self.start_col < left {
            pieces.push(CellRange::new(top, self.start_col, bottom, left - 1));
        }
        if right < self.end_col {
            pieces.push(CellRange::new(top, right + 1, bottom, self.end_col));
        }
        pieces
    }

    fn is_single(&self) -> bool {
        self.start_row == self.end_row && self.start_col == self.end_col
    }

    /// A1 notation: `L2:L11`, or `B3` for one cell.
    pub fn to_a1(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for CellRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", col_to_letters(self.start_col), self.start_row + 1)?;
        if !self.is_single() {
            write!(f, ":{}{}", col_to_letters(self.end_col), self.end_row + 1)?;
        }
        Ok(())
    }
}

/// A sheet's validation rules, iterated in range order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationStore {
    rules: BTreeMap<CellRange, ValidationRule>,
}

impl ValidationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `rule` on `range`, replacing a rule on exactly the same range.
    pub fn set(&mut self, range: CellRange, rule: ValidationRule) {
        self.rules.insert(range, rule);
    }

    /// Remove validation from the cells of `range`.
    ///
    /// A rule reaching outside `range` keeps its other cells: it is split
    /// into the rectangles left over. Returns the number of rules touched.
    pub fn clear_range(&mut self, range: &CellRange) -> usize {
        let touched: Vec<CellRange> = self.rules.keys().filter(|r| r.overlaps(range)).copied().collect();
        for covered in &touched {
            if let Some(rule) = self.rules.remove(covered) {
                for rest in covered.subtract(range) {
                    self.rules.insert(rest, rule.clone());
                }
            }
        }
        touched.len()
    }

    /// Rule governing a cell. The lowest range wins when several cover it.
    pub fn get(&self, row: usize, col: usize) -> Option<&ValidationRule> {
        self.rules
            .iter()
            .find_map(|(range, rule)| range.contains(row, col).then_some(rule))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&CellRange, &ValidationRule)> {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
