//! Roster dropdown populator
//!
//! Turns a list of [`EmployeeRecord`]s into a list-validation rule and installs
//! it on one column of a sheet, replacing whatever rule was there before.
//!
//! The sheet is reached only through [`SheetHost`], so the populator runs the
//! same against an imported workbook or a test double.
//!
//! ## Row span
//!
//! The range starts at `first_row` and its height is derived from the sheet's
//! last occupied row by [`RowSpanPolicy`]. The default, `LastRowAsHeight`,
//! uses the last row number directly as the height, so with data ending on
//! row 10 the rule covers rows 2..=11, one row past the data. `ThroughLastRow`
//! stops at the last occupied row instead.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::roster::{dropdown_labels, EmployeeRecord};
use crate::sheet::Sheet;
use crate::validation::{CellRange, ErrorAlert, ErrorStyle, ValidationRule};
use crate::workbook::Workbook;

/// Column `L`.
pub const DEFAULT_COLUMN: usize = 12;
/// Row 1 holds headers.
pub const DEFAULT_FIRST_ROW: usize = 2;

// ============================================================================
// Host capability
// ============================================================================

/// The slice of a spreadsheet the populator needs. Rows and columns are
/// 1-based at this boundary.
pub trait SheetHost {
    /// Last row holding any value, or 0 for an empty sheet.
    fn last_row(&self) -> usize;

    /// Resolve a single-column range of `num_rows` rows starting at
    /// (`start_row`, `column`).
    fn range(&self, start_row: usize, column: usize, num_rows: usize) -> Result<CellRange, PopulateError>;

    /// Remove validation from the cells of `range` only. Clearing an
    /// unvalidated range is a no-op.
    fn clear_validation(&mut self, range: &CellRange);

    /// Attach `rule` uniformly to every cell of `range`.
    fn set_validation(&mut self, range: CellRange, rule: ValidationRule);
}

impl SheetHost for Sheet {
    fn last_row(&self) -> usize {
        Sheet::last_row(self)
    }

    fn range(&self, start_row: usize, column: usize, num_rows: usize) -> Result<CellRange, PopulateError> {
        if num_rows == 0 {
            return Err(PopulateError::DegenerateRange { first_row: start_row, height: 0 });
        }
        let end_row = start_row.checked_add(num_rows - 1);
        match end_row {
            Some(end_row)
                if start_row >= 1 && column >= 1 && end_row <= self.rows && column <= self.cols =>
            {
                Ok(CellRange::new(start_row - 1, column - 1, end_row - 1, column - 1))
            }
            _ => Err(PopulateError::OutOfBounds {
                start_row,
                column,
                num_rows,
                max_rows: self.rows,
                max_cols: self.cols,
            }),
        }
    }

    fn clear_validation(&mut self, range: &CellRange) {
        let dropped = self.validations.clear_range(range);
        if dropped > 0 {
            log::debug!("cleared validation on {} ({} rule(s) trimmed)", range, dropped);
        }
    }

    fn set_validation(&mut self, range: CellRange, rule: ValidationRule) {
        self.validations.set(range, rule);
    }
}

// ============================================================================
// Target
// ============================================================================

/// How the range height is derived from the sheet's last occupied row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RowSpanPolicy {
    /// Height equals the last row number, reaching one row past the data.
    #[default]
    LastRowAsHeight,
    /// Height stops at the last occupied row.
    ThroughLastRow,
}

impl RowSpanPolicy {
    /// Signed height so that degenerate spans stay visible to the caller.
    pub fn height(&self, last_row: usize, first_row: usize) -> i64 {
        match self {
            RowSpanPolicy::LastRowAsHeight => last_row as i64,
            RowSpanPolicy::ThroughLastRow => last_row as i64 - first_row as i64 + 1,
        }
    }
}

/// Where the dropdown goes and how strictly it is enforced.
#[derive(Debug, Clone, PartialEq)]
pub struct DropdownTarget {
    /// 1-based column number.
    pub column: usize,
    /// 1-based first row of the range; rows above it are headers.
    pub first_row: usize,
    pub span: RowSpanPolicy,
    /// Flag invalid input with a warning instead of rejecting it.
    pub allow_invalid: bool,
    /// Title and message shown on invalid input. The style comes from `allow_invalid`.
    pub alert: ErrorAlert,
}

impl Default for DropdownTarget {
    fn default() -> Self {
        Self {
            column: DEFAULT_COLUMN,
            first_row: DEFAULT_FIRST_ROW,
            span: RowSpanPolicy::default(),
            allow_invalid: false,
            alert: ErrorAlert::default(),
        }
    }
}

impl DropdownTarget {
    /// The list rule for a set of labels.
    pub fn rule_for(&self, labels: Vec<String>) -> ValidationRule {
        let mut alert = self.alert.clone();
        alert.show = true;
        alert.style = if self.allow_invalid { ErrorStyle::Warning } else { ErrorStyle::Stop };
        ValidationRule::list_inline(labels).with_error_alert(alert)
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum PopulateError {
    /// The workbook has no sheet to act on.
    NoActiveSheet,
    /// A sheet was requested by name and does not exist.
    SheetNotFound(String),
    /// The requested range falls outside the sheet's grid.
    OutOfBounds {
        start_row: usize,
        column: usize,
        num_rows: usize,
        max_rows: usize,
        max_cols: usize,
    },
    /// The derived range height is zero or negative.
    DegenerateRange { first_row: usize, height: i64 },
    /// There are no records to build a dropdown from.
    EmptyRoster,
}

impl fmt::Display for PopulateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoActiveSheet => write!(f, "workbook has no active sheet"),
            Self::SheetNotFound(name) => write!(f, "sheet '{name}' not found"),
            Self::OutOfBounds { start_row, column, num_rows, max_rows, max_cols } => write!(
                f,
                "range of {num_rows} row(s) at row {start_row}, column {column} is outside the sheet ({max_rows} rows x {max_cols} columns)"
            ),
            Self::DegenerateRange { first_row, height } => {
                write!(f, "range starting at row {first_row} has height {height}")
            }
            Self::EmptyRoster => write!(f, "roster is empty"),
        }
    }
}

impl std::error::Error for PopulateError {}

// ============================================================================
// Populate
// ============================================================================

/// What a successful run installed.
#[derive(Debug, Clone, PartialEq)]
pub struct PopulateOutcome {
    pub range: CellRange,
    pub labels: Vec<String>,
}

/// Install the roster dropdown on `host`, replacing any rule on the range.
///
/// Straight-line and idempotent: running it twice with the same records
/// leaves the same single rule in place.
pub fn populate<H: SheetHost + ?Sized>(
    host: &mut H,
    records: &[EmployeeRecord],
    target: &DropdownTarget,
) -> Result<PopulateOutcome, PopulateError> {
    let labels = dropdown_labels(records);
    if labels.is_empty() {
        return Err(PopulateError::EmptyRoster);
    }

    let last_row = host.last_row();
    let height = target.span.height(last_row, target.first_row);
    if height <= 0 {
        return Err(PopulateError::DegenerateRange { first_row: target.first_row, height });
    }

    let range = host.range(target.first_row, target.column, height as usize)?;
    host.clear_validation(&range);
    host.set_validation(range, target.rule_for(labels.clone()));

    log::info!("dropdown added on {} ({} labels)", range, labels.len());

    Ok(PopulateOutcome { range, labels })
}

/// Pick the sheet to act on: a named sheet, or the workbook's active sheet.
pub fn target_sheet<'a>(workbook: &'a mut Workbook, name: Option<&str>) -> Result<&'a mut Sheet, PopulateError> {
    match name {
        Some(name) => workbook
            .sheet_by_name_mut(name)
            .ok_or_else(|| PopulateError::SheetNotFound(name.to_string())),
        None => workbook.active_sheet_mut().ok_or(PopulateError::NoActiveSheet),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn reports_to() -> Vec<EmployeeRecord> {
        vec![
            EmployeeRecord::new("2379", "Hanifah Abolais"),
            EmployeeRecord::new("2345", "Byron Andino"),
            EmployeeRecord::new("2227", "Dean Antonio"),
        ]
    }

    fn sheet_with_rows(last_row: usize) -> Sheet {
        let mut sheet = Sheet::new("Onboarding");
        for row in 0..last_row {
            sheet.set_value(row, 0, &format!("row {}", row + 1));
        }
        sheet
    }

    /// Records every host call so ordering can be asserted.
    #[derive(Default)]
    struct RecordingHost {
        last_row: usize,
        calls: Vec<String>,
        installed: Vec<(CellRange, ValidationRule)>,
    }

    impl SheetHost for RecordingHost {
        fn last_row(&self) -> usize {
            self.last_row
        }

        fn range(&self, start_row: usize, column: usize, num_rows: usize) -> Result<CellRange, PopulateError> {
            Ok(CellRange::new(start_row - 1, column - 1, start_row + num_rows - 2, column - 1))
        }

        fn clear_validation(&mut self, range: &CellRange) {
            self.calls.push(format!("clear {}", range));
            self.installed = self
                .installed
                .drain(..)
                .flat_map(|(r, rule)| r.subtract(range).into_iter().map(move |rest| (rest, rule.clone())))
                .collect();
        }

        fn set_validation(&mut self, range: CellRange, rule: ValidationRule) {
            self.calls.push(format!("set {}", range));
            self.installed.push((range, rule));
        }
    }

    #[test]
    fn test_installs_reports_to_labels() {
        let mut sheet = sheet_with_rows(4);
        let outcome = populate(&mut sheet, &reports_to(), &DropdownTarget::default()).unwrap();

        assert_eq!(
            outcome.labels,
            vec!["Hanifah Abolais (2379)", "Byron Andino (2345)", "Dean Antonio (2227)"]
        );
        assert_eq!(sheet.list_items(1, 11).unwrap(), outcome.labels.as_slice());
    }

    #[test]
    fn test_clear_happens_before_set() {
        let mut host = RecordingHost { last_row: 3, ..Default::default() };
        populate(&mut host, &reports_to(), &DropdownTarget::default()).unwrap();
        assert_eq!(host.calls, vec!["clear L2:L4", "set L2:L4"]);
    }

    #[test]
    fn test_header_only_sheet_covers_row_two() {
        let mut sheet = sheet_with_rows(1);
        let outcome = populate(&mut sheet, &reports_to(), &DropdownTarget::default()).unwrap();
        assert_eq!(outcome.range, CellRange::single(1, 11));
        assert_eq!(outcome.range.row_count(), 1);
    }

    #[test]
    fn test_last_row_ten_reaches_row_eleven() {
        let mut sheet = sheet_with_rows(10);
        let outcome = populate(&mut sheet, &reports_to(), &DropdownTarget::default()).unwrap();
        assert_eq!(outcome.range.to_a1(), "L2:L11");
        assert_eq!(outcome.range.row_count(), 10);
    }

    #[test]
    fn test_through_last_row_stops_at_data() {
        let mut sheet = sheet_with_rows(10);
        let target = DropdownTarget { span: RowSpanPolicy::ThroughLastRow, ..Default::default() };
        let outcome = populate(&mut sheet, &reports_to(), &target).unwrap();
        assert_eq!(outcome.range.to_a1(), "L2:L10");
    }

    #[test]
    fn test_empty_sheet_is_degenerate() {
        let mut sheet = sheet_with_rows(0);
        let err = populate(&mut sheet, &reports_to(), &DropdownTarget::default()).unwrap_err();
        assert_eq!(err, PopulateError::DegenerateRange { first_row: 2, height: 0 });
        assert!(sheet.validations.is_empty());
    }

    #[test]
    fn test_header_only_through_last_row_is_degenerate() {
        let mut sheet = sheet_with_rows(1);
        let target = DropdownTarget { span: RowSpanPolicy::ThroughLastRow, ..Default::default() };
        let err = populate(&mut sheet, &reports_to(), &target).unwrap_err();
        assert_eq!(err, PopulateError::DegenerateRange { first_row: 2, height: 0 });
    }

    #[test]
    fn test_column_out_of_bounds() {
        let mut sheet = Sheet::with_size("Small", 100, 10);
        sheet.set_value(4, 0, "x");
        let err = populate(&mut sheet, &reports_to(), &DropdownTarget::default()).unwrap_err();
        assert!(matches!(err, PopulateError::OutOfBounds { column: 12, .. }));
    }

    #[test]
    fn test_rows_out_of_bounds() {
        let mut sheet = Sheet::with_size("Short", 10, 20);
        sheet.set_value(9, 0, "x");
        // Height 10 from row 2 ends on row 11, past a 10-row grid.
        let err = populate(&mut sheet, &reports_to(), &DropdownTarget::default()).unwrap_err();
        assert!(matches!(err, PopulateError::OutOfBounds { num_rows: 10, max_rows: 10, .. }));
    }

    #[test]
    fn test_empty_roster_rejected() {
        let mut sheet = sheet_with_rows(3);
        let err = populate(&mut sheet, &[], &DropdownTarget::default()).unwrap_err();
        assert_eq!(err, PopulateError::EmptyRoster);
    }

    #[test]
    fn test_replaces_previous_rule() {
        let mut sheet = sheet_with_rows(5);
        sheet.validations.set(
            CellRange::new(3, 11, 20, 11),
            ValidationRule::list_inline(vec!["Old Manager (1)".into()]),
        );
        let outcome = populate(&mut sheet, &reports_to(), &DropdownTarget::default()).unwrap();
        assert_eq!(outcome.range.to_a1(), "L2:L6");

        assert_eq!(sheet.list_items(3, 11).map(<[String]>::len), Some(3));
        // Rows past the new range keep the old list.
        assert_eq!(sheet.list_items(6, 11).unwrap(), ["Old Manager (1)".to_string()]);
        assert_eq!(sheet.list_items(20, 11).unwrap(), ["Old Manager (1)".to_string()]);
        assert!(sheet.validations.get(21, 11).is_none());
        assert_eq!(sheet.validations.len(), 2);
    }

    #[test]
    fn test_column_rule_outside_target_is_kept() {
        let mut sheet = sheet_with_rows(5);
        sheet.validations.set(
            CellRange::new(0, 11, 99, 11),
            ValidationRule::list_inline(vec!["Old Manager (1)".into()]),
        );
        let outcome = populate(&mut sheet, &reports_to(), &DropdownTarget::default()).unwrap();
        assert_eq!(outcome.range.to_a1(), "L2:L6");

        assert_eq!(sheet.list_items(0, 11).unwrap(), ["Old Manager (1)".to_string()]);
        assert_eq!(sheet.list_items(49, 11).unwrap(), ["Old Manager (1)".to_string()]);
        assert_eq!(sheet.list_items(1, 11).map(<[String]>::len), Some(3));
        assert_eq!(sheet.list_items(5, 11).map(<[String]>::len), Some(3));
    }

    #[test]
    fn test_rules_in_other_columns_survive() {
        let mut sheet = sheet_with_rows(5);
        sheet.validations.set(
            CellRange::new(1, 3, 5, 3),
            ValidationRule::list_inline(vec!["Remote".into(), "Onsite".into()]),
        );
        populate(&mut sheet, &reports_to(), &DropdownTarget::default()).unwrap();
        assert_eq!(sheet.validations.len(), 2);
        assert!(sheet.validations.get(2, 3).is_some());
    }

    #[test]
    fn test_populate_is_idempotent() {
        let mut once = sheet_with_rows(6);
        populate(&mut once, &reports_to(), &DropdownTarget::default()).unwrap();

        let mut twice = sheet_with_rows(6);
        populate(&mut twice, &reports_to(), &DropdownTarget::default()).unwrap();
        populate(&mut twice, &reports_to(), &DropdownTarget::default()).unwrap();

        let a: Vec<_> = once.validations.iter().collect();
        let b: Vec<_> = twice.validations.iter().collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_uniform_rule_rejects_free_text() {
        let mut sheet = sheet_with_rows(4);
        populate(&mut sheet, &reports_to(), &DropdownTarget::default()).unwrap();

        for row in 1..=4 {
            assert!(sheet.enter_value(row, 11, "someone").is_invalid());
            assert_eq!(sheet.get_display(row, 11), "");
        }
        assert!(sheet.enter_value(3, 11, "Dean Antonio (2227)").is_valid());
    }

    #[test]
    fn test_allow_invalid_uses_warning() {
        let target = DropdownTarget { allow_invalid: true, ..Default::default() };
        let rule = target.rule_for(vec!["A (1)".into()]);
        assert!(!rule.rejects_invalid());
        assert_eq!(rule.error_alert.unwrap().style, ErrorStyle::Warning);
    }

    #[test]
    fn test_target_sheet_resolution() {
        let mut wb = Workbook::new();
        wb.add_sheet_named("Onboarding");
        assert_eq!(target_sheet(&mut wb, None).unwrap().name, "Sheet1");
        assert_eq!(target_sheet(&mut wb, Some("onboarding")).unwrap().name, "Onboarding");
        assert_eq!(
            target_sheet(&mut wb, Some("Missing")).unwrap_err(),
            PopulateError::SheetNotFound("Missing".into())
        );

        let mut empty = Workbook::from_sheets(Vec::new(), 0);
        assert_eq!(target_sheet(&mut empty, None).unwrap_err(), PopulateError::NoActiveSheet);
    }

    #[test]
    fn test_span_heights() {
        assert_eq!(RowSpanPolicy::LastRowAsHeight.height(10, 2), 10);
        assert_eq!(RowSpanPolicy::ThroughLastRow.height(10, 2), 9);
        assert_eq!(RowSpanPolicy::ThroughLastRow.height(0, 2), -1);
    }
}
