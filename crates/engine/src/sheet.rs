use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::cell::CellValue;
use crate::validation::{ValidationResult, ValidationStore};

/// Excel's addressable grid. Ranges past these bounds cannot be written.
pub const MAX_ROWS: usize = 1_048_576;
pub const MAX_COLS: usize = 16_384;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sheet {
    pub name: String,
    cells: HashMap<(usize, usize), CellValue>,
    pub rows: usize,
    pub cols: usize,
    pub validations: ValidationStore,
}

impl Sheet {
    pub fn new(name: &str) -> Self {
        Self::with_size(name, MAX_ROWS, MAX_COLS)
    }

    pub fn with_size(name: &str, rows: usize, cols: usize) -> Self {
        Self {
            name: name.to_string(),
            cells: HashMap::new(),
            rows,
            cols,
            validations: ValidationStore::new(),
        }
    }

    /// Store raw input without consulting validation rules.
    pub fn set_value(&mut self, row: usize, col: usize, value: &str) {
        self.set_cell(row, col, CellValue::from_input(value));
    }

    pub fn set_cell(&mut self, row: usize, col: usize, value: CellValue) {
        if value.is_empty() {
            self.cells.remove(&(row, col));
        } else {
            self.cells.insert((row, col), value);
        }
    }

    /// Enter a value the way a user would, honouring the cell's validation rule.
    ///
    /// A Stop rule refuses invalid input and leaves the cell untouched. Any
    /// other alert style stores the value and still reports the violation.
    pub fn enter_value(&mut self, row: usize, col: usize, value: &str) -> ValidationResult {
        let result = match self.validations.get(row, col) {
            Some(rule) => {
                let result = rule.check(value);
                if result.is_invalid() && rule.rejects_invalid() {
                    return result;
                }
                result
            }
            None => ValidationResult::Valid,
        };
        self.set_value(row, col, value);
        result
    }

    pub fn get_cell(&self, row: usize, col: usize) -> &CellValue {
        static EMPTY: CellValue = CellValue::Empty;
        self.cells.get(&(row, col)).unwrap_or(&EMPTY)
    }

    pub fn get_display(&self, row: usize, col: usize) -> String {
        self.get_cell(row, col).display()
    }

    pub fn cells_iter(&self) -> impl Iterator<Item = (&(usize, usize), &CellValue)> {
        self.cells.iter()
    }

    pub fn non_empty_cells(&self) -> usize {
        self.cells.len()
    }

    /// 1-based index of the last row holding a value, or 0 for an empty sheet.
    pub fn last_row(&self) -> usize {
        self.cells.keys().map(|(row, _)| row + 1).max().unwrap_or(0)
    }

    /// Dropdown items for a cell with an inline list rule.
    pub fn list_items(&self, row: usize, col: usize) -> Option<&[String]> {
        self.validations.get(row, col)?.inline_items()
    }
}
