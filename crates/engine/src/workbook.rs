use serde::{Deserialize, Serialize};

use crate::sheet::Sheet;

/// An ordered set of sheets plus the index of the sheet the workbook opens on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workbook {
    sheets: Vec<Sheet>,
    active_sheet: usize,
}

impl Default for Workbook {
    fn default() -> Self {
        Self::new()
    }
}

impl Workbook {
    /// A workbook with a single empty `Sheet1`.
    pub fn new() -> Self {
        Self {
            sheets: vec![Sheet::new("Sheet1")],
            active_sheet: 0,
        }
    }

    /// Create a workbook from existing sheets. `active` is clamped into range.
    pub fn from_sheets(sheets: Vec<Sheet>, active: usize) -> Self {
        let active_sheet = active.min(sheets.len().saturating_sub(1));
        Self { sheets, active_sheet }
    }

    pub fn sheet_count(&self) -> usize {
        self.sheets.len()
    }

    pub fn active_sheet_index(&self) -> usize {
        self.active_sheet
    }

    /// Set the active sheet by index
    pub fn set_active_sheet(&mut self, index: usize) -> bool {
        if index < self.sheets.len() {
            self.active_sheet = index;
            true
        } else {
            false
        }
    }

    /// The sheet the workbook opens on, or `None` for a workbook with no sheets.
    pub fn active_sheet(&self) -> Option<&Sheet> {
        self.sheets.get(self.active_sheet)
    }

    pub fn active_sheet_mut(&mut self) -> Option<&mut Sheet> {
        self.sheets.get_mut(self.active_sheet)
    }

    pub fn sheet(&self, index: usize) -> Option<&Sheet> {
        self.sheets.get(index)
    }

    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(|s| s.name.as_str()).collect()
    }

    /// Case-insensitive lookup, matching how spreadsheet apps treat tab names.
    pub fn sheet_index_by_name(&self, name: &str) -> Option<usize> {
        let lower = name.to_lowercase();
        self.sheets.iter().position(|s| s.name.to_lowercase() == lower)
    }

    pub fn sheet_by_name_mut(&mut self, name: &str) -> Option<&mut Sheet> {
        let index = self.sheet_index_by_name(name)?;
        self.sheets.get_mut(index)
    }

    /// Append a sheet with the given name. Returns `None` if the name is taken.
    pub fn add_sheet_named(&mut self, name: &str) -> Option<usize> {
        if self.sheet_index_by_name(name).is_some() {
            return None;
        }
        self.sheets.push(Sheet::new(name));
        Some(self.sheets.len() - 1)
    }

    pub fn sheets(&self) -> &[Sheet] {
        &self.sheets
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_has_active_sheet() {
        let wb = Workbook::new();
        assert_eq!(wb.sheet_count(), 1);
        assert_eq!(wb.active_sheet().map(|s| s.name.as_str()), Some("Sheet1"));
    }

    #[test]
    fn test_empty_workbook_has_no_active_sheet() {
        let mut wb = Workbook::from_sheets(Vec::new(), 0);
        assert!(wb.active_sheet().is_none());
        assert!(wb.active_sheet_mut().is_none());
    }

    #[test]
    fn test_from_sheets_clamps_active() {
        let wb = Workbook::from_sheets(vec![Sheet::new("A"), Sheet::new("B")], 7);
        assert_eq!(wb.active_sheet_index(), 1);
    }

    #[test]
    fn test_sheet_lookup_and_add() {
        let mut wb = Workbook::new();
        assert_eq!(wb.add_sheet_named("Onboarding"), Some(1));
        assert_eq!(wb.add_sheet_named("onboarding"), None);
        assert_eq!(wb.sheet_index_by_name("ONBOARDING"), Some(1));
        assert!(wb.set_active_sheet(1));
        assert!(!wb.set_active_sheet(2));
        assert_eq!(wb.sheet_names(), vec!["Sheet1", "Onboarding"]);
    }
}
