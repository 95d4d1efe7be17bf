// Workbook and roster file I/O

pub mod roster;
pub mod xlsx;
pub mod xlsx_patch;
pub mod xlsx_validation;
