pub mod cell;
pub mod cell_ref;
pub mod populate;
pub mod roster;
pub mod sheet;
pub mod validation;
pub mod workbook;
