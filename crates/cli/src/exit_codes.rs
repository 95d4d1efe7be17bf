//! Exit codes for `rgrid`.
//!
//! Scripts branch on these, so a code never changes meaning once released.
//!
//! # Exit Code Ranges
//!
//! | Range   | Domain           | Description                              |
//! |---------|------------------|------------------------------------------|
//! | 0       | Universal        | Success                                  |
//! | 1       | Universal        | General error (unspecified)              |
//! | 2       | Universal        | CLI usage error (bad args, bad column)   |
//! | 3-9     | files            | I/O, parse and format errors             |
//! | 20-29   | populate         | Dropdown placement failures              |
//! | 50-59   | fetch            | HR directory connectors                  |

use rostergrid_engine::populate::PopulateError;

// =============================================================================
// Universal (0-2)
// =============================================================================

pub const EXIT_SUCCESS: u8 = 0;

/// Anything without a more specific code.
pub const EXIT_ERROR: u8 = 1;

/// Bad arguments, including an unparseable column.
pub const EXIT_USAGE: u8 = 2;

// =============================================================================
// Files (3-9)
// =============================================================================

/// File could not be read or written.
pub const EXIT_IO: u8 = 3;

/// Roster or config file is malformed.
pub const EXIT_PARSE: u8 = 4;

/// Workbook format not supported for the operation (e.g. writing .ods).
pub const EXIT_FORMAT: u8 = 5;

// =============================================================================
// Populate (20-29)
// =============================================================================

/// Workbook has no active sheet, or the named sheet does not exist.
pub const EXIT_NO_SHEET: u8 = 20;

/// Target range falls outside the sheet grid.
pub const EXIT_OUT_OF_BOUNDS: u8 = 21;

/// Derived range height is zero or negative (sheet has no rows below the header).
pub const EXIT_DEGENERATE_RANGE: u8 = 22;

/// Roster has no records.
pub const EXIT_EMPTY_ROSTER: u8 = 23;

// =============================================================================
// Fetch (50-59)
// =============================================================================

/// No API key or subdomain provided (flag, env, keychain or config).
pub const EXIT_FETCH_NOT_AUTH: u8 = 50;

/// Auth rejected by upstream (401/403).
pub const EXIT_FETCH_AUTH: u8 = 51;

/// Bad request rejected by upstream (400).
pub const EXIT_FETCH_VALIDATION: u8 = 52;

/// Rate limited after retries (429).
pub const EXIT_FETCH_RATE_LIMIT: u8 = 53;

/// Upstream error (5xx), unexpected response, or network failure after retries.
pub const EXIT_FETCH_UPSTREAM: u8 = 54;

/// Map a populate failure to its exit code.
pub fn populate_exit_code(err: &PopulateError) -> u8 {
    match err {
        PopulateError::NoActiveSheet | PopulateError::SheetNotFound(_) => EXIT_NO_SHEET,
        PopulateError::OutOfBounds { .. } => EXIT_OUT_OF_BOUNDS,
        PopulateError::DegenerateRange { .. } => EXIT_DEGENERATE_RANGE,
        PopulateError::EmptyRoster => EXIT_EMPTY_ROSTER,
    }
}
