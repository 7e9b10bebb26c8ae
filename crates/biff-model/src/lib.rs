//! Value types shared by the BIFF decoding crates.
//!
//! These are deliberately small: cell coordinates and ranges in A1 form, the fixed set of
//! spreadsheet error values, and the workbook date system.

mod address;
mod date_system;
mod error_value;

pub use address::{col_to_name, A1ParseError, CellRef, Range, RangeParseError};
pub use date_system::DateSystem;
pub use error_value::ErrorValue;

/// Number of rows addressable by a BIFF8 worksheet.
pub const BIFF8_MAX_ROWS: u32 = 65_536;
/// Number of columns addressable by a BIFF8 worksheet.
pub const BIFF8_MAX_COLS: u32 = 256;
/// Number of rows addressable by a BIFF5/BIFF7 worksheet.
pub const BIFF7_MAX_ROWS: u32 = 16_384;
