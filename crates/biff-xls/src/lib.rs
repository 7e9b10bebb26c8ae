//! Legacy Excel 5.0-2003 (BIFF7/BIFF8) workbook stream decoding.
//!
//! The input is the raw `Workbook`/`Book` stream already extracted from its compound file: a
//! sequence of `[id: u16][len: u16][data]` records. Decoding is a single forward pass that
//! builds the workbook tables from the globals substream and then one [`Sheet`] per worksheet
//! substream. Cell values (including the last calculated value of formulas) are available
//! immediately; formula text is rendered on request by [`Workbook::formula_text`].
//!
//! Decoding is best-effort by default: a corrupt record abandons its substream, and decoding
//! resumes at the next BOF with a warning. See [`DecodeOptions`].

use std::path::Path;
use std::sync::Arc;

mod biff;
mod cell;
mod error;
mod reader;
mod sheet;
mod workbook;

pub use biff::externsheet::ExternSheetEntry;
pub use biff::formats::{CellFormat, FormattingRegistry, NumberFormat, ResolvedFormat, XfTable};
pub use biff::globals::{BoundSheet, SheetType, SheetVisibility};
pub use biff::names::DefinedName;
pub use biff::{BiffVersion, SubstreamKind};
pub use biff_model::{CellRef, DateSystem, ErrorValue, Range};
pub use cell::{Cell, CellType, CellValue, FormulaKind};
pub use error::{BiffError, ReadError};
pub use sheet::{ColInfo, Dimensions, Outline, Row, RowInfo, Sheet};
pub use workbook::{FormulaProgram, Workbook};

/// Default cap on warnings collected per sheet (and for the workbook itself).
pub const DEFAULT_MAX_WARNINGS: usize = 50;
/// Windows-1252, assumed until a `CODEPAGE` record says otherwise.
pub const DEFAULT_CODEPAGE: u16 = 1252;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeOptions {
    /// Warnings kept per list before a single "additional warnings suppressed" marker.
    pub max_warnings: usize,
    /// Codepage for 8-bit strings decoded before any `CODEPAGE` record.
    pub default_codepage: u16,
    /// On a corrupt record, abandon the substream and resume at the next BOF instead of
    /// failing the whole decode.
    pub recover_after_corruption: bool,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            max_warnings: DEFAULT_MAX_WARNINGS,
            default_codepage: DEFAULT_CODEPAGE,
            recover_after_corruption: true,
        }
    }
}

/// Decode a workbook stream with the default options.
pub fn decode_workbook(stream: &[u8]) -> Result<Workbook, BiffError> {
    decode_workbook_with_options(stream, &DecodeOptions::default())
}

pub fn decode_workbook_with_options(
    stream: &[u8],
    options: &DecodeOptions,
) -> Result<Workbook, BiffError> {
    reader::decode(Arc::from(stream), options)
}

/// Read a file holding a raw workbook stream and decode it with the default options.
pub fn decode_workbook_path(path: impl AsRef<Path>) -> Result<Workbook, ReadError> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)?;
    log::debug!("decoding {} ({} bytes)", path.display(), bytes.len());
    Ok(reader::decode(Arc::from(bytes), &DecodeOptions::default())?)
}
