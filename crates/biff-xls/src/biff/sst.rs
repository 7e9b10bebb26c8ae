//! Shared string table (`SST`, [MS-XLS] 2.4.265).
//!
//! `[cstTotal: u32][cstUnique: u32][rgb: XLUnicodeRichExtendedString; cstUnique]`, usually
//! spread over many `CONTINUE` fragments.

use super::records::LogicalBiffRecord;
use super::strings::{CchWidth, FragmentCursor};

// Don't trust `cstUnique` for preallocation.
const MAX_PREALLOCATED_STRINGS: usize = 4096;

#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct ParsedSst {
    pub(crate) strings: Vec<String>,
    /// Set when the table ended before `cstUnique` entries were read.
    pub(crate) error: Option<String>,
}

pub(crate) fn parse_sst(record: &LogicalBiffRecord<'_>) -> ParsedSst {
    let mut cursor = FragmentCursor::from_record(record);
    let mut out = ParsedSst::default();

    // cstTotal counts LABELSST references, not entries.
    let unique = match cursor.read_u32().and_then(|_total| cursor.read_u32()) {
        Ok(unique) => unique as usize,
        Err(err) => {
            out.error = Some(format!("SST header: {err}"));
            return out;
        }
    };

    out.strings.reserve(unique.min(MAX_PREALLOCATED_STRINGS));
    for index in 0..unique {
        match cursor.read_biff8_string(CchWidth::U16) {
            Ok(value) => out.strings.push(value),
            Err(err) => {
                out.error = Some(format!(
                    "SST entry {index} of {unique} at byte {}: {err}",
                    cursor.position()
                ));
                break;
            }
        }
    }
    out
}
