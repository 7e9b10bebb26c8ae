//! BIFF8 `EXTERNSHEET` table ([MS-XLS] 2.4.102).
//!
//! 3-D reference tokens carry an `ixti` index into this table; each XTI entry names a SUPBOOK and
//! a range of sheet indices within it.

use serde::Serialize;

/// Cap on parsed XTI entries.
pub(crate) const MAX_XTI_ENTRIES: usize = 16_384;

const XTI_SIZE: usize = 6;

/// One `XTI` structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExternSheetEntry {
    /// Index of the SUPBOOK record (`iSupBook`).
    pub supbook: u16,
    /// First sheet index (`itabFirst`); negative values mark a deleted or workbook-level target.
    pub itab_first: i16,
    pub itab_last: i16,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ParsedExternSheet {
    pub(crate) entries: Vec<ExternSheetEntry>,
    pub(crate) warning: Option<String>,
}

/// Parse `[cXTI: u16][XTI; cXTI]`, clamping to the available bytes and [`MAX_XTI_ENTRIES`].
pub(crate) fn parse_externsheet(data: &[u8]) -> Result<ParsedExternSheet, String> {
    let cxti = super::read_u16(data, 0).ok_or("EXTERNSHEET record missing cXTI")? as usize;
    let available = data.len().saturating_sub(2) / XTI_SIZE;

    let mut out = ParsedExternSheet::default();
    let mut count = cxti;
    if count > available {
        out.warning = Some(format!(
            "EXTERNSHEET declares {cxti} entries but only {available} fit in the record"
        ));
        count = available;
    }
    if count > MAX_XTI_ENTRIES {
        out.warning = Some(format!(
            "EXTERNSHEET declares {cxti} entries; keeping the first {MAX_XTI_ENTRIES}"
        ));
        count = MAX_XTI_ENTRIES;
    }

    out.entries = data[2..2 + count * XTI_SIZE]
        .chunks_exact(XTI_SIZE)
        .map(|xti| ExternSheetEntry {
            supbook: u16::from_le_bytes([xti[0], xti[1]]),
            itab_first: i16::from_le_bytes([xti[2], xti[3]]),
            itab_last: i16::from_le_bytes([xti[4], xti[5]]),
        })
        .collect();
    Ok(out)
}
