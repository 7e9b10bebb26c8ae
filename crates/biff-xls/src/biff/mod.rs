//! BIFF record decoding.
//!
//! The pipeline runs leaves first:
//! - [`records`] frames physical records and coalesces `CONTINUE` fragments into logical records
//! - [`dispatch`] maps each logical record to a typed [`dispatch::BiffRecord`] while tracking the
//!   BOF/EOF substream stack
//! - [`globals`] and [`sheet`] accumulate typed records into the workbook tables and per-sheet
//!   grids
//!
//! Formula token programs are kept as raw bytes; text is produced on demand by the workbook.

use std::fmt;

use serde::Serialize;

pub(crate) mod cells;
pub(crate) mod dispatch;
pub(crate) mod externsheet;
pub(crate) mod formats;
pub(crate) mod formulas;
pub(crate) mod globals;
pub(crate) mod names;
pub(crate) mod records;
pub(crate) mod rk;
pub(crate) mod shared_formulas;
pub(crate) mod sheet;
pub(crate) mod sst;
pub(crate) mod strings;
pub(crate) mod supbook;

/// BIFF dialect of a substream, taken from its BOF record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum BiffVersion {
    /// Excel 5.0/95 (`BOF.vers == 0x0500`).
    Biff7,
    /// Excel 97-2003 (`BOF.vers == 0x0600`).
    Biff8,
}

impl fmt::Display for BiffVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BiffVersion::Biff7 => f.write_str("BIFF7"),
            BiffVersion::Biff8 => f.write_str("BIFF8"),
        }
    }
}

/// Substream type (`BOF.dt`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubstreamKind {
    WorkbookGlobals,
    Worksheet,
    Chart,
    MacroSheet,
    /// Any other `dt` value (e.g. VB module or workspace substreams).
    Other(u16),
}

impl SubstreamKind {
    fn from_dt(dt: u16) -> Self {
        match dt {
            BOF_DT_GLOBALS => SubstreamKind::WorkbookGlobals,
            BOF_DT_WORKSHEET => SubstreamKind::Worksheet,
            BOF_DT_CHART => SubstreamKind::Chart,
            BOF_DT_MACRO_SHEET => SubstreamKind::MacroSheet,
            other => SubstreamKind::Other(other),
        }
    }

    /// Worksheets and macro sheets both carry a cell grid.
    pub fn has_cells(self) -> bool {
        matches!(self, SubstreamKind::Worksheet | SubstreamKind::MacroSheet)
    }
}

// BOF record payload values. See [MS-XLS] 2.4.21 (BOF).
const BOF_VERSION_BIFF7: u16 = 0x0500;
const BOF_VERSION_BIFF8: u16 = 0x0600;
const BOF_DT_GLOBALS: u16 = 0x0005;
const BOF_DT_WORKSHEET: u16 = 0x0010;
const BOF_DT_CHART: u16 = 0x0020;
const BOF_DT_MACRO_SHEET: u16 = 0x0040;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Bof {
    pub(crate) version: BiffVersion,
    pub(crate) kind: SubstreamKind,
}

impl Bof {
    /// Parse a BOF payload: `vers` at bytes 0-1, `dt` at bytes 2-3.
    ///
    /// The legacy `0x0009` BOF id implies BIFF7 layout when the version field is missing or
    /// unrecognized.
    pub(crate) fn parse(record_id: u16, data: &[u8]) -> Result<Self, String> {
        let header = data
            .get(0..4)
            .ok_or_else(|| format!("BOF record too short (len={})", data.len()))?;
        let vers = u16::from_le_bytes([header[0], header[1]]);
        let dt = u16::from_le_bytes([header[2], header[3]]);
        let version = match vers {
            BOF_VERSION_BIFF8 => BiffVersion::Biff8,
            BOF_VERSION_BIFF7 => BiffVersion::Biff7,
            _ if record_id == records::RECORD_BOF_BIFF7 => BiffVersion::Biff7,
            _ => BiffVersion::Biff8,
        };
        Ok(Self {
            version,
            kind: SubstreamKind::from_dt(dt),
        })
    }
}

pub(crate) const WARNINGS_SUPPRESSED_MESSAGE: &str = "additional warnings suppressed";

/// Append a warning unless `cap` warnings were already collected; the first overflow adds a
/// single terminal marker so callers can tell the list was truncated.
pub(crate) fn push_warning_bounded(warnings: &mut Vec<String>, cap: usize, warning: impl Into<String>) {
    let warning = warning.into();
    log::warn!("{warning}");
    if warnings.len() < cap {
        warnings.push(warning);
        return;
    }
    if warnings.len() == cap {
        warnings.push(WARNINGS_SUPPRESSED_MESSAGE.to_string());
    }
}

/// Little-endian field readers over a record payload.
pub(crate) fn read_u16(data: &[u8], offset: usize) -> Option<u16> {
    let bytes = data.get(offset..offset.checked_add(2)?)?;
    Some(u16::from_le_bytes([bytes[0], bytes[1]]))
}

pub(crate) fn read_u32(data: &[u8], offset: usize) -> Option<u32> {
    let bytes = data.get(offset..offset.checked_add(4)?)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

pub(crate) fn read_f64(data: &[u8], offset: usize) -> Option<f64> {
    let bytes = data.get(offset..offset.checked_add(8)?)?;
    let mut buf = [0u8; 8];
    buf.copy_from_slice(bytes);
    Some(f64::from_le_bytes(buf))
}


#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_bof_version_and_substream_kind() {
        let bof = Bof::parse(records::RECORD_BOF_BIFF8, &[0x00, 0x06, 0x10, 0x00]).unwrap();
        assert_eq!(bof.version, BiffVersion::Biff8);
        assert_eq!(bof.kind, SubstreamKind::Worksheet);

        let bof = Bof::parse(records::RECORD_BOF_BIFF8, &[0x00, 0x05, 0x05, 0x00]).unwrap();
        assert_eq!(bof.version, BiffVersion::Biff7);
        assert_eq!(bof.kind, SubstreamKind::WorkbookGlobals);

        let bof = Bof::parse(records::RECORD_BOF_BIFF8, &[0x00, 0x06, 0x20, 0x00]).unwrap();
        assert_eq!(bof.kind, SubstreamKind::Chart);
        let bof = Bof::parse(records::RECORD_BOF_BIFF8, &[0x00, 0x06, 0x40, 0x00]).unwrap();
        assert_eq!(bof.kind, SubstreamKind::MacroSheet);
    }

    #[test]
    fn legacy_bof_id_defaults_to_biff7() {
        let bof = Bof::parse(records::RECORD_BOF_BIFF7, &[0x00, 0x00, 0x10, 0x00]).unwrap();
        assert_eq!(bof.version, BiffVersion::Biff7);
    }

    #[test]
    fn rejects_truncated_bof() {
        assert!(Bof::parse(records::RECORD_BOF_BIFF8, &[0x00, 0x06]).is_err());
    }

    #[test]
    fn warning_list_is_capped_with_marker() {
        let mut warnings = Vec::new();
        for i in 0..10 {
            push_warning_bounded(&mut warnings, 3, format!("w{i}"));
        }
        assert_eq!(
            warnings,
            vec!["w0", "w1", "w2", WARNINGS_SUPPRESSED_MESSAGE]
        );
    }
}
