//! `SUPBOOK` ([MS-XLS] 2.4.271) and `EXTERNNAME` ([MS-XLS] 2.4.106) records.
//!
//! Every EXTERNSHEET entry points at a SUPBOOK: the workbook itself, an add-in function library,
//! or an external workbook with its own sheet list. EXTERNNAME records that follow a SUPBOOK
//! belong to it and are addressed 1-based by `PtgNameX`.

use super::strings::{self, CchWidth, FragmentCursor};
use super::records::LogicalBiffRecord;
use super::BiffVersion;

/// `cch` marker for the workbook's own SUPBOOK.
const SUPBOOK_MARKER_INTERNAL: u16 = 0x0401;
/// `cch` marker for an add-in function SUPBOOK.
const SUPBOOK_MARKER_ADDIN: u16 = 0x3A01;
const MAX_SUPBOOK_SHEETS: u16 = 4096;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SupBookKind {
    Internal,
    AddIn,
    External { workbook: String, sheets: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SupBook {
    pub(crate) kind: SupBookKind,
    pub(crate) extern_names: Vec<String>,
}

pub(crate) fn parse_supbook(record: &LogicalBiffRecord<'_>) -> Result<SupBook, String> {
    let mut cursor = FragmentCursor::from_record(record);
    let ctab = cursor.read_u16()?;
    let cch = cursor.read_u16()?;

    let kind = match cch {
        SUPBOOK_MARKER_INTERNAL => SupBookKind::Internal,
        SUPBOOK_MARKER_ADDIN => SupBookKind::AddIn,
        cch => {
            let virt_path = cursor.read_biff8_flagged_chars(cch as usize)?;
            let mut sheets = Vec::new();
            for _ in 0..ctab.min(MAX_SUPBOOK_SHEETS) {
                sheets.push(cursor.read_biff8_string(CchWidth::U16)?);
            }
            SupBookKind::External {
                workbook: workbook_name_from_virt_path(&virt_path),
                sheets,
            }
        }
    };

    Ok(SupBook {
        kind,
        extern_names: Vec::new(),
    })
}

/// Reduce an encoded `virtPath` to the workbook file name.
///
/// Paths use control characters as separators (0x01 volume, 0x02 same-volume root, 0x03
/// directory, 0x04 parent directory); any of those, or a slash, ends a path component.
fn workbook_name_from_virt_path(virt_path: &str) -> String {
    let cleaned = virt_path.replace('\0', "");
    let basename = cleaned
        .rsplit(|c: char| c == '\\' || c == '/' || (c as u32) < 0x20)
        .next()
        .unwrap_or(&cleaned)
        .trim();
    let unwrapped = basename
        .strip_prefix('[')
        .and_then(|inner| inner.strip_suffix(']'))
        .unwrap_or(basename);
    unwrapped.to_string()
}

/// Extract the name from an EXTERNNAME record: `[grbit: u16][reserved: u32][name]`, where the
/// name is a short string in the substream's encoding.
pub(crate) fn parse_externname(
    data: &[u8],
    version: BiffVersion,
    codepage: u16,
) -> Result<String, String> {
    let rest = data.get(6..).ok_or("EXTERNNAME record too short")?;
    let (name, _) = strings::parse_short_string(rest, version, codepage)?;
    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::biff::records::{RecordStream, RECORD_CONTINUE};
    use crate::biff::test_util::record;
    use pretty_assertions::assert_eq;

    const RECORD_SUPBOOK: u16 = 0x01AE;

    fn xl_string(s: &str) -> Vec<u8> {
        let mut out = (s.len() as u16).to_le_bytes().to_vec();
        out.push(0);
        out.extend_from_slice(s.as_bytes());
        out
    }

    fn parse(stream: &[u8]) -> SupBook {
        let record = RecordStream::new(stream).next().unwrap().unwrap();
        parse_supbook(&record).unwrap()
    }

    #[test]
    fn parses_internal_and_addin_markers() {
        let internal = parse(&record(RECORD_SUPBOOK, &[3, 0, 0x01, 0x04]));
        assert_eq!(internal.kind, SupBookKind::Internal);
        let addin = parse(&record(RECORD_SUPBOOK, &[1, 0, 0x01, 0x3A]));
        assert_eq!(addin.kind, SupBookKind::AddIn);
    }

    #[test]
    fn parses_external_workbook_and_sheet_names() {
        let mut payload = 2u16.to_le_bytes().to_vec();
        payload.extend_from_slice(&xl_string("\u{1}C\u{3}data\u{3}Book1.xls"));
        payload.extend_from_slice(&xl_string("Prices"));
        payload.extend_from_slice(&xl_string("Q1 Data"));
        let supbook = parse(&record(RECORD_SUPBOOK, &payload));
        assert_eq!(
            supbook.kind,
            SupBookKind::External {
                workbook: "Book1.xls".to_string(),
                sheets: vec!["Prices".to_string(), "Q1 Data".to_string()],
            }
        );
    }

    #[test]
    fn sheet_names_may_continue_in_a_later_fragment() {
        let mut payload = 1u16.to_le_bytes().to_vec();
        payload.extend_from_slice(&xl_string("Ext.xls"));
        let stream = [
            record(RECORD_SUPBOOK, &payload),
            record(RECORD_CONTINUE, &xl_string("Sheet1")),
        ]
        .concat();
        let supbook = parse(&stream);
        assert_eq!(
            supbook.kind,
            SupBookKind::External {
                workbook: "Ext.xls".to_string(),
                sheets: vec!["Sheet1".to_string()],
            }
        );
    }

    #[test]
    fn strips_path_and_wrapper_brackets() {
        assert_eq!(workbook_name_from_virt_path("C:\\dir\\[Book.xls]"), "Book.xls");
        assert_eq!(workbook_name_from_virt_path("Plain.xls"), "Plain.xls");
    }

    #[test]
    fn parses_externname() {
        let mut data = vec![0, 0, 0, 0, 0, 0];
        data.extend_from_slice(&[4, 0]);
        data.extend_from_slice(b"RATE");
        assert_eq!(parse_externname(&data, BiffVersion::Biff8, 1252).unwrap(), "RATE");
        assert!(parse_externname(&[0, 0], BiffVersion::Biff8, 1252).is_err());
    }
}
