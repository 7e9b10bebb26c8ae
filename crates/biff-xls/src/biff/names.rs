//! Defined names (`NAME`, [MS-XLS] 2.4.150).
//!
//! Fixed header (14 bytes):
//! `[grbit: u16][chKey: u8][cch: u8][cce: u16][ixals: u16][itab: u16][4 x u8 menu/help lengths]`,
//! followed by the name characters and the `cce`-byte formula program (plus any array data).

use serde::Serialize;

use super::strings::{self, FragmentCursor};
use super::records::LogicalBiffRecord;
use super::BiffVersion;

const NAME_FLAG_HIDDEN: u16 = 0x0001;
const NAME_FLAG_BUILTIN: u16 = 0x0020;
const NAME_HEADER_LEN: usize = 14;

const BUILTIN_NAMES: [&str; 14] = [
    "Consolidate_Area",
    "Auto_Open",
    "Auto_Close",
    "Extract",
    "Database",
    "Criteria",
    "Print_Area",
    "Print_Titles",
    "Recorder",
    "Data_Form",
    "Auto_Activate",
    "Auto_Deactivate",
    "Sheet_Title",
    "_FilterDatabase",
];

/// A workbook- or sheet-scoped defined name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DefinedName {
    pub name: String,
    /// 0-based BOUNDSHEET index for sheet-scoped names.
    pub sheet_index: Option<u16>,
    pub hidden: bool,
    pub builtin: bool,
    #[serde(skip)]
    pub(crate) rgce: Vec<u8>,
    #[serde(skip)]
    pub(crate) rgcb: Vec<u8>,
}

pub(crate) fn parse_name(
    record: &LogicalBiffRecord<'_>,
    version: BiffVersion,
    codepage: u16,
) -> Result<DefinedName, String> {
    let data = record.data.as_ref();
    let header = data
        .get(..NAME_HEADER_LEN)
        .ok_or_else(|| format!("NAME record too short (len={})", data.len()))?;
    let grbit = u16::from_le_bytes([header[0], header[1]]);
    let cch = header[3] as usize;
    let cce = u16::from_le_bytes([header[4], header[5]]) as usize;
    let itab = u16::from_le_bytes([header[8], header[9]]);

    let (raw_name, name_end) = match version {
        BiffVersion::Biff8 => {
            let mut cursor = FragmentCursor::from_record(record);
            cursor.skip(NAME_HEADER_LEN)?;
            let name = cursor.read_biff8_flagged_chars(cch)?;
            (name, cursor.position())
        }
        BiffVersion::Biff7 => {
            let end = NAME_HEADER_LEN + cch;
            let bytes = data.get(NAME_HEADER_LEN..end).ok_or("NAME record truncated in name")?;
            (strings::decode_ansi(codepage, bytes), end)
        }
    };

    let rgce_end = name_end + cce;
    let rgce = data
        .get(name_end..rgce_end)
        .ok_or("NAME record truncated in formula")?
        .to_vec();
    let rgcb = data.get(rgce_end..).unwrap_or_default().to_vec();

    let builtin = grbit & NAME_FLAG_BUILTIN != 0;
    let name = if builtin {
        builtin_name(&raw_name)
    } else {
        raw_name
    };

    Ok(DefinedName {
        name,
        sheet_index: itab.checked_sub(1),
        hidden: grbit & NAME_FLAG_HIDDEN != 0,
        builtin,
        rgce,
        rgcb,
    })
}

/// Built-in names store a one-character code instead of text.
fn builtin_name(raw: &str) -> String {
    let mut chars = raw.chars();
    match (chars.next(), chars.next()) {
        (Some(code), None) => BUILTIN_NAMES
            .get(code as usize)
            .map(|name| name.to_string())
            .unwrap_or_else(|| format!("Builtin_{:02X}", code as u32)),
        _ => raw.to_string(),
    }
}
