//! `FORMULA`, `STRING`, `SHRFMLA`, `ARRAY` and `TABLE` records.
//!
//! `FORMULA` ([MS-XLS] 2.4.127):
//! `[row][col][ixfe][result: 8 bytes][grbit: u16][chn: u32][cce: u16][rgce: cce][rgcb]`.
//! The group records share a leading `RefU` range `[rwFirst: u16][rwLast: u16][colFirst: u8][colLast: u8]`.

use biff_model::{CellRef, Range};

use super::cells::{parse_cell_header, CellHeader};
use super::records::LogicalBiffRecord;
use super::strings::{self, CchWidth, FragmentCursor};
use super::{read_u16, BiffVersion};

const FORMULA_RESULT_OFFSET: usize = 6;
const FORMULA_GRBIT_OFFSET: usize = 14;
const FORMULA_CCE_OFFSET: usize = 20;
const FORMULA_RGCE_OFFSET: usize = 22;

// Result kinds selected by byte 6 when bytes 12-13 are 0xFFFF.
const RESULT_KIND_STRING: u8 = 0x00;
const RESULT_KIND_BOOL: u8 = 0x01;
const RESULT_KIND_ERROR: u8 = 0x02;
const RESULT_KIND_EMPTY_STRING: u8 = 0x03;

const TABLE_FLAG_ROW_INPUT: u16 = 0x0004;
const TABLE_FLAG_TWO_INPUTS: u16 = 0x0008;

/// `FORMULA.grbit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FormulaFlags(pub(crate) u16);

impl FormulaFlags {
    pub(crate) const SHARED: u16 = 0x0008;

    pub(crate) fn is_shared(self) -> bool {
        self.0 & Self::SHARED != 0
    }
}

/// Last calculated value stored in a formula record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum FormulaResult {
    Number(f64),
    /// The text follows in a `STRING` record.
    String,
    Bool(bool),
    Error(u8),
    EmptyString,
}

/// Classify the 8 result bytes (record bytes 6..14).
///
/// Bytes 6 and 7 of the result (record bytes 12-13) equal to `0xFFFF` mark a non-numeric
/// result whose kind is in result byte 0; otherwise all 8 bytes are an IEEE double.
pub(crate) fn discriminate_result(result: &[u8; 8]) -> Result<FormulaResult, String> {
    if result[6] != 0xFF || result[7] != 0xFF {
        return Ok(FormulaResult::Number(f64::from_le_bytes(*result)));
    }
    match result[0] {
        RESULT_KIND_STRING => Ok(FormulaResult::String),
        RESULT_KIND_BOOL => Ok(FormulaResult::Bool(result[2] != 0)),
        RESULT_KIND_ERROR => Ok(FormulaResult::Error(result[2])),
        RESULT_KIND_EMPTY_STRING => Ok(FormulaResult::EmptyString),
        other => Err(format!("unknown formula result kind 0x{other:02X}")),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct FormulaRecord {
    pub(crate) header: CellHeader,
    pub(crate) result: FormulaResult,
    pub(crate) flags: FormulaFlags,
    pub(crate) rgce: Vec<u8>,
    pub(crate) rgcb: Vec<u8>,
}

/// BIFF7 and BIFF8 share the FORMULA layout; only the token encoding differs.
pub(crate) fn parse_formula(data: &[u8]) -> Result<FormulaRecord, String> {
    let header = parse_cell_header(data)?;
    let fixed = data
        .get(..FORMULA_RGCE_OFFSET)
        .ok_or_else(|| format!("FORMULA record too short (len={})", data.len()))?;

    let mut result = [0u8; 8];
    result.copy_from_slice(&fixed[FORMULA_RESULT_OFFSET..FORMULA_RESULT_OFFSET + 8]);
    let result = discriminate_result(&result)?;
    let flags = FormulaFlags(read_u16(fixed, FORMULA_GRBIT_OFFSET).unwrap_or_default());
    let cce = read_u16(fixed, FORMULA_CCE_OFFSET).unwrap_or_default() as usize;
    let (rgce, rgcb) = split_program(data, FORMULA_RGCE_OFFSET, cce, "FORMULA")?;

    Ok(FormulaRecord {
        header,
        result,
        flags,
        rgce,
        rgcb,
    })
}

fn split_program(
    data: &[u8],
    start: usize,
    cce: usize,
    record: &str,
) -> Result<(Vec<u8>, Vec<u8>), String> {
    let end = start + cce;
    let rgce = data.get(start..end).ok_or_else(|| {
        format!(
            "{record} formula program truncated (cce={cce}, available={})",
            data.len().saturating_sub(start)
        )
    })?;
    Ok((rgce.to_vec(), data[end..].to_vec()))
}

/// `STRING` ([MS-XLS] 2.4.268): the text result of the preceding FORMULA.
pub(crate) fn parse_string_result(
    record: &LogicalBiffRecord<'_>,
    version: BiffVersion,
    codepage: u16,
) -> Result<String, String> {
    match version {
        BiffVersion::Biff8 => FragmentCursor::from_record(record).read_biff8_string(CchWidth::U16),
        BiffVersion::Biff7 => {
            strings::parse_byte_string(&record.data, CchWidth::U16, codepage).map(|(s, _)| s)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum GroupKind {
    Shared,
    Array,
    Table,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum GroupDefinition {
    /// Token program written relative to the range's top-left cell.
    Tokens { rgce: Vec<u8>, rgcb: Vec<u8> },
    /// Data table input cells.
    Table {
        row_input: Option<CellRef>,
        col_input: Option<CellRef>,
    },
}

/// A SHRFMLA, ARRAY or TABLE record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FormulaGroup {
    pub(crate) kind: GroupKind,
    pub(crate) range: Range,
    /// Offset of the defining record.
    pub(crate) offset: usize,
    pub(crate) definition: GroupDefinition,
}

impl FormulaGroup {
    pub(crate) fn anchor(&self) -> CellRef {
        self.range.start
    }
}

fn parse_ref_u(data: &[u8], record: &str) -> Result<Range, String> {
    let bytes = data
        .get(..6)
        .ok_or_else(|| format!("{record} record too short (len={})", data.len()))?;
    let rw_first = u32::from(u16::from_le_bytes([bytes[0], bytes[1]]));
    let rw_last = u32::from(u16::from_le_bytes([bytes[2], bytes[3]]));
    let col_first = u32::from(bytes[4]);
    let col_last = u32::from(bytes[5]);
    if rw_last < rw_first || col_last < col_first {
        return Err(format!(
            "{record} range is inverted (rows {rw_first}..={rw_last}, cols {col_first}..={col_last})"
        ));
    }
    Ok(Range::new(
        CellRef::new(rw_first, col_first),
        CellRef::new(rw_last, col_last),
    ))
}

/// `SHRFMLA` ([MS-XLS] 2.4.277): `[RefU][reserved: u8][cUse: u8][cce: u16][rgce][rgcb]`.
pub(crate) fn parse_shared_formula(data: &[u8], offset: usize) -> Result<FormulaGroup, String> {
    let range = parse_ref_u(data, "SHRFMLA")?;
    let cce = read_u16(data, 8).ok_or("SHRFMLA record missing cce")? as usize;
    let (rgce, rgcb) = split_program(data, 10, cce, "SHRFMLA")?;
    Ok(FormulaGroup {
        kind: GroupKind::Shared,
        range,
        offset,
        definition: GroupDefinition::Tokens { rgce, rgcb },
    })
}

/// `ARRAY` ([MS-XLS] 2.4.19): `[RefU][grbit: u16][chn: u32][cce: u16][rgce][rgcb]`.
pub(crate) fn parse_array_formula(data: &[u8], offset: usize) -> Result<FormulaGroup, String> {
    let range = parse_ref_u(data, "ARRAY")?;
    let cce = read_u16(data, 12).ok_or("ARRAY record missing cce")? as usize;
    let (rgce, rgcb) = split_program(data, 14, cce, "ARRAY")?;
    Ok(FormulaGroup {
        kind: GroupKind::Array,
        range,
        offset,
        definition: GroupDefinition::Tokens { rgce, rgcb },
    })
}

/// `TABLE` ([MS-XLS] 2.4.319):
/// `[RefU][grbit: u16][rwInpRw: u16][colInpRw: u16][rwInpCol: u16][colInpCol: u16]`.
///
/// A one-input table stores its single input cell in the first pair; `fRw` says whether it is
/// a row or column input.
pub(crate) fn parse_table(data: &[u8], offset: usize) -> Result<FormulaGroup, String> {
    let range = parse_ref_u(data, "TABLE")?;
    let field = |at: usize| read_u16(data, at).map(u32::from);
    let (Some(grbit), Some(rw_inp_rw), Some(col_inp_rw), Some(rw_inp_col), Some(col_inp_col)) = (
        read_u16(data, 6),
        field(8),
        field(10),
        field(12),
        field(14),
    ) else {
        return Err(format!("TABLE record too short (len={})", data.len()));
    };

    let first = CellRef::new(rw_inp_rw, col_inp_rw);
    let (row_input, col_input) = if grbit & TABLE_FLAG_TWO_INPUTS != 0 {
        (Some(first), Some(CellRef::new(rw_inp_col, col_inp_col)))
    } else if grbit & TABLE_FLAG_ROW_INPUT != 0 {
        (Some(first), None)
    } else {
        (None, Some(first))
    };

    Ok(FormulaGroup {
        kind: GroupKind::Table,
        range,
        offset,
        definition: GroupDefinition::Table {
            row_input,
            col_input,
        },
    })
}
