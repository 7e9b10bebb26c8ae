//! Single-cell and multi-cell value records.
//!
//! Every cell record starts with `[row: u16][col: u16][ixfe: u16]`; the type-specific payload
//! begins at byte 6. `MULRK`/`MULBLANK` pack a horizontal run of cells into one record and are
//! expanded here into independent cells.

use super::records::LogicalBiffRecord;
use super::rk::decode_rk;
use super::strings::{self, CchWidth, FragmentCursor};
use super::{read_f64, read_u16, read_u32, BiffVersion};

pub(crate) const CELL_HEADER_LEN: usize = 6;
const MULRK_STRIDE: usize = 6;
const MULBLANK_STRIDE: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CellHeader {
    pub(crate) row: u32,
    pub(crate) col: u32,
    pub(crate) xf: u32,
}

pub(crate) fn parse_cell_header(data: &[u8]) -> Result<CellHeader, String> {
    match (read_u16(data, 0), read_u16(data, 2), read_u16(data, 4)) {
        (Some(row), Some(col), Some(xf)) => Ok(CellHeader {
            row: row.into(),
            col: col.into(),
            xf: xf.into(),
        }),
        _ => Err(format!("cell record too short (len={})", data.len())),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum CellPayload {
    Blank,
    Number(f64),
    Rk(f64),
    Label(String),
    LabelSst(u32),
    Bool(bool),
    Error(u8),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct CellRecord {
    pub(crate) header: CellHeader,
    pub(crate) payload: CellPayload,
}

fn with_payload(
    data: &[u8],
    record: &str,
    needed: usize,
    payload: impl FnOnce(&[u8]) -> CellPayload,
) -> Result<CellRecord, String> {
    let header = parse_cell_header(data)?;
    if data.len() < needed {
        return Err(format!(
            "{record} record too short (len={}, need {needed})",
            data.len()
        ));
    }
    Ok(CellRecord {
        header,
        payload: payload(data),
    })
}

/// `BLANK`: header only.
pub(crate) fn parse_blank(data: &[u8]) -> Result<CellRecord, String> {
    with_payload(data, "BLANK", CELL_HEADER_LEN, |_| CellPayload::Blank)
}

/// `NUMBER`: IEEE-754 double at byte 6.
pub(crate) fn parse_number(data: &[u8]) -> Result<CellRecord, String> {
    with_payload(data, "NUMBER", 14, |data| {
        CellPayload::Number(read_f64(data, 6).unwrap_or_default())
    })
}

/// `RK`: RK-encoded number at byte 6.
pub(crate) fn parse_rk(data: &[u8]) -> Result<CellRecord, String> {
    with_payload(data, "RK", 10, |data| {
        CellPayload::Rk(decode_rk(read_u32(data, 6).unwrap_or_default()))
    })
}

/// `LABELSST`: 32-bit SST index at byte 6.
pub(crate) fn parse_labelsst(data: &[u8]) -> Result<CellRecord, String> {
    with_payload(data, "LABELSST", 10, |data| {
        CellPayload::LabelSst(read_u32(data, 6).unwrap_or_default())
    })
}

/// `BOOLERR`: value at byte 6, `fError` at byte 7.
pub(crate) fn parse_boolerr(data: &[u8]) -> Result<CellRecord, String> {
    with_payload(data, "BOOLERR", 8, |data| {
        let value = data[6];
        if data[7] != 0 {
            CellPayload::Error(value)
        } else {
            CellPayload::Bool(value != 0)
        }
    })
}

/// `LABEL` (and the text of `RSTRING`): an inline string after the header. BIFF8 labels may
/// continue into `CONTINUE` fragments.
pub(crate) fn parse_label(
    record: &LogicalBiffRecord<'_>,
    version: BiffVersion,
    codepage: u16,
) -> Result<CellRecord, String> {
    let data = record.data.as_ref();
    let header = parse_cell_header(data)?;
    let text = match version {
        BiffVersion::Biff8 => {
            let mut cursor = FragmentCursor::from_record(record);
            cursor.skip(CELL_HEADER_LEN)?;
            cursor.read_biff8_string(CchWidth::U16)?
        }
        BiffVersion::Biff7 => {
            strings::parse_byte_string(&data[CELL_HEADER_LEN..], CchWidth::U16, codepage)?.0
        }
    };
    Ok(CellRecord {
        header,
        payload: CellPayload::Label(text),
    })
}

/// Expand `MULRK`: `[row][colFirst][(ixfe: u16, rk: u32); n][colLast]`.
pub(crate) fn expand_mulrk(data: &[u8]) -> Result<Vec<CellRecord>, String> {
    expand_mul(data, "MULRK", MULRK_STRIDE, |group| {
        let rk = u32::from_le_bytes([group[2], group[3], group[4], group[5]]);
        CellPayload::Rk(decode_rk(rk))
    })
}

/// Expand `MULBLANK`: `[row][colFirst][ixfe: u16; n][colLast]`.
pub(crate) fn expand_mulblank(data: &[u8]) -> Result<Vec<CellRecord>, String> {
    expand_mul(data, "MULBLANK", MULBLANK_STRIDE, |_| CellPayload::Blank)
}

/// The declared `colLast` must agree with the number of groups, and a record must cover at
/// least one column; anything else means the framing upstream is wrong.
fn expand_mul(
    data: &[u8],
    record: &str,
    stride: usize,
    payload: impl Fn(&[u8]) -> CellPayload,
) -> Result<Vec<CellRecord>, String> {
    if data.len() < 6 {
        return Err(format!("{record} record too short (len={})", data.len()));
    }
    let body_len = data.len() - 6;
    if body_len % stride != 0 {
        return Err(format!(
            "{record} payload length {body_len} is not a multiple of {stride}"
        ));
    }
    let count = body_len / stride;
    if count == 0 {
        return Err(format!("{record} record declares zero columns"));
    }

    let row = u32::from(u16::from_le_bytes([data[0], data[1]]));
    let first_col = u32::from(u16::from_le_bytes([data[2], data[3]]));
    let last_col = u32::from(u16::from_le_bytes([data[data.len() - 2], data[data.len() - 1]]));
    if last_col < first_col || last_col - first_col + 1 != count as u32 {
        return Err(format!(
            "{record} column range {first_col}..={last_col} does not match {count} entries"
        ));
    }

    Ok(data[4..data.len() - 2]
        .chunks_exact(stride)
        .zip(first_col..)
        .map(|(group, col)| CellRecord {
            header: CellHeader {
                row,
                col,
                xf: u32::from(u16::from_le_bytes([group[0], group[1]])),
            },
            payload: payload(group),
        })
        .collect())
}
