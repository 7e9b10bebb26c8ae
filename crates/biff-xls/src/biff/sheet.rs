//! Worksheet substream assembly.
//!
//! [`SheetBuilder`] receives typed records in stream order and accumulates the grid, row and
//! column overrides, merged ranges and formula groups. Cell values are final when the record
//! is applied. Workbook tables (SST, XF) are read-only here and come from the globals
//! substream decoded earlier.

use std::collections::{BTreeMap, HashSet};

use biff_model::{CellRef, DateSystem, ErrorValue, Range};

use super::cells::{CellPayload, CellRecord};
use super::dispatch::SheetRecord;
use super::formats::FormattingRegistry;
use super::formulas::{FormulaRecord, FormulaResult};
use super::globals::SheetVisibility;
use super::{push_warning_bounded, read_u16, read_u32, BiffVersion, SubstreamKind};
use crate::cell::{group_matches, Cell, CellType, CellValue, FormulaKind, FormulaLink, FormulaSource, GroupId};
use crate::error::BiffError;
use crate::sheet::{ColInfo, Dimensions, Outline, RowInfo, Sheet};

const ROW_OPTION_LEVEL_MASK: u32 = 0x0000_0007;
const ROW_OPTION_GROUP_START: u32 = 0x0000_0010;
const ROW_OPTION_COLLAPSED: u32 = 0x0000_0020;
const ROW_OPTION_CUSTOM_HEIGHT: u32 = 0x0000_0040;
const ROW_OPTION_HAS_FORMAT: u32 = 0x0000_0080;
const ROW_OPTION_XF_SHIFT: u32 = 16;
const ROW_OPTION_XF_MASK: u32 = 0x0FFF;
const ROW_HEIGHT_MASK: u16 = 0x7FFF;

const COLINFO_HIDDEN: u16 = 0x0001;
const COLINFO_LEVEL_SHIFT: u16 = 8;
const COLINFO_LEVEL_MASK: u16 = 0x0007;
const COLINFO_COLLAPSED: u16 = 0x1000;

const WSBOOL_ROW_SUMS_BELOW: u16 = 0x0040;
const WSBOOL_COL_SUMS_RIGHT: u16 = 0x0080;

const MERGED_REF_LEN: usize = 8;

/// `DIMENSIONS`: BIFF8 `[rwMic: u32][rwMac: u32][colMic: u16][colMac: u16]`, BIFF7 uses 16-bit
/// rows.
pub(crate) fn parse_dimensions(data: &[u8], version: BiffVersion) -> Result<Dimensions, String> {
    let fields = match version {
        BiffVersion::Biff8 => (
            read_u32(data, 0),
            read_u32(data, 4),
            read_u16(data, 8),
            read_u16(data, 10),
        ),
        BiffVersion::Biff7 => (
            read_u16(data, 0).map(u32::from),
            read_u16(data, 2).map(u32::from),
            read_u16(data, 4),
            read_u16(data, 6),
        ),
    };
    match fields {
        (Some(first_row), Some(last_row), Some(first_col), Some(last_col)) => Ok(Dimensions {
            first_row,
            last_row,
            first_col: first_col.into(),
            last_col: last_col.into(),
        }),
        _ => Err(format!("DIMENSIONS record too short (len={})", data.len())),
    }
}

/// `ROW`: `[rw: u16][colMic: u16][colMac: u16][miyRw: u16][reserved: u32][options: u32]`.
pub(crate) fn parse_row(data: &[u8]) -> Result<RowInfo, String> {
    let (Some(row), Some(height), Some(options)) =
        (read_u16(data, 0), read_u16(data, 6), read_u32(data, 12))
    else {
        return Err(format!("ROW record too short (len={})", data.len()));
    };
    Ok(RowInfo {
        row: row.into(),
        height: height & ROW_HEIGHT_MASK,
        outline_level: (options & ROW_OPTION_LEVEL_MASK) as u8,
        group_start: options & ROW_OPTION_GROUP_START != 0,
        collapsed: options & ROW_OPTION_COLLAPSED != 0,
        custom_height: options & ROW_OPTION_CUSTOM_HEIGHT != 0,
        has_default_format: options & ROW_OPTION_HAS_FORMAT != 0,
        xf_index: (options >> ROW_OPTION_XF_SHIFT) & ROW_OPTION_XF_MASK,
    })
}

/// `COLINFO`: `[colFirst: u16][colLast: u16][coldx: u16][ixfe: u16][options: u16]`.
pub(crate) fn parse_colinfo(data: &[u8]) -> Result<ColInfo, String> {
    let (Some(first), Some(last), Some(width), Some(xf), Some(options)) = (
        read_u16(data, 0),
        read_u16(data, 2),
        read_u16(data, 4),
        read_u16(data, 6),
        read_u16(data, 8),
    ) else {
        return Err(format!("COLINFO record too short (len={})", data.len()));
    };
    if last < first {
        return Err(format!("COLINFO range is inverted ({first}..={last})"));
    }
    Ok(ColInfo {
        first_col: first.into(),
        last_col: last.into(),
        width,
        xf_index: xf.into(),
        hidden: options & COLINFO_HIDDEN != 0,
        outline_level: ((options >> COLINFO_LEVEL_SHIFT) & COLINFO_LEVEL_MASK) as u8,
        collapsed: options & COLINFO_COLLAPSED != 0,
    })
}

/// `MERGEDCELLS`: `[cmcs: u16]` followed by `cmcs` Ref8 entries.
pub(crate) fn parse_merged_cells(data: &[u8]) -> Result<Vec<Range>, String> {
    let count = read_u16(data, 0).ok_or("MERGEDCELLS record too short")? as usize;
    let entries = &data[2..];
    if entries.len() < count * MERGED_REF_LEN {
        return Err(format!(
            "MERGEDCELLS declares {count} ranges but has room for {}",
            entries.len() / MERGED_REF_LEN
        ));
    }
    entries
        .chunks_exact(MERGED_REF_LEN)
        .take(count)
        .map(|chunk| {
            let field = |at: usize| u32::from(u16::from_le_bytes([chunk[at], chunk[at + 1]]));
            let (rw_first, rw_last, col_first, col_last) = (field(0), field(2), field(4), field(6));
            if rw_last < rw_first || col_last < col_first {
                return Err(format!(
                    "merged range is inverted (rows {rw_first}..={rw_last}, cols {col_first}..={col_last})"
                ));
            }
            Ok(Range::new(
                CellRef::new(rw_first, col_first),
                CellRef::new(rw_last, col_last),
            ))
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Guts {
    pub(crate) row_gutter: u16,
    pub(crate) col_gutter: u16,
    pub(crate) row_levels: u16,
    pub(crate) col_levels: u16,
}

/// `GUTS`: gutter sizes then `iLevelRwMac`/`iLevelColMac` (levels + 1, or 0 when unused).
pub(crate) fn parse_guts(data: &[u8]) -> Result<Guts, String> {
    match (
        read_u16(data, 0),
        read_u16(data, 2),
        read_u16(data, 4),
        read_u16(data, 6),
    ) {
        (Some(row_gutter), Some(col_gutter), Some(row_levels), Some(col_levels)) => Ok(Guts {
            row_gutter,
            col_gutter,
            row_levels: row_levels.saturating_sub(1),
            col_levels: col_levels.saturating_sub(1),
        }),
        _ => Err(format!("GUTS record too short (len={})", data.len())),
    }
}

pub(crate) fn parse_wsbool(data: &[u8]) -> Result<u16, String> {
    read_u16(data, 0).ok_or_else(|| format!("WSBOOL record too short (len={})", data.len()))
}

/// Read-only workbook tables a sheet resolves indices against.
#[derive(Clone, Copy)]
pub(crate) struct SheetContext<'g> {
    pub(crate) shared_strings: &'g [String],
    pub(crate) formats: &'g dyn FormattingRegistry,
    pub(crate) date_system: DateSystem,
    pub(crate) max_warnings: usize,
}

/// Identity of the substream being assembled.
pub(crate) struct SheetMeta {
    pub(crate) name: String,
    pub(crate) version: BiffVersion,
    pub(crate) kind: SubstreamKind,
    pub(crate) visibility: SheetVisibility,
    pub(crate) offset: usize,
}

pub(crate) struct SheetBuilder<'g> {
    sheet: Sheet,
    ctx: SheetContext<'g>,
    /// Formula cell waiting for its `STRING` record.
    pending_string: Option<CellRef>,
    reported_xfs: HashSet<u32>,
}

impl<'g> SheetBuilder<'g> {
    pub(crate) fn new(meta: SheetMeta, ctx: SheetContext<'g>) -> Self {
        Self {
            sheet: Sheet {
                name: meta.name,
                version: meta.version,
                kind: meta.kind,
                visibility: meta.visibility,
                offset: meta.offset,
                dimensions: None,
                cells: BTreeMap::new(),
                rows: BTreeMap::new(),
                columns: Vec::new(),
                merged: Vec::new(),
                outline: Outline::default(),
                groups: Vec::new(),
                warnings: Vec::new(),
                complete: true,
            },
            ctx,
            pending_string: None,
            reported_xfs: HashSet::new(),
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.sheet.name
    }

    pub(crate) fn warn(&mut self, warning: impl Into<String>) {
        push_warning_bounded(&mut self.sheet.warnings, self.ctx.max_warnings, warning);
    }

    pub(crate) fn apply(&mut self, record: SheetRecord) {
        let record = match record {
            SheetRecord::StringResult(text) => {
                match self.pending_string.take() {
                    Some(target) => {
                        if let Some(cell) = self.sheet.cells.get_mut(&target) {
                            cell.value = CellValue::Text(text);
                        }
                    }
                    None => log::debug!("STRING record without a preceding string FORMULA"),
                }
                return;
            }
            // Group definitions sit between a FORMULA and its STRING.
            SheetRecord::Group(group) => {
                self.sheet.groups.push(group);
                return;
            }
            other => other,
        };
        if let Some(target) = self.pending_string.take() {
            self.warn(format!(
                "formula at {} has a string result but no STRING record",
                target.to_a1()
            ));
        }

        match record {
            SheetRecord::Dimensions(dimensions) => self.sheet.dimensions = Some(dimensions),
            SheetRecord::Row(info) => {
                self.sheet.rows.insert(info.row, info);
            }
            SheetRecord::ColInfo(info) => self.sheet.columns.push(info),
            SheetRecord::MergedCells(ranges) => self.sheet.merged.extend(ranges),
            SheetRecord::Guts(guts) => {
                let outline = &mut self.sheet.outline;
                outline.row_gutter = guts.row_gutter;
                outline.col_gutter = guts.col_gutter;
                outline.row_levels = guts.row_levels;
                outline.col_levels = guts.col_levels;
            }
            SheetRecord::WsBool(flags) => {
                self.sheet.outline.summary_below = flags & WSBOOL_ROW_SUMS_BELOW != 0;
                self.sheet.outline.summary_right = flags & WSBOOL_COL_SUMS_RIGHT != 0;
            }
            SheetRecord::Cell(cell) => self.push_value_cell(cell),
            SheetRecord::Cells(cells) => {
                for cell in cells {
                    self.push_value_cell(cell);
                }
            }
            SheetRecord::Formula {
                formula,
                next_offset,
            } => self.push_formula(formula, next_offset),
            SheetRecord::StringResult(_) | SheetRecord::Group(_) => {}
        }
    }

    fn push_value_cell(&mut self, record: CellRecord) {
        let CellRecord { header, payload } = record;
        let (cell_type, value) = match payload {
            CellPayload::Blank => (CellType::Blank, CellValue::Blank),
            CellPayload::Number(n) => (CellType::Number, self.numeric_value(header.xf, n)),
            CellPayload::Rk(n) => (CellType::RkNumber, self.numeric_value(header.xf, n)),
            CellPayload::Label(text) => (CellType::Label, CellValue::Text(text)),
            CellPayload::LabelSst(index) => (CellType::LabelSst, self.shared_string(index)),
            CellPayload::Bool(b) => (CellType::Boolean, CellValue::Bool(b)),
            CellPayload::Error(code) => (CellType::Error, CellValue::Error(ErrorValue::from_code(code))),
        };
        self.insert(Cell {
            row: header.row,
            col: header.col,
            xf_index: header.xf,
            cell_type,
            value,
            formula: None,
        });
    }

    fn push_formula(&mut self, record: FormulaRecord, next_offset: usize) {
        let FormulaRecord {
            header,
            result,
            flags,
            rgce,
            rgcb,
        } = record;
        let coord = CellRef::new(header.row, header.col);

        let (kind, value) = match result {
            FormulaResult::Number(n) => match self.numeric_value(header.xf, n) {
                date @ CellValue::Date { .. } => (FormulaKind::Date, date),
                other => (FormulaKind::Number, other),
            },
            FormulaResult::String => {
                self.pending_string = Some(coord);
                (FormulaKind::String, CellValue::Text(String::new()))
            }
            FormulaResult::EmptyString => (FormulaKind::String, CellValue::Text(String::new())),
            FormulaResult::Bool(b) => (FormulaKind::Boolean, CellValue::Bool(b)),
            FormulaResult::Error(code) => {
                (FormulaKind::Error, CellValue::Error(ErrorValue::from_code(code)))
            }
        };

        let link = match biff_rgce::parse_ptg_exp(&rgce) {
            Some(anchor) => {
                let table = rgce.first() == Some(&0x02);
                self.sheet
                    .groups
                    .iter()
                    .position(|group| group_matches(group, anchor, table, coord))
                    .map(|index| FormulaLink::Group(GroupId(index)))
                    .unwrap_or(FormulaLink::Pending {
                        anchor,
                        table,
                        scan_from: next_offset,
                    })
            }
            None => {
                if flags.is_shared() {
                    log::debug!(
                        "formula at {} is flagged shared but carries its own tokens",
                        coord.to_a1()
                    );
                }
                FormulaLink::Own
            }
        };
        let cell_type = match link {
            FormulaLink::Own => CellType::Formula(kind),
            _ => CellType::SharedFormula(kind),
        };

        self.insert(Cell {
            row: header.row,
            col: header.col,
            xf_index: header.xf,
            cell_type,
            value,
            formula: Some(FormulaSource { rgce, rgcb, link }),
        });
    }

    fn insert(&mut self, cell: Cell) {
        let coord = cell.coordinate();
        if let Some(dimensions) = self.sheet.dimensions {
            if !dimensions.contains(coord) {
                self.warn(format!(
                    "cell {} in sheet `{}` is outside the declared dimensions",
                    coord.to_a1(),
                    self.sheet.name
                ));
            }
        }
        if self.sheet.cells.insert(coord, cell).is_some() {
            log::debug!("cell {} redefined in sheet `{}`", coord.to_a1(), self.sheet.name);
        }
    }

    fn shared_string(&mut self, index: u32) -> CellValue {
        match self.ctx.shared_strings.get(index as usize) {
            Some(text) => CellValue::Text(text.clone()),
            None => {
                let err = BiffError::IndexOutOfRange {
                    what: "SST",
                    index,
                    len: self.ctx.shared_strings.len(),
                };
                self.warn(err.to_string());
                CellValue::Text(String::new())
            }
        }
    }

    fn numeric_value(&mut self, xf: u32, n: f64) -> CellValue {
        if self.is_date_xf(xf) {
            CellValue::Date {
                serial: n,
                datetime: self.ctx.date_system.to_datetime(n),
            }
        } else {
            CellValue::Number(n)
        }
    }

    /// An unresolvable XF formats as General. Streams without any XF records skip the warning.
    fn is_date_xf(&mut self, xf: u32) -> bool {
        match self.ctx.formats.resolve(xf) {
            Some(format) => format.is_date(),
            None => {
                let len = self.ctx.formats.xf_count();
                if len > 0 && self.reported_xfs.insert(xf) {
                    self.warn(
                        BiffError::IndexOutOfRange {
                            what: "XF",
                            index: xf,
                            len,
                        }
                        .to_string(),
                    );
                }
                false
            }
        }
    }

    /// Close the sheet. `complete` is false when decoding stopped on a corrupt record.
    pub(crate) fn finish(mut self, complete: bool) -> Sheet {
        if let Some(target) = self.pending_string.take() {
            self.warn(format!(
                "formula at {} has a string result but no STRING record",
                target.to_a1()
            ));
        }
        self.sheet.complete = complete;
        log::debug!(
            "sheet `{}`: {} cells, {} formula groups",
            self.sheet.name,
            self.sheet.cells.len(),
            self.sheet.groups.len()
        );
        self.sheet
    }
}
