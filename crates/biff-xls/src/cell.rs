//! Decoded cell values.

use biff_model::{CellRef, ErrorValue};
use chrono::NaiveDateTime;
use serde::Serialize;

use crate::biff::formulas::FormulaGroup;

/// How the last calculated value of a formula cell is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FormulaKind {
    Number,
    String,
    Boolean,
    Error,
    /// A numeric result whose XF carries a date/time number format.
    Date,
}

/// The record family a cell was decoded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "result")]
pub enum CellType {
    Blank,
    Number,
    RkNumber,
    Label,
    LabelSst,
    Boolean,
    Error,
    Formula(FormulaKind),
    /// A formula cell whose program lives in a SHRFMLA, ARRAY or TABLE group.
    SharedFormula(FormulaKind),
}

impl CellType {
    pub fn is_formula(self) -> bool {
        matches!(self, CellType::Formula(_) | CellType::SharedFormula(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum CellValue {
    Blank,
    Number(f64),
    Date {
        serial: f64,
        /// `None` when the serial is outside the representable date range.
        datetime: Option<NaiveDateTime>,
    },
    Text(String),
    Bool(bool),
    Error(ErrorValue),
}

impl CellValue {
    /// The numeric value of `Number` and `Date` cells.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) => Some(*n),
            CellValue::Date { serial, .. } => Some(*serial),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            CellValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// One cell of a sheet grid.
///
/// The value is fixed at decode time. Formula cells additionally keep their token program (or
/// a link to the group that owns it) so the workbook can render formula text on request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cell {
    pub row: u32,
    pub col: u32,
    pub xf_index: u32,
    pub cell_type: CellType,
    pub value: CellValue,
    #[serde(skip)]
    pub(crate) formula: Option<FormulaSource>,
}

impl Cell {
    pub fn coordinate(&self) -> CellRef {
        CellRef::new(self.row, self.col)
    }

    pub fn is_formula(&self) -> bool {
        self.cell_type.is_formula()
    }
}

/// Index into a sheet's formula group arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct GroupId(pub(crate) usize);

/// Where a formula cell's program comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum FormulaLink {
    /// The cell's own `rgce` is the program.
    Own,
    /// A group decoded before the cell.
    Group(GroupId),
    /// `PtgExp`/`PtgTbl` pointing at an anchor whose group hadn't been seen yet; resolved by a
    /// forward scan starting at `scan_from` (the offset of the record after the cell).
    Pending {
        anchor: CellRef,
        table: bool,
        scan_from: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FormulaSource {
    pub(crate) rgce: Vec<u8>,
    pub(crate) rgcb: Vec<u8>,
    pub(crate) link: FormulaLink,
}

/// Whether `group` can own a cell whose program is `PtgExp`/`PtgTbl` pointing at `anchor`.
pub(crate) fn group_matches(group: &FormulaGroup, anchor: CellRef, table: bool, cell: CellRef) -> bool {
    use crate::biff::formulas::GroupKind;

    let kind_ok = match group.kind {
        GroupKind::Table => table,
        GroupKind::Shared | GroupKind::Array => !table,
    };
    kind_ok && group.anchor() == anchor && group.range.contains(cell)
}
