//! Decoded worksheets.

use std::collections::BTreeMap;

use biff_model::{CellRef, Range};
use serde::Serialize;

use crate::biff::formulas::FormulaGroup;
use crate::biff::globals::SheetVisibility;
use crate::biff::{BiffVersion, SubstreamKind};
use crate::cell::Cell;

/// Declared used range from the `DIMENSIONS` record. The `last_*` bounds are exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Dimensions {
    pub first_row: u32,
    pub last_row: u32,
    pub first_col: u32,
    pub last_col: u32,
}

impl Dimensions {
    pub fn contains(&self, cell: CellRef) -> bool {
        (self.first_row..self.last_row).contains(&cell.row)
            && (self.first_col..self.last_col).contains(&cell.col)
    }

    pub fn is_empty(&self) -> bool {
        self.last_row <= self.first_row || self.last_col <= self.first_col
    }
}

/// Per-row display overrides (`ROW`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RowInfo {
    pub row: u32,
    /// Height in twips.
    pub height: u16,
    pub outline_level: u8,
    pub group_start: bool,
    pub collapsed: bool,
    /// The height was set explicitly and doesn't follow the default font.
    pub custom_height: bool,
    pub has_default_format: bool,
    pub xf_index: u32,
}

impl RowInfo {
    pub fn is_hidden(&self) -> bool {
        self.height == 0 || self.collapsed
    }
}

/// Display overrides for a run of columns (`COLINFO`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ColInfo {
    pub first_col: u32,
    pub last_col: u32,
    /// Width in 1/256 of the zero-character width.
    pub width: u16,
    pub xf_index: u32,
    pub hidden: bool,
    pub outline_level: u8,
    pub collapsed: bool,
}

impl ColInfo {
    pub fn contains(&self, col: u32) -> bool {
        (self.first_col..=self.last_col).contains(&col)
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden || self.width == 0
    }
}

/// Outline gutters (`GUTS`) and summary placement (`WSBOOL`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Outline {
    pub row_gutter: u16,
    pub col_gutter: u16,
    /// Number of row outline levels in use (0 when rows aren't grouped).
    pub row_levels: u16,
    pub col_levels: u16,
    pub summary_below: bool,
    pub summary_right: bool,
}

impl Default for Outline {
    fn default() -> Self {
        Self {
            row_gutter: 0,
            col_gutter: 0,
            row_levels: 0,
            col_levels: 0,
            summary_below: true,
            summary_right: true,
        }
    }
}

/// One row of the grid: its `ROW` record (if any) and its cells in column order.
#[derive(Debug, Clone)]
pub struct Row<'a> {
    pub index: u32,
    pub info: Option<&'a RowInfo>,
    pub cells: Vec<&'a Cell>,
}

#[derive(Debug, Clone)]
pub struct Sheet {
    pub(crate) name: String,
    pub(crate) version: BiffVersion,
    pub(crate) kind: SubstreamKind,
    pub(crate) visibility: SheetVisibility,
    pub(crate) offset: usize,
    pub(crate) dimensions: Option<Dimensions>,
    pub(crate) cells: BTreeMap<CellRef, Cell>,
    pub(crate) rows: BTreeMap<u32, RowInfo>,
    pub(crate) columns: Vec<ColInfo>,
    pub(crate) merged: Vec<Range>,
    pub(crate) outline: Outline,
    pub(crate) groups: Vec<FormulaGroup>,
    pub(crate) warnings: Vec<String>,
    pub(crate) complete: bool,
}

impl Sheet {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> BiffVersion {
        self.version
    }

    pub fn kind(&self) -> SubstreamKind {
        self.kind
    }

    pub fn visibility(&self) -> SheetVisibility {
        self.visibility
    }

    /// Stream offset of the sheet's BOF record.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// `false` when decoding stopped early on a corrupt record; the cells decoded before the
    /// corruption are kept.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn cell(&self, row: u32, col: u32) -> Option<&Cell> {
        self.cells.get(&CellRef::new(row, col))
    }

    /// Cells in row-major order.
    pub fn cells(&self) -> impl Iterator<Item = &Cell> + '_ {
        self.cells.values()
    }

    /// Every row that has a `ROW` record or at least one cell, in ascending order.
    pub fn rows(&self) -> impl Iterator<Item = Row<'_>> + '_ {
        let mut rows: BTreeMap<u32, Row<'_>> = self
            .rows
            .iter()
            .map(|(&index, info)| {
                (
                    index,
                    Row {
                        index,
                        info: Some(info),
                        cells: Vec::new(),
                    },
                )
            })
            .collect();
        for cell in self.cells.values() {
            rows.entry(cell.row)
                .or_insert_with(|| Row {
                    index: cell.row,
                    info: None,
                    cells: Vec::new(),
                })
                .cells
                .push(cell);
        }
        rows.into_values()
    }

    pub fn dimensions(&self) -> Option<Dimensions> {
        self.dimensions
    }

    /// `(rows, columns)` spanned by the stored cells, counted from A1.
    pub fn extent(&self) -> (u32, u32) {
        self.cells.keys().fold((0, 0), |(rows, cols), cell| {
            (rows.max(cell.row + 1), cols.max(cell.col + 1))
        })
    }

    pub fn merged_ranges(&self) -> &[Range] {
        &self.merged
    }

    pub fn row_info(&self, row: u32) -> Option<&RowInfo> {
        self.rows.get(&row)
    }

    /// The last `COLINFO` covering `col` wins.
    pub fn col_info(&self, col: u32) -> Option<&ColInfo> {
        self.columns.iter().rev().find(|info| info.contains(col))
    }

    pub fn outline(&self) -> Outline {
        self.outline
    }

    /// A cell is hidden when its column is hidden or zero-width, or its row is zero-height or
    /// collapsed. Missing overrides mean visible.
    pub fn is_hidden(&self, cell: CellRef) -> bool {
        self.col_info(cell.col).is_some_and(ColInfo::is_hidden)
            || self.row_info(cell.row).is_some_and(RowInfo::is_hidden)
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }
}
