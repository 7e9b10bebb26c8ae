//! Decoded workbook and on-demand formula text.

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use biff_model::{CellRef, DateSystem};
use biff_rgce::{decode_rgce, format_sheet_prefix, FormulaContext};

use crate::biff::externsheet::ExternSheetEntry;
use crate::biff::formats::{FormattingRegistry, ResolvedFormat, XfTable};
use crate::biff::formulas::FormulaGroup;
use crate::biff::globals::{BoundSheet, Globals};
use crate::biff::names::DefinedName;
use crate::biff::shared_formulas::{forward_scan, group_formula_text, group_program};
use crate::biff::supbook::SupBookKind;
use crate::biff::BiffVersion;
use crate::cell::{FormulaLink, FormulaSource};
use crate::error::BiffError;
use crate::sheet::Sheet;

/// A formula cell's token program, rebased to the cell for shared formulas.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormulaProgram {
    pub rgce: Vec<u8>,
    /// Trailing data for tokens such as inline arrays.
    pub rgcb: Vec<u8>,
}

type FormulaTextCache = HashMap<(usize, CellRef), Result<String, BiffError>>;

/// A decoded workbook stream.
///
/// Holds the stream bytes so formula groups that weren't seen during the forward pass can be
/// located later. Formula text is memoized per cell, error outcomes included.
pub struct Workbook {
    stream: Arc<[u8]>,
    globals: Globals,
    sheets: Vec<Sheet>,
    warnings: Vec<String>,
    formula_text: Mutex<FormulaTextCache>,
}

impl fmt::Debug for Workbook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Workbook")
            .field("version", &self.globals.version)
            .field("stream_len", &self.stream.len())
            .field("sheets", &self.sheets.len())
            .field("warnings", &self.warnings.len())
            .finish_non_exhaustive()
    }
}

impl Workbook {
    pub(crate) fn new(
        stream: Arc<[u8]>,
        globals: Globals,
        sheets: Vec<Sheet>,
        warnings: Vec<String>,
    ) -> Self {
        Self {
            stream,
            globals,
            sheets,
            warnings,
            formula_text: Mutex::new(HashMap::new()),
        }
    }

    /// BIFF version of the workbook globals substream.
    pub fn version(&self) -> BiffVersion {
        self.globals.version
    }

    pub fn codepage(&self) -> u16 {
        self.globals.codepage
    }

    pub fn date_system(&self) -> DateSystem {
        self.globals.date_system
    }

    pub fn shared_strings(&self) -> &[String] {
        &self.globals.shared_strings
    }

    pub fn bound_sheets(&self) -> &[BoundSheet] {
        &self.globals.bound_sheets
    }

    pub fn extern_sheets(&self) -> &[ExternSheetEntry] {
        &self.globals.extern_sheets
    }

    pub fn defined_names(&self) -> &[DefinedName] {
        &self.globals.names
    }

    pub fn formatting(&self) -> &XfTable {
        &self.globals.xfs
    }

    /// Resolved formatting for `xf`, or the General placeholder when it doesn't resolve.
    pub fn cell_format(&self, xf: u32) -> ResolvedFormat {
        self.globals
            .xfs
            .resolve(xf)
            .unwrap_or_else(|| ResolvedFormat::general(xf))
    }

    /// Worksheets and macro sheets in stream order. Chart substreams are not included.
    pub fn sheets(&self) -> &[Sheet] {
        &self.sheets
    }

    pub fn sheet(&self, index: usize) -> Option<&Sheet> {
        self.sheets.get(index)
    }

    pub fn sheet_by_name(&self, name: &str) -> Option<&Sheet> {
        self.sheets
            .iter()
            .find(|sheet| sheet.name().eq_ignore_ascii_case(name))
    }

    /// Workbook-level warnings (globals decoding and substream recovery). Per-sheet warnings
    /// are on [`Sheet::warnings`].
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Formula text (without the leading `=`) of the formula cell at `cell` in sheet
    /// `sheet_index`.
    ///
    /// `None` when there is no such sheet or the cell is not a formula. An error here leaves the
    /// cell's value untouched.
    pub fn formula_text(
        &self,
        sheet_index: usize,
        cell: CellRef,
    ) -> Option<Result<String, BiffError>> {
        let sheet = self.sheets.get(sheet_index)?;
        let source = sheet.cells.get(&cell)?.formula.as_ref()?;

        let key = (sheet_index, cell);
        if let Some(cached) = self.cache().get(&key) {
            return Some(cached.clone());
        }
        // Decode without holding the lock; a racing thread computes the same value.
        let text = self.decode_formula_text(sheet, source, cell);
        self.cache().entry(key).or_insert_with(|| text.clone());
        Some(text)
    }

    /// Raw token program of the formula cell at `cell`, rebased to the cell for shared
    /// formulas. Only defined for BIFF8 sheets.
    pub fn formula_program(
        &self,
        sheet_index: usize,
        cell: CellRef,
    ) -> Option<Result<FormulaProgram, BiffError>> {
        let sheet = self.sheets.get(sheet_index)?;
        let source = sheet.cells.get(&cell)?.formula.as_ref()?;
        Some(self.decode_formula_program(sheet, source, cell))
    }

    /// Formula text of the defined name at `index` (0-based, in NAME record order).
    pub fn defined_name_formula(&self, index: usize) -> Option<Result<String, BiffError>> {
        let name = self.globals.names.get(index)?;
        Some(
            require_biff8(self.globals.version, "defined name formula").and_then(|()| {
                Ok(decode_rgce(
                    &name.rgce,
                    &name.rgcb,
                    CellRef::new(0, 0),
                    &NameResolver::new(&self.globals),
                )?)
            }),
        )
    }

    fn cache(&self) -> std::sync::MutexGuard<'_, FormulaTextCache> {
        self.formula_text
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn decode_formula_text(
        &self,
        sheet: &Sheet,
        source: &FormulaSource,
        cell: CellRef,
    ) -> Result<String, BiffError> {
        require_biff8(sheet.version(), "formula text")?;
        let ctx = NameResolver::new(&self.globals);
        match source.link {
            FormulaLink::Own => Ok(decode_rgce(&source.rgce, &source.rgcb, cell, &ctx)?),
            _ => {
                let group = self.resolve_group(sheet, source, cell)?;
                group_formula_text(&group, cell, &ctx)
            }
        }
    }

    fn decode_formula_program(
        &self,
        sheet: &Sheet,
        source: &FormulaSource,
        cell: CellRef,
    ) -> Result<FormulaProgram, BiffError> {
        require_biff8(sheet.version(), "formula program")?;
        let own = || FormulaProgram {
            rgce: source.rgce.clone(),
            rgcb: source.rgcb.clone(),
        };
        if source.link == FormulaLink::Own {
            return Ok(own());
        }
        let group = self.resolve_group(sheet, source, cell)?;
        Ok(match group_program(&group, cell)? {
            Some((rgce, rgcb)) => FormulaProgram { rgce, rgcb },
            // Data table cells keep their `PtgTbl` program.
            None => own(),
        })
    }

    /// The group owning a `PtgExp`/`PtgTbl` cell, scanning forward if the sheet didn't link it
    /// during decoding.
    fn resolve_group<'s>(
        &self,
        sheet: &'s Sheet,
        source: &FormulaSource,
        cell: CellRef,
    ) -> Result<Cow<'s, FormulaGroup>, BiffError> {
        match source.link {
            FormulaLink::Group(id) => sheet.groups.get(id.0).map(Cow::Borrowed).ok_or(
                BiffError::IndexOutOfRange {
                    what: "formula group",
                    index: u32::try_from(id.0).unwrap_or(u32::MAX),
                    len: sheet.groups.len(),
                },
            ),
            FormulaLink::Pending {
                anchor,
                table,
                scan_from,
            } => {
                let found = forward_scan(&self.stream, scan_from, anchor, table, cell)?;
                Ok(sheet
                    .groups
                    .iter()
                    .find(|group| group.offset == found.offset)
                    .map_or(Cow::Owned(found), Cow::Borrowed))
            }
            FormulaLink::Own => Err(BiffError::StreamCorrupt {
                offset: sheet.offset(),
                message: format!("cell {} has no formula group", cell.to_a1()),
            }),
        }
    }
}

fn require_biff8(version: BiffVersion, operation: &'static str) -> Result<(), BiffError> {
    match version {
        BiffVersion::Biff8 => Ok(()),
        found => Err(BiffError::Biff8Required { operation, found }),
    }
}

/// Resolves sheet, defined-name and external-name references against the workbook globals.
struct NameResolver<'a> {
    globals: &'a Globals,
}

impl<'a> NameResolver<'a> {
    fn new(globals: &'a Globals) -> Self {
        Self { globals }
    }
}

impl FormulaContext for NameResolver<'_> {
    fn sheet_prefix(&self, ixti: u16) -> Option<String> {
        let entry = self.globals.extern_sheets.get(usize::from(ixti))?;
        let supbook = self.globals.supbooks.get(usize::from(entry.supbook))?;
        // Negative tab indices mark deleted sheets and workbook-level references.
        let first = usize::try_from(entry.itab_first).ok()?;
        let last = usize::try_from(entry.itab_last).ok();
        match &supbook.kind {
            SupBookKind::Internal => {
                let sheets = &self.globals.bound_sheets;
                let first = sheets.get(first)?.name.as_str();
                let last = last.and_then(|last| sheets.get(last)).map(|s| s.name.as_str());
                Some(format_sheet_prefix(None, first, last))
            }
            SupBookKind::External { workbook, sheets } => {
                let first = sheets.get(first)?.as_str();
                let last = last.and_then(|last| sheets.get(last)).map(String::as_str);
                Some(format_sheet_prefix(Some(workbook.as_str()), first, last))
            }
            SupBookKind::AddIn => None,
        }
    }

    fn defined_name(&self, index: u32) -> Option<String> {
        let index = usize::try_from(index.checked_sub(1)?).ok()?;
        self.globals.names.get(index).map(|name| name.name.clone())
    }

    fn external_name(&self, ixti: u16, index: u32) -> Option<String> {
        let entry = self.globals.extern_sheets.get(usize::from(ixti))?;
        let supbook = self.globals.supbooks.get(usize::from(entry.supbook))?;
        let index = usize::try_from(index.checked_sub(1)?).ok()?;
        let name = supbook.extern_names.get(index)?;
        match &supbook.kind {
            SupBookKind::External { workbook, .. } => {
                let plain = workbook
                    .chars()
                    .all(|c| c.is_alphanumeric() || c == '_' || c == '.');
                Some(if plain {
                    format!("{workbook}!{name}")
                } else {
                    format!("'{}'!{name}", workbook.replace('\'', "''"))
                })
            }
            SupBookKind::Internal | SupBookKind::AddIn => Some(name.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::biff::globals::{SheetType, SheetVisibility};
    use crate::biff::supbook::SupBook;
    use pretty_assertions::assert_eq;

    fn globals() -> Globals {
        let sheet = |name: &str| BoundSheet {
            name: name.to_string(),
            offset: 0,
            visibility: SheetVisibility::Visible,
            sheet_type: SheetType::Worksheet,
        };
        Globals {
            version: BiffVersion::Biff8,
            codepage: 1252,
            date_system: DateSystem::default(),
            shared_strings: Vec::new(),
            bound_sheets: vec![sheet("Sheet1"), sheet("My Data"), sheet("Sheet3")],
            extern_sheets: vec![
                ExternSheetEntry {
                    supbook: 0,
                    itab_first: 1,
                    itab_last: 1,
                },
                ExternSheetEntry {
                    supbook: 0,
                    itab_first: 0,
                    itab_last: 2,
                },
                ExternSheetEntry {
                    supbook: 0,
                    itab_first: -1,
                    itab_last: -1,
                },
                ExternSheetEntry {
                    supbook: 1,
                    itab_first: 0,
                    itab_last: 0,
                },
                ExternSheetEntry {
                    supbook: 2,
                    itab_first: -2,
                    itab_last: -2,
                },
            ],
            supbooks: vec![
                SupBook {
                    kind: SupBookKind::Internal,
                    extern_names: Vec::new(),
                },
                SupBook {
                    kind: SupBookKind::External {
                        workbook: "Rates.xls".to_string(),
                        sheets: vec!["FX".to_string()],
                    },
                    extern_names: vec!["Spot".to_string()],
                },
                SupBook {
                    kind: SupBookKind::AddIn,
                    extern_names: vec!["EDATE".to_string()],
                },
            ],
            names: Vec::new(),
            xfs: XfTable::default(),
            warnings: Vec::new(),
        }
    }

    #[test]
    fn resolves_sheet_prefixes_through_supbooks() {
        let globals = globals();
        let ctx = NameResolver::new(&globals);
        assert_eq!(ctx.sheet_prefix(0).as_deref(), Some("'My Data'!"));
        assert_eq!(ctx.sheet_prefix(1).as_deref(), Some("Sheet1:Sheet3!"));
        assert_eq!(ctx.sheet_prefix(2), None);
        assert_eq!(ctx.sheet_prefix(3).as_deref(), Some("[Rates.xls]FX!"));
        assert_eq!(ctx.sheet_prefix(9), None);
    }

    #[test]
    fn resolves_external_names() {
        let globals = globals();
        let ctx = NameResolver::new(&globals);
        assert_eq!(ctx.external_name(3, 1).as_deref(), Some("Rates.xls!Spot"));
        assert_eq!(ctx.external_name(4, 1).as_deref(), Some("EDATE"));
        assert_eq!(ctx.external_name(4, 0), None);
        assert_eq!(ctx.defined_name(1), None);
    }

    #[test]
    fn workbook_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Workbook>();
    }
}
