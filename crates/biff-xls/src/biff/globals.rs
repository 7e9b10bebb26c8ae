//! Workbook globals substream assembly.
//!
//! The globals substream comes first and holds every table worksheet records refer to by index:
//! shared strings, XFs, sheet names, EXTERNSHEET/SUPBOOK, and defined names. The tables are
//! write-once: the builder fills them in stream order and [`GlobalsBuilder::finish`] freezes them.

use biff_model::DateSystem;
use serde::Serialize;

use super::dispatch::GlobalsRecord;
use super::externsheet::ExternSheetEntry;
use super::formats::XfTable;
use super::names::DefinedName;
use super::strings;
use super::supbook::SupBook;
use super::{push_warning_bounded, BiffVersion};

/// Sheet visibility (`BOUNDSHEET.hsState`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SheetVisibility {
    Visible,
    Hidden,
    VeryHidden,
}

/// Sheet type (`BOUNDSHEET.dt`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SheetType {
    Worksheet,
    MacroSheet,
    Chart,
    VbModule,
    Other(u8),
}

/// One `BOUNDSHEET` record ([MS-XLS] 2.4.28).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BoundSheet {
    pub name: String,
    /// Stream offset of the sheet's BOF record (`lbPlyPos`).
    pub offset: u32,
    pub visibility: SheetVisibility,
    pub sheet_type: SheetType,
}

/// `[lbPlyPos: u32][hsState: u8][dt: u8][stName: short string]`.
pub(crate) fn parse_boundsheet(
    data: &[u8],
    version: BiffVersion,
    codepage: u16,
) -> Result<BoundSheet, String> {
    let offset = super::read_u32(data, 0)
        .ok_or_else(|| format!("BOUNDSHEET record too short (len={})", data.len()))?;
    let (Some(&state), Some(&dt)) = (data.get(4), data.get(5)) else {
        return Err(format!("BOUNDSHEET record too short (len={})", data.len()));
    };
    let (name, _) = strings::parse_short_string(&data[6..], version, codepage)?;

    let visibility = match state & 0x03 {
        0 => SheetVisibility::Visible,
        1 => SheetVisibility::Hidden,
        _ => SheetVisibility::VeryHidden,
    };
    let sheet_type = match dt {
        0x00 => SheetType::Worksheet,
        0x01 => SheetType::MacroSheet,
        0x02 => SheetType::Chart,
        0x06 => SheetType::VbModule,
        other => SheetType::Other(other),
    };
    Ok(BoundSheet {
        name,
        offset,
        visibility,
        sheet_type,
    })
}

/// Frozen workbook-level tables.
#[derive(Debug, Clone)]
pub(crate) struct Globals {
    pub(crate) version: BiffVersion,
    pub(crate) codepage: u16,
    pub(crate) date_system: DateSystem,
    pub(crate) shared_strings: Vec<String>,
    pub(crate) bound_sheets: Vec<BoundSheet>,
    pub(crate) extern_sheets: Vec<ExternSheetEntry>,
    pub(crate) supbooks: Vec<SupBook>,
    pub(crate) names: Vec<DefinedName>,
    pub(crate) xfs: XfTable,
    pub(crate) warnings: Vec<String>,
}

pub(crate) struct GlobalsBuilder {
    globals: Globals,
    max_warnings: usize,
}

impl GlobalsBuilder {
    pub(crate) fn new(version: BiffVersion, codepage: u16, max_warnings: usize) -> Self {
        Self {
            globals: Globals {
                version,
                codepage,
                date_system: DateSystem::default(),
                shared_strings: Vec::new(),
                bound_sheets: Vec::new(),
                extern_sheets: Vec::new(),
                supbooks: Vec::new(),
                names: Vec::new(),
                xfs: XfTable::default(),
                warnings: Vec::new(),
            },
            max_warnings,
        }
    }

    pub(crate) fn warn(&mut self, warning: impl Into<String>) {
        push_warning_bounded(&mut self.globals.warnings, self.max_warnings, warning);
    }

    pub(crate) fn apply(&mut self, record: GlobalsRecord) {
        match record {
            GlobalsRecord::BoundSheet(sheet) => self.globals.bound_sheets.push(sheet),
            GlobalsRecord::CodePage(codepage) => self.globals.codepage = codepage,
            GlobalsRecord::DateMode(date_system) => self.globals.date_system = date_system,
            GlobalsRecord::Sst(parsed) => {
                let duplicate = !self.globals.shared_strings.is_empty();
                self.globals.shared_strings = parsed.strings;
                if duplicate {
                    self.warn("duplicate SST record; keeping the last one");
                }
                if let Some(error) = parsed.error {
                    self.warn(format!("SST truncated: {error}"));
                }
            }
            GlobalsRecord::ExternSheet(parsed) => {
                self.globals.extern_sheets = parsed.entries;
                if let Some(warning) = parsed.warning {
                    self.warn(warning);
                }
            }
            GlobalsRecord::SupBook(supbook) => self.globals.supbooks.push(supbook),
            // EXTERNNAME records belong to the most recent SUPBOOK.
            GlobalsRecord::ExternName(name) => match self.globals.supbooks.last_mut() {
                Some(supbook) => supbook.extern_names.push(name),
                None => self.warn(format!("EXTERNNAME `{name}` without a preceding SUPBOOK")),
            },
            GlobalsRecord::Name(name) => self.globals.names.push(name),
            GlobalsRecord::Format(id, code) => self.globals.xfs.insert_format(id, code),
            GlobalsRecord::Xf(xf) => self.globals.xfs.push_xf(xf),
        }
    }

    pub(crate) fn finish(self) -> Globals {
        log::debug!(
            "workbook globals: {} sheets, {} shared strings, {} XFs, {} names",
            self.globals.bound_sheets.len(),
            self.globals.shared_strings.len(),
            self.globals.xfs.len(),
            self.globals.names.len()
        );
        self.globals
    }
}
