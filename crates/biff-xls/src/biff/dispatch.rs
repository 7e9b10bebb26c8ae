//! Opcode dispatch and substream tracking.
//!
//! [`Dispatcher::dispatch`] turns one logical record into at most one typed [`BiffRecord`]. It
//! keeps the BOF/EOF stack so record types that are only meaningful inside the workbook
//! globals (or only inside a worksheet) are decoded in that context alone; out-of-context
//! records and everything inside chart substreams are skipped.

use biff_model::{DateSystem, Range};

use super::cells::{self, CellRecord};
use super::externsheet::{self, ParsedExternSheet};
use super::formats::{self, XfRecord};
use super::formulas::{self, FormulaGroup, FormulaRecord};
use super::globals::{self, BoundSheet};
use super::names::{self, DefinedName};
use super::records::{LogicalBiffRecord, RECORD_BOF_BIFF7, RECORD_BOF_BIFF8, RECORD_EOF};
use super::sheet::{self as sheet_records, Guts};
use super::sst::{self, ParsedSst};
use super::supbook::{self, SupBook};
use super::{Bof, BiffVersion, SubstreamKind};
use crate::error::BiffError;
use crate::sheet::{ColInfo, Dimensions, RowInfo};

// Workbook globals.
pub(crate) const RECORD_EXTERNSHEET: u16 = 0x0017;
pub(crate) const RECORD_NAME: u16 = 0x0018;
pub(crate) const RECORD_DATEMODE: u16 = 0x0022;
pub(crate) const RECORD_EXTERNNAME: u16 = 0x0023;
pub(crate) const RECORD_CODEPAGE: u16 = 0x0042;
pub(crate) const RECORD_BOUNDSHEET: u16 = 0x0085;
pub(crate) const RECORD_XF: u16 = 0x00E0;
pub(crate) const RECORD_SST: u16 = 0x00FC;
pub(crate) const RECORD_SUPBOOK: u16 = 0x01AE;
pub(crate) const RECORD_FORMAT: u16 = 0x041E;

// Worksheet structure.
pub(crate) const RECORD_COLINFO: u16 = 0x007D;
pub(crate) const RECORD_GUTS: u16 = 0x0080;
pub(crate) const RECORD_WSBOOL: u16 = 0x0081;
pub(crate) const RECORD_MERGEDCELLS: u16 = 0x00E5;
pub(crate) const RECORD_DIMENSIONS: u16 = 0x0200;
pub(crate) const RECORD_ROW: u16 = 0x0208;

// Cells.
pub(crate) const RECORD_MULRK: u16 = 0x00BD;
pub(crate) const RECORD_MULBLANK: u16 = 0x00BE;
pub(crate) const RECORD_RSTRING: u16 = 0x00D6;
pub(crate) const RECORD_LABELSST: u16 = 0x00FD;
pub(crate) const RECORD_BLANK: u16 = 0x0201;
pub(crate) const RECORD_NUMBER: u16 = 0x0203;
pub(crate) const RECORD_LABEL: u16 = 0x0204;
pub(crate) const RECORD_BOOLERR: u16 = 0x0205;
pub(crate) const RECORD_RK: u16 = 0x027E;

// Formulas.
pub(crate) const RECORD_FORMULA: u16 = 0x0006;
pub(crate) const RECORD_SHRFMLA_BIFF7: u16 = 0x00BC;
pub(crate) const RECORD_STRING: u16 = 0x0207;
pub(crate) const RECORD_ARRAY: u16 = 0x0221;
pub(crate) const RECORD_TABLE: u16 = 0x0236;
pub(crate) const RECORD_SHRFMLA: u16 = 0x04BC;

/// Record types decoded in the workbook globals substream.
#[derive(Debug, Clone)]
pub(crate) enum GlobalsRecord {
    BoundSheet(BoundSheet),
    CodePage(u16),
    DateMode(DateSystem),
    Sst(ParsedSst),
    ExternSheet(ParsedExternSheet),
    SupBook(SupBook),
    ExternName(String),
    Name(DefinedName),
    Format(u16, String),
    Xf(XfRecord),
}

/// Record types decoded in worksheet and macro sheet substreams.
#[derive(Debug, Clone)]
pub(crate) enum SheetRecord {
    Dimensions(Dimensions),
    Row(RowInfo),
    ColInfo(ColInfo),
    MergedCells(Vec<Range>),
    Guts(Guts),
    WsBool(u16),
    Cell(CellRecord),
    /// MULRK/MULBLANK, already expanded.
    Cells(Vec<CellRecord>),
    Formula {
        formula: FormulaRecord,
        /// Offset of the record after the FORMULA (and its CONTINUEs).
        next_offset: usize,
    },
    Group(FormulaGroup),
    StringResult(String),
}

#[derive(Debug, Clone)]
pub(crate) enum BiffRecord {
    Bof(Bof),
    /// Closes the substream opened by the carried BOF.
    Eof(Bof),
    Globals(GlobalsRecord),
    Sheet(SheetRecord),
}

/// Per-substream decoding context.
#[derive(Debug, Clone, Copy)]
pub(crate) struct DecodeContext {
    pub(crate) version: BiffVersion,
    pub(crate) kind: SubstreamKind,
    pub(crate) codepage: u16,
}

pub(crate) struct Dispatcher {
    stack: Vec<Bof>,
    codepage: u16,
}

impl Dispatcher {
    pub(crate) fn new(default_codepage: u16) -> Self {
        Self {
            stack: Vec::new(),
            codepage: default_codepage,
        }
    }

    /// The innermost open substream.
    pub(crate) fn current(&self) -> Option<Bof> {
        self.stack.last().copied()
    }

    /// Forget every open substream (used when abandoning a corrupt one).
    pub(crate) fn reset(&mut self) {
        self.stack.clear();
    }

    pub(crate) fn dispatch(
        &mut self,
        record: &LogicalBiffRecord<'_>,
    ) -> Result<Option<BiffRecord>, BiffError> {
        match record.record_id {
            RECORD_BOF_BIFF8 | RECORD_BOF_BIFF7 => {
                let bof = Bof::parse(record.record_id, &record.data)
                    .map_err(|message| record.corrupt(message))?;
                // Only charts nest; any other BOF implicitly closes what is open.
                if !matches!(bof.kind, SubstreamKind::Chart) {
                    self.stack.clear();
                }
                log::debug!(
                    "{} {:?} substream starts at offset {}",
                    bof.version,
                    bof.kind,
                    record.offset
                );
                self.stack.push(bof);
                return Ok(Some(BiffRecord::Bof(bof)));
            }
            RECORD_EOF => {
                return Ok(match self.stack.pop() {
                    Some(bof) => {
                        log::debug!("{:?} substream ends at offset {}", bof.kind, record.offset);
                        Some(BiffRecord::Eof(bof))
                    }
                    None => {
                        log::debug!("EOF outside any substream at offset {}", record.offset);
                        None
                    }
                });
            }
            _ => {}
        }

        let Some(bof) = self.current() else {
            log::debug!(
                "record 0x{:04X} outside any substream at offset {}",
                record.record_id,
                record.offset
            );
            return Ok(None);
        };
        let ctx = DecodeContext {
            version: bof.version,
            kind: bof.kind,
            codepage: self.codepage,
        };
        let decoded = decode_record(record, ctx)?;
        if let Some(BiffRecord::Globals(GlobalsRecord::CodePage(codepage))) = &decoded {
            self.codepage = *codepage;
        }
        Ok(decoded)
    }
}

/// Decode one record in `ctx`.
///
/// `Ok(None)` means the opcode is known but not meaningful in this substream. Opcodes this
/// decoder doesn't model at all are `UnknownOpcode`.
pub(crate) fn decode_record(
    record: &LogicalBiffRecord<'_>,
    ctx: DecodeContext,
) -> Result<Option<BiffRecord>, BiffError> {
    let id = record.record_id;
    let data: &[u8] = &record.data;
    let corrupt = |message: String| record.corrupt(message);

    let scope = match id {
        RECORD_BOUNDSHEET | RECORD_CODEPAGE | RECORD_DATEMODE | RECORD_SST | RECORD_EXTERNSHEET
        | RECORD_SUPBOOK | RECORD_EXTERNNAME | RECORD_NAME | RECORD_FORMAT | RECORD_XF => {
            Scope::Globals
        }
        RECORD_DIMENSIONS | RECORD_ROW | RECORD_COLINFO | RECORD_MERGEDCELLS | RECORD_GUTS
        | RECORD_WSBOOL | RECORD_NUMBER | RECORD_RK | RECORD_LABEL | RECORD_LABELSST
        | RECORD_RSTRING | RECORD_BOOLERR | RECORD_BLANK | RECORD_MULRK | RECORD_MULBLANK
        | RECORD_FORMULA | RECORD_STRING | RECORD_ARRAY | RECORD_TABLE => Scope::Sheet,
        RECORD_SHRFMLA | RECORD_SHRFMLA_BIFF7 => Scope::Sheet,
        _ => {
            return Err(BiffError::UnknownOpcode {
                offset: record.offset,
                record_id: id,
            })
        }
    };

    match (scope, ctx.kind) {
        (Scope::Globals, SubstreamKind::WorkbookGlobals) => {}
        (Scope::Sheet, kind) if kind.has_cells() => {}
        (_, SubstreamKind::Chart | SubstreamKind::Other(_)) => return Ok(None),
        (_, kind) => {
            log::debug!(
                "record 0x{id:04X} at offset {} is not meaningful in a {kind:?} substream",
                record.offset
            );
            return Ok(None);
        }
    }

    let version = ctx.version;
    let codepage = ctx.codepage;
    let decoded: BiffRecord = match id {
        RECORD_BOUNDSHEET => GlobalsRecord::BoundSheet(
            globals::parse_boundsheet(data, version, codepage).map_err(corrupt)?,
        )
        .into(),
        RECORD_CODEPAGE => GlobalsRecord::CodePage(
            super::read_u16(data, 0).ok_or_else(|| corrupt("CODEPAGE record too short".into()))?,
        )
        .into(),
        RECORD_DATEMODE => GlobalsRecord::DateMode(DateSystem::from_datemode(
            super::read_u16(data, 0).ok_or_else(|| corrupt("DATEMODE record too short".into()))?,
        ))
        .into(),
        RECORD_SST => GlobalsRecord::Sst(sst::parse_sst(record)).into(),
        RECORD_EXTERNSHEET => match version {
            BiffVersion::Biff8 => GlobalsRecord::ExternSheet(
                externsheet::parse_externsheet(data).map_err(corrupt)?,
            )
            .into(),
            // BIFF7 EXTERNSHEET is an encoded document name list; BIFF7 formulas aren't
            // rendered, so it has no consumer.
            BiffVersion::Biff7 => return Ok(None),
        },
        RECORD_SUPBOOK => GlobalsRecord::SupBook(supbook::parse_supbook(record).map_err(corrupt)?).into(),
        RECORD_EXTERNNAME => GlobalsRecord::ExternName(
            supbook::parse_externname(data, version, codepage).map_err(corrupt)?,
        )
        .into(),
        RECORD_NAME => GlobalsRecord::Name(names::parse_name(record, version, codepage).map_err(corrupt)?).into(),
        RECORD_FORMAT => {
            let (index, code) = formats::parse_format(data, version, codepage).map_err(corrupt)?;
            GlobalsRecord::Format(index, code).into()
        }
        RECORD_XF => GlobalsRecord::Xf(formats::parse_xf(data).map_err(corrupt)?).into(),

        RECORD_DIMENSIONS => SheetRecord::Dimensions(
            sheet_records::parse_dimensions(data, version).map_err(corrupt)?,
        )
        .into(),
        RECORD_ROW => SheetRecord::Row(sheet_records::parse_row(data).map_err(corrupt)?).into(),
        RECORD_COLINFO => {
            SheetRecord::ColInfo(sheet_records::parse_colinfo(data).map_err(corrupt)?).into()
        }
        RECORD_MERGEDCELLS => {
            SheetRecord::MergedCells(sheet_records::parse_merged_cells(data).map_err(corrupt)?)
                .into()
        }
        RECORD_GUTS => SheetRecord::Guts(sheet_records::parse_guts(data).map_err(corrupt)?).into(),
        RECORD_WSBOOL => {
            SheetRecord::WsBool(sheet_records::parse_wsbool(data).map_err(corrupt)?).into()
        }
        RECORD_NUMBER => SheetRecord::Cell(cells::parse_number(data).map_err(corrupt)?).into(),
        RECORD_RK => SheetRecord::Cell(cells::parse_rk(data).map_err(corrupt)?).into(),
        RECORD_LABEL | RECORD_RSTRING => {
            SheetRecord::Cell(cells::parse_label(record, version, codepage).map_err(corrupt)?)
                .into()
        }
        RECORD_LABELSST => {
            SheetRecord::Cell(cells::parse_labelsst(data).map_err(corrupt)?).into()
        }
        RECORD_BOOLERR => SheetRecord::Cell(cells::parse_boolerr(data).map_err(corrupt)?).into(),
        RECORD_BLANK => SheetRecord::Cell(cells::parse_blank(data).map_err(corrupt)?).into(),
        RECORD_MULRK => SheetRecord::Cells(cells::expand_mulrk(data).map_err(corrupt)?).into(),
        RECORD_MULBLANK => {
            SheetRecord::Cells(cells::expand_mulblank(data).map_err(corrupt)?).into()
        }
        RECORD_FORMULA => SheetRecord::Formula {
            formula: formulas::parse_formula(data).map_err(corrupt)?,
            next_offset: record.next_offset,
        }
        .into(),
        RECORD_STRING => SheetRecord::StringResult(
            formulas::parse_string_result(record, version, codepage).map_err(corrupt)?,
        )
        .into(),
        RECORD_SHRFMLA | RECORD_SHRFMLA_BIFF7 => SheetRecord::Group(
            formulas::parse_shared_formula(data, record.offset).map_err(corrupt)?,
        )
        .into(),
        RECORD_ARRAY => SheetRecord::Group(
            formulas::parse_array_formula(data, record.offset).map_err(corrupt)?,
        )
        .into(),
        RECORD_TABLE => {
            SheetRecord::Group(formulas::parse_table(data, record.offset).map_err(corrupt)?).into()
        }
        _ => {
            return Err(BiffError::UnknownOpcode {
                offset: record.offset,
                record_id: id,
            })
        }
    };
    Ok(Some(decoded))
}

#[derive(Debug, Clone, Copy)]
enum Scope {
    Globals,
    Sheet,
}

impl From<GlobalsRecord> for BiffRecord {
    fn from(record: GlobalsRecord) -> Self {
        BiffRecord::Globals(record)
    }
}

impl From<SheetRecord> for BiffRecord {
    fn from(record: SheetRecord) -> Self {
        BiffRecord::Sheet(record)
    }
}

/// Whether `record_id` defines a SHRFMLA, ARRAY or TABLE group.
pub(crate) fn is_group_record(record_id: u16) -> bool {
    matches!(
        record_id,
        RECORD_SHRFMLA | RECORD_SHRFMLA_BIFF7 | RECORD_ARRAY | RECORD_TABLE
    )
}
