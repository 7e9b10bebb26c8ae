//! Single forward pass over a workbook stream.
//!
//! The workbook globals substream is decoded completely first; its tables are then frozen and
//! shared read-only by every worksheet substream that follows.

use std::collections::HashSet;
use std::sync::Arc;

use crate::biff::dispatch::{BiffRecord, Dispatcher, SheetRecord};
use crate::biff::globals::{BoundSheet, Globals, GlobalsBuilder, SheetVisibility};
use crate::biff::records::{find_next_bof, is_bof_record, RecordStream};
use crate::biff::sheet::{SheetBuilder, SheetContext, SheetMeta};
use crate::biff::{push_warning_bounded, Bof, SubstreamKind};
use crate::error::BiffError;
use crate::sheet::Sheet;
use crate::workbook::Workbook;
use crate::DecodeOptions;

pub(crate) fn decode(stream: Arc<[u8]>, options: &DecodeOptions) -> Result<Workbook, BiffError> {
    let (globals, sheets, warnings) = {
        let bytes: &[u8] = &stream;
        let mut records = RecordStream::new(bytes);
        let mut dispatcher = Dispatcher::new(options.default_codepage);
        let (globals, carried) = read_globals(bytes, &mut records, &mut dispatcher, options)?;
        let mut assembler = SheetAssembler::new(&globals, options);
        if let Some((offset, bof)) = carried {
            assembler.open(offset, bof);
        }
        read_sheets(bytes, records, dispatcher, &mut assembler, options)?;
        let (sheets, warnings) = assembler.finish();
        (globals, sheets, warnings)
    };
    Ok(Workbook::new(stream, globals, sheets, warnings))
}

/// Cursor positioned at the first BOF at or after `from`, or at the end of the stream.
fn skip_to_next_bof(stream: &[u8], from: usize) -> Result<RecordStream<'_>, BiffError> {
    let next = find_next_bof(stream, from).unwrap_or(stream.len());
    log::debug!("resuming at offset {next}");
    RecordStream::at(stream, next)
}

/// Decode the workbook globals substream.
///
/// Also returns the BOF of a sheet substream that started before the globals saw their EOF.
fn read_globals<'a>(
    stream: &'a [u8],
    records: &mut RecordStream<'a>,
    dispatcher: &mut Dispatcher,
    options: &DecodeOptions,
) -> Result<(Globals, Option<(usize, Bof)>), BiffError> {
    let first = match records.next() {
        Some(record) => record?,
        None => {
            return Err(BiffError::FormatCorrupt {
                offset: 0,
                record_id: None,
                message: "empty workbook stream".to_string(),
            })
        }
    };
    if !is_bof_record(first.record_id) {
        return Err(first.corrupt("workbook stream does not start with a BOF record"));
    }
    let bof = match dispatcher.dispatch(&first)? {
        Some(BiffRecord::Bof(bof)) if bof.kind == SubstreamKind::WorkbookGlobals => bof,
        Some(BiffRecord::Bof(bof)) => {
            return Err(first.corrupt(format!(
                "first substream is {:?}; expected workbook globals",
                bof.kind
            )))
        }
        _ => return Err(first.corrupt("workbook stream does not start with a BOF record")),
    };

    let mut builder = GlobalsBuilder::new(bof.version, options.default_codepage, options.max_warnings);
    let mut carried = None;
    loop {
        let record = match records.next() {
            Some(Ok(record)) => record,
            Some(Err(err)) => {
                if !options.recover_after_corruption {
                    return Err(err);
                }
                builder.warn(format!("{err}; the rest of the stream is unreadable"));
                break;
            }
            None => {
                builder.warn("workbook globals end without an EOF record");
                break;
            }
        };
        match dispatcher.dispatch(&record) {
            Ok(Some(BiffRecord::Globals(globals_record))) => builder.apply(globals_record),
            Ok(Some(BiffRecord::Eof(_))) => break,
            Ok(Some(BiffRecord::Bof(bof))) => {
                builder.warn(format!(
                    "workbook globals end without an EOF record (BOF at offset {})",
                    record.offset
                ));
                carried = Some((record.offset, bof));
                break;
            }
            Ok(Some(BiffRecord::Sheet(_)) | None) => {}
            Err(BiffError::UnknownOpcode { offset, record_id }) => {
                log::trace!("skipping record 0x{record_id:04X} at offset {offset}");
            }
            Err(err) => {
                if !options.recover_after_corruption {
                    return Err(err);
                }
                builder.warn(format!("{err}; skipping the rest of the workbook globals"));
                dispatcher.reset();
                *records = skip_to_next_bof(stream, record.next_offset)?;
                break;
            }
        }
    }
    Ok((builder.finish(), carried))
}

fn read_sheets<'a, 'g>(
    stream: &'a [u8],
    mut records: RecordStream<'a>,
    mut dispatcher: Dispatcher,
    assembler: &mut SheetAssembler<'g>,
    options: &DecodeOptions,
) -> Result<(), BiffError> {
    while let Some(next) = records.next() {
        let record = match next {
            Ok(record) => record,
            Err(err) => {
                if !options.recover_after_corruption {
                    return Err(err);
                }
                // Framing is lost, so there is no next BOF to find.
                assembler.abandon(&err);
                break;
            }
        };
        match dispatcher.dispatch(&record) {
            Ok(Some(BiffRecord::Bof(bof))) => assembler.open(record.offset, bof),
            Ok(Some(BiffRecord::Eof(bof))) => {
                if bof.kind.has_cells() {
                    assembler.close();
                }
            }
            // Forward scans for a formula's group resume where the primary cursor stands now.
            Ok(Some(BiffRecord::Sheet(SheetRecord::Formula { formula, .. }))) => {
                assembler.apply(SheetRecord::Formula {
                    formula,
                    next_offset: records.position(),
                })
            }
            Ok(Some(BiffRecord::Sheet(sheet_record))) => assembler.apply(sheet_record),
            Ok(Some(BiffRecord::Globals(_)) | None) => {}
            Err(BiffError::UnknownOpcode { offset, record_id }) => {
                log::trace!("skipping record 0x{record_id:04X} at offset {offset}");
            }
            Err(err) => {
                if !options.recover_after_corruption {
                    return Err(err);
                }
                assembler.abandon(&err);
                dispatcher.reset();
                records = skip_to_next_bof(stream, record.next_offset)?;
            }
        }
    }
    Ok(())
}

/// Tracks which sheet substream is open and matches substreams to their BOUNDSHEET records.
struct SheetAssembler<'g> {
    globals: &'g Globals,
    ctx: SheetContext<'g>,
    current: Option<SheetBuilder<'g>>,
    sheets: Vec<Sheet>,
    warnings: Vec<String>,
    max_warnings: usize,
    /// Top-level non-globals substreams seen so far, charts included.
    substreams: usize,
    claimed: HashSet<usize>,
}

impl<'g> SheetAssembler<'g> {
    fn new(globals: &'g Globals, options: &DecodeOptions) -> Self {
        Self {
            globals,
            ctx: SheetContext {
                shared_strings: &globals.shared_strings,
                formats: &globals.xfs,
                date_system: globals.date_system,
                max_warnings: options.max_warnings,
            },
            current: None,
            sheets: Vec::new(),
            warnings: globals.warnings.clone(),
            max_warnings: options.max_warnings,
            substreams: 0,
            claimed: HashSet::new(),
        }
    }

    fn warn(&mut self, warning: impl Into<String>) {
        push_warning_bounded(&mut self.warnings, self.max_warnings, warning);
    }

    fn open(&mut self, offset: usize, bof: Bof) {
        match bof.kind {
            SubstreamKind::Chart if self.current.is_some() => return,
            SubstreamKind::WorkbookGlobals => {
                self.warn(format!(
                    "ignoring additional workbook globals substream at offset {offset}"
                ));
                return;
            }
            _ => {}
        }
        if let Some(mut open) = self.current.take() {
            open.warn(format!(
                "sheet `{}` ends without an EOF record (next BOF at offset {offset})",
                open.name()
            ));
            self.sheets.push(open.finish(true));
        }

        let position = self.substreams;
        self.substreams += 1;
        let bound = self.bound_sheet(offset, position);
        if !bof.kind.has_cells() {
            log::debug!(
                "skipping {:?} substream `{}` at offset {offset}",
                bof.kind,
                bound.map_or("", |sheet| sheet.name.as_str())
            );
            return;
        }

        let name = bound.map_or_else(
            || format!("Sheet{}", self.sheets.len() + 1),
            |sheet| sheet.name.clone(),
        );
        let visibility = bound.map_or(SheetVisibility::Visible, |sheet| sheet.visibility);
        self.current = Some(SheetBuilder::new(
            SheetMeta {
                name,
                version: bof.version,
                kind: bof.kind,
                visibility,
                offset,
            },
            self.ctx,
        ));
    }

    /// Match by BOF offset (`lbPlyPos`), falling back to stream order.
    fn bound_sheet(&mut self, offset: usize, position: usize) -> Option<&'g BoundSheet> {
        let globals: &'g Globals = self.globals;
        let sheets = &globals.bound_sheets;
        let index = sheets
            .iter()
            .position(|sheet| sheet.offset as usize == offset)
            .or_else(|| (position < sheets.len() && !self.claimed.contains(&position)).then_some(position))?;
        self.claimed.insert(index);
        sheets.get(index)
    }

    fn apply(&mut self, record: SheetRecord) {
        if let Some(builder) = self.current.as_mut() {
            builder.apply(record);
        }
    }

    fn close(&mut self) {
        if let Some(builder) = self.current.take() {
            self.sheets.push(builder.finish(true));
        }
    }

    /// Keep what the open sheet decoded so far and record why it stopped.
    fn abandon(&mut self, err: &BiffError) {
        log::debug!("abandoning substream: {err}");
        match self.current.take() {
            Some(mut builder) => {
                builder.warn(format!("{err}; skipping the rest of the sheet"));
                self.sheets.push(builder.finish(false));
            }
            None => self.warn(format!("{err}; skipping to the next substream")),
        }
    }

    fn finish(mut self) -> (Vec<Sheet>, Vec<String>) {
        if let Some(mut builder) = self.current.take() {
            builder.warn(format!("sheet `{}` ends without an EOF record", builder.name()));
            self.sheets.push(builder.finish(true));
        }
        (self.sheets, self.warnings)
    }
}
