//! Resolving formula cells that point at a SHRFMLA, ARRAY or TABLE group.
//!
//! A participant's own program is just `PtgExp`/`PtgTbl` naming the group's anchor cell. When
//! the group record was decoded before the cell, the sheet links the two directly. Otherwise
//! the cell remembers the offset of the record after it and [`forward_scan`] walks forward
//! from there with an independent cursor over the same stream until it finds the group.

use biff_model::{col_to_name, CellRef};
use biff_rgce::{decode_rgce_with_base, rebase_shared_rgce, DecodeBase, FormulaContext};

use super::dispatch::{is_group_record, RECORD_ARRAY, RECORD_TABLE};
use super::formulas::{self, FormulaGroup, GroupDefinition, GroupKind};
use super::records::{is_bof_record, RecordStream, RECORD_EOF};
use crate::cell::group_matches;
use crate::error::BiffError;

/// Find the group anchored at `anchor` that covers `cell`, scanning forward from `scan_from`.
///
/// The scan stops at the end of the substream; not finding the group there is
/// `StreamCorrupt`, as is any framing or payload error met on the way.
pub(crate) fn forward_scan(
    stream: &[u8],
    scan_from: usize,
    anchor: CellRef,
    table: bool,
    cell: CellRef,
) -> Result<FormulaGroup, BiffError> {
    let stream_corrupt = |message: String| BiffError::StreamCorrupt {
        offset: scan_from,
        message,
    };

    let records = RecordStream::at(stream, scan_from).map_err(|err| stream_corrupt(err.to_string()))?;
    for record in records {
        let record = record.map_err(|err| stream_corrupt(err.to_string()))?;
        if record.record_id == RECORD_EOF || is_bof_record(record.record_id) {
            break;
        }
        if !is_group_record(record.record_id) {
            continue;
        }
        let group = match record.record_id {
            RECORD_ARRAY => formulas::parse_array_formula(&record.data, record.offset),
            RECORD_TABLE => formulas::parse_table(&record.data, record.offset),
            _ => formulas::parse_shared_formula(&record.data, record.offset),
        }
        .map_err(|message| {
            stream_corrupt(format!(
                "group record 0x{:04X} at offset {}: {message}",
                record.record_id, record.offset
            ))
        })?;
        if group_matches(&group, anchor, table, cell) {
            log::debug!(
                "resolved group anchored at {} at offset {} for {}",
                anchor.to_a1(),
                group.offset,
                cell.to_a1()
            );
            return Ok(group);
        }
    }
    Err(stream_corrupt(format!(
        "no formula group anchored at {} covers {} before the end of the substream",
        anchor.to_a1(),
        cell.to_a1()
    )))
}

/// Formula text of `cell` as a participant of `group`.
pub(crate) fn group_formula_text(
    group: &FormulaGroup,
    cell: CellRef,
    ctx: &dyn FormulaContext,
) -> Result<String, BiffError> {
    match (&group.definition, group.kind) {
        (GroupDefinition::Tokens { rgce, rgcb }, GroupKind::Shared) => Ok(decode_rgce_with_base(
            rgce,
            rgcb,
            DecodeBase::shared(group.anchor(), cell),
            ctx,
        )?),
        // Every cell of an array formula shows the same text, written for the anchor.
        (GroupDefinition::Tokens { rgce, rgcb }, _) => Ok(decode_rgce_with_base(
            rgce,
            rgcb,
            DecodeBase::at(group.anchor()),
            ctx,
        )?),
        (
            GroupDefinition::Table {
                row_input,
                col_input,
            },
            _,
        ) => Ok(table_text(*row_input, *col_input)),
    }
}

/// Standalone token program for `cell`, or `None` for data tables (which have none).
pub(crate) fn group_program(
    group: &FormulaGroup,
    cell: CellRef,
) -> Result<Option<(Vec<u8>, Vec<u8>)>, BiffError> {
    match (&group.definition, group.kind) {
        (GroupDefinition::Tokens { rgce, rgcb }, GroupKind::Shared) => {
            Ok(Some((rebase_shared_rgce(rgce, group.anchor(), cell)?, rgcb.clone())))
        }
        (GroupDefinition::Tokens { rgce, rgcb }, _) => Ok(Some((rgce.clone(), rgcb.clone()))),
        (GroupDefinition::Table { .. }, _) => Ok(None),
    }
}

/// `TABLE(row_input,col_input)`, leaving out the missing input.
fn table_text(row_input: Option<CellRef>, col_input: Option<CellRef>) -> String {
    let a1 = |cell: Option<CellRef>| {
        cell.map(|cell| format!("{}{}", col_to_name(cell.col), cell.row + 1))
            .unwrap_or_default()
    };
    format!("TABLE({},{})", a1(row_input), a1(col_input))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::biff::dispatch::{RECORD_FORMULA, RECORD_SHRFMLA};
    use crate::biff::records::RECORD_BOF_BIFF8;
    use crate::biff::test_util::record;
    use biff_model::Range;
    use biff_rgce::EmptyContext;
    use pretty_assertions::assert_eq;

    /// SHRFMLA over `range` with a single `PtgRefN` (row 0, col -1, both relative).
    fn shrfmla(range: (u16, u16, u8, u8)) -> Vec<u8> {
        let mut payload = Vec::new();
        payload.extend_from_slice(&range.0.to_le_bytes());
        payload.extend_from_slice(&range.1.to_le_bytes());
        payload.extend_from_slice(&[range.2, range.3, 0, 1]);
        let rgce = [0x2C, 0x00, 0x00, 0xFF, 0xC0];
        payload.extend_from_slice(&(rgce.len() as u16).to_le_bytes());
        payload.extend_from_slice(&rgce);
        record(RECORD_SHRFMLA, &payload)
    }

    #[test]
    fn scans_past_unrelated_records_and_groups() {
        let mut stream = record(RECORD_FORMULA, &[0u8; 20]);
        stream.extend(record(0x0099, &[1, 2, 3]));
        // Same anchor but doesn't cover the cell.
        stream.extend(shrfmla((0, 0, 5, 5)));
        let wanted_offset = stream.len();
        stream.extend(shrfmla((0, 3, 5, 5)));

        let group = forward_scan(&stream, 24, CellRef::new(0, 5), false, CellRef::new(3, 5)).unwrap();
        assert_eq!(group.offset, wanted_offset);
        assert_eq!(group.range, Range::from_a1("F1:F4").unwrap());
        assert_eq!(
            group_formula_text(&group, CellRef::new(3, 5), &EmptyContext).unwrap(),
            "E4"
        );
    }

    #[test]
    fn scan_stops_at_the_end_of_the_substream() {
        let mut stream = record(RECORD_EOF, &[]);
        stream.extend(record(RECORD_BOF_BIFF8, &[0x00, 0x06, 0x10, 0x00]));
        stream.extend(shrfmla((0, 3, 0, 0)));
        let err = forward_scan(&stream, 0, CellRef::new(0, 0), false, CellRef::new(1, 0)).unwrap_err();
        assert!(matches!(err, BiffError::StreamCorrupt { offset: 0, .. }));
    }

    #[test]
    fn scan_from_an_invalid_offset_is_stream_corrupt() {
        let stream = shrfmla((0, 3, 0, 0));
        let err = forward_scan(&stream, 4096, CellRef::new(0, 0), false, CellRef::new(1, 0)).unwrap_err();
        assert!(matches!(err, BiffError::StreamCorrupt { offset: 4096, .. }));
    }

    #[test]
    fn renders_table_participants() {
        assert_eq!(table_text(Some(CellRef::new(0, 1)), None), "TABLE(B1,)");
        assert_eq!(table_text(None, Some(CellRef::new(1, 0))), "TABLE(,A2)");
        assert_eq!(
            table_text(Some(CellRef::new(0, 0)), Some(CellRef::new(4, 2))),
            "TABLE(A1,C5)"
        );
    }

    #[test]
    fn shared_programs_are_rebased_per_participant() {
        let group = FormulaGroup {
            kind: GroupKind::Shared,
            range: Range::from_a1("F1:F4").unwrap(),
            offset: 0,
            definition: GroupDefinition::Tokens {
                rgce: vec![0x2C, 0x00, 0x00, 0xFF, 0xC0],
                rgcb: Vec::new(),
            },
        };
        let (rgce, _) = group_program(&group, CellRef::new(3, 5)).unwrap().unwrap();
        assert_eq!(rgce, vec![0x24, 0x03, 0x00, 0x04, 0xC0]);
    }
}
