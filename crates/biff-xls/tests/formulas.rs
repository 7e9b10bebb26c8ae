use biff_xls::{
    decode_workbook, BiffError, BiffVersion, CellRef, CellType, CellValue, FormulaKind, Workbook,
};
use pretty_assertions::assert_eq;

mod common;

use common::biff_fixture_builder::*;

fn decode_sheet(globals: Vec<Vec<u8>>, body: Vec<Vec<u8>>) -> Workbook {
    let bytes = globals
        .into_iter()
        .fold(WorkbookBuilder::biff8(), WorkbookBuilder::globals_record)
        .sheet(SheetFixture::new("Sheet1", concat(body)))
        .build();
    decode_workbook(&bytes).expect("decode")
}

fn text(workbook: &Workbook, row: u32, col: u32) -> Result<String, BiffError> {
    workbook
        .formula_text(0, CellRef::new(row, col))
        .expect("formula cell")
}

/// `F1:F4` sharing `=E<row>` (a `PtgRefN` one column to the left). The anchor precedes its
/// SHRFMLA record, so it resolves by scanning forward; the others link while decoding.
fn shared_column() -> Vec<Vec<u8>> {
    vec![
        shared_participant(0, 5, (0, 5), 10.0),
        shrfmla((0, 3, 5, 5), &ptg_ref_n(0, -1)),
        shared_participant(1, 5, (0, 5), 20.0),
        shared_participant(2, 5, (0, 5), 30.0),
        shared_participant(3, 5, (0, 5), 40.0),
    ]
}

#[test]
fn renders_own_formulas() {
    let rgce = concat([ptg_ref(0, 1), ptg_int(1), vec![PTG_ADD]]);
    let workbook = decode_sheet(
        Vec::new(),
        vec![number(0, 1, 0, 2.0), formula(0, 0, 0, FormulaValue::Number(3.0), &rgce)],
    );

    assert_eq!(text(&workbook, 0, 0).unwrap(), "B1+1");
    assert_eq!(
        workbook.sheet(0).unwrap().cell(0, 0).unwrap().cell_type,
        CellType::Formula(FormulaKind::Number)
    );
    // Not a formula cell, or no such cell.
    assert!(workbook.formula_text(0, CellRef::new(0, 1)).is_none());
    assert!(workbook.formula_text(0, CellRef::new(9, 9)).is_none());
    assert!(workbook.formula_text(3, CellRef::new(0, 0)).is_none());
}

#[test]
fn rebases_shared_formulas_per_participant() {
    let workbook = decode_sheet(Vec::new(), shared_column());
    let sheet = workbook.sheet(0).unwrap();

    for row in 0..4 {
        let cell = sheet.cell(row, 5).unwrap();
        assert_eq!(cell.cell_type, CellType::SharedFormula(FormulaKind::Number));
        assert_eq!(cell.value, CellValue::Number(f64::from(row + 1) * 10.0));
    }
    assert_eq!(text(&workbook, 0, 5).unwrap(), "E1");
    assert_eq!(text(&workbook, 1, 5).unwrap(), "E2");
    assert_eq!(text(&workbook, 3, 5).unwrap(), "E4");
}

#[test]
fn formula_text_is_idempotent() {
    let workbook = decode_sheet(Vec::new(), shared_column());

    let first = text(&workbook, 0, 5);
    let second = text(&workbook, 0, 5);
    assert_eq!(first, second);
    assert_eq!(first.unwrap(), "E1");
}

#[test]
fn formula_text_is_safe_to_request_from_many_threads() {
    let workbook = decode_sheet(Vec::new(), shared_column());

    let results: Vec<String> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4u32)
            .map(|row| {
                let workbook = &workbook;
                scope.spawn(move || text(workbook, row, 5).unwrap())
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    assert_eq!(results, vec!["E1", "E2", "E3", "E4"]);
}

#[test]
fn forward_scan_skips_unrelated_records() {
    let workbook = decode_sheet(
        Vec::new(),
        vec![
            shared_participant(2, 2, (2, 2), 1.0),
            number(2, 3, 0, 5.0),
            label(Version::Biff8, 2, 4, "noise"),
            // A group anchored elsewhere, then the shared group itself.
            array((5, 5, 5, 5), &ptg_int(9)),
            shrfmla((2, 4, 2, 2), &ptg_ref_n(-1, 1)),
        ],
    );

    assert_eq!(text(&workbook, 2, 2).unwrap(), "D2");
}

#[test]
fn unresolvable_group_is_stream_corrupt_and_keeps_the_value() {
    let workbook = decode_sheet(
        Vec::new(),
        vec![shared_participant(0, 0, (9, 9), 7.0), number(0, 1, 0, 1.0)],
    );

    let err = text(&workbook, 0, 0).unwrap_err();
    assert!(matches!(err, BiffError::StreamCorrupt { .. }), "{err:?}");
    let cell = workbook.sheet(0).unwrap().cell(0, 0).unwrap();
    assert_eq!(cell.value, CellValue::Number(7.0));
    // The failure is cached like a success.
    assert_eq!(text(&workbook, 0, 0).unwrap_err(), err);
}

#[test]
fn array_formulas_render_the_anchor_text_everywhere() {
    let workbook = decode_sheet(
        Vec::new(),
        vec![
            formula(0, 0, 0, FormulaValue::Number(1.0), &ptg_exp(0, 0)),
            array((0, 1, 0, 1), &ptg_ref(3, 3)),
            formula(0, 1, 0, FormulaValue::Number(1.0), &ptg_exp(0, 0)),
            formula(1, 0, 0, FormulaValue::Number(1.0), &ptg_exp(0, 0)),
            formula(1, 1, 0, FormulaValue::Number(1.0), &ptg_exp(0, 0)),
        ],
    );

    for (row, col) in [(0, 0), (0, 1), (1, 0), (1, 1)] {
        assert_eq!(text(&workbook, row, col).unwrap(), "D4", "({row}, {col})");
    }
}

#[test]
fn exposes_rebased_token_programs() {
    let workbook = decode_sheet(Vec::new(), shared_column());

    let program = workbook
        .formula_program(0, CellRef::new(3, 5))
        .unwrap()
        .unwrap();
    // `PtgRef` E4, both parts relative.
    assert_eq!(program.rgce, vec![0x24, 0x03, 0x00, 0x04, 0xC0]);
    assert!(program.rgcb.is_empty());
}

#[test]
fn resolves_sheet_prefixes_and_defined_names() {
    let bytes = WorkbookBuilder::biff8()
        .globals_record(supbook_internal(2))
        .globals_record(externsheet(&[(0, 0, 0), (0, 1, 1)]))
        .globals_record(defined_name("Total", &ptg_ref3d(1, 0, 0)))
        .sheet(SheetFixture::new(
            "Inputs",
            concat([number(0, 0, 0, 5.0)]),
        ))
        .sheet(SheetFixture::new(
            "Q1 Report",
            concat([
                formula(
                    0,
                    0,
                    0,
                    FormulaValue::Number(6.0),
                    &concat([ptg_ref3d(0, 0, 0), ptg_int(1), vec![PTG_ADD]]),
                ),
                formula(1, 0, 0, FormulaValue::Number(6.0), &ptg_name(1)),
                formula(2, 0, 0, FormulaValue::Number(6.0), &ptg_name(7)),
            ]),
        ))
        .build();
    let workbook = decode_workbook(&bytes).expect("decode");

    let render = |row| workbook.formula_text(1, CellRef::new(row, 0)).unwrap().unwrap();
    assert_eq!(render(0), "Inputs!$A$1+1");
    assert_eq!(render(1), "Total");
    assert_eq!(render(2), "Name_7");

    assert_eq!(workbook.defined_names()[0].name, "Total");
    assert_eq!(
        workbook.defined_name_formula(0).unwrap().unwrap(),
        "'Q1 Report'!$A$1"
    );
    assert!(workbook.defined_name_formula(1).is_none());
}

#[test]
fn biff7_formulas_need_biff8_but_keep_their_values() {
    let bytes = WorkbookBuilder::new(Version::Biff7)
        .sheet(SheetFixture::new(
            "Old",
            concat([
                label(Version::Biff7, 0, 0, "legacy"),
                formula(0, 1, 0, FormulaValue::Number(2.5), &ptg_int(1)),
            ]),
        ))
        .build();
    let workbook = decode_workbook(&bytes).expect("decode");
    assert_eq!(workbook.version(), BiffVersion::Biff7);

    let sheet = workbook.sheet(0).unwrap();
    assert_eq!(sheet.name(), "Old");
    assert_eq!(sheet.cell(0, 0).unwrap().value.as_str(), Some("legacy"));
    assert_eq!(sheet.cell(0, 1).unwrap().value, CellValue::Number(2.5));

    let err = workbook
        .formula_text(0, CellRef::new(0, 1))
        .unwrap()
        .unwrap_err();
    assert_eq!(
        err,
        BiffError::Biff8Required {
            operation: "formula text",
            found: BiffVersion::Biff7,
        }
    );
    assert!(matches!(
        workbook.formula_program(0, CellRef::new(0, 1)),
        Some(Err(BiffError::Biff8Required { .. }))
    ));
}
