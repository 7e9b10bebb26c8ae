use biff_model::CellRef;
use biff_rgce::{
    decode_rgce, decode_rgce_with_base, rebase_shared_rgce, DecodeBase, EmptyContext,
};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

fn ptg_refn(row_off: i16, col_off: i8) -> Vec<u8> {
    let col_field = u16::from(col_off as u8) | 0xC000;
    let mut out = vec![0x2C];
    out.extend_from_slice(&(row_off as u16).to_le_bytes());
    out.extend_from_slice(&col_field.to_le_bytes());
    out
}

fn ptg_ref_relative(row: u16, col: u16) -> Vec<u8> {
    let mut out = vec![0x24];
    out.extend_from_slice(&row.to_le_bytes());
    out.extend_from_slice(&(col | 0xC000).to_le_bytes());
    out
}

fn shared_text(rgce: &[u8], anchor: CellRef, cell: CellRef) -> String {
    decode_rgce_with_base(rgce, &[], DecodeBase::shared(anchor, cell), &EmptyContext)
        .expect("decode")
}

#[test]
fn one_cell_to_the_left_follows_each_participant() {
    let anchor = CellRef::new(0, 0);
    let rgce = ptg_refn(0, -1);

    assert_eq!(shared_text(&rgce, anchor, CellRef::new(0, 5)), "E1");
    assert_eq!(shared_text(&rgce, anchor, CellRef::new(3, 5)), "E4");
    // At the anchor itself the reference falls off the sheet.
    assert_eq!(shared_text(&rgce, anchor, anchor), "#REF!");
}

#[test]
fn relative_plain_refs_move_by_the_anchor_distance() {
    // Anchor B2 holds =A1 (relative); participant D5 sees =C4.
    let anchor = CellRef::new(1, 1);
    let rgce = ptg_ref_relative(0, 0);
    assert_eq!(shared_text(&rgce, anchor, anchor), "A1");
    assert_eq!(shared_text(&rgce, anchor, CellRef::new(4, 3)), "C4");
}

#[test]
fn absolute_components_do_not_move() {
    // $A1 + A$1 written at anchor B2.
    let mut rgce = vec![0x24, 0, 0, 0, 0x40];
    rgce.extend_from_slice(&[0x24, 0, 0, 0, 0x80]);
    rgce.push(0x03);
    let anchor = CellRef::new(1, 1);
    assert_eq!(shared_text(&rgce, anchor, CellRef::new(3, 4)), "$A3+D$1");
}

#[test]
fn rebased_program_decodes_like_the_shared_program() {
    let anchor = CellRef::new(2, 2);
    let cell = CellRef::new(7, 4);
    let mut rgce = ptg_refn(-1, 1);
    rgce.extend(ptg_ref_relative(0, 0));
    rgce.push(0x05);

    let rebased = rebase_shared_rgce(&rgce, anchor, cell).expect("rebase");
    assert_eq!(
        decode_rgce(&rebased, &[], cell, &EmptyContext).expect("decode"),
        shared_text(&rgce, anchor, cell)
    );
    assert_eq!(shared_text(&rgce, anchor, cell), "F7*C6");
}

proptest! {
    #[test]
    fn rebasing_matches_shared_decoding(
        row_off in -20i16..20,
        col_off in -20i8..20,
        ref_row in 0u16..50,
        ref_col in 0u16..50,
        cell_row in 0u32..100,
        cell_col in 0u32..100,
    ) {
        let anchor = CellRef::new(10, 10);
        let cell = CellRef::new(cell_row, cell_col);
        let mut rgce = ptg_refn(row_off, col_off);
        rgce.extend(ptg_ref_relative(ref_row, ref_col));
        rgce.push(0x03);

        let rebased = rebase_shared_rgce(&rgce, anchor, cell).unwrap();
        let direct = decode_rgce(&rebased, &[], cell, &EmptyContext).unwrap();
        prop_assert_eq!(direct, shared_text(&rgce, anchor, cell));
    }
}
