//! Byte-level rebasing of shared-formula token programs.
//!
//! A shared formula's program is written once, relative to the group's anchor cell. This module
//! materializes a standalone program for one participant cell:
//! - `PtgRef`/`PtgArea` (and their 3-D forms) move their relative components by the
//!   participant's distance from the anchor
//! - `PtgRefN`/`PtgAreaN` offsets are resolved at the participant and re-emitted as `PtgRef`/`PtgArea`
//! - references pushed off the sheet become `PtgRefErr`/`PtgAreaErr` (or the 3-D error forms)
//!
//! All other tokens are copied verbatim, so the result decodes to the same text as decoding the
//! anchor program with [`DecodeBase::shared`].

use biff_model::CellRef;

use crate::expr::{offset_ref, shift_ref, DecodeBase, RefAddr};
use crate::ptg::{tokenize, Ptg, RefField, COL_INDEX_MASK, COL_RELATIVE_BIT, ROW_RELATIVE_BIT};
use crate::DecodeRgceError;

const CLASS_MASK: u8 = 0x60;

/// Produce the participant-specific program for `cell` from a program anchored at `anchor`.
pub fn rebase_shared_rgce(
    rgce: &[u8],
    anchor: CellRef,
    cell: CellRef,
) -> Result<Vec<u8>, DecodeRgceError> {
    let base = DecodeBase::shared(anchor, cell);
    let mut out = Vec::with_capacity(rgce.len());

    for token in tokenize(rgce)? {
        let class = token.ptg & CLASS_MASK;
        let raw = &rgce[token.offset..token.offset + token.len];
        match token.kind {
            Ptg::Exp { .. } | Ptg::Tbl { .. } => {
                return Err(DecodeRgceError::UnsupportedToken {
                    offset: token.offset,
                    ptg: token.ptg,
                });
            }
            Ptg::Ref(field) => push_ref(&mut out, class, None, shift_ref(field, base), field),
            Ptg::RefN(field) => push_ref(&mut out, class, None, offset_ref(field, base), field),
            Ptg::Ref3d { ixti, cell: field } => {
                push_ref(&mut out, class, Some(ixti), shift_ref(field, base), field)
            }
            Ptg::Area(first, last) => push_area(
                &mut out,
                class,
                None,
                (shift_ref(first, base), shift_ref(last, base)),
                (first, last),
            ),
            Ptg::AreaN(first, last) => push_area(
                &mut out,
                class,
                None,
                (offset_ref(first, base), offset_ref(last, base)),
                (first, last),
            ),
            Ptg::Area3d { ixti, first, last } => push_area(
                &mut out,
                class,
                Some(ixti),
                (shift_ref(first, base), shift_ref(last, base)),
                (first, last),
            ),
            _ => out.extend_from_slice(raw),
        }
    }
    Ok(out)
}

fn pack(addr: RefAddr, original: RefField) -> (u16, u16) {
    let flags = original.col_field & (ROW_RELATIVE_BIT | COL_RELATIVE_BIT);
    // Callers check `in_bounds` first, so both fit.
    let row = addr.row as u16;
    let col = (addr.col as u16 & COL_INDEX_MASK) | flags;
    (row, col)
}

fn push_ref(out: &mut Vec<u8>, class: u8, ixti: Option<u16>, addr: RefAddr, original: RefField) {
    let (ok_ptg, err_ptg) = match ixti {
        None => (0x24, 0x2A),
        Some(_) => (0x3A, 0x3C),
    };
    if addr.in_bounds() {
        out.push((ok_ptg & 0x1F) | class);
        if let Some(ixti) = ixti {
            out.extend_from_slice(&ixti.to_le_bytes());
        }
        let (row, col) = pack(addr, original);
        out.extend_from_slice(&row.to_le_bytes());
        out.extend_from_slice(&col.to_le_bytes());
    } else {
        out.push((err_ptg & 0x1F) | class);
        if let Some(ixti) = ixti {
            out.extend_from_slice(&ixti.to_le_bytes());
        }
        out.extend_from_slice(&[0u8; 4]);
    }
}

fn push_area(
    out: &mut Vec<u8>,
    class: u8,
    ixti: Option<u16>,
    (first, last): (RefAddr, RefAddr),
    (orig_first, orig_last): (RefField, RefField),
) {
    let (ok_ptg, err_ptg) = match ixti {
        None => (0x25, 0x2B),
        Some(_) => (0x3B, 0x3D),
    };
    if first.in_bounds() && last.in_bounds() {
        out.push((ok_ptg & 0x1F) | class);
        if let Some(ixti) = ixti {
            out.extend_from_slice(&ixti.to_le_bytes());
        }
        let (row1, col1) = pack(first, orig_first);
        let (row2, col2) = pack(last, orig_last);
        out.extend_from_slice(&row1.to_le_bytes());
        out.extend_from_slice(&row2.to_le_bytes());
        out.extend_from_slice(&col1.to_le_bytes());
        out.extend_from_slice(&col2.to_le_bytes());
    } else {
        out.push((err_ptg & 0x1F) | class);
        if let Some(ixti) = ixti {
            out.extend_from_slice(&ixti.to_le_bytes());
        }
        out.extend_from_slice(&[0u8; 8]);
    }
}
