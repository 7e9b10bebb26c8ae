//! BIFF8 formula token (`rgce`) helpers.
//!
//! - [`parse_rgce`]: token program -> [`Expr`] tree, with references resolved for one cell
//! - [`render`]: [`Expr`] -> formula text (no leading `=`), resolving sheets and names through a
//!   [`FormulaContext`]
//! - [`rebase_shared_rgce`]: shared-formula program -> standalone program for a participant cell
//!
//! `PtgExp`/`PtgTbl` are not decoded here; callers resolve them to the owning shared, array, or
//! table group first.

mod error;
mod expr;
mod ftab;
mod ptg;
mod rebase;
mod render;

use biff_model::CellRef;

pub use error::DecodeRgceError;
pub use expr::{parse_rgce, ArrayItem, Callee, DecodeBase, Expr, RefAddr};
pub use ftab::{fixed_arg_count, function_name_from_id, FTAB_USER_DEFINED};
pub use ptg::{normalize_ptg, tokenize, BinaryOp, MemKind, Ptg, RefField, Token, UnaryOp};
pub use rebase::rebase_shared_rgce;
pub use render::{format_sheet_prefix, render, EmptyContext, FormulaContext};

/// Decode a cell's own formula to text.
pub fn decode_rgce(
    rgce: &[u8],
    rgcb: &[u8],
    cell: CellRef,
    ctx: &dyn FormulaContext,
) -> Result<String, DecodeRgceError> {
    decode_rgce_with_base(rgce, rgcb, DecodeBase::at(cell), ctx)
}

/// Decode a program whose relative references were written for `base.origin`.
pub fn decode_rgce_with_base(
    rgce: &[u8],
    rgcb: &[u8],
    base: DecodeBase,
    ctx: &dyn FormulaContext,
) -> Result<String, DecodeRgceError> {
    let expr = parse_rgce(rgce, rgcb, base)?;
    Ok(render(&expr, ctx))
}

/// Parse `PtgExp`/`PtgTbl` (`[ptg][rw: u16][col: u16]`) at the start of a program, returning the
/// anchor cell it points at.
pub fn parse_ptg_exp(rgce: &[u8]) -> Option<CellRef> {
    match rgce {
        [0x01 | 0x02, r0, r1, c0, c1, ..] => Some(CellRef::new(
            u32::from(u16::from_le_bytes([*r0, *r1])),
            u32::from(u16::from_le_bytes([*c0, *c1])),
        )),
        _ => None,
    }
}
