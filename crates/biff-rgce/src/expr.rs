//! Token program -> expression tree.
//!
//! BIFF formulas are stored in reverse Polish order, so the tree is built with an explicit
//! operand stack. References are resolved against the cell the formula is being decoded for:
//! relative components of `PtgRef`-style tokens move by the distance between the formula's
//! origin cell and that cell, while `PtgRefN`-style tokens are offsets from the cell itself.

use biff_model::{CellRef, ErrorValue, BIFF8_MAX_COLS, BIFF8_MAX_ROWS};

use crate::ftab::{fixed_arg_count, function_name_from_id, FTAB_USER_DEFINED};
use crate::ptg::{
    read_unicode_string, tokenize, BinaryOp, MemKind, Ptg, RefField, Token, UnaryOp, ATTR_SUM,
};
use crate::DecodeRgceError;

/// Where a token program lives and which cell it is being decoded for.
///
/// For ordinary formulas `origin == cell`. For shared formulas `origin` is the group's anchor
/// cell and `cell` is the participant requesting its text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeBase {
    pub origin: CellRef,
    pub cell: CellRef,
}

impl DecodeBase {
    pub fn at(cell: CellRef) -> Self {
        Self { origin: cell, cell }
    }

    pub fn shared(anchor: CellRef, cell: CellRef) -> Self {
        Self {
            origin: anchor,
            cell,
        }
    }

    fn delta(self) -> (i64, i64) {
        (
            i64::from(self.cell.row) - i64::from(self.origin.row),
            i64::from(self.cell.col) - i64::from(self.origin.col),
        )
    }
}

/// A resolved cell address. Coordinates are signed so rebasing can move a reference off the
/// sheet; such addresses render as `#REF!`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefAddr {
    pub row: i64,
    pub col: i64,
    pub row_abs: bool,
    pub col_abs: bool,
}

impl RefAddr {
    pub fn in_bounds(self) -> bool {
        (0..i64::from(BIFF8_MAX_ROWS)).contains(&self.row)
            && (0..i64::from(BIFF8_MAX_COLS)).contains(&self.col)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ArrayItem {
    Empty,
    Number(f64),
    Text(String),
    Bool(bool),
    Error(ErrorValue),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Callee {
    Builtin(&'static str),
    /// `iftab` 255: the function name comes from an expression (usually an external name).
    UserDefined(Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Text(String),
    Bool(bool),
    Error(ErrorValue),
    Missing,
    Array(Vec<Vec<ArrayItem>>),
    /// `sheet` is an EXTERNSHEET index for 3-D references. `addr == None` is a deleted reference.
    Cell {
        sheet: Option<u16>,
        addr: Option<RefAddr>,
    },
    Area {
        sheet: Option<u16>,
        corners: Option<(RefAddr, RefAddr)>,
    },
    /// 1-based index into the workbook's defined names.
    Name(u32),
    ExternName {
        ixti: u16,
        index: u32,
    },
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Paren(Box<Expr>),
    Function {
        callee: Callee,
        args: Vec<Expr>,
    },
}

/// Parse a BIFF8 token program (`rgce`, with trailing data `rgcb`) into a single expression.
pub fn parse_rgce(rgce: &[u8], rgcb: &[u8], base: DecodeBase) -> Result<Expr, DecodeRgceError> {
    let tokens = tokenize(rgce)?;
    let mut stack: Vec<Expr> = Vec::new();
    let mut extra = ExtraData { buf: rgcb, pos: 0 };

    for token in &tokens {
        apply_token(token, &mut stack, &mut extra, base)?;
    }

    if stack.len() == 1 {
        if let Some(expr) = stack.pop() {
            return Ok(expr);
        }
    }
    Err(DecodeRgceError::StackNotSingular {
        offset: rgce.len(),
        stack_len: stack.len(),
    })
}

fn apply_token(
    token: &Token,
    stack: &mut Vec<Expr>,
    extra: &mut ExtraData<'_>,
    base: DecodeBase,
) -> Result<(), DecodeRgceError> {
    let offset = token.offset;
    let ptg = token.ptg;
    let pop = |stack: &mut Vec<Expr>| {
        stack
            .pop()
            .ok_or(DecodeRgceError::StackUnderflow { offset, ptg })
    };

    match &token.kind {
        Ptg::Exp { .. } | Ptg::Tbl { .. } => {
            return Err(DecodeRgceError::UnsupportedToken { offset, ptg });
        }
        Ptg::Binary(op) => {
            let rhs = pop(stack)?;
            let lhs = pop(stack)?;
            stack.push(Expr::Binary(*op, Box::new(lhs), Box::new(rhs)));
        }
        Ptg::Unary(op) => {
            let operand = pop(stack)?;
            stack.push(Expr::Unary(*op, Box::new(operand)));
        }
        Ptg::Paren => {
            let inner = pop(stack)?;
            stack.push(Expr::Paren(Box::new(inner)));
        }
        Ptg::MissArg => stack.push(Expr::Missing),
        Ptg::Str(s) => stack.push(Expr::Text(s.clone())),
        Ptg::Attr { grbit, .. } => {
            if grbit & ATTR_SUM != 0 {
                let arg = pop(stack)?;
                stack.push(Expr::Function {
                    callee: Callee::Builtin("SUM"),
                    args: vec![arg],
                });
            }
            // Other attributes (volatile, if/choose/goto jumps, whitespace) have no stack effect.
        }
        Ptg::Err(code) => stack.push(Expr::Error(ErrorValue::from_code(*code))),
        Ptg::Bool(b) => stack.push(Expr::Bool(*b)),
        Ptg::Int(n) => stack.push(Expr::Number(f64::from(*n))),
        Ptg::Num(n) => stack.push(Expr::Number(*n)),
        Ptg::Array => {
            let rows = extra.read_array(offset, ptg)?;
            stack.push(Expr::Array(rows));
        }
        Ptg::Func { iftab } => {
            let func_id = *iftab;
            let (Some(name), Some(argc)) = (function_name_from_id(func_id), fixed_arg_count(func_id))
            else {
                return Err(DecodeRgceError::UnknownFunctionId {
                    offset,
                    ptg,
                    func_id,
                });
            };
            let args = pop_args(stack, usize::from(argc), offset, ptg)?;
            stack.push(Expr::Function {
                callee: Callee::Builtin(name),
                args,
            });
        }
        Ptg::FuncVar { argc, iftab } => {
            let argc = usize::from(argc & 0x7F);
            let func_id = iftab & 0x7FFF;
            let mut args = pop_args(stack, argc, offset, ptg)?;
            let callee = if func_id == FTAB_USER_DEFINED {
                if args.is_empty() {
                    return Err(DecodeRgceError::StackUnderflow { offset, ptg });
                }
                Callee::UserDefined(Box::new(args.remove(0)))
            } else {
                match function_name_from_id(func_id) {
                    Some(name) => Callee::Builtin(name),
                    None => {
                        return Err(DecodeRgceError::UnknownFunctionId {
                            offset,
                            ptg,
                            func_id,
                        })
                    }
                }
            };
            stack.push(Expr::Function { callee, args });
        }
        Ptg::Name { index } => stack.push(Expr::Name(*index)),
        Ptg::NameX { ixti, index } => stack.push(Expr::ExternName {
            ixti: *ixti,
            index: *index,
        }),
        Ptg::Ref(field) => stack.push(Expr::Cell {
            sheet: None,
            addr: Some(shift_ref(*field, base)),
        }),
        Ptg::Area(first, last) => stack.push(Expr::Area {
            sheet: None,
            corners: Some((shift_ref(*first, base), shift_ref(*last, base))),
        }),
        Ptg::RefN(field) => stack.push(Expr::Cell {
            sheet: None,
            addr: Some(offset_ref(*field, base)),
        }),
        Ptg::AreaN(first, last) => stack.push(Expr::Area {
            sheet: None,
            corners: Some((offset_ref(*first, base), offset_ref(*last, base))),
        }),
        Ptg::Ref3d { ixti, cell } => stack.push(Expr::Cell {
            sheet: Some(*ixti),
            addr: Some(shift_ref(*cell, base)),
        }),
        Ptg::Area3d { ixti, first, last } => stack.push(Expr::Area {
            sheet: Some(*ixti),
            corners: Some((shift_ref(*first, base), shift_ref(*last, base))),
        }),
        Ptg::RefErr => stack.push(Expr::Cell {
            sheet: None,
            addr: None,
        }),
        Ptg::AreaErr => stack.push(Expr::Area {
            sheet: None,
            corners: None,
        }),
        Ptg::RefErr3d { ixti } => stack.push(Expr::Cell {
            sheet: Some(*ixti),
            addr: None,
        }),
        Ptg::AreaErr3d { ixti } => stack.push(Expr::Area {
            sheet: Some(*ixti),
            corners: None,
        }),
        Ptg::Mem { kind, .. } => {
            // The cached subexpression that follows is decoded as ordinary tokens.
            if *kind == MemKind::Area {
                extra.skip_mem_area(offset, ptg)?;
            }
        }
    }
    Ok(())
}

fn pop_args(
    stack: &mut Vec<Expr>,
    argc: usize,
    offset: usize,
    ptg: u8,
) -> Result<Vec<Expr>, DecodeRgceError> {
    if stack.len() < argc {
        return Err(DecodeRgceError::StackUnderflow { offset, ptg });
    }
    Ok(stack.split_off(stack.len() - argc))
}

/// `PtgRef`-style field: absolute coordinates, relative components move with the formula.
pub(crate) fn shift_ref(field: RefField, base: DecodeBase) -> RefAddr {
    let (delta_row, delta_col) = base.delta();
    let mut row = i64::from(field.row);
    let mut col = i64::from(field.col());
    if field.row_relative() {
        row += delta_row;
    }
    if field.col_relative() {
        col += delta_col;
    }
    RefAddr {
        row,
        col,
        row_abs: !field.row_relative(),
        col_abs: !field.col_relative(),
    }
}

/// `PtgRefN`-style field: relative components are signed offsets from the formula cell. The
/// column offset is the signed low byte of the column field.
pub(crate) fn offset_ref(field: RefField, base: DecodeBase) -> RefAddr {
    let row = if field.row_relative() {
        i64::from(base.cell.row) + i64::from(field.row as i16)
    } else {
        i64::from(field.row)
    };
    let col = if field.col_relative() {
        i64::from(base.cell.col) + i64::from(field.col_field as u8 as i8)
    } else {
        i64::from(field.col())
    };
    RefAddr {
        row,
        col,
        row_abs: !field.row_relative(),
        col_abs: !field.col_relative(),
    }
}

/// Cursor over the trailing `rgcb` data consumed by `PtgArray` and `PtgMemArea` in token order.
struct ExtraData<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl ExtraData<'_> {
    fn take(&mut self, n: usize, offset: usize, ptg: u8) -> Result<&[u8], DecodeRgceError> {
        let remaining = self.buf.len().saturating_sub(self.pos);
        if remaining < n {
            return Err(DecodeRgceError::MissingArrayData { offset, ptg });
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn skip_mem_area(&mut self, offset: usize, ptg: u8) -> Result<(), DecodeRgceError> {
        let b = self.take(2, offset, ptg)?;
        let count = usize::from(u16::from_le_bytes([b[0], b[1]]));
        self.take(count * 8, offset, ptg)?;
        Ok(())
    }

    fn read_array(&mut self, offset: usize, ptg: u8) -> Result<Vec<Vec<ArrayItem>>, DecodeRgceError> {
        let header = self.take(3, offset, ptg)?;
        let cols = usize::from(header[0]) + 1;
        let rows = usize::from(u16::from_le_bytes([header[1], header[2]])) + 1;

        let mut out = Vec::with_capacity(rows);
        for _ in 0..rows {
            let mut row = Vec::with_capacity(cols);
            for _ in 0..cols {
                row.push(self.read_array_item(offset, ptg)?);
            }
            out.push(row);
        }
        Ok(out)
    }

    fn read_array_item(&mut self, offset: usize, ptg: u8) -> Result<ArrayItem, DecodeRgceError> {
        let kind = self.take(1, offset, ptg)?[0];
        let item = match kind {
            0x00 => {
                self.take(8, offset, ptg)?;
                ArrayItem::Empty
            }
            0x01 => {
                let b = self.take(8, offset, ptg)?;
                let mut bytes = [0u8; 8];
                bytes.copy_from_slice(b);
                ArrayItem::Number(f64::from_le_bytes(bytes))
            }
            0x02 => {
                let mut pos = self.pos;
                let s = read_unicode_string(self.buf, &mut pos, offset, ptg)
                    .map_err(|_| DecodeRgceError::MissingArrayData { offset, ptg })?;
                self.pos = pos;
                ArrayItem::Text(s)
            }
            0x04 => {
                let b = self.take(8, offset, ptg)?;
                ArrayItem::Bool(b[0] != 0)
            }
            0x10 => {
                let b = self.take(8, offset, ptg)?;
                ArrayItem::Error(ErrorValue::from_code(b[0]))
            }
            _ => return Err(DecodeRgceError::MissingArrayData { offset, ptg }),
        };
        Ok(item)
    }
}
