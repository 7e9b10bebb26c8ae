//! BIFF8 `rgce` tokenizer.
//!
//! Splits a token program into [`Token`]s without interpreting stack effects. Class variants
//! (reference/value/array, ptg `0x20..=0x7F`) are normalized to their `0x20..=0x3F` base id for
//! matching; the original byte is kept on the token so callers can re-emit it.

use crate::DecodeRgceError;

pub(crate) const COL_INDEX_MASK: u16 = 0x3FFF;
pub(crate) const ROW_RELATIVE_BIT: u16 = 0x4000;
pub(crate) const COL_RELATIVE_BIT: u16 = 0x8000;

pub(crate) const PTG_EXP: u8 = 0x01;
pub(crate) const PTG_TBL: u8 = 0x02;
pub(crate) const PTG_ATTR: u8 = 0x19;

pub(crate) const ATTR_CHOOSE: u8 = 0x04;
pub(crate) const ATTR_SUM: u8 = 0x10;

/// A row plus a packed column field (`0x3FFF` column, `0x4000` row-relative,
/// `0x8000` column-relative), as used by `PtgRef`, `PtgArea` and the 3-D/relative variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefField {
    pub row: u16,
    pub col_field: u16,
}

impl RefField {
    pub fn col(self) -> u16 {
        self.col_field & COL_INDEX_MASK
    }

    pub fn row_relative(self) -> bool {
        self.col_field & ROW_RELATIVE_BIT != 0
    }

    pub fn col_relative(self) -> bool {
        self.col_field & COL_RELATIVE_BIT != 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    Concat,
    Lt,
    Le,
    Eq,
    Gt,
    Ge,
    Ne,
    Intersect,
    Union,
    Range,
}

impl BinaryOp {
    fn from_ptg(ptg: u8) -> Option<Self> {
        Some(match ptg {
            0x03 => BinaryOp::Add,
            0x04 => BinaryOp::Sub,
            0x05 => BinaryOp::Mul,
            0x06 => BinaryOp::Div,
            0x07 => BinaryOp::Pow,
            0x08 => BinaryOp::Concat,
            0x09 => BinaryOp::Lt,
            0x0A => BinaryOp::Le,
            0x0B => BinaryOp::Eq,
            0x0C => BinaryOp::Gt,
            0x0D => BinaryOp::Ge,
            0x0E => BinaryOp::Ne,
            0x0F => BinaryOp::Intersect,
            0x10 => BinaryOp::Union,
            0x11 => BinaryOp::Range,
            _ => return None,
        })
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Pow => "^",
            BinaryOp::Concat => "&",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Eq => "=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Ne => "<>",
            BinaryOp::Intersect => " ",
            BinaryOp::Union => ",",
            BinaryOp::Range => ":",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Plus,
    Minus,
    Percent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemKind {
    Area,
    Err,
    NoMem,
    Func,
}

/// One decoded token payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Ptg {
    Exp { row: u16, col: u16 },
    Tbl { row: u16, col: u16 },
    Binary(BinaryOp),
    Unary(UnaryOp),
    Paren,
    MissArg,
    Str(String),
    Attr { grbit: u8, data: u16 },
    Err(u8),
    Bool(bool),
    Int(u16),
    Num(f64),
    Array,
    Func { iftab: u16 },
    FuncVar { argc: u8, iftab: u16 },
    Name { index: u32 },
    Ref(RefField),
    Area(RefField, RefField),
    Mem { kind: MemKind, cce: u16 },
    RefErr,
    AreaErr,
    RefN(RefField),
    AreaN(RefField, RefField),
    NameX { ixti: u16, index: u32 },
    Ref3d { ixti: u16, cell: RefField },
    Area3d { ixti: u16, first: RefField, last: RefField },
    RefErr3d { ixti: u16 },
    AreaErr3d { ixti: u16 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    /// Byte offset of the ptg within the program.
    pub offset: usize,
    /// The raw ptg byte, including class bits.
    pub ptg: u8,
    /// Total encoded length, including the ptg byte.
    pub len: usize,
    pub kind: Ptg,
}

/// Map class variants (`0x40..=0x7F`) onto their base id.
pub fn normalize_ptg(ptg: u8) -> u8 {
    if ptg >= 0x20 {
        (ptg & 0x1F) | 0x20
    } else {
        ptg
    }
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
    offset: usize,
    ptg: u8,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeRgceError> {
        let remaining = self.buf.len().saturating_sub(self.pos);
        if remaining < n {
            return Err(DecodeRgceError::UnexpectedEof {
                offset: self.offset,
                ptg: self.ptg,
                needed: n,
                remaining,
            });
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, DecodeRgceError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, DecodeRgceError> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32, DecodeRgceError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn ref_field(&mut self) -> Result<RefField, DecodeRgceError> {
        let row = self.u16()?;
        let col_field = self.u16()?;
        Ok(RefField { row, col_field })
    }

    fn area_fields(&mut self) -> Result<(RefField, RefField), DecodeRgceError> {
        let row_first = self.u16()?;
        let row_last = self.u16()?;
        let col_first = self.u16()?;
        let col_last = self.u16()?;
        Ok((
            RefField {
                row: row_first,
                col_field: col_first,
            },
            RefField {
                row: row_last,
                col_field: col_last,
            },
        ))
    }
}

/// Split a BIFF8 token program into tokens.
pub fn tokenize(rgce: &[u8]) -> Result<Vec<Token>, DecodeRgceError> {
    let mut out = Vec::new();
    let mut pos = 0usize;
    while pos < rgce.len() {
        let token = read_token(rgce, pos)?;
        pos += token.len;
        out.push(token);
    }
    Ok(out)
}

fn read_token(rgce: &[u8], offset: usize) -> Result<Token, DecodeRgceError> {
    let ptg = rgce[offset];
    let mut r = Reader {
        buf: rgce,
        pos: offset + 1,
        offset,
        ptg,
    };

    let kind = match normalize_ptg(ptg) {
        PTG_EXP => Ptg::Exp {
            row: r.u16()?,
            col: r.u16()?,
        },
        PTG_TBL => Ptg::Tbl {
            row: r.u16()?,
            col: r.u16()?,
        },
        id @ 0x03..=0x11 => match BinaryOp::from_ptg(id) {
            Some(op) => Ptg::Binary(op),
            None => return Err(DecodeRgceError::UnsupportedToken { offset, ptg }),
        },
        0x12 => Ptg::Unary(UnaryOp::Plus),
        0x13 => Ptg::Unary(UnaryOp::Minus),
        0x14 => Ptg::Unary(UnaryOp::Percent),
        0x15 => Ptg::Paren,
        0x16 => Ptg::MissArg,
        0x17 => {
            // ShortXLUnicodeString: [cch: u8][flags: u8][chars]
            let cch = usize::from(r.u8()?);
            let flags = r.u8()?;
            Ptg::Str(read_chars(&mut r, cch, flags & 0x01 != 0)?)
        }
        PTG_ATTR => {
            let grbit = r.u8()?;
            let data = r.u16()?;
            if grbit & ATTR_CHOOSE != 0 {
                // Jump table: one offset per choice plus the trailing "end" offset.
                let entries = usize::from(data) + 1;
                r.take(entries * 2)?;
            }
            Ptg::Attr { grbit, data }
        }
        0x1C => Ptg::Err(r.u8()?),
        0x1D => Ptg::Bool(r.u8()? != 0),
        0x1E => Ptg::Int(r.u16()?),
        0x1F => {
            let b = r.take(8)?;
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(b);
            Ptg::Num(f64::from_le_bytes(bytes))
        }
        0x20 => {
            r.take(7)?;
            Ptg::Array
        }
        0x21 => Ptg::Func { iftab: r.u16()? },
        0x22 => Ptg::FuncVar {
            argc: r.u8()?,
            iftab: r.u16()?,
        },
        0x23 => Ptg::Name { index: r.u32()? },
        0x24 => Ptg::Ref(r.ref_field()?),
        0x25 => {
            let (first, last) = r.area_fields()?;
            Ptg::Area(first, last)
        }
        id @ 0x26..=0x28 => {
            r.take(4)?;
            let kind = match id {
                0x26 => MemKind::Area,
                0x27 => MemKind::Err,
                _ => MemKind::NoMem,
            };
            Ptg::Mem {
                kind,
                cce: r.u16()?,
            }
        }
        0x29 => Ptg::Mem {
            kind: MemKind::Func,
            cce: r.u16()?,
        },
        0x2A => {
            r.take(4)?;
            Ptg::RefErr
        }
        0x2B => {
            r.take(8)?;
            Ptg::AreaErr
        }
        0x2C => Ptg::RefN(r.ref_field()?),
        0x2D => {
            let (first, last) = r.area_fields()?;
            Ptg::AreaN(first, last)
        }
        0x2E => Ptg::Mem {
            kind: MemKind::Area,
            cce: r.u16()?,
        },
        0x2F => Ptg::Mem {
            kind: MemKind::NoMem,
            cce: r.u16()?,
        },
        0x39 => {
            let ixti = r.u16()?;
            let index = r.u32()?;
            Ptg::NameX { ixti, index }
        }
        0x3A => {
            let ixti = r.u16()?;
            Ptg::Ref3d {
                ixti,
                cell: r.ref_field()?,
            }
        }
        0x3B => {
            let ixti = r.u16()?;
            let (first, last) = r.area_fields()?;
            Ptg::Area3d { ixti, first, last }
        }
        0x3C => {
            let ixti = r.u16()?;
            r.take(4)?;
            Ptg::RefErr3d { ixti }
        }
        0x3D => {
            let ixti = r.u16()?;
            r.take(8)?;
            Ptg::AreaErr3d { ixti }
        }
        _ => return Err(DecodeRgceError::UnsupportedToken { offset, ptg }),
    };

    Ok(Token {
        offset,
        ptg,
        len: r.pos - offset,
        kind,
    })
}

fn read_chars(r: &mut Reader<'_>, cch: usize, high_byte: bool) -> Result<String, DecodeRgceError> {
    if high_byte {
        let raw = r.take(cch * 2)?;
        let units: Vec<u16> = raw
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .collect();
        Ok(String::from_utf16_lossy(&units))
    } else {
        // Compressed strings store the low byte of each UTF-16 code unit.
        Ok(r.take(cch)?.iter().map(|&b| char::from(b)).collect())
    }
}

/// Read an `XLUnicodeString` (`[cch: u16][flags: u8][chars]`) as found in array constants.
pub(crate) fn read_unicode_string(
    buf: &[u8],
    pos: &mut usize,
    offset: usize,
    ptg: u8,
) -> Result<String, DecodeRgceError> {
    let mut r = Reader {
        buf,
        pos: *pos,
        offset,
        ptg,
    };
    let cch = usize::from(r.u16()?);
    let flags = r.u8()?;
    let s = read_chars(&mut r, cch, flags & 0x01 != 0)?;
    *pos = r.pos;
    Ok(s)
}
