use core::fmt;

use serde::{Deserialize, Serialize};

/// Spreadsheet error values as stored in BIFF cell records and `PtgErr` tokens.
///
/// | Code | Literal |
/// |------|---------|
/// | 0x00 | `#NULL!` |
/// | 0x07 | `#DIV/0!` |
/// | 0x0F | `#VALUE!` |
/// | 0x17 | `#REF!` |
/// | 0x1D | `#NAME?` |
/// | 0x24 | `#NUM!` |
/// | 0x2A | `#N/A` |
///
/// Codes outside the table are kept as [`ErrorValue::Unknown`] so the raw byte isn't lost.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorValue {
    Null,
    Div0,
    Value,
    Ref,
    Name,
    Num,
    NA,
    Unknown(u8),
}

impl ErrorValue {
    pub const fn from_code(code: u8) -> Self {
        match code {
            0x00 => ErrorValue::Null,
            0x07 => ErrorValue::Div0,
            0x0F => ErrorValue::Value,
            0x17 => ErrorValue::Ref,
            0x1D => ErrorValue::Name,
            0x24 => ErrorValue::Num,
            0x2A => ErrorValue::NA,
            other => ErrorValue::Unknown(other),
        }
    }

    pub const fn code(self) -> u8 {
        match self {
            ErrorValue::Null => 0x00,
            ErrorValue::Div0 => 0x07,
            ErrorValue::Value => 0x0F,
            ErrorValue::Ref => 0x17,
            ErrorValue::Name => 0x1D,
            ErrorValue::Num => 0x24,
            ErrorValue::NA => 0x2A,
            ErrorValue::Unknown(code) => code,
        }
    }

    /// Canonical literal, or `None` for unknown codes.
    pub const fn literal(self) -> Option<&'static str> {
        match self {
            ErrorValue::Null => Some("#NULL!"),
            ErrorValue::Div0 => Some("#DIV/0!"),
            ErrorValue::Value => Some("#VALUE!"),
            ErrorValue::Ref => Some("#REF!"),
            ErrorValue::Name => Some("#NAME?"),
            ErrorValue::Num => Some("#NUM!"),
            ErrorValue::NA => Some("#N/A"),
            ErrorValue::Unknown(_) => None,
        }
    }
}

impl fmt::Display for ErrorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.literal() {
            Some(lit) => f.write_str(lit),
            None => write!(f, "#ERR({:#04x})", self.code()),
        }
    }
}
