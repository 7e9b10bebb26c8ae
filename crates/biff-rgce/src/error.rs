use thiserror::Error;

/// Structured `rgce` decode failure, always carrying the token (`ptg`) and its byte offset.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeRgceError {
    #[error("unexpected end of rgce decoding ptg=0x{ptg:02X} at offset {offset} (needed {needed} bytes, remaining {remaining})")]
    UnexpectedEof {
        offset: usize,
        ptg: u8,
        needed: usize,
        remaining: usize,
    },
    #[error("unsupported ptg=0x{ptg:02X} at rgce offset {offset}")]
    UnsupportedToken { offset: usize, ptg: u8 },
    #[error("stack underflow decoding ptg=0x{ptg:02X} at rgce offset {offset}")]
    StackUnderflow { offset: usize, ptg: u8 },
    #[error("formula decoded to {stack_len} expressions at rgce offset {offset} (expected 1)")]
    StackNotSingular { offset: usize, stack_len: usize },
    #[error("unknown function id {func_id} in ptg=0x{ptg:02X} at rgce offset {offset}")]
    UnknownFunctionId { offset: usize, ptg: u8, func_id: u16 },
    #[error("inline array for ptg=0x{ptg:02X} at rgce offset {offset} is missing from trailing data")]
    MissingArrayData { offset: usize, ptg: u8 },
}

impl DecodeRgceError {
    pub fn offset(&self) -> usize {
        match *self {
            DecodeRgceError::UnexpectedEof { offset, .. }
            | DecodeRgceError::UnsupportedToken { offset, .. }
            | DecodeRgceError::StackUnderflow { offset, .. }
            | DecodeRgceError::StackNotSingular { offset, .. }
            | DecodeRgceError::UnknownFunctionId { offset, .. }
            | DecodeRgceError::MissingArrayData { offset, .. } => offset,
        }
    }

    pub fn ptg(&self) -> Option<u8> {
        match *self {
            DecodeRgceError::UnexpectedEof { ptg, .. }
            | DecodeRgceError::UnsupportedToken { ptg, .. }
            | DecodeRgceError::StackUnderflow { ptg, .. }
            | DecodeRgceError::UnknownFunctionId { ptg, .. }
            | DecodeRgceError::MissingArrayData { ptg, .. } => Some(ptg),
            DecodeRgceError::StackNotSingular { .. } => None,
        }
    }
}
