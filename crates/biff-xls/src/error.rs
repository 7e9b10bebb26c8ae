use biff_rgce::DecodeRgceError;
use thiserror::Error;

use crate::biff::BiffVersion;

/// Errors produced while decoding a BIFF record stream.
///
/// Only `FormatCorrupt` is fatal to a substream. `UnknownOpcode` is reported by the dispatcher
/// and skipped, `IndexOutOfRange` is recorded as a warning next to a placeholder value, and the
/// remaining variants are scoped to the single request that produced them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BiffError {
    /// Malformed record framing, a payload too short for its record type, or an invalid
    /// multi-cell range.
    #[error("{}", format_corrupt(*offset, *record_id, message))]
    FormatCorrupt {
        offset: usize,
        record_id: Option<u16>,
        message: String,
    },
    /// A well-framed record whose opcode this decoder doesn't model.
    #[error("unknown BIFF record 0x{record_id:04X} at offset {offset}")]
    UnknownOpcode { offset: usize, record_id: u16 },
    /// An SST or XF index beyond the bounds of its table.
    #[error("{what} index {index} out of range (table has {len} entries)")]
    IndexOutOfRange {
        what: &'static str,
        index: u32,
        len: usize,
    },
    /// The operation is only defined for the BIFF8 token encoding.
    #[error("{operation} requires BIFF8 data (sheet is {found})")]
    Biff8Required {
        operation: &'static str,
        found: BiffVersion,
    },
    /// The forward re-scan for a shared/array formula definition failed.
    #[error("cannot resolve formula definition by scanning from offset {offset}: {message}")]
    StreamCorrupt { offset: usize, message: String },
    #[error("failed to decode formula tokens: {0}")]
    Formula(#[from] DecodeRgceError),
}

fn format_corrupt(offset: usize, record_id: Option<u16>, message: &str) -> String {
    match record_id {
        Some(id) => format!("corrupt BIFF record 0x{id:04X} at offset {offset}: {message}"),
        None => format!("corrupt BIFF stream at offset {offset}: {message}"),
    }
}

impl BiffError {
    pub(crate) fn corrupt(offset: usize, record_id: u16, message: impl Into<String>) -> Self {
        BiffError::FormatCorrupt {
            offset,
            record_id: Some(record_id),
            message: message.into(),
        }
    }
}

/// Errors from the path-based entry point.
#[derive(Debug, Error)]
pub enum ReadError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Biff(#[from] BiffError),
}
