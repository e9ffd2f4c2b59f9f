//! Errors raised while decoding a binary module.

use thiserror::Error;

use super::encoding::section_name;
use crate::registry::LookupError;

/// A decode failure, pinned to the byte offset where it was detected and,
/// when known, the section being read.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("malformed binary at offset {offset:#x}{}: {kind}", in_section(.section))]
pub struct DecodeError {
    pub offset: usize,
    pub section: Option<u8>,
    pub kind: DecodeErrorKind,
}

fn in_section(section: &Option<u8>) -> String {
    match *section {
        Some(id) => format!(" in {} section", section_name(id)),
        None => String::new(),
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeErrorKind {
    #[error("unexpected end of input")]
    UnexpectedEof,

    #[error("integer representation too long")]
    IntegerTooLong,

    #[error("integer too large")]
    IntegerTooLarge,

    #[error("invalid utf-8 sequence")]
    InvalidUtf8,

    #[error("magic header not detected")]
    BadMagic,

    #[error("unknown binary version {0}")]
    UnknownVersion(u32),

    #[error("invalid value type {0:#04x}")]
    InvalidValueType(u8),

    #[error("expected {expected:#04x}, found {found:#04x}")]
    UnexpectedByte { expected: u8, found: u8 },

    #[error("invalid limits flags {0:#04x}")]
    InvalidLimits(u8),

    #[error("invalid mutability {0:#04x}")]
    InvalidMutability(u8),

    #[error("invalid external kind {0:#04x}")]
    InvalidExternalKind(u8),

    #[error("invalid block type")]
    InvalidBlockType,

    #[error("unknown section id {0}")]
    UnknownSection(u8),

    #[error("section {0} out of order")]
    SectionOutOfOrder(u8),

    #[error("section size mismatch: declared {declared} bytes, consumed {consumed}")]
    SectionSizeMismatch { declared: usize, consumed: usize },

    #[error("function and code section have inconsistent lengths ({functions} vs {bodies})")]
    FunctionCodeMismatch { functions: usize, bodies: usize },

    #[error("too many {what}: {count} exceeds limit {limit}")]
    LimitExceeded { what: &'static str, count: u64, limit: u32 },

    #[error("invalid element segment flags {0}")]
    InvalidElementFlags(u32),

    #[error("invalid data segment flags {0}")]
    InvalidDataFlags(u32),

    #[error("unexpected else outside of if")]
    UnexpectedElse,

    #[error("{0}")]
    UnknownInstruction(#[from] LookupError),
}
