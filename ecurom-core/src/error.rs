// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Error type shared by every module in this crate.

use std::path::PathBuf;

/// Errors returned by the codec, table, definition and checksum modules.
///
/// None of these are retried or swallowed internally.  The two deliberately
/// soft behaviours (unknown checksum module, rejected scaling expression) do
/// not produce an `Error` at all - they are logged and degrade to a default.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("access of {length} byte(s) at 0x{offset:X} exceeds buffer of {buffer_len} bytes")]
    OutOfBounds {
        offset: usize,
        length: usize,
        buffer_len: usize,
    },

    #[error("invalid region 0x{start:X}..0x{end:X}: start must be below end")]
    InvalidRegion { start: usize, end: usize },

    #[error("address 0x{address:X} is not aligned to {alignment} bytes")]
    MisalignedAddress { address: usize, alignment: usize },

    #[error("cell ({row}, {col}) outside table of {rows} x {cols}")]
    IndexOutOfRange {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    #[error("bit range of {bit_length} bit(s) at bit {bit_offset} is invalid")]
    InvalidBitRange { bit_offset: usize, bit_length: usize },

    #[error("unknown checksum algorithm '{name}'")]
    UnknownChecksumAlgorithm { name: String },

    #[error("checksum algorithm is custom but no custom function is bound")]
    MissingCustomFunction,

    #[error("checksum storage of {size} byte(s) at 0x{offset:X} exceeds ROM of {rom_len} bytes")]
    InvalidStorageOffset {
        offset: usize,
        size: usize,
        rom_len: usize,
    },

    #[error("checksum storage size {size} is not 1, 2 or 4 bytes")]
    InvalidStorageSize { size: usize },

    #[error("include '{name}' not found, searched: {searched:?}")]
    IncludeNotFound { name: String, searched: Vec<PathBuf> },

    #[error("include cycle detected at {path:?}")]
    IncludeCycleDetected { path: PathBuf },

    #[error("invalid definition: {reason}")]
    InvalidDefinition { reason: String },

    #[error("malformed XML in {source_name}: {message}")]
    Xml { source_name: String, message: String },

    #[error("failed to read {path:?}: {message}")]
    Io { path: PathBuf, message: String },
}

impl Error {
    pub(crate) fn out_of_bounds(offset: usize, length: usize, buffer_len: usize) -> Self {
        Error::OutOfBounds {
            offset,
            length,
            buffer_len,
        }
    }

    // `offset + length` does not fit in the address space at all
    pub(crate) fn address_overflow(offset: usize, length: usize) -> Self {
        Self::out_of_bounds(offset, length, usize::MAX)
    }

    pub(crate) fn invalid_definition(reason: impl Into<String>) -> Self {
        Error::InvalidDefinition {
            reason: reason.into(),
        }
    }
}

pub type Result<T> = core::result::Result<T, Error>;

/// Checks that `offset..offset + length` lies within a buffer of
/// `buffer_len` bytes, returning the exclusive end on success.
pub fn check_range(offset: usize, length: usize, buffer_len: usize) -> Result<usize> {
    match offset.checked_add(length) {
        Some(end) if end <= buffer_len => Ok(end),
        _ => Err(Error::out_of_bounds(offset, length, buffer_len)),
    }
}
