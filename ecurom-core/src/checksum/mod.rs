// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! ROM and packet checksums
//!
//! Holds the raw algorithms, the vendor-specific integrity schemes that
//! store their results at fixed places in the image, and a generic manager
//! that recomputes, reads, writes and validates a checksum described by a
//! [`ChecksumDefinition`].
//!
//! Nothing here retains a reference to the ROM between calls.  Recomputation
//! works from a copy with the storage slot zeroed.

mod algorithms;
mod manager;
mod mitsucan;
mod nissan;
mod subaru;

pub use algorithms::{crc32, ncs_checksum, ncs_crc16, ssm_checksum, sum8, xor8};
pub use manager::{
    ChecksumValidation, read_checksum, recompute_checksum, validate_checksum, write_checksum,
};
pub use mitsucan::{
    MITSUCAN_FIXUP_OFFSET, MITSUCAN_ROM_SIZE, MITSUCAN_TARGET, mitsucan_checksum,
    update_mitsucan_checksum, validate_mitsucan_checksum,
};
pub use nissan::{
    NissanAlt2Layout, NissanAlt2Sums, NissanLayout, NissanSums, compute_nissan_alt2_checksum,
    compute_nissan_std_checksum, update_nissan_alt2_checksum, update_nissan_std_checksum,
    validate_nissan_alt2_checksum, validate_nissan_std_checksum,
};
pub use subaru::{
    DensoChecksumEntry, DensoEntryStatus, SUBARU_DENSO_ENTRY_SIZE, SUBARU_DENSO_TARGET,
    SubaruDensoTable, read_subaru_denso_checksums, update_subaru_denso_checksums,
    validate_subaru_denso_checksums,
};

#[allow(unused_imports)]
use log::{debug, warn};
use strum::{Display, EnumString};

use crate::codec::Endianness;
use crate::error::{Error, Result};

/// Generic checksum algorithm families
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, serde::Serialize,
    serde::Deserialize,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumAlgorithm {
    Crc32,
    Sum,
    Xor,
    /// Dispatches to [`ChecksumDefinition::custom`]
    Custom,
}

impl ChecksumAlgorithm {
    /// Parses an algorithm name, failing with
    /// [`Error::UnknownChecksumAlgorithm`]
    pub fn parse(name: &str) -> Result<Self> {
        name.trim()
            .parse()
            .map_err(|_| Error::UnknownChecksumAlgorithm {
                name: name.to_string(),
            })
    }
}

/// Closed set of functions that can back [`ChecksumAlgorithm::Custom`].
///
/// Each is applied to the concatenated region bytes, with the storage slot
/// zeroed.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, serde::Serialize,
    serde::Deserialize,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum CustomChecksum {
    /// Mitsubishi CAN-era 32-bit word sum fixup
    Mitsucan,
    /// Subaru Select Monitor packet byte sum
    Ssm,
    /// Nissan Consult packet byte sum
    Ncs,
    /// Nissan CRC-16/IBM-SDLC without final XOR
    #[strum(to_string = "ncscrc16", serialize = "ncs-crc16")]
    NcsCrc16,
}

impl CustomChecksum {
    pub fn compute(&self, bytes: &[u8]) -> u32 {
        match self {
            CustomChecksum::Mitsucan => mitsucan::mitsucan_fixup(bytes),
            CustomChecksum::Ssm => ssm_checksum(bytes) as u32,
            CustomChecksum::Ncs => ncs_checksum(bytes) as u32,
            CustomChecksum::NcsCrc16 => ncs_crc16(bytes) as u32,
        }
    }
}

/// Half-open byte range `start..end` covered by a checksum
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ChecksumRegion {
    pub start: usize,
    pub end: usize,
}

impl ChecksumRegion {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Checks `start < end <= rom_len`
    pub fn validate(&self, rom_len: usize) -> Result<()> {
        if self.start >= self.end {
            return Err(Error::InvalidRegion {
                start: self.start,
                end: self.end,
            });
        }
        if self.end > rom_len {
            return Err(Error::OutOfBounds {
                offset: self.start,
                length: self.end - self.start,
                buffer_len: rom_len,
            });
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Where the checksum value is stored in the ROM
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ChecksumStorage {
    pub offset: usize,

    /// 1, 2 or 4 bytes
    pub size: usize,
    pub endianness: Endianness,
}

impl ChecksumStorage {
    /// Checks the size is supported and the slot lies within the ROM
    pub fn validate(&self, rom_len: usize) -> Result<()> {
        if !matches!(self.size, 1 | 2 | 4) {
            return Err(Error::InvalidStorageSize { size: self.size });
        }
        match self.offset.checked_add(self.size) {
            Some(end) if end <= rom_len => Ok(()),
            _ => Err(Error::InvalidStorageOffset {
                offset: self.offset,
                size: self.size,
                rom_len,
            }),
        }
    }

    /// Mask of the bits that fit in the slot
    pub fn mask(&self) -> u32 {
        match self.size {
            1 => 0xFF,
            2 => 0xFFFF,
            _ => 0xFFFF_FFFF,
        }
    }
}

/// Describes a single embedded checksum
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ChecksumDefinition {
    pub algorithm: ChecksumAlgorithm,

    /// Concatenated in declaration order before the algorithm runs
    pub regions: Vec<ChecksumRegion>,
    pub storage: ChecksumStorage,

    /// Only used when `algorithm` is [`ChecksumAlgorithm::Custom`]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom: Option<CustomChecksum>,
}

/// Maps an ECUFlash `checksummodule` name to a checksum definition.
///
/// Unrecognised modules give `None` rather than an error, so a definition
/// with a module this crate does not implement still loads.
pub fn definition_for_module(name: &str) -> Option<ChecksumDefinition> {
    match name.trim().to_lowercase().as_str() {
        "mitsucan" => Some(ChecksumDefinition {
            algorithm: ChecksumAlgorithm::Custom,
            regions: vec![ChecksumRegion::new(0, MITSUCAN_ROM_SIZE)],
            storage: ChecksumStorage {
                offset: MITSUCAN_FIXUP_OFFSET,
                size: 4,
                endianness: Endianness::Big,
            },
            custom: Some(CustomChecksum::Mitsucan),
        }),
        other => {
            warn!("Checksum module '{other}' not supported, no checksum will be maintained");
            None
        }
    }
}
