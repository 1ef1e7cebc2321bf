// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Mitsubishi CAN-era ROM checksum
//!
//! The image is a sequence of big-endian 32-bit words.  One word, at
//! [`MITSUCAN_FIXUP_OFFSET`], is a fixup chosen so that the sum of every
//! other word plus the fixup equals [`MITSUCAN_TARGET`].

#[allow(unused_imports)]
use log::{debug, warn};

use crate::codec::read_u32_be;
use crate::error::{Error, Result};

/// Size of the image the checksum covers
pub const MITSUCAN_ROM_SIZE: usize = 0x10_0000;

/// Location of the 32-bit fixup word
pub const MITSUCAN_FIXUP_OFFSET: usize = 0x0B_FFF0;

pub const MITSUCAN_TARGET: u32 = 0x5AA5_5AA5;

// Fixup over an arbitrary slice.  Words at or beyond the fixup offset are
// only skipped when the slice actually reaches it.
pub(super) fn mitsucan_fixup(bytes: &[u8]) -> u32 {
    let sum = bytes
        .chunks_exact(4)
        .enumerate()
        .filter(|(ii, _)| ii * 4 != MITSUCAN_FIXUP_OFFSET)
        .fold(0u32, |acc, (_, word)| {
            acc.wrapping_add(u32::from_be_bytes([word[0], word[1], word[2], word[3]]))
        });
    MITSUCAN_TARGET.wrapping_sub(sum)
}

fn check_size(rom: &[u8]) -> Result<()> {
    if rom.len() < MITSUCAN_ROM_SIZE {
        return Err(Error::OutOfBounds {
            offset: 0,
            length: MITSUCAN_ROM_SIZE,
            buffer_len: rom.len(),
        });
    }
    Ok(())
}

/// Computes the fixup word for `rom`.  Only the first
/// [`MITSUCAN_ROM_SIZE`] bytes are covered.
pub fn mitsucan_checksum(rom: &[u8]) -> Result<u32> {
    check_size(rom)?;
    Ok(mitsucan_fixup(&rom[..MITSUCAN_ROM_SIZE]))
}

/// Writes the fixup word, returning the value written
pub fn update_mitsucan_checksum(rom: &mut [u8]) -> Result<u32> {
    let fixup = mitsucan_checksum(rom)?;
    rom[MITSUCAN_FIXUP_OFFSET..MITSUCAN_FIXUP_OFFSET + 4].copy_from_slice(&fixup.to_be_bytes());
    debug!("Mitsucan fixup 0x{fixup:08X} written at 0x{MITSUCAN_FIXUP_OFFSET:06X}");
    Ok(fixup)
}

/// Whether the stored fixup word matches the recomputed one
pub fn validate_mitsucan_checksum(rom: &[u8]) -> Result<bool> {
    let expected = mitsucan_checksum(rom)?;
    let stored = read_u32_be(rom, MITSUCAN_FIXUP_OFFSET)?;
    if stored != expected {
        debug!("Mitsucan fixup mismatch: stored 0x{stored:08X}, expected 0x{expected:08X}");
    }
    Ok(stored == expected)
}
