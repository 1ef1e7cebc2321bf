// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Nissan ROM checksums
//!
//! The STD/ALT layouts keep a 32-bit word sum and a 32-bit word XOR of a
//! region, each stored big-endian at its own location inside or outside the
//! region.  The stored words never contribute to their own values.
//!
//! ALT2 adds two 16-bit sums on top: a calibration sum stored at the start of
//! the region, and a code sum stored at a separate skip location.

#[allow(unused_imports)]
use log::{debug, trace};

use crate::codec::{read_u16_be, read_u32_be};
use crate::error::{Error, Result, check_range};

/// Region and storage locations for the STD/ALT schemes
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct NissanLayout {
    pub start: usize,

    /// Exclusive
    pub end: usize,
    pub sumloc: usize,
    pub xorloc: usize,
}

/// Region and storage locations for the ALT2 scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct NissanAlt2Layout {
    pub start: usize,

    /// Exclusive
    pub end: usize,
    pub sumloc: usize,
    pub xorloc: usize,

    /// Excluded from the 32-bit sums; the code sum is stored here
    pub skiploc: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct NissanSums {
    pub sum: u32,
    pub xor: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct NissanAlt2Sums {
    pub sum: u32,
    pub xor: u32,
    pub calibration: u16,
    pub code: u16,
}

fn check_aligned(addresses: &[usize]) -> Result<()> {
    match addresses.iter().find(|&&a| a % 4 != 0) {
        Some(&address) => Err(Error::MisalignedAddress {
            address,
            alignment: 4,
        }),
        None => Ok(()),
    }
}

fn check_region(start: usize, end: usize, rom_len: usize) -> Result<()> {
    if start >= end {
        return Err(Error::InvalidRegion { start, end });
    }
    check_range(start, end - start, rom_len).map(|_| ())
}

fn word_at(rom: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([rom[offset], rom[offset + 1], rom[offset + 2], rom[offset + 3]])
}

fn half_at(rom: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([rom[offset], rom[offset + 1]])
}

// 32-bit sum and xor over `from..end`, skipping the given word locations
fn sum_and_xor(rom: &[u8], from: usize, end: usize, skip: &[usize]) -> NissanSums {
    let mut sums = NissanSums { sum: 0, xor: 0 };
    for offset in (from..end).step_by(4) {
        if skip.contains(&offset) {
            continue;
        }
        let word = word_at(rom, offset);
        sums.sum = sums.sum.wrapping_add(word);
        sums.xor ^= word;
    }
    sums
}

fn halves(value: u32) -> u16 {
    ((value >> 16) as u16).wrapping_add(value as u16)
}

impl NissanLayout {
    fn check(&self, rom_len: usize) -> Result<()> {
        check_aligned(&[self.start, self.end, self.sumloc, self.xorloc])?;
        check_region(self.start, self.end, rom_len)?;
        check_range(self.sumloc, 4, rom_len)?;
        check_range(self.xorloc, 4, rom_len)?;
        Ok(())
    }
}

impl NissanAlt2Layout {
    fn check(&self, rom_len: usize) -> Result<()> {
        check_aligned(&[self.start, self.end, self.sumloc, self.xorloc, self.skiploc])?;
        check_region(self.start, self.end, rom_len)?;
        check_range(self.sumloc, 4, rom_len)?;
        check_range(self.xorloc, 4, rom_len)?;
        let skip_end = check_range(self.skiploc, 4, rom_len)?;
        if self.skiploc <= self.start || skip_end > self.end {
            return Err(Error::InvalidRegion {
                start: self.skiploc,
                end: self.end,
            });
        }
        Ok(())
    }
}

/// Computes the STD/ALT sum and XOR
pub fn compute_nissan_std_checksum(rom: &[u8], layout: &NissanLayout) -> Result<NissanSums> {
    layout.check(rom.len())?;
    Ok(sum_and_xor(
        rom,
        layout.start,
        layout.end,
        &[layout.sumloc, layout.xorloc],
    ))
}

/// Writes the STD/ALT sum and XOR, returning them
pub fn update_nissan_std_checksum(rom: &mut [u8], layout: &NissanLayout) -> Result<NissanSums> {
    let sums = compute_nissan_std_checksum(rom, layout)?;
    rom[layout.sumloc..layout.sumloc + 4].copy_from_slice(&sums.sum.to_be_bytes());
    rom[layout.xorloc..layout.xorloc + 4].copy_from_slice(&sums.xor.to_be_bytes());
    debug!(
        "Nissan sum 0x{:08X} at 0x{:X}, xor 0x{:08X} at 0x{:X}",
        sums.sum, layout.sumloc, sums.xor, layout.xorloc
    );
    Ok(sums)
}

pub fn validate_nissan_std_checksum(rom: &[u8], layout: &NissanLayout) -> Result<bool> {
    let expected = compute_nissan_std_checksum(rom, layout)?;
    let stored = NissanSums {
        sum: read_u32_be(rom, layout.sumloc)?,
        xor: read_u32_be(rom, layout.xorloc)?,
    };
    trace!("Nissan STD stored {stored:?}, expected {expected:?}");
    Ok(stored == expected)
}

/// Computes all four ALT2 values.
///
/// The calibration sum walks 16-bit words from `start + 2` up to `skiploc`.
/// When it reaches `sumloc` or `xorloc` it adds the two halves of the newly
/// computed sum or XOR instead of the stored bytes, so the result matches the
/// image after [`update_nissan_alt2_checksum`].
pub fn compute_nissan_alt2_checksum(
    rom: &[u8],
    layout: &NissanAlt2Layout,
) -> Result<NissanAlt2Sums> {
    layout.check(rom.len())?;

    let NissanSums { sum, xor } = sum_and_xor(
        rom,
        layout.start + 4,
        layout.end,
        &[layout.sumloc, layout.xorloc, layout.skiploc],
    );

    let mut calibration = 0u16;
    let mut offset = layout.start + 2;
    while offset < layout.skiploc {
        if offset == layout.sumloc {
            calibration = calibration.wrapping_add(halves(sum));
            offset += 4;
        } else if offset == layout.xorloc {
            calibration = calibration.wrapping_add(halves(xor));
            offset += 4;
        } else {
            calibration = calibration.wrapping_add(half_at(rom, offset));
            offset += 2;
        }
    }

    let code = (layout.skiploc + 2..layout.end)
        .step_by(2)
        .fold(0u16, |acc, offset| acc.wrapping_add(half_at(rom, offset)));

    Ok(NissanAlt2Sums {
        sum,
        xor,
        calibration,
        code,
    })
}

/// Writes all four ALT2 values, returning them
pub fn update_nissan_alt2_checksum(
    rom: &mut [u8],
    layout: &NissanAlt2Layout,
) -> Result<NissanAlt2Sums> {
    let sums = compute_nissan_alt2_checksum(rom, layout)?;
    rom[layout.sumloc..layout.sumloc + 4].copy_from_slice(&sums.sum.to_be_bytes());
    rom[layout.xorloc..layout.xorloc + 4].copy_from_slice(&sums.xor.to_be_bytes());
    rom[layout.start..layout.start + 2].copy_from_slice(&sums.calibration.to_be_bytes());
    rom[layout.skiploc..layout.skiploc + 2].copy_from_slice(&sums.code.to_be_bytes());
    debug!("Nissan ALT2 {sums:?} written");
    Ok(sums)
}

pub fn validate_nissan_alt2_checksum(rom: &[u8], layout: &NissanAlt2Layout) -> Result<bool> {
    let expected = compute_nissan_alt2_checksum(rom, layout)?;
    let stored = NissanAlt2Sums {
        sum: read_u32_be(rom, layout.sumloc)?,
        xor: read_u32_be(rom, layout.xorloc)?,
        calibration: read_u16_be(rom, layout.start)?,
        code: read_u16_be(rom, layout.skiploc)?,
    };
    trace!("Nissan ALT2 stored {stored:?}, expected {expected:?}");
    Ok(stored == expected)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(len: usize) -> Vec<u8> {
        (0..len as u32).map(|i| (i * 13 + 5) as u8).collect()
    }

    #[test]
    fn test_std_small_vector() {
        let mut rom = vec![0u8; 16];
        rom[0..4].copy_from_slice(&0x0000_0001u32.to_be_bytes());
        rom[4..8].copy_from_slice(&0x0000_0010u32.to_be_bytes());
        rom[8..12].copy_from_slice(&0xFFFF_FFFFu32.to_be_bytes());
        rom[12..16].copy_from_slice(&0xFFFF_FFFFu32.to_be_bytes());
        let layout = NissanLayout {
            start: 0,
            end: 16,
            sumloc: 8,
            xorloc: 12,
        };
        let sums = compute_nissan_std_checksum(&rom, &layout).unwrap();
        assert_eq!(sums, NissanSums { sum: 0x11, xor: 0x11 });

        update_nissan_std_checksum(&mut rom, &layout).unwrap();
        assert_eq!(&rom[8..12], &[0, 0, 0, 0x11]);
        assert!(validate_nissan_std_checksum(&rom, &layout).unwrap());
    }

    #[test]
    fn test_std_round_trip() {
        let mut rom = pattern(0x400);
        let layout = NissanLayout {
            start: 0x100,
            end: 0x400,
            sumloc: 0x3F8,
            xorloc: 0x3FC,
        };
        assert!(!validate_nissan_std_checksum(&rom, &layout).unwrap());
        update_nissan_std_checksum(&mut rom, &layout).unwrap();
        assert!(validate_nissan_std_checksum(&rom, &layout).unwrap());

        // Outside the region
        rom[0x10] ^= 0xFF;
        assert!(validate_nissan_std_checksum(&rom, &layout).unwrap());
        rom[0x200] ^= 0x01;
        assert!(!validate_nissan_std_checksum(&rom, &layout).unwrap());
    }

    #[test]
    fn test_std_rejects_bad_layout() {
        let rom = pattern(0x100);
        let layout = NissanLayout {
            start: 0,
            end: 0x100,
            sumloc: 0x42,
            xorloc: 0x44,
        };
        assert_eq!(
            compute_nissan_std_checksum(&rom, &layout),
            Err(Error::MisalignedAddress {
                address: 0x42,
                alignment: 4
            })
        );
        let layout = NissanLayout {
            start: 0,
            end: 0x200,
            sumloc: 0x40,
            xorloc: 0x44,
        };
        assert!(matches!(
            compute_nissan_std_checksum(&rom, &layout),
            Err(Error::OutOfBounds { .. })
        ));
    }

    #[test]
    fn test_alt2_small_vector() {
        // start 0, sumloc 4, xorloc 8, skiploc 16, end 24
        let mut rom = vec![0u8; 24];
        rom[12..16].copy_from_slice(&0x0001_0002u32.to_be_bytes());
        rom[20..24].copy_from_slice(&0x0003_0004u32.to_be_bytes());
        let layout = NissanAlt2Layout {
            start: 0,
            end: 24,
            sumloc: 4,
            xorloc: 8,
            skiploc: 16,
        };
        let sums = compute_nissan_alt2_checksum(&rom, &layout).unwrap();
        assert_eq!(sums.sum, 0x0004_0006);
        assert_eq!(sums.xor, 0x0002_0006);
        // 0 (start+2) + (4 + 6) + (2 + 6) + 1 + 2
        assert_eq!(sums.calibration, 21);
        // 0 (skiploc+2) + 3 + 4
        assert_eq!(sums.code, 7);

        update_nissan_alt2_checksum(&mut rom, &layout).unwrap();
        assert_eq!(&rom[0..2], &[0, 21]);
        assert_eq!(&rom[16..18], &[0, 7]);
        assert!(validate_nissan_alt2_checksum(&rom, &layout).unwrap());
    }

    #[test]
    fn test_alt2_round_trip() {
        let mut rom = pattern(0x800);
        let layout = NissanAlt2Layout {
            start: 0x000,
            end: 0x800,
            sumloc: 0x100,
            xorloc: 0x104,
            skiploc: 0x400,
        };
        update_nissan_alt2_checksum(&mut rom, &layout).unwrap();
        assert!(validate_nissan_alt2_checksum(&rom, &layout).unwrap());

        // Second update is stable
        let before = rom.clone();
        update_nissan_alt2_checksum(&mut rom, &layout).unwrap();
        assert_eq!(rom, before);

        for offset in [0x010, 0x600] {
            let mut corrupt = rom.clone();
            corrupt[offset] ^= 0x04;
            assert!(!validate_nissan_alt2_checksum(&corrupt, &layout).unwrap());
        }
    }

    #[test]
    fn test_alt2_skiploc_past_address_space() {
        let mut rom = pattern(0x100);
        let layout = NissanAlt2Layout {
            start: 0,
            end: 0x80,
            sumloc: 0x10,
            xorloc: 0x14,
            skiploc: usize::MAX - 3,
        };
        assert!(matches!(
            compute_nissan_alt2_checksum(&rom, &layout),
            Err(Error::OutOfBounds { .. })
        ));
        let before = rom.clone();
        assert!(update_nissan_alt2_checksum(&mut rom, &layout).is_err());
        assert_eq!(rom, before);
    }

    #[test]
    fn test_alt2_skiploc_outside_region() {
        let rom = pattern(0x100);
        let layout = NissanAlt2Layout {
            start: 0,
            end: 0x80,
            sumloc: 0x10,
            xorloc: 0x14,
            skiploc: 0x80,
        };
        assert_eq!(
            compute_nissan_alt2_checksum(&rom, &layout),
            Err(Error::InvalidRegion {
                start: 0x80,
                end: 0x80
            })
        );
    }
}
