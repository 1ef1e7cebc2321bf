// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Generic checksum recompute/read/write/validate over a
//! [`ChecksumDefinition`]

#[allow(unused_imports)]
use log::{debug, trace};

use crate::checksum::{ChecksumAlgorithm, ChecksumDefinition, crc32, sum8, xor8};
use crate::codec::Endianness;
use crate::error::{Error, Result};

/// Outcome of [`validate_checksum`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ChecksumValidation {
    pub valid: bool,

    /// Recomputed value, truncated to the storage size
    pub expected: u32,

    /// Value currently stored in the ROM
    pub actual: u32,
    pub algorithm: ChecksumAlgorithm,
}

/// Recomputes the checksum described by `def`.
///
/// Works on a copy of `rom` with the storage bytes zeroed, so the result
/// never depends on the previously stored value.  The returned value is not
/// truncated to the storage size.
pub fn recompute_checksum(rom: &[u8], def: &ChecksumDefinition) -> Result<u32> {
    for region in &def.regions {
        region.validate(rom.len())?;
    }
    def.storage.validate(rom.len())?;

    let mut working = rom.to_vec();
    let storage_end = def.storage.offset + def.storage.size;
    working[def.storage.offset..storage_end].fill(0);

    let total: usize = def.regions.iter().map(|r| r.len()).sum();
    let mut data = Vec::with_capacity(total);
    for region in &def.regions {
        data.extend_from_slice(&working[region.start..region.end]);
    }
    trace!(
        "Recomputing {} checksum over {} byte(s) in {} region(s)",
        def.algorithm,
        data.len(),
        def.regions.len()
    );

    let value = match def.algorithm {
        ChecksumAlgorithm::Crc32 => crc32(&data),
        ChecksumAlgorithm::Sum => sum8(&data) as u32,
        ChecksumAlgorithm::Xor => xor8(&data) as u32,
        ChecksumAlgorithm::Custom => def
            .custom
            .ok_or(Error::MissingCustomFunction)?
            .compute(&data),
    };
    Ok(value)
}

/// Reads the value stored in the checksum slot
pub fn read_checksum(rom: &[u8], def: &ChecksumDefinition) -> Result<u32> {
    let storage = &def.storage;
    storage.validate(rom.len())?;

    let bytes = &rom[storage.offset..storage.offset + storage.size];
    let mut value = 0u32;
    match storage.endianness {
        Endianness::Big => {
            for &b in bytes {
                value = (value << 8) | b as u32;
            }
        }
        Endianness::Little => {
            for &b in bytes.iter().rev() {
                value = (value << 8) | b as u32;
            }
        }
    }
    Ok(value)
}

/// Stores `value` in the checksum slot, truncated to the storage size
pub fn write_checksum(rom: &mut [u8], value: u32, def: &ChecksumDefinition) -> Result<()> {
    let storage = &def.storage;
    storage.validate(rom.len())?;

    let be = value.to_be_bytes();
    let slot = &mut rom[storage.offset..storage.offset + storage.size];
    slot.copy_from_slice(&be[4 - storage.size..]);
    if storage.endianness == Endianness::Little {
        slot.reverse();
    }
    debug!(
        "Wrote checksum 0x{:0width$X} at 0x{:X}",
        value & storage.mask(),
        storage.offset,
        width = storage.size * 2
    );
    Ok(())
}

/// Compares the stored checksum with a freshly recomputed one
pub fn validate_checksum(rom: &[u8], def: &ChecksumDefinition) -> Result<ChecksumValidation> {
    let actual = read_checksum(rom, def)?;
    let expected = recompute_checksum(rom, def)? & def.storage.mask();
    Ok(ChecksumValidation {
        valid: expected == actual,
        expected,
        actual,
        algorithm: def.algorithm,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::{ChecksumRegion, ChecksumStorage, CustomChecksum};

    fn def(algorithm: ChecksumAlgorithm, regions: &[(usize, usize)], offset: usize, size: usize) -> ChecksumDefinition {
        ChecksumDefinition {
            algorithm,
            regions: regions
                .iter()
                .map(|&(s, e)| ChecksumRegion::new(s, e))
                .collect(),
            storage: ChecksumStorage {
                offset,
                size,
                endianness: Endianness::Big,
            },
            custom: None,
        }
    }

    #[test]
    fn test_crc32_storage_zeroed() {
        let rom = [0x01, 0x02, 0x03, 0x04, 0xDE, 0xAD, 0xBE, 0xEF];
        let d = def(ChecksumAlgorithm::Crc32, &[(0, 4)], 4, 4);
        assert_eq!(recompute_checksum(&rom, &d).unwrap(), 0xB63C_FBCD);

        // Storage inside the region is zeroed before hashing
        let d = def(ChecksumAlgorithm::Crc32, &[(0, 8)], 4, 4);
        let zeroed = [0x01, 0x02, 0x03, 0x04, 0, 0, 0, 0];
        assert_eq!(recompute_checksum(&rom, &d).unwrap(), crc32(&zeroed));
    }

    #[test]
    fn test_recompute_does_not_mutate() {
        let rom = vec![0xAAu8; 16];
        let d = def(ChecksumAlgorithm::Sum, &[(0, 16)], 15, 1);
        let before = rom.clone();
        recompute_checksum(&rom, &d).unwrap();
        assert_eq!(rom, before);
    }

    #[test]
    fn test_regions_concatenated_in_order() {
        let rom = [1u8, 2, 3, 4, 5, 6, 7, 8];
        let d = def(ChecksumAlgorithm::Crc32, &[(4, 6), (0, 2)], 7, 1);
        assert_eq!(recompute_checksum(&rom, &d).unwrap(), crc32(&[5, 6, 1, 2]));
    }

    #[test]
    fn test_write_read_sizes_and_endianness() {
        let mut rom = [0u8; 8];
        let mut d = def(ChecksumAlgorithm::Sum, &[(0, 4)], 4, 4);
        write_checksum(&mut rom, 0x1234_5678, &d).unwrap();
        assert_eq!(&rom[4..], &[0x12, 0x34, 0x56, 0x78]);
        assert_eq!(read_checksum(&rom, &d).unwrap(), 0x1234_5678);

        d.storage.endianness = Endianness::Little;
        write_checksum(&mut rom, 0x1234_5678, &d).unwrap();
        assert_eq!(&rom[4..], &[0x78, 0x56, 0x34, 0x12]);
        assert_eq!(read_checksum(&rom, &d).unwrap(), 0x1234_5678);

        d.storage.size = 2;
        d.storage.offset = 6;
        write_checksum(&mut rom, 0xABCD_EF01, &d).unwrap();
        assert_eq!(&rom[6..], &[0x01, 0xEF]);
        assert_eq!(read_checksum(&rom, &d).unwrap(), 0xEF01);

        d.storage.size = 1;
        d.storage.offset = 7;
        write_checksum(&mut rom, 0x1FF, &d).unwrap();
        assert_eq!(rom[7], 0xFF);
    }

    #[test]
    fn test_storage_out_of_range() {
        let mut rom = [0u8; 4];
        let d = def(ChecksumAlgorithm::Sum, &[(0, 2)], 3, 2);
        assert_eq!(
            write_checksum(&mut rom, 1, &d),
            Err(Error::InvalidStorageOffset {
                offset: 3,
                size: 2,
                rom_len: 4
            })
        );
        assert!(matches!(
            read_checksum(&rom, &d),
            Err(Error::InvalidStorageOffset { .. })
        ));
    }

    #[test]
    fn test_invalid_regions() {
        let rom = [0u8; 8];
        let d = def(ChecksumAlgorithm::Xor, &[(4, 2)], 7, 1);
        assert_eq!(
            recompute_checksum(&rom, &d),
            Err(Error::InvalidRegion { start: 4, end: 2 })
        );
        let d = def(ChecksumAlgorithm::Xor, &[(0, 9)], 7, 1);
        assert!(matches!(
            recompute_checksum(&rom, &d),
            Err(Error::OutOfBounds { .. })
        ));
    }

    #[test]
    fn test_custom_requires_function() {
        let rom = [0u8; 8];
        let mut d = def(ChecksumAlgorithm::Custom, &[(0, 7)], 7, 1);
        assert_eq!(recompute_checksum(&rom, &d), Err(Error::MissingCustomFunction));

        d.custom = Some(CustomChecksum::Ssm);
        let rom = [1u8, 2, 3, 4, 5, 6, 7, 0];
        // SSM ignores the final byte of the concatenated data
        assert_eq!(recompute_checksum(&rom, &d).unwrap(), 1 + 2 + 3 + 4 + 5 + 6);
    }

    #[test]
    fn test_validate_round_trip_and_corruption() {
        for algorithm in [ChecksumAlgorithm::Crc32, ChecksumAlgorithm::Sum, ChecksumAlgorithm::Xor] {
            for size in [1usize, 2, 4] {
                let mut rom: Vec<u8> = (0..64u32).map(|i| (i * 37 + 11) as u8).collect();
                let d = def(algorithm, &[(0, 16), (32, 64)], 20, size);
                let value = recompute_checksum(&rom, &d).unwrap();
                write_checksum(&mut rom, value, &d).unwrap();

                let result = validate_checksum(&rom, &d).unwrap();
                assert!(result.valid, "{algorithm} size {size}");
                assert_eq!(result.algorithm, algorithm);
                assert_eq!(result.expected, result.actual);

                // Flip one byte in each covered region
                for offset in [3usize, 40] {
                    let mut corrupt = rom.clone();
                    corrupt[offset] ^= 0x01;
                    assert!(!validate_checksum(&corrupt, &d).unwrap().valid);
                }

                // Bytes outside the regions do not matter
                let mut untouched = rom.clone();
                untouched[25] ^= 0xFF;
                assert!(validate_checksum(&untouched, &d).unwrap().valid);
            }
        }
    }
}
