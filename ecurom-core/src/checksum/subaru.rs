// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Subaru/Denso ROM-resident checksum table
//!
//! The ROM carries a table of 12-byte big-endian entries, each describing a
//! half-open word-aligned range and the 32-bit value that makes the range's
//! word sum reach [`SUBARU_DENSO_TARGET`].
//!
//! An entry of `{0, 0, SUBARU_DENSO_TARGET}` means every checksum in the
//! table is disabled.  It is reported as [`DensoEntryStatus::Disabled`], is
//! never rewritten, and ends processing of the table.

use deku::prelude::*;
#[allow(unused_imports)]
use log::{debug, trace, warn};
use static_assertions::const_assert_eq;

use crate::error::{Error, Result, check_range};

pub const SUBARU_DENSO_TARGET: u32 = 0x5AA5_A55A;

pub const SUBARU_DENSO_ENTRY_SIZE: usize = 12;
const_assert_eq!(
    core::mem::size_of::<DensoChecksumEntry>(),
    SUBARU_DENSO_ENTRY_SIZE
);

/// One entry of the checksum table, as stored in the ROM
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, DekuRead, DekuWrite, serde::Serialize, serde::Deserialize,
)]
#[deku(endian = "big")]
pub struct DensoChecksumEntry {
    pub start: u32,

    /// Exclusive
    pub end: u32,
    pub checksum: u32,
}

impl DensoChecksumEntry {
    /// The "all checksums disabled" marker
    pub fn is_disabled_marker(&self) -> bool {
        self.start == 0 && self.end == 0 && self.checksum == SUBARU_DENSO_TARGET
    }

    /// Covers no bytes
    pub fn is_empty(&self) -> bool {
        self.start == 0 && self.end == 0
    }

    /// Value this entry should hold for the current contents of `rom`
    pub fn expected(&self, rom: &[u8]) -> Result<u32> {
        let (start, end) = self.range(rom.len())?;
        let sum = rom[start..end]
            .chunks_exact(4)
            .fold(0u32, |acc, w| {
                acc.wrapping_add(u32::from_be_bytes([w[0], w[1], w[2], w[3]]))
            });
        Ok(SUBARU_DENSO_TARGET.wrapping_sub(sum))
    }

    fn range(&self, rom_len: usize) -> Result<(usize, usize)> {
        let start = self.start as usize;
        let end = self.end as usize;
        for address in [start, end] {
            if address % 4 != 0 {
                return Err(Error::MisalignedAddress {
                    address,
                    alignment: 4,
                });
            }
        }
        if start >= end {
            return Err(Error::InvalidRegion { start, end });
        }
        check_range(start, end - start, rom_len)?;
        Ok((start, end))
    }
}

/// Per-entry result of validating or updating the table
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum DensoEntryStatus {
    Valid,
    Invalid { expected: u32, actual: u32 },

    /// The disabled marker was found
    Disabled,

    /// `{0, 0}` entry with no checksum to maintain
    Empty,
}

impl DensoEntryStatus {
    /// Numeric status: 1 valid or empty, 0 invalid, -1 disabled
    pub fn code(&self) -> i32 {
        match self {
            DensoEntryStatus::Valid | DensoEntryStatus::Empty => 1,
            DensoEntryStatus::Invalid { .. } => 0,
            DensoEntryStatus::Disabled => -1,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.code() != 0
    }
}

/// Location of the checksum table within a ROM
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SubaruDensoTable {
    pub offset: usize,

    /// Number of 12-byte entries
    pub entries: usize,
}

impl SubaruDensoTable {
    pub fn new(offset: usize, entries: usize) -> Self {
        Self { offset, entries }
    }

    fn entry_offset(&self, index: usize) -> usize {
        self.offset + index * SUBARU_DENSO_ENTRY_SIZE
    }

    fn check(&self, rom_len: usize) -> Result<()> {
        let length = self
            .entries
            .checked_mul(SUBARU_DENSO_ENTRY_SIZE)
            .ok_or_else(|| Error::out_of_bounds(self.offset, usize::MAX, rom_len))?;
        check_range(self.offset, length, rom_len).map(|_| ())
    }
}

fn decode_entry(rom: &[u8], offset: usize) -> Result<DensoChecksumEntry> {
    let bytes = &rom[offset..offset + SUBARU_DENSO_ENTRY_SIZE];
    DensoChecksumEntry::from_bytes((bytes, 0))
        .map(|(_, entry)| entry)
        .map_err(|e| Error::invalid_definition(format!("Bad checksum entry at 0x{offset:X}: {e}")))
}

/// Decodes every entry of the table, including any past the disabled marker
pub fn read_subaru_denso_checksums(
    rom: &[u8],
    table: &SubaruDensoTable,
) -> Result<Vec<DensoChecksumEntry>> {
    table.check(rom.len())?;
    (0..table.entries)
        .map(|ii| decode_entry(rom, table.entry_offset(ii)))
        .collect()
}

/// Checks each entry against the current ROM contents.
///
/// Stops after a disabled marker, so the returned list may be shorter than
/// the table.
pub fn validate_subaru_denso_checksums(
    rom: &[u8],
    table: &SubaruDensoTable,
) -> Result<Vec<DensoEntryStatus>> {
    let mut statuses = Vec::with_capacity(table.entries);
    for entry in read_subaru_denso_checksums(rom, table)? {
        if entry.is_disabled_marker() {
            debug!("Subaru/Denso checksums disabled");
            statuses.push(DensoEntryStatus::Disabled);
            break;
        }
        if entry.is_empty() {
            statuses.push(DensoEntryStatus::Empty);
            continue;
        }
        let expected = entry.expected(rom)?;
        statuses.push(if expected == entry.checksum {
            DensoEntryStatus::Valid
        } else {
            trace!(
                "Entry 0x{:X}-0x{:X}: stored 0x{:08X}, expected 0x{expected:08X}",
                entry.start, entry.end, entry.checksum
            );
            DensoEntryStatus::Invalid {
                expected,
                actual: entry.checksum,
            }
        });
    }
    Ok(statuses)
}

/// Rewrites the checksum field of every live entry.
///
/// All entry ranges are checked before any byte is written.  The disabled
/// marker is left as is.
pub fn update_subaru_denso_checksums(
    rom: &mut [u8],
    table: &SubaruDensoTable,
) -> Result<Vec<DensoEntryStatus>> {
    let entries = read_subaru_denso_checksums(rom, table)?;
    let live = entries
        .iter()
        .position(DensoChecksumEntry::is_disabled_marker)
        .unwrap_or(entries.len());
    for entry in entries[..live].iter().filter(|e| !e.is_empty()) {
        entry.range(rom.len())?;
    }

    let mut statuses = Vec::with_capacity(table.entries);
    for (ii, entry) in entries.iter().enumerate().take(live) {
        if entry.is_empty() {
            statuses.push(DensoEntryStatus::Empty);
            continue;
        }
        let updated = DensoChecksumEntry {
            checksum: entry.expected(rom)?,
            ..*entry
        };
        let bytes = updated
            .to_bytes()
            .map_err(|e| Error::invalid_definition(format!("Failed to encode entry: {e}")))?;
        let offset = table.entry_offset(ii);
        rom[offset..offset + SUBARU_DENSO_ENTRY_SIZE].copy_from_slice(&bytes);
        debug!(
            "Entry {ii} 0x{:X}-0x{:X} checksum 0x{:08X}",
            updated.start, updated.end, updated.checksum
        );
        statuses.push(DensoEntryStatus::Valid);
    }
    if live < entries.len() {
        statuses.push(DensoEntryStatus::Disabled);
    }
    Ok(statuses)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: usize = 0x100;

    fn put_entry(rom: &mut [u8], index: usize, start: u32, end: u32, checksum: u32) {
        let offset = TABLE + index * SUBARU_DENSO_ENTRY_SIZE;
        rom[offset..offset + 4].copy_from_slice(&start.to_be_bytes());
        rom[offset + 4..offset + 8].copy_from_slice(&end.to_be_bytes());
        rom[offset + 8..offset + 12].copy_from_slice(&checksum.to_be_bytes());
    }

    fn word_sum(rom: &[u8], start: usize, end: usize) -> u32 {
        rom[start..end]
            .chunks_exact(4)
            .fold(0u32, |acc, w| acc.wrapping_add(u32::from_be_bytes(w.try_into().unwrap())))
    }

    fn test_rom() -> Vec<u8> {
        let mut rom: Vec<u8> = (0..0x200u32).map(|i| (i * 7 + 3) as u8).collect();
        rom[TABLE..TABLE + 3 * SUBARU_DENSO_ENTRY_SIZE].fill(0);
        put_entry(&mut rom, 0, 0x000, 0x080, 0);
        put_entry(&mut rom, 1, 0x180, 0x200, 0xDEAD_BEEF);
        rom
    }

    #[test]
    fn test_read_entries() {
        let rom = test_rom();
        let entries = read_subaru_denso_checksums(&rom, &SubaruDensoTable::new(TABLE, 3)).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(
            entries[1],
            DensoChecksumEntry {
                start: 0x180,
                end: 0x200,
                checksum: 0xDEAD_BEEF
            }
        );
        assert!(entries[2].is_empty());
    }

    #[test]
    fn test_update_satisfies_target() {
        let mut rom = test_rom();
        let table = SubaruDensoTable::new(TABLE, 3);
        let statuses = update_subaru_denso_checksums(&mut rom, &table).unwrap();
        assert_eq!(
            statuses,
            vec![
                DensoEntryStatus::Valid,
                DensoEntryStatus::Valid,
                DensoEntryStatus::Empty
            ]
        );

        for entry in read_subaru_denso_checksums(&rom, &table).unwrap() {
            if entry.is_empty() {
                continue;
            }
            let sum = word_sum(&rom, entry.start as usize, entry.end as usize);
            assert_eq!(
                SUBARU_DENSO_TARGET
                    .wrapping_sub(entry.checksum)
                    .wrapping_sub(sum),
                0
            );
        }
        assert!(
            validate_subaru_denso_checksums(&rom, &table)
                .unwrap()
                .iter()
                .all(DensoEntryStatus::is_ok)
        );
    }

    #[test]
    fn test_validate_detects_change() {
        let mut rom = test_rom();
        let table = SubaruDensoTable::new(TABLE, 2);
        update_subaru_denso_checksums(&mut rom, &table).unwrap();
        rom[0x10] ^= 0x01;
        let statuses = validate_subaru_denso_checksums(&rom, &table).unwrap();
        assert!(matches!(statuses[0], DensoEntryStatus::Invalid { .. }));
        assert_eq!(statuses[0].code(), 0);
        assert_eq!(statuses[1], DensoEntryStatus::Valid);
    }

    #[test]
    fn test_disabled_marker_untouched() {
        let mut rom = test_rom();
        put_entry(&mut rom, 0, 0, 0, SUBARU_DENSO_TARGET);
        let table = SubaruDensoTable::new(TABLE, 3);
        let before = rom.clone();

        let statuses = validate_subaru_denso_checksums(&rom, &table).unwrap();
        assert_eq!(statuses, vec![DensoEntryStatus::Disabled]);
        assert_eq!(statuses[0].code(), -1);

        let statuses = update_subaru_denso_checksums(&mut rom, &table).unwrap();
        assert_eq!(statuses, vec![DensoEntryStatus::Disabled]);
        assert_eq!(rom, before);
    }

    #[test]
    fn test_entries_before_marker_updated() {
        let mut rom = test_rom();
        put_entry(&mut rom, 1, 0, 0, SUBARU_DENSO_TARGET);
        let table = SubaruDensoTable::new(TABLE, 3);
        let statuses = update_subaru_denso_checksums(&mut rom, &table).unwrap();
        assert_eq!(
            statuses,
            vec![DensoEntryStatus::Valid, DensoEntryStatus::Disabled]
        );
        let entries = read_subaru_denso_checksums(&rom, &table).unwrap();
        assert!(entries[1].is_disabled_marker());
    }

    #[test]
    fn test_bad_entries() {
        let mut rom = test_rom();
        put_entry(&mut rom, 0, 0x002, 0x080, 0);
        let table = SubaruDensoTable::new(TABLE, 1);
        let before = rom.clone();
        assert_eq!(
            update_subaru_denso_checksums(&mut rom, &table),
            Err(Error::MisalignedAddress {
                address: 2,
                alignment: 4
            })
        );
        assert_eq!(rom, before);

        put_entry(&mut rom, 0, 0x080, 0x040, 0);
        assert_eq!(
            validate_subaru_denso_checksums(&rom, &table),
            Err(Error::InvalidRegion {
                start: 0x80,
                end: 0x40
            })
        );

        put_entry(&mut rom, 0, 0x000, 0x400, 0);
        assert!(matches!(
            validate_subaru_denso_checksums(&rom, &table),
            Err(Error::OutOfBounds { .. })
        ));
    }

    #[test]
    fn test_table_out_of_range() {
        let rom = test_rom();
        assert!(matches!(
            read_subaru_denso_checksums(&rom, &SubaruDensoTable::new(0x1F8, 2)),
            Err(Error::OutOfBounds { .. })
        ));
    }
}
