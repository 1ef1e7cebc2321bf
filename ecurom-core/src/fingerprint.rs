// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Matching raw ROM images to definitions

#[allow(unused_imports)]
use log::{debug, trace};

use crate::definition::{RomDefinitionStub, RomFingerprint};

/// Strips anything that is not a hex digit and lower-cases the rest
pub fn normalize_hex(text: &str) -> String {
    text.chars()
        .filter(char::is_ascii_hexdigit)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Sums the weights of every read whose bytes match the expectation.
///
/// Reads with an empty expectation, zero length or an out-of-range address
/// are skipped, as are expectations that are not valid hex.
pub fn score_rom_fingerprint(rom: &[u8], fingerprint: &RomFingerprint) -> u32 {
    let mut score = 0u32;
    for (index, (read, expected)) in fingerprint
        .reads()
        .iter()
        .zip(fingerprint.expected_hex())
        .enumerate()
    {
        let expected = normalize_hex(expected);
        if expected.is_empty() || read.length == 0 {
            continue;
        }
        let Some(actual) = read
            .address
            .checked_add(read.length)
            .filter(|&end| end <= rom.len())
            .map(|end| &rom[read.address..end])
        else {
            trace!("Fingerprint read at 0x{:X} is outside the ROM", read.address);
            continue;
        };
        let Ok(expected) = hex::decode(&expected) else {
            trace!("Fingerprint value '{expected}' is not whole bytes of hex");
            continue;
        };
        if expected == actual {
            score = score.saturating_add(fingerprint.weight(index));
        }
    }
    score
}

/// Best score across all of a definition's fingerprints
pub fn score_rom_definition(rom: &[u8], stub: &RomDefinitionStub) -> u32 {
    stub.fingerprints
        .iter()
        .map(|fp| score_rom_fingerprint(rom, fp))
        .max()
        .unwrap_or(0)
}

/// Picks the highest scoring candidate.
///
/// Ties go to the candidate seen first.  Returns `None` if no candidate
/// scores above zero.
pub fn best_match<'a, I>(rom: &[u8], candidates: I) -> Option<(&'a RomDefinitionStub, u32)>
where
    I: IntoIterator<Item = &'a RomDefinitionStub>,
{
    let mut best: Option<(&RomDefinitionStub, u32)> = None;
    for stub in candidates {
        let score = score_rom_definition(rom, stub);
        trace!("Definition {} scored {score}", stub.name);
        if score > best.map_or(0, |(_, s)| s) {
            best = Some((stub, score));
        }
    }
    if let Some((stub, score)) = best {
        debug!("Best match {} with score {score}", stub.name);
    }
    best
}
