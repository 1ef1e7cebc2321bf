// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

use anyhow::{Context, Result, bail};
use chrono::Local;
#[allow(unused_imports)]
use log::{debug, info, warn};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use ecurom_common::args::TableEdit;
use ecurom_core::checksum::{
    DensoEntryStatus, NissanAlt2Sums, NissanSums, update_nissan_alt2_checksum,
    update_nissan_std_checksum, update_subaru_denso_checksums,
};
use ecurom_core::{
    CellEdit, CellPatch, ChecksumAlgorithm, RomDefinition, TableViewMut, ValueMode,
    recompute_checksum, write_checksum,
};

use crate::config::Config;

/// A cell edit as written to the ROM
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedEdit {
    pub table: String,
    pub row: usize,
    pub col: usize,
    pub patch: CellPatch,
}

/// Applies `edits` to `rom`.
///
/// Edits are grouped by table, in the order each table first appears.  If
/// any edit fails `rom` is left untouched.
pub fn apply_edits(
    rom: &mut [u8],
    def: &RomDefinition,
    edits: &[TableEdit],
    mode: ValueMode,
) -> Result<Vec<AppliedEdit>> {
    let mut groups: Vec<(&str, Vec<CellEdit>)> = Vec::new();
    for edit in edits {
        let cell = CellEdit {
            row: edit.row,
            col: edit.col,
            value: edit.value,
        };
        match groups.iter_mut().find(|(name, _)| *name == edit.table) {
            Some((_, cells)) => cells.push(cell),
            None => groups.push((edit.table.as_str(), vec![cell])),
        }
    }

    let mut working = rom.to_vec();
    let mut applied = Vec::with_capacity(edits.len());
    for (name, cells) in &groups {
        let Some(table) = def.table(name) else {
            bail!("Table '{}' not found in definition {}", name, def.name);
        };
        let patches = TableViewMut::new(table, &mut working)
            .apply_patch(cells, mode)
            .with_context(|| format!("Failed to edit table '{}'", name))?;
        for (cell, patch) in cells.iter().zip(patches) {
            debug!(
                "{}[{},{}] at 0x{:X}: {:02X?} -> {:02X?}",
                name, cell.row, cell.col, patch.address, patch.before, patch.after
            );
            applied.push(AppliedEdit {
                table: name.to_string(),
                row: cell.row,
                col: cell.col,
                patch,
            });
        }
    }

    rom.copy_from_slice(&working);
    Ok(applied)
}

/// A checksum that was recomputed and written
#[derive(Debug, Clone, PartialEq)]
pub enum ChecksumFix {
    Definition {
        algorithm: ChecksumAlgorithm,
        offset: usize,
        value: u32,
    },
    SubaruDenso {
        offset: usize,
        statuses: Vec<DensoEntryStatus>,
    },
    NissanStd {
        sums: NissanSums,
    },
    NissanAlt2 {
        sums: NissanAlt2Sums,
    },
}

impl fmt::Display for ChecksumFix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChecksumFix::Definition {
                algorithm,
                offset,
                value,
            } => write!(f, "{} checksum 0x{:08X} at 0x{:X}", algorithm, value, offset),
            ChecksumFix::SubaruDenso { offset, statuses } => {
                let updated = statuses
                    .iter()
                    .filter(|s| matches!(s, DensoEntryStatus::Valid))
                    .count();
                write!(
                    f,
                    "Subaru/Denso table at 0x{:X}: {} entr(ies) updated",
                    offset, updated
                )?;
                if statuses.contains(&DensoEntryStatus::Disabled) {
                    write!(f, ", checksums disabled")?;
                }
                Ok(())
            }
            ChecksumFix::NissanStd { sums } => write!(
                f,
                "Nissan STD sum 0x{:08X} xor 0x{:08X}",
                sums.sum, sums.xor
            ),
            ChecksumFix::NissanAlt2 { sums } => write!(
                f,
                "Nissan ALT2 sum 0x{:08X} xor 0x{:08X} calibration 0x{:04X} code 0x{:04X}",
                sums.sum, sums.xor, sums.calibration, sums.code
            ),
        }
    }
}

/// Recomputes every requested checksum.
///
/// Vendor schemes are updated first, then the definition's own checksum,
/// which may cover the vendor checksum bytes.
pub fn fix_checksums(
    rom: &mut [u8],
    def: Option<&RomDefinition>,
    config: &Config,
) -> Result<Vec<ChecksumFix>> {
    let mut fixes = Vec::new();

    for table in &config.subaru_denso {
        let statuses = update_subaru_denso_checksums(rom, table)
            .with_context(|| format!("Subaru/Denso table at 0x{:X}", table.offset))?;
        fixes.push(ChecksumFix::SubaruDenso {
            offset: table.offset,
            statuses,
        });
    }
    for layout in &config.nissan_std {
        let sums = update_nissan_std_checksum(rom, layout).context("Nissan STD checksum")?;
        fixes.push(ChecksumFix::NissanStd { sums });
    }
    for layout in &config.nissan_alt2 {
        let sums = update_nissan_alt2_checksum(rom, layout).context("Nissan ALT2 checksum")?;
        fixes.push(ChecksumFix::NissanAlt2 { sums });
    }

    if config.fix_checksums {
        let Some(def) = def else {
            bail!("--fix-checksums requires a definition");
        };
        let Some(checksum) = &def.checksum else {
            bail!("Definition {} has no checksum", def.name);
        };
        let value = recompute_checksum(rom, checksum)?;
        write_checksum(rom, value, checksum)?;
        fixes.push(ChecksumFix::Definition {
            algorithm: checksum.algorithm,
            offset: checksum.storage.offset,
            value: value & checksum.storage.mask(),
        });
    }

    Ok(fixes)
}

/// Number of bytes that differ between two images of the same size
pub fn changed_bytes(original: &[u8], patched: &[u8]) -> usize {
    original
        .iter()
        .zip(patched)
        .filter(|(a, b)| a != b)
        .count()
}

fn backup_path(path: &Path, timestamp: &str) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(format!(".{}.bak", timestamp));
    path.with_file_name(name)
}

/// Writes the patched image, first copying any existing file aside if
/// `backup` is set.  Returns the backup's path.
pub fn write_output(path: &Path, bytes: &[u8], backup: bool) -> Result<Option<PathBuf>> {
    let backup_file = if backup && path.exists() {
        let timestamp = Local::now().format("%Y%m%d-%H%M%S").to_string();
        let backup_file = backup_path(path, &timestamp);
        fs::copy(path, &backup_file).with_context(|| {
            format!(
                "Failed to back up {} to {}",
                path.display(),
                backup_file.display()
            )
        })?;
        info!("Backed up {} to {}", path.display(), backup_file.display());
        Some(backup_file)
    } else {
        None
    };

    fs::write(path, bytes).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(backup_file)
}
