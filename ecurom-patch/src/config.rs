// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

use std::path::PathBuf;

use ecurom_common::args::TableEdit;
use ecurom_core::ValueMode;
use ecurom_core::checksum::{NissanAlt2Layout, NissanLayout, SubaruDensoTable};

#[derive(Debug, Clone)]
pub struct Config {
    pub rom: PathBuf,
    pub output: PathBuf,
    pub edits: Vec<TableEdit>,
    pub mode: ValueMode,
    pub fix_checksums: bool,
    pub subaru_denso: Vec<SubaruDensoTable>,
    pub nissan_std: Vec<NissanLayout>,
    pub nissan_alt2: Vec<NissanAlt2Layout>,
    pub defs: Vec<PathBuf>,
    pub def: Option<PathBuf>,
    pub overwrite: bool,
    pub backup: bool,
    pub auto_yes: bool,
}

impl Config {
    /// Whether a definition has to be found for the ROM
    pub fn needs_definition(&self) -> bool {
        !self.edits.is_empty() || self.fix_checksums
    }

    fn has_vendor_checksums(&self) -> bool {
        !self.subaru_denso.is_empty() || !self.nissan_std.is_empty() || !self.nissan_alt2.is_empty()
    }

    pub fn validate(&self) -> Result<(), String> {
        if !self.needs_definition() && !self.has_vendor_checksums() {
            return Err(
                "Nothing to do. Use --set and/or --fix-checksums, --subaru-denso, --nissan-std, --nissan-alt2"
                    .to_string(),
            );
        }

        if !self.rom.is_file() {
            return Err(format!("ROM file does not exist: {}", self.rom.display()));
        }

        // Never write over the input, the original is needed for the diff
        if self.output == self.rom {
            return Err("Output file must differ from the input ROM".to_string());
        }

        if !self.overwrite && self.output.exists() {
            return Err(format!(
                "Output file '{}' already exists. Use --overwrite to overwrite.",
                self.output.display()
            ));
        }

        if self.backup && !self.overwrite {
            return Err("--backup only applies with --overwrite".to_string());
        }

        Ok(())
    }
}
