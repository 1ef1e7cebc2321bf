// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

use anyhow::{Context, Result, bail};
use std::fs;
use std::path::{Path, PathBuf};

use ecurom_common::library::{SelectedDefinition, select_definition};

/// A ROM image read from disk
pub struct LoadedRom {
    pub path: PathBuf,
    pub bytes: Vec<u8>,
}

pub fn load_rom(path: &Path) -> Result<LoadedRom> {
    let bytes = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    if bytes.is_empty() {
        bail!("ROM file is empty: {}", path.display());
    }

    Ok(LoadedRom {
        path: path.to_path_buf(),
        bytes,
    })
}

impl LoadedRom {
    pub fn definition(&self, def: Option<&Path>, defs: &[PathBuf]) -> Result<SelectedDefinition> {
        select_definition(&self.bytes, def, defs)
            .with_context(|| format!("Unable to find a definition for {}", self.path.display()))
    }
}
