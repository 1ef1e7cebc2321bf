// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Discovery of definition files and selection of the one matching a ROM

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
#[allow(unused_imports)]
use log::{debug, info, warn};

use ecurom_core::{
    DefinitionParser, RomDefinition, RomDefinitionStub, best_match, score_rom_definition,
};

/// Top level directories searched for definitions, first existing one wins
pub const DEFINITION_DIRS: [&str; 2] = ["definitions", "../definitions"];

/// Subdirectories within the definition directory also searched
pub const DEFINITION_SUB_DIRS: [&str; 2] = ["user", "third-party"];

/// Builds the list of directories to search.
///
/// Explicit directories are used as given.  Otherwise the first existing
/// default directory is used, along with any of its subdirectories that
/// exist.
pub fn get_definition_dirs(explicit: &[PathBuf]) -> Result<Vec<PathBuf>> {
    if !explicit.is_empty() {
        for dir in explicit {
            if !dir.is_dir() {
                bail!("Definition directory not found: {}", dir.display());
            }
        }
        return Ok(explicit.to_vec());
    }

    let root = DEFINITION_DIRS
        .iter()
        .map(Path::new)
        .find(|path| path.is_dir())
        .ok_or_else(|| {
            anyhow!(
                "No definition directories found. Searched: {:?}",
                DEFINITION_DIRS
            )
        })?;

    let mut dirs = vec![root.to_path_buf()];
    for subdir in DEFINITION_SUB_DIRS.iter() {
        let subdir_path = root.join(subdir);
        if subdir_path.is_dir() {
            dirs.push(subdir_path);
        } else {
            info!("Definition subdirectory not found: {}", subdir_path.display());
        }
    }

    Ok(dirs)
}

/// Lists every `.xml` file in `dirs`, sorted by path.
///
/// Fails if the same file name appears in more than one directory, as
/// includes by that name would be ambiguous.
pub fn list_definition_files(dirs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut seen_names: HashMap<String, PathBuf> = HashMap::new();

    for dir in dirs {
        let entries =
            fs::read_dir(dir).with_context(|| format!("Failed to read {}", dir.display()))?;
        for entry in entries {
            let path = entry?.path();
            let is_xml = path
                .extension()
                .and_then(|s| s.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("xml"));
            if !is_xml || !path.is_file() {
                continue;
            }

            let name = path
                .file_stem()
                .and_then(|s| s.to_str())
                .ok_or_else(|| anyhow!("Invalid filename: {}", path.display()))?
                .to_lowercase();
            if let Some(first_path) = seen_names.get(&name) {
                bail!(
                    "Duplicate definition '{}' found in {} and {}",
                    name,
                    first_path.display(),
                    path.display()
                );
            }
            seen_names.insert(name, path.clone());
            files.push(path);
        }
    }

    files.sort();
    Ok(files)
}

/// One identifiable definition file
#[derive(Debug, Clone, serde::Serialize)]
pub struct DefinitionEntry {
    pub path: PathBuf,
    pub stub: RomDefinitionStub,
}

/// The peeked definitions available in a set of directories
#[derive(Debug, Clone)]
pub struct DefinitionLibrary {
    dirs: Vec<PathBuf>,
    entries: Vec<DefinitionEntry>,
}

impl DefinitionLibrary {
    /// Peeks every definition in `dirs`.  Files that fail to peek are logged
    /// and left out.
    pub fn load(dirs: Vec<PathBuf>) -> Result<Self> {
        let parser = DefinitionParser::new();
        let mut entries = Vec::new();
        for path in list_definition_files(&dirs)? {
            match parser.peek_file(&path) {
                Ok(stub) => entries.push(DefinitionEntry { path, stub }),
                Err(e) => warn!("Skipping {}: {}", path.display(), e),
            }
        }
        debug!(
            "Loaded {} definition(s) from {} director(ies)",
            entries.len(),
            dirs.len()
        );
        Ok(Self { dirs, entries })
    }

    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    pub fn entries(&self) -> &[DefinitionEntry] {
        &self.entries
    }

    /// Parser that also searches every library directory for includes
    pub fn parser(&self) -> DefinitionParser {
        self.dirs
            .iter()
            .fold(DefinitionParser::new(), |parser, dir| parser.search_root(dir))
    }

    /// Best matching definition for `rom`, with its score.
    ///
    /// Entries are tried in path order and ties go to the first.  `None`
    /// means no matching definition was found.
    pub fn identify(&self, rom: &[u8]) -> Option<(&DefinitionEntry, u32)> {
        let (stub, score) = best_match(rom, self.entries.iter().map(|e| &e.stub))?;
        self.entries
            .iter()
            .find(|e| std::ptr::eq(&e.stub, stub))
            .map(|entry| (entry, score))
    }

    /// Fully parses the definition at `path`
    pub fn load_definition(&self, path: &Path) -> Result<RomDefinition> {
        self.parser()
            .parse_file(path)
            .with_context(|| format!("Failed to parse definition {}", path.display()))
    }
}

/// The definition chosen for a ROM
#[derive(Debug, Clone)]
pub struct SelectedDefinition {
    pub path: PathBuf,
    pub definition: RomDefinition,

    /// Fingerprint score against the ROM, 0 if nothing matched
    pub score: u32,
}

/// Picks the definition to use for `rom`.
///
/// An explicit `def` file is always used, even if its fingerprints do not
/// match.  Otherwise the library in `defs` (or the default directories) is
/// searched for the best match.
pub fn select_definition(
    rom: &[u8],
    def: Option<&Path>,
    defs: &[PathBuf],
) -> Result<SelectedDefinition> {
    if let Some(path) = def {
        let parser = defs
            .iter()
            .fold(DefinitionParser::new(), |parser, dir| parser.search_root(dir));
        let definition = parser
            .parse_file(path)
            .with_context(|| format!("Failed to parse definition {}", path.display()))?;
        let score = score_rom_definition(rom, &definition.stub());
        if score == 0 {
            warn!(
                "Definition {} does not match this ROM's fingerprints",
                definition.name
            );
        }
        return Ok(SelectedDefinition {
            path: path.to_path_buf(),
            definition,
            score,
        });
    }

    let library = DefinitionLibrary::load(get_definition_dirs(defs)?)?;
    let (entry, score) = library.identify(rom).ok_or_else(|| {
        anyhow!(
            "No matching definition found in {} definition(s). Use --def to choose one",
            library.entries().len()
        )
    })?;
    info!("Identified ROM as {} (score {})", entry.stub.name, score);
    let definition = library.load_definition(&entry.path)?;
    Ok(SelectedDefinition {
        path: entry.path.clone(),
        definition,
        score,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn def(id: &str, address: &str) -> String {
        format!(
            "<rom><romid><xmlid>{id}</xmlid><internalidaddress>{address}</internalidaddress>\
             <internalidstring>{id}</internalidstring></romid></rom>"
        )
    }

    #[test]
    fn test_explicit_dirs_must_exist() {
        let dir = TempDir::new().unwrap();
        let dirs = vec![dir.path().to_path_buf()];
        assert_eq!(get_definition_dirs(&dirs).unwrap(), dirs);
        assert!(get_definition_dirs(&[dir.path().join("missing")]).is_err());
    }

    #[test]
    fn test_list_sorted_and_filtered() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("b.xml"), "<rom/>").unwrap();
        fs::write(dir.path().join("a.XML"), "<rom/>").unwrap();
        fs::write(dir.path().join("notes.txt"), "").unwrap();
        let files = list_definition_files(&[dir.path().to_path_buf()]).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.XML", "b.xml"]);
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let one = TempDir::new().unwrap();
        let two = TempDir::new().unwrap();
        fs::write(one.path().join("base.xml"), "<rom/>").unwrap();
        fs::write(two.path().join("Base.xml"), "<rom/>").unwrap();
        let dirs = vec![one.path().to_path_buf(), two.path().to_path_buf()];
        assert!(list_definition_files(&dirs).is_err());
    }

    #[test]
    fn test_identify() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.xml"), def("AAAA", "10")).unwrap();
        fs::write(dir.path().join("b.xml"), def("BBBB", "10")).unwrap();
        fs::write(dir.path().join("c.xml"), def("BBBB", "10")).unwrap();
        fs::write(dir.path().join("broken.xml"), "<rom>").unwrap();

        let library = DefinitionLibrary::load(vec![dir.path().to_path_buf()]).unwrap();
        assert_eq!(library.entries().len(), 3);

        let mut rom = vec![0u8; 0x20];
        rom[0x10..0x14].copy_from_slice(b"BBBB");
        let (entry, score) = library.identify(&rom).unwrap();
        assert_eq!(entry.path, dir.path().join("b.xml"));
        assert_eq!(score, 100);

        assert!(library.identify(&[0u8; 0x20]).is_none());
    }

    #[test]
    fn test_select_definition() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.xml"), def("AAAA", "10")).unwrap();
        fs::write(dir.path().join("b.xml"), def("BBBB", "10")).unwrap();
        let dirs = vec![dir.path().to_path_buf()];

        let mut rom = vec![0u8; 0x20];
        rom[0x10..0x14].copy_from_slice(b"AAAA");
        let selected = select_definition(&rom, None, &dirs).unwrap();
        assert_eq!(selected.definition.name, "AAAA");
        assert_eq!(selected.score, 100);

        // An explicit definition wins even when it does not match
        let explicit = dir.path().join("b.xml");
        let selected = select_definition(&rom, Some(explicit.as_path()), &[]).unwrap();
        assert_eq!(selected.definition.name, "BBBB");
        assert_eq!(selected.score, 0);

        assert!(select_definition(&[0u8; 0x20], None, &dirs).is_err());
    }
}
