// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Builds [`RomDefinition`]s from ECUFlash XML

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

#[allow(unused_imports)]
use log::{debug, info, trace, warn};

use super::document::{AxisNode, AxisRole, DefinitionDocument, RomIdNode, ScalingNode, TableNode};
use super::scaling::infer_affine;
use super::{
    AxisDefinition, FingerprintRead, Platform, RomDefinition, RomDefinitionStub, RomFingerprint,
    Table1D, Table2D, TableDefinition, ZDataDefinition,
};
use crate::checksum::definition_for_module;
use crate::codec::{DataType, Endianness};
use crate::error::{Error, Result};

// Storage used when a scaling is missing or names an unknown type
const FALLBACK_DTYPE: DataType = DataType::U16;

/// Parses an ECUFlash address.  Always hex, with or without `0x`.
pub fn parse_hex_address(text: &str) -> Option<usize> {
    let text = text.trim();
    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);
    if digits.is_empty() {
        return None;
    }
    usize::from_str_radix(digits, 16).ok()
}

fn parse_flag(text: Option<&str>) -> bool {
    matches!(
        text.map(|t| t.trim().to_lowercase()).as_deref(),
        Some("true" | "1" | "yes")
    )
}

/// Parses definitions, resolving includes from disk.
///
/// ```no_run
/// use ecurom_core::definition::DefinitionParser;
///
/// let parser = DefinitionParser::new()
///     .search_root("definitions/mitsubishi")
///     .strict_includes(false);
/// let def = parser.parse_file("definitions/56890009.xml".as_ref()).unwrap();
/// println!("{} has {} tables", def.name, def.tables.len());
/// ```
#[derive(Debug, Clone, Default)]
pub struct DefinitionParser {
    search_roots: Vec<PathBuf>,
    strict_includes: bool,
}

// Scalings and templates visible to one parse, first writer wins
#[derive(Debug, Default)]
struct Resolved {
    scalings: HashMap<String, ScalingNode>,
    templates: HashMap<String, TableNode>,
}

impl Resolved {
    fn add_scalings(&mut self, doc: &DefinitionDocument) {
        for scaling in &doc.scalings {
            self.scalings
                .entry(scaling.name.clone())
                .or_insert_with(|| scaling.clone());
        }
    }

    fn add_templates(&mut self, doc: &DefinitionDocument) {
        for table in &doc.tables {
            self.templates
                .entry(table.name.clone())
                .or_insert_with(|| table.clone());
        }
    }
}

// Include traversal state for one parse
#[derive(Debug, Default)]
struct IncludeWalk {
    visited: HashSet<PathBuf>,
    stack: Vec<PathBuf>,
}

impl DefinitionParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a directory searched for includes after the including
    /// document's own directory
    pub fn search_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.search_roots.push(dir.into());
        self
    }

    /// When set, an include that leads back to one of its own includers
    /// fails with [`Error::IncludeCycleDetected`] instead of being skipped
    pub fn strict_includes(mut self, strict: bool) -> Self {
        self.strict_includes = strict;
        self
    }

    /// Parses the definition at `path`, including its includes
    pub fn parse_file(&self, path: &Path) -> Result<RomDefinition> {
        let source = read_source(path)?;
        let canonical = canonical(path)?;
        let mut walk = IncludeWalk::default();
        walk.visited.insert(canonical.clone());
        walk.stack.push(canonical);
        let base_dir = path.parent().unwrap_or(Path::new("."));
        self.parse_with(&source, &path.display().to_string(), Some(base_dir), walk)
    }

    /// Parses `source`.  Includes are looked up in `base_dir` (if given) and
    /// then the search roots.
    pub fn parse_str(
        &self,
        source: &str,
        uri: &str,
        base_dir: Option<&Path>,
    ) -> Result<RomDefinition> {
        self.parse_with(source, uri, base_dir, IncludeWalk::default())
    }

    /// Reads only the name and fingerprints of the definition at `path`.
    /// Includes and tables are not processed.
    pub fn peek_file(&self, path: &Path) -> Result<RomDefinitionStub> {
        let source = read_source(path)?;
        self.peek_str(&source, &path.display().to_string())
    }

    pub fn peek_str(&self, source: &str, uri: &str) -> Result<RomDefinitionStub> {
        let doc = DefinitionDocument::parse(source, uri)?;
        let romid = doc.romid.unwrap_or_default();
        Ok(RomDefinitionStub {
            uri: uri.to_string(),
            name: definition_name(&romid, uri),
            fingerprints: fingerprints(&romid)?,
        })
    }

    fn parse_with(
        &self,
        source: &str,
        uri: &str,
        base_dir: Option<&Path>,
        mut walk: IncludeWalk,
    ) -> Result<RomDefinition> {
        let doc = DefinitionDocument::parse(source, uri)?;
        debug!("Parsing definition {uri}");

        // Local scalings take precedence over anything included
        let mut resolved = Resolved::default();
        resolved.add_scalings(&doc);
        self.merge_includes(&doc.includes, base_dir, &mut walk, &mut resolved)?;

        let mut tables = Vec::with_capacity(doc.tables.len());
        for node in &doc.tables {
            if let Some(table) = self.build_table(node, &resolved)? {
                tables.push(table);
            }
        }

        let romid = doc.romid.unwrap_or_default();
        let checksum = romid
            .checksum_module
            .as_deref()
            .and_then(definition_for_module);

        let definition = RomDefinition {
            uri: uri.to_string(),
            name: definition_name(&romid, uri),
            platform: Platform {
                make: romid.make.clone(),
                model: romid.model.clone(),
                submodel: romid.submodel.clone(),
                year: romid.year.clone(),
                market: romid.market.clone(),
                transmission: romid.transmission.clone(),
            },
            tables,
            checksum,
            fingerprints: fingerprints(&romid)?,
        };
        debug!(
            "Definition {} has {} table(s), checksum {}",
            definition.name,
            definition.tables.len(),
            if definition.checksum.is_some() {
                "present"
            } else {
                "absent"
            }
        );
        Ok(definition)
    }

    fn resolve_include(&self, name: &str, base_dir: Option<&Path>) -> Result<PathBuf> {
        let file_name = if name.to_lowercase().ends_with(".xml") {
            name.to_string()
        } else {
            format!("{name}.xml")
        };

        let searched: Vec<PathBuf> = base_dir
            .into_iter()
            .chain(self.search_roots.iter().map(PathBuf::as_path))
            .map(|dir| dir.join(&file_name))
            .collect();
        match searched.iter().find(|p| p.is_file()) {
            Some(path) => Ok(path.clone()),
            None => Err(Error::IncludeNotFound {
                name: name.to_string(),
                searched,
            }),
        }
    }

    // Depth first: an include's own includes come before the next sibling
    fn merge_includes(
        &self,
        includes: &[String],
        base_dir: Option<&Path>,
        walk: &mut IncludeWalk,
        resolved: &mut Resolved,
    ) -> Result<()> {
        for name in includes {
            let path = self.resolve_include(name, base_dir)?;
            let key = canonical(&path)?;

            if walk.stack.contains(&key) {
                if self.strict_includes {
                    return Err(Error::IncludeCycleDetected { path: key });
                }
                debug!("Include cycle at {}, skipping", path.display());
                continue;
            }
            if !walk.visited.insert(key.clone()) {
                trace!("Include {} already merged", path.display());
                continue;
            }

            debug!("Including {}", path.display());
            let doc = DefinitionDocument::parse(&read_source(&path)?, &path.display().to_string())?;
            resolved.add_scalings(&doc);
            resolved.add_templates(&doc);

            walk.stack.push(key);
            let include_dir = path.parent().map(Path::to_path_buf);
            self.merge_includes(&doc.includes, include_dir.as_deref(), walk, resolved)?;
            walk.stack.pop();
        }
        Ok(())
    }

    fn build_table(&self, node: &TableNode, resolved: &Resolved) -> Result<Option<TableDefinition>> {
        let node = match resolved.templates.get(&node.name) {
            Some(template) => node.merged_with(template),
            None => node.clone(),
        };

        let Some(address_text) = node.address.as_deref() else {
            trace!("Table '{}' has no address, treating as template", node.name);
            return Ok(None);
        };
        let address = parse_hex_address(address_text).ok_or_else(|| {
            Error::invalid_definition(format!(
                "table '{}' has bad address '{address_text}'",
                node.name
            ))
        })?;

        let (dtype, endianness, scaling) = storage_for(
            node.scaling.as_deref(),
            resolved,
            &format!("table '{}'", node.name),
        );
        let affine = infer_affine(scaling.and_then(|s| s.toexpr.as_deref()));
        let mut z = ZDataDefinition::new(address, dtype, endianness)
            .with_scaling(affine.scale, affine.offset);
        z.unit = scaling.and_then(|s| s.units.clone());

        let mut x = None;
        let mut y = None;
        for (index, axis_node) in node.axes.iter().enumerate() {
            let role = axis_node.role().unwrap_or(if index == 0 {
                AxisRole::X
            } else {
                AxisRole::Y
            });
            let Some(axis) = build_axis(axis_node, resolved, &node.name)? else {
                continue;
            };
            match role {
                AxisRole::X if x.is_none() => x = Some(axis),
                AxisRole::Y if y.is_none() => y = Some(axis),
                _ => warn!(
                    "Table '{}' has a duplicate {role:?} axis '{}', ignoring",
                    node.name, axis_node.name
                ),
            }
        }

        let table_type = node.table_type.as_deref().unwrap_or("1D").trim().to_uppercase();
        let table = match table_type.as_str() {
            "1D" => TableDefinition::Table1D(Table1D {
                name: node.name.clone(),
                category: node.category.clone(),
                rows: 1,
                x: None,
                z,
            }),
            "2D" => {
                let axis = x.or(y);
                let rows = match &axis {
                    Some(axis) => axis.len(),
                    None => parse_count(node.elements.as_deref()).unwrap_or(1),
                };
                TableDefinition::Table1D(Table1D {
                    name: node.name.clone(),
                    category: node.category.clone(),
                    rows,
                    x: axis,
                    z,
                })
            }
            "3D" => {
                let cols = x.as_ref().map_or(1, AxisDefinition::len);
                let rows = y.as_ref().map_or(1, AxisDefinition::len);
                if parse_flag(node.swapxy.as_deref()) {
                    // Column-major storage; dimensions and axes stay as declared
                    let width = dtype.width();
                    z = z.with_strides(width, rows * width);
                }
                TableDefinition::Table2D(Table2D {
                    name: node.name.clone(),
                    category: node.category.clone(),
                    rows,
                    cols,
                    x,
                    y,
                    z,
                })
            }
            other => {
                warn!("Table '{}' has unsupported type '{other}', skipping", node.name);
                return Ok(None);
            }
        };
        trace!("Table '{}' {} at 0x{address:X}", table.name(), table.shape());
        Ok(Some(table))
    }
}

fn read_source(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| Error::Io {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

fn canonical(path: &Path) -> Result<PathBuf> {
    fs::canonicalize(path).map_err(|e| Error::Io {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

fn parse_count(text: Option<&str>) -> Option<usize> {
    text.and_then(|t| t.trim().parse().ok())
}

fn definition_name(romid: &RomIdNode, uri: &str) -> String {
    romid.xmlid.clone().unwrap_or_else(|| {
        Path::new(uri)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| uri.to_string())
    })
}

// Resolves a scaling reference to a storage type.  A missing or unusable
// scaling degrades to big-endian u16.
fn storage_for<'a>(
    name: Option<&str>,
    resolved: &'a Resolved,
    context: &str,
) -> (DataType, Endianness, Option<&'a ScalingNode>) {
    let Some(name) = name else {
        debug!("No scaling for {context}, using {FALLBACK_DTYPE}");
        return (FALLBACK_DTYPE, Endianness::Big, None);
    };
    let Some(scaling) = resolved.scalings.get(name) else {
        warn!("Scaling '{name}' for {context} not found, using big-endian {FALLBACK_DTYPE}");
        return (FALLBACK_DTYPE, Endianness::Big, None);
    };

    let dtype = match scaling.storage_type.as_deref() {
        Some(text) => DataType::from_storage_type(text).unwrap_or_else(|| {
            warn!("Scaling '{name}' has unknown storage type '{text}', using {FALLBACK_DTYPE}");
            FALLBACK_DTYPE
        }),
        None => FALLBACK_DTYPE,
    };
    let endianness = scaling
        .endian
        .as_deref()
        .and_then(Endianness::from_str)
        .unwrap_or_default();
    (dtype, endianness, Some(scaling))
}

fn build_axis(node: &AxisNode, resolved: &Resolved, table: &str) -> Result<Option<AxisDefinition>> {
    if !node.data.is_empty() {
        let values = node
            .data
            .iter()
            .enumerate()
            .map(|(ii, text)| {
                text.parse::<f64>().unwrap_or_else(|_| {
                    debug!("Axis '{}' label '{text}' is not numeric, using {ii}", node.name);
                    ii as f64
                })
            })
            .collect();
        return Ok(Some(AxisDefinition::Static { values }));
    }

    let Some(address_text) = node.address.as_deref() else {
        debug!("Axis '{}' of table '{table}' has no data or address, dropping", node.name);
        return Ok(None);
    };
    let address = parse_hex_address(address_text).ok_or_else(|| {
        Error::invalid_definition(format!(
            "axis '{}' of table '{table}' has bad address '{address_text}'",
            node.name
        ))
    })?;
    let Some(length) = parse_count(node.elements.as_deref()) else {
        warn!("Axis '{}' of table '{table}' has no element count, dropping", node.name);
        return Ok(None);
    };

    let (dtype, endianness, scaling) = storage_for(
        node.scaling.as_deref(),
        resolved,
        &format!("axis '{}' of table '{table}'", node.name),
    );
    let affine = infer_affine(scaling.and_then(|s| s.toexpr.as_deref()));
    Ok(Some(AxisDefinition::Dynamic {
        address,
        length,
        dtype,
        endianness,
        scale: affine.scale,
        offset: affine.offset,
    }))
}

// ECUFlash identifies a ROM by a single id string at a fixed address
fn fingerprints(romid: &RomIdNode) -> Result<Vec<RomFingerprint>> {
    let Some(address_text) = romid.internal_id_address.as_deref() else {
        return Ok(Vec::new());
    };
    let address = parse_hex_address(address_text).ok_or_else(|| {
        Error::invalid_definition(format!("bad internalidaddress '{address_text}'"))
    })?;

    let expected = match (&romid.internal_id_hex, &romid.internal_id_string) {
        (Some(id_hex), _) => id_hex
            .chars()
            .filter(char::is_ascii_hexdigit)
            .collect::<String>()
            .to_lowercase(),
        (None, Some(id_string)) => hex::encode(id_string.as_bytes()),
        (None, None) => return Ok(Vec::new()),
    };
    if expected.is_empty() {
        return Ok(Vec::new());
    }
    if expected.len() % 2 != 0 {
        return Err(Error::invalid_definition(format!(
            "internal id '{expected}' at 0x{address:X} is not a whole number of bytes"
        )));
    }

    let read = FingerprintRead {
        address,
        length: expected.len() / 2,
    };
    Ok(vec![RomFingerprint::new(vec![read], vec![expected], None)?])
}
