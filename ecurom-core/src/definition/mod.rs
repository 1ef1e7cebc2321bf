// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! ROM definitions
//!
//! A [`RomDefinition`] describes where each calibration table lives in a ROM
//! image, how its bytes map to physical values, which byte patterns
//! identify a matching image and how the image's checksum works.
//!
//! Definitions are built by [`DefinitionParser`] from ECUFlash-style XML and
//! are immutable once built.

mod document;
mod parser;
mod scaling;

pub use parser::{DefinitionParser, parse_hex_address};
pub use scaling::{Affine, infer_affine};

use core::fmt;
use std::sync::Arc;

use crate::checksum::ChecksumDefinition;
use crate::codec::{DataType, Endianness};
use crate::error::{Error, Result};

/// Default weight of a fingerprint read when none is declared
pub const DEFAULT_FINGERPRINT_WEIGHT: u32 = 100;

/// Vehicle metadata from the definition's `romid`.  Advisory only.
#[derive(Debug, Default, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Platform {
    pub make: Option<String>,
    pub model: Option<String>,
    pub submodel: Option<String>,
    pub year: Option<String>,
    pub market: Option<String>,
    pub transmission: Option<String>,
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<&str> = [
            &self.year,
            &self.make,
            &self.model,
            &self.submodel,
            &self.market,
            &self.transmission,
        ]
        .iter()
        .filter_map(|p| p.as_deref())
        .collect();
        if parts.is_empty() {
            write!(f, "<unknown>")
        } else {
            write!(f, "{}", parts.join(" "))
        }
    }
}

/// A fully parsed ROM definition
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RomDefinition {
    /// Where the definition was loaded from
    pub uri: String,

    /// Definition identifier, normally the ECUFlash `xmlid`
    pub name: String,

    pub platform: Platform,

    /// Tables in declaration order
    pub tables: Vec<TableDefinition>,

    pub checksum: Option<ChecksumDefinition>,

    /// Recognition patterns for matching images
    pub fingerprints: Vec<RomFingerprint>,
}

impl RomDefinition {
    /// Looks up a table by name, ignoring case
    pub fn table(&self, name: &str) -> Option<&TableDefinition> {
        self.tables
            .iter()
            .find(|t| t.name().eq_ignore_ascii_case(name))
    }

    /// The cheap identity used by the fingerprint matcher
    pub fn stub(&self) -> RomDefinitionStub {
        RomDefinitionStub {
            uri: self.uri.clone(),
            name: self.name.clone(),
            fingerprints: self.fingerprints.clone(),
        }
    }
}

/// Name and fingerprints of a definition, produced without parsing tables
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RomDefinitionStub {
    pub uri: String,
    pub name: String,
    pub fingerprints: Vec<RomFingerprint>,
}

/// A single `(address, length)` read used by a fingerprint
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FingerprintRead {
    pub address: usize,
    pub length: usize,
}

/// Expected byte patterns at fixed addresses
///
/// `reads`, `expected_hex` and (if present) `weights` are parallel lists.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RomFingerprint {
    reads: Vec<FingerprintRead>,
    expected_hex: Vec<String>,
    weights: Option<Vec<u32>>,
}

impl RomFingerprint {
    pub fn new(
        reads: Vec<FingerprintRead>,
        expected_hex: Vec<String>,
        weights: Option<Vec<u32>>,
    ) -> Result<Self> {
        if reads.len() != expected_hex.len() {
            return Err(Error::invalid_definition(format!(
                "fingerprint has {} reads but {} expected values",
                reads.len(),
                expected_hex.len()
            )));
        }
        if let Some(weights) = &weights {
            if weights.len() != reads.len() {
                return Err(Error::invalid_definition(format!(
                    "fingerprint has {} reads but {} weights",
                    reads.len(),
                    weights.len()
                )));
            }
        }
        Ok(Self {
            reads,
            expected_hex,
            weights,
        })
    }

    pub fn reads(&self) -> &[FingerprintRead] {
        &self.reads
    }

    pub fn expected_hex(&self) -> &[String] {
        &self.expected_hex
    }

    /// Weight of entry `index`, [`DEFAULT_FINGERPRINT_WEIGHT`] if undeclared
    pub fn weight(&self, index: usize) -> u32 {
        self.weights
            .as_ref()
            .and_then(|w| w.get(index).copied())
            .unwrap_or(DEFAULT_FINGERPRINT_WEIGHT)
    }

    /// Sum of all weights - the score of a perfect match
    pub fn max_score(&self) -> u32 {
        (0..self.reads.len()).map(|i| self.weight(i)).sum()
    }
}

/// Axis labels for a table's rows or columns
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AxisDefinition {
    /// Fixed values with no ROM footprint
    Static { values: Vec<f64> },

    /// Values stored in the ROM, read like a 1D table of `length` elements
    Dynamic {
        address: usize,
        length: usize,
        dtype: DataType,
        endianness: Endianness,
        scale: f64,
        offset: f64,
    },
}

impl AxisDefinition {
    /// Number of labels on the axis
    pub fn len(&self) -> usize {
        match self {
            AxisDefinition::Static { values } => values.len(),
            AxisDefinition::Dynamic { length, .. } => *length,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Custom cell addressing: `(row, col)` to a byte offset from the table's
/// base address.  Overrides stride arithmetic entirely.
#[derive(Clone)]
pub struct CellIndexer(Arc<dyn Fn(usize, usize) -> usize + Send + Sync>);

impl CellIndexer {
    pub fn new(f: impl Fn(usize, usize) -> usize + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn offset(&self, row: usize, col: usize) -> usize {
        (self.0)(row, col)
    }
}

impl fmt::Debug for CellIndexer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CellIndexer(..)")
    }
}

/// The cell payload of a table
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ZDataDefinition {
    pub address: usize,
    pub dtype: DataType,
    pub endianness: Endianness,

    /// physical = raw * scale + offset
    pub scale: f64,
    pub offset: f64,

    /// Bytes between consecutive rows, natural layout if `None`
    pub row_stride_bytes: Option<usize>,

    /// Bytes between consecutive columns, natural layout if `None`
    pub col_stride_bytes: Option<usize>,

    #[serde(skip)]
    pub indexer: Option<CellIndexer>,

    pub unit: Option<String>,
}

impl ZDataDefinition {
    /// Unscaled, row-major payload at `address`
    pub fn new(address: usize, dtype: DataType, endianness: Endianness) -> Self {
        Self {
            address,
            dtype,
            endianness,
            scale: 1.0,
            offset: 0.0,
            row_stride_bytes: None,
            col_stride_bytes: None,
            indexer: None,
            unit: None,
        }
    }

    pub fn with_scaling(mut self, scale: f64, offset: f64) -> Self {
        self.scale = scale;
        self.offset = offset;
        self
    }

    pub fn with_strides(mut self, row_stride_bytes: usize, col_stride_bytes: usize) -> Self {
        self.row_stride_bytes = Some(row_stride_bytes);
        self.col_stride_bytes = Some(col_stride_bytes);
        self
    }

    pub fn with_indexer(mut self, indexer: CellIndexer) -> Self {
        self.indexer = Some(indexer);
        self
    }
}

/// A single value or a list of values
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Table1D {
    pub name: String,
    pub category: Option<String>,
    pub rows: usize,
    pub x: Option<AxisDefinition>,
    pub z: ZDataDefinition,
}

/// A grid of values, `rows` x `cols`
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Table2D {
    pub name: String,
    pub category: Option<String>,
    pub rows: usize,
    pub cols: usize,

    /// Column labels
    pub x: Option<AxisDefinition>,

    /// Row labels
    pub y: Option<AxisDefinition>,
    pub z: ZDataDefinition,
}

/// A stack of `layers` grids.  Not produced by the XML parser.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Table3D {
    pub name: String,
    pub category: Option<String>,
    pub rows: usize,
    pub cols: usize,
    pub layers: usize,
    pub x: Option<AxisDefinition>,
    pub y: Option<AxisDefinition>,
    pub z: ZDataDefinition,
}

/// Definition of one calibration table
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind")]
pub enum TableDefinition {
    Table1D(Table1D),
    Table2D(Table2D),
    Table3D(Table3D),
}

impl TableDefinition {
    pub fn name(&self) -> &str {
        match self {
            TableDefinition::Table1D(t) => &t.name,
            TableDefinition::Table2D(t) => &t.name,
            TableDefinition::Table3D(t) => &t.name,
        }
    }

    pub fn category(&self) -> Option<&str> {
        match self {
            TableDefinition::Table1D(t) => t.category.as_deref(),
            TableDefinition::Table2D(t) => t.category.as_deref(),
            TableDefinition::Table3D(t) => t.category.as_deref(),
        }
    }

    pub fn z(&self) -> &ZDataDefinition {
        match self {
            TableDefinition::Table1D(t) => &t.z,
            TableDefinition::Table2D(t) => &t.z,
            TableDefinition::Table3D(t) => &t.z,
        }
    }

    pub fn rows(&self) -> usize {
        match self {
            TableDefinition::Table1D(t) => t.rows,
            TableDefinition::Table2D(t) => t.rows,
            TableDefinition::Table3D(t) => t.rows * t.layers,
        }
    }

    /// Number of columns - always 1 for a [`Table1D`]
    pub fn cols(&self) -> usize {
        match self {
            TableDefinition::Table1D(_) => 1,
            TableDefinition::Table2D(t) => t.cols,
            TableDefinition::Table3D(t) => t.cols,
        }
    }

    pub fn x(&self) -> Option<&AxisDefinition> {
        match self {
            TableDefinition::Table1D(t) => t.x.as_ref(),
            TableDefinition::Table2D(t) => t.x.as_ref(),
            TableDefinition::Table3D(t) => t.x.as_ref(),
        }
    }

    pub fn y(&self) -> Option<&AxisDefinition> {
        match self {
            TableDefinition::Table1D(_) => None,
            TableDefinition::Table2D(t) => t.y.as_ref(),
            TableDefinition::Table3D(t) => t.y.as_ref(),
        }
    }

    /// Short description of the table's shape, e.g. `2D 18x9`
    pub fn shape(&self) -> String {
        match self {
            TableDefinition::Table1D(t) => format!("1D {}", t.rows),
            TableDefinition::Table2D(t) => format!("2D {}x{}", t.rows, t.cols),
            TableDefinition::Table3D(t) => format!("3D {}x{}x{}", t.layers, t.rows, t.cols),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_arity() {
        let read = FingerprintRead {
            address: 0,
            length: 2,
        };
        assert!(RomFingerprint::new(vec![read], vec![], None).is_err());
        assert!(RomFingerprint::new(vec![read], vec!["abcd".into()], Some(vec![1, 2])).is_err());
        let fp = RomFingerprint::new(vec![read, read], vec!["ab".into(), "cd".into()], None)
            .unwrap();
        assert_eq!(fp.weight(1), DEFAULT_FINGERPRINT_WEIGHT);
        assert_eq!(fp.max_score(), 200);
    }

    #[test]
    fn test_platform_display() {
        let platform = Platform {
            make: Some("Mitsubishi".into()),
            model: Some("Lancer".into()),
            year: Some("2006".into()),
            ..Default::default()
        };
        assert_eq!(platform.to_string(), "2006 Mitsubishi Lancer");
        assert_eq!(Platform::default().to_string(), "<unknown>");
    }
}
