// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Table geometry, cell access and snapshots
//!
//! Maps a table's `(row, col)` cells to byte offsets in a ROM, and reads and
//! writes them through the scalar codec.  The addressing is layout-agnostic:
//! column-major tables are expressed purely through their strides, and a
//! [`CellIndexer`](crate::definition::CellIndexer) replaces stride arithmetic
//! entirely.
//!
//! Views borrow the ROM for the duration of a call sequence only.  Nothing
//! here keeps a reference to the ROM once the view is dropped.

#[allow(unused_imports)]
use log::{debug, trace};

use crate::codec::{decode_scalar, write_scalar};
use crate::definition::{AxisDefinition, TableDefinition, ZDataDefinition};
use crate::error::{Error, Result, check_range};

/// Whether a value is raw storage or has scale and offset applied
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueMode {
    Raw,
    #[default]
    Physical,
}

/// One logical cell edit
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CellEdit {
    pub row: usize,
    pub col: usize,
    pub value: f64,
}

/// Raw bytes changed by a single cell write
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CellPatch {
    pub address: usize,
    pub before: Vec<u8>,
    pub after: Vec<u8>,
}

impl CellPatch {
    pub fn changed(&self) -> bool {
        self.before != self.after
    }
}

/// Fully decoded physical values of a table and its axes
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind")]
pub enum TableSnapshot {
    Table1D {
        name: String,
        z: Vec<f64>,
        x: Option<Vec<f64>>,
    },
    Table2D {
        name: String,

        /// `z[row][col]`
        z: Vec<Vec<f64>>,
        x: Option<Vec<f64>>,
        y: Option<Vec<f64>>,
    },
}

impl TableSnapshot {
    pub fn name(&self) -> &str {
        match self {
            TableSnapshot::Table1D { name, .. } | TableSnapshot::Table2D { name, .. } => name,
        }
    }
}

fn natural_strides(def: &TableDefinition) -> (usize, usize) {
    let width = def.z().dtype.width();
    match def {
        TableDefinition::Table1D(_) => (width, 0),
        _ => (def.cols() * width, width),
    }
}

/// Byte offset of a cell, without checking it against the table's
/// dimensions.  Fails with [`Error::OutOfBounds`] if the offset does not fit
/// in a `usize`.
pub fn cell_byte_offset(def: &TableDefinition, row: usize, col: usize) -> Result<usize> {
    let z = def.z();
    let width = z.dtype.width();
    let overflow = || Error::address_overflow(z.address, width);
    if let Some(indexer) = &z.indexer {
        return z
            .address
            .checked_add(indexer.offset(row, col))
            .ok_or_else(overflow);
    }
    let (natural_row, natural_col) = natural_strides(def);
    let row_stride = z.row_stride_bytes.unwrap_or(natural_row);
    let col = if matches!(def, TableDefinition::Table1D(_)) {
        0
    } else {
        col
    };
    let col_stride = z.col_stride_bytes.unwrap_or(natural_col);
    row.checked_mul(row_stride)
        .zip(col.checked_mul(col_stride))
        .and_then(|(r, c)| r.checked_add(c))
        .and_then(|delta| z.address.checked_add(delta))
        .ok_or_else(overflow)
}

fn check_index(def: &TableDefinition, row: usize, col: usize) -> Result<()> {
    let (rows, cols) = (def.rows(), def.cols());
    if row >= rows || col >= cols {
        return Err(Error::IndexOutOfRange {
            row,
            col,
            rows,
            cols,
        });
    }
    Ok(())
}

/// Byte offset of a cell in the ROM, checked against the table's
/// dimensions
pub fn calculate_cell_address(def: &TableDefinition, row: usize, col: usize) -> Result<usize> {
    check_index(def, row, col)?;
    cell_byte_offset(def, row, col)
}

fn to_physical(z: &ZDataDefinition, raw: f64) -> f64 {
    raw * z.scale + z.offset
}

fn to_raw(z: &ZDataDefinition, value: f64, name: &str) -> Result<f64> {
    if z.scale == 0.0 {
        return Err(Error::invalid_definition(format!(
            "table '{name}' has zero scale and cannot be written in physical units"
        )));
    }
    Ok((value - z.offset) / z.scale)
}

fn read_cell(def: &TableDefinition, rom: &[u8], row: usize, col: usize, mode: ValueMode) -> Result<f64> {
    let address = calculate_cell_address(def, row, col)?;
    let z = def.z();
    let raw = decode_scalar(rom, address, z.dtype, z.endianness)?;
    Ok(match mode {
        ValueMode::Raw => raw,
        ValueMode::Physical => to_physical(z, raw),
    })
}

fn read_grid(def: &TableDefinition, rom: &[u8], mode: ValueMode) -> Result<Vec<Vec<f64>>> {
    (0..def.rows())
        .map(|row| {
            (0..def.cols())
                .map(|col| read_cell(def, rom, row, col, mode))
                .collect()
        })
        .collect()
}

/// Decodes an axis's labels
pub fn read_axis(axis: &AxisDefinition, rom: &[u8]) -> Result<Vec<f64>> {
    match axis {
        AxisDefinition::Static { values } => Ok(values.clone()),
        AxisDefinition::Dynamic {
            address,
            length,
            dtype,
            endianness,
            scale,
            offset,
        } => (0..*length)
            .map(|ii| {
                let element = ii
                    .checked_mul(dtype.width())
                    .and_then(|delta| address.checked_add(delta))
                    .ok_or_else(|| Error::address_overflow(*address, dtype.width()))?;
                let raw = decode_scalar(rom, element, *dtype, *endianness)?;
                Ok(raw * scale + offset)
            })
            .collect(),
    }
}

/// Decodes a table's physical values and axes.  Never modifies `rom`.
pub fn snapshot_table(def: &TableDefinition, rom: &[u8]) -> Result<TableSnapshot> {
    let x = def.x().map(|axis| read_axis(axis, rom)).transpose()?;
    let grid = read_grid(def, rom, ValueMode::Physical)?;
    Ok(match def {
        TableDefinition::Table1D(t) => TableSnapshot::Table1D {
            name: t.name.clone(),
            z: grid.into_iter().flatten().collect(),
            x,
        },
        _ => TableSnapshot::Table2D {
            name: def.name().to_string(),
            z: grid,
            x,
            y: def.y().map(|axis| read_axis(axis, rom)).transpose()?,
        },
    })
}

/// Read-only access to one table of a ROM
#[derive(Debug, Clone, Copy)]
pub struct TableView<'a> {
    def: &'a TableDefinition,
    rom: &'a [u8],
}

impl<'a> TableView<'a> {
    pub fn new(def: &'a TableDefinition, rom: &'a [u8]) -> Self {
        Self { def, rom }
    }

    pub fn definition(&self) -> &TableDefinition {
        self.def
    }

    pub fn get(&self, row: usize, col: usize, mode: ValueMode) -> Result<f64> {
        read_cell(self.def, self.rom, row, col, mode)
    }

    /// Every cell, `[row][col]`
    pub fn read_all(&self, mode: ValueMode) -> Result<Vec<Vec<f64>>> {
        read_grid(self.def, self.rom, mode)
    }

    pub fn snapshot(&self) -> Result<TableSnapshot> {
        snapshot_table(self.def, self.rom)
    }
}

/// Read/write access to one table of a ROM
#[derive(Debug)]
pub struct TableViewMut<'a> {
    def: &'a TableDefinition,
    rom: &'a mut [u8],
}

impl<'a> TableViewMut<'a> {
    pub fn new(def: &'a TableDefinition, rom: &'a mut [u8]) -> Self {
        Self { def, rom }
    }

    pub fn definition(&self) -> &TableDefinition {
        self.def
    }

    pub fn as_view(&self) -> TableView<'_> {
        TableView::new(self.def, self.rom)
    }

    pub fn get(&self, row: usize, col: usize, mode: ValueMode) -> Result<f64> {
        read_cell(self.def, self.rom, row, col, mode)
    }

    pub fn read_all(&self, mode: ValueMode) -> Result<Vec<Vec<f64>>> {
        read_grid(self.def, self.rom, mode)
    }

    // Address and raw value for an edit, without writing anything
    fn prepare(&self, edit: &CellEdit, mode: ValueMode) -> Result<(usize, f64)> {
        let address = calculate_cell_address(self.def, edit.row, edit.col)?;
        let z = self.def.z();
        check_range(address, z.dtype.width(), self.rom.len())?;
        let raw = match mode {
            ValueMode::Raw => edit.value,
            ValueMode::Physical => to_raw(z, edit.value, self.def.name())?,
        };
        Ok((address, raw))
    }

    fn write(&mut self, address: usize, raw: f64) -> Result<CellPatch> {
        let (dtype, endianness) = (self.def.z().dtype, self.def.z().endianness);
        let end = check_range(address, dtype.width(), self.rom.len())?;
        let before = self.rom[address..end].to_vec();
        write_scalar(self.rom, address, raw, dtype, endianness)?;
        Ok(CellPatch {
            address,
            before,
            after: self.rom[address..end].to_vec(),
        })
    }

    /// Writes one cell.  Integer storage is rounded and clamped.
    pub fn set(&mut self, row: usize, col: usize, value: f64, mode: ValueMode) -> Result<CellPatch> {
        let (address, raw) = self.prepare(&CellEdit { row, col, value }, mode)?;
        let patch = self.write(address, raw)?;
        trace!(
            "{}[{row},{col}] = {value} at 0x{address:X}",
            self.def.name()
        );
        Ok(patch)
    }

    /// Applies a batch of edits in order.  Every edit is checked first, so
    /// on error the ROM is unchanged.
    pub fn apply_patch(&mut self, edits: &[CellEdit], mode: ValueMode) -> Result<Vec<CellPatch>> {
        let prepared = edits
            .iter()
            .map(|edit| self.prepare(edit, mode))
            .collect::<Result<Vec<_>>>()?;
        let patches = prepared
            .into_iter()
            .map(|(address, raw)| self.write(address, raw))
            .collect::<Result<Vec<_>>>()?;
        debug!(
            "Applied {} edit(s) to '{}', {} changed",
            patches.len(),
            self.def.name(),
            patches.iter().filter(|p| p.changed()).count()
        );
        Ok(patches)
    }
}
