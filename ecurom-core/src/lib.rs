// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! ecurom-core
//!
//! Reads and modifies calibration tables inside an Engine Control Unit ROM
//! image, using ECUFlash-style XML definitions.
//!
//! Provides:
//! - a scalar and bit-field codec ([`codec`])
//! - table geometry, cell access and snapshots ([`table`])
//! - an ECUFlash definition parser with include and template resolution
//!   ([`definition`])
//! - fingerprint scoring, to pick the definition matching an unknown image
//!   ([`fingerprint`])
//! - generic and vendor-specific ROM checksums ([`checksum`])
//!
//! This is used by:
//! - `ecurom-info` - identifies ROMs, lists and dumps tables, checks
//!   checksums
//! - `ecurom-patch` - edits table cells and fixes checksums
//!
//! Typically used like this:
//!
//! ```rust,ignore
//! use ecurom_core::{DefinitionParser, TableViewMut, ValueMode, recompute_checksum, write_checksum};
//!
//! let def = DefinitionParser::new().parse_file(&xml_path)?;
//! let table = def.table("Fuel Map").unwrap();
//! TableViewMut::new(table, &mut rom).set(3, 4, 12.5, ValueMode::Physical)?;
//! if let Some(checksum) = &def.checksum {
//!     let value = recompute_checksum(&rom, checksum)?;
//!     write_checksum(&mut rom, value, checksum)?;
//! }
//! ```
//!
//! All operations are synchronous and work on caller-owned byte buffers.
//! Nothing retains a reference to a ROM between calls.

pub mod checksum;
pub mod codec;
pub mod definition;
pub mod error;
pub mod fingerprint;
pub mod table;

pub use checksum::{
    ChecksumAlgorithm, ChecksumDefinition, ChecksumRegion, ChecksumStorage, ChecksumValidation,
    CustomChecksum, read_checksum, recompute_checksum, validate_checksum, write_checksum,
};
pub use codec::{DataType, Endianness};
pub use definition::{
    AxisDefinition, DefinitionParser, RomDefinition, RomDefinitionStub, RomFingerprint,
    TableDefinition,
};
pub use error::{Error, Result};
pub use fingerprint::{best_match, score_rom_definition, score_rom_fingerprint};
pub use table::{
    CellEdit, CellPatch, TableSnapshot, TableView, TableViewMut, ValueMode,
    calculate_cell_address, snapshot_table,
};
