// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use ecurom_common::args::{parse_nissan_alt2, parse_nissan_std, parse_subaru_denso};
use ecurom_core::checksum::{NissanAlt2Layout, NissanLayout, SubaruDensoTable};

#[derive(Parser, Debug)]
#[command(name = "ecurom-info")]
#[command(about = "ECU ROM image information")]
#[command(version)]
#[command(after_help = "Use 'help <subcommand>' for detailed options (e.g., 'help dump')")]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Directory to search for definitions (may be repeated)
    #[arg(long = "defs", global = true)]
    pub defs: Vec<PathBuf>,

    /// Definition file to use instead of identifying the ROM
    #[arg(long, global = true)]
    pub def: Option<PathBuf>,

    /// Output JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Identifies the ROM and outputs its definition, including:
    /// - The matching definition and its fingerprint score
    /// - Vehicle platform information
    /// - Checksum configuration
    /// - The tables it defines
    #[command(verbatim_doc_comment)]
    Info {
        /// ROM image filename
        rom: PathBuf,
    },
    /// Outputs the contents of one table, with its axes.
    ///
    /// Values are physical (scaling applied) unless --raw is given.
    Dump {
        /// ROM image filename
        rom: PathBuf,

        /// Table name, as given in the definition
        table: String,

        /// Output raw stored values
        #[arg(long)]
        raw: bool,
    },
    /// Validates the ROM's checksums.
    ///
    /// The checksum from the definition is always checked, if there is one.
    /// Vendor schemes whose layout is not part of the definition can be
    /// checked in addition.
    Checksum {
        /// ROM image filename
        rom: PathBuf,

        /// Subaru/Denso checksum table (in hex, OFFSET:COUNT)
        #[arg(long, value_parser = parse_subaru_denso)]
        subaru_denso: Option<SubaruDensoTable>,

        /// Nissan standard checksum (in hex, START:END:SUMLOC:XORLOC)
        #[arg(long, value_parser = parse_nissan_std)]
        nissan_std: Option<NissanLayout>,

        /// Nissan ALT2 checksum (in hex, START:END:SUMLOC:XORLOC:SKIPLOC)
        #[arg(long, value_parser = parse_nissan_alt2)]
        nissan_alt2: Option<NissanAlt2Layout>,
    },
}

impl Commands {
    pub fn rom(&self) -> &PathBuf {
        match self {
            Commands::Info { rom } | Commands::Dump { rom, .. } | Commands::Checksum { rom, .. } => {
                rom
            }
        }
    }
}
