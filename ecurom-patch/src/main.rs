// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

mod config;
mod rom;

use anyhow::{Context, Result};
use clap::Parser;
#[allow(unused_imports)]
use log::{debug, info, warn};
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

use crate::config::Config;
use crate::rom::{apply_edits, changed_bytes, fix_checksums, write_output};
use ecurom_common::args::{
    TableEdit, parse_cell_edit, parse_nissan_alt2, parse_nissan_std, parse_subaru_denso,
};
use ecurom_common::init_logging;
use ecurom_common::library::select_definition;
use ecurom_core::ValueMode;
use ecurom_core::checksum::{NissanAlt2Layout, NissanLayout, SubaruDensoTable};

#[derive(Parser, Debug)]
#[clap(
    name = "ecurom-patch",
    about = "ECU ROM table editor and checksum fixer",
    version
)]
struct Args {
    /// ROM image to patch (left unmodified)
    rom: PathBuf,

    /// Output file for the patched image
    #[clap(long, short = 'o')]
    output: PathBuf,

    /// Cell edit (NAME[ROW,COL]=VALUE, NAME[ROW]=VALUE or NAME=VALUE)
    #[clap(long = "set", value_parser = parse_cell_edit)]
    set: Vec<TableEdit>,

    /// Edit values are raw stored values rather than physical ones
    #[clap(long)]
    raw: bool,

    /// Recompute the checksum described by the definition
    #[clap(long)]
    fix_checksums: bool,

    /// Recompute a Subaru/Denso checksum table (in hex, OFFSET:COUNT)
    #[clap(long, value_parser = parse_subaru_denso)]
    subaru_denso: Vec<SubaruDensoTable>,

    /// Recompute a Nissan standard checksum (in hex, START:END:SUMLOC:XORLOC)
    #[clap(long, value_parser = parse_nissan_std)]
    nissan_std: Vec<NissanLayout>,

    /// Recompute a Nissan ALT2 checksum (in hex, START:END:SUMLOC:XORLOC:SKIPLOC)
    #[clap(long, value_parser = parse_nissan_alt2)]
    nissan_alt2: Vec<NissanAlt2Layout>,

    /// Directory to search for definitions (may be repeated)
    #[clap(long = "defs")]
    defs: Vec<PathBuf>,

    /// Definition file to use instead of identifying the ROM
    #[clap(long)]
    def: Option<PathBuf>,

    /// Overwrite an existing output file
    #[clap(long)]
    overwrite: bool,

    /// Keep a timestamped copy of the output file being overwritten
    #[clap(long, requires = "overwrite")]
    backup: bool,

    /// Automatically answer [y]es to questions
    #[clap(long, short = 'y')]
    yes: bool,

    /// Enable debug logging
    #[clap(long, short = 'v')]
    verbose: bool,
}

fn confirm_write(config: &Config, changed: usize) -> Result<bool> {
    print!(
        "Write {} changed byte(s) to {}? (y/n): ",
        changed,
        config.output.display()
    );
    io::stdout().flush()?;

    if config.auto_yes {
        println!("Automatically writing due to --yes flag.");
        return Ok(true);
    }
    let mut input = String::new();
    io::stdin()
        .read_line(&mut input)
        .map_err(|e| anyhow::anyhow!("Failed to read user input: {}", e))?;

    let response = input.trim().to_lowercase();
    Ok(response == "y" || response == "yes")
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let config = Config {
        rom: args.rom,
        output: args.output,
        edits: args.set,
        mode: if args.raw {
            ValueMode::Raw
        } else {
            ValueMode::Physical
        },
        fix_checksums: args.fix_checksums,
        subaru_denso: args.subaru_denso,
        nissan_std: args.nissan_std,
        nissan_alt2: args.nissan_alt2,
        defs: args.defs,
        def: args.def,
        overwrite: args.overwrite,
        backup: args.backup,
        auto_yes: args.yes,
    };

    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;

    let original = fs::read(&config.rom)
        .with_context(|| format!("Failed to read {}", config.rom.display()))?;

    let selected = if config.needs_definition() {
        let selected = select_definition(&original, config.def.as_deref(), &config.defs)
            .with_context(|| {
                format!(
                    "Unable to find a definition for {}",
                    config.rom.display()
                )
            })?;
        println!(
            "Definition: {} (score {})",
            selected.definition.name, selected.score
        );
        Some(selected)
    } else {
        None
    };
    let definition = selected.as_ref().map(|s| &s.definition);

    let mut patched = original.clone();
    if let Some(def) = definition {
        for applied in apply_edits(&mut patched, def, &config.edits, config.mode)? {
            println!(
                "Set {}[{},{}] at 0x{:X}: {:02X?} -> {:02X?}",
                applied.table,
                applied.row,
                applied.col,
                applied.patch.address,
                applied.patch.before,
                applied.patch.after
            );
        }
    }

    for fix in fix_checksums(&mut patched, definition, &config)? {
        println!("Updated {}", fix);
    }

    let changed = changed_bytes(&original, &patched);
    if changed == 0 {
        println!("No bytes changed");
    }
    if !confirm_write(&config, changed)? {
        println!("Not writing {}", config.output.display());
        return Ok(());
    }

    if let Some(backup) = write_output(&config.output, &patched, config.backup)? {
        println!("Backed up previous output to {}", backup.display());
    }
    println!("Wrote {}", config.output.display());

    Ok(())
}
