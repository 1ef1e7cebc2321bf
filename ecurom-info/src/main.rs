/// ecurom-info
///
/// This tool identifies an ECU ROM image and reports what its definition
/// says about it.
///
/// It works by:
/// - Loading the ROM image
/// - Finding the definition, either the one given with --def or the best
///   fingerprint match among the definitions in the library directories
/// - Fully parsing that definition, following its includes
/// - Then reporting the definition, a table's contents or the state of the
///   ROM's checksums, depending on the subcommand.

// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

mod args;
mod load;

use anyhow::{Result, bail};
use clap::Parser;
#[allow(unused_imports)]
use log::{debug, info, warn};
use serde::Serialize;

use args::{Args, Commands};
use ecurom_common::init_logging;
use ecurom_common::library::SelectedDefinition;
use ecurom_core::checksum::{
    DensoEntryStatus, NissanAlt2Layout, NissanLayout, SubaruDensoTable,
    validate_nissan_alt2_checksum, validate_nissan_std_checksum, validate_subaru_denso_checksums,
};
use ecurom_core::definition::Platform;
use ecurom_core::table::read_axis;
use ecurom_core::{
    ChecksumDefinition, ChecksumValidation, RomDefinition, TableDefinition, TableView, ValueMode,
    validate_checksum,
};
use load::{LoadedRom, load_rom};

#[derive(Serialize)]
struct TableSummary<'a> {
    name: &'a str,
    category: Option<&'a str>,
    shape: String,
    address: usize,
    dtype: String,
    unit: Option<&'a str>,
}

#[derive(Serialize)]
struct InfoReport<'a> {
    rom: String,
    size: usize,
    definition: &'a str,
    definition_path: String,
    uri: &'a str,
    score: u32,
    platform: &'a Platform,
    checksum: Option<&'a ChecksumDefinition>,
    tables: Vec<TableSummary<'a>>,
}

#[derive(Serialize)]
struct DumpReport<'a> {
    name: &'a str,
    mode: ValueMode,
    unit: Option<&'a str>,
    z: Vec<Vec<f64>>,
    x: Option<Vec<f64>>,
    y: Option<Vec<f64>>,
}

#[derive(Serialize, Default)]
struct ChecksumReport {
    definition: Option<ChecksumValidation>,
    subaru_denso: Option<Vec<DensoEntryStatus>>,
    nissan_std: Option<bool>,
    nissan_alt2: Option<bool>,
}

impl ChecksumReport {
    fn all_valid(&self) -> bool {
        self.definition.is_none_or(|v| v.valid)
            && self
                .subaru_denso
                .as_ref()
                .is_none_or(|s| s.iter().all(DensoEntryStatus::is_ok))
            && self.nissan_std.unwrap_or(true)
            && self.nissan_alt2.unwrap_or(true)
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let rom = load_rom(args.command.rom())?;
    debug!("Loaded {} ({} bytes)", rom.path.display(), rom.bytes.len());

    match &args.command {
        Commands::Info { .. } => {
            let selected = rom.definition(args.def.as_deref(), &args.defs)?;
            if args.json {
                print_json(&info_report(&rom, &selected))?;
            } else {
                print_info(&rom, &selected);
            }
        }
        Commands::Dump { table, raw, .. } => {
            let selected = rom.definition(args.def.as_deref(), &args.defs)?;
            let mode = if *raw {
                ValueMode::Raw
            } else {
                ValueMode::Physical
            };
            let report = dump_table(&rom, &selected.definition, table, mode)?;
            if args.json {
                print_json(&report)?;
            } else {
                print_dump(&report);
            }
        }
        Commands::Checksum {
            subaru_denso,
            nissan_std,
            nissan_alt2,
            ..
        } => {
            let vendor = subaru_denso.is_some() || nissan_std.is_some() || nissan_alt2.is_some();
            let selected = match rom.definition(args.def.as_deref(), &args.defs) {
                Ok(selected) => Some(selected),
                Err(e) if vendor => {
                    warn!("{:#}", e);
                    None
                }
                Err(e) => return Err(e),
            };
            let report = check_checksums(
                &rom,
                selected.as_ref().map(|s| &s.definition),
                subaru_denso.as_ref(),
                nissan_std.as_ref(),
                nissan_alt2.as_ref(),
            )?;
            if args.json {
                print_json(&report)?;
            } else {
                print_checksums(&report);
            }
            if !report.all_valid() {
                bail!("Checksum validation failed");
            }
        }
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn info_report<'a>(rom: &LoadedRom, selected: &'a SelectedDefinition) -> InfoReport<'a> {
    let def = &selected.definition;
    InfoReport {
        rom: rom.path.display().to_string(),
        size: rom.bytes.len(),
        definition: &def.name,
        definition_path: selected.path.display().to_string(),
        uri: &def.uri,
        score: selected.score,
        platform: &def.platform,
        checksum: def.checksum.as_ref(),
        tables: def.tables.iter().map(table_summary).collect(),
    }
}

fn table_summary(table: &TableDefinition) -> TableSummary<'_> {
    let z = table.z();
    TableSummary {
        name: table.name(),
        category: table.category(),
        shape: table.shape(),
        address: z.address,
        dtype: z.dtype.to_string(),
        unit: z.unit.as_deref(),
    }
}

fn print_info(rom: &LoadedRom, selected: &SelectedDefinition) {
    let def = &selected.definition;

    println!("ECU ROM Information");
    println!("===================");
    println!("File:          {}", rom.path.display());
    println!(
        "Size:          {} bytes (0x{:X})",
        rom.bytes.len(),
        rom.bytes.len()
    );
    println!();
    println!("Definition");
    println!("----------");
    println!("Name:          {}", def.name);
    println!("File:          {}", selected.path.display());
    println!("Score:         {}", selected.score);
    println!("Platform:      {}", def.platform);
    match &def.checksum {
        Some(checksum) => {
            let algorithm = match checksum.custom {
                Some(custom) => format!("{} ({})", checksum.algorithm, custom),
                None => checksum.algorithm.to_string(),
            };
            println!("Checksum:      {}", algorithm);
            for region in &checksum.regions {
                println!("  Region:      0x{:X}-0x{:X}", region.start, region.end);
            }
            println!(
                "  Stored at:   0x{:X} ({} bytes, {})",
                checksum.storage.offset, checksum.storage.size, checksum.storage.endianness
            );
        }
        None => println!("Checksum:      <none>"),
    }
    println!();
    println!("Tables: {}", def.tables.len());
    println!("-----------");

    let width = def
        .tables
        .iter()
        .map(|t| t.name().len())
        .max()
        .unwrap_or(0);
    for table in &def.tables {
        let z = table.z();
        println!(
            "  {:<width$}  {:<10}  0x{:06X}  {:<4}  {}",
            table.name(),
            table.shape(),
            z.address,
            z.dtype,
            table.category().unwrap_or("-"),
            width = width
        );
    }
}

fn dump_table<'a>(
    rom: &LoadedRom,
    def: &'a RomDefinition,
    name: &str,
    mode: ValueMode,
) -> Result<DumpReport<'a>> {
    let Some(table) = def.table(name) else {
        bail!("Table '{}' not found in definition {}", name, def.name);
    };

    let view = TableView::new(table, &rom.bytes);
    let z = view.read_all(mode)?;
    let x = table.x().map(|a| read_axis(a, &rom.bytes)).transpose()?;
    let y = table.y().map(|a| read_axis(a, &rom.bytes)).transpose()?;

    Ok(DumpReport {
        name: table.name(),
        mode,
        unit: match mode {
            ValueMode::Raw => None,
            ValueMode::Physical => table.z().unit.as_deref(),
        },
        z,
        x,
        y,
    })
}

fn format_value(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{:.0}", value)
    } else {
        format!("{:.3}", value)
    }
}

fn print_dump(report: &DumpReport) {
    match report.unit {
        Some(unit) => println!("{} ({})", report.name, unit),
        None => println!("{}", report.name),
    }
    println!();

    let is_grid = report.z.first().is_some_and(|row| row.len() > 1);
    if !is_grid {
        // One value per row, labelled by the x axis if there is one
        for (ii, row) in report.z.iter().enumerate() {
            let label = report
                .x
                .as_ref()
                .and_then(|x| x.get(ii))
                .map(|v| format_value(*v))
                .unwrap_or_else(|| ii.to_string());
            let value = row.first().map(|v| format_value(*v)).unwrap_or_default();
            println!("{:>10} | {:>10}", label, value);
        }
        return;
    }

    let mut header = format!("{:>10} |", "");
    if let Some(x) = &report.x {
        for value in x {
            header.push_str(&format!(" {:>8}", format_value(*value)));
        }
    }
    println!("{}", header);
    println!("{}", "-".repeat(header.len()));
    for (ii, row) in report.z.iter().enumerate() {
        let label = report
            .y
            .as_ref()
            .and_then(|y| y.get(ii))
            .map(|v| format_value(*v))
            .unwrap_or_else(|| ii.to_string());
        let mut line = format!("{:>10} |", label);
        for value in row {
            line.push_str(&format!(" {:>8}", format_value(*value)));
        }
        println!("{}", line);
    }
}

fn check_checksums(
    rom: &LoadedRom,
    def: Option<&RomDefinition>,
    subaru_denso: Option<&SubaruDensoTable>,
    nissan_std: Option<&NissanLayout>,
    nissan_alt2: Option<&NissanAlt2Layout>,
) -> Result<ChecksumReport> {
    let bytes = &rom.bytes;
    let mut report = ChecksumReport::default();

    if let Some(checksum) = def.and_then(|d| d.checksum.as_ref()) {
        report.definition = Some(validate_checksum(bytes, checksum)?);
    }
    if let Some(table) = subaru_denso {
        report.subaru_denso = Some(validate_subaru_denso_checksums(bytes, table)?);
    }
    if let Some(layout) = nissan_std {
        report.nissan_std = Some(validate_nissan_std_checksum(bytes, layout)?);
    }
    if let Some(layout) = nissan_alt2 {
        report.nissan_alt2 = Some(validate_nissan_alt2_checksum(bytes, layout)?);
    }

    Ok(report)
}

fn valid_str(valid: bool) -> &'static str {
    if valid { "valid" } else { "INVALID" }
}

fn print_checksums(report: &ChecksumReport) {
    println!("Checksums");
    println!("---------");
    match &report.definition {
        Some(v) => println!(
            "Definition:    {} ({}: stored 0x{:08X}, expected 0x{:08X})",
            valid_str(v.valid),
            v.algorithm,
            v.actual,
            v.expected
        ),
        None => println!("Definition:    <none>"),
    }
    if let Some(statuses) = &report.subaru_denso {
        println!("Subaru/Denso:");
        for (ii, status) in statuses.iter().enumerate() {
            match status {
                DensoEntryStatus::Valid => println!("  Entry {:>2}:    valid", ii),
                DensoEntryStatus::Empty => println!("  Entry {:>2}:    empty", ii),
                DensoEntryStatus::Disabled => println!("  Entry {:>2}:    checksums disabled", ii),
                DensoEntryStatus::Invalid { expected, actual } => println!(
                    "  Entry {:>2}:    INVALID (stored 0x{:08X}, expected 0x{:08X})",
                    ii, actual, expected
                ),
            }
        }
    }
    if let Some(valid) = report.nissan_std {
        println!("Nissan STD:    {}", valid_str(valid));
    }
    if let Some(valid) = report.nissan_alt2 {
        println!("Nissan ALT2:   {}", valid_str(valid));
    }
}
