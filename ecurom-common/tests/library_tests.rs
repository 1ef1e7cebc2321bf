// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

use std::fs;

use ecurom_common::args::parse_cell_edit;
use ecurom_common::library::{DefinitionLibrary, select_definition};
use ecurom_core::{TableView, ValueMode};
use tempfile::TempDir;

const BASE: &str = r#"<rom>
  <romid><xmlid>base</xmlid></romid>
  <scaling name="RPM" units="rpm" toexpr="x*25" storagetype="uint16"/>
  <table name="Rev Limit" category="Limits" type="1D" scaling="RPM"/>
</rom>"#;

const CHILD: &str = r#"<rom>
  <romid>
    <xmlid>A2WC522N</xmlid>
    <internalidaddress>2000</internalidaddress>
    <internalidhex>A2 BC</internalidhex>
  </romid>
  <include>base</include>
  <table name="Rev Limit" address="3000"/>
</rom>"#;

#[test]
fn test_includes_resolve_across_library_dirs() {
    let ours = TempDir::new().unwrap();
    let shared = TempDir::new().unwrap();
    fs::write(shared.path().join("base.xml"), BASE).unwrap();
    fs::write(ours.path().join("child.xml"), CHILD).unwrap();
    fs::write(
        ours.path().join("evo.xml"),
        r#"<rom><romid><xmlid>evo</xmlid><internalidaddress>2000</internalidaddress>
           <internalidhex>a2c5</internalidhex></romid><include>base</include>
           <table name="Rev Limit" address="3002"/></rom>"#,
    )
    .unwrap();

    let dirs = vec![ours.path().to_path_buf(), shared.path().to_path_buf()];
    let library = DefinitionLibrary::load(dirs.clone()).unwrap();
    assert_eq!(library.entries().len(), 3);

    let mut rom = vec![0u8; 0x4000];
    rom[0x2000..0x2002].copy_from_slice(&[0xA2, 0xC5]);
    rom[0x3002..0x3004].copy_from_slice(&[0x01, 0x20]);

    let selected = select_definition(&rom, None, &dirs).unwrap();
    assert_eq!(selected.definition.name, "evo");
    assert_eq!(selected.path, ours.path().join("evo.xml"));

    let edit = parse_cell_edit("Rev Limit=7200").unwrap();
    let table = selected.definition.table(&edit.table).unwrap();
    assert_eq!(table.category(), Some("Limits"));
    let view = TableView::new(table, &rom);
    assert_eq!(view.get(0, 0, ValueMode::Physical).unwrap(), 288.0 * 25.0);
}

#[test]
fn test_unidentified_rom() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("base.xml"), BASE).unwrap();

    let rom = vec![0xFFu8; 0x100];
    let err = select_definition(&rom, None, &[dir.path().to_path_buf()]).unwrap_err();
    assert!(err.to_string().contains("No matching definition"));
}
