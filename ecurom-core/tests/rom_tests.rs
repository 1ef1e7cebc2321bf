// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

use ecurom_core::checksum::{
    MITSUCAN_FIXUP_OFFSET, MITSUCAN_ROM_SIZE, MITSUCAN_TARGET, validate_mitsucan_checksum,
};
use ecurom_core::{
    CellEdit, DefinitionParser, TableView, TableViewMut, ValueMode, best_match,
    recompute_checksum, validate_checksum, write_checksum,
};

const EVO: &str = r#"<rom>
  <romid>
    <xmlid>56890009</xmlid>
    <internalidaddress>5002a</internalidaddress>
    <internalidstring>56890009</internalidstring>
    <make>Mitsubishi</make>
    <model>Lancer</model>
    <checksummodule>mitsucan</checksummodule>
  </romid>
  <scaling name="Temp" units="C" toexpr="x-40" storagetype="uint8"/>
  <scaling name="Boost" units="kPa" toexpr="x*5/8" storagetype="uint16" endian="big"/>
  <table name="Cooling Fan" category="Misc" address="60000" type="2D" scaling="Temp">
    <table name="Step" type="Static X Axis" elements="4">
      <data>1</data><data>2</data><data>3</data><data>4</data>
    </table>
  </table>
  <table name="Boost Limit" category="Boost" address="60010" type="1D" scaling="Boost"/>
</rom>"#;

const OTHER: &str = r#"<rom>
  <romid>
    <xmlid>56890010</xmlid>
    <internalidaddress>5002a</internalidaddress>
    <internalidstring>56890010</internalidstring>
  </romid>
</rom>"#;

fn evo_rom() -> Vec<u8> {
    let mut rom = vec![0u8; MITSUCAN_ROM_SIZE];
    rom[0x5002A..0x5002A + 8].copy_from_slice(b"56890009");
    rom
}

#[test]
fn test_identify_rom() {
    let parser = DefinitionParser::new();
    let stubs = vec![
        parser.peek_str(OTHER, "56890010.xml").unwrap(),
        parser.peek_str(EVO, "56890009.xml").unwrap(),
    ];
    let (best, score) = best_match(&evo_rom(), &stubs).unwrap();
    assert_eq!(best.name, "56890009");
    assert_eq!(score, 100);

    assert!(best_match(&vec![0u8; 0x1000], &stubs).is_none());
}

#[test]
fn test_edit_then_fix_checksum() {
    let def = DefinitionParser::new()
        .parse_str(EVO, "56890009.xml", None)
        .unwrap();
    let checksum = def.checksum.clone().unwrap();
    let mut rom = evo_rom();

    let fan = def.table("Cooling Fan").unwrap();
    {
        let mut view = TableViewMut::new(fan, &mut rom);
        let patches = view
            .apply_patch(
                &[
                    CellEdit {
                        row: 0,
                        col: 0,
                        value: 85.0,
                    },
                    CellEdit {
                        row: 3,
                        col: 0,
                        value: 100.0,
                    },
                ],
                ValueMode::Physical,
            )
            .unwrap();
        assert_eq!(patches[0].address, 0x60000);
        assert_eq!(patches[0].after, vec![125]);
        assert_eq!(patches[1].address, 0x60003);
    }

    let boost = def.table("Boost Limit").unwrap();
    TableViewMut::new(boost, &mut rom)
        .set(0, 0, 200.0, ValueMode::Physical)
        .unwrap();
    assert_eq!(&rom[0x60010..0x60012], &[0x01, 0x40]);

    assert!(!validate_checksum(&rom, &checksum).unwrap().valid);
    let value = recompute_checksum(&rom, &checksum).unwrap();
    write_checksum(&mut rom, value, &checksum).unwrap();

    let result = validate_checksum(&rom, &checksum).unwrap();
    assert!(result.valid);
    assert!(validate_mitsucan_checksum(&rom).unwrap());

    let view = TableView::new(fan, &rom);
    assert_eq!(
        view.read_all(ValueMode::Physical).unwrap(),
        vec![vec![85.0], vec![-40.0], vec![-40.0], vec![100.0]]
    );
}

#[test]
fn test_mitsucan_generic_matches_vendor() {
    let def = DefinitionParser::new()
        .parse_str(EVO, "56890009.xml", None)
        .unwrap();
    let checksum = def.checksum.unwrap();
    let rom = vec![0u8; MITSUCAN_ROM_SIZE];
    assert_eq!(recompute_checksum(&rom, &checksum).unwrap(), MITSUCAN_TARGET);
    assert_eq!(checksum.storage.offset, MITSUCAN_FIXUP_OFFSET);
}
