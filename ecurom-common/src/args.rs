// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! clap `value_parser` functions shared by the binaries

use ecurom_core::checksum::{NissanAlt2Layout, NissanLayout, SubaruDensoTable};

/// A cell edit given on the command line, before the table is resolved
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct TableEdit {
    pub table: String,
    pub row: usize,
    pub col: usize,
    pub value: f64,
}

/// Parses a hex value, with an optional `0x` or `$` prefix
pub fn parse_hex(s: &str) -> Result<usize, String> {
    let s = s.trim();
    let cleaned = if let Some(rest) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        rest
    } else if let Some(rest) = s.strip_prefix('$') {
        rest
    } else {
        s
    };

    usize::from_str_radix(cleaned, 16).map_err(|_| format!("Invalid hex value: {}", s))
}

fn parse_index(s: &str) -> Result<usize, String> {
    s.trim()
        .parse()
        .map_err(|_| format!("Invalid cell index: {}", s.trim()))
}

/// Parses `NAME[ROW,COL]=VALUE`, `NAME[ROW]=VALUE` or `NAME=VALUE`
pub fn parse_cell_edit(s: &str) -> Result<TableEdit, String> {
    let (lhs, value) = s
        .rsplit_once('=')
        .ok_or_else(|| format!("Edit must be NAME[ROW,COL]=VALUE, found: {}", s))?;
    let value: f64 = value
        .trim()
        .parse()
        .map_err(|_| format!("Invalid value: {}", value.trim()))?;

    let lhs = lhs.trim();
    let (table, row, col) = match lhs.strip_suffix(']') {
        Some(rest) => {
            let (name, index) = rest
                .rsplit_once('[')
                .ok_or_else(|| format!("Missing '[' in: {}", lhs))?;
            let (row, col) = match index.split_once(',') {
                Some((row, col)) => (parse_index(row)?, parse_index(col)?),
                None => (parse_index(index)?, 0),
            };
            (name.trim(), row, col)
        }
        None => (lhs, 0, 0),
    };
    if table.is_empty() {
        return Err(format!("Missing table name in: {}", s));
    }

    Ok(TableEdit {
        table: table.to_string(),
        row,
        col,
        value,
    })
}

fn hex_fields<const N: usize>(s: &str, format: &str) -> Result<[usize; N], String> {
    let parts: Vec<&str> = s.split(':').collect();
    if parts.len() != N {
        return Err(format!("Format must be: {} (hex)", format));
    }
    let mut fields = [0usize; N];
    for (field, part) in fields.iter_mut().zip(parts) {
        *field = parse_hex(part)?;
    }
    Ok(fields)
}

/// Parses `OFFSET:COUNT`, both hex
pub fn parse_subaru_denso(s: &str) -> Result<SubaruDensoTable, String> {
    let [offset, entries] = hex_fields::<2>(s, "OFFSET:COUNT")?;
    if entries == 0 {
        return Err("Checksum table must have at least one entry".to_string());
    }
    Ok(SubaruDensoTable::new(offset, entries))
}

/// Parses `START:END:SUMLOC:XORLOC`, all hex
pub fn parse_nissan_std(s: &str) -> Result<NissanLayout, String> {
    let [start, end, sumloc, xorloc] = hex_fields::<4>(s, "START:END:SUMLOC:XORLOC")?;
    Ok(NissanLayout {
        start,
        end,
        sumloc,
        xorloc,
    })
}

/// Parses `START:END:SUMLOC:XORLOC:SKIPLOC`, all hex
pub fn parse_nissan_alt2(s: &str) -> Result<NissanAlt2Layout, String> {
    let [start, end, sumloc, xorloc, skiploc] =
        hex_fields::<5>(s, "START:END:SUMLOC:XORLOC:SKIPLOC")?;
    Ok(NissanAlt2Layout {
        start,
        end,
        sumloc,
        xorloc,
        skiploc,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex() {
        assert_eq!(parse_hex("0x1000"), Ok(0x1000));
        assert_eq!(parse_hex("$BFFF0"), Ok(0xBFFF0));
        assert_eq!(parse_hex("ff"), Ok(0xFF));
        assert!(parse_hex("0xZZ").is_err());
        assert!(parse_hex("").is_err());
    }

    #[test]
    fn test_parse_cell_edit() {
        assert_eq!(
            parse_cell_edit("Fuel Map[3,4]=12.5"),
            Ok(TableEdit {
                table: "Fuel Map".into(),
                row: 3,
                col: 4,
                value: 12.5
            })
        );
        assert_eq!(
            parse_cell_edit("Rev Limit = 7200").map(|e| (e.table, e.row, e.col, e.value)),
            Ok(("Rev Limit".to_string(), 0, 0, 7200.0))
        );
        assert_eq!(
            parse_cell_edit("Coolant[ 2 ]=-10").map(|e| (e.row, e.col, e.value)),
            Ok((2, 0, -10.0))
        );
        assert!(parse_cell_edit("Fuel Map[3,4]").is_err());
        assert!(parse_cell_edit("Fuel Map[x,4]=1").is_err());
        assert!(parse_cell_edit("[1,1]=1").is_err());
        assert!(parse_cell_edit("Fuel Map 3,4]=1").is_err());
    }

    #[test]
    fn test_parse_layouts() {
        assert_eq!(
            parse_subaru_denso("0x7FB80:10"),
            Ok(SubaruDensoTable::new(0x7FB80, 0x10))
        );
        assert!(parse_subaru_denso("7FB80:0").is_err());

        let layout = parse_nissan_std("0:8000:7FF8:7FFC").unwrap();
        assert_eq!(layout.end, 0x8000);
        assert_eq!(layout.xorloc, 0x7FFC);
        assert!(parse_nissan_std("0:8000:7FF8").is_err());

        let layout = parse_nissan_alt2("0:100000:FF0:FF4:40000").unwrap();
        assert_eq!(layout.skiploc, 0x40000);
    }
}
