// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Scalar and bit-field codec
//!
//! Decodes and encodes the fixed-width scalars that calibration tables,
//! axes and checksums are stored as, plus big-endian bit fields of up to 32
//! bits.
//!
//! Integer encoding never fails on range: values are rounded to the nearest
//! integer and clamped to the type's range.  Only buffer accesses can fail,
//! with [`Error::OutOfBounds`].

use core::fmt;

use crate::error::{Error, Result, check_range};

/// Storage type of a single scalar in the ROM
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    F32,
}

impl DataType {
    /// Parses an ECUFlash `storagetype` attribute value
    pub fn from_storage_type(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "uint8" | "u8" => Some(DataType::U8),
            "int8" | "i8" => Some(DataType::I8),
            "uint16" | "u16" => Some(DataType::U16),
            "int16" | "i16" => Some(DataType::I16),
            "uint32" | "u32" => Some(DataType::U32),
            "int32" | "i32" => Some(DataType::I32),
            "float" | "float32" | "f32" => Some(DataType::F32),
            _ => None,
        }
    }

    /// Width of the type in bytes
    pub fn width(&self) -> usize {
        match self {
            DataType::U8 | DataType::I8 => 1,
            DataType::U16 | DataType::I16 => 2,
            DataType::U32 | DataType::I32 | DataType::F32 => 4,
        }
    }

    /// Inclusive numeric range of an integer type, `None` for floats
    pub fn int_range(&self) -> Option<(f64, f64)> {
        match self {
            DataType::U8 => Some((0.0, u8::MAX as f64)),
            DataType::I8 => Some((i8::MIN as f64, i8::MAX as f64)),
            DataType::U16 => Some((0.0, u16::MAX as f64)),
            DataType::I16 => Some((i16::MIN as f64, i16::MAX as f64)),
            DataType::U32 => Some((0.0, u32::MAX as f64)),
            DataType::I32 => Some((i32::MIN as f64, i32::MAX as f64)),
            DataType::F32 => None,
        }
    }

    pub fn is_float(&self) -> bool {
        matches!(self, DataType::F32)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::U8 => write!(f, "uint8"),
            DataType::I8 => write!(f, "int8"),
            DataType::U16 => write!(f, "uint16"),
            DataType::I16 => write!(f, "int16"),
            DataType::U32 => write!(f, "uint32"),
            DataType::I32 => write!(f, "int32"),
            DataType::F32 => write!(f, "float"),
        }
    }
}

/// Byte order of a multi-byte scalar
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Endianness {
    /// Most ECUs in scope (SH2, M32R) are big-endian
    #[default]
    Big,
    Little,
}

impl Endianness {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "big" | "be" => Some(Endianness::Big),
            "little" | "le" => Some(Endianness::Little),
            _ => None,
        }
    }
}

impl fmt::Display for Endianness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endianness::Big => write!(f, "big"),
            Endianness::Little => write!(f, "little"),
        }
    }
}

/// Decodes the scalar of type `dtype` at `byte_offset` within `buffer`.
pub fn decode_scalar(
    buffer: &[u8],
    byte_offset: usize,
    dtype: DataType,
    endianness: Endianness,
) -> Result<f64> {
    let end = check_range(byte_offset, dtype.width(), buffer.len())?;
    Ok(decode_bytes(&buffer[byte_offset..end], dtype, endianness))
}

/// Decodes a scalar from a slice holding exactly `dtype.width()` bytes.
///
/// Fails with [`Error::OutOfBounds`] if the slice is shorter than the type.
/// Extra trailing bytes are ignored.
pub fn decode_scalar_bytes(bytes: &[u8], dtype: DataType, endianness: Endianness) -> Result<f64> {
    decode_scalar(bytes, 0, dtype, endianness)
}

// Caller guarantees `bytes.len() >= dtype.width()`
fn decode_bytes(bytes: &[u8], dtype: DataType, endianness: Endianness) -> f64 {
    let raw = assemble(bytes, dtype.width(), endianness);
    match dtype {
        DataType::U8 | DataType::U16 | DataType::U32 => raw as f64,
        DataType::I8 => {
            let v = raw as i64;
            (if v & 0x80 != 0 { v - 0x100 } else { v }) as f64
        }
        DataType::I16 => {
            let v = raw as i64;
            (if v & 0x8000 != 0 { v - 0x1_0000 } else { v }) as f64
        }
        DataType::I32 => (raw as i32) as f64,
        DataType::F32 => f32::from_bits(raw) as f64,
    }
}

// Assembles `width` bytes into a u32 register honouring byte order
fn assemble(bytes: &[u8], width: usize, endianness: Endianness) -> u32 {
    let mut value = 0u32;
    match endianness {
        Endianness::Big => {
            for &b in &bytes[..width] {
                value = (value << 8) | b as u32;
            }
        }
        Endianness::Little => {
            for &b in bytes[..width].iter().rev() {
                value = (value << 8) | b as u32;
            }
        }
    }
    value
}

/// Encodes `value` as `dtype`.
///
/// Integer types are rounded to the nearest integer and clamped to the
/// type's range.  `f32` is neither rounded nor clamped.
pub fn encode_scalar(value: f64, dtype: DataType, endianness: Endianness) -> Vec<u8> {
    let raw: u32 = match dtype {
        DataType::F32 => (value as f32).to_bits(),
        _ => {
            let (min, max) = dtype.int_range().unwrap_or((0.0, 0.0));
            let v = if value.is_nan() {
                0.0
            } else {
                value.round().clamp(min, max)
            };
            match dtype {
                DataType::U8 | DataType::U16 | DataType::U32 => v as u32,
                _ => (v as i32) as u32,
            }
        }
    };

    let width = dtype.width();
    let be = raw.to_be_bytes();
    let mut out = be[4 - width..].to_vec();
    if endianness == Endianness::Little {
        out.reverse();
    }
    out
}

/// Writes `value` encoded as `dtype` into `buffer` at `byte_offset`.
pub fn write_scalar(
    buffer: &mut [u8],
    byte_offset: usize,
    value: f64,
    dtype: DataType,
    endianness: Endianness,
) -> Result<()> {
    let end = check_range(byte_offset, dtype.width(), buffer.len())?;
    buffer[byte_offset..end].copy_from_slice(&encode_scalar(value, dtype, endianness));
    Ok(())
}

/// Reads a big-endian 32-bit word, as used by all of the word-sum checksums.
pub fn read_u32_be(buffer: &[u8], offset: usize) -> Result<u32> {
    check_range(offset, 4, buffer.len())?;
    Ok(u32::from_be_bytes([
        buffer[offset],
        buffer[offset + 1],
        buffer[offset + 2],
        buffer[offset + 3],
    ]))
}

/// Reads a big-endian 16-bit word.
pub fn read_u16_be(buffer: &[u8], offset: usize) -> Result<u16> {
    check_range(offset, 2, buffer.len())?;
    Ok(u16::from_be_bytes([buffer[offset], buffer[offset + 1]]))
}

/// Extracts `bit_length` bits starting at `bit_offset`.
///
/// Bit 0 is the most significant bit of byte 0, bit 8 the most significant
/// bit of byte 1, and so on.  `bit_length` must be 1 to 32.
pub fn extract_bits(buffer: &[u8], bit_offset: usize, bit_length: usize) -> Result<u32> {
    if bit_length == 0 || bit_length > 32 {
        return Err(Error::InvalidBitRange {
            bit_offset,
            bit_length,
        });
    }

    let bit_end = bit_offset
        .checked_add(bit_length)
        .ok_or(Error::InvalidBitRange {
            bit_offset,
            bit_length,
        })?;
    let byte_start = bit_offset / 8;
    let byte_end = bit_end.div_ceil(8);
    if byte_end > buffer.len() {
        return Err(Error::out_of_bounds(
            byte_start,
            byte_end - byte_start,
            buffer.len(),
        ));
    }

    // At most 5 bytes are spanned, so a u64 accumulator is enough
    let mut acc = 0u64;
    for &b in &buffer[byte_start..byte_end] {
        acc = (acc << 8) | b as u64;
    }
    let trailing = byte_end * 8 - bit_end;
    let mask = if bit_length == 32 {
        u32::MAX as u64
    } else {
        (1u64 << bit_length) - 1
    };
    Ok(((acc >> trailing) & mask) as u32)
}

/// As [`extract_bits`], reinterpreting the top extracted bit as a two's
/// complement sign bit.  `bit_length` must be 2 to 32.
pub fn extract_signed_bits(buffer: &[u8], bit_offset: usize, bit_length: usize) -> Result<i32> {
    if bit_length < 2 {
        return Err(Error::InvalidBitRange {
            bit_offset,
            bit_length,
        });
    }
    let raw = extract_bits(buffer, bit_offset, bit_length)?;
    let shift = 32 - bit_length as u32;
    Ok(((raw << shift) as i32) >> shift)
}

/// Reads the single bit at `bit_offset`.
pub fn extract_bit_flag(buffer: &[u8], bit_offset: usize) -> Result<bool> {
    extract_bits(buffer, bit_offset, 1).map(|v| v != 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_TYPES: [DataType; 7] = [
        DataType::U8,
        DataType::I8,
        DataType::U16,
        DataType::I16,
        DataType::U32,
        DataType::I32,
        DataType::F32,
    ];

    fn expected_after_encode(v: f64, dtype: DataType) -> f64 {
        match dtype.int_range() {
            Some((min, max)) => v.round().clamp(min, max),
            None => v as f32 as f64,
        }
    }

    #[test]
    fn test_round_trip_all_types() {
        let samples = [0.0, 1.4, 1.6, -1.5, 127.0, 200.0, -200.0, 70000.0, -3.0e9, 5.0e9];
        for dtype in ALL_TYPES {
            for endianness in [Endianness::Big, Endianness::Little] {
                for v in samples {
                    let bytes = encode_scalar(v, dtype, endianness);
                    assert_eq!(bytes.len(), dtype.width());
                    let decoded = decode_scalar(&bytes, 0, dtype, endianness).unwrap();
                    let expected = expected_after_encode(v, dtype);
                    assert!(
                        (decoded - expected).abs() <= expected.abs() * 1e-6,
                        "{dtype} {endianness} {v}: got {decoded}, expected {expected}"
                    );
                }
            }
        }
    }

    #[test]
    fn test_decode_signed() {
        assert_eq!(decode_scalar(&[0xFF], 0, DataType::I8, Endianness::Big).unwrap(), -1.0);
        assert_eq!(decode_scalar(&[0x80], 0, DataType::I8, Endianness::Big).unwrap(), -128.0);
        assert_eq!(
            decode_scalar(&[0xFF, 0xFE], 0, DataType::I16, Endianness::Big).unwrap(),
            -2.0
        );
        assert_eq!(
            decode_scalar(&[0xFE, 0xFF], 0, DataType::I16, Endianness::Little).unwrap(),
            -2.0
        );
        assert_eq!(
            decode_scalar(&[0xFF, 0xFF, 0xFF, 0xFF], 0, DataType::I32, Endianness::Big).unwrap(),
            -1.0
        );
        assert_eq!(
            decode_scalar(&[0xFF, 0xFF, 0xFF, 0xFF], 0, DataType::U32, Endianness::Big).unwrap(),
            4294967295.0
        );
    }

    #[test]
    fn test_decode_endianness() {
        let buf = [0x00, 0x12, 0x34];
        assert_eq!(
            decode_scalar(&buf, 1, DataType::U16, Endianness::Big).unwrap(),
            0x1234 as f64
        );
        assert_eq!(
            decode_scalar(&buf, 1, DataType::U16, Endianness::Little).unwrap(),
            0x3412 as f64
        );
    }

    #[test]
    fn test_decode_f32() {
        let bytes = 1.5f32.to_be_bytes();
        assert_eq!(decode_scalar(&bytes, 0, DataType::F32, Endianness::Big).unwrap(), 1.5);
        let bytes = 1.5f32.to_le_bytes();
        assert_eq!(
            decode_scalar_bytes(&bytes, DataType::F32, Endianness::Little).unwrap(),
            1.5
        );
    }

    #[test]
    fn test_decode_out_of_bounds() {
        let buf = [0u8; 3];
        assert_eq!(
            decode_scalar(&buf, 2, DataType::U16, Endianness::Big),
            Err(Error::OutOfBounds {
                offset: 2,
                length: 2,
                buffer_len: 3
            })
        );
        assert!(decode_scalar(&buf, 0, DataType::U32, Endianness::Big).is_err());
    }

    #[test]
    fn test_encode_clamps() {
        assert_eq!(encode_scalar(300.0, DataType::U8, Endianness::Big), vec![0xFF]);
        assert_eq!(encode_scalar(-5.0, DataType::U8, Endianness::Big), vec![0x00]);
        assert_eq!(encode_scalar(-200.0, DataType::I8, Endianness::Big), vec![0x80]);
        assert_eq!(
            encode_scalar(1.0e12, DataType::I32, Endianness::Big),
            vec![0x7F, 0xFF, 0xFF, 0xFF]
        );
        assert_eq!(
            encode_scalar(0x1234 as f64, DataType::U16, Endianness::Little),
            vec![0x34, 0x12]
        );
        assert_eq!(encode_scalar(2.5, DataType::U8, Endianness::Big), vec![3]);
    }

    #[test]
    fn test_write_scalar() {
        let mut buffer = [0u8; 6];
        write_scalar(&mut buffer, 2, -2.0, DataType::I16, Endianness::Big).unwrap();
        assert_eq!(buffer, [0, 0, 0xFF, 0xFE, 0, 0]);
        write_scalar(&mut buffer, 4, 70000.0, DataType::U16, Endianness::Little).unwrap();
        assert_eq!(&buffer[4..], &[0xFF, 0xFF]);

        let before = buffer;
        assert!(matches!(
            write_scalar(&mut buffer, 3, 1.0, DataType::U32, Endianness::Big),
            Err(Error::OutOfBounds { .. })
        ));
        assert!(matches!(
            write_scalar(&mut buffer, usize::MAX, 1.0, DataType::U8, Endianness::Big),
            Err(Error::OutOfBounds { .. })
        ));
        assert_eq!(buffer, before);
    }

    #[test]
    fn test_extract_bits() {
        let buf = [0b1010_1100, 0b0101_0011];
        assert_eq!(extract_bits(&buf, 0, 1).unwrap(), 1);
        assert_eq!(extract_bits(&buf, 1, 1).unwrap(), 0);
        assert_eq!(extract_bits(&buf, 0, 4).unwrap(), 0b1010);
        assert_eq!(extract_bits(&buf, 4, 8).unwrap(), 0b1100_0101);
        assert_eq!(extract_bits(&buf, 8, 8).unwrap(), 0b0101_0011);
        assert_eq!(extract_bits(&buf, 0, 16).unwrap(), 0b1010_1100_0101_0011);
    }

    #[test]
    fn test_extract_bits_full_width() {
        let buf = [0x12, 0x34, 0x56, 0x78, 0x9A];
        assert_eq!(extract_bits(&buf, 0, 32).unwrap(), 0x12345678);
        assert_eq!(extract_bits(&buf, 4, 32).unwrap(), 0x23456789);
    }

    #[test]
    fn test_extract_bits_errors() {
        let buf = [0u8; 2];
        assert!(matches!(
            extract_bits(&buf, 0, 0),
            Err(Error::InvalidBitRange { .. })
        ));
        assert!(matches!(
            extract_bits(&buf, 0, 33),
            Err(Error::InvalidBitRange { .. })
        ));
        assert!(matches!(
            extract_bits(&buf, 9, 8),
            Err(Error::OutOfBounds { .. })
        ));
    }

    #[test]
    fn test_extract_signed_bits() {
        let buf = [0b1110_0000];
        assert_eq!(extract_signed_bits(&buf, 0, 3).unwrap(), -1);
        assert_eq!(extract_signed_bits(&buf, 1, 3).unwrap(), -2);
        assert_eq!(extract_signed_bits(&buf, 2, 3).unwrap(), 0b100 - 8);
        assert_eq!(extract_signed_bits(&[0x7F], 0, 8).unwrap(), 127);
        assert!(extract_signed_bits(&buf, 0, 1).is_err());
    }

    #[test]
    fn test_extract_bit_flag() {
        let buf = [0x00, 0x01];
        assert!(!extract_bit_flag(&buf, 0).unwrap());
        assert!(extract_bit_flag(&buf, 15).unwrap());
        assert!(extract_bit_flag(&buf, 16).is_err());
    }

    #[test]
    fn test_storage_type_names() {
        assert_eq!(DataType::from_storage_type("uint16"), Some(DataType::U16));
        assert_eq!(DataType::from_storage_type("Float"), Some(DataType::F32));
        assert_eq!(DataType::from_storage_type("bloblist"), None);
        assert_eq!(Endianness::from_str("LITTLE"), Some(Endianness::Little));
    }
}
