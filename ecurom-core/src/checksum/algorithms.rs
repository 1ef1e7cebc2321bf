// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Raw checksum algorithms over a byte slice

use crc::{CRC_16_MCRF4XX, CRC_32_ISO_HDLC, Crc};

// Reflected polynomial 0xEDB88320, init and final XOR 0xFFFFFFFF
const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

// CRC-16/IBM-SDLC without the final XOR: reflected polynomial 0x8408, init
// 0xFFFF
const NCS_CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_MCRF4XX);

/// Standard CRC-32
pub fn crc32(bytes: &[u8]) -> u32 {
    CRC32.checksum(bytes)
}

/// Byte sum, wrapped mod 256
pub fn sum8(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
}

/// XOR of all bytes
pub fn xor8(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, &b| acc ^ b)
}

// Sum of all bytes but the trailing checksum byte
fn packet_sum(packet: &[u8]) -> u8 {
    match packet.split_last() {
        Some((_, body)) => sum8(body),
        None => 0,
    }
}

/// Subaru Select Monitor packet checksum: sum of every byte except the
/// trailing checksum byte, truncated to 8 bits
pub fn ssm_checksum(packet: &[u8]) -> u8 {
    packet_sum(packet)
}

/// Nissan Consult packet checksum.  Same shape as [`ssm_checksum`].
pub fn ncs_checksum(packet: &[u8]) -> u8 {
    packet_sum(packet)
}

/// Nissan CRC-16, processed LSB first
pub fn ncs_crc16(bytes: &[u8]) -> u16 {
    NCS_CRC16.checksum(bytes)
}
