//! Data conversion utilities
//!
//! Bit packing and register/byte conversions shared by the codec, server
//! handlers, and application code. Coil bits are packed LSB first within
//! each byte, matching the wire layout of FC01/FC02/FC15.

use crate::error::{ModbusError, ModbusResult};

/// Convert register values to bytes (big-endian)
pub fn registers_to_bytes(registers: &[u16]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(registers.len() * 2);
    for &register in registers {
        bytes.extend_from_slice(&register.to_be_bytes());
    }
    bytes
}

/// Convert bytes to register values (big-endian)
pub fn bytes_to_registers(bytes: &[u8]) -> ModbusResult<Vec<u16>> {
    if bytes.len() % 2 != 0 {
        return Err(ModbusError::invalid_data("Byte array length must be even"));
    }

    let mut registers = Vec::with_capacity(bytes.len() / 2);
    for chunk in bytes.chunks(2) {
        registers.push(u16::from_be_bytes([chunk[0], chunk[1]]));
    }
    Ok(registers)
}

/// Pack boolean values into bytes, LSB first
pub fn pack_bits(bits: &[bool]) -> Vec<u8> {
    let byte_count = bits.len().div_ceil(8);
    let mut bytes = vec![0u8; byte_count];

    for (i, &bit) in bits.iter().enumerate() {
        if bit {
            bytes[i / 8] |= 1 << (i % 8);
        }
    }

    bytes
}

/// Unpack bytes into boolean values, LSB first
///
/// Bits past the end of `bytes` read as false.
pub fn unpack_bits(bytes: &[u8], bit_count: usize) -> Vec<bool> {
    let mut bits = Vec::with_capacity(bit_count);

    for i in 0..bit_count {
        let byte_index = i / 8;
        if byte_index < bytes.len() {
            bits.push((bytes[byte_index] & (1 << (i % 8))) != 0);
        } else {
            bits.push(false);
        }
    }

    bits
}

/// Format bytes as a space-separated uppercase hex string
pub fn to_hex_string(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}
