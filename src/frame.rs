//! Modbus TCP framing (MBAP header and ADU assembly)
//!
//! An ADU on the wire is a 7-byte MBAP header followed by the PDU. The
//! header's length field counts the unit identifier plus the PDU, so
//! `length == pdu_len + 1` always holds for a well-formed frame.

use bytes::{BufMut, Bytes, BytesMut};
use tracing::debug;

use crate::constants::{MAX_MBAP_LENGTH, MBAP_HEADER_SIZE};
use crate::error::{ModbusError, ModbusResult};
use crate::pdu::ModbusPdu;

/// Modbus TCP MBAP header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MbapHeader {
    /// Transaction identifier
    pub transaction_id: u16,
    /// Protocol identifier (fixed to 0)
    pub protocol_id: u16,
    /// Length field (unit identifier + PDU)
    pub length: u16,
    /// Unit identifier (slave ID)
    pub unit_id: u8,
}

impl MbapHeader {
    /// Build a header for a PDU of `pdu_len` bytes
    pub fn new(transaction_id: u16, unit_id: u8, pdu_len: usize) -> Self {
        Self {
            transaction_id,
            protocol_id: 0,
            length: (pdu_len + 1) as u16,
            unit_id,
        }
    }

    /// PDU byte count implied by the length field
    #[inline]
    pub fn pdu_len(&self) -> usize {
        self.length as usize - 1
    }

    /// Parse and validate the 7 header bytes of an incoming frame
    ///
    /// Fails with [`ModbusError::InvalidLength`] when fewer than 7 bytes are
    /// available or the length field is impossible (0, 1, or implying a PDU
    /// beyond 253 bytes), and with [`ModbusError::WrongIdentifier`] when the
    /// protocol identifier is not 0. Either case means the byte stream can
    /// no longer be trusted to contain frame boundaries.
    pub fn parse(data: &[u8]) -> ModbusResult<Self> {
        if data.len() < MBAP_HEADER_SIZE {
            return Err(ModbusError::invalid_length(format!(
                "MBAP header too short: {} bytes",
                data.len()
            )));
        }

        let header = Self {
            transaction_id: u16::from_be_bytes([data[0], data[1]]),
            protocol_id: u16::from_be_bytes([data[2], data[3]]),
            length: u16::from_be_bytes([data[4], data[5]]),
            unit_id: data[6],
        };

        debug!(
            "MBAP header: trans_id={:04X}, protocol_id={:04X}, length={}, unit_id={}",
            header.transaction_id, header.protocol_id, header.length, header.unit_id
        );

        if header.protocol_id != 0 {
            return Err(ModbusError::wrong_identifier(format!(
                "Invalid protocol ID: expected 0, got {}",
                header.protocol_id
            )));
        }

        // length counts the unit id byte, so 2 is the smallest frame that
        // still carries a function code
        if header.length < 2 {
            return Err(ModbusError::invalid_length(format!(
                "MBAP length too small: {}",
                header.length
            )));
        }

        if header.length as usize > MAX_MBAP_LENGTH {
            return Err(ModbusError::invalid_length(format!(
                "MBAP length too large: {} (max {})",
                header.length, MAX_MBAP_LENGTH
            )));
        }

        Ok(header)
    }
}

/// Assemble a complete ADU (MBAP header + PDU)
pub fn encode_adu(transaction_id: u16, unit_id: u8, pdu: &ModbusPdu) -> ModbusResult<Bytes> {
    if pdu.is_empty() {
        return Err(ModbusError::invalid_length("Cannot frame an empty PDU"));
    }

    let mut frame = BytesMut::with_capacity(MBAP_HEADER_SIZE + pdu.len());

    // MBAP header
    frame.put_u16(transaction_id);
    frame.put_u16(0); // protocol_id
    frame.put_u16((pdu.len() + 1) as u16);
    frame.put_u8(unit_id);

    // PDU
    frame.put_slice(pdu.as_slice());

    debug!(
        "Building TCP frame: trans_id={:04X}, unit_id={}, FC={:02X}, PDU_len={}",
        transaction_id,
        unit_id,
        pdu.function_code().unwrap_or(0),
        pdu.len()
    );

    Ok(frame.freeze())
}
