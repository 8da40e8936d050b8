//! Modbus protocol definitions and data structures
//!
//! Core protocol types shared by the client and server paths: function codes,
//! exception codes, and the flat request/response structures that the codec
//! translates to and from wire PDUs.

use std::fmt;

use crate::constants::*;
use crate::error::{ModbusError, ModbusResult};

/// Modbus address type (0-65535)
pub type ModbusAddress = u16;

/// Modbus value type (16-bit register value)
pub type ModbusValue = u16;

/// Modbus slave/unit identifier
///
/// On Modbus TCP the values 0 and 255 act as wildcards: a request carrying
/// either is accepted by any server, and a server configured with either
/// accepts any request.
pub type SlaveId = u8;

/// Unit identifier broadcast wildcard
pub const UNIT_ID_BROADCAST: SlaveId = 0;

/// Unit identifier "any unit" wildcard used on TCP
pub const UNIT_ID_ANY: SlaveId = 255;

/// True when `unit` addresses a server configured as `configured`,
/// applying the TCP wildcard rules on both sides
pub fn unit_id_matches(configured: SlaveId, unit: SlaveId) -> bool {
    configured == unit
        || unit == UNIT_ID_BROADCAST
        || unit == UNIT_ID_ANY
        || configured == UNIT_ID_BROADCAST
        || configured == UNIT_ID_ANY
}

/// Modbus function codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ModbusFunction {
    /// Read Coils (0x01)
    ReadCoils = FC_READ_COILS,
    /// Read Discrete Inputs (0x02)
    ReadDiscreteInputs = FC_READ_DISCRETE_INPUTS,
    /// Read Holding Registers (0x03)
    ReadHoldingRegisters = FC_READ_HOLDING_REGISTERS,
    /// Read Input Registers (0x04)
    ReadInputRegisters = FC_READ_INPUT_REGISTERS,
    /// Write Single Coil (0x05)
    WriteSingleCoil = FC_WRITE_SINGLE_COIL,
    /// Write Single Register (0x06)
    WriteSingleRegister = FC_WRITE_SINGLE_REGISTER,
    /// Write Multiple Coils (0x0F)
    WriteMultipleCoils = FC_WRITE_MULTIPLE_COILS,
    /// Write Multiple Registers (0x10)
    WriteMultipleRegisters = FC_WRITE_MULTIPLE_REGISTERS,
    /// Mask Write Register (0x16)
    MaskWriteRegister = FC_MASK_WRITE_REGISTER,
    /// Read/Write Multiple Registers (0x17)
    ReadWriteMultipleRegisters = FC_READ_WRITE_MULTIPLE_REGISTERS,
}

impl ModbusFunction {
    /// Convert from u8 to ModbusFunction
    pub fn from_u8(value: u8) -> ModbusResult<Self> {
        match value {
            FC_READ_COILS => Ok(ModbusFunction::ReadCoils),
            FC_READ_DISCRETE_INPUTS => Ok(ModbusFunction::ReadDiscreteInputs),
            FC_READ_HOLDING_REGISTERS => Ok(ModbusFunction::ReadHoldingRegisters),
            FC_READ_INPUT_REGISTERS => Ok(ModbusFunction::ReadInputRegisters),
            FC_WRITE_SINGLE_COIL => Ok(ModbusFunction::WriteSingleCoil),
            FC_WRITE_SINGLE_REGISTER => Ok(ModbusFunction::WriteSingleRegister),
            FC_WRITE_MULTIPLE_COILS => Ok(ModbusFunction::WriteMultipleCoils),
            FC_WRITE_MULTIPLE_REGISTERS => Ok(ModbusFunction::WriteMultipleRegisters),
            FC_MASK_WRITE_REGISTER => Ok(ModbusFunction::MaskWriteRegister),
            FC_READ_WRITE_MULTIPLE_REGISTERS => Ok(ModbusFunction::ReadWriteMultipleRegisters),
            _ => Err(ModbusError::invalid_function(value)),
        }
    }

    /// Convert to u8
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Check if this function reads data (FC23 both reads and writes)
    pub fn is_read_function(self) -> bool {
        matches!(
            self,
            ModbusFunction::ReadCoils
                | ModbusFunction::ReadDiscreteInputs
                | ModbusFunction::ReadHoldingRegisters
                | ModbusFunction::ReadInputRegisters
                | ModbusFunction::ReadWriteMultipleRegisters
        )
    }

    /// Check if this function writes data (FC23 both reads and writes)
    pub fn is_write_function(self) -> bool {
        matches!(
            self,
            ModbusFunction::WriteSingleCoil
                | ModbusFunction::WriteSingleRegister
                | ModbusFunction::WriteMultipleCoils
                | ModbusFunction::WriteMultipleRegisters
                | ModbusFunction::MaskWriteRegister
                | ModbusFunction::ReadWriteMultipleRegisters
        )
    }
}

impl fmt::Display for ModbusFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModbusFunction::ReadCoils => "Read Coils",
            ModbusFunction::ReadDiscreteInputs => "Read Discrete Inputs",
            ModbusFunction::ReadHoldingRegisters => "Read Holding Registers",
            ModbusFunction::ReadInputRegisters => "Read Input Registers",
            ModbusFunction::WriteSingleCoil => "Write Single Coil",
            ModbusFunction::WriteSingleRegister => "Write Single Register",
            ModbusFunction::WriteMultipleCoils => "Write Multiple Coils",
            ModbusFunction::WriteMultipleRegisters => "Write Multiple Registers",
            ModbusFunction::MaskWriteRegister => "Mask Write Register",
            ModbusFunction::ReadWriteMultipleRegisters => "Read/Write Multiple Registers",
        };
        write!(f, "{} (0x{:02X})", name, *self as u8)
    }
}

/// Modbus exception codes
///
/// These are the codes a server places in the second byte of an exception
/// response. Store callbacks return them to signal per-element failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ModbusException {
    IllegalFunction = EXCEPTION_ILLEGAL_FUNCTION,
    IllegalDataAddress = EXCEPTION_ILLEGAL_DATA_ADDRESS,
    IllegalDataValue = EXCEPTION_ILLEGAL_DATA_VALUE,
    ServerDeviceFailure = EXCEPTION_SERVER_DEVICE_FAILURE,
    Acknowledge = EXCEPTION_ACKNOWLEDGE,
    ServerDeviceBusy = EXCEPTION_SERVER_DEVICE_BUSY,
    MemoryParityError = EXCEPTION_MEMORY_PARITY_ERROR,
    GatewayPathUnavailable = EXCEPTION_GATEWAY_PATH_UNAVAILABLE,
    GatewayTargetDeviceFailedToRespond = EXCEPTION_GATEWAY_TARGET_FAILED,
}

impl ModbusException {
    /// Convert from u8 to ModbusException
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            EXCEPTION_ILLEGAL_FUNCTION => Some(ModbusException::IllegalFunction),
            EXCEPTION_ILLEGAL_DATA_ADDRESS => Some(ModbusException::IllegalDataAddress),
            EXCEPTION_ILLEGAL_DATA_VALUE => Some(ModbusException::IllegalDataValue),
            EXCEPTION_SERVER_DEVICE_FAILURE => Some(ModbusException::ServerDeviceFailure),
            EXCEPTION_ACKNOWLEDGE => Some(ModbusException::Acknowledge),
            EXCEPTION_SERVER_DEVICE_BUSY => Some(ModbusException::ServerDeviceBusy),
            EXCEPTION_MEMORY_PARITY_ERROR => Some(ModbusException::MemoryParityError),
            EXCEPTION_GATEWAY_PATH_UNAVAILABLE => Some(ModbusException::GatewayPathUnavailable),
            EXCEPTION_GATEWAY_TARGET_FAILED => {
                Some(ModbusException::GatewayTargetDeviceFailedToRespond)
            }
            _ => None,
        }
    }

    /// Convert to u8
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Get human-readable description
    pub fn description(self) -> &'static str {
        match self {
            ModbusException::IllegalFunction => "Function code not supported by the server",
            ModbusException::IllegalDataAddress => "Data address outside the server's range",
            ModbusException::IllegalDataValue => "Value in the request data field not allowed",
            ModbusException::ServerDeviceFailure => "Unrecoverable error while serving the request",
            ModbusException::Acknowledge => "Request accepted, long-running processing started",
            ModbusException::ServerDeviceBusy => "Server busy with a long-duration command",
            ModbusException::MemoryParityError => "Parity error detected in extended memory",
            ModbusException::GatewayPathUnavailable => "Gateway could not allocate a path",
            ModbusException::GatewayTargetDeviceFailedToRespond => {
                "No response from the gateway target device"
            }
        }
    }
}

impl fmt::Display for ModbusException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Modbus Exception 0x{:02X}: {}", self.to_u8(), self.description())
    }
}

/// Modbus request structure
///
/// A single flat shape covers the whole function catalogue. The `data`
/// payload layout depends on the function:
/// - FC05: 2 bytes, 0xFF00 (ON) or 0x0000 (OFF), `quantity` = 1
/// - FC06: 2 bytes, register value, `quantity` = 1
/// - FC15: packed coil bytes, `quantity` = number of coils
/// - FC16: register bytes, `quantity` = number of registers
/// - FC22: 4 bytes, AND mask then OR mask, `quantity` = 1
/// - FC23: write address (2) + write quantity (2) + write register bytes;
///   `address`/`quantity` describe the read window
#[derive(Debug, Clone, PartialEq)]
pub struct ModbusRequest {
    pub slave_id: SlaveId,
    pub function: ModbusFunction,
    pub address: ModbusAddress,
    pub quantity: u16,
    pub data: Vec<u8>,
}

impl ModbusRequest {
    /// Create a new read request
    pub fn new_read(
        slave_id: SlaveId,
        function: ModbusFunction,
        address: ModbusAddress,
        quantity: u16,
    ) -> Self {
        Self {
            slave_id,
            function,
            address,
            quantity,
            data: Vec::new(),
        }
    }

    /// Create a new write request with an explicit element count
    pub fn new_write(
        slave_id: SlaveId,
        function: ModbusFunction,
        address: ModbusAddress,
        quantity: u16,
        data: Vec<u8>,
    ) -> Self {
        Self {
            slave_id,
            function,
            address,
            quantity,
            data,
        }
    }

    /// Create a mask write (FC22) request
    pub fn new_mask_write(
        slave_id: SlaveId,
        address: ModbusAddress,
        and_mask: u16,
        or_mask: u16,
    ) -> Self {
        let mut data = Vec::with_capacity(4);
        data.extend_from_slice(&and_mask.to_be_bytes());
        data.extend_from_slice(&or_mask.to_be_bytes());
        Self {
            slave_id,
            function: ModbusFunction::MaskWriteRegister,
            address,
            quantity: 1,
            data,
        }
    }

    /// Create a read/write multiple registers (FC23) request
    pub fn new_read_write(
        slave_id: SlaveId,
        read_address: ModbusAddress,
        read_quantity: u16,
        write_address: ModbusAddress,
        values: &[u16],
    ) -> Self {
        let mut data = Vec::with_capacity(4 + values.len() * 2);
        data.extend_from_slice(&write_address.to_be_bytes());
        data.extend_from_slice(&(values.len() as u16).to_be_bytes());
        for &value in values {
            data.extend_from_slice(&value.to_be_bytes());
        }
        Self {
            slave_id,
            function: ModbusFunction::ReadWriteMultipleRegisters,
            address: read_address,
            quantity: read_quantity,
            data,
        }
    }
}

/// Modbus response structure
///
/// Only successful responses are represented; an exception response surfaces
/// as [`ModbusError::Exception`] before a `ModbusResponse` is ever built.
#[derive(Debug, Clone, PartialEq)]
pub struct ModbusResponse {
    pub slave_id: SlaveId,
    pub function: ModbusFunction,
    pub data: Vec<u8>,
}

impl ModbusResponse {
    /// Create a successful response
    pub fn new_success(slave_id: SlaveId, function: ModbusFunction, data: Vec<u8>) -> Self {
        Self {
            slave_id,
            function,
            data,
        }
    }

    /// Parse response data as registers (u16 values)
    ///
    /// Expects the FC03/FC04/FC23 response layout: byte count followed by
    /// register values in big-endian order.
    pub fn parse_registers(&self) -> ModbusResult<Vec<u16>> {
        if self.data.is_empty() {
            return Err(ModbusError::invalid_length("Empty response data"));
        }

        let byte_count = self.data[0] as usize;
        if self.data.len() < 1 + byte_count {
            return Err(ModbusError::invalid_length("Incomplete register data"));
        }

        if byte_count % 2 != 0 {
            return Err(ModbusError::invalid_length("Invalid register data length"));
        }

        let mut registers = Vec::with_capacity(byte_count / 2);
        for i in (1..1 + byte_count).step_by(2) {
            let value = u16::from_be_bytes([self.data[i], self.data[i + 1]]);
            registers.push(value);
        }

        Ok(registers)
    }

    /// Parse response data as bits (bool values)
    ///
    /// Expects the FC01/FC02 response layout: byte count followed by packed
    /// coil bytes, LSB first. Returns a full multiple of 8 bits; callers
    /// truncate to the quantity they requested.
    pub fn parse_bits(&self) -> ModbusResult<Vec<bool>> {
        if self.data.is_empty() {
            return Err(ModbusError::invalid_length("Empty response data"));
        }

        let byte_count = self.data[0] as usize;
        if self.data.len() < 1 + byte_count {
            return Err(ModbusError::invalid_length("Incomplete bit data"));
        }

        let mut bits = Vec::with_capacity(byte_count * 8);
        for i in 1..1 + byte_count {
            let byte_value = self.data[i];
            for bit_pos in 0..8 {
                bits.push((byte_value & (1 << bit_pos)) != 0);
            }
        }

        Ok(bits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_function_conversion() {
        assert_eq!(
            ModbusFunction::from_u8(0x03).unwrap(),
            ModbusFunction::ReadHoldingRegisters
        );
        assert_eq!(ModbusFunction::ReadHoldingRegisters.to_u8(), 0x03);
        assert_eq!(
            ModbusFunction::from_u8(0x16).unwrap(),
            ModbusFunction::MaskWriteRegister
        );
        assert_eq!(
            ModbusFunction::from_u8(0x17).unwrap(),
            ModbusFunction::ReadWriteMultipleRegisters
        );

        assert!(ModbusFunction::from_u8(0xFF).is_err());
        assert!(ModbusFunction::from_u8(0x2B).is_err());
    }

    #[test]
    fn test_function_classification() {
        assert!(ModbusFunction::ReadCoils.is_read_function());
        assert!(!ModbusFunction::ReadCoils.is_write_function());
        assert!(ModbusFunction::MaskWriteRegister.is_write_function());
        assert!(ModbusFunction::ReadWriteMultipleRegisters.is_read_function());
        assert!(ModbusFunction::ReadWriteMultipleRegisters.is_write_function());
    }

    #[test]
    fn test_exception_conversion() {
        assert_eq!(
            ModbusException::from_u8(0x02).unwrap(),
            ModbusException::IllegalDataAddress
        );
        assert_eq!(ModbusException::IllegalDataAddress.to_u8(), 0x02);
        assert_eq!(ModbusException::from_u8(0x07), None);
        assert_eq!(ModbusException::from_u8(0xAB), None);
    }

    #[test]
    fn test_unit_id_wildcards() {
        assert!(unit_id_matches(5, 5));
        assert!(unit_id_matches(5, 0));
        assert!(unit_id_matches(5, 255));
        assert!(unit_id_matches(0, 9));
        assert!(unit_id_matches(255, 9));
        assert!(!unit_id_matches(5, 9));
    }

    #[test]
    fn test_mask_write_layout() {
        let request = ModbusRequest::new_mask_write(1, 0x0004, 0x00F2, 0x0025);
        assert_eq!(request.function, ModbusFunction::MaskWriteRegister);
        assert_eq!(request.address, 0x0004);
        assert_eq!(request.quantity, 1);
        assert_eq!(request.data, vec![0x00, 0xF2, 0x00, 0x25]);
    }

    #[test]
    fn test_read_write_layout() {
        let request = ModbusRequest::new_read_write(1, 0x0003, 6, 0x000E, &[0x00FF, 0x00FE]);
        assert_eq!(request.address, 0x0003);
        assert_eq!(request.quantity, 6);
        assert_eq!(
            request.data,
            vec![0x00, 0x0E, 0x00, 0x02, 0x00, 0xFF, 0x00, 0xFE]
        );
    }

    #[test]
    fn test_response_parsing() {
        // Register response: byte_count + 2 registers
        let register_data = vec![4, 0x12, 0x34, 0x56, 0x78];
        let response =
            ModbusResponse::new_success(1, ModbusFunction::ReadHoldingRegisters, register_data);
        let registers = response.parse_registers().unwrap();
        assert_eq!(registers, vec![0x1234, 0x5678]);

        // Bit response: byte_count + 1 byte, LSB first
        let bit_data = vec![1, 0b10101010];
        let response = ModbusResponse::new_success(1, ModbusFunction::ReadCoils, bit_data);
        let bits = response.parse_bits().unwrap();
        assert!(!bits[0]);
        assert!(bits[1]);
        assert!(!bits[2]);
        assert!(bits[3]);
    }

    #[test]
    fn test_response_parsing_truncated() {
        let response = ModbusResponse::new_success(
            1,
            ModbusFunction::ReadHoldingRegisters,
            vec![4, 0x12, 0x34],
        );
        assert!(matches!(
            response.parse_registers(),
            Err(ModbusError::InvalidLength { .. })
        ));

        let empty = ModbusResponse::new_success(1, ModbusFunction::ReadCoils, Vec::new());
        assert!(matches!(
            empty.parse_bits(),
            Err(ModbusError::InvalidLength { .. })
        ));
    }
}
