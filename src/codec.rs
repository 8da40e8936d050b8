//! Modbus PDU codec
//!
//! Pure, transport-independent encoding and decoding of protocol data units
//! for both roles:
//!
//! - Client side: [`encode_request`] validates call arguments and builds the
//!   request PDU; [`decode_response`] checks a response against its request
//!   (function code, byte counts, write echoes) and routes exception frames.
//! - Server side: [`decode_request`] turns an incoming PDU into a
//!   [`ModbusRequest`] or the exception code to answer with; the
//!   `encode_*_response` builders produce the reply PDUs.
//!
//! No I/O happens here; framing and sockets live in [`crate::frame`] and the
//! transport/server modules.

use crate::constants::*;
use crate::error::{ModbusError, ModbusResult};
use crate::pdu::{ModbusPdu, PduBuilder};
use crate::protocol::{ModbusException, ModbusFunction, ModbusRequest, ModbusResponse, SlaveId};
use crate::utils::pack_bits;

// ============================================================================
// Client Side: Request Encoding
// ============================================================================

/// Encode a request into a PDU, validating all bounds first
///
/// Validation failures are local errors ([`ModbusError::InvalidData`]); no
/// bytes reach the wire for an invalid request.
pub fn encode_request(request: &ModbusRequest) -> ModbusResult<ModbusPdu> {
    match request.function {
        ModbusFunction::ReadCoils | ModbusFunction::ReadDiscreteInputs => {
            if request.quantity == 0 || request.quantity as usize > MAX_READ_COILS {
                return Err(ModbusError::invalid_data(format!(
                    "Invalid coil quantity: {} (valid: 1-{})",
                    request.quantity, MAX_READ_COILS
                )));
            }
            PduBuilder::build_read_request(
                request.function.to_u8(),
                request.address,
                request.quantity,
            )
        }
        ModbusFunction::ReadHoldingRegisters | ModbusFunction::ReadInputRegisters => {
            if request.quantity == 0 || request.quantity as usize > MAX_READ_REGISTERS {
                return Err(ModbusError::invalid_data(format!(
                    "Invalid register quantity: {} (valid: 1-{})",
                    request.quantity, MAX_READ_REGISTERS
                )));
            }
            PduBuilder::build_read_request(
                request.function.to_u8(),
                request.address,
                request.quantity,
            )
        }
        ModbusFunction::WriteSingleCoil => {
            if request.data.len() != 2 {
                return Err(ModbusError::invalid_data(format!(
                    "Write single coil payload must be 2 bytes, got {}",
                    request.data.len()
                )));
            }
            let value = u16::from_be_bytes([request.data[0], request.data[1]]);
            if value != 0xFF00 && value != 0x0000 {
                return Err(ModbusError::invalid_data(format!(
                    "Invalid coil value: 0x{:04X} (valid: 0xFF00 or 0x0000)",
                    value
                )));
            }
            Ok(PduBuilder::new()
                .function_code(FC_WRITE_SINGLE_COIL)?
                .address(request.address)?
                .data(&request.data)?
                .build())
        }
        ModbusFunction::WriteSingleRegister => {
            if request.data.len() != 2 {
                return Err(ModbusError::invalid_data(format!(
                    "Write single register payload must be 2 bytes, got {}",
                    request.data.len()
                )));
            }
            Ok(PduBuilder::new()
                .function_code(FC_WRITE_SINGLE_REGISTER)?
                .address(request.address)?
                .data(&request.data)?
                .build())
        }
        ModbusFunction::WriteMultipleCoils => {
            if request.quantity == 0 || request.quantity as usize > MAX_WRITE_COILS {
                return Err(ModbusError::invalid_data(format!(
                    "Invalid coil quantity: {} (valid: 1-{})",
                    request.quantity, MAX_WRITE_COILS
                )));
            }
            let byte_count = (request.quantity as usize).div_ceil(8);
            if request.data.len() != byte_count {
                return Err(ModbusError::invalid_data(format!(
                    "Coil payload is {} bytes, {} coils need {}",
                    request.data.len(),
                    request.quantity,
                    byte_count
                )));
            }
            Ok(PduBuilder::new()
                .function_code(FC_WRITE_MULTIPLE_COILS)?
                .address(request.address)?
                .quantity(request.quantity)?
                .byte(byte_count as u8)?
                .data(&request.data)?
                .build())
        }
        ModbusFunction::WriteMultipleRegisters => {
            if request.quantity == 0 || request.quantity as usize > MAX_WRITE_REGISTERS {
                return Err(ModbusError::invalid_data(format!(
                    "Invalid register quantity: {} (valid: 1-{})",
                    request.quantity, MAX_WRITE_REGISTERS
                )));
            }
            if request.data.len() != request.quantity as usize * 2 {
                return Err(ModbusError::invalid_data(format!(
                    "Register payload is {} bytes, {} registers need {}",
                    request.data.len(),
                    request.quantity,
                    request.quantity as usize * 2
                )));
            }
            Ok(PduBuilder::new()
                .function_code(FC_WRITE_MULTIPLE_REGISTERS)?
                .address(request.address)?
                .quantity(request.quantity)?
                .byte(request.data.len() as u8)?
                .data(&request.data)?
                .build())
        }
        ModbusFunction::MaskWriteRegister => {
            if request.data.len() != 4 {
                return Err(ModbusError::invalid_data(format!(
                    "Mask write payload must be 4 bytes (AND + OR), got {}",
                    request.data.len()
                )));
            }
            Ok(PduBuilder::new()
                .function_code(FC_MASK_WRITE_REGISTER)?
                .address(request.address)?
                .data(&request.data)?
                .build())
        }
        ModbusFunction::ReadWriteMultipleRegisters => {
            if request.quantity == 0 || request.quantity as usize > MAX_READ_REGISTERS {
                return Err(ModbusError::invalid_data(format!(
                    "Invalid read quantity: {} (valid: 1-{})",
                    request.quantity, MAX_READ_REGISTERS
                )));
            }
            if request.data.len() < 4 {
                return Err(ModbusError::invalid_data(
                    "Read/write payload missing write address and quantity",
                ));
            }
            let write_quantity = u16::from_be_bytes([request.data[2], request.data[3]]);
            if write_quantity == 0 || write_quantity as usize > MAX_READ_WRITE_WRITE_REGISTERS {
                return Err(ModbusError::invalid_data(format!(
                    "Invalid write quantity: {} (valid: 1-{})",
                    write_quantity, MAX_READ_WRITE_WRITE_REGISTERS
                )));
            }
            if request.data.len() != 4 + write_quantity as usize * 2 {
                return Err(ModbusError::invalid_data(format!(
                    "Register payload is {} bytes, {} registers need {}",
                    request.data.len() - 4,
                    write_quantity,
                    write_quantity as usize * 2
                )));
            }
            Ok(PduBuilder::new()
                .function_code(FC_READ_WRITE_MULTIPLE_REGISTERS)?
                .address(request.address)?
                .quantity(request.quantity)?
                .data(&request.data[..4])?
                .byte((request.data.len() - 4) as u8)?
                .data(&request.data[4..])?
                .build())
        }
    }
}

// ============================================================================
// Client Side: Response Decoding
// ============================================================================

/// Decode and validate a response PDU against the request that produced it
///
/// An exception frame (request function code with the high bit set) becomes
/// [`ModbusError::Exception`]. Any other function code is
/// [`ModbusError::InvalidResponse`]; inconsistent byte counts or sizes are
/// [`ModbusError::InvalidLength`]; a write echo that does not match the
/// request is [`ModbusError::InvalidResponse`].
pub fn decode_response(request: &ModbusRequest, pdu: &[u8]) -> ModbusResult<ModbusResponse> {
    if pdu.is_empty() {
        return Err(ModbusError::invalid_length("Empty response PDU"));
    }

    let expected_fc = request.function.to_u8();
    let fc = pdu[0];

    // Exception responses carry the request function code with bit 7 set.
    // A foreign function code never parses as one, error bit or not.
    if fc == expected_fc | 0x80 {
        if pdu.len() != 2 {
            return Err(ModbusError::invalid_length(format!(
                "Exception response must be 2 bytes, got {}",
                pdu.len()
            )));
        }
        return Err(ModbusError::exception(expected_fc, pdu[1]));
    }

    if fc != expected_fc {
        return Err(ModbusError::invalid_response(format!(
            "Function code mismatch: expected 0x{:02X}, got 0x{:02X}",
            expected_fc, fc
        )));
    }

    match request.function {
        ModbusFunction::ReadCoils | ModbusFunction::ReadDiscreteInputs => {
            let expected_bytes = (request.quantity as usize).div_ceil(8);
            check_read_layout(pdu, expected_bytes)?;
            Ok(ModbusResponse::new_success(
                request.slave_id,
                request.function,
                pdu[1..].to_vec(),
            ))
        }
        ModbusFunction::ReadHoldingRegisters
        | ModbusFunction::ReadInputRegisters
        | ModbusFunction::ReadWriteMultipleRegisters => {
            let expected_bytes = request.quantity as usize * 2;
            check_read_layout(pdu, expected_bytes)?;
            Ok(ModbusResponse::new_success(
                request.slave_id,
                request.function,
                pdu[1..].to_vec(),
            ))
        }
        ModbusFunction::WriteSingleCoil | ModbusFunction::WriteSingleRegister => {
            check_echo(request, pdu, 5)?;
            Ok(ModbusResponse::new_success(
                request.slave_id,
                request.function,
                pdu[1..].to_vec(),
            ))
        }
        ModbusFunction::WriteMultipleCoils | ModbusFunction::WriteMultipleRegisters => {
            if pdu.len() != 5 {
                return Err(ModbusError::invalid_length(format!(
                    "Write response must be 5 bytes, got {}",
                    pdu.len()
                )));
            }
            let address = u16::from_be_bytes([pdu[1], pdu[2]]);
            let quantity = u16::from_be_bytes([pdu[3], pdu[4]]);
            if address != request.address || quantity != request.quantity {
                return Err(ModbusError::invalid_response(format!(
                    "Write echo mismatch: addr={:04X}/qty={} echoed, addr={:04X}/qty={} requested",
                    address, quantity, request.address, request.quantity
                )));
            }
            Ok(ModbusResponse::new_success(
                request.slave_id,
                request.function,
                pdu[1..].to_vec(),
            ))
        }
        ModbusFunction::MaskWriteRegister => {
            check_echo(request, pdu, 7)?;
            Ok(ModbusResponse::new_success(
                request.slave_id,
                request.function,
                pdu[1..].to_vec(),
            ))
        }
    }
}

/// Validate the byte-count-prefixed layout shared by all read responses
fn check_read_layout(pdu: &[u8], expected_bytes: usize) -> ModbusResult<()> {
    if pdu.len() < 2 {
        return Err(ModbusError::invalid_length("Read response truncated"));
    }
    let byte_count = pdu[1] as usize;
    if byte_count != expected_bytes {
        return Err(ModbusError::invalid_length(format!(
            "Byte count mismatch: expected {}, got {}",
            expected_bytes, byte_count
        )));
    }
    if pdu.len() != 2 + byte_count {
        return Err(ModbusError::invalid_length(format!(
            "Read response is {} bytes, byte count implies {}",
            pdu.len(),
            2 + byte_count
        )));
    }
    Ok(())
}

/// Validate a verbatim echo response (FC05, FC06, FC22)
fn check_echo(request: &ModbusRequest, pdu: &[u8], expected_len: usize) -> ModbusResult<()> {
    if pdu.len() != expected_len {
        return Err(ModbusError::invalid_length(format!(
            "Echo response must be {} bytes, got {}",
            expected_len,
            pdu.len()
        )));
    }
    let address = u16::from_be_bytes([pdu[1], pdu[2]]);
    if address != request.address || pdu[3..] != request.data[..] {
        return Err(ModbusError::invalid_response(
            "Echo response does not match request",
        ));
    }
    Ok(())
}

// ============================================================================
// Server Side: Request Decoding
// ============================================================================

/// Decode an incoming request PDU on the server side
///
/// Malformed requests yield the exception code the server answers with:
/// unknown function codes map to `IllegalFunction`, impossible quantities
/// and inconsistent byte counts to `IllegalDataValue`.
pub fn decode_request(slave_id: SlaveId, pdu: &[u8]) -> Result<ModbusRequest, ModbusException> {
    if pdu.is_empty() {
        return Err(ModbusException::IllegalDataValue);
    }

    let function = match ModbusFunction::from_u8(pdu[0]) {
        Ok(f) => f,
        Err(_) => return Err(ModbusException::IllegalFunction),
    };

    match function {
        ModbusFunction::ReadCoils | ModbusFunction::ReadDiscreteInputs => {
            let (address, quantity) = fixed_pair(pdu)?;
            if quantity == 0 || quantity as usize > MAX_READ_COILS {
                return Err(ModbusException::IllegalDataValue);
            }
            Ok(ModbusRequest::new_read(slave_id, function, address, quantity))
        }
        ModbusFunction::ReadHoldingRegisters | ModbusFunction::ReadInputRegisters => {
            let (address, quantity) = fixed_pair(pdu)?;
            if quantity == 0 || quantity as usize > MAX_READ_REGISTERS {
                return Err(ModbusException::IllegalDataValue);
            }
            Ok(ModbusRequest::new_read(slave_id, function, address, quantity))
        }
        ModbusFunction::WriteSingleCoil => {
            let (address, value) = fixed_pair(pdu)?;
            if value != 0xFF00 && value != 0x0000 {
                return Err(ModbusException::IllegalDataValue);
            }
            Ok(ModbusRequest::new_write(
                slave_id,
                function,
                address,
                1,
                pdu[3..5].to_vec(),
            ))
        }
        ModbusFunction::WriteSingleRegister => {
            let (address, _value) = fixed_pair(pdu)?;
            Ok(ModbusRequest::new_write(
                slave_id,
                function,
                address,
                1,
                pdu[3..5].to_vec(),
            ))
        }
        ModbusFunction::WriteMultipleCoils => {
            if pdu.len() < 6 {
                return Err(ModbusException::IllegalDataValue);
            }
            let address = u16::from_be_bytes([pdu[1], pdu[2]]);
            let quantity = u16::from_be_bytes([pdu[3], pdu[4]]);
            let byte_count = pdu[5] as usize;
            if quantity == 0 || quantity as usize > MAX_WRITE_COILS {
                return Err(ModbusException::IllegalDataValue);
            }
            if byte_count != (quantity as usize).div_ceil(8) || pdu.len() != 6 + byte_count {
                return Err(ModbusException::IllegalDataValue);
            }
            Ok(ModbusRequest::new_write(
                slave_id,
                function,
                address,
                quantity,
                pdu[6..].to_vec(),
            ))
        }
        ModbusFunction::WriteMultipleRegisters => {
            if pdu.len() < 6 {
                return Err(ModbusException::IllegalDataValue);
            }
            let address = u16::from_be_bytes([pdu[1], pdu[2]]);
            let quantity = u16::from_be_bytes([pdu[3], pdu[4]]);
            let byte_count = pdu[5] as usize;
            if quantity == 0 || quantity as usize > MAX_WRITE_REGISTERS {
                return Err(ModbusException::IllegalDataValue);
            }
            if byte_count != quantity as usize * 2 || pdu.len() != 6 + byte_count {
                return Err(ModbusException::IllegalDataValue);
            }
            Ok(ModbusRequest::new_write(
                slave_id,
                function,
                address,
                quantity,
                pdu[6..].to_vec(),
            ))
        }
        ModbusFunction::MaskWriteRegister => {
            if pdu.len() != 7 {
                return Err(ModbusException::IllegalDataValue);
            }
            let address = u16::from_be_bytes([pdu[1], pdu[2]]);
            let and_mask = u16::from_be_bytes([pdu[3], pdu[4]]);
            let or_mask = u16::from_be_bytes([pdu[5], pdu[6]]);
            Ok(ModbusRequest::new_mask_write(slave_id, address, and_mask, or_mask))
        }
        ModbusFunction::ReadWriteMultipleRegisters => {
            if pdu.len() < 10 {
                return Err(ModbusException::IllegalDataValue);
            }
            let read_address = u16::from_be_bytes([pdu[1], pdu[2]]);
            let read_quantity = u16::from_be_bytes([pdu[3], pdu[4]]);
            let write_quantity = u16::from_be_bytes([pdu[7], pdu[8]]);
            let byte_count = pdu[9] as usize;
            if read_quantity == 0 || read_quantity as usize > MAX_READ_REGISTERS {
                return Err(ModbusException::IllegalDataValue);
            }
            if write_quantity == 0 || write_quantity as usize > MAX_READ_WRITE_WRITE_REGISTERS {
                return Err(ModbusException::IllegalDataValue);
            }
            if byte_count != write_quantity as usize * 2 || pdu.len() != 10 + byte_count {
                return Err(ModbusException::IllegalDataValue);
            }
            // data keeps the write window header; the byte count is stripped
            let mut data = Vec::with_capacity(4 + byte_count);
            data.extend_from_slice(&pdu[5..9]);
            data.extend_from_slice(&pdu[10..]);
            Ok(ModbusRequest {
                slave_id,
                function,
                address: read_address,
                quantity: read_quantity,
                data,
            })
        }
    }
}

/// Parse the fixed address/value pair shared by the 5-byte request layouts
fn fixed_pair(pdu: &[u8]) -> Result<(u16, u16), ModbusException> {
    if pdu.len() != 5 {
        return Err(ModbusException::IllegalDataValue);
    }
    Ok((
        u16::from_be_bytes([pdu[1], pdu[2]]),
        u16::from_be_bytes([pdu[3], pdu[4]]),
    ))
}

// ============================================================================
// Server Side: Response Encoding
// ============================================================================

/// Encode a bit-read response (FC01/FC02)
pub fn encode_read_bits_response(
    function: ModbusFunction,
    bits: &[bool],
) -> ModbusResult<ModbusPdu> {
    let packed = pack_bits(bits);
    Ok(PduBuilder::new()
        .function_code(function.to_u8())?
        .byte(packed.len() as u8)?
        .data(&packed)?
        .build())
}

/// Encode a register-read response (FC03/FC04/FC23)
pub fn encode_read_registers_response(
    function: ModbusFunction,
    values: &[u16],
) -> ModbusResult<ModbusPdu> {
    let mut builder = PduBuilder::new()
        .function_code(function.to_u8())?
        .byte((values.len() * 2) as u8)?;
    for &value in values {
        builder = builder.byte((value >> 8) as u8)?.byte((value & 0xFF) as u8)?;
    }
    Ok(builder.build())
}

/// Encode the echo response for a successful write (FC05/FC06/FC15/FC16/FC22)
pub fn encode_echo_response(request: &ModbusRequest) -> ModbusResult<ModbusPdu> {
    match request.function {
        ModbusFunction::WriteSingleCoil
        | ModbusFunction::WriteSingleRegister
        | ModbusFunction::MaskWriteRegister => Ok(PduBuilder::new()
            .function_code(request.function.to_u8())?
            .address(request.address)?
            .data(&request.data)?
            .build()),
        ModbusFunction::WriteMultipleCoils | ModbusFunction::WriteMultipleRegisters => {
            Ok(PduBuilder::new()
                .function_code(request.function.to_u8())?
                .address(request.address)?
                .quantity(request.quantity)?
                .build())
        }
        _ => Err(ModbusError::invalid_data(format!(
            "{} has no echo response",
            request.function
        ))),
    }
}

/// Encode an exception response
pub fn encode_exception(function: u8, exception: ModbusException) -> ModbusResult<ModbusPdu> {
    PduBuilder::build_exception(function, exception)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_request(function: ModbusFunction, address: u16, quantity: u16) -> ModbusRequest {
        ModbusRequest::new_read(1, function, address, quantity)
    }

    #[test]
    fn test_encode_read_requests() {
        let pdu =
            encode_request(&read_request(ModbusFunction::ReadCoils, 0x0013, 0x0013)).unwrap();
        assert_eq!(pdu.as_slice(), &[0x01, 0x00, 0x13, 0x00, 0x13]);

        let pdu = encode_request(&read_request(
            ModbusFunction::ReadHoldingRegisters,
            0x006B,
            3,
        ))
        .unwrap();
        assert_eq!(pdu.as_slice(), &[0x03, 0x00, 0x6B, 0x00, 0x03]);
    }

    #[test]
    fn test_encode_request_bounds() {
        let err = encode_request(&read_request(ModbusFunction::ReadCoils, 0, 0));
        assert!(matches!(err, Err(ModbusError::InvalidData { .. })));

        let err = encode_request(&read_request(ModbusFunction::ReadCoils, 0, 2001));
        assert!(matches!(err, Err(ModbusError::InvalidData { .. })));

        let err = encode_request(&read_request(ModbusFunction::ReadInputRegisters, 0, 126));
        assert!(matches!(err, Err(ModbusError::InvalidData { .. })));

        let err = encode_request(&ModbusRequest::new_write(
            1,
            ModbusFunction::WriteMultipleRegisters,
            0,
            124,
            vec![0; 248],
        ));
        assert!(matches!(err, Err(ModbusError::InvalidData { .. })));
    }

    #[test]
    fn test_encode_single_coil_rejects_raw_garbage() {
        // A raw payload that is neither 0xFF00 nor 0x0000 must fail locally
        let request = ModbusRequest::new_write(
            1,
            ModbusFunction::WriteSingleCoil,
            0x00AC,
            1,
            vec![0x12, 0x34],
        );
        assert!(matches!(
            encode_request(&request),
            Err(ModbusError::InvalidData { .. })
        ));

        let request = ModbusRequest::new_write(
            1,
            ModbusFunction::WriteSingleCoil,
            0x00AC,
            1,
            vec![0xFF, 0x00],
        );
        let pdu = encode_request(&request).unwrap();
        assert_eq!(pdu.as_slice(), &[0x05, 0x00, 0xAC, 0xFF, 0x00]);
    }

    #[test]
    fn test_encode_mask_write_request() {
        let request = ModbusRequest::new_mask_write(1, 0x0004, 0x00F2, 0x0025);
        let pdu = encode_request(&request).unwrap();
        assert_eq!(pdu.as_slice(), &[0x16, 0x00, 0x04, 0x00, 0xF2, 0x00, 0x25]);
    }

    #[test]
    fn test_encode_read_write_request() {
        let request = ModbusRequest::new_read_write(1, 0x0003, 6, 0x000E, &[0x00FF, 0x00FE]);
        let pdu = encode_request(&request).unwrap();
        assert_eq!(
            pdu.as_slice(),
            &[0x17, 0x00, 0x03, 0x00, 0x06, 0x00, 0x0E, 0x00, 0x02, 0x04, 0x00, 0xFF, 0x00, 0xFE]
        );

        let oversized = ModbusRequest::new_read_write(1, 0, 1, 0, &[0u16; 122]);
        assert!(matches!(
            encode_request(&oversized),
            Err(ModbusError::InvalidData { .. })
        ));
    }

    #[test]
    fn test_decode_read_response() {
        let request = read_request(ModbusFunction::ReadCoils, 0x0013, 0x0013);
        let response = decode_response(&request, &[0x01, 0x03, 0xCD, 0x6B, 0x05]).unwrap();
        let bits = response.parse_bits().unwrap();
        assert!(bits[0]);
        assert!(!bits[1]);
        assert_eq!(bits.len(), 24);

        let request = read_request(ModbusFunction::ReadHoldingRegisters, 0x006B, 3);
        let response =
            decode_response(&request, &[0x03, 0x06, 0x02, 0x2B, 0x00, 0x00, 0x00, 0x64]).unwrap();
        assert_eq!(
            response.parse_registers().unwrap(),
            vec![0x022B, 0x0000, 0x0064]
        );
    }

    #[test]
    fn test_decode_response_byte_count_mismatch() {
        let request = read_request(ModbusFunction::ReadHoldingRegisters, 0, 2);
        // Byte count says 6 but 2 registers need 4
        let err = decode_response(&request, &[0x03, 0x06, 0x00, 0x01, 0x00, 0x02, 0x00, 0x03]);
        assert!(matches!(err, Err(ModbusError::InvalidLength { .. })));

        // Byte count right, actual payload truncated
        let err = decode_response(&request, &[0x03, 0x04, 0x00, 0x01]);
        assert!(matches!(err, Err(ModbusError::InvalidLength { .. })));
    }

    #[test]
    fn test_decode_response_wrong_function() {
        let request = read_request(ModbusFunction::ReadHoldingRegisters, 0, 1);
        let err = decode_response(&request, &[0x04, 0x02, 0x00, 0x01]);
        assert!(matches!(err, Err(ModbusError::InvalidResponse { .. })));

        // A foreign function code with the error bit set is not an exception
        let err = decode_response(&request, &[0x84, 0x02]);
        assert!(matches!(err, Err(ModbusError::InvalidResponse { .. })));
    }

    #[test]
    fn test_decode_exception_response() {
        let request = read_request(ModbusFunction::ReadHoldingRegisters, 0, 1);
        let err = decode_response(&request, &[0x83, 0x02]);
        assert_eq!(
            err,
            Err(ModbusError::Exception {
                function: 0x03,
                code: 0x02
            })
        );

        // Exception frames are exactly 2 bytes
        let err = decode_response(&request, &[0x83]);
        assert!(matches!(err, Err(ModbusError::InvalidLength { .. })));
        let err = decode_response(&request, &[0x83, 0x02, 0x00]);
        assert!(matches!(err, Err(ModbusError::InvalidLength { .. })));
    }

    #[test]
    fn test_decode_write_echo() {
        let request = ModbusRequest::new_write(
            1,
            ModbusFunction::WriteSingleCoil,
            0x00AC,
            1,
            vec![0xFF, 0x00],
        );
        let response = decode_response(&request, &[0x05, 0x00, 0xAC, 0xFF, 0x00]).unwrap();
        assert_eq!(response.function, ModbusFunction::WriteSingleCoil);

        // Echoed address differs from the request
        let err = decode_response(&request, &[0x05, 0x00, 0xAD, 0xFF, 0x00]);
        assert!(matches!(err, Err(ModbusError::InvalidResponse { .. })));

        // Echoed value differs from the request
        let err = decode_response(&request, &[0x05, 0x00, 0xAC, 0x00, 0x00]);
        assert!(matches!(err, Err(ModbusError::InvalidResponse { .. })));
    }

    #[test]
    fn test_decode_multi_write_echo() {
        let request = ModbusRequest::new_write(
            1,
            ModbusFunction::WriteMultipleRegisters,
            0x0001,
            2,
            vec![0x00, 0x0A, 0x01, 0x02],
        );
        let response = decode_response(&request, &[0x10, 0x00, 0x01, 0x00, 0x02]).unwrap();
        assert_eq!(response.data, vec![0x00, 0x01, 0x00, 0x02]);

        let err = decode_response(&request, &[0x10, 0x00, 0x01, 0x00, 0x03]);
        assert!(matches!(err, Err(ModbusError::InvalidResponse { .. })));
    }

    #[test]
    fn test_decode_mask_write_echo() {
        let request = ModbusRequest::new_mask_write(1, 0x0004, 0x00F2, 0x0025);
        let response =
            decode_response(&request, &[0x16, 0x00, 0x04, 0x00, 0xF2, 0x00, 0x25]).unwrap();
        assert_eq!(response.function, ModbusFunction::MaskWriteRegister);

        let err = decode_response(&request, &[0x16, 0x00, 0x04, 0x00, 0xF2, 0x00, 0x26]);
        assert!(matches!(err, Err(ModbusError::InvalidResponse { .. })));
    }

    #[test]
    fn test_decode_request_valid() {
        let request = decode_request(5, &[0x03, 0x00, 0x6B, 0x00, 0x03]).unwrap();
        assert_eq!(request.slave_id, 5);
        assert_eq!(request.function, ModbusFunction::ReadHoldingRegisters);
        assert_eq!(request.address, 0x006B);
        assert_eq!(request.quantity, 3);

        let request =
            decode_request(5, &[0x10, 0x00, 0x01, 0x00, 0x02, 0x04, 0x00, 0x0A, 0x01, 0x02])
                .unwrap();
        assert_eq!(request.quantity, 2);
        assert_eq!(request.data, vec![0x00, 0x0A, 0x01, 0x02]);
    }

    #[test]
    fn test_decode_request_read_write() {
        let request = decode_request(
            1,
            &[0x17, 0x00, 0x03, 0x00, 0x06, 0x00, 0x0E, 0x00, 0x02, 0x04, 0x00, 0xFF, 0x00, 0xFE],
        )
        .unwrap();
        assert_eq!(request.function, ModbusFunction::ReadWriteMultipleRegisters);
        assert_eq!(request.address, 0x0003);
        assert_eq!(request.quantity, 6);
        assert_eq!(
            request.data,
            vec![0x00, 0x0E, 0x00, 0x02, 0x00, 0xFF, 0x00, 0xFE]
        );
    }

    #[test]
    fn test_decode_request_malformed() {
        // Unknown function code
        assert_eq!(
            decode_request(1, &[0x2B, 0x00, 0x00]),
            Err(ModbusException::IllegalFunction)
        );

        // Zero quantity
        assert_eq!(
            decode_request(1, &[0x01, 0x00, 0x00, 0x00, 0x00]),
            Err(ModbusException::IllegalDataValue)
        );

        // Quantity over the catalogue limit
        assert_eq!(
            decode_request(1, &[0x03, 0x00, 0x00, 0x00, 0x7E]),
            Err(ModbusException::IllegalDataValue)
        );

        // FC05 with a non-coil value
        assert_eq!(
            decode_request(1, &[0x05, 0x00, 0xAC, 0x12, 0x34]),
            Err(ModbusException::IllegalDataValue)
        );

        // FC16 byte count disagrees with quantity
        assert_eq!(
            decode_request(1, &[0x10, 0x00, 0x01, 0x00, 0x02, 0x02, 0x00, 0x0A]),
            Err(ModbusException::IllegalDataValue)
        );

        // Truncated body
        assert_eq!(
            decode_request(1, &[0x0F, 0x00, 0x01, 0x00]),
            Err(ModbusException::IllegalDataValue)
        );

        // Empty PDU
        assert_eq!(decode_request(1, &[]), Err(ModbusException::IllegalDataValue));
    }

    #[test]
    fn test_encode_responses() {
        let pdu = encode_read_bits_response(
            ModbusFunction::ReadCoils,
            &[
                true, false, true, true, false, false, true, true, true, false, true,
            ],
        )
        .unwrap();
        assert_eq!(pdu.as_slice(), &[0x01, 0x02, 0xCD, 0x05]);

        let pdu = encode_read_registers_response(
            ModbusFunction::ReadHoldingRegisters,
            &[0x022B, 0x0000, 0x0064],
        )
        .unwrap();
        assert_eq!(
            pdu.as_slice(),
            &[0x03, 0x06, 0x02, 0x2B, 0x00, 0x00, 0x00, 0x64]
        );

        let request = ModbusRequest::new_write(
            1,
            ModbusFunction::WriteMultipleCoils,
            0x0013,
            10,
            vec![0xCD, 0x01],
        );
        let pdu = encode_echo_response(&request).unwrap();
        assert_eq!(pdu.as_slice(), &[0x0F, 0x00, 0x13, 0x00, 0x0A]);

        let pdu = encode_exception(0x03, ModbusException::IllegalDataAddress).unwrap();
        assert_eq!(pdu.as_slice(), &[0x83, 0x02]);
    }

    #[test]
    fn test_request_decode_encode_round_trip() {
        // A request that decodes on the server side re-encodes to the same PDU
        let wire = [
            0x17, 0x00, 0x03, 0x00, 0x06, 0x00, 0x0E, 0x00, 0x02, 0x04, 0x00, 0xFF, 0x00, 0xFE,
        ];
        let request = decode_request(1, &wire).unwrap();
        let pdu = encode_request(&request).unwrap();
        assert_eq!(pdu.as_slice(), &wire);
    }
}

#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn read_requests_round_trip(address in 0u16.., quantity in 1u16..=125) {
            let request = ModbusRequest::new_read(
                1,
                ModbusFunction::ReadHoldingRegisters,
                address,
                quantity,
            );
            let pdu = encode_request(&request).unwrap();
            let decoded = decode_request(1, pdu.as_slice()).unwrap();
            prop_assert_eq!(decoded, request);
        }

        #[test]
        fn oversized_read_requests_fail(quantity in 126u16..) {
            let request = ModbusRequest::new_read(
                1,
                ModbusFunction::ReadHoldingRegisters,
                0,
                quantity,
            );
            prop_assert!(encode_request(&request).is_err());
        }

        #[test]
        fn coil_writes_round_trip(
            address in 0u16..,
            bits in proptest::collection::vec(any::<bool>(), 1..=64),
        ) {
            let request = ModbusRequest::new_write(
                1,
                ModbusFunction::WriteMultipleCoils,
                address,
                bits.len() as u16,
                crate::utils::pack_bits(&bits),
            );
            let pdu = encode_request(&request).unwrap();
            let decoded = decode_request(1, pdu.as_slice()).unwrap();
            prop_assert_eq!(decoded, request);
        }

        #[test]
        fn mask_writes_round_trip(address in 0u16.., and_mask: u16, or_mask: u16) {
            let request = ModbusRequest::new_mask_write(1, address, and_mask, or_mask);
            let pdu = encode_request(&request).unwrap();
            let decoded = decode_request(1, pdu.as_slice()).unwrap();
            prop_assert_eq!(decoded, request);
        }
    }
}
