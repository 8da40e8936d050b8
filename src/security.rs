//! TLS entry point and client role extraction
//!
//! Modbus/TCP Security runs the plain protocol over TLS (default port 802)
//! and carries the client's authorization role in an X.509v3 extension of
//! the leaf certificate. This module owns that seam: the [`TlsAcceptor`]
//! trait the server hands accepted sockets to, and the scan that pulls the
//! role string out of a certificate.
//!
//! The TLS stack itself is brought by the application. Chain verification
//! and trust anchors are entirely the acceptor's province; this module only
//! extracts an attribute, it never grants trust.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

use crate::error::{ModbusError, ModbusResult};

/// DER encoding of the Modbus role OID 1.3.6.1.4.1.50316.802.1
pub const MODBUS_ROLE_OID: &[u8] = &[
    0x2B, 0x06, 0x01, 0x04, 0x01, 0x83, 0x89, 0x0C, 0x86, 0x22, 0x01,
];

/// Longest role string accepted from a certificate
pub const MODBUS_ROLE_MAX_LEN: usize = 32;

/// Byte stream produced by a completed TLS handshake
///
/// Blanket-implemented for every async stream, so acceptors can hand back
/// whatever their TLS library yields (or a plain socket in tests).
pub trait SessionStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> SessionStream for T {}

/// A session the server can speak Modbus over
pub struct TlsSession {
    /// Decrypted byte stream
    pub stream: Box<dyn SessionStream>,
    /// DER-encoded leaf certificate presented by the client, if any
    pub peer_certificate: Option<Bytes>,
}

/// Server-side TLS handshake
///
/// Installed on a [`ModbusTcpServer`](crate::server::ModbusTcpServer) via
/// `set_tls_acceptor`. The acceptor owns certificate verification; the
/// engine trusts whatever session it returns and only scans the surfaced
/// leaf certificate for the role attribute.
#[async_trait]
pub trait TlsAcceptor: Send + Sync {
    /// Run the handshake on a freshly accepted socket
    async fn accept(&self, stream: TcpStream) -> ModbusResult<TlsSession>;
}

/// Extract the Modbus role from a DER-encoded certificate
///
/// Scans the raw bytes for the role OID and, at the first match, decodes the
/// extension value behind it: an optional criticality flag followed by an
/// OCTET STRING wrapping a UTF8String. Returns `Ok(None)` when the
/// certificate carries no role extension, and an error when the extension is
/// present but malformed, longer than [`MODBUS_ROLE_MAX_LEN`], or not valid
/// UTF-8.
pub fn extract_role(certificate: &[u8]) -> ModbusResult<Option<String>> {
    let oid_len = MODBUS_ROLE_OID.len();
    let mut at = 0;
    while at + 2 + oid_len <= certificate.len() {
        if certificate[at] == 0x06
            && certificate[at + 1] as usize == oid_len
            && &certificate[at + 2..at + 2 + oid_len] == MODBUS_ROLE_OID
        {
            return parse_role_value(&certificate[at + 2 + oid_len..]).map(Some);
        }
        at += 1;
    }
    Ok(None)
}

/// Decode the extension value that follows the role OID
fn parse_role_value(data: &[u8]) -> ModbusResult<String> {
    let mut at = 0;

    // Optional criticality BOOLEAN between the OID and the value
    if data.get(at) == Some(&0x01) {
        let flag_len = short_len(data.get(at + 1))?;
        at += 2 + flag_len;
    }

    if data.get(at) != Some(&0x04) {
        return Err(ModbusError::protocol(
            "Role extension value is not an OCTET STRING",
        ));
    }
    let outer_len = short_len(data.get(at + 1))?;
    at += 2;

    if data.get(at) != Some(&0x0C) {
        return Err(ModbusError::protocol(
            "Role extension does not wrap a UTF8String",
        ));
    }
    let role_len = short_len(data.get(at + 1))?;
    at += 2;

    if role_len + 2 > outer_len {
        return Err(ModbusError::protocol("Role extension length mismatch"));
    }
    if role_len > MODBUS_ROLE_MAX_LEN {
        return Err(ModbusError::protocol(format!(
            "Role longer than {} bytes",
            MODBUS_ROLE_MAX_LEN
        )));
    }

    let bytes = data
        .get(at..at + role_len)
        .ok_or_else(|| ModbusError::protocol("Role extension truncated"))?;
    let role = std::str::from_utf8(bytes)
        .map_err(|_| ModbusError::protocol("Role is not valid UTF-8"))?;
    Ok(role.to_string())
}

/// Short-form DER length byte
///
/// Roles are bounded well below 128 bytes, so a long-form length here can
/// only mean a certificate this scan does not understand.
fn short_len(byte: Option<&u8>) -> ModbusResult<usize> {
    match byte {
        Some(&len) if len < 0x80 => Ok(len as usize),
        Some(_) => Err(ModbusError::protocol(
            "Role extension uses long-form length",
        )),
        None => Err(ModbusError::protocol("Role extension truncated")),
    }
}
