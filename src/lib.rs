//! # mbtcp - Modbus TCP Client and Server Engine
//!
//! **License:** MIT
//!
//! An async Modbus TCP implementation in pure Rust covering both sides of the
//! wire: a transaction-matching client and a bounded-concurrency server with
//! two-phase write semantics, built for industrial controllers and test rigs.
//!
//! ## Features
//!
//! - **Async Client and Server**: Tokio-based, one crate for both roles
//! - **Full Function Catalogue**: bit and register access, mask write, combined read/write
//! - **Strict Transaction Matching**: stale responses discarded, desync drops the link
//! - **Two-Phase Writes**: server-side validate-then-commit, partial writes never land
//! - **Bounded Server Concurrency**: fixed connection limit with idle reaping
//! - **Modbus/TCP Security Hooks**: TLS acceptor seam and certificate role extraction
//! - **Built-in Monitoring**: per-connection and per-transport statistics
//!
//! ## Supported Function Codes
//!
//! | Code | Function | Client | Server |
//! |------|----------|--------|--------|
//! | 0x01 | Read Coils | ✅ | ✅ |
//! | 0x02 | Read Discrete Inputs | ✅ | ✅ |
//! | 0x03 | Read Holding Registers | ✅ | ✅ |
//! | 0x04 | Read Input Registers | ✅ | ✅ |
//! | 0x05 | Write Single Coil | ✅ | ✅ |
//! | 0x06 | Write Single Register | ✅ | ✅ |
//! | 0x0F | Write Multiple Coils | ✅ | ✅ |
//! | 0x10 | Write Multiple Registers | ✅ | ✅ |
//! | 0x16 | Mask Write Register | ✅ | ✅ |
//! | 0x17 | Read/Write Multiple Registers | ✅ | ✅ |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mbtcp::{ModbusTcpClient, ModbusClient, ModbusResult};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> ModbusResult<()> {
//!     // Connect to a Modbus TCP server
//!     let mut client = ModbusTcpClient::from_address("127.0.0.1:502", Duration::from_secs(5)).await?;
//!
//!     // Read holding registers
//!     let values = client.read_03(1, 0, 10).await?;
//!     println!("Read registers: {:?}", values);
//!
//!     // Write single register
//!     client.write_06(1, 100, 0x1234).await?;
//!
//!     client.close().await?;
//!     Ok(())
//! }
//! ```
//!
//! Serving is one register bank away:
//!
//! ```rust,no_run
//! use mbtcp::{ModbusRegisterBank, ModbusServer, ModbusTcpServer, ModbusResult};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> ModbusResult<()> {
//!     let bank = Arc::new(ModbusRegisterBank::new());
//!     let mut server = ModbusTcpServer::new("0.0.0.0:502", bank)?;
//!     server.start().await?;
//!     tokio::signal::ctrl_c().await.ok();
//!     server.stop().await
//! }
//! ```

// ============================================================================
// Core protocol modules
// ============================================================================

/// Core error types and result handling
pub mod error;

/// Modbus protocol constants based on official specification
pub mod constants;

/// High-performance PDU with stack-allocated fixed array
pub mod pdu;

/// Modbus protocol definitions and message handling
pub mod protocol;

/// PDU encoding and decoding for both protocol roles
pub mod codec;

/// MBAP header parsing and ADU framing
pub mod frame;

// ============================================================================
// Engine modules
// ============================================================================

/// Client-side TCP transport and transaction matching
pub mod transport;

/// Modbus client implementations
pub mod client;

/// Modbus TCP server engine
pub mod server;

/// In-memory register bank backing the server
pub mod register_bank;

/// TLS entry point and certificate role extraction
pub mod security;

/// Utility functions for wire data layouts
pub mod utils;

/// Frame-level logging helpers
pub mod logging;

// ============================================================================
// Re-exports for convenience
// ============================================================================

// === Async runtime (users can use mbtcp::tokio) ===
pub use tokio;

// === Core client API ===
pub use client::{GenericModbusClient, ModbusClient, ModbusTcpClient};

// === Server API ===
pub use server::{
    AccessContext, DataStore, ModbusServer, ModbusTcpServer, ModbusTcpServerConfig, PduHook,
    ServerStats,
};

// === Data store ===
pub use register_bank::ModbusRegisterBank;

// === Error handling ===
pub use error::{ModbusError, ModbusResult};

// === Core types ===
pub use protocol::{
    ModbusAddress, ModbusException, ModbusFunction, ModbusRequest, ModbusResponse, ModbusValue,
    SlaveId,
};

// === Monitoring ===
pub use transport::{ClientState, ModbusTransport, TcpTransport, TransportStats};

// === Security ===
pub use security::{extract_role, SessionStream, TlsAcceptor, TlsSession};

// === Framing (advanced usage) ===
pub use frame::{encode_adu, MbapHeader};

// === PDU (advanced usage) ===
pub use pdu::{ModbusPdu, PduBuilder};

// === Protocol limits (commonly needed constants) ===
pub use constants::{
    MAX_PDU_SIZE, MAX_READ_COILS, MAX_READ_REGISTERS, MAX_WRITE_COILS, MAX_WRITE_REGISTERS,
};

/// Default timeout for operations (5 seconds)
pub const DEFAULT_TIMEOUT_MS: u64 = 5000;

/// Modbus TCP default port
pub const DEFAULT_TCP_PORT: u16 = 502;

/// Modbus/TCP Security (TLS) default port
pub const DEFAULT_TLS_PORT: u16 = 802;

/// Default unit ID, the "accept anything" wildcard
pub const DEFAULT_UNIT_ID: u8 = 255;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get library information
pub fn info() -> String {
    format!("mbtcp v{} - Modbus TCP client/server protocol engine", VERSION)
}
