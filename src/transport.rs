//! Modbus TCP transport layer
//!
//! [`TcpTransport`] owns the socket, the transaction identifier counter and
//! the request/response cycle: frame the PDU with an MBAP header, send it,
//! then read frames until one carries the expected transaction identifier.
//! Responses to earlier, timed-out transactions are discarded on the way.
//!
//! The [`ModbusTransport`] trait is the seam the client layer is generic
//! over, so tests can substitute a mock without touching a socket.
//!
//! # Usage
//!
//! ```rust,no_run
//! use mbtcp::transport::{TcpTransport, ModbusTransport};
//! use mbtcp::protocol::{ModbusRequest, ModbusFunction};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut transport = TcpTransport::new(
//!         "127.0.0.1:502".parse()?,
//!         Duration::from_secs(5)
//!     ).await?;
//!
//!     let request = ModbusRequest::new_read(
//!         1,                                    // slave_id
//!         ModbusFunction::ReadHoldingRegisters, // function
//!         0,                                    // address
//!         10,                                   // quantity
//!     );
//!
//!     let response = transport.request(&request).await?;
//!     println!("Registers: {:?}", response.parse_registers()?);
//!
//!     let stats = transport.get_stats();
//!     println!("Requests sent: {}", stats.requests_sent);
//!
//!     transport.close().await?;
//!     Ok(())
//! }
//! ```

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{timeout, timeout_at, Instant};
use tracing::debug;

use crate::codec;
use crate::constants::MBAP_HEADER_SIZE;
use crate::error::{ModbusError, ModbusResult};
use crate::frame::{encode_adu, MbapHeader};
use crate::logging::{log_frame, Direction};
use crate::protocol::{unit_id_matches, ModbusRequest, ModbusResponse};

/// Connection lifecycle of a client transport
///
/// Requests are only accepted in [`ClientState::Connected`]. The transient
/// `Sending`/`Receiving` states bracket a single transaction; the transport
/// returns to `Connected` when the transaction finishes, even on timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// No socket; a new connection attempt is required
    Disconnected,
    /// Connection attempt in flight
    Connecting,
    /// Socket established and idle
    Connected,
    /// Request frame being written
    Sending,
    /// Waiting for the matching response frame
    Receiving,
    /// Graceful shutdown in progress
    Disconnecting,
}

/// Transport layer abstraction for Modbus communication
///
/// All implementations must be `Send + Sync` to support multi-threaded
/// usage patterns. Implemented by [`TcpTransport`] and test doubles.
pub trait ModbusTransport: Send + Sync {
    /// Send a request and wait for the matching response
    ///
    /// Handles the complete request/response cycle: encoding, framing,
    /// transmission and response validation. Returns
    /// [`ModbusError::Exception`] when the remote device answers with an
    /// exception frame.
    fn request(
        &mut self,
        request: &ModbusRequest,
    ) -> impl std::future::Future<Output = ModbusResult<ModbusResponse>> + Send;

    /// Check if the transport believes it has an active connection
    ///
    /// This is a local check and does not verify that the remote device
    /// is responsive.
    fn is_connected(&self) -> bool;

    /// Gracefully shut down the connection
    ///
    /// Half-closes the send side and waits for the shutdown to complete.
    /// Errors during shutdown still leave the transport disconnected.
    fn disconnect(&mut self) -> impl std::future::Future<Output = ModbusResult<()>> + Send;

    /// Tear down the connection immediately, without a graceful shutdown
    fn close(&mut self) -> impl std::future::Future<Output = ModbusResult<()>> + Send;

    /// Get communication statistics
    fn get_stats(&self) -> TransportStats;
}

/// Transport layer statistics
#[derive(Debug, Clone, Default)]
pub struct TransportStats {
    pub requests_sent: u64,
    pub responses_received: u64,
    pub errors: u64,
    pub timeouts: u64,
    /// Well-formed frames discarded because their transaction identifier
    /// belonged to an earlier, already-failed request
    pub stale_responses: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

/// Modbus TCP transport implementation
pub struct TcpTransport {
    stream: Option<TcpStream>,
    pub address: SocketAddr,
    timeout: Duration,
    transaction_id: u16,
    state: ClientState,
    stats: TransportStats,
    /// Enable frame hex logging for debugging
    packet_logging: bool,
}

impl TcpTransport {
    /// Create a new TCP transport and connect immediately
    pub async fn new(address: SocketAddr, timeout: Duration) -> ModbusResult<Self> {
        let mut transport = Self {
            stream: None,
            address,
            timeout,
            transaction_id: 0,
            state: ClientState::Disconnected,
            stats: TransportStats::default(),
            packet_logging: false,
        };
        transport.reconnect().await?;
        Ok(transport)
    }

    /// Create a new TCP transport with frame logging enabled
    pub async fn with_packet_logging(
        address: SocketAddr,
        timeout: Duration,
        enable_logging: bool,
    ) -> ModbusResult<Self> {
        let mut transport = Self::new(address, timeout).await?;
        transport.packet_logging = enable_logging;
        Ok(transport)
    }

    /// Enable or disable frame logging
    pub fn set_packet_logging(&mut self, enabled: bool) {
        self.packet_logging = enabled;
    }

    /// Current connection state
    pub fn state(&self) -> ClientState {
        self.state
    }

    /// Drop any existing socket and establish a fresh connection
    ///
    /// The connection attempt is bounded by the transport timeout.
    pub async fn reconnect(&mut self) -> ModbusResult<()> {
        self.stream = None;
        self.state = ClientState::Connecting;

        match timeout(self.timeout, TcpStream::connect(self.address)).await {
            Ok(Ok(stream)) => {
                self.stream = Some(stream);
                self.state = ClientState::Connected;
                Ok(())
            }
            Ok(Err(e)) => {
                self.state = ClientState::Disconnected;
                Err(ModbusError::connection(format!(
                    "Failed to connect to {}: {}",
                    self.address, e
                )))
            }
            Err(_) => {
                self.state = ClientState::Disconnected;
                Err(ModbusError::timeout(
                    format!("connect to {}", self.address),
                    self.timeout.as_millis() as u64,
                ))
            }
        }
    }

    /// Get next transaction ID, wrapping and skipping 0
    fn next_transaction_id(&mut self) -> u16 {
        self.transaction_id = self.transaction_id.wrapping_add(1);
        if self.transaction_id == 0 {
            self.transaction_id = 1;
        }
        self.transaction_id
    }

    /// Tear down the connection after an unrecoverable transport error
    fn drop_connection(&mut self) {
        self.stream = None;
        self.state = ClientState::Disconnected;
        self.stats.errors += 1;
    }
}

impl ModbusTransport for TcpTransport {
    async fn request(&mut self, request: &ModbusRequest) -> ModbusResult<ModbusResponse> {
        if self.state != ClientState::Connected || self.stream.is_none() {
            return Err(ModbusError::wrong_state(format!(
                "Transport is {:?}, requests need an established connection",
                self.state
            )));
        }

        // Validate and encode before touching the wire; an invalid request
        // fails locally with no state change.
        let pdu = codec::encode_request(request)?;
        let transaction_id = self.next_transaction_id();
        let adu = encode_adu(transaction_id, request.slave_id, &pdu)?;

        // One deadline covers the whole transaction, including any stale
        // frames that have to be drained first.
        let deadline = Instant::now() + self.timeout;

        self.state = ClientState::Sending;
        self.stats.requests_sent += 1;

        if self.packet_logging {
            log_frame(Direction::Send, self.address, &adu);
        }

        let stream = match self.stream.as_mut() {
            Some(stream) => stream,
            None => {
                self.state = ClientState::Disconnected;
                return Err(ModbusError::connection("Socket closed"));
            }
        };

        match timeout_at(deadline, stream.write_all(&adu)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                self.drop_connection();
                return Err(e.into());
            }
            Err(_) => {
                self.stats.timeouts += 1;
                self.stats.errors += 1;
                self.state = ClientState::Connected;
                return Err(ModbusError::timeout(
                    "send request",
                    self.timeout.as_millis() as u64,
                ));
            }
        }
        self.stats.bytes_sent += adu.len() as u64;

        self.state = ClientState::Receiving;

        // Read frames until the transaction identifier matches. A response
        // left over from a timed-out request is logged and discarded; it
        // does not consume the deadline reset.
        let pdu_buf = loop {
            let stream = match self.stream.as_mut() {
                Some(stream) => stream,
                None => {
                    self.state = ClientState::Disconnected;
                    return Err(ModbusError::connection("Socket closed"));
                }
            };

            let mut header_buf = [0u8; MBAP_HEADER_SIZE];
            match timeout_at(deadline, stream.read_exact(&mut header_buf)).await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => {
                    self.drop_connection();
                    return Err(e.into());
                }
                Err(_) => {
                    self.stats.timeouts += 1;
                    self.stats.errors += 1;
                    self.state = ClientState::Connected;
                    return Err(ModbusError::timeout(
                        "read response header",
                        self.timeout.as_millis() as u64,
                    ));
                }
            }

            // A header that fails to parse means the byte stream is out of
            // sync; nothing after it can be trusted, so drop the connection.
            let header = match MbapHeader::parse(&header_buf) {
                Ok(header) => header,
                Err(e) => {
                    self.drop_connection();
                    return Err(e);
                }
            };

            let mut body = vec![0u8; header.pdu_len()];
            match timeout_at(deadline, stream.read_exact(&mut body)).await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => {
                    self.drop_connection();
                    return Err(e.into());
                }
                Err(_) => {
                    self.stats.timeouts += 1;
                    self.stats.errors += 1;
                    self.state = ClientState::Connected;
                    return Err(ModbusError::timeout(
                        "read response body",
                        self.timeout.as_millis() as u64,
                    ));
                }
            }

            self.stats.bytes_received += (MBAP_HEADER_SIZE + body.len()) as u64;

            if self.packet_logging {
                let mut raw = Vec::with_capacity(MBAP_HEADER_SIZE + body.len());
                raw.extend_from_slice(&header_buf);
                raw.extend_from_slice(&body);
                log_frame(Direction::Receive, self.address, &raw);
            }

            if header.transaction_id != transaction_id {
                debug!(
                    "Discarding stale response: transaction {} (expected {})",
                    header.transaction_id, transaction_id
                );
                self.stats.stale_responses += 1;
                continue;
            }

            if !unit_id_matches(request.slave_id, header.unit_id) {
                self.stats.errors += 1;
                self.state = ClientState::Connected;
                return Err(ModbusError::wrong_identifier(format!(
                    "Response unit ID mismatch: expected {}, got {}",
                    request.slave_id, header.unit_id
                )));
            }

            break body;
        };

        self.state = ClientState::Connected;
        self.stats.responses_received += 1;

        match codec::decode_response(request, &pdu_buf) {
            Ok(response) => Ok(response),
            Err(e) => {
                self.stats.errors += 1;
                Err(e)
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    async fn disconnect(&mut self) -> ModbusResult<()> {
        self.state = ClientState::Disconnecting;
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.shutdown().await;
        }
        self.state = ClientState::Disconnected;
        Ok(())
    }

    async fn close(&mut self) -> ModbusResult<()> {
        self.stream = None;
        self.state = ClientState::Disconnected;
        Ok(())
    }

    fn get_stats(&self) -> TransportStats {
        self.stats.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ModbusFunction;
    use tokio::net::TcpListener;
    use tokio_test::assert_ok;

    fn detached_transport() -> TcpTransport {
        TcpTransport {
            stream: None,
            address: "127.0.0.1:502".parse().unwrap(),
            timeout: Duration::from_millis(100),
            transaction_id: 0,
            state: ClientState::Disconnected,
            stats: TransportStats::default(),
            packet_logging: false,
        }
    }

    #[test]
    fn test_transaction_id_skips_zero() {
        let mut transport = detached_transport();
        assert_eq!(transport.next_transaction_id(), 1);
        assert_eq!(transport.next_transaction_id(), 2);

        transport.transaction_id = u16::MAX;
        assert_eq!(transport.next_transaction_id(), 1);
    }

    #[tokio::test]
    async fn test_request_requires_connection() {
        let mut transport = detached_transport();
        let request = ModbusRequest::new_read(1, ModbusFunction::ReadCoils, 0, 1);

        let err = transport.request(&request).await;
        assert!(matches!(err, Err(ModbusError::WrongState { .. })));
        assert_eq!(transport.get_stats().requests_sent, 0);
    }

    #[tokio::test]
    async fn test_close_without_connection() {
        let mut transport = detached_transport();
        assert_ok!(transport.close().await);
        assert_eq!(transport.state(), ClientState::Disconnected);
    }

    #[tokio::test]
    async fn test_disconnect_signals_peer() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 8];
            // EOF, not data: the client half-closed its send side
            socket.read(&mut buf).await.unwrap()
        });

        let mut transport = TcpTransport::new(addr, Duration::from_secs(1)).await.unwrap();
        assert_ok!(transport.disconnect().await);
        assert_eq!(transport.state(), ClientState::Disconnected);
        assert!(!transport.is_connected());

        assert_eq!(server.await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_request_round_trip() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 12];
            socket.read_exact(&mut request).await.unwrap();
            // Echo transaction and unit IDs, answer with two registers
            let response = [
                request[0], request[1], 0x00, 0x00, 0x00, 0x07, request[6], 0x03, 0x04, 0x12,
                0x34, 0x56, 0x78,
            ];
            socket.write_all(&response).await.unwrap();
        });

        let mut transport = TcpTransport::new(addr, Duration::from_secs(1)).await.unwrap();
        assert_eq!(transport.state(), ClientState::Connected);

        let request = ModbusRequest::new_read(1, ModbusFunction::ReadHoldingRegisters, 0, 2);
        let response = assert_ok!(transport.request(&request).await);
        assert_eq!(response.parse_registers().unwrap(), vec![0x1234, 0x5678]);

        let stats = transport.get_stats();
        assert_eq!(stats.requests_sent, 1);
        assert_eq!(stats.responses_received, 1);
        assert_eq!(stats.bytes_sent, 12);
        assert_eq!(stats.bytes_received, 13);
        assert_eq!(transport.state(), ClientState::Connected);
    }

    #[tokio::test]
    async fn test_stale_response_discarded() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 12];
            socket.read_exact(&mut request).await.unwrap();

            let txn = u16::from_be_bytes([request[0], request[1]]);
            // A leftover frame from a transaction that never happened
            let stale_txn = txn.wrapping_add(100).to_be_bytes();
            let stale = [
                stale_txn[0], stale_txn[1], 0x00, 0x00, 0x00, 0x05, request[6], 0x03, 0x02,
                0xDE, 0xAD,
            ];
            socket.write_all(&stale).await.unwrap();

            let fresh = [
                request[0], request[1], 0x00, 0x00, 0x00, 0x05, request[6], 0x03, 0x02, 0xBE,
                0xEF,
            ];
            socket.write_all(&fresh).await.unwrap();
        });

        let mut transport = TcpTransport::new(addr, Duration::from_secs(1)).await.unwrap();
        let request = ModbusRequest::new_read(1, ModbusFunction::ReadHoldingRegisters, 0, 1);
        let response = transport.request(&request).await.unwrap();

        assert_eq!(response.parse_registers().unwrap(), vec![0xBEEF]);
        assert_eq!(transport.get_stats().stale_responses, 1);
        assert_eq!(transport.get_stats().responses_received, 1);
    }

    #[tokio::test]
    async fn test_timeout_keeps_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 12];
            socket.read_exact(&mut request).await.unwrap();
            // Never respond; hold the socket open past the client deadline
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let mut transport = TcpTransport::new(addr, Duration::from_millis(50)).await.unwrap();
        let request = ModbusRequest::new_read(1, ModbusFunction::ReadHoldingRegisters, 0, 1);

        let err = transport.request(&request).await;
        assert!(matches!(err, Err(ModbusError::Timeout { .. })));

        // The socket survives a deadline expiry; only transport failures
        // drop the connection.
        assert!(transport.is_connected());
        assert_eq!(transport.state(), ClientState::Connected);
        assert_eq!(transport.get_stats().timeouts, 1);
    }

    #[tokio::test]
    async fn test_exception_response_surfaces_as_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 12];
            socket.read_exact(&mut request).await.unwrap();
            let response = [
                request[0], request[1], 0x00, 0x00, 0x00, 0x03, request[6], 0x83, 0x02,
            ];
            socket.write_all(&response).await.unwrap();
        });

        let mut transport = TcpTransport::new(addr, Duration::from_secs(1)).await.unwrap();
        let request = ModbusRequest::new_read(1, ModbusFunction::ReadHoldingRegisters, 0x1000, 1);

        let err = transport.request(&request).await;
        assert_eq!(
            err,
            Err(ModbusError::Exception {
                function: 0x03,
                code: 0x02
            })
        );
        // The connection stays usable after a protocol-level exception
        assert!(transport.is_connected());
    }

    #[tokio::test]
    async fn test_garbage_header_drops_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 12];
            socket.read_exact(&mut request).await.unwrap();
            // Non-zero protocol identifier marks the stream as desynced
            let response = [
                request[0], request[1], 0xFF, 0xFF, 0x00, 0x05, request[6], 0x03, 0x02, 0x00,
                0x01,
            ];
            socket.write_all(&response).await.unwrap();
        });

        let mut transport = TcpTransport::new(addr, Duration::from_secs(1)).await.unwrap();
        let request = ModbusRequest::new_read(1, ModbusFunction::ReadHoldingRegisters, 0, 1);

        let err = transport.request(&request).await;
        assert!(matches!(err, Err(ModbusError::WrongIdentifier { .. })));
        assert!(!transport.is_connected());
        assert_eq!(transport.state(), ClientState::Disconnected);
    }
}
