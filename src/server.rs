//! Modbus TCP server engine
//!
//! Accepts Modbus TCP connections, decodes requests, and answers them from a
//! user-supplied [`DataStore`]. The engine owns the wire protocol and the
//! request lifecycle; the store owns the data and the access policy.
//!
//! Features:
//! - Bounded concurrent connections: surplus clients are closed at accept time
//! - Strict request/response serialization within each connection
//! - Two-phase writes so multi-element writes land completely or not at all
//! - Unit ID filtering with 0 and 255 accepted as wildcards on both sides
//! - Idle connections force-closed after a configurable timeout
//! - Optional [`PduHook`] with first refusal on every inbound PDU
//! - Optional TLS entry point with role extraction from the client certificate

use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::codec;
use crate::constants::MBAP_HEADER_SIZE;
use crate::error::{ModbusError, ModbusResult};
use crate::frame::{encode_adu, MbapHeader};
use crate::logging::{log_frame, Direction};
use crate::pdu::ModbusPdu;
use crate::protocol::{
    unit_id_matches, ModbusException, ModbusFunction, ModbusRequest, SlaveId,
};
use crate::security::{extract_role, TlsAcceptor, TlsSession};
use crate::utils::{bytes_to_registers, unpack_bits};

/// Connection slots granted before new clients are turned away
pub const DEFAULT_MAX_CONNECTIONS: usize = 2;

/// How long a connection may sit without completing a request
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Identity attached to every [`DataStore`] call
///
/// Carries the unit ID from the request being served and, on TLS sessions,
/// the role string extracted from the client certificate. Stores that do not
/// enforce authorization can ignore it.
#[derive(Debug, Clone, Copy)]
pub struct AccessContext<'a> {
    /// Unit ID carried by the request
    pub unit_id: SlaveId,
    /// Client role from the certificate, `None` on plain TCP sessions
    pub role: Option<&'a str>,
}

/// Application-side data access for the server engine
///
/// The application holds the coil and register tables and decides how each
/// address is read and written. Every method has a default body that refuses
/// the access with [`ModbusException::IllegalFunction`], so a store only
/// implements the tables it actually serves.
///
/// Writes are driven in two phases. The engine first calls the write method
/// once per target element with `commit == false`; the store must check the
/// write (address range, value, authorization) without changing any state.
/// Only when every element of the request validated cleanly does the engine
/// repeat the calls with `commit == true`. A request that fails validation
/// therefore commits nothing.
///
/// The engine calls [`lock`](DataStore::lock) before the first access of a
/// request and [`unlock`](DataStore::unlock) after the last, with no await
/// point in between. Blocking synchronization is fine here.
pub trait DataStore: Send + Sync {
    /// Called before the first data access of a request
    fn lock(&self) {}

    /// Called after the last data access of a request
    fn unlock(&self) {}

    /// Read one coil (FC 0x01)
    fn read_coil(
        &self,
        _access: &AccessContext<'_>,
        _address: u16,
    ) -> Result<bool, ModbusException> {
        Err(ModbusException::IllegalFunction)
    }

    /// Read one discrete input (FC 0x02)
    fn read_discrete_input(
        &self,
        _access: &AccessContext<'_>,
        _address: u16,
    ) -> Result<bool, ModbusException> {
        Err(ModbusException::IllegalFunction)
    }

    /// Validate (`commit == false`) or apply (`commit == true`) one coil write
    fn write_coil(
        &self,
        _access: &AccessContext<'_>,
        _address: u16,
        _value: bool,
        _commit: bool,
    ) -> Result<(), ModbusException> {
        Err(ModbusException::IllegalFunction)
    }

    /// Read one holding register (FC 0x03, and the read half of FC 0x17)
    fn read_holding_register(
        &self,
        _access: &AccessContext<'_>,
        _address: u16,
    ) -> Result<u16, ModbusException> {
        Err(ModbusException::IllegalFunction)
    }

    /// Read one input register (FC 0x04)
    fn read_input_register(
        &self,
        _access: &AccessContext<'_>,
        _address: u16,
    ) -> Result<u16, ModbusException> {
        Err(ModbusException::IllegalFunction)
    }

    /// Validate (`commit == false`) or apply (`commit == true`) one register write
    fn write_register(
        &self,
        _access: &AccessContext<'_>,
        _address: u16,
        _value: u16,
        _commit: bool,
    ) -> Result<(), ModbusException> {
        Err(ModbusException::IllegalFunction)
    }
}

/// First refusal on inbound PDUs
///
/// When installed, the hook sees every PDU addressed to this server before
/// the built-in handlers. Returning `Some` sends that PDU as the response
/// verbatim; returning `None` hands the request to the standard dispatch.
/// Useful for vendor function codes the engine does not model.
pub trait PduHook: Send + Sync {
    /// Inspect a raw request PDU and optionally answer it
    fn process(&self, unit_id: SlaveId, pdu: &[u8]) -> Option<ModbusPdu>;
}

/// Holds the store lock for the duration of one request
struct StoreGuard<'a> {
    store: &'a dyn DataStore,
}

impl<'a> StoreGuard<'a> {
    fn new(store: &'a dyn DataStore) -> Self {
        store.lock();
        Self { store }
    }

    fn store(&self) -> &'a dyn DataStore {
        self.store
    }
}

impl Drop for StoreGuard<'_> {
    fn drop(&mut self) {
        self.store.unlock();
    }
}

/// Server statistics
#[derive(Debug, Clone, Default)]
pub struct ServerStats {
    /// Connections admitted into a slot
    pub total_connections: u64,
    /// Connections closed at accept time because every slot was busy
    pub connections_rejected: u64,
    /// Requests answered (exception responses included)
    pub requests_processed: u64,
    /// Requests dropped because the unit ID did not address this server
    pub requests_ignored: u64,
    /// Responses that carried an exception code
    pub exceptions_sent: u64,
    /// Connections force-closed by the idle timeout
    pub idle_closures: u64,
    /// Payload bytes received, headers included
    pub bytes_received: u64,
    /// Payload bytes sent, headers included
    pub bytes_sent: u64,
}

/// Common interface for Modbus server implementations
#[async_trait]
pub trait ModbusServer {
    /// Bind the listener and start serving
    async fn start(&mut self) -> ModbusResult<()>;

    /// Stop serving and release the listener
    async fn stop(&mut self) -> ModbusResult<()>;

    /// Whether the server is currently accepting connections
    fn is_running(&self) -> bool;

    /// Snapshot of the server statistics
    fn get_stats(&self) -> ServerStats;
}

/// Modbus TCP server configuration
#[derive(Debug, Clone)]
pub struct ModbusTcpServerConfig {
    /// Address to bind the listener to
    pub bind_address: SocketAddr,
    /// Unit ID this server answers for (0 or 255 answer everything)
    pub unit_id: SlaveId,
    /// Concurrent connections admitted before new clients are closed
    pub max_connections: usize,
    /// Idle time after which a connection is force-closed
    pub idle_timeout: Duration,
}

impl Default for ModbusTcpServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([0, 0, 0, 0], crate::DEFAULT_TCP_PORT)),
            unit_id: crate::DEFAULT_UNIT_ID,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }
}

/// State shared with every connection task
#[derive(Clone)]
struct ConnectionContext {
    config: ModbusTcpServerConfig,
    store: Arc<dyn DataStore>,
    hook: Option<Arc<dyn PduHook>>,
    stats: Arc<Mutex<ServerStats>>,
}

/// Modbus TCP server
///
/// Owns the accept loop and one task per admitted connection. All state
/// shared with those tasks is behind `Arc`, so the server value itself can
/// be moved freely after `start`.
pub struct ModbusTcpServer {
    config: ModbusTcpServerConfig,
    store: Arc<dyn DataStore>,
    hook: Option<Arc<dyn PduHook>>,
    tls: Option<Arc<dyn TlsAcceptor>>,
    stats: Arc<Mutex<ServerStats>>,
    limiter: Arc<Semaphore>,
    is_running: Arc<AtomicBool>,
    shutdown_tx: Option<broadcast::Sender<()>>,
    accept_task: Option<JoinHandle<()>>,
    local_addr: Option<SocketAddr>,
}

impl ModbusTcpServer {
    /// Create a server bound to `bind_address` with default settings
    ///
    /// # Arguments
    /// * `bind_address` - Listen address, e.g. "0.0.0.0:502"
    /// * `store` - Data access implementation serving the requests
    pub fn new(bind_address: &str, store: Arc<dyn DataStore>) -> ModbusResult<Self> {
        let bind_address = bind_address.parse().map_err(|e| {
            ModbusError::configuration(format!("Invalid bind address '{}': {}", bind_address, e))
        })?;
        let config = ModbusTcpServerConfig {
            bind_address,
            ..Default::default()
        };
        Ok(Self::with_config(config, store))
    }

    /// Create a server from an explicit configuration
    pub fn with_config(config: ModbusTcpServerConfig, store: Arc<dyn DataStore>) -> Self {
        let limiter = Arc::new(Semaphore::new(config.max_connections));
        Self {
            config,
            store,
            hook: None,
            tls: None,
            stats: Arc::new(Mutex::new(ServerStats::default())),
            limiter,
            is_running: Arc::new(AtomicBool::new(false)),
            shutdown_tx: None,
            accept_task: None,
            local_addr: None,
        }
    }

    /// Install a hook that gets first refusal on every inbound PDU
    pub fn set_pdu_hook(&mut self, hook: Arc<dyn PduHook>) {
        self.hook = Some(hook);
    }

    /// Wrap accepted connections in TLS
    ///
    /// When set, every accepted socket goes through the acceptor's handshake
    /// before any Modbus traffic, and the client certificate (if one is
    /// presented) is scanned for the Modbus role attribute.
    pub fn set_tls_acceptor(&mut self, acceptor: Arc<dyn TlsAcceptor>) {
        self.tls = Some(acceptor);
    }

    /// Server configuration
    pub fn config(&self) -> &ModbusTcpServerConfig {
        &self.config
    }

    /// Actual listen address once started
    ///
    /// Differs from the configured address when binding to port 0.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Serve one admitted connection until it closes
    async fn serve_connection<S>(
        mut stream: S,
        peer: SocketAddr,
        role: Option<String>,
        ctx: ConnectionContext,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let idle = ctx.config.idle_timeout;

        loop {
            let mut header_buf = [0u8; MBAP_HEADER_SIZE];
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    debug!("Connection {} closing for server shutdown", peer);
                    return;
                }
                read = timeout(idle, stream.read_exact(&mut header_buf)) => match read {
                    Err(_) => {
                        info!("💤 Closing {} after {:?} idle", peer, idle);
                        ctx.stats.lock().idle_closures += 1;
                        return;
                    }
                    Ok(Err(e)) if e.kind() == ErrorKind::UnexpectedEof => {
                        info!("🔌 Client disconnected: {}", peer);
                        return;
                    }
                    Ok(Err(e)) => {
                        warn!("Read error from {}: {}", peer, e);
                        return;
                    }
                    Ok(Ok(_)) => {}
                }
            }

            // A header that fails to parse means the byte stream is
            // desynchronized and nothing after it can be trusted.
            let header = match MbapHeader::parse(&header_buf) {
                Ok(header) => header,
                Err(e) => {
                    warn!("Dropping {}: unrecoverable header: {}", peer, e);
                    return;
                }
            };

            let mut pdu = vec![0u8; header.pdu_len()];
            match timeout(idle, stream.read_exact(&mut pdu)).await {
                Err(_) => {
                    info!("💤 Closing {}: request body never arrived", peer);
                    ctx.stats.lock().idle_closures += 1;
                    return;
                }
                Ok(Err(e)) => {
                    warn!("Read error from {}: {}", peer, e);
                    return;
                }
                Ok(Ok(_)) => {}
            }
            ctx.stats.lock().bytes_received += (MBAP_HEADER_SIZE + pdu.len()) as u64;
            log_frame(Direction::Receive, peer, &pdu);

            if !unit_id_matches(ctx.config.unit_id, header.unit_id) {
                debug!(
                    "Ignoring request for unit {} (serving unit {})",
                    header.unit_id, ctx.config.unit_id
                );
                ctx.stats.lock().requests_ignored += 1;
                continue;
            }

            let response = match Self::handle_request(&pdu, &header, role.as_deref(), &ctx) {
                Ok(response) => response,
                Err(e) => {
                    error!("Could not build response for {}: {}", peer, e);
                    return;
                }
            };

            let adu = match encode_adu(header.transaction_id, header.unit_id, &response) {
                Ok(adu) => adu,
                Err(e) => {
                    error!("Could not frame response for {}: {}", peer, e);
                    return;
                }
            };
            log_frame(Direction::Send, peer, &adu);

            match timeout(idle, stream.write_all(&adu)).await {
                Err(_) => {
                    warn!("Write to {} stalled, dropping connection", peer);
                    return;
                }
                Ok(Err(e)) => {
                    warn!("Write error to {}: {}", peer, e);
                    return;
                }
                Ok(Ok(_)) => {}
            }

            let mut stats = ctx.stats.lock();
            stats.requests_processed += 1;
            stats.bytes_sent += adu.len() as u64;
            if response.is_exception() {
                stats.exceptions_sent += 1;
            }
        }
    }

    /// Build the response PDU for one request PDU
    ///
    /// The hook, if any, sees the PDU first. Otherwise the request is decoded
    /// and executed against the store under the lock/unlock bracket; any
    /// [`ModbusException`] along the way becomes an exception response.
    fn handle_request(
        pdu: &[u8],
        header: &MbapHeader,
        role: Option<&str>,
        ctx: &ConnectionContext,
    ) -> ModbusResult<ModbusPdu> {
        if let Some(hook) = ctx.hook.as_ref() {
            if let Some(response) = hook.process(header.unit_id, pdu) {
                debug!(
                    "PDU hook answered function 0x{:02X}",
                    pdu.first().copied().unwrap_or(0)
                );
                return Ok(response);
            }
        }

        let function = pdu.first().copied().unwrap_or(0);
        match codec::decode_request(header.unit_id, pdu) {
            Err(exception) => {
                debug!(
                    "Rejecting function 0x{:02X} at decode: {}",
                    function,
                    exception.description()
                );
                codec::encode_exception(function, exception)
            }
            Ok(request) => {
                let access = AccessContext {
                    unit_id: header.unit_id,
                    role,
                };
                let guard = StoreGuard::new(ctx.store.as_ref());
                match execute_request(&request, &access, guard.store()) {
                    Ok(response) => Ok(response),
                    Err(exception) => {
                        debug!(
                            "Function 0x{:02X} raised {}",
                            function,
                            exception.description()
                        );
                        codec::encode_exception(function, exception)
                    }
                }
            }
        }
    }
}

#[async_trait]
impl ModbusServer for ModbusTcpServer {
    async fn start(&mut self) -> ModbusResult<()> {
        if self.is_running.load(Ordering::SeqCst) {
            return Err(ModbusError::wrong_state("Server is already running"));
        }

        let listener = TcpListener::bind(self.config.bind_address)
            .await
            .map_err(|e| {
                ModbusError::connection(format!(
                    "Failed to bind {}: {}",
                    self.config.bind_address, e
                ))
            })?;
        let local_addr = listener.local_addr()?;
        self.local_addr = Some(local_addr);

        let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);
        self.shutdown_tx = Some(shutdown_tx.clone());
        self.is_running.store(true, Ordering::SeqCst);

        info!(
            "🚀 Modbus TCP server listening on {} (unit {}, {} connection slots)",
            local_addr, self.config.unit_id, self.config.max_connections
        );

        let base_ctx = ConnectionContext {
            config: self.config.clone(),
            store: Arc::clone(&self.store),
            hook: self.hook.clone(),
            stats: Arc::clone(&self.stats),
        };
        let tls = self.tls.clone();
        let limiter = Arc::clone(&self.limiter);
        let is_running = Arc::clone(&self.is_running);

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("⏹️  Accept loop shutting down");
                        break;
                    }
                    accepted = listener.accept() => {
                        let (stream, peer) = match accepted {
                            Ok(pair) => pair,
                            Err(e) => {
                                warn!("Accept failed: {}", e);
                                continue;
                            }
                        };

                        let permit = match Arc::clone(&limiter).try_acquire_owned() {
                            Ok(permit) => permit,
                            Err(_) => {
                                info!(
                                    "🚫 Rejecting {}: all {} connection slots busy",
                                    peer, base_ctx.config.max_connections
                                );
                                base_ctx.stats.lock().connections_rejected += 1;
                                drop(stream);
                                continue;
                            }
                        };

                        base_ctx.stats.lock().total_connections += 1;
                        info!("📡 Client connected: {}", peer);

                        let conn_ctx = base_ctx.clone();
                        let conn_tls = tls.clone();
                        let conn_shutdown = shutdown_tx.subscribe();
                        tokio::spawn(async move {
                            let _permit = permit;
                            match conn_tls {
                                Some(acceptor) => match acceptor.accept(stream).await {
                                    Ok(session) => {
                                        let TlsSession {
                                            stream,
                                            peer_certificate,
                                        } = session;
                                        // A present but malformed role extension
                                        // closes the session, it never downgrades
                                        // to an anonymous one
                                        let role = match peer_certificate.as_deref() {
                                            Some(der) => match extract_role(der) {
                                                Ok(role) => role,
                                                Err(e) => {
                                                    warn!(
                                                        "Rejecting {}: malformed role extension: {}",
                                                        peer, e
                                                    );
                                                    return;
                                                }
                                            },
                                            None => None,
                                        };
                                        if let Some(ref role) = role {
                                            info!(
                                                "🔐 TLS client {} carries role '{}'",
                                                peer, role
                                            );
                                        }
                                        Self::serve_connection(
                                            stream,
                                            peer,
                                            role,
                                            conn_ctx,
                                            conn_shutdown,
                                        )
                                        .await;
                                    }
                                    Err(e) => {
                                        warn!("TLS handshake with {} failed: {}", peer, e);
                                    }
                                },
                                None => {
                                    Self::serve_connection(
                                        stream,
                                        peer,
                                        None,
                                        conn_ctx,
                                        conn_shutdown,
                                    )
                                    .await;
                                }
                            }
                            debug!("Connection task for {} finished", peer);
                        });
                    }
                }
            }
            is_running.store(false, Ordering::SeqCst);
        });
        self.accept_task = Some(task);

        Ok(())
    }

    async fn stop(&mut self) -> ModbusResult<()> {
        if !self.is_running.load(Ordering::SeqCst) {
            return Err(ModbusError::wrong_state("Server is not running"));
        }

        info!("⏹️  Stopping Modbus TCP server");
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }
        if let Some(task) = self.accept_task.take() {
            let _ = task.await;
        }
        self.is_running.store(false, Ordering::SeqCst);
        self.local_addr = None;

        info!("📊 Final server stats: {:?}", self.get_stats());
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    fn get_stats(&self) -> ServerStats {
        self.stats.lock().clone()
    }
}

/// Read a big-endian u16 out of a request payload
fn be_u16(data: &[u8], at: usize) -> Result<u16, ModbusException> {
    match (data.get(at), data.get(at + 1)) {
        (Some(&hi), Some(&lo)) => Ok(u16::from_be_bytes([hi, lo])),
        _ => Err(ModbusException::IllegalDataValue),
    }
}

/// Offset a base address, refusing to wrap past the address space
fn checked_target(base: u16, offset: u16) -> Result<u16, ModbusException> {
    base.checked_add(offset)
        .ok_or(ModbusException::IllegalDataAddress)
}

/// Encoder failures surface to the client as a server failure
fn internal_error(_: ModbusError) -> ModbusException {
    ModbusException::ServerDeviceFailure
}

/// Execute one decoded request against the store
///
/// Reads walk the requested range one element at a time. Writes run the
/// validate pass over every element before the commit pass starts, so a
/// refused element leaves the store untouched. FC 0x17 commits its write
/// window before sampling the read window.
fn execute_request(
    request: &ModbusRequest,
    access: &AccessContext<'_>,
    store: &dyn DataStore,
) -> Result<ModbusPdu, ModbusException> {
    match request.function {
        ModbusFunction::ReadCoils => {
            let mut bits = Vec::with_capacity(request.quantity as usize);
            for offset in 0..request.quantity {
                let address = checked_target(request.address, offset)?;
                bits.push(store.read_coil(access, address)?);
            }
            codec::encode_read_bits_response(request.function, &bits).map_err(internal_error)
        }
        ModbusFunction::ReadDiscreteInputs => {
            let mut bits = Vec::with_capacity(request.quantity as usize);
            for offset in 0..request.quantity {
                let address = checked_target(request.address, offset)?;
                bits.push(store.read_discrete_input(access, address)?);
            }
            codec::encode_read_bits_response(request.function, &bits).map_err(internal_error)
        }
        ModbusFunction::ReadHoldingRegisters => {
            let mut values = Vec::with_capacity(request.quantity as usize);
            for offset in 0..request.quantity {
                let address = checked_target(request.address, offset)?;
                values.push(store.read_holding_register(access, address)?);
            }
            codec::encode_read_registers_response(request.function, &values)
                .map_err(internal_error)
        }
        ModbusFunction::ReadInputRegisters => {
            let mut values = Vec::with_capacity(request.quantity as usize);
            for offset in 0..request.quantity {
                let address = checked_target(request.address, offset)?;
                values.push(store.read_input_register(access, address)?);
            }
            codec::encode_read_registers_response(request.function, &values)
                .map_err(internal_error)
        }
        ModbusFunction::WriteSingleCoil => {
            let value = be_u16(&request.data, 0)? == 0xFF00;
            store.write_coil(access, request.address, value, false)?;
            store.write_coil(access, request.address, value, true)?;
            codec::encode_echo_response(request).map_err(internal_error)
        }
        ModbusFunction::WriteSingleRegister => {
            let value = be_u16(&request.data, 0)?;
            store.write_register(access, request.address, value, false)?;
            store.write_register(access, request.address, value, true)?;
            codec::encode_echo_response(request).map_err(internal_error)
        }
        ModbusFunction::WriteMultipleCoils => {
            let bits = unpack_bits(&request.data, request.quantity as usize);
            for commit in [false, true] {
                for (offset, &bit) in bits.iter().enumerate() {
                    let address = checked_target(request.address, offset as u16)?;
                    store.write_coil(access, address, bit, commit)?;
                }
            }
            codec::encode_echo_response(request).map_err(internal_error)
        }
        ModbusFunction::WriteMultipleRegisters => {
            let values = bytes_to_registers(&request.data)
                .map_err(|_| ModbusException::IllegalDataValue)?;
            for commit in [false, true] {
                for (offset, &value) in values.iter().enumerate() {
                    let address = checked_target(request.address, offset as u16)?;
                    store.write_register(access, address, value, commit)?;
                }
            }
            codec::encode_echo_response(request).map_err(internal_error)
        }
        ModbusFunction::MaskWriteRegister => {
            let and_mask = be_u16(&request.data, 0)?;
            let or_mask = be_u16(&request.data, 2)?;
            let current = store.read_holding_register(access, request.address)?;
            let value = (current & and_mask) | (or_mask & !and_mask);
            store.write_register(access, request.address, value, false)?;
            store.write_register(access, request.address, value, true)?;
            codec::encode_echo_response(request).map_err(internal_error)
        }
        ModbusFunction::ReadWriteMultipleRegisters => {
            let write_address = be_u16(&request.data, 0)?;
            let values = bytes_to_registers(request.data.get(4..).unwrap_or_default())
                .map_err(|_| ModbusException::IllegalDataValue)?;
            // The write settles before the read window is sampled, so a read
            // overlapping the write window sees the new values.
            for commit in [false, true] {
                for (offset, &value) in values.iter().enumerate() {
                    let address = checked_target(write_address, offset as u16)?;
                    store.write_register(access, address, value, commit)?;
                }
            }
            let mut read_back = Vec::with_capacity(request.quantity as usize);
            for offset in 0..request.quantity {
                let address = checked_target(request.address, offset)?;
                read_back.push(store.read_holding_register(access, address)?);
            }
            codec::encode_read_registers_response(request.function, &read_back)
                .map_err(internal_error)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ModbusClient, ModbusTcpClient};
    use crate::register_bank::ModbusRegisterBank;
    use crate::security::MODBUS_ROLE_OID;
    use bytes::Bytes;
    use tokio::net::TcpStream;

    /// Start a server with the given config on an ephemeral port
    async fn spawn_server(
        mut config: ModbusTcpServerConfig,
        store: Arc<dyn DataStore>,
    ) -> (ModbusTcpServer, SocketAddr) {
        config.bind_address = "127.0.0.1:0".parse().unwrap();
        let mut server = ModbusTcpServer::with_config(config, store);
        server.start().await.unwrap();
        let addr = server.local_addr().unwrap();
        (server, addr)
    }

    fn test_config(unit_id: SlaveId) -> ModbusTcpServerConfig {
        ModbusTcpServerConfig {
            unit_id,
            ..Default::default()
        }
    }

    fn raw_frame(transaction_id: u16, unit_id: u8, pdu: &[u8]) -> Vec<u8> {
        let mut frame = Vec::with_capacity(MBAP_HEADER_SIZE + pdu.len());
        frame.extend_from_slice(&transaction_id.to_be_bytes());
        frame.extend_from_slice(&0u16.to_be_bytes());
        frame.extend_from_slice(&((pdu.len() + 1) as u16).to_be_bytes());
        frame.push(unit_id);
        frame.extend_from_slice(pdu);
        frame
    }

    async fn connect_client(addr: SocketAddr) -> ModbusTcpClient {
        ModbusTcpClient::new(addr, Duration::from_secs(2))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_read_write_round_trip() {
        let bank = Arc::new(ModbusRegisterBank::new());
        let (mut server, addr) = spawn_server(test_config(1), bank.clone()).await;
        let mut client = connect_client(addr).await;

        client.write_06(1, 10, 0xBEEF).await.unwrap();
        let registers = client.read_03(1, 10, 1).await.unwrap();
        assert_eq!(registers, vec![0xBEEF]);

        client.write_05(1, 3, true).await.unwrap();
        let coils = client.read_01(1, 3, 1).await.unwrap();
        assert_eq!(coils, vec![true]);

        client.close().await.unwrap();
        server.stop().await.unwrap();

        let stats = server.get_stats();
        assert_eq!(stats.total_connections, 1);
        assert_eq!(stats.requests_processed, 4);
        assert_eq!(stats.exceptions_sent, 0);
    }

    #[tokio::test]
    async fn test_input_spaces_round_trip() {
        let bank = Arc::new(ModbusRegisterBank::new());
        bank.set_input_register(3, 77).unwrap();
        bank.set_discrete_input(0, true).unwrap();
        let (mut server, addr) = spawn_server(test_config(1), bank).await;
        let mut client = connect_client(addr).await;

        assert_eq!(client.read_04(1, 3, 1).await.unwrap(), vec![77]);
        assert_eq!(client.read_02(1, 0, 2).await.unwrap(), vec![true, false]);

        client.close().await.unwrap();
        server.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_admission_control_closes_excess_connection() {
        let bank = Arc::new(ModbusRegisterBank::new());
        let mut config = test_config(1);
        config.max_connections = 1;
        let (mut server, addr) = spawn_server(config, bank).await;

        // Occupy the only slot and prove it is live.
        let mut first = connect_client(addr).await;
        first.read_03(1, 0, 1).await.unwrap();

        // The second connection must be closed without a byte of Modbus.
        let mut second = TcpStream::connect(addr).await.unwrap();
        let mut buf = [0u8; 16];
        let read = second.read(&mut buf).await;
        assert_eq!(read.unwrap_or(0), 0);

        let stats = server.get_stats();
        assert_eq!(stats.connections_rejected, 1);
        assert_eq!(stats.total_connections, 1);

        first.close().await.unwrap();
        server.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_unit_mismatch_silently_ignored() {
        let bank = Arc::new(ModbusRegisterBank::new());
        let (mut server, addr) = spawn_server(test_config(5), bank).await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        let read_pdu = [0x03, 0x00, 0x00, 0x00, 0x01];

        // Unit 9 does not address this server: no response at all.
        stream
            .write_all(&raw_frame(1, 9, &read_pdu))
            .await
            .unwrap();
        // Unit 5 does: the first frame on the wire answers this one.
        stream
            .write_all(&raw_frame(2, 5, &read_pdu))
            .await
            .unwrap();

        let mut response = [0u8; 11];
        stream.read_exact(&mut response).await.unwrap();
        assert_eq!(u16::from_be_bytes([response[0], response[1]]), 2);
        assert_eq!(response[6], 5);
        assert_eq!(response[7], 0x03);

        let stats = server.get_stats();
        assert_eq!(stats.requests_ignored, 1);
        assert_eq!(stats.requests_processed, 1);

        server.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_wildcard_unit_answers_any_request() {
        let bank = Arc::new(ModbusRegisterBank::new());
        let (mut server, addr) = spawn_server(test_config(255), bank).await;
        let mut client = connect_client(addr).await;

        // Unit 7 is accepted by the 255 wildcard and echoed back.
        assert_eq!(client.read_03(7, 0, 1).await.unwrap(), vec![0]);

        client.close().await.unwrap();
        server.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_multi_write_commits_nothing() {
        // Five holding registers: a write straddling the end must validate
        // all elements first and therefore change none of them.
        let bank = Arc::new(ModbusRegisterBank::with_capacity(0, 0, 5, 0));
        let (mut server, addr) = spawn_server(test_config(1), bank.clone()).await;
        let mut client = connect_client(addr).await;

        let result = client.write_10(1, 3, &[0x1111, 0x2222, 0x3333]).await;
        match result {
            Err(ModbusError::Exception { code, .. }) => assert_eq!(code, 0x02),
            other => panic!("Expected IllegalDataAddress exception, got {:?}", other),
        }

        assert_eq!(client.read_03(1, 3, 2).await.unwrap(), vec![0, 0]);

        client.close().await.unwrap();
        server.stop().await.unwrap();
        assert_eq!(server.get_stats().exceptions_sent, 1);
    }

    #[tokio::test]
    async fn test_illegal_function_gets_exception() {
        let bank = Arc::new(ModbusRegisterBank::new());
        let (mut server, addr) = spawn_server(test_config(1), bank).await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(&raw_frame(7, 1, &[0x2B, 0x0E, 0x01, 0x00]))
            .await
            .unwrap();

        let mut response = [0u8; 9];
        stream.read_exact(&mut response).await.unwrap();
        assert_eq!(&response[7..], &[0xAB, 0x01]);

        server.stop().await.unwrap();
        assert_eq!(server.get_stats().exceptions_sent, 1);
    }

    #[tokio::test]
    async fn test_mask_write_applies_formula() {
        let bank = Arc::new(ModbusRegisterBank::new());
        bank.set_holding_register(4, 0x0012).unwrap();
        let (mut server, addr) = spawn_server(test_config(1), bank.clone()).await;
        let mut client = connect_client(addr).await;

        client.write_16(1, 4, 0x00F2, 0x0025).await.unwrap();
        assert_eq!(bank.holding_register(4), Some(0x0017));

        client.close().await.unwrap();
        server.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_read_write_17_writes_before_reading() {
        let bank = Arc::new(ModbusRegisterBank::new());
        let (mut server, addr) = spawn_server(test_config(1), bank).await;
        let mut client = connect_client(addr).await;

        // Read window overlaps the write window: the response must already
        // show the written value.
        let values = client.read_write_17(1, 0, 1, 0, &[0xABCD]).await.unwrap();
        assert_eq!(values, vec![0xABCD]);

        client.close().await.unwrap();
        server.stop().await.unwrap();
    }

    struct VendorHook;

    impl PduHook for VendorHook {
        fn process(&self, _unit_id: SlaveId, pdu: &[u8]) -> Option<ModbusPdu> {
            if pdu.first() == Some(&0x41) {
                ModbusPdu::from_slice(&[0x41, 0xAA, 0x55]).ok()
            } else {
                None
            }
        }
    }

    #[tokio::test]
    async fn test_pdu_hook_gets_first_refusal() {
        let bank = Arc::new(ModbusRegisterBank::new());
        let mut config = test_config(1);
        config.bind_address = "127.0.0.1:0".parse().unwrap();
        let mut server = ModbusTcpServer::with_config(config, bank);
        server.set_pdu_hook(Arc::new(VendorHook));
        server.start().await.unwrap();
        let addr = server.local_addr().unwrap();

        let mut stream = TcpStream::connect(addr).await.unwrap();

        // Vendor function answered by the hook.
        stream
            .write_all(&raw_frame(1, 1, &[0x41, 0x01]))
            .await
            .unwrap();
        let mut response = [0u8; 10];
        stream.read_exact(&mut response).await.unwrap();
        assert_eq!(&response[7..], &[0x41, 0xAA, 0x55]);

        // Standard function still reaches the built-in dispatch.
        stream
            .write_all(&raw_frame(2, 1, &[0x03, 0x00, 0x00, 0x00, 0x01]))
            .await
            .unwrap();
        let mut response = [0u8; 11];
        stream.read_exact(&mut response).await.unwrap();
        assert_eq!(response[7], 0x03);

        server.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_idle_connection_force_closed() {
        let bank = Arc::new(ModbusRegisterBank::new());
        let mut config = test_config(1);
        config.idle_timeout = Duration::from_millis(200);
        let (mut server, addr) = spawn_server(config, bank).await;

        let mut busy = connect_client(addr).await;
        busy.read_03(1, 0, 1).await.unwrap();
        let mut stream = TcpStream::connect(addr).await.unwrap();

        // Keep one session active while the other sits silent.
        tokio::time::sleep(Duration::from_millis(120)).await;
        busy.read_03(1, 0, 1).await.unwrap();

        let mut buf = [0u8; 8];
        // The silent session is closed from the other side.
        let read = stream.read(&mut buf).await;
        assert_eq!(read.unwrap_or(0), 0);
        assert_eq!(server.get_stats().idle_closures, 1);

        // The busy session outlived its idle neighbour.
        busy.read_03(1, 0, 1).await.unwrap();

        busy.close().await.unwrap();
        server.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_refuses_new_connections() {
        let bank = Arc::new(ModbusRegisterBank::new());
        let (mut server, addr) = spawn_server(test_config(1), bank).await;
        assert!(server.is_running());

        server.stop().await.unwrap();
        assert!(!server.is_running());
        assert!(TcpStream::connect(addr).await.is_err());
    }

    /// Store that records the role seen on each register read
    struct RoleProbe {
        seen: Mutex<Option<String>>,
    }

    impl DataStore for RoleProbe {
        fn read_holding_register(
            &self,
            access: &AccessContext<'_>,
            _address: u16,
        ) -> Result<u16, ModbusException> {
            *self.seen.lock() = access.role.map(str::to_owned);
            Ok(0x0042)
        }
    }

    /// Acceptor that performs no handshake and attaches a fixed certificate
    struct StaticCertAcceptor {
        cert: Vec<u8>,
    }

    #[async_trait]
    impl TlsAcceptor for StaticCertAcceptor {
        async fn accept(&self, stream: TcpStream) -> ModbusResult<TlsSession> {
            Ok(TlsSession {
                stream: Box::new(stream),
                peer_certificate: Some(Bytes::copy_from_slice(&self.cert)),
            })
        }
    }

    fn cert_with_role(role: &str) -> Vec<u8> {
        let mut der = vec![0x06, MODBUS_ROLE_OID.len() as u8];
        der.extend_from_slice(MODBUS_ROLE_OID);
        der.push(0x04);
        der.push(role.len() as u8 + 2);
        der.push(0x0C);
        der.push(role.len() as u8);
        der.extend_from_slice(role.as_bytes());
        der
    }

    #[tokio::test]
    async fn test_tls_role_reaches_the_store() {
        let probe = Arc::new(RoleProbe {
            seen: Mutex::new(None),
        });
        let mut config = test_config(1);
        config.bind_address = "127.0.0.1:0".parse().unwrap();
        let mut server = ModbusTcpServer::with_config(config, probe.clone());
        server.set_tls_acceptor(Arc::new(StaticCertAcceptor {
            cert: cert_with_role("operator"),
        }));
        server.start().await.unwrap();
        let addr = server.local_addr().unwrap();

        let mut client = connect_client(addr).await;
        assert_eq!(client.read_03(1, 0, 1).await.unwrap(), vec![0x0042]);
        assert_eq!(probe.seen.lock().as_deref(), Some("operator"));

        client.close().await.unwrap();
        server.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_malformed_role_extension_closes_session() {
        let probe = Arc::new(RoleProbe {
            seen: Mutex::new(None),
        });
        let mut config = test_config(1);
        config.bind_address = "127.0.0.1:0".parse().unwrap();
        config.max_connections = 1;
        let mut server = ModbusTcpServer::with_config(config, probe.clone());

        // Role OID present, but the value is a bare UTF8String with no
        // OCTET STRING wrapper.
        let mut cert = vec![0x06, MODBUS_ROLE_OID.len() as u8];
        cert.extend_from_slice(MODBUS_ROLE_OID);
        cert.extend_from_slice(&[0x0C, 0x04]);
        cert.extend_from_slice(b"oper");
        server.set_tls_acceptor(Arc::new(StaticCertAcceptor { cert }));
        server.start().await.unwrap();
        let addr = server.local_addr().unwrap();

        let mut stream = TcpStream::connect(addr).await.unwrap();
        let mut buf = [0u8; 8];
        let read = stream.read(&mut buf).await;
        assert_eq!(read.unwrap_or(0), 0);

        // The rejected session freed its slot: the next client is admitted
        // (and rejected for the same certificate), not turned away at accept.
        let mut second = TcpStream::connect(addr).await.unwrap();
        let read = second.read(&mut buf).await;
        assert_eq!(read.unwrap_or(0), 0);

        let stats = server.get_stats();
        assert_eq!(stats.total_connections, 2);
        assert_eq!(stats.connections_rejected, 0);
        assert!(probe.seen.lock().is_none());

        server.stop().await.unwrap();
    }

    /// Store that refuses one address during validation and records commits
    struct TripwireStore {
        refuse: u16,
        validated: Mutex<Vec<u16>>,
        committed: Mutex<Vec<u16>>,
    }

    impl DataStore for TripwireStore {
        fn write_register(
            &self,
            _access: &AccessContext<'_>,
            address: u16,
            _value: u16,
            commit: bool,
        ) -> Result<(), ModbusException> {
            if commit {
                self.committed.lock().push(address);
                return Ok(());
            }
            if address == self.refuse {
                return Err(ModbusException::IllegalDataAddress);
            }
            self.validated.lock().push(address);
            Ok(())
        }
    }

    #[test]
    fn test_two_phase_validates_every_element_before_committing() {
        let store = TripwireStore {
            refuse: 12,
            validated: Mutex::new(Vec::new()),
            committed: Mutex::new(Vec::new()),
        };
        let request = ModbusRequest::new_write(
            1,
            ModbusFunction::WriteMultipleRegisters,
            10,
            3,
            vec![0x00, 0x01, 0x00, 0x02, 0x00, 0x03],
        );
        let access = AccessContext {
            unit_id: 1,
            role: None,
        };

        let result = execute_request(&request, &access, &store);
        assert_eq!(result.unwrap_err(), ModbusException::IllegalDataAddress);
        assert_eq!(*store.validated.lock(), vec![10, 11]);
        assert!(store.committed.lock().is_empty());
    }

    #[test]
    fn test_unsupported_table_raises_illegal_function() {
        // RoleProbe only serves holding registers.
        let store = RoleProbe {
            seen: Mutex::new(None),
        };
        let request = ModbusRequest::new_read(1, ModbusFunction::ReadCoils, 0, 4);
        let access = AccessContext {
            unit_id: 1,
            role: None,
        };

        let result = execute_request(&request, &access, &store);
        assert_eq!(result.unwrap_err(), ModbusException::IllegalFunction);
    }
}
