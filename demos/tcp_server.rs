//! Basic TCP Server Example
//!
//! Serves a pre-seeded in-memory register bank on 127.0.0.1:1502 until
//! Ctrl-C. Pair it with the `tcp_client` example or any Modbus master.
//!
//! # Running this example
//!
//! ```bash
//! RUST_LOG=info cargo run --example tcp_server
//! ```

use std::sync::Arc;
use std::time::Duration;

use mbtcp::{
    ModbusRegisterBank, ModbusResult, ModbusServer, ModbusTcpServer, ModbusTcpServerConfig,
};

#[tokio::main]
async fn main() -> ModbusResult<()> {
    tracing_subscriber::fmt::init();

    let address = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:1502".to_string());

    // Seed the bank with something worth reading
    let bank = Arc::new(ModbusRegisterBank::new());
    for register in 0..10u16 {
        bank.set_holding_register(register, register * 100)?;
        bank.set_input_register(register, 0x1000 + register)?;
    }
    for coil in 0..8u16 {
        bank.set_coil(coil, coil % 2 == 0)?;
        bank.set_discrete_input(coil, coil % 3 == 0)?;
    }

    let config = ModbusTcpServerConfig {
        bind_address: address.parse().map_err(|e| {
            mbtcp::ModbusError::configuration(format!("Invalid address '{}': {}", address, e))
        })?,
        unit_id: 1,
        max_connections: 4,
        idle_timeout: Duration::from_secs(120),
    };

    let mut server = ModbusTcpServer::with_config(config, bank);
    server.start().await?;
    println!("Serving Modbus TCP on {} - Ctrl-C to stop", address);

    tokio::signal::ctrl_c().await.ok();

    server.stop().await?;
    let stats = server.get_stats();
    println!(
        "Served {} connections, {} requests ({} exceptions)",
        stats.total_connections, stats.requests_processed, stats.exceptions_sent
    );

    Ok(())
}
