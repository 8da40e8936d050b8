//! mbtcp Demo
//!
//! Spins up an in-process Modbus TCP server backed by a register bank, then
//! drives it with the client API:
//! - Read operations (coils, discrete inputs, holding/input registers)
//! - Write operations (single, multiple, mask write, combined read/write)
//! - Exception handling and statistics on both sides
//!
//! Usage: cargo run --bin demo [bind_address]
//! Example: cargo run --bin demo 127.0.0.1:1502

use std::sync::Arc;
use std::time::Duration;

use mbtcp::client::utils::{f32_to_registers_be, registers_to_f32_be};
use mbtcp::{
    ModbusClient, ModbusRegisterBank, ModbusServer, ModbusTcpClient, ModbusTcpServer,
    ModbusTcpServerConfig,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("🚀 mbtcp v{} Demo", mbtcp::VERSION);
    println!("====================");
    println!("Client and server round trip in one process\n");

    // =========================================================================
    // Part 1: Server startup
    // =========================================================================
    println!("📡 Part 1: Server Startup");
    println!("-------------------------");

    let bind_address = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:0".to_string());

    let bank = Arc::new(ModbusRegisterBank::new());
    // Pre-seed some process values: a float split over two holding registers,
    // a pair of input registers, and an alternating input bit pattern.
    let seeded = f32_to_registers_be(&[50.0]);
    bank.set_holding_register(0, seeded[0])?;
    bank.set_holding_register(1, seeded[1])?;
    bank.set_input_register(0, 230)?;
    bank.set_input_register(1, 231)?;
    for address in 0..4u16 {
        bank.set_discrete_input(address, address % 2 == 0)?;
    }

    let config = ModbusTcpServerConfig {
        bind_address: bind_address.parse()?,
        unit_id: 1,
        ..Default::default()
    };
    let mut server = ModbusTcpServer::with_config(config, bank.clone());
    server.start().await?;
    let address = server.local_addr().ok_or("server reported no address")?;
    println!("  ✅ Serving unit 1 on {}", address);

    // =========================================================================
    // Part 2: Read operations
    // =========================================================================
    println!("\n📖 Part 2: Read Operations");
    println!("--------------------------");

    let slave_id = 1;
    let timeout = Duration::from_secs(5);
    let mut client = ModbusTcpClient::new(address, timeout).await?;
    println!("  ✅ Connected to {}", client.server_address());

    let registers = client.read_03(slave_id, 0, 2).await?;
    println!("  FC03 Holding registers 0-1: {:04X?}", registers);
    let floats = registers_to_f32_be(&registers);
    println!("    -> decoded as F32: {:?}", floats);

    let inputs = client.read_04(slave_id, 0, 2).await?;
    println!("  FC04 Input registers 0-1: {:?}", inputs);

    let bits = client.read_02(slave_id, 0, 4).await?;
    let states: Vec<&str> = bits.iter().map(|&b| if b { "ON" } else { "OFF" }).collect();
    println!("  FC02 Discrete inputs 0-3: {:?}", states);

    // =========================================================================
    // Part 3: Write operations
    // =========================================================================
    println!("\n✏️  Part 3: Write Operations");
    println!("---------------------------");

    client.write_06(slave_id, 100, 0x1234).await?;
    println!("  FC06 Wrote register 100 = 0x1234");

    client.write_05(slave_id, 10, true).await?;
    println!("  FC05 Switched coil 10 ON");

    let temperature = f32_to_registers_be(&[98.6]);
    client.write_10(slave_id, 200, &temperature).await?;
    println!("  FC16 Wrote F32 98.6 to registers 200-201");

    client
        .write_0f(slave_id, 20, &[true, false, true, true])
        .await?;
    println!("  FC15 Wrote coil pattern at 20-23");

    let coils = client.read_01(slave_id, 20, 4).await?;
    println!("  FC01 Read back coils 20-23: {:?}", coils);

    // =========================================================================
    // Part 4: Mask write and combined read/write
    // =========================================================================
    println!("\n🎛️  Part 4: Mask Write and Combined Read/Write");
    println!("----------------------------------------------");

    // Keep the low nibble of register 100, force bit 13 on.
    client.write_16(slave_id, 100, 0x000F, 0x2000).await?;
    let masked = client.read_03(slave_id, 100, 1).await?;
    println!("  FC22 Register 100 after mask write: {:04X?}", masked);

    let exchanged = client.read_write_17(slave_id, 200, 2, 200, &[1, 2]).await?;
    println!("  FC23 Wrote registers 200-201 and read back: {:?}", exchanged);

    // =========================================================================
    // Part 5: Exceptions, statistics, shutdown
    // =========================================================================
    println!("\n📊 Part 5: Exceptions and Statistics");
    println!("------------------------------------");

    // The bank is finite: reading past its end raises IllegalDataAddress.
    match client.read_03(slave_id, 0xFFF0, 16).await {
        Ok(_) => println!("  Unexpected success reading past the bank"),
        Err(e) => println!(
            "  Expected exception: {} (code {:?})",
            e,
            client.get_exception_code()
        ),
    }

    let stats = client.get_stats();
    println!("\n  Client statistics:");
    println!(
        "    Requests: {}, responses: {}",
        stats.requests_sent, stats.responses_received
    );
    println!(
        "    Bytes sent: {}, received: {}",
        stats.bytes_sent, stats.bytes_received
    );

    client.close().await?;

    let server_stats = server.get_stats();
    println!("  Server statistics:");
    println!(
        "    Connections: {}, requests: {}, exceptions: {}",
        server_stats.total_connections,
        server_stats.requests_processed,
        server_stats.exceptions_sent
    );

    server.stop().await?;

    println!("\n🎉 Demo completed!");
    println!("📚 Documentation: https://docs.rs/mbtcp");

    Ok(())
}
