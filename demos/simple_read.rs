//! Example: Reading devices from a MELSEC PLC
//!
//! Run with: cargo run --example simple_read -- 192.168.3.39
//!
//! This example demonstrates:
//! - Connecting and identifying the CPU
//! - Batch reads of word and bit devices
//! - Random reads of scattered words and double words
//! - Block reads and typed helpers

use melsec_slmp::utils::format_hex;
use melsec_slmp::{BlockSpec, Client, ClientConfig, DeviceAddress};
use std::net::IpAddr;

#[tokio::main]
async fn main() -> melsec_slmp::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // =========================================================================
    // Connect to PLC
    // =========================================================================

    let ip: IpAddr = std::env::args()
        .nth(1)
        .and_then(|a| a.parse().ok())
        .unwrap_or_else(|| [192, 168, 3, 39].into());
    let client = Client::connect(ClientConfig::new(ip)).await?;

    if let Some(cpu) = client.cpu_type() {
        println!("CPU: {} (0x{:04X}), {:?} addressing\n", cpu.name, cpu.code, cpu.codec());
    }

    // =========================================================================
    // Batch Reads
    // =========================================================================

    println!("=== Batch Reads ===\n");

    let d100: DeviceAddress = "D100".parse()?;
    let words = client.batch_read_words(d100, 5).await?;
    println!("D100-D104: {:?}", words);

    let bits = client.batch_read_bits("M0".parse()?, 16).await?;
    let on: Vec<usize> = bits.iter().enumerate().filter(|(_, b)| **b).map(|(i, _)| i).collect();
    println!("M0-M15 ON: {:?}", on);

    // X and Y are addressed in hex
    let inputs = client.batch_read_bits("X10".parse()?, 8).await?;
    println!("X10-X17: {:?}", inputs);

    // =========================================================================
    // Random Read (Single Request)
    // =========================================================================

    println!("\n=== Random Read ===\n");

    let result = client
        .random_read(&["D0".parse()?, "SD210".parse()?], &["D200".parse()?])
        .await?;
    println!("D0 = {}, SD210 = {}", result.words[0], result.words[1]);
    println!("D200-D201 as u32 = {}", result.dwords[0]);

    // =========================================================================
    // Block Read
    // =========================================================================

    println!("\n=== Block Read ===\n");

    let result = client
        .block_read(
            &[BlockSpec::new("D300".parse()?, 4), BlockSpec::new("W0".parse()?, 2)],
            &[BlockSpec::new("M100".parse()?, 1)],
        )
        .await?;
    println!("D300-D303: {:?}", result.words[0]);
    println!("W0-W1:     {:?}", result.words[1]);
    println!("M100-M115: 0x{:04X}", result.bits[0][0]);

    // =========================================================================
    // Typed Helpers
    // =========================================================================

    println!("\n=== Type Conversions ===\n");

    let temperature = client.read_f32("D400".parse()?).await?;
    println!("Temperature (REAL at D400): {:.2}", temperature);

    let counter = client.read_i32("D402".parse()?).await?;
    println!("Counter (DINT at D402): {}", counter);

    let echo = client.test_echo(b"0123ABCD").await?;
    println!("Loopback echo: {}", format_hex(&echo));

    client.close().await;
    println!("\nRead example completed!");
    Ok(())
}
