//! Example: Writing devices and controlling a MELSEC PLC
//!
//! Run with: cargo run --example simple_write -- 192.168.3.39
//!
//! WARNING: this writes to D1000.., M1000.. and toggles the CPU between STOP
//! and RUN. Only point it at a PLC on a test bench.

use melsec_slmp::{BlockData, Client, ClientConfig, ClearMode, SessionEvent, SlmpError};
use std::net::IpAddr;

#[tokio::main]
async fn main() -> melsec_slmp::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let ip: IpAddr = std::env::args()
        .nth(1)
        .and_then(|a| a.parse().ok())
        .unwrap_or_else(|| [192, 168, 3, 39].into());
    let client = Client::connect(ClientConfig::new(ip)).await?;

    // Print lifecycle events while the example runs
    let mut events = client.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if let SessionEvent::Error(e) = &event {
                eprintln!("session error: {e}");
            } else {
                eprintln!("session event: {event:?}");
            }
        }
    });

    // =========================================================================
    // Batch and Random Writes
    // =========================================================================

    println!("=== Writes ===\n");

    client.batch_write_words("D1000".parse()?, &[1, 2, 3, 4]).await?;
    client.batch_write_bits("M1000".parse()?, &[true, false, true, true]).await?;
    println!("Wrote D1000-D1003 and M1000-M1003");

    client
        .random_write(&[("D1010".parse()?, 0xBEEF)], &[("D1020".parse()?, 0x0001_0000)])
        .await?;
    client
        .random_write_bits(&[("Y20".parse()?, true), ("M1010".parse()?, false)])
        .await?;
    println!("Wrote D1010, D1020-D1021, Y20 and M1010");

    client
        .block_write(
            &[BlockData::new("D1100".parse()?, vec![10, 20, 30])],
            &[BlockData::new("M1100".parse()?, vec![0x00FF])],
        )
        .await?;
    println!("Wrote block D1100-D1102 and M1100-M1115");

    client.write_f32("D1200".parse()?, 21.5).await?;
    client.write_i32("D1202".parse()?, -123_456).await?;

    // Ceilings are checked before anything is sent
    match client.batch_write_words("D0".parse()?, &vec![0; 950]).await {
        Err(SlmpError::SizeExceeded { count, limit, .. }) => {
            println!("Rejected locally: {count} words > {limit}");
        }
        other => println!("Unexpected: {other:?}"),
    }

    // =========================================================================
    // Remote Control
    // =========================================================================

    println!("\n=== Remote Control ===\n");

    client.remote_stop(false).await?;
    println!("CPU stopped");
    client.remote_run(false, ClearMode::None).await?;
    println!("CPU running");

    client.close().await;
    println!("\nWrite example completed!");
    Ok(())
}
