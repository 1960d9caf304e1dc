//! Example: Grouped reads and writes with a command plan
//!
//! Run with: cargo run --example grouped_read -- 192.168.3.39
//!
//! Declares a handful of typed variables, shows how the optimizer groups
//! them into SLMP calls, then polls the read topic once a second.

use std::collections::HashMap;
use std::net::IpAddr;
use std::time::Duration;

use melsec_slmp::{
    plan_topics, Client, ClientConfig, Direction, ElementType, Topic, Value, Variable, VariableTable,
};

#[tokio::main]
async fn main() -> melsec_slmp::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let table: VariableTable = [
        Variable::scalar("line.speed", "D100".parse()?, ElementType::Int)?,
        Variable::scalar("line.count", "D101".parse()?, ElementType::DInt)?,
        Variable::new("line.temps", "D110".parse()?, ElementType::Real, vec![(1, 4)])?,
        Variable::new("line.lamps", "Y40".parse()?, ElementType::Bool, vec![(0, 15)])?,
        Variable::scalar("line.alarm", "M500".parse()?, ElementType::Bool)?,
        Variable::scalar("line.setpoint", "D2000".parse()?, ElementType::Real)?,
        Variable::scalar("line.recipe", "D2002".parse()?, ElementType::Word)?,
    ]
    .into_iter()
    .collect();

    let status = Topic::resolve(
        "status",
        Direction::Read,
        &["line.speed", "line.count", "line.temps", "line.lamps", "line.alarm"],
        &table,
    )?
    .with_rate(Duration::from_secs(1));
    let control = Topic::resolve("control", Direction::Write, &["line.setpoint", "line.recipe"], &table)?;

    let plans = plan_topics(&[status, control])?;

    println!("=== Read plan ===");
    for command in plans.read.commands() {
        println!("  {command:?}");
    }
    println!("=== Write plan ===");
    for command in plans.write.commands() {
        println!("  {command:?}");
    }

    let ip: IpAddr = std::env::args()
        .nth(1)
        .and_then(|a| a.parse().ok())
        .unwrap_or_else(|| [192, 168, 3, 39].into());
    let client = Client::connect(ClientConfig::new(ip)).await?;

    let mut values = HashMap::new();
    values.insert("line.setpoint".to_string(), vec![Value::Real(72.5)]);
    values.insert("line.recipe".to_string(), vec![Value::Word(3)]);
    plans.write.write(&client, &values).await?;

    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    for _ in 0..5 {
        ticker.tick().await;
        let snapshot = plans.read.read(&client).await?;
        let mut names: Vec<_> = snapshot.keys().collect();
        names.sort();
        for name in names {
            println!("{name:>12} = {:?}", snapshot[name]);
        }
        println!();
    }

    client.close().await;
    Ok(())
}
