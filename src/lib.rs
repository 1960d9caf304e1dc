//! # MELSEC SLMP Client Library
//!
//! A Rust library for talking to Mitsubishi MELSEC PLCs (iQ-R, iQ-F, Q and L
//! series) over SLMP (Seamless Message Protocol), 3E binary frames on TCP or
//! UDP.
//!
//! The library has three layers:
//!
//! - **Codec**: device addresses, frame headers and response parsing as plain
//!   functions over bytes, no I/O.
//! - **Session**: an async connection with strict request/response ordering,
//!   a request queue and bounded automatic reconnection.
//! - **Client and optimizer**: one method per SLMP command, plus
//!   [`CommandPlan`] which groups arbitrary variable sets into few calls.
//!
//! ## Features
//!
//! - **Both address codecs**: the 4-byte standard layout (Q/L series) and the
//!   6-byte extended layout (iQ-R), chosen from the CPU model at handshake
//! - **One request on the wire**: SLMP has no correlation id; responses are
//!   matched by order, never by guessing
//! - **Typed errors**: every failure is a [`SlmpError`] variant; nothing in
//!   public code panics
//! - **Ceilings checked locally**: oversized requests fail before any I/O
//! - **Optional serde**: enable the `serde` feature to (de)serialize
//!   configuration, addresses and variables
//!
//! ## Quick Start
//!
//! ```no_run
//! use melsec_slmp::{Client, ClientConfig, DeviceAddress};
//! use std::net::Ipv4Addr;
//!
//! #[tokio::main]
//! async fn main() -> melsec_slmp::Result<()> {
//!     let config = ClientConfig::new(Ipv4Addr::new(192, 168, 3, 39));
//!     let client = Client::connect(config).await?;
//!     println!("connected to {}", client.cpu_type().map(|c| c.name.as_str()).unwrap_or("?"));
//!
//!     // D100..D109
//!     let head: DeviceAddress = "D100".parse()?;
//!     let words = client.batch_read_words(head, 10).await?;
//!     println!("D100-D109: {:?}", words);
//!
//!     client.batch_write_words("D200".parse()?, &[0x1234, 0x5678]).await?;
//!     client.batch_write_bits("M0".parse()?, &[true, false, true]).await?;
//!
//!     client.close().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Devices
//!
//! Addresses are written the way GX Works shows them. `X`, `Y`, `B`, `W`,
//! `SB`, `SW`, `DX`, `DY` and `ZR` take hexadecimal indices, every other
//! device decimal.
//!
//! | Class | Devices | Unit |
//! |-------|---------|------|
//! | Bit | `X` `Y` `M` `L` `F` `V` `B` `SM` `TS` `TC` `STS` `STC` `CS` `CC` `SB` `DX` `DY` ... | 1 bit |
//! | Word | `D` `W` `SD` `SW` `R` `ZR` `RD` `Z` `TN` `STN` `CN` | 16 bits |
//! | Double word | `LZ` `LTN` `LSTN` `LCN` | 32 bits |
//!
//! ```
//! use melsec_slmp::{Device, DeviceAddress};
//!
//! let a: DeviceAddress = "X1F".parse()?;
//! assert_eq!(a, DeviceAddress::new(Device::X, 0x1F));
//! assert_eq!(a.to_string(), "X1F");
//! # Ok::<(), melsec_slmp::SlmpError>(())
//! ```
//!
//! ## Grouped Transfers
//!
//! ```no_run
//! # async fn demo(client: &melsec_slmp::Client) -> melsec_slmp::Result<()> {
//! use melsec_slmp::{CommandPlan, Direction, ElementType, Variable};
//!
//! let vars = vec![
//!     Variable::scalar("speed", "D10".parse()?, ElementType::Int)?,
//!     Variable::scalar("target", "D11".parse()?, ElementType::Real)?,
//!     Variable::new("lamps", "Y20".parse()?, ElementType::Bool, vec![(0, 15)])?,
//! ];
//! let plan = CommandPlan::new(Direction::Read, vars)?;
//! let values = plan.read(client).await?;
//! println!("{:?}", values["target"]);
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! ```no_run
//! # async fn demo(client: &melsec_slmp::Client) {
//! use melsec_slmp::SlmpError;
//!
//! match client.batch_read_words("D0".parse().unwrap(), 4).await {
//!     Ok(words) => println!("{words:?}"),
//!     Err(SlmpError::ProtocolError { code, .. }) => {
//!         println!("PLC refused: 0x{code:04X} {}", melsec_slmp::slmp_error_description(code));
//!     }
//!     Err(e) if e.is_transport_fault() => println!("link problem: {e}"),
//!     Err(e) => println!("error: {e}"),
//! }
//! # }
//! ```
//!
//! ## Logging
//!
//! The crate emits [`tracing`] events: connection lifecycle at `info`,
//! every request at `debug`, faults at `warn`. Install any subscriber to see
//! them.

#![warn(clippy::all)]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

mod client;
mod codec;
mod command;
mod device;
mod error;
mod header;
mod optimizer;
mod response;
mod transport;
pub mod utils;
mod variable;

#[cfg(test)]
mod mock;

// Public re-exports
pub use client::{Client, ClientConfig};
pub use codec::{Codec, CpuType, STANDARD_MAX_INDEX};
pub use command::{
    decode_cpu_type, decode_random_read, random_read_len, BatchData, BatchReadCommand, BatchWriteCommand,
    BlockData, BlockReadCommand, BlockReadResult, BlockSpec, BlockWriteCommand, ClearMode, EchoCommand,
    PasswordCommand, RandomReadCommand, RandomReadResult, RandomWriteBitsCommand, RandomWriteCommand,
    RemoteCommand, Request, CPU_NAME_LEN, CPU_TYPE_RESPONSE_LEN, MAX_BATCH_BITS, MAX_BATCH_WORDS, MAX_BLOCKS,
    MAX_BLOCK_POINTS, MAX_ECHO_LEN, MAX_PASSWORD_LEN, MAX_RANDOM_POINTS,
};
pub use device::{format_address, parse_address, Device, DeviceAddress};
pub use error::{slmp_error_description, Result, SlmpError};
pub use header::{Destination, SlmpHeader, DEFAULT_MONITOR_TIMER, SLMP_HEADER_SIZE};
pub use optimizer::{plan_topics, CommandPlan, PlannedCommand, TopicPlans, BLOCK_THRESHOLD, READ_GAP_TOLERANCE};
pub use response::{frame_length, SlmpResponse};
pub use transport::{
    Connector, Link, Protocol, Session, SessionEvent, SessionOptions, TcpConnector, TransportState, UdpConnector,
    DEFAULT_CONNECT_RETRIES, DEFAULT_CONNECT_TIMEOUT, DEFAULT_SLMP_PORT, MAX_FRAME_SIZE,
};
pub use variable::{Direction, ElementType, Topic, Value, Variable, VariableResolver, VariableTable};
