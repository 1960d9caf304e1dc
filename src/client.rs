//! High-level SLMP client for communicating with MELSEC PLCs.
//!
//! This module provides the [`Client`] struct, the command layer on top of a
//! transport [`Session`].
//!
//! # Overview
//!
//! The client handles:
//! - The CPU type handshake that fixes the device [`Codec`] of the session
//! - Command construction and pre-flight size validation
//! - End code and response length validation
//! - Monitor registration and polling
//! - Typed helpers (f32, i32) on top of batch access
//!
//! # Example
//!
//! ```no_run
//! use melsec_slmp::{Client, ClientConfig, DeviceAddress};
//! use std::net::Ipv4Addr;
//!
//! # async fn run() -> melsec_slmp::Result<()> {
//! let config = ClientConfig::new(Ipv4Addr::new(192, 168, 3, 39));
//! let client = Client::connect(config).await?;
//!
//! let d100: DeviceAddress = "D100".parse()?;
//! let words = client.batch_read_words(d100, 10).await?;
//! client.batch_write_words(d100, &[0x1234, 0x5678]).await?;
//!
//! let m0: DeviceAddress = "M0".parse()?;
//! let bits = client.batch_read_bits(m0, 16).await?;
//!
//! let temperature = client.read_f32("D200".parse()?).await?;
//! client.close().await;
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration
//!
//! [`ClientConfig`] covers:
//! - PLC address, port and socket type
//! - Destination routing and monitoring timer
//! - Connect timeout, reconnect budget and response timeout

use std::net::{IpAddr, SocketAddr};
use std::sync::{Mutex, OnceLock};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::codec::{Codec, CpuType};
use crate::command::{
    self, BatchData, BatchReadCommand, BatchWriteCommand, BlockData, BlockReadCommand, BlockReadResult,
    BlockSpec, BlockWriteCommand, ClearMode, EchoCommand, PasswordCommand, RandomReadCommand,
    RandomReadResult, RandomWriteBitsCommand, RandomWriteCommand, RemoteCommand, Request,
    CPU_TYPE_RESPONSE_LEN,
};
use crate::device::DeviceAddress;
use crate::error::{slmp_error_description, Result, SlmpError};
use crate::header::{Destination, SlmpHeader, DEFAULT_MONITOR_TIMER};
use crate::response::SlmpResponse;
use crate::transport::{Protocol, Session, SessionEvent, SessionOptions, DEFAULT_SLMP_PORT};

/// Configuration for creating an SLMP client.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ClientConfig {
    /// PLC socket address.
    pub plc_addr: SocketAddr,
    /// Socket type.
    pub protocol: Protocol,
    /// Routing to the target station.
    pub destination: Destination,
    /// Monitoring timer in 250 ms units.
    pub monitor_timer: u16,
    /// Time allowed for one connect attempt.
    pub connect_timeout: Duration,
    /// Reconnect attempts before giving up.
    pub connect_retries: u32,
    /// Response timeout; derived from the monitoring timer when unset.
    pub response_timeout: Option<Duration>,
}

impl ClientConfig {
    /// Creates a configuration for a PLC on the default port over TCP.
    ///
    /// # Example
    ///
    /// ```
    /// use melsec_slmp::ClientConfig;
    /// use std::net::Ipv4Addr;
    ///
    /// let config = ClientConfig::new(Ipv4Addr::new(192, 168, 3, 39));
    /// assert_eq!(config.plc_addr.port(), 5007);
    /// ```
    pub fn new(plc_ip: impl Into<IpAddr>) -> Self {
        let options = SessionOptions::default();
        Self {
            plc_addr: SocketAddr::new(plc_ip.into(), DEFAULT_SLMP_PORT),
            protocol: Protocol::Tcp,
            destination: Destination::local(),
            monitor_timer: DEFAULT_MONITOR_TIMER,
            connect_timeout: options.connect_timeout,
            connect_retries: options.connect_retries,
            response_timeout: None,
        }
    }

    /// Sets a custom PLC port (default is 5007).
    pub fn with_port(mut self, port: u16) -> Self {
        self.plc_addr.set_port(port);
        self
    }

    /// Selects TCP or UDP.
    ///
    /// # Example
    ///
    /// ```
    /// use melsec_slmp::{ClientConfig, Protocol};
    /// use std::net::Ipv4Addr;
    ///
    /// let config = ClientConfig::new(Ipv4Addr::LOCALHOST)
    ///     .with_protocol(Protocol::Udp)
    ///     .with_port(5008);
    /// ```
    pub fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol;
        self
    }

    /// Sets the full destination route.
    pub fn with_destination(mut self, destination: Destination) -> Self {
        self.destination = destination;
        self
    }

    /// Sets the destination network number.
    pub fn with_dest_network(mut self, network: u8) -> Self {
        self.destination.network = network;
        self
    }

    /// Sets the destination station number.
    pub fn with_dest_station(mut self, station: u8) -> Self {
        self.destination.station = station;
        self
    }

    /// Sets the monitoring timer in 250 ms units (default 4).
    pub fn with_monitor_timer(mut self, timer: u16) -> Self {
        self.monitor_timer = timer;
        self
    }

    /// Sets the connect timeout (default 1 s).
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the reconnect budget (default 5).
    pub fn with_connect_retries(mut self, retries: u32) -> Self {
        self.connect_retries = retries;
        self
    }

    /// Overrides the response timeout derived from the monitoring timer.
    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = Some(timeout);
        self
    }

    /// Transport settings for this configuration.
    ///
    /// # Example
    ///
    /// ```
    /// use melsec_slmp::ClientConfig;
    /// use std::net::Ipv4Addr;
    /// use std::time::Duration;
    ///
    /// let config = ClientConfig::new(Ipv4Addr::LOCALHOST).with_monitor_timer(8);
    /// assert_eq!(config.session_options().response_timeout, Duration::from_secs(8));
    /// ```
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            connect_timeout: self.connect_timeout,
            connect_retries: self.connect_retries,
            response_timeout: self
                .response_timeout
                .unwrap_or_else(|| SessionOptions::response_timeout_for(self.monitor_timer)),
        }
    }

    /// Request header for this configuration.
    pub fn header(&self) -> SlmpHeader {
        SlmpHeader::new(self.destination, self.monitor_timer)
    }
}

/// SLMP client for communicating with MELSEC PLCs.
///
/// Every call produces one request and one response, sent through the
/// session's ordered queue. Calls may be issued concurrently from several
/// tasks; they reach the PLC one at a time in submission order. Nothing is
/// retried at this level.
///
/// The CPU type is read once per session. It selects the [`Codec`] used for
/// every device access and never changes afterwards.
pub struct Client {
    session: Session,
    header: SlmpHeader,
    cpu: OnceLock<CpuType>,
    monitor: Mutex<Option<(usize, usize)>>,
}

impl Client {
    /// Opens a session, connects and reads the CPU type.
    ///
    /// # Errors
    ///
    /// Returns the transport error when no link could be established, or the
    /// exchange error of the CPU type request.
    pub async fn connect(config: ClientConfig) -> Result<Self> {
        let session = Session::open(config.plc_addr, config.protocol, config.session_options());
        Self::attach(session, config.header()).await
    }

    /// Connects an existing session and performs the CPU type handshake.
    ///
    /// The session is closed again if the handshake fails.
    pub async fn attach(session: Session, header: SlmpHeader) -> Result<Self> {
        let client = Self::new(session, header);
        client.session.connect().await?;
        if let Err(e) = client.handshake().await {
            client.session.close().await;
            return Err(e);
        }
        Ok(client)
    }

    /// Wraps a session without connecting or handshaking.
    ///
    /// Control commands work right away; device commands return `NotReady`
    /// until [`handshake`](Self::handshake) succeeds.
    pub fn new(session: Session, header: SlmpHeader) -> Self {
        Self {
            session,
            header,
            cpu: OnceLock::new(),
            monitor: Mutex::new(None),
        }
    }

    /// Reads the CPU type and fixes the codec for the rest of the session.
    ///
    /// A second handshake keeps the codec chosen by the first one.
    pub async fn handshake(&self) -> Result<&CpuType> {
        let cpu = self.get_cpu_type().await?;
        let cpu = self.cpu.get_or_init(|| cpu);
        info!(
            cpu = %cpu.name,
            code = format_args!("0x{:04X}", cpu.code),
            extended = cpu.is_extended,
            "SLMP session ready"
        );
        self.session.mark_ready();
        Ok(cpu)
    }

    /// Returns the CPU type resolved by the handshake.
    pub fn cpu_type(&self) -> Option<&CpuType> {
        self.cpu.get()
    }

    /// Returns the codec of this session.
    ///
    /// # Errors
    ///
    /// Returns `NotReady` before the handshake.
    pub fn codec(&self) -> Result<Codec> {
        self.cpu.get().map(CpuType::codec).ok_or(SlmpError::NotReady)
    }

    /// Returns the underlying session.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Subscribes to the session's lifecycle notifications.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<SessionEvent> {
        self.session.subscribe()
    }

    /// Closes the session. No reconnect follows.
    pub async fn close(&self) {
        self.session.close().await;
    }

    /// Sends a request and parses its response frame.
    async fn execute(&self, request: Request) -> Result<SlmpResponse> {
        debug!(
            command = format_args!("0x{:04X}", request.command),
            subcommand = format_args!("0x{:04X}", request.subcommand),
            "SLMP request"
        );
        let bytes = self.session.request(request.to_frame(&self.header)).await?;
        let response = SlmpResponse::from_bytes(&bytes)?;
        if !response.is_success() {
            warn!(
                command = format_args!("0x{:04X}", request.command),
                end_code = format_args!("0x{:04X}", response.end_code),
                "{}",
                slmp_error_description(response.end_code)
            );
        }
        Ok(response)
    }

    /// Executes a request that returns no data.
    async fn execute_unit(&self, request: Request) -> Result<()> {
        self.execute(request).await?.check_error()
    }

    /// Reads the CPU model name and code.
    ///
    /// # Errors
    ///
    /// `ResponseSizeMismatch` unless the PLC answers with exactly 18 bytes.
    pub async fn get_cpu_type(&self) -> Result<CpuType> {
        let response = self.execute(command::cpu_type()).await?;
        let payload = response.expect_len(CPU_TYPE_RESPONSE_LEN)?;
        command::decode_cpu_type(payload)
    }

    /// Switches the CPU to RUN.
    pub async fn remote_run(&self, force: bool, clear: ClearMode) -> Result<()> {
        self.execute_unit(RemoteCommand::Run { force, clear }.to_request()).await
    }

    /// Switches the CPU to PAUSE.
    pub async fn remote_pause(&self, force: bool) -> Result<()> {
        self.execute_unit(RemoteCommand::Pause { force }.to_request()).await
    }

    /// Switches the CPU to STOP.
    pub async fn remote_stop(&self, force: bool) -> Result<()> {
        self.execute_unit(RemoteCommand::Stop { force }.to_request()).await
    }

    /// Clears latched devices. The CPU must be stopped.
    pub async fn remote_clear(&self) -> Result<()> {
        self.execute_unit(RemoteCommand::Clear.to_request()).await
    }

    /// Resets the CPU.
    pub async fn remote_reset(&self) -> Result<()> {
        self.execute_unit(RemoteCommand::Reset.to_request()).await
    }

    /// Clears the CPU error state.
    pub async fn clear_error(&self) -> Result<()> {
        self.execute_unit(RemoteCommand::ClearError.to_request()).await
    }

    /// Locks remote access with a password.
    pub async fn remote_lock(&self, password: &str) -> Result<()> {
        self.execute_unit(PasswordCommand::new(true, password)?.to_request()).await
    }

    /// Unlocks remote access with a password.
    pub async fn remote_unlock(&self, password: &str) -> Result<()> {
        self.execute_unit(PasswordCommand::new(false, password)?.to_request()).await
    }

    /// Sends `data` to the PLC and returns what it echoed.
    ///
    /// # Errors
    ///
    /// `ResponseSizeMismatch` when the echo length differs from the request.
    pub async fn test_echo(&self, data: &[u8]) -> Result<Vec<u8>> {
        let cmd = EchoCommand::new(data)?;
        let response = self.execute(cmd.to_request()).await?;
        cmd.decode(response.expect_len(cmd.response_len())?)
    }

    /// Reads `count` words starting at `head`.
    ///
    /// On a bit device each word carries 16 consecutive bits.
    ///
    /// # Errors
    ///
    /// `SizeExceeded` above 949 words, before any I/O.
    pub async fn batch_read_words(&self, head: DeviceAddress, count: usize) -> Result<Vec<u16>> {
        let cmd = BatchReadCommand::new(head, count, false)?;
        let response = self.execute(cmd.to_request(self.codec()?)?).await?;
        Ok(cmd.decode_words(response.expect_len(cmd.response_len())?))
    }

    /// Reads `count` bits starting at `head`.
    ///
    /// # Errors
    ///
    /// `SizeExceeded` above 3584 bits, before any I/O.
    pub async fn batch_read_bits(&self, head: DeviceAddress, count: usize) -> Result<Vec<bool>> {
        let cmd = BatchReadCommand::new(head, count, true)?;
        let response = self.execute(cmd.to_request(self.codec()?)?).await?;
        Ok(cmd.decode_bits(response.expect_len(cmd.response_len())?))
    }

    /// Writes words starting at `head`.
    pub async fn batch_write_words(&self, head: DeviceAddress, values: &[u16]) -> Result<()> {
        let cmd = BatchWriteCommand::new(head, BatchData::Words(values.to_vec()))?;
        self.execute_unit(cmd.to_request(self.codec()?)?).await
    }

    /// Writes bits starting at `head`.
    pub async fn batch_write_bits(&self, head: DeviceAddress, values: &[bool]) -> Result<()> {
        let cmd = BatchWriteCommand::new(head, BatchData::Bits(values.to_vec()))?;
        self.execute_unit(cmd.to_request(self.codec()?)?).await
    }

    /// Reads individually addressed words and double words.
    ///
    /// # Errors
    ///
    /// `SizeExceeded` above 94 addresses in total, before any I/O.
    pub async fn random_read(&self, words: &[DeviceAddress], dwords: &[DeviceAddress]) -> Result<RandomReadResult> {
        let cmd = RandomReadCommand::new(words.to_vec(), dwords.to_vec())?;
        let response = self.execute(cmd.to_request(self.codec()?)?).await?;
        Ok(cmd.decode(response.expect_len(cmd.response_len())?))
    }

    /// Writes individually addressed words and double words.
    pub async fn random_write(&self, words: &[(DeviceAddress, u16)], dwords: &[(DeviceAddress, u32)]) -> Result<()> {
        let cmd = RandomWriteCommand::new(words.to_vec(), dwords.to_vec())?;
        self.execute_unit(cmd.to_request(self.codec()?)?).await
    }

    /// Writes individually addressed bits.
    pub async fn random_write_bits(&self, bits: &[(DeviceAddress, bool)]) -> Result<()> {
        let cmd = RandomWriteBitsCommand::new(bits.to_vec())?;
        self.execute_unit(cmd.to_request(self.codec()?)?).await
    }

    /// Reads several contiguous runs in one exchange.
    ///
    /// Bit blocks are read in 16-bit words.
    ///
    /// # Errors
    ///
    /// `SizeExceeded` above 94 blocks or 949 points, before any I/O.
    pub async fn block_read(&self, words: &[BlockSpec], bits: &[BlockSpec]) -> Result<BlockReadResult> {
        let cmd = BlockReadCommand::new(words.to_vec(), bits.to_vec())?;
        let response = self.execute(cmd.to_request(self.codec()?)?).await?;
        Ok(cmd.decode(response.expect_len(cmd.response_len())?))
    }

    /// Writes several contiguous runs in one exchange.
    pub async fn block_write(&self, words: &[BlockData], bits: &[BlockData]) -> Result<()> {
        let cmd = BlockWriteCommand::new(words.to_vec(), bits.to_vec())?;
        self.execute_unit(cmd.to_request(self.codec()?)?).await
    }

    /// Registers an address set for [`poll_monitor`](Self::poll_monitor).
    ///
    /// Replaces any earlier registration.
    pub async fn register_monitor(&self, words: &[DeviceAddress], dwords: &[DeviceAddress]) -> Result<()> {
        let cmd = RandomReadCommand::new(words.to_vec(), dwords.to_vec())?;
        self.execute_unit(cmd.to_monitor_register(self.codec()?)?).await?;
        *self.monitor.lock().unwrap_or_else(|e| e.into_inner()) = Some(cmd.counts());
        Ok(())
    }

    /// Reads the registered address set.
    ///
    /// # Errors
    ///
    /// `InvalidParameter` if nothing was registered.
    pub async fn poll_monitor(&self) -> Result<RandomReadResult> {
        let counts = *self.monitor.lock().unwrap_or_else(|e| e.into_inner());
        let (words, dwords) =
            counts.ok_or_else(|| SlmpError::invalid_parameter("monitor", "no address set registered"))?;
        let response = self.execute(command::monitor_poll(self.codec()?)).await?;
        let payload = response.expect_len(command::random_read_len(words, dwords))?;
        Ok(command::decode_random_read(payload, words, dwords))
    }

    /// Reads an f32 (REAL) value from 2 consecutive words.
    ///
    /// # Example
    ///
    /// ```no_run
    /// # async fn run(client: melsec_slmp::Client) -> melsec_slmp::Result<()> {
    /// let temperature: f32 = client.read_f32("D100".parse()?).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn read_f32(&self, head: DeviceAddress) -> Result<f32> {
        let words = self.batch_read_words(head, 2).await?;
        // low word first
        Ok(f32::from_bits(u32::from(words[0]) | (u32::from(words[1]) << 16)))
    }

    /// Writes an f32 (REAL) value to 2 consecutive words.
    pub async fn write_f32(&self, head: DeviceAddress, value: f32) -> Result<()> {
        let bits = value.to_bits();
        self.batch_write_words(head, &[bits as u16, (bits >> 16) as u16]).await
    }

    /// Reads an i32 (DINT) value from 2 consecutive words.
    pub async fn read_i32(&self, head: DeviceAddress) -> Result<i32> {
        let words = self.batch_read_words(head, 2).await?;
        Ok((u32::from(words[0]) | (u32::from(words[1]) << 16)) as i32)
    }

    /// Writes an i32 (DINT) value to 2 consecutive words.
    pub async fn write_i32(&self, head: DeviceAddress, value: i32) -> Result<()> {
        let bits = value as u32;
        self.batch_write_words(head, &[bits as u16, (bits >> 16) as u16]).await
    }

    /// Returns the request header.
    pub fn header(&self) -> SlmpHeader {
        self.header
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("session", &self.session)
            .field("destination", &self.header.destination)
            .field("cpu", &self.cpu.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::Device;
    use crate::mock::{FakePlc, MockConnector};
    use crate::response::make_response;
    use crate::transport::TransportState;
    use std::net::Ipv4Addr;
    use std::sync::Arc;

    fn d(index: u32) -> DeviceAddress {
        DeviceAddress::new(Device::D, index)
    }

    fn m(index: u32) -> DeviceAddress {
        DeviceAddress::new(Device::M, index)
    }

    async fn fake_client(cpu: &str) -> (Client, Arc<Mutex<FakePlc>>) {
        let (connector, plc) = MockConnector::single();
        let fake = FakePlc::new(cpu).serve(plc);
        let session = Session::spawn(connector, SessionOptions::default());
        let client = Client::attach(session, SlmpHeader::default()).await.unwrap();
        (client, fake)
    }

    fn log(fake: &Arc<Mutex<FakePlc>>) -> Vec<u16> {
        fake.lock().unwrap().log.clone()
    }

    #[test]
    fn test_client_config_new() {
        let config = ClientConfig::new(Ipv4Addr::new(192, 168, 3, 39));

        assert_eq!(config.plc_addr.ip(), Ipv4Addr::new(192, 168, 3, 39));
        assert_eq!(config.plc_addr.port(), DEFAULT_SLMP_PORT);
        assert_eq!(config.protocol, Protocol::Tcp);
        assert_eq!(config.destination, Destination::local());
        assert_eq!(config.monitor_timer, 4);
        assert_eq!(config.connect_retries, 5);
        assert_eq!(config.connect_timeout, Duration::from_millis(1000));
    }

    #[test]
    fn test_client_config_builders() {
        let config = ClientConfig::new(Ipv4Addr::LOCALHOST)
            .with_port(6000)
            .with_protocol(Protocol::Udp)
            .with_dest_network(2)
            .with_dest_station(3)
            .with_connect_retries(1)
            .with_response_timeout(Duration::from_millis(300));

        assert_eq!(config.plc_addr.port(), 6000);
        assert_eq!(config.protocol, Protocol::Udp);
        assert_eq!(config.header().destination.network, 2);
        assert_eq!(config.header().destination.station, 3);
        let options = config.session_options();
        assert_eq!(options.connect_retries, 1);
        assert_eq!(options.response_timeout, Duration::from_millis(300));
    }

    #[test]
    fn test_response_timeout_follows_monitor_timer() {
        let config = ClientConfig::new(Ipv4Addr::LOCALHOST).with_monitor_timer(2);
        assert_eq!(config.session_options().response_timeout, Duration::from_secs(2));
        assert_eq!(config.header().monitor_timer, 2);
    }

    #[tokio::test]
    async fn test_handshake_selects_extended_codec() {
        let (client, fake) = fake_client("R04CPU").await;

        let cpu = client.cpu_type().unwrap();
        assert_eq!(cpu.name, "R04CPU");
        assert_eq!(cpu.code, 0x4800);
        assert_eq!(client.codec().unwrap(), Codec::Extended);
        assert_eq!(log(&fake), [0x0101]);

        let state = client.session().wait_for(|s| *s == TransportState::Ready).await.unwrap();
        assert_eq!(state, TransportState::Ready);
    }

    #[tokio::test]
    async fn test_handshake_selects_standard_codec() {
        let (client, _fake) = fake_client("Q03UDVCPU").await;
        assert_eq!(client.codec().unwrap(), Codec::Standard);
    }

    #[tokio::test]
    async fn test_device_commands_need_handshake() {
        let (connector, plc) = MockConnector::single();
        let fake = FakePlc::new("R04CPU").serve(plc);
        let session = Session::spawn(connector, SessionOptions::default());
        session.connect().await.unwrap();
        let client = Client::new(session, SlmpHeader::default());

        assert!(matches!(client.batch_read_words(d(0), 1).await, Err(SlmpError::NotReady)));
        assert_eq!(client.test_echo(b"ok").await.unwrap(), b"ok");
        assert_eq!(log(&fake), [0x0619]);
    }

    #[tokio::test]
    async fn test_batch_words_roundtrip() {
        for cpu in ["R04CPU", "Q03UDVCPU"] {
            let (client, _fake) = fake_client(cpu).await;
            client.batch_write_words(d(100), &[0x1234, 0x5678, 0x9ABC]).await.unwrap();
            assert_eq!(client.batch_read_words(d(100), 3).await.unwrap(), [0x1234, 0x5678, 0x9ABC]);
            assert_eq!(client.batch_read_words(d(101), 1).await.unwrap(), [0x5678]);
        }
    }

    #[tokio::test]
    async fn test_batch_bits_roundtrip() {
        let (client, _fake) = fake_client("Q03UDVCPU").await;
        let bits = [true, false, true, true, false, false, false, true, true];
        client.batch_write_bits(m(10), &bits).await.unwrap();
        assert_eq!(client.batch_read_bits(m(10), 9).await.unwrap(), bits);
        // M0..M15 as one word: M10, M12 and M13 set
        assert_eq!(client.batch_read_words(m(0), 1).await.unwrap(), [0x3400]);
    }

    #[tokio::test]
    async fn test_batch_ceiling_checked_before_io() {
        let (client, fake) = fake_client("R04CPU").await;

        let err = client.batch_read_words(d(0), 950).await.unwrap_err();
        assert!(matches!(err, SlmpError::SizeExceeded { count: 950, limit: 949, .. }));
        let err = client.batch_read_bits(m(0), 3585).await.unwrap_err();
        assert!(matches!(err, SlmpError::SizeExceeded { limit: 3584, .. }));
        assert_eq!(log(&fake), [0x0101]);

        assert_eq!(client.batch_read_words(d(0), 949).await.unwrap().len(), 949);
        assert_eq!(client.batch_read_bits(m(0), 3584).await.unwrap().len(), 3584);
    }

    #[tokio::test]
    async fn test_random_read_write() {
        for cpu in ["R04CPU", "Q03UDVCPU"] {
            let (client, fake) = fake_client(cpu).await;
            client
                .random_write(&[(d(10), 0x1111), (d(50), 0x2222)], &[(d(90), 0xDEAD_BEEF)])
                .await
                .unwrap();
            let result = client.random_read(&[d(50), d(10)], &[d(90)]).await.unwrap();
            assert_eq!(result.words, [0x2222, 0x1111]);
            assert_eq!(result.dwords, [0xDEAD_BEEF]);
            assert_eq!(client.batch_read_words(d(90), 2).await.unwrap(), [0xBEEF, 0xDEAD]);
            assert_eq!(&log(&fake)[1..], [0x1402, 0x0403, 0x0401]);
        }
    }

    #[tokio::test]
    async fn test_random_ceiling() {
        let (client, _fake) = fake_client("R04CPU").await;
        let words: Vec<_> = (0..60).map(d).collect();
        let dwords: Vec<_> = (100..135).map(d).collect();
        assert!(matches!(
            client.random_read(&words, &dwords).await,
            Err(SlmpError::SizeExceeded { count: 95, .. })
        ));
    }

    #[tokio::test]
    async fn test_random_write_bits() {
        for cpu in ["R04CPU", "Q03UDVCPU"] {
            let (client, _fake) = fake_client(cpu).await;
            client.random_write_bits(&[(m(3), true), (m(7), true), (m(3), false)]).await.unwrap();
            assert_eq!(client.batch_read_bits(m(3), 5).await.unwrap(), [false, false, false, false, true]);
        }
    }

    #[tokio::test]
    async fn test_block_read_write() {
        let (client, _fake) = fake_client("R04CPU").await;
        client
            .block_write(
                &[BlockData::new(d(0), vec![1, 2]), BlockData::new(d(20), vec![3])],
                &[BlockData::new(m(16), vec![0x8001])],
            )
            .await
            .unwrap();

        let result = client
            .block_read(&[BlockSpec::new(d(0), 3), BlockSpec::new(d(20), 1)], &[BlockSpec::new(m(16), 1)])
            .await
            .unwrap();
        assert_eq!(result.words, [vec![1u16, 2, 0], vec![3u16]]);
        assert_eq!(result.bits, [vec![0x8001u16]]);
        assert_eq!(client.batch_read_bits(m(16), 1).await.unwrap(), [true]);
        assert_eq!(client.batch_read_bits(m(31), 1).await.unwrap(), [true]);
    }

    #[tokio::test]
    async fn test_monitor() {
        let (client, fake) = fake_client("Q03UDVCPU").await;
        assert!(matches!(
            client.poll_monitor().await,
            Err(SlmpError::InvalidParameter { .. })
        ));

        client.register_monitor(&[d(5)], &[d(6)]).await.unwrap();
        client.batch_write_words(d(5), &[7, 0x0001, 0x0002]).await.unwrap();
        let result = client.poll_monitor().await.unwrap();
        assert_eq!(result.words, [7]);
        assert_eq!(result.dwords, [0x0002_0001]);
        assert_eq!(&log(&fake)[1..], [0x0801, 0x1401, 0x0802]);
    }

    #[tokio::test]
    async fn test_remote_control() {
        let (client, fake) = fake_client("R04CPU").await;
        client.remote_stop(false).await.unwrap();
        client.remote_clear().await.unwrap();
        client.remote_run(true, ClearMode::All).await.unwrap();
        client.remote_pause(false).await.unwrap();
        client.remote_reset().await.unwrap();
        client.clear_error().await.unwrap();
        client.remote_unlock("secret").await.unwrap();
        client.remote_lock("secret").await.unwrap();
        assert_eq!(
            &log(&fake)[1..],
            [0x1002, 0x1005, 0x1001, 0x1003, 0x1006, 0x1617, 0x1630, 0x1631]
        );
        assert!(client.remote_lock("").await.is_err());
    }

    #[tokio::test]
    async fn test_protocol_error() {
        let (client, fake) = fake_client("R04CPU").await;
        fake.lock().unwrap().fail_next = Some(0xC051);
        match client.batch_read_words(d(0), 1).await {
            Err(SlmpError::ProtocolError { code, .. }) => assert_eq!(code, 0xC051),
            other => panic!("unexpected {other:?}"),
        }
        // the session keeps working
        assert_eq!(client.batch_read_words(d(0), 1).await.unwrap(), [0]);
    }

    #[tokio::test]
    async fn test_response_size_mismatch() {
        let (connector, plc) = MockConnector::single();
        let mut fake = FakePlc::new("R04CPU");
        plc.serve(move |frame| {
            if frame[11..13] == [0x01, 0x04] {
                make_response(0, &[0x01, 0x00])
            } else {
                fake.handle(frame)
            }
        });
        let session = Session::spawn(connector, SessionOptions::default());
        let client = Client::attach(session, SlmpHeader::default()).await.unwrap();
        assert!(matches!(
            client.batch_read_words(d(0), 2).await,
            Err(SlmpError::ResponseSizeMismatch { expected: 4, received: 2 })
        ));
    }

    #[tokio::test]
    async fn test_failed_handshake_closes_session() {
        let (connector, plc) = MockConnector::single();
        plc.serve(|_| make_response(0xC059, &[]));
        let session = Session::spawn(connector, SessionOptions::default());
        let err = Client::attach(session.clone(), SlmpHeader::default()).await.unwrap_err();
        assert!(matches!(err, SlmpError::ProtocolError { code: 0xC059, .. }));
        assert_eq!(session.state(), TransportState::Disconnected);
    }

    #[tokio::test]
    async fn test_typed_helpers() {
        let (client, _fake) = fake_client("R04CPU").await;
        client.write_f32(d(200), 25.5).await.unwrap();
        assert_eq!(client.read_f32(d(200)).await.unwrap(), 25.5);
        client.write_i32(d(300), -123_456).await.unwrap();
        assert_eq!(client.read_i32(d(300)).await.unwrap(), -123_456);
    }

    #[tokio::test]
    async fn test_concurrent_calls_share_one_session() {
        let (client, _fake) = fake_client("R04CPU").await;
        let client = Arc::new(client);
        let mut tasks = Vec::new();
        for i in 0..8u16 {
            let client = Arc::clone(&client);
            tasks.push(tokio::spawn(async move {
                client.batch_write_words(d(u32::from(i)), &[i]).await.unwrap();
                client.batch_read_words(d(u32::from(i)), 1).await.unwrap()[0]
            }));
        }
        for (i, task) in tasks.into_iter().enumerate() {
            assert_eq!(task.await.unwrap(), i as u16);
        }
    }

    #[tokio::test]
    async fn test_client_debug() {
        let (client, _fake) = fake_client("R04CPU").await;
        let debug_str = format!("{:?}", client);
        assert!(debug_str.contains("Client"));
        assert!(debug_str.contains("R04CPU"));
    }
}
