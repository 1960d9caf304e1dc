//! Transport session for SLMP communication.
//!
//! SLMP frames carry no correlation id, so a session keeps exactly one
//! request on the wire and hands responses back strictly in submission order.
//! The socket, the request queue and the reconnect policy are owned by a
//! single background task; [`Session`] is a cheap, cloneable handle to it.
//!
//! # Lifecycle
//!
//! ```text
//! Disconnected --connect()--> Connecting --link up--> Connected --handshake--> Ready
//!                                  |                      |                      |
//!                                  +------ fault ---------+----------------------+
//!                                  v
//!                             Reconnecting --(retries spent)--> Disconnected
//! ```
//!
//! A fault (response timeout, peer close, I/O error) rejects the request that
//! was on the wire and starts reconnecting; requests still waiting in the
//! queue are sent once the link is back. When the retry budget is spent the
//! whole queue is rejected and the session stays disconnected until
//! [`Session::connect`] is called again. [`Session::close`] never reconnects.
//!
//! Lifecycle changes are published on a broadcast channel, see
//! [`Session::subscribe`].
//!
//! # Example
//!
//! ```no_run
//! use melsec_slmp::{Protocol, Session, SessionOptions};
//!
//! # async fn run() -> melsec_slmp::Result<()> {
//! let session = Session::open("192.168.3.39:5007".parse().unwrap(), Protocol::Tcp, SessionOptions::default());
//! session.connect().await?;
//! let response = session.request(vec![/* frame */]).await?;
//! session.close().await;
//! # Ok(())
//! # }
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::future::{pending, Future};
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::{sleep_until, timeout, Instant};
use tracing::{debug, error, info, warn};

use crate::error::{Result, SlmpError};
use crate::response::frame_length;
use crate::utils::format_hex;

/// Default SLMP port.
pub const DEFAULT_SLMP_PORT: u16 = 5007;

/// Default connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(1000);

/// Default number of reconnect attempts after a failure.
pub const DEFAULT_CONNECT_RETRIES: u32 = 5;

/// Largest frame accepted on a datagram link.
pub const MAX_FRAME_SIZE: usize = 4096;

const EVENT_CAPACITY: usize = 32;

/// Socket type used to reach the PLC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Protocol {
    /// Stream transport; frames are reassembled from the length field.
    #[default]
    Tcp,
    /// Datagram transport; one datagram per frame.
    Udp,
}

/// Connection state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TransportState {
    /// No link and no connect in progress.
    #[default]
    Disconnected,
    /// First connect in progress.
    Connecting,
    /// Link is up.
    Connected,
    /// Link is up and the CPU type handshake is done.
    Ready,
    /// Connect in progress after a fault.
    Reconnecting,
}

impl TransportState {
    /// Returns `true` if requests go straight to the wire.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected | Self::Ready)
    }

    /// Returns `true` while a connect attempt is running.
    pub fn is_transitional(&self) -> bool {
        matches!(self, Self::Connecting | Self::Reconnecting)
    }
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Ready => "ready",
            Self::Reconnecting => "reconnecting",
        };
        write!(f, "{}", s)
    }
}

/// Lifecycle notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The link came up.
    Connected,
    /// The CPU type handshake completed.
    Ready,
    /// First failure after a healthy period; reconnecting.
    Reconnecting,
    /// A response did not arrive in time.
    Timeout,
    /// The link was closed, by the peer or by [`Session::close`].
    Closed,
    /// Link or connect error.
    Error(String),
    /// The session gave up or was closed; no more reconnects.
    Disconnected,
}

/// Timing and retry settings of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SessionOptions {
    /// Time allowed for one connect attempt.
    pub connect_timeout: Duration,
    /// Reconnect attempts after a failure before giving up.
    pub connect_retries: u32,
    /// Time allowed for a response once a request is on the wire.
    pub response_timeout: Duration,
}

impl SessionOptions {
    /// Response timeout derived from a monitoring timer (250 ms units), x4.
    ///
    /// # Example
    ///
    /// ```
    /// use melsec_slmp::SessionOptions;
    /// use std::time::Duration;
    ///
    /// assert_eq!(SessionOptions::response_timeout_for(4), Duration::from_secs(4));
    /// ```
    pub fn response_timeout_for(monitor_timer: u16) -> Duration {
        Duration::from_millis(u64::from(monitor_timer.max(1)) * 250 * 4)
    }

    /// Sets the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the reconnect budget.
    pub fn with_connect_retries(mut self, retries: u32) -> Self {
        self.connect_retries = retries;
        self
    }

    /// Sets the response timeout.
    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            connect_retries: DEFAULT_CONNECT_RETRIES,
            response_timeout: Self::response_timeout_for(crate::header::DEFAULT_MONITOR_TIMER),
        }
    }
}

/// An established link carrying whole frames.
#[async_trait]
pub trait Link: Send {
    /// Writes one frame.
    async fn send(&mut self, frame: &[u8]) -> io::Result<()>;

    /// Reads the next complete frame.
    ///
    /// Must be cancel-safe: dropping the future may not lose data.
    async fn recv(&mut self) -> io::Result<Vec<u8>>;
}

/// Opens links to one PLC.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Opens a new link.
    async fn connect(&self) -> io::Result<Box<dyn Link>>;

    /// Peer description used in log records.
    fn peer(&self) -> String;
}

/// Connector for TCP links.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    addr: SocketAddr,
}

impl TcpConnector {
    /// Creates a connector for `addr`.
    pub fn new(addr: SocketAddr) -> Self {
        Self { addr }
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self) -> io::Result<Box<dyn Link>> {
        let stream = TcpStream::connect(self.addr).await?;
        stream.set_nodelay(true)?;
        Ok(Box::new(TcpLink {
            stream,
            buf: BytesMut::with_capacity(MAX_FRAME_SIZE),
        }))
    }

    fn peer(&self) -> String {
        format!("tcp://{}", self.addr)
    }
}

struct TcpLink {
    stream: TcpStream,
    buf: BytesMut,
}

#[async_trait]
impl Link for TcpLink {
    async fn send(&mut self, frame: &[u8]) -> io::Result<()> {
        self.stream.write_all(frame).await
    }

    async fn recv(&mut self) -> io::Result<Vec<u8>> {
        loop {
            if let Some(len) = frame_length(&self.buf) {
                if self.buf.len() >= len {
                    return Ok(self.buf.split_to(len).to_vec());
                }
            }
            if self.stream.read_buf(&mut self.buf).await? == 0 {
                return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "connection closed"));
            }
        }
    }
}

/// Connector for UDP links.
#[derive(Debug, Clone)]
pub struct UdpConnector {
    addr: SocketAddr,
}

impl UdpConnector {
    /// Creates a connector for `addr`.
    pub fn new(addr: SocketAddr) -> Self {
        Self { addr }
    }
}

#[async_trait]
impl Connector for UdpConnector {
    async fn connect(&self) -> io::Result<Box<dyn Link>> {
        let local: SocketAddr = if self.addr.is_ipv4() {
            SocketAddr::from(([0, 0, 0, 0], 0))
        } else {
            SocketAddr::from(([0u16; 8], 0))
        };
        let socket = UdpSocket::bind(local).await?;
        socket.connect(self.addr).await?;
        Ok(Box::new(UdpLink { socket }))
    }

    fn peer(&self) -> String {
        format!("udp://{}", self.addr)
    }
}

struct UdpLink {
    socket: UdpSocket,
}

#[async_trait]
impl Link for UdpLink {
    async fn send(&mut self, frame: &[u8]) -> io::Result<()> {
        self.socket.send(frame).await.map(|_| ())
    }

    async fn recv(&mut self) -> io::Result<Vec<u8>> {
        let mut buf = vec![0u8; MAX_FRAME_SIZE];
        let n = self.socket.recv(&mut buf).await?;
        buf.truncate(n);
        Ok(buf)
    }
}

struct PendingRequest {
    frame: Vec<u8>,
    resolver: oneshot::Sender<Result<Vec<u8>>>,
}

enum Message {
    Request(PendingRequest),
    Connect(oneshot::Sender<Result<()>>),
    Ready,
    Close(oneshot::Sender<()>),
}

/// Handle to a session task.
///
/// Cloning is cheap; all clones drive the same connection. The task ends when
/// the last handle is dropped.
#[derive(Clone)]
pub struct Session {
    tx: mpsc::UnboundedSender<Message>,
    events: broadcast::Sender<SessionEvent>,
    state: watch::Receiver<TransportState>,
}

impl Session {
    /// Spawns a session task on the current runtime. Does not connect.
    pub fn spawn(connector: impl Connector, options: SessionOptions) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (state_tx, state) = watch::channel(TransportState::Disconnected);
        let actor = Actor {
            connector: Arc::new(connector),
            options,
            rx,
            events: events.clone(),
            state: state_tx,
            link: None,
            connecting: None,
            current: None,
            queue: VecDeque::new(),
            deadline: None,
            attempts: 0,
            waiters: Vec::new(),
            handshake_done: false,
        };
        tokio::spawn(actor.run());
        Self { tx, events, state }
    }

    /// Spawns a session for a TCP or UDP peer.
    pub fn open(addr: SocketAddr, protocol: Protocol, options: SessionOptions) -> Self {
        match protocol {
            Protocol::Tcp => Self::spawn(TcpConnector::new(addr), options),
            Protocol::Udp => Self::spawn(UdpConnector::new(addr), options),
        }
    }

    /// Connects, or joins the connect already in progress.
    ///
    /// # Errors
    ///
    /// Returns `RetriesExhausted` if no link could be established, or
    /// `NotConnected` if the session is closed meanwhile.
    pub async fn connect(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(Message::Connect(tx))
            .map_err(|_| SlmpError::NotConnected)?;
        rx.await.map_err(|_| SlmpError::NotConnected)?
    }

    /// Queues a frame and waits for its response frame.
    ///
    /// Requests are sent one at a time in submission order. Requests made
    /// while (re)connecting wait for the link.
    ///
    /// # Errors
    ///
    /// `NotConnected` when the session is disconnected, otherwise the fault
    /// that interrupted this request.
    pub async fn request(&self, frame: Vec<u8>) -> Result<Vec<u8>> {
        let (resolver, rx) = oneshot::channel();
        self.tx
            .send(Message::Request(PendingRequest { frame, resolver }))
            .map_err(|_| SlmpError::NotConnected)?;
        rx.await.map_err(|_| SlmpError::NotConnected)?
    }

    /// Marks the protocol handshake as done.
    pub(crate) fn mark_ready(&self) {
        let _ = self.tx.send(Message::Ready);
    }

    /// Closes the link and rejects everything pending. No reconnect follows.
    pub async fn close(&self) {
        let (tx, rx) = oneshot::channel();
        if self.tx.send(Message::Close(tx)).is_ok() {
            let _ = rx.await;
        }
    }

    /// Current connection state.
    pub fn state(&self) -> TransportState {
        *self.state.borrow()
    }

    /// Waits until the state satisfies `f`.
    ///
    /// # Errors
    ///
    /// Returns `NotConnected` if the session task has ended.
    pub async fn wait_for(&self, f: impl FnMut(&TransportState) -> bool) -> Result<TransportState> {
        let mut state = self.state.clone();
        let value = state.wait_for(f).await.map_err(|_| SlmpError::NotConnected)?;
        Ok(*value)
    }

    /// Subscribes to lifecycle notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session").field("state", &self.state()).finish()
    }
}

type ConnectFuture = Pin<Box<dyn Future<Output = Result<Box<dyn Link>>> + Send>>;

struct Actor {
    connector: Arc<dyn Connector>,
    options: SessionOptions,
    rx: mpsc::UnboundedReceiver<Message>,
    events: broadcast::Sender<SessionEvent>,
    state: watch::Sender<TransportState>,
    link: Option<Box<dyn Link>>,
    connecting: Option<ConnectFuture>,
    current: Option<oneshot::Sender<Result<Vec<u8>>>>,
    queue: VecDeque<PendingRequest>,
    deadline: Option<Instant>,
    attempts: u32,
    waiters: Vec<oneshot::Sender<Result<()>>>,
    handshake_done: bool,
}

impl Actor {
    async fn run(mut self) {
        loop {
            tokio::select! {
                msg = self.rx.recv() => match msg {
                    Some(msg) => self.on_message(msg).await,
                    None => break,
                },
                result = poll_connect(&mut self.connecting) => self.on_connect(result).await,
                frame = recv_frame(&mut self.link) => self.on_frame(frame).await,
                () = expire(self.deadline) => {
                    warn!(peer = %self.connector.peer(), timeout = ?self.options.response_timeout, "response timeout");
                    self.emit(SessionEvent::Timeout);
                    self.on_fault(SlmpError::Timeout);
                }
            }
        }
        debug!(peer = %self.connector.peer(), "session task finished");
    }

    fn state(&self) -> TransportState {
        *self.state.borrow()
    }

    fn set_state(&self, state: TransportState) {
        self.state.send_replace(state);
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    async fn on_message(&mut self, msg: Message) {
        match msg {
            Message::Request(request) => {
                if self.state() == TransportState::Disconnected {
                    let _ = request.resolver.send(Err(SlmpError::NotConnected));
                    return;
                }
                self.queue.push_back(request);
                self.send_next().await;
            }
            Message::Connect(waiter) => match self.state() {
                s if s.is_connected() => {
                    let _ = waiter.send(Ok(()));
                }
                s if s.is_transitional() => self.waiters.push(waiter),
                _ => {
                    self.waiters.push(waiter);
                    self.attempts = 0;
                    self.start_connect(TransportState::Connecting);
                }
            },
            Message::Ready => {
                self.handshake_done = true;
                if self.state() == TransportState::Connected {
                    self.set_state(TransportState::Ready);
                    self.emit(SessionEvent::Ready);
                }
            }
            Message::Close(done) => {
                info!(peer = %self.connector.peer(), "closing session");
                let was_up = self.link.is_some();
                self.link = None;
                self.connecting = None;
                self.deadline = None;
                self.reject_all(&SlmpError::NotConnected);
                self.set_state(TransportState::Disconnected);
                if was_up {
                    self.emit(SessionEvent::Closed);
                }
                self.emit(SessionEvent::Disconnected);
                let _ = done.send(());
            }
        }
    }

    fn start_connect(&mut self, state: TransportState) {
        self.link = None;
        self.set_state(state);
        let connector = Arc::clone(&self.connector);
        let limit = self.options.connect_timeout;
        debug!(peer = %connector.peer(), attempt = self.attempts, "connecting");
        self.connecting = Some(Box::pin(async move {
            match timeout(limit, connector.connect()).await {
                Ok(Ok(link)) => Ok(link),
                Ok(Err(e)) => Err(SlmpError::Io(e)),
                Err(_) => Err(SlmpError::ConnectTimeout),
            }
        }));
    }

    async fn on_connect(&mut self, result: Result<Box<dyn Link>>) {
        match result {
            Ok(link) => {
                info!(peer = %self.connector.peer(), "connected");
                self.link = Some(link);
                self.attempts = 0;
                self.set_state(TransportState::Connected);
                self.emit(SessionEvent::Connected);
                if self.handshake_done {
                    self.set_state(TransportState::Ready);
                    self.emit(SessionEvent::Ready);
                }
                for waiter in self.waiters.drain(..) {
                    let _ = waiter.send(Ok(()));
                }
                self.send_next().await;
            }
            Err(e) => {
                warn!(peer = %self.connector.peer(), error = %e, "connect failed");
                self.emit(SessionEvent::Error(e.to_string()));
                self.reconnect();
            }
        }
    }

    async fn on_frame(&mut self, frame: io::Result<Vec<u8>>) {
        match frame {
            Ok(frame) => {
                debug!(peer = %self.connector.peer(), frame = %format_hex(&frame), "recv");
                match self.current.take() {
                    Some(resolver) => {
                        self.deadline = None;
                        let _ = resolver.send(Ok(frame));
                        self.send_next().await;
                    }
                    None => warn!(peer = %self.connector.peer(), len = frame.len(), "dropping unsolicited frame"),
                }
            }
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                info!(peer = %self.connector.peer(), "connection closed by peer");
                self.emit(SessionEvent::Closed);
                self.on_fault(SlmpError::ConnectionClosed);
            }
            Err(e) => {
                warn!(peer = %self.connector.peer(), error = %e, "link error");
                self.emit(SessionEvent::Error(e.to_string()));
                self.on_fault(SlmpError::Io(e));
            }
        }
    }

    /// Puts the next queued request on the wire if the link is idle.
    async fn send_next(&mut self) {
        while self.current.is_none() {
            let Some(link) = self.link.as_mut() else {
                return;
            };
            let Some(request) = self.queue.pop_front() else {
                return;
            };
            if request.resolver.is_closed() {
                continue;
            }
            debug!(frame = %format_hex(&request.frame), "send");
            let sent = link.send(&request.frame).await;
            self.current = Some(request.resolver);
            match sent {
                Ok(()) => self.deadline = Some(Instant::now() + self.options.response_timeout),
                Err(e) => {
                    warn!(peer = %self.connector.peer(), error = %e, "send failed");
                    self.emit(SessionEvent::Error(e.to_string()));
                    self.on_fault(SlmpError::Io(e));
                }
            }
        }
    }

    /// Drops the link, fails every pending request with `cause` and starts
    /// reconnecting.
    fn on_fault(&mut self, cause: SlmpError) {
        self.link = None;
        self.deadline = None;
        self.reject_all(&cause);
        self.reconnect();
    }

    fn reconnect(&mut self) {
        if self.attempts == 0 {
            self.emit(SessionEvent::Reconnecting);
        }
        if self.attempts < self.options.connect_retries {
            self.attempts += 1;
            self.start_connect(TransportState::Reconnecting);
            return;
        }

        let attempts = self.attempts + 1;
        error!(peer = %self.connector.peer(), attempts, "giving up reconnecting");
        self.connecting = None;
        self.set_state(TransportState::Disconnected);
        self.reject_all(&SlmpError::RetriesExhausted { attempts });
        self.emit(SessionEvent::Disconnected);
    }

    fn reject_all(&mut self, cause: &SlmpError) {
        if let Some(resolver) = self.current.take() {
            let _ = resolver.send(Err(cause.clone()));
        }
        for request in self.queue.drain(..) {
            let _ = request.resolver.send(Err(cause.clone()));
        }
        for waiter in self.waiters.drain(..) {
            let _ = waiter.send(Err(cause.clone()));
        }
    }
}

async fn poll_connect(connecting: &mut Option<ConnectFuture>) -> Result<Box<dyn Link>> {
    let result = match connecting.as_mut() {
        Some(fut) => fut.await,
        None => pending().await,
    };
    *connecting = None;
    result
}

async fn recv_frame(link: &mut Option<Box<dyn Link>>) -> io::Result<Vec<u8>> {
    match link.as_mut() {
        Some(link) => link.recv().await,
        None => pending().await,
    }
}

async fn expire(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => pending().await,
    }
}
