//! SLMP command structures and serialization.
//!
//! Each command validates its arguments in `new` and serializes itself into a
//! [`Request`] for a given [`Codec`]. Commands that return data also know the
//! exact payload length the PLC must answer with and how to decode it.
//!
//! # Command Types
//!
//! ## Device access
//! - [`BatchReadCommand`] / [`BatchWriteCommand`] - one contiguous run
//! - [`RandomReadCommand`] / [`RandomWriteCommand`] / [`RandomWriteBitsCommand`] -
//!   individually addressed elements
//! - [`BlockReadCommand`] / [`BlockWriteCommand`] - several contiguous runs
//! - [`RandomReadCommand::to_monitor_register`] / [`monitor_poll`] - monitor
//!   registration and polling
//!
//! ## CPU control
//! - [`cpu_type`] - model name and code
//! - [`RemoteCommand`] - run, pause, stop, clear, reset, error clear
//! - [`PasswordCommand`] - remote lock and unlock
//! - [`EchoCommand`] - loopback test
//!
//! # Example
//!
//! ```
//! use melsec_slmp::{BatchReadCommand, Codec, DeviceAddress, SlmpHeader};
//!
//! let head = "D100".parse::<DeviceAddress>().unwrap();
//! let cmd = BatchReadCommand::new(head, 10, false).unwrap();
//! let request = cmd.to_request(Codec::Standard).unwrap();
//! let frame = request.to_frame(&SlmpHeader::default());
//! assert_eq!(&frame[11..15], &[0x01, 0x04, 0x00, 0x00]);
//! assert_eq!(cmd.response_len(), 20);
//! ```

use bytes::BufMut;

use crate::codec::{Codec, CpuType};
use crate::device::DeviceAddress;
use crate::error::{Result, SlmpError};
use crate::header::SlmpHeader;
use crate::utils::{bytes_to_words, pack_bits, unpack_bits, words_to_bytes};

/// Read CPU model name.
pub(crate) const CMD_CPU_TYPE: u16 = 0x0101;
/// Remote RUN.
pub(crate) const CMD_REMOTE_RUN: u16 = 0x1001;
/// Remote STOP.
pub(crate) const CMD_REMOTE_STOP: u16 = 0x1002;
/// Remote PAUSE.
pub(crate) const CMD_REMOTE_PAUSE: u16 = 0x1003;
/// Remote latch clear.
pub(crate) const CMD_REMOTE_CLEAR: u16 = 0x1005;
/// Remote RESET.
pub(crate) const CMD_REMOTE_RESET: u16 = 0x1006;
/// Error code clear.
pub(crate) const CMD_CLEAR_ERROR: u16 = 0x1617;
/// Remote password unlock.
pub(crate) const CMD_UNLOCK: u16 = 0x1630;
/// Remote password lock.
pub(crate) const CMD_LOCK: u16 = 0x1631;
/// Loopback test.
pub(crate) const CMD_ECHO: u16 = 0x0619;
/// Batch read.
pub(crate) const CMD_BATCH_READ: u16 = 0x0401;
/// Batch write.
pub(crate) const CMD_BATCH_WRITE: u16 = 0x1401;
/// Random read.
pub(crate) const CMD_RANDOM_READ: u16 = 0x0403;
/// Random write.
pub(crate) const CMD_RANDOM_WRITE: u16 = 0x1402;
/// Monitor registration.
pub(crate) const CMD_MONITOR_REGISTER: u16 = 0x0801;
/// Monitor poll.
pub(crate) const CMD_MONITOR_POLL: u16 = 0x0802;
/// Block read.
pub(crate) const CMD_BLOCK_READ: u16 = 0x0406;
/// Block write.
pub(crate) const CMD_BLOCK_WRITE: u16 = 0x1406;

/// Maximum number of words in one batch command.
pub const MAX_BATCH_WORDS: usize = 949;
/// Maximum number of bits in one batch command.
pub const MAX_BATCH_BITS: usize = 3584;
/// Maximum number of elements in one random command.
pub const MAX_RANDOM_POINTS: usize = 94;
/// Maximum number of blocks in one block command.
pub const MAX_BLOCKS: usize = 94;
/// Maximum number of words over all blocks of one block command.
pub const MAX_BLOCK_POINTS: usize = 949;
/// Maximum loopback data length.
pub const MAX_ECHO_LEN: usize = 960;
/// Maximum remote password length.
pub const MAX_PASSWORD_LEN: usize = 32;
/// Payload length of the CPU type response.
pub const CPU_TYPE_RESPONSE_LEN: usize = 18;
/// Width of the model name in the CPU type response.
pub const CPU_NAME_LEN: usize = 16;

/// A serialized command, ready to be framed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Command code.
    pub command: u16,
    /// Subcommand code.
    pub subcommand: u16,
    /// Command payload.
    pub payload: Vec<u8>,
}

impl Request {
    /// Creates a request.
    pub fn new(command: u16, subcommand: u16, payload: Vec<u8>) -> Self {
        Self {
            command,
            subcommand,
            payload,
        }
    }

    /// Builds the complete frame for this request.
    pub fn to_frame(&self, header: &SlmpHeader) -> Vec<u8> {
        header.build_request(self.command, self.subcommand, &self.payload)
    }
}

/// Read CPU model name request.
pub fn cpu_type() -> Request {
    Request::new(CMD_CPU_TYPE, 0x0000, Vec::new())
}

/// Decodes a CPU type payload (`CPU_TYPE_RESPONSE_LEN` bytes).
///
/// # Errors
///
/// Returns `ResponseSizeMismatch` if the payload is shorter than 18 bytes.
pub fn decode_cpu_type(payload: &[u8]) -> Result<CpuType> {
    let (Some(name), Some(&[lo, hi])) = (
        payload.get(..CPU_NAME_LEN),
        payload.get(CPU_NAME_LEN..CPU_TYPE_RESPONSE_LEN),
    ) else {
        return Err(SlmpError::size_mismatch(CPU_TYPE_RESPONSE_LEN, payload.len()));
    };
    let name = String::from_utf8_lossy(name);
    Ok(CpuType::new(name.trim_end_matches(['\0', ' ']), u16::from_le_bytes([lo, hi])))
}

/// Monitor poll request for the given codec.
pub fn monitor_poll(codec: Codec) -> Request {
    Request::new(CMD_MONITOR_POLL, codec.subcommand(false), Vec::new())
}

/// Device clear mode for remote RUN.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum ClearMode {
    /// Keep all devices.
    #[default]
    None = 0,
    /// Clear everything outside the latch range.
    ExceptLatch = 1,
    /// Clear all devices.
    All = 2,
}

/// Remote control commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteCommand {
    /// Switch to RUN.
    Run {
        /// Execute even if another device holds a remote STOP/PAUSE.
        force: bool,
        /// Devices to clear on start.
        clear: ClearMode,
    },
    /// Switch to PAUSE.
    Pause {
        /// Execute even if another device holds the CPU.
        force: bool,
    },
    /// Switch to STOP.
    Stop {
        /// Execute even if another device holds the CPU.
        force: bool,
    },
    /// Clear latched devices.
    Clear,
    /// Reset the CPU.
    Reset,
    /// Clear the current error.
    ClearError,
}

impl RemoteCommand {
    /// Serializes the command.
    pub fn to_request(self) -> Request {
        let mode = |force: bool| 0x01 | (u8::from(force) << 1);
        match self {
            RemoteCommand::Run { force, clear } => {
                Request::new(CMD_REMOTE_RUN, 0, vec![mode(force), 0x00, clear as u8, 0x00])
            }
            RemoteCommand::Pause { force } => Request::new(CMD_REMOTE_PAUSE, 0, vec![mode(force), 0x00]),
            RemoteCommand::Stop { force } => Request::new(CMD_REMOTE_STOP, 0, vec![mode(force), 0x00]),
            RemoteCommand::Clear => Request::new(CMD_REMOTE_CLEAR, 0, vec![0x01, 0x00]),
            RemoteCommand::Reset => Request::new(CMD_REMOTE_RESET, 0, vec![0x01, 0x00]),
            RemoteCommand::ClearError => Request::new(CMD_CLEAR_ERROR, 0, Vec::new()),
        }
    }
}

/// Remote password lock / unlock.
///
/// The password is passed through as-is; no further security handling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordCommand {
    lock: bool,
    password: String,
}

impl PasswordCommand {
    /// Creates a lock (`lock = true`) or unlock command.
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter` unless the password is 1 to 32 ASCII characters.
    pub fn new(lock: bool, password: impl Into<String>) -> Result<Self> {
        let password = password.into();
        if password.is_empty() || password.len() > MAX_PASSWORD_LEN || !password.is_ascii() {
            return Err(SlmpError::invalid_parameter(
                "password",
                format!("must be 1-{MAX_PASSWORD_LEN} ASCII characters"),
            ));
        }
        Ok(Self { lock, password })
    }

    /// Serializes the command.
    pub fn to_request(&self) -> Request {
        let mut payload = Vec::with_capacity(2 + self.password.len());
        payload.put_u16_le(self.password.len() as u16);
        payload.put_slice(self.password.as_bytes());
        let command = if self.lock { CMD_LOCK } else { CMD_UNLOCK };
        Request::new(command, 0x0000, payload)
    }
}

/// Loopback test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EchoCommand {
    data: Vec<u8>,
}

impl EchoCommand {
    /// Creates an echo command.
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter` if the data is empty, or `SizeExceeded`
    /// above 960 bytes.
    pub fn new(data: impl Into<Vec<u8>>) -> Result<Self> {
        let data = data.into();
        if data.is_empty() {
            return Err(SlmpError::invalid_parameter("data", "must not be empty"));
        }
        if data.len() > MAX_ECHO_LEN {
            return Err(SlmpError::size_exceeded("echo", data.len(), MAX_ECHO_LEN));
        }
        Ok(Self { data })
    }

    /// Serializes the command.
    pub fn to_request(&self) -> Request {
        let mut payload = Vec::with_capacity(2 + self.data.len());
        payload.put_u16_le(self.data.len() as u16);
        payload.put_slice(&self.data);
        Request::new(CMD_ECHO, 0x0000, payload)
    }

    /// Expected response payload length.
    pub fn response_len(&self) -> usize {
        self.data.len() + 2
    }

    /// Extracts the echoed data from a payload.
    ///
    /// # Errors
    ///
    /// Returns `ResponseSizeMismatch` if the payload lacks the length field.
    pub fn decode(&self, payload: &[u8]) -> Result<Vec<u8>> {
        payload
            .get(2..)
            .map(<[u8]>::to_vec)
            .ok_or_else(|| SlmpError::size_mismatch(self.response_len(), payload.len()))
    }
}

/// Batch read of one contiguous run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchReadCommand {
    head: DeviceAddress,
    count: u16,
    bit: bool,
}

impl BatchReadCommand {
    /// Creates a batch read of `count` words, or bits when `bit` is set.
    ///
    /// # Errors
    ///
    /// `InvalidParameter` for a zero count, `SizeExceeded` above 949 words
    /// or 3584 bits.
    pub fn new(head: DeviceAddress, count: usize, bit: bool) -> Result<Self> {
        let count = check_batch_count(if bit { "batch read bits" } else { "batch read" }, count, bit)?;
        Ok(Self { head, count, bit })
    }

    /// Serializes the command.
    pub fn to_request(&self, codec: Codec) -> Result<Request> {
        let mut payload = Vec::with_capacity(codec.word_size());
        codec.put_word(&mut payload, self.head, self.count)?;
        Ok(Request::new(CMD_BATCH_READ, codec.subcommand(self.bit), payload))
    }

    /// Expected response payload length.
    pub fn response_len(&self) -> usize {
        let count = self.count as usize;
        if self.bit {
            count.div_ceil(2)
        } else {
            count * 2
        }
    }

    /// Decodes a word read.
    pub fn decode_words(&self, payload: &[u8]) -> Vec<u16> {
        bytes_to_words(payload)
    }

    /// Decodes a bit read.
    pub fn decode_bits(&self, payload: &[u8]) -> Vec<bool> {
        unpack_bits(payload, self.count as usize)
    }
}

/// Data for a batch write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchData {
    /// Word values.
    Words(Vec<u16>),
    /// Bit values, sent nibble-packed.
    Bits(Vec<bool>),
}

impl BatchData {
    fn len(&self) -> usize {
        match self {
            BatchData::Words(w) => w.len(),
            BatchData::Bits(b) => b.len(),
        }
    }

    fn is_bit(&self) -> bool {
        matches!(self, BatchData::Bits(_))
    }
}

/// Batch write of one contiguous run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchWriteCommand {
    head: DeviceAddress,
    data: BatchData,
}

impl BatchWriteCommand {
    /// Creates a batch write.
    ///
    /// # Errors
    ///
    /// `InvalidParameter` for empty data, `SizeExceeded` above 949 words or
    /// 3584 bits.
    pub fn new(head: DeviceAddress, data: BatchData) -> Result<Self> {
        let name = if data.is_bit() { "batch write bits" } else { "batch write" };
        check_batch_count(name, data.len(), data.is_bit())?;
        Ok(Self { head, data })
    }

    /// Serializes the command.
    pub fn to_request(&self, codec: Codec) -> Result<Request> {
        let mut payload = Vec::with_capacity(codec.word_size() + self.data.len() * 2);
        codec.put_word(&mut payload, self.head, self.data.len() as u16)?;
        match &self.data {
            BatchData::Words(words) => payload.put_slice(&words_to_bytes(words)),
            BatchData::Bits(bits) => payload.put_slice(&pack_bits(bits)),
        }
        Ok(Request::new(CMD_BATCH_WRITE, codec.subcommand(self.data.is_bit()), payload))
    }
}

fn check_batch_count(command: &'static str, count: usize, bit: bool) -> Result<u16> {
    let limit = if bit { MAX_BATCH_BITS } else { MAX_BATCH_WORDS };
    if count == 0 {
        return Err(SlmpError::invalid_parameter("count", "must be greater than 0"));
    }
    if count > limit {
        return Err(SlmpError::size_exceeded(command, count, limit));
    }
    Ok(count as u16)
}

fn check_random_count(command: &'static str, count: usize) -> Result<()> {
    if count == 0 {
        return Err(SlmpError::invalid_parameter("devices", "at least one device is required"));
    }
    if count > MAX_RANDOM_POINTS {
        return Err(SlmpError::size_exceeded(command, count, MAX_RANDOM_POINTS));
    }
    Ok(())
}

/// Values returned by a random read or a monitor poll.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RandomReadResult {
    /// Word values, in request order.
    pub words: Vec<u16>,
    /// Double-word values, in request order.
    pub dwords: Vec<u32>,
}

/// Random read of individually addressed words and double words.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RandomReadCommand {
    words: Vec<DeviceAddress>,
    dwords: Vec<DeviceAddress>,
}

impl RandomReadCommand {
    /// Creates a random read.
    ///
    /// # Errors
    ///
    /// `InvalidParameter` when both lists are empty, `SizeExceeded` above 94
    /// elements in total.
    pub fn new(words: Vec<DeviceAddress>, dwords: Vec<DeviceAddress>) -> Result<Self> {
        check_random_count("random read", words.len() + dwords.len())?;
        Ok(Self { words, dwords })
    }

    /// Number of word and double-word elements.
    pub fn counts(&self) -> (usize, usize) {
        (self.words.len(), self.dwords.len())
    }

    fn payload(&self, codec: Codec) -> Result<Vec<u8>> {
        let mut payload =
            Vec::with_capacity(2 + (self.words.len() + self.dwords.len()) * codec.device_size());
        payload.put_u8(self.words.len() as u8);
        payload.put_u8(self.dwords.len() as u8);
        for &address in self.words.iter().chain(&self.dwords) {
            codec.put_device(&mut payload, address)?;
        }
        Ok(payload)
    }

    /// Serializes the command.
    pub fn to_request(&self, codec: Codec) -> Result<Request> {
        Ok(Request::new(CMD_RANDOM_READ, codec.subcommand(false), self.payload(codec)?))
    }

    /// Serializes the same address set as a monitor registration.
    pub fn to_monitor_register(&self, codec: Codec) -> Result<Request> {
        Ok(Request::new(CMD_MONITOR_REGISTER, codec.subcommand(false), self.payload(codec)?))
    }

    /// Expected response payload length.
    pub fn response_len(&self) -> usize {
        random_read_len(self.words.len(), self.dwords.len())
    }

    /// Decodes a validated payload.
    pub fn decode(&self, payload: &[u8]) -> RandomReadResult {
        decode_random_read(payload, self.words.len(), self.dwords.len())
    }
}

/// Payload length of a random read answering `words` and `dwords` elements.
pub fn random_read_len(words: usize, dwords: usize) -> usize {
    words * 2 + dwords * 4
}

/// Splits a random read payload into words followed by double words.
pub fn decode_random_read(payload: &[u8], words: usize, dwords: usize) -> RandomReadResult {
    let (word_bytes, dword_bytes) = payload.split_at((words * 2).min(payload.len()));
    RandomReadResult {
        words: bytes_to_words(word_bytes),
        dwords: dword_bytes
            .chunks_exact(4)
            .take(dwords)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
    }
}

/// Random write of individually addressed words and double words.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RandomWriteCommand {
    words: Vec<(DeviceAddress, u16)>,
    dwords: Vec<(DeviceAddress, u32)>,
}

impl RandomWriteCommand {
    /// Creates a random write.
    ///
    /// # Errors
    ///
    /// `InvalidParameter` when both lists are empty, `SizeExceeded` above 94
    /// elements in total.
    pub fn new(words: Vec<(DeviceAddress, u16)>, dwords: Vec<(DeviceAddress, u32)>) -> Result<Self> {
        check_random_count("random write", words.len() + dwords.len())?;
        Ok(Self { words, dwords })
    }

    /// Serializes the command.
    pub fn to_request(&self, codec: Codec) -> Result<Request> {
        let mut payload = Vec::with_capacity(
            2 + self.words.len() * codec.word_size() + self.dwords.len() * codec.dword_size(),
        );
        payload.put_u8(self.words.len() as u8);
        payload.put_u8(self.dwords.len() as u8);
        for &(address, value) in &self.words {
            codec.put_word(&mut payload, address, value)?;
        }
        for &(address, value) in &self.dwords {
            codec.put_dword(&mut payload, address, value)?;
        }
        Ok(Request::new(CMD_RANDOM_WRITE, codec.subcommand(false), payload))
    }
}

/// Random write of individually addressed bits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RandomWriteBitsCommand {
    bits: Vec<(DeviceAddress, bool)>,
}

impl RandomWriteBitsCommand {
    /// Creates a random bit write.
    ///
    /// # Errors
    ///
    /// `InvalidParameter` when empty, `SizeExceeded` above 94 bits.
    pub fn new(bits: Vec<(DeviceAddress, bool)>) -> Result<Self> {
        check_random_count("random write bits", bits.len())?;
        Ok(Self { bits })
    }

    /// Serializes the command.
    pub fn to_request(&self, codec: Codec) -> Result<Request> {
        let mut payload = Vec::with_capacity(1 + self.bits.len() * codec.bit_size());
        payload.put_u8(self.bits.len() as u8);
        for &(address, value) in &self.bits {
            codec.put_bit(&mut payload, address, value)?;
        }
        Ok(Request::new(CMD_RANDOM_WRITE, codec.subcommand(true), payload))
    }
}

/// One contiguous run of a block read.
///
/// For bit devices `points` counts 16-bit words, not bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockSpec {
    /// First device of the run.
    pub head: DeviceAddress,
    /// Number of words in the run.
    pub points: u16,
}

impl BlockSpec {
    /// Creates a block read run.
    pub fn new(head: DeviceAddress, points: u16) -> Self {
        Self { head, points }
    }
}

/// One contiguous run of a block write.
///
/// Bit device blocks carry 16 bits per value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockData {
    /// First device of the run.
    pub head: DeviceAddress,
    /// Values to write.
    pub values: Vec<u16>,
}

impl BlockData {
    /// Creates block data.
    pub fn new(head: DeviceAddress, values: Vec<u16>) -> Self {
        Self { head, values }
    }
}

fn check_blocks(command: &'static str, points: impl Iterator<Item = usize>) -> Result<usize> {
    let mut blocks = 0;
    let mut total = 0;
    for p in points {
        if p == 0 {
            return Err(SlmpError::invalid_parameter("points", "every block needs at least one point"));
        }
        blocks += 1;
        total += p;
    }
    if blocks == 0 {
        return Err(SlmpError::invalid_parameter("blocks", "at least one block is required"));
    }
    if blocks > MAX_BLOCKS {
        return Err(SlmpError::size_exceeded(command, blocks, MAX_BLOCKS));
    }
    if total > MAX_BLOCK_POINTS {
        return Err(SlmpError::size_exceeded(command, total, MAX_BLOCK_POINTS));
    }
    Ok(total)
}

/// Values returned by a block read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockReadResult {
    /// One vector per word block, in request order.
    pub words: Vec<Vec<u16>>,
    /// One vector per bit block (16 bits per value), in request order.
    pub bits: Vec<Vec<u16>>,
}

/// Block read of several contiguous runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockReadCommand {
    words: Vec<BlockSpec>,
    bits: Vec<BlockSpec>,
    total: usize,
}

impl BlockReadCommand {
    /// Creates a block read.
    ///
    /// # Errors
    ///
    /// `InvalidParameter` for no blocks or an empty block, `SizeExceeded`
    /// above 94 blocks or 949 points.
    pub fn new(words: Vec<BlockSpec>, bits: Vec<BlockSpec>) -> Result<Self> {
        let total = check_blocks(
            "block read",
            words.iter().chain(&bits).map(|b| b.points as usize),
        )?;
        Ok(Self { words, bits, total })
    }

    /// Serializes the command.
    pub fn to_request(&self, codec: Codec) -> Result<Request> {
        let mut payload = Vec::with_capacity(2 + (self.words.len() + self.bits.len()) * codec.word_size());
        payload.put_u8(self.words.len() as u8);
        payload.put_u8(self.bits.len() as u8);
        for block in self.words.iter().chain(&self.bits) {
            codec.put_word(&mut payload, block.head, block.points)?;
        }
        Ok(Request::new(CMD_BLOCK_READ, codec.subcommand(false), payload))
    }

    /// Expected response payload length.
    pub fn response_len(&self) -> usize {
        self.total * 2
    }

    /// Slices a validated payload into per-block values.
    pub fn decode(&self, payload: &[u8]) -> BlockReadResult {
        let all = bytes_to_words(payload);
        let mut rest = all.as_slice();
        let mut take = |points: u16| {
            let (head, tail) = rest.split_at((points as usize).min(rest.len()));
            rest = tail;
            head.to_vec()
        };
        let words = self.words.iter().map(|b| take(b.points)).collect();
        let bits = self.bits.iter().map(|b| take(b.points)).collect();
        BlockReadResult { words, bits }
    }
}

/// Block write of several contiguous runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockWriteCommand {
    words: Vec<BlockData>,
    bits: Vec<BlockData>,
}

impl BlockWriteCommand {
    /// Creates a block write.
    ///
    /// # Errors
    ///
    /// `InvalidParameter` for no blocks or an empty block, `SizeExceeded`
    /// above 94 blocks or 949 points.
    pub fn new(words: Vec<BlockData>, bits: Vec<BlockData>) -> Result<Self> {
        check_blocks("block write", words.iter().chain(&bits).map(|b| b.values.len()))?;
        Ok(Self { words, bits })
    }

    /// Serializes the command.
    pub fn to_request(&self, codec: Codec) -> Result<Request> {
        let mut payload = Vec::new();
        payload.put_u8(self.words.len() as u8);
        payload.put_u8(self.bits.len() as u8);
        for block in self.words.iter().chain(&self.bits) {
            codec.put_word(&mut payload, block.head, block.values.len() as u16)?;
            payload.put_slice(&words_to_bytes(&block.values));
        }
        Ok(Request::new(CMD_BLOCK_WRITE, codec.subcommand(false), payload))
    }
}
