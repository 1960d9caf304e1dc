//! In-memory links for exercising sessions and clients without sockets.

use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::codec::Codec;
use crate::device::{Device, DeviceAddress};
use crate::response::make_response;
use crate::transport::{Connector, Link};
use crate::utils::{bytes_to_words, get_bits, pack_bits, set_bits, unpack_bits};

/// Scripted connect result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    /// Fail with `ConnectionRefused`.
    Refuse,
    /// Never complete.
    Hang,
}

enum Script {
    Fail(Outcome),
    Accept(MockLink),
}

/// Connector that replays a script; refuses once the script is spent.
pub(crate) struct MockConnector {
    script: Mutex<VecDeque<Script>>,
    attempts: Arc<AtomicU32>,
}

impl MockConnector {
    fn new(script: VecDeque<Script>) -> Self {
        Self {
            script: Mutex::new(script),
            attempts: Arc::new(AtomicU32::new(0)),
        }
    }

    pub(crate) fn scripted(outcomes: Vec<Outcome>) -> Self {
        Self::new(outcomes.into_iter().map(Script::Fail).collect())
    }

    /// One successful connect.
    pub(crate) fn single() -> (Self, PlcHandle) {
        let (connector, mut plcs) = Self::links(1);
        let plc = plcs.remove(0);
        (connector, plc)
    }

    /// `n` successful connects, one PLC handle per link.
    pub(crate) fn links(n: usize) -> (Self, Vec<PlcHandle>) {
        let mut script = VecDeque::new();
        let mut plcs = Vec::new();
        for _ in 0..n {
            let (link, plc) = pair();
            script.push_back(Script::Accept(link));
            plcs.push(plc);
        }
        (Self::new(script), plcs)
    }

    pub(crate) fn attempts(&self) -> Arc<AtomicU32> {
        Arc::clone(&self.attempts)
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self) -> io::Result<Box<dyn Link>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().ok().and_then(|mut s| s.pop_front());
        match next {
            Some(Script::Accept(link)) => Ok(Box::new(link)),
            Some(Script::Fail(Outcome::Hang)) => std::future::pending().await,
            Some(Script::Fail(Outcome::Refuse)) | None => {
                Err(io::Error::new(io::ErrorKind::ConnectionRefused, "refused"))
            }
        }
    }

    fn peer(&self) -> String {
        "mock".to_string()
    }
}

/// Client side of an in-memory link.
pub(crate) struct MockLink {
    sent: mpsc::UnboundedSender<Vec<u8>>,
    incoming: mpsc::UnboundedReceiver<Vec<u8>>,
}

#[async_trait]
impl Link for MockLink {
    async fn send(&mut self, frame: &[u8]) -> io::Result<()> {
        self.sent
            .send(frame.to_vec())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "peer gone"))
    }

    async fn recv(&mut self) -> io::Result<Vec<u8>> {
        self.incoming
            .recv()
            .await
            .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "peer gone"))
    }
}

/// PLC side of an in-memory link. Dropping it closes the link.
pub(crate) struct PlcHandle {
    sent: mpsc::UnboundedReceiver<Vec<u8>>,
    reply: mpsc::UnboundedSender<Vec<u8>>,
}

impl PlcHandle {
    /// Next frame written by the client.
    pub(crate) async fn next_frame(&mut self) -> Vec<u8> {
        self.sent.recv().await.unwrap_or_default()
    }

    /// A frame already written by the client, if any.
    pub(crate) fn try_frame(&mut self) -> Option<Vec<u8>> {
        self.sent.try_recv().ok()
    }

    /// Delivers a frame to the client.
    pub(crate) fn reply(&self, frame: Vec<u8>) {
        let _ = self.reply.send(frame);
    }

    /// Answers every request with `handler` until the client goes away.
    pub(crate) fn serve<F>(mut self, mut handler: F) -> tokio::task::JoinHandle<()>
    where
        F: FnMut(&[u8]) -> Vec<u8> + Send + 'static,
    {
        tokio::spawn(async move {
            while let Some(frame) = self.sent.recv().await {
                self.reply(handler(&frame));
            }
        })
    }
}

fn pair() -> (MockLink, PlcHandle) {
    let (sent_tx, sent_rx) = mpsc::unbounded_channel();
    let (reply_tx, reply_rx) = mpsc::unbounded_channel();
    (
        MockLink {
            sent: sent_tx,
            incoming: reply_rx,
        },
        PlcHandle {
            sent: sent_rx,
            reply: reply_tx,
        },
    )
}

/// Minimal SLMP server over a bit-addressed memory image.
///
/// Each device is one little-endian bit stream; index `i` of a device starts
/// at bit `i * unit_bits`. Word runs step 16 bits through the stream, so a
/// bit device read in word units returns 16 consecutive bits per word.
pub(crate) struct FakePlc {
    name: String,
    memory: HashMap<Device, Vec<u8>>,
    monitor: Vec<(DeviceAddress, u32)>,
    /// Command codes received, in order.
    pub(crate) log: Vec<u16>,
    /// End code forced on the next response.
    pub(crate) fail_next: Option<u16>,
}

/// Cursor over a request body.
struct Body<'a> {
    codec: Codec,
    buf: &'a [u8],
    at: usize,
}

impl Body<'_> {
    fn u8(&mut self) -> usize {
        let v = self.buf[self.at];
        self.at += 1;
        v as usize
    }

    fn u16(&mut self) -> u16 {
        let v = u16::from_le_bytes([self.buf[self.at], self.buf[self.at + 1]]);
        self.at += 2;
        v
    }

    fn device(&mut self) -> Option<DeviceAddress> {
        let size = self.codec.device_size();
        let a = self.codec.decode_address(&self.buf[self.at..self.at + size]).ok()?;
        self.at += size;
        Some(a)
    }

    /// Device plus 16-bit value (word entries and block heads).
    fn word_entry(&mut self) -> Option<(DeviceAddress, u16)> {
        match self.codec {
            Codec::Standard => {
                let a = self.device()?;
                Some((a, self.u16()))
            }
            Codec::Extended => {
                let index = u32::from_le_bytes(self.buf[self.at..self.at + 4].try_into().ok()?);
                let code = self.buf[self.at + 4];
                self.at += 6;
                let a = DeviceAddress::from_code(code, index).ok()?;
                Some((a, self.u16()))
            }
        }
    }

    fn dword_entry(&mut self) -> Option<(DeviceAddress, u32)> {
        match self.codec {
            Codec::Standard => {
                let a = self.device()?;
                let lo = u32::from(self.u16());
                let hi = u32::from(self.u16());
                Some((a, lo | hi << 16))
            }
            Codec::Extended => {
                let (a, lo) = self.word_entry()?;
                let hi = self.u16();
                Some((a, u32::from(lo) | u32::from(hi) << 16))
            }
        }
    }

    fn bit_entry(&mut self) -> Option<(DeviceAddress, bool)> {
        match self.codec {
            Codec::Standard => {
                let a = self.device()?;
                Some((a, self.u8() != 0))
            }
            Codec::Extended => self.word_entry().map(|(a, v)| (a, v != 0)),
        }
    }

    fn rest(&self) -> &[u8] {
        &self.buf[self.at..]
    }
}

impl FakePlc {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            memory: HashMap::new(),
            monitor: Vec::new(),
            log: Vec::new(),
            fail_next: None,
        }
    }

    /// Serves `plc` from a shared instance and returns that instance.
    pub(crate) fn serve(self, plc: PlcHandle) -> Arc<Mutex<FakePlc>> {
        let shared = Arc::new(Mutex::new(self));
        let inner = Arc::clone(&shared);
        plc.serve(move |frame| match inner.lock() {
            Ok(mut fake) => fake.handle(frame),
            Err(_) => make_response(0xFFFF, &[]),
        });
        shared
    }

    fn stream(&mut self, device: Device, end_bit: usize) -> &mut Vec<u8> {
        let mem = self.memory.entry(device).or_default();
        let bytes = end_bit.div_ceil(8);
        if mem.len() < bytes {
            mem.resize(bytes, 0);
        }
        mem
    }

    fn offset(address: DeviceAddress) -> usize {
        address.index as usize * address.device.unit_bits() as usize
    }

    /// Reads `width` bits starting at `address`.
    pub(crate) fn get(&mut self, address: DeviceAddress, width: u32) -> u64 {
        let offset = Self::offset(address);
        let mem = self.stream(address.device, offset + width as usize);
        get_bits(mem, offset, width)
    }

    /// Writes `width` bits starting at `address`.
    pub(crate) fn set(&mut self, address: DeviceAddress, width: u32, value: u64) {
        let offset = Self::offset(address);
        let mem = self.stream(address.device, offset + width as usize);
        set_bits(mem, offset, width, value);
    }

    fn run_word(&mut self, head: DeviceAddress, n: usize) -> u16 {
        let offset = Self::offset(head) + n * 16;
        let mem = self.stream(head.device, offset + 16);
        get_bits(mem, offset, 16) as u16
    }

    fn set_run_word(&mut self, head: DeviceAddress, n: usize, value: u16) {
        let offset = Self::offset(head) + n * 16;
        let mem = self.stream(head.device, offset + 16);
        set_bits(mem, offset, 16, u64::from(value));
    }

    pub(crate) fn handle(&mut self, frame: &[u8]) -> Vec<u8> {
        let command = u16::from_le_bytes([frame[11], frame[12]]);
        let sub = u16::from_le_bytes([frame[13], frame[14]]);
        self.log.push(command);
        if let Some(code) = self.fail_next.take() {
            return make_response(code, &[0x00, 0xFF]);
        }
        let mut body = Body {
            codec: if sub & 0x02 != 0 { Codec::Extended } else { Codec::Standard },
            buf: &frame[15..],
            at: 0,
        };
        let bit = sub & 0x01 != 0;

        let payload = match command {
            0x0101 => {
                let mut out = format!("{:<16}", self.name).into_bytes();
                out.truncate(16);
                out.extend_from_slice(&0x4800u16.to_le_bytes());
                Some(out)
            }
            0x0619 => Some(body.rest().to_vec()),
            0x1001 | 0x1002 | 0x1003 | 0x1005 | 0x1006 | 0x1617 | 0x1630 | 0x1631 => Some(Vec::new()),
            0x0401 => self.batch_read(&mut body, bit),
            0x1401 => self.batch_write(&mut body, bit),
            0x0403 => self.random_entries(&mut body).map(|e| self.read_entries(&e)),
            0x0801 => self.random_entries(&mut body).map(|e| {
                self.monitor = e;
                Vec::new()
            }),
            0x0802 if !self.monitor.is_empty() => {
                let entries = self.monitor.clone();
                Some(self.read_entries(&entries))
            }
            0x1402 if bit => self.random_write_bits(&mut body),
            0x1402 => self.random_write(&mut body),
            0x0406 => self.block_read(&mut body),
            0x1406 => self.block_write(&mut body),
            _ => None,
        };

        match payload {
            Some(payload) => make_response(0, &payload),
            None => make_response(0xC059, &[]),
        }
    }

    fn batch_read(&mut self, body: &mut Body<'_>, bit: bool) -> Option<Vec<u8>> {
        let (head, count) = body.word_entry()?;
        let count = count as usize;
        if bit {
            let mut bits = Vec::with_capacity(count);
            for i in 0..count {
                bits.push(self.get(head.offset(i as u32).ok()?, 1) != 0);
            }
            Some(pack_bits(&bits))
        } else {
            Some((0..count).flat_map(|i| self.run_word(head, i).to_le_bytes()).collect())
        }
    }

    fn batch_write(&mut self, body: &mut Body<'_>, bit: bool) -> Option<Vec<u8>> {
        let (head, count) = body.word_entry()?;
        let count = count as usize;
        if bit {
            for (i, v) in unpack_bits(body.rest(), count).into_iter().enumerate() {
                self.set(head.offset(i as u32).ok()?, 1, u64::from(v));
            }
        } else {
            for (i, w) in bytes_to_words(body.rest()).into_iter().take(count).enumerate() {
                self.set_run_word(head, i, w);
            }
        }
        Some(Vec::new())
    }

    fn random_entries(&mut self, body: &mut Body<'_>) -> Option<Vec<(DeviceAddress, u32)>> {
        let words = body.u8();
        let dwords = body.u8();
        let mut entries = Vec::with_capacity(words + dwords);
        for i in 0..words + dwords {
            entries.push((body.device()?, if i < words { 16 } else { 32 }));
        }
        Some(entries)
    }

    fn read_entries(&mut self, entries: &[(DeviceAddress, u32)]) -> Vec<u8> {
        let mut words = Vec::new();
        let mut dwords = Vec::new();
        for &(a, width) in entries {
            let v = self.get(a, width);
            if width == 16 {
                words.extend_from_slice(&(v as u16).to_le_bytes());
            } else {
                dwords.extend_from_slice(&(v as u32).to_le_bytes());
            }
        }
        words.extend(dwords);
        words
    }

    fn random_write(&mut self, body: &mut Body<'_>) -> Option<Vec<u8>> {
        let words = body.u8();
        let dwords = body.u8();
        for _ in 0..words {
            let (a, v) = body.word_entry()?;
            self.set(a, 16, u64::from(v));
        }
        for _ in 0..dwords {
            let (a, v) = body.dword_entry()?;
            self.set(a, 32, u64::from(v));
        }
        Some(Vec::new())
    }

    fn random_write_bits(&mut self, body: &mut Body<'_>) -> Option<Vec<u8>> {
        let n = body.u8();
        for _ in 0..n {
            let (a, v) = body.bit_entry()?;
            self.set(a, 1, u64::from(v));
        }
        Some(Vec::new())
    }

    fn block_read(&mut self, body: &mut Body<'_>) -> Option<Vec<u8>> {
        let blocks = body.u8() + body.u8();
        let mut out = Vec::new();
        for _ in 0..blocks {
            let (head, points) = body.word_entry()?;
            for p in 0..points as usize {
                out.extend_from_slice(&self.run_word(head, p).to_le_bytes());
            }
        }
        Some(out)
    }

    fn block_write(&mut self, body: &mut Body<'_>) -> Option<Vec<u8>> {
        let blocks = body.u8() + body.u8();
        for _ in 0..blocks {
            let (head, points) = body.word_entry()?;
            for p in 0..points as usize {
                let w = body.u16();
                self.set_run_word(head, p, w);
            }
        }
        Some(Vec::new())
    }
}
