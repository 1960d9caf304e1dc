//! Grouping optimizer.
//!
//! Turns an arbitrary set of [`Variable`]s into a short, ordered list of SLMP
//! calls. Variables are grouped per device and swept in address order; each
//! contiguous run either becomes a block or is split back into individually
//! addressed (random) elements.
//!
//! # Runs
//!
//! Distances are measured in bits, so bit, word and double-word devices share
//! one sweep. A variable extends the current run when it starts at most
//! [`READ_GAP_TOLERANCE`] bits after the run's end (reads) or exactly at its
//! end (writes; a write never touches an address nobody asked for). A closed
//! run longer than [`BLOCK_THRESHOLD`] bits becomes a block; anything shorter
//! is cheaper as random entries.
//!
//! # Call order
//!
//! | Direction | Calls, in order |
//! |-----------|-----------------|
//! | Write | random bit write, one batch bit write per bit run, block write of word runs, random write |
//! | Read | block read of word runs, bit runs and single bits, random read |
//!
//! Every family is split into as many calls as its per-call ceilings require.
//! Calls run strictly one after another.
//!
//! # Example
//!
//! ```
//! use melsec_slmp::{CommandPlan, Direction, ElementType, PlannedCommand, Variable};
//!
//! let vars = vec![
//!     Variable::scalar("a", "D10".parse()?, ElementType::Word)?,
//!     Variable::scalar("b", "D11".parse()?, ElementType::Word)?,
//!     Variable::scalar("c", "D12".parse()?, ElementType::Word)?,
//! ];
//! let plan = CommandPlan::new(Direction::Read, vars)?;
//! assert_eq!(plan.len(), 1);
//! assert!(matches!(plan.commands().next(), Some(PlannedCommand::BlockRead { .. })));
//! # Ok::<(), melsec_slmp::SlmpError>(())
//! ```

use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::debug;

use crate::client::Client;
use crate::command::{
    BlockData, BlockSpec, MAX_BATCH_BITS, MAX_BATCH_WORDS, MAX_BLOCKS, MAX_BLOCK_POINTS, MAX_RANDOM_POINTS,
};
use crate::device::{Device, DeviceAddress};
use crate::error::{Result, SlmpError};
use crate::utils::{bytes_to_words, get_bits, words_to_bytes};
use crate::variable::{Direction, Topic, Value, Variable};

/// Largest gap, in bits, a read run bridges.
pub const READ_GAP_TOLERANCE: u64 = 16;

/// Runs longer than this many bits become blocks.
pub const BLOCK_THRESHOLD: u64 = 40;

/// One SLMP call of a plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlannedCommand {
    /// Random bit write, one entry per address.
    RandomWriteBits(Vec<DeviceAddress>),
    /// Batch bit write of one run.
    BatchWriteBits {
        /// First bit of the run.
        head: DeviceAddress,
        /// Number of bits.
        count: usize,
    },
    /// Block write.
    BlockWrite {
        /// Word device blocks.
        words: Vec<BlockSpec>,
        /// Bit device blocks.
        bits: Vec<BlockSpec>,
    },
    /// Random word and double-word write.
    RandomWrite {
        /// Word entries.
        words: Vec<DeviceAddress>,
        /// Double-word entries.
        dwords: Vec<DeviceAddress>,
    },
    /// Block read.
    BlockRead {
        /// Word device blocks.
        words: Vec<BlockSpec>,
        /// Bit device blocks.
        bits: Vec<BlockSpec>,
    },
    /// Random word and double-word read.
    RandomRead {
        /// Word entries.
        words: Vec<DeviceAddress>,
        /// Double-word entries.
        dwords: Vec<DeviceAddress>,
    },
}

impl PlannedCommand {
    /// Width of the call's data as a bit stream.
    fn stream_bits(&self) -> usize {
        let points = |blocks: &[BlockSpec]| blocks.iter().map(|b| b.points as usize * 16).sum::<usize>();
        match self {
            PlannedCommand::RandomWriteBits(addresses) => addresses.len(),
            PlannedCommand::BatchWriteBits { count, .. } => *count,
            PlannedCommand::BlockWrite { words, bits } | PlannedCommand::BlockRead { words, bits } => {
                points(words) + points(bits)
            }
            PlannedCommand::RandomWrite { words, dwords } | PlannedCommand::RandomRead { words, dwords } => {
                words.len() * 16 + dwords.len() * 32
            }
        }
    }
}

/// Elements `first..first + count` of variable `var`, at bit `offset` of a
/// call's data stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Slot {
    var: usize,
    first: usize,
    count: usize,
    offset: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct PlannedCall {
    command: PlannedCommand,
    slots: Vec<Slot>,
}

/// Ordered list of calls for one variable set and direction.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandPlan {
    direction: Direction,
    variables: Vec<Variable>,
    calls: Vec<PlannedCall>,
}

/// Read and write plans of a topic set.
#[derive(Debug, Clone, PartialEq)]
pub struct TopicPlans {
    /// Plan over every variable of the read topics.
    pub read: CommandPlan,
    /// Plan over every variable of the write topics.
    pub write: CommandPlan,
}

/// Plans all topics, merging topics of the same direction.
///
/// Every read topic lands in one read plan and every write topic in one
/// write plan, so a single `read` call refreshes all read topics at once
/// and per-topic rates are not kept apart. A variable named in several
/// topics is transferred once. Use [`CommandPlan::for_topic`] to plan
/// topics separately.
pub fn plan_topics(topics: &[Topic]) -> Result<TopicPlans> {
    let collect = |direction: Direction| {
        topics
            .iter()
            .filter(|t| t.direction == direction)
            .flat_map(|t| t.variables.iter().cloned())
            .collect::<Vec<_>>()
    };
    Ok(TopicPlans {
        read: CommandPlan::new(Direction::Read, collect(Direction::Read))?,
        write: CommandPlan::new(Direction::Write, collect(Direction::Write))?,
    })
}

impl CommandPlan {
    /// Plans the calls transferring `variables` in `direction`.
    ///
    /// Variables are keyed by name; later duplicates are dropped.
    ///
    /// # Errors
    ///
    /// `SizeExceeded` for a variable larger than one batch of its device
    /// class (3584 bits or 949 words).
    pub fn new(direction: Direction, variables: Vec<Variable>) -> Result<Self> {
        let mut seen = HashSet::new();
        let variables: Vec<Variable> = variables
            .into_iter()
            .filter(|v| seen.insert(v.name.clone()))
            .collect();

        let groups = Groups::sweep(direction, &variables)?;
        let calls = match direction {
            Direction::Read => groups.read_calls(&variables)?,
            Direction::Write => groups.write_calls(&variables)?,
        };
        debug!(
            ?direction,
            variables = variables.len(),
            calls = calls.len(),
            "command plan built"
        );
        Ok(Self {
            direction,
            variables,
            calls,
        })
    }

    /// Plans a single topic.
    pub fn for_topic(topic: &Topic) -> Result<Self> {
        Self::new(topic.direction, topic.variables.clone())
    }

    /// Direction of the plan.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Variables covered by the plan.
    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    /// Calls in execution order.
    pub fn commands(&self) -> impl Iterator<Item = &PlannedCommand> {
        self.calls.iter().map(|c| &c.command)
    }

    /// Number of calls.
    pub fn len(&self) -> usize {
        self.calls.len()
    }

    /// Returns `true` if the plan issues no call.
    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    fn check_direction(&self, direction: Direction) -> Result<()> {
        if self.direction != direction {
            return Err(SlmpError::invalid_parameter(
                "plan",
                format!("a {:?} plan cannot be used to {:?}", self.direction, direction),
            ));
        }
        Ok(())
    }

    /// Executes a read plan and returns the values of every variable.
    ///
    /// # Errors
    ///
    /// The first failing call aborts the plan; nothing is retried.
    pub async fn read(&self, client: &Client) -> Result<HashMap<String, Vec<Value>>> {
        self.check_direction(Direction::Read)?;
        let mut values: Vec<Vec<Value>> = self
            .variables
            .iter()
            .map(|v| vec![v.element_type.zero(); v.len()])
            .collect();

        for call in &self.calls {
            let stream = match &call.command {
                PlannedCommand::BlockRead { words, bits } => {
                    let result = client.block_read(words, bits).await?;
                    let all: Vec<u16> = result.words.into_iter().chain(result.bits).flatten().collect();
                    words_to_bytes(&all)
                }
                PlannedCommand::RandomRead { words, dwords } => {
                    let result = client.random_read(words, dwords).await?;
                    let mut stream = words_to_bytes(&result.words);
                    stream.extend(result.dwords.iter().flat_map(|d| d.to_le_bytes()));
                    stream
                }
                other => return Err(misplaced(other)),
            };
            for slot in &call.slots {
                let v = &self.variables[slot.var];
                let width = v.element_type.bits() as usize;
                for k in 0..slot.count {
                    values[slot.var][slot.first + k] = v.decode_element(&stream, slot.offset + k * width);
                }
            }
        }

        Ok(self.variables.iter().map(|v| v.name.clone()).zip(values).collect())
    }

    /// Executes a write plan.
    ///
    /// Every variable of the plan needs a value list in `values`; all lists
    /// are checked before the first call goes out.
    ///
    /// # Errors
    ///
    /// `InvalidParameter` for a missing or mistyped value list, otherwise the
    /// error of the first failing call.
    pub async fn write(&self, client: &Client, values: &HashMap<String, Vec<Value>>) -> Result<()> {
        self.check_direction(Direction::Write)?;
        let mut inputs = Vec::with_capacity(self.variables.len());
        for v in &self.variables {
            let list = values
                .get(&v.name)
                .ok_or_else(|| SlmpError::invalid_parameter(&v.name, "no value supplied"))?;
            v.check_values(list)?;
            inputs.push(list.as_slice());
        }

        for call in &self.calls {
            let mut stream = vec![0u8; call.command.stream_bits().div_ceil(8)];
            for slot in &call.slots {
                let v = &self.variables[slot.var];
                let width = v.element_type.bits() as usize;
                for k in 0..slot.count {
                    v.encode_element(&inputs[slot.var][slot.first + k], &mut stream, slot.offset + k * width);
                }
            }
            let bit = |i: usize| get_bits(&stream, i, 1) != 0;

            match &call.command {
                PlannedCommand::RandomWriteBits(addresses) => {
                    let bits: Vec<_> = addresses.iter().enumerate().map(|(i, &a)| (a, bit(i))).collect();
                    client.random_write_bits(&bits).await?;
                }
                PlannedCommand::BatchWriteBits { head, count } => {
                    let bits: Vec<bool> = (0..*count).map(bit).collect();
                    client.batch_write_bits(*head, &bits).await?;
                }
                PlannedCommand::BlockWrite { words, bits } => {
                    let all = bytes_to_words(&stream);
                    let mut rest = all.as_slice();
                    let mut take = |spec: &BlockSpec| {
                        let (head, tail) = rest.split_at((spec.points as usize).min(rest.len()));
                        rest = tail;
                        BlockData::new(spec.head, head.to_vec())
                    };
                    let words: Vec<_> = words.iter().map(&mut take).collect();
                    let bits: Vec<_> = bits.iter().map(&mut take).collect();
                    client.block_write(&words, &bits).await?;
                }
                PlannedCommand::RandomWrite { words, dwords } => {
                    let base = words.len() * 16;
                    let words: Vec<_> = words
                        .iter()
                        .enumerate()
                        .map(|(i, &a)| (a, get_bits(&stream, i * 16, 16) as u16))
                        .collect();
                    let dwords: Vec<_> = dwords
                        .iter()
                        .enumerate()
                        .map(|(i, &a)| (a, get_bits(&stream, base + i * 32, 32) as u32))
                        .collect();
                    client.random_write(&words, &dwords).await?;
                }
                other => return Err(misplaced(other)),
            }
        }
        Ok(())
    }
}

fn misplaced(command: &PlannedCommand) -> SlmpError {
    SlmpError::invalid_parameter("plan", format!("{command:?} does not match the plan direction"))
}

/// Whether runs on `device` may become blocks.
///
/// Double-word devices have no block form yet: their runs are folded into
/// random double-word entries. Adding dword block support means changing
/// this check and the block builders, nothing else.
fn block_capable(device: Device) -> bool {
    device.unit_bits() < 32
}

/// Longest run, in bits, for a device class.
fn run_ceiling(device: Device) -> u64 {
    if device.is_bit() {
        MAX_BATCH_BITS as u64
    } else {
        MAX_BATCH_WORDS as u64 * 16
    }
}

/// Contiguous address range of one device.
struct Run {
    head: DeviceAddress,
    start: u64,
    bits: u64,
    members: Vec<(usize, u64)>,
}

impl Run {
    fn new(index: usize, v: &Variable) -> Self {
        Self {
            head: v.address,
            start: v.bit_offset(),
            bits: v.bit_len(),
            members: vec![(index, 0)],
        }
    }

    fn points(&self) -> u16 {
        self.bits.div_ceil(16) as u16
    }

    fn slots(&self, vars: &[Variable]) -> Vec<Slot> {
        self.members
            .iter()
            .map(|&(var, offset)| Slot {
                var,
                first: 0,
                count: vars[var].len(),
                offset: offset as usize,
            })
            .collect()
    }
}

/// One element sent as a random entry.
#[derive(Clone, Copy)]
struct Element {
    var: usize,
    element: usize,
    address: DeviceAddress,
}

impl Element {
    fn slot(&self, offset: usize) -> Slot {
        Slot {
            var: self.var,
            first: self.element,
            count: 1,
            offset,
        }
    }
}

/// Block under construction; slot offsets are relative to the block start.
struct Block {
    spec: BlockSpec,
    bit: bool,
    slots: Vec<Slot>,
}

/// Result of the sweep: block runs per class and random elements per width.
#[derive(Default)]
struct Groups {
    bit_runs: Vec<Run>,
    word_runs: Vec<Run>,
    bits: Vec<Element>,
    words: Vec<Element>,
    dwords: Vec<Element>,
}

impl Groups {
    fn sweep(direction: Direction, vars: &[Variable]) -> Result<Self> {
        let tolerance = match direction {
            Direction::Read => READ_GAP_TOLERANCE,
            Direction::Write => 0,
        };

        let mut by_device: BTreeMap<Device, Vec<usize>> = BTreeMap::new();
        for (i, v) in vars.iter().enumerate() {
            by_device.entry(v.address.device).or_default().push(i);
        }

        let mut groups = Groups::default();
        for (device, mut members) in by_device {
            members.sort_by_key(|&i| vars[i].address.index);
            let ceiling = run_ceiling(device);
            let unit = u64::from(device.unit_bits());

            let mut run: Option<Run> = None;
            for i in members {
                let v = &vars[i];
                if v.bit_len() > ceiling {
                    return Err(SlmpError::size_exceeded(
                        "plan",
                        (v.bit_len() / unit) as usize,
                        (ceiling / unit) as usize,
                    ));
                }
                if let Some(r) = run.as_mut() {
                    let offset = v.bit_offset() - r.start;
                    if offset >= r.bits && offset <= r.bits + tolerance && offset + v.bit_len() <= ceiling {
                        r.members.push((i, offset));
                        r.bits = offset + v.bit_len();
                        continue;
                    }
                }
                if let Some(done) = run.replace(Run::new(i, v)) {
                    groups.close(done, vars)?;
                }
            }
            if let Some(done) = run {
                groups.close(done, vars)?;
            }
        }
        Ok(groups)
    }

    fn close(&mut self, run: Run, vars: &[Variable]) -> Result<()> {
        let device = run.head.device;
        if run.bits > BLOCK_THRESHOLD && block_capable(device) {
            if device.is_bit() {
                self.bit_runs.push(run);
            } else {
                self.word_runs.push(run);
            }
            return Ok(());
        }
        for &(var, _) in &run.members {
            let v = &vars[var];
            for element in 0..v.len() {
                let e = Element {
                    var,
                    element,
                    address: v.element_address(element)?,
                };
                match v.element_type.bits() {
                    1 => self.bits.push(e),
                    16 => self.words.push(e),
                    _ => self.dwords.push(e),
                }
            }
        }
        Ok(())
    }

    fn write_calls(self, vars: &[Variable]) -> Result<Vec<PlannedCall>> {
        let mut calls = Vec::new();

        for chunk in self.bits.chunks(MAX_RANDOM_POINTS) {
            calls.push(PlannedCall {
                command: PlannedCommand::RandomWriteBits(chunk.iter().map(|e| e.address).collect()),
                slots: chunk.iter().enumerate().map(|(i, e)| e.slot(i)).collect(),
            });
        }

        for run in &self.bit_runs {
            calls.push(PlannedCall {
                command: PlannedCommand::BatchWriteBits {
                    head: run.head,
                    count: run.bits as usize,
                },
                slots: run.slots(vars),
            });
        }

        let blocks = self.word_runs.iter().map(|run| Block {
            spec: BlockSpec::new(run.head, run.points()),
            bit: false,
            slots: run.slots(vars),
        });
        calls.extend(block_calls(blocks, Direction::Write));

        calls.extend(random_calls(&self.words, &self.dwords, vars, Direction::Write)?);
        Ok(calls)
    }

    fn read_calls(self, vars: &[Variable]) -> Result<Vec<PlannedCall>> {
        let runs = self.word_runs.iter().chain(&self.bit_runs).map(|run| Block {
            spec: BlockSpec::new(run.head, run.points()),
            bit: run.head.device.is_bit(),
            slots: run.slots(vars),
        });
        // no random bit read exists; single bits ride along as 1-point blocks
        let singles = self.bits.iter().map(|e| Block {
            spec: BlockSpec::new(e.address, 1),
            bit: true,
            slots: vec![e.slot(0)],
        });
        let mut calls = block_calls(runs.chain(singles), Direction::Read);

        calls.extend(random_calls(&self.words, &self.dwords, vars, Direction::Read)?);
        Ok(calls)
    }
}

/// Packs blocks into calls of at most 94 blocks and 949 points.
fn block_calls(blocks: impl Iterator<Item = Block>, direction: Direction) -> Vec<PlannedCall> {
    let mut calls = Vec::new();
    let mut batch: Vec<Block> = Vec::new();
    let mut points = 0;
    for block in blocks {
        let p = block.spec.points as usize;
        if !batch.is_empty() && (batch.len() == MAX_BLOCKS || points + p > MAX_BLOCK_POINTS) {
            calls.push(finish_blocks(std::mem::take(&mut batch), direction));
            points = 0;
        }
        points += p;
        batch.push(block);
    }
    if !batch.is_empty() {
        calls.push(finish_blocks(batch, direction));
    }
    calls
}

fn finish_blocks(batch: Vec<Block>, direction: Direction) -> PlannedCall {
    let (bits, words): (Vec<Block>, Vec<Block>) = batch.into_iter().partition(|b| b.bit);

    // response order: word blocks, then bit blocks
    let mut slots = Vec::new();
    let mut base = 0;
    for block in words.iter().chain(&bits) {
        slots.extend(block.slots.iter().map(|s| Slot {
            offset: base + s.offset,
            ..*s
        }));
        base += block.spec.points as usize * 16;
    }

    let words = words.iter().map(|b| b.spec).collect();
    let bits = bits.iter().map(|b| b.spec).collect();
    let command = match direction {
        Direction::Read => PlannedCommand::BlockRead { words, bits },
        Direction::Write => PlannedCommand::BlockWrite { words, bits },
    };
    PlannedCall { command, slots }
}

/// Packs word and double-word elements into calls of at most 94 entries.
///
/// A 64-bit element takes two consecutive double-word entries.
fn random_calls(
    words: &[Element],
    dwords: &[Element],
    vars: &[Variable],
    direction: Direction,
) -> Result<Vec<PlannedCall>> {
    let entries = |e: &Element| (vars[e.var].element_type.bits() / 32).max(1) as usize;

    let mut calls = Vec::new();
    let mut batch: Vec<(Element, bool)> = Vec::new();
    let mut used = 0;
    let tagged = words.iter().map(|&e| (e, false)).chain(dwords.iter().map(|&e| (e, true)));
    for (e, dword) in tagged {
        let n = entries(&e);
        if used + n > MAX_RANDOM_POINTS {
            calls.push(finish_random(std::mem::take(&mut batch), vars, direction)?);
            used = 0;
        }
        used += n;
        batch.push((e, dword));
    }
    if !batch.is_empty() {
        calls.push(finish_random(batch, vars, direction)?);
    }
    Ok(calls)
}

fn finish_random(batch: Vec<(Element, bool)>, vars: &[Variable], direction: Direction) -> Result<PlannedCall> {
    let mut words = Vec::new();
    let mut dwords = Vec::new();
    let mut slots = Vec::with_capacity(batch.len());

    let word_count = batch.iter().filter(|(_, dword)| !dword).count();
    for (e, dword) in batch {
        if !dword {
            slots.push(e.slot(words.len() * 16));
            words.push(e.address);
            continue;
        }
        slots.push(e.slot(word_count * 16 + dwords.len() * 32));
        let device = e.address.device;
        let v = &vars[e.var];
        let step = 32 / device.unit_bits();
        for part in 0..v.element_type.bits() / 32 {
            dwords.push(e.address.offset(part * step)?);
        }
    }

    let command = match direction {
        Direction::Read => PlannedCommand::RandomRead { words, dwords },
        Direction::Write => PlannedCommand::RandomWrite { words, dwords },
    };
    Ok(PlannedCall { command, slots })
}
