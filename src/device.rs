//! Device definitions for the SLMP protocol.
//!
//! A *device* is a named memory region inside a MELSEC PLC. Each device has a
//! one-byte wire code, a numbering base for its symbolic addresses (decimal or
//! hexadecimal) and an addressing unit: bit devices are addressed one bit per
//! index, word devices one 16-bit word per index and double-word devices one
//! 32-bit value per index.
//!
//! # Device Table
//!
//! | Group | Devices | Base | Unit |
//! |-------|---------|:----:|:----:|
//! | Digital I/O | X, Y | 16 | bit |
//! | Bit relays | M, L, F, V | 10 | bit |
//! | Link relay | B | 16 | bit |
//! | Data registers | D | 10 | word |
//! | Link registers | W | 16 | word |
//! | Special | SB, DX, DY (16) SM (10) | | bit |
//! | Special | SW (16), SD, RD (10) | | word |
//! | File / index | R, Z (10), ZR (16) | | word |
//! | Long index | LZ | 10 | dword |
//! | Timers / counters | TS TC CS CC STS STC (+ long variants) | 10 | bit |
//! | Timer / counter values | TN CN STN | 10 | word |
//! | Long timer / counter values | LTN LCN LSTN | 10 | dword |
//!
//! # Example
//!
//! ```
//! use melsec_slmp::{Device, DeviceAddress};
//!
//! let addr: DeviceAddress = "D100".parse().unwrap();
//! assert_eq!(addr.device, Device::D);
//! assert_eq!(addr.index, 100);
//!
//! // X is numbered in hexadecimal
//! let addr: DeviceAddress = "X1F".parse().unwrap();
//! assert_eq!(addr.index, 0x1F);
//! assert_eq!(addr.to_string(), "X1F");
//! ```

use std::fmt;
use std::str::FromStr;

use crate::error::{Result, SlmpError};

/// Static description of one device.
struct DeviceInfo {
    mnemonic: &'static str,
    code: u8,
    radix: u32,
    size: usize,
}

const fn info(mnemonic: &'static str, code: u8, radix: u32, size: usize) -> DeviceInfo {
    DeviceInfo {
        mnemonic,
        code,
        radix,
        size,
    }
}

// Indexed by `Device as usize`; order must follow the enum.
const DEVICE_TABLE: [DeviceInfo; 38] = [
    info("X", 0x9C, 16, 0),
    info("Y", 0x9D, 16, 0),
    info("M", 0x90, 10, 0),
    info("L", 0x92, 10, 0),
    info("F", 0x93, 10, 0),
    info("V", 0x94, 10, 0),
    info("B", 0xA0, 16, 0),
    info("D", 0xA8, 10, 2),
    info("W", 0xB4, 16, 2),
    info("SB", 0xA1, 16, 0),
    info("SW", 0xB5, 16, 2),
    info("SM", 0x91, 10, 0),
    info("SD", 0xA9, 10, 2),
    info("DX", 0xA2, 16, 0),
    info("DY", 0xA3, 16, 0),
    info("RD", 0x2C, 10, 2),
    info("R", 0xAF, 10, 2),
    info("Z", 0xCC, 10, 2),
    info("LZ", 0x62, 10, 4),
    info("ZR", 0xB0, 16, 2),
    info("TS", 0xC1, 10, 0),
    info("TC", 0xC0, 10, 0),
    info("TN", 0xC2, 10, 2),
    info("LTS", 0x51, 10, 0),
    info("LTC", 0x50, 10, 0),
    info("LTN", 0x52, 10, 4),
    info("CS", 0xC4, 10, 0),
    info("CC", 0xC3, 10, 0),
    info("CN", 0xC5, 10, 2),
    info("LCS", 0x55, 10, 0),
    info("LCC", 0x54, 10, 0),
    info("LCN", 0x56, 10, 4),
    info("STS", 0xC7, 10, 0),
    info("STC", 0xC6, 10, 0),
    info("STN", 0xC8, 10, 2),
    info("LSTS", 0x59, 10, 0),
    info("LSTC", 0x58, 10, 0),
    info("LSTN", 0x5A, 10, 4),
];

/// Devices available in MELSEC PLCs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[allow(missing_docs)]
pub enum Device {
    X,
    Y,
    M,
    L,
    F,
    V,
    B,
    D,
    W,
    SB,
    SW,
    SM,
    SD,
    DX,
    DY,
    RD,
    R,
    Z,
    LZ,
    ZR,
    TS,
    TC,
    TN,
    LTS,
    LTC,
    LTN,
    CS,
    CC,
    CN,
    LCS,
    LCC,
    LCN,
    STS,
    STC,
    STN,
    LSTS,
    LSTC,
    LSTN,
}

impl Device {
    /// Every known device, in table order.
    pub const ALL: [Device; 38] = [
        Device::X,
        Device::Y,
        Device::M,
        Device::L,
        Device::F,
        Device::V,
        Device::B,
        Device::D,
        Device::W,
        Device::SB,
        Device::SW,
        Device::SM,
        Device::SD,
        Device::DX,
        Device::DY,
        Device::RD,
        Device::R,
        Device::Z,
        Device::LZ,
        Device::ZR,
        Device::TS,
        Device::TC,
        Device::TN,
        Device::LTS,
        Device::LTC,
        Device::LTN,
        Device::CS,
        Device::CC,
        Device::CN,
        Device::LCS,
        Device::LCC,
        Device::LCN,
        Device::STS,
        Device::STC,
        Device::STN,
        Device::LSTS,
        Device::LSTC,
        Device::LSTN,
    ];

    fn info(self) -> &'static DeviceInfo {
        &DEVICE_TABLE[self as usize]
    }

    /// Returns the one-byte wire code of this device.
    pub fn code(self) -> u8 {
        self.info().code
    }

    /// Returns the numbering base (10 or 16) of symbolic indices.
    pub fn radix(self) -> u32 {
        self.info().radix
    }

    /// Returns the byte size of one index, 0 for bit-addressed devices.
    pub fn element_size(self) -> usize {
        self.info().size
    }

    /// Returns the number of bits addressed by one index (1, 16 or 32).
    ///
    /// # Example
    ///
    /// ```
    /// use melsec_slmp::Device;
    ///
    /// assert_eq!(Device::M.unit_bits(), 1);
    /// assert_eq!(Device::D.unit_bits(), 16);
    /// assert_eq!(Device::LZ.unit_bits(), 32);
    /// ```
    pub fn unit_bits(self) -> u32 {
        match self.element_size() {
            0 => 1,
            n => n as u32 * 8,
        }
    }

    /// Returns `true` for bit-addressed devices.
    pub fn is_bit(self) -> bool {
        self.element_size() == 0
    }

    /// Returns the symbolic mnemonic, e.g. `"ZR"`.
    pub fn mnemonic(self) -> &'static str {
        self.info().mnemonic
    }

    /// Looks a device up by its wire code.
    ///
    /// # Example
    ///
    /// ```
    /// use melsec_slmp::Device;
    ///
    /// assert_eq!(Device::from_code(0xA8), Some(Device::D));
    /// assert_eq!(Device::from_code(0x00), None);
    /// ```
    pub fn from_code(code: u8) -> Option<Device> {
        Device::ALL.iter().copied().find(|d| d.code() == code)
    }

    /// Looks a device up by its mnemonic (case-insensitive).
    pub fn from_mnemonic(mnemonic: &str) -> Option<Device> {
        Device::ALL
            .iter()
            .copied()
            .find(|d| d.mnemonic().eq_ignore_ascii_case(mnemonic))
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

/// A device plus an index inside it.
///
/// Standard encoding limits the index to 24 bits; extended encoding accepts
/// the full 32-bit range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceAddress {
    /// Device holding the element.
    pub device: Device,
    /// Element index inside the device.
    pub index: u32,
}

impl DeviceAddress {
    /// Creates a new device address.
    pub fn new(device: Device, index: u32) -> Self {
        Self { device, index }
    }

    /// Builds an address from a raw wire code.
    ///
    /// # Errors
    ///
    /// Returns `InvalidAddress` if the code is unknown.
    pub fn from_code(code: u8, index: u32) -> Result<Self> {
        let device = Device::from_code(code)
            .ok_or_else(|| SlmpError::invalid_address(format!("unknown device code 0x{code:02X}")))?;
        Ok(Self::new(device, index))
    }

    /// Returns the wire code of the device.
    pub fn code(&self) -> u8 {
        self.device.code()
    }

    /// Returns the address `n` indices further on.
    ///
    /// # Errors
    ///
    /// Returns `InvalidAddress` when the index overflows.
    pub fn offset(&self, n: u32) -> Result<Self> {
        let index = self
            .index
            .checked_add(n)
            .ok_or_else(|| SlmpError::invalid_address(format!("{self} + {n} overflows")))?;
        Ok(Self::new(self.device, index))
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.device.radix() == 16 {
            write!(f, "{}{:X}", self.device, self.index)
        } else {
            write!(f, "{}{}", self.device, self.index)
        }
    }
}

impl FromStr for DeviceAddress {
    type Err = SlmpError;

    fn from_str(s: &str) -> Result<Self> {
        parse_address(s)
    }
}

/// Parses a symbolic address such as `"D100"`, `"ZR1A0"` or `"LSTN3"`.
///
/// The longest known mnemonic at the start of the text selects the device;
/// the rest must be a valid index in that device's numbering base.
///
/// # Errors
///
/// Returns `InvalidAddress` when no mnemonic matches or the index is invalid.
///
/// # Example
///
/// ```
/// use melsec_slmp::{parse_address, Device};
///
/// let addr = parse_address("dx10").unwrap();
/// assert_eq!(addr.device, Device::DX);
/// assert_eq!(addr.index, 0x10);
///
/// assert!(parse_address("QQ1").is_err());
/// assert!(parse_address("D1A").is_err());
/// ```
pub fn parse_address(text: &str) -> Result<DeviceAddress> {
    let text = text.trim();
    let device = Device::ALL
        .iter()
        .copied()
        .filter(|d| {
            let m = d.mnemonic();
            text.len() >= m.len()
                && text.is_char_boundary(m.len())
                && text[..m.len()].eq_ignore_ascii_case(m)
        })
        .max_by_key(|d| d.mnemonic().len())
        .ok_or_else(|| SlmpError::invalid_address(format!("unknown device in '{text}'")))?;

    let digits = &text[device.mnemonic().len()..];
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(SlmpError::invalid_address(format!("missing or malformed index in '{text}'")));
    }
    let index = u32::from_str_radix(digits, device.radix()).map_err(|_| {
        SlmpError::invalid_address(format!(
            "'{digits}' is not a valid base-{} index for {device}",
            device.radix()
        ))
    })?;
    Ok(DeviceAddress::new(device, index))
}

/// Formats a raw code and index as symbolic text.
///
/// # Errors
///
/// Returns `InvalidAddress` if the code is unknown.
///
/// # Example
///
/// ```
/// use melsec_slmp::format_address;
///
/// assert_eq!(format_address(0xA8, 100).unwrap(), "D100");
/// assert_eq!(format_address(0xB0, 0x1A0).unwrap(), "ZR1A0");
/// ```
pub fn format_address(code: u8, index: u32) -> Result<String> {
    Ok(DeviceAddress::from_code(code, index)?.to_string())
}
