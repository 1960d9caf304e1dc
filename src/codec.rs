//! Device address and value encoding.
//!
//! SLMP knows two wire layouts for device references:
//!
//! | Layout | Device | Word entry | Dword entry | Bit entry |
//! |--------|:------:|:----------:|:-----------:|:---------:|
//! | Standard | 4 bytes | 6 bytes | 8 bytes | 5 bytes |
//! | Extended | 6 bytes | 8 bytes | 10 bytes | 8 bytes |
//!
//! Standard packs the index into the low 24 bits of a little-endian `u32` and
//! the device code into the top byte. Extended writes the full 32-bit index
//! followed by the device code as a `u16`; word and bit values go into the
//! upper half of that second `u32`, and dword entries add the upper 16 bits
//! of the value as a trailing `u16`.
//!
//! The layout is chosen once per session from the CPU type reported by the
//! PLC (iQ-R models use the extended layout).
//!
//! # Example
//!
//! ```
//! use melsec_slmp::{Codec, Device, DeviceAddress};
//!
//! let d100 = DeviceAddress::new(Device::D, 100);
//!
//! let bytes = Codec::Standard.encode_word(d100, 0x1234).unwrap();
//! assert_eq!(bytes, [0x64, 0x00, 0x00, 0xA8, 0x34, 0x12]);
//!
//! let bytes = Codec::Extended.encode_word(d100, 0x1234).unwrap();
//! assert_eq!(bytes, [0x64, 0x00, 0x00, 0x00, 0xA8, 0x00, 0x34, 0x12]);
//! ```

use bytes::BufMut;

use crate::device::DeviceAddress;
use crate::error::{Result, SlmpError};

/// Largest index accepted by the standard layout.
pub const STANDARD_MAX_INDEX: u32 = 0x00FF_FFFF;

/// CPU model information returned by the PLC.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CpuType {
    /// Model name with padding removed, e.g. `"R04CPU"`.
    pub name: String,
    /// Model code.
    pub code: u16,
    /// Whether the model uses the extended device layout.
    pub is_extended: bool,
}

impl CpuType {
    /// Creates a CPU type, deriving the layout from the model name.
    ///
    /// # Example
    ///
    /// ```
    /// use melsec_slmp::CpuType;
    ///
    /// assert!(CpuType::new("R04CPU", 0x4800).is_extended);
    /// assert!(!CpuType::new("Q03UDVCPU", 0x0366).is_extended);
    /// ```
    pub fn new(name: impl Into<String>, code: u16) -> Self {
        let name = name.into().trim().to_string();
        let is_extended = name.starts_with('R');
        Self {
            name,
            code,
            is_extended,
        }
    }

    /// Returns the codec matching this CPU.
    pub fn codec(&self) -> Codec {
        if self.is_extended {
            Codec::Extended
        } else {
            Codec::Standard
        }
    }
}

/// Device encoding strategy, fixed for the lifetime of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Codec {
    /// 24-bit index layout (Q/L series).
    Standard,
    /// 32-bit index layout (iQ-R series).
    Extended,
}

impl Codec {
    /// Returns `true` for the extended layout.
    pub fn is_extended(self) -> bool {
        self == Codec::Extended
    }

    /// Returns the subcommand for a device command.
    ///
    /// Bit 0 selects bit units, bit 1 selects the extended layout.
    pub fn subcommand(self, bit: bool) -> u16 {
        u16::from(bit) | (u16::from(self.is_extended()) << 1)
    }

    /// Size of an encoded device reference.
    pub fn device_size(self) -> usize {
        match self {
            Codec::Standard => 4,
            Codec::Extended => 6,
        }
    }

    /// Size of an encoded bit entry.
    pub fn bit_size(self) -> usize {
        match self {
            Codec::Standard => 5,
            Codec::Extended => 8,
        }
    }

    /// Size of an encoded word entry (also used for block heads).
    pub fn word_size(self) -> usize {
        match self {
            Codec::Standard => 6,
            Codec::Extended => 8,
        }
    }

    /// Size of an encoded double-word entry.
    pub fn dword_size(self) -> usize {
        match self {
            Codec::Standard => 8,
            Codec::Extended => 10,
        }
    }

    fn check_index(self, address: DeviceAddress) -> Result<()> {
        if self == Codec::Standard && address.index > STANDARD_MAX_INDEX {
            return Err(SlmpError::invalid_address(format!(
                "{address}: index exceeds 24 bits, extended addressing required"
            )));
        }
        Ok(())
    }

    /// Appends a bare device reference.
    pub fn put_device(self, buf: &mut impl BufMut, address: DeviceAddress) -> Result<()> {
        self.check_index(address)?;
        match self {
            Codec::Standard => {
                buf.put_u32_le(address.index | (u32::from(address.code()) << 24));
            }
            Codec::Extended => {
                buf.put_u32_le(address.index);
                buf.put_u16_le(u16::from(address.code()));
            }
        }
        Ok(())
    }

    /// Appends a device reference followed by a 16-bit value.
    ///
    /// Block and batch heads use this layout with the point count as value.
    pub fn put_word(self, buf: &mut impl BufMut, address: DeviceAddress, value: u16) -> Result<()> {
        self.check_index(address)?;
        match self {
            Codec::Standard => {
                buf.put_u32_le(address.index | (u32::from(address.code()) << 24));
                buf.put_u16_le(value);
            }
            Codec::Extended => {
                buf.put_u32_le(address.index);
                buf.put_u32_le(u32::from(address.code()) | (u32::from(value) << 16));
            }
        }
        Ok(())
    }

    /// Appends a device reference followed by a 32-bit value.
    pub fn put_dword(self, buf: &mut impl BufMut, address: DeviceAddress, value: u32) -> Result<()> {
        match self {
            Codec::Standard => {
                self.put_device(buf, address)?;
                buf.put_u32_le(value);
            }
            Codec::Extended => {
                self.put_word(buf, address, value as u16)?;
                buf.put_u16_le((value >> 16) as u16);
            }
        }
        Ok(())
    }

    /// Appends a device reference followed by a bit value.
    pub fn put_bit(self, buf: &mut impl BufMut, address: DeviceAddress, value: bool) -> Result<()> {
        match self {
            Codec::Standard => {
                self.put_device(buf, address)?;
                buf.put_u8(u8::from(value));
            }
            Codec::Extended => self.put_word(buf, address, u16::from(value))?,
        }
        Ok(())
    }

    /// Encodes a bare device reference.
    pub fn encode_device(self, address: DeviceAddress) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(self.device_size());
        self.put_device(&mut buf, address)?;
        Ok(buf)
    }

    /// Encodes a bit entry.
    pub fn encode_bit(self, address: DeviceAddress, value: bool) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(self.bit_size());
        self.put_bit(&mut buf, address, value)?;
        Ok(buf)
    }

    /// Encodes a word entry.
    pub fn encode_word(self, address: DeviceAddress, value: u16) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(self.word_size());
        self.put_word(&mut buf, address, value)?;
        Ok(buf)
    }

    /// Encodes a double-word entry.
    pub fn encode_dword(self, address: DeviceAddress, value: u32) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(self.dword_size());
        self.put_dword(&mut buf, address, value)?;
        Ok(buf)
    }

    /// Decodes a bare device reference.
    ///
    /// # Errors
    ///
    /// Returns `InvalidAddress` if the buffer is not exactly
    /// [`device_size`](Self::device_size) bytes or the code is unknown.
    ///
    /// # Example
    ///
    /// ```
    /// use melsec_slmp::{Codec, Device, DeviceAddress};
    ///
    /// let addr = Codec::Standard.decode_address(&[0x0A, 0x00, 0x00, 0x90]).unwrap();
    /// assert_eq!(addr, DeviceAddress::new(Device::M, 10));
    /// assert!(Codec::Extended.decode_address(&[0x0A, 0x00, 0x00, 0x90]).is_err());
    /// ```
    pub fn decode_address(self, buf: &[u8]) -> Result<DeviceAddress> {
        if buf.len() != self.device_size() {
            return Err(SlmpError::invalid_address(format!(
                "device reference must be {} bytes, got {}",
                self.device_size(),
                buf.len()
            )));
        }
        let head = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
        match self {
            Codec::Standard => DeviceAddress::from_code((head >> 24) as u8, head & STANDARD_MAX_INDEX),
            Codec::Extended => {
                let code = u16::from_le_bytes([buf[4], buf[5]]);
                let code = u8::try_from(code).map_err(|_| {
                    SlmpError::invalid_address(format!("unknown device code 0x{code:04X}"))
                })?;
                DeviceAddress::from_code(code, head)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::Device;

    const BOTH: [Codec; 2] = [Codec::Standard, Codec::Extended];

    #[test]
    fn test_subcommand() {
        assert_eq!(Codec::Standard.subcommand(false), 0x0000);
        assert_eq!(Codec::Standard.subcommand(true), 0x0001);
        assert_eq!(Codec::Extended.subcommand(false), 0x0002);
        assert_eq!(Codec::Extended.subcommand(true), 0x0003);
    }

    #[test]
    fn test_standard_layouts() {
        let m10 = DeviceAddress::new(Device::M, 10);
        assert_eq!(Codec::Standard.encode_device(m10).unwrap(), hex::decode("0a000090").unwrap());
        assert_eq!(Codec::Standard.encode_bit(m10, true).unwrap(), hex::decode("0a00009001").unwrap());
        assert_eq!(
            Codec::Standard.encode_dword(DeviceAddress::new(Device::D, 0x123456), 0xAABBCCDD).unwrap(),
            hex::decode("563412a8ddccbbaa").unwrap()
        );
    }

    #[test]
    fn test_extended_layouts() {
        let zr = DeviceAddress::new(Device::ZR, 0x0100_0000);
        assert_eq!(Codec::Extended.encode_device(zr).unwrap(), hex::decode("00000001b000").unwrap());
        assert_eq!(
            Codec::Extended.encode_bit(DeviceAddress::new(Device::M, 1), true).unwrap(),
            hex::decode("0100000090000100").unwrap()
        );
        assert_eq!(
            Codec::Extended.encode_dword(DeviceAddress::new(Device::D, 2), 0x12345678).unwrap(),
            hex::decode("02000000a80078563412").unwrap()
        );
    }

    #[test]
    fn test_encoded_sizes() {
        let a = DeviceAddress::new(Device::W, 0x10);
        for codec in BOTH {
            assert_eq!(codec.encode_device(a).unwrap().len(), codec.device_size());
            assert_eq!(codec.encode_bit(a, false).unwrap().len(), codec.bit_size());
            assert_eq!(codec.encode_word(a, 0).unwrap().len(), codec.word_size());
            assert_eq!(codec.encode_dword(a, 0).unwrap().len(), codec.dword_size());
        }
    }

    #[test]
    fn test_standard_rejects_wide_index() {
        let a = DeviceAddress::new(Device::ZR, 0x0100_0000);
        assert!(matches!(Codec::Standard.encode_word(a, 1), Err(SlmpError::InvalidAddress { .. })));
        assert!(matches!(Codec::Standard.encode_bit(a, true), Err(SlmpError::InvalidAddress { .. })));
        assert!(Codec::Extended.encode_word(a, 1).is_ok());
    }

    #[test]
    fn test_decode_every_device() {
        for codec in BOTH {
            for device in Device::ALL {
                for index in [0, 1, 0x00AB_CDEF] {
                    let a = DeviceAddress::new(device, index);
                    let bytes = codec.encode_device(a).unwrap();
                    assert_eq!(codec.decode_address(&bytes).unwrap(), a);
                }
            }
        }
        let wide = DeviceAddress::new(Device::R, u32::MAX);
        let bytes = Codec::Extended.encode_device(wide).unwrap();
        assert_eq!(Codec::Extended.decode_address(&bytes).unwrap(), wide);
    }

    #[test]
    fn test_decode_length_checks() {
        assert!(Codec::Standard.decode_address(&[0; 3]).is_err());
        assert!(Codec::Standard.decode_address(&[0; 6]).is_err());
        assert!(Codec::Extended.decode_address(&[0; 4]).is_err());
    }

    #[test]
    fn test_decode_unknown_code() {
        assert!(Codec::Standard.decode_address(&[0, 0, 0, 0x01]).is_err());
        assert!(Codec::Extended.decode_address(&[0, 0, 0, 0, 0xA8, 0x01]).is_err());
    }

    #[test]
    fn test_cpu_type_codec() {
        assert_eq!(CpuType::new("R08CPU          ", 0x4801).codec(), Codec::Extended);
        assert_eq!(CpuType::new("L02CPU", 0x0543).codec(), Codec::Standard);
        assert_eq!(CpuType::new("  R16CPU ", 0).name, "R16CPU");
    }
}
