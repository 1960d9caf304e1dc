//! SLMP request header and frame building.
//!
//! Every binary SLMP (3E frame) request starts with an 11-byte header:
//!
//! | Byte | Field | Description |
//! |------|-------|-------------|
//! | 0-1 | Subheader | `0x0050` for requests, `0x00D0` for responses |
//! | 2 | Network | Destination network number |
//! | 3 | Station | Destination station number |
//! | 4-5 | Module | Destination module I/O number (`0x03FF` = own CPU) |
//! | 6 | Multidrop | Destination multidrop station number |
//! | 7-8 | Length | Bytes following this field |
//! | 9-10 | Timer | Monitoring timer, in 250 ms units |
//!
//! The header is followed by the command (`u16`), the subcommand (`u16`) and
//! the command payload. All multi-byte fields are little-endian.
//!
//! # Example
//!
//! ```
//! use melsec_slmp::SlmpHeader;
//!
//! let header = SlmpHeader::default();
//! let frame = header.build_request(0x0619, 0x0000, &[0x02, 0x00, 0x41, 0x42]);
//! assert_eq!(frame.len(), 11 + 4 + 4);
//! assert_eq!(&frame[7..9], &[0x0A, 0x00]);
//! ```

use bytes::BufMut;

/// Size of the request header in bytes.
pub const SLMP_HEADER_SIZE: usize = 11;

/// Request subheader.
pub const REQUEST_SUBHEADER: u16 = 0x0050;

/// Offset of the length field.
pub const LENGTH_OFFSET: usize = 7;

/// Default monitoring timer (4 x 250 ms).
pub const DEFAULT_MONITOR_TIMER: u16 = 4;

/// Routing information for the target station.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Destination {
    /// Network number (0 = local network).
    pub network: u8,
    /// Station number (`0xFF` = connected station).
    pub station: u8,
    /// Module I/O number (`0x03FF` = own CPU).
    pub module: u16,
    /// Multidrop station number.
    pub multidrop: u8,
}

impl Destination {
    /// Creates a destination from its four routing fields.
    pub fn new(network: u8, station: u8, module: u16, multidrop: u8) -> Self {
        Self {
            network,
            station,
            module,
            multidrop,
        }
    }

    /// The directly connected CPU.
    ///
    /// # Example
    ///
    /// ```
    /// use melsec_slmp::Destination;
    ///
    /// let local = Destination::local();
    /// assert_eq!(local.station, 0xFF);
    /// assert_eq!(local.module, 0x03FF);
    /// ```
    pub fn local() -> Self {
        Self::new(0x00, 0xFF, 0x03FF, 0x00)
    }
}

impl Default for Destination {
    fn default() -> Self {
        Self::local()
    }
}

/// Fixed request header of one session.
///
/// Built once; only the length field changes from one request to the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlmpHeader {
    /// Target station.
    pub destination: Destination,
    /// Monitoring timer in 250 ms units.
    pub monitor_timer: u16,
}

impl SlmpHeader {
    /// Creates a header.
    pub fn new(destination: Destination, monitor_timer: u16) -> Self {
        Self {
            destination,
            monitor_timer,
        }
    }

    /// Serializes the header with a zero length field.
    pub fn to_bytes(&self) -> [u8; SLMP_HEADER_SIZE] {
        let d = &self.destination;
        let module = d.module.to_le_bytes();
        let timer = self.monitor_timer.to_le_bytes();
        let sub = REQUEST_SUBHEADER.to_le_bytes();
        [
            sub[0], sub[1], d.network, d.station, module[0], module[1], d.multidrop, 0x00, 0x00,
            timer[0], timer[1],
        ]
    }

    /// Builds a complete request frame.
    ///
    /// The length field at offset 7 is set to
    /// 2 (timer) + 4 (command and subcommand) + payload length.
    pub fn build_request(&self, command: u16, subcommand: u16, payload: &[u8]) -> Vec<u8> {
        let mut frame = Vec::with_capacity(SLMP_HEADER_SIZE + 4 + payload.len());
        frame.put_slice(&self.to_bytes());
        frame.put_u16_le(command);
        frame.put_u16_le(subcommand);
        frame.put_slice(payload);

        let length = (2 + 4 + payload.len()) as u16;
        frame[LENGTH_OFFSET..LENGTH_OFFSET + 2].copy_from_slice(&length.to_le_bytes());
        frame
    }
}

impl Default for SlmpHeader {
    fn default() -> Self {
        Self::new(Destination::local(), DEFAULT_MONITOR_TIMER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_header_bytes() {
        let bytes = SlmpHeader::default().to_bytes();
        assert_eq!(bytes, [0x50, 0x00, 0x00, 0xFF, 0xFF, 0x03, 0x00, 0x00, 0x00, 0x04, 0x00]);
    }

    #[test]
    fn test_custom_destination() {
        let header = SlmpHeader::new(Destination::new(1, 2, 0x03E0, 3), 0x0010);
        let bytes = header.to_bytes();
        assert_eq!(bytes[2], 1);
        assert_eq!(bytes[3], 2);
        assert_eq!(&bytes[4..6], &[0xE0, 0x03]);
        assert_eq!(bytes[6], 3);
        assert_eq!(&bytes[9..11], &[0x10, 0x00]);
    }

    #[test]
    fn test_build_cpu_type_request() {
        let frame = SlmpHeader::default().build_request(0x0101, 0x0000, &[]);
        // subheader, route, length 6, timer 4, command 0x0101, subcommand 0
        assert_eq!(frame, hex::decode("500000ffff03000600040001010000").unwrap());
    }

    #[test]
    fn test_length_field_tracks_payload() {
        let header = SlmpHeader::default();
        let payload = vec![0xAA; 300];
        let frame = header.build_request(0x1401, 0x0000, &payload);
        assert_eq!(frame.len(), SLMP_HEADER_SIZE + 4 + 300);
        let length = u16::from_le_bytes([frame[7], frame[8]]) as usize;
        assert_eq!(length, 306);
        assert_eq!(frame.len(), 9 + length);
        assert_eq!(&frame[11..15], &[0x01, 0x14, 0x00, 0x00]);
    }

    #[test]
    fn test_header_shape_is_stable() {
        let header = SlmpHeader::default();
        let a = header.build_request(0x0401, 0x0000, &[1, 2, 3]);
        let b = header.build_request(0x0619, 0x0000, &[]);
        assert_eq!(&a[..7], &b[..7]);
        assert_eq!(&a[9..11], &b[9..11]);
    }
}
