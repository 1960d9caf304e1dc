//! Utility functions for bit packing and buffer manipulation.
//!
//! # Nibble packing
//!
//! Batch bit commands carry one bit per nibble: byte `n` holds element `2n`
//! in its high nibble and element `2n + 1` in its low nibble.
//!
//! ```
//! use melsec_slmp::utils::{pack_bits, unpack_bits};
//!
//! let packed = pack_bits(&[true, false, true]);
//! assert_eq!(packed, [0x10, 0x10]);
//! assert_eq!(unpack_bits(&packed, 3), [true, false, true]);
//! ```
//!
//! # Bit streams
//!
//! Word and block payloads are handled as little-endian bit streams: bit `k`
//! of the stream is bit `k % 8` of byte `k / 8`. A 16-bit word read from the
//! PLC therefore covers stream bits `16 * i .. 16 * i + 16`, and bit devices
//! read in word units line up with their index.
//!
//! ```
//! use melsec_slmp::utils::{get_bits, set_bits};
//!
//! let mut buf = [0u8; 4];
//! set_bits(&mut buf, 4, 16, 0xABCD);
//! assert_eq!(buf, [0xD0, 0xBC, 0x0A, 0x00]);
//! assert_eq!(get_bits(&buf, 4, 16), 0xABCD);
//! ```

use std::fmt::Write;

/// Packs booleans two per byte, even index in the high nibble.
pub fn pack_bits(bits: &[bool]) -> Vec<u8> {
    let mut out = vec![0u8; bits.len().div_ceil(2)];
    for (i, &bit) in bits.iter().enumerate() {
        if bit {
            out[i / 2] |= if i % 2 == 0 { 0x10 } else { 0x01 };
        }
    }
    out
}

/// Unpacks `count` booleans from nibble-packed bytes.
///
/// Missing bytes read as `false`.
pub fn unpack_bits(data: &[u8], count: usize) -> Vec<bool> {
    (0..count)
        .map(|i| {
            let byte = data.get(i / 2).copied().unwrap_or(0);
            let nibble = if i % 2 == 0 { byte >> 4 } else { byte & 0x0F };
            nibble != 0
        })
        .collect()
}

/// Reads `width` (at most 64) bits starting at bit `offset`.
///
/// Bits past the end of the buffer read as zero.
pub fn get_bits(buf: &[u8], offset: usize, width: u32) -> u64 {
    debug_assert!(width <= 64);
    let mut value = 0u64;
    for i in 0..width as usize {
        let pos = offset + i;
        let set = buf.get(pos / 8).is_some_and(|b| b & (1 << (pos % 8)) != 0);
        if set {
            value |= 1 << i;
        }
    }
    value
}

/// Writes the low `width` (at most 64) bits of `value` starting at bit `offset`.
///
/// Bits past the end of the buffer are dropped.
pub fn set_bits(buf: &mut [u8], offset: usize, width: u32, value: u64) {
    debug_assert!(width <= 64);
    for i in 0..width as usize {
        let pos = offset + i;
        if let Some(byte) = buf.get_mut(pos / 8) {
            let mask = 1 << (pos % 8);
            if value & (1 << i) != 0 {
                *byte |= mask;
            } else {
                *byte &= !mask;
            }
        }
    }
}

/// Converts words into their little-endian byte representation.
pub fn words_to_bytes(words: &[u16]) -> Vec<u8> {
    words.iter().flat_map(|w| w.to_le_bytes()).collect()
}

/// Converts little-endian bytes into words. A trailing odd byte is ignored.
pub fn bytes_to_words(bytes: &[u8]) -> Vec<u16> {
    bytes
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect()
}

/// Formats bytes as space separated uppercase hex, e.g. `"50 00 FF"`.
///
/// # Example
///
/// ```
/// use melsec_slmp::utils::format_hex;
///
/// assert_eq!(format_hex(&[0x50, 0x00, 0xFF]), "50 00 FF");
/// assert_eq!(format_hex(&[]), "");
/// ```
pub fn format_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3);
    for (i, b) in bytes.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let _ = write!(out, "{b:02X}");
    }
    out
}
