//! SLMP response parsing and validation.
//!
//! # Response Structure
//!
//! | Component | Size | Description |
//! |-----------|------|-------------|
//! | Header | 9 bytes | Subheader `0x00D0`, route, length |
//! | End code | 2 bytes | `0x0000` = success |
//! | Data | Variable | Response data (if any) |
//!
//! The length field at offset 7 counts the end code plus the data, so a
//! complete frame is always `9 + length` bytes long.
//!
//! # Example
//!
//! ```
//! use melsec_slmp::SlmpResponse;
//!
//! let bytes = [
//!     0xD0, 0x00, 0x00, 0xFF, 0xFF, 0x03, 0x00, // subheader + route
//!     0x06, 0x00,                               // length
//!     0x00, 0x00,                               // end code
//!     0x34, 0x12, 0x78, 0x56,                   // data
//! ];
//!
//! let response = SlmpResponse::from_bytes(&bytes).unwrap();
//! assert!(response.is_success());
//! assert_eq!(response.to_words().unwrap(), vec![0x1234, 0x5678]);
//! ```

use crate::error::{Result, SlmpError};
use crate::header::LENGTH_OFFSET;

/// Offset of the end code.
pub const END_CODE_OFFSET: usize = 9;

/// Offset of the response data.
pub const PAYLOAD_OFFSET: usize = 11;

/// Returns the total length of the frame starting at `buf[0]`, once known.
///
/// Needs the first 9 bytes; returns `None` before that.
pub fn frame_length(buf: &[u8]) -> Option<usize> {
    if buf.len() < PAYLOAD_OFFSET - 2 {
        return None;
    }
    let length = u16::from_le_bytes([buf[LENGTH_OFFSET], buf[LENGTH_OFFSET + 1]]);
    Some(END_CODE_OFFSET + length as usize)
}

/// Parsed SLMP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlmpResponse {
    /// End code (0x0000 = success).
    pub end_code: u16,
    /// Response data (if any).
    pub payload: Vec<u8>,
}

impl SlmpResponse {
    /// Parses a response frame.
    ///
    /// # Errors
    ///
    /// Returns `InvalidResponse` if the frame is shorter than 11 bytes or its
    /// length field disagrees with the frame size.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < PAYLOAD_OFFSET {
            return Err(SlmpError::invalid_response(format!(
                "response too short: expected at least {} bytes, got {}",
                PAYLOAD_OFFSET,
                data.len()
            )));
        }
        if let Some(expected) = frame_length(data) {
            if expected != data.len() {
                return Err(SlmpError::invalid_response(format!(
                    "length field announces {} bytes, frame has {}",
                    expected,
                    data.len()
                )));
            }
        }

        Ok(Self {
            end_code: u16::from_le_bytes([data[END_CODE_OFFSET], data[END_CODE_OFFSET + 1]]),
            payload: data[PAYLOAD_OFFSET..].to_vec(),
        })
    }

    /// Returns whether the end code is zero.
    pub fn is_success(&self) -> bool {
        self.end_code == 0
    }

    /// Fails with `ProtocolError` on a non-zero end code.
    ///
    /// # Example
    ///
    /// ```
    /// use melsec_slmp::{SlmpError, SlmpResponse};
    ///
    /// let response = SlmpResponse { end_code: 0xC059, payload: vec![] };
    /// assert!(matches!(response.check_error(), Err(SlmpError::ProtocolError { code: 0xC059, .. })));
    /// ```
    pub fn check_error(&self) -> Result<()> {
        if self.is_success() {
            Ok(())
        } else {
            Err(SlmpError::protocol_error(self.end_code, self.payload.clone()))
        }
    }

    /// Checks the end code, then the payload length.
    ///
    /// # Errors
    ///
    /// `ProtocolError` for a non-zero end code, `ResponseSizeMismatch` when
    /// the payload is not exactly `expected` bytes.
    pub fn expect_len(&self, expected: usize) -> Result<&[u8]> {
        self.check_error()?;
        if self.payload.len() != expected {
            return Err(SlmpError::size_mismatch(expected, self.payload.len()));
        }
        Ok(&self.payload)
    }

    /// Interprets the payload as little-endian words.
    ///
    /// # Errors
    ///
    /// Returns `InvalidResponse` when the payload has an odd length.
    pub fn to_words(&self) -> Result<Vec<u16>> {
        if self.payload.len() % 2 != 0 {
            return Err(SlmpError::invalid_response(format!(
                "odd payload length {} for word data",
                self.payload.len()
            )));
        }
        Ok(crate::utils::bytes_to_words(&self.payload))
    }
}

/// Builds a response frame, used by tests and fake servers.
#[cfg(test)]
pub(crate) fn make_response(end_code: u16, payload: &[u8]) -> Vec<u8> {
    let length = (2 + payload.len()) as u16;
    let mut frame = vec![0xD0, 0x00, 0x00, 0xFF, 0xFF, 0x03, 0x00];
    frame.extend_from_slice(&length.to_le_bytes());
    frame.extend_from_slice(&end_code.to_le_bytes());
    frame.extend_from_slice(payload);
    frame
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::SlmpHeader;

    #[test]
    fn test_parse_success() {
        let response = SlmpResponse::from_bytes(&make_response(0, &[1, 2, 3])).unwrap();
        assert!(response.is_success());
        assert_eq!(response.payload, [1, 2, 3]);
        assert!(response.check_error().is_ok());
    }

    #[test]
    fn test_parse_error_code() {
        let response = SlmpResponse::from_bytes(&make_response(0xC05C, &[0x00, 0xFF])).unwrap();
        match response.check_error() {
            Err(SlmpError::ProtocolError { code, payload }) => {
                assert_eq!(code, 0xC05C);
                assert_eq!(payload, [0x00, 0xFF]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_too_short() {
        assert!(matches!(
            SlmpResponse::from_bytes(&[0xD0, 0x00, 0x00]),
            Err(SlmpError::InvalidResponse { .. })
        ));
    }

    #[test]
    fn test_length_field_mismatch() {
        let mut frame = make_response(0, &[1, 2]);
        frame.push(0xEE);
        assert!(matches!(
            SlmpResponse::from_bytes(&frame),
            Err(SlmpError::InvalidResponse { .. })
        ));
    }

    #[test]
    fn test_expect_len() {
        let response = SlmpResponse::from_bytes(&make_response(0, &[1, 2, 3, 4])).unwrap();
        assert_eq!(response.expect_len(4).unwrap(), &[1, 2, 3, 4]);
        assert!(matches!(
            response.expect_len(6),
            Err(SlmpError::ResponseSizeMismatch {
                expected: 6,
                received: 4
            })
        ));
    }

    #[test]
    fn test_expect_len_reports_protocol_error_first() {
        let response = SlmpResponse::from_bytes(&make_response(0xC051, &[])).unwrap();
        assert!(matches!(response.expect_len(4), Err(SlmpError::ProtocolError { .. })));
    }

    #[test]
    fn test_frame_length() {
        let frame = make_response(0, &[0; 10]);
        assert_eq!(frame_length(&frame[..8]), None);
        assert_eq!(frame_length(&frame[..9]), Some(frame.len()));
    }

    #[test]
    fn test_echo_request_parses_as_frame() {
        // A request has the same header shape; its command words land in
        // the end-code/payload region.
        let request = SlmpHeader::default().build_request(0x0619, 0x0000, &[0x02, 0x00, 0x41, 0x42]);
        let parsed = SlmpResponse::from_bytes(&request).unwrap();
        assert_eq!(parsed.end_code, 0x0004);
        assert_eq!(parsed.payload, [0x19, 0x06, 0x00, 0x00, 0x02, 0x00, 0x41, 0x42]);
    }
}
