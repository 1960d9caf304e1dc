//! Error types for the SLMP protocol.

use std::io;
use thiserror::Error;

/// Result type alias for SLMP operations.
pub type Result<T> = std::result::Result<T, SlmpError>;

/// Errors that can occur during SLMP communication.
///
/// The variants fall into three families:
///
/// - argument errors raised before any I/O (`InvalidAddress`, `SizeExceeded`,
///   `InvalidParameter`, `NotReady`)
/// - exchange errors raised after a complete response arrived
///   (`ProtocolError`, `ResponseSizeMismatch`, `InvalidResponse`)
/// - transport faults, see [`SlmpError::is_transport_fault`]
#[derive(Debug, Error)]
pub enum SlmpError {
    /// A device address could not be parsed, formatted or encoded.
    #[error("Invalid address: {reason}")]
    InvalidAddress {
        /// Description of the addressing error.
        reason: String,
    },

    /// Element count above the ceiling of a command family.
    #[error("{command}: {count} elements exceeds the limit of {limit}")]
    SizeExceeded {
        /// Command family that rejected the request.
        command: &'static str,
        /// Requested element count.
        count: usize,
        /// Maximum element count for one call.
        limit: usize,
    },

    /// Invalid parameter provided.
    #[error("Invalid parameter '{parameter}': {reason}")]
    InvalidParameter {
        /// Name of the invalid parameter.
        parameter: String,
        /// Description of why the parameter is invalid.
        reason: String,
    },

    /// The PLC answered with a non-zero end code.
    #[error("PLC error: end code 0x{code:04X}")]
    ProtocolError {
        /// End code from the response header.
        code: u16,
        /// Payload carried by the error response.
        payload: Vec<u8>,
    },

    /// The response payload length disagrees with what the request implies.
    #[error("Response size mismatch: expected {expected} bytes, received {received}")]
    ResponseSizeMismatch {
        /// Payload length implied by the request.
        expected: usize,
        /// Payload length actually received.
        received: usize,
    },

    /// Malformed response frame.
    #[error("Invalid response: {reason}")]
    InvalidResponse {
        /// Description of the response error.
        reason: String,
    },

    /// No response arrived within the response timeout.
    #[error("Communication timeout")]
    Timeout,

    /// The link could not be established within the connect timeout.
    #[error("Connect timeout")]
    ConnectTimeout,

    /// The peer closed the connection.
    #[error("Connection closed by peer")]
    ConnectionClosed,

    /// The session is closed or gave up reconnecting.
    #[error("Not connected")]
    NotConnected,

    /// A device command was issued before the CPU type was known.
    #[error("Session not ready: CPU type has not been resolved")]
    NotReady,

    /// The reconnect budget was spent without establishing a link.
    #[error("Connection failed after {attempts} attempts")]
    RetriesExhausted {
        /// Number of connect attempts made.
        attempts: u32,
    },

    /// I/O error during communication.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl SlmpError {
    /// Creates a new `InvalidAddress` error.
    ///
    /// # Example
    ///
    /// ```
    /// use melsec_slmp::SlmpError;
    ///
    /// let err = SlmpError::invalid_address("unknown device 'QQ'");
    /// ```
    pub fn invalid_address(reason: impl Into<String>) -> Self {
        Self::InvalidAddress {
            reason: reason.into(),
        }
    }

    /// Creates a new `SizeExceeded` error.
    ///
    /// # Example
    ///
    /// ```
    /// use melsec_slmp::SlmpError;
    ///
    /// let err = SlmpError::size_exceeded("batch read", 950, 949);
    /// ```
    pub fn size_exceeded(command: &'static str, count: usize, limit: usize) -> Self {
        Self::SizeExceeded {
            command,
            count,
            limit,
        }
    }

    /// Creates a new `InvalidParameter` error.
    ///
    /// # Example
    ///
    /// ```
    /// use melsec_slmp::SlmpError;
    ///
    /// let err = SlmpError::invalid_parameter("count", "must be greater than 0");
    /// ```
    pub fn invalid_parameter(parameter: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            parameter: parameter.into(),
            reason: reason.into(),
        }
    }

    /// Creates a new `InvalidResponse` error.
    pub fn invalid_response(reason: impl Into<String>) -> Self {
        Self::InvalidResponse {
            reason: reason.into(),
        }
    }

    /// Creates a new `ProtocolError` from an end code and its payload.
    pub fn protocol_error(code: u16, payload: impl Into<Vec<u8>>) -> Self {
        Self::ProtocolError {
            code,
            payload: payload.into(),
        }
    }

    /// Creates a new `ResponseSizeMismatch` error.
    pub fn size_mismatch(expected: usize, received: usize) -> Self {
        Self::ResponseSizeMismatch { expected, received }
    }

    /// Returns `true` for errors raised by the transport rather than the PLC.
    ///
    /// # Example
    ///
    /// ```
    /// use melsec_slmp::SlmpError;
    ///
    /// assert!(SlmpError::Timeout.is_transport_fault());
    /// assert!(!SlmpError::protocol_error(0xC059, vec![]).is_transport_fault());
    /// ```
    pub fn is_transport_fault(&self) -> bool {
        matches!(
            self,
            Self::Timeout
                | Self::ConnectTimeout
                | Self::ConnectionClosed
                | Self::NotConnected
                | Self::RetriesExhausted { .. }
                | Self::Io(_)
        )
    }
}

impl Clone for SlmpError {
    fn clone(&self) -> Self {
        match self {
            Self::InvalidAddress { reason } => Self::invalid_address(reason.clone()),
            Self::SizeExceeded {
                command,
                count,
                limit,
            } => Self::size_exceeded(command, *count, *limit),
            Self::InvalidParameter { parameter, reason } => {
                Self::invalid_parameter(parameter.clone(), reason.clone())
            }
            Self::ProtocolError { code, payload } => Self::protocol_error(*code, payload.clone()),
            Self::ResponseSizeMismatch { expected, received } => {
                Self::size_mismatch(*expected, *received)
            }
            Self::InvalidResponse { reason } => Self::invalid_response(reason.clone()),
            Self::Timeout => Self::Timeout,
            Self::ConnectTimeout => Self::ConnectTimeout,
            Self::ConnectionClosed => Self::ConnectionClosed,
            Self::NotConnected => Self::NotConnected,
            Self::NotReady => Self::NotReady,
            Self::RetriesExhausted { attempts } => Self::RetriesExhausted {
                attempts: *attempts,
            },
            // io::Error is not Clone; keep kind and message.
            Self::Io(e) => Self::Io(io::Error::new(e.kind(), e.to_string())),
        }
    }
}

/// Returns a short description for common SLMP end codes.
///
/// Unknown codes yield `"unknown error"`.
///
/// # Example
///
/// ```
/// use melsec_slmp::slmp_error_description;
///
/// assert_eq!(slmp_error_description(0x0000), "normal completion");
/// assert_eq!(slmp_error_description(0xC059), "command or subcommand not supported");
/// ```
pub fn slmp_error_description(code: u16) -> &'static str {
    match code {
        0x0000 => "normal completion",
        0xC050 => "ASCII data received while binary code is set",
        0xC051..=0xC054 => "number of read/write points out of range",
        0xC056 => "read/write request exceeds the maximum address",
        0xC058 => "request data length does not match the character count",
        0xC059 => "command or subcommand not supported",
        0xC05B => "CPU module cannot read or write the specified device",
        0xC05C => "request content is incorrect",
        0xC05F => "request cannot be executed on the target CPU module",
        0xC060 => "request content is incorrect for the bit device",
        0xC061 => "request data length does not match the number of data",
        0xC06F => "request message format does not match the communication data code",
        0xC070 => "device memory extension cannot be specified for the target station",
        0xC0B5 => "data the CPU module cannot handle was specified",
        0xC200 => "remote password is incorrect",
        0xC201 => "port used for communication is locked by remote password",
        0xC204 => "device is not the one that requested the remote password unlock",
        0xCEE0 => "monitor registration is not performed",
        _ => "unknown error",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_error_display() {
        let err = SlmpError::protocol_error(0xC059, vec![0x00, 0xFF]);
        assert_eq!(err.to_string(), "PLC error: end code 0xC059");
    }

    #[test]
    fn test_size_exceeded_display() {
        let err = SlmpError::size_exceeded("random read", 95, 94);
        assert_eq!(
            err.to_string(),
            "random read: 95 elements exceeds the limit of 94"
        );
    }

    #[test]
    fn test_size_mismatch_display() {
        let err = SlmpError::size_mismatch(20, 18);
        assert_eq!(
            err.to_string(),
            "Response size mismatch: expected 20 bytes, received 18"
        );
    }

    #[test]
    fn test_transport_fault_classification() {
        assert!(SlmpError::ConnectTimeout.is_transport_fault());
        assert!(SlmpError::RetriesExhausted { attempts: 6 }.is_transport_fault());
        assert!(SlmpError::Io(io::Error::other("boom")).is_transport_fault());
        assert!(!SlmpError::invalid_address("x").is_transport_fault());
        assert!(!SlmpError::size_mismatch(1, 2).is_transport_fault());
        assert!(!SlmpError::NotReady.is_transport_fault());
    }

    #[test]
    fn test_clone_keeps_io_kind() {
        let err = SlmpError::Io(io::Error::new(io::ErrorKind::ConnectionReset, "reset"));
        match err.clone() {
            SlmpError::Io(e) => assert_eq!(e.kind(), io::ErrorKind::ConnectionReset),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_error_description() {
        assert_eq!(slmp_error_description(0xC200), "remote password is incorrect");
        assert_eq!(slmp_error_description(0x1234), "unknown error");
    }
}
