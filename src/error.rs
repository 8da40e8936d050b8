//! Error types for Modbus TCP operations
//!
//! A single [`ModbusError`] enum covers every failure the engine can report,
//! from argument validation on the client API down to wire-level framing on
//! the server. All fallible functions return [`ModbusResult`].

use thiserror::Error;

/// Result type used across the crate
pub type ModbusResult<T> = Result<T, ModbusError>;

/// Protocol engine error
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModbusError {
    /// A call argument failed validation (address range, quantity, payload size)
    #[error("Invalid data: {message}")]
    InvalidData { message: String },

    /// A frame or PDU has an impossible size or an inconsistent byte count
    #[error("Invalid length: {message}")]
    InvalidLength { message: String },

    /// Protocol identifier or unit identifier does not match expectations
    #[error("Wrong identifier: {message}")]
    WrongIdentifier { message: String },

    /// A response arrived but does not answer the outstanding request
    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    /// Function code outside the supported catalogue
    #[error("Invalid function code: 0x{code:02X}")]
    InvalidFunction { code: u8 },

    /// The deadline for an operation passed before it finished
    #[error("Timeout after {timeout_ms}ms: {message}")]
    Timeout { message: String, timeout_ms: u64 },

    /// The operation cannot make progress right now and may be retried
    #[error("Operation would block")]
    WouldBlock,

    /// API call issued from a state that does not allow it
    #[error("Wrong state: {message}")]
    WrongState { message: String },

    /// The remote side answered with a Modbus exception response
    #[error("Modbus exception: function=0x{function:02X}, code=0x{code:02X}")]
    Exception { function: u8, code: u8 },

    /// Socket-level failure (connect, read, write, shutdown)
    #[error("Connection error: {message}")]
    Connection { message: String },

    /// Invalid engine configuration
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Violation of the Modbus framing rules not covered by a finer variant
    #[error("Protocol error: {message}")]
    Protocol { message: String },
}

impl ModbusError {
    /// Create an invalid data error
    pub fn invalid_data<S: Into<String>>(message: S) -> Self {
        Self::InvalidData {
            message: message.into(),
        }
    }

    /// Create an invalid length error
    pub fn invalid_length<S: Into<String>>(message: S) -> Self {
        Self::InvalidLength {
            message: message.into(),
        }
    }

    /// Create a wrong identifier error
    pub fn wrong_identifier<S: Into<String>>(message: S) -> Self {
        Self::WrongIdentifier {
            message: message.into(),
        }
    }

    /// Create an invalid response error
    pub fn invalid_response<S: Into<String>>(message: S) -> Self {
        Self::InvalidResponse {
            message: message.into(),
        }
    }

    /// Create an invalid function error
    pub fn invalid_function(code: u8) -> Self {
        Self::InvalidFunction { code }
    }

    /// Create a timeout error
    pub fn timeout<S: Into<String>>(message: S, timeout_ms: u64) -> Self {
        Self::Timeout {
            message: message.into(),
            timeout_ms,
        }
    }

    /// Create a wrong state error
    pub fn wrong_state<S: Into<String>>(message: S) -> Self {
        Self::WrongState {
            message: message.into(),
        }
    }

    /// Create an exception error from a received exception response
    pub fn exception(function: u8, code: u8) -> Self {
        Self::Exception { function, code }
    }

    /// Create a connection error
    pub fn connection<S: Into<String>>(message: S) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a protocol error
    pub fn protocol<S: Into<String>>(message: S) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// True for errors worth retrying without operator intervention
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::WouldBlock | Self::Timeout { .. })
    }

    /// True if the error is a deadline expiry
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Exception code carried by the error, if it is an exception response
    pub fn exception_code(&self) -> Option<u8> {
        match self {
            Self::Exception { code, .. } => Some(*code),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ModbusError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::WouldBlock => Self::WouldBlock,
            std::io::ErrorKind::TimedOut => Self::Timeout {
                message: err.to_string(),
                timeout_ms: 0,
            },
            _ => Self::Connection {
                message: err.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructor_helpers() {
        let err = ModbusError::invalid_data("quantity out of range");
        assert!(matches!(err, ModbusError::InvalidData { .. }));
        assert!(err.to_string().contains("quantity out of range"));

        let err = ModbusError::timeout("read response", 5000);
        assert!(err.is_timeout());
        assert!(err.is_transient());
        assert!(err.to_string().contains("5000ms"));

        let err = ModbusError::invalid_function(0x2B);
        assert_eq!(err.to_string(), "Invalid function code: 0x2B");
    }

    #[test]
    fn test_exception_accessor() {
        let err = ModbusError::exception(0x03, 0x02);
        assert_eq!(err.exception_code(), Some(0x02));
        assert!(!err.is_transient());

        let err = ModbusError::wrong_state("not connected");
        assert_eq!(err.exception_code(), None);
    }

    #[test]
    fn test_from_io_error() {
        let err: ModbusError =
            std::io::Error::new(std::io::ErrorKind::WouldBlock, "busy").into();
        assert_eq!(err, ModbusError::WouldBlock);
        assert!(err.is_transient());

        let err: ModbusError =
            std::io::Error::new(std::io::ErrorKind::TimedOut, "deadline").into();
        assert!(err.is_timeout());

        let err: ModbusError =
            std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset").into();
        assert!(matches!(err, ModbusError::Connection { .. }));
        assert!(!err.is_transient());
    }
}
