//! Error types for armlink

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Transport-level status of the last failed bus transaction.
///
/// Carried inside [`Error::Communication`] so callers can tell a wire
/// problem (nothing answered) from a corrupt reply or a servo-reported
/// hardware fault without re-running the transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommStatus {
    /// Transmit failed, nothing was written to the wire
    TxFail,
    /// No reply arrived within the transport timeout
    RxTimeout,
    /// A reply arrived but failed checksum/framing validation
    RxCorrupt,
    /// The servo answered with a non-zero hardware error byte
    ServoError(u8),
}

impl std::fmt::Display for CommStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommStatus::TxFail => write!(f, "transmit failed"),
            CommStatus::RxTimeout => write!(f, "reply timeout"),
            CommStatus::RxCorrupt => write!(f, "corrupt reply"),
            CommStatus::ServoError(code) => write!(f, "servo error {:#04x}", code),
        }
    }
}

/// armlink error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Serial port error
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to open or configure a bus. Fatal to that bus; the caller
    /// must reconnect.
    #[error("Connection error: {0}")]
    Connection(String),

    /// A bus transaction failed after all retries. The bus stays open.
    #[error("Communication error on '{register}': {status}")]
    Communication {
        /// Register the transaction addressed
        register: &'static str,
        /// Last transport status observed
        status: CommStatus,
    },

    /// Corrupt or unreadable calibration data
    #[error("Calibration error: {0}")]
    Calibration(String),

    /// A single read exceeded its budget. Recoverable; caller decides.
    #[error("Timeout waiting for {0}")]
    Timeout(&'static str),

    /// Joint-vector length does not match the chain
    #[error("Dimension mismatch: expected {expected} joint angles, got {actual}")]
    Dimension {
        /// Number of joints in the chain
        expected: usize,
        /// Number of angles supplied
        actual: usize,
    },

    /// Invalid parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Episode container serialization error
    #[error("Encode error: {0}")]
    Encode(String),
}

impl From<postcard::Error> for Error {
    fn from(e: postcard::Error) -> Self {
        Error::Encode(e.to_string())
    }
}
