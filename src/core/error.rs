use thiserror::Error;

use super::types::Status;

/// Error types for the link layer
#[derive(Error, Debug)]
pub enum Error {
    #[error("Payload of {len} bytes exceeds the {max} byte frame limit")]
    PayloadTooLarge {
        /// Requested payload length
        len: usize,
        /// Largest payload a frame can carry
        max: usize,
    },

    #[error("Frame checksum verification failed")]
    ChecksumFailed,

    #[error("Queue full: {0}")]
    QueueFull(&'static str),

    #[error("No acknowledgment for sequence {sequence}")]
    AckTimeout {
        /// Sequence number that went unacknowledged
        sequence: u16,
    },

    #[error("Acknowledgment mismatch: expected {expected}, got {actual}")]
    AckMismatch {
        /// Sequence number being waited on
        expected: u16,
        /// Sequence number the ACK carried
        actual: u16,
    },

    #[error("Gave up on sequence {sequence} after {attempts} transmissions")]
    RetryLimitExceeded {
        /// Sequence number of the abandoned frame
        sequence: u16,
        /// Number of transmissions made
        attempts: u32,
    },

    #[error("Medium interrupted: {0}")]
    MediumInterrupted(String),

    #[error("Invalid destination address: {0}")]
    BadAddress(String),

    #[error("Invalid MAC address: {0}")]
    BadMacAddress(String),

    #[error("Illegal argument: {0}")]
    IllegalArgument(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Link closed")]
    Closed,
}

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Creates a new medium interruption error
    pub fn medium(msg: impl Into<String>) -> Self {
        Error::MediumInterrupted(msg.into())
    }

    /// Creates a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Creates a new illegal argument error
    pub fn illegal_argument(msg: impl Into<String>) -> Self {
        Error::IllegalArgument(msg.into())
    }

    /// Status code this error leaves behind when it reaches the facade
    pub fn status(&self) -> Status {
        match self {
            Error::PayloadTooLarge { .. } => Status::BadBufSize,
            Error::QueueFull(_) => Status::InsufficientBufferSpace,
            Error::RetryLimitExceeded { .. } => Status::TxFailed,
            Error::BadAddress(_) => Status::BadAddress,
            Error::BadMacAddress(_) => Status::BadMacAddress,
            Error::IllegalArgument(_) => Status::IllegalArgument,
            Error::Config(_) => Status::RfInitFailed,
            _ => Status::UnspecifiedError,
        }
    }
}
