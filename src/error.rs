//! Error types for bercon.

use std::io;

use thiserror::Error;

/// Result type alias for bercon operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for bercon.
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("invalid message buffer size")]
    InvalidMessageBufferSize,

    #[error("keep-alive interval must be shorter than 45s")]
    InvalidKeepAlive,

    // Protocol errors
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("login failed")]
    LoginFailed,

    /// An I/O operation or a full command exchange window elapsed. A client
    /// that keeps timing out is most likely disconnected and should be
    /// discarded.
    #[error("timeout")]
    Timeout,

    /// The client was closed while an operation was in flight.
    #[error("client closed")]
    Closed,

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Packet parsing and validation errors.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("invalid packet size")]
    InvalidPacketSize,

    #[error("invalid header")]
    InvalidHeader,

    #[error("invalid end of header")]
    InvalidEndOfHeader,

    #[error("invalid checksum")]
    InvalidChecksum,

    #[error("unknown packet type: {0:#04x}")]
    UnknownPacketType(u8),

    #[error("invalid login response: {0:#04x}")]
    InvalidLoginResponse(u8),
}

impl Error {
    /// Check if error is retryable within a command exchange window.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout)
    }
}
