//! Error types for the neato-serial library.

use thiserror::Error;

/// The main error type for neato-serial operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Serial port error.
    #[error("serial port error: {0}")]
    Serial(#[from] tokio_serial::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// None of the configured device paths could be opened.
    #[error("no serial device available (tried: {})", tried.join(", "))]
    NoDeviceAvailable { tried: Vec<String> },

    /// A read was attempted without a read timeout.
    ///
    /// Draining relies on the timeout to detect the end of a response, so
    /// reading without one could block forever.
    #[error("serial read timeout is not configured")]
    TimeoutNotConfigured,

    /// Connection is not established.
    #[error("not connected")]
    NotConnected,

    /// Command text cannot be sent as a single line.
    #[error("invalid command: {reason}")]
    InvalidCommand { reason: String },

    /// The USB power-cycle mechanism failed.
    #[error("power switch error: {message}")]
    PowerSwitch { message: String },

    /// Configuration could not be loaded.
    #[error("configuration error: {message}")]
    Config { message: String },
}

/// Result type alias for neato-serial operations.
pub type Result<T> = std::result::Result<T, Error>;
