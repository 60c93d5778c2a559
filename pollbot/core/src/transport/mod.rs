//! Transport Layer for Daemon IPC
//!
//! Carries [`crate::protocol`] messages between a command front end and the
//! poll daemon over a local Unix socket.
//!
//! - [`frame`]: length-prefixed, checksummed JSON frames
//! - [`client`]: request/response client for the daemon socket
//!
//! # Security
//!
//! - The daemon validates the peer UID with `SO_PEERCRED`
//! - Socket files are created with 0600 permissions
//! - No network exposure

#[cfg(unix)]
pub mod client;
pub mod frame;

use std::path::PathBuf;

use thiserror::Error;

#[cfg(unix)]
pub use client::PollClient;
pub use frame::{FrameDecoder, FrameEncoder, FrameReader};

/// Errors from the transport layer
#[derive(Debug, Error)]
pub enum TransportError {
    /// Could not reach the peer
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The peer closed the connection
    #[error("Connection closed")]
    ConnectionClosed,

    /// Message (de)serialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A frame exceeded the size limit
    #[error("Frame size {size} exceeds maximum {max}")]
    FrameTooLarge {
        /// Claimed or actual payload size
        size: usize,
        /// Size limit
        max: usize,
    },

    /// Frame checksum mismatch; the payload was corrupted
    #[error("Checksum mismatch: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch {
        /// Checksum carried in the header
        expected: u32,
        /// Checksum of the received payload
        actual: u32,
    },

    /// The peer answered a different request
    #[error("Response for request {got} while waiting for {expected}")]
    UnexpectedResponse {
        /// Request id we sent
        expected: String,
        /// Request id we got back
        got: String,
    },

    /// IO error from the underlying socket
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Default daemon socket path
///
/// `$XDG_RUNTIME_DIR/pollbot/pollbot.sock`, falling back to
/// `/tmp/pollbot-<uid>/pollbot.sock`.
#[must_use]
pub fn default_socket_path() -> PathBuf {
    runtime_path("pollbot.sock")
}

/// Default daemon PID file path, next to the socket
#[must_use]
pub fn default_pid_path() -> PathBuf {
    runtime_path("pollbot.pid")
}

fn runtime_path(file: &str) -> PathBuf {
    if let Some(runtime_dir) = dirs::runtime_dir() {
        runtime_dir.join("pollbot").join(file)
    } else {
        // SAFETY: getuid has no preconditions and cannot fail
        let uid = unsafe { libc::getuid() };
        PathBuf::from(format!("/tmp/pollbot-{uid}")).join(file)
    }
}
