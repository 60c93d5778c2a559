//! Frame Protocol
//!
//! Wire format for daemon commands: length-prefixed JSON with a CRC32
//! checksum.
//!
//! # Frame Format
//!
//! ```text
//! +----------------+----------------+------------------------------------------+
//! | Length (4)     | Checksum (4)   | JSON Payload (variable)                  |
//! | big-endian u32 | CRC32 (BE)     | CommandRequest or CommandResponse        |
//! +----------------+----------------+------------------------------------------+
//! ```
//!
//! Length counts the payload only. The checksum covers the payload only.
//!
//! # Security
//!
//! - Frame size is capped and checked before buffering the payload
//! - Corrupted payloads are rejected before JSON parsing

use serde::{de::DeserializeOwned, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::TransportError;

/// Maximum payload size (10 MiB)
pub const MAX_FRAME_SIZE: usize = 10 * 1024 * 1024;

/// Header size: length + checksum
pub const HEADER_SIZE: usize = 8;

/// Initial decoder buffer capacity
const MIN_BUFFER_CAPACITY: usize = 4096;

/// Socket read chunk size
const READ_CHUNK: usize = 8192;

fn checksum(payload: &[u8]) -> u32 {
    crc32fast::hash(payload)
}

fn be_u32(bytes: &[u8]) -> u32 {
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

/// Encode a message as one frame
///
/// # Errors
///
/// [`TransportError::Serialization`] if JSON encoding fails, or
/// [`TransportError::FrameTooLarge`] if the payload exceeds
/// [`MAX_FRAME_SIZE`].
pub fn encode<T: Serialize>(msg: &T) -> Result<Vec<u8>, TransportError> {
    let json = serde_json::to_vec(msg).map_err(|e| TransportError::Serialization(e.to_string()))?;

    let len = u32::try_from(json.len())
        .ok()
        .filter(|_| json.len() <= MAX_FRAME_SIZE)
        .ok_or(TransportError::FrameTooLarge {
            size: json.len(),
            max: MAX_FRAME_SIZE,
        })?;

    let mut buf = Vec::with_capacity(HEADER_SIZE + json.len());
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(&checksum(&json).to_be_bytes());
    buf.extend_from_slice(&json);
    Ok(buf)
}

/// Stateless frame encoder
#[derive(Debug, Default, Clone, Copy)]
pub struct FrameEncoder;

impl FrameEncoder {
    /// Create an encoder
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Encode a message to bytes
    ///
    /// # Errors
    ///
    /// See [`encode`].
    pub fn encode<T: Serialize>(&self, msg: &T) -> Result<Vec<u8>, TransportError> {
        encode(msg)
    }
}

/// Incremental frame decoder
///
/// Bytes are pushed as they arrive; complete frames are decoded one at a
/// time.
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    read_pos: usize,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    /// Create an empty decoder
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(MIN_BUFFER_CAPACITY),
            read_pos: 0,
        }
    }

    /// Append received bytes
    pub fn push(&mut self, data: &[u8]) {
        // Compact once more than half the buffer is consumed
        if self.read_pos > self.buffer.len() / 2 && self.read_pos > MIN_BUFFER_CAPACITY {
            self.buffer.drain(..self.read_pos);
            self.read_pos = 0;
        }
        self.buffer.extend_from_slice(data);
    }

    /// Bytes buffered but not yet decoded
    #[must_use]
    pub fn available(&self) -> usize {
        self.buffer.len() - self.read_pos
    }

    /// Decode the next complete frame
    ///
    /// Returns `Ok(None)` when more bytes are needed.
    ///
    /// # Errors
    ///
    /// [`TransportError::FrameTooLarge`], [`TransportError::ChecksumMismatch`]
    /// or [`TransportError::Serialization`]. After an error the stream is out
    /// of sync and the connection should be dropped.
    pub fn decode<T: DeserializeOwned>(&mut self) -> Result<Option<T>, TransportError> {
        let available = self.available();
        if available < HEADER_SIZE {
            return Ok(None);
        }

        let header = &self.buffer[self.read_pos..self.read_pos + HEADER_SIZE];
        let len = be_u32(&header[..4]) as usize;
        let expected = be_u32(&header[4..]);

        if len > MAX_FRAME_SIZE {
            return Err(TransportError::FrameTooLarge {
                size: len,
                max: MAX_FRAME_SIZE,
            });
        }
        if available < HEADER_SIZE + len {
            return Ok(None);
        }

        let start = self.read_pos + HEADER_SIZE;
        let end = start + len;
        let payload = &self.buffer[start..end];

        let actual = checksum(payload);
        if actual != expected {
            return Err(TransportError::ChecksumMismatch { expected, actual });
        }

        let msg = serde_json::from_slice(payload)
            .map_err(|e| TransportError::Serialization(e.to_string()))?;
        self.read_pos = end;
        Ok(Some(msg))
    }

    /// Drop all buffered bytes
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.read_pos = 0;
    }
}

/// Reads frames from an async byte stream
pub struct FrameReader<R> {
    reader: R,
    decoder: FrameDecoder,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// Wrap a reader
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            decoder: FrameDecoder::new(),
        }
    }

    /// Read the next message
    ///
    /// Returns `Ok(None)` on a clean end of stream between frames.
    ///
    /// # Errors
    ///
    /// [`TransportError::ConnectionClosed`] if the stream ends inside a
    /// frame, any decode error, or an IO error.
    pub async fn next<T: DeserializeOwned>(&mut self) -> Result<Option<T>, TransportError> {
        let mut buf = [0u8; READ_CHUNK];
        loop {
            if let Some(msg) = self.decoder.decode()? {
                return Ok(Some(msg));
            }
            let n = self.reader.read(&mut buf).await?;
            if n == 0 {
                return if self.decoder.available() == 0 {
                    Ok(None)
                } else {
                    Err(TransportError::ConnectionClosed)
                };
            }
            self.decoder.push(&buf[..n]);
        }
    }

    /// Give back the underlying reader
    pub fn into_inner(self) -> R {
        self.reader
    }
}

/// Encode a message and write it as one frame
///
/// # Errors
///
/// See [`encode`]; IO errors are returned as [`TransportError::Io`].
pub async fn write_frame<W, T>(writer: &mut W, msg: &T) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let bytes = encode(msg)?;
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    Ok(())
}
