//! Daemon Client
//!
//! Sends [`CommandRequest`]s to a running poll daemon and waits for the
//! matching [`CommandResponse`]. Requests on one client are answered in
//! order, one at a time.

use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;

use super::frame::{write_frame, FrameReader};
use super::TransportError;
use crate::protocol::{CommandRequest, CommandResponse};

/// Connected client for the daemon socket
pub struct PollClient {
    socket_path: PathBuf,
    reader: FrameReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl PollClient {
    /// Connect to the daemon
    ///
    /// # Errors
    ///
    /// [`TransportError::ConnectionFailed`] if the socket cannot be reached.
    pub async fn connect(socket_path: impl AsRef<Path>) -> Result<Self, TransportError> {
        let socket_path = socket_path.as_ref().to_path_buf();
        let stream = UnixStream::connect(&socket_path).await.map_err(|e| {
            TransportError::ConnectionFailed(format!(
                "Failed to connect to {}: {e}",
                socket_path.display()
            ))
        })?;
        tracing::debug!(socket = %socket_path.display(), "Connected to poll daemon");
        Ok(Self::from_stream(socket_path, stream))
    }

    fn from_stream(socket_path: PathBuf, stream: UnixStream) -> Self {
        let (read_half, writer) = stream.into_split();
        Self {
            socket_path,
            reader: FrameReader::new(read_half),
            writer,
        }
    }

    /// Path of the daemon socket
    #[must_use]
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Send a request and wait for its response
    ///
    /// # Errors
    ///
    /// Transport errors, [`TransportError::ConnectionClosed`] if the daemon
    /// hangs up first, or [`TransportError::UnexpectedResponse`] if the
    /// response carries another request id.
    pub async fn send(&mut self, request: &CommandRequest) -> Result<CommandResponse, TransportError> {
        write_frame(&mut self.writer, request).await?;

        let response: CommandResponse = self
            .reader
            .next()
            .await?
            .ok_or(TransportError::ConnectionClosed)?;

        if response.request_id != request.request_id {
            return Err(TransportError::UnexpectedResponse {
                expected: request.request_id.to_string(),
                got: response.request_id.to_string(),
            });
        }
        Ok(response)
    }

    /// Close the connection
    ///
    /// # Errors
    ///
    /// IO errors from shutting down the write half.
    pub async fn close(mut self) -> Result<(), TransportError> {
        self.writer.shutdown().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{CommandOutcome, CommandPayload, Invocation, RequestId};
    use crate::poll::ChannelId;

    fn request(id: &str) -> CommandRequest {
        CommandRequest {
            request_id: RequestId::new(id),
            invocation: Invocation {
                channel: ChannelId(1),
                guild: None,
                user: None,
            },
            command: CommandPayload::Text {
                line: "hello".into(),
            },
        }
    }

    #[tokio::test]
    async fn test_send_matches_response() {
        let (client_end, server_end) = UnixStream::pair().unwrap();
        let mut client = PollClient::from_stream(PathBuf::from("pair"), client_end);

        let server = tokio::spawn(async move {
            let (read_half, mut write_half) = server_end.into_split();
            let mut reader = FrameReader::new(read_half);
            while let Some(req) = reader.next::<CommandRequest>().await.unwrap() {
                let response = CommandResponse {
                    request_id: req.request_id,
                    outcome: CommandOutcome::Ignored,
                };
                write_frame(&mut write_half, &response).await.unwrap();
            }
        });

        let response = client.send(&request("r1")).await.unwrap();
        assert_eq!(response.outcome, CommandOutcome::Ignored);
        assert_eq!(client.socket_path(), Path::new("pair"));

        client.close().await.unwrap();
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_mismatched_response() {
        let (client_end, server_end) = UnixStream::pair().unwrap();
        let mut client = PollClient::from_stream(PathBuf::from("pair"), client_end);

        tokio::spawn(async move {
            let (read_half, mut write_half) = server_end.into_split();
            let mut reader = FrameReader::new(read_half);
            let _ = reader.next::<CommandRequest>().await;
            let response = CommandResponse {
                request_id: RequestId::new("other"),
                outcome: CommandOutcome::Ignored,
            };
            write_frame(&mut write_half, &response).await.unwrap();
        });

        let result = client.send(&request("mine")).await;
        assert!(matches!(result, Err(TransportError::UnexpectedResponse { .. })));
    }

    #[tokio::test]
    async fn test_connect_missing_socket() {
        let dir = tempfile::tempdir().unwrap();
        let result = PollClient::connect(dir.path().join("absent.sock")).await;
        assert!(matches!(result, Err(TransportError::ConnectionFailed(_))));
    }
}
