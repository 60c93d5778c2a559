//! Platform Test Utilities
//!
//! Spy implementations of [`ChatPlatform`] and [`ChartRenderer`] for testing
//! the poll core without a network. Every call is recorded so tests can
//! assert on ordering and on the absence of calls.
//!
//! # Usage
//!
//! ```ignore
//! use pollbot_core::platform::test_utils::{RecordingPlatform, RecordingChart};
//!
//! let platform = RecordingPlatform::new().with_channel("results", ChannelId(77));
//!
//! // Simulate marker 3 failing
//! platform.fail_attach_after(2);
//!
//! // After the test, verify what was sent
//! assert_eq!(platform.call_count(), 0);
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::traits::{
    ChartError, ChartRenderer, ChatPlatform, OutgoingMessage, PlatformError, ReactionCounts,
};
use crate::poll::{ChannelId, GuildId, MessageId};

/// First message id handed out by [`RecordingPlatform`]
pub const FIRST_MESSAGE_ID: u64 = 1000;

/// A recorded collaborator call
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PlatformCall {
    /// `send_message`
    SendMessage {
        /// Target channel
        channel: ChannelId,
        /// Message that was sent
        message: OutgoingMessage,
    },
    /// `attach_marker`
    AttachMarker {
        /// Channel of the message
        channel: ChannelId,
        /// Message reacted to
        message: MessageId,
        /// Marker attached
        marker: String,
    },
    /// `fetch_reaction_counts`
    FetchReactions {
        /// Channel of the message
        channel: ChannelId,
        /// Message read
        message: MessageId,
    },
    /// `resolve_destination`
    ResolveDestination {
        /// Guild searched
        guild: Option<GuildId>,
        /// Name looked up
        name: String,
    },
}

#[derive(Default)]
struct Failures {
    send_to: HashSet<ChannelId>,
    attach_after: Option<usize>,
    attaches_seen: usize,
    gone: HashSet<MessageId>,
    fetch: Option<PlatformError>,
}

/// In-memory chat platform that records every call
pub struct RecordingPlatform {
    calls: Mutex<Vec<PlatformCall>>,
    next_message_id: AtomicU64,
    reactions: Mutex<HashMap<MessageId, ReactionCounts>>,
    channels: Mutex<HashMap<String, ChannelId>>,
    failures: Mutex<Failures>,
}

impl Default for RecordingPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingPlatform {
    /// Create a platform with no channels and no reactions
    #[must_use]
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            next_message_id: AtomicU64::new(FIRST_MESSAGE_ID),
            reactions: Mutex::new(HashMap::new()),
            channels: Mutex::new(HashMap::new()),
            failures: Mutex::new(Failures::default()),
        }
    }

    /// Make a named channel resolvable
    #[must_use]
    pub fn with_channel(self, name: impl Into<String>, id: ChannelId) -> Self {
        self.channels.lock().insert(name.into(), id);
        self
    }

    /// Set the reactions reported for a message
    pub fn set_reactions(&self, message: MessageId, counts: ReactionCounts) {
        self.reactions.lock().insert(message, counts);
    }

    /// Fail every send to a channel
    pub fn fail_sends_to(&self, channel: ChannelId) {
        self.failures.lock().send_to.insert(channel);
    }

    /// Let the first `n` marker attachments succeed and fail the rest
    pub fn fail_attach_after(&self, n: usize) {
        self.failures.lock().attach_after = Some(n);
    }

    /// Report a message as deleted
    pub fn mark_gone(&self, message: MessageId) {
        self.failures.lock().gone.insert(message);
    }

    /// Fail every reaction fetch with `error`
    pub fn fail_fetch(&self, error: PlatformError) {
        self.failures.lock().fetch = Some(error);
    }

    /// All recorded calls, in order
    #[must_use]
    pub fn calls(&self) -> Vec<PlatformCall> {
        self.calls.lock().clone()
    }

    /// Number of recorded calls
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Messages sent, with their channels
    #[must_use]
    pub fn sent_messages(&self) -> Vec<(ChannelId, OutgoingMessage)> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                PlatformCall::SendMessage { channel, message } => {
                    Some((*channel, message.clone()))
                }
                _ => None,
            })
            .collect()
    }

    /// Markers attach was called with for a message, in call order
    #[must_use]
    pub fn attached_markers(&self, message: MessageId) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                PlatformCall::AttachMarker {
                    message: m, marker, ..
                } if *m == message => Some(marker.clone()),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: PlatformCall) {
        self.calls.lock().push(call);
    }
}

#[async_trait]
impl ChatPlatform for RecordingPlatform {
    fn name(&self) -> &'static str {
        "Recording"
    }

    async fn send_message(
        &self,
        channel: ChannelId,
        message: &OutgoingMessage,
    ) -> Result<MessageId, PlatformError> {
        self.record(PlatformCall::SendMessage {
            channel,
            message: message.clone(),
        });
        if self.failures.lock().send_to.contains(&channel) {
            return Err(PlatformError::SendFailed("Missing Permissions".to_string()));
        }
        Ok(MessageId(self.next_message_id.fetch_add(1, Ordering::SeqCst)))
    }

    async fn attach_marker(
        &self,
        channel: ChannelId,
        message: MessageId,
        marker: &str,
    ) -> Result<(), PlatformError> {
        self.record(PlatformCall::AttachMarker {
            channel,
            message,
            marker: marker.to_string(),
        });
        let mut failures = self.failures.lock();
        failures.attaches_seen += 1;
        match failures.attach_after {
            Some(n) if failures.attaches_seen > n => Err(PlatformError::AttachFailed {
                marker: marker.to_string(),
                reason: "connection reset".to_string(),
            }),
            _ => Ok(()),
        }
    }

    async fn fetch_reaction_counts(
        &self,
        channel: ChannelId,
        message: MessageId,
    ) -> Result<ReactionCounts, PlatformError> {
        self.record(PlatformCall::FetchReactions { channel, message });
        {
            let failures = self.failures.lock();
            if failures.gone.contains(&message) {
                return Err(PlatformError::MessageGone);
            }
            if let Some(err) = &failures.fetch {
                return Err(err.clone());
            }
        }
        Ok(self
            .reactions
            .lock()
            .get(&message)
            .cloned()
            .unwrap_or_default())
    }

    async fn resolve_destination(
        &self,
        guild: Option<GuildId>,
        name: &str,
    ) -> Result<Option<ChannelId>, PlatformError> {
        self.record(PlatformCall::ResolveDestination {
            guild,
            name: name.to_string(),
        });
        Ok(self.channels.lock().get(name).copied())
    }
}

/// Chart renderer that records its inputs and returns fixed bytes
#[derive(Default)]
pub struct RecordingChart {
    renders: Mutex<Vec<(Vec<String>, Vec<u64>)>>,
}

/// Bytes returned by [`RecordingChart::render`]
pub const FAKE_PNG: &[u8] = b"\x89PNG fake chart";

impl RecordingChart {
    /// Create a renderer with no recorded renders
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `(labels, values)` pair rendered so far
    #[must_use]
    pub fn renders(&self) -> Vec<(Vec<String>, Vec<u64>)> {
        self.renders.lock().clone()
    }
}

impl ChartRenderer for RecordingChart {
    fn render(&self, labels: &[String], values: &[u64]) -> Result<Vec<u8>, ChartError> {
        self.renders.lock().push((labels.to_vec(), values.to_vec()));
        if values.iter().all(|v| *v == 0) {
            return Err(ChartError::NoVotes);
        }
        Ok(FAKE_PNG.to_vec())
    }
}
