//! Collaborator Traits
//!
//! Narrow interfaces the poll core calls out through. This abstraction keeps
//! the lifecycle and tally logic independent of any particular chat platform
//! or chart library.
//!
//! # Design Philosophy
//!
//! The `ChatPlatform` trait provides exactly what polls need:
//! - Sending a message (poll markup, results, announcements)
//! - Attaching a reaction marker to a message
//! - Reading the current reaction counts of a message
//! - Resolving a channel by name
//!
//! Implementations handle platform details (HTTP, auth, rate limits). None of
//! them are expected to retry on behalf of the core.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ballot;
use crate::poll::{ChannelId, GuildId, MessageId};

/// Failures reported by a chat platform client
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlatformError {
    /// The platform refused or failed to create a message
    #[error("Failed to send message: {0}")]
    SendFailed(String),

    /// The platform refused or failed to add a reaction
    #[error("Failed to attach marker {marker}: {reason}")]
    AttachFailed {
        /// Marker that could not be attached
        marker: String,
        /// Platform-provided reason
        reason: String,
    },

    /// Reaction state could not be read
    #[error("Failed to fetch reactions: {0}")]
    FetchFailed(String),

    /// The message (or its channel) no longer exists
    #[error("Message is no longer available")]
    MessageGone,

    /// Channel lookup failed (not the same as "no such channel")
    #[error("Failed to resolve destination: {0}")]
    ResolveFailed(String),

    /// The platform asked us to slow down
    #[error("Rate limited by platform (retry after {retry_after_secs:.1}s)")]
    RateLimited {
        /// Seconds the platform asked us to wait
        retry_after_secs: f64,
    },

    /// The request did not complete in time
    #[error("Platform request timed out")]
    Timeout,

    /// The platform answered with something we could not understand
    #[error("Invalid platform response: {0}")]
    InvalidResponse(String),

    /// Transport-level HTTP failure
    #[error("HTTP error: {0}")]
    Http(String),
}

/// Failures from chart rendering
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChartError {
    /// All values were zero, so shares are undefined
    #[error("No votes to chart")]
    NoVotes,

    /// Labels and values differ in length
    #[error("Chart input mismatch: {labels} labels for {values} values")]
    LengthMismatch {
        /// Number of labels given
        labels: usize,
        /// Number of values given
        values: usize,
    },

    /// Image encoding failed
    #[error("Failed to encode chart: {0}")]
    Encode(String),
}

/// One field of an embed
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedField {
    /// Field heading
    pub name: String,
    /// Field body
    pub value: String,
    /// Whether the field may share a row with others
    pub inline: bool,
}

/// Rich message block
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Embed {
    /// Title line
    pub title: String,
    /// Body text (markdown)
    pub description: String,
    /// Accent colour as 0xRRGGBB
    pub color: u32,
    /// Fields, rendered in order
    pub fields: Vec<EmbedField>,
}

/// File carried by a message
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attachment {
    /// File name shown by the platform
    pub filename: String,
    /// MIME type of the bytes
    pub content_type: String,
    /// File contents
    pub data: Vec<u8>,
}

impl Attachment {
    /// PNG attachment
    pub fn png(filename: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            content_type: "image/png".to_string(),
            data,
        }
    }
}

/// Message to be sent through the platform
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OutgoingMessage {
    /// Plain text content
    pub content: Option<String>,
    /// Optional embed
    pub embed: Option<Embed>,
    /// Optional file
    pub attachment: Option<Attachment>,
}

impl OutgoingMessage {
    /// Text-only message
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Default::default()
        }
    }

    /// Embed-only message
    #[must_use]
    pub fn embed(embed: Embed) -> Self {
        Self {
            embed: Some(embed),
            ..Default::default()
        }
    }

    /// File-only message
    #[must_use]
    pub fn attachment(attachment: Attachment) -> Self {
        Self {
            attachment: Some(attachment),
            ..Default::default()
        }
    }
}

/// Raw count for one reaction symbol on a message
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionCount {
    /// Reaction symbol as reported by the platform
    pub emoji: String,
    /// Number of users (including the bot) who reacted
    pub count: u32,
}

/// All reaction counts on a message, in the order the platform reported them
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionCounts(Vec<ReactionCount>);

impl ReactionCounts {
    /// Empty set of counts
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a reaction count
    pub fn push(&mut self, emoji: impl Into<String>, count: u32) {
        self.0.push(ReactionCount {
            emoji: emoji.into(),
            count,
        });
    }

    /// Builder-style [`ReactionCounts::push`]
    #[must_use]
    pub fn with(mut self, emoji: impl Into<String>, count: u32) -> Self {
        self.push(emoji, count);
        self
    }

    /// Iterate over reported reactions
    pub fn iter(&self) -> impl Iterator<Item = &ReactionCount> {
        self.0.iter()
    }

    /// Number of distinct reactions reported
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no reactions were reported
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Raw count for a ballot position, combining variant spellings
    ///
    /// Returns `None` when no reaction maps to that position.
    #[must_use]
    pub fn raw_for_index(&self, index: usize) -> Option<u32> {
        self.0
            .iter()
            .filter(|r| ballot::index_for(&r.emoji).ok() == Some(index))
            .map(|r| r.count)
            .reduce(u32::saturating_add)
    }
}

impl FromIterator<(String, u32)> for ReactionCounts {
    fn from_iter<T: IntoIterator<Item = (String, u32)>>(iter: T) -> Self {
        Self(
            iter.into_iter()
                .map(|(emoji, count)| ReactionCount { emoji, count })
                .collect(),
        )
    }
}

/// Chat platform client
///
/// Implement this trait to run polls on a different platform.
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    /// Get the platform name (e.g., "Discord")
    fn name(&self) -> &str;

    /// Send a message to a channel and return the new message id
    async fn send_message(
        &self,
        channel: ChannelId,
        message: &OutgoingMessage,
    ) -> Result<MessageId, PlatformError>;

    /// Add the bot's reaction `marker` to a message
    async fn attach_marker(
        &self,
        channel: ChannelId,
        message: MessageId,
        marker: &str,
    ) -> Result<(), PlatformError>;

    /// Read the current reaction counts of a message
    ///
    /// Returns [`PlatformError::MessageGone`] when the message or its channel
    /// has been deleted.
    async fn fetch_reaction_counts(
        &self,
        channel: ChannelId,
        message: MessageId,
    ) -> Result<ReactionCounts, PlatformError>;

    /// Find a channel by name within a guild
    ///
    /// `Ok(None)` means the lookup worked but no channel has that name.
    async fn resolve_destination(
        &self,
        guild: Option<GuildId>,
        name: &str,
    ) -> Result<Option<ChannelId>, PlatformError>;
}

/// Chart renderer
///
/// Turns parallel label/value lists into image bytes. Stateless from the
/// core's point of view.
pub trait ChartRenderer: Send + Sync {
    /// Render the chart
    ///
    /// # Errors
    ///
    /// Implementations return [`ChartError::NoVotes`] when every value is 0.
    fn render(&self, labels: &[String], values: &[u64]) -> Result<Vec<u8>, ChartError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ballot::MARKERS;

    #[test]
    fn test_reaction_counts_raw_for_index() {
        let counts = ReactionCounts::new()
            .with(MARKERS[1], 4)
            .with("\u{1f44d}", 7)
            .with(MARKERS[0], 2);

        assert_eq!(counts.len(), 3);
        assert_eq!(counts.raw_for_index(0), Some(2));
        assert_eq!(counts.raw_for_index(1), Some(4));
        assert_eq!(counts.raw_for_index(2), None);
    }

    #[test]
    fn test_reaction_counts_combines_spellings() {
        let counts = ReactionCounts::new().with(MARKERS[0], 2).with("1\u{20e3}", 3);
        assert_eq!(counts.raw_for_index(0), Some(5));
    }

    #[test]
    fn test_reaction_counts_from_iter() {
        let counts: ReactionCounts = vec![(MARKERS[2].to_string(), 1)].into_iter().collect();
        assert_eq!(counts.raw_for_index(2), Some(1));
    }

    #[test]
    fn test_outgoing_message_builders() {
        let msg = OutgoingMessage::text("hello");
        assert_eq!(msg.content.as_deref(), Some("hello"));
        assert!(msg.embed.is_none());

        let msg = OutgoingMessage::attachment(Attachment::png("a.png", vec![1, 2]));
        assert_eq!(msg.attachment.unwrap().content_type, "image/png");
    }

    #[test]
    fn test_platform_error_display() {
        let err = PlatformError::AttachFailed {
            marker: MARKERS[0].to_string(),
            reason: "Missing Access".to_string(),
        };
        assert!(err.to_string().contains("Missing Access"));
        assert_eq!(
            PlatformError::RateLimited {
                retry_after_secs: 1.5
            }
            .to_string(),
            "Rate limited by platform (retry after 1.5s)"
        );
    }
}
