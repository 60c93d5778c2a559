//! Poll Lifecycle Manager
//!
//! Creates polls. A creation runs in a fixed order:
//!
//! ```text
//! validate ──► send poll message ──► attach markers ──► register ──► announce
//!    │               │                 (all tried,         │         (best
//!    ▼               ▼                 failures kept)      ▼          effort)
//! rejected,      error, nothing                          Arc<Poll>
//! no calls       registered
//! ```
//!
//! The poll id is the id of the sent message, so nothing can be registered
//! before the message exists. Once the message is visible the poll is never
//! abandoned: failed markers become [`AttachWarning`]s and their positions
//! are recorded on the poll, which keeps those options out of the tally.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::ballot::MARKERS;
use crate::error::{PlatformStep, PollError};
use crate::platform::{ChatPlatform, OutgoingMessage};
use crate::poll::{ChannelId, GuildId, Poll, PollDraft};
use crate::presenter::{render_announcement, render_poll_message};
use crate::registry::PollRegistry;

/// A request to create a poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatePollRequest {
    /// Poll question
    pub question: String,
    /// Option slots; unset and blank slots are dropped
    pub options: Vec<Option<String>>,
    /// Channel to post the poll in
    pub channel: ChannelId,
    /// Guild of the channel
    pub guild: Option<GuildId>,
}

/// A marker that could not be attached to the poll message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachWarning {
    /// Option position the marker stands for
    pub index: usize,
    /// The marker symbol
    pub marker: String,
    /// Platform-reported reason
    pub reason: String,
}

/// Outcome of a successful poll creation
#[derive(Debug, Clone)]
pub struct PollCreated {
    /// The registered poll
    pub poll: Arc<Poll>,
    /// Markers that failed to attach, in option order
    pub warnings: Vec<AttachWarning>,
    /// Whether the announcement was delivered (false when none is configured)
    pub announced: bool,
}

impl PollCreated {
    /// Whether every marker was attached
    #[must_use]
    pub fn fully_marked(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// Creates polls and registers them
#[derive(Clone)]
pub struct PollManager {
    registry: PollRegistry,
    platform: Arc<dyn ChatPlatform>,
    announcement_channel: Option<ChannelId>,
}

impl PollManager {
    /// Create a manager with no announcement channel
    pub fn new(registry: PollRegistry, platform: Arc<dyn ChatPlatform>) -> Self {
        Self {
            registry,
            platform,
            announcement_channel: None,
        }
    }

    /// Announce every new poll in `channel`
    #[must_use]
    pub fn with_announcement_channel(mut self, channel: Option<ChannelId>) -> Self {
        self.announcement_channel = channel;
        self
    }

    /// Registry polls are stored in
    #[must_use]
    pub fn registry(&self) -> &PollRegistry {
        &self.registry
    }

    /// Create a poll
    ///
    /// # Errors
    ///
    /// - [`PollError::Validation`] before any platform call
    /// - [`PollError::ChatPlatform`] with [`PlatformStep::SendPoll`] if the
    ///   poll message could not be sent (nothing is registered)
    /// - [`PollError::Store`] if registration fails
    pub async fn create_poll(&self, request: CreatePollRequest) -> Result<PollCreated, PollError> {
        let draft = PollDraft::validate(&request.question, request.options)?;

        let message = render_poll_message(&draft.question, &draft.options);
        let message_id = self
            .platform
            .send_message(request.channel, &message)
            .await
            .map_err(|e| PollError::platform(PlatformStep::SendPoll, e))?;

        let mut warnings = Vec::new();
        for (index, marker) in MARKERS.iter().take(draft.options.len()).enumerate() {
            if let Err(e) = self
                .platform
                .attach_marker(request.channel, message_id, marker)
                .await
            {
                tracing::warn!(
                    message_id = %message_id,
                    marker = %marker,
                    error = %e,
                    "Failed to attach ballot marker"
                );
                warnings.push(AttachWarning {
                    index,
                    marker: (*marker).to_string(),
                    reason: e.to_string(),
                });
            }
        }

        let poll = Poll::from_draft(message_id, draft, request.channel, request.guild)
            .with_unmarked(warnings.iter().map(|w| w.index).collect());
        let poll = self.registry.register(poll).await?;

        let announced = self.announce(&poll).await;

        tracing::info!(
            poll_id = %poll.id,
            options = poll.options.len(),
            failed_markers = warnings.len(),
            announced,
            "Poll created"
        );

        Ok(PollCreated {
            poll,
            warnings,
            announced,
        })
    }

    async fn announce(&self, poll: &Poll) -> bool {
        let Some(channel) = self.announcement_channel else {
            return false;
        };
        let message = OutgoingMessage::text(render_announcement(poll));
        match self.platform.send_message(channel, &message).await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(
                    poll_id = %poll.id,
                    channel = %channel,
                    error = %e,
                    "Failed to announce poll"
                );
                false
            }
        }
    }
}
