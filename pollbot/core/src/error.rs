//! Poll Operation Errors
//!
//! One typed outcome per failure kind, so callers (the service, the daemon)
//! handle each case explicitly and report the right text to the requester.

use std::fmt;

use thiserror::Error;

use crate::platform::{ChartError, PlatformError};
use crate::poll::{PollId, ValidationError};
use crate::registry::StoreError;

/// Which collaborator call failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlatformStep {
    /// Sending the poll message
    SendPoll,
    /// Reading reaction counts
    FetchReactions,
    /// Looking up a destination channel
    ResolveDestination,
    /// Delivering results text or chart
    SendResults,
}

impl PlatformStep {
    /// Stable lowercase name
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SendPoll => "send_poll",
            Self::FetchReactions => "fetch_reactions",
            Self::ResolveDestination => "resolve_destination",
            Self::SendResults => "send_results",
        }
    }
}

impl fmt::Display for PlatformStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors from poll operations
#[derive(Debug, Error)]
pub enum PollError {
    /// The request was rejected before any side effect
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// No poll is registered under this id
    #[error("Poll {0} not found")]
    PollNotFound(PollId),

    /// A named results destination could not be located
    #[error("Destination '{0}' not found")]
    DestinationNotFound(String),

    /// The poll message (or its channel) no longer exists
    #[error("Poll message {0} is no longer available")]
    MessageUnavailable(PollId),

    /// A chat platform call failed
    #[error("Chat platform failed during {step}: {source}")]
    ChatPlatform {
        /// The failing step
        step: PlatformStep,
        /// The platform error
        #[source]
        source: PlatformError,
    },

    /// The chart could not be rendered
    #[error("Chart rendering failed: {0}")]
    Chart(#[from] ChartError),

    /// The poll store failed
    #[error("Poll store failed: {0}")]
    Store(#[from] StoreError),
}

impl PollError {
    /// Wrap a platform error with the step that produced it
    #[must_use]
    pub fn platform(step: PlatformStep, source: PlatformError) -> Self {
        Self::ChatPlatform { step, source }
    }

    /// Stable machine-readable name of the failure kind
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(ValidationError::EmptyQuestion) => "empty_question",
            Self::Validation(ValidationError::TooFewOptions { .. }) => "too_few_options",
            Self::Validation(ValidationError::TooManyOptions { .. }) => "too_many_options",
            Self::Validation(ValidationError::BlankOption { .. }) => "blank_option",
            Self::PollNotFound(_) => "poll_not_found",
            Self::DestinationNotFound(_) => "destination_not_found",
            Self::MessageUnavailable(_) => "message_unavailable",
            Self::ChatPlatform { .. } => "chat_platform",
            Self::Chart(_) => "chart",
            Self::Store(StoreError::DuplicatePoll(_)) => "duplicate_poll",
            Self::Store(_) => "store",
        }
    }

    /// Text reported back to whoever issued the command
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(e) => e.user_message().to_string(),
            Self::PollNotFound(_) => "Poll not found.".to_string(),
            Self::DestinationNotFound(name) => format!("Channel '{name}' not found."),
            Self::MessageUnavailable(_) => {
                "The poll message is no longer available.".to_string()
            }
            Self::ChatPlatform { step, .. } => match step {
                PlatformStep::SendPoll => "Could not post the poll.".to_string(),
                PlatformStep::FetchReactions => "Could not read the poll votes.".to_string(),
                PlatformStep::ResolveDestination => {
                    "Could not look up the results channel.".to_string()
                }
                PlatformStep::SendResults => "Could not post the poll results.".to_string(),
            },
            Self::Chart(_) => "Could not draw the results chart.".to_string(),
            Self::Store(_) => "Could not save the poll.".to_string(),
        }
    }
}
