//! Command Protocol
//!
//! Messages exchanged between a command front end (a gateway relay, a CLI,
//! a test harness) and the poll daemon. Each [`CommandRequest`] gets exactly
//! one [`CommandResponse`] with the same request id.
//!
//! The front end does all platform event handling; it only forwards who
//! invoked a command and where. A `/poll` interaction is relayed as
//! [`CommandPayload::Poll`] with its `option1`..`option10` values as the
//! slots. The daemon answers with what happened and the text to show the
//! invoker when the command was rejected.

use serde::{Deserialize, Serialize};

use crate::lifecycle::{AttachWarning, PollCreated};
use crate::poll::{ChannelId, GuildId, PollId};
use crate::service::PollResults;
use crate::tally::Tally;

/// Caller-chosen id correlating a response with its request
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub String);

impl RequestId {
    /// Wrap an id string
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where and by whom a command was issued
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invocation {
    /// Channel the command was typed in
    pub channel: ChannelId,
    /// Guild of that channel (absent in direct messages)
    #[serde(default)]
    pub guild: Option<GuildId>,
    /// Display name of the invoking user, for logs only
    #[serde(default)]
    pub user: Option<String>,
}

impl Invocation {
    /// Invocation in a guild channel
    #[must_use]
    pub fn in_guild(channel: ChannelId, guild: GuildId) -> Self {
        Self {
            channel,
            guild: Some(guild),
            user: None,
        }
    }
}

/// The command itself
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CommandPayload {
    /// Structured `/poll` invocation
    Poll {
        /// Poll question
        question: String,
        /// `option1`..`option10` slots
        options: Vec<Option<String>>,
    },
    /// Structured results request
    PollResults {
        /// Poll to report
        poll_id: PollId,
        /// Named destination channel
        #[serde(default)]
        channel: Option<String>,
    },
    /// A raw chat line, parsed as a text command
    Text {
        /// The message text
        line: String,
    },
}

/// A command sent to the daemon
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandRequest {
    /// Correlation id
    pub request_id: RequestId,
    /// Invocation context
    pub invocation: Invocation,
    /// What to do
    pub command: CommandPayload,
}

/// What came of a command
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CommandOutcome {
    /// A poll was posted and registered
    PollCreated {
        /// The new poll's id
        poll_id: PollId,
        /// Channel holding the poll
        channel: ChannelId,
        /// Markers that failed to attach
        #[serde(default)]
        warnings: Vec<AttachWarning>,
        /// Whether the announcement went out
        announced: bool,
    },
    /// Results were posted
    ResultsDelivered {
        /// Poll reported
        poll_id: PollId,
        /// Channel the results went to
        destination: ChannelId,
        /// Results text as posted
        text: String,
        /// Whether a chart image was posted
        chart_attached: bool,
        /// Per-option votes
        tally: Tally,
    },
    /// The command failed; `message` is meant for the invoker
    Rejected {
        /// Stable failure kind
        kind: String,
        /// Human-readable explanation
        message: String,
    },
    /// The text was not a command
    Ignored,
}

impl CommandOutcome {
    /// Rejection with a kind and user-facing message
    pub fn rejected(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Rejected {
            kind: kind.into(),
            message: message.into(),
        }
    }
}

impl From<&PollCreated> for CommandOutcome {
    fn from(created: &PollCreated) -> Self {
        Self::PollCreated {
            poll_id: created.poll.id,
            channel: created.poll.channel,
            warnings: created.warnings.clone(),
            announced: created.announced,
        }
    }
}

impl From<&PollResults> for CommandOutcome {
    fn from(results: &PollResults) -> Self {
        Self::ResultsDelivered {
            poll_id: results.poll_id,
            destination: results.destination,
            text: results.text.clone(),
            chart_attached: results.chart.is_some(),
            tally: results.tally.clone(),
        }
    }
}

/// The daemon's answer to one request
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CommandResponse {
    /// Id of the request being answered
    pub request_id: RequestId,
    /// Result
    pub outcome: CommandOutcome,
}
