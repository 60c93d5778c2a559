//! Poll Data Model
//!
//! Identifiers, the validated option list, and the immutable [`Poll`] record.
//!
//! A `Poll` can only be built from a message id, so a poll never exists
//! without the platform message that carries it. Once built it is shared as
//! `Arc<Poll>` and never mutated.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ballot::MARKER_COUNT;

/// Fewest options a poll may have
pub const MIN_OPTIONS: usize = 2;

/// Most options a poll may have (one per ballot marker)
pub const MAX_OPTIONS: usize = MARKER_COUNT;

macro_rules! snowflake_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub u64);

        impl $name {
            /// Get the raw numeric value
            #[must_use]
            pub fn as_u64(&self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim().parse().map(Self)
            }
        }

        impl From<u64> for $name {
            fn from(raw: u64) -> Self {
                Self(raw)
            }
        }
    };
}

snowflake_id!(
    /// Platform identifier of a message
    MessageId
);
snowflake_id!(
    /// Platform identifier of a channel (a message destination)
    ChannelId
);
snowflake_id!(
    /// Platform identifier of a guild (server)
    GuildId
);

/// A poll is identified by the id of the message that carries it
pub type PollId = MessageId;

/// Reasons a poll request is rejected before anything is sent
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The question was empty or whitespace
    #[error("Poll question is empty")]
    EmptyQuestion,

    /// Fewer than [`MIN_OPTIONS`] options remained after dropping blanks
    #[error("Poll needs at least {min} options, got {count}", min = MIN_OPTIONS)]
    TooFewOptions {
        /// Number of usable options supplied
        count: usize,
    },

    /// More than [`MAX_OPTIONS`] options were supplied
    #[error("Poll allows at most {max} options, got {count}", max = MAX_OPTIONS)]
    TooManyOptions {
        /// Number of usable options supplied
        count: usize,
    },

    /// An already-collected option list held an empty entry
    #[error("Poll option {position} is blank")]
    BlankOption {
        /// 1-based position of the blank entry
        position: usize,
    },
}

impl ValidationError {
    /// Text shown to the person who asked for the poll
    #[must_use]
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::EmptyQuestion => "Please provide a poll question.",
            Self::TooFewOptions { .. } => "You need at least two options to create a poll.",
            Self::TooManyOptions { .. } => "You can only create polls with up to 10 options.",
            Self::BlankOption { .. } => "Poll options cannot be blank.",
        }
    }
}

/// Ordered list of 2 to 10 non-empty option texts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct PollOptions(Vec<String>);

impl PollOptions {
    /// Build from option slots, dropping unset and blank entries
    ///
    /// Slots mirror the optional `option1`..`option10` command fields. The
    /// surviving options are trimmed and keep their relative order.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::TooFewOptions`] or
    /// [`ValidationError::TooManyOptions`] when the usable count is outside
    /// `MIN_OPTIONS..=MAX_OPTIONS`.
    pub fn from_slots<I, S>(slots: I) -> Result<Self, ValidationError>
    where
        I: IntoIterator<Item = Option<S>>,
        S: AsRef<str>,
    {
        let options: Vec<String> = slots
            .into_iter()
            .flatten()
            .map(|s| s.as_ref().trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        Self::new(options)
    }

    /// Build from already-collected options
    ///
    /// # Errors
    ///
    /// [`ValidationError::BlankOption`] for the first empty entry, then the
    /// same count rules as [`PollOptions::from_slots`].
    pub fn new(options: Vec<String>) -> Result<Self, ValidationError> {
        if let Some(index) = options.iter().position(|o| o.trim().is_empty()) {
            return Err(ValidationError::BlankOption { position: index + 1 });
        }
        if options.len() < MIN_OPTIONS {
            return Err(ValidationError::TooFewOptions {
                count: options.len(),
            });
        }
        if options.len() > MAX_OPTIONS {
            return Err(ValidationError::TooManyOptions {
                count: options.len(),
            });
        }
        Ok(Self(options))
    }

    /// Number of options
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false; kept for API symmetry with slices
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Option text at a position
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&str> {
        self.0.get(index).map(String::as_str)
    }

    /// Iterate over option texts in order
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Borrow as a slice
    #[must_use]
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

impl TryFrom<Vec<String>> for PollOptions {
    type Error = ValidationError;

    fn try_from(options: Vec<String>) -> Result<Self, Self::Error> {
        Self::new(options)
    }
}

impl From<PollOptions> for Vec<String> {
    fn from(options: PollOptions) -> Self {
        options.0
    }
}

/// Validated question and options, not yet sent anywhere
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollDraft {
    /// Trimmed, non-empty question
    pub question: String,
    /// Validated options
    pub options: PollOptions,
}

impl PollDraft {
    /// Validate a question and option slots
    ///
    /// # Errors
    ///
    /// Returns the first [`ValidationError`] found; the question is checked
    /// before the options.
    pub fn validate<I, S>(question: &str, slots: I) -> Result<Self, ValidationError>
    where
        I: IntoIterator<Item = Option<S>>,
        S: AsRef<str>,
    {
        let question = question.trim();
        if question.is_empty() {
            return Err(ValidationError::EmptyQuestion);
        }
        let options = PollOptions::from_slots(slots)?;
        Ok(Self {
            question: question.to_string(),
            options,
        })
    }
}

/// A live poll, identified by the message that carries it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Poll {
    /// Id of the poll message
    pub id: PollId,
    /// The poll question
    pub question: String,
    /// Options, in marker order
    pub options: PollOptions,
    /// Channel holding the poll message
    pub channel: ChannelId,
    /// Guild holding the channel (absent for direct messages)
    pub guild: Option<GuildId>,
    /// Option positions whose marker never made it onto the message
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unmarked: Vec<usize>,
}

impl Poll {
    /// Mint a poll from a draft once its message exists
    #[must_use]
    pub fn from_draft(
        id: MessageId,
        draft: PollDraft,
        channel: ChannelId,
        guild: Option<GuildId>,
    ) -> Self {
        Self {
            id,
            question: draft.question,
            options: draft.options,
            channel,
            guild,
            unmarked: Vec::new(),
        }
    }

    /// Record option positions whose marker failed to attach
    #[must_use]
    pub fn with_unmarked(mut self, mut indices: Vec<usize>) -> Self {
        indices.sort_unstable();
        indices.dedup();
        self.unmarked = indices;
        self
    }

    /// Whether the marker for option `index` was attached
    #[must_use]
    pub fn is_marked(&self, index: usize) -> bool {
        index < self.options.len() && !self.unmarked.contains(&index)
    }
}
