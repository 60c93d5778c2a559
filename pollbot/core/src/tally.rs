//! Vote Tally Engine
//!
//! Turns the raw reaction counts on a poll message into per-option votes.
//!
//! # Counting Rule
//!
//! The platform's count for each marker includes the bot's own reaction, so
//! one is subtracted (never going below zero). Reactions that are not ballot
//! markers, or whose position is past the poll's last option, are not part of
//! the ballot and are left out. Options whose marker failed to attach when the
//! poll was created (see [`Poll::unmarked`]) are left out as well, since there
//! is no bot reaction to subtract. Every other option appears in the result,
//! in option order, whether or not anyone reacted.
//!
//! The subtraction assumes the bot's reaction is still present. If someone
//! removes it later, that option is under-counted by one.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{PlatformStep, PollError};
use crate::platform::{ChatPlatform, PlatformError, ReactionCounts};
use crate::poll::{Poll, PollId};
use crate::registry::PollRegistry;

/// Votes for one option
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TallyEntry {
    /// Option text
    pub option: String,
    /// Votes, excluding the bot's own reaction
    pub votes: u64,
}

/// Per-option vote counts for one poll, in option order
///
/// Only options whose marker is on the poll message are listed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    entries: Vec<TallyEntry>,
}

/// Count votes for a poll from its message's reaction counts
///
/// Pure: the poll is only read and the same input always gives the same
/// output.
#[must_use]
pub fn tally(poll: &Poll, counts: &ReactionCounts) -> Tally {
    let entries = poll
        .options
        .iter()
        .enumerate()
        .filter(|(index, _)| poll.is_marked(*index))
        .map(|(index, option)| TallyEntry {
            option: option.to_string(),
            votes: counts
                .raw_for_index(index)
                .map_or(0, |raw| u64::from(raw.saturating_sub(1))),
        })
        .collect();
    Tally { entries }
}

impl Tally {
    /// Entries in option order
    #[must_use]
    pub fn entries(&self) -> &[TallyEntry] {
        &self.entries
    }

    /// Iterate over entries in option order
    pub fn iter(&self) -> impl Iterator<Item = &TallyEntry> {
        self.entries.iter()
    }

    /// Number of entries (the poll's marked options)
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the tally has no entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of all votes
    #[must_use]
    pub fn total(&self) -> u64 {
        self.entries.iter().map(|e| e.votes).sum()
    }

    /// Whether anyone has voted
    #[must_use]
    pub fn has_votes(&self) -> bool {
        self.total() > 0
    }

    /// Option texts, in order
    #[must_use]
    pub fn labels(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.option.clone()).collect()
    }

    /// Vote counts, in order
    #[must_use]
    pub fn values(&self) -> Vec<u64> {
        self.entries.iter().map(|e| e.votes).collect()
    }

    /// Share of the total per option, in percent
    ///
    /// `None` when there are no votes yet.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn percentages(&self) -> Option<Vec<f64>> {
        let total = self.total();
        if total == 0 {
            return None;
        }
        Some(
            self.entries
                .iter()
                .map(|e| e.votes as f64 * 100.0 / total as f64)
                .collect(),
        )
    }

    /// Entries sorted by votes, highest first; ties keep option order
    #[must_use]
    pub fn ranking(&self) -> Vec<&TallyEntry> {
        let mut ranked: Vec<&TallyEntry> = self.entries.iter().collect();
        ranked.sort_by(|a, b| b.votes.cmp(&a.votes));
        ranked
    }

    /// Every option sharing the highest count
    ///
    /// Empty when there are no votes.
    #[must_use]
    pub fn leaders(&self) -> Vec<&TallyEntry> {
        let top = self.entries.iter().map(|e| e.votes).max().unwrap_or(0);
        if top == 0 {
            return Vec::new();
        }
        self.entries.iter().filter(|e| e.votes == top).collect()
    }
}

/// Looks polls up and tallies their live reactions
#[derive(Clone)]
pub struct TallyEngine {
    registry: PollRegistry,
    platform: Arc<dyn ChatPlatform>,
}

impl TallyEngine {
    /// Create an engine over a registry and platform
    pub fn new(registry: PollRegistry, platform: Arc<dyn ChatPlatform>) -> Self {
        Self { registry, platform }
    }

    /// Look a poll up, or fail with [`PollError::PollNotFound`]
    ///
    /// Does not contact the platform.
    ///
    /// # Errors
    ///
    /// [`PollError::PollNotFound`] or [`PollError::Store`].
    pub async fn lookup(&self, id: PollId) -> Result<Arc<Poll>, PollError> {
        self.registry
            .lookup(id)
            .await?
            .ok_or(PollError::PollNotFound(id))
    }

    /// Tally the current reactions of an already looked-up poll
    ///
    /// # Errors
    ///
    /// [`PollError::MessageUnavailable`] when the message is gone, otherwise
    /// [`PollError::ChatPlatform`] for the fetch step. Nothing is retried.
    pub async fn tally_live(&self, poll: &Poll) -> Result<Tally, PollError> {
        let counts = self
            .platform
            .fetch_reaction_counts(poll.channel, poll.id)
            .await
            .map_err(|e| match e {
                PlatformError::MessageGone => PollError::MessageUnavailable(poll.id),
                other => PollError::platform(PlatformStep::FetchReactions, other),
            })?;

        let result = tally(poll, &counts);
        tracing::debug!(
            poll_id = %poll.id,
            reactions = counts.len(),
            total = result.total(),
            "Tallied poll"
        );
        Ok(result)
    }

    /// Look a poll up and tally its current reactions
    ///
    /// # Errors
    ///
    /// See [`TallyEngine::lookup`] and [`TallyEngine::tally_live`].
    pub async fn tally_poll(&self, id: PollId) -> Result<(Arc<Poll>, Tally), PollError> {
        let poll = self.lookup(id).await?;
        let result = self.tally_live(&poll).await?;
        Ok((poll, result))
    }
}
