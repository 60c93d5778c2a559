//! Pollbot Core - Reaction Poll Lifecycle and Vote Tallying
//!
//! This crate holds the poll logic for pollbot, independent of any particular
//! chat platform. Polls are posted as messages, votes are the emoji reactions
//! on those messages, and results are recomputed from the live reaction counts
//! whenever someone asks.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                       Command Front Ends                          │
//! │   /poll, !poll, !pollresults   ──►  CommandRequest (protocol)     │
//! └──────────────────────────────┬───────────────────────────────────┘
//!                                │
//! ┌──────────────────────────────┼───────────────────────────────────┐
//! │                        POLLBOT CORE                               │
//! │  ┌───────────────────────────┴─────────────────────────────────┐  │
//! │  │                       PollService                            │  │
//! │  │  ┌─────────────┐  ┌─────────────┐  ┌──────────────────────┐  │  │
//! │  │  │ PollManager │  │ TallyEngine │  │  Presenter (text,    │  │  │
//! │  │  │ (lifecycle) │  │   (tally)   │  │   embed, chart)      │  │  │
//! │  │  └──────┬──────┘  └──────┬──────┘  └──────────────────────┘  │  │
//! │  │         └───────┬────────┘                                   │  │
//! │  │           PollRegistry ── PollStore (memory / JSON file)     │  │
//! │  └─────────────────────────────────────────────────────────────┘  │
//! └──────────────────────────────┬───────────────────────────────────┘
//!                                │ ChatPlatform / ChartRenderer
//!                    ┌───────────┴────────────┐
//!                    │ DiscordClient (REST)   │  PieChartRenderer (PNG)
//!                    └────────────────────────┘
//! ```
//!
//! # Key Types
//!
//! - [`Poll`]: Immutable poll record, identified by its message id
//! - [`PollManager`]: Validates and creates polls
//! - [`TallyEngine`] / [`tally()`]: Turns reaction counts into votes
//! - [`PollService`]: The `poll` and `pollresults` operations
//! - [`PollRegistry`]: Shared store of live polls
//! - [`ChatPlatform`] / [`ChartRenderer`]: Collaborator seams
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use pollbot_core::{
//!     DiscordClient, Invocation, PieChartRenderer, PollRegistry, PollService,
//! };
//!
//! let discord = DiscordClient::new(token, DEFAULT_API_BASE, timeout)?;
//! let service = PollService::new(
//!     PollRegistry::in_memory(),
//!     Arc::new(discord),
//!     Arc::new(PieChartRenderer::default()),
//! );
//!
//! let created = service
//!     .poll(&invocation, "Best fruit?", vec![Some("Apple".into()), Some("Banana".into())])
//!     .await?;
//! let results = service.pollresults(&invocation, created.poll.id, None).await?;
//! ```
//!
//! # Module Overview
//!
//! - [`ballot`]: Fixed mapping between option positions and marker emoji
//! - [`poll`]: Identifiers, option validation, the `Poll` record
//! - [`registry`]: Poll storage (in-memory or JSON file)
//! - [`lifecycle`]: Poll creation
//! - [`tally`]: Vote counting and statistics
//! - [`presenter`]: Poll markup, results text, chart policy
//! - [`service`]: Command-facing operations and request dispatch
//! - [`commands`]: Text command parsing and slash command definition
//! - [`platform`]: Chat platform trait, Discord client, test doubles
//! - [`chart`]: PNG pie chart renderer
//! - [`protocol`]: Daemon request/response messages
//! - [`transport`]: Framing and the daemon client
//! - [`config`]: TOML/env/CLI configuration
//! - [`error`]: Operation errors

#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod ballot;
pub mod chart;
pub mod commands;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod platform;
pub mod poll;
pub mod presenter;
pub mod protocol;
pub mod registry;
pub mod service;
pub mod tally;
pub mod transport;

// Re-exports for convenience
pub use ballot::{index_for, marker_for, BallotError, MARKERS, MARKER_COUNT};
pub use chart::PieChartRenderer;
pub use commands::{parse as parse_command, Command, CommandParseError};
pub use config::{
    default_config_path, load_config, load_config_from_path, ConfigError, ConfigOverrides,
    ConfigSource, PollbotConfig,
};
pub use error::{PlatformStep, PollError};
pub use lifecycle::{AttachWarning, CreatePollRequest, PollCreated, PollManager};
pub use platform::{
    ChartError, ChartRenderer, ChatPlatform, DiscordClient, OutgoingMessage, PlatformError,
    ReactionCounts, DEFAULT_API_BASE,
};
pub use poll::{
    ChannelId, GuildId, MessageId, Poll, PollDraft, PollId, PollOptions, ValidationError,
    MAX_OPTIONS, MIN_OPTIONS,
};
pub use presenter::{render_chart, render_poll_message, render_text, ChartOutcome};
pub use protocol::{
    CommandOutcome, CommandPayload, CommandRequest, CommandResponse, Invocation, RequestId,
};
pub use registry::{JsonFileStore, MemoryStore, PollRegistry, PollStore, StoreError};
pub use service::{PollResults, PollService};
pub use tally::{tally, Tally, TallyEngine, TallyEntry};
pub use transport::TransportError;
