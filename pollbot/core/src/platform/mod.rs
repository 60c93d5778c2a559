//! Chat Platform Integration
//!
//! This module provides the collaborator interfaces the poll core talks
//! through, plus a concrete Discord client.
//!
//! # Available Platforms
//!
//! - **Discord**: REST API v10 client ([`DiscordClient`])
//! - **Recording**: in-memory spy for tests ([`test_utils::RecordingPlatform`])
//!
//! # Usage
//!
//! ```ignore
//! use pollbot_core::platform::{ChatPlatform, DiscordClient, DEFAULT_API_BASE};
//!
//! let discord = DiscordClient::new(token, DEFAULT_API_BASE, Duration::from_secs(10))?;
//! let counts = discord.fetch_reaction_counts(channel, message).await?;
//! ```

mod discord;
pub mod test_utils;
mod traits;

pub use discord::{DiscordClient, DEFAULT_API_BASE};
pub use traits::{
    Attachment, ChartError, ChartRenderer, ChatPlatform, Embed, EmbedField, OutgoingMessage,
    PlatformError, ReactionCount, ReactionCounts,
};
