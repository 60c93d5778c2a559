//! Discord Platform Implementation
//!
//! [`ChatPlatform`] over the Discord REST API (v10).
//!
//! # Discord API
//!
//! - `POST /channels/{channel}/messages` - Send a message (JSON, or multipart with files)
//! - `PUT /channels/{channel}/messages/{message}/reactions/{emoji}/@me` - Add the bot's reaction
//! - `GET /channels/{channel}/messages/{message}` - Read a message with its reaction counts
//! - `GET /guilds/{guild}/channels` - List channels for name lookup
//! - `PUT /applications/{application}/commands` - Register slash commands
//!
//! The client never retries. A 429 is reported as
//! [`PlatformError::RateLimited`] so the caller can decide.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use serde_json::json;

use super::traits::{ChatPlatform, OutgoingMessage, PlatformError, ReactionCounts};
use crate::commands::poll_command_definition;
use crate::poll::{ChannelId, GuildId, MessageId};

/// Default Discord API base URL
pub const DEFAULT_API_BASE: &str = "https://discord.com/api/v10";

/// Channel types a results message can be posted to (text, announcement)
const SENDABLE_CHANNEL_TYPES: [u8; 2] = [0, 5];

/// Longest error body kept in error messages
const MAX_ERROR_BODY: usize = 200;

/// Discord REST client
#[derive(Clone)]
pub struct DiscordClient {
    /// API base URL (e.g. `https://discord.com/api/v10`)
    api_base: Url,
    /// Bot token (sent as `Authorization: Bot <token>`)
    token: String,
    /// HTTP client
    http_client: reqwest::Client,
}

impl std::fmt::Debug for DiscordClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscordClient")
            .field("api_base", &self.api_base.as_str())
            .finish_non_exhaustive()
    }
}

/// Non-success answer from the API, before it is mapped to a step-specific error
enum ApiError {
    Status { status: StatusCode, body: String },
    Platform(PlatformError),
}

impl ApiError {
    fn into_platform(self, wrap: impl FnOnce(String) -> PlatformError) -> PlatformError {
        match self {
            Self::Status { status, body } => wrap(format!("{status}: {}", truncate(&body))),
            Self::Platform(err) => err,
        }
    }
}

#[derive(Deserialize)]
struct CreatedMessage {
    id: String,
}

#[derive(Deserialize)]
struct RateLimitBody {
    #[serde(default)]
    retry_after: f64,
}

#[derive(Deserialize)]
struct MessageBody {
    #[serde(default)]
    reactions: Vec<ReactionBody>,
}

#[derive(Deserialize)]
struct ReactionBody {
    count: u32,
    emoji: EmojiBody,
}

#[derive(Deserialize)]
struct EmojiBody {
    id: Option<String>,
    name: Option<String>,
}

#[derive(Deserialize)]
struct ChannelBody {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(rename = "type")]
    kind: u8,
}

impl DiscordClient {
    /// Create a new client
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::Http`] if the base URL is invalid or the HTTP
    /// client cannot be built.
    pub fn new(
        token: impl Into<String>,
        api_base: &str,
        timeout: Duration,
    ) -> Result<Self, PlatformError> {
        let api_base = Url::parse(api_base)
            .map_err(|e| PlatformError::Http(format!("Invalid API base {api_base}: {e}")))?;
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("pollbot (", env!("CARGO_PKG_VERSION"), ")"))
            .build()
            .map_err(|e| PlatformError::Http(e.to_string()))?;

        Ok(Self {
            api_base,
            token: token.into(),
            http_client,
        })
    }

    /// Build an endpoint URL from path segments (each segment is percent-encoded)
    fn endpoint(&self, segments: &[&str]) -> Result<Url, PlatformError> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|()| PlatformError::Http(format!("Unusable API base: {}", self.api_base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Send a request with bot auth and classify the response status
    async fn execute(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, ApiError> {
        let response = request
            .header(reqwest::header::AUTHORIZATION, format!("Bot {}", self.token))
            .send()
            .await
            .map_err(|e| ApiError::Platform(map_transport_error(&e)))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .json::<RateLimitBody>()
                .await
                .map(|b| b.retry_after)
                .unwrap_or_default();
            tracing::warn!(retry_after_secs, "Discord rate limit hit");
            return Err(ApiError::Platform(PlatformError::RateLimited {
                retry_after_secs,
            }));
        }

        let body = response.text().await.unwrap_or_default();
        tracing::debug!(status = %status, body = %truncate(&body), "Discord request failed");
        Err(ApiError::Status { status, body })
    }

    /// Register the `/poll` slash command for an application
    ///
    /// Overwrites the application's global command list.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::SendFailed`] if Discord rejects the definition.
    pub async fn register_commands(&self, application_id: u64) -> Result<(), PlatformError> {
        let url = self.endpoint(&["applications", &application_id.to_string(), "commands"])?;
        let body = json!([poll_command_definition()]);

        self.execute(self.http_client.put(url).json(&body))
            .await
            .map_err(|e| e.into_platform(PlatformError::SendFailed))?;

        tracing::info!(application_id, "Registered slash commands");
        Ok(())
    }
}

#[async_trait]
impl ChatPlatform for DiscordClient {
    fn name(&self) -> &'static str {
        "Discord"
    }

    async fn send_message(
        &self,
        channel: ChannelId,
        message: &OutgoingMessage,
    ) -> Result<MessageId, PlatformError> {
        let url = self.endpoint(&["channels", &channel.to_string(), "messages"])?;
        let payload = message_payload(message);

        let request = match &message.attachment {
            None => self.http_client.post(url).json(&payload),
            Some(attachment) => {
                let part = Part::bytes(attachment.data.clone())
                    .file_name(attachment.filename.clone())
                    .mime_str(&attachment.content_type)
                    .map_err(|e| PlatformError::SendFailed(e.to_string()))?;
                let form = Form::new()
                    .text("payload_json", payload.to_string())
                    .part("files[0]", part);
                self.http_client.post(url).multipart(form)
            }
        };

        let response = self
            .execute(request)
            .await
            .map_err(|e| e.into_platform(PlatformError::SendFailed))?;

        let created: CreatedMessage = response
            .json()
            .await
            .map_err(|e| PlatformError::InvalidResponse(e.to_string()))?;

        created
            .id
            .parse()
            .map_err(|_| PlatformError::InvalidResponse(format!("Bad message id: {}", created.id)))
    }

    async fn attach_marker(
        &self,
        channel: ChannelId,
        message: MessageId,
        marker: &str,
    ) -> Result<(), PlatformError> {
        let url = self.endpoint(&[
            "channels",
            &channel.to_string(),
            "messages",
            &message.to_string(),
            "reactions",
            marker,
            "@me",
        ])?;

        self.execute(self.http_client.put(url).body(""))
            .await
            .map_err(|e| {
                e.into_platform(|reason| PlatformError::AttachFailed {
                    marker: marker.to_string(),
                    reason,
                })
            })?;
        Ok(())
    }

    async fn fetch_reaction_counts(
        &self,
        channel: ChannelId,
        message: MessageId,
    ) -> Result<ReactionCounts, PlatformError> {
        let url = self.endpoint(&[
            "channels",
            &channel.to_string(),
            "messages",
            &message.to_string(),
        ])?;

        let response = match self.execute(self.http_client.get(url)).await {
            Ok(response) => response,
            Err(ApiError::Status { status, .. }) if status == StatusCode::NOT_FOUND => {
                return Err(PlatformError::MessageGone);
            }
            Err(e) => return Err(e.into_platform(PlatformError::FetchFailed)),
        };

        let body: MessageBody = response
            .json()
            .await
            .map_err(|e| PlatformError::InvalidResponse(e.to_string()))?;
        Ok(reaction_counts(body))
    }

    async fn resolve_destination(
        &self,
        guild: Option<GuildId>,
        name: &str,
    ) -> Result<Option<ChannelId>, PlatformError> {
        let Some(guild) = guild else {
            return Ok(None);
        };
        let url = self.endpoint(&["guilds", &guild.to_string(), "channels"])?;

        let response = self
            .execute(self.http_client.get(url))
            .await
            .map_err(|e| e.into_platform(PlatformError::ResolveFailed))?;

        let channels: Vec<ChannelBody> = response
            .json()
            .await
            .map_err(|e| PlatformError::InvalidResponse(e.to_string()))?;
        Ok(find_channel(&channels, name))
    }
}

fn map_transport_error(e: &reqwest::Error) -> PlatformError {
    if e.is_timeout() {
        PlatformError::Timeout
    } else {
        PlatformError::Http(e.to_string())
    }
}

fn truncate(body: &str) -> &str {
    match body.char_indices().nth(MAX_ERROR_BODY) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

/// JSON payload for a message (also used as `payload_json` for uploads)
fn message_payload(message: &OutgoingMessage) -> serde_json::Value {
    let mut payload = json!({
        // Option text is user input; never let it ping anyone
        "allowed_mentions": { "parse": [] },
    });
    if let Some(content) = &message.content {
        payload["content"] = json!(content);
    }
    if let Some(embed) = &message.embed {
        payload["embeds"] = json!([embed]);
    }
    if let Some(attachment) = &message.attachment {
        payload["attachments"] = json!([{ "id": 0, "filename": attachment.filename }]);
    }
    payload
}

fn reaction_counts(body: MessageBody) -> ReactionCounts {
    body.reactions
        .into_iter()
        .filter_map(|r| {
            let name = r.emoji.name?;
            let emoji = match r.emoji.id {
                Some(id) => format!("{name}:{id}"),
                None => name,
            };
            Some((emoji, r.count))
        })
        .collect()
}

fn find_channel(channels: &[ChannelBody], name: &str) -> Option<ChannelId> {
    let name = name.trim().trim_start_matches('#');
    channels
        .iter()
        .filter(|c| SENDABLE_CHANNEL_TYPES.contains(&c.kind))
        .find(|c| c.name.as_deref() == Some(name))
        .and_then(|c| c.id.parse().ok())
}
