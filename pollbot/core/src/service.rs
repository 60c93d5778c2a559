//! Poll Service
//!
//! The two operations the command layer calls, `poll` and `pollresults`,
//! plus [`PollService::handle`] which answers a wire-protocol request.
//!
//! # Results Flow
//!
//! ```text
//! lookup ──► resolve destination ──► fetch + tally ──► render text + chart
//!                                                              │
//!                                       send text ◄────────────┘
//!                                           │
//!                                       send chart (only if anyone voted)
//! ```
//!
//! Everything that can fail without touching the destination channel
//! (lookup, destination resolution, fetching, chart rendering) happens before
//! the first message is sent, so a failed request posts nothing.

use std::sync::Arc;

use crate::commands::{self, Command, DEFAULT_PREFIX};
use crate::error::{PlatformStep, PollError};
use crate::lifecycle::{CreatePollRequest, PollCreated, PollManager};
use crate::platform::{Attachment, ChartRenderer, ChatPlatform, OutgoingMessage};
use crate::poll::{ChannelId, Poll, PollId};
use crate::presenter::{render_chart, render_text, ChartOutcome, CHART_FILENAME};
use crate::protocol::{CommandOutcome, CommandPayload, CommandRequest, CommandResponse, Invocation};
use crate::registry::PollRegistry;
use crate::tally::{Tally, TallyEngine};

/// Delivered results of one poll
#[derive(Debug, Clone, PartialEq)]
pub struct PollResults {
    /// Poll reported
    pub poll_id: PollId,
    /// Channel the results went to
    pub destination: ChannelId,
    /// Results text as posted
    pub text: String,
    /// Chart bytes as posted; `None` when nobody has voted
    pub chart: Option<Vec<u8>>,
    /// Per-option votes
    pub tally: Tally,
}

/// Command-facing poll operations
///
/// Cheap to clone; clones share the registry and collaborators.
#[derive(Clone)]
pub struct PollService {
    manager: PollManager,
    engine: TallyEngine,
    platform: Arc<dyn ChatPlatform>,
    chart: Arc<dyn ChartRenderer>,
    prefix: String,
}

impl PollService {
    /// Create a service with the default command prefix and no announcements
    pub fn new(
        registry: PollRegistry,
        platform: Arc<dyn ChatPlatform>,
        chart: Arc<dyn ChartRenderer>,
    ) -> Self {
        Self {
            manager: PollManager::new(registry.clone(), Arc::clone(&platform)),
            engine: TallyEngine::new(registry, Arc::clone(&platform)),
            platform,
            chart,
            prefix: DEFAULT_PREFIX.to_string(),
        }
    }

    /// Announce new polls in `channel`
    #[must_use]
    pub fn with_announcement_channel(mut self, channel: Option<ChannelId>) -> Self {
        self.manager = self.manager.with_announcement_channel(channel);
        self
    }

    /// Use a different text command prefix
    #[must_use]
    pub fn with_command_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Registry polls are stored in
    #[must_use]
    pub fn registry(&self) -> &PollRegistry {
        self.manager.registry()
    }

    /// Text command prefix in use
    #[must_use]
    pub fn command_prefix(&self) -> &str {
        &self.prefix
    }

    /// Create a poll in the invoking channel
    ///
    /// # Errors
    ///
    /// See [`PollManager::create_poll`].
    pub async fn poll(
        &self,
        invocation: &Invocation,
        question: &str,
        options: Vec<Option<String>>,
    ) -> Result<PollCreated, PollError> {
        self.manager
            .create_poll(CreatePollRequest {
                question: question.to_string(),
                options,
                channel: invocation.channel,
                guild: invocation.guild,
            })
            .await
    }

    /// Post the current results of a poll
    ///
    /// Results go to the channel named `destination_name` in the invoking
    /// guild, or to the invoking channel when no name is given.
    ///
    /// # Errors
    ///
    /// - [`PollError::PollNotFound`] without contacting the platform
    /// - [`PollError::DestinationNotFound`] before anything is sent
    /// - [`PollError::MessageUnavailable`] if the poll message was deleted
    /// - [`PollError::ChatPlatform`] or [`PollError::Chart`] on collaborator
    ///   failure
    pub async fn pollresults(
        &self,
        invocation: &Invocation,
        poll_id: PollId,
        destination_name: Option<&str>,
    ) -> Result<PollResults, PollError> {
        let poll = self.engine.lookup(poll_id).await?;
        let destination = self.resolve(invocation, &poll, destination_name).await?;
        let tally = self.engine.tally_live(&poll).await?;

        let text = render_text(&poll, &tally);
        let chart = match render_chart(&tally, self.chart.as_ref())? {
            ChartOutcome::Image(bytes) => Some(bytes),
            ChartOutcome::NoVotes => None,
        };

        self.send(destination, &OutgoingMessage::text(text.clone()))
            .await?;
        if let Some(bytes) = &chart {
            let file = Attachment::png(CHART_FILENAME, bytes.clone());
            self.send(destination, &OutgoingMessage::attachment(file))
                .await?;
        }

        tracing::info!(
            poll_id = %poll.id,
            destination = %destination,
            total = tally.total(),
            chart = chart.is_some(),
            "Poll results delivered"
        );

        Ok(PollResults {
            poll_id,
            destination,
            text,
            chart,
            tally,
        })
    }

    /// Answer one protocol request
    ///
    /// Never fails: errors become [`CommandOutcome::Rejected`].
    pub async fn handle(&self, request: CommandRequest) -> CommandResponse {
        let CommandRequest {
            request_id,
            invocation,
            command,
        } = request;

        let outcome = self.dispatch(&invocation, command).await;
        if let CommandOutcome::Rejected { kind, .. } = &outcome {
            tracing::info!(
                request_id = %request_id,
                channel = %invocation.channel,
                user = invocation.user.as_deref().unwrap_or("-"),
                kind = %kind,
                "Command rejected"
            );
        }

        CommandResponse {
            request_id,
            outcome,
        }
    }

    async fn dispatch(&self, invocation: &Invocation, payload: CommandPayload) -> CommandOutcome {
        let command = match payload {
            CommandPayload::Poll { question, options } => Command::Poll { question, options },
            CommandPayload::PollResults { poll_id, channel } => {
                Command::PollResults { poll_id, channel }
            }
            CommandPayload::Text { line } => match commands::parse(&self.prefix, &line) {
                Ok(Some(command)) => command,
                Ok(None) => return CommandOutcome::Ignored,
                Err(e) => return CommandOutcome::rejected(e.kind(), e.user_message()),
            },
        };

        let result = match command {
            Command::Poll { question, options } => self
                .poll(invocation, &question, options)
                .await
                .map(|created| CommandOutcome::from(&created)),
            Command::PollResults { poll_id, channel } => self
                .pollresults(invocation, poll_id, channel.as_deref())
                .await
                .map(|results| CommandOutcome::from(&results)),
        };

        result.unwrap_or_else(|e| CommandOutcome::rejected(e.kind(), e.user_message()))
    }

    async fn resolve(
        &self,
        invocation: &Invocation,
        poll: &Poll,
        name: Option<&str>,
    ) -> Result<ChannelId, PollError> {
        let Some(name) = name else {
            return Ok(invocation.channel);
        };
        let guild = invocation.guild.or(poll.guild);
        self.platform
            .resolve_destination(guild, name)
            .await
            .map_err(|e| PollError::platform(PlatformStep::ResolveDestination, e))?
            .ok_or_else(|| PollError::DestinationNotFound(name.to_string()))
    }

    async fn send(&self, channel: ChannelId, message: &OutgoingMessage) -> Result<(), PollError> {
        self.platform
            .send_message(channel, message)
            .await
            .map(|_| ())
            .map_err(|e| PollError::platform(PlatformStep::SendResults, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ballot::MARKERS;
    use crate::platform::test_utils::{
        PlatformCall, RecordingChart, RecordingPlatform, FAKE_PNG, FIRST_MESSAGE_ID,
    };
    use crate::platform::{PlatformError, ReactionCounts};
    use crate::poll::{GuildId, MessageId};
    use crate::protocol::RequestId;

    const HERE: ChannelId = ChannelId(10);
    const GUILD: GuildId = GuildId(1);

    struct Harness {
        platform: Arc<RecordingPlatform>,
        chart: Arc<RecordingChart>,
        service: PollService,
    }

    fn harness() -> Harness {
        let platform = Arc::new(RecordingPlatform::new().with_channel("results", ChannelId(77)));
        let chart = Arc::new(RecordingChart::new());
        let service = PollService::new(PollRegistry::in_memory(), platform.clone(), chart.clone());
        Harness {
            platform,
            chart,
            service,
        }
    }

    fn invocation() -> Invocation {
        Invocation::in_guild(HERE, GUILD)
    }

    fn slots(options: &[&str]) -> Vec<Option<String>> {
        options.iter().map(|o| Some((*o).to_string())).collect()
    }

    async fn create(h: &Harness) -> PollId {
        h.service
            .poll(&invocation(), "Best fruit?", slots(&["Apple", "Banana", "Cherry"]))
            .await
            .unwrap()
            .poll
            .id
    }

    #[tokio::test]
    async fn test_results_to_invoking_channel() {
        let h = harness();
        let id = create(&h).await;
        h.platform.set_reactions(
            id,
            ReactionCounts::new()
                .with(MARKERS[0], 3)
                .with(MARKERS[1], 1)
                .with(MARKERS[2], 6),
        );

        let results = h.service.pollresults(&invocation(), id, None).await.unwrap();
        assert_eq!(results.destination, HERE);
        assert!(results
            .text
            .ends_with("Apple: 2 votes\nBanana: 0 votes\nCherry: 5 votes"));
        assert_eq!(results.chart.as_deref(), Some(FAKE_PNG));

        let sent = h.platform.sent_messages();
        // poll message, results text, chart
        assert_eq!(sent.len(), 3);
        assert_eq!(sent[1].1.content.as_deref(), Some(results.text.as_str()));
        assert_eq!(
            sent[2].1.attachment.as_ref().unwrap().filename,
            "poll_results.png"
        );
    }

    #[tokio::test]
    async fn test_results_to_named_channel() {
        let h = harness();
        let id = create(&h).await;
        h.platform
            .set_reactions(id, ReactionCounts::new().with(MARKERS[0], 2));

        let results = h
            .service
            .pollresults(&invocation(), id, Some("results"))
            .await
            .unwrap();
        assert_eq!(results.destination, ChannelId(77));
        assert!(h
            .platform
            .calls()
            .contains(&PlatformCall::ResolveDestination {
                guild: Some(GUILD),
                name: "results".into()
            }));
    }

    #[tokio::test]
    async fn test_unknown_destination_sends_nothing() {
        let h = harness();
        let id = create(&h).await;
        let before = h.platform.sent_messages().len();

        let result = h
            .service
            .pollresults(&invocation(), id, Some("nowhere"))
            .await;
        assert!(matches!(result, Err(PollError::DestinationNotFound(ref n)) if n == "nowhere"));
        assert_eq!(h.platform.sent_messages().len(), before);
        assert!(h.chart.renders().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_poll_contacts_nothing() {
        let h = harness();
        let result = h
            .service
            .pollresults(&invocation(), MessageId(12345), Some("results"))
            .await;
        assert!(matches!(result, Err(PollError::PollNotFound(_))));
        assert_eq!(h.platform.call_count(), 0);
    }

    #[tokio::test]
    async fn test_no_votes_skips_chart() {
        let h = harness();
        let id = create(&h).await;

        let results = h.service.pollresults(&invocation(), id, None).await.unwrap();
        assert!(results.chart.is_none());
        assert!(results.text.ends_with("No votes yet."));
        assert!(h.chart.renders().is_empty());
        // poll message and results text only
        assert_eq!(h.platform.sent_messages().len(), 2);
    }

    #[tokio::test]
    async fn test_handle_text_commands() {
        let h = harness();
        let response = h
            .service
            .handle(CommandRequest {
                request_id: RequestId::new("a"),
                invocation: invocation(),
                command: CommandPayload::Text {
                    line: r#"!poll "Best fruit?" Apple Banana"#.into(),
                },
            })
            .await;
        assert_eq!(response.request_id, RequestId::new("a"));
        assert!(matches!(
            response.outcome,
            CommandOutcome::PollCreated { poll_id: MessageId(FIRST_MESSAGE_ID), announced: false, .. }
        ));

        let response = h
            .service
            .handle(CommandRequest {
                request_id: RequestId::new("b"),
                invocation: invocation(),
                command: CommandPayload::Text {
                    line: "just chatting".into(),
                },
            })
            .await;
        assert_eq!(response.outcome, CommandOutcome::Ignored);
    }

    #[tokio::test]
    async fn test_handle_rejections_carry_user_text() {
        let h = harness();
        let cases = [
            (
                CommandPayload::Poll {
                    question: "Q".into(),
                    options: slots(&["only"]),
                },
                "too_few_options",
                "You need at least two options to create a poll.",
            ),
            (
                CommandPayload::PollResults {
                    poll_id: MessageId(1),
                    channel: None,
                },
                "poll_not_found",
                "Poll not found.",
            ),
            (
                CommandPayload::Text {
                    line: "!pollresults xyz".into(),
                },
                "invalid_poll_id",
                "'xyz' is not a valid poll ID.",
            ),
        ];

        for (command, kind, message) in cases {
            let response = h
                .service
                .handle(CommandRequest {
                    request_id: RequestId::new(kind),
                    invocation: invocation(),
                    command,
                })
                .await;
            assert_eq!(response.outcome, CommandOutcome::rejected(kind, message));
        }
        assert_eq!(h.platform.call_count(), 0);
    }

    #[tokio::test]
    async fn test_results_send_failure_names_step() {
        let h = harness();
        let id = create(&h).await;
        h.platform.fail_sends_to(HERE);

        let result = h.service.pollresults(&invocation(), id, None).await;
        assert!(matches!(
            result,
            Err(PollError::ChatPlatform {
                step: PlatformStep::SendResults,
                source: PlatformError::SendFailed(_)
            })
        ));
    }

    #[tokio::test]
    async fn test_custom_prefix() {
        let h = harness();
        let service = h.service.clone().with_command_prefix("?");
        assert_eq!(service.command_prefix(), "?");

        let response = service
            .handle(CommandRequest {
                request_id: RequestId::new("p"),
                invocation: invocation(),
                command: CommandPayload::Text {
                    line: "!poll Q A B".into(),
                },
            })
            .await;
        assert_eq!(response.outcome, CommandOutcome::Ignored);
    }
}
