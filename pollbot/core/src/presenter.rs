//! Result Presenter
//!
//! Formats poll markup and tally output. Chart bytes come from a
//! [`ChartRenderer`]; this module only decides whether one is drawn.

use crate::ballot::MARKERS;
use crate::platform::{ChartError, ChartRenderer, Embed, EmbedField, OutgoingMessage};
use crate::poll::{Poll, PollOptions};
use crate::tally::Tally;

/// Poll embed title
pub const POLL_TITLE: &str = "Poll";

/// Poll embed accent colour
pub const POLL_COLOR: u32 = 0x00_ff_00;

/// File name of the results chart attachment
pub const CHART_FILENAME: &str = "poll_results.png";

/// Paragraph appended to results text when nobody has voted
pub const NO_VOTES_TEXT: &str = "No votes yet.";

/// Zero-width space; the platform rejects empty field values
const BLANK_FIELD: &str = "\u{200b}";

/// Result of asking for a chart
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChartOutcome {
    /// Encoded image
    Image(Vec<u8>),
    /// Nothing to draw; the renderer was not called
    NoVotes,
}

/// Build the poll message: question plus one marker-tagged field per option
#[must_use]
pub fn render_poll_message(question: &str, options: &PollOptions) -> OutgoingMessage {
    let fields = options
        .iter()
        .zip(MARKERS)
        .map(|(option, marker)| EmbedField {
            name: format!("{marker} {option}"),
            value: BLANK_FIELD.to_string(),
            inline: false,
        })
        .collect();

    OutgoingMessage::embed(Embed {
        title: POLL_TITLE.to_string(),
        description: format!("**{question}**"),
        color: POLL_COLOR,
        fields,
    })
}

/// Format a tally as text
///
/// ```text
/// **Results for poll: Best fruit?**
///
/// Apple: 2 votes
/// Banana: 0 votes
/// Cherry: 5 votes
/// ```
#[must_use]
pub fn render_text(poll: &Poll, tally: &Tally) -> String {
    let mut lines = Vec::with_capacity(tally.len() + 4);
    lines.push(format!("**Results for poll: {}**", poll.question));
    lines.push(String::new());
    lines.extend(
        tally
            .iter()
            .map(|entry| format!("{}: {} votes", entry.option, entry.votes)),
    );
    if !tally.has_votes() {
        lines.push(String::new());
        lines.push(NO_VOTES_TEXT.to_string());
    }
    lines.join("\n")
}

/// Draw the tally as a chart, unless nobody has voted
///
/// # Errors
///
/// Passes through [`ChartError`] from the renderer.
pub fn render_chart(tally: &Tally, renderer: &dyn ChartRenderer) -> Result<ChartOutcome, ChartError> {
    if !tally.has_votes() {
        return Ok(ChartOutcome::NoVotes);
    }
    renderer
        .render(&tally.labels(), &tally.values())
        .map(ChartOutcome::Image)
}

/// Announcement sent when a poll is created
#[must_use]
pub fn render_announcement(poll: &Poll) -> String {
    format!("Poll created with ID: {} in <#{}>", poll.id, poll.channel)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::test_utils::{RecordingChart, FAKE_PNG};
    use crate::platform::ReactionCounts;
    use crate::poll::{ChannelId, MessageId, PollDraft};
    use crate::tally::tally;
    use pretty_assertions::assert_eq;

    fn fruit_poll() -> Poll {
        let draft = PollDraft::validate(
            "Best fruit?",
            [Some("Apple"), Some("Banana"), Some("Cherry")],
        )
        .unwrap();
        Poll::from_draft(MessageId(99), draft, ChannelId(7), None)
    }

    #[test]
    fn test_poll_message_layout() {
        let poll = fruit_poll();
        let msg = render_poll_message(&poll.question, &poll.options);
        assert!(msg.content.is_none());

        let embed = msg.embed.unwrap();
        assert_eq!(embed.title, "Poll");
        assert_eq!(embed.description, "**Best fruit?**");
        assert_eq!(embed.color, 0x00ff00);
        let names: Vec<&str> = embed.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["1\u{fe0f}\u{20e3} Apple", "2\u{fe0f}\u{20e3} Banana", "3\u{fe0f}\u{20e3} Cherry"]
        );
        assert!(embed.fields.iter().all(|f| f.value == "\u{200b}" && !f.inline));
    }

    #[test]
    fn test_render_text() {
        let poll = fruit_poll();
        let counts = ReactionCounts::new()
            .with(MARKERS[0], 3)
            .with(MARKERS[1], 1)
            .with(MARKERS[2], 6);
        let text = render_text(&poll, &tally(&poll, &counts));
        assert_eq!(
            text,
            "**Results for poll: Best fruit?**\n\nApple: 2 votes\nBanana: 0 votes\nCherry: 5 votes"
        );
    }

    #[test]
    fn test_render_text_no_votes() {
        let poll = fruit_poll();
        let text = render_text(&poll, &tally(&poll, &ReactionCounts::new()));
        assert!(text.ends_with("Cherry: 0 votes\n\nNo votes yet."));
    }

    #[test]
    fn test_chart_skipped_without_votes() {
        let poll = fruit_poll();
        let chart = RecordingChart::new();
        let outcome = render_chart(&tally(&poll, &ReactionCounts::new()), &chart).unwrap();
        assert_eq!(outcome, ChartOutcome::NoVotes);
        assert!(chart.renders().is_empty());
    }

    #[test]
    fn test_chart_receives_labels_and_values() {
        let poll = fruit_poll();
        let chart = RecordingChart::new();
        let counts = ReactionCounts::new().with(MARKERS[2], 3);
        let outcome = render_chart(&tally(&poll, &counts), &chart).unwrap();

        assert_eq!(outcome, ChartOutcome::Image(FAKE_PNG.to_vec()));
        assert_eq!(
            chart.renders(),
            vec![(
                vec!["Apple".to_string(), "Banana".to_string(), "Cherry".to_string()],
                vec![0, 0, 2]
            )]
        );
    }

    #[test]
    fn test_announcement() {
        assert_eq!(
            render_announcement(&fruit_poll()),
            "Poll created with ID: 99 in <#7>"
        );
    }
}
