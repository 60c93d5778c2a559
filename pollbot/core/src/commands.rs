//! Command Layer
//!
//! Parses prefixed text commands and builds the `/poll` slash command
//! definition registered with the platform.
//!
//! # Text Commands
//!
//! ```text
//! !poll "Best fruit?" Apple Banana "Dragon fruit"
//! !pollresults 1234567890 [channel-name]
//! ```
//!
//! Arguments are split with shell quoting rules, so multi-word questions and
//! options need quotes. Lines without the prefix, and unknown command names,
//! are not for us and parse to `Ok(None)`.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use crate::poll::{PollId, MAX_OPTIONS, MIN_OPTIONS};

/// Default text command prefix
pub const DEFAULT_PREFIX: &str = "!";

/// Name of the poll creation command
pub const POLL_COMMAND: &str = "poll";

/// Name of the results command
pub const RESULTS_COMMAND: &str = "pollresults";

/// A parsed command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    /// Create a poll
    Poll {
        /// Poll question
        question: String,
        /// Option slots, as typed
        options: Vec<Option<String>>,
    },
    /// Report results of a poll
    PollResults {
        /// Poll to report
        poll_id: PollId,
        /// Channel to post in, instead of the invoking channel
        channel: Option<String>,
    },
}

/// Errors from text command parsing
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandParseError {
    /// Quotes were not balanced
    #[error("Malformed command: {0}")]
    Quoting(String),

    /// A required argument was not given
    #[error("Missing argument: {0}")]
    MissingArgument(&'static str),

    /// The poll id was not a number
    #[error("Invalid poll id: {0}")]
    InvalidPollId(String),
}

impl CommandParseError {
    /// Stable machine-readable name of the failure kind
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Quoting(_) => "malformed_command",
            Self::MissingArgument(_) => "missing_argument",
            Self::InvalidPollId(_) => "invalid_poll_id",
        }
    }

    /// Text reported back to whoever typed the command
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Quoting(_) => "Could not read that command. Check your quotes.".to_string(),
            Self::MissingArgument(what) => format!("Please provide a {what}."),
            Self::InvalidPollId(raw) => format!("'{raw}' is not a valid poll ID."),
        }
    }
}

/// Parse one line of chat text
///
/// # Errors
///
/// Returns [`CommandParseError`] when the line is one of our commands but its
/// arguments are unusable.
pub fn parse(prefix: &str, line: &str) -> Result<Option<Command>, CommandParseError> {
    let Some(rest) = line.trim_start().strip_prefix(prefix) else {
        return Ok(None);
    };
    let words = shell_words::split(rest).map_err(|e| CommandParseError::Quoting(e.to_string()))?;
    let Some((name, args)) = words.split_first() else {
        return Ok(None);
    };

    match name.as_str() {
        POLL_COMMAND => {
            let (question, options) = args
                .split_first()
                .ok_or(CommandParseError::MissingArgument("question"))?;
            Ok(Some(Command::Poll {
                question: question.clone(),
                options: options.iter().cloned().map(Some).collect(),
            }))
        }
        RESULTS_COMMAND => {
            let raw = args
                .first()
                .ok_or(CommandParseError::MissingArgument("poll ID"))?;
            let poll_id = raw
                .parse()
                .map_err(|_| CommandParseError::InvalidPollId(raw.clone()))?;
            Ok(Some(Command::PollResults {
                poll_id,
                channel: args.get(1).cloned(),
            }))
        }
        _ => Ok(None),
    }
}

const ORDINALS: [&str; MAX_OPTIONS] = [
    "First", "Second", "Third", "Fourth", "Fifth", "Sixth", "Seventh", "Eighth", "Ninth", "Tenth",
];

/// Application command type for chat input (slash) commands
const CHAT_INPUT: u8 = 1;

/// Option type for string arguments
const STRING_OPTION: u8 = 3;

/// The `/poll` slash command definition
#[must_use]
pub fn poll_command_definition() -> Value {
    let mut options = vec![json!({
        "type": STRING_OPTION,
        "name": "question",
        "description": "The poll question.",
        "required": true,
    })];
    options.extend(ORDINALS.iter().enumerate().map(|(i, ordinal)| {
        let required = i < MIN_OPTIONS;
        let description = if required {
            format!("{ordinal} option.")
        } else {
            format!("{ordinal} option (optional).")
        };
        json!({
            "type": STRING_OPTION,
            "name": format!("option{}", i + 1),
            "description": description,
            "required": required,
        })
    }));

    json!({
        "type": CHAT_INPUT,
        "name": POLL_COMMAND,
        "description": format!("Create a poll with up to {MAX_OPTIONS} options."),
        "options": options,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poll::MessageId;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_poll_with_quotes() {
        let cmd = parse("!", r#"!poll "Best fruit?" Apple 'Dragon fruit'"#).unwrap();
        assert_eq!(
            cmd,
            Some(Command::Poll {
                question: "Best fruit?".into(),
                options: vec![Some("Apple".into()), Some("Dragon fruit".into())],
            })
        );
    }

    #[test]
    fn test_parse_poll_without_options_defers_validation() {
        let cmd = parse("!", "!poll Lunch?").unwrap();
        assert_eq!(
            cmd,
            Some(Command::Poll {
                question: "Lunch?".into(),
                options: vec![],
            })
        );
    }

    #[test]
    fn test_parse_poll_missing_question() {
        assert_eq!(
            parse("!", "!poll"),
            Err(CommandParseError::MissingArgument("question"))
        );
    }

    #[test]
    fn test_parse_results() {
        assert_eq!(
            parse("!", "!pollresults 42").unwrap(),
            Some(Command::PollResults {
                poll_id: MessageId(42),
                channel: None,
            })
        );
        assert_eq!(
            parse("!", "  !pollresults 42 results").unwrap(),
            Some(Command::PollResults {
                poll_id: MessageId(42),
                channel: Some("results".into()),
            })
        );
    }

    #[test]
    fn test_parse_results_errors() {
        let err = parse("!", "!pollresults abc").unwrap_err();
        assert_eq!(err, CommandParseError::InvalidPollId("abc".into()));
        assert_eq!(err.user_message(), "'abc' is not a valid poll ID.");

        assert_eq!(
            parse("!", "!pollresults"),
            Err(CommandParseError::MissingArgument("poll ID"))
        );
    }

    #[test]
    fn test_parse_ignores_other_text() {
        assert_eq!(parse("!", "hello there").unwrap(), None);
        assert_eq!(parse("!", "!help").unwrap(), None);
        assert_eq!(parse("!", "!").unwrap(), None);
        assert_eq!(parse("?", "!poll Q A B").unwrap(), None);
    }

    #[test]
    fn test_parse_custom_prefix() {
        assert!(matches!(
            parse("pb ", "pb poll Q A B").unwrap(),
            Some(Command::Poll { .. })
        ));
    }

    #[test]
    fn test_parse_unbalanced_quotes() {
        let err = parse("!", r#"!poll "Best fruit? Apple"#).unwrap_err();
        assert_eq!(err.kind(), "malformed_command");
    }

    #[test]
    fn test_poll_command_definition() {
        let def = poll_command_definition();
        assert_eq!(def["name"], "poll");
        assert_eq!(def["description"], "Create a poll with up to 10 options.");

        let options = def["options"].as_array().unwrap();
        assert_eq!(options.len(), 11);
        assert_eq!(options[0]["name"], "question");
        assert_eq!(options[1]["name"], "option1");
        assert_eq!(options[1]["required"], true);
        assert_eq!(options[2]["required"], true);
        assert_eq!(options[3]["required"], false);
        assert_eq!(options[3]["description"], "Third option (optional).");
        assert_eq!(options[10]["name"], "option10");
    }
}
