// User-facing error messages
//
// Raw failure text is matched against a small ordered table of substrings.
// Unmatched text is only shown outside production; production callers get
// the plain-language default for the error kind.

use crate::models::PipelineError;

const MESSAGE_TABLE: &[(&str, &str)] = &[
    ("rate limit", "The translation service is busy. Please wait a moment and try again."),
    ("context length", "Your question needs too much schema context. Try asking about fewer tables."),
    ("permission denied", "You do not have permission to access the requested data."),
    ("access denied", "You do not have permission to access the requested data."),
    ("does not exist", "The query referenced a table or column that does not exist. Please rephrase your question."),
    ("unknown column", "The query referenced a column that does not exist. Please rephrase your question."),
    ("doesn't exist", "The query referenced a table that does not exist. Please rephrase your question."),
    ("statement timeout", "The query took too long to run. Try narrowing your question."),
    ("timed out", "The request took too long. Please try again with a simpler question."),
    ("connection refused", "The database is currently unreachable. Please try again later."),
    ("not allowed", "Only read-only queries can be run."),
    ("syntax", "The generated query is not valid for this database. Please rephrase your question."),
];

/// What the caller sees for a failure
#[derive(Debug, Clone, PartialEq)]
pub struct UserMessage {
    pub message: String,
    /// Raw failure text, never set in production
    pub details: Option<String>,
}

pub fn lookup(raw: &str) -> Option<&'static str> {
    let lowered = raw.to_lowercase();
    MESSAGE_TABLE
        .iter()
        .find(|(needle, _)| lowered.contains(needle))
        .map(|(_, message)| *message)
}

pub fn user_message(error: &PipelineError, production: bool) -> UserMessage {
    let message = match lookup(&error.message) {
        Some(message) => message.to_string(),
        None if production || error.message.trim().is_empty() => error.kind.default_message().to_string(),
        None => error.message.clone(),
    };

    UserMessage {
        message,
        details: (!production).then(|| error.message.clone()),
    }
}
