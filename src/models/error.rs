use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure taxonomy of the natural-language pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    Unauthorized,
    ValidationError,
    RateLimited,
    TranslationTimeout,
    TranslationServiceError,
    TranslationParseError,
    ExecutionSyntaxError,
    ExecutionPermissionError,
    ExecutionTimeout,
    ExecutionConnectionError,
    UnknownInternalError,
}

impl ErrorKind {
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::Unauthorized => "UNAUTHORIZED",
            ErrorKind::ValidationError => "VALIDATION_ERROR",
            ErrorKind::RateLimited => "RATE_LIMITED",
            ErrorKind::TranslationTimeout => "TRANSLATION_TIMEOUT",
            ErrorKind::TranslationServiceError => "TRANSLATION_SERVICE_ERROR",
            ErrorKind::TranslationParseError => "TRANSLATION_PARSE_ERROR",
            ErrorKind::ExecutionSyntaxError => "EXECUTION_SYNTAX_ERROR",
            ErrorKind::ExecutionPermissionError => "EXECUTION_PERMISSION_ERROR",
            ErrorKind::ExecutionTimeout => "EXECUTION_TIMEOUT",
            ErrorKind::ExecutionConnectionError => "EXECUTION_CONNECTION_ERROR",
            ErrorKind::UnknownInternalError => "INTERNAL_ERROR",
        }
    }

    /// Plain-language fallback used when a raw message must not be shown
    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorKind::Unauthorized => "Please sign in to run queries.",
            ErrorKind::ValidationError => "The request is invalid. Please check your question and try again.",
            ErrorKind::RateLimited => "Too many requests. Please wait a moment and try again.",
            ErrorKind::TranslationTimeout => "Generating the query took too long. Please try a simpler question.",
            ErrorKind::TranslationServiceError => "The query could not be generated. Please rephrase your question.",
            ErrorKind::TranslationParseError => "The generated answer could not be understood. Please try again.",
            ErrorKind::ExecutionSyntaxError => "The generated query is not valid for this database. Please rephrase your question.",
            ErrorKind::ExecutionPermissionError => "You do not have permission to access the requested data.",
            ErrorKind::ExecutionTimeout => "The query took too long to run. Try narrowing your question.",
            ErrorKind::ExecutionConnectionError => "The database is currently unreachable. Please try again later.",
            ErrorKind::UnknownInternalError => "Something went wrong while processing your question.",
        }
    }
}

/// A pipeline failure carrying exactly one taxonomy kind
#[derive(Debug, Clone, Error)]
#[error("{}: {message}", kind.code())]
pub struct PipelineError {
    pub kind: ErrorKind,
    pub message: String,
}

impl PipelineError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnknownInternalError, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_uses_code() {
        let err = PipelineError::new(ErrorKind::TranslationTimeout, "no answer within 50s");
        assert_eq!(err.to_string(), "TRANSLATION_TIMEOUT: no answer within 50s");
    }

    #[test]
    fn test_kind_serializes_by_name() {
        let json = serde_json::to_string(&ErrorKind::ExecutionSyntaxError).unwrap();
        assert_eq!(json, "\"ExecutionSyntaxError\"");
    }
}
