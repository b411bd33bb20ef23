// Stream frames
//
// One long-lived response carries status frames, then exactly one terminal
// frame (result or error), then an explicit end marker.

use serde::Serialize;

use super::enrichment::EnrichedResult;
use super::error::ErrorKind;
use super::request::RequestState;

/// Terminal success payload
#[derive(Debug, Clone, Serialize)]
pub struct NlQueryResponse {
    pub request_id: String,
    pub store_id: String,
    pub generated_query: String,
    pub executed_query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub cached: bool,
    pub execution_time_ms: u64,
    pub result: EnrichedResult,
}

/// Terminal failure payload
#[derive(Debug, Clone, Serialize)]
pub struct ErrorPayload {
    pub request_id: String,
    pub kind: ErrorKind,
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamFrame {
    Status { stage: RequestState, message: String },
    Result(Box<NlQueryResponse>),
    Error(ErrorPayload),
    End,
}

impl StreamFrame {
    pub fn status(stage: RequestState, message: impl Into<String>) -> Self {
        StreamFrame::Status {
            stage,
            message: message.into(),
        }
    }

    /// SSE event name for this frame
    pub fn event_name(&self) -> &'static str {
        match self {
            StreamFrame::Status { .. } => "status",
            StreamFrame::Result(_) => "result",
            StreamFrame::Error(_) => "error",
            StreamFrame::End => "end",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamFrame::Result(_) | StreamFrame::Error(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_frame_serialization() {
        let frame = StreamFrame::status(RequestState::Translating, "Generating query");
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["type"], "status");
        assert_eq!(json["stage"], "TRANSLATING");
        assert_eq!(frame.event_name(), "status");
        assert!(!frame.is_terminal());
    }

    #[test]
    fn test_error_frame_is_terminal() {
        let frame = StreamFrame::Error(ErrorPayload {
            request_id: "r1".into(),
            kind: ErrorKind::ExecutionTimeout,
            code: ErrorKind::ExecutionTimeout.code().into(),
            message: "slow".into(),
            details: None,
        });
        assert!(frame.is_terminal());
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["kind"], "ExecutionTimeout");
    }
}
