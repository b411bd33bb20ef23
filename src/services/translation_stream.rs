// Streamed translation response
//
// The gateway answers with a sequence of delta frames. Frames are
// accumulated into one buffer until the terminator, then the buffer is parsed
// exactly once and validated into a typed TranslationResult.
//
// Idle -> Sending -> Receiving(buffer) -> Complete(result) | Failed(kind)

use serde_json::Value;
use thiserror::Error;

use crate::models::{normalize_confidence, ErrorKind, PipelineError, Reasoning, TranslationResult};

const MAX_SUGGESTIONS: usize = 5;
const DONE_MARKER: &str = "[DONE]";

#[derive(Debug, Clone, Error, PartialEq)]
pub enum TranslationError {
    #[error("Translation timed out after {0} seconds")]
    Timeout(u64),

    #[error("Translation service error: {0}")]
    Service(String),

    #[error("Failed to parse translation response: {0}")]
    Parse(String),
}

impl TranslationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TranslationError::Timeout(_) => ErrorKind::TranslationTimeout,
            TranslationError::Service(_) => ErrorKind::TranslationServiceError,
            TranslationError::Parse(_) => ErrorKind::TranslationParseError,
        }
    }
}

impl From<TranslationError> for PipelineError {
    fn from(err: TranslationError) -> Self {
        PipelineError::new(err.kind(), err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TranslationState {
    Idle,
    Sending,
    Receiving { buffer: String },
    Complete(TranslationResult),
    Failed(ErrorKind),
}

/// Incremental reassembly of one streamed translation
#[derive(Debug)]
pub struct TranslationStream {
    state: TranslationState,
    /// Bytes of a line not yet terminated by '\n'
    pending: Vec<u8>,
    terminated: bool,
}

impl Default for TranslationStream {
    fn default() -> Self {
        Self::new()
    }
}

impl TranslationStream {
    pub fn new() -> Self {
        Self {
            state: TranslationState::Idle,
            pending: Vec::new(),
            terminated: false,
        }
    }

    pub fn state(&self) -> &TranslationState {
        &self.state
    }

    pub fn begin(&mut self) -> Result<(), TranslationError> {
        match self.state {
            TranslationState::Idle => {
                self.state = TranslationState::Sending;
                Ok(())
            }
            _ => Err(TranslationError::Service(
                "translation request already started".to_string(),
            )),
        }
    }

    /// Response headers arrived; start collecting frames
    pub fn on_response(&mut self) -> Result<(), TranslationError> {
        match self.state {
            TranslationState::Sending => {
                self.state = TranslationState::Receiving {
                    buffer: String::new(),
                };
                Ok(())
            }
            _ => Err(TranslationError::Service(
                "response received outside of a pending request".to_string(),
            )),
        }
    }

    /// Feed raw body bytes; returns true once the terminator frame was seen
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Result<bool, TranslationError> {
        if self.terminated {
            return Ok(true);
        }
        if !matches!(self.state, TranslationState::Receiving { .. }) {
            return Err(TranslationError::Service(
                "stream data received before the response started".to_string(),
            ));
        }

        self.pending.extend_from_slice(chunk);
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let line_bytes: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line_bytes).trim().to_string();
            self.handle_line(&line)?;
            if self.terminated {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn handle_line(&mut self, line: &str) -> Result<(), TranslationError> {
        if line.is_empty() || line.starts_with(':') || line.starts_with("event:") {
            return Ok(());
        }

        let payload = line.strip_prefix("data:").map(str::trim).unwrap_or(line);
        if payload == DONE_MARKER {
            self.terminated = true;
            return Ok(());
        }

        let frame: Value = match serde_json::from_str(payload) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::debug!("Skipping non-JSON stream frame: {}", e);
                return Ok(());
            }
        };

        if let Some(error) = frame.get("error") {
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| error.to_string());
            return Err(TranslationError::Service(message));
        }

        // OpenAI-style delta, or Ollama-style JSONL
        let delta = frame
            .pointer("/choices/0/delta/content")
            .and_then(Value::as_str)
            .or_else(|| frame.pointer("/message/content").and_then(Value::as_str))
            .or_else(|| frame.get("response").and_then(Value::as_str));

        if let TranslationState::Receiving { buffer } = &mut self.state {
            if let Some(delta) = delta {
                buffer.push_str(delta);
            }
        }

        let finished = frame
            .pointer("/choices/0/finish_reason")
            .map(|reason| !reason.is_null())
            .unwrap_or(false)
            || frame.get("done").and_then(Value::as_bool).unwrap_or(false);
        if finished {
            self.terminated = true;
        }
        Ok(())
    }

    /// Parse the accumulated buffer once and move to Complete or Failed
    pub fn finish(&mut self) -> Result<TranslationResult, TranslationError> {
        if !self.pending.is_empty() {
            let rest = std::mem::take(&mut self.pending);
            let line = String::from_utf8_lossy(&rest).trim().to_string();
            if let Err(e) = self.handle_line(&line) {
                self.fail(&e);
                return Err(e);
            }
        }

        let buffer = match &self.state {
            TranslationState::Receiving { buffer } => buffer.clone(),
            _ => {
                let err = TranslationError::Service("no response was received".to_string());
                self.fail(&err);
                return Err(err);
            }
        };

        if !self.terminated {
            tracing::debug!("Translation stream closed without terminator; parsing what was received");
        }

        match parse_translation(&buffer) {
            Ok(result) => {
                self.state = TranslationState::Complete(result.clone());
                Ok(result)
            }
            Err(e) => {
                self.fail(&e);
                Err(e)
            }
        }
    }

    pub fn fail(&mut self, err: &TranslationError) {
        self.state = TranslationState::Failed(err.kind());
    }
}

/// Strip markdown fences and surrounding prose around the JSON object
fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&text[start..=end])
}

fn clean_query(query: &str) -> String {
    query
        .trim()
        .trim_start_matches("```sql")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
        .trim_end_matches(';')
        .trim()
        .to_string()
}

fn optional_text(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn parse_confidence(value: Option<&Value>) -> Result<Option<f64>, TranslationError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => Ok(n.as_f64().map(normalize_confidence)),
        Some(Value::String(s)) => s
            .trim()
            .trim_end_matches('%')
            .parse::<f64>()
            .map(|raw| Some(normalize_confidence(raw)))
            .map_err(|_| TranslationError::Parse(format!("confidence is not numeric: {}", s))),
        Some(other) => Err(TranslationError::Parse(format!(
            "confidence has unexpected type: {}",
            other
        ))),
    }
}

fn parse_reasoning(value: &Value) -> Result<Reasoning, TranslationError> {
    let obj = value
        .as_object()
        .ok_or_else(|| TranslationError::Parse("reasoning must be an object".to_string()))?;

    let tables = match obj.get("tables") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        Some(Value::String(s)) => vec![s.clone()],
        _ => Vec::new(),
    };

    Ok(Reasoning {
        understanding: optional_text(obj.get("understanding")).unwrap_or_default(),
        tables,
        join_rationale: optional_text(obj.get("join_rationale")),
        filter_rationale: optional_text(obj.get("filter_rationale")),
        sort_rationale: optional_text(obj.get("sort_rationale")),
        confidence: parse_confidence(obj.get("confidence"))?,
    })
}

/// Validate the service's loosely-typed JSON answer into a TranslationResult
pub fn parse_translation(buffer: &str) -> Result<TranslationResult, TranslationError> {
    let json_text = extract_json_object(buffer)
        .ok_or_else(|| TranslationError::Parse("response contains no JSON object".to_string()))?;

    let value: Value = serde_json::from_str(json_text)
        .map_err(|e| TranslationError::Parse(format!("malformed JSON: {}", e)))?;
    let obj = value
        .as_object()
        .ok_or_else(|| TranslationError::Parse("response is not a JSON object".to_string()))?;

    let success = obj
        .get("success")
        .and_then(Value::as_bool)
        .ok_or_else(|| TranslationError::Parse("missing boolean 'success' field".to_string()))?;

    let reasoning = match obj.get("reasoning") {
        None | Some(Value::Null) => None,
        Some(value) => Some(parse_reasoning(value)?),
    };

    let suggestions = match obj.get("suggestions") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .take(MAX_SUGGESTIONS)
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    };

    if success {
        let query = optional_text(obj.get("query"))
            .map(|q| clean_query(&q))
            .filter(|q| !q.is_empty())
            .ok_or_else(|| TranslationError::Parse("successful response has no query".to_string()))?;

        Ok(TranslationResult {
            reasoning,
            query: Some(query),
            summary: optional_text(obj.get("summary")),
            suggestions,
            success: true,
            error: None,
        })
    } else {
        Ok(TranslationResult {
            reasoning,
            query: None,
            summary: None,
            suggestions,
            success: false,
            error: Some(
                optional_text(obj.get("error"))
                    .unwrap_or_else(|| "The question could not be translated".to_string()),
            ),
        })
    }
}
