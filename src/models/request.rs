use serde::{Deserialize, Serialize};

pub const MAX_QUESTION_CHARS: usize = 1000;
pub const MAX_STORE_ID_CHARS: usize = 100;
pub const MAX_CONTEXT_CHARS: usize = 2000;

/// A natural-language question addressed to one target store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    pub question: String,
    pub store_id: String,
    #[serde(default)]
    pub context: Option<PriorTurn>,
}

/// The previous turn of a conversation, used to resolve follow-up questions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriorTurn {
    pub previous_question: String,
    pub previous_query: String,
}

impl PriorTurn {
    pub fn char_len(&self) -> usize {
        self.previous_question.chars().count() + self.previous_query.chars().count()
    }
}

impl QueryRequest {
    pub fn new(question: impl Into<String>, store_id: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            store_id: store_id.into(),
            context: None,
        }
    }

    pub fn with_context(
        mut self,
        previous_question: impl Into<String>,
        previous_query: impl Into<String>,
    ) -> Self {
        self.context = Some(PriorTurn {
            previous_question: previous_question.into(),
            previous_query: previous_query.into(),
        });
        self
    }

    /// Validate inbound bounds: question 1-1000 chars, store id 1-100 chars, context <= 2000 chars
    pub fn validate(&self) -> Result<(), String> {
        let question = self.question.trim();
        if question.is_empty() {
            return Err("Question cannot be empty".to_string());
        }
        let question_len = question.chars().count();
        if question_len > MAX_QUESTION_CHARS {
            return Err(format!(
                "Question cannot exceed {} characters (got {})",
                MAX_QUESTION_CHARS, question_len
            ));
        }

        let store_id = self.store_id.trim();
        if store_id.is_empty() {
            return Err("Store id cannot be empty".to_string());
        }
        if store_id.chars().count() > MAX_STORE_ID_CHARS {
            return Err(format!(
                "Store id cannot exceed {} characters",
                MAX_STORE_ID_CHARS
            ));
        }

        if let Some(context) = &self.context {
            let context_len = context.char_len();
            if context_len > MAX_CONTEXT_CHARS {
                return Err(format!(
                    "Conversation context cannot exceed {} characters (got {})",
                    MAX_CONTEXT_CHARS, context_len
                ));
            }
        }

        Ok(())
    }
}

/// Lifecycle of a single natural-language request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestState {
    Received,
    RateChecked,
    CacheHit,
    Translating,
    Translated,
    Executing,
    Executed,
    Enriched,
    Audited,
    Streamed,
    Failed,
}

impl RequestState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestState::Streamed | RequestState::Failed)
    }
}
