use serde::{Deserialize, Serialize};

/// Why the translation service produced the query it did
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reasoning {
    pub understanding: String,
    #[serde(default)]
    pub tables: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub join_rationale: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter_rationale: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort_rationale: Option<String>,
    /// Confidence in [0, 1]; the service reports 0-100 and it is normalized once on receipt
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

/// Structured answer of the translation service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslationResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<Reasoning>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default)]
    pub suggestions: Vec<String>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TranslationResult {
    pub fn succeeded(query: impl Into<String>) -> Self {
        Self {
            reasoning: None,
            query: Some(query.into()),
            summary: None,
            suggestions: Vec::new(),
            success: true,
            error: None,
        }
    }

    pub fn declined(error: impl Into<String>) -> Self {
        Self {
            reasoning: None,
            query: None,
            summary: None,
            suggestions: Vec::new(),
            success: false,
            error: Some(error.into()),
        }
    }

    pub fn confidence(&self) -> Option<f64> {
        self.reasoning.as_ref().and_then(|r| r.confidence)
    }
}

/// Map a 0-100 confidence onto [0, 1]
pub fn normalize_confidence(raw: f64) -> f64 {
    if raw.is_nan() {
        return 0.0;
    }
    (raw / 100.0).clamp(0.0, 1.0)
}
