use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

use super::translation::Reasoning;

/// Category of personally identifiable information found in a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PiiCategory {
    Email,
    Phone,
    Ssn,
    CreditCard,
}

impl PiiCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            PiiCategory::Email => "email",
            PiiCategory::Phone => "phone",
            PiiCategory::Ssn => "ssn",
            PiiCategory::CreditCard => "credit_card",
        }
    }
}

/// Issue sub-pattern matched in a row's free-text fields, in priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NextStepCategory {
    SessionTimeout,
    SuspendedAccount,
    ExpiredPassword,
    LockedAccount,
    WrongCredentials,
    OpenTicket,
    General,
}

/// Recommended action attached to one result row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NextStep {
    pub row_index: usize,
    pub category: NextStepCategory,
    pub action: String,
}

/// Rows after numeric normalization, masking and annotation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichedResult {
    pub rows: Vec<Value>,
    pub row_count: usize,
    pub pii_categories: BTreeSet<PiiCategory>,
    pub masked: bool,
    pub next_steps: Vec<NextStep>,
    /// Confidence in [0, 1]
    pub confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<Reasoning>,
    #[serde(default)]
    pub suggestions: Vec<String>,
}
