use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const ACTION_NL_QUERY: &str = "nl_query";

/// AuditRecord - lifecycle trail of one accepted request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: String,
    pub actor_id: String,
    pub action: String,
    /// Target store id the request addressed
    pub resource: String,
    pub status: AuditStatus,
    pub question: String,
    pub generated_query: Option<String>,
    pub summary: Option<String>,
    pub execution_time_ms: Option<u64>,
    pub detail: serde_json::Value,
    pub error_kind: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AuditStatus {
    Pending,
    Success,
    Failure,
}

impl AuditStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditStatus::Pending => "pending",
            AuditStatus::Success => "success",
            AuditStatus::Failure => "failure",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "success" => AuditStatus::Success,
            "failure" => AuditStatus::Failure,
            _ => AuditStatus::Pending,
        }
    }
}

/// Terminal outcome written onto a pending record
#[derive(Debug, Clone)]
pub enum AuditOutcome {
    Success {
        generated_query: String,
        summary: Option<String>,
        execution_time_ms: u64,
        detail: serde_json::Value,
    },
    Failure {
        generated_query: Option<String>,
        error_kind: String,
        error_message: String,
    },
}

impl AuditRecord {
    pub fn new_pending(actor_id: String, resource: String, question: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            actor_id,
            action: ACTION_NL_QUERY.to_string(),
            resource,
            status: AuditStatus::Pending,
            question,
            generated_query: None,
            summary: None,
            execution_time_ms: None,
            detail: serde_json::Value::Null,
            error_kind: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == AuditStatus::Success
    }

    pub fn apply(&mut self, outcome: AuditOutcome) {
        match outcome {
            AuditOutcome::Success {
                generated_query,
                summary,
                execution_time_ms,
                detail,
            } => {
                self.status = AuditStatus::Success;
                self.generated_query = Some(generated_query);
                self.summary = summary;
                self.execution_time_ms = Some(execution_time_ms);
                self.detail = detail;
            }
            AuditOutcome::Failure {
                generated_query,
                error_kind,
                error_message,
            } => {
                self.status = AuditStatus::Failure;
                self.generated_query = generated_query;
                self.error_kind = Some(error_kind);
                self.error_message = Some(error_message);
            }
        }
        self.updated_at = Utc::now();
    }
}
