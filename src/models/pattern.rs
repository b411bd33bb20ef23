use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::target::Dialect;

/// A previously successful translation kept for retrieval-augmented prompting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticPattern {
    pub id: String,
    pub embedding: Vec<f32>,
    pub question: String,
    pub generated_query: String,
    pub store_id: String,
    pub dialect: Dialect,
    pub success: bool,
    pub row_count: usize,
    pub execution_time_ms: u64,
    pub confidence: f64,
    pub created_at: DateTime<Utc>,
}

impl SemanticPattern {
    pub fn new(
        embedding: Vec<f32>,
        question: String,
        generated_query: String,
        store_id: String,
        dialect: Dialect,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            embedding,
            question,
            generated_query,
            store_id,
            dialect,
            success: true,
            row_count: 0,
            execution_time_ms: 0,
            confidence: 0.0,
            created_at: Utc::now(),
        }
    }
}

/// Pattern content waiting for its embedding in the background queue
#[derive(Debug, Clone)]
pub struct PatternCandidate {
    pub question: String,
    pub generated_query: String,
    pub store_id: String,
    pub dialect: Dialect,
    pub row_count: usize,
    pub execution_time_ms: u64,
    pub confidence: f64,
}

/// Nearest-neighbour hit returned from the pattern store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternMatch {
    pub question: String,
    pub generated_query: String,
    pub similarity: f32,
}
