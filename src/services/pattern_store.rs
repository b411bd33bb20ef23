// Semantic pattern store
//
// Successful translations are kept as embedded patterns and retrieved by
// cosine similarity, scoped to the store the question targets. Retrieval is
// advisory: callers treat any error as "no exemplars".

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use qdrant_client::qdrant::{
    self, value::Kind, Condition, CreateCollection, Distance, Filter, PointStruct, ScoredPoint, SearchPoints,
    UpsertPoints, Value, VectorParams,
};
use qdrant_client::Qdrant;
use thiserror::Error;
use tokio::sync::OnceCell;

use crate::models::{PatternMatch, SemanticPattern};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum PatternStoreError {
    #[error("Pattern store unavailable: {0}")]
    Unavailable(String),

    #[error("Embedding failed: {0}")]
    Embedding(String),
}

#[async_trait]
pub trait PatternStore: Send + Sync {
    async fn upsert(&self, pattern: SemanticPattern) -> Result<(), PatternStoreError>;

    /// Successful patterns for `store_id` at or above `min_similarity`, best first
    async fn search(
        &self,
        embedding: &[f32],
        store_id: &str,
        top_k: usize,
        min_similarity: f32,
    ) -> Result<Vec<PatternMatch>, PatternStoreError>;
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Process-local store; patterns are lost on restart
#[derive(Default)]
pub struct InMemoryPatternStore {
    patterns: RwLock<Vec<SemanticPattern>>,
}

impl InMemoryPatternStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.patterns.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl PatternStore for InMemoryPatternStore {
    async fn upsert(&self, pattern: SemanticPattern) -> Result<(), PatternStoreError> {
        let mut patterns = self.patterns.write().unwrap_or_else(|e| e.into_inner());
        // Same question against the same store replaces the older pattern
        patterns.retain(|p| !(p.store_id == pattern.store_id && p.question == pattern.question));
        patterns.push(pattern);
        Ok(())
    }

    async fn search(
        &self,
        embedding: &[f32],
        store_id: &str,
        top_k: usize,
        min_similarity: f32,
    ) -> Result<Vec<PatternMatch>, PatternStoreError> {
        let patterns = self.patterns.read().unwrap_or_else(|e| e.into_inner());
        let mut matches: Vec<PatternMatch> = patterns
            .iter()
            .filter(|p| p.success && p.store_id == store_id)
            .map(|p| PatternMatch {
                question: p.question.clone(),
                generated_query: p.generated_query.clone(),
                similarity: cosine_similarity(embedding, &p.embedding),
            })
            .filter(|m| m.similarity >= min_similarity)
            .collect();

        matches.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        matches.truncate(top_k);
        Ok(matches)
    }
}

/// Qdrant collection reached through `qdrant-client`
pub struct QdrantPatternStore {
    client: Qdrant,
    collection: String,
    collection_ready: OnceCell<()>,
}

impl QdrantPatternStore {
    /// `url` is the gRPC endpoint; every call is bounded by `timeout`
    pub fn new(url: &str, collection: &str, timeout: Duration) -> Result<Self, PatternStoreError> {
        let client = Qdrant::from_url(url)
            .timeout(timeout)
            .connect_timeout(timeout)
            .skip_compatibility_check()
            .build()
            .map_err(|e| PatternStoreError::Unavailable(format!("Failed to build Qdrant client: {}", e)))?;

        Ok(Self {
            client,
            collection: collection.to_string(),
            collection_ready: OnceCell::new(),
        })
    }

    async fn ensure_collection(&self, dimension: usize) -> Result<(), PatternStoreError> {
        self.collection_ready
            .get_or_try_init(|| async {
                let exists = self
                    .client
                    .collection_exists(&self.collection)
                    .await
                    .map_err(|e| PatternStoreError::Unavailable(e.to_string()))?;
                if exists {
                    return Ok(());
                }

                self.client
                    .create_collection(CreateCollection {
                        collection_name: self.collection.clone(),
                        vectors_config: Some(qdrant::VectorsConfig {
                            config: Some(qdrant::vectors_config::Config::Params(VectorParams {
                                size: dimension as u64,
                                distance: Distance::Cosine as i32,
                                ..Default::default()
                            })),
                        }),
                        ..Default::default()
                    })
                    .await
                    .map_err(|e| {
                        PatternStoreError::Unavailable(format!(
                            "Failed to create collection {}: {}",
                            self.collection, e
                        ))
                    })?;
                tracing::info!("Created pattern collection {}", self.collection);
                Ok(())
            })
            .await
            .map(|_| ())
    }

    /// Only successful patterns of one store are eligible
    fn store_filter(store_id: &str) -> Filter {
        Filter {
            must: vec![
                Condition::matches("store_id", store_id.to_string()),
                Condition::matches("success", true),
            ],
            ..Default::default()
        }
    }
}

fn pattern_payload(pattern: &SemanticPattern) -> HashMap<String, Value> {
    HashMap::from([
        ("question".to_string(), Value::from(pattern.question.clone())),
        ("generated_query".to_string(), Value::from(pattern.generated_query.clone())),
        ("store_id".to_string(), Value::from(pattern.store_id.clone())),
        ("dialect".to_string(), Value::from(pattern.dialect.to_string())),
        ("success".to_string(), Value::from(pattern.success)),
        ("row_count".to_string(), Value::from(pattern.row_count as i64)),
        ("execution_time_ms".to_string(), Value::from(pattern.execution_time_ms as i64)),
        ("confidence".to_string(), Value::from(pattern.confidence)),
        ("created_at".to_string(), Value::from(pattern.created_at.to_rfc3339())),
    ])
}

fn payload_to_string(value: Option<&Value>) -> Option<String> {
    value
        .and_then(|value| value.kind.as_ref())
        .and_then(|kind| match kind {
            Kind::StringValue(text) => Some(text.clone()),
            _ => None,
        })
}

/// Points missing the question or query are skipped
fn pattern_match(point: ScoredPoint) -> Option<PatternMatch> {
    Some(PatternMatch {
        question: payload_to_string(point.payload.get("question"))?,
        generated_query: payload_to_string(point.payload.get("generated_query"))?,
        similarity: point.score,
    })
}

#[async_trait]
impl PatternStore for QdrantPatternStore {
    async fn upsert(&self, pattern: SemanticPattern) -> Result<(), PatternStoreError> {
        self.ensure_collection(pattern.embedding.len()).await?;

        let point = PointStruct {
            id: Some(pattern.id.clone().into()),
            payload: pattern_payload(&pattern),
            vectors: Some(pattern.embedding.into()),
        };

        self.client
            .upsert_points(UpsertPoints {
                collection_name: self.collection.clone(),
                wait: Some(true),
                points: vec![point],
                ..Default::default()
            })
            .await
            .map_err(|e| PatternStoreError::Unavailable(format!("Pattern upsert failed: {}", e)))?;
        Ok(())
    }

    async fn search(
        &self,
        embedding: &[f32],
        store_id: &str,
        top_k: usize,
        min_similarity: f32,
    ) -> Result<Vec<PatternMatch>, PatternStoreError> {
        let response = self
            .client
            .search_points(SearchPoints {
                collection_name: self.collection.clone(),
                vector: embedding.to_vec(),
                limit: top_k as u64,
                score_threshold: Some(min_similarity),
                filter: Some(Self::store_filter(store_id)),
                with_payload: Some(qdrant::WithPayloadSelector {
                    selector_options: Some(qdrant::with_payload_selector::SelectorOptions::Enable(true)),
                }),
                ..Default::default()
            })
            .await
            .map_err(|e| PatternStoreError::Unavailable(format!("Pattern search failed: {}", e)))?;

        Ok(response.result.into_iter().filter_map(pattern_match).collect())
    }
}
