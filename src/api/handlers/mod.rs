pub mod cache;
pub mod history;
pub mod nl_query;
pub mod targets;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use crate::config::Config;
use crate::services::audit::{AuditRecorder, AuditStore};
use crate::services::background::{BackgroundWorker, BackgroundWriter, PatternSink, RetryPolicy};
use crate::services::connection_pool::ConnectionPoolManager;
use crate::services::embedding::HttpEmbedder;
use crate::services::identity::{HeaderIdentityProvider, IdentityProvider};
use crate::services::pattern_store::{InMemoryPatternStore, PatternStore, QdrantPatternStore};
use crate::services::pipeline::{NlQueryPipeline, PatternRetrieval, PipelineComponents, PipelineSettings};
use crate::services::query_cache::QueryCache;
use crate::services::query_executor::{QueryExecutor, TargetRegistry};
use crate::services::rate_limiter::RateLimiter;
use crate::services::schema_service::SchemaService;
use crate::services::translation_client::LlmTranslationClient;
use crate::storage::SqliteStorage;

/// Application state
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<NlQueryPipeline>,
    pub executor: Arc<dyn QueryExecutor>,
    pub audit_store: Arc<dyn AuditStore>,
    pub identity: Arc<dyn IdentityProvider>,
}

impl AppState {
    /// Build every component from configuration; the returned worker must be spawned
    pub async fn initialize(config: &Config) -> anyhow::Result<(Self, BackgroundWorker)> {
        let storage = Arc::new(
            SqliteStorage::new(&config.database.url)
                .await
                .context("Failed to initialize database")?,
        );

        let pool_manager = ConnectionPoolManager::new();
        let registry = Arc::new(
            TargetRegistry::from_config(
                &config.targets,
                &pool_manager,
                Duration::from_secs(config.execution.timeout_secs),
            )
            .await,
        );
        if registry.is_empty() {
            tracing::warn!("No target stores configured; every question will be rejected");
        }

        let patterns = pattern_sink(config)?;
        let (background, receiver) = BackgroundWriter::new(config.background.queue_capacity);
        let worker = BackgroundWorker::new(
            receiver,
            storage.clone(),
            patterns.clone(),
            RetryPolicy::from_config(&config.background),
        );

        let pipeline = NlQueryPipeline::new(
            PipelineComponents {
                cache: Arc::new(QueryCache::new(
                    config.cache.max_entries,
                    Duration::from_secs(config.cache.ttl_secs),
                )),
                rate_limiter: Arc::new(RateLimiter::new(
                    config.rate_limit.max_requests,
                    Duration::from_secs(config.rate_limit.window_secs),
                )),
                translator: Arc::new(LlmTranslationClient::new(&config.llm)),
                executor: registry.clone(),
                schemas: Arc::new(SchemaService::new(storage.clone(), registry.clone())),
                patterns: patterns.map(|sink| PatternRetrieval {
                    sink,
                    top_k: config.patterns.top_k,
                    min_similarity: config.patterns.min_similarity,
                    timeout: Duration::from_secs(config.patterns.lookup_timeout_secs),
                }),
                audit: AuditRecorder::new(storage.clone(), background.clone()),
                background,
            },
            PipelineSettings {
                default_limit: config.execution.default_limit,
                production: config.is_production(),
            },
        );

        tracing::info!(
            "Initialized {} target stores (cache: {} entries / {}s, rate limit: {} per {}s)",
            registry.len(),
            config.cache.max_entries,
            config.cache.ttl_secs,
            config.rate_limit.max_requests,
            config.rate_limit.window_secs
        );

        let state = AppState {
            pipeline: Arc::new(pipeline),
            executor: registry,
            audit_store: storage,
            identity: Arc::new(HeaderIdentityProvider),
        };
        Ok((state, worker))
    }
}

fn pattern_sink(config: &Config) -> anyhow::Result<Option<PatternSink>> {
    if !config.patterns.enabled {
        tracing::info!("Semantic pattern store disabled; prompts are zero-shot");
        return Ok(None);
    }

    let embedder = Arc::new(HttpEmbedder::new(
        &config.llm,
        Duration::from_secs(config.patterns.embedding_timeout_secs),
    )?);

    let store: Arc<dyn PatternStore> = match config.patterns.backend.as_str() {
        "memory" => Arc::new(InMemoryPatternStore::new()),
        "qdrant" => {
            let url = config
                .patterns
                .qdrant_url
                .as_deref()
                .context("patterns.qdrant_url is required for the qdrant backend")?;
            Arc::new(QdrantPatternStore::new(
                url,
                &config.patterns.collection,
                Duration::from_secs(config.patterns.lookup_timeout_secs),
            )?)
        }
        other => anyhow::bail!("Unsupported pattern backend: {}", other),
    };

    tracing::info!("Semantic pattern store enabled ({})", config.patterns.backend);
    Ok(Some(PatternSink { embedder, store }))
}
