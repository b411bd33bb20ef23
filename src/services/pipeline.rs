// Natural-language query pipeline
//
// Admission (validation, target lookup, rate limiting) runs before any
// stream is opened and has no audit side effect. An admitted request emits
// status frames as it moves through its lifecycle, then exactly one result
// or error frame, then the end marker.

use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::models::{
    EnrichedResult, ErrorKind, ErrorPayload, NlQueryResponse, PatternCandidate, PatternMatch, PipelineError,
    QueryRequest, RequestState, StreamFrame, TargetStore, TranslationResult,
};
use crate::services::audit::AuditRecorder;
use crate::services::background::{BackgroundJob, BackgroundWriter, PatternSink};
use crate::services::enrichment::{EnrichmentContext, EnrichmentPipeline};
use crate::services::identity::Identity;
use crate::services::lifecycle::{status_message, RequestLifecycle};
use crate::services::prompt_builder::{PromptBuilder, PromptInput};
use crate::services::query_cache::{CacheKey, QueryCache};
use crate::services::query_executor::QueryExecutor;
use crate::services::rate_limiter::{RateLimitDecision, RateLimiter};
use crate::services::schema_service::SchemaProvider;
use crate::services::translation_client::Translator;
use crate::services::user_message::user_message;
use crate::validation::SqlValidator;

/// Request rejected before acceptance
#[derive(Debug, Error)]
pub enum Rejection {
    #[error("{0}")]
    Invalid(String),

    #[error("Rate limit exceeded, retry in {} seconds", .0.retry_after_secs)]
    RateLimited(RateLimitDecision),
}

impl Rejection {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Rejection::Invalid(_) => ErrorKind::ValidationError,
            Rejection::RateLimited(_) => ErrorKind::RateLimited,
        }
    }
}

/// A request that passed admission and will get a stream
#[derive(Debug)]
pub struct AdmittedRequest {
    pub identity: Identity,
    pub request: QueryRequest,
    pub target: TargetStore,
}

/// Similar-pattern lookup used to pick prompt exemplars
pub struct PatternRetrieval {
    pub sink: PatternSink,
    pub top_k: usize,
    pub min_similarity: f32,
    /// Budget for embedding plus search together
    pub timeout: Duration,
}

#[derive(Debug, Clone, Copy)]
pub struct PipelineSettings {
    pub default_limit: u64,
    pub production: bool,
}

pub struct PipelineComponents {
    pub cache: Arc<QueryCache>,
    pub rate_limiter: Arc<RateLimiter>,
    pub translator: Arc<dyn Translator>,
    pub executor: Arc<dyn QueryExecutor>,
    pub schemas: Arc<dyn SchemaProvider>,
    pub patterns: Option<PatternRetrieval>,
    pub audit: AuditRecorder,
    pub background: BackgroundWriter,
}

struct Completed {
    generated_query: String,
    executed_query: String,
    summary: Option<String>,
    cached: bool,
    execution_time_ms: u64,
    result: EnrichedResult,
}

pub struct NlQueryPipeline {
    cache: Arc<QueryCache>,
    rate_limiter: Arc<RateLimiter>,
    translator: Arc<dyn Translator>,
    executor: Arc<dyn QueryExecutor>,
    schemas: Arc<dyn SchemaProvider>,
    patterns: Option<PatternRetrieval>,
    enrichment: EnrichmentPipeline,
    audit: AuditRecorder,
    background: BackgroundWriter,
    settings: PipelineSettings,
}

/// Run `sweep` on a fixed period for the life of the process
pub fn spawn_maintenance(pipeline: Arc<NlQueryPipeline>, every: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        // The first tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            pipeline.sweep(Instant::now());
        }
    })
}

async fn emit(frames: &mpsc::Sender<StreamFrame>, frame: StreamFrame) {
    if frames.send(frame).await.is_err() {
        tracing::debug!("Stream receiver dropped, frame discarded");
    }
}

async fn advance(
    lifecycle: &mut RequestLifecycle,
    to: RequestState,
    frames: &mpsc::Sender<StreamFrame>,
) -> Result<(), PipelineError> {
    lifecycle.transition(to)?;
    emit(frames, StreamFrame::status(to, status_message(to))).await;
    Ok(())
}

impl NlQueryPipeline {
    pub fn new(components: PipelineComponents, settings: PipelineSettings) -> Self {
        Self {
            cache: components.cache,
            rate_limiter: components.rate_limiter,
            translator: components.translator,
            executor: components.executor,
            schemas: components.schemas,
            patterns: components.patterns,
            enrichment: EnrichmentPipeline::standard(),
            audit: components.audit,
            background: components.background,
            settings,
        }
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    /// Drop expired cache entries and idle rate-limit windows
    pub fn sweep(&self, now: Instant) {
        self.cache.cleanup_expired(now);
        self.rate_limiter.cleanup(now);
        tracing::debug!(
            "Maintenance sweep: {} cached queries, {} tracked identities",
            self.cache.size(),
            self.rate_limiter.tracked_identities()
        );
    }

    /// Validate, resolve the target and take a rate-limit slot
    pub fn admit(&self, identity: Identity, request: QueryRequest) -> Result<AdmittedRequest, Rejection> {
        request.validate().map_err(Rejection::Invalid)?;

        let store_id = request.store_id.trim();
        let target = self
            .executor
            .target(store_id)
            .ok_or_else(|| Rejection::Invalid(format!("Unknown store: {}", store_id)))?;

        let decision = self.rate_limiter.check(&identity.user_id);
        if decision.blocked {
            return Err(Rejection::RateLimited(decision));
        }

        Ok(AdmittedRequest {
            identity,
            request,
            target,
        })
    }

    /// Drive an admitted request to its terminal frame; the sender is dropped on return
    pub async fn run(&self, admitted: AdmittedRequest, frames: mpsc::Sender<StreamFrame>) {
        let AdmittedRequest {
            identity,
            request,
            target,
        } = admitted;
        let request_id = Uuid::new_v4().to_string();
        let audit = self
            .audit
            .begin(&identity.user_id, &target.id, request.question.trim())
            .await;

        let mut lifecycle = RequestLifecycle::new();
        let mut generated = None;
        let outcome = self
            .process(&identity, &request, &target, &mut lifecycle, &frames, &mut generated)
            .await;

        match outcome {
            Ok(completed) => {
                self.audit
                    .succeed(
                        audit,
                        &completed.generated_query,
                        completed.summary.clone(),
                        completed.execution_time_ms,
                        &completed.result,
                        completed.cached,
                    )
                    .await;
                if let Err(e) = advance(&mut lifecycle, RequestState::Audited, &frames).await {
                    tracing::error!("Request {}: {}", request_id, e);
                }

                tracing::info!(
                    "Request {} answered from store {} ({} rows, cached: {})",
                    request_id,
                    target.id,
                    completed.result.row_count,
                    completed.cached
                );

                let candidate = (!completed.cached).then(|| PatternCandidate {
                    question: request.question.trim().to_string(),
                    generated_query: completed.generated_query.clone(),
                    store_id: target.id.clone(),
                    dialect: target.dialect,
                    row_count: completed.result.row_count,
                    execution_time_ms: completed.execution_time_ms,
                    confidence: completed.result.confidence,
                });

                emit(
                    &frames,
                    StreamFrame::Result(Box::new(NlQueryResponse {
                        request_id: request_id.clone(),
                        store_id: target.id.clone(),
                        generated_query: completed.generated_query,
                        executed_query: completed.executed_query,
                        summary: completed.summary,
                        cached: completed.cached,
                        execution_time_ms: completed.execution_time_ms,
                        result: completed.result,
                    })),
                )
                .await;
                if let Err(e) = lifecycle.transition(RequestState::Streamed) {
                    tracing::error!("Request {}: {}", request_id, e);
                }

                if let (Some(candidate), Some(_)) = (candidate, &self.patterns) {
                    self.background.enqueue(BackgroundJob::StorePattern(candidate));
                }
            }
            Err(err) => {
                lifecycle.fail();
                tracing::warn!("Request {} failed: {}", request_id, err);
                self.audit.fail(audit, generated, &err);

                let shown = user_message(&err, self.settings.production);
                emit(
                    &frames,
                    StreamFrame::Error(ErrorPayload {
                        request_id,
                        kind: err.kind,
                        code: err.kind.code().to_string(),
                        message: shown.message,
                        details: shown.details,
                    }),
                )
                .await;
            }
        }

        emit(&frames, StreamFrame::End).await;
    }

    async fn process(
        &self,
        identity: &Identity,
        request: &QueryRequest,
        target: &TargetStore,
        lifecycle: &mut RequestLifecycle,
        frames: &mpsc::Sender<StreamFrame>,
        generated: &mut Option<String>,
    ) -> Result<Completed, PipelineError> {
        advance(lifecycle, RequestState::RateChecked, frames).await?;

        let question = request.question.trim();
        // Follow-ups depend on the previous turn, so they never read or write the cache
        let cache_key = request
            .context
            .is_none()
            .then(|| CacheKey::new(question, &target.id));

        let (query, translation) = match cache_key.as_ref().and_then(|key| self.cache.get(key)) {
            Some(query) => {
                advance(lifecycle, RequestState::CacheHit, frames).await?;
                (query, None)
            }
            None => {
                advance(lifecycle, RequestState::Translating, frames).await?;
                let translation = self.translate(request, target).await?;
                let query = translation
                    .query
                    .clone()
                    .filter(|q| !q.trim().is_empty())
                    .ok_or_else(|| {
                        PipelineError::new(ErrorKind::TranslationParseError, "Translation carried no query")
                    })?;
                (query, Some(translation))
            }
        };
        let cached = translation.is_none();
        *generated = Some(query.clone());
        advance(lifecycle, RequestState::Translated, frames).await?;

        let prepared = SqlValidator::validate_and_prepare(&query, target.dialect, self.settings.default_limit)?;
        if let (false, Some(key)) = (cached, cache_key) {
            self.cache.put(key, query.clone());
        }

        advance(lifecycle, RequestState::Executing, frames).await?;
        let execution = self.executor.execute(&target.id, &prepared.sql, question).await?;
        advance(lifecycle, RequestState::Executed, frames).await?;

        let ctx = EnrichmentContext {
            question,
            execution: &execution,
            reasoning: translation.as_ref().and_then(|t| t.reasoning.as_ref()),
            can_unmask: identity.can_unmask(),
        };
        let suggestions = translation
            .as_ref()
            .map(|t| t.suggestions.clone())
            .unwrap_or_default();
        let result = self.enrichment.run(&ctx, suggestions);
        advance(lifecycle, RequestState::Enriched, frames).await?;

        Ok(Completed {
            generated_query: query,
            executed_query: prepared.sql,
            summary: translation.and_then(|t| t.summary),
            cached,
            execution_time_ms: execution.execution_time_ms,
            result,
        })
    }

    async fn translate(&self, request: &QueryRequest, target: &TargetStore) -> Result<TranslationResult, PipelineError> {
        let question = request.question.trim();
        let schema = self.schemas.schema(&target.id).await?;
        let exemplars = self.similar_patterns(question, &target.id).await;

        let prompt = PromptBuilder::build(&PromptInput {
            question,
            target,
            schema: &schema,
            context: request.context.as_ref(),
            exemplars: &exemplars,
        });
        if prompt.follow_up.is_some() {
            tracing::debug!("Follow-up on store {} keeps the previous limit and inverts the sort", target.id);
        }

        let translation = self.translator.translate(&prompt).await?;
        if !translation.success {
            let reason = translation
                .error
                .unwrap_or_else(|| "The question could not be translated".to_string());
            return Err(PipelineError::new(ErrorKind::TranslationServiceError, reason));
        }
        Ok(translation)
    }

    /// Advisory exemplars; any failure degrades to zero-shot prompting
    async fn similar_patterns(&self, question: &str, store_id: &str) -> Vec<PatternMatch> {
        let Some(retrieval) = &self.patterns else {
            return Vec::new();
        };

        let lookup = async {
            let embedding = retrieval.sink.embedder.embed(question).await?;
            retrieval
                .sink
                .store
                .search(&embedding, store_id, retrieval.top_k, retrieval.min_similarity)
                .await
        };

        match tokio::time::timeout(retrieval.timeout, lookup).await {
            Ok(Ok(matches)) => {
                tracing::debug!("Found {} similar patterns for {}", matches.len(), store_id);
                PromptBuilder::select_exemplars(&matches)
            }
            Ok(Err(e)) => {
                tracing::warn!("Pattern lookup skipped for {}: {}", store_id, e);
                Vec::new()
            }
            Err(_) => {
                tracing::warn!(
                    "Pattern lookup for {} timed out after {}ms",
                    store_id,
                    retrieval.timeout.as_millis()
                );
                Vec::new()
            }
        }
    }
}
