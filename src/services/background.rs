// Background writer
//
// Fire-and-forget work detached from the request path: terminal audit
// failures and semantic pattern writes. Jobs go through a bounded queue that
// never blocks the sender; one worker drains it, retrying each job with
// exponential backoff and dropping it after the last attempt.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;

use crate::config::BackgroundConfig;
use crate::models::{AuditRecord, PatternCandidate, SemanticPattern};
use crate::services::audit::{persist_terminal, AuditStore, AuditStoreError};
use crate::services::embedding::Embedder;
use crate::services::pattern_store::{PatternStore, PatternStoreError};

pub enum BackgroundJob {
    AuditFailure(AuditRecord),
    StorePattern(PatternCandidate),
}

impl BackgroundJob {
    fn name(&self) -> &'static str {
        match self {
            BackgroundJob::AuditFailure(_) => "audit_failure",
            BackgroundJob::StorePattern(_) => "store_pattern",
        }
    }
}

#[derive(Debug, Error)]
pub enum BackgroundError {
    #[error(transparent)]
    Audit(#[from] AuditStoreError),

    #[error(transparent)]
    Pattern(#[from] PatternStoreError),
}

/// Sending half of the queue, cheap to clone
#[derive(Clone)]
pub struct BackgroundWriter {
    sender: mpsc::Sender<BackgroundJob>,
}

impl BackgroundWriter {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<BackgroundJob>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }

    /// Queue a job without waiting; returns false when it was dropped
    pub fn enqueue(&self, job: BackgroundJob) -> bool {
        self.try_enqueue(job).is_ok()
    }

    /// Queue a job without waiting; a job that does not fit is handed back
    pub fn try_enqueue(&self, job: BackgroundJob) -> Result<(), BackgroundJob> {
        self.sender.try_send(job).map_err(|e| match e {
            TrySendError::Full(job) => {
                tracing::warn!("Background queue full, rejecting {} job", job.name());
                job
            }
            TrySendError::Closed(job) => {
                tracing::warn!("Background worker stopped, rejecting {} job", job.name());
                job
            }
        })
    }
}

/// Exponential backoff: `base`, `2 * base`, `4 * base`, ...
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &BackgroundConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.backoff_ms),
        }
    }

    /// Delay before retry number `attempt` (1-based)
    pub fn delay(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(1u32 << attempt.saturating_sub(1).min(16))
    }
}

/// Embedder and store used for pattern writes
#[derive(Clone)]
pub struct PatternSink {
    pub embedder: Arc<dyn Embedder>,
    pub store: Arc<dyn PatternStore>,
}

pub struct BackgroundWorker {
    receiver: mpsc::Receiver<BackgroundJob>,
    audit_store: Arc<dyn AuditStore>,
    patterns: Option<PatternSink>,
    retry: RetryPolicy,
}

impl BackgroundWorker {
    pub fn new(
        receiver: mpsc::Receiver<BackgroundJob>,
        audit_store: Arc<dyn AuditStore>,
        patterns: Option<PatternSink>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            receiver,
            audit_store,
            patterns,
            retry,
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Drain the queue until every writer has been dropped
    pub async fn run(mut self) {
        tracing::info!("Background writer started");
        while let Some(job) = self.receiver.recv().await {
            self.process(job).await;
        }
        tracing::info!("Background writer stopped");
    }

    async fn process(&self, job: BackgroundJob) {
        for attempt in 1..=self.retry.max_attempts {
            match self.attempt(&job).await {
                Ok(()) => return,
                Err(e) if attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay(attempt);
                    tracing::warn!(
                        "{} job failed (attempt {}/{}), retrying in {:?}: {}",
                        job.name(),
                        attempt,
                        self.retry.max_attempts,
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    tracing::error!(
                        "{} job dropped after {} attempts: {}",
                        job.name(),
                        self.retry.max_attempts,
                        e
                    );
                }
            }
        }
    }

    async fn attempt(&self, job: &BackgroundJob) -> Result<(), BackgroundError> {
        match job {
            BackgroundJob::AuditFailure(record) => {
                persist_terminal(self.audit_store.as_ref(), record).await?;
                Ok(())
            }
            BackgroundJob::StorePattern(candidate) => {
                let Some(sink) = &self.patterns else {
                    tracing::debug!("Pattern store disabled, skipping pattern for {}", candidate.store_id);
                    return Ok(());
                };
                let embedding = sink.embedder.embed(&candidate.question).await?;
                let mut pattern = SemanticPattern::new(
                    embedding,
                    candidate.question.clone(),
                    candidate.generated_query.clone(),
                    candidate.store_id.clone(),
                    candidate.dialect,
                );
                pattern.row_count = candidate.row_count;
                pattern.execution_time_ms = candidate.execution_time_ms;
                pattern.confidence = candidate.confidence;
                sink.store.upsert(pattern).await?;
                tracing::debug!("Stored semantic pattern for {}", candidate.store_id);
                Ok(())
            }
        }
    }
}
