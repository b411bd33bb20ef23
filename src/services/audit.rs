// Audit / history recorder
//
// A pending record is written when a request is accepted. The handle returned
// for it is consumed by exactly one terminal write, so a request can never end
// with two outcomes. Storage failures are logged and swallowed.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use thiserror::Error;

use crate::models::{AuditOutcome, AuditRecord, EnrichedResult, PipelineError};
use crate::services::background::{BackgroundJob, BackgroundWriter};
use crate::storage::SqliteStorage;

#[derive(Debug, Clone, Error, PartialEq)]
#[error("Audit store error: {0}")]
pub struct AuditStoreError(pub String);

impl From<rusqlite::Error> for AuditStoreError {
    fn from(err: rusqlite::Error) -> Self {
        AuditStoreError(err.to_string())
    }
}

/// Durable create/update-by-id of audit records
#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn create(&self, record: &AuditRecord) -> Result<(), AuditStoreError>;

    /// False when no record with that id exists
    async fn update(&self, record: &AuditRecord) -> Result<bool, AuditStoreError>;

    async fn list(&self, actor_id: &str, limit: usize) -> Result<Vec<AuditRecord>, AuditStoreError>;
}

#[async_trait]
impl AuditStore for SqliteStorage {
    async fn create(&self, record: &AuditRecord) -> Result<(), AuditStoreError> {
        Ok(self.create_audit_record(record).await?)
    }

    async fn update(&self, record: &AuditRecord) -> Result<bool, AuditStoreError> {
        Ok(self.update_audit_record(record).await?)
    }

    async fn list(&self, actor_id: &str, limit: usize) -> Result<Vec<AuditRecord>, AuditStoreError> {
        Ok(self.list_audit_records(actor_id, limit).await?)
    }
}

/// Write a terminal record, inserting it when the pending write never landed
pub async fn persist_terminal(store: &dyn AuditStore, record: &AuditRecord) -> Result<(), AuditStoreError> {
    if !store.update(record).await? {
        store.create(record).await?;
    }
    Ok(())
}

/// Pending record of one accepted request
#[derive(Debug)]
pub struct AuditHandle {
    record: AuditRecord,
}

impl AuditHandle {
    pub fn id(&self) -> &str {
        &self.record.id
    }
}

pub struct AuditRecorder {
    store: Arc<dyn AuditStore>,
    background: BackgroundWriter,
}

impl AuditRecorder {
    pub fn new(store: Arc<dyn AuditStore>, background: BackgroundWriter) -> Self {
        Self { store, background }
    }

    /// Record acceptance of a request
    pub async fn begin(&self, actor_id: &str, resource: &str, question: &str) -> AuditHandle {
        let record = AuditRecord::new_pending(actor_id.to_string(), resource.to_string(), question.to_string());
        if let Err(e) = self.store.create(&record).await {
            tracing::warn!("Failed to create pending audit record {}: {}", record.id, e);
        }
        AuditHandle { record }
    }

    /// Mark the request successful; awaited so history reflects it before the result is streamed
    pub async fn succeed(
        &self,
        handle: AuditHandle,
        generated_query: &str,
        summary: Option<String>,
        execution_time_ms: u64,
        result: &EnrichedResult,
        cached: bool,
    ) {
        let mut record = handle.record;
        record.apply(AuditOutcome::Success {
            generated_query: generated_query.to_string(),
            summary,
            execution_time_ms,
            detail: json!({
                "row_count": result.row_count,
                "pii_categories": result.pii_categories,
                "masked": result.masked,
                "next_steps": result.next_steps.len(),
                "confidence": result.confidence,
                "cached": cached,
            }),
        });

        if let Err(e) = persist_terminal(self.store.as_ref(), &record).await {
            tracing::error!("Failed to record audit success for {}: {}", record.id, e);
        }
    }

    /// Mark the request failed; the write goes through the background queue, or a detached task when it is full
    pub fn fail(&self, handle: AuditHandle, generated_query: Option<String>, error: &PipelineError) {
        let mut record = handle.record;
        record.apply(AuditOutcome::Failure {
            generated_query,
            error_kind: error.kind.code().to_string(),
            error_message: error.message.clone(),
        });
        if let Err(BackgroundJob::AuditFailure(record)) =
            self.background.try_enqueue(BackgroundJob::AuditFailure(record))
        {
            let store = self.store.clone();
            tokio::spawn(async move {
                if let Err(e) = persist_terminal(store.as_ref(), &record).await {
                    tracing::error!("Failed to record audit failure for {}: {}", record.id, e);
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AuditStatus, ErrorKind};
    use std::collections::BTreeSet;
    use std::time::Duration;

    fn enriched(row_count: usize) -> EnrichedResult {
        EnrichedResult {
            rows: Vec::new(),
            row_count,
            pii_categories: BTreeSet::new(),
            masked: false,
            next_steps: Vec::new(),
            confidence: 0.9,
            reasoning: None,
            suggestions: Vec::new(),
        }
    }

    async fn recorder() -> (AuditRecorder, Arc<SqliteStorage>, tokio::sync::mpsc::Receiver<BackgroundJob>) {
        let storage = Arc::new(SqliteStorage::in_memory().await.unwrap());
        let (writer, receiver) = BackgroundWriter::new(8);
        (AuditRecorder::new(storage.clone(), writer), storage, receiver)
    }

    #[tokio::test]
    async fn test_pending_then_success() {
        let (recorder, storage, _rx) = recorder().await;
        let handle = recorder.begin("u1", "sales", "Show top 5 customers").await;
        let id = handle.id().to_string();

        let pending = storage.get_audit_record(&id).await.unwrap().unwrap();
        assert_eq!(pending.status, AuditStatus::Pending);

        recorder
            .succeed(handle, "SELECT 1", Some("one".to_string()), 12, &enriched(5), false)
            .await;

        let done = storage.get_audit_record(&id).await.unwrap().unwrap();
        assert_eq!(done.status, AuditStatus::Success);
        assert_eq!(done.generated_query.as_deref(), Some("SELECT 1"));
        assert_eq!(done.execution_time_ms, Some(12));
        assert_eq!(done.detail["row_count"], 5);
    }

    #[tokio::test]
    async fn test_failure_goes_through_background_queue() {
        let (recorder, _storage, mut rx) = recorder().await;
        let handle = recorder.begin("u1", "sales", "q").await;
        let id = handle.id().to_string();

        recorder.fail(
            handle,
            None,
            &PipelineError::new(ErrorKind::ExecutionTimeout, "statement timeout"),
        );

        match rx.recv().await {
            Some(BackgroundJob::AuditFailure(record)) => {
                assert_eq!(record.id, id);
                assert_eq!(record.status, AuditStatus::Failure);
                assert_eq!(record.error_kind.as_deref(), Some("EXECUTION_TIMEOUT"));
            }
            other => panic!("unexpected job: {:?}", other.is_some()),
        }
    }

    #[tokio::test]
    async fn test_failure_written_directly_when_queue_full() {
        let storage = Arc::new(SqliteStorage::in_memory().await.unwrap());
        let (writer, _rx) = BackgroundWriter::new(1);
        let recorder = AuditRecorder::new(storage.clone(), writer.clone());

        let filler = AuditRecord::new_pending("u0".into(), "sales".into(), "earlier".into());
        assert!(writer.enqueue(BackgroundJob::AuditFailure(filler)));

        let handle = recorder.begin("u1", "sales", "q").await;
        let id = handle.id().to_string();
        recorder.fail(
            handle,
            Some("SELECT 1".to_string()),
            &PipelineError::new(ErrorKind::ExecutionConnectionError, "connection refused"),
        );

        let mut status = None;
        for _ in 0..100 {
            status = storage.get_audit_record(&id).await.unwrap().map(|r| r.status);
            if status == Some(AuditStatus::Failure) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(status, Some(AuditStatus::Failure));
    }

    #[tokio::test]
    async fn test_persist_terminal_inserts_missing_record() {
        let storage = SqliteStorage::in_memory().await.unwrap();
        let mut record = AuditRecord::new_pending("u1".into(), "sales".into(), "q".into());
        record.apply(AuditOutcome::Failure {
            generated_query: None,
            error_kind: "EXECUTION_CONNECTION_ERROR".into(),
            error_message: "refused".into(),
        });

        persist_terminal(&storage, &record).await.unwrap();
        let stored = storage.get_audit_record(&record.id).await.unwrap().unwrap();
        assert_eq!(stored.status, AuditStatus::Failure);
    }
}
