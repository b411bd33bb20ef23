use std::sync::Arc;

use async_trait::async_trait;

use crate::models::SchemaDescription;
use crate::services::database::ExecutionError;
use crate::services::query_executor::TargetRegistry;
use crate::storage::SqliteStorage;

/// Snapshots older than this are introspected again
pub const SCHEMA_MAX_AGE_HOURS: i64 = 24;

/// Supplies the schema description used to build prompts
#[async_trait]
pub trait SchemaProvider: Send + Sync {
    async fn schema(&self, target_id: &str) -> Result<SchemaDescription, ExecutionError>;
}

/// Schema snapshots kept in SQLite, introspected from the target on a miss
pub struct SchemaService {
    storage: Arc<SqliteStorage>,
    registry: Arc<TargetRegistry>,
}

impl SchemaService {
    pub fn new(storage: Arc<SqliteStorage>, registry: Arc<TargetRegistry>) -> Self {
        Self { storage, registry }
    }

    /// Introspect the target and replace the stored snapshot
    pub async fn refresh(&self, target_id: &str) -> Result<SchemaDescription, ExecutionError> {
        let schema = self.registry.describe(target_id).await?;

        if let Err(e) = self.storage.save_schema(&schema).await {
            tracing::warn!("Failed to store schema snapshot for {}: {}", target_id, e);
        }
        Ok(schema)
    }

    async fn cached(&self, target_id: &str) -> Option<SchemaDescription> {
        match self.storage.get_schema(target_id).await {
            Ok(Some(schema)) => {
                let age = chrono::Utc::now() - schema.retrieved_at;
                if age < chrono::Duration::hours(SCHEMA_MAX_AGE_HOURS) {
                    Some(schema)
                } else {
                    tracing::debug!("Schema snapshot for {} is stale", target_id);
                    None
                }
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!("Failed to read schema snapshot for {}: {}", target_id, e);
                None
            }
        }
    }
}

#[async_trait]
impl SchemaProvider for SchemaService {
    async fn schema(&self, target_id: &str) -> Result<SchemaDescription, ExecutionError> {
        if let Some(schema) = self.cached(target_id).await {
            return Ok(schema);
        }
        self.refresh(target_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Dialect, ExecutionResult, TargetStore};
    use crate::services::database::DatabaseAdapter;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct CountingAdapter {
        fetches: Arc<AtomicUsize>,
        stalled: bool,
    }

    #[async_trait]
    impl DatabaseAdapter for CountingAdapter {
        async fn execute_query(&self, _sql: &str, _timeout: Duration) -> Result<ExecutionResult, ExecutionError> {
            Ok(ExecutionResult::default())
        }

        async fn fetch_schema(&self, target_id: &str) -> Result<SchemaDescription, ExecutionError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if self.stalled {
                return std::future::pending().await;
            }
            Ok(SchemaDescription::empty(target_id))
        }

        fn dialect(&self) -> Dialect {
            Dialect::MySQL
        }
    }

    async fn service(fetches: Arc<AtomicUsize>) -> (SchemaService, Arc<SqliteStorage>) {
        service_with(fetches, false).await
    }

    async fn service_with(fetches: Arc<AtomicUsize>, stalled: bool) -> (SchemaService, Arc<SqliteStorage>) {
        let storage = Arc::new(SqliteStorage::in_memory().await.unwrap());
        let mut registry = TargetRegistry::new(Duration::from_millis(200));
        registry.register(
            TargetStore {
                id: "sales".to_string(),
                dialect: Dialect::MySQL,
                description: None,
            },
            Arc::new(CountingAdapter { fetches, stalled }),
        );
        (SchemaService::new(storage.clone(), Arc::new(registry)), storage)
    }

    #[tokio::test]
    async fn test_schema_introspected_once_then_served_from_snapshot() {
        let fetches = Arc::new(AtomicUsize::new(0));
        let (service, storage) = service(fetches.clone()).await;

        service.schema("sales").await.unwrap();
        service.schema("sales").await.unwrap();
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
        assert!(storage.get_schema("sales").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_stale_snapshot_is_refreshed() {
        let fetches = Arc::new(AtomicUsize::new(0));
        let (service, storage) = service(fetches.clone()).await;

        let mut old = SchemaDescription::empty("sales");
        old.retrieved_at = chrono::Utc::now() - chrono::Duration::hours(SCHEMA_MAX_AGE_HOURS + 1);
        storage.save_schema(&old).await.unwrap();

        service.schema("sales").await.unwrap();
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unknown_target_is_connection_error() {
        let (service, _) = service(Arc::new(AtomicUsize::new(0))).await;
        assert!(matches!(service.schema("hr").await, Err(ExecutionError::Connection(_))));
    }

    #[tokio::test]
    async fn test_stalled_introspection_times_out() {
        let (service, storage) = service_with(Arc::new(AtomicUsize::new(0)), true).await;

        let outcome = tokio::time::timeout(Duration::from_secs(5), service.schema("sales"))
            .await
            .expect("schema lookup finished");
        assert!(matches!(outcome, Err(ExecutionError::Timeout(_))));
        assert!(storage.get_schema("sales").await.unwrap().is_none());
    }
}
