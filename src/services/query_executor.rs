// Query Executor
//
// Routes a generated query to the configured target store by id. The
// registry is built once from configuration and shared read-only.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::TargetConfig;
use crate::models::{Dialect, ExecutionResult, SchemaDescription, TargetStore};
use crate::services::connection_pool::{mask_credentials, ConnectionPoolManager};
use crate::services::database::{create_adapter, DatabaseAdapter, ExecutionError};

#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Public description of a target store, if configured
    fn target(&self, target_id: &str) -> Option<TargetStore>;

    /// Every configured target store, ordered by id
    fn targets(&self) -> Vec<TargetStore>;

    /// Run `sql` against `target_id`; `question` is diagnostic context only
    async fn execute(&self, target_id: &str, sql: &str, question: &str) -> Result<ExecutionResult, ExecutionError>;
}

struct RegisteredTarget {
    store: TargetStore,
    adapter: Arc<dyn DatabaseAdapter>,
}

pub struct TargetRegistry {
    targets: BTreeMap<String, RegisteredTarget>,
    execution_timeout: Duration,
}

impl TargetRegistry {
    pub fn new(execution_timeout: Duration) -> Self {
        Self {
            targets: BTreeMap::new(),
            execution_timeout,
        }
    }

    /// Build adapters for every configured target; a bad entry is skipped with an error log
    pub async fn from_config(
        configs: &[TargetConfig],
        pool_manager: &ConnectionPoolManager,
        execution_timeout: Duration,
    ) -> Self {
        let mut registry = Self::new(execution_timeout);

        for config in configs {
            let dialect = match Dialect::from_str(&config.dialect) {
                Ok(dialect) => dialect,
                Err(e) => {
                    tracing::error!("Skipping target {}: {}", config.id, e);
                    continue;
                }
            };

            match create_adapter(dialect, &config.url, pool_manager).await {
                Ok(adapter) => {
                    tracing::info!(
                        "Registered target {} ({}) at {}",
                        config.id,
                        dialect,
                        mask_credentials(&config.url)
                    );
                    registry.register(
                        TargetStore {
                            id: config.id.clone(),
                            dialect,
                            description: config.description.clone(),
                        },
                        adapter,
                    );
                }
                Err(e) => tracing::error!("Skipping target {}: {}", config.id, e),
            }
        }

        registry
    }

    pub fn register(&mut self, store: TargetStore, adapter: Arc<dyn DatabaseAdapter>) {
        self.targets
            .insert(store.id.clone(), RegisteredTarget { store, adapter });
    }

    pub fn adapter(&self, target_id: &str) -> Option<Arc<dyn DatabaseAdapter>> {
        self.targets.get(target_id).map(|t| t.adapter.clone())
    }

    /// Introspect a target, bounded by the execution timeout
    pub async fn describe(&self, target_id: &str) -> Result<SchemaDescription, ExecutionError> {
        let adapter = self
            .adapter(target_id)
            .ok_or_else(|| ExecutionError::Connection(format!("Unknown target store: {}", target_id)))?;

        tokio::time::timeout(self.execution_timeout, adapter.fetch_schema(target_id))
            .await
            .map_err(|_| {
                tracing::warn!(
                    "Schema introspection for {} exceeded {}s",
                    target_id,
                    self.execution_timeout.as_secs()
                );
                ExecutionError::Timeout(self.execution_timeout.as_secs())
            })?
    }

    /// Configured targets ordered by id
    pub fn list(&self) -> Vec<TargetStore> {
        self.targets.values().map(|t| t.store.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

#[async_trait]
impl QueryExecutor for TargetRegistry {
    fn target(&self, target_id: &str) -> Option<TargetStore> {
        self.targets.get(target_id).map(|t| t.store.clone())
    }

    fn targets(&self) -> Vec<TargetStore> {
        self.list()
    }

    async fn execute(&self, target_id: &str, sql: &str, question: &str) -> Result<ExecutionResult, ExecutionError> {
        let adapter = self
            .adapter(target_id)
            .ok_or_else(|| ExecutionError::Connection(format!("Unknown target store: {}", target_id)))?;

        let execution = tokio::time::timeout(self.execution_timeout, adapter.execute_query(sql, self.execution_timeout))
            .await
            .unwrap_or(Err(ExecutionError::Timeout(self.execution_timeout.as_secs())));

        match execution {
            Ok(result) => {
                tracing::info!(
                    "Executed query on {}: {} rows in {}ms",
                    target_id,
                    result.row_count,
                    result.execution_time_ms
                );
                Ok(result)
            }
            Err(e) => {
                tracing::warn!("Execution failed on {} for question {:?}: {}", target_id, question, e);
                Err(e)
            }
        }
    }
}
