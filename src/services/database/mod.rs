// Database abstraction layer for target stores
pub mod adapter;
pub mod mysql;
pub mod postgresql;

pub use adapter::{DatabaseAdapter, ExecutionError, MAX_SAFE_INTEGER};
pub use mysql::MySQLAdapter;
pub use postgresql::PostgreSQLAdapter;

use std::sync::Arc;

use crate::models::Dialect;
use crate::services::ConnectionPoolManager;

/// Factory function to create the adapter for a target's dialect
/// For PostgreSQL, uses connection pooling for optimal resource management
pub async fn create_adapter(
    dialect: Dialect,
    connection_url: &str,
    pool_manager: &ConnectionPoolManager,
) -> Result<Arc<dyn DatabaseAdapter>, ExecutionError> {
    match dialect {
        Dialect::PostgreSQL => {
            // Get or create connection pool for this database
            let pool = pool_manager.get_or_create_pool(connection_url).await?;
            Ok(Arc::new(PostgreSQLAdapter::new(pool, connection_url)?))
        }
        Dialect::MySQL => Ok(Arc::new(MySQLAdapter::new(connection_url)?)),
    }
}
