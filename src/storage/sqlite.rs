use rusqlite::{Connection, OptionalExtension, Result as SqliteResult};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::models::{AuditRecord, AuditStatus, SchemaDescription};

const AUDIT_COLUMNS: &str = "id, actor_id, action, resource, status, question, generated_query, summary, \
     execution_time_ms, detail_json, error_kind, error_message, created_at, updated_at";

/// SQLite storage for the audit trail and schema snapshots
/// Uses tokio::Mutex for async-friendly locking
pub struct SqliteStorage {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStorage {
    /// Create a new SQLite storage instance
    pub async fn new<P: AsRef<Path>>(db_path: P) -> SqliteResult<Self> {
        // Handle SQLite URL format (sqlite:./path or sqlite://path)
        let path_str = db_path.as_ref().to_string_lossy();
        let clean_path: &str = if path_str.starts_with("sqlite:") {
            path_str.trim_start_matches("sqlite:").trim_start_matches("//")
        } else {
            path_str.as_ref()
        };

        let conn = Connection::open(clean_path)?;
        let storage = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        storage.init_schema().await?;
        Ok(storage)
    }

    /// In-memory database, used by tests and ephemeral deployments
    pub async fn in_memory() -> SqliteResult<Self> {
        let storage = Self {
            conn: Arc::new(Mutex::new(Connection::open_in_memory()?)),
        };
        storage.init_schema().await?;
        Ok(storage)
    }

    /// Initialize database schema
    async fn init_schema(&self) -> SqliteResult<()> {
        let conn = self.conn.lock().await;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS audit_records (
                id TEXT PRIMARY KEY,
                actor_id TEXT NOT NULL,
                action TEXT NOT NULL,
                resource TEXT NOT NULL,
                status TEXT NOT NULL,
                question TEXT NOT NULL,
                generated_query TEXT,
                summary TEXT,
                execution_time_ms INTEGER,
                detail_json TEXT NOT NULL DEFAULT 'null',
                error_kind TEXT,
                error_message TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
            [],
        )?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS schema_cache (
                target_id TEXT PRIMARY KEY,
                schema_json TEXT NOT NULL,
                retrieved_at TEXT NOT NULL
            )
            "#,
            [],
        )?;

        // Per-actor history is read most recent first
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_audit_actor_created ON audit_records(actor_id, created_at DESC)",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_audit_status ON audit_records(status)",
            [],
        )?;

        Ok(())
    }

    // ============================================================================
    // Audit Record Operations
    // ============================================================================

    pub async fn create_audit_record(&self, record: &AuditRecord) -> SqliteResult<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            &format!(
                "INSERT INTO audit_records ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                AUDIT_COLUMNS
            ),
            rusqlite::params![
                record.id,
                record.actor_id,
                record.action,
                record.resource,
                record.status.as_str(),
                record.question,
                record.generated_query,
                record.summary,
                record.execution_time_ms.map(|ms| ms as i64),
                record.detail.to_string(),
                record.error_kind,
                record.error_message,
                record.created_at.to_rfc3339(),
                record.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Write the mutable fields of an existing record; false when the id is unknown
    pub async fn update_audit_record(&self, record: &AuditRecord) -> SqliteResult<bool> {
        let conn = self.conn.lock().await;
        let rows_affected = conn.execute(
            r#"
            UPDATE audit_records
            SET status = ?2, generated_query = ?3, summary = ?4, execution_time_ms = ?5,
                detail_json = ?6, error_kind = ?7, error_message = ?8, updated_at = ?9
            WHERE id = ?1
            "#,
            rusqlite::params![
                record.id,
                record.status.as_str(),
                record.generated_query,
                record.summary,
                record.execution_time_ms.map(|ms| ms as i64),
                record.detail.to_string(),
                record.error_kind,
                record.error_message,
                record.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(rows_affected > 0)
    }

    pub async fn get_audit_record(&self, id: &str) -> SqliteResult<Option<AuditRecord>> {
        let conn = self.conn.lock().await;
        conn.query_row(
            &format!("SELECT {} FROM audit_records WHERE id = ?1", AUDIT_COLUMNS),
            [id],
            Self::row_to_audit_record,
        )
        .optional()
    }

    /// Most recent records of one actor
    pub async fn list_audit_records(&self, actor_id: &str, limit: usize) -> SqliteResult<Vec<AuditRecord>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM audit_records WHERE actor_id = ?1 ORDER BY created_at DESC, rowid DESC LIMIT ?2",
            AUDIT_COLUMNS
        ))?;

        let records = stmt.query_map(
            rusqlite::params![actor_id, limit as i64],
            Self::row_to_audit_record,
        )?;

        records.collect()
    }

    fn row_to_audit_record(row: &rusqlite::Row<'_>) -> SqliteResult<AuditRecord> {
        let detail_json: String = row.get(9)?;
        Ok(AuditRecord {
            id: row.get(0)?,
            actor_id: row.get(1)?,
            action: row.get(2)?,
            resource: row.get(3)?,
            status: AuditStatus::parse(&row.get::<_, String>(4)?),
            question: row.get(5)?,
            generated_query: row.get(6)?,
            summary: row.get(7)?,
            execution_time_ms: row.get::<_, Option<i64>>(8)?.map(|ms| ms as u64),
            detail: serde_json::from_str(&detail_json).unwrap_or(serde_json::Value::Null),
            error_kind: row.get(10)?,
            error_message: row.get(11)?,
            created_at: Self::parse_timestamp(&row.get::<_, String>(12)?),
            updated_at: Self::parse_timestamp(&row.get::<_, String>(13)?),
        })
    }

    fn parse_timestamp(value: &str) -> chrono::DateTime<chrono::Utc> {
        chrono::DateTime::parse_from_rfc3339(value)
            .map(|dt| dt.with_timezone(&chrono::Utc))
            .unwrap_or_else(|_| chrono::Utc::now())
    }

    // ============================================================================
    // Schema Snapshot Operations
    // ============================================================================

    pub async fn save_schema(&self, schema: &SchemaDescription) -> SqliteResult<()> {
        let schema_json = serde_json::to_string(schema)
            .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;

        let conn = self.conn.lock().await;
        conn.execute(
            r#"
            INSERT OR REPLACE INTO schema_cache (target_id, schema_json, retrieved_at)
            VALUES (?1, ?2, ?3)
            "#,
            rusqlite::params![schema.target_id, schema_json, schema.retrieved_at.to_rfc3339()],
        )?;
        Ok(())
    }

    pub async fn get_schema(&self, target_id: &str) -> SqliteResult<Option<SchemaDescription>> {
        let conn = self.conn.lock().await;
        let schema_json: Option<String> = conn
            .query_row(
                "SELECT schema_json FROM schema_cache WHERE target_id = ?1",
                [target_id],
                |row| row.get(0),
            )
            .optional()?;

        match schema_json {
            Some(json) => serde_json::from_str(&json).map(Some).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
            }),
            None => Ok(None),
        }
    }

    pub async fn delete_schema(&self, target_id: &str) -> SqliteResult<bool> {
        let conn = self.conn.lock().await;
        let rows_affected = conn.execute("DELETE FROM schema_cache WHERE target_id = ?1", [target_id])?;
        Ok(rows_affected > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AuditOutcome, Column, Table};
    use tempfile::tempdir;

    fn pending(actor: &str, question: &str) -> AuditRecord {
        AuditRecord::new_pending(actor.to_string(), "sales".to_string(), question.to_string())
    }

    #[tokio::test]
    async fn test_sqlite_storage_creation() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        assert!(SqliteStorage::new(&db_path).await.is_ok());
    }

    #[tokio::test]
    async fn test_sqlite_url_prefix_is_stripped() {
        let dir = tempdir().unwrap();
        let db_path = format!("sqlite://{}", dir.path().join("prefixed.db").display());
        assert!(SqliteStorage::new(&db_path).await.is_ok());
        assert!(dir.path().join("prefixed.db").exists());
    }

    #[tokio::test]
    async fn test_schema_initialization() {
        let storage = SqliteStorage::in_memory().await.unwrap();
        let conn = storage.conn.lock().await;
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' AND name IN ('audit_records', 'schema_cache')")
            .unwrap();
        let tables: Vec<String> = stmt.query_map([], |row| row.get(0)).unwrap().map(|r| r.unwrap()).collect();
        assert_eq!(tables.len(), 2);
    }

    #[tokio::test]
    async fn test_audit_record_lifecycle() {
        let storage = SqliteStorage::in_memory().await.unwrap();
        let mut record = pending("alice", "count orders");
        storage.create_audit_record(&record).await.unwrap();

        let stored = storage.get_audit_record(&record.id).await.unwrap().unwrap();
        assert_eq!(stored.status, AuditStatus::Pending);
        assert_eq!(stored.question, "count orders");

        record.apply(AuditOutcome::Success {
            generated_query: "SELECT COUNT(*) FROM orders".to_string(),
            summary: Some("Counts orders".to_string()),
            execution_time_ms: 12,
            detail: serde_json::json!({"row_count": 1}),
        });
        assert!(storage.update_audit_record(&record).await.unwrap());

        let stored = storage.get_audit_record(&record.id).await.unwrap().unwrap();
        assert_eq!(stored.status, AuditStatus::Success);
        assert_eq!(stored.generated_query.as_deref(), Some("SELECT COUNT(*) FROM orders"));
        assert_eq!(stored.execution_time_ms, Some(12));
        assert_eq!(stored.detail["row_count"], 1);
    }

    #[tokio::test]
    async fn test_update_unknown_record() {
        let storage = SqliteStorage::in_memory().await.unwrap();
        let record = pending("alice", "never created");
        assert!(!storage.update_audit_record(&record).await.unwrap());
        assert!(storage.get_audit_record(&record.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_audit_records_scoped_and_limited() {
        let storage = SqliteStorage::in_memory().await.unwrap();
        for i in 0..5 {
            storage.create_audit_record(&pending("alice", &format!("q{}", i))).await.unwrap();
        }
        storage.create_audit_record(&pending("bob", "other")).await.unwrap();

        let records = storage.list_audit_records("alice", 3).await.unwrap();
        assert_eq!(records.len(), 3);
        assert!(records.iter().all(|r| r.actor_id == "alice"));
        assert_eq!(records[0].question, "q4");

        assert_eq!(storage.list_audit_records("bob", 10).await.unwrap().len(), 1);
        assert!(storage.list_audit_records("carol", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_schema_snapshot_round_trip() {
        let storage = SqliteStorage::in_memory().await.unwrap();
        assert!(storage.get_schema("sales").await.unwrap().is_none());

        let schema = SchemaDescription::new(
            "sales".to_string(),
            vec![Table {
                name: "customers".to_string(),
                schema: Some("public".to_string()),
                columns: vec![Column {
                    name: "id".to_string(),
                    data_type: "integer".to_string(),
                    is_nullable: false,
                    is_primary_key: true,
                    is_foreign_key: false,
                    description: None,
                }],
                sample_rows: vec![serde_json::json!({"id": 1})],
                description: None,
            }],
            Vec::new(),
        );
        storage.save_schema(&schema).await.unwrap();

        let loaded = storage.get_schema("sales").await.unwrap().unwrap();
        assert_eq!(loaded.tables.len(), 1);
        assert_eq!(loaded.tables[0].sample_rows.len(), 1);

        assert!(storage.delete_schema("sales").await.unwrap());
        assert!(storage.get_schema("sales").await.unwrap().is_none());
    }
}
