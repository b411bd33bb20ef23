// PostgreSQL adapter using connection pooling for optimal resource management
use std::time::{Duration, Instant};

use deadpool_postgres::Pool;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use tokio_postgres::types::Type;
use url::Url;

use crate::models::{Column, Dialect, ExecutionResult, Relationship, SchemaDescription, Table};
use crate::services::database::adapter::{
    quote_identifier, DatabaseAdapter, ExecutionError, RowCollector, SAMPLE_ROW_LIMIT,
};

const SYSTEM_SCHEMAS: &str = "('pg_catalog', 'information_schema', 'pg_toast')";

pub struct PostgreSQLAdapter {
    pool: Pool,
}

impl PostgreSQLAdapter {
    pub fn new(pool: Pool, connection_url: &str) -> Result<Self, ExecutionError> {
        // Validate PostgreSQL URL format
        let url = Url::parse(connection_url)
            .map_err(|e| ExecutionError::Connection(format!("Invalid PostgreSQL URL: {}", e)))?;

        if url.scheme() != "postgresql" && url.scheme() != "postgres" {
            return Err(ExecutionError::Connection(
                "URL must use postgresql:// or postgres:// scheme".to_string(),
            ));
        }

        Ok(Self { pool })
    }

    async fn client(&self) -> Result<deadpool_postgres::Object, ExecutionError> {
        self.pool
            .get()
            .await
            .map_err(|e| ExecutionError::Connection(format!("Failed to get connection from pool: {}", e)))
    }

    fn classify(err: tokio_postgres::Error, timeout_secs: u64) -> ExecutionError {
        match err.as_db_error() {
            Some(db_error) => {
                let code = db_error.code().code();
                match ExecutionError::from_sqlstate(code, format!("Code: {}, Message: {}", code, db_error.message())) {
                    ExecutionError::Timeout(_) => ExecutionError::Timeout(timeout_secs),
                    other => other,
                }
            }
            None if err.is_closed() => ExecutionError::Connection(err.to_string()),
            None => ExecutionError::Syntax(err.to_string()),
        }
    }

    fn collect_rows(rows: &[tokio_postgres::Row], collector: &mut RowCollector) {
        for row in rows {
            let mut row_obj = serde_json::Map::new();
            for (idx, column) in row.columns().iter().enumerate() {
                let column_name = column.name();
                collector.column_type(column_name, column.type_().name());

                let value: Value = match *column.type_() {
                    Type::INT2 => row
                        .try_get::<_, Option<i16>>(idx)
                        .ok()
                        .flatten()
                        .map(|v| json!(v))
                        .unwrap_or(Value::Null),
                    Type::INT4 => row
                        .try_get::<_, Option<i32>>(idx)
                        .ok()
                        .flatten()
                        .map(|v| json!(v))
                        .unwrap_or(Value::Null),
                    Type::INT8 => row
                        .try_get::<_, Option<i64>>(idx)
                        .ok()
                        .flatten()
                        .map(|v| collector.integer(column_name, v as i128))
                        .unwrap_or(Value::Null),
                    Type::FLOAT4 => row
                        .try_get::<_, Option<f32>>(idx)
                        .ok()
                        .flatten()
                        .map(|v| json!(v))
                        .unwrap_or(Value::Null),
                    Type::FLOAT8 => row
                        .try_get::<_, Option<f64>>(idx)
                        .ok()
                        .flatten()
                        .map(|v| json!(v))
                        .unwrap_or(Value::Null),
                    Type::NUMERIC => match row.try_get::<_, Option<Decimal>>(idx) {
                        Ok(Some(v)) => collector.decimal(column_name, v),
                        Ok(None) => Value::Null,
                        // NaN, infinities and values past 28 digits
                        Err(_) => json!(format!("<{}>", column.type_().name())),
                    },
                    Type::UUID => row
                        .try_get::<_, Option<uuid::Uuid>>(idx)
                        .ok()
                        .flatten()
                        .map(|v| json!(v.to_string()))
                        .unwrap_or(Value::Null),
                    Type::JSON | Type::JSONB => row
                        .try_get::<_, Option<Value>>(idx)
                        .ok()
                        .flatten()
                        .unwrap_or(Value::Null),
                    Type::BOOL => row
                        .try_get::<_, Option<bool>>(idx)
                        .ok()
                        .flatten()
                        .map(|v| json!(v))
                        .unwrap_or(Value::Null),
                    Type::TIMESTAMPTZ => row
                        .try_get::<_, Option<chrono::DateTime<chrono::Utc>>>(idx)
                        .ok()
                        .flatten()
                        .map(|v| json!(v.to_rfc3339()))
                        .unwrap_or(Value::Null),
                    Type::TIMESTAMP => row
                        .try_get::<_, Option<chrono::NaiveDateTime>>(idx)
                        .ok()
                        .flatten()
                        .map(|v| json!(v.to_string()))
                        .unwrap_or(Value::Null),
                    Type::DATE => row
                        .try_get::<_, Option<chrono::NaiveDate>>(idx)
                        .ok()
                        .flatten()
                        .map(|v| json!(v.to_string()))
                        .unwrap_or(Value::Null),
                    _ => {
                        // Text-like types; anything else shows its type name as placeholder
                        match row.try_get::<_, Option<String>>(idx) {
                            Ok(Some(v)) => json!(v),
                            Ok(None) => Value::Null,
                            Err(_) => json!(format!("<{}>", column.type_().name())),
                        }
                    }
                };
                row_obj.insert(column_name.to_string(), value);
            }
            collector.push_row(row_obj);
        }
    }

    async fn get_tables(client: &tokio_postgres::Client) -> Result<Vec<Table>, ExecutionError> {
        let sql = format!(
            "SELECT table_schema, table_name FROM information_schema.tables \
             WHERE table_type = 'BASE TABLE' AND table_schema NOT IN {} \
             ORDER BY table_schema, table_name",
            SYSTEM_SCHEMAS
        );
        let rows = client
            .query(sql.as_str(), &[])
            .await
            .map_err(|e| Self::classify(e, 0))?;

        let mut tables = Vec::new();
        for row in rows {
            let schema = row.get::<_, String>(0);
            let name = row.get::<_, String>(1);
            let columns = Self::get_table_columns(client, &schema, &name).await?;
            let sample_rows = Self::get_sample_rows(client, &schema, &name).await;
            tables.push(Table {
                name,
                schema: Some(schema),
                columns,
                sample_rows,
                description: None,
            });
        }

        Ok(tables)
    }

    async fn get_table_columns(
        client: &tokio_postgres::Client,
        schema: &str,
        table_name: &str,
    ) -> Result<Vec<Column>, ExecutionError> {
        let rows = client
            .query(
                r#"
                SELECT
                    c.column_name,
                    c.data_type,
                    c.is_nullable,
                    EXISTS (
                        SELECT 1 FROM information_schema.table_constraints tc
                        JOIN information_schema.key_column_usage ku
                            ON tc.constraint_name = ku.constraint_name
                            AND tc.table_schema = ku.table_schema
                        WHERE tc.constraint_type = 'PRIMARY KEY'
                            AND tc.table_schema = $1 AND tc.table_name = $2
                            AND ku.column_name = c.column_name
                    ) AS is_primary_key,
                    EXISTS (
                        SELECT 1 FROM information_schema.table_constraints tc
                        JOIN information_schema.key_column_usage ku
                            ON tc.constraint_name = ku.constraint_name
                            AND tc.table_schema = ku.table_schema
                        WHERE tc.constraint_type = 'FOREIGN KEY'
                            AND tc.table_schema = $1 AND tc.table_name = $2
                            AND ku.column_name = c.column_name
                    ) AS is_foreign_key,
                    col_description(
                        (quote_ident(c.table_schema) || '.' || quote_ident(c.table_name))::regclass,
                        c.ordinal_position::int
                    ) AS description
                FROM information_schema.columns c
                WHERE c.table_schema = $1 AND c.table_name = $2
                ORDER BY c.ordinal_position
                "#,
                &[&schema, &table_name],
            )
            .await
            .map_err(|e| Self::classify(e, 0))?;

        Ok(rows
            .iter()
            .map(|row| Column {
                name: row.get(0),
                data_type: row.get(1),
                is_nullable: row.get::<_, String>(2) == "YES",
                is_primary_key: row.try_get(3).unwrap_or(false),
                is_foreign_key: row.try_get(4).unwrap_or(false),
                description: row.try_get::<_, Option<String>>(5).ok().flatten(),
            })
            .collect())
    }

    async fn get_relationships(client: &tokio_postgres::Client) -> Result<Vec<Relationship>, ExecutionError> {
        let sql = format!(
            r#"
            SELECT
                kcu.table_schema || '.' || kcu.table_name,
                kcu.column_name,
                ccu.table_schema || '.' || ccu.table_name,
                ccu.column_name
            FROM information_schema.table_constraints tc
            JOIN information_schema.key_column_usage kcu
                ON tc.constraint_name = kcu.constraint_name
                AND tc.table_schema = kcu.table_schema
            JOIN information_schema.constraint_column_usage ccu
                ON ccu.constraint_name = tc.constraint_name
                AND ccu.constraint_schema = tc.constraint_schema
            WHERE tc.constraint_type = 'FOREIGN KEY'
                AND tc.table_schema NOT IN {}
            ORDER BY 1, 2
            "#,
            SYSTEM_SCHEMAS
        );
        let rows = client
            .query(sql.as_str(), &[])
            .await
            .map_err(|e| Self::classify(e, 0))?;

        Ok(rows
            .iter()
            .map(|row| Relationship {
                from_table: row.get(0),
                from_column: row.get(1),
                to_table: row.get(2),
                to_column: row.get(3),
            })
            .collect())
    }

    /// Sample rows are best-effort; a table the role cannot read yields none
    async fn get_sample_rows(client: &tokio_postgres::Client, schema: &str, table: &str) -> Vec<Value> {
        let sql = format!(
            "SELECT * FROM {}.{} LIMIT {}",
            quote_identifier(Dialect::PostgreSQL, schema),
            quote_identifier(Dialect::PostgreSQL, table),
            SAMPLE_ROW_LIMIT
        );
        match client.query(sql.as_str(), &[]).await {
            Ok(rows) => {
                let mut collector = RowCollector::new();
                Self::collect_rows(&rows, &mut collector);
                collector.finish(0).rows
            }
            Err(e) => {
                tracing::debug!("Skipping sample rows for {}.{}: {}", schema, table, e);
                Vec::new()
            }
        }
    }
}

#[async_trait::async_trait]
impl DatabaseAdapter for PostgreSQLAdapter {
    async fn execute_query(&self, sql: &str, timeout: Duration) -> Result<ExecutionResult, ExecutionError> {
        let timeout_secs = timeout.as_secs();
        let start_time = Instant::now();

        // Pool checkout shares the statement's budget
        let rows = tokio::time::timeout(timeout, async {
            let client = self.client().await?;
            let rows = client
                .query(sql, &[])
                .await
                .map_err(|e| Self::classify(e, timeout_secs))?;
            Ok::<_, ExecutionError>(rows)
        })
        .await
        .map_err(|_| ExecutionError::Timeout(timeout_secs))??;

        let mut collector = RowCollector::new();
        Self::collect_rows(&rows, &mut collector);

        Ok(collector.finish(start_time.elapsed().as_millis() as u64))
    }

    async fn fetch_schema(&self, target_id: &str) -> Result<SchemaDescription, ExecutionError> {
        let client = self.client().await?;

        let tables = Self::get_tables(&client).await?;
        let relationships = Self::get_relationships(&client).await?;

        tracing::info!(
            "Fetched schema for target {}: {} tables, {} relationships",
            target_id,
            tables.len(),
            relationships.len()
        );

        Ok(SchemaDescription::new(target_id.to_string(), tables, relationships))
    }

    fn dialect(&self) -> Dialect {
        Dialect::PostgreSQL
    }
}
