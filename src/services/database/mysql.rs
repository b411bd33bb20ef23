// MySQL adapter using connection pooling for optimal resource management
use std::time::{Duration, Instant};

use mysql_async::consts::{ColumnFlags, ColumnType};
use mysql_async::{prelude::*, Conn, Opts, Pool, Row, Value as MySqlValue};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use url::Url;

use crate::models::{Column, Dialect, ExecutionResult, Relationship, SchemaDescription, Table};
use crate::services::database::adapter::{
    quote_identifier, DatabaseAdapter, ExecutionError, RowCollector, SAMPLE_ROW_LIMIT,
};

const SYSTEM_SCHEMAS: &str = "('information_schema', 'mysql', 'performance_schema', 'sys')";

pub struct MySQLAdapter {
    pool: Pool,
}

impl MySQLAdapter {
    pub fn new(connection_url: &str) -> Result<Self, ExecutionError> {
        // Validate MySQL URL format
        let url = Url::parse(connection_url)
            .map_err(|e| ExecutionError::Connection(format!("Invalid MySQL URL: {}", e)))?;

        if url.scheme() != "mysql" && url.scheme() != "mariadb" {
            return Err(ExecutionError::Connection(
                "URL must use mysql:// or mariadb:// scheme".to_string(),
            ));
        }

        // mysql_async only understands the mysql:// scheme
        let normalized = if url.scheme() == "mariadb" {
            connection_url.replacen("mariadb://", "mysql://", 1)
        } else {
            connection_url.to_string()
        };
        let opts = Opts::from_url(&normalized)
            .map_err(|e| ExecutionError::Connection(format!("Invalid MySQL URL: {}", e)))?;

        Ok(Self { pool: Pool::new(opts) })
    }

    /// Get a connection from the pool
    async fn get_conn(&self) -> Result<Conn, ExecutionError> {
        self.pool
            .get_conn()
            .await
            .map_err(|e| ExecutionError::Connection(format!("Failed to get MySQL connection from pool: {}", e)))
    }

    fn classify(err: mysql_async::Error, timeout_secs: u64) -> ExecutionError {
        match err {
            mysql_async::Error::Server(server) => {
                match ExecutionError::from_mysql_code(
                    server.code,
                    format!("Code: {}, Message: {}", server.code, server.message),
                ) {
                    ExecutionError::Timeout(_) => ExecutionError::Timeout(timeout_secs),
                    other => other,
                }
            }
            mysql_async::Error::Io(e) => ExecutionError::Connection(e.to_string()),
            mysql_async::Error::Driver(e) => ExecutionError::Connection(e.to_string()),
            other => ExecutionError::Syntax(other.to_string()),
        }
    }

    fn type_name(column_type: ColumnType) -> String {
        format!("{:?}", column_type)
            .trim_start_matches("MYSQL_TYPE_")
            .to_lowercase()
    }

    fn is_integer(column_type: ColumnType) -> bool {
        matches!(
            column_type,
            ColumnType::MYSQL_TYPE_TINY
                | ColumnType::MYSQL_TYPE_SHORT
                | ColumnType::MYSQL_TYPE_INT24
                | ColumnType::MYSQL_TYPE_LONG
                | ColumnType::MYSQL_TYPE_LONGLONG
                | ColumnType::MYSQL_TYPE_YEAR
        )
    }

    /// Convert a MySQL value to JSON, using the column type to recover numbers from text results
    fn mysql_value_to_json(
        mysql_val: MySqlValue,
        column_type: ColumnType,
        column_name: &str,
        collector: &mut RowCollector,
    ) -> Value {
        match mysql_val {
            MySqlValue::NULL => Value::Null,
            MySqlValue::Bytes(bytes) => {
                let text = match String::from_utf8(bytes) {
                    Ok(s) => s,
                    Err(_) => return Value::Null,
                };
                if Self::is_integer(column_type) {
                    if let Ok(v) = text.parse::<i128>() {
                        return collector.integer(column_name, v);
                    }
                }
                if matches!(column_type, ColumnType::MYSQL_TYPE_DECIMAL | ColumnType::MYSQL_TYPE_NEWDECIMAL) {
                    if let Ok(v) = Decimal::from_str_exact(&text) {
                        return collector.decimal(column_name, v);
                    }
                }
                if matches!(column_type, ColumnType::MYSQL_TYPE_FLOAT | ColumnType::MYSQL_TYPE_DOUBLE) {
                    if let Ok(v) = text.parse::<f64>() {
                        return json!(v);
                    }
                }
                json!(text)
            }
            MySqlValue::Int(i) => collector.integer(column_name, i as i128),
            MySqlValue::UInt(u) => collector.integer(column_name, u as i128),
            MySqlValue::Float(f) => json!(f),
            MySqlValue::Double(d) => json!(d),
            MySqlValue::Date(y, m, d, h, min, s, _) => {
                json!(format!("{:04}-{:02}-{:02} {:02}:{:02}:{:02}", y, m, d, h, min, s))
            }
            MySqlValue::Time(is_neg, d, h, m, s, _) => {
                let sign = if is_neg { "-" } else { "" };
                let total_hours = d * 24 + h as u32;
                json!(format!("{}{}:{:02}:{:02}", sign, total_hours, m, s))
            }
        }
    }

    fn collect_rows(rows: Vec<Row>, collector: &mut RowCollector) {
        for row in rows {
            let mut row_obj = serde_json::Map::new();
            let columns = row.columns();

            for (idx, column) in columns.iter().enumerate() {
                let column_name = column.name_str();
                let column_type = column.column_type();
                let type_name = if column.flags().contains(ColumnFlags::UNSIGNED_FLAG) {
                    format!("{} unsigned", Self::type_name(column_type))
                } else {
                    Self::type_name(column_type)
                };
                collector.column_type(&column_name, &type_name);

                let value: Value = match row.get_opt::<MySqlValue, usize>(idx) {
                    Some(Ok(mysql_val)) => {
                        Self::mysql_value_to_json(mysql_val, column_type, &column_name, collector)
                    }
                    Some(Err(_)) | None => Value::Null,
                };
                row_obj.insert(column_name.to_string(), value);
            }
            collector.push_row(row_obj);
        }
    }

    async fn get_tables(conn: &mut Conn) -> Result<Vec<Table>, ExecutionError> {
        let rows: Vec<(String, String, String)> = conn
            .query(format!(
                r#"
                SELECT TABLE_SCHEMA, TABLE_NAME, TABLE_COMMENT
                FROM information_schema.TABLES
                WHERE TABLE_TYPE = 'BASE TABLE'
                  AND TABLE_SCHEMA NOT IN {}
                ORDER BY TABLE_SCHEMA, TABLE_NAME
                "#,
                SYSTEM_SCHEMAS
            ))
            .await
            .map_err(|e| Self::classify(e, 0))?;

        let mut tables = Vec::new();
        for (schema, name, comment) in rows {
            let columns = Self::get_table_columns(conn, &schema, &name).await?;
            let sample_rows = Self::get_sample_rows(conn, &schema, &name).await;
            tables.push(Table {
                name,
                schema: Some(schema),
                columns,
                sample_rows,
                description: Some(comment).filter(|c| !c.is_empty()),
            });
        }

        Ok(tables)
    }

    async fn get_table_columns(
        conn: &mut Conn,
        schema: &str,
        table_name: &str,
    ) -> Result<Vec<Column>, ExecutionError> {
        let query = r#"
            SELECT
                c.COLUMN_NAME,
                c.DATA_TYPE,
                c.IS_NULLABLE,
                CASE WHEN c.COLUMN_KEY = 'PRI' THEN 1 ELSE 0 END AS is_primary_key,
                EXISTS (
                    SELECT 1 FROM information_schema.KEY_COLUMN_USAGE k
                    WHERE k.TABLE_SCHEMA = c.TABLE_SCHEMA
                      AND k.TABLE_NAME = c.TABLE_NAME
                      AND k.COLUMN_NAME = c.COLUMN_NAME
                      AND k.REFERENCED_TABLE_NAME IS NOT NULL
                ) AS is_foreign_key,
                c.COLUMN_COMMENT
            FROM information_schema.COLUMNS c
            WHERE c.TABLE_SCHEMA = ? AND c.TABLE_NAME = ?
            ORDER BY c.ORDINAL_POSITION
        "#;

        let rows: Vec<(String, String, String, i64, i64, String)> = conn
            .exec(query, (schema, table_name))
            .await
            .map_err(|e| Self::classify(e, 0))?;

        Ok(rows
            .into_iter()
            .map(|(name, data_type, is_nullable, is_pk, is_fk, comment)| Column {
                name,
                data_type,
                is_nullable: is_nullable == "YES",
                is_primary_key: is_pk == 1,
                is_foreign_key: is_fk == 1,
                description: Some(comment).filter(|c| !c.is_empty()),
            })
            .collect())
    }

    async fn get_relationships(conn: &mut Conn) -> Result<Vec<Relationship>, ExecutionError> {
        let rows: Vec<(String, String, String, String)> = conn
            .query(format!(
                r#"
                SELECT
                    CONCAT(TABLE_SCHEMA, '.', TABLE_NAME),
                    COLUMN_NAME,
                    CONCAT(REFERENCED_TABLE_SCHEMA, '.', REFERENCED_TABLE_NAME),
                    REFERENCED_COLUMN_NAME
                FROM information_schema.KEY_COLUMN_USAGE
                WHERE REFERENCED_TABLE_NAME IS NOT NULL
                  AND TABLE_SCHEMA NOT IN {}
                ORDER BY 1, 2
                "#,
                SYSTEM_SCHEMAS
            ))
            .await
            .map_err(|e| Self::classify(e, 0))?;

        Ok(rows
            .into_iter()
            .map(|(from_table, from_column, to_table, to_column)| Relationship {
                from_table,
                from_column,
                to_table,
                to_column,
            })
            .collect())
    }

    /// Sample rows are best-effort; a table the user cannot read yields none
    async fn get_sample_rows(conn: &mut Conn, schema: &str, table: &str) -> Vec<Value> {
        let sql = format!(
            "SELECT * FROM {}.{} LIMIT {}",
            quote_identifier(Dialect::MySQL, schema),
            quote_identifier(Dialect::MySQL, table),
            SAMPLE_ROW_LIMIT
        );
        match conn.query::<Row, _>(sql).await {
            Ok(rows) => {
                let mut collector = RowCollector::new();
                Self::collect_rows(rows, &mut collector);
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
impl DatabaseAdapter for MySQLAdapter {
    async fn execute_query(&self, sql: &str, timeout: Duration) -> Result<ExecutionResult, ExecutionError> {
        let timeout_secs = timeout.as_secs();
        let start_time = Instant::now();

        // Pool checkout shares the statement's budget
        let rows = tokio::time::timeout(timeout, async {
            let mut conn = self.get_conn().await?;
            let rows: Vec<Row> = conn
                .query(sql)
                .await
                .map_err(|e| Self::classify(e, timeout_secs))?;
            Ok::<_, ExecutionError>(rows)
        })
        .await
        .map_err(|_| ExecutionError::Timeout(timeout_secs))??;

        let mut collector = RowCollector::new();
        Self::collect_rows(rows, &mut collector);

        Ok(collector.finish(start_time.elapsed().as_millis() as u64))
    }

    async fn fetch_schema(&self, target_id: &str) -> Result<SchemaDescription, ExecutionError> {
        let mut conn = self.get_conn().await?;

        let tables = Self::get_tables(&mut conn).await?;
        let relationships = Self::get_relationships(&mut conn).await?;

        tracing::info!(
            "Fetched schema for target {}: {} tables, {} relationships",
            target_id,
            tables.len(),
            relationships.len()
        );

        Ok(SchemaDescription::new(target_id.to_string(), tables, relationships))
    }

    fn dialect(&self) -> Dialect {
        Dialect::MySQL
    }
}
