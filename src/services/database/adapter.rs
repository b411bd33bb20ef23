// Database adapter trait for target stores
use std::time::Duration;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::Value;
use thiserror::Error;

use crate::models::{Dialect, ErrorKind, ExecutionResult, PipelineError, SchemaDescription};

/// Largest integer that survives a round trip through an IEEE-754 double
pub const MAX_SAFE_INTEGER: i64 = 9_007_199_254_740_991;

/// Fractional values with more significant digits than this lose precision as doubles
const MAX_EXACT_DECIMAL_MANTISSA: u128 = 999_999_999_999_999;

/// Rows fetched per table when describing a schema
pub const SAMPLE_ROW_LIMIT: usize = 3;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ExecutionError {
    #[error("Query syntax error: {0}")]
    Syntax(String),

    #[error("Permission denied: {0}")]
    Permission(String),

    #[error("Query timeout after {0} seconds")]
    Timeout(u64),

    #[error("Connection error: {0}")]
    Connection(String),
}

impl ExecutionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExecutionError::Syntax(_) => ErrorKind::ExecutionSyntaxError,
            ExecutionError::Permission(_) => ErrorKind::ExecutionPermissionError,
            ExecutionError::Timeout(_) => ErrorKind::ExecutionTimeout,
            ExecutionError::Connection(_) => ErrorKind::ExecutionConnectionError,
        }
    }

    /// Classify a PostgreSQL SQLSTATE code
    pub fn from_sqlstate(code: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        match code {
            "42501" => ExecutionError::Permission(message),
            "57014" => ExecutionError::Timeout(0),
            c if c.starts_with("08") || c.starts_with("28") || c.starts_with("53") || c.starts_with("57P") => {
                ExecutionError::Connection(message)
            }
            _ => ExecutionError::Syntax(message),
        }
    }

    /// Classify a MySQL server error number
    pub fn from_mysql_code(code: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match code {
            1044 | 1142 | 1143 | 1227 | 1370 => ExecutionError::Permission(message),
            1317 | 3024 => ExecutionError::Timeout(0),
            1040 | 1045 | 1053 | 2002 | 2003 | 2006 | 2013 => ExecutionError::Connection(message),
            _ => ExecutionError::Syntax(message),
        }
    }
}

impl From<ExecutionError> for PipelineError {
    fn from(err: ExecutionError) -> Self {
        PipelineError::new(err.kind(), err.to_string())
    }
}

/// Whether an integer is outside the safe round-trip range
pub fn is_unsafe_integer(value: i128) -> bool {
    value.unsigned_abs() > MAX_SAFE_INTEGER as u128
}

/// Quote an identifier for the given dialect
pub fn quote_identifier(dialect: Dialect, ident: &str) -> String {
    match dialect {
        Dialect::PostgreSQL => format!("\"{}\"", ident.replace('"', "\"\"")),
        Dialect::MySQL => format!("`{}`", ident.replace('`', "``")),
    }
}

/// Row sink shared by the adapters: collects JSON rows, column types and unsafe fields
#[derive(Debug, Default)]
pub struct RowCollector {
    result: ExecutionResult,
}

impl RowCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn column_type(&mut self, column: &str, type_name: &str) {
        if !self.result.column_types.contains_key(column) {
            self.result
                .column_types
                .insert(column.to_string(), type_name.to_string());
        }
    }

    pub fn integer(&mut self, column: &str, value: i128) -> Value {
        if is_unsafe_integer(value) {
            self.result.unsafe_numeric_fields.insert(column.to_string());
        }
        if let Ok(v) = i64::try_from(value) {
            Value::from(v)
        } else if let Ok(v) = u64::try_from(value) {
            Value::from(v)
        } else {
            Value::String(value.to_string())
        }
    }

    /// Integral decimals go through `integer`; long fractions stay strings
    pub fn decimal(&mut self, column: &str, value: Decimal) -> Value {
        let value = value.normalize();
        if value.scale() == 0 {
            return self.integer(column, value.mantissa());
        }
        if value.mantissa().unsigned_abs() > MAX_EXACT_DECIMAL_MANTISSA {
            self.result.unsafe_numeric_fields.insert(column.to_string());
            return Value::String(value.to_string());
        }
        value
            .to_f64()
            .map(Value::from)
            .unwrap_or_else(|| Value::String(value.to_string()))
    }

    pub fn push_row(&mut self, row: serde_json::Map<String, Value>) {
        self.result.rows.push(Value::Object(row));
    }

    pub fn finish(mut self, execution_time_ms: u64) -> ExecutionResult {
        self.result.row_count = self.result.rows.len();
        self.result.execution_time_ms = execution_time_ms;
        self.result
    }
}

/// Database adapter trait - abstraction layer over target store engines
#[async_trait::async_trait]
pub trait DatabaseAdapter: Send + Sync {
    /// Execute a read-only query, bounded by `timeout`
    async fn execute_query(&self, sql: &str, timeout: Duration) -> Result<ExecutionResult, ExecutionError>;

    /// Tables, columns, foreign keys and a few sample rows per table
    async fn fetch_schema(&self, target_id: &str) -> Result<SchemaDescription, ExecutionError>;

    fn dialect(&self) -> Dialect;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sqlstate_classification() {
        assert!(matches!(
            ExecutionError::from_sqlstate("42501", "denied"),
            ExecutionError::Permission(_)
        ));
        assert!(matches!(ExecutionError::from_sqlstate("57014", "canceled"), ExecutionError::Timeout(_)));
        assert!(matches!(
            ExecutionError::from_sqlstate("08006", "gone"),
            ExecutionError::Connection(_)
        ));
        assert!(matches!(
            ExecutionError::from_sqlstate("42P01", "no such table"),
            ExecutionError::Syntax(_)
        ));
        assert!(matches!(
            ExecutionError::from_sqlstate("22012", "division by zero"),
            ExecutionError::Syntax(_)
        ));
    }

    #[test]
    fn test_mysql_classification() {
        assert_eq!(
            ExecutionError::from_mysql_code(1142, "denied").kind(),
            ErrorKind::ExecutionPermissionError
        );
        assert_eq!(ExecutionError::from_mysql_code(3024, "slow").kind(), ErrorKind::ExecutionTimeout);
        assert_eq!(
            ExecutionError::from_mysql_code(2013, "lost").kind(),
            ErrorKind::ExecutionConnectionError
        );
        assert_eq!(
            ExecutionError::from_mysql_code(1064, "syntax").kind(),
            ErrorKind::ExecutionSyntaxError
        );
    }

    #[test]
    fn test_collector_marks_unsafe_integers() {
        let mut collector = RowCollector::new();
        let safe = collector.integer("id", 42);
        let unsafe_value = collector.integer("balance", 9_007_199_254_740_993);
        let edge = collector.integer("edge", MAX_SAFE_INTEGER as i128);

        let mut row = serde_json::Map::new();
        row.insert("id".to_string(), safe);
        row.insert("balance".to_string(), unsafe_value);
        row.insert("edge".to_string(), edge);
        collector.push_row(row);

        let result = collector.finish(7);
        assert_eq!(result.row_count, 1);
        assert_eq!(result.execution_time_ms, 7);
        assert!(result.unsafe_numeric_fields.contains("balance"));
        assert!(!result.unsafe_numeric_fields.contains("edge"));
        assert!(!result.unsafe_numeric_fields.contains("id"));
    }

    #[test]
    fn test_collector_decimals() {
        use std::str::FromStr;

        let mut collector = RowCollector::new();
        assert_eq!(collector.decimal("total", Decimal::from_str("1234.50").unwrap()), serde_json::json!(1234.5));
        assert_eq!(collector.decimal("count", Decimal::from_str("42.000").unwrap()), serde_json::json!(42));
        assert_eq!(
            collector.decimal("precise", Decimal::from_str("12345678901234.5678").unwrap()),
            serde_json::json!("12345678901234.5678")
        );
        assert_eq!(
            collector.decimal("sum", Decimal::from_str("123456789012345678901").unwrap()),
            serde_json::json!("123456789012345678901")
        );

        let result = collector.finish(0);
        assert!(result.unsafe_numeric_fields.contains("precise"));
        assert!(result.unsafe_numeric_fields.contains("sum"));
        assert!(!result.unsafe_numeric_fields.contains("total"));
        assert!(!result.unsafe_numeric_fields.contains("count"));
    }

    #[test]
    fn test_quote_identifier() {
        assert_eq!(quote_identifier(Dialect::PostgreSQL, "Order\"s"), "\"Order\"\"s\"");
        assert_eq!(quote_identifier(Dialect::MySQL, "orders"), "`orders`");
    }
}
