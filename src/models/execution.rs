use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Rows returned by a target store for one generated query
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub rows: Vec<Value>,
    pub row_count: usize,
    pub execution_time_ms: u64,
    /// Column name -> store-reported type name
    #[serde(default)]
    pub column_types: BTreeMap<String, String>,
    /// Columns holding at least one value beyond safe round-trip integer precision
    #[serde(default)]
    pub unsafe_numeric_fields: BTreeSet<String>,
}

impl ExecutionResult {
    pub fn new(rows: Vec<Value>, execution_time_ms: u64) -> Self {
        let row_count = rows.len();
        Self {
            rows,
            row_count,
            execution_time_ms,
            column_types: BTreeMap::new(),
            unsafe_numeric_fields: BTreeSet::new(),
        }
    }
}
