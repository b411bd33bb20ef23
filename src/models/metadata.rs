use serde::{Deserialize, Serialize};

/// Schema of a target store as presented to the translation service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaDescription {
    pub target_id: String,
    pub tables: Vec<Table>,
    pub relationships: Vec<Relationship>,
    pub retrieved_at: chrono::DateTime<chrono::Utc>,
}

impl SchemaDescription {
    pub fn new(target_id: String, tables: Vec<Table>, relationships: Vec<Relationship>) -> Self {
        Self {
            target_id,
            tables,
            relationships,
            retrieved_at: chrono::Utc::now(),
        }
    }

    pub fn empty(target_id: impl Into<String>) -> Self {
        Self::new(target_id.into(), Vec::new(), Vec::new())
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    pub schema: Option<String>,
    pub columns: Vec<Column>,
    /// A handful of representative rows
    #[serde(default)]
    pub sample_rows: Vec<serde_json::Value>,
    pub description: Option<String>,
}

impl Table {
    pub fn qualified_name(&self) -> String {
        match &self.schema {
            Some(schema) => format!("{}.{}", schema, self.name),
            None => self.name.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub data_type: String,
    pub is_nullable: bool,
    pub is_primary_key: bool,
    pub is_foreign_key: bool,
    pub description: Option<String>,
}

/// Foreign key edge between two tables
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Relationship {
    pub from_table: String,
    pub from_column: String,
    pub to_table: String,
    pub to_column: String,
}
