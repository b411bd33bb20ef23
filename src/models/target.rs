// Target store model
//
// A target store is a database the pipeline runs generated queries against,
// addressed by id and carrying the dialect used for prompting and parsing.

use serde::{Deserialize, Serialize};

/// Query dialect of a target store
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// PostgreSQL database
    PostgreSQL,
    /// MySQL-protocol database (MySQL, MariaDB, Doris)
    MySQL,
}

impl Dialect {
    /// Get the string representation of the dialect
    pub fn as_str(&self) -> &'static str {
        match self {
            Dialect::PostgreSQL => "postgresql",
            Dialect::MySQL => "mysql",
        }
    }

    /// Parse dialect from string
    pub fn from_str(s: &str) -> Result<Self, String> {
        match s.to_lowercase().as_str() {
            "postgresql" | "postgres" => Ok(Dialect::PostgreSQL),
            "mysql" | "mariadb" | "doris" => Ok(Dialect::MySQL),
            _ => Err(format!("Unsupported dialect: {}", s)),
        }
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Public description of a configured target store (never carries credentials)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetStore {
    pub id: String,
    pub dialect: Dialect,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dialect_parsing() {
        assert_eq!(Dialect::from_str("postgres").unwrap(), Dialect::PostgreSQL);
        assert_eq!(Dialect::from_str("PostgreSQL").unwrap(), Dialect::PostgreSQL);
        assert_eq!(Dialect::from_str("doris").unwrap(), Dialect::MySQL);
        assert!(Dialect::from_str("oracle").is_err());
    }

    #[test]
    fn test_dialect_serialization() {
        let json = serde_json::to_string(&Dialect::PostgreSQL).unwrap();
        assert_eq!(json, "\"postgresql\"");
    }
}
