use sqlparser::ast::{Query, SetExpr, Statement};
use sqlparser::parser::Parser;

use crate::models::Dialect;
use crate::services::database::ExecutionError;
use crate::services::dialect::parser_dialect;

/// Generated query ready to run, after the read-only guard
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedQuery {
    pub sql: String,
    pub limit_applied: bool,
}

/// Guard for generated queries: read-only, single statement, bounded
pub struct SqlValidator;

impl SqlValidator {
    fn parse(sql: &str, dialect: Dialect) -> Result<Vec<Statement>, ExecutionError> {
        let parser_dialect = parser_dialect(dialect);
        let ast = Parser::parse_sql(parser_dialect.as_ref(), sql)
            .map_err(|e| ExecutionError::Syntax(format!("SQL parsing error: {}", e)))?;

        if ast.is_empty() {
            return Err(ExecutionError::Syntax("Empty SQL query".to_string()));
        }
        Ok(ast)
    }

    /// Validate SQL query and ensure it's a single SELECT statement
    pub fn validate_select_only(sql: &str, dialect: Dialect) -> Result<(), ExecutionError> {
        let ast = Self::parse(sql, dialect)?;
        Self::check_statements(&ast)
    }

    fn denied(kind: &str) -> ExecutionError {
        ExecutionError::Permission(format!(
            "{} statements are not allowed. Only SELECT queries are permitted.",
            kind
        ))
    }

    /// Reject writes hidden inside a query: data-modifying CTEs, SELECT INTO, row locks
    fn check_query(query: &Query) -> Result<(), ExecutionError> {
        if let Some(with) = &query.with {
            for cte in &with.cte_tables {
                Self::check_query(&cte.query)?;
            }
        }
        if !query.locks.is_empty() {
            return Err(Self::denied("Locking"));
        }
        Self::check_set_expr(&query.body)
    }

    fn check_set_expr(expr: &SetExpr) -> Result<(), ExecutionError> {
        match expr {
            SetExpr::Select(select) if select.into.is_some() => Err(Self::denied("SELECT INTO")),
            SetExpr::Select(_) | SetExpr::Values(_) | SetExpr::Table(_) => Ok(()),
            SetExpr::Query(query) => Self::check_query(query),
            SetExpr::SetOperation { left, right, .. } => {
                Self::check_set_expr(left)?;
                Self::check_set_expr(right)
            }
            SetExpr::Insert(_) => Err(Self::denied("INSERT")),
            SetExpr::Update(_) => Err(Self::denied("UPDATE")),
            SetExpr::Delete(_) => Err(Self::denied("DELETE")),
            _ => Err(Self::denied("This")),
        }
    }

    fn check_statements(ast: &[Statement]) -> Result<(), ExecutionError> {
        for stmt in ast {
            let kind = match stmt {
                Statement::Query(query) => {
                    Self::check_query(query)?;
                    continue;
                }
                Statement::Insert { .. } => "INSERT",
                Statement::Update { .. } => "UPDATE",
                Statement::Delete { .. } => "DELETE",
                Statement::Drop { .. } => "DROP",
                Statement::CreateTable { .. } => "CREATE TABLE",
                Statement::AlterTable { .. } => "ALTER TABLE",
                Statement::Truncate { .. } => "TRUNCATE",
                Statement::Grant { .. } => "GRANT",
                _ => "This",
            };
            return Err(Self::denied(kind));
        }

        if ast.len() > 1 {
            return Err(ExecutionError::Syntax(
                "Only a single SELECT statement is permitted".to_string(),
            ));
        }
        Ok(())
    }

    /// Check if a statement has a LIMIT or FETCH clause using AST analysis
    fn check_limit_in_statement(stmt: &Statement) -> bool {
        match stmt {
            Statement::Query(query) => query.limit_clause.is_some() || query.fetch.is_some(),
            _ => false,
        }
    }

    /// Validate SELECT-only and append the default limit when the query is unbounded
    pub fn validate_and_prepare(
        sql: &str,
        dialect: Dialect,
        default_limit: u64,
    ) -> Result<PreparedQuery, ExecutionError> {
        let ast = Self::parse(sql, dialect)?;
        Self::check_statements(&ast)?;

        if Self::check_limit_in_statement(&ast[0]) {
            return Ok(PreparedQuery {
                sql: sql.to_string(),
                limit_applied: false,
            });
        }

        let trimmed_sql = sql.trim().trim_end_matches(';').trim_end();
        // A trailing line comment would swallow an appended clause
        let separator = match trimmed_sql.lines().last() {
            Some(line) if line.contains("--") => "\n",
            _ => " ",
        };

        Ok(PreparedQuery {
            sql: format!("{}{}LIMIT {}", trimmed_sql, separator, default_limit),
            limit_applied: true,
        })
    }
}
