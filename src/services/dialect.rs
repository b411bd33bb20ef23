// Dialect rules and generated-query shape analysis
//
// Rules describe how each target dialect quotes identifiers, bounds results
// and treats enum casing; they are rendered into the translation prompt.
// QueryShape reads the limit and sort of a previously generated query so a
// follow-up question can keep the same shape.

use sqlparser::ast::{LimitClause, OrderByKind, Query, Statement};
use sqlparser::dialect::{Dialect as SqlDialect, MySqlDialect, PostgreSqlDialect};
use sqlparser::parser::Parser;

use crate::models::Dialect;

/// Prompt-facing syntax conventions of one dialect
#[derive(Debug, Clone)]
pub struct DialectRules {
    pub name: &'static str,
    pub identifier_quote: char,
    pub limit_clause: &'static str,
    pub enum_casing: &'static str,
    pub hints: &'static [&'static str],
}

impl DialectRules {
    pub fn for_dialect(dialect: Dialect) -> Self {
        match dialect {
            Dialect::PostgreSQL => Self {
                name: "PostgreSQL",
                identifier_quote: '"',
                limit_clause: "LIMIT n (or FETCH FIRST n ROWS ONLY)",
                enum_casing: "Enum and text comparisons are case-sensitive; match stored values exactly or use ILIKE",
                hints: &[
                    "For dates, use functions like NOW(), CURRENT_DATE, interval arithmetic",
                    "String concatenation uses || operator or CONCAT()",
                    "Quote mixed-case identifiers with double quotes: \"TableName\"",
                ],
            },
            Dialect::MySQL => Self {
                name: "MySQL",
                identifier_quote: '`',
                limit_clause: "LIMIT n (not TOP or FETCH FIRST)",
                enum_casing: "String comparisons follow the column collation and are usually case-insensitive; enum values are stored as declared",
                hints: &[
                    "For dates, use functions like NOW(), CURDATE(), DATE_SUB(), etc.",
                    "String concatenation uses CONCAT() function",
                    "Use backticks for identifier quoting if needed: `table_name`",
                ],
            },
        }
    }

    pub fn render(&self) -> String {
        let mut text = format!(
            "- Use {} syntax and functions\n- Quote identifiers with {}\n- Bound results with {}\n- {}\n",
            self.name, self.identifier_quote, self.limit_clause, self.enum_casing
        );
        for hint in self.hints {
            text.push_str("- ");
            text.push_str(hint);
            text.push('\n');
        }
        text
    }
}

/// sqlparser dialect matching a target dialect
pub fn parser_dialect(dialect: Dialect) -> Box<dyn SqlDialect> {
    match dialect {
        Dialect::PostgreSQL => Box::new(PostgreSqlDialect {}),
        Dialect::MySQL => Box::new(MySqlDialect {}),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn inverted(self) -> Self {
        match self {
            SortDirection::Ascending => SortDirection::Descending,
            SortDirection::Descending => SortDirection::Ascending,
        }
    }

    pub fn keyword(self) -> &'static str {
        match self {
            SortDirection::Ascending => "ASC",
            SortDirection::Descending => "DESC",
        }
    }
}

/// Limit and primary sort of a SELECT query
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QueryShape {
    pub limit: Option<u64>,
    pub order_column: Option<String>,
    pub direction: Option<SortDirection>,
}

impl QueryShape {
    /// Analyze `sql`; unparsable or non-SELECT text yields an empty shape
    pub fn analyze(sql: &str, dialect: Dialect) -> Self {
        let parser_dialect = parser_dialect(dialect);
        let statements = match Parser::parse_sql(parser_dialect.as_ref(), sql) {
            Ok(statements) => statements,
            Err(e) => {
                tracing::debug!("Could not parse previous query for shape analysis: {}", e);
                return Self::default();
            }
        };

        match statements.first() {
            Some(Statement::Query(query)) => Self::from_query(query),
            _ => Self::default(),
        }
    }

    fn from_query(query: &Query) -> Self {
        let mut shape = Self::default();

        shape.limit = match &query.limit_clause {
            Some(LimitClause::LimitOffset {
                limit: Some(limit), ..
            }) => limit.to_string().parse::<u64>().ok(),
            Some(LimitClause::OffsetCommaLimit { limit, .. }) => limit.to_string().parse::<u64>().ok(),
            _ => None,
        };
        if shape.limit.is_none() {
            shape.limit = query
                .fetch
                .as_ref()
                .and_then(|fetch| fetch.quantity.as_ref())
                .and_then(|quantity| quantity.to_string().parse::<u64>().ok());
        }

        if let Some(order_by) = &query.order_by {
            if let OrderByKind::Expressions(exprs) = &order_by.kind {
                if let Some(first) = exprs.first() {
                    shape.order_column = Some(first.expr.to_string());
                    shape.direction = Some(match first.options.asc {
                        Some(false) => SortDirection::Descending,
                        _ => SortDirection::Ascending,
                    });
                }
            }
        }

        shape
    }

    /// A bounded query with an explicit sort: the shape a follow-up must preserve
    pub fn is_bounded_sorted(&self) -> bool {
        self.limit.is_some() && self.direction.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_of_single_row_descending() {
        let shape = QueryShape::analyze(
            "SELECT name, salary FROM employees ORDER BY salary DESC LIMIT 1",
            Dialect::PostgreSQL,
        );
        assert_eq!(shape.limit, Some(1));
        assert_eq!(shape.order_column.as_deref(), Some("salary"));
        assert_eq!(shape.direction, Some(SortDirection::Descending));
        assert!(shape.is_bounded_sorted());
    }

    #[test]
    fn test_shape_defaults_to_ascending() {
        let shape = QueryShape::analyze(
            "SELECT name FROM employees ORDER BY hired_at LIMIT 5",
            Dialect::MySQL,
        );
        assert_eq!(shape.limit, Some(5));
        assert_eq!(shape.direction, Some(SortDirection::Ascending));
    }

    #[test]
    fn test_shape_without_limit() {
        let shape = QueryShape::analyze("SELECT * FROM employees ORDER BY salary DESC", Dialect::PostgreSQL);
        assert_eq!(shape.limit, None);
        assert!(!shape.is_bounded_sorted());
    }

    #[test]
    fn test_shape_of_unparsable_text() {
        let shape = QueryShape::analyze("not a query at all", Dialect::PostgreSQL);
        assert_eq!(shape, QueryShape::default());
    }

    #[test]
    fn test_direction_inversion() {
        assert_eq!(SortDirection::Descending.inverted(), SortDirection::Ascending);
        assert_eq!(SortDirection::Ascending.inverted().keyword(), "DESC");
    }

    #[test]
    fn test_rules_render() {
        let rules = DialectRules::for_dialect(Dialect::MySQL).render();
        assert!(rules.contains("MySQL"));
        assert!(rules.contains('`'));
        let rules = DialectRules::for_dialect(Dialect::PostgreSQL).render();
        assert!(rules.contains("LIMIT"));
    }
}
