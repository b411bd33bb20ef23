// Prompt Builder
//
// Assembles the dialect- and schema-aware instruction sent to the
// translation service: dialect rules, schema with relationships and sample
// rows, up to three similar past translations, conversational context, and
// the follow-up shape rule.

use crate::models::{PatternMatch, PriorTurn, SchemaDescription, TargetStore};
use crate::services::dialect::{DialectRules, QueryShape, SortDirection};

pub const MAX_EXEMPLARS: usize = 3;
pub const MIN_EXEMPLAR_SIMILARITY: f32 = 0.75;
const MAX_SAMPLE_ROWS: usize = 3;

pub const SYSTEM_PROMPT: &str =
    "You are a database expert who translates questions into read-only SQL. Respond with a single JSON object and nothing else.";

/// Opposing superlatives; a follow-up naming the counterpart of a term in the
/// previous question is structurally parallel to it
const SUPERLATIVE_PAIRS: &[(&str, &str)] = &[
    ("highest", "lowest"),
    ("most", "least"),
    ("largest", "smallest"),
    ("biggest", "smallest"),
    ("maximum", "minimum"),
    ("max", "min"),
    ("top", "bottom"),
    ("best", "worst"),
    ("oldest", "newest"),
    ("oldest", "youngest"),
    ("earliest", "latest"),
    ("greatest", "least"),
    ("longest", "shortest"),
    ("richest", "poorest"),
    ("first", "last"),
];

const FOLLOW_UP_OPENERS: &[&str] = &["and", "what about", "how about", "now", "same for", "what of"];

/// Required shape for a parallel follow-up question
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FollowUpDirective {
    pub limit: u64,
    pub order_column: Option<String>,
    pub previous_direction: SortDirection,
    pub required_direction: SortDirection,
}

impl FollowUpDirective {
    pub fn render(&self) -> String {
        let column = self
            .order_column
            .as_deref()
            .map(|c| format!(" by {}", c))
            .unwrap_or_default();
        format!(
            "REQUIRED SHAPE: The previous query returned at most {limit} row(s) ordered{column} {prev}. \
             This question is a parallel follow-up: keep exactly LIMIT {limit} and the same selected columns, \
             filters and sort column, and change only the sort direction to {req}.",
            limit = self.limit,
            column = column,
            prev = self.previous_direction.keyword(),
            req = self.required_direction.keyword(),
        )
    }
}

/// Everything the builder needs for one request
pub struct PromptInput<'a> {
    pub question: &'a str,
    pub target: &'a TargetStore,
    pub schema: &'a SchemaDescription,
    pub context: Option<&'a PriorTurn>,
    pub exemplars: &'a [PatternMatch],
}

/// Built prompt: a fixed system message plus one instruction
#[derive(Debug, Clone)]
pub struct Prompt {
    pub system: String,
    pub instruction: String,
    pub follow_up: Option<FollowUpDirective>,
}

pub struct PromptBuilder;

impl PromptBuilder {
    pub fn build(input: &PromptInput<'_>) -> Prompt {
        let dialect = input.target.dialect;
        let rules = DialectRules::for_dialect(dialect);
        let follow_up = input
            .context
            .and_then(|context| Self::follow_up_directive(input.question, context, dialect));

        let mut text = format!(
            "Given the {name} database schema below, translate the question into ONE read-only {name} SELECT query for store \"{store}\".\n\n",
            name = rules.name,
            store = input.target.id,
        );

        text.push_str("Dialect rules:\n");
        text.push_str(&rules.render());
        text.push('\n');

        text.push_str(&Self::schema_context(input.schema));

        let exemplars = Self::select_exemplars(input.exemplars);
        if !exemplars.is_empty() {
            text.push_str("Previously successful translations for this store (use as guidance, not as answers):\n");
            for (idx, exemplar) in exemplars.iter().enumerate() {
                text.push_str(&format!(
                    "Example {}:\n  Question: {}\n  Query: {}\n",
                    idx + 1,
                    exemplar.question,
                    exemplar.generated_query
                ));
            }
            text.push('\n');
        }

        if let Some(context) = input.context {
            text.push_str("Conversation context:\n");
            text.push_str(&format!("  Previous question: {}\n", context.previous_question));
            text.push_str(&format!("  Previous query: {}\n", context.previous_query));
            text.push_str("Context rules:\n");
            text.push_str("- Resolve references such as \"it\", \"they\", \"those\" or \"the same\" using the previous turn\n");
            text.push_str("- Keep tables and filters of the previous query unless the new question changes them\n");
            text.push_str("- If the new question is unrelated to the previous turn, ignore the context\n");
            if let Some(directive) = &follow_up {
                text.push_str("- ");
                text.push_str(&directive.render());
                text.push('\n');
            }
            text.push('\n');
        }

        text.push_str(&format!("Question: {}\n\n", input.question.trim()));
        text.push_str(RESPONSE_FORMAT);

        Prompt {
            system: SYSTEM_PROMPT.to_string(),
            instruction: text,
            follow_up,
        }
    }

    /// Keep at most three exemplars at or above the similarity floor, best first
    pub fn select_exemplars(candidates: &[PatternMatch]) -> Vec<PatternMatch> {
        let mut selected: Vec<PatternMatch> = candidates
            .iter()
            .filter(|m| m.similarity >= MIN_EXEMPLAR_SIMILARITY)
            .cloned()
            .collect();
        selected.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        selected.truncate(MAX_EXEMPLARS);
        selected
    }

    /// Decide whether `question` must keep the previous turn's bound and invert its sort
    pub fn follow_up_directive(
        question: &str,
        context: &PriorTurn,
        dialect: crate::models::Dialect,
    ) -> Option<FollowUpDirective> {
        let shape = QueryShape::analyze(&context.previous_query, dialect);
        if !shape.is_bounded_sorted() {
            return None;
        }
        if !is_parallel_follow_up(&context.previous_question, question) {
            return None;
        }

        let previous_direction = shape.direction?;
        Some(FollowUpDirective {
            limit: shape.limit?,
            order_column: shape.order_column,
            previous_direction,
            required_direction: previous_direction.inverted(),
        })
    }

    /// Schema section: tables, columns, relationships and sample rows
    pub fn schema_context(schema: &SchemaDescription) -> String {
        let mut context = String::from("Database Schema:\n");

        if schema.tables.is_empty() {
            context.push_str("  (schema unavailable; use only tables named in the question)\n\n");
            return context;
        }

        for table in &schema.tables {
            context.push_str(&format!("  - {}", table.qualified_name()));
            if let Some(description) = &table.description {
                context.push_str(&format!(" -- {}", description));
            }
            context.push('\n');
            context.push_str("    Columns:\n");
            for column in &table.columns {
                context.push_str(&format!("      * {} ({})", column.name, column.data_type));
                if column.is_primary_key {
                    context.push_str(" [PRIMARY KEY]");
                }
                if column.is_foreign_key {
                    context.push_str(" [FOREIGN KEY]");
                }
                if !column.is_nullable {
                    context.push_str(" [NOT NULL]");
                }
                context.push('\n');
            }
            if !table.sample_rows.is_empty() {
                context.push_str("    Sample rows:\n");
                for row in table.sample_rows.iter().take(MAX_SAMPLE_ROWS) {
                    context.push_str(&format!("      {}\n", row));
                }
            }
        }

        if !schema.relationships.is_empty() {
            context.push_str("  Relationships:\n");
            for rel in &schema.relationships {
                context.push_str(&format!(
                    "    {}.{} -> {}.{}\n",
                    rel.from_table, rel.from_column, rel.to_table, rel.to_column
                ));
            }
        }

        context.push('\n');
        context
    }
}

const RESPONSE_FORMAT: &str = r#"Respond with ONLY a JSON object (no markdown) of this form:
{
  "reasoning": {
    "understanding": "what the question asks",
    "tables": ["tables used"],
    "join_rationale": "why joins were chosen, or null",
    "filter_rationale": "why filters were chosen, or null",
    "sort_rationale": "why the ordering and limit were chosen, or null",
    "confidence": 0-100
  },
  "query": "the SELECT query",
  "summary": "one sentence describing the result",
  "suggestions": ["up to three related follow-up questions"],
  "success": true
}
If the question cannot be answered from the schema, respond with:
{"reasoning": {...}, "error": "why it cannot be answered", "success": false}
"#;

fn words(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_string())
        .collect()
}

/// True when `question` mirrors `previous` with an opposing superlative
pub fn is_parallel_follow_up(previous: &str, question: &str) -> bool {
    let previous_words = words(previous);
    let question_words = words(question);
    let has = |ws: &[String], w: &str| ws.iter().any(|x| x == w);

    let mirrored = SUPERLATIVE_PAIRS.iter().any(|(a, b)| {
        (has(&previous_words, a) && has(&question_words, b))
            || (has(&previous_words, b) && has(&question_words, a))
    });
    if mirrored {
        return true;
    }

    // Short elliptical follow-up ("and the lowest?") naming any superlative
    let lowered = question.trim().to_lowercase();
    let opens_follow_up = FOLLOW_UP_OPENERS
        .iter()
        .any(|opener| lowered.starts_with(&format!("{} ", opener)));
    let names_superlative = SUPERLATIVE_PAIRS
        .iter()
        .any(|(a, b)| has(&question_words, a) || has(&question_words, b));

    opens_follow_up && names_superlative && question_words.len() <= 6
}
