use serde_json::Value;

use super::{EnrichedResult, EnrichmentContext, EnrichmentError, EnrichmentStage};
use crate::models::{NextStep, NextStepCategory};

/// Field appended to annotated rows
pub const NEXT_STEP_FIELD: &str = "next_step";

const LOGIN_KEYWORDS: &[&str] = &[
    "login", "log in", "logon", "sign in", "signin", "password", "locked out", "authenticate", "access",
];

const TICKET_KEYWORDS: &[&str] = &["ticket", "support", "case", "incident", "issue", "complaint"];

/// Keys whose values are treated as free-text issue notes
const TEXT_FIELD_MARKERS: &[&str] = &["resolution", "description", "notes", "comment", "details"];

/// Sub-patterns in priority order; the first hit wins
const SUB_PATTERNS: &[(NextStepCategory, &[&str], &str)] = &[
    (
        NextStepCategory::SessionTimeout,
        &["session timeout", "session expired", "timed out", "timeout"],
        "Ask the user to clear cookies and sign in again; raise the idle session limit if timeouts recur.",
    ),
    (
        NextStepCategory::SuspendedAccount,
        &["suspended", "payment", "billing", "overdue"],
        "Check the account's billing status and lift the suspension once payment is confirmed.",
    ),
    (
        NextStepCategory::ExpiredPassword,
        &["expired password", "password expired", "expired"],
        "Send a password reset link and confirm the new password meets the expiry policy.",
    ),
    (
        NextStepCategory::LockedAccount,
        &["locked"],
        "Verify the user's identity, unlock the account, and review recent failed sign-in attempts.",
    ),
    (
        NextStepCategory::WrongCredentials,
        &["wrong password", "invalid credentials", "incorrect password", "wrong credentials", "invalid password"],
        "Confirm the username in use and offer a password reset.",
    ),
    (
        NextStepCategory::OpenTicket,
        &["open", "pending", "awaiting"],
        "Follow up with the assignee and update the customer on the ticket status.",
    ),
];

const GENERAL_ACTION: &str = "Review the recorded resolution and confirm with the user that the issue is closed.";

fn mentions_any(text: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|k| text.contains(k))
}

/// Whether the question looks like login or support-ticket trouble
pub fn has_issue_intent(question: &str) -> bool {
    let question = question.to_lowercase();
    mentions_any(&question, LOGIN_KEYWORDS) || mentions_any(&question, TICKET_KEYWORDS)
}

/// Lowercased free-text fields of a row, and whether any resolution text is present
fn issue_text(row: &serde_json::Map<String, Value>) -> (Vec<String>, bool) {
    let mut texts = Vec::new();
    let mut has_resolution = false;

    for (key, value) in row {
        let key = key.to_lowercase();
        if !TEXT_FIELD_MARKERS.iter().any(|m| key.contains(m)) {
            continue;
        }
        let Some(text) = value.as_str().map(str::trim).filter(|t| !t.is_empty()) else {
            continue;
        };
        if key.contains("resolution") {
            has_resolution = true;
        }
        texts.push(text.to_lowercase());
    }

    (texts, has_resolution)
}

/// Pick the recommended action for one row's notes
pub fn classify(texts: &[String], has_resolution: bool) -> Option<(NextStepCategory, &'static str)> {
    // Priority is decided by the pattern list, not by which field is scanned first
    for (category, keywords, action) in SUB_PATTERNS {
        if texts.iter().any(|t| mentions_any(t, keywords)) {
            return Some((*category, action));
        }
    }
    has_resolution.then_some((NextStepCategory::General, GENERAL_ACTION))
}

pub struct NextStepStage;

impl EnrichmentStage for NextStepStage {
    fn name(&self) -> &'static str {
        "next_step"
    }

    fn apply(&self, ctx: &EnrichmentContext<'_>, result: &mut EnrichedResult) -> Result<(), EnrichmentError> {
        if !has_issue_intent(ctx.question) {
            return Ok(());
        }

        for (row_index, row) in result.rows.iter_mut().enumerate() {
            let Value::Object(map) = row else {
                continue;
            };
            let (texts, has_resolution) = issue_text(map);
            if let Some((category, action)) = classify(&texts, has_resolution) {
                map.insert(NEXT_STEP_FIELD.to_string(), Value::String(action.to_string()));
                result.next_steps.push(NextStep {
                    row_index,
                    category,
                    action: action.to_string(),
                });
            }
        }

        tracing::debug!("Annotated {} rows with next steps", result.next_steps.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ExecutionResult;
    use crate::services::enrichment::EnrichmentPipeline;
    use serde_json::json;

    fn enrich(question: &str, rows: Vec<Value>) -> EnrichedResult {
        let execution = ExecutionResult::new(rows, 1);
        let ctx = EnrichmentContext {
            question,
            execution: &execution,
            reasoning: None,
            can_unmask: false,
        };
        EnrichmentPipeline::with_stages(vec![Box::new(NextStepStage)]).run(&ctx, Vec::new())
    }

    fn locked_action() -> &'static str {
        SUB_PATTERNS
            .iter()
            .find(|(c, _, _)| *c == NextStepCategory::LockedAccount)
            .map(|(_, _, a)| *a)
            .unwrap()
    }

    #[test]
    fn test_locked_template_independent_of_field_order() {
        let rows = vec![
            json!({"resolution": "Account locked after retries", "user": "ada", "description": "cannot sign in"}),
            json!({"description": "cannot sign in", "user": "bob", "resolution": "Account LOCKED by admin"}),
            json!({"a_notes": "user reported", "z_resolution": "locked"}),
        ];
        let result = enrich("Why can't users log in?", rows);

        assert_eq!(result.next_steps.len(), 3);
        for (i, step) in result.next_steps.iter().enumerate() {
            assert_eq!(step.row_index, i);
            assert_eq!(step.category, NextStepCategory::LockedAccount);
            assert_eq!(result.rows[i][NEXT_STEP_FIELD], json!(locked_action()));
        }
    }

    #[test]
    fn test_priority_order_first_match_wins() {
        let result = enrich(
            "login problems this week",
            vec![json!({"resolution": "locked after session timeout"})],
        );
        assert_eq!(result.next_steps[0].category, NextStepCategory::SessionTimeout);
    }

    #[test]
    fn test_ticket_intent_and_catch_all() {
        let result = enrich(
            "show support tickets",
            vec![
                json!({"id": 1, "notes": "still pending on vendor"}),
                json!({"id": 2, "resolution": "reinstalled the client"}),
                json!({"id": 3, "title": "printer"}),
            ],
        );
        assert_eq!(result.next_steps.len(), 2);
        assert_eq!(result.next_steps[0].category, NextStepCategory::OpenTicket);
        assert_eq!(result.next_steps[1].category, NextStepCategory::General);
        assert_eq!(result.rows[1][NEXT_STEP_FIELD], json!(GENERAL_ACTION));
        assert!(result.rows[2].get(NEXT_STEP_FIELD).is_none());
    }

    #[test]
    fn test_unrelated_question_is_untouched() {
        let rows = vec![json!({"resolution": "locked"})];
        let result = enrich("total revenue by region", rows.clone());
        assert!(result.next_steps.is_empty());
        assert_eq!(result.rows, rows);
    }
}
