// PII masking
//
// String scalars are scanned at any depth. Detection always runs; masking is
// skipped only for callers holding the unmask permission.

use std::collections::BTreeSet;
use once_cell::sync::Lazy;

use regex::{Captures, Regex};
use serde_json::Value;

use super::{EnrichedResult, EnrichmentContext, EnrichmentError, EnrichmentStage};
use crate::models::PiiCategory;

static EMAIL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b([a-z0-9._%+-])[a-z0-9._%+-]*@([a-z0-9.-]+\.[a-z]{2,})\b").unwrap());

static SSN_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").unwrap());

static CARD_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(?:\d[ -]?){12,18}\d\b").unwrap());

static PHONE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:\+\d{1,3}[\s.-]?)?(?:\(\d{3}\)|\b\d{3})[\s.-]?\d{3}[\s.-]?\d{4}\b").unwrap()
});

/// Luhn checksum over the digits of a candidate card number
fn luhn_valid(candidate: &str) -> bool {
    let digits: Vec<u32> = candidate.chars().filter_map(|c| c.to_digit(10)).collect();
    if !(13..=19).contains(&digits.len()) {
        return false;
    }
    let sum: u32 = digits
        .iter()
        .rev()
        .enumerate()
        .map(|(i, &d)| {
            if i % 2 == 1 {
                let doubled = d * 2;
                if doubled > 9 {
                    doubled - 9
                } else {
                    doubled
                }
            } else {
                d
            }
        })
        .sum();
    sum % 10 == 0
}

/// Replace every digit except the last four
fn mask_digits(text: &str) -> String {
    let total = text.chars().filter(|c| c.is_ascii_digit()).count();
    let mut seen = 0;
    text.chars()
        .map(|c| {
            if c.is_ascii_digit() {
                seen += 1;
                if seen + 4 <= total {
                    return '*';
                }
            }
            c
        })
        .collect()
}

/// Mask one string; returns the masked text and the categories found
pub fn mask_text(text: &str) -> (String, BTreeSet<PiiCategory>) {
    let mut found = BTreeSet::new();

    let masked = EMAIL_PATTERN.replace_all(text, |caps: &Captures<'_>| {
        found.insert(PiiCategory::Email);
        format!("{}***@{}", &caps[1], &caps[2])
    });

    let masked = SSN_PATTERN.replace_all(&masked, |caps: &Captures<'_>| {
        found.insert(PiiCategory::Ssn);
        mask_digits(&caps[0])
    });

    let masked = CARD_PATTERN.replace_all(&masked, |caps: &Captures<'_>| {
        if luhn_valid(&caps[0]) {
            found.insert(PiiCategory::CreditCard);
            mask_digits(&caps[0])
        } else {
            caps[0].to_string()
        }
    });

    let masked = PHONE_PATTERN.replace_all(&masked, |caps: &Captures<'_>| {
        found.insert(PiiCategory::Phone);
        mask_digits(&caps[0])
    });

    (masked.into_owned(), found)
}

/// Walk a value, masking strings in place when `apply_mask` is set
fn scan(value: &mut Value, apply_mask: bool, found: &mut BTreeSet<PiiCategory>) {
    match value {
        Value::String(text) => {
            let (masked, categories) = mask_text(text);
            if !categories.is_empty() {
                found.extend(categories);
                if apply_mask {
                    *text = masked;
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(|item| scan(item, apply_mask, found)),
        Value::Object(map) => map.values_mut().for_each(|item| scan(item, apply_mask, found)),
        _ => {}
    }
}

pub struct PiiMaskingStage;

impl EnrichmentStage for PiiMaskingStage {
    fn name(&self) -> &'static str {
        "pii_masking"
    }

    fn apply(&self, ctx: &EnrichmentContext<'_>, result: &mut EnrichedResult) -> Result<(), EnrichmentError> {
        let apply_mask = !ctx.can_unmask;
        let mut found = BTreeSet::new();
        for row in result.rows.iter_mut() {
            scan(row, apply_mask, &mut found);
        }

        if !found.is_empty() {
            tracing::debug!("Detected PII categories {:?} (masked: {})", found, apply_mask);
        }
        result.masked = apply_mask && !found.is_empty();
        result.pii_categories = found;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ExecutionResult;
    use crate::services::enrichment::EnrichmentPipeline;
    use serde_json::json;

    fn enrich(rows: Vec<Value>, can_unmask: bool) -> EnrichedResult {
        let execution = ExecutionResult::new(rows, 1);
        let ctx = EnrichmentContext {
            question: "list contacts",
            execution: &execution,
            reasoning: None,
            can_unmask,
        };
        EnrichmentPipeline::with_stages(vec![Box::new(PiiMaskingStage)]).run(&ctx, Vec::new())
    }

    #[test]
    fn test_email_is_masked_and_reported() {
        let result = enrich(vec![json!({"email": "user@example.com"})], false);
        assert_ne!(result.rows[0]["email"], json!("user@example.com"));
        assert_eq!(result.rows[0]["email"], json!("u***@example.com"));
        assert!(result.pii_categories.contains(&PiiCategory::Email));
        assert!(result.masked);
    }

    #[test]
    fn test_unmask_permission_keeps_values_but_reports() {
        let result = enrich(vec![json!({"email": "user@example.com"})], true);
        assert_eq!(result.rows[0]["email"], json!("user@example.com"));
        assert!(result.pii_categories.contains(&PiiCategory::Email));
        assert!(!result.masked);
    }

    #[test]
    fn test_each_category() {
        let (masked, found) = mask_text("SSN 123-45-6789");
        assert_eq!(masked, "SSN ***-**-6789");
        assert!(found.contains(&PiiCategory::Ssn));

        let (masked, found) = mask_text("card 4111 1111 1111 1111");
        assert_eq!(masked, "card **** **** **** 1111");
        assert_eq!(found.into_iter().collect::<Vec<_>>(), vec![PiiCategory::CreditCard]);

        let (masked, found) = mask_text("call (555) 123-4567");
        assert_eq!(masked, "call (***) ***-4567");
        assert!(found.contains(&PiiCategory::Phone));
    }

    #[test]
    fn test_non_luhn_digits_are_not_cards() {
        let (masked, found) = mask_text("order 1234567890123");
        assert_eq!(masked, "order 1234567890123");
        assert!(!found.contains(&PiiCategory::CreditCard));
    }

    #[test]
    fn test_nested_values_and_clean_rows() {
        let result = enrich(
            vec![
                json!({"contacts": [{"primary": "ops@corp.io"}]}),
                json!({"name": "Ada", "count": 3}),
            ],
            false,
        );
        assert_eq!(result.rows[0]["contacts"][0]["primary"], json!("o***@corp.io"));
        assert_eq!(result.rows[1], json!({"name": "Ada", "count": 3}));
    }

    #[test]
    fn test_no_pii_means_not_masked() {
        let result = enrich(vec![json!({"name": "Ada"})], false);
        assert!(result.pii_categories.is_empty());
        assert!(!result.masked);
    }
}
