use super::{EnrichedResult, EnrichmentContext, EnrichmentError, EnrichmentStage};

/// Estimate used when the translation carried no confidence and rows came back
pub const EXECUTION_CONFIDENCE_WITH_ROWS: f64 = 0.8;
/// Estimate used when the translation carried no confidence and nothing matched
pub const EXECUTION_CONFIDENCE_EMPTY: f64 = 0.5;

/// Prefers the translation's own confidence, else estimates from execution
pub struct ConfidenceStage;

impl EnrichmentStage for ConfidenceStage {
    fn name(&self) -> &'static str {
        "confidence"
    }

    fn apply(&self, ctx: &EnrichmentContext<'_>, result: &mut EnrichedResult) -> Result<(), EnrichmentError> {
        let confidence = match ctx.reasoning.and_then(|r| r.confidence) {
            Some(c) if c.is_finite() => c,
            Some(c) => return Err(EnrichmentError::new(self.name(), format!("non-finite confidence {}", c))),
            None if ctx.execution.row_count > 0 => EXECUTION_CONFIDENCE_WITH_ROWS,
            None => EXECUTION_CONFIDENCE_EMPTY,
        };
        result.confidence = confidence.clamp(0.0, 1.0);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ExecutionResult, Reasoning};
    use serde_json::json;

    fn reasoning(confidence: Option<f64>) -> Reasoning {
        Reasoning {
            understanding: "x".to_string(),
            tables: Vec::new(),
            join_rationale: None,
            filter_rationale: None,
            sort_rationale: None,
            confidence,
        }
    }

    fn run(execution: &ExecutionResult, reasoning: Option<&Reasoning>) -> f64 {
        let ctx = EnrichmentContext {
            question: "q",
            execution,
            reasoning,
            can_unmask: false,
        };
        let mut result = crate::services::enrichment::EnrichmentPipeline::with_stages(Vec::new())
            .run(&ctx, Vec::new());
        ConfidenceStage.apply(&ctx, &mut result).unwrap();
        result.confidence
    }

    #[test]
    fn test_reasoning_confidence_preferred() {
        let execution = ExecutionResult::new(vec![json!({"a": 1})], 1);
        assert_eq!(run(&execution, Some(&reasoning(Some(0.42)))), 0.42);
    }

    #[test]
    fn test_execution_estimate() {
        let with_rows = ExecutionResult::new(vec![json!({"a": 1})], 1);
        let empty = ExecutionResult::new(Vec::new(), 1);
        assert_eq!(run(&with_rows, Some(&reasoning(None))), EXECUTION_CONFIDENCE_WITH_ROWS);
        assert_eq!(run(&empty, None), EXECUTION_CONFIDENCE_EMPTY);
    }
}
