use serde_json::Value;

use super::{EnrichedResult, EnrichmentContext, EnrichmentError, EnrichmentStage};
use crate::services::database::MAX_SAFE_INTEGER;

/// Serializes integers beyond double precision as strings, at any depth
pub struct NumericSafetyStage;

fn normalize(value: &mut Value) -> usize {
    match value {
        Value::Number(n) => {
            let unsafe_int = match (n.as_i64(), n.as_u64()) {
                (Some(i), _) => i.unsigned_abs() > MAX_SAFE_INTEGER as u64,
                (None, Some(u)) => u > MAX_SAFE_INTEGER as u64,
                _ => false,
            };
            if unsafe_int {
                *value = Value::String(n.to_string());
                1
            } else {
                0
            }
        }
        Value::Array(items) => items.iter_mut().map(normalize).sum(),
        Value::Object(map) => map.values_mut().map(normalize).sum(),
        _ => 0,
    }
}

impl EnrichmentStage for NumericSafetyStage {
    fn name(&self) -> &'static str {
        "numeric_safety"
    }

    fn apply(&self, ctx: &EnrichmentContext<'_>, result: &mut EnrichedResult) -> Result<(), EnrichmentError> {
        let converted: usize = result.rows.iter_mut().map(normalize).sum();
        if converted > 0 {
            tracing::debug!(
                "Converted {} unsafe numeric values to strings (flagged fields: {:?})",
                converted,
                ctx.execution.unsafe_numeric_fields
            );
        }
        Ok(())
    }
}
