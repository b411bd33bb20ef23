// Result Enrichment Pipeline
//
// Stages run in a fixed order over the executed rows. A stage that fails is
// rolled back to the snapshot taken before it ran, so the pipeline as a whole
// never fails: the worst case is a pass-through.

pub mod confidence;
pub mod next_step;
pub mod numeric;
pub mod pii;

pub use confidence::ConfidenceStage;
pub use next_step::NextStepStage;
pub use numeric::NumericSafetyStage;
pub use pii::PiiMaskingStage;

use std::collections::BTreeSet;

use thiserror::Error;

use crate::models::{EnrichedResult, ExecutionResult, Reasoning};

#[derive(Debug, Clone, Error, PartialEq)]
#[error("{stage} stage failed: {message}")]
pub struct EnrichmentError {
    pub stage: &'static str,
    pub message: String,
}

impl EnrichmentError {
    pub fn new(stage: &'static str, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
        }
    }
}

/// Request facts the stages may consult
#[derive(Debug, Clone, Copy)]
pub struct EnrichmentContext<'a> {
    pub question: &'a str,
    pub execution: &'a ExecutionResult,
    pub reasoning: Option<&'a Reasoning>,
    pub can_unmask: bool,
}

pub trait EnrichmentStage: Send + Sync {
    fn name(&self) -> &'static str;

    fn apply(&self, ctx: &EnrichmentContext<'_>, result: &mut EnrichedResult) -> Result<(), EnrichmentError>;
}

pub struct EnrichmentPipeline {
    stages: Vec<Box<dyn EnrichmentStage>>,
}

impl Default for EnrichmentPipeline {
    fn default() -> Self {
        Self::standard()
    }
}

impl EnrichmentPipeline {
    /// Numeric safety, PII masking, next-step annotation, confidence
    pub fn standard() -> Self {
        Self::with_stages(vec![
            Box::new(NumericSafetyStage),
            Box::new(PiiMaskingStage),
            Box::new(NextStepStage),
            Box::new(ConfidenceStage),
        ])
    }

    pub fn with_stages(stages: Vec<Box<dyn EnrichmentStage>>) -> Self {
        Self { stages }
    }

    pub fn run(&self, ctx: &EnrichmentContext<'_>, suggestions: Vec<String>) -> EnrichedResult {
        let mut result = EnrichedResult {
            rows: ctx.execution.rows.clone(),
            row_count: ctx.execution.row_count,
            pii_categories: BTreeSet::new(),
            masked: false,
            next_steps: Vec::new(),
            confidence: 0.0,
            reasoning: ctx.reasoning.cloned(),
            suggestions,
        };

        for stage in &self.stages {
            let snapshot = result.clone();
            if let Err(e) = stage.apply(ctx, &mut result) {
                tracing::warn!("Enrichment degraded to pass-through: {}", e);
                result = snapshot;
            }
        }

        result
    }
}
