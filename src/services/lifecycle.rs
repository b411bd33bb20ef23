// Request lifecycle
//
// RECEIVED -> RATE_CHECKED -> (CACHE_HIT | TRANSLATING) -> TRANSLATED ->
// EXECUTING -> EXECUTED -> ENRICHED -> AUDITED -> STREAMED, or FAILED from
// any non-terminal state.

use thiserror::Error;

use crate::models::{PipelineError, RequestState};

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("Illegal request transition {from:?} -> {to:?}")]
pub struct LifecycleError {
    pub from: RequestState,
    pub to: RequestState,
}

impl From<LifecycleError> for PipelineError {
    fn from(err: LifecycleError) -> Self {
        PipelineError::internal(err.to_string())
    }
}

pub fn is_allowed(from: RequestState, to: RequestState) -> bool {
    use RequestState::*;

    if to == Failed {
        return !from.is_terminal();
    }
    matches!(
        (from, to),
        (Received, RateChecked)
            | (RateChecked, CacheHit)
            | (RateChecked, Translating)
            | (CacheHit, Translated)
            | (Translating, Translated)
            | (Translated, Executing)
            | (Executing, Executed)
            | (Executed, Enriched)
            | (Enriched, Audited)
            | (Audited, Streamed)
    )
}

/// Short message carried by the status frame for a state
pub fn status_message(state: RequestState) -> &'static str {
    match state {
        RequestState::Received => "Request received",
        RequestState::RateChecked => "Request accepted",
        RequestState::CacheHit => "Using cached query",
        RequestState::Translating => "Generating query",
        RequestState::Translated => "Query generated",
        RequestState::Executing => "Running query",
        RequestState::Executed => "Query finished",
        RequestState::Enriched => "Preparing results",
        RequestState::Audited => "Results recorded",
        RequestState::Streamed => "Done",
        RequestState::Failed => "Request failed",
    }
}

#[derive(Debug, Clone)]
pub struct RequestLifecycle {
    state: RequestState,
    history: Vec<RequestState>,
}

impl Default for RequestLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestLifecycle {
    pub fn new() -> Self {
        Self {
            state: RequestState::Received,
            history: vec![RequestState::Received],
        }
    }

    pub fn state(&self) -> RequestState {
        self.state
    }

    pub fn history(&self) -> &[RequestState] {
        &self.history
    }

    pub fn transition(&mut self, to: RequestState) -> Result<(), LifecycleError> {
        if !is_allowed(self.state, to) {
            return Err(LifecycleError { from: self.state, to });
        }
        self.state = to;
        self.history.push(to);
        Ok(())
    }

    /// Move to FAILED; a no-op once terminal
    pub fn fail(&mut self) {
        if !self.state.is_terminal() {
            self.state = RequestState::Failed;
            self.history.push(RequestState::Failed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use RequestState::*;

    #[test]
    fn test_full_translation_path() {
        let mut lifecycle = RequestLifecycle::new();
        for state in [RateChecked, Translating, Translated, Executing, Executed, Enriched, Audited, Streamed] {
            lifecycle.transition(state).unwrap();
        }
        assert_eq!(lifecycle.state(), Streamed);
        assert_eq!(lifecycle.history().len(), 9);
    }

    #[test]
    fn test_cache_hit_path() {
        let mut lifecycle = RequestLifecycle::new();
        lifecycle.transition(RateChecked).unwrap();
        lifecycle.transition(CacheHit).unwrap();
        lifecycle.transition(Translated).unwrap();
        assert!(lifecycle.transition(Translating).is_err());
    }

    #[test]
    fn test_illegal_transition_rejected() {
        let mut lifecycle = RequestLifecycle::new();
        let err = lifecycle.transition(Executing).unwrap_err();
        assert_eq!(err, LifecycleError { from: Received, to: Executing });
        assert_eq!(lifecycle.state(), Received);
    }

    #[test]
    fn test_failed_reachable_until_terminal() {
        let mut lifecycle = RequestLifecycle::new();
        lifecycle.transition(RateChecked).unwrap();
        lifecycle.fail();
        assert_eq!(lifecycle.state(), Failed);

        lifecycle.fail();
        assert_eq!(lifecycle.history(), &[Received, RateChecked, Failed]);
        assert!(lifecycle.transition(Streamed).is_err());
    }
}
