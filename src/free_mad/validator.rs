//! The validator capability the Orchestrator consults before selection.
//!
//! Individual validators (syntax checkers, sandboxed execution, security
//! scanners, coverage tools) are out of scope for this crate — they are
//! process- or language-specific external collaborators. What the core
//! needs is the aggregation contract: given every answer discovered during
//! a run, produce per-validator results and a single confidence score per
//! answer for the Answer Selector's second tie-break step.

use crate::free_mad::types::ValidationResult;
use std::collections::HashMap;

pub trait ValidationManager: Send + Sync {
    /// `answer_text` maps every answer id discovered this run to its
    /// canonical text. Returns `(results, confidence_by_answer)` where
    /// `results[answer_id]` maps validator name to its outcome and
    /// `confidence_by_answer[answer_id]` is the aggregate the Selector
    /// reads.
    fn validate_many(
        &self,
        answer_text: &HashMap<String, String>,
    ) -> (
        HashMap<String, HashMap<String, ValidationResult>>,
        HashMap<String, f64>,
    );
}

/// The default: every answer passes with confidence 1.0 and no validators
/// ran. Suitable when no validator suite is wired in — the Selector then
/// falls straight through to the lexicographic/random tie-break steps,
/// since every surviving answer has identical confidence.
pub struct NullValidationManager;

impl ValidationManager for NullValidationManager {
    fn validate_many(
        &self,
        answer_text: &HashMap<String, String>,
    ) -> (
        HashMap<String, HashMap<String, ValidationResult>>,
        HashMap<String, f64>,
    ) {
        let results = answer_text
            .keys()
            .map(|ans| (ans.clone(), HashMap::new()))
            .collect();
        let confidence = answer_text.keys().map(|ans| (ans.clone(), 1.0)).collect();
        (results, confidence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_validation_manager_gives_every_answer_full_confidence() {
        let mgr = NullValidationManager;
        let mut text = HashMap::new();
        text.insert("a1".to_string(), "solution".to_string());
        let (results, confidence) = mgr.validate_many(&text);
        assert!(results.contains_key("a1"));
        assert_eq!(confidence["a1"], 1.0);
    }
}
