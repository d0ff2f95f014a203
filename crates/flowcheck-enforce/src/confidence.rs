//! Advisory confidence scores for findings.
//!
//! Scores rank findings; they never decide whether a finding is emitted.

use flowcheck_core::config::ScoringConfig;
use flowcheck_parsers::naming::textual_overlap;

pub const BASE_CONFIDENCE: f64 = 0.85;
pub const DOMAIN_NAME_BONUS: f64 = 0.10;
pub const EVENT_OVERLAP_BONUS: f64 = 0.05;
pub const PROPERTY_FLOOR: f64 = 0.7;
pub const CONFIDENCE_FLOOR: f64 = 0.6;
pub const ORPHAN_CONFIDENCE: f64 = 0.65;
pub const INFRASTRUCTURE_CONFIDENCE: f64 = 0.6;

#[derive(Debug, Clone)]
pub struct ConfidenceScorer {
    generic_tokens: Vec<String>,
}

impl ConfidenceScorer {
    pub fn new(scoring: &ScoringConfig) -> Self {
        Self {
            generic_tokens: scoring
                .generic_tokens
                .iter()
                .map(|t| t.to_ascii_lowercase())
                .collect(),
        }
    }

    /// Longer than three characters and not a generic token like `data`.
    pub fn is_domain_specific(&self, name: &str) -> bool {
        name.chars().count() > 3 && !self.generic_tokens.contains(&name.to_ascii_lowercase())
    }

    /// Score a missing or mismatched property.
    ///
    /// `property` is the leaf name; `producer_event` and `consumer_event` are
    /// the raw texts each side derived its event id from.
    pub fn property_finding(&self, property: &str, producer_event: &str, consumer_event: &str) -> f64 {
        let mut score = BASE_CONFIDENCE;
        if self.is_domain_specific(property) {
            score += DOMAIN_NAME_BONUS;
        }
        if textual_overlap(producer_event, consumer_event) {
            score += EVENT_OVERLAP_BONUS;
        }
        score.clamp(PROPERTY_FLOOR, 1.0)
    }
}

/// Apply the global floor to any score.
pub fn floored(score: f64) -> f64 {
    score.clamp(CONFIDENCE_FLOOR, 1.0)
}
