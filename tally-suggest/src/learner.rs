//! Feedback learner: the only write path into the pattern store.
//!
//! Two independent update rules share the same pattern rows:
//! - learning from a confirmed categorization (create / reinforce / redirect)
//! - penalizing a rejected suggestion
//!
//! Both rules are pure functions handed to the store, which applies them
//! atomically per row.

use std::cell::Cell;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tally_core::{
    normalize, CategoryPattern, NewSuggestionLog, PatternState, Result, SuggestionLog,
    SuggestionStore,
};
use tracing::{debug, info};

use crate::Clock;

/// Confidence of a brand-new pattern
pub const INITIAL_CONFIDENCE: f64 = 0.7;
/// Confidence after a pattern is redirected to another category
pub const REDIRECT_CONFIDENCE: f64 = 0.5;
/// Raise per agreeing categorization
pub const REINFORCE_STEP: f64 = 0.1;
/// Drop per rejected suggestion
pub const REJECT_PENALTY: f64 = 0.2;
pub const MIN_CONFIDENCE: f64 = 0.1;
pub const MAX_CONFIDENCE: f64 = 1.0;

/// Keeps repeated +0.1 / -0.2 steps from drifting off their decimal values.
fn clean(score: f64) -> f64 {
    (score * 1_000_000.0).round() / 1_000_000.0
}

fn clamp_confidence(score: f64) -> f64 {
    clean(score).clamp(MIN_CONFIDENCE, MAX_CONFIDENCE)
}

/// What a learning call did to the pattern row
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum LearnOutcome {
    /// Notes normalized to nothing; store untouched
    Skipped,
    Created { confidence: f64 },
    Reinforced { confidence: f64, usage_count: u32 },
    Redirected { from_category_id: i64, usage_count: u32 },
}

/// Decide the next state of a (user, text) pattern after the user confirmed `category_id`.
///
/// Agreement raises confidence gradually; disagreement redirects at once
/// with reduced trust, so wrong associations do not compound.
pub fn plan_learning(
    existing: Option<&CategoryPattern>,
    category_id: i64,
    now: DateTime<Utc>,
) -> (PatternState, LearnOutcome) {
    let Some(pattern) = existing else {
        let state = PatternState {
            category_id,
            confidence_score: INITIAL_CONFIDENCE,
            usage_count: 1,
            last_used: now,
        };
        return (state, LearnOutcome::Created { confidence: INITIAL_CONFIDENCE });
    };

    let usage_count = pattern.usage_count.saturating_add(1);

    if pattern.category_id == category_id {
        let confidence = clamp_confidence(pattern.confidence_score + REINFORCE_STEP);
        let state = PatternState {
            category_id,
            confidence_score: confidence,
            usage_count,
            last_used: now,
        };
        (state, LearnOutcome::Reinforced { confidence, usage_count })
    } else {
        let state = PatternState {
            category_id,
            confidence_score: REDIRECT_CONFIDENCE,
            usage_count,
            last_used: now,
        };
        let outcome = LearnOutcome::Redirected {
            from_category_id: pattern.category_id,
            usage_count,
        };
        (state, outcome)
    }
}

/// Confidence of a pattern after one rejected suggestion, floored at the minimum.
pub fn penalize(confidence: f64) -> f64 {
    clamp_confidence(confidence - REJECT_PENALTY)
}

/// A user's categorization decision about a suggestion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestionFeedback {
    pub user_id: i64,
    pub suggested_category_id: i64,
    pub actual_category_id: i64,
    /// Raw notes the suggestion was made for; normalized before storage
    pub pattern_text: String,
    pub transaction_id: Option<i64>,
}

impl SuggestionFeedback {
    pub fn was_accepted(&self) -> bool {
        self.suggested_category_id == self.actual_category_id
    }
}

pub struct FeedbackLearner<'a> {
    store: &'a dyn SuggestionStore,
    clock: Clock,
}

impl<'a> FeedbackLearner<'a> {
    pub fn new(store: &'a dyn SuggestionStore) -> Self {
        Self { store, clock: Utc::now }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Learn that `notes` belong to `category_id` for this user.
    pub fn learn_from_transaction(
        &self,
        user_id: i64,
        category_id: i64,
        notes: &str,
        transaction_id: Option<i64>,
    ) -> Result<LearnOutcome> {
        let pattern_text = normalize(notes);
        if pattern_text.is_empty() {
            debug!(user_id, ?transaction_id, "no pattern text; skipping learn");
            return Ok(LearnOutcome::Skipped);
        }

        let now = (self.clock)();
        let outcome = Cell::new(LearnOutcome::Skipped);
        let rule = |existing: Option<&CategoryPattern>| {
            let (state, planned) = plan_learning(existing, category_id, now);
            outcome.set(planned);
            Some(state)
        };
        self.store.update_pattern(user_id, &pattern_text, &rule)?;

        let outcome = outcome.get();
        match outcome {
            LearnOutcome::Created { .. } => {
                info!(user_id, category_id, pattern = %pattern_text, "learned new pattern")
            }
            LearnOutcome::Redirected { from_category_id, .. } => info!(
                user_id,
                from_category_id,
                category_id,
                pattern = %pattern_text,
                "redirected pattern"
            ),
            _ => debug!(user_id, category_id, pattern = %pattern_text, ?outcome, "reinforced pattern"),
        }
        Ok(outcome)
    }

    /// Append a feedback log entry; a rejection also lowers the suggested pattern's confidence.
    pub fn log_suggestion_feedback(&self, feedback: &SuggestionFeedback) -> Result<SuggestionLog> {
        let entry = NewSuggestionLog {
            user_id: feedback.user_id,
            transaction_id: feedback.transaction_id,
            suggested_category_id: feedback.suggested_category_id,
            actual_category_id: feedback.actual_category_id,
            pattern_text: normalize(&feedback.pattern_text),
            was_accepted: feedback.was_accepted(),
            created_at: (self.clock)(),
        };

        if !entry.was_accepted {
            info!(
                user_id = entry.user_id,
                suggested = entry.suggested_category_id,
                actual = entry.actual_category_id,
                "suggestion rejected"
            );
        }

        self.store.record_feedback(entry, &penalize)
    }

    /// Log the feedback, then learn the actual category for the same text.
    pub fn apply_feedback(&self, feedback: &SuggestionFeedback) -> Result<(SuggestionLog, LearnOutcome)> {
        let log = self.log_suggestion_feedback(feedback)?;
        let outcome = self.learn_from_transaction(
            feedback.user_id,
            feedback.actual_category_id,
            &feedback.pattern_text,
            feedback.transaction_id,
        )?;
        Ok((log, outcome))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
    }

    fn pattern(category_id: i64, confidence: f64, usage: u32) -> CategoryPattern {
        CategoryPattern {
            id: 1,
            user_id: 1,
            category_id,
            pattern_text: "coffee at starbucks".to_string(),
            confidence_score: confidence,
            usage_count: usage,
            last_used: at(),
            created_at: at(),
        }
    }

    #[test]
    fn test_new_pattern_starts_at_initial_confidence() {
        let (state, outcome) = plan_learning(None, 10, at());
        assert_eq!(state.confidence_score, 0.7);
        assert_eq!(state.usage_count, 1);
        assert_eq!(state.category_id, 10);
        assert_eq!(outcome, LearnOutcome::Created { confidence: 0.7 });
    }

    #[test]
    fn test_reinforce_raises_confidence_and_usage() {
        let existing = pattern(10, 0.7, 1);
        let (state, outcome) = plan_learning(Some(&existing), 10, at());
        assert_eq!(state.confidence_score, 0.8);
        assert_eq!(state.usage_count, 2);
        assert_eq!(outcome, LearnOutcome::Reinforced { confidence: 0.8, usage_count: 2 });
    }

    #[test]
    fn test_reinforce_caps_at_one() {
        let existing = pattern(10, 0.95, 7);
        let (state, _) = plan_learning(Some(&existing), 10, at());
        assert_eq!(state.confidence_score, 1.0);
    }

    #[test]
    fn test_redirect_resets_to_half_regardless_of_prior() {
        for prior in [0.1, 0.5, 0.9, 1.0] {
            let existing = pattern(10, prior, 4);
            let (state, outcome) = plan_learning(Some(&existing), 11, at());
            assert_eq!(state.category_id, 11);
            assert_eq!(state.confidence_score, 0.5);
            assert_eq!(state.usage_count, 5);
            assert_eq!(
                outcome,
                LearnOutcome::Redirected { from_category_id: 10, usage_count: 5 }
            );
        }
    }

    #[test]
    fn test_penalize_drops_by_point_two_with_floor() {
        assert_eq!(penalize(0.7), 0.5);
        assert_eq!(penalize(0.3), 0.1);
        assert_eq!(penalize(0.2), 0.1);
        assert_eq!(penalize(0.1), 0.1);
    }

    #[test]
    fn test_feedback_acceptance() {
        let mut fb = SuggestionFeedback {
            user_id: 1,
            suggested_category_id: 5,
            actual_category_id: 7,
            pattern_text: "Coffee".to_string(),
            transaction_id: None,
        };
        assert!(!fb.was_accepted());
        fb.actual_category_id = 5;
        assert!(fb.was_accepted());
    }

    #[test]
    fn test_outcome_serializes_with_tag() {
        let json = serde_json::to_value(LearnOutcome::Redirected {
            from_category_id: 3,
            usage_count: 4,
        })
        .unwrap();
        assert_eq!(json["outcome"], "redirected");
        assert_eq!(json["from_category_id"], 3);
        assert_eq!(
            serde_json::to_value(LearnOutcome::Skipped).unwrap(),
            serde_json::json!({ "outcome": "skipped" })
        );
    }
}
