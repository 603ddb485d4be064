//! Facade bundling a store with the engine, learner and stats.

use chrono::Utc;
use tally_core::{CategoryPattern, Result, Suggestion, SuggestionLog, SuggestionStats, SuggestionStore};

use crate::engine::{SuggestionEngine, SuggestionRequest};
use crate::learner::{FeedbackLearner, LearnOutcome, SuggestionFeedback};
use crate::stats::suggestion_stats;
use crate::Clock;

pub struct SuggestionService<S> {
    store: S,
    clock: Clock,
}

impl<S: SuggestionStore> SuggestionService<S> {
    pub fn new(store: S) -> Self {
        Self { store, clock: Utc::now }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn learner(&self) -> FeedbackLearner<'_> {
        FeedbackLearner::new(&self.store).with_clock(self.clock)
    }

    pub fn get_suggestions(&self, request: &SuggestionRequest) -> Result<Vec<Suggestion>> {
        SuggestionEngine::new(&self.store).suggest(request)
    }

    pub fn learn_from_transaction(
        &self,
        user_id: i64,
        category_id: i64,
        notes: &str,
        transaction_id: Option<i64>,
    ) -> Result<LearnOutcome> {
        self.learner()
            .learn_from_transaction(user_id, category_id, notes, transaction_id)
    }

    pub fn log_suggestion_feedback(&self, feedback: &SuggestionFeedback) -> Result<SuggestionLog> {
        self.learner().log_suggestion_feedback(feedback)
    }

    /// What a categorization decision should trigger: log, then learn the actual category.
    pub fn apply_feedback(&self, feedback: &SuggestionFeedback) -> Result<(SuggestionLog, LearnOutcome)> {
        self.learner().apply_feedback(feedback)
    }

    pub fn get_suggestion_stats(&self, user_id: i64, days: u32) -> Result<SuggestionStats> {
        suggestion_stats(&self.store, user_id, days, (self.clock)())
    }

    pub fn recent_patterns(&self, user_id: i64, limit: usize) -> Result<Vec<CategoryPattern>> {
        self.store.recent_patterns(user_id, limit)
    }
}
