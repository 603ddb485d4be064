//! Repository interface between the suggestion logic and persistence.
//!
//! Categories and transactions are owned elsewhere and only read through
//! this trait. Patterns and logs are written only through the two atomic
//! write methods, so a store can guarantee that concurrent learners never
//! lose an increment.

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::types::{
    BudgetScope, CategoryCount, CategoryPattern, NewSuggestionLog, NewTransaction, PatternHit,
    PatternState, SuggestionLog, TransactionRecord,
};

/// Pure update applied to the current pattern row (if any) for a (user, text) key.
/// Returning `None` leaves the store untouched.
pub type PatternRule<'a> = &'a dyn Fn(Option<&CategoryPattern>) -> Option<PatternState>;

/// Confidence adjustment applied to a rejected pattern.
pub type ConfidencePenalty<'a> = &'a dyn Fn(f64) -> f64;

pub trait SuggestionStore: Send + Sync {
    /// Patterns whose text equals `pattern_text`, joined with their active category in the scope's budget.
    fn exact_patterns(&self, scope: BudgetScope, pattern_text: &str) -> Result<Vec<PatternHit>>;

    /// Patterns whose text contains `keyword` as a literal substring.
    fn patterns_containing(&self, scope: BudgetScope, keyword: &str) -> Result<Vec<PatternHit>>;

    /// Non-split transactions of the user with `min_cents <= amount <= max_cents`, counted per active category.
    fn similar_amount_counts(
        &self,
        scope: BudgetScope,
        min_cents: i64,
        max_cents: i64,
    ) -> Result<Vec<CategoryCount>>;

    /// Every active category of the budget with the user's transaction count, zero included.
    fn category_usage(&self, scope: BudgetScope) -> Result<Vec<CategoryCount>>;

    /// Feedback logs of the user created at or after `since`.
    fn logs_since(&self, user_id: i64, since: DateTime<Utc>) -> Result<Vec<SuggestionLog>>;

    /// Most recently used patterns first.
    fn recent_patterns(&self, user_id: i64, limit: usize) -> Result<Vec<CategoryPattern>>;

    /// Atomically read the (user, text) pattern, apply `rule`, and persist its result
    /// as an insert or in-place update. Returns the row as written.
    fn update_pattern(
        &self,
        user_id: i64,
        pattern_text: &str,
        rule: PatternRule<'_>,
    ) -> Result<Option<CategoryPattern>>;

    /// Atomically append `entry` and, when it was rejected, apply `penalty` to the
    /// confidence of the (user, text, suggested category) pattern if it exists.
    fn record_feedback(
        &self,
        entry: NewSuggestionLog,
        penalty: ConfidencePenalty<'_>,
    ) -> Result<SuggestionLog>;
}

/// Write access to the externally owned transaction table, for seeding and history import.
pub trait TransactionSink {
    fn insert_transaction(&self, txn: NewTransaction) -> Result<TransactionRecord>;
}
