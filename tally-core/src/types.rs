//! Record types for learned category patterns, feedback logs and suggestions

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Owner scope for every suggestion query: one user's view of one budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BudgetScope {
    pub user_id: i64,
    pub budget_id: i64,
}

impl BudgetScope {
    pub fn new(user_id: i64, budget_id: i64) -> Self {
        Self { user_id, budget_id }
    }
}

/// A budget category, owned by the budget subsystem and read-only here
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetCategory {
    pub id: i64,
    pub budget_id: i64,
    pub name: String,
    /// Display order within the budget; breaks popularity ties
    pub sort_order: i32,
    /// Inactive categories are never suggested
    pub is_active: bool,
}

impl BudgetCategory {
    /// An active category at the front of the budget's display order
    pub fn new(id: i64, budget_id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            budget_id,
            name: name.into(),
            sort_order: 0,
            is_active: true,
        }
    }
}

/// A categorized transaction, owned by the transaction subsystem and read-only here
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: i64,
    pub user_id: i64,
    pub budget_id: i64,
    pub category_id: i64,
    pub amount_cents: i64,
    pub date: NaiveDate,
    pub notes: Option<String>,
    /// Split parents are excluded from amount similarity
    pub is_split: bool,
}

/// A transaction before the owning store assigns its id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTransaction {
    pub user_id: i64,
    pub budget_id: i64,
    pub category_id: i64,
    pub amount_cents: i64,
    pub date: NaiveDate,
    pub notes: Option<String>,
    pub is_split: bool,
}

impl NewTransaction {
    pub fn with_id(self, id: i64) -> TransactionRecord {
        TransactionRecord {
            id,
            user_id: self.user_id,
            budget_id: self.budget_id,
            category_id: self.category_id,
            amount_cents: self.amount_cents,
            date: self.date,
            notes: self.notes,
            is_split: self.is_split,
        }
    }
}

/// A learned (user, normalized text) -> category association
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryPattern {
    pub id: i64,
    pub user_id: i64,
    pub category_id: i64,
    /// Normalized text key; unique per user by convention
    pub pattern_text: String,
    /// Trust in this association, kept within [0.1, 1.0]
    pub confidence_score: f64,
    pub usage_count: u32,
    pub last_used: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl CategoryPattern {
    /// The mutable part of the row, as handed to an update rule.
    pub fn state(&self) -> PatternState {
        PatternState {
            category_id: self.category_id,
            confidence_score: self.confidence_score,
            usage_count: self.usage_count,
            last_used: self.last_used,
        }
    }
}

/// Column values an update rule wants written for a pattern row.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PatternState {
    pub category_id: i64,
    pub confidence_score: f64,
    pub usage_count: u32,
    pub last_used: DateTime<Utc>,
}

/// A pattern joined with the active category it points to
#[derive(Debug, Clone, PartialEq)]
pub struct PatternHit {
    pub pattern: CategoryPattern,
    pub category: BudgetCategory,
}

/// A category with the number of transactions that matched some filter
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryCount {
    pub category: BudgetCategory,
    pub count: u32,
}

/// Append-only audit record of one feedback event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestionLog {
    pub id: i64,
    pub user_id: i64,
    pub transaction_id: Option<i64>,
    pub suggested_category_id: i64,
    pub actual_category_id: i64,
    pub pattern_text: String,
    pub was_accepted: bool,
    pub created_at: DateTime<Utc>,
}

/// A feedback log entry before the store assigns its id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSuggestionLog {
    pub user_id: i64,
    pub transaction_id: Option<i64>,
    pub suggested_category_id: i64,
    pub actual_category_id: i64,
    pub pattern_text: String,
    pub was_accepted: bool,
    pub created_at: DateTime<Utc>,
}

impl NewSuggestionLog {
    pub fn with_id(self, id: i64) -> SuggestionLog {
        SuggestionLog {
            id,
            user_id: self.user_id,
            transaction_id: self.transaction_id,
            suggested_category_id: self.suggested_category_id,
            actual_category_id: self.actual_category_id,
            pattern_text: self.pattern_text,
            was_accepted: self.was_accepted,
            created_at: self.created_at,
        }
    }
}

/// Which fallback stage produced a suggestion, in priority order
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SuggestionReason {
    #[serde(rename = "exact_match")]
    ExactMatch,
    #[serde(rename = "keyword_match")]
    KeywordMatch,
    #[serde(rename = "similar_amount")]
    SimilarAmount,
    #[serde(rename = "frequently_used")]
    FrequentlyUsed,
}

impl SuggestionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SuggestionReason::ExactMatch => "exact_match",
            SuggestionReason::KeywordMatch => "keyword_match",
            SuggestionReason::SimilarAmount => "similar_amount",
            SuggestionReason::FrequentlyUsed => "frequently_used",
        }
    }
}

impl std::fmt::Display for SuggestionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One ranked category suggestion (never persisted)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    pub category_id: i64,
    pub category_name: String,
    /// 0.0 - 1.0
    pub confidence: f64,
    pub reason: SuggestionReason,
    pub usage_count: u32,
}

/// Rolling acceptance metrics over a trailing window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SuggestionStats {
    pub total_suggestions: u32,
    pub accepted: u32,
    pub rejected: u32,
    /// Percentage rounded to two decimals
    pub accuracy: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_serializes_snake_case() {
        let json = serde_json::to_string(&SuggestionReason::KeywordMatch).unwrap();
        assert_eq!(json, "\"keyword_match\"");
        let back: SuggestionReason = serde_json::from_str("\"frequently_used\"").unwrap();
        assert_eq!(back, SuggestionReason::FrequentlyUsed);
    }

    #[test]
    fn test_reason_order_follows_stage_priority() {
        assert!(SuggestionReason::ExactMatch < SuggestionReason::KeywordMatch);
        assert!(SuggestionReason::SimilarAmount < SuggestionReason::FrequentlyUsed);
        assert_eq!(SuggestionReason::SimilarAmount.to_string(), "similar_amount");
    }

    #[test]
    fn test_new_log_with_id_keeps_fields() {
        let now = Utc::now();
        let log = NewSuggestionLog {
            user_id: 1,
            transaction_id: None,
            suggested_category_id: 5,
            actual_category_id: 7,
            pattern_text: "coffee".to_string(),
            was_accepted: false,
            created_at: now,
        }
        .with_id(42);
        assert_eq!(log.id, 42);
        assert_eq!(log.suggested_category_id, 5);
        assert!(!log.was_accepted);
        assert_eq!(log.created_at, now);
    }
}
