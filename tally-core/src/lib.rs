//! tally-core: domain types, text normalization and the store interface for
//! category suggestions

pub mod error;
pub mod store;
pub mod text;
pub mod types;

pub use error::{Result, SuggestError};
pub use store::{ConfidencePenalty, PatternRule, SuggestionStore, TransactionSink};
pub use text::{extract_keywords, normalize, DEFAULT_MIN_KEYWORD_LEN};
pub use types::{
    BudgetCategory, BudgetScope, CategoryCount, CategoryPattern, NewSuggestionLog, NewTransaction,
    PatternHit, PatternState, Suggestion, SuggestionLog, SuggestionReason, SuggestionStats,
    TransactionRecord,
};
