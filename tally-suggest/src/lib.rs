//! tally-suggest: category suggestion engine, feedback learner, accuracy stats
//! and history import

use chrono::{DateTime, Utc};

pub mod engine;
pub mod history;
pub mod learner;
pub mod memory;
pub mod service;
pub mod stats;

/// Source of "now" for learning timestamps and stats windows.
pub type Clock = fn() -> DateTime<Utc>;

pub use engine::{SuggestionEngine, SuggestionRequest, DEFAULT_LIMIT, MAX_LIMIT};
pub use history::{import_history, parse_history, parse_history_csv, HistoryRow, ImportSummary};
pub use learner::{FeedbackLearner, LearnOutcome, SuggestionFeedback};
pub use memory::MemoryStore;
pub use service::SuggestionService;
pub use stats::{suggestion_stats, DEFAULT_STATS_DAYS, MAX_STATS_DAYS};
