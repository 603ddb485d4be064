//! Rolling acceptance accuracy over the suggestion feedback log.

use chrono::{DateTime, Duration, Utc};
use tally_core::{Result, SuggestError, SuggestionLog, SuggestionStats, SuggestionStore};

pub const DEFAULT_STATS_DAYS: u32 = 30;
pub const MAX_STATS_DAYS: u32 = 365;

/// Aggregate the user's feedback logs created within the trailing `days` ending at `now`.
pub fn suggestion_stats(
    store: &dyn SuggestionStore,
    user_id: i64,
    days: u32,
    now: DateTime<Utc>,
) -> Result<SuggestionStats> {
    if !(1..=MAX_STATS_DAYS).contains(&days) {
        return Err(SuggestError::invalid(format!(
            "days must be within 1..={MAX_STATS_DAYS}, got {days}"
        )));
    }

    let since = now - Duration::days(i64::from(days));
    let logs = store.logs_since(user_id, since)?;
    Ok(summarize(&logs))
}

pub fn summarize(logs: &[SuggestionLog]) -> SuggestionStats {
    if logs.is_empty() {
        return SuggestionStats::default();
    }

    let total = logs.len() as u32;
    let accepted = logs.iter().filter(|l| l.was_accepted).count() as u32;
    let accuracy = f64::from(accepted) / f64::from(total) * 100.0;

    SuggestionStats {
        total_suggestions: total,
        accepted,
        rejected: total - accepted,
        accuracy: (accuracy * 100.0).round_ties_even() / 100.0,
    }
}
