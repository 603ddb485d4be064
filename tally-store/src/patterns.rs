//! `SuggestionStore` over SQLite.
//!
//! Read queries join patterns against active categories of the requested
//! budget, so patterns of deactivated categories stay stored but are never
//! surfaced. Both write paths run inside an IMMEDIATE transaction: the write
//! lock is taken before the current row is read, so two learners touching the
//! same (user, text) key serialize instead of losing an increment.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use tally_core::{
    BudgetScope, CategoryCount, CategoryPattern, ConfidencePenalty, NewSuggestionLog, PatternHit,
    PatternRule, PatternState, Result, SuggestionLog, SuggestionStore,
};
use tracing::debug;

use crate::catalog::{row_to_category, CATEGORY_COLUMNS};
use crate::database::{get_ts, ts, SqliteStore};

const PATTERN_COLUMNS: &str = "p.id, p.user_id, p.category_id, p.pattern_text, p.confidence_score, \
                               p.usage_count, p.last_used, p.created_at";
const PATTERN_WIDTH: usize = 8;

const LOG_COLUMNS: &str = "id, user_id, transaction_id, suggested_category_id, actual_category_id, \
                           pattern_text, was_accepted, created_at";

fn row_to_pattern(row: &Row<'_>) -> rusqlite::Result<CategoryPattern> {
    Ok(CategoryPattern {
        id: row.get(0)?,
        user_id: row.get(1)?,
        category_id: row.get(2)?,
        pattern_text: row.get(3)?,
        confidence_score: row.get(4)?,
        usage_count: row.get(5)?,
        last_used: get_ts(row, 6)?,
        created_at: get_ts(row, 7)?,
    })
}

fn row_to_hit(row: &Row<'_>) -> rusqlite::Result<PatternHit> {
    Ok(PatternHit {
        pattern: row_to_pattern(row)?,
        category: row_to_category(row, PATTERN_WIDTH)?,
    })
}

fn row_to_count(row: &Row<'_>) -> rusqlite::Result<CategoryCount> {
    Ok(CategoryCount {
        category: row_to_category(row, 0)?,
        count: row.get(5)?,
    })
}

fn row_to_log(row: &Row<'_>) -> rusqlite::Result<SuggestionLog> {
    Ok(SuggestionLog {
        id: row.get(0)?,
        user_id: row.get(1)?,
        transaction_id: row.get(2)?,
        suggested_category_id: row.get(3)?,
        actual_category_id: row.get(4)?,
        pattern_text: row.get(5)?,
        was_accepted: row.get(6)?,
        created_at: get_ts(row, 7)?,
    })
}

/// Pattern hits for the scope, filtered by an extra `WHERE` fragment using `?3`.
fn query_hits(
    conn: &Connection,
    scope: BudgetScope,
    condition: &str,
    value: &str,
    order: &str,
) -> rusqlite::Result<Vec<PatternHit>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {PATTERN_COLUMNS}, {CATEGORY_COLUMNS}
         FROM category_patterns p
         JOIN budget_categories c ON c.id = p.category_id
         WHERE p.user_id = ?1 AND c.budget_id = ?2 AND c.is_active = 1 AND {condition}
         ORDER BY {order}"
    ))?;
    let rows = stmt.query_map(params![scope.user_id, scope.budget_id, value], row_to_hit)?;
    rows.collect()
}

fn write_state(
    conn: &Connection,
    user_id: i64,
    pattern_text: &str,
    existing: Option<CategoryPattern>,
    state: PatternState,
) -> rusqlite::Result<CategoryPattern> {
    match existing {
        Some(mut row) => {
            conn.execute(
                "UPDATE category_patterns
                 SET category_id = ?1, confidence_score = ?2, usage_count = ?3, last_used = ?4
                 WHERE id = ?5",
                params![
                    state.category_id,
                    state.confidence_score,
                    state.usage_count,
                    ts(state.last_used),
                    row.id,
                ],
            )?;
            row.category_id = state.category_id;
            row.confidence_score = state.confidence_score;
            row.usage_count = state.usage_count;
            row.last_used = state.last_used;
            Ok(row)
        }
        None => {
            conn.execute(
                "INSERT INTO category_patterns
                 (user_id, category_id, pattern_text, confidence_score, usage_count, last_used, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
                params![
                    user_id,
                    state.category_id,
                    pattern_text,
                    state.confidence_score,
                    state.usage_count,
                    ts(state.last_used),
                ],
            )?;
            Ok(CategoryPattern {
                id: conn.last_insert_rowid(),
                user_id,
                category_id: state.category_id,
                pattern_text: pattern_text.to_string(),
                confidence_score: state.confidence_score,
                usage_count: state.usage_count,
                last_used: state.last_used,
                created_at: state.last_used,
            })
        }
    }
}

impl SqliteStore {
    pub fn find_pattern(&self, user_id: i64, pattern_text: &str) -> Result<Option<CategoryPattern>> {
        self.with_conn(|conn| find_pattern(conn, user_id, pattern_text))
    }

    /// Every feedback log of the user, oldest first.
    pub fn logs_for_user(&self, user_id: i64) -> Result<Vec<SuggestionLog>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {LOG_COLUMNS} FROM category_suggestion_logs WHERE user_id = ?1 ORDER BY id"
            ))?;
            let rows = stmt.query_map([user_id], row_to_log)?;
            rows.collect()
        })
    }
}

fn find_pattern(
    conn: &Connection,
    user_id: i64,
    pattern_text: &str,
) -> rusqlite::Result<Option<CategoryPattern>> {
    conn.query_row(
        &format!(
            "SELECT {PATTERN_COLUMNS} FROM category_patterns p
             WHERE p.user_id = ?1 AND p.pattern_text = ?2
             ORDER BY p.id LIMIT 1"
        ),
        params![user_id, pattern_text],
        row_to_pattern,
    )
    .optional()
}

impl SuggestionStore for SqliteStore {
    fn exact_patterns(&self, scope: BudgetScope, pattern_text: &str) -> Result<Vec<PatternHit>> {
        self.with_conn(|conn| {
            query_hits(
                conn,
                scope,
                "p.pattern_text = ?3",
                pattern_text,
                "p.confidence_score DESC, p.usage_count DESC, p.id",
            )
        })
    }

    fn patterns_containing(&self, scope: BudgetScope, keyword: &str) -> Result<Vec<PatternHit>> {
        // instr() rather than LIKE: '_' and '%' are word characters here, not wildcards
        self.with_conn(|conn| query_hits(conn, scope, "instr(p.pattern_text, ?3) > 0", keyword, "p.id"))
    }

    fn similar_amount_counts(
        &self,
        scope: BudgetScope,
        min_cents: i64,
        max_cents: i64,
    ) -> Result<Vec<CategoryCount>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CATEGORY_COLUMNS}, COUNT(t.id)
                 FROM budget_categories c
                 JOIN transactions t ON t.category_id = c.id
                 WHERE c.budget_id = ?2 AND c.is_active = 1
                   AND t.user_id = ?1 AND t.is_split = 0
                   AND t.amount_cents BETWEEN ?3 AND ?4
                 GROUP BY c.id
                 ORDER BY c.sort_order, c.id"
            ))?;
            let rows = stmt.query_map(
                params![scope.user_id, scope.budget_id, min_cents, max_cents],
                row_to_count,
            )?;
            rows.collect()
        })
    }

    fn category_usage(&self, scope: BudgetScope) -> Result<Vec<CategoryCount>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CATEGORY_COLUMNS}, COUNT(t.id)
                 FROM budget_categories c
                 LEFT JOIN transactions t ON t.category_id = c.id AND t.user_id = ?1
                 WHERE c.budget_id = ?2 AND c.is_active = 1
                 GROUP BY c.id
                 ORDER BY c.sort_order, c.id"
            ))?;
            let rows = stmt.query_map(params![scope.user_id, scope.budget_id], row_to_count)?;
            rows.collect()
        })
    }

    fn logs_since(&self, user_id: i64, since: DateTime<Utc>) -> Result<Vec<SuggestionLog>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {LOG_COLUMNS} FROM category_suggestion_logs
                 WHERE user_id = ?1 AND created_at >= ?2
                 ORDER BY created_at, id"
            ))?;
            let rows = stmt.query_map(params![user_id, ts(since)], row_to_log)?;
            rows.collect()
        })
    }

    fn recent_patterns(&self, user_id: i64, limit: usize) -> Result<Vec<CategoryPattern>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {PATTERN_COLUMNS} FROM category_patterns p
                 WHERE p.user_id = ?1
                 ORDER BY p.last_used DESC, p.id DESC
                 LIMIT ?2"
            ))?;
            let rows = stmt.query_map(params![user_id, limit as i64], row_to_pattern)?;
            rows.collect()
        })
    }

    fn update_pattern(
        &self,
        user_id: i64,
        pattern_text: &str,
        rule: PatternRule<'_>,
    ) -> Result<Option<CategoryPattern>> {
        self.with_conn(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let existing = find_pattern(&tx, user_id, pattern_text)?;

            let Some(state) = rule(existing.as_ref()) else {
                return Ok(existing);
            };

            let written = write_state(&tx, user_id, pattern_text, existing, state)?;
            tx.commit()?;
            debug!(user_id, pattern_id = written.id, usage = written.usage_count, "pattern written");
            Ok(Some(written))
        })
    }

    fn record_feedback(
        &self,
        entry: NewSuggestionLog,
        penalty: ConfidencePenalty<'_>,
    ) -> Result<SuggestionLog> {
        self.with_conn(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            if !entry.was_accepted {
                let target: Option<(i64, f64)> = tx
                    .query_row(
                        "SELECT id, confidence_score FROM category_patterns
                         WHERE user_id = ?1 AND category_id = ?2 AND pattern_text = ?3
                         ORDER BY id LIMIT 1",
                        params![entry.user_id, entry.suggested_category_id, entry.pattern_text],
                        |row| Ok((row.get(0)?, row.get(1)?)),
                    )
                    .optional()?;
                if let Some((id, confidence)) = target {
                    tx.execute(
                        "UPDATE category_patterns SET confidence_score = ?1 WHERE id = ?2",
                        params![penalty(confidence), id],
                    )?;
                }
            }

            tx.execute(
                "INSERT INTO category_suggestion_logs
                 (user_id, transaction_id, suggested_category_id, actual_category_id, pattern_text, was_accepted, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    entry.user_id,
                    entry.transaction_id,
                    entry.suggested_category_id,
                    entry.actual_category_id,
                    entry.pattern_text,
                    entry.was_accepted,
                    ts(entry.created_at),
                ],
            )?;
            let id = tx.last_insert_rowid();
            tx.commit()?;
            Ok(entry.with_id(id))
        })
    }
}
