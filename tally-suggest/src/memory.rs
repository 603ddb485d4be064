//! In-memory `SuggestionStore` for tests and embedders without a database.
//!
//! A single mutex guards all tables, which serializes every pattern update.

use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use tally_core::{
    BudgetCategory, BudgetScope, CategoryCount, CategoryPattern, ConfidencePenalty,
    NewSuggestionLog, NewTransaction, PatternHit, PatternRule, Result, SuggestError,
    SuggestionLog, SuggestionStore, TransactionRecord, TransactionSink,
};

#[derive(Debug, Default)]
struct Tables {
    categories: Vec<BudgetCategory>,
    transactions: Vec<TransactionRecord>,
    patterns: Vec<CategoryPattern>,
    logs: Vec<SuggestionLog>,
    next_id: i64,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn active_category(&self, scope: BudgetScope, category_id: i64) -> Option<&BudgetCategory> {
        self.categories
            .iter()
            .find(|c| c.id == category_id && c.budget_id == scope.budget_id && c.is_active)
    }

    fn hits<F>(&self, scope: BudgetScope, keep: F) -> Vec<PatternHit>
    where
        F: Fn(&CategoryPattern) -> bool,
    {
        self.patterns
            .iter()
            .filter(|p| p.user_id == scope.user_id && keep(*p))
            .filter_map(|p| {
                self.active_category(scope, p.category_id).map(|c| PatternHit {
                    pattern: p.clone(),
                    category: c.clone(),
                })
            })
            .collect()
    }

    /// Active categories of the budget in display order, each with a count of matching transactions.
    fn counts<F>(&self, scope: BudgetScope, keep: F) -> Vec<CategoryCount>
    where
        F: Fn(&TransactionRecord) -> bool,
    {
        let mut categories: Vec<&BudgetCategory> = self
            .categories
            .iter()
            .filter(|c| c.budget_id == scope.budget_id && c.is_active)
            .collect();
        categories.sort_by_key(|c| (c.sort_order, c.id));

        categories
            .into_iter()
            .map(|c| CategoryCount {
                category: c.clone(),
                count: self
                    .transactions
                    .iter()
                    .filter(|t| t.user_id == scope.user_id && t.category_id == c.id && keep(*t))
                    .count() as u32,
            })
            .collect()
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| SuggestError::StorageUnavailable("memory store lock poisoned".to_string()))
    }

    /// Register a category, replacing any existing one with the same id.
    pub fn add_category(&self, category: BudgetCategory) -> Result<()> {
        let mut t = self.lock()?;
        t.categories.retain(|c| c.id != category.id);
        t.categories.push(category);
        Ok(())
    }

    /// Hide a category from every suggestion stage. Its patterns are kept.
    pub fn deactivate_category(&self, category_id: i64) -> Result<bool> {
        let mut t = self.lock()?;
        let Some(category) = t.categories.iter_mut().find(|c| c.id == category_id) else {
            return Ok(false);
        };
        category.is_active = false;
        Ok(true)
    }

    pub fn add_transaction(&self, txn: NewTransaction) -> Result<TransactionRecord> {
        let mut t = self.lock()?;
        let record = txn.with_id(t.next_id());
        t.transactions.push(record.clone());
        Ok(record)
    }

    /// Insert a pattern row as-is, bypassing the learning rules. A zero id gets a fresh one.
    pub fn insert_pattern(&self, mut pattern: CategoryPattern) -> Result<CategoryPattern> {
        let mut t = self.lock()?;
        if pattern.id == 0 {
            pattern.id = t.next_id();
        }
        t.patterns.push(pattern.clone());
        Ok(pattern)
    }

    pub fn find_pattern(&self, user_id: i64, pattern_text: &str) -> Result<Option<CategoryPattern>> {
        let t = self.lock()?;
        Ok(t.patterns
            .iter()
            .find(|p| p.user_id == user_id && p.pattern_text == pattern_text)
            .cloned())
    }

    pub fn logs(&self) -> Result<Vec<SuggestionLog>> {
        Ok(self.lock()?.logs.clone())
    }
}

impl SuggestionStore for MemoryStore {
    fn exact_patterns(&self, scope: BudgetScope, pattern_text: &str) -> Result<Vec<PatternHit>> {
        Ok(self.lock()?.hits(scope, |p| p.pattern_text == pattern_text))
    }

    fn patterns_containing(&self, scope: BudgetScope, keyword: &str) -> Result<Vec<PatternHit>> {
        Ok(self.lock()?.hits(scope, |p| p.pattern_text.contains(keyword)))
    }

    fn similar_amount_counts(
        &self,
        scope: BudgetScope,
        min_cents: i64,
        max_cents: i64,
    ) -> Result<Vec<CategoryCount>> {
        let t = self.lock()?;
        Ok(t.counts(scope, |txn| {
            !txn.is_split && (min_cents..=max_cents).contains(&txn.amount_cents)
        })
        .into_iter()
        .filter(|c| c.count > 0)
        .collect())
    }

    fn category_usage(&self, scope: BudgetScope) -> Result<Vec<CategoryCount>> {
        Ok(self.lock()?.counts(scope, |_| true))
    }

    fn logs_since(&self, user_id: i64, since: DateTime<Utc>) -> Result<Vec<SuggestionLog>> {
        let t = self.lock()?;
        Ok(t.logs
            .iter()
            .filter(|l| l.user_id == user_id && l.created_at >= since)
            .cloned()
            .collect())
    }

    fn recent_patterns(&self, user_id: i64, limit: usize) -> Result<Vec<CategoryPattern>> {
        let t = self.lock()?;
        let mut patterns: Vec<CategoryPattern> = t
            .patterns
            .iter()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect();
        patterns.sort_by(|a, b| b.last_used.cmp(&a.last_used).then(b.id.cmp(&a.id)));
        patterns.truncate(limit);
        Ok(patterns)
    }

    fn update_pattern(
        &self,
        user_id: i64,
        pattern_text: &str,
        rule: PatternRule<'_>,
    ) -> Result<Option<CategoryPattern>> {
        let mut t = self.lock()?;
        let pos = t
            .patterns
            .iter()
            .position(|p| p.user_id == user_id && p.pattern_text == pattern_text);
        let existing = pos.map(|i| &t.patterns[i]);

        let Some(state) = rule(existing) else {
            return Ok(existing.cloned());
        };

        match pos {
            Some(i) => {
                let row = &mut t.patterns[i];
                row.category_id = state.category_id;
                row.confidence_score = state.confidence_score;
                row.usage_count = state.usage_count;
                row.last_used = state.last_used;
                Ok(Some(row.clone()))
            }
            None => {
                let row = CategoryPattern {
                    id: t.next_id(),
                    user_id,
                    category_id: state.category_id,
                    pattern_text: pattern_text.to_string(),
                    confidence_score: state.confidence_score,
                    usage_count: state.usage_count,
                    last_used: state.last_used,
                    created_at: state.last_used,
                };
                t.patterns.push(row.clone());
                Ok(Some(row))
            }
        }
    }

    fn record_feedback(
        &self,
        entry: NewSuggestionLog,
        penalty: ConfidencePenalty<'_>,
    ) -> Result<SuggestionLog> {
        let mut t = self.lock()?;

        if !entry.was_accepted {
            if let Some(p) = t.patterns.iter_mut().find(|p| {
                p.user_id == entry.user_id
                    && p.category_id == entry.suggested_category_id
                    && p.pattern_text == entry.pattern_text
            }) {
                p.confidence_score = penalty(p.confidence_score);
            }
        }

        let log = entry.with_id(t.next_id());
        t.logs.push(log.clone());
        Ok(log)
    }
}

impl TransactionSink for MemoryStore {
    fn insert_transaction(&self, txn: NewTransaction) -> Result<TransactionRecord> {
        self.add_transaction(txn)
    }
}
