//! Suggestion engine: ranks budget categories for free-text notes.
//!
//! Stages run in strict priority order and each only runs while the list is
//! still short of the limit:
//! 1) exact pattern match
//! 2) keyword substring match
//! 3) similar transaction amount
//! 4) popularity within the budget
//!
//! A category is reported once, by the earliest stage that produced it.
//! Duplicates are dropped before the limit is applied, so a later candidate
//! from the same stage takes the freed slot.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tally_core::{
    extract_keywords, normalize, BudgetCategory, BudgetScope, CategoryCount, Result, SuggestError,
    Suggestion, SuggestionReason, SuggestionStore, DEFAULT_MIN_KEYWORD_LEN,
};
use tracing::debug;

pub const DEFAULT_LIMIT: usize = 3;
pub const MAX_LIMIT: usize = 10;

/// Fraction of the requested amount accepted on either side
pub const AMOUNT_TOLERANCE: f64 = 0.2;
pub const SIMILAR_AMOUNT_CONFIDENCE: f64 = 0.5;
pub const POPULAR_CONFIDENCE: f64 = 0.3;

/// Inputs for one suggestion call. Budget ownership is checked by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestionRequest {
    pub scope: BudgetScope,
    pub notes: String,
    pub amount_cents: Option<i64>,
    pub limit: usize,
}

impl SuggestionRequest {
    pub fn new(scope: BudgetScope, notes: impl Into<String>) -> Self {
        Self {
            scope,
            notes: notes.into(),
            amount_cents: None,
            limit: DEFAULT_LIMIT,
        }
    }

    pub fn with_amount(mut self, amount_cents: Option<i64>) -> Self {
        self.amount_cents = amount_cents;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}

/// Accumulates suggestions across stages: first occurrence wins, stops at the limit.
struct Ranked {
    limit: usize,
    seen: HashSet<i64>,
    items: Vec<Suggestion>,
}

impl Ranked {
    fn new(limit: usize) -> Self {
        Self {
            limit,
            seen: HashSet::new(),
            items: Vec::with_capacity(limit),
        }
    }

    fn is_full(&self) -> bool {
        self.items.len() >= self.limit
    }

    fn extend(&mut self, stage: impl IntoIterator<Item = Suggestion>) {
        for s in stage {
            if self.is_full() {
                break;
            }
            if self.seen.insert(s.category_id) {
                self.items.push(s);
            }
        }
    }
}

struct KeywordScore {
    category: BudgetCategory,
    score: f64,
    matches: u32,
}

pub struct SuggestionEngine<'a> {
    store: &'a dyn SuggestionStore,
    min_keyword_len: usize,
}

impl<'a> SuggestionEngine<'a> {
    pub fn new(store: &'a dyn SuggestionStore) -> Self {
        Self {
            store,
            min_keyword_len: DEFAULT_MIN_KEYWORD_LEN,
        }
    }

    pub fn suggest(&self, req: &SuggestionRequest) -> Result<Vec<Suggestion>> {
        if !(1..=MAX_LIMIT).contains(&req.limit) {
            return Err(SuggestError::invalid(format!(
                "limit must be within 1..={MAX_LIMIT}, got {}",
                req.limit
            )));
        }

        let scope = req.scope;
        let mut ranked = Ranked::new(req.limit);
        let pattern_text = normalize(&req.notes);

        if !pattern_text.is_empty() {
            ranked.extend(self.exact_matches(scope, &pattern_text)?);

            if !ranked.is_full() {
                let keywords = extract_keywords(&req.notes, self.min_keyword_len);
                if !keywords.is_empty() {
                    ranked.extend(self.keyword_matches(scope, &keywords)?);
                }
            }
        }

        if !ranked.is_full() {
            if let Some(amount) = req.amount_cents.filter(|a| *a != 0) {
                ranked.extend(self.amount_matches(scope, amount)?);
            }
        }

        if !ranked.is_full() {
            ranked.extend(self.popular(scope)?);
        }

        debug!(
            user_id = scope.user_id,
            budget_id = scope.budget_id,
            count = ranked.items.len(),
            "suggestions ranked"
        );
        Ok(ranked.items)
    }

    fn exact_matches(&self, scope: BudgetScope, pattern_text: &str) -> Result<Vec<Suggestion>> {
        let mut hits = self.store.exact_patterns(scope, pattern_text)?;
        hits.sort_by(|a, b| {
            b.pattern
                .confidence_score
                .total_cmp(&a.pattern.confidence_score)
                .then(b.pattern.usage_count.cmp(&a.pattern.usage_count))
        });
        debug!(candidates = hits.len(), "exact match stage");

        Ok(hits
            .into_iter()
            .map(|hit| Suggestion {
                category_id: hit.category.id,
                category_name: hit.category.name,
                confidence: hit.pattern.confidence_score,
                reason: SuggestionReason::ExactMatch,
                usage_count: hit.pattern.usage_count,
            })
            .collect())
    }

    /// Additive keyword score per category:
    /// sum of `confidence * (1 + min(usage / 10, 1))` over every (keyword, pattern) hit.
    fn keyword_matches(&self, scope: BudgetScope, keywords: &[String]) -> Result<Vec<Suggestion>> {
        let mut scores: Vec<KeywordScore> = Vec::new();
        let mut index: HashMap<i64, usize> = HashMap::new();

        for keyword in keywords {
            for hit in self.store.patterns_containing(scope, keyword)? {
                let usage_boost = (f64::from(hit.pattern.usage_count) / 10.0).min(1.0);
                let weight = hit.pattern.confidence_score * (1.0 + usage_boost);

                let slot = *index.entry(hit.category.id).or_insert_with(|| {
                    scores.push(KeywordScore {
                        category: hit.category.clone(),
                        score: 0.0,
                        matches: 0,
                    });
                    scores.len() - 1
                });
                scores[slot].score += weight;
                scores[slot].matches += 1;
            }
        }

        // Stable: equal (score, matches) keep first-seen order.
        scores.sort_by(|a, b| b.score.total_cmp(&a.score).then(b.matches.cmp(&a.matches)));
        debug!(keywords = keywords.len(), candidates = scores.len(), "keyword stage");

        let keyword_count = keywords.len() as f64;
        Ok(scores
            .into_iter()
            .map(|s| Suggestion {
                category_id: s.category.id,
                category_name: s.category.name,
                confidence: (s.score / keyword_count).min(1.0),
                reason: SuggestionReason::KeywordMatch,
                usage_count: s.matches,
            })
            .collect())
    }

    fn amount_matches(&self, scope: BudgetScope, amount_cents: i64) -> Result<Vec<Suggestion>> {
        let (min_cents, max_cents) = amount_window(amount_cents);
        let mut counts = self.store.similar_amount_counts(scope, min_cents, max_cents)?;
        counts.sort_by(|a, b| b.count.cmp(&a.count));
        debug!(min_cents, max_cents, candidates = counts.len(), "similar amount stage");

        Ok(counts
            .into_iter()
            .map(|c| counted(c, SuggestionReason::SimilarAmount, SIMILAR_AMOUNT_CONFIDENCE))
            .collect())
    }

    fn popular(&self, scope: BudgetScope) -> Result<Vec<Suggestion>> {
        let mut usage = self.store.category_usage(scope)?;
        usage.sort_by(|a, b| {
            b.count
                .cmp(&a.count)
                .then(a.category.sort_order.cmp(&b.category.sort_order))
                .then(a.category.id.cmp(&b.category.id))
        });
        debug!(candidates = usage.len(), "popularity stage");

        Ok(usage
            .into_iter()
            .map(|c| counted(c, SuggestionReason::FrequentlyUsed, POPULAR_CONFIDENCE))
            .collect())
    }
}

fn counted(c: CategoryCount, reason: SuggestionReason, confidence: f64) -> Suggestion {
    Suggestion {
        category_id: c.category.id,
        category_name: c.category.name,
        confidence,
        reason,
        usage_count: c.count,
    }
}

/// Inclusive integer bounds of the ±20% window around `amount_cents`.
pub fn amount_window(amount_cents: i64) -> (i64, i64) {
    let amount = amount_cents as f64;
    let margin = amount.abs() * AMOUNT_TOLERANCE;
    ((amount - margin).ceil() as i64, (amount + margin).floor() as i64)
}
