//! Import an already-categorized transaction export and learn patterns from it.
//!
//! Expected header (any order, extra columns ignored):
//! date,notes,amount_cents,category_id[,is_split]
//!
//! Dates are `YYYY-MM-DD` or `MM/DD/YYYY`.

use std::io::Read;
use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tally_core::{BudgetScope, NewTransaction, SuggestionStore, TransactionSink};
use tracing::{debug, warn};

use crate::learner::{FeedbackLearner, LearnOutcome};

/// One categorized row of a history export
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRow {
    pub date: NaiveDate,
    pub notes: String,
    pub amount_cents: i64,
    pub category_id: i64,
    pub is_split: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSummary {
    pub imported: usize,
    pub patterns_created: usize,
    pub patterns_reinforced: usize,
    pub patterns_redirected: usize,
    /// Rows whose notes normalized to nothing
    pub without_notes: usize,
}

struct Columns {
    date: usize,
    notes: usize,
    amount_cents: usize,
    category_id: usize,
    is_split: Option<usize>,
}

impl Columns {
    fn from_header(header: &csv::StringRecord) -> Result<Self> {
        let find = |name: &str| {
            header
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(name))
        };
        let require = |name: &str| find(name).with_context(|| format!("missing column `{name}`"));

        Ok(Self {
            date: require("date")?,
            notes: require("notes")?,
            amount_cents: require("amount_cents")?,
            category_id: require("category_id")?,
            is_split: find("is_split"),
        })
    }
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(s, "%m/%d/%Y"))
        .with_context(|| format!("bad date `{s}`"))
}

fn parse_flag(s: &str) -> Result<bool> {
    match s.to_ascii_lowercase().as_str() {
        "" | "0" | "false" | "no" => Ok(false),
        "1" | "true" | "yes" => Ok(true),
        other => bail!("bad is_split `{other}`"),
    }
}

fn parse_row(record: &csv::StringRecord, cols: &Columns) -> Result<HistoryRow> {
    let field = |i: usize| record.get(i).unwrap_or("").trim();

    Ok(HistoryRow {
        date: parse_date(field(cols.date))?,
        notes: field(cols.notes).to_string(),
        amount_cents: field(cols.amount_cents)
            .parse()
            .with_context(|| format!("bad amount_cents `{}`", field(cols.amount_cents)))?,
        category_id: field(cols.category_id)
            .parse()
            .with_context(|| format!("bad category_id `{}`", field(cols.category_id)))?,
        is_split: match cols.is_split {
            Some(i) => parse_flag(field(i))?,
            None => false,
        },
    })
}

/// Parse a history export from any reader. Blank lines are skipped; any
/// malformed row fails the whole parse with its line number.
pub fn parse_history<R: Read>(reader: R) -> Result<Vec<HistoryRow>> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .has_headers(true)
        .from_reader(reader);

    let cols = Columns::from_header(rdr.headers().context("reading header")?)?;
    let mut rows = Vec::new();

    for result in rdr.records() {
        let record = result?;
        let line = record.position().map_or(0, |p| p.line());
        if record.iter().all(|f| f.trim().is_empty()) {
            continue;
        }
        rows.push(parse_row(&record, &cols).with_context(|| format!("line {line}"))?);
    }

    Ok(rows)
}

pub fn parse_history_csv(path: impl AsRef<Path>) -> Result<Vec<HistoryRow>> {
    let file = std::fs::File::open(path.as_ref())
        .with_context(|| format!("opening {}", path.as_ref().display()))?;
    parse_history(file).with_context(|| format!("parsing {}", path.as_ref().display()))
}

/// Store every row as a transaction in `scope`'s budget and learn its notes.
pub fn import_history<S>(
    store: &S,
    learner: &FeedbackLearner<'_>,
    scope: BudgetScope,
    rows: &[HistoryRow],
) -> tally_core::Result<ImportSummary>
where
    S: SuggestionStore + TransactionSink,
{
    let mut summary = ImportSummary::default();

    for row in rows {
        let txn = store.insert_transaction(NewTransaction {
            user_id: scope.user_id,
            budget_id: scope.budget_id,
            category_id: row.category_id,
            amount_cents: row.amount_cents,
            date: row.date,
            notes: Some(row.notes.clone()).filter(|n| !n.is_empty()),
            is_split: row.is_split,
        })?;
        summary.imported += 1;

        match learner.learn_from_transaction(scope.user_id, row.category_id, &row.notes, Some(txn.id))? {
            LearnOutcome::Skipped => {
                warn!(transaction_id = txn.id, "imported row has no usable notes");
                summary.without_notes += 1;
            }
            LearnOutcome::Created { .. } => summary.patterns_created += 1,
            LearnOutcome::Reinforced { .. } => summary.patterns_reinforced += 1,
            LearnOutcome::Redirected { .. } => summary.patterns_redirected += 1,
        }
    }

    debug!(?summary, "history import finished");
    Ok(summary)
}
