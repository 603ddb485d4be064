use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, Utc};
use chrono_tz::Tz;
use serde_json::json;
use std::path::Path;
use tally_core::{BudgetScope, NewTransaction, Suggestion, SuggestionStats};
use tally_store::SqliteStore;
use tally_suggest::{
    import_history, parse_history_csv, LearnOutcome, SuggestionFeedback, SuggestionRequest,
    SuggestionService,
};

/// Everything a subcommand needs: the opened store plus per-invocation settings.
pub struct Session {
    pub service: SuggestionService<SqliteStore>,
    pub scope: BudgetScope,
    pub tz: Tz,
}

impl Session {
    pub fn open(db_path: &Path, scope: BudgetScope, tz: Tz) -> Result<Self> {
        let store = SqliteStore::open_at(db_path)
            .with_context(|| format!("opening database {}", db_path.display()))?;
        Ok(Self {
            service: SuggestionService::new(store),
            scope,
            tz,
        })
    }

    fn store(&self) -> &SqliteStore {
        self.service.store()
    }

    fn today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.tz).date_naive()
    }
}

pub fn category_add(s: &Session, name: &str) -> Result<()> {
    let cat = s.store().add_category(s.scope.budget_id, name)?;
    println!("Added category {} \"{}\" to budget {}", cat.id, cat.name, cat.budget_id);
    Ok(())
}

pub fn category_list(s: &Session, all: bool) -> Result<()> {
    let cats = s.store().list_categories(s.scope.budget_id, all)?;
    if cats.is_empty() {
        println!("No categories in budget {} (add one: tally category add <name>)", s.scope.budget_id);
        return Ok(());
    }
    for c in &cats {
        let flag = if c.is_active { "" } else { " (inactive)" };
        println!("{:>5}  {}{}", c.id, c.name, flag);
    }
    Ok(())
}

pub fn category_deactivate(s: &Session, id: i64) -> Result<()> {
    if !s.store().deactivate_category(id)? {
        bail!("no category with id {id}");
    }
    println!("Deactivated category {id}; its patterns are kept but no longer suggested");
    Ok(())
}

pub struct TxnArgs {
    pub category_id: i64,
    pub amount_cents: i64,
    pub date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub is_split: bool,
    pub learn: bool,
}

pub fn txn_add(s: &Session, args: TxnArgs) -> Result<()> {
    let record = s.store().add_transaction(NewTransaction {
        user_id: s.scope.user_id,
        budget_id: s.scope.budget_id,
        category_id: args.category_id,
        amount_cents: args.amount_cents,
        date: args.date.unwrap_or_else(|| s.today()),
        notes: args.notes,
        is_split: args.is_split,
    })?;
    println!(
        "Recorded transaction {} ({} cents on {})",
        record.id, record.amount_cents, record.date
    );

    if args.learn {
        let notes = record.notes.as_deref().unwrap_or("");
        let outcome = s.service.learn_from_transaction(
            s.scope.user_id,
            record.category_id,
            notes,
            Some(record.id),
        )?;
        print_outcome(&outcome);
    }
    Ok(())
}

pub fn import(s: &Session, csv: &Path) -> Result<()> {
    if !csv.exists() {
        bail!("CSV not found: {} (pass --csv <path>)", csv.display());
    }
    let rows = parse_history_csv(csv)?;
    let summary = import_history(s.store(), &s.service.learner(), s.scope, &rows)?;

    println!("Imported {} transactions from {}", summary.imported, csv.display());
    println!(
        "Patterns: {} created, {} reinforced, {} redirected ({} rows without notes)",
        summary.patterns_created,
        summary.patterns_reinforced,
        summary.patterns_redirected,
        summary.without_notes
    );
    Ok(())
}

pub fn suggest(
    s: &Session,
    notes: &str,
    amount_cents: Option<i64>,
    limit: usize,
    as_json: bool,
) -> Result<()> {
    let req = SuggestionRequest::new(s.scope, notes)
        .with_amount(amount_cents)
        .with_limit(limit);
    let suggestions = s.service.get_suggestions(&req)?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&json!({ "suggestions": suggestions }))?);
        return Ok(());
    }
    print_suggestions(&suggestions);
    Ok(())
}

fn print_suggestions(suggestions: &[Suggestion]) {
    if suggestions.is_empty() {
        println!("No suggestions (budget has no active categories)");
        return;
    }
    for (i, sg) in suggestions.iter().enumerate() {
        println!(
            "{}. {} [id {}] confidence={:.2} | {} | used {}x",
            i + 1,
            sg.category_name,
            sg.category_id,
            sg.confidence,
            sg.reason,
            sg.usage_count
        );
    }
}

pub fn learn(s: &Session, category_id: i64, notes: &str, transaction_id: Option<i64>) -> Result<()> {
    let outcome = s
        .service
        .learn_from_transaction(s.scope.user_id, category_id, notes, transaction_id)?;
    print_outcome(&outcome);
    Ok(())
}

pub fn feedback(
    s: &Session,
    suggested: i64,
    actual: i64,
    notes: &str,
    transaction_id: Option<i64>,
) -> Result<()> {
    let fb = SuggestionFeedback {
        user_id: s.scope.user_id,
        suggested_category_id: suggested,
        actual_category_id: actual,
        pattern_text: notes.to_string(),
        transaction_id,
    };
    let (log, outcome) = s.service.apply_feedback(&fb)?;
    let verdict = if log.was_accepted { "accepted" } else { "rejected" };
    println!("Logged feedback {} ({verdict})", log.id);
    print_outcome(&outcome);
    Ok(())
}

fn print_outcome(outcome: &LearnOutcome) {
    match outcome {
        LearnOutcome::Skipped => println!("Nothing learned (notes are empty after normalization)"),
        LearnOutcome::Created { confidence } => {
            println!("New pattern, confidence {confidence:.2}")
        }
        LearnOutcome::Reinforced { confidence, usage_count } => {
            println!("Pattern reinforced: confidence {confidence:.2}, used {usage_count}x")
        }
        LearnOutcome::Redirected { from_category_id, usage_count } => println!(
            "Pattern moved from category {from_category_id}: confidence reset to 0.50, used {usage_count}x"
        ),
    }
}

pub fn stats(s: &Session, days: u32, as_json: bool) -> Result<()> {
    let stats = s.service.get_suggestion_stats(s.scope.user_id, days)?;
    if as_json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }
    print_stats(&stats, days);
    Ok(())
}

fn print_stats(stats: &SuggestionStats, days: u32) {
    println!("Last {days} days");
    println!("  suggestions: {}", stats.total_suggestions);
    println!("  accepted:    {}", stats.accepted);
    println!("  rejected:    {}", stats.rejected);
    println!("  accuracy:    {:.2}%", stats.accuracy);
}

pub fn patterns(s: &Session, limit: usize) -> Result<()> {
    let patterns = s.service.recent_patterns(s.scope.user_id, limit)?;
    if patterns.is_empty() {
        println!("No learned patterns for user {}", s.scope.user_id);
        return Ok(());
    }
    for p in &patterns {
        println!(
            "{} | \"{}\" -> category {} | confidence={:.2} | used {}x",
            p.last_used.with_timezone(&s.tz).format("%Y-%m-%d %H:%M %Z"),
            p.pattern_text,
            p.category_id,
            p.confidence_score,
            p.usage_count
        );
    }
    Ok(())
}
