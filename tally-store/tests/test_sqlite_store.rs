use std::thread;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use tally_core::{BudgetScope, NewTransaction, SuggestionReason, SuggestionStore};
use tally_store::SqliteStore;
use tally_suggest::{
    import_history, parse_history, LearnOutcome, SuggestionFeedback, SuggestionRequest,
    SuggestionService,
};

const USER: i64 = 1;
const BUDGET: i64 = 3;

fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, 1, 8, 30, 0).unwrap()
}

fn scope() -> BudgetScope {
    BudgetScope::new(USER, BUDGET)
}

fn seeded(names: &[&str]) -> (SuggestionService<SqliteStore>, Vec<i64>) {
    let store = SqliteStore::open_in_memory().unwrap();
    let ids = names
        .iter()
        .map(|n| store.add_category(BUDGET, n).unwrap().id)
        .collect();
    (SuggestionService::new(store).with_clock(fixed_now), ids)
}

#[test]
fn test_learn_suggest_and_reject_end_to_end() {
    let (svc, ids) = seeded(&["Groceries", "Dining", "Coffee"]);
    let (groceries, dining) = (ids[0], ids[1]);

    svc.learn_from_transaction(USER, groceries, "Grocery shopping at Walmart", None).unwrap();
    svc.learn_from_transaction(USER, groceries, "Grocery shopping at Walmart", None).unwrap();

    let out = svc
        .get_suggestions(&SuggestionRequest::new(scope(), "Walmart groceries"))
        .unwrap();
    assert_eq!(out.len(), 3);
    assert_eq!(out[0].category_id, groceries);
    assert_eq!(out[0].reason, SuggestionReason::KeywordMatch);
    assert!((out[0].confidence - 0.48).abs() < 1e-9);
    assert!(out[1..].iter().all(|s| s.reason == SuggestionReason::FrequentlyUsed));

    let feedback = SuggestionFeedback {
        user_id: USER,
        suggested_category_id: groceries,
        actual_category_id: dining,
        pattern_text: "Grocery shopping at Walmart".to_string(),
        transaction_id: Some(77),
    };
    let (log, outcome) = svc.apply_feedback(&feedback).unwrap();
    assert!(!log.was_accepted);
    assert_eq!(log.transaction_id, Some(77));
    assert_eq!(
        outcome,
        LearnOutcome::Redirected { from_category_id: groceries, usage_count: 3 }
    );

    let stored = svc
        .store()
        .find_pattern(USER, "grocery shopping at walmart")
        .unwrap()
        .unwrap();
    assert_eq!(stored.category_id, dining);
    assert_eq!(stored.confidence_score, 0.5);

    let stats = svc.get_suggestion_stats(USER, 30).unwrap();
    assert_eq!((stats.total_suggestions, stats.accepted, stats.rejected), (1, 0, 1));
}

#[test]
fn test_deactivated_category_patterns_are_hidden_not_deleted() {
    let (svc, ids) = seeded(&["Gym", "Health"]);
    svc.learn_from_transaction(USER, ids[0], "Planet Fitness", None).unwrap();

    assert!(svc.store().deactivate_category(ids[0]).unwrap());

    let out = svc
        .get_suggestions(&SuggestionRequest::new(scope(), "planet fitness"))
        .unwrap();
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].category_id, ids[1]);
    assert_eq!(out[0].reason, SuggestionReason::FrequentlyUsed);
    assert!(svc.store().find_pattern(USER, "planet fitness").unwrap().is_some());
}

#[test]
fn test_underscore_keyword_is_matched_literally() {
    let (svc, ids) = seeded(&["Wildcard"]);
    svc.learn_from_transaction(USER, ids[0], "abcxdef", None).unwrap();

    let hits = svc.store().patterns_containing(scope(), "c_d").unwrap();
    assert!(hits.is_empty());
    let hits = svc.store().patterns_containing(scope(), "cxd").unwrap();
    assert_eq!(hits.len(), 1);
}

#[test]
fn test_similar_amounts_skip_split_transactions() {
    let (svc, ids) = seeded(&["Fuel", "Snacks"]);
    let date = NaiveDate::from_ymd_opt(2026, 4, 20).unwrap();
    for (category_id, amount, is_split) in [
        (ids[0], 4_000, false),
        (ids[0], 4_700, false),
        (ids[1], 4_100, true),
        (ids[1], 9_000, false),
    ] {
        svc.store()
            .add_transaction(NewTransaction {
                user_id: USER,
                budget_id: BUDGET,
                category_id,
                amount_cents: amount,
                date,
                notes: None,
                is_split,
            })
            .unwrap();
    }

    let counts = svc.store().similar_amount_counts(scope(), 3_200, 4_800).unwrap();
    assert_eq!(counts.len(), 1);
    assert_eq!(counts[0].category.id, ids[0]);
    assert_eq!(counts[0].count, 2);

    let usage = svc.store().category_usage(scope()).unwrap();
    assert_eq!(usage.iter().map(|c| c.count).collect::<Vec<_>>(), vec![2, 2]);
    let other_user = svc.store().category_usage(BudgetScope::new(9, BUDGET)).unwrap();
    assert!(other_user.iter().all(|c| c.count == 0));
}

#[test]
fn test_history_import_into_sqlite() {
    let (svc, ids) = seeded(&["Groceries", "Coffee"]);
    let csv = format!(
        "date,notes,amount_cents,category_id\n\
         2026-01-03,Weekly Safeway run,8200,{g}\n\
         2026-01-10,Weekly Safeway run,7600,{g}\n\
         2026-01-11,Blue Bottle,650,{c}\n\
         2026-01-12,,900,{c}\n",
        g = ids[0],
        c = ids[1]
    );
    let rows = parse_history(csv.as_bytes()).unwrap();

    let summary = import_history(svc.store(), &svc.learner(), scope(), &rows).unwrap();
    assert_eq!(summary.imported, 4);
    assert_eq!(summary.patterns_created, 2);
    assert_eq!(summary.patterns_reinforced, 1);
    assert_eq!(summary.without_notes, 1);
    assert_eq!(svc.store().list_transactions(USER, 10).unwrap().len(), 4);

    let out = svc
        .get_suggestions(&SuggestionRequest::new(scope(), "weekly safeway run").with_limit(1))
        .unwrap();
    assert_eq!(out[0].reason, SuggestionReason::ExactMatch);
    assert_eq!(out[0].usage_count, 2);
}

#[test]
fn test_concurrent_learners_never_lose_an_increment() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tally.db");
    let category_id = SqliteStore::open_at(&path)
        .unwrap()
        .add_category(BUDGET, "Coffee")
        .unwrap()
        .id;

    const THREADS: usize = 4;
    const ROUNDS: usize = 25;

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let path = path.clone();
            thread::spawn(move || {
                // one connection per thread, like separate processes sharing the file
                let svc = SuggestionService::new(SqliteStore::open_at(&path).unwrap());
                for _ in 0..ROUNDS {
                    svc.learn_from_transaction(USER, category_id, "Morning latte", None)
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let pattern = SqliteStore::open_at(&path)
        .unwrap()
        .find_pattern(USER, "morning latte")
        .unwrap()
        .unwrap();
    assert_eq!(pattern.usage_count as usize, THREADS * ROUNDS);
    assert_eq!(pattern.confidence_score, 1.0);
}
