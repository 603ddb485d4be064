use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use proptest::prelude::*;
use tally_core::{BudgetCategory, BudgetScope, NewTransaction, SuggestionReason};
use tally_suggest::{
    LearnOutcome, MemoryStore, SuggestionFeedback, SuggestionRequest, SuggestionService,
};

const USER: i64 = 1;
const BUDGET: i64 = 42;

fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, 1, 8, 30, 0).unwrap()
}

fn service(categories: &[(i64, &str)]) -> SuggestionService<MemoryStore> {
    let store = MemoryStore::new();
    for (i, (id, name)) in categories.iter().enumerate() {
        let mut cat = BudgetCategory::new(*id, BUDGET, *name);
        cat.sort_order = i as i32;
        store.add_category(cat).unwrap();
    }
    SuggestionService::new(store).with_clock(fixed_now)
}

fn scope() -> BudgetScope {
    BudgetScope::new(USER, BUDGET)
}

fn feedback(suggested: i64, actual: i64, text: &str) -> SuggestionFeedback {
    SuggestionFeedback {
        user_id: USER,
        suggested_category_id: suggested,
        actual_category_id: actual,
        pattern_text: text.to_string(),
        transaction_id: None,
    }
}

/// Learning the same notes twice reinforces; a differently-worded note then
/// finds the category through keyword overlap.
#[test]
fn test_walmart_scenario() {
    let svc = service(&[(10, "Groceries"), (11, "Dining")]);

    let first = svc.learn_from_transaction(USER, 10, "Grocery shopping at Walmart", Some(1)).unwrap();
    let second = svc.learn_from_transaction(USER, 10, "Grocery shopping at Walmart", Some(2)).unwrap();
    assert_eq!(first, LearnOutcome::Created { confidence: 0.7 });
    assert_eq!(second, LearnOutcome::Reinforced { confidence: 0.8, usage_count: 2 });

    let req = SuggestionRequest::new(scope(), "Walmart groceries");
    let out = svc.get_suggestions(&req).unwrap();

    assert_eq!(out[0].category_id, 10);
    assert_eq!(out[0].category_name, "Groceries");
    assert_eq!(out[0].reason, SuggestionReason::KeywordMatch);
    assert!((out[0].confidence - 0.8 * 1.2 / 2.0).abs() < 1e-9);
    // Dining comes from the popularity fallback
    assert_eq!(out[1].category_id, 11);
    assert_eq!(out[1].reason, SuggestionReason::FrequentlyUsed);
}

#[test]
fn test_exact_match_after_learning() {
    let svc = service(&[(10, "Groceries")]);
    svc.learn_from_transaction(USER, 10, "Trader Joe's", None).unwrap();

    let out = svc
        .get_suggestions(&SuggestionRequest::new(scope(), "trader  JOE'S!").with_limit(1))
        .unwrap();
    assert_eq!(out[0].reason, SuggestionReason::ExactMatch);
    assert_eq!(out[0].confidence, 0.7);
    assert_eq!(out[0].usage_count, 1);
}

#[test]
fn test_rejected_feedback_penalizes_suggested_pattern() {
    let svc = service(&[(5, "Coffee"), (7, "Dining")]);
    svc.learn_from_transaction(USER, 5, "Blue Bottle", None).unwrap();

    let log = svc.log_suggestion_feedback(&feedback(5, 7, "Blue Bottle")).unwrap();
    assert!(!log.was_accepted);
    assert_eq!(log.pattern_text, "blue bottle");
    assert_eq!(log.created_at, fixed_now());

    let pattern = svc.store().find_pattern(USER, "blue bottle").unwrap().unwrap();
    assert_eq!(pattern.category_id, 5);
    assert_eq!(pattern.confidence_score, 0.5);
    assert_eq!(svc.store().logs().unwrap().len(), 1);
}

#[test]
fn test_rejection_without_matching_pattern_only_logs() {
    let svc = service(&[(5, "Coffee"), (7, "Dining")]);
    svc.learn_from_transaction(USER, 7, "Blue Bottle", None).unwrap();

    // The pattern points at 7, not the suggested 5, so it is untouched.
    svc.log_suggestion_feedback(&feedback(5, 7, "Blue Bottle")).unwrap();
    let pattern = svc.store().find_pattern(USER, "blue bottle").unwrap().unwrap();
    assert_eq!(pattern.confidence_score, 0.7);
}

#[test]
fn test_accepted_feedback_does_not_touch_confidence() {
    let svc = service(&[(5, "Coffee")]);
    svc.learn_from_transaction(USER, 5, "Blue Bottle", None).unwrap();

    let log = svc.log_suggestion_feedback(&feedback(5, 5, "Blue Bottle")).unwrap();
    assert!(log.was_accepted);
    let pattern = svc.store().find_pattern(USER, "blue bottle").unwrap().unwrap();
    assert_eq!(pattern.confidence_score, 0.7);
}

#[test]
fn test_apply_feedback_redirects_pattern() {
    let svc = service(&[(5, "Coffee"), (7, "Dining")]);
    svc.learn_from_transaction(USER, 5, "Corner cafe", None).unwrap();
    svc.learn_from_transaction(USER, 5, "Corner cafe", None).unwrap();

    let (log, outcome) = svc.apply_feedback(&feedback(5, 7, "Corner cafe")).unwrap();
    assert!(!log.was_accepted);
    assert_eq!(outcome, LearnOutcome::Redirected { from_category_id: 5, usage_count: 3 });

    let pattern = svc.store().find_pattern(USER, "corner cafe").unwrap().unwrap();
    assert_eq!(pattern.category_id, 7);
    assert_eq!(pattern.confidence_score, 0.5);

    let out = svc
        .get_suggestions(&SuggestionRequest::new(scope(), "corner cafe").with_limit(1))
        .unwrap();
    assert_eq!(out[0].category_id, 7);
    assert_eq!(out[0].reason, SuggestionReason::ExactMatch);

    let stats = svc.get_suggestion_stats(USER, 30).unwrap();
    assert_eq!(stats.total_suggestions, 1);
    assert_eq!(stats.rejected, 1);
    assert_eq!(stats.accuracy, 0.0);
}

#[test]
fn test_empty_notes_learns_nothing() {
    let svc = service(&[(5, "Coffee")]);
    assert_eq!(svc.learn_from_transaction(USER, 5, " ?! ", None).unwrap(), LearnOutcome::Skipped);
    assert!(svc.recent_patterns(USER, 10).unwrap().is_empty());
}

#[test]
fn test_patterns_are_user_scoped() {
    let svc = service(&[(5, "Coffee"), (7, "Dining")]);
    svc.learn_from_transaction(2, 7, "Corner cafe", None).unwrap();

    let out = svc
        .get_suggestions(&SuggestionRequest::new(scope(), "corner cafe").with_limit(1))
        .unwrap();
    assert_eq!(out[0].reason, SuggestionReason::FrequentlyUsed);
    assert_eq!(out[0].category_id, 5);
}

#[test]
fn test_amount_stage_follows_keyword_stage() {
    let svc = service(&[(1, "Gas"), (2, "Coffee"), (3, "Fun")]);
    svc.learn_from_transaction(USER, 2, "morning latte", None).unwrap();
    for amount in [4_100, 3_900] {
        svc.store()
            .add_transaction(NewTransaction {
                user_id: USER,
                budget_id: BUDGET,
                category_id: 1,
                amount_cents: amount,
                date: NaiveDate::from_ymd_opt(2026, 4, 2).unwrap(),
                notes: None,
                is_split: false,
            })
            .unwrap();
    }

    let req = SuggestionRequest::new(scope(), "latte").with_amount(Some(4_000));
    let out = svc.get_suggestions(&req).unwrap();
    let reasons: Vec<SuggestionReason> = out.iter().map(|s| s.reason).collect();
    assert_eq!(
        reasons,
        vec![
            SuggestionReason::KeywordMatch,
            SuggestionReason::SimilarAmount,
            SuggestionReason::FrequentlyUsed
        ]
    );
    assert_eq!(out.iter().map(|s| s.category_id).collect::<Vec<_>>(), vec![2, 1, 3]);
}

proptest! {
    #[test]
    fn prop_reinforcement_never_exceeds_ceiling(times in 1usize..30) {
        let svc = service(&[(1, "Rent")]);
        for _ in 0..times {
            svc.learn_from_transaction(USER, 1, "monthly rent", None).unwrap();
        }
        let p = svc.store().find_pattern(USER, "monthly rent").unwrap().unwrap();
        prop_assert!(p.confidence_score <= 1.0);
        prop_assert!(p.confidence_score >= 0.7);
        prop_assert_eq!(p.usage_count as usize, times);
    }

    #[test]
    fn prop_rejections_never_drop_below_floor(rejections in 1usize..20) {
        let svc = service(&[(1, "Rent"), (2, "Utilities")]);
        svc.learn_from_transaction(USER, 1, "city water", None).unwrap();
        for _ in 0..rejections {
            svc.log_suggestion_feedback(&feedback(1, 2, "city water")).unwrap();
        }
        let p = svc.store().find_pattern(USER, "city water").unwrap().unwrap();
        prop_assert!(p.confidence_score >= 0.1);
        prop_assert!(p.confidence_score <= 1.0);
    }

    #[test]
    fn prop_redirect_always_resets_to_half(reinforce in 0usize..12, rejections in 0usize..6) {
        let svc = service(&[(1, "Rent"), (2, "Utilities")]);
        for _ in 0..=reinforce {
            svc.learn_from_transaction(USER, 1, "city water", None).unwrap();
        }
        for _ in 0..rejections {
            svc.log_suggestion_feedback(&feedback(1, 2, "city water")).unwrap();
        }
        svc.learn_from_transaction(USER, 2, "city water", None).unwrap();
        let p = svc.store().find_pattern(USER, "city water").unwrap().unwrap();
        prop_assert_eq!(p.category_id, 2);
        prop_assert_eq!(p.confidence_score, 0.5);
    }

    #[test]
    fn prop_suggestions_unique_and_within_limit(
        limit in 1usize..=10,
        notes in "[a-z ]{0,24}",
        amount in proptest::option::of(-20_000i64..20_000),
    ) {
        let svc = service(&[(1, "A"), (2, "B"), (3, "C"), (4, "D")]);
        svc.learn_from_transaction(USER, 1, "coffee shop", None).unwrap();
        svc.learn_from_transaction(USER, 2, "coffee beans", None).unwrap();
        svc.learn_from_transaction(USER, 3, "shop supplies", None).unwrap();

        let req = SuggestionRequest::new(scope(), notes).with_amount(amount).with_limit(limit);
        let out = svc.get_suggestions(&req).unwrap();
        prop_assert!(out.len() <= limit);
        let mut ids: Vec<i64> = out.iter().map(|s| s.category_id).collect();
        ids.sort();
        ids.dedup();
        prop_assert_eq!(ids.len(), out.len());
        prop_assert!(out.iter().all(|s| (0.0..=1.0).contains(&s.confidence)));
    }
}
