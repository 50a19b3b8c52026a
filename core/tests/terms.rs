//! Score → loan terms table.

use sente_core::{
    features::FeatureVector,
    scoring::fallback_score,
    terms::{derive_terms, interest_rate, max_loan_amount, CreditTier, MIN_ELIGIBLE_SCORE},
};

#[test]
fn tier_boundaries() {
    let cases = [
        (0, CreditTier::Unrated),
        (59, CreditTier::Unrated),
        (60, CreditTier::Bronze),
        (69, CreditTier::Bronze),
        (70, CreditTier::Silver),
        (79, CreditTier::Silver),
        (80, CreditTier::Gold),
        (89, CreditTier::Gold),
        (90, CreditTier::Platinum),
        (100, CreditTier::Platinum),
    ];
    for (score, tier) in cases {
        assert_eq!(derive_terms(score).tier, tier, "score {score}");
    }
}

#[test]
fn eligibility_starts_at_60() {
    assert!(!derive_terms(MIN_ELIGIBLE_SCORE - 1).eligible);
    assert!(derive_terms(MIN_ELIGIBLE_SCORE).eligible);
    assert!(derive_terms(100).eligible);
}

/// Rate bands sit one point above the tier bands.
#[test]
fn interest_rate_boundaries_are_offset() {
    assert_eq!(interest_rate(91), 5.0);
    assert_eq!(interest_rate(90), 6.0);
    assert_eq!(interest_rate(81), 6.0);
    assert_eq!(interest_rate(80), 8.0);
    assert_eq!(interest_rate(71), 8.0);
    assert_eq!(interest_rate(70), 10.0);
    assert_eq!(interest_rate(60), 10.0);
    assert_eq!(interest_rate(59), 15.0);
}

/// Exactly 90: Platinum cap, Gold rate.
#[test]
fn score_90_is_platinum_at_six_percent() {
    let t = derive_terms(90);
    assert_eq!(t.tier, CreditTier::Platinum);
    assert!(t.eligible);
    assert_eq!(t.max_loan_amount, 1000.0);
    assert_eq!(t.interest_rate, 6.0);
}

#[test]
fn unrated_terms() {
    let t = derive_terms(42);
    assert_eq!(t.tier, CreditTier::Unrated);
    assert!(!t.eligible);
    assert_eq!(t.max_loan_amount, 0.0);
    assert_eq!(t.interest_rate, 15.0);
}

/// Higher score never lowers the cap or raises the rate.
#[test]
fn terms_are_monotonic() {
    for s in 0..100 {
        assert!(max_loan_amount(s) <= max_loan_amount(s + 1), "cap drops at {s}");
        assert!(interest_rate(s) >= interest_rate(s + 1), "rate rises at {s}");
    }
}

/// Fallback 85 → Gold, eligible, 750 cap, 6% rate.
#[test]
fn fallback_85_wallet_gets_gold_terms() {
    let wallet = FeatureVector {
        transaction_count: 150,
        avg_transaction_value: 0.5,
        total_volume: 75.0,
        unique_counterparties: 20,
        wallet_age_days: 400,
        defi_interactions: 15,
        nft_holdings: 8,
    };
    let score = fallback_score(&wallet);
    assert_eq!(score, 85);
    let t = derive_terms(score);
    assert_eq!(t.tier, CreditTier::Gold);
    assert!(t.eligible);
    assert_eq!(t.max_loan_amount, 750.0);
    assert_eq!(t.interest_rate, 6.0);
}

#[test]
fn tier_labels() {
    assert_eq!(CreditTier::Platinum.to_string(), "Platinum");
    assert_eq!(CreditTier::Unrated.label(), "Unrated");
}
