//! Score calculator and fallback calculator behaviour.

use sente_core::{
    features::FeatureVector,
    model::ClassProbabilities,
    scoring::{fallback_score, model_bonus, score_from_probabilities},
    synthetic,
};

fn sample_wallet() -> FeatureVector {
    FeatureVector {
        transaction_count: 150,
        avg_transaction_value: 0.5,
        total_volume: 75.0,
        unique_counterparties: 80,
        wallet_age_days: 400,
        defi_interactions: 15,
        nft_holdings: 8,
    }
}

// ── Model path ───────────────────────────────────────────────────────────────

/// base = p_medium * 50 + p_good * 100, no bonuses for an empty wallet.
#[test]
fn probabilities_interpolate_over_anchors() {
    let empty = FeatureVector::default();
    assert_eq!(score_from_probabilities(&ClassProbabilities([1.0, 0.0, 0.0]), &empty), 0);
    assert_eq!(score_from_probabilities(&ClassProbabilities([0.0, 1.0, 0.0]), &empty), 50);
    assert_eq!(score_from_probabilities(&ClassProbabilities([0.0, 0.0, 1.0]), &empty), 100);
    assert_eq!(score_from_probabilities(&ClassProbabilities([0.2, 0.5, 0.3]), &empty), 55);
}

/// Fractions are truncated, not rounded.
#[test]
fn model_score_truncates() {
    let empty = FeatureVector::default();
    // 0.399 * 50 + 0.6 * 100 = 79.95
    let p = ClassProbabilities([0.001, 0.399, 0.6]);
    assert_eq!(score_from_probabilities(&p, &empty), 79);
}

/// Maximum bonus (15) on top of a near-perfect base clamps at 100.
#[test]
fn model_score_clamps_at_100() {
    let p = ClassProbabilities([0.0, 0.02, 0.98]);
    assert_eq!(model_bonus(&sample_wallet()), 15);
    assert_eq!(score_from_probabilities(&p, &sample_wallet()), 100);
}

/// Each factor contributes only its highest matching band.
#[test]
fn model_bonuses_do_not_stack() {
    let p = ClassProbabilities([1.0, 0.0, 0.0]);
    let mid = FeatureVector {
        transaction_count: 75,
        wallet_age_days: 200,
        defi_interactions: 7,
        ..Default::default()
    };
    // 2 + 3 + 3, not 2+5 / 3+5 / 3+5
    assert_eq!(score_from_probabilities(&p, &mid), 8);

    let edges = FeatureVector {
        transaction_count: 100,
        wallet_age_days: 365,
        defi_interactions: 10,
        ..Default::default()
    };
    // Thresholds are strict: 100 tx is not > 100.
    assert_eq!(score_from_probabilities(&p, &edges), 2 + 3 + 3);
}

// ── Fallback path ────────────────────────────────────────────────────────────

/// 50 + 15 (tx > 100) + 10 (age > 365) + 10 (defi > 10) + 10 (counterparties > 50).
#[test]
fn fallback_sample_wallet_counts_every_factor() {
    assert_eq!(fallback_score(&sample_wallet()), 95);
}

/// Without the counterparty bonus the same wallet lands on 85.
#[test]
fn fallback_reference_wallet_scores_85() {
    let wallet = FeatureVector { unique_counterparties: 20, ..sample_wallet() };
    assert_eq!(fallback_score(&wallet), 85);

    let wallet = FeatureVector { unique_counterparties: 50, ..sample_wallet() };
    assert_eq!(fallback_score(&wallet), 90);
}

/// Every factor at its top band: 50 + 15 + 10 + 10 + 10 = 95, under the cap.
#[test]
fn fallback_never_exceeds_100() {
    let maxed = FeatureVector {
        transaction_count: u64::MAX,
        wallet_age_days: u64::MAX,
        defi_interactions: u64::MAX,
        unique_counterparties: u64::MAX,
        ..Default::default()
    };
    assert!(fallback_score(&maxed) <= 100);
}

#[test]
fn fallback_empty_wallet_is_base_score() {
    assert_eq!(fallback_score(&FeatureVector::default()), 50);
}

#[test]
fn fallback_bands_do_not_stack() {
    let wallet = FeatureVector {
        transaction_count: 60,     // +10
        wallet_age_days: 200,      // +5
        defi_interactions: 6,      // +5
        unique_counterparties: 21, // +5
        ..Default::default()
    };
    assert_eq!(fallback_score(&wallet), 75);

    let low = FeatureVector { transaction_count: 21, ..Default::default() };
    assert_eq!(fallback_score(&low), 55);
}

/// Both calculators stay within [0, 100] for every synthetic wallet.
#[test]
fn scores_stay_in_range_for_synthetic_wallets() {
    let (features, _) = synthetic::generate(500, 7);
    let probability_grid = [
        [1.0, 0.0, 0.0],
        [0.0, 1.0, 0.0],
        [0.0, 0.0, 1.0],
        [0.1, 0.1, 0.8],
    ];
    for fv in &features {
        let fb = fallback_score(fv);
        assert!((0..=100).contains(&fb), "fallback out of range: {fb}");
        for p in probability_grid {
            let s = score_from_probabilities(&ClassProbabilities(p), fv);
            assert!((0..=100).contains(&s), "model score out of range: {s}");
        }
    }
}
