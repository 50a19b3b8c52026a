//! Feature + probability → 0..100 score.
//!
//! Two calculators:
//!   - `score_from_probabilities`: the model path. Interpolates the class
//!     probabilities over their anchors (0 / 50 / 100) and adds bonuses.
//!   - `fallback_score`: the rule-based path used when the model is
//!     unavailable. Starts at 50 and adds per-factor bonuses.
//!
//! Bonus bands never stack within a factor: only the highest band that
//! matches is applied.

use crate::{
    features::FeatureVector,
    model::ClassProbabilities,
    synthetic::CreditClass,
    types::{Score, MAX_SCORE, MIN_SCORE},
};
use serde::{Deserialize, Serialize};

/// Which calculator produced a score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreMethod {
    Model,
    Fallback,
}

/// (exclusive lower bound, bonus), highest band first.
type Bands = &'static [(u64, u32)];

// Model-path bonuses.
const MODEL_TX_BANDS: Bands = &[(100, 5), (50, 2)];
const MODEL_DEFI_BANDS: Bands = &[(10, 5), (5, 3)];
const MODEL_AGE_BANDS: Bands = &[(365, 5), (180, 3)];

// Fallback bonuses.
const FALLBACK_BASE: u32 = 50;
const FALLBACK_TX_BANDS: Bands = &[(100, 15), (50, 10), (20, 5)];
const FALLBACK_AGE_BANDS: Bands = &[(365, 10), (180, 5)];
const FALLBACK_DEFI_BANDS: Bands = &[(10, 10), (5, 5)];
const FALLBACK_COUNTERPARTY_BANDS: Bands = &[(50, 10), (20, 5)];

/// Bonus of the highest band whose threshold `value` exceeds.
fn band_bonus(value: u64, bands: Bands) -> u32 {
    bands
        .iter()
        .find(|(threshold, _)| value > *threshold)
        .map_or(0, |(_, bonus)| *bonus)
}

pub fn model_bonus(features: &FeatureVector) -> u32 {
    band_bonus(features.transaction_count, MODEL_TX_BANDS)
        + band_bonus(features.defi_interactions, MODEL_DEFI_BANDS)
        + band_bonus(features.wallet_age_days, MODEL_AGE_BANDS)
}

/// Model-path score. Clamped to [0, 100] then truncated (not rounded).
pub fn score_from_probabilities(
    probabilities: &ClassProbabilities,
    features: &FeatureVector,
) -> Score {
    let base: f64 = CreditClass::ALL
        .iter()
        .map(|&c| probabilities.get(c) * c.anchor())
        .sum();
    let raw = base + f64::from(model_bonus(features));
    if raw.is_nan() {
        return MIN_SCORE;
    }
    raw.clamp(f64::from(MIN_SCORE), f64::from(MAX_SCORE)).trunc() as Score
}

/// Rule-based score. Independent of the model and always available.
pub fn fallback_score(features: &FeatureVector) -> Score {
    let score = FALLBACK_BASE
        + band_bonus(features.transaction_count, FALLBACK_TX_BANDS)
        + band_bonus(features.wallet_age_days, FALLBACK_AGE_BANDS)
        + band_bonus(features.defi_interactions, FALLBACK_DEFI_BANDS)
        + band_bonus(features.unique_counterparties, FALLBACK_COUNTERPARTY_BANDS);
    score.min(MAX_SCORE)
}
