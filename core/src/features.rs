//! The wallet feature vector and its boundary conversion.
//!
//! RULE: The model, the score calculators and the synthetic generator
//! only ever see a validated FeatureVector. Loose input (JSON maps,
//! partially filled requests) is converted here and nowhere else.

use crate::error::{ScoreError, ScoreResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const FEATURE_COUNT: usize = 7;

/// Largest count the store can hold (SQLite INTEGER is a signed i64).
pub const MAX_COUNT: u64 = i64::MAX as u64;

/// Column order of `FeatureVector::to_array`. Never reorder: trained
/// artifacts depend on it.
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "transaction_count",
    "avg_transaction_value",
    "total_volume",
    "unique_counterparties",
    "wallet_age_days",
    "defi_interactions",
    "nft_holdings",
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureVector {
    pub transaction_count: u64,
    pub avg_transaction_value: f64,
    pub total_volume: f64,
    pub unique_counterparties: u64,
    pub wallet_age_days: u64,
    pub defi_interactions: u64,
    pub nft_holdings: u64,
}

impl FeatureVector {
    pub fn to_array(&self) -> [f64; FEATURE_COUNT] {
        [
            self.transaction_count as f64,
            self.avg_transaction_value,
            self.total_volume,
            self.unique_counterparties as f64,
            self.wallet_age_days as f64,
            self.defi_interactions as f64,
            self.nft_holdings as f64,
        ]
    }

    /// Fractional fields must be finite and non-negative; counts must
    /// fit in `MAX_COUNT`.
    pub fn validate(&self) -> ScoreResult<()> {
        for (field, value) in [
            ("avg_transaction_value", self.avg_transaction_value),
            ("total_volume", self.total_volume),
        ] {
            check_amount(field, value)?;
        }
        for (field, value) in self.counts() {
            if value > MAX_COUNT {
                return Err(ScoreError::malformed(
                    field,
                    format!("must be <= {MAX_COUNT}, got {value}"),
                ));
            }
        }
        Ok(())
    }

    fn counts(&self) -> [(&'static str, u64); 5] {
        [
            ("transaction_count", self.transaction_count),
            ("unique_counterparties", self.unique_counterparties),
            ("wallet_age_days", self.wallet_age_days),
            ("defi_interactions", self.defi_interactions),
            ("nft_holdings", self.nft_holdings),
        ]
    }

    /// Build a vector from a loosely typed JSON object.
    /// Missing or null fields default to 0; unknown keys are ignored.
    pub fn from_map(map: &Map<String, Value>) -> ScoreResult<Self> {
        Ok(Self {
            transaction_count: count_field(map, "transaction_count")?,
            avg_transaction_value: amount_field(map, "avg_transaction_value")?,
            total_volume: amount_field(map, "total_volume")?,
            unique_counterparties: count_field(map, "unique_counterparties")?,
            wallet_age_days: count_field(map, "wallet_age_days")?,
            defi_interactions: count_field(map, "defi_interactions")?,
            nft_holdings: count_field(map, "nft_holdings")?,
        })
    }
}

/// Supplies features for a wallet when the caller has none to hand.
pub trait FeatureSource {
    fn features_for(&self, wallet_id: &str) -> FeatureVector;
}

fn number_field(map: &Map<String, Value>, field: &str) -> ScoreResult<Option<f64>> {
    match map.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_f64()
            .map(Some)
            .ok_or_else(|| ScoreError::malformed(field, "not representable as a number")),
        Some(other) => Err(ScoreError::malformed(
            field,
            format!("expected a number, got {other}"),
        )),
    }
}

fn check_amount(field: &str, value: f64) -> ScoreResult<f64> {
    if !value.is_finite() {
        return Err(ScoreError::malformed(field, "must be finite"));
    }
    if value < 0.0 {
        return Err(ScoreError::malformed(field, format!("must be >= 0, got {value}")));
    }
    Ok(value)
}

fn amount_field(map: &Map<String, Value>, field: &str) -> ScoreResult<f64> {
    match number_field(map, field)? {
        Some(v) => check_amount(field, v),
        None => Ok(0.0),
    }
}

fn count_field(map: &Map<String, Value>, field: &str) -> ScoreResult<u64> {
    let Some(v) = number_field(map, field)? else {
        return Ok(0);
    };
    let v = check_amount(field, v)?;
    if v.fract() != 0.0 {
        return Err(ScoreError::malformed(field, format!("must be a whole number, got {v}")));
    }
    // i64::MAX rounds up to 2^63 as f64, so anything at or above it is too large.
    if v >= MAX_COUNT as f64 {
        return Err(ScoreError::malformed(field, format!("must be <= {MAX_COUNT}, got {v}")));
    }
    Ok(v as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn missing_fields_default_to_zero() {
        let fv = FeatureVector::from_map(&map(json!({ "transaction_count": 12 }))).unwrap();
        assert_eq!(fv.transaction_count, 12);
        assert_eq!(fv.total_volume, 0.0);
        assert_eq!(fv.nft_holdings, 0);
    }

    #[test]
    fn null_is_treated_as_missing() {
        let fv = FeatureVector::from_map(&map(json!({ "wallet_age_days": null }))).unwrap();
        assert_eq!(fv.wallet_age_days, 0);
    }

    #[test]
    fn negative_values_rejected() {
        let err = FeatureVector::from_map(&map(json!({ "total_volume": -1.5 }))).unwrap_err();
        assert!(matches!(
            err,
            ScoreError::MalformedFeatureVector { ref field, .. } if field == "total_volume"
        ));
    }

    #[test]
    fn non_numeric_values_rejected() {
        let err =
            FeatureVector::from_map(&map(json!({ "defi_interactions": "lots" }))).unwrap_err();
        assert!(matches!(err, ScoreError::MalformedFeatureVector { .. }));
    }

    #[test]
    fn fractional_counts_rejected() {
        let err = FeatureVector::from_map(&map(json!({ "nft_holdings": 2.5 }))).unwrap_err();
        assert!(matches!(err, ScoreError::MalformedFeatureVector { .. }));
    }

    #[test]
    fn oversized_counts_rejected() {
        let err = FeatureVector::from_map(&map(json!({ "transaction_count": 1e19 }))).unwrap_err();
        assert!(matches!(
            err,
            ScoreError::MalformedFeatureVector { ref field, .. } if field == "transaction_count"
        ));

        let fv = FeatureVector { nft_holdings: u64::MAX, ..Default::default() };
        assert!(fv.validate().is_err());
        let fv = FeatureVector { nft_holdings: MAX_COUNT, ..Default::default() };
        assert!(fv.validate().is_ok());
    }

    #[test]
    fn validate_catches_nan() {
        let fv = FeatureVector { avg_transaction_value: f64::NAN, ..Default::default() };
        assert!(fv.validate().is_err());
    }

    #[test]
    fn array_order_matches_names() {
        let fv = FeatureVector {
            transaction_count: 1,
            avg_transaction_value: 2.0,
            total_volume: 3.0,
            unique_counterparties: 4,
            wallet_age_days: 5,
            defi_interactions: 6,
            nft_holdings: 7,
        };
        assert_eq!(fv.to_array(), [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]);
        assert_eq!(FEATURE_NAMES[4], "wallet_age_days");
    }
}
