//! The scoring engine: the boundary callers talk to.
//!
//! FLOW (score_wallet):
//!   1. Normalise the wallet id and pick features (supplied or sourced).
//!   2. Validate features. Malformed input goes back to the caller.
//!   3. Ask the model for class probabilities. Any model failure is
//!      logged and the fallback calculator is used instead.
//!   4. Derive loan terms, build the message and the history entry.
//!
//! The engine never stores anything. Callers persist the report.

use crate::{
    config::TrainingConfig,
    error::ScoreResult,
    features::{FeatureSource, FeatureVector},
    ledger::{self, LoanEvent, ScoreHistoryEntry, ScoreTransition},
    model::{ModelHandle, TrainingReport},
    scoring::{fallback_score, score_from_probabilities, ScoreMethod},
    synthetic,
    terms::{derive_terms, CreditTier, LoanTerms, MIN_ELIGIBLE_SCORE},
    types::{normalize_wallet, Score, WalletId},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Score plus the loan terms it earns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreSummary {
    pub wallet_id: WalletId,
    pub score: Score,
    pub tier: CreditTier,
    pub eligible_for_loan: bool,
    pub max_loan_amount: f64,
    pub interest_rate: f64,
    pub message: String,
}

impl ScoreSummary {
    fn new(wallet_id: WalletId, score: Score, message: String) -> Self {
        let LoanTerms { tier, eligible, max_loan_amount, interest_rate } = derive_terms(score);
        Self {
            wallet_id,
            score,
            tier,
            eligible_for_loan: eligible,
            max_loan_amount,
            interest_rate,
            message,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreReport {
    #[serde(flatten)]
    pub summary: ScoreSummary,
    pub method: ScoreMethod,
    pub features: FeatureVector,
    pub history: ScoreHistoryEntry,
}

pub struct ScoringEngine {
    model: Arc<ModelHandle>,
}

impl ScoringEngine {
    pub fn new(model: Arc<ModelHandle>) -> Self {
        Self { model }
    }

    pub fn model(&self) -> &Arc<ModelHandle> {
        &self.model
    }

    /// Score a wallet. `features` wins over `source` when both are present.
    pub fn score_wallet(
        &self,
        wallet_id: &str,
        features: Option<FeatureVector>,
        source: &dyn FeatureSource,
    ) -> ScoreResult<ScoreReport> {
        let wallet_id = normalize_wallet(wallet_id);
        let features = features.unwrap_or_else(|| source.features_for(&wallet_id));
        features.validate()?;

        let (score, method) = self.compute_score(&wallet_id, &features);
        let terms = derive_terms(score);
        let message = if terms.eligible {
            format!(
                "Congratulations! You have {} tier credit and are eligible for loans up to ${} USDC",
                terms.tier,
                format_usdc(terms.max_loan_amount)
            )
        } else {
            format!(
                "Your current score is {score}/100. Build your credit history to become \
                 eligible for loans (minimum score: {MIN_ELIGIBLE_SCORE})"
            )
        };

        let history = ledger::apply_rescore(&wallet_id, None, score, Utc::now()).entry;
        log::debug!("{wallet_id} scored {score} via {method:?} ({})", terms.tier);

        Ok(ScoreReport {
            summary: ScoreSummary::new(wallet_id, score, message),
            method,
            features,
            history,
        })
    }

    /// Model score when possible, fallback score otherwise.
    fn compute_score(&self, wallet_id: &str, features: &FeatureVector) -> (Score, ScoreMethod) {
        match self.model.predict(features) {
            Ok(probabilities) => (
                score_from_probabilities(&probabilities, features),
                ScoreMethod::Model,
            ),
            Err(e) => {
                if e.is_model_failure() {
                    log::warn!("{wallet_id}: model unavailable ({e}), using fallback score");
                } else {
                    log::error!("{wallet_id}: unexpected model error ({e}), using fallback score");
                }
                (fallback_score(features), ScoreMethod::Fallback)
            }
        }
    }

    /// Terms for a score that was computed earlier.
    pub fn describe_existing(&self, wallet_id: &str, score: Score) -> ScoreSummary {
        let tier = CreditTier::from_score(score);
        ScoreSummary::new(
            normalize_wallet(wallet_id),
            score,
            format!("Your current SenteScore is {score}/100 ({tier} tier)"),
        )
    }

    pub fn apply_loan_event(
        &self,
        wallet_id: &str,
        current_score: Score,
        event: LoanEvent,
    ) -> ScoreTransition {
        ledger::apply_loan_event(wallet_id, current_score, event, Utc::now())
    }

    /// Generate the synthetic training set and retrain the shared model.
    pub fn train_synthetic(&self, config: &TrainingConfig) -> ScoreResult<TrainingReport> {
        let (features, labels) = synthetic::generate(config.n_samples, config.seed);
        self.model.train(&features, &labels, config)
    }
}

/// Whole USDC with thousands separators, e.g. 1000.0 -> "1,000".
pub fn format_usdc(amount: f64) -> String {
    let whole = amount.round().max(0.0) as u64;
    let digits = whole.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
