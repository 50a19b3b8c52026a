//! Score → loan terms.
//!
//! The interest-rate bands start one point above the tier bands
//! (91 / 81 / 71 vs 90 / 80 / 70). A score of exactly 90 is Platinum
//! with a 1000 cap but a 6% rate.

use crate::types::Score;
use serde::{Deserialize, Serialize};

/// Minimum score for any loan.
pub const MIN_ELIGIBLE_SCORE: Score = 60;

/// User-facing tier. Not the model's internal class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CreditTier {
    Unrated,
    Bronze,
    Silver,
    Gold,
    Platinum,
}

impl CreditTier {
    pub fn from_score(score: Score) -> Self {
        match score {
            90.. => Self::Platinum,
            80..=89 => Self::Gold,
            70..=79 => Self::Silver,
            60..=69 => Self::Bronze,
            _ => Self::Unrated,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Unrated => "Unrated",
            Self::Bronze => "Bronze",
            Self::Silver => "Silver",
            Self::Gold => "Gold",
            Self::Platinum => "Platinum",
        }
    }
}

impl std::fmt::Display for CreditTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LoanTerms {
    pub tier: CreditTier,
    pub eligible: bool,
    /// USDC.
    pub max_loan_amount: f64,
    /// Percent.
    pub interest_rate: f64,
}

pub fn max_loan_amount(score: Score) -> f64 {
    match score {
        90.. => 1000.0,
        80..=89 => 750.0,
        70..=79 => 500.0,
        60..=69 => 250.0,
        _ => 0.0,
    }
}

pub fn interest_rate(score: Score) -> f64 {
    match score {
        91.. => 5.0,
        81..=90 => 6.0,
        71..=80 => 8.0,
        60..=70 => 10.0,
        _ => 15.0,
    }
}

/// Total: every score maps to terms.
pub fn derive_terms(score: Score) -> LoanTerms {
    LoanTerms {
        tier: CreditTier::from_score(score),
        eligible: score >= MIN_ELIGIBLE_SCORE,
        max_loan_amount: max_loan_amount(score),
        interest_rate: interest_rate(score),
    }
}
