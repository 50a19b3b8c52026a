//! Score history: transitions driven by rescoring and loan outcomes.
//!
//! RULES:
//!   - Repayment adds REPAYMENT_DELTA, capped at MAX_SCORE.
//!   - Default subtracts DEFAULT_PENALTY, floored at MIN_SCORE.
//!   - Rescoring overwrites the score outright.
//!   - Every transition yields exactly one history entry.
//!
//! Nothing here touches storage. The caller persists the new score and
//! the entry together, inside its own record-level transaction.

use crate::types::{normalize_wallet, Score, WalletId, MAX_SCORE, MIN_SCORE};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const REPAYMENT_DELTA: Score = 2;
pub const DEFAULT_PENALTY: Score = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreReason {
    Initial,
    AiUpdate,
    Repayment,
    Default,
}

impl ScoreReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initial => "initial",
            Self::AiUpdate => "ai_update",
            Self::Repayment => "repayment",
            Self::Default => "default",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "initial" => Some(Self::Initial),
            "ai_update" => Some(Self::AiUpdate),
            "repayment" => Some(Self::Repayment),
            "default" => Some(Self::Default),
            _ => None,
        }
    }
}

/// Loan lifecycle outcomes that move a score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoanEvent {
    Repaid,
    Defaulted,
}

impl LoanEvent {
    pub fn reason(&self) -> ScoreReason {
        match self {
            Self::Repaid => ScoreReason::Repayment,
            Self::Defaulted => ScoreReason::Default,
        }
    }
}

/// Immutable audit record. One per score-affecting event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreHistoryEntry {
    pub wallet_id: WalletId,
    pub score: Score,
    pub reason: ScoreReason,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreTransition {
    pub previous: Option<Score>,
    pub score: Score,
    pub entry: ScoreHistoryEntry,
}

impl ScoreTransition {
    pub fn delta(&self) -> i64 {
        i64::from(self.score) - i64::from(self.previous.unwrap_or(self.score))
    }
}

pub fn on_repayment(current: Score) -> Score {
    current.saturating_add(REPAYMENT_DELTA).min(MAX_SCORE)
}

pub fn on_default(current: Score) -> Score {
    current.min(MAX_SCORE).saturating_sub(DEFAULT_PENALTY).max(MIN_SCORE)
}

pub fn on_rescore(new_score: Score) -> Score {
    new_score.min(MAX_SCORE)
}

fn transition(
    wallet_id: &str,
    previous: Option<Score>,
    score: Score,
    reason: ScoreReason,
    at: DateTime<Utc>,
) -> ScoreTransition {
    let entry = ScoreHistoryEntry {
        wallet_id: normalize_wallet(wallet_id),
        score,
        reason,
        timestamp: at,
    };
    log::debug!(
        "{} score {:?} -> {score} ({})",
        entry.wallet_id,
        previous,
        reason.as_str()
    );
    ScoreTransition { previous, score, entry }
}

/// Apply a loan outcome to a wallet's current score.
pub fn apply_loan_event(
    wallet_id: &str,
    current: Score,
    event: LoanEvent,
    at: DateTime<Utc>,
) -> ScoreTransition {
    let score = match event {
        LoanEvent::Repaid => on_repayment(current),
        LoanEvent::Defaulted => on_default(current),
    };
    transition(wallet_id, Some(current), score, event.reason(), at)
}

/// Full recompute. `previous` is None for a wallet's first score.
pub fn apply_rescore(
    wallet_id: &str,
    previous: Option<Score>,
    new_score: Score,
    at: DateTime<Utc>,
) -> ScoreTransition {
    transition(wallet_id, previous, on_rescore(new_score), ScoreReason::AiUpdate, at)
}

/// Baseline entry for a wallet created without a computed score.
pub fn initial_entry(wallet_id: &str, score: Score, at: DateTime<Utc>) -> ScoreHistoryEntry {
    transition(wallet_id, None, on_rescore(score), ScoreReason::Initial, at).entry
}
