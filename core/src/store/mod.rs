//! SQLite persistence for wallets, loans and score history.
//!
//! RULE: Only the store talks to the database.
//! The engine and ledger compute values; the store writes them, and
//! every score change is written in the same transaction as its
//! history entry and the loan/wallet rows it belongs with.

mod loans;

pub use loans::{LoanRecord, LoanStats, LoanStatus, NewLoan, USDC_UNIT};

use crate::{
    engine::ScoreReport,
    error::{ScoreError, ScoreResult},
    features::FeatureVector,
    ledger::{self, ScoreHistoryEntry, ScoreReason, ScoreTransition},
    types::{normalize_wallet, Score, WalletId, DEFAULT_SCORE, MAX_SCORE},
};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

pub struct CreditStore {
    conn: Connection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletRecord {
    pub wallet_address: WalletId,
    pub credit_score: Score,
    pub total_loans: i64,
    pub successful_repayments: i64,
    pub defaulted_loans: i64,
    pub total_borrowed: i64,
    pub total_repaid: i64,
    pub has_badge: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WalletRecord {
    /// Percentage of loans repaid. None until the wallet has borrowed.
    pub fn repayment_rate(&self) -> Option<f64> {
        (self.total_loans > 0)
            .then(|| self.successful_repayments as f64 / self.total_loans as f64 * 100.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletProfile {
    pub wallet: WalletRecord,
    pub features: Option<FeatureVector>,
    pub active_loans: usize,
    /// Percent; 0 for a wallet that has never borrowed.
    pub repayment_rate: f64,
}

/// Platform-wide wallet aggregates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletStats {
    pub total_wallets: i64,
    pub wallets_with_loans: i64,
    pub wallets_with_badges: i64,
    /// Mean credit score rounded to 2 places; 0 with no wallets.
    pub average_credit_score: f64,
}

impl CreditStore {
    /// Open (or create) the database at `path`.
    pub fn open(path: &str) -> ScoreResult<Self> {
        let conn = Connection::open(path)?;
        // WAL mode only matters for real files; :memory: ignores it.
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> ScoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> ScoreResult<()> {
        self.conn
            .execute_batch(include_str!("../../../migrations/001_credit.sql"))?;
        Ok(())
    }

    // ── Wallets ────────────────────────────────────────────────

    pub fn get_wallet(&self, wallet_id: &str) -> ScoreResult<Option<WalletRecord>> {
        let wallet = self
            .conn
            .query_row(
                "SELECT wallet_address, credit_score, total_loans, successful_repayments,
                        defaulted_loans, total_borrowed, total_repaid, has_badge,
                        created_at, updated_at
                 FROM wallet WHERE wallet_address = ?1",
                params![normalize_wallet(wallet_id)],
                wallet_from_row,
            )
            .optional()?;
        Ok(wallet)
    }

    /// Like `get_wallet`, but a missing wallet is an error.
    pub fn require_wallet(&self, wallet_id: &str) -> ScoreResult<WalletRecord> {
        self.get_wallet(wallet_id)?.ok_or_else(|| ScoreError::UnknownWallet {
            wallet_id: normalize_wallet(wallet_id),
        })
    }

    /// Create a wallet at the default score with an `initial` history entry.
    /// Returns the existing record untouched if the wallet is known.
    pub fn register_wallet(&self, wallet_id: &str, at: DateTime<Utc>) -> ScoreResult<WalletRecord> {
        if let Some(existing) = self.get_wallet(wallet_id)? {
            return Ok(existing);
        }
        let entry = ledger::initial_entry(wallet_id, DEFAULT_SCORE, at);
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO wallet (wallet_address, credit_score, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?3)",
            params![entry.wallet_id, entry.score as i64, millis(at)],
        )?;
        insert_history(&tx, &entry)?;
        tx.commit()?;
        self.require_wallet(wallet_id)
    }

    /// Persist a scoring result: wallet score, features and an
    /// `ai_update` entry, all in one transaction.
    pub fn record_score(&self, report: &ScoreReport) -> ScoreResult<ScoreTransition> {
        let wallet_id = &report.summary.wallet_id;
        let at = report.history.timestamp;
        let tx = self.conn.unchecked_transaction()?;

        let previous: Option<i64> = tx
            .query_row(
                "SELECT credit_score FROM wallet WHERE wallet_address = ?1",
                params![wallet_id],
                |row| row.get(0),
            )
            .optional()?;
        let transition =
            ledger::apply_rescore(wallet_id, previous.map(score_from_db), report.summary.score, at);

        tx.execute(
            "INSERT INTO wallet (wallet_address, credit_score, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?3)
             ON CONFLICT(wallet_address)
             DO UPDATE SET credit_score = excluded.credit_score, updated_at = excluded.updated_at",
            params![wallet_id, transition.score as i64, millis(at)],
        )?;
        upsert_features(&tx, wallet_id, &report.features, at)?;
        insert_history(&tx, &transition.entry)?;
        tx.commit()?;
        Ok(transition)
    }

    /// Store raw features for a known wallet without rescoring it.
    pub fn save_features(
        &self,
        wallet_id: &str,
        features: &FeatureVector,
        at: DateTime<Utc>,
    ) -> ScoreResult<()> {
        let wallet = self.require_wallet(wallet_id)?;
        upsert_features(&self.conn, &wallet.wallet_address, features, at)
    }

    pub fn wallet_features(&self, wallet_id: &str) -> ScoreResult<Option<FeatureVector>> {
        let features = self
            .conn
            .query_row(
                "SELECT transaction_count, avg_transaction_value, total_volume,
                        unique_counterparties, wallet_age_days, defi_interactions, nft_holdings
                 FROM transaction_data WHERE wallet_address = ?1",
                params![normalize_wallet(wallet_id)],
                |row| {
                    Ok(FeatureVector {
                        transaction_count: row.get::<_, i64>(0)?.max(0) as u64,
                        avg_transaction_value: row.get(1)?,
                        total_volume: row.get(2)?,
                        unique_counterparties: row.get::<_, i64>(3)?.max(0) as u64,
                        wallet_age_days: row.get::<_, i64>(4)?.max(0) as u64,
                        defi_interactions: row.get::<_, i64>(5)?.max(0) as u64,
                        nft_holdings: row.get::<_, i64>(6)?.max(0) as u64,
                    })
                },
            )
            .optional()?;
        Ok(features)
    }

    /// Wallet row, stored features and open loans in one view.
    pub fn wallet_profile(&self, wallet_id: &str) -> ScoreResult<WalletProfile> {
        let wallet = self.require_wallet(wallet_id)?;
        let features = self.wallet_features(wallet_id)?;
        let active_loans = self.wallet_loans(wallet_id, true)?.len();
        Ok(WalletProfile {
            repayment_rate: wallet.repayment_rate().unwrap_or(0.0),
            wallet,
            features,
            active_loans,
        })
    }

    pub fn wallet_stats(&self) -> ScoreResult<WalletStats> {
        let (total, with_loans, with_badges, avg): (i64, i64, i64, Option<f64>) =
            self.conn.query_row(
                "SELECT COUNT(*),
                        COALESCE(SUM(total_loans > 0), 0),
                        COALESCE(SUM(has_badge != 0), 0),
                        AVG(credit_score)
                 FROM wallet",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )?;
        Ok(WalletStats {
            total_wallets: total,
            wallets_with_loans: with_loans,
            wallets_with_badges: with_badges,
            average_credit_score: (avg.unwrap_or(0.0) * 100.0).round() / 100.0,
        })
    }

    // ── Score history ──────────────────────────────────────────

    /// Most recent entries first.
    pub fn score_history(
        &self,
        wallet_id: &str,
        limit: usize,
    ) -> ScoreResult<Vec<ScoreHistoryEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT wallet_address, score, reason, created_at
             FROM score_history WHERE wallet_address = ?1
             ORDER BY created_at DESC, id DESC LIMIT ?2",
        )?;
        let entries = stmt
            .query_map(params![normalize_wallet(wallet_id), limit as i64], |row| {
                let reason: String = row.get(2)?;
                Ok(ScoreHistoryEntry {
                    wallet_id: row.get(0)?,
                    score: score_from_db(row.get(1)?),
                    reason: ScoreReason::parse(&reason).unwrap_or(ScoreReason::AiUpdate),
                    timestamp: from_millis(row.get(3)?),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    pub fn score_history_count(&self, wallet_id: &str) -> ScoreResult<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM score_history WHERE wallet_address = ?1",
            params![normalize_wallet(wallet_id)],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

// ── Row helpers ────────────────────────────────────────────────

fn wallet_from_row(row: &Row<'_>) -> rusqlite::Result<WalletRecord> {
    Ok(WalletRecord {
        wallet_address: row.get(0)?,
        credit_score: score_from_db(row.get(1)?),
        total_loans: row.get(2)?,
        successful_repayments: row.get(3)?,
        defaulted_loans: row.get(4)?,
        total_borrowed: row.get(5)?,
        total_repaid: row.get(6)?,
        has_badge: row.get::<_, i64>(7)? != 0,
        created_at: from_millis(row.get(8)?),
        updated_at: from_millis(row.get(9)?),
    })
}

fn upsert_features(
    conn: &Connection,
    wallet_id: &str,
    features: &FeatureVector,
    at: DateTime<Utc>,
) -> ScoreResult<()> {
    features.validate()?;
    conn.execute(
        "INSERT INTO transaction_data (wallet_address, transaction_count, avg_transaction_value,
             total_volume, unique_counterparties, wallet_age_days, defi_interactions,
             nft_holdings, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
         ON CONFLICT(wallet_address) DO UPDATE SET
             transaction_count     = excluded.transaction_count,
             avg_transaction_value = excluded.avg_transaction_value,
             total_volume          = excluded.total_volume,
             unique_counterparties = excluded.unique_counterparties,
             wallet_age_days       = excluded.wallet_age_days,
             defi_interactions     = excluded.defi_interactions,
             nft_holdings          = excluded.nft_holdings,
             updated_at            = excluded.updated_at",
        params![
            wallet_id,
            db_count("transaction_count", features.transaction_count)?,
            features.avg_transaction_value,
            features.total_volume,
            db_count("unique_counterparties", features.unique_counterparties)?,
            db_count("wallet_age_days", features.wallet_age_days)?,
            db_count("defi_interactions", features.defi_interactions)?,
            db_count("nft_holdings", features.nft_holdings)?,
            millis(at),
        ],
    )?;
    Ok(())
}

fn db_count(field: &str, value: u64) -> ScoreResult<i64> {
    i64::try_from(value)
        .map_err(|_| ScoreError::malformed(field, format!("{value} does not fit the store")))
}

fn insert_history(conn: &Connection, entry: &ScoreHistoryEntry) -> ScoreResult<()> {
    conn.execute(
        "INSERT INTO score_history (wallet_address, score, reason, created_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            entry.wallet_id,
            entry.score as i64,
            entry.reason.as_str(),
            millis(entry.timestamp),
        ],
    )?;
    Ok(())
}

fn millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

fn score_from_db(raw: i64) -> Score {
    raw.clamp(0, i64::from(MAX_SCORE)) as Score
}
