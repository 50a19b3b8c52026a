//! Store methods for loans and the score changes they drive.

use super::{from_millis, insert_history, millis, score_from_db, CreditStore};
use crate::{
    error::{ScoreError, ScoreResult},
    ledger::{self, LoanEvent, ScoreTransition},
    types::{normalize_wallet, Score, WalletId},
};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

/// Base units per USDC (6 decimals).
pub const USDC_UNIT: f64 = 1_000_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoanStatus {
    Active,
    Repaid,
    Defaulted,
}

impl LoanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Repaid => "repaid",
            Self::Defaulted => "defaulted",
        }
    }

    fn parse(s: &str) -> Self {
        match s {
            "repaid" => Self::Repaid,
            "defaulted" => Self::Defaulted,
            _ => Self::Active,
        }
    }
}

/// A loan as reported by the lending contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewLoan {
    pub borrower_address: String,
    pub loan_id_onchain: i64,
    /// USDC base units.
    pub amount: i64,
    pub interest_amount: i64,
    pub start_time: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
}

impl NewLoan {
    /// Principal must be positive and interest non-negative.
    pub fn validate(&self) -> ScoreResult<()> {
        if self.amount <= 0 {
            return Err(ScoreError::InvalidLoan(format!(
                "amount must be > 0, got {}",
                self.amount
            )));
        }
        if self.interest_amount < 0 {
            return Err(ScoreError::InvalidLoan(format!(
                "interest must be >= 0, got {}",
                self.interest_amount
            )));
        }
        if self.due_date < self.start_time {
            return Err(ScoreError::InvalidLoan("due date precedes start time".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanRecord {
    pub id: i64,
    pub borrower_address: WalletId,
    pub loan_id_onchain: i64,
    pub amount: i64,
    pub interest_amount: i64,
    pub credit_score_at_loan: Option<Score>,
    pub start_time: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub repaid_at: Option<DateTime<Utc>>,
    pub status: LoanStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanStats {
    pub total_loans: i64,
    pub active_loans: i64,
    pub repaid_loans: i64,
    pub defaulted_loans: i64,
    pub total_borrowed_usdc: f64,
    pub total_repaid_usdc: f64,
    /// Percent of all loans that were repaid.
    pub repayment_rate: f64,
}

const LOAN_COLUMNS: &str = "id, borrower_address, loan_id_onchain, amount, interest_amount,
     credit_score_at_loan, start_time, due_date, repaid_at, status, created_at";

impl CreditStore {
    /// Record a new loan against an existing wallet, snapshotting its score.
    pub fn record_loan(&self, loan: &NewLoan, at: DateTime<Utc>) -> ScoreResult<LoanRecord> {
        loan.validate()?;
        let borrower = normalize_wallet(&loan.borrower_address);
        let tx = self.conn.unchecked_transaction()?;
        let score = current_score(&tx, &borrower)?;

        tx.execute(
            "INSERT INTO loan (borrower_address, loan_id_onchain, amount, interest_amount,
                 credit_score_at_loan, start_time, due_date, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'active', ?8)",
            params![
                borrower,
                loan.loan_id_onchain,
                loan.amount,
                loan.interest_amount,
                score as i64,
                millis(loan.start_time),
                millis(loan.due_date),
                millis(at),
            ],
        )?;
        let id = tx.last_insert_rowid();
        tx.execute(
            "UPDATE wallet SET total_loans = total_loans + 1,
                 total_borrowed = total_borrowed + ?2, updated_at = ?3
             WHERE wallet_address = ?1",
            params![borrower, loan.amount, millis(at)],
        )?;
        tx.commit()?;
        log::info!("{borrower}: recorded loan {id} (onchain {})", loan.loan_id_onchain);

        self.get_loan(&borrower, id)?
            .ok_or(ScoreError::LoanNotFound { wallet_id: borrower, loan_id: id })
    }

    /// Close a loan as repaid and raise the borrower's score.
    pub fn record_repayment(
        &self,
        wallet_id: &str,
        loan_id: i64,
        repaid_at: DateTime<Utc>,
    ) -> ScoreResult<ScoreTransition> {
        self.settle_loan(wallet_id, loan_id, LoanEvent::Repaid, repaid_at)
    }

    /// Close a loan as defaulted and apply the default penalty.
    pub fn record_default(
        &self,
        wallet_id: &str,
        loan_id: i64,
        at: DateTime<Utc>,
    ) -> ScoreResult<ScoreTransition> {
        self.settle_loan(wallet_id, loan_id, LoanEvent::Defaulted, at)
    }

    fn settle_loan(
        &self,
        wallet_id: &str,
        loan_id: i64,
        event: LoanEvent,
        at: DateTime<Utc>,
    ) -> ScoreResult<ScoreTransition> {
        let wallet_id = normalize_wallet(wallet_id);
        let tx = self.conn.unchecked_transaction()?;

        let loan = load_loan(&tx, &wallet_id, loan_id)?.ok_or_else(|| ScoreError::LoanNotFound {
            wallet_id: wallet_id.clone(),
            loan_id,
        })?;
        if loan.status != LoanStatus::Active {
            return Err(ScoreError::LoanAlreadySettled { loan_id });
        }

        let current = current_score(&tx, &wallet_id)?;
        let transition = ledger::apply_loan_event(&wallet_id, current, event, at);

        match event {
            LoanEvent::Repaid => {
                tx.execute(
                    "UPDATE loan SET status = 'repaid', repaid_at = ?2 WHERE id = ?1",
                    params![loan_id, millis(at)],
                )?;
                tx.execute(
                    "UPDATE wallet SET successful_repayments = successful_repayments + 1,
                         total_repaid = total_repaid + ?2, credit_score = ?3, updated_at = ?4
                     WHERE wallet_address = ?1",
                    params![
                        wallet_id,
                        loan.amount + loan.interest_amount,
                        transition.score as i64,
                        millis(at),
                    ],
                )?;
            }
            LoanEvent::Defaulted => {
                tx.execute(
                    "UPDATE loan SET status = 'defaulted' WHERE id = ?1",
                    params![loan_id],
                )?;
                tx.execute(
                    "UPDATE wallet SET defaulted_loans = defaulted_loans + 1,
                         credit_score = ?2, updated_at = ?3
                     WHERE wallet_address = ?1",
                    params![wallet_id, transition.score as i64, millis(at)],
                )?;
            }
        }
        insert_history(&tx, &transition.entry)?;
        tx.commit()?;

        log::info!(
            "{wallet_id}: loan {loan_id} {:?}, score {current} -> {}",
            event,
            transition.score
        );
        Ok(transition)
    }

    pub fn get_loan(&self, wallet_id: &str, loan_id: i64) -> ScoreResult<Option<LoanRecord>> {
        load_loan(&self.conn, &normalize_wallet(wallet_id), loan_id)
    }

    /// Loans for a wallet, newest first.
    pub fn wallet_loans(&self, wallet_id: &str, active_only: bool) -> ScoreResult<Vec<LoanRecord>> {
        let sql = format!(
            "SELECT {LOAN_COLUMNS} FROM loan
             WHERE borrower_address = ?1 AND (?2 = 0 OR status = 'active')
             ORDER BY created_at DESC, id DESC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let loans = stmt
            .query_map(params![normalize_wallet(wallet_id), active_only as i64], loan_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(loans)
    }

    pub fn loan_stats(&self) -> ScoreResult<LoanStats> {
        type Row = (i64, i64, i64, i64, i64, i64);
        let (total, active, repaid, defaulted, borrowed, repaid_sum): Row =
            self.conn.query_row(
                "SELECT COUNT(*),
                        COALESCE(SUM(status = 'active'), 0),
                        COALESCE(SUM(status = 'repaid'), 0),
                        COALESCE(SUM(status = 'defaulted'), 0),
                        COALESCE(SUM(amount), 0),
                        COALESCE(SUM(CASE WHEN status = 'repaid'
                                          THEN amount + interest_amount ELSE 0 END), 0)
                 FROM loan",
                [],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                    ))
                },
            )?;
        Ok(LoanStats {
            total_loans: total,
            active_loans: active,
            repaid_loans: repaid,
            defaulted_loans: defaulted,
            total_borrowed_usdc: borrowed as f64 / USDC_UNIT,
            total_repaid_usdc: repaid_sum as f64 / USDC_UNIT,
            repayment_rate: if total > 0 { repaid as f64 / total as f64 * 100.0 } else { 0.0 },
        })
    }
}

fn current_score(conn: &Connection, wallet_id: &str) -> ScoreResult<Score> {
    let raw: Option<i64> = conn
        .query_row(
            "SELECT credit_score FROM wallet WHERE wallet_address = ?1",
            params![wallet_id],
            |row| row.get(0),
        )
        .optional()?;
    raw.map(score_from_db).ok_or_else(|| ScoreError::UnknownWallet {
        wallet_id: wallet_id.to_string(),
    })
}

fn load_loan(conn: &Connection, wallet_id: &str, loan_id: i64) -> ScoreResult<Option<LoanRecord>> {
    let loan = conn
        .query_row(
            &format!("SELECT {LOAN_COLUMNS} FROM loan WHERE borrower_address = ?1 AND id = ?2"),
            params![wallet_id, loan_id],
            loan_from_row,
        )
        .optional()?;
    Ok(loan)
}

fn loan_from_row(row: &Row<'_>) -> rusqlite::Result<LoanRecord> {
    let status: String = row.get(9)?;
    Ok(LoanRecord {
        id: row.get(0)?,
        borrower_address: row.get(1)?,
        loan_id_onchain: row.get(2)?,
        amount: row.get(3)?,
        interest_amount: row.get(4)?,
        credit_score_at_loan: row.get::<_, Option<i64>>(5)?.map(score_from_db),
        start_time: from_millis(row.get(6)?),
        due_date: from_millis(row.get(7)?),
        repaid_at: row.get::<_, Option<i64>>(8)?.map(from_millis),
        status: LoanStatus::parse(&status),
        created_at: from_millis(row.get(10)?),
    })
}
