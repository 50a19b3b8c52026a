//! sente-runner: headless runner for the SenteScore credit engine.
//!
//! Usage:
//!   sente-runner --train --seed 42 --samples 2000 --artifact models/credit.json
//!   sente-runner --wallet 0xabc... --db sente.db
//!   sente-runner --wallet 0xabc... --db sente.db --borrow 250
//!   sente-runner --wallet 0xabc... --db sente.db --repay 1
//!   sente-runner --wallet 0xabc... --db sente.db --default 1

use anyhow::Result;
use chrono::{Duration, Utc};
use sente_core::{
    config::EngineConfig,
    engine::{format_usdc, ScoringEngine},
    features::FeatureVector,
    ledger::ScoreTransition,
    model::ModelHandle,
    store::{CreditStore, NewLoan, USDC_UNIT},
    synthetic::DemoFeatureSource,
};
use std::env;

const LOAN_TERM_DAYS: i64 = 30;

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let mut config = match find_arg(&args, "--config") {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    config.training.seed = parse_arg(&args, "--seed", config.training.seed);
    config.training.n_samples = parse_arg(&args, "--samples", config.training.n_samples);
    if let Some(path) = find_arg(&args, "--artifact") {
        config.artifact_path = path.to_string();
    }
    if let Some(db) = find_arg(&args, "--db") {
        config.database_path = db.to_string();
    }
    let train = args.iter().any(|a| a == "--train");
    let wallet = find_arg(&args, "--wallet");

    println!("SenteScore: sente-runner");
    println!("  artifact:  {}", config.artifact_path);
    println!("  db:        {}", config.database_path);
    println!("  seed:      {}", config.training.seed);
    println!();

    let engine = ScoringEngine::new(ModelHandle::shared(&config.artifact_path));

    if train {
        let report = engine.train_synthetic(&config.training)?;
        println!("=== TRAINING ===");
        println!("  samples:        {}", config.training.n_samples);
        println!("  trees:          {}", config.training.n_trees);
        println!("  train/test:     {}/{}", report.n_train, report.n_test);
        println!("  train accuracy: {:.3}", report.train_accuracy);
        println!("  test accuracy:  {:.3}", report.test_accuracy);
        println!();
    }

    let Some(wallet) = wallet else {
        if !train {
            println!("Nothing to do: pass --train and/or --wallet <address>.");
        }
        return Ok(());
    };

    let store = CreditStore::open(&config.database_path)?;
    store.migrate()?;

    if let Some(loan_id) = find_arg(&args, "--repay") {
        let transition = store.record_repayment(wallet, loan_id.parse()?, Utc::now())?;
        print_transition("REPAYMENT", &transition);
    } else if let Some(loan_id) = find_arg(&args, "--default") {
        let transition = store.record_default(wallet, loan_id.parse()?, Utc::now())?;
        print_transition("DEFAULT", &transition);
    } else if let Some(amount) = find_arg(&args, "--borrow") {
        borrow(&store, wallet, amount.parse()?)?;
    } else {
        score(&engine, &store, wallet)?;
    }

    print_profile(&engine, &store, wallet)?;
    Ok(())
}

/// Score with stored features when the wallet has them, demo features otherwise.
fn score(engine: &ScoringEngine, store: &CreditStore, wallet: &str) -> Result<()> {
    let stored: Option<FeatureVector> = store.wallet_features(wallet)?;
    let report = engine.score_wallet(wallet, stored, &DemoFeatureSource)?;
    let transition = store.record_score(&report)?;

    println!("=== SCORE ===");
    println!("{}", serde_json::to_string_pretty(&report)?);
    if let Some(previous) = transition.previous {
        println!("  change: {previous} -> {} ({:+})", transition.score, transition.delta());
    }
    println!();
    Ok(())
}

fn borrow(store: &CreditStore, wallet: &str, amount_usdc: f64) -> Result<()> {
    let now = Utc::now();
    let amount = usdc_to_units(amount_usdc)?;
    let record = store.register_wallet(wallet, now)?;
    let terms = sente_core::terms::derive_terms(record.credit_score);
    if !terms.eligible || amount_usdc > terms.max_loan_amount {
        anyhow::bail!(
            "{wallet} ({} tier) may borrow up to ${} USDC, requested ${amount_usdc}",
            terms.tier,
            format_usdc(terms.max_loan_amount)
        );
    }

    let interest = (amount as f64 * terms.interest_rate / 100.0).round() as i64;
    let onchain = store.loan_stats()?.total_loans + 1;
    let record = store.record_loan(
        &NewLoan {
            borrower_address: wallet.to_string(),
            loan_id_onchain: onchain,
            amount,
            interest_amount: interest,
            start_time: now,
            due_date: now + Duration::days(LOAN_TERM_DAYS),
        },
        now,
    )?;

    println!("=== LOAN ===");
    println!("  loan id:   {}", record.id);
    println!("  amount:    ${:.2} USDC", amount as f64 / USDC_UNIT);
    println!("  interest:  ${:.2} USDC ({:.1}%)", interest as f64 / USDC_UNIT, terms.interest_rate);
    println!("  due:       {}", record.due_date.format("%Y-%m-%d"));
    println!();
    Ok(())
}

/// Positive, finite USDC to base units. Amounts below one base unit are rejected.
fn usdc_to_units(amount_usdc: f64) -> Result<i64> {
    if !amount_usdc.is_finite() || amount_usdc <= 0.0 {
        anyhow::bail!("loan amount must be a positive number of USDC, got {amount_usdc}");
    }
    let units = (amount_usdc * USDC_UNIT).round();
    if units < 1.0 || units >= i64::MAX as f64 {
        anyhow::bail!("loan amount {amount_usdc} USDC is out of range");
    }
    Ok(units as i64)
}

fn print_transition(label: &str, t: &ScoreTransition) {
    println!("=== {label} ===");
    println!(
        "  score: {} -> {} ({:+})",
        t.previous.unwrap_or(t.score),
        t.score,
        t.delta()
    );
    println!();
}

fn print_profile(engine: &ScoringEngine, store: &CreditStore, wallet: &str) -> Result<()> {
    let profile = store.wallet_profile(wallet)?;
    let summary = engine.describe_existing(wallet, profile.wallet.credit_score);

    println!("=== WALLET ===");
    println!("  address:        {}", summary.wallet_id);
    println!("  {}", summary.message);
    println!("  eligible:       {}", summary.eligible_for_loan);
    println!("  max loan:       ${} USDC", format_usdc(summary.max_loan_amount));
    println!("  interest rate:  {:.1}%", summary.interest_rate);
    println!("  loans:          {} ({} active)", profile.wallet.total_loans, profile.active_loans);
    println!("  repayment rate: {:.1}%", profile.repayment_rate);

    println!();
    println!("=== RECENT HISTORY ===");
    for entry in store.score_history(wallet, 5)? {
        println!(
            "  {} | {:>3} | {}",
            entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
            entry.score,
            entry.reason.as_str()
        );
    }
    Ok(())
}

fn find_arg<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn borrow_amount_must_be_positive_and_finite() {
        for bad in [0.0, -1.0, f64::NAN, f64::INFINITY, 1e-9] {
            assert!(usdc_to_units(bad).is_err(), "accepted {bad}");
        }
        assert_eq!(usdc_to_units(250.0).unwrap(), 250_000_000);
        assert_eq!(usdc_to_units(0.5).unwrap(), 500_000);
    }
}
