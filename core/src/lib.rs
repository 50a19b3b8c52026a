//! SenteScore: wallet credit scoring.
//!
//! Features → model probabilities → 0..100 score → loan terms, with a
//! rule-based fallback when the model is unavailable and a score ledger
//! driven by loan repayments and defaults.

pub mod config;
pub mod engine;
pub mod error;
pub mod features;
pub mod ledger;
pub mod model;
pub mod rng;
pub mod scoring;
pub mod store;
pub mod synthetic;
pub mod terms;
pub mod types;
