//! Synthetic wallet generation.
//!
//! Two generators live here:
//!   - `generate`: labelled training samples drawn from three behavioural
//!     archetypes (bad / medium / good credit).
//!   - `DemoFeatureSource`: stable pseudo-features keyed by wallet address,
//!     used by callers that score a wallet without supplying features.
//!
//! All generation is deterministic (same seed = same samples).

use crate::{
    features::{FeatureSource, FeatureVector},
    rng::{RngBank, RngSlot, ScoreRng},
};
use serde::{Deserialize, Serialize};

/// Internal model class. Not the user-facing tier (see `terms::CreditTier`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreditClass {
    Bad = 0,
    Medium = 1,
    Good = 2,
}

pub const CLASS_COUNT: usize = 3;

/// Label priors for synthetic data: bad, medium, good.
pub const CLASS_PRIORS: [f64; CLASS_COUNT] = [0.2, 0.5, 0.3];

impl CreditClass {
    pub const ALL: [CreditClass; CLASS_COUNT] = [Self::Bad, Self::Medium, Self::Good];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Score anchor used when interpolating class probabilities.
    pub fn anchor(self) -> f64 {
        match self {
            Self::Bad => 0.0,
            Self::Medium => 50.0,
            Self::Good => 100.0,
        }
    }
}

// ── Archetypes ───────────────────────────────────────────────────────────────

/// Half-open ranges for one credit archetype.
struct Archetype {
    transaction_count: (u64, u64),
    avg_transaction_value: (f64, f64),
    unique_counterparties: (u64, u64),
    wallet_age_days: (u64, u64),
    defi_interactions: (u64, u64),
    nft_holdings: (u64, u64),
}

const VOLUME_JITTER: (f64, f64) = (0.8, 1.2);

const BAD: Archetype = Archetype {
    transaction_count: (1, 20),
    avg_transaction_value: (0.01, 0.1),
    unique_counterparties: (1, 10),
    wallet_age_days: (1, 90),
    defi_interactions: (0, 3),
    nft_holdings: (0, 2),
};

const MEDIUM: Archetype = Archetype {
    transaction_count: (20, 100),
    avg_transaction_value: (0.1, 0.5),
    unique_counterparties: (10, 50),
    wallet_age_days: (90, 365),
    defi_interactions: (3, 10),
    nft_holdings: (2, 10),
};

const GOOD: Archetype = Archetype {
    transaction_count: (100, 500),
    avg_transaction_value: (0.5, 2.0),
    unique_counterparties: (50, 200),
    wallet_age_days: (365, 1000),
    defi_interactions: (10, 50),
    nft_holdings: (10, 50),
};

impl Archetype {
    fn for_class(class: CreditClass) -> &'static Archetype {
        match class {
            CreditClass::Bad => &BAD,
            CreditClass::Medium => &MEDIUM,
            CreditClass::Good => &GOOD,
        }
    }

    fn sample(&self, rng: &mut ScoreRng) -> FeatureVector {
        let transaction_count = rng.int_range(self.transaction_count.0, self.transaction_count.1);
        let avg_transaction_value =
            rng.uniform(self.avg_transaction_value.0, self.avg_transaction_value.1);
        // Volume is coupled to count and average value, not drawn on its own.
        let total_volume = transaction_count as f64
            * avg_transaction_value
            * rng.uniform(VOLUME_JITTER.0, VOLUME_JITTER.1);
        FeatureVector {
            transaction_count,
            avg_transaction_value,
            total_volume,
            unique_counterparties: rng
                .int_range(self.unique_counterparties.0, self.unique_counterparties.1),
            wallet_age_days: rng.int_range(self.wallet_age_days.0, self.wallet_age_days.1),
            defi_interactions: rng.int_range(self.defi_interactions.0, self.defi_interactions.1),
            nft_holdings: rng.int_range(self.nft_holdings.0, self.nft_holdings.1),
        }
    }
}

/// Generate `n_samples` labelled wallets. Reproducible for a given seed.
pub fn generate(n_samples: usize, seed: u64) -> (Vec<FeatureVector>, Vec<CreditClass>) {
    let mut rng = RngBank::new(seed).for_slot(RngSlot::SyntheticData);
    let mut features = Vec::with_capacity(n_samples);
    let mut labels = Vec::with_capacity(n_samples);

    for _ in 0..n_samples {
        let class = CreditClass::ALL[rng.weighted_index(&CLASS_PRIORS)];
        features.push(Archetype::for_class(class).sample(&mut rng));
        labels.push(class);
    }

    log::debug!("generated {n_samples} synthetic samples (seed={seed})");
    (features, labels)
}

// ── Demo features ────────────────────────────────────────────────────────────

/// Pseudo-features for demos: the same wallet always gets the same vector.
#[derive(Debug, Clone, Copy, Default)]
pub struct DemoFeatureSource;

impl DemoFeatureSource {
    /// Seed derived from the last 8 hex digits of the address, mod 1000.
    /// Non-hex identifiers fall back to an FNV-1a hash of the whole id.
    pub fn seed_for(wallet_id: &str) -> u64 {
        let hex = wallet_id.strip_prefix("0x").unwrap_or(wallet_id);
        let tail_start = hex
            .char_indices()
            .rev()
            .nth(7)
            .map(|(i, _)| i)
            .unwrap_or(0);
        let tail = &hex[tail_start..];
        match u64::from_str_radix(tail, 16) {
            Ok(v) => v % 1000,
            Err(_) => fnv1a(wallet_id.as_bytes()) % 1000,
        }
    }
}

impl FeatureSource for DemoFeatureSource {
    fn features_for(&self, wallet_id: &str) -> FeatureVector {
        let mut rng = RngBank::new(Self::seed_for(wallet_id)).for_slot(RngSlot::DemoFeatures);
        FeatureVector {
            transaction_count: rng.int_range(10, 301),
            avg_transaction_value: round_to(rng.uniform(0.05, 1.5), 4),
            total_volume: round_to(rng.uniform(5.0, 200.0), 2),
            unique_counterparties: rng.int_range(5, 151),
            wallet_age_days: rng.int_range(30, 801),
            defi_interactions: rng.int_range(0, 41),
            nft_holdings: rng.int_range(0, 26),
        }
    }
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0xcbf2_9ce4_8422_2325u64, |hash, b| {
        (hash ^ u64::from(*b)).wrapping_mul(0x0000_0100_0000_01b3)
    })
}
