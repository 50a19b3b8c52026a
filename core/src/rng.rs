//! Deterministic random number generation.
//!
//! RULE: Nothing in the engine may call any platform RNG.
//! All randomness flows through ScoreRng instances derived
//! from a single master seed.
//!
//! Each consumer gets its own stream, seeded deterministically
//! from (master_seed XOR slot_index). This means:
//!   - Adding a new slot never changes existing slots' streams.
//!   - Each stream is fully reproducible in isolation.

use rand::SeedableRng;
use rand_pcg::Pcg64Mcg;

const SLOT_MIX: u64 = 0x9e37_79b9_7f4a_7c15;
const STREAM_MIX: u64 = 0xbf58_476d_1ce4_e5b9;

/// A deterministic RNG for a single consumer.
pub struct ScoreRng {
    inner: Pcg64Mcg,
}

impl ScoreRng {
    /// Create an RNG from the master seed and a stable slot index.
    /// The index must never change once assigned.
    pub fn new(master_seed: u64, slot_index: u64) -> Self {
        let derived_seed = master_seed ^ slot_index.wrapping_mul(SLOT_MIX);
        Self {
            inner: Pcg64Mcg::seed_from_u64(derived_seed),
        }
    }

    /// Roll a float in [0.0, 1.0).
    pub fn next_f64(&mut self) -> f64 {
        use rand::RngCore;
        let bits = self.inner.next_u64();
        (bits >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
    }

    /// Draw a raw u64 (full range).
    pub fn next_u64(&mut self) -> u64 {
        use rand::RngCore;
        self.inner.next_u64()
    }

    /// Roll a u64 in [0, n).
    pub fn next_u64_below(&mut self, n: u64) -> u64 {
        use rand::RngCore;
        assert!(n > 0, "n must be > 0");
        self.inner.next_u64() % n
    }

    /// Roll a float in [lo, hi).
    pub fn uniform(&mut self, lo: f64, hi: f64) -> f64 {
        lo + self.next_f64() * (hi - lo)
    }

    /// Roll an integer in [lo, hi). Half-open, like the synthetic ranges.
    pub fn int_range(&mut self, lo: u64, hi: u64) -> u64 {
        assert!(hi > lo, "empty range [{lo}, {hi})");
        lo + self.next_u64_below(hi - lo)
    }

    /// Pick an index with probability proportional to `weights`.
    /// Falls back to the last index when rounding leaves the roll uncovered.
    pub fn weighted_index(&mut self, weights: &[f64]) -> usize {
        assert!(!weights.is_empty(), "weights must not be empty");
        let total: f64 = weights.iter().sum();
        let roll = self.next_f64() * total;
        let mut cumulative = 0.0;
        for (i, w) in weights.iter().enumerate() {
            cumulative += w;
            if roll < cumulative {
                return i;
            }
        }
        weights.len() - 1
    }

    /// Fisher-Yates shuffle in place.
    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        for i in (1..items.len()).rev() {
            let j = self.next_u64_below(i as u64 + 1) as usize;
            items.swap(i, j);
        }
    }
}

/// All RNG streams for one seed, indexed by stable slot.
pub struct RngBank {
    master_seed: u64,
}

impl RngBank {
    pub fn new(master_seed: u64) -> Self {
        Self { master_seed }
    }

    pub fn for_slot(&self, slot: RngSlot) -> ScoreRng {
        ScoreRng::new(self.master_seed, slot as u64)
    }

    /// A numbered sub-stream of a slot, e.g. one per forest tree.
    /// Stream `k` is independent of how many other streams are drawn.
    pub fn for_stream(&self, slot: RngSlot, stream: u64) -> ScoreRng {
        let mixed = self.master_seed ^ (stream.wrapping_add(1)).wrapping_mul(STREAM_MIX);
        ScoreRng::new(mixed, slot as u64)
    }
}

/// Stable slot assignments.
/// NEVER reorder or remove entries. Only append.
/// Reordering changes every slot's seed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u64)]
pub enum RngSlot {
    SyntheticData = 0,
    TrainTestSplit = 1,
    Forest = 2,
    DemoFeatures = 3,
    // Add new slots here (append only).
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_stream() {
        let mut a = RngBank::new(42).for_slot(RngSlot::SyntheticData);
        let mut b = RngBank::new(42).for_slot(RngSlot::SyntheticData);
        for _ in 0..100 {
            assert_eq!(a.next_u64(), b.next_u64());
        }
    }

    #[test]
    fn slots_are_independent() {
        let mut a = RngBank::new(42).for_slot(RngSlot::SyntheticData);
        let mut b = RngBank::new(42).for_slot(RngSlot::TrainTestSplit);
        let draws_a: Vec<u64> = (0..8).map(|_| a.next_u64()).collect();
        let draws_b: Vec<u64> = (0..8).map(|_| b.next_u64()).collect();
        assert_ne!(draws_a, draws_b);
    }

    #[test]
    fn int_range_is_half_open() {
        let mut rng = RngBank::new(7).for_slot(RngSlot::SyntheticData);
        for _ in 0..10_000 {
            let v = rng.int_range(1, 20);
            assert!((1..20).contains(&v), "out of range: {v}");
        }
    }

    #[test]
    fn uniform_stays_in_bounds() {
        let mut rng = RngBank::new(7).for_slot(RngSlot::SyntheticData);
        for _ in 0..10_000 {
            let v = rng.uniform(0.8, 1.2);
            assert!((0.8..1.2).contains(&v), "out of range: {v}");
        }
    }

    #[test]
    fn shuffle_keeps_elements() {
        let mut rng = RngBank::new(3).for_slot(RngSlot::TrainTestSplit);
        let mut items: Vec<usize> = (0..50).collect();
        rng.shuffle(&mut items);
        let mut sorted = items.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..50).collect::<Vec<_>>());
    }
}
