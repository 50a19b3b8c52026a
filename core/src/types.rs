//! Shared primitive types used across the scoring engine.

/// A wallet address, normalised to lowercase at the boundary.
pub type WalletId = String;

/// A credit score. Always within [MIN_SCORE, MAX_SCORE].
pub type Score = u32;

pub const MIN_SCORE: Score = 0;
pub const MAX_SCORE: Score = 100;

/// Score assumed for a wallet that has never been scored.
pub const DEFAULT_SCORE: Score = 50;

/// Lowercase and trim a wallet address so lookups are case-insensitive.
pub fn normalize_wallet(wallet_id: &str) -> WalletId {
    wallet_id.trim().to_lowercase()
}
