//! Identity remapping (step 4).
//!
//! For identity `m` every rank `k` is visited; the won quantity of the rank
//! whose index equals `m`'s encrypted rank is selected. Neither side of the
//! mapping is ever in cleartext, so every (identity, rank) cell is evaluated.

use auction_crypto::{CryptoError, ObliviousBackend};
use auction_types::EncU64;

/// Fold rank `rank` into the won quantity accumulated for one identity.
pub fn remap_cell<B: ObliviousBackend>(
    ops: &mut B,
    accumulated: EncU64,
    bidder_rank: EncU64,
    rank: u64,
    won_at_rank: EncU64,
) -> Result<EncU64, CryptoError> {
    let target = ops.encrypt(rank)?;
    let hit = ops.eq(bidder_rank, target)?;
    ops.select(hit, won_at_rank, accumulated)
}
