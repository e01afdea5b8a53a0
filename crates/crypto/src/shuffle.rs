//! Oblivious shuffle of an encrypted range.
//!
//! Fisher–Yates driven by encrypted random indices. The swap partner of each
//! position is never decrypted: every candidate slot is visited and updated
//! through `select`, so the access pattern is the same for every permutation.
//! Cost is quadratic in the length of the range.

use auction_types::EncU64;

use crate::backend::ObliviousBackend;
use crate::error::CryptoError;

/// Encrypted uniformly random permutation of `[0, len)`.
///
/// Every value appears exactly once, so the output is a collision-free
/// tie-break source provided the backend's randomness is unbiased.
pub fn shuffled_range<B: ObliviousBackend>(
    ops: &mut B,
    len: u64,
) -> Result<Vec<EncU64>, CryptoError> {
    let mut slots = (0..len)
        .map(|value| ops.encrypt(value))
        .collect::<Result<Vec<_>, _>>()?;

    for top in (1..len).rev() {
        let partner = ops.random_below(top + 1)?;
        let top_value = slots[top as usize];
        let mut picked = top_value;

        for position in 0..=top {
            let index = ops.encrypt(position)?;
            let hit = ops.eq(partner, index)?;
            let current = slots[position as usize];
            picked = ops.select(hit, current, picked)?;
            slots[position as usize] = ops.select(hit, top_value, current)?;
        }

        slots[top as usize] = picked;
    }

    Ok(slots)
}
