//! Strict total order over bids.
//!
//! Price is the primary key: a strictly higher price wins. Equal prices fall
//! through to the configured [`TieBreakPolicy`]. The predicate is only ever
//! evaluated for `earlier` registered before `later`; the reverse direction is
//! its negation.

use auction_crypto::{CryptoError, ObliviousBackend};
use auction_types::{EncBool, EncU64, TieBreakPolicy};

/// The fields of a bid that take part in the ordering.
#[derive(Debug, Clone, Copy)]
pub struct Contender {
    pub price: EncU64,
    pub quantity: EncU64,
    /// Shuffled tie-break value; only read under [`TieBreakPolicy::Random`]
    pub tie: EncU64,
}

/// Encrypted "`earlier` outranks `later`".
pub fn outranks<B: ObliviousBackend>(
    ops: &mut B,
    policy: TieBreakPolicy,
    earlier: &Contender,
    later: &Contender,
) -> Result<EncBool, CryptoError> {
    match policy {
        // Registration order settles ties, so equal prices go to `earlier`.
        TieBreakPolicy::Registration => ops.ge(earlier.price, later.price),
        TieBreakPolicy::QuantityThenRegistration => {
            let higher = ops.gt(earlier.price, later.price)?;
            let same = ops.eq(earlier.price, later.price)?;
            let larger_or_same = ops.ge(earlier.quantity, later.quantity)?;
            let tie_won = ops.and(same, larger_or_same)?;
            ops.or(higher, tie_won)
        }
        TieBreakPolicy::Random => {
            let higher = ops.gt(earlier.price, later.price)?;
            let same = ops.eq(earlier.price, later.price)?;
            let luckier = ops.gt(earlier.tie, later.tie)?;
            let tie_won = ops.and(same, luckier)?;
            ops.or(higher, tie_won)
        }
    }
}
