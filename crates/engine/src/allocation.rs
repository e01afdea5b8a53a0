//! Allocation by rank (step 3).
//!
//! Rank `k` is assembled cell by cell: for every bidder the encrypted rank is
//! compared against `k` and, on a hit, the bidder's values are selected into
//! the slot. Since ranks are unique exactly one bidder hits. The last cell of a
//! rank closes it: supply left before the rank decides validity and the won
//! quantity, and the running clearing price moves to this rank's price when it
//! receives a non-zero allocation.
//!
//! Ranks must close in increasing order because rank `k` reads the cumulative
//! quantity left by rank `k - 1`.

use auction_crypto::{CryptoError, ObliviousBackend};
use auction_types::{EncBool, EncU64};
use borsh::{BorshDeserialize, BorshSerialize};

use crate::store::StoredBid;

/// Encrypted aggregate of the bidder occupying one rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct RankSlot {
    /// Identity of the occupant
    pub bidder: EncU64,
    /// Validated price of the occupant
    pub price: EncU64,
    /// Validated quantity of the occupant
    pub quantity: EncU64,
    /// Final won quantity; zero until the rank closes
    pub won: EncU64,
}

impl RankSlot {
    pub fn empty(zero: EncU64) -> Self {
        Self {
            bidder: zero,
            price: zero,
            quantity: zero,
            won: zero,
        }
    }
}

/// Values produced when a rank closes.
#[derive(Debug, Clone, Copy)]
pub struct RankClose {
    pub won: EncU64,
    pub valid: EncBool,
    pub cumulative: EncU64,
    pub uniform_price: EncU64,
}

/// Fold one bidder into the slot of `rank`.
pub fn select_cell<B: ObliviousBackend>(
    ops: &mut B,
    slot: &RankSlot,
    bidder_rank: EncU64,
    rank: u64,
    bid: &StoredBid,
) -> Result<RankSlot, CryptoError> {
    let target = ops.encrypt(rank)?;
    let hit = ops.eq(bidder_rank, target)?;
    Ok(RankSlot {
        bidder: ops.select(hit, bid.identity, slot.bidder)?,
        price: ops.select(hit, bid.price, slot.price)?,
        quantity: ops.select(hit, bid.quantity, slot.quantity)?,
        won: slot.won,
    })
}

/// Close a fully selected rank.
///
/// `previous` is the cumulative quantity of all better ranks. Quantities are
/// clamped to the supply during validation, so neither the prefix sum nor the
/// remaining supply can wrap.
pub fn close_rank<B: ObliviousBackend>(
    ops: &mut B,
    slot: &RankSlot,
    previous: EncU64,
    total_quantity: EncU64,
    zero: EncU64,
    uniform_price: EncU64,
) -> Result<RankClose, CryptoError> {
    let valid = ops.gt(total_quantity, previous)?;
    let consumed = ops.min(previous, total_quantity)?;
    let remaining = ops.sub(total_quantity, consumed)?;
    let take = ops.min(slot.quantity, remaining)?;
    let won = ops.select(valid, take, zero)?;
    let cumulative = ops.add(previous, slot.quantity)?;

    let winning = ops.gt(won, zero)?;
    let uniform_price = ops.select(winning, slot.price, uniform_price)?;

    Ok(RankClose {
        won,
        valid,
        cumulative,
        uniform_price,
    })
}
