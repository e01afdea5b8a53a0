//! Bid validation (step 1).
//!
//! A bid with a zero price or a zero quantity becomes (0, 0). Quantities are
//! clamped to the offered supply so later prefix sums stay within range.
//! Applying the rule twice yields the same values.

use auction_crypto::{CryptoError, ObliviousBackend};
use auction_types::EncU64;

use crate::store::StoredBid;

/// Validated (price, quantity) of `bid`.
pub fn validate_bid<B: ObliviousBackend>(
    ops: &mut B,
    bid: &StoredBid,
    total_quantity: EncU64,
    zero: EncU64,
) -> Result<(EncU64, EncU64), CryptoError> {
    let zero_price = ops.eq(bid.price, zero)?;
    let zero_quantity = ops.eq(bid.quantity, zero)?;
    let rejected = ops.or(zero_price, zero_quantity)?;

    let clamped = ops.min(bid.quantity, total_quantity)?;

    let price = ops.select(rejected, zero, bid.price)?;
    let quantity = ops.select(rejected, zero, clamped)?;
    Ok((price, quantity))
}

#[cfg(test)]
mod tests {
    use super::*;
    use auction_crypto::{ClearBackend, Decrypt};

    fn run(price: u64, quantity: u64, total: u64) -> (u64, u64) {
        let mut backend = ClearBackend::default();
        let bid = StoredBid {
            price: backend.encrypt(price).unwrap(),
            quantity: backend.encrypt(quantity).unwrap(),
            identity: backend.encrypt(1).unwrap(),
        };
        let total = backend.encrypt(total).unwrap();
        let zero = backend.encrypt(0).unwrap();

        let (p, q) = validate_bid(&mut backend, &bid, total, zero).unwrap();
        (backend.decrypt(p).unwrap(), backend.decrypt(q).unwrap())
    }

    #[test]
    fn test_valid_bid_unchanged() {
        assert_eq!(run(100, 50, 1_000), (100, 50));
    }

    #[test]
    fn test_zero_fields_reject_bid() {
        assert_eq!(run(0, 50, 1_000), (0, 0));
        assert_eq!(run(100, 0, 1_000), (0, 0));
    }

    #[test]
    fn test_quantity_clamped_to_supply() {
        assert_eq!(run(100, 5_000, 1_000), (100, 1_000));
        assert_eq!(run(100, 1_000, 1_000), (100, 1_000));
    }

    #[test]
    fn test_validation_idempotent() {
        let mut backend = ClearBackend::default();
        let total = backend.encrypt(1_000).unwrap();
        let zero = backend.encrypt(0).unwrap();
        let bid = StoredBid {
            price: backend.encrypt(7).unwrap(),
            quantity: backend.encrypt(9_999).unwrap(),
            identity: backend.encrypt(1).unwrap(),
        };

        let (p1, q1) = validate_bid(&mut backend, &bid, total, zero).unwrap();
        let again = StoredBid {
            price: p1,
            quantity: q1,
            identity: bid.identity,
        };
        let (p2, q2) = validate_bid(&mut backend, &again, total, zero).unwrap();

        assert_eq!(backend.decrypt(p1).unwrap(), backend.decrypt(p2).unwrap());
        assert_eq!(backend.decrypt(q1).unwrap(), backend.decrypt(q2).unwrap());
    }
}
