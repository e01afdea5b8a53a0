//! Rank accumulation (step 2).
//!
//! Ranks are running counters, one per bidder. Unordered pairs `(i, j)` with
//! `i < j` are enumerated row-major; unit `p` always maps to the same pair, so
//! work can stop and resume at any unit boundary.

use auction_crypto::{CryptoError, ObliviousBackend};
use auction_types::{EncBool, EncU64};

/// Number of unordered pairs among `n` bidders.
pub fn pair_count(n: u64) -> u64 {
    n * n.saturating_sub(1) / 2
}

/// The `index`-th pair `(i, j)`, `i < j`, in row-major order.
pub fn pair_at(n: u64, index: u64) -> Option<(usize, usize)> {
    let mut remaining = index;
    for row in 0..n {
        let row_len = n - 1 - row;
        if remaining < row_len {
            return Some((row as usize, (row + 1 + remaining) as usize));
        }
        remaining -= row_len;
    }
    None
}

/// Add the outcome of one comparison to both counters.
///
/// Returns the updated `(earlier_rank, later_rank)`.
pub fn tally<B: ObliviousBackend>(
    ops: &mut B,
    earlier_rank: EncU64,
    later_rank: EncU64,
    earlier_wins: EncBool,
    one: EncU64,
    zero: EncU64,
) -> Result<(EncU64, EncU64), CryptoError> {
    let later_step = ops.select(earlier_wins, one, zero)?;
    let earlier_step = ops.select(earlier_wins, zero, one)?;
    let later_rank = ops.add(later_rank, later_step)?;
    let earlier_rank = ops.add(earlier_rank, earlier_step)?;
    Ok((earlier_rank, later_rank))
}

#[cfg(test)]
mod tests {
    use super::*;
    use auction_crypto::{ClearBackend, Decrypt};

    #[test]
    fn test_pair_count() {
        assert_eq!(pair_count(0), 0);
        assert_eq!(pair_count(1), 0);
        assert_eq!(pair_count(2), 1);
        assert_eq!(pair_count(5), 10);
    }

    #[test]
    fn test_pair_enumeration_row_major() {
        let pairs: Vec<_> = (0..pair_count(4)).map(|p| pair_at(4, p).unwrap()).collect();
        assert_eq!(
            pairs,
            vec![(0, 1), (0, 2), (0, 3), (1, 2), (1, 3), (2, 3)]
        );
        assert_eq!(pair_at(4, 6), None);
        assert_eq!(pair_at(0, 0), None);
    }

    #[test]
    fn test_tally() {
        let mut backend = ClearBackend::default();
        let zero = backend.encrypt(0).unwrap();
        let one = backend.encrypt(1).unwrap();
        let r0 = backend.encrypt(2).unwrap();
        let r1 = backend.encrypt(5).unwrap();

        let yes = ObliviousBackend::eq(&mut backend, zero, zero).unwrap();
        let (a, b) = tally(&mut backend, r0, r1, yes, one, zero).unwrap();
        assert_eq!(backend.decrypt(a).unwrap(), 2);
        assert_eq!(backend.decrypt(b).unwrap(), 6);

        let no = backend.not(yes).unwrap();
        let (a, b) = tally(&mut backend, r0, r1, no, one, zero).unwrap();
        assert_eq!(backend.decrypt(a).unwrap(), 3);
        assert_eq!(backend.decrypt(b).unwrap(), 5);
    }
}
