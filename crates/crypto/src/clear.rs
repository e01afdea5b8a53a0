//! Deterministic simulated backend.
//!
//! Values live in a handle table owned by the backend; callers only ever see
//! handles. Every operation appends one entry and entries are never freed, so
//! the table and each checkpoint grow with all work done: roughly N² entries
//! per quadratic step for N bids. The backend suits simulations and tests,
//! not long-lived auctions.
//!
//! Randomness is derived from a seed and a draw counter so a restored
//! checkpoint continues with the same stream.

use auction_types::{EncBool, EncU64};
use borsh::{BorshDeserialize, BorshSerialize};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sha2::{Digest, Sha256};

use crate::backend::{Decrypt, ObliviousBackend};
use crate::error::CryptoError;

/// In-process backend keeping cleartext behind opaque handles.
#[derive(Debug, Clone, Default, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct ClearBackend {
    values: Vec<u64>,
    seed: [u8; 32],
    draws: u64,
}

impl ClearBackend {
    /// Create a backend whose random draws derive from `seed`.
    pub fn new(seed: [u8; 32]) -> Self {
        Self {
            values: Vec::new(),
            seed,
            draws: 0,
        }
    }

    /// Number of handles issued so far.
    pub fn handle_count(&self) -> usize {
        self.values.len()
    }

    /// Serialize the handle table for durable storage. The output holds every
    /// handle ever issued, eight bytes each.
    pub fn checkpoint(&self) -> Result<Vec<u8>, CryptoError> {
        borsh::to_vec(self).map_err(|e| CryptoError::SerializationError(e.to_string()))
    }

    /// Restore a backend from [`ClearBackend::checkpoint`] output.
    pub fn restore(bytes: &[u8]) -> Result<Self, CryptoError> {
        borsh::from_slice(bytes).map_err(|e| CryptoError::SerializationError(e.to_string()))
    }

    fn push(&mut self, value: u64) -> u64 {
        let handle = self.values.len() as u64;
        self.values.push(value);
        handle
    }

    fn value(&self, handle: u64) -> Result<u64, CryptoError> {
        self.values
            .get(handle as usize)
            .copied()
            .ok_or(CryptoError::UnknownHandle(handle))
    }

    fn bit(&self, handle: EncBool) -> Result<bool, CryptoError> {
        Ok(self.value(handle.0)? != 0)
    }

    fn push_bool(&mut self, bit: bool) -> EncBool {
        EncBool(self.push(bit as u64))
    }

    fn next_rng(&mut self) -> StdRng {
        let mut hasher = Sha256::new();
        hasher.update(self.seed);
        hasher.update(self.draws.to_le_bytes());
        self.draws += 1;
        StdRng::from_seed(hasher.finalize().into())
    }
}

impl ObliviousBackend for ClearBackend {
    fn encrypt(&mut self, value: u64) -> Result<EncU64, CryptoError> {
        Ok(EncU64(self.push(value)))
    }

    fn add(&mut self, a: EncU64, b: EncU64) -> Result<EncU64, CryptoError> {
        let sum = self.value(a.0)?.wrapping_add(self.value(b.0)?);
        Ok(EncU64(self.push(sum)))
    }

    fn sub(&mut self, a: EncU64, b: EncU64) -> Result<EncU64, CryptoError> {
        let difference = self.value(a.0)?.wrapping_sub(self.value(b.0)?);
        Ok(EncU64(self.push(difference)))
    }

    fn min(&mut self, a: EncU64, b: EncU64) -> Result<EncU64, CryptoError> {
        let smaller = self.value(a.0)?.min(self.value(b.0)?);
        Ok(EncU64(self.push(smaller)))
    }

    fn eq(&mut self, a: EncU64, b: EncU64) -> Result<EncBool, CryptoError> {
        let equal = self.value(a.0)? == self.value(b.0)?;
        Ok(self.push_bool(equal))
    }

    fn gt(&mut self, a: EncU64, b: EncU64) -> Result<EncBool, CryptoError> {
        let greater = self.value(a.0)? > self.value(b.0)?;
        Ok(self.push_bool(greater))
    }

    fn and(&mut self, a: EncBool, b: EncBool) -> Result<EncBool, CryptoError> {
        let both = self.bit(a)? & self.bit(b)?;
        Ok(self.push_bool(both))
    }

    fn or(&mut self, a: EncBool, b: EncBool) -> Result<EncBool, CryptoError> {
        let either = self.bit(a)? | self.bit(b)?;
        Ok(self.push_bool(either))
    }

    fn not(&mut self, a: EncBool) -> Result<EncBool, CryptoError> {
        let flipped = !self.bit(a)?;
        Ok(self.push_bool(flipped))
    }

    fn select(
        &mut self,
        cond: EncBool,
        if_true: EncU64,
        if_false: EncU64,
    ) -> Result<EncU64, CryptoError> {
        // Read both sides so the access pattern does not depend on `cond`.
        let mask = (self.bit(cond)? as u64).wrapping_neg();
        let chosen = (self.value(if_true.0)? & mask) | (self.value(if_false.0)? & !mask);
        Ok(EncU64(self.push(chosen)))
    }

    fn random_below(&mut self, bound: u64) -> Result<EncU64, CryptoError> {
        if bound == 0 {
            return Err(CryptoError::InvalidBound(bound));
        }
        let value = self.next_rng().gen_range(0..bound);
        Ok(EncU64(self.push(value)))
    }
}

impl Decrypt for ClearBackend {
    fn decrypt(&self, value: EncU64) -> Result<u64, CryptoError> {
        self.value(value.0)
    }

    fn decrypt_bool(&self, value: EncBool) -> Result<bool, CryptoError> {
        self.bit(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_table_grows_per_operation() -> Result<(), CryptoError> {
        let mut backend = ClearBackend::default();
        let a = backend.encrypt(1)?;
        let empty = backend.checkpoint()?.len();

        for _ in 0..10 {
            backend.add(a, a)?;
        }

        assert_eq!(backend.handle_count(), 11);
        assert_eq!(backend.checkpoint()?.len(), empty + 10 * 8);
        Ok(())
    }

    #[test]
    fn test_arithmetic() -> Result<(), CryptoError> {
        let mut backend = ClearBackend::default();
        let a = backend.encrypt(10)?;
        let b = backend.encrypt(3)?;

        let sum = backend.add(a, b)?;
        let difference = backend.sub(a, b)?;
        let smaller = backend.min(a, b)?;

        assert_eq!(backend.decrypt(sum)?, 13);
        assert_eq!(backend.decrypt(difference)?, 7);
        assert_eq!(backend.decrypt(smaller)?, 3);
        Ok(())
    }

    #[test]
    fn test_subtraction_wraps() -> Result<(), CryptoError> {
        let mut backend = ClearBackend::default();
        let a = backend.encrypt(0)?;
        let b = backend.encrypt(1)?;
        let wrapped = backend.sub(a, b)?;
        assert_eq!(backend.decrypt(wrapped)?, u64::MAX);
        Ok(())
    }

    #[test]
    fn test_comparisons_and_logic() -> Result<(), CryptoError> {
        let mut backend = ClearBackend::default();
        let a = backend.encrypt(8)?;
        let b = backend.encrypt(5)?;

        let greater = backend.gt(a, b)?;
        let equal = ObliviousBackend::eq(&mut backend, a, b)?;
        let less = backend.lt(a, b)?;
        let both = backend.and(greater, equal)?;
        let either = backend.or(greater, equal)?;
        let neither = backend.not(either)?;

        assert!(backend.decrypt_bool(greater)?);
        assert!(!backend.decrypt_bool(equal)?);
        assert!(!backend.decrypt_bool(less)?);
        assert!(!backend.decrypt_bool(both)?);
        assert!(backend.decrypt_bool(either)?);
        assert!(!backend.decrypt_bool(neither)?);
        Ok(())
    }

    #[test]
    fn test_select() -> Result<(), CryptoError> {
        let mut backend = ClearBackend::default();
        let a = backend.encrypt(100)?;
        let b = backend.encrypt(200)?;
        let yes = ObliviousBackend::eq(&mut backend, a, a)?;
        let no = backend.not(yes)?;

        let picked_true = backend.select(yes, a, b)?;
        let picked_false = backend.select(no, a, b)?;

        assert_eq!(backend.decrypt(picked_true)?, 100);
        assert_eq!(backend.decrypt(picked_false)?, 200);
        Ok(())
    }

    #[test]
    fn test_random_below_is_bounded_and_seeded() -> Result<(), CryptoError> {
        let mut first = ClearBackend::new([7u8; 32]);
        let mut second = ClearBackend::new([7u8; 32]);

        for _ in 0..50 {
            let x = first.random_below(10)?;
            let y = second.random_below(10)?;
            let x = first.decrypt(x)?;
            assert!(x < 10);
            assert_eq!(x, second.decrypt(y)?);
        }

        assert_eq!(first.random_below(0), Err(CryptoError::InvalidBound(0)));
        Ok(())
    }

    #[test]
    fn test_unknown_handle() {
        let backend = ClearBackend::default();
        assert_eq!(
            backend.decrypt(EncU64(99)),
            Err(CryptoError::UnknownHandle(99))
        );
    }

    #[test]
    fn test_checkpoint_restore() -> Result<(), CryptoError> {
        let mut backend = ClearBackend::new([1u8; 32]);
        let a = backend.encrypt(42)?;
        backend.random_below(1_000)?;

        let bytes = backend.checkpoint()?;
        let mut restored = ClearBackend::restore(&bytes)?;
        assert_eq!(restored, backend);
        assert_eq!(restored.decrypt(a)?, 42);

        // Both continue with the same random stream
        let x = backend.random_below(1_000)?;
        let y = restored.random_below(1_000)?;
        assert_eq!(backend.decrypt(x)?, restored.decrypt(y)?);
        Ok(())
    }
}
