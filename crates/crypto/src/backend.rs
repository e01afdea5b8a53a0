//! The oblivious operation set.
//!
//! Every method consumes handles and produces fresh handles. Implementations
//! must keep their control flow independent of the values behind the handles.

use auction_types::{EncBool, EncU64};

use crate::error::CryptoError;

/// Capability interface over encrypted unsigned integers.
///
/// Arithmetic wraps on overflow, matching fixed-width encrypted integer types.
/// Callers are responsible for keeping operands in range.
pub trait ObliviousBackend {
    /// Encrypt a cleartext value (a public constant or a client input).
    fn encrypt(&mut self, value: u64) -> Result<EncU64, CryptoError>;

    /// `a + b`, wrapping.
    fn add(&mut self, a: EncU64, b: EncU64) -> Result<EncU64, CryptoError>;

    /// `a - b`, wrapping.
    fn sub(&mut self, a: EncU64, b: EncU64) -> Result<EncU64, CryptoError>;

    /// Smaller of `a` and `b`.
    fn min(&mut self, a: EncU64, b: EncU64) -> Result<EncU64, CryptoError>;

    /// `a == b`
    fn eq(&mut self, a: EncU64, b: EncU64) -> Result<EncBool, CryptoError>;

    /// `a > b`
    fn gt(&mut self, a: EncU64, b: EncU64) -> Result<EncBool, CryptoError>;

    fn and(&mut self, a: EncBool, b: EncBool) -> Result<EncBool, CryptoError>;

    fn or(&mut self, a: EncBool, b: EncBool) -> Result<EncBool, CryptoError>;

    fn not(&mut self, a: EncBool) -> Result<EncBool, CryptoError>;

    /// Branch-free `cond ? if_true : if_false`.
    fn select(
        &mut self,
        cond: EncBool,
        if_true: EncU64,
        if_false: EncU64,
    ) -> Result<EncU64, CryptoError>;

    /// Encrypted uniform random value in `[0, bound)`.
    fn random_below(&mut self, bound: u64) -> Result<EncU64, CryptoError>;

    /// `a >= b`
    fn ge(&mut self, a: EncU64, b: EncU64) -> Result<EncBool, CryptoError> {
        let greater = self.gt(a, b)?;
        let equal = self.eq(a, b)?;
        self.or(greater, equal)
    }

    /// `a < b`
    fn lt(&mut self, a: EncU64, b: EncU64) -> Result<EncBool, CryptoError> {
        self.gt(b, a)
    }
}

/// Conversion of encrypted values back to cleartext.
///
/// Only the decryption oracle holds this capability; engine code never does.
pub trait Decrypt {
    fn decrypt(&self, value: EncU64) -> Result<u64, CryptoError>;

    fn decrypt_bool(&self, value: EncBool) -> Result<bool, CryptoError>;
}
