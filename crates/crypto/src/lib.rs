//! Oblivious encrypted-integer capability for confidential auctions.
//!
//! This crate defines the small interface the auction engine computes with and
//! the machinery that meters it.
//!
//! # Overview
//!
//! 1. **Capability**: [`ObliviousBackend`] offers encryption of cleartext
//!    inputs, add/sub/min, equality and greater-than, boolean logic, a
//!    branch-free select and bounded encrypted randomness. None of these
//!    operations reveal a value to the caller.
//!
//! 2. **Metering**: every operation has a fixed cost from a [`CostTable`]. The
//!    [`Metered`] wrapper charges a [`Budget`] before delegating, so a caller can
//!    bound the work done in one invocation.
//!
//! 3. **Decryption**: cleartext leaves a backend only through [`Decrypt`], which
//!    is reserved for the decryption oracle.
//!
//! 4. **Shuffle**: [`shuffle::shuffled_range`] produces an encrypted uniformly
//!    random permutation, used as a collision-free tie-break source.
//!
//! [`ClearBackend`] is a deterministic in-process backend that keeps values in a
//! handle table. It stands in for a homomorphic scheme in tests and simulations.

pub mod backend;
pub mod budget;
pub mod clear;
pub mod error;
pub mod shuffle;

pub use backend::{Decrypt, ObliviousBackend};
pub use budget::{Budget, CostTable, Metered, Op};
pub use clear::ClearBackend;
pub use error::CryptoError;
pub use shuffle::shuffled_range;
