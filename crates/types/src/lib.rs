//! Core type definitions for confidential uniform-price auctions.
//!
//! This crate provides the shared data structures used across the auction system,
//! including encrypted value handles, tie-break policies, the step machine
//! vocabulary, and the decryption gateway seam.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

// =========================
// ENCRYPTED VALUE HANDLES
// =========================

/// Opaque handle to an encrypted unsigned 64-bit integer.
///
/// The handle carries no information about the value it refers to; only the
/// backend that issued it can operate on it.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, BorshSerialize, BorshDeserialize, Serialize, Deserialize,
)]
pub struct EncU64(pub u64);

/// Opaque handle to an encrypted boolean.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, BorshSerialize, BorshDeserialize, Serialize, Deserialize,
)]
pub struct EncBool(pub u64);

// =========================
// AUCTION TYPES
// =========================

/// Generic address type (32 bytes)
pub type Address = [u8; 32];

/// Stable bidder identity. Assigned monotonically starting at 1.
pub type BidderId = u32;

/// Identity value reserved for "no bidder".
pub const UNREGISTERED: BidderId = 0;

/// Secondary ordering applied when two bids carry the same price.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize,
)]
pub enum TieBreakPolicy {
    /// Larger quantity wins, then the earlier registration.
    #[default]
    QuantityThenRegistration,
    /// Earlier registration wins.
    Registration,
    /// Each bidder holds a unique shuffled value; the larger value wins.
    Random,
}

/// Steps of the resumable computation, in execution order.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    BorshSerialize,
    BorshDeserialize,
    Serialize,
    Deserialize,
)]
pub enum Step {
    /// Zero out malformed bids and clamp quantities.
    Validation,
    /// Pairwise comparisons accumulating each bidder's rank.
    Ranking,
    /// Per-rank selection, cumulative supply and the clearing price.
    AllocationByRank,
    /// Mapping of per-rank allocations back to bidder identities.
    AllocationById,
    /// Nothing left to compute.
    Finished,
}

impl Step {
    /// All steps that carry work, in order.
    pub const WORK_STEPS: [Step; 4] = [
        Step::Validation,
        Step::Ranking,
        Step::AllocationByRank,
        Step::AllocationById,
    ];

    /// The step following this one. `Finished` is terminal.
    pub fn next(self) -> Step {
        match self {
            Step::Validation => Step::Ranking,
            Step::Ranking => Step::AllocationByRank,
            Step::AllocationByRank => Step::AllocationById,
            Step::AllocationById | Step::Finished => Step::Finished,
        }
    }
}

/// Outcome of a "do work" invocation.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize,
)]
pub enum WorkStatus {
    /// Units remain in the current step.
    MoreWorkNeeded,
    /// The requested step (or the whole engine) has nothing left to do.
    StepOrEngineFinished,
    /// The budget did not cover a single unit of work.
    InsufficientBudget,
}

/// Report returned by every "do work" invocation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkReport {
    /// Step the call was addressed to
    pub step: Step,
    /// Outcome
    pub status: WorkStatus,
    /// Units completed by this call
    pub units_done: u64,
    /// Progress of the step after the call
    pub progress: u64,
    /// Total units of the step
    pub max: u64,
    /// Budget consumed, including any partially executed unit
    pub budget_spent: u64,
}

// =========================
// DECRYPTION GATEWAY
// =========================

/// Identifier of an outstanding decryption request.
pub type RequestId = [u8; 32];

/// Seam to the external decryption oracle.
///
/// Issuing a request returns immediately; the cleartext arrives later through
/// the host's callback entry point, tagged with the returned identifier.
pub trait DecryptionGateway {
    /// Ask the oracle to decrypt `handles`, answering no later than `deadline`.
    fn request_decryption(&mut self, handles: &[EncU64], deadline: u64) -> RequestId;
}

// =========================
// HELPER FUNCTIONS
// =========================

/// Derive a decryption request identifier from a nonce and the requested handles.
pub fn compute_request_id(nonce: u64, handles: &[EncU64]) -> RequestId {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(b"DECRYPTION_REQUEST_V1:");
    hasher.update(nonce.to_le_bytes());
    for handle in handles {
        hasher.update(handle.0.to_le_bytes());
    }
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_request_id() {
        let handles = [EncU64(1), EncU64(2)];
        let id1 = compute_request_id(1, &handles);
        let id2 = compute_request_id(2, &handles);
        let id3 = compute_request_id(1, &[EncU64(2), EncU64(1)]);

        assert_ne!(id1, id2);
        assert_ne!(id1, id3);
        assert_eq!(id1, compute_request_id(1, &handles));
    }

    #[test]
    fn test_step_order() {
        assert!(Step::Validation < Step::Ranking);
        assert!(Step::AllocationByRank < Step::AllocationById);
        assert_eq!(Step::AllocationById.next(), Step::Finished);
        assert_eq!(Step::Finished.next(), Step::Finished);

        let mut step = Step::Validation;
        for expected in Step::WORK_STEPS {
            assert_eq!(step, expected);
            step = step.next();
        }
        assert_eq!(step, Step::Finished);
    }

    #[test]
    fn test_handle_serialization() {
        let handle = EncU64(42);
        let encoded = borsh::to_vec(&handle).unwrap();
        let decoded: EncU64 = borsh::from_slice(&encoded).unwrap();
        assert_eq!(handle, decoded);
    }

    #[test]
    fn test_tie_break_policy_json() {
        let json = serde_json::to_string(&TieBreakPolicy::Random).unwrap();
        assert_eq!(json, "\"Random\"");
        assert_eq!(TieBreakPolicy::default(), TieBreakPolicy::QuantityThenRegistration);
    }
}
