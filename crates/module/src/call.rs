//! Call message types for the auction module.

use auction_types::{BidderId, EncU64, RequestId, Step, WorkReport};
use borsh::{BorshDeserialize, BorshSerialize};

use crate::state::SettlementReceipt;

/// Call messages for the auction module.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub enum AuctionCall {
    // === Bidding ===
    /// Submit an encrypted bid; the attached value is escrowed.
    SubmitBid { price: EncU64, quantity: EncU64 },

    /// Withdraw the sender's bid before validation starts.
    CancelBid,

    // === Computation (permissionless) ===
    /// Perform up to `max_units` units of `step`.
    DoWork {
        step: Step,
        max_units: u64,
        budget: u64,
    },

    /// Perform up to `max_units` units of the current step.
    Advance { max_units: u64, budget: u64 },

    // === Claims ===
    /// Claim the outcome of a bidder by identity (permissionless).
    DirectClaim { bidder: BidderId },

    /// Claim the sender's rank slot (registered bidders only).
    BlindClaim,

    /// Deliver decrypted values (oracle only).
    DecryptionCallback {
        request_id: RequestId,
        values: Vec<u64>,
    },

    /// Reissue a decryption request past its deadline.
    ReissueDecryption { request_id: RequestId },

    // === Admin ===
    /// Return unsold supply to the beneficiary (beneficiary only).
    Terminate,
}

impl AuctionCall {
    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            AuctionCall::SubmitBid { .. } => "submit_bid",
            AuctionCall::CancelBid => "cancel_bid",
            AuctionCall::DoWork { .. } => "do_work",
            AuctionCall::Advance { .. } => "advance",
            AuctionCall::DirectClaim { .. } => "direct_claim",
            AuctionCall::BlindClaim => "blind_claim",
            AuctionCall::DecryptionCallback { .. } => "decryption_callback",
            AuctionCall::ReissueDecryption { .. } => "reissue_decryption",
            AuctionCall::Terminate => "terminate",
        }
    }
}

/// Result of a dispatched call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CallOutcome {
    BidAccepted(BidderId),
    Refunded(u64),
    Work(WorkReport),
    DecryptionRequested(RequestId),
    /// `None` when the callback resolved to an already settled bidder
    Settled(Option<SettlementReceipt>),
    /// Unsold supply returned to the beneficiary
    Terminated(u64),
}
