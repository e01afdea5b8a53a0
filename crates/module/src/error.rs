//! Auction module error types.

use thiserror::Error;

use auction_engine::EngineError;
use auction_types::{BidderId, Step};

/// Errors that can occur in the auction module.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuctionError {
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Invalid genesis config: {0}")]
    InvalidGenesis(String),

    #[error("Sender is not a registered bidder")]
    NotRegistered,

    #[error("Already submitted bid")]
    AlreadyBid,

    #[error("Unknown bidder: {0}")]
    UnknownBidder(BidderId),

    #[error("Claim not ready, engine is at {0:?}")]
    ClaimNotReady(Step),

    #[error("Bidder {0} already settled")]
    AlreadySettled(BidderId),

    #[error("Rank {0} already claimed")]
    RankAlreadyClaimed(u32),

    #[error("No rank left to claim")]
    NoRankAvailable,

    #[error("Unknown decryption request: {0}")]
    UnknownRequest(String),

    #[error("Decryption request already resolved: {0}")]
    AlreadyResolved(String),

    #[error("Decryption request {0} has not expired")]
    RequestNotExpired(String),

    #[error("Malformed callback: expected {expected} values, got {got}")]
    MalformedCallback { expected: usize, got: usize },

    #[error("Cannot terminate: {0} decryption requests pending")]
    PendingDecryptions(usize),

    #[error("Cannot terminate: {0} bidders unsettled")]
    UnsettledBidders(usize),

    #[error("Auction terminated")]
    Terminated,

    #[error("Not authorized")]
    NotAuthorized,

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),
}
