//! Engine error types.

use auction_crypto::CryptoError;
use auction_types::{BidderId, Step};
use thiserror::Error;

/// Errors that can occur in the computation engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Bidder {0} already submitted a bid")]
    AlreadyBid(BidderId),

    #[error("Invalid bidder identity {0}")]
    InvalidBidder(BidderId),

    #[error("No bid for bidder {0}")]
    BidNotFound(BidderId),

    #[error("Maximum bid count reached: {0}")]
    TooManyBids(u32),

    #[error("Bids are sealed once validation has started")]
    BidsSealed,

    #[error("Step {requested:?} not ready, engine is at {current:?}")]
    StepNotReady { requested: Step, current: Step },

    #[error("Unit {unit} out of range for step {step:?}")]
    UnitOutOfRange { step: Step, unit: u64 },

    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    #[error("Encrypted value error: {0}")]
    Crypto(#[from] CryptoError),
}
