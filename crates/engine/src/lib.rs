//! Auction computation engine for confidential uniform-price auctions.
//!
//! Every bid is an encrypted (price, quantity) pair. The engine derives a total
//! order over bidders, each bidder's won quantity and the uniform clearing
//! price using only oblivious operations, and splits that work into four
//! resumable steps:
//!
//! 1. **Validation**: bids with a zero price or zero quantity become (0, 0);
//!    quantities are clamped to the offered supply.
//! 2. **Ranking**: one comparison per unordered pair of bidders; each bidder's
//!    rank is the number of bidders outranking it.
//! 3. **Allocation by rank**: the occupant of every rank is selected, supply is
//!    consumed in rank order and the clearing price is tracked.
//! 4. **Allocation by identity**: rank-indexed allocations are mapped back to
//!    bidder identities so claims never reveal a rank.
//!
//! Each step exposes a "do up to N units" entry point metered against a
//! [`auction_crypto::Budget`]. A unit is committed only once all of its
//! operations succeed, so a call that runs out of budget leaves progress
//! exactly where it stopped.

pub mod allocation;
pub mod comparator;
pub mod engine;
pub mod error;
pub mod ranking;
pub mod remap;
pub mod store;
pub mod validation;

pub use allocation::RankSlot;
pub use engine::{Allocation, Engine, EngineConfig, MAX_BID_COUNT};
pub use error::EngineError;
pub use store::{BidStore, StoredBid};
