//! Host adapter for one confidential uniform-price auction.
//!
//! This module wraps the computation engine with everything a host needs to
//! run an auction:
//!
//! - Bidder registration and escrowed deposits
//! - Permissionless, budgeted advancement of the engine
//! - Direct (by identity) and blind (by rank) claims
//! - The decryption oracle callback and settlement
//! - Termination returning unsold supply
//!
//! # Architecture
//!
//! - `call`: Message types for state-changing operations
//! - `handlers`: Business logic for processing calls
//! - `queries`: Read-only state access
//! - `state`: Auction state structures
//! - `genesis`: Initial configuration
//! - `error`: Error types
//!
//! # Example
//!
//! ```ignore
//! use auction_module::{handlers, AuctionGenesisConfig, AuctionState, CallContext};
//!
//! let mut state = AuctionState::simulated(AuctionGenesisConfig::default())?;
//! let ctx = CallContext { ... };
//!
//! // Submit a bid
//! let id = handlers::handle_submit_bid(&mut state, &ctx, price, quantity)?;
//!
//! // Drive the engine and claim
//! handlers::handle_advance(&mut state, &ctx, 100, 50_000)?;
//! let request = handlers::handle_direct_claim(&mut state, &ctx, &mut gateway, id)?;
//! ```

pub mod call;
pub mod error;
pub mod genesis;
pub mod handlers;
pub mod queries;
pub mod state;

pub use call::{AuctionCall, CallOutcome};
pub use error::AuctionError;
pub use genesis::{AuctionGenesisConfig, GenesisValidationError};
pub use handlers::{handle_call, CallContext, HandlerResult};
pub use queries::{AuctionQuery, AuctionQueryResponse, AuctionStatus};
pub use state::{AuctionState, ClaimKind, SettlementOutcome, SettlementReceipt};
