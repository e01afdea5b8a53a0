//! Query handlers for the auction module.
//!
//! These functions provide read-only access to auction state. Engine outputs
//! are returned as encrypted handles.

use auction_engine::{RankSlot, StoredBid};
use auction_types::{Address, BidderId, EncU64, RequestId, Step};
use serde::{Deserialize, Serialize};

use crate::state::{AuctionState, ClaimKind, SettlementReceipt};

/// Query request types.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum AuctionQuery {
    /// Step machine status.
    GetStatus,

    /// Get a bidder's identity.
    GetBidderId { address: Address },

    /// Get the encrypted bid of a bidder.
    GetBid { bidder: BidderId },

    /// Get the encrypted occupant of a rank.
    GetBidByRank { rank: u32 },

    /// Get the encrypted uniform price.
    GetUniformPrice,

    /// Get user's escrow balance.
    GetEscrow { address: Address },

    /// Get currency credited to a user by settlement.
    GetPayout { address: Address },

    /// Get auctioned asset credited to a user.
    GetAssetBalance { address: Address },

    /// Get the rank slot assigned to an intermediary.
    GetRankSlot { address: Address },

    /// Get a bidder's settlement receipt.
    GetReceipt { bidder: BidderId },

    /// List outstanding decryption requests.
    ListPendingRequests,
}

/// Snapshot of the step machine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuctionStatus {
    pub step: Step,
    pub progress: u64,
    pub max: u64,
    pub bid_count: u32,
    pub ready_for_blind_claim: bool,
    pub ready_for_direct_claim: bool,
    pub unsettled: usize,
    pub asset_custody: u64,
    pub terminated: bool,
}

/// Summary of an outstanding decryption request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingRequestSummary {
    pub request_id: RequestId,
    pub kind: ClaimKind,
    pub deadline: u64,
}

/// Query response types.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum AuctionQueryResponse {
    Status(AuctionStatus),

    BidderId(Option<BidderId>),

    /// Encrypted (price, quantity)
    Bid(Option<(EncU64, EncU64)>),

    /// Encrypted (bidder, price, quantity, won)
    BidByRank(Option<(EncU64, EncU64, EncU64, EncU64)>),

    UniformPrice(Option<EncU64>),

    Escrow(u64),

    Payout(u64),

    AssetBalance(u64),

    RankSlot(Option<u32>),

    Receipt(Option<SettlementReceipt>),

    PendingRequests(Vec<PendingRequestSummary>),
}

/// Handle a query.
pub fn handle_query<B>(state: &AuctionState<B>, query: AuctionQuery) -> AuctionQueryResponse {
    match query {
        AuctionQuery::GetStatus => AuctionQueryResponse::Status(get_status(state)),

        AuctionQuery::GetBidderId { address } => {
            AuctionQueryResponse::BidderId(state.bidder_id(&address))
        }

        AuctionQuery::GetBid { bidder } => {
            let bid = state
                .engine
                .bid_by_identity(bidder)
                .map(|StoredBid { price, quantity, .. }| (*price, *quantity));
            AuctionQueryResponse::Bid(bid)
        }

        AuctionQuery::GetBidByRank { rank } => {
            let slot = state.engine.bid_by_rank(rank).map(
                |RankSlot {
                     bidder,
                     price,
                     quantity,
                     won,
                 }| (*bidder, *price, *quantity, *won),
            );
            AuctionQueryResponse::BidByRank(slot)
        }

        AuctionQuery::GetUniformPrice => {
            AuctionQueryResponse::UniformPrice(state.engine.uniform_price())
        }

        AuctionQuery::GetEscrow { address } => {
            AuctionQueryResponse::Escrow(state.get_escrow(&address))
        }

        AuctionQuery::GetPayout { address } => {
            AuctionQueryResponse::Payout(state.get_payout(&address))
        }

        AuctionQuery::GetAssetBalance { address } => {
            AuctionQueryResponse::AssetBalance(state.get_asset_balance(&address))
        }

        AuctionQuery::GetRankSlot { address } => {
            AuctionQueryResponse::RankSlot(state.rank_slots.get(&address).copied())
        }

        AuctionQuery::GetReceipt { bidder } => {
            let receipt = state
                .receipts
                .iter()
                .find(|receipt| receipt.bidder == bidder)
                .cloned();
            AuctionQueryResponse::Receipt(receipt)
        }

        AuctionQuery::ListPendingRequests => {
            AuctionQueryResponse::PendingRequests(get_expired_requests(state, 0))
        }
    }
}

/// Current step machine status.
pub fn get_status<B>(state: &AuctionState<B>) -> AuctionStatus {
    let engine = &state.engine;
    let step = engine.step();
    AuctionStatus {
        step,
        progress: engine.progress(step),
        max: engine.step_max(step).unwrap_or(0),
        bid_count: engine.bid_count(),
        ready_for_blind_claim: engine.ready_for_blind_claim(),
        ready_for_direct_claim: engine.ready_for_direct_claim(),
        unsettled: state.unsettled_count(),
        asset_custody: state.asset_custody,
        terminated: state.terminated,
    }
}

/// Requests whose deadline is before `block_height`, ordered by deadline.
///
/// With `block_height == 0` every pending request is returned.
pub fn get_expired_requests<B>(
    state: &AuctionState<B>,
    block_height: u64,
) -> Vec<PendingRequestSummary> {
    let mut requests: Vec<PendingRequestSummary> = state
        .pending
        .iter()
        .filter(|(_, pending)| block_height == 0 || pending.deadline < block_height)
        .map(|(request_id, pending)| PendingRequestSummary {
            request_id: *request_id,
            kind: pending.kind,
            deadline: pending.deadline,
        })
        .collect();
    requests.sort_by_key(|request| (request.deadline, request.request_id));
    requests
}
