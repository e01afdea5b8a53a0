//! Call handlers for the auction module.
//!
//! These functions implement the business logic for each call type. Every
//! precondition is checked before the first mutation, so a rejected call
//! leaves the state untouched.

use auction_crypto::{Budget, ObliviousBackend};
use auction_types::{
    Address, BidderId, DecryptionGateway, EncU64, RequestId, Step, WorkReport,
};
use tracing::{debug, error, info, warn};

use crate::call::{AuctionCall, CallOutcome};
use crate::error::AuctionError;
use crate::state::{
    AuctionState, ClaimKind, PendingDecryption, SettlementOutcome, SettlementReceipt,
};

/// Context provided by the runtime for each call.
pub struct CallContext {
    /// Sender of the transaction
    pub sender: Address,
    /// Current block height
    pub block_height: u64,
    /// Current timestamp
    pub timestamp: u64,
    /// Value attached to the call (for deposits)
    pub value: u64,
}

/// Result type for handlers.
pub type HandlerResult<T> = Result<T, AuctionError>;

fn ensure_active<B>(state: &AuctionState<B>) -> HandlerResult<()> {
    if state.terminated {
        return Err(AuctionError::Terminated);
    }
    Ok(())
}

fn invariant(message: String) -> AuctionError {
    error!(%message, "Invariant violation");
    AuctionError::InvariantViolation(message)
}

// =========================
// BIDDING
// =========================

/// Handle SubmitBid call. The attached value is escrowed as deposit.
pub fn handle_submit_bid<B: ObliviousBackend>(
    state: &mut AuctionState<B>,
    ctx: &CallContext,
    price: EncU64,
    quantity: EncU64,
) -> HandlerResult<BidderId> {
    ensure_active(state)?;

    if state.bidders.contains_key(&ctx.sender) {
        return Err(AuctionError::AlreadyBid);
    }

    let id = state.bidder_addresses.len() as BidderId + 1;
    state
        .engine
        .add_bid(&mut state.backend, id, price, quantity)?;

    state.register_bidder(ctx.sender);
    state.add_escrow(ctx.sender, ctx.value);

    info!(
        bidder = id,
        address = %hex::encode(ctx.sender),
        deposit = ctx.value,
        "Bid accepted"
    );

    Ok(id)
}

/// Handle CancelBid call. Only possible before validation starts.
///
/// Returns the refunded deposit.
pub fn handle_cancel_bid<B>(state: &mut AuctionState<B>, ctx: &CallContext) -> HandlerResult<u64> {
    ensure_active(state)?;

    let id = state
        .bidder_id(&ctx.sender)
        .ok_or(AuctionError::NotRegistered)?;
    if state.settled.contains(&id) {
        return Err(AuctionError::AlreadySettled(id));
    }

    state.engine.remove_bid(id)?;

    let refund = state.take_escrow(&ctx.sender);
    state.credit_payout(ctx.sender, refund);
    state.settled.insert(id);
    state.receipts.push(SettlementReceipt {
        bidder: id,
        address: ctx.sender,
        outcome: SettlementOutcome::Cancelled,
        refunded: refund,
    });

    info!(bidder = id, refund, "Bid cancelled");
    Ok(refund)
}

// =========================
// COMPUTATION
// =========================

/// Handle DoWork call: up to `max_units` units of `step` within `budget`.
pub fn handle_do_work<B: ObliviousBackend>(
    state: &mut AuctionState<B>,
    _ctx: &CallContext,
    step: Step,
    max_units: u64,
    budget: u64,
) -> HandlerResult<WorkReport> {
    ensure_active(state)?;

    let mut budget = Budget::new(budget);
    let report = state
        .engine
        .do_work(&mut state.backend, step, max_units, &mut budget)?;
    Ok(report)
}

/// Handle Advance call: [`handle_do_work`] on the current step.
pub fn handle_advance<B: ObliviousBackend>(
    state: &mut AuctionState<B>,
    ctx: &CallContext,
    max_units: u64,
    budget: u64,
) -> HandlerResult<WorkReport> {
    let step = state.engine.step();
    handle_do_work(state, ctx, step, max_units, budget)
}

// =========================
// CLAIMS
// =========================

/// Handle DirectClaim call for `bidder`.
///
/// Anyone may trigger it; proceeds only ever go to the bidder and the
/// beneficiary. The bidder is marked settled before the request is issued.
pub fn handle_direct_claim<B, G: DecryptionGateway>(
    state: &mut AuctionState<B>,
    ctx: &CallContext,
    gateway: &mut G,
    bidder: BidderId,
) -> HandlerResult<RequestId> {
    ensure_active(state)?;

    if !state.engine.ready_for_direct_claim() {
        return Err(AuctionError::ClaimNotReady(state.engine.step()));
    }
    if state.bidder_address(bidder).is_none() {
        return Err(AuctionError::UnknownBidder(bidder));
    }
    if state.settled.contains(&bidder) {
        return Err(AuctionError::AlreadySettled(bidder));
    }
    let allocation = state
        .engine
        .allocation_by_identity(bidder)
        .ok_or(AuctionError::UnknownBidder(bidder))?;
    let uniform = state
        .engine
        .uniform_price()
        .ok_or_else(|| invariant("finished engine without uniform price".to_string()))?;

    state.settled.insert(bidder);

    let handles = vec![allocation.price, allocation.quantity, uniform];
    let request_id = issue_request(
        state,
        ctx,
        gateway,
        ClaimKind::Direct { bidder },
        handles,
    );

    info!(
        bidder,
        request_id = %hex::encode(request_id),
        "Direct claim requested"
    );
    Ok(request_id)
}

/// Handle BlindClaim call.
///
/// The sender must be a registered bidder. On the first call it is assigned a
/// rank slot, which it keeps for later calls. Who occupies the rank is only
/// learned inside the decryption callback.
pub fn handle_blind_claim<B, G: DecryptionGateway>(
    state: &mut AuctionState<B>,
    ctx: &CallContext,
    gateway: &mut G,
) -> HandlerResult<RequestId> {
    ensure_active(state)?;

    if state.bidder_id(&ctx.sender).is_none() {
        return Err(AuctionError::NotRegistered);
    }
    if !state.engine.ready_for_blind_claim() {
        return Err(AuctionError::ClaimNotReady(state.engine.step()));
    }

    let assigned = state.rank_slots.get(&ctx.sender).copied();
    let rank = match assigned {
        Some(rank) => rank,
        None if state.next_rank_slot < state.engine.bid_count() => state.next_rank_slot,
        None => return Err(AuctionError::NoRankAvailable),
    };
    if state.rank_claimed.contains(&rank) {
        return Err(AuctionError::RankAlreadyClaimed(rank));
    }

    let slot = *state
        .engine
        .bid_by_rank(rank)
        .ok_or_else(|| invariant(format!("rank {rank} has no slot")))?;
    let uniform = state
        .engine
        .uniform_price()
        .ok_or_else(|| invariant("allocated engine without uniform price".to_string()))?;

    if assigned.is_none() {
        state.rank_slots.insert(ctx.sender, rank);
        state.next_rank_slot += 1;
    }
    state.rank_claimed.insert(rank);

    let handles = vec![slot.bidder, slot.price, slot.won, uniform];
    let request_id = issue_request(
        state,
        ctx,
        gateway,
        ClaimKind::Blind { rank },
        handles,
    );

    info!(
        rank,
        request_id = %hex::encode(request_id),
        "Blind claim requested"
    );
    Ok(request_id)
}

fn issue_request<B, G: DecryptionGateway>(
    state: &mut AuctionState<B>,
    ctx: &CallContext,
    gateway: &mut G,
    kind: ClaimKind,
    handles: Vec<EncU64>,
) -> RequestId {
    let deadline = ctx.block_height.saturating_add(state.config.decryption_window);
    let request_id = gateway.request_decryption(&handles, deadline);
    state.pending.insert(
        request_id,
        PendingDecryption {
            kind,
            handles,
            deadline,
        },
    );
    request_id
}

/// Handle ReissueDecryption call for a request past its deadline.
///
/// The old identifier is dropped; a late callback for it is rejected.
pub fn handle_reissue_decryption<B, G: DecryptionGateway>(
    state: &mut AuctionState<B>,
    ctx: &CallContext,
    gateway: &mut G,
    request_id: RequestId,
) -> HandlerResult<RequestId> {
    ensure_active(state)?;

    let pending = state
        .pending
        .get(&request_id)
        .ok_or_else(|| AuctionError::UnknownRequest(hex::encode(request_id)))?;
    if ctx.block_height <= pending.deadline {
        return Err(AuctionError::RequestNotExpired(hex::encode(request_id)));
    }

    let Some(pending) = state.pending.remove(&request_id) else {
        return Err(AuctionError::UnknownRequest(hex::encode(request_id)));
    };
    let new_id = issue_request(state, ctx, gateway, pending.kind, pending.handles);

    warn!(
        expired = %hex::encode(request_id),
        reissued = %hex::encode(new_id),
        "Decryption request reissued"
    );
    Ok(new_id)
}

// =========================
// CALLBACK & SETTLEMENT
// =========================

/// Handle DecryptionCallback call from the oracle.
///
/// Returns the receipt of the settled bidder, or `None` when a blind claim
/// resolved to a bidder that was already settled.
pub fn handle_decryption_callback<B>(
    state: &mut AuctionState<B>,
    ctx: &CallContext,
    request_id: RequestId,
    values: &[u64],
) -> HandlerResult<Option<SettlementReceipt>> {
    if ctx.sender != state.config.oracle {
        warn!(
            sender = %hex::encode(ctx.sender),
            request_id = %hex::encode(request_id),
            "Rejected callback from non-oracle sender"
        );
        return Err(AuctionError::NotAuthorized);
    }
    if state.resolved.contains(&request_id) {
        warn!(request_id = %hex::encode(request_id), "Duplicate callback");
        return Err(AuctionError::AlreadyResolved(hex::encode(request_id)));
    }
    let kind = state
        .pending
        .get(&request_id)
        .map(|pending| pending.kind)
        .ok_or_else(|| AuctionError::UnknownRequest(hex::encode(request_id)))?;
    if values.len() != kind.value_count() {
        return Err(AuctionError::MalformedCallback {
            expected: kind.value_count(),
            got: values.len(),
        });
    }

    let receipt = match kind {
        ClaimKind::Direct { bidder } => {
            Some(settle(state, bidder, values[0], values[1], values[2])?)
        }
        ClaimKind::Blind { rank } => {
            let bidder = BidderId::try_from(values[0])
                .map_err(|_| invariant(format!("rank {rank} resolved to bidder {}", values[0])))?;
            if state.settled.contains(&bidder) {
                info!(rank, bidder, "Blind claim resolved to a settled bidder");
                None
            } else {
                Some(settle(state, bidder, values[1], values[2], values[3])?)
            }
        }
    };

    state.pending.remove(&request_id);
    state.resolved.insert(request_id);

    Ok(receipt)
}

/// Resolve `bidder`'s escrow from decrypted values.
fn settle<B>(
    state: &mut AuctionState<B>,
    bidder: BidderId,
    price: u64,
    won: u64,
    uniform_price: u64,
) -> HandlerResult<SettlementReceipt> {
    let address = state
        .bidder_address(bidder)
        .ok_or_else(|| invariant(format!("settling unknown bidder {bidder}")))?;
    let deposit = state.get_escrow(&address);
    let beneficiary = state.config.beneficiary;

    let (outcome, charged) = if won > 0 {
        let paid = uniform_price
            .checked_mul(won)
            .ok_or_else(|| invariant(format!("payment of bidder {bidder} overflows")))?;
        if won > state.asset_custody {
            return Err(invariant(format!(
                "allocation {won} exceeds custody {}",
                state.asset_custody
            )));
        }
        if paid > deposit {
            let penalty = state.config.penalty.min(deposit);
            warn!(
                bidder,
                owed = paid,
                deposit,
                withheld = won,
                "Winning bid not covered by deposit"
            );
            (
                SettlementOutcome::Defaulted {
                    quantity: won,
                    penalty,
                },
                penalty,
            )
        } else {
            (
                SettlementOutcome::Won {
                    quantity: won,
                    price: uniform_price,
                    paid,
                },
                paid,
            )
        }
    } else if price == 0 {
        let penalty = state.config.penalty.min(deposit);
        (SettlementOutcome::Penalized { penalty }, penalty)
    } else {
        (SettlementOutcome::Lost, 0)
    };

    let refunded = state.take_escrow(&address) - charged;
    state.credit_payout(beneficiary, charged);
    state.credit_payout(address, refunded);
    if let SettlementOutcome::Won { quantity, .. } = outcome {
        state.asset_custody -= quantity;
        state.credit_asset(address, quantity);
    }
    state.settled.insert(bidder);

    let receipt = SettlementReceipt {
        bidder,
        address,
        outcome,
        refunded,
    };
    state.receipts.push(receipt.clone());

    info!(bidder, charged, refunded, outcome = ?receipt.outcome, "Bidder settled");
    Ok(receipt)
}

// =========================
// TERMINATION
// =========================

/// Handle Terminate call. Returns unsold supply to the beneficiary.
pub fn handle_terminate<B>(state: &mut AuctionState<B>, ctx: &CallContext) -> HandlerResult<u64> {
    ensure_active(state)?;

    if ctx.sender != state.config.beneficiary {
        return Err(AuctionError::NotAuthorized);
    }
    if !state.engine.ready_for_direct_claim() {
        return Err(AuctionError::ClaimNotReady(state.engine.step()));
    }
    if !state.pending.is_empty() {
        return Err(AuctionError::PendingDecryptions(state.pending.len()));
    }
    let unsettled = state.unsettled_count();
    if unsettled > 0 {
        return Err(AuctionError::UnsettledBidders(unsettled));
    }

    let unsold = state.asset_custody;
    state.asset_custody = 0;
    state.credit_asset(state.config.beneficiary, unsold);
    state.terminated = true;

    info!(unsold, "Auction terminated");
    Ok(unsold)
}

// =========================
// DISPATCH
// =========================

/// Route a call message to its handler.
pub fn handle_call<B: ObliviousBackend, G: DecryptionGateway>(
    state: &mut AuctionState<B>,
    ctx: &CallContext,
    gateway: &mut G,
    call: AuctionCall,
) -> HandlerResult<CallOutcome> {
    debug!(sender = %hex::encode(ctx.sender), call = call.name(), "Dispatching call");

    match call {
        AuctionCall::SubmitBid { price, quantity } => {
            handle_submit_bid(state, ctx, price, quantity).map(CallOutcome::BidAccepted)
        }
        AuctionCall::CancelBid => handle_cancel_bid(state, ctx).map(CallOutcome::Refunded),
        AuctionCall::DoWork {
            step,
            max_units,
            budget,
        } => handle_do_work(state, ctx, step, max_units, budget).map(CallOutcome::Work),
        AuctionCall::Advance { max_units, budget } => {
            handle_advance(state, ctx, max_units, budget).map(CallOutcome::Work)
        }
        AuctionCall::DirectClaim { bidder } => {
            handle_direct_claim(state, ctx, gateway, bidder).map(CallOutcome::DecryptionRequested)
        }
        AuctionCall::BlindClaim => {
            handle_blind_claim(state, ctx, gateway).map(CallOutcome::DecryptionRequested)
        }
        AuctionCall::DecryptionCallback { request_id, values } => {
            handle_decryption_callback(state, ctx, request_id, &values).map(CallOutcome::Settled)
        }
        AuctionCall::ReissueDecryption { request_id } => {
            handle_reissue_decryption(state, ctx, gateway, request_id)
                .map(CallOutcome::DecryptionRequested)
        }
        AuctionCall::Terminate => handle_terminate(state, ctx).map(CallOutcome::Terminated),
    }
}
