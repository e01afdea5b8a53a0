//! End-to-end integration tests for the confidential auction system.
//!
//! These tests exercise the full auction lifecycle:
//! 1. Genesis and encrypted bid submission with escrow
//! 2. Budgeted, resumable computation driven by workers
//! 3. Direct and blind claims answered by the decryption coordinator
//! 4. Settlement and termination

#![cfg(test)]

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use auction_crypto::{ClearBackend, Decrypt, ObliviousBackend};
use auction_decryption_coordinator::DecryptionCoordinator;
use auction_engine::{Engine, EngineError};
use auction_module::handlers::{
    handle_advance, handle_blind_claim, handle_cancel_bid, handle_decryption_callback,
    handle_direct_claim, handle_do_work, handle_reissue_decryption, handle_submit_bid,
    handle_terminate,
};
use auction_module::queries::handle_query;
use auction_module::{
    handle_call, AuctionCall, AuctionError, AuctionGenesisConfig, AuctionQuery, AuctionQueryResponse,
    AuctionState, CallContext, CallOutcome, SettlementOutcome, SettlementReceipt,
};
use auction_types::{Address, BidderId, RequestId, Step, TieBreakPolicy, WorkStatus};
use auction_worker::{SharedAuction, WorkerConfig, WorkerPool, WorkerService};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const BENEFICIARY: Address = [0xBE; 32];
const ORACLE: Address = [0x0A; 32];
const WORKER: Address = [0xAA; 32];

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn bidder(n: usize) -> Address {
    let mut address = [0u8; 32];
    address[..8].copy_from_slice(&(n as u64).to_le_bytes());
    address[31] = 0xB1;
    address
}

/// One auction wired to a decryption coordinator acting as its oracle.
struct Harness {
    state: AuctionState<ClearBackend>,
    coordinator: DecryptionCoordinator,
    block_height: u64,
}

impl Harness {
    fn new(config: AuctionGenesisConfig) -> Result<Self> {
        init_tracing();
        let state = AuctionState::simulated(AuctionGenesisConfig {
            beneficiary: BENEFICIARY,
            oracle: ORACLE,
            ..config
        })?;
        Ok(Self {
            state,
            coordinator: DecryptionCoordinator::new(ORACLE),
            block_height: 1,
        })
    }

    fn ctx(&self, sender: Address, value: u64) -> CallContext {
        CallContext {
            sender,
            block_height: self.block_height,
            timestamp: 0,
            value,
        }
    }

    /// Submit a bid escrowing its full notional `price * quantity`.
    fn bid(&mut self, n: usize, price: u64, quantity: u64) -> Result<BidderId> {
        self.bid_with_deposit(n, price, quantity, price * quantity)
    }

    fn bid_with_deposit(
        &mut self,
        n: usize,
        price: u64,
        quantity: u64,
        deposit: u64,
    ) -> Result<BidderId> {
        let price = self.state.backend.encrypt(price)?;
        let quantity = self.state.backend.encrypt(quantity)?;
        let ctx = self.ctx(bidder(n), deposit);
        Ok(handle_submit_bid(&mut self.state, &ctx, price, quantity)?)
    }

    fn drive(&mut self, units_per_call: u64) -> Result<()> {
        let config = WorkerConfig {
            units_per_call,
            ..Default::default()
        };
        WorkerService::new(config, WORKER).drive(&mut self.state, self.block_height)?;
        Ok(())
    }

    /// Advance until the engine reaches `stop`.
    fn drive_until(&mut self, stop: Step) -> Result<()> {
        let ctx = self.ctx(WORKER, 0);
        while self.state.engine.step() < stop {
            handle_advance(&mut self.state, &ctx, 4, 50_000)?;
        }
        Ok(())
    }

    fn direct_claim(&mut self, id: BidderId) -> Result<RequestId, AuctionError> {
        let ctx = self.ctx(WORKER, 0);
        handle_direct_claim(&mut self.state, &ctx, &mut self.coordinator, id)
    }

    fn blind_claim(&mut self, n: usize) -> Result<RequestId, AuctionError> {
        let ctx = self.ctx(bidder(n), 0);
        handle_blind_claim(&mut self.state, &ctx, &mut self.coordinator)
    }

    /// Let the oracle answer every pending request and deliver the callbacks.
    fn deliver(&mut self) -> Result<Vec<Option<SettlementReceipt>>> {
        let fulfilments = self
            .coordinator
            .fulfil_pending(&self.state.backend, self.block_height);
        let ctx = self.ctx(self.coordinator.identity(), 0);

        let mut receipts = Vec::new();
        for (_, fulfilment) in fulfilments {
            let fulfilment = fulfilment.context("oracle could not fulfil request")?;
            receipts.push(handle_decryption_callback(
                &mut self.state,
                &ctx,
                fulfilment.request_id,
                &fulfilment.values,
            )?);
        }
        Ok(receipts)
    }

    fn won(&self) -> Result<Vec<u64>> {
        (1..=self.state.engine.bid_count())
            .map(|id| -> Result<u64> {
                let allocation = self
                    .state
                    .engine
                    .allocation_by_identity(id)
                    .context("engine not finished")?;
                Ok(self.state.backend.decrypt(allocation.quantity)?)
            })
            .collect()
    }

    fn uniform_price(&self) -> Result<u64> {
        let price = self
            .state
            .engine
            .uniform_price()
            .context("ranks not allocated")?;
        Ok(self.state.backend.decrypt(price)?)
    }

    /// Decrypted (bidder, price, won) of every rank, best first.
    fn ranks(&self) -> Result<Vec<(u64, u64, u64)>> {
        (0..self.state.engine.bid_count())
            .map(|rank| -> Result<(u64, u64, u64)> {
                let slot = self
                    .state
                    .engine
                    .bid_by_rank(rank)
                    .context("ranks not allocated")?;
                let backend = &self.state.backend;
                Ok((
                    backend.decrypt(slot.bidder)?,
                    backend.decrypt(slot.price)?,
                    backend.decrypt(slot.won)?,
                ))
            })
            .collect()
    }

    fn receipt(&self, id: BidderId) -> Option<&SettlementReceipt> {
        self.state.receipts.iter().find(|r| r.bidder == id)
    }

    /// Send `call` through its wire encoding, as a host would.
    fn send(&mut self, sender: Address, value: u64, call: AuctionCall) -> Result<CallOutcome> {
        let bytes = borsh::to_vec(&call)?;
        let call: AuctionCall = borsh::from_slice(&bytes)?;
        let ctx = self.ctx(sender, value);
        Ok(handle_call(&mut self.state, &ctx, &mut self.coordinator, call)?)
    }
}

/// Plain uniform-price allocation under the default tie-break.
fn reference_allocation(total: u64, bids: &[(u64, u64)]) -> (Vec<u64>, u64) {
    let mut order: Vec<(usize, u64, u64)> = bids
        .iter()
        .enumerate()
        .map(|(i, &(price, quantity))| {
            if price == 0 || quantity == 0 {
                (i, 0, 0)
            } else {
                (i, price, quantity.min(total))
            }
        })
        .collect();
    order.sort_by(|a, b| b.1.cmp(&a.1).then(b.2.cmp(&a.2)).then(a.0.cmp(&b.0)));

    let mut won = vec![0; bids.len()];
    let mut remaining = total;
    let mut price = 0;
    for (i, bid_price, quantity) in order {
        let take = quantity.min(remaining);
        remaining -= take;
        won[i] = take;
        if take > 0 {
            price = bid_price;
        }
    }
    (won, price)
}

/// The three-bid auction from the design notes, settled by direct claims.
#[test]
fn test_reference_auction_end_to_end() -> Result<()> {
    // ========================================
    // Phase 1: Genesis and bidding
    // ========================================

    let mut h = Harness::new(AuctionGenesisConfig {
        total_quantity: 1_000_000,
        ..Default::default()
    })?;
    let ids = [
        h.bid(1, 800, 600_000)?,
        h.bid(2, 200, 500_000)?,
        h.bid(3, 1, 1_000_000)?,
    ];
    assert_eq!(ids, [1, 2, 3]);

    // ========================================
    // Phase 2: Computation
    // ========================================

    h.drive(5)?;
    assert_eq!(h.state.engine.step(), Step::Finished);
    assert_eq!(
        h.ranks()?,
        vec![(1, 800, 600_000), (2, 200, 400_000), (3, 1, 0)]
    );
    assert_eq!(h.won()?, vec![600_000, 400_000, 0]);
    assert_eq!(h.uniform_price()?, 200);

    // ========================================
    // Phase 3: Claims and settlement
    // ========================================

    for id in ids {
        h.direct_claim(id)?;
    }
    assert_eq!(h.coordinator.pending_requests().len(), 3);

    let receipts = h.deliver()?;
    assert_eq!(receipts.iter().flatten().count(), 3);
    assert!(h.state.pending.is_empty());

    assert_eq!(
        h.receipt(1).map(|r| r.outcome.clone()),
        Some(SettlementOutcome::Won {
            quantity: 600_000,
            price: 200,
            paid: 120_000_000,
        })
    );
    assert_eq!(h.receipt(3).map(|r| r.outcome.clone()), Some(SettlementOutcome::Lost));

    assert_eq!(h.state.get_payout(&bidder(1)), 360_000_000);
    assert_eq!(h.state.get_payout(&bidder(2)), 20_000_000);
    assert_eq!(h.state.get_payout(&bidder(3)), 1_000_000);
    assert_eq!(h.state.get_payout(&BENEFICIARY), 200_000_000);

    assert_eq!(h.state.get_asset_balance(&bidder(1)), 600_000);
    assert_eq!(h.state.get_asset_balance(&bidder(2)), 400_000);
    assert_eq!(h.state.get_asset_balance(&bidder(3)), 0);

    // ========================================
    // Phase 4: Termination
    // ========================================

    let ctx = h.ctx(BENEFICIARY, 0);
    assert_eq!(handle_terminate(&mut h.state, &ctx)?, 0);

    let AuctionQueryResponse::Status(status) = handle_query(&h.state, AuctionQuery::GetStatus)
    else {
        return Err(anyhow!("unexpected query response"));
    };
    assert!(status.terminated);
    assert_eq!(status.unsettled, 0);
    assert_eq!(status.asset_custody, 0);
    Ok(())
}

#[test]
fn test_direct_claims_are_exclusive() -> Result<()> {
    let mut h = Harness::new(AuctionGenesisConfig {
        total_quantity: 50,
        ..Default::default()
    })?;
    for (n, (price, quantity)) in [(9, 20), (7, 20), (5, 20), (3, 20)].into_iter().enumerate() {
        h.bid(n + 1, price, quantity)?;
    }
    h.drive(3)?;

    for id in 1..=4 {
        h.direct_claim(id)?;
    }
    assert_eq!(h.direct_claim(1), Err(AuctionError::AlreadySettled(1)));
    assert_eq!(h.direct_claim(5), Err(AuctionError::UnknownBidder(5)));

    let receipts = h.deliver()?;
    assert_eq!(receipts.iter().flatten().count(), 4);
    assert_eq!(h.state.unsettled_count(), 0);
    assert_eq!(h.won()?, vec![20, 20, 10, 0]);
    assert_eq!(h.uniform_price()?, 5);
    Ok(())
}

#[test]
fn test_blind_claims_settle_every_rank() -> Result<()> {
    let mut h = Harness::new(AuctionGenesisConfig {
        total_quantity: 50,
        ..Default::default()
    })?;
    let bids = [(5, 20), (9, 20), (3, 20), (7, 20)];
    for (n, (price, quantity)) in bids.into_iter().enumerate() {
        h.bid(n + 1, price, quantity)?;
    }

    assert_eq!(h.blind_claim(1), Err(AuctionError::ClaimNotReady(Step::Validation)));

    // Blind claims open before identities are remapped.
    h.drive_until(Step::AllocationById)?;
    assert_eq!(h.state.engine.step(), Step::AllocationById);
    assert_eq!(
        h.direct_claim(1),
        Err(AuctionError::ClaimNotReady(Step::AllocationById))
    );

    for n in 1..=4 {
        h.blind_claim(n)?;
    }
    assert_eq!(h.blind_claim(1), Err(AuctionError::RankAlreadyClaimed(0)));
    assert_eq!(h.blind_claim(9), Err(AuctionError::NotRegistered));

    let receipts = h.deliver()?;
    let mut settled: Vec<BidderId> = receipts.iter().flatten().map(|r| r.bidder).collect();
    settled.sort_unstable();
    assert_eq!(settled, vec![1, 2, 3, 4]);

    // Quantities 20, 20, 10, 0 in price order 9, 7, 5, 3.
    assert_eq!(h.state.get_asset_balance(&bidder(2)), 20);
    assert_eq!(h.state.get_asset_balance(&bidder(4)), 20);
    assert_eq!(h.state.get_asset_balance(&bidder(1)), 10);
    assert_eq!(h.state.get_asset_balance(&bidder(3)), 0);
    assert_eq!(h.state.get_payout(&BENEFICIARY), 50 * 5);

    h.drive(8)?;
    assert_eq!(h.direct_claim(2), Err(AuctionError::AlreadySettled(2)));
    Ok(())
}

#[test]
fn test_blind_claim_on_settled_bidder_pays_nothing() -> Result<()> {
    let mut h = Harness::new(AuctionGenesisConfig {
        total_quantity: 10,
        ..Default::default()
    })?;
    h.bid(1, 9, 10)?;
    h.bid(2, 4, 10)?;
    h.drive(4)?;

    h.direct_claim(1)?;
    h.deliver()?;
    let payout = h.state.get_payout(&bidder(1));
    let beneficiary = h.state.get_payout(&BENEFICIARY);

    // Bidder 2 draws rank 0, which bidder 1 occupies.
    h.blind_claim(2)?;
    assert_eq!(h.deliver()?, vec![None]);

    assert_eq!(h.state.get_payout(&bidder(1)), payout);
    assert_eq!(h.state.get_payout(&BENEFICIARY), beneficiary);
    assert_eq!(h.state.get_asset_balance(&bidder(1)), 10);
    assert_eq!(h.state.unsettled_count(), 1);

    h.direct_claim(2)?;
    h.deliver()?;
    assert_eq!(h.state.unsettled_count(), 0);
    assert_eq!(h.state.get_payout(&bidder(2)), 40);
    Ok(())
}

#[test]
fn test_zero_price_bid_is_penalized() -> Result<()> {
    let mut h = Harness::new(AuctionGenesisConfig {
        total_quantity: 100,
        penalty: 50,
        ..Default::default()
    })?;
    h.bid_with_deposit(1, 100, 10, 1_000)?;
    h.bid_with_deposit(2, 0, 10, 80)?;
    h.bid_with_deposit(3, 0, 5, 20)?;
    h.drive(16)?;

    for id in 1..=3 {
        h.direct_claim(id)?;
    }
    h.deliver()?;

    assert_eq!(
        h.receipt(2).map(|r| (r.outcome.clone(), r.refunded)),
        Some((SettlementOutcome::Penalized { penalty: 50 }, 30))
    );
    assert_eq!(
        h.receipt(3).map(|r| (r.outcome.clone(), r.refunded)),
        Some((SettlementOutcome::Penalized { penalty: 20 }, 0))
    );
    assert_eq!(h.state.get_payout(&bidder(1)), 0);
    assert_eq!(h.state.get_payout(&BENEFICIARY), 1_000 + 50 + 20);

    let ctx = h.ctx(BENEFICIARY, 0);
    assert_eq!(handle_terminate(&mut h.state, &ctx)?, 90);
    assert_eq!(h.state.get_asset_balance(&BENEFICIARY), 90);
    Ok(())
}

#[test]
fn test_underfunded_winner_cannot_block_termination() -> Result<()> {
    let mut h = Harness::new(AuctionGenesisConfig {
        total_quantity: 100,
        penalty: 10,
        ..Default::default()
    })?;
    h.bid_with_deposit(1, 30, 60, 1)?;
    h.bid(2, 20, 60)?;
    h.drive(16)?;

    // Rank 0 holds the underfunded bidder
    h.blind_claim(2)?;
    h.blind_claim(1)?;
    h.deliver()?;

    assert_eq!(
        h.receipt(1).map(|r| (r.outcome.clone(), r.refunded)),
        Some((
            SettlementOutcome::Defaulted {
                quantity: 60,
                penalty: 1
            },
            0
        ))
    );
    assert_eq!(h.state.get_asset_balance(&bidder(1)), 0);
    assert_eq!(h.state.get_asset_balance(&bidder(2)), 40);
    assert!(h.state.pending.is_empty());

    let ctx = h.ctx(BENEFICIARY, 0);
    assert_eq!(handle_terminate(&mut h.state, &ctx)?, 60);
    assert_eq!(h.state.get_payout(&BENEFICIARY), 1 + 20 * 40);
    Ok(())
}

#[test]
fn test_allocation_matches_plain_reference() -> Result<()> {
    const TOTAL: u64 = 60;

    for seed in 0..6 {
        let mut rng = StdRng::seed_from_u64(seed);
        let n = rng.gen_range(1..8);
        let bids: Vec<(u64, u64)> = (0..n)
            .map(|_| (rng.gen_range(0..20), rng.gen_range(0..40)))
            .collect();

        let mut h = Harness::new(AuctionGenesisConfig {
            total_quantity: TOTAL,
            ..Default::default()
        })?;
        for (i, &(price, quantity)) in bids.iter().enumerate() {
            h.bid(i + 1, price, quantity)?;
        }
        h.drive(rng.gen_range(1..5))?;

        let (won, price) = reference_allocation(TOTAL, &bids);
        assert_eq!(h.won()?, won, "seed {seed}, bids {bids:?}");
        assert_eq!(h.uniform_price()?, price, "seed {seed}, bids {bids:?}");

        let allocated: u64 = won.iter().sum();
        let demand: u64 = bids
            .iter()
            .filter(|(p, q)| *p > 0 && *q > 0)
            .map(|(_, q)| q)
            .sum();
        assert_eq!(allocated, demand.min(TOTAL));
    }
    Ok(())
}

#[test]
fn test_rank_bijection_under_random_tie_break() -> Result<()> {
    const TOTAL: u64 = 25;

    for seed in 0..5u8 {
        let mut rng = StdRng::seed_from_u64(u64::from(seed));
        let n = rng.gen_range(2..12);

        let mut h = Harness::new(AuctionGenesisConfig {
            total_quantity: TOTAL,
            max_bid_count: 16,
            tie_break: TieBreakPolicy::Random,
            backend_seed: [seed; 32],
            ..Default::default()
        })?;
        // Few distinct prices so most comparisons fall through to the tie-break.
        for i in 0..n {
            h.bid(i + 1, rng.gen_range(1..4), rng.gen_range(1..10))?;
        }
        h.drive(rng.gen_range(1..6))?;

        let ranks = h.ranks()?;
        let mut occupants: Vec<u64> = ranks.iter().map(|(id, _, _)| *id).collect();
        occupants.sort_unstable();
        assert_eq!(occupants, (1..=n as u64).collect::<Vec<_>>(), "seed {seed}");

        assert!(ranks.windows(2).all(|w| w[0].1 >= w[1].1), "seed {seed}");

        let total_won: u64 = ranks.iter().map(|(_, _, won)| won).sum();
        assert!(total_won <= TOTAL);

        let lowest_winner = ranks
            .iter()
            .filter(|(_, _, won)| *won > 0)
            .last()
            .map_or(0, |(_, price, _)| *price);
        assert_eq!(h.uniform_price()?, lowest_winner, "seed {seed}");
    }
    Ok(())
}

#[test]
fn test_resumable_across_checkpoints() -> Result<()> {
    let mut rng = StdRng::seed_from_u64(7);
    let bids: Vec<(u64, u64)> = (0..7)
        .map(|_| (rng.gen_range(0..6), rng.gen_range(1..30)))
        .collect();
    let config = AuctionGenesisConfig {
        total_quantity: 50,
        max_bid_count: 8,
        tie_break: TieBreakPolicy::Random,
        backend_seed: [7; 32],
        ..Default::default()
    };

    let mut whole = Harness::new(config.clone())?;
    let mut resumed = Harness::new(config)?;
    for (i, &(price, quantity)) in bids.iter().enumerate() {
        whole.bid(i + 1, price, quantity)?;
        resumed.bid(i + 1, price, quantity)?;
    }

    whole.drive(1_000)?;

    // Persist and reload the engine and backend after every call.
    let ctx = resumed.ctx(WORKER, 0);
    while resumed.state.engine.step() != Step::Finished {
        let units = rng.gen_range(1..6);
        handle_advance(&mut resumed.state, &ctx, units, 50_000)?;

        let engine = Engine::restore(&resumed.state.engine.checkpoint()?)?;
        let backend = ClearBackend::restore(&resumed.state.backend.checkpoint()?)?;
        assert!(engine == resumed.state.engine);
        resumed.state.engine = engine;
        resumed.state.backend = backend;
    }

    assert_eq!(resumed.ranks()?, whole.ranks()?);
    assert_eq!(resumed.won()?, whole.won()?);
    assert_eq!(resumed.uniform_price()?, whole.uniform_price()?);
    Ok(())
}

#[test]
fn test_finished_steps_are_idempotent() -> Result<()> {
    let mut h = Harness::new(AuctionGenesisConfig {
        total_quantity: 1_000_000,
        ..Default::default()
    })?;
    h.bid(1, 800, 600_000)?;
    h.bid(2, 200, 500_000)?;
    h.bid(3, 1, 1_000_000)?;
    let ctx = h.ctx(WORKER, 0);

    handle_do_work(&mut h.state, &ctx, Step::Validation, 10, 50_000)?;
    assert_eq!(h.state.engine.step(), Step::Ranking);
    assert_eq!(
        handle_do_work(&mut h.state, &ctx, Step::AllocationById, 10, 50_000),
        Err(AuctionError::Engine(EngineError::StepNotReady {
            requested: Step::AllocationById,
            current: Step::Ranking,
        }))
    );

    h.drive(2)?;
    let snapshot = h.state.engine.checkpoint()?;
    let handles = h.state.backend.handle_count();

    for _ in 0..3 {
        for step in Step::WORK_STEPS {
            let report = handle_do_work(&mut h.state, &ctx, step, 10, 50_000)?;
            assert_eq!(report.status, WorkStatus::StepOrEngineFinished);
            assert_eq!(report.units_done, 0);
            assert_eq!(report.budget_spent, 0);
        }
    }

    assert_eq!(h.state.engine.checkpoint()?, snapshot);
    assert_eq!(h.state.backend.handle_count(), handles);
    assert_eq!(h.won()?, vec![600_000, 400_000, 0]);
    Ok(())
}

#[test]
fn test_expired_request_is_reissued() -> Result<()> {
    let mut h = Harness::new(AuctionGenesisConfig {
        total_quantity: 10,
        decryption_window: 5,
        ..Default::default()
    })?;
    h.bid(1, 3, 4)?;
    h.bid(2, 2, 4)?;
    h.drive(8)?;

    let stale = h.direct_claim(1)?;

    // The oracle misses its deadline.
    h.block_height = 20;
    assert_eq!(h.coordinator.expire(h.block_height), vec![stale]);

    let ctx = h.ctx(WORKER, 0);
    let fresh = handle_reissue_decryption(&mut h.state, &ctx, &mut h.coordinator, stale)?;
    assert_ne!(fresh, stale);

    let other = h.direct_claim(2)?;
    assert!(matches!(
        handle_reissue_decryption(&mut h.state, &ctx, &mut h.coordinator, other),
        Err(AuctionError::RequestNotExpired(_))
    ));

    assert_eq!(h.deliver()?.iter().flatten().count(), 2);
    assert_eq!(h.state.unsettled_count(), 0);

    let oracle = h.ctx(ORACLE, 0);
    assert!(matches!(
        handle_decryption_callback(&mut h.state, &oracle, stale, &[3, 4, 2]),
        Err(AuctionError::UnknownRequest(_))
    ));
    Ok(())
}

#[test]
fn test_callback_requires_oracle_and_resolves_once() -> Result<()> {
    let mut h = Harness::new(AuctionGenesisConfig {
        total_quantity: 10,
        ..Default::default()
    })?;
    h.bid(1, 3, 4)?;
    h.drive(8)?;

    let request_id = h.direct_claim(1)?;
    let fulfilment = h
        .coordinator
        .fulfil(request_id, &h.state.backend, h.block_height)?;
    assert_eq!(fulfilment.values, vec![3, 4, 3]);

    let forged = h.ctx(bidder(1), 0);
    assert_eq!(
        handle_decryption_callback(&mut h.state, &forged, request_id, &[3, 0, 0]),
        Err(AuctionError::NotAuthorized)
    );
    assert_eq!(h.state.get_payout(&bidder(1)), 0);

    let oracle = h.ctx(ORACLE, 0);
    assert_eq!(
        handle_decryption_callback(&mut h.state, &oracle, request_id, &[3, 4]),
        Err(AuctionError::MalformedCallback {
            expected: 3,
            got: 2
        })
    );

    let receipt = handle_decryption_callback(&mut h.state, &oracle, request_id, &fulfilment.values)?;
    assert_eq!(receipt.map(|r| r.refunded), Some(0));
    assert!(matches!(
        handle_decryption_callback(&mut h.state, &oracle, request_id, &fulfilment.values),
        Err(AuctionError::AlreadyResolved(_))
    ));
    assert_eq!(h.state.get_payout(&BENEFICIARY), 12);
    Ok(())
}

#[test]
fn test_cancellation_and_unsold_supply() -> Result<()> {
    let mut h = Harness::new(AuctionGenesisConfig {
        total_quantity: 100,
        ..Default::default()
    })?;
    h.bid(1, 10, 30)?;
    h.bid(2, 20, 30)?;
    h.bid(3, 15, 50)?;

    let ctx = h.ctx(bidder(3), 0);
    assert_eq!(handle_cancel_bid(&mut h.state, &ctx)?, 750);
    assert_eq!(h.state.get_payout(&bidder(3)), 750);
    assert_eq!(h.state.engine.bid_count(), 3);

    let worker = h.ctx(WORKER, 0);
    handle_advance(&mut h.state, &worker, 1, 50_000)?;
    let ctx = h.ctx(bidder(1), 0);
    assert_eq!(
        handle_cancel_bid(&mut h.state, &ctx),
        Err(AuctionError::Engine(EngineError::BidsSealed))
    );

    h.drive(6)?;
    assert_eq!(h.won()?, vec![30, 30, 0]);
    assert_eq!(h.uniform_price()?, 10);

    h.direct_claim(1)?;
    h.direct_claim(2)?;
    assert_eq!(h.direct_claim(3), Err(AuctionError::AlreadySettled(3)));

    let beneficiary = h.ctx(BENEFICIARY, 0);
    assert_eq!(
        handle_terminate(&mut h.state, &beneficiary),
        Err(AuctionError::PendingDecryptions(2))
    );
    h.deliver()?;

    let outsider = h.ctx(bidder(1), 0);
    assert_eq!(
        handle_terminate(&mut h.state, &outsider),
        Err(AuctionError::NotAuthorized)
    );
    assert_eq!(handle_terminate(&mut h.state, &beneficiary)?, 40);
    assert_eq!(h.state.get_asset_balance(&BENEFICIARY), 40);
    assert_eq!(h.state.get_payout(&bidder(2)), 300);
    assert_eq!(h.state.get_payout(&BENEFICIARY), 600);

    assert_eq!(h.direct_claim(1), Err(AuctionError::Terminated));
    assert_eq!(
        handle_terminate(&mut h.state, &beneficiary),
        Err(AuctionError::Terminated)
    );
    Ok(())
}

#[test]
fn test_lifecycle_through_call_messages() -> Result<()> {
    let mut h = Harness::new(AuctionGenesisConfig {
        total_quantity: 10,
        ..Default::default()
    })?;

    let price = h.state.backend.encrypt(6)?;
    let quantity = h.state.backend.encrypt(4)?;
    let outcome = h.send(bidder(1), 24, AuctionCall::SubmitBid { price, quantity })?;
    assert_eq!(outcome, CallOutcome::BidAccepted(1));

    let err = h
        .send(bidder(1), 24, AuctionCall::SubmitBid { price, quantity })
        .unwrap_err();
    assert_eq!(err.downcast_ref::<AuctionError>(), Some(&AuctionError::AlreadyBid));

    while h.state.engine.step() != Step::Finished {
        let call = AuctionCall::Advance {
            max_units: 2,
            budget: 10_000,
        };
        assert!(matches!(h.send(WORKER, 0, call)?, CallOutcome::Work(_)));
    }

    let CallOutcome::DecryptionRequested(request_id) =
        h.send(WORKER, 0, AuctionCall::DirectClaim { bidder: 1 })?
    else {
        return Err(anyhow!("direct claim did not request decryption"));
    };
    let fulfilment = h
        .coordinator
        .fulfil(request_id, &h.state.backend, h.block_height)?;

    let callback = AuctionCall::DecryptionCallback {
        request_id,
        values: fulfilment.values,
    };
    let CallOutcome::Settled(Some(receipt)) = h.send(ORACLE, 0, callback)? else {
        return Err(anyhow!("callback did not settle the bidder"));
    };
    assert_eq!(
        receipt.outcome,
        SettlementOutcome::Won {
            quantity: 4,
            price: 6,
            paid: 24,
        }
    );

    assert_eq!(
        h.send(BENEFICIARY, 0, AuctionCall::Terminate)?,
        CallOutcome::Terminated(6)
    );
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_worker_pool_then_blind_claims() -> Result<()> {
    const TOTAL: u64 = 100;

    let bids = [(40, 30), (70, 30), (40, 50), (10, 60), (55, 20), (0, 10)];
    let mut h = Harness::new(AuctionGenesisConfig {
        total_quantity: TOTAL,
        ..Default::default()
    })?;
    for (i, &(price, quantity)) in bids.iter().enumerate() {
        h.bid(i + 1, price, quantity)?;
    }

    let shared: SharedAuction<ClearBackend> = Arc::new(Mutex::new(h.state));
    let config = WorkerConfig {
        units_per_call: 3,
        workers: 4,
        ..Default::default()
    };
    let summary = WorkerPool::new(config).run(Arc::clone(&shared), 1).await?;
    assert_eq!(summary.units_done, 6 + 15 + 36 + 36);

    h.state = Arc::try_unwrap(shared)
        .map_err(|_| anyhow!("auction still shared after the pool finished"))?
        .into_inner();
    assert_eq!(h.state.engine.step(), Step::Finished);

    for n in 1..=bids.len() {
        h.blind_claim(n)?;
    }
    let receipts = h.deliver()?;
    assert_eq!(receipts.iter().flatten().count(), bids.len());

    let (won, price) = reference_allocation(TOTAL, &bids);
    assert_eq!(h.won()?, won);
    assert_eq!(h.uniform_price()?, price);
    for (i, quantity) in won.iter().enumerate() {
        assert_eq!(h.state.get_asset_balance(&bidder(i + 1)), *quantity);
    }
    Ok(())
}
