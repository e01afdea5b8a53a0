//! The resumable step machine.
//!
//! [`Engine`] owns every encrypted intermediate and a single progress counter
//! for the current step. Each unit of work is addressed by its position within
//! the step, computed against a metered backend into a [`UnitOutput`], and only
//! then applied. A unit interrupted by budget exhaustion therefore leaves no
//! trace in the engine.

use auction_crypto::{
    shuffled_range, Budget, CostTable, CryptoError, Metered, ObliviousBackend,
};
use auction_types::{
    BidderId, EncBool, EncU64, Step, TieBreakPolicy, WorkReport, WorkStatus,
};
use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::allocation::{close_rank, select_cell, RankClose, RankSlot};
use crate::comparator::{outranks, Contender};
use crate::error::EngineError;
use crate::ranking::{pair_at, pair_count, tally};
use crate::remap::remap_cell;
use crate::store::{BidStore, StoredBid};
use crate::validation::validate_bid;

// =========================
// CONFIGURATION
// =========================

/// Largest accepted `max_bid_count`. Ranking and the tie-break shuffle are
/// quadratic in it.
pub const MAX_BID_COUNT: u32 = 1024;

/// Parameters fixed at initialization.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize,
)]
pub struct EngineConfig {
    /// Supply offered by the auction (Q)
    pub total_quantity: u64,
    /// Maximum number of bids accepted
    pub max_bid_count: u32,
    pub tie_break: TieBreakPolicy,
    #[serde(default)]
    pub costs: CostTable,
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.total_quantity == 0 {
            return Err(EngineError::InvalidConfig(
                "total_quantity must be positive".to_string(),
            ));
        }
        if self.max_bid_count == 0 {
            return Err(EngineError::InvalidConfig(
                "max_bid_count must be positive".to_string(),
            ));
        }
        if self.max_bid_count > MAX_BID_COUNT {
            return Err(EngineError::InvalidConfig(format!(
                "max_bid_count {} exceeds {MAX_BID_COUNT}",
                self.max_bid_count
            )));
        }
        // Every prefix sum of clamped quantities must fit in a u64
        if self
            .total_quantity
            .checked_mul(u64::from(self.max_bid_count) + 1)
            .is_none()
        {
            return Err(EngineError::InvalidConfig(format!(
                "total_quantity {} times max_bid_count {} overflows",
                self.total_quantity, self.max_bid_count
            )));
        }
        Ok(())
    }
}

/// A bidder's final encrypted outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    /// Validated bid price; zero marks an invalid bid
    pub price: EncU64,
    /// Won quantity
    pub quantity: EncU64,
}

/// Result of one unit of work, applied only after the unit completed.
#[derive(Debug, Clone, Copy)]
enum UnitOutput {
    Validated {
        index: usize,
        price: EncU64,
        quantity: EncU64,
    },
    Ranked {
        earlier: usize,
        later: usize,
        earlier_rank: EncU64,
        later_rank: EncU64,
    },
    Selected {
        rank: usize,
        slot: RankSlot,
        close: Option<RankClose>,
    },
    Remapped {
        identity: usize,
        won: EncU64,
    },
}

// =========================
// ENGINE
// =========================

#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Engine {
    config: EngineConfig,
    store: BidStore,
    sealed: bool,
    step: Step,
    /// Units completed in `step`
    done: u64,
    zero: EncU64,
    one: EncU64,
    total_quantity: EncU64,
    /// Shuffled tie-break values, indexed by identity - 1
    tie_values: Vec<EncU64>,
    ranks: Vec<EncU64>,
    by_rank: Vec<RankSlot>,
    /// Prefix sums, `cumulative[k]` covers ranks `0..k`
    cumulative: Vec<EncU64>,
    validity: Vec<EncBool>,
    uniform_price: EncU64,
    won_by_id: Vec<EncU64>,
}

impl Engine {
    /// Initialize an engine, charging every operation to `budget`. Under
    /// [`TieBreakPolicy::Random`] this runs the oblivious shuffle of
    /// `[0, max_bid_count)`, which is quadratic in `max_bid_count`.
    ///
    /// Fails with [`CryptoError::BudgetExhausted`] when `budget` cannot cover
    /// initialization; nothing is returned in that case.
    pub fn new<B: ObliviousBackend>(
        config: EngineConfig,
        backend: &mut B,
        budget: &mut Budget,
    ) -> Result<Self, EngineError> {
        config.validate()?;

        let mut ops = Metered::new(backend, budget, config.costs);
        let zero = ops.encrypt(0)?;
        let one = ops.encrypt(1)?;
        let total_quantity = ops.encrypt(config.total_quantity)?;
        let tie_values = match config.tie_break {
            TieBreakPolicy::Random => shuffled_range(&mut ops, u64::from(config.max_bid_count))?,
            _ => Vec::new(),
        };

        info!(
            total_quantity = config.total_quantity,
            max_bid_count = config.max_bid_count,
            tie_break = ?config.tie_break,
            budget_spent = budget.spent(),
            "Auction engine initialized"
        );

        Ok(Self {
            config,
            store: BidStore::default(),
            sealed: false,
            step: Step::Validation,
            done: 0,
            zero,
            one,
            total_quantity,
            tie_values,
            ranks: Vec::new(),
            by_rank: Vec::new(),
            cumulative: Vec::new(),
            validity: Vec::new(),
            uniform_price: zero,
            won_by_id: Vec::new(),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ----- bids -----

    /// Accept the encrypted bid of identity `id`.
    pub fn add_bid<B: ObliviousBackend>(
        &mut self,
        backend: &mut B,
        id: BidderId,
        price: EncU64,
        quantity: EncU64,
    ) -> Result<(), EngineError> {
        if self.sealed {
            return Err(EngineError::BidsSealed);
        }
        if self.store.len() >= self.config.max_bid_count as usize {
            return Err(EngineError::TooManyBids(self.config.max_bid_count));
        }
        self.store.check_insert(id)?;

        let identity = backend.encrypt(u64::from(id))?;
        self.store.insert(
            id,
            StoredBid {
                price,
                quantity,
                identity,
            },
        )?;

        debug!(bidder = id, "Bid stored");
        Ok(())
    }

    /// Zero the bid of `id`. Its identity and slots remain.
    pub fn remove_bid(&mut self, id: BidderId) -> Result<(), EngineError> {
        if self.sealed {
            return Err(EngineError::BidsSealed);
        }
        if self.store.get(id).is_none() {
            return Err(EngineError::BidNotFound(id));
        }
        self.store.rewrite(id as usize - 1, self.zero, self.zero);

        debug!(bidder = id, "Bid zeroed");
        Ok(())
    }

    pub fn bid_count(&self) -> u32 {
        self.store.len() as u32
    }

    /// Whether validation has started and the bid set is frozen.
    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    // ----- progress -----

    pub fn step(&self) -> Step {
        self.step
    }

    /// Units completed in `step`.
    pub fn progress(&self, step: Step) -> u64 {
        if step < self.step {
            self.max_units(step)
        } else if step == self.step {
            self.done
        } else {
            0
        }
    }

    /// Total units of `step`, known once every earlier step has finished.
    pub fn step_max(&self, step: Step) -> Option<u64> {
        (step <= self.step).then(|| self.max_units(step))
    }

    fn max_units(&self, step: Step) -> u64 {
        let n = self.store.len() as u64;
        match step {
            Step::Validation => n,
            Step::Ranking => pair_count(n),
            Step::AllocationByRank | Step::AllocationById => n * n,
            Step::Finished => 0,
        }
    }

    pub fn ready_for_blind_claim(&self) -> bool {
        self.step > Step::AllocationByRank
    }

    pub fn ready_for_direct_claim(&self) -> bool {
        self.step == Step::Finished
    }

    // ----- outputs -----

    /// Encrypted bid of `id`; validated once validation has finished.
    pub fn bid_by_identity(&self, id: BidderId) -> Option<&StoredBid> {
        self.store.get(id)
    }

    /// Encrypted occupant of `rank`, once allocation by rank has finished.
    pub fn bid_by_rank(&self, rank: u32) -> Option<&RankSlot> {
        if !self.ready_for_blind_claim() {
            return None;
        }
        self.by_rank.get(rank as usize)
    }

    /// Encrypted rank of `id`, once ranking has finished.
    pub fn rank_of(&self, id: BidderId) -> Option<EncU64> {
        if self.step <= Step::Ranking || id == 0 {
            return None;
        }
        self.ranks.get(id as usize - 1).copied()
    }

    /// Encrypted uniform clearing price, once allocation by rank has finished.
    pub fn uniform_price(&self) -> Option<EncU64> {
        self.ready_for_blind_claim().then_some(self.uniform_price)
    }

    /// Encrypted outcome of `id`, once the engine has finished.
    pub fn allocation_by_identity(&self, id: BidderId) -> Option<Allocation> {
        if !self.ready_for_direct_claim() || id == 0 {
            return None;
        }
        let bid = self.store.get(id)?;
        let won = self.won_by_id.get(id as usize - 1)?;
        Some(Allocation {
            price: bid.price,
            quantity: *won,
        })
    }

    // ----- work -----

    /// Perform up to `max_units` units of `step`, charging `budget`.
    ///
    /// Addressing a step that already finished, or a finished engine, is a
    /// no-op reporting [`WorkStatus::StepOrEngineFinished`].
    pub fn do_work<B: ObliviousBackend>(
        &mut self,
        backend: &mut B,
        step: Step,
        max_units: u64,
        budget: &mut Budget,
    ) -> Result<WorkReport, EngineError> {
        if step > self.step {
            return Err(EngineError::StepNotReady {
                requested: step,
                current: self.step,
            });
        }
        if step < self.step || step == Step::Finished {
            let max = self.max_units(step);
            return Ok(WorkReport {
                step,
                status: WorkStatus::StepOrEngineFinished,
                units_done: 0,
                progress: max,
                max,
                budget_spent: 0,
            });
        }

        if step == Step::Validation && !self.sealed {
            self.sealed = true;
            info!(bid_count = self.store.len(), "Bids sealed");
        }

        let max = self.max_units(step);
        let spent_before = budget.spent();
        let mut units_done = 0;
        let mut starved = false;

        while units_done < max_units && self.done < max {
            let mut ops = Metered::new(backend, budget, self.config.costs);
            match self.compute_unit(&mut ops, step, self.done) {
                Ok(output) => {
                    self.apply(output);
                    self.done += 1;
                    units_done += 1;
                }
                Err(EngineError::Crypto(CryptoError::BudgetExhausted { needed, remaining })) => {
                    debug!(
                        ?step,
                        unit = self.done,
                        needed,
                        remaining,
                        "Budget exhausted inside unit"
                    );
                    starved = true;
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        let progress = self.done;
        let budget_spent = budget.spent() - spent_before;
        let status = if progress == max {
            self.finish_step();
            WorkStatus::StepOrEngineFinished
        } else if starved && units_done == 0 && max_units > 0 {
            warn!(
                ?step,
                budget = budget.limit(),
                "Budget too small for a single unit"
            );
            WorkStatus::InsufficientBudget
        } else {
            WorkStatus::MoreWorkNeeded
        };

        debug!(?step, units_done, progress, max, budget_spent, "Work call");

        Ok(WorkReport {
            step,
            status,
            units_done,
            progress,
            max,
            budget_spent,
        })
    }

    /// [`Engine::do_work`] on whichever step is current.
    pub fn advance<B: ObliviousBackend>(
        &mut self,
        backend: &mut B,
        max_units: u64,
        budget: &mut Budget,
    ) -> Result<WorkReport, EngineError> {
        let step = self.step;
        self.do_work(backend, step, max_units, budget)
    }

    fn compute_unit<B: ObliviousBackend>(
        &self,
        ops: &mut B,
        step: Step,
        unit: u64,
    ) -> Result<UnitOutput, EngineError> {
        let n = self.store.len() as u64;
        let bids = self.store.bids();
        let out_of_range = || EngineError::UnitOutOfRange { step, unit };

        match step {
            Step::Validation => {
                let index = unit as usize;
                let bid = bids.get(index).ok_or_else(out_of_range)?;
                let (price, quantity) = validate_bid(ops, bid, self.total_quantity, self.zero)?;
                Ok(UnitOutput::Validated {
                    index,
                    price,
                    quantity,
                })
            }
            Step::Ranking => {
                let (earlier, later) = pair_at(n, unit).ok_or_else(out_of_range)?;
                let a = self.contender(earlier);
                let b = self.contender(later);
                let wins = outranks(ops, self.config.tie_break, &a, &b)?;
                let (earlier_rank, later_rank) = tally(
                    ops,
                    self.ranks[earlier],
                    self.ranks[later],
                    wins,
                    self.one,
                    self.zero,
                )?;
                Ok(UnitOutput::Ranked {
                    earlier,
                    later,
                    earlier_rank,
                    later_rank,
                })
            }
            Step::AllocationByRank => {
                if unit >= n * n {
                    return Err(out_of_range());
                }
                let rank = (unit / n) as usize;
                let bidder = (unit % n) as usize;
                let mut slot = select_cell(
                    ops,
                    &self.by_rank[rank],
                    self.ranks[bidder],
                    rank as u64,
                    &bids[bidder],
                )?;
                let close = if bidder as u64 == n - 1 {
                    let close = close_rank(
                        ops,
                        &slot,
                        self.cumulative[rank],
                        self.total_quantity,
                        self.zero,
                        self.uniform_price,
                    )?;
                    slot.won = close.won;
                    Some(close)
                } else {
                    None
                };
                Ok(UnitOutput::Selected { rank, slot, close })
            }
            Step::AllocationById => {
                if unit >= n * n {
                    return Err(out_of_range());
                }
                let identity = (unit / n) as usize;
                let rank = unit % n;
                let won = remap_cell(
                    ops,
                    self.won_by_id[identity],
                    self.ranks[identity],
                    rank,
                    self.by_rank[rank as usize].won,
                )?;
                Ok(UnitOutput::Remapped { identity, won })
            }
            Step::Finished => Err(out_of_range()),
        }
    }

    fn contender(&self, index: usize) -> Contender {
        let bid = &self.store.bids()[index];
        let tie = match self.config.tie_break {
            TieBreakPolicy::Random => self.tie_values.get(index).copied().unwrap_or(self.zero),
            _ => self.zero,
        };
        Contender {
            price: bid.price,
            quantity: bid.quantity,
            tie,
        }
    }

    fn apply(&mut self, output: UnitOutput) {
        match output {
            UnitOutput::Validated {
                index,
                price,
                quantity,
            } => self.store.rewrite(index, price, quantity),
            UnitOutput::Ranked {
                earlier,
                later,
                earlier_rank,
                later_rank,
            } => {
                self.ranks[earlier] = earlier_rank;
                self.ranks[later] = later_rank;
            }
            UnitOutput::Selected { rank, slot, close } => {
                self.by_rank[rank] = slot;
                if let Some(close) = close {
                    self.cumulative[rank + 1] = close.cumulative;
                    self.validity.push(close.valid);
                    self.uniform_price = close.uniform_price;
                }
            }
            UnitOutput::Remapped { identity, won } => self.won_by_id[identity] = won,
        }
    }

    fn finish_step(&mut self) {
        let finished = self.step;
        let n = self.store.len();
        self.step = finished.next();
        self.done = 0;

        match self.step {
            Step::Ranking => self.ranks = vec![self.zero; n],
            Step::AllocationByRank => {
                self.by_rank = vec![RankSlot::empty(self.zero); n];
                self.cumulative = vec![self.zero; n + 1];
                self.validity = Vec::with_capacity(n);
                self.uniform_price = self.zero;
            }
            Step::AllocationById => self.won_by_id = vec![self.zero; n],
            Step::Validation | Step::Finished => {}
        }

        info!(finished = ?finished, next = ?self.step, bid_count = n, "Step completed");
    }

    // ----- persistence -----

    pub fn checkpoint(&self) -> Result<Vec<u8>, EngineError> {
        borsh::to_vec(self).map_err(|e| EngineError::Checkpoint(e.to_string()))
    }

    pub fn restore(bytes: &[u8]) -> Result<Self, EngineError> {
        borsh::from_slice(bytes).map_err(|e| EngineError::Checkpoint(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use auction_crypto::{ClearBackend, Decrypt};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn config(total_quantity: u64, tie_break: TieBreakPolicy) -> EngineConfig {
        EngineConfig {
            total_quantity,
            max_bid_count: 16,
            tie_break,
            costs: CostTable::default(),
        }
    }

    fn setup(
        total_quantity: u64,
        tie_break: TieBreakPolicy,
        bids: &[(u64, u64)],
    ) -> (Engine, ClearBackend) {
        let mut backend = ClearBackend::new([7u8; 32]);
        let mut engine = Engine::new(
            config(total_quantity, tie_break),
            &mut backend,
            &mut Budget::unlimited(),
        )
        .unwrap();
        for (i, (price, quantity)) in bids.iter().enumerate() {
            let price = backend.encrypt(*price).unwrap();
            let quantity = backend.encrypt(*quantity).unwrap();
            engine
                .add_bid(&mut backend, i as BidderId + 1, price, quantity)
                .unwrap();
        }
        (engine, backend)
    }

    fn run_to_end(engine: &mut Engine, backend: &mut ClearBackend) {
        while engine.step() != Step::Finished {
            let mut budget = Budget::unlimited();
            engine.advance(backend, u64::MAX, &mut budget).unwrap();
        }
    }

    fn ranks(engine: &Engine, backend: &ClearBackend) -> Vec<u64> {
        (1..=engine.bid_count())
            .map(|id| backend.decrypt(engine.rank_of(id).unwrap()).unwrap())
            .collect()
    }

    fn won(engine: &Engine, backend: &ClearBackend) -> Vec<u64> {
        (1..=engine.bid_count())
            .map(|id| {
                let allocation = engine.allocation_by_identity(id).unwrap();
                backend.decrypt(allocation.quantity).unwrap()
            })
            .collect()
    }

    #[test]
    fn test_config_validation() {
        assert!(config(1_000, TieBreakPolicy::Registration).validate().is_ok());
        assert!(config(0, TieBreakPolicy::Registration).validate().is_err());

        let mut no_bids = config(1_000, TieBreakPolicy::Registration);
        no_bids.max_bid_count = 0;
        assert!(no_bids.validate().is_err());

        let overflow = config(u64::MAX / 2, TieBreakPolicy::Registration);
        assert!(matches!(
            overflow.validate(),
            Err(EngineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_bid_count_cap() {
        let mut at_cap = config(1_000, TieBreakPolicy::Registration);
        at_cap.max_bid_count = MAX_BID_COUNT;
        assert!(at_cap.validate().is_ok());

        let mut oversized = config(1, TieBreakPolicy::Random);
        oversized.max_bid_count = u32::MAX - 1;
        assert!(matches!(
            oversized.validate(),
            Err(EngineError::InvalidConfig(_))
        ));

        // Rejected before any operation runs
        let mut backend = ClearBackend::default();
        let mut budget = Budget::unlimited();
        assert!(Engine::new(oversized, &mut backend, &mut budget).is_err());
        assert_eq!(budget.spent(), 0);
        assert_eq!(backend.handle_count(), 0);
    }

    #[test]
    fn test_init_is_metered() {
        let costs = CostTable::default();
        let mut backend = ClearBackend::default();

        let mut budget = Budget::unlimited();
        Engine::new(config(100, TieBreakPolicy::Registration), &mut backend, &mut budget).unwrap();
        assert_eq!(budget.spent(), 3 * costs.encrypt);

        let mut budget = Budget::unlimited();
        Engine::new(config(100, TieBreakPolicy::Random), &mut backend, &mut budget).unwrap();
        assert!(budget.spent() > 16 * (costs.eq + 2 * costs.select));
    }

    #[test]
    fn test_init_shuffle_respects_budget() {
        let mut backend = ClearBackend::default();
        let mut budget = Budget::new(1_000);

        let result = Engine::new(config(100, TieBreakPolicy::Random), &mut backend, &mut budget);

        assert!(matches!(
            result,
            Err(EngineError::Crypto(CryptoError::BudgetExhausted { .. }))
        ));
        assert!(budget.spent() <= 1_000);
    }

    #[test]
    fn test_reference_auction() {
        let (mut engine, mut backend) = setup(
            1_000_000,
            TieBreakPolicy::QuantityThenRegistration,
            &[(800, 600_000), (200, 500_000), (1, 1_000_000)],
        );
        run_to_end(&mut engine, &mut backend);

        assert_eq!(ranks(&engine, &backend), vec![0, 1, 2]);
        assert_eq!(won(&engine, &backend), vec![600_000, 400_000, 0]);
        let price = engine.uniform_price().unwrap();
        assert_eq!(backend.decrypt(price).unwrap(), 200);

        let cumulative: Vec<u64> = engine
            .cumulative
            .iter()
            .map(|c| backend.decrypt(*c).unwrap())
            .collect();
        assert_eq!(cumulative, vec![0, 600_000, 1_100_000, 2_100_000]);

        let validity: Vec<bool> = engine
            .validity
            .iter()
            .map(|v| backend.decrypt_bool(*v).unwrap())
            .collect();
        assert_eq!(validity, vec![true, true, false]);

        let third = engine.bid_by_rank(2).unwrap();
        assert_eq!(backend.decrypt(third.bidder).unwrap(), 3);
    }

    #[test]
    fn test_no_bids() {
        let (mut engine, mut backend) = setup(100, TieBreakPolicy::Registration, &[]);
        let mut budget = Budget::new(0);

        for step in Step::WORK_STEPS {
            let report = engine.do_work(&mut backend, step, 10, &mut budget).unwrap();
            assert_eq!(report.status, WorkStatus::StepOrEngineFinished);
            assert_eq!(report.units_done, 0);
        }

        assert_eq!(engine.step(), Step::Finished);
        let price = engine.uniform_price().unwrap();
        assert_eq!(backend.decrypt(price).unwrap(), 0);
    }

    #[test]
    fn test_later_step_not_ready() {
        let (mut engine, mut backend) = setup(100, TieBreakPolicy::Registration, &[(5, 5)]);
        let result = engine.do_work(&mut backend, Step::Ranking, 1, &mut Budget::unlimited());

        assert_eq!(
            result,
            Err(EngineError::StepNotReady {
                requested: Step::Ranking,
                current: Step::Validation,
            })
        );
        assert!(!engine.is_sealed());
        assert_eq!(engine.step_max(Step::Ranking), None);
    }

    #[test]
    fn test_finished_step_is_noop() {
        let (mut engine, mut backend) =
            setup(100, TieBreakPolicy::Registration, &[(5, 50), (6, 60)]);
        run_to_end(&mut engine, &mut backend);
        let before = engine.clone();

        for _ in 0..3 {
            for step in Step::WORK_STEPS {
                let mut budget = Budget::unlimited();
                let report = engine.do_work(&mut backend, step, 100, &mut budget).unwrap();
                assert_eq!(report.status, WorkStatus::StepOrEngineFinished);
                assert_eq!(report.units_done, 0);
                assert_eq!(report.progress, report.max);
                assert_eq!(budget.spent(), 0);
            }
        }

        assert_eq!(engine, before);
    }

    #[test]
    fn test_insufficient_budget() {
        let (mut engine, mut backend) =
            setup(100, TieBreakPolicy::Registration, &[(5, 50), (6, 60)]);
        let mut budget = Budget::new(46);

        let report = engine
            .do_work(&mut backend, Step::Validation, 10, &mut budget)
            .unwrap();

        assert_eq!(report.status, WorkStatus::InsufficientBudget);
        assert_eq!(report.units_done, 0);
        assert_eq!(report.progress, 0);
        assert_eq!(report.budget_spent, 42);
        // The partially validated bid is untouched
        let bid = engine.bid_by_identity(1).unwrap();
        assert_eq!(backend.decrypt(bid.quantity).unwrap(), 50);
    }

    #[test]
    fn test_budget_stops_between_units() {
        let (mut engine, mut backend) = setup(
            100,
            TieBreakPolicy::Registration,
            &[(5, 500), (6, 600), (7, 700)],
        );
        let mut budget = Budget::new(100);

        let report = engine
            .do_work(&mut backend, Step::Validation, 10, &mut budget)
            .unwrap();

        assert_eq!(report.status, WorkStatus::MoreWorkNeeded);
        assert_eq!(report.units_done, 2);
        assert_eq!(report.progress, 2);
        assert_eq!(report.max, 3);
        assert_eq!(report.budget_spent, 94);

        let first = engine.bid_by_identity(1).unwrap();
        let third = engine.bid_by_identity(3).unwrap();
        assert_eq!(backend.decrypt(first.quantity).unwrap(), 100);
        assert_eq!(backend.decrypt(third.quantity).unwrap(), 700);
    }

    #[test]
    fn test_bids_sealed_after_validation_starts() {
        let (mut engine, mut backend) = setup(100, TieBreakPolicy::Registration, &[(5, 5)]);
        engine
            .do_work(&mut backend, Step::Validation, 0, &mut Budget::unlimited())
            .unwrap();

        let price = backend.encrypt(1).unwrap();
        assert_eq!(
            engine.add_bid(&mut backend, 2, price, price),
            Err(EngineError::BidsSealed)
        );
        assert_eq!(engine.remove_bid(1), Err(EngineError::BidsSealed));
    }

    #[test]
    fn test_add_bid_rejections() {
        let mut backend = ClearBackend::default();
        let mut cfg = config(100, TieBreakPolicy::Registration);
        cfg.max_bid_count = 2;
        let mut engine = Engine::new(cfg, &mut backend, &mut Budget::unlimited()).unwrap();
        let v = backend.encrypt(1).unwrap();

        engine.add_bid(&mut backend, 1, v, v).unwrap();
        assert_eq!(
            engine.add_bid(&mut backend, 1, v, v),
            Err(EngineError::AlreadyBid(1))
        );
        engine.add_bid(&mut backend, 2, v, v).unwrap();
        assert_eq!(
            engine.add_bid(&mut backend, 3, v, v),
            Err(EngineError::TooManyBids(2))
        );
    }

    #[test]
    fn test_removed_bid_wins_nothing() {
        let (mut engine, mut backend) = setup(
            100,
            TieBreakPolicy::Registration,
            &[(50, 60), (90, 60), (10, 60)],
        );
        engine.remove_bid(2).unwrap();
        assert_eq!(engine.remove_bid(4), Err(EngineError::BidNotFound(4)));
        run_to_end(&mut engine, &mut backend);

        assert_eq!(won(&engine, &backend), vec![60, 0, 40]);
        let price = engine.uniform_price().unwrap();
        assert_eq!(backend.decrypt(price).unwrap(), 10);
    }

    #[test]
    fn test_step_maxima() {
        let (mut engine, mut backend) =
            setup(100, TieBreakPolicy::Registration, &[(1, 1), (2, 2), (3, 3), (4, 4)]);
        assert_eq!(engine.step_max(Step::Validation), Some(4));

        let mut maxima = Vec::new();
        while engine.step() != Step::Finished {
            let step = engine.step();
            maxima.push(engine.step_max(step).unwrap());
            engine
                .advance(&mut backend, u64::MAX, &mut Budget::unlimited())
                .unwrap();
            assert_eq!(engine.progress(step), engine.step_max(step).unwrap());
        }

        assert_eq!(maxima, vec![4, 6, 16, 16]);
        assert!(engine.ready_for_blind_claim());
        assert!(engine.ready_for_direct_claim());
    }

    #[test]
    fn test_blind_claim_ready_before_direct() {
        let (mut engine, mut backend) =
            setup(100, TieBreakPolicy::Registration, &[(1, 1), (2, 2)]);
        for _ in 0..3 {
            engine
                .advance(&mut backend, u64::MAX, &mut Budget::unlimited())
                .unwrap();
        }

        assert_eq!(engine.step(), Step::AllocationById);
        assert!(engine.ready_for_blind_claim());
        assert!(!engine.ready_for_direct_claim());
        assert!(engine.allocation_by_identity(1).is_none());
        assert!(engine.bid_by_rank(0).is_some());
    }

    #[test]
    fn test_tie_break_policies() {
        let bids = [(100, 10), (100, 30), (100, 20)];

        let (mut engine, mut backend) = setup(1_000, TieBreakPolicy::Registration, &bids);
        run_to_end(&mut engine, &mut backend);
        assert_eq!(ranks(&engine, &backend), vec![0, 1, 2]);

        let (mut engine, mut backend) =
            setup(1_000, TieBreakPolicy::QuantityThenRegistration, &bids);
        run_to_end(&mut engine, &mut backend);
        assert_eq!(ranks(&engine, &backend), vec![2, 0, 1]);

        let (mut engine, mut backend) = setup(1_000, TieBreakPolicy::Random, &bids);
        run_to_end(&mut engine, &mut backend);
        let mut random_ranks = ranks(&engine, &backend);
        random_ranks.sort_unstable();
        assert_eq!(random_ranks, vec![0, 1, 2]);
    }

    #[test]
    fn test_chunked_ranking_matches_single_call() {
        let mut rng = StdRng::seed_from_u64(11);
        let bids: Vec<(u64, u64)> = (0..9)
            .map(|_| (rng.gen_range(0..5), rng.gen_range(0..50)))
            .collect();

        let (mut whole, mut whole_backend) = setup(200, TieBreakPolicy::Random, &bids);
        run_to_end(&mut whole, &mut whole_backend);

        let (mut chunked, mut chunked_backend) = setup(200, TieBreakPolicy::Random, &bids);
        while chunked.step() != Step::Finished {
            let units = rng.gen_range(1..7);
            chunked
                .advance(&mut chunked_backend, units, &mut Budget::unlimited())
                .unwrap();
        }

        assert_eq!(ranks(&whole, &whole_backend), ranks(&chunked, &chunked_backend));
        assert_eq!(won(&whole, &whole_backend), won(&chunked, &chunked_backend));
    }

    #[test]
    fn test_checkpoint_restore_midway() {
        let bids = [(30, 40), (50, 40), (40, 40), (20, 40)];
        let (mut engine, mut backend) =
            setup(100, TieBreakPolicy::QuantityThenRegistration, &bids);
        engine
            .advance(&mut backend, u64::MAX, &mut Budget::unlimited())
            .unwrap();
        engine
            .advance(&mut backend, 3, &mut Budget::unlimited())
            .unwrap();

        let engine_bytes = engine.checkpoint().unwrap();
        let backend_bytes = backend.checkpoint().unwrap();
        let mut engine = Engine::restore(&engine_bytes).unwrap();
        let mut backend = ClearBackend::restore(&backend_bytes).unwrap();
        assert_eq!(engine.step(), Step::Ranking);
        assert_eq!(engine.progress(Step::Ranking), 3);

        run_to_end(&mut engine, &mut backend);
        assert_eq!(ranks(&engine, &backend), vec![2, 0, 1, 3]);
        assert_eq!(won(&engine, &backend), vec![20, 40, 40, 0]);
        let price = engine.uniform_price().unwrap();
        assert_eq!(backend.decrypt(price).unwrap(), 30);
    }
}
