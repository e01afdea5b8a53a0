//! State structures for the auction module.

use auction_crypto::{Budget, ClearBackend, ObliviousBackend};
use auction_engine::Engine;
use auction_types::{Address, BidderId, EncU64, RequestId};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::error::AuctionError;
use crate::genesis::AuctionGenesisConfig;

/// What a pending decryption request will settle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClaimKind {
    /// Claim by bidder identity; handles are (price, won, uniform price)
    Direct { bidder: BidderId },
    /// Claim by rank; handles are (bidder, price, won, uniform price)
    Blind { rank: u32 },
}

impl ClaimKind {
    /// Number of cleartext values the callback must carry.
    pub fn value_count(&self) -> usize {
        match self {
            ClaimKind::Direct { .. } => 3,
            ClaimKind::Blind { .. } => 4,
        }
    }
}

/// An outstanding decryption request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingDecryption {
    pub kind: ClaimKind,
    pub handles: Vec<EncU64>,
    /// Block height after which the request may be reissued
    pub deadline: u64,
}

/// How a bidder's escrow was resolved.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SettlementOutcome {
    Won { quantity: u64, price: u64, paid: u64 },
    /// Won `quantity` but the deposit could not cover the payment; the
    /// allocation stays in custody and the penalty is forfeited
    Defaulted { quantity: u64, penalty: u64 },
    Penalized { penalty: u64 },
    Lost,
    Cancelled,
}

/// Record of one settled bidder.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementReceipt {
    pub bidder: BidderId,
    pub address: Address,
    pub outcome: SettlementOutcome,
    pub refunded: u64,
}

/// Auction module state.
///
/// One instance hosts one auction. Ledgers are in-memory maps standing in for
/// the host's durable storage.
#[derive(Debug)]
pub struct AuctionState<B> {
    pub config: AuctionGenesisConfig,

    /// Encrypted-value backend the engine computes on
    pub backend: B,

    pub engine: Engine,

    /// Bidder identity by address
    pub bidders: HashMap<Address, BidderId>,

    /// Address by identity - 1
    pub bidder_addresses: Vec<Address>,

    /// Escrowed deposits
    pub escrow: HashMap<Address, u64>,

    /// Native currency credited by settlement, withdrawable by the host
    pub payouts: HashMap<Address, u64>,

    /// Auctioned asset credited by settlement
    pub asset_balances: HashMap<Address, u64>,

    /// Auctioned asset still held by the auction
    pub asset_custody: u64,

    /// Bidders whose escrow is resolved or being resolved
    pub settled: HashSet<BidderId>,

    /// Ranks with an issued blind claim
    pub rank_claimed: HashSet<u32>,

    /// Rank-claim slot assigned to each intermediary
    pub rank_slots: HashMap<Address, u32>,

    pub next_rank_slot: u32,

    pub pending: HashMap<RequestId, PendingDecryption>,

    pub resolved: HashSet<RequestId>,

    pub receipts: Vec<SettlementReceipt>,

    pub terminated: bool,
}

impl<B: ObliviousBackend> AuctionState<B> {
    /// Create the auction described by `config` on `backend`.
    pub fn new(config: AuctionGenesisConfig, mut backend: B) -> Result<Self, AuctionError> {
        config
            .validate()
            .map_err(|e| AuctionError::InvalidGenesis(e.to_string()))?;
        let mut budget = Budget::new(config.init_budget);
        let engine = Engine::new(config.engine_config(), &mut backend, &mut budget)?;

        Ok(Self {
            asset_custody: config.total_quantity,
            config,
            backend,
            engine,
            bidders: HashMap::new(),
            bidder_addresses: Vec::new(),
            escrow: HashMap::new(),
            payouts: HashMap::new(),
            asset_balances: HashMap::new(),
            settled: HashSet::new(),
            rank_claimed: HashSet::new(),
            rank_slots: HashMap::new(),
            next_rank_slot: 0,
            pending: HashMap::new(),
            resolved: HashSet::new(),
            receipts: Vec::new(),
            terminated: false,
        })
    }
}

impl AuctionState<ClearBackend> {
    /// Create the auction on a simulated backend seeded from the config.
    pub fn simulated(config: AuctionGenesisConfig) -> Result<Self, AuctionError> {
        let backend = ClearBackend::new(config.backend_seed);
        Self::new(config, backend)
    }
}

impl<B> AuctionState<B> {
    /// Get a bidder's identity by address.
    pub fn bidder_id(&self, address: &Address) -> Option<BidderId> {
        self.bidders.get(address).copied()
    }

    /// Get a bidder's address by identity.
    pub fn bidder_address(&self, id: BidderId) -> Option<Address> {
        if id == 0 {
            return None;
        }
        self.bidder_addresses.get(id as usize - 1).copied()
    }

    /// Register `address` under the next identity.
    pub fn register_bidder(&mut self, address: Address) -> BidderId {
        self.bidder_addresses.push(address);
        let id = self.bidder_addresses.len() as BidderId;
        self.bidders.insert(address, id);
        id
    }

    /// Get user's escrow balance.
    pub fn get_escrow(&self, address: &Address) -> u64 {
        self.escrow.get(address).copied().unwrap_or(0)
    }

    /// Add to user's escrow.
    pub fn add_escrow(&mut self, address: Address, amount: u64) {
        *self.escrow.entry(address).or_insert(0) += amount;
    }

    /// Remove and return user's whole escrow.
    pub fn take_escrow(&mut self, address: &Address) -> u64 {
        self.escrow.remove(address).unwrap_or(0)
    }

    pub fn get_payout(&self, address: &Address) -> u64 {
        self.payouts.get(address).copied().unwrap_or(0)
    }

    pub fn credit_payout(&mut self, address: Address, amount: u64) {
        if amount > 0 {
            *self.payouts.entry(address).or_insert(0) += amount;
        }
    }

    pub fn get_asset_balance(&self, address: &Address) -> u64 {
        self.asset_balances.get(address).copied().unwrap_or(0)
    }

    pub fn credit_asset(&mut self, address: Address, amount: u64) {
        if amount > 0 {
            *self.asset_balances.entry(address).or_insert(0) += amount;
        }
    }

    /// Number of registered bidders whose escrow is not resolved yet.
    pub fn unsettled_count(&self) -> usize {
        (1..=self.bidder_addresses.len() as BidderId)
            .filter(|id| !self.settled.contains(id))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> AuctionState<ClearBackend> {
        AuctionState::simulated(AuctionGenesisConfig::default()).unwrap()
    }

    #[test]
    fn test_register_bidder() {
        let mut state = state();
        assert_eq!(state.register_bidder([1u8; 32]), 1);
        assert_eq!(state.register_bidder([2u8; 32]), 2);

        assert_eq!(state.bidder_id(&[2u8; 32]), Some(2));
        assert_eq!(state.bidder_address(1), Some([1u8; 32]));
        assert_eq!(state.bidder_address(0), None);
        assert_eq!(state.bidder_address(3), None);
        assert_eq!(state.unsettled_count(), 2);
    }

    #[test]
    fn test_escrow_operations() {
        let mut state = state();
        let addr = [1u8; 32];

        assert_eq!(state.get_escrow(&addr), 0);

        state.add_escrow(addr, 100);
        state.add_escrow(addr, 50);
        assert_eq!(state.get_escrow(&addr), 150);

        assert_eq!(state.take_escrow(&addr), 150);
        assert_eq!(state.get_escrow(&addr), 0);
        assert_eq!(state.take_escrow(&addr), 0);
    }

    #[test]
    fn test_custody_starts_at_supply() {
        let state = state();
        assert_eq!(state.asset_custody, 1_000_000);
        assert!(!state.terminated);
    }
}
