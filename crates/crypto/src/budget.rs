//! Budget metering for oblivious operations.
//!
//! Each invocation of the engine runs against a fixed computation budget. The
//! cost of an operation depends only on its kind, never on the values involved,
//! so the cost of a unit of work is the same for every input.

use auction_types::{EncBool, EncU64};
use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::backend::ObliviousBackend;
use crate::error::CryptoError;

/// Kinds of oblivious operations, for costing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Op {
    Encrypt,
    Add,
    Sub,
    Min,
    Eq,
    Gt,
    Logic,
    Select,
    Random,
}

/// Per-operation cost.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize,
)]
pub struct CostTable {
    pub encrypt: u64,
    pub add: u64,
    pub sub: u64,
    pub min: u64,
    pub eq: u64,
    pub gt: u64,
    /// and / or / not
    pub logic: u64,
    pub select: u64,
    pub random: u64,
}

impl Default for CostTable {
    fn default() -> Self {
        Self {
            encrypt: 1,
            add: 10,
            sub: 10,
            min: 15,
            eq: 10,
            gt: 15,
            logic: 2,
            select: 5,
            random: 20,
        }
    }
}

impl CostTable {
    /// Cost of a single operation.
    pub fn cost(&self, op: Op) -> u64 {
        match op {
            Op::Encrypt => self.encrypt,
            Op::Add => self.add,
            Op::Sub => self.sub,
            Op::Min => self.min,
            Op::Eq => self.eq,
            Op::Gt => self.gt,
            Op::Logic => self.logic,
            Op::Select => self.select,
            Op::Random => self.random,
        }
    }
}

/// Computation budget for one invocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Budget {
    limit: u64,
    spent: u64,
}

impl Budget {
    /// Create a budget with the given limit.
    pub fn new(limit: u64) -> Self {
        Self { limit, spent: 0 }
    }

    /// A budget that never runs out.
    pub fn unlimited() -> Self {
        Self::new(u64::MAX)
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    pub fn spent(&self) -> u64 {
        self.spent
    }

    pub fn remaining(&self) -> u64 {
        self.limit - self.spent
    }

    /// Charge `cost`. Nothing is charged when the remaining budget is too small.
    pub fn charge(&mut self, cost: u64) -> Result<(), CryptoError> {
        let remaining = self.remaining();
        if cost > remaining {
            return Err(CryptoError::BudgetExhausted {
                needed: cost,
                remaining,
            });
        }
        self.spent += cost;
        Ok(())
    }
}

/// Backend wrapper charging a [`Budget`] for every operation.
#[derive(Debug)]
pub struct Metered<'a, B> {
    backend: &'a mut B,
    budget: &'a mut Budget,
    costs: CostTable,
}

impl<'a, B: ObliviousBackend> Metered<'a, B> {
    /// Wrap `backend`, charging `budget` according to `costs`.
    pub fn new(backend: &'a mut B, budget: &'a mut Budget, costs: CostTable) -> Self {
        Self {
            backend,
            budget,
            costs,
        }
    }

    /// Budget left in this invocation.
    pub fn remaining(&self) -> u64 {
        self.budget.remaining()
    }

    fn charge(&mut self, op: Op) -> Result<(), CryptoError> {
        self.budget.charge(self.costs.cost(op))
    }
}

impl<B: ObliviousBackend> ObliviousBackend for Metered<'_, B> {
    fn encrypt(&mut self, value: u64) -> Result<EncU64, CryptoError> {
        self.charge(Op::Encrypt)?;
        self.backend.encrypt(value)
    }

    fn add(&mut self, a: EncU64, b: EncU64) -> Result<EncU64, CryptoError> {
        self.charge(Op::Add)?;
        self.backend.add(a, b)
    }

    fn sub(&mut self, a: EncU64, b: EncU64) -> Result<EncU64, CryptoError> {
        self.charge(Op::Sub)?;
        self.backend.sub(a, b)
    }

    fn min(&mut self, a: EncU64, b: EncU64) -> Result<EncU64, CryptoError> {
        self.charge(Op::Min)?;
        self.backend.min(a, b)
    }

    fn eq(&mut self, a: EncU64, b: EncU64) -> Result<EncBool, CryptoError> {
        self.charge(Op::Eq)?;
        self.backend.eq(a, b)
    }

    fn gt(&mut self, a: EncU64, b: EncU64) -> Result<EncBool, CryptoError> {
        self.charge(Op::Gt)?;
        self.backend.gt(a, b)
    }

    fn and(&mut self, a: EncBool, b: EncBool) -> Result<EncBool, CryptoError> {
        self.charge(Op::Logic)?;
        self.backend.and(a, b)
    }

    fn or(&mut self, a: EncBool, b: EncBool) -> Result<EncBool, CryptoError> {
        self.charge(Op::Logic)?;
        self.backend.or(a, b)
    }

    fn not(&mut self, a: EncBool) -> Result<EncBool, CryptoError> {
        self.charge(Op::Logic)?;
        self.backend.not(a)
    }

    fn select(
        &mut self,
        cond: EncBool,
        if_true: EncU64,
        if_false: EncU64,
    ) -> Result<EncU64, CryptoError> {
        self.charge(Op::Select)?;
        self.backend.select(cond, if_true, if_false)
    }

    fn random_below(&mut self, bound: u64) -> Result<EncU64, CryptoError> {
        self.charge(Op::Random)?;
        self.backend.random_below(bound)
    }
}
