//! Synchronous worker service.

use anyhow::{bail, Context, Result};
use auction_crypto::ObliviousBackend;
use auction_module::handlers::{handle_advance, handle_do_work};
use auction_module::{AuctionState, CallContext};
use auction_types::{Address, Step, WorkReport, WorkStatus};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Configuration for workers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Units requested per call
    pub units_per_call: u64,
    /// Computation budget attached to each call
    pub budget_per_call: u64,
    /// Number of concurrent workers in a pool
    pub workers: usize,
    /// Calls after which a worker gives up
    pub max_calls: u64,
    /// Pause between calls of a pool worker, in milliseconds
    pub poll_interval_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            units_per_call: 64,
            budget_per_call: 50_000,
            workers: 4,
            max_calls: 1_000_000,
            poll_interval_ms: 1,
        }
    }
}

/// Totals over a sequence of calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriveSummary {
    pub calls: u64,
    pub units_done: u64,
    pub budget_spent: u64,
    /// Calls that found their step already finished by someone else
    pub stale_calls: u64,
}

impl DriveSummary {
    pub fn record(&mut self, report: &WorkReport) {
        self.calls += 1;
        self.units_done += report.units_done;
        self.budget_spent += report.budget_spent;
        if report.units_done == 0 && report.status == WorkStatus::StepOrEngineFinished {
            self.stale_calls += 1;
        }
    }

    pub fn merge(&mut self, other: &DriveSummary) {
        self.calls += other.calls;
        self.units_done += other.units_done;
        self.budget_spent += other.budget_spent;
        self.stale_calls += other.stale_calls;
    }
}

/// The worker service.
pub struct WorkerService {
    config: WorkerConfig,
    sender: Address,
}

impl WorkerService {
    /// Create a new worker service submitting calls as `sender`.
    pub fn new(config: WorkerConfig, sender: Address) -> Self {
        Self { config, sender }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    fn context(&self, block_height: u64) -> CallContext {
        CallContext {
            sender: self.sender,
            block_height,
            timestamp: 0,
            value: 0,
        }
    }

    /// Submit one call for `step`.
    ///
    /// Fails when the budget does not cover a single unit, since retrying
    /// with the same budget cannot make progress.
    pub fn work_step<B: ObliviousBackend>(
        &self,
        state: &mut AuctionState<B>,
        step: Step,
        block_height: u64,
    ) -> Result<WorkReport> {
        let report = handle_do_work(
            state,
            &self.context(block_height),
            step,
            self.config.units_per_call,
            self.config.budget_per_call,
        )
        .with_context(|| format!("work call for {step:?} failed"))?;

        if report.status == WorkStatus::InsufficientBudget {
            bail!(
                "budget_per_call {} does not cover one unit of {:?}",
                self.config.budget_per_call,
                step
            );
        }
        Ok(report)
    }

    /// Advance `state` until the engine has finished.
    pub fn drive<B: ObliviousBackend>(
        &self,
        state: &mut AuctionState<B>,
        block_height: u64,
    ) -> Result<DriveSummary> {
        let mut summary = DriveSummary::default();

        while state.engine.step() != Step::Finished {
            if summary.calls >= self.config.max_calls {
                bail!(
                    "gave up after {} calls at {:?}",
                    summary.calls,
                    state.engine.step()
                );
            }

            let report = handle_advance(
                state,
                &self.context(block_height),
                self.config.units_per_call,
                self.config.budget_per_call,
            )
            .context("advance call failed")?;

            if report.status == WorkStatus::InsufficientBudget {
                bail!(
                    "budget_per_call {} does not cover one unit of {:?}",
                    self.config.budget_per_call,
                    report.step
                );
            }

            debug!(
                step = ?report.step,
                progress = report.progress,
                max = report.max,
                "Advanced"
            );
            summary.record(&report);
        }

        info!(
            calls = summary.calls,
            units = summary.units_done,
            budget_spent = summary.budget_spent,
            "Auction computation finished"
        );
        Ok(summary)
    }
}
