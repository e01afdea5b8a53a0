//! Pool of racing workers sharing one auction.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use auction_crypto::ObliviousBackend;
use auction_module::AuctionState;
use auction_types::Step;
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::service::{DriveSummary, WorkerConfig, WorkerService};

/// An auction shared between workers.
pub type SharedAuction<B> = Arc<Mutex<AuctionState<B>>>;

/// Runs `config.workers` workers against the same auction.
///
/// Each worker observes the current step, releases the lock, and only then
/// submits its call. Another worker may finish that step in between, which
/// the engine reports as a stale call.
pub struct WorkerPool {
    config: WorkerConfig,
}

impl WorkerPool {
    pub fn new(config: WorkerConfig) -> Self {
        Self { config }
    }

    /// Run all workers until the engine has finished.
    pub async fn run<B>(&self, auction: SharedAuction<B>, block_height: u64) -> Result<DriveSummary>
    where
        B: ObliviousBackend + Send + 'static,
    {
        let mut handles = Vec::with_capacity(self.config.workers);

        for index in 0..self.config.workers {
            let auction = Arc::clone(&auction);
            let service = WorkerService::new(self.config.clone(), worker_address(index));
            handles.push(tokio::spawn(async move {
                run_worker(index, service, auction, block_height).await
            }));
        }

        let mut total = DriveSummary::default();
        for handle in handles {
            let summary = handle.await.context("worker task panicked")??;
            total.merge(&summary);
        }

        info!(
            workers = self.config.workers,
            calls = total.calls,
            stale_calls = total.stale_calls,
            units = total.units_done,
            "Worker pool finished"
        );
        Ok(total)
    }
}

fn worker_address(index: usize) -> [u8; 32] {
    let mut address = [0u8; 32];
    address[..8].copy_from_slice(&(index as u64).to_le_bytes());
    address[31] = 0xAA;
    address
}

async fn run_worker<B: ObliviousBackend>(
    index: usize,
    service: WorkerService,
    auction: SharedAuction<B>,
    block_height: u64,
) -> Result<DriveSummary> {
    let pause = Duration::from_millis(service.config().poll_interval_ms);
    let mut summary = DriveSummary::default();

    loop {
        let observed = auction.lock().engine.step();
        if observed == Step::Finished {
            break;
        }
        if summary.calls >= service.config().max_calls {
            anyhow::bail!("worker {index} gave up after {} calls", summary.calls);
        }

        tokio::task::yield_now().await;

        let report = {
            let mut state = auction.lock();
            service
                .work_step(&mut state, observed, block_height)
                .with_context(|| format!("worker {index}"))?
        };
        summary.record(&report);

        debug!(
            worker = index,
            step = ?report.step,
            units = report.units_done,
            "Worker call"
        );

        tokio::time::sleep(pause).await;
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use auction_crypto::{ClearBackend, Decrypt};
    use auction_module::handlers::handle_submit_bid;
    use auction_module::{AuctionGenesisConfig, CallContext};

    fn auction(bids: &[(u64, u64)]) -> AuctionState<ClearBackend> {
        let mut state = AuctionState::simulated(AuctionGenesisConfig {
            total_quantity: 100,
            ..Default::default()
        })
        .unwrap();
        for (i, (price, quantity)) in bids.iter().enumerate() {
            let price = state.backend.encrypt(*price).unwrap();
            let quantity = state.backend.encrypt(*quantity).unwrap();
            let ctx = CallContext {
                sender: [i as u8 + 1; 32],
                block_height: 1,
                timestamp: 0,
                value: 0,
            };
            handle_submit_bid(&mut state, &ctx, price, quantity).unwrap();
        }
        state
    }

    fn outcome(state: &AuctionState<ClearBackend>) -> (Vec<u64>, u64) {
        let won = (1..=state.engine.bid_count())
            .map(|id| {
                let allocation = state.engine.allocation_by_identity(id).unwrap();
                state.backend.decrypt(allocation.quantity).unwrap()
            })
            .collect();
        let price = state
            .backend
            .decrypt(state.engine.uniform_price().unwrap())
            .unwrap();
        (won, price)
    }

    #[test]
    fn test_worker_addresses_distinct() {
        assert_ne!(worker_address(0), worker_address(1));
    }

    #[tokio::test]
    async fn test_pool_matches_single_worker() {
        let bids = [(40, 30), (70, 30), (40, 50), (10, 60), (55, 20)];
        let config = WorkerConfig {
            units_per_call: 3,
            workers: 4,
            ..Default::default()
        };

        let mut sequential = auction(&bids);
        WorkerService::new(config.clone(), [1u8; 32])
            .drive(&mut sequential, 1)
            .unwrap();

        let shared: SharedAuction<ClearBackend> = Arc::new(Mutex::new(auction(&bids)));
        let summary = WorkerPool::new(config)
            .run(Arc::clone(&shared), 1)
            .await
            .unwrap();

        let pooled = shared.lock();
        assert_eq!(pooled.engine.step(), Step::Finished);
        assert_eq!(summary.units_done, 5 + 10 + 25 + 25);
        assert_eq!(outcome(&pooled), outcome(&sequential));
        assert_eq!(outcome(&pooled), (vec![0, 30, 50, 0, 20], 40));
    }

    #[tokio::test]
    async fn test_pool_on_finished_auction_does_nothing() {
        let mut state = auction(&[(5, 5)]);
        WorkerService::new(WorkerConfig::default(), [1u8; 32])
            .drive(&mut state, 1)
            .unwrap();

        let summary = WorkerPool::new(WorkerConfig::default())
            .run(Arc::new(Mutex::new(state)), 1)
            .await
            .unwrap();
        assert_eq!(summary.calls, 0);
    }
}
