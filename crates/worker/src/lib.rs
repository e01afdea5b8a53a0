//! Permissionless workers for confidential uniform-price auctions.
//!
//! The engine only moves forward when somebody pays for it. A worker:
//! 1. Reads the current step of an auction
//! 2. Submits a budgeted "advance" call for that step
//! 3. Repeats until the engine reports `Finished`
//!
//! Anyone can run workers. Several workers may race on the same auction;
//! units are addressed by position, so a losing call only wastes its budget.

pub mod pool;
pub mod service;

pub use pool::{SharedAuction, WorkerPool};
pub use service::{DriveSummary, WorkerConfig, WorkerService};
