//! Swap Coordinator - hash-locked cross-chain swaps over a shared order book
//!
//! Quotes a swap, locks its funds behind one secret or a Merkle root of
//! several, submits the order, and releases each secret only once the
//! matching fill's escrows are deployed on both chains.

pub mod api;
pub mod config;
pub mod coordination;
pub mod error;
pub mod ledger;
pub mod metrics;
pub mod monitor;
pub mod orderbook;
pub mod secrets;
pub mod swap;

#[cfg(test)]
pub(crate) mod testing;

pub use coordination::OrderCoordinator;
pub use error::{CoordinatorError, CoordinatorResult};
