//! Escrow monitoring
//!
//! This module provides:
//! - Bounded exponential-backoff retry for order book queries
//! - Merging of per-fill escrow reports into ready-for-secret statuses

pub mod escrow;
pub mod retry;

pub use escrow::{merge_fills, EscrowMonitor, EscrowObservation};
pub use retry::RetryPolicy;
