//! Swap coordination
//!
//! The order coordinator:
//! 1. Quotes swaps and records them at `Quoted`
//! 2. Builds hash-locked orders from vault-issued secrets
//! 3. Submits orders, persisting the order hash before acknowledging
//! 4. Polls escrow readiness and releases one secret per ready fill
//! 5. Observes settlement, expiry and failure

pub mod engine;
pub mod registry;

pub use engine::{OrderCoordinator, PollOutcome};
pub use registry::{SwapRegistry, SwapSlot};
