//! Durable swap ledger
//!
//! Handles:
//! - Crash-consistent swap record persistence (secrets included)
//! - Append-only transition history
//! - Startup recovery of unfinished swaps

mod sqlite;

pub use sqlite::SqliteLedger;

use crate::error::CoordinatorResult;
use crate::swap::{Swap, SwapState};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// One entry of a swap's transition history
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransitionRecord {
    pub swap_id: Uuid,
    pub from: Option<SwapState>,
    pub to: SwapState,
    pub reason: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

#[async_trait]
pub trait SwapLedger: Send + Sync {
    /// Idempotent upsert keyed by swap id
    async fn save(&self, swap: &Swap) -> CoordinatorResult<()>;

    /// Save the record and append the transition that produced it, atomically.
    /// `from` is `None` when the swap is first recorded.
    async fn commit_transition(
        &self,
        swap: &Swap,
        from: Option<SwapState>,
    ) -> CoordinatorResult<()>;

    /// Look up by order hash or swap id
    async fn load(&self, key: &str) -> CoordinatorResult<Swap>;

    /// Swaps not yet in a terminal state
    async fn list_incomplete(&self) -> CoordinatorResult<Vec<Swap>>;

    async fn history(&self, swap_id: Uuid) -> CoordinatorResult<Vec<TransitionRecord>>;
}
