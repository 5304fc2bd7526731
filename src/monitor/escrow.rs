//! Escrow readiness tracking for submitted orders
//!
//! A fill may sit at `escrow_deployed = true, ready_for_secret = false` for
//! many polls while the destination chain collects confirmations. That is
//! the normal waiting state, not an error.

use super::retry::RetryPolicy;
use crate::error::{CoordinatorError, CoordinatorResult};
use crate::orderbook::{FillReport, OrderBook, OrderBookStatus, ReadyFill};
use crate::secrets::Hash32;
use crate::swap::{ChainSide, FillStatus};

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Everything one poll learned about an order
#[derive(Debug, Clone)]
pub struct EscrowObservation {
    pub status: OrderBookStatus,
    pub hash_lock: Option<Hash32>,
    pub fills: Vec<FillStatus>,
}

/// Polls the order book for fill and escrow state
pub struct EscrowMonitor {
    order_book: Arc<dyn OrderBook>,
    retry: RetryPolicy,
}

impl EscrowMonitor {
    pub fn new(order_book: Arc<dyn OrderBook>, retry: RetryPolicy) -> Self {
        Self { order_book, retry }
    }

    /// Fill statuses ordered by fill index, source side first
    pub async fn poll(&self, order_hash: &str) -> CoordinatorResult<Vec<FillStatus>> {
        Ok(self.observe(order_hash).await?.fills)
    }

    /// Order status plus fill statuses. Each query is retried on its own;
    /// running out of attempts yields `MonitorUnavailable`.
    pub async fn observe(&self, order_hash: &str) -> CoordinatorResult<EscrowObservation> {
        let started = Instant::now();

        let status = self
            .retry
            .run("order status", || self.order_book.get_order_status(order_hash))
            .await
            .map_err(|e| Self::unavailable(order_hash, e))?;

        let ready = self
            .retry
            .run("ready fills", || {
                self.order_book.get_ready_to_accept_secret_fills(order_hash)
            })
            .await
            .map_err(|e| Self::unavailable(order_hash, e))?;

        let fills = merge_fills(&status.fills, &ready);
        crate::metrics::record_poll_latency(started.elapsed().as_secs_f64());
        debug!(
            order_hash,
            status = ?status.status,
            fills = fills.len(),
            "Observed order escrows"
        );

        Ok(EscrowObservation {
            status: status.status,
            hash_lock: status.hash_lock,
            fills,
        })
    }

    fn unavailable(order_hash: &str, exhausted: super::retry::Exhausted) -> CoordinatorError {
        match exhausted.last_error {
            // Non-transient errors keep their own kind
            err if !err.is_retryable() => err,
            err => CoordinatorError::MonitorUnavailable {
                order_hash: order_hash.to_string(),
                attempts: exhausted.attempts,
                message: err.to_string(),
            },
        }
    }
}

/// Combine the book's per-fill escrow view with its ready list.
///
/// A destination status is ready only when the book lists the fill and
/// escrows are visible on both chains.
pub fn merge_fills(reports: &[FillReport], ready: &[ReadyFill]) -> Vec<FillStatus> {
    #[derive(Default)]
    struct Seen {
        src: bool,
        dst: bool,
        listed: bool,
    }

    let mut fills: BTreeMap<u32, Seen> = BTreeMap::new();
    for report in reports {
        let seen = fills.entry(report.idx).or_default();
        seen.src |= report.src_escrow_deployed;
        seen.dst |= report.dst_escrow_deployed;
    }
    for fill in ready {
        let seen = fills.entry(fill.idx).or_default();
        seen.src |= fill.src_escrow_deploy_tx_hash.is_some();
        seen.dst |= fill.dst_escrow_deploy_tx_hash.is_some();
        seen.listed = true;
    }

    let mut statuses = Vec::with_capacity(fills.len() * 2);
    for (idx, seen) in fills {
        if seen.listed && !(seen.src && seen.dst) {
            debug!(fill = idx, "Fill listed ready before both escrows are visible");
        }
        statuses.push(FillStatus {
            fill_index: idx,
            chain_side: ChainSide::Source,
            escrow_deployed: seen.src,
            ready_for_secret: false,
        });
        statuses.push(FillStatus {
            fill_index: idx,
            chain_side: ChainSide::Destination,
            escrow_deployed: seen.dst,
            ready_for_secret: seen.listed && seen.src && seen.dst,
        });
    }
    statuses
}
