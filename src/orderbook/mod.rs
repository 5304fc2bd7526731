//! Collaborator boundaries: quote oracle and shared order book
//!
//! The coordinator only talks to these traits. `FusionPlusClient` is the
//! HTTP implementation used by the service binary; tests substitute mocks.

mod http;
mod types;

pub use http::FusionPlusClient;
pub use types::{
    FillReport, OrderBookStatus, OrderPayload, OrderStatus, PresetTerms, Quote, ReadyFill,
    ReadyFills, SubmitAck, SwapParams,
};

use crate::error::CoordinatorResult;
use crate::secrets::Secret;

use async_trait::async_trait;

/// Prices a swap and lists the presets it can be filled with
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QuoteOracle: Send + Sync {
    async fn get_quote(&self, params: &SwapParams) -> CoordinatorResult<Quote>;
}

/// Order book shared with the resolver network
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OrderBook: Send + Sync {
    /// Fails with `SubmissionRejected` when the book refuses the order
    async fn submit(&self, payload: &OrderPayload) -> CoordinatorResult<SubmitAck>;

    async fn get_order_status(&self, order_hash: &str) -> CoordinatorResult<OrderStatus>;

    async fn get_ready_to_accept_secret_fills(
        &self,
        order_hash: &str,
    ) -> CoordinatorResult<Vec<ReadyFill>>;

    async fn submit_secret(&self, order_hash: &str, secret: &Secret) -> CoordinatorResult<()>;
}
