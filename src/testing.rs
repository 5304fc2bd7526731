//! In-memory collaborators for multi-poll coordinator tests

use crate::config::{CoordinatorConfig, DatabaseConfig};
use crate::error::{CoordinatorError, CoordinatorResult};
use crate::ledger::SqliteLedger;
use crate::monitor::RetryPolicy;
use crate::orderbook::{
    FillReport, OrderBook, OrderBookStatus, OrderPayload, OrderStatus, Quote, QuoteOracle,
    ReadyFill, SubmitAck, SwapParams,
};
use crate::secrets::{Hash32, Secret};

use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;
use tempfile::TempDir;

pub fn test_config() -> CoordinatorConfig {
    CoordinatorConfig {
        api_key: "test-key".to_string(),
        wallet_signer: "0x00000000000000000000000000000000000000aa".to_string(),
        chain_endpoints: HashMap::from([
            (1, "https://eth.example".to_string()),
            (137, "https://polygon.example".to_string()),
        ]),
        poll_interval: Duration::from_millis(20),
        retry: RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        },
        max_consecutive_poll_failures: 2,
        default_order_ttl: Duration::from_secs(1800),
    }
}

pub async fn open_ledger() -> (TempDir, SqliteLedger) {
    let dir = tempfile::tempdir().unwrap();
    let config = DatabaseConfig {
        url: format!("sqlite://{}", dir.path().join("ledger.db").display()),
        max_connections: 4,
    };
    let ledger = SqliteLedger::new(&config).await.unwrap();
    (dir, ledger)
}

/// Quoter that always answers with the same quote
pub struct FakeOracle {
    quote: Quote,
}

impl FakeOracle {
    pub fn new(quote: Quote) -> Self {
        Self { quote }
    }
}

#[async_trait]
impl QuoteOracle for FakeOracle {
    async fn get_quote(&self, _params: &SwapParams) -> CoordinatorResult<Quote> {
        Ok(self.quote.clone())
    }
}

struct FakeOrder {
    payload: OrderPayload,
    status: OrderBookStatus,
    ready: BTreeSet<u32>,
    reported_lock: Option<Hash32>,
}

#[derive(Default)]
struct BookState {
    orders: HashMap<String, FakeOrder>,
    released: Vec<(String, u32, Secret)>,
    active: HashSet<(String, u32)>,
    overlap: bool,
    unavailable: bool,
    next_order: u64,
}

/// Order book that behaves like the relayer: it checks each secret against
/// the order's hashes and reports which fills are ready.
#[derive(Default)]
pub struct FakeOrderBook {
    state: Mutex<BookState>,
    ready_delay: Duration,
    secret_delay: Duration,
}

impl FakeOrderBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay the ready-fills answer, as a slow relayer would
    pub fn with_ready_delay(mut self, delay: Duration) -> Self {
        self.ready_delay = delay;
        self
    }

    /// Keep each secret submission open for a while
    pub fn with_secret_delay(mut self, delay: Duration) -> Self {
        self.secret_delay = delay;
        self
    }

    pub fn mark_ready(&self, order_hash: &str, idx: u32) {
        let mut state = self.state.lock().unwrap();
        state.orders.get_mut(order_hash).unwrap().ready.insert(idx);
    }

    pub fn set_status(&self, order_hash: &str, status: OrderBookStatus) {
        let mut state = self.state.lock().unwrap();
        state.orders.get_mut(order_hash).unwrap().status = status;
    }

    pub fn report_hash_lock(&self, order_hash: &str, lock: Hash32) {
        let mut state = self.state.lock().unwrap();
        state.orders.get_mut(order_hash).unwrap().reported_lock = Some(lock);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().unwrap().unavailable = unavailable;
    }

    /// Secrets received for an order, in arrival order
    pub fn released(&self, order_hash: &str) -> Vec<(u32, Secret)> {
        self.state
            .lock()
            .unwrap()
            .released
            .iter()
            .filter(|(hash, _, _)| hash == order_hash)
            .map(|(_, idx, secret)| (*idx, secret.clone()))
            .collect()
    }

    /// Whether two submissions for the same fill were ever open at once
    pub fn saw_overlap(&self) -> bool {
        self.state.lock().unwrap().overlap
    }

    fn check_available(&self) -> CoordinatorResult<()> {
        if self.state.lock().unwrap().unavailable {
            return Err(CoordinatorError::OrderBook("503 Service Unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl OrderBook for FakeOrderBook {
    async fn submit(&self, payload: &OrderPayload) -> CoordinatorResult<SubmitAck> {
        self.check_available()?;
        let mut state = self.state.lock().unwrap();
        state.next_order += 1;
        let order_hash = format!("0x{:064x}", state.next_order);
        state.orders.insert(
            order_hash.clone(),
            FakeOrder {
                payload: payload.clone(),
                status: OrderBookStatus::Pending,
                ready: BTreeSet::new(),
                reported_lock: None,
            },
        );
        Ok(SubmitAck { order_hash })
    }

    async fn get_order_status(&self, order_hash: &str) -> CoordinatorResult<OrderStatus> {
        self.check_available()?;
        let state = self.state.lock().unwrap();
        let order = state
            .orders
            .get(order_hash)
            .ok_or_else(|| CoordinatorError::NotFound(order_hash.to_string()))?;

        Ok(OrderStatus {
            order_hash: order_hash.to_string(),
            status: order.status,
            fills: order
                .ready
                .iter()
                .map(|idx| FillReport {
                    idx: *idx,
                    src_escrow_deployed: true,
                    dst_escrow_deployed: true,
                })
                .collect(),
            hash_lock: Some(order.reported_lock.unwrap_or(order.payload.hash_lock)),
        })
    }

    async fn get_ready_to_accept_secret_fills(
        &self,
        order_hash: &str,
    ) -> CoordinatorResult<Vec<ReadyFill>> {
        self.check_available()?;
        if !self.ready_delay.is_zero() {
            tokio::time::sleep(self.ready_delay).await;
        }

        let state = self.state.lock().unwrap();
        let order = state
            .orders
            .get(order_hash)
            .ok_or_else(|| CoordinatorError::NotFound(order_hash.to_string()))?;

        Ok(order
            .ready
            .iter()
            .map(|idx| ReadyFill {
                idx: *idx,
                src_escrow_deploy_tx_hash: Some(format!("0xsrc{}", idx)),
                dst_escrow_deploy_tx_hash: Some(format!("0xdst{}", idx)),
            })
            .collect())
    }

    async fn submit_secret(&self, order_hash: &str, secret: &Secret) -> CoordinatorResult<()> {
        self.check_available()?;
        let key = {
            let mut state = self.state.lock().unwrap();
            let order = state
                .orders
                .get(order_hash)
                .ok_or_else(|| CoordinatorError::NotFound(order_hash.to_string()))?;
            let idx = order
                .payload
                .secret_hashes
                .iter()
                .position(|h| *h == secret.hash())
                .ok_or_else(|| {
                    CoordinatorError::SubmissionRejected("secret does not match order".to_string())
                })? as u32;

            let key = (order_hash.to_string(), idx);
            if !state.active.insert(key.clone()) {
                state.overlap = true;
            }
            key
        };

        if !self.secret_delay.is_zero() {
            tokio::time::sleep(self.secret_delay).await;
        }

        let mut state = self.state.lock().unwrap();
        state.active.remove(&key);
        state.released.push((key.0, key.1, secret.clone()));
        Ok(())
    }
}
