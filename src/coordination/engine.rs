//! Order coordinator: drives each swap through its lifecycle

use super::registry::{SharedSlot, SwapRegistry, SwapSlot};
use crate::config::CoordinatorConfig;
use crate::error::{CoordinatorError, CoordinatorResult};
use crate::ledger::{SwapLedger, TransitionRecord};
use crate::monitor::EscrowMonitor;
use crate::orderbook::{OrderBook, OrderBookStatus, Quote, QuoteOracle, SwapParams};
use crate::secrets::{HashLock, HashLockBuilder, SecretVault};
use crate::swap::{ready_indices, FillStatus, Preset, Swap, SwapState, SwapView};

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::{interval, Duration};
use tracing::{debug, error, info, warn};

/// Result of one poll cycle for a swap
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PollOutcome {
    pub state: SwapState,
    /// Fill indices the book reported ready in this cycle
    pub ready: Vec<u32>,
    /// Indices whose secret was forwarded in this cycle
    pub newly_released: Vec<u32>,
    /// All indices released so far
    pub released: Vec<u32>,
}

impl PollOutcome {
    fn idle(swap: &Swap) -> Self {
        Self {
            state: swap.state,
            ready: Vec::new(),
            newly_released: Vec::new(),
            released: swap.released_indices(),
        }
    }
}

/// Swap orchestration engine
pub struct OrderCoordinator {
    /// Quoter
    oracle: Arc<dyn QuoteOracle>,
    /// Shared order book
    order_book: Arc<dyn OrderBook>,
    /// Fill and escrow readiness
    monitor: EscrowMonitor,
    /// Secret custody
    vault: SecretVault,
    /// Durable swap records
    ledger: Arc<dyn SwapLedger>,
    /// Configuration
    config: CoordinatorConfig,
    /// Live swaps, one mutex each
    registry: SwapRegistry,
    /// Shutdown flag
    shutdown: Arc<RwLock<bool>>,
}

impl OrderCoordinator {
    pub fn new(
        oracle: Arc<dyn QuoteOracle>,
        order_book: Arc<dyn OrderBook>,
        ledger: Arc<dyn SwapLedger>,
        config: CoordinatorConfig,
    ) -> Self {
        let monitor = EscrowMonitor::new(order_book.clone(), config.retry.clone());

        Self {
            oracle,
            order_book,
            monitor,
            vault: SecretVault::new(),
            ledger,
            config,
            registry: SwapRegistry::new(),
            shutdown: Arc::new(RwLock::new(false)),
        }
    }

    pub fn vault(&self) -> &SecretVault {
        &self.vault
    }

    pub fn active_swaps(&self) -> usize {
        self.registry.len()
    }

    /// Ask the quoter to price a swap between two configured chains
    pub async fn request_quote(&self, params: &SwapParams) -> CoordinatorResult<Quote> {
        for chain_id in [params.src_chain_id, params.dst_chain_id] {
            if !self.config.supports_chain(chain_id) {
                return Err(CoordinatorError::Config(format!(
                    "Chain {} is not configured",
                    chain_id
                )));
            }
        }
        if params.src_chain_id == params.dst_chain_id {
            return Err(CoordinatorError::Config(
                "Source and destination chains must differ".to_string(),
            ));
        }

        let quote = self.oracle.get_quote(params).await?;
        debug!(
            quote_id = %quote.quote_id,
            presets = quote.presets.len(),
            "Received quote"
        );
        Ok(quote)
    }

    /// Record a new swap at `Quoted`
    pub async fn accept_quote(
        &self,
        params: SwapParams,
        quote: Quote,
        preset: Option<Preset>,
        expires_at: Option<DateTime<Utc>>,
    ) -> CoordinatorResult<SwapView> {
        let now = Utc::now();
        let preset = preset.unwrap_or_else(|| quote.default_preset());
        let expires_at = match expires_at {
            Some(at) => at,
            None => {
                let ttl = chrono::Duration::from_std(self.config.default_order_ttl)
                    .map_err(|e| CoordinatorError::Config(e.to_string()))?;
                now + ttl
            }
        };

        let swap = Swap::quoted(params, quote, preset, expires_at, now);
        self.ledger.commit_transition(&swap, None).await?;
        crate::metrics::record_transition(SwapState::Quoted.as_str());
        info!(
            swap_id = %swap.swap_id,
            quote_id = %swap.quote.quote_id,
            preset = %preset,
            "Accepted quote"
        );

        let view = swap.view();
        self.registry.insert(SwapSlot::new(swap));
        crate::metrics::set_active_swaps(self.registry.len());
        Ok(view)
    }

    /// Quote, accept and build in one step
    pub async fn create_order(
        &self,
        params: SwapParams,
        preset: Option<Preset>,
        expires_at: Option<DateTime<Utc>>,
    ) -> CoordinatorResult<SwapView> {
        let quote = self.request_quote(&params).await?;
        let view = self.accept_quote(params, quote, preset, expires_at).await?;
        self.build_order(&view.swap_id.to_string()).await
    }

    /// `Quoted -> OrderBuilt`: issue the preset's secrets and lock them
    pub async fn build_order(&self, key: &str) -> CoordinatorResult<SwapView> {
        let shared = self.slot(key).await?;
        let mut slot = shared.lock().await;
        Self::check_usable(&slot)?;

        if slot.swap.state == SwapState::OrderBuilt {
            return Ok(slot.swap.view());
        }
        if slot.swap.is_expired_at(Utc::now()) {
            self.expire(&mut slot).await?;
            return Ok(slot.swap.view());
        }
        slot.swap.state.check_transition(SwapState::OrderBuilt)?;

        let swap_id = slot.swap.swap_id;
        let terms = slot.swap.quote.preset(slot.swap.preset).map(|t| t.clone());
        let terms = match terms {
            Ok(terms) => terms,
            Err(e) => return self.fail_swap(&mut slot, e).await,
        };

        let secrets = match self.vault.issue(swap_id, terms.secrets_count as usize) {
            Ok(secrets) => secrets,
            Err(e) if e.is_fatal() => return Err(self.halt(&mut slot, e)),
            Err(e) => return self.fail_swap(&mut slot, e).await,
        };
        let hash_lock = match HashLockBuilder::build(&secrets) {
            Ok(lock) => lock,
            Err(e) => return self.fail_swap(&mut slot, e).await,
        };
        let commitment = hash_lock.commitment();

        self.advance(&mut slot, SwapState::OrderBuilt, |swap| {
            swap.attach_secrets(secrets, hash_lock);
            swap.last_error = None;
        })
        .await?;

        info!(
            swap_id = %swap_id,
            secrets_count = terms.secrets_count,
            hash_lock = %commitment,
            "Built hash-locked order"
        );
        Ok(slot.swap.view())
    }

    /// `OrderBuilt -> Submitted -> AwaitingFills`.
    ///
    /// The slot stays locked across the submission so a swap is never
    /// submitted twice. The order hash is persisted before this returns.
    pub async fn submit_order(&self, key: &str) -> CoordinatorResult<SwapView> {
        let shared = self.slot(key).await?;
        let mut slot = shared.lock().await;
        Self::check_usable(&slot)?;

        if slot.swap.state.is_submitted() {
            return Ok(slot.swap.view());
        }
        if slot.swap.is_expired_at(Utc::now()) {
            self.expire(&mut slot).await?;
            return Ok(slot.swap.view());
        }
        if slot.swap.cancelled {
            return Err(CoordinatorError::Cancelled(slot.swap.key()));
        }
        slot.swap.state.check_transition(SwapState::Submitted)?;

        let swap_id = slot.swap.swap_id;
        let payload = match slot.swap.order_payload(&self.config.wallet_signer) {
            Some(payload) => payload,
            None => {
                let err = CoordinatorError::LedgerInconsistency {
                    swap_id: swap_id.to_string(),
                    message: "order built without a hash lock".to_string(),
                };
                return Err(self.halt(&mut slot, err));
            }
        };

        match self.order_book.submit(&payload).await {
            Ok(ack) => {
                let order_hash = ack.order_hash;
                self.advance(&mut slot, SwapState::Submitted, |swap| {
                    swap.order_hash = Some(order_hash.clone());
                    swap.last_error = None;
                })
                .await?;
                self.registry.index_order(&order_hash, swap_id);
                info!(swap_id = %swap_id, order_hash = %order_hash, "Order accepted by book");

                self.advance(&mut slot, SwapState::AwaitingFills, |_| {})
                    .await?;
                Ok(slot.swap.view())
            }
            Err(e) if e.fails_swap() => self.fail_swap(&mut slot, e).await,
            Err(e) => {
                warn!(swap_id = %swap_id, "Order submission failed: {}", e);
                self.note_error(&mut slot, &e).await;
                Err(e)
            }
        }
    }

    pub async fn poll_once(&self, key: &str) -> CoordinatorResult<PollOutcome> {
        self.poll_once_at(key, Utc::now()).await
    }

    /// One poll cycle with `now` as the earliest clock reading.
    ///
    /// The slot is unlocked while the order book is queried and re-locked to
    /// apply the result; expiry is checked again before every release.
    pub async fn poll_once_at(
        &self,
        key: &str,
        now: DateTime<Utc>,
    ) -> CoordinatorResult<PollOutcome> {
        let shared = self.slot(key).await?;

        let (swap_id, order_hash, commitment) = {
            let mut slot = shared.lock().await;
            if let Some(done) = self.settle_clock(&mut slot, now).await? {
                return Ok(done);
            }
            if !slot.swap.state.is_submitted() {
                return Ok(PollOutcome::idle(&slot.swap));
            }
            if slot.swap.state == SwapState::Submitted {
                self.advance(&mut slot, SwapState::AwaitingFills, |_| {})
                    .await?;
            }

            let order_hash = self.order_hash_of(&mut slot)?;
            let commitment = slot.swap.hash_lock.as_ref().map(HashLock::commitment);
            (slot.swap.swap_id, order_hash, commitment)
        };

        let observation = self.monitor.observe(&order_hash).await;

        let (ready, claimed) = {
            let mut slot = shared.lock().await;
            if let Some(done) = self.settle_clock(&mut slot, Self::later(now)).await? {
                return Ok(done);
            }

            let observation = match observation {
                Ok(observation) => {
                    slot.poll_failures = 0;
                    observation
                }
                Err(e) => return self.poll_failed(&mut slot, e).await,
            };

            if let (Some(reported), Some(expected)) = (observation.hash_lock, commitment) {
                if reported != expected {
                    let err = CoordinatorError::HashLockMismatch {
                        order_hash: order_hash.clone(),
                        expected: expected.to_hex(),
                        reported: reported.to_hex(),
                    };
                    return self.fail_swap(&mut slot, err).await;
                }
            }

            match observation.status {
                OrderBookStatus::Pending => {}
                OrderBookStatus::Executed => {
                    self.advance(&mut slot, SwapState::Settled, |swap| {
                        swap.last_error = None;
                    })
                    .await?;
                    return Ok(PollOutcome::idle(&slot.swap));
                }
                OrderBookStatus::Expired
                | OrderBookStatus::Refunding
                | OrderBookStatus::Refunded
                | OrderBookStatus::Cancelled => {
                    info!(
                        swap_id = %swap_id,
                        status = ?observation.status,
                        "Order closed by book without settling"
                    );
                    self.expire(&mut slot).await?;
                    return Ok(PollOutcome::idle(&slot.swap));
                }
                OrderBookStatus::Failed => {
                    self.advance(&mut slot, SwapState::Failed, |swap| {
                        swap.last_error = Some("order book reported the order failed".to_string());
                    })
                    .await?;
                    return Ok(PollOutcome::idle(&slot.swap));
                }
            }

            let ready = ready_indices(&observation.fills);
            if let Some(&index) = ready.iter().find(|&&i| i >= slot.swap.secrets_count) {
                let err = CoordinatorError::PrematureRelease {
                    swap_id: swap_id.to_string(),
                    index,
                };
                return self.fail_swap(&mut slot, err).await;
            }
            self.vault.authorize(swap_id, &observation.fills);

            let claimed: Vec<u32> = ready
                .iter()
                .copied()
                .filter(|i| {
                    slot.swap.released.get(*i as usize) == Some(&false)
                        && !slot.in_flight.contains(i)
                })
                .collect();
            slot.in_flight.extend(claimed.iter().copied());
            (ready, claimed)
        };

        let mut newly_released = Vec::new();
        let mut pending = claimed.into_iter();
        while let Some(index) = pending.next() {
            match self.deliver(&shared, &order_hash, index, now).await {
                Ok(true) => newly_released.push(index),
                Ok(false) => {
                    Self::unclaim(&shared, pending).await;
                    break;
                }
                Err(e) => {
                    Self::unclaim(&shared, pending).await;
                    return Err(e);
                }
            }
        }

        let mut slot = shared.lock().await;
        self.finish_releases(&mut slot).await?;
        Ok(PollOutcome {
            state: slot.swap.state,
            ready,
            newly_released,
            released: slot.swap.released_indices(),
        })
    }

    /// Release one secret on request. The fill must already have been
    /// observed ready.
    pub async fn release_secret(&self, key: &str, index: u32) -> CoordinatorResult<SwapView> {
        let shared = self.slot(key).await?;

        let order_hash = {
            let mut slot = shared.lock().await;
            Self::check_usable(&slot)?;
            if slot.swap.cancelled {
                return Err(CoordinatorError::Cancelled(slot.swap.key()));
            }
            if !slot.swap.state.is_polling() {
                return Err(CoordinatorError::InvalidStateTransition {
                    from: slot.swap.state.to_string(),
                    to: SwapState::SecretsReleased.to_string(),
                });
            }
            if index >= slot.swap.secrets_count {
                return Err(CoordinatorError::PrematureRelease {
                    swap_id: slot.swap.swap_id.to_string(),
                    index,
                });
            }
            if slot.swap.released[index as usize] || slot.in_flight.contains(&index) {
                return Ok(slot.swap.view());
            }

            let order_hash = self.order_hash_of(&mut slot)?;
            slot.in_flight.insert(index);
            order_hash
        };

        self.deliver(&shared, &order_hash, index, Utc::now()).await?;

        let mut slot = shared.lock().await;
        self.finish_releases(&mut slot).await?;
        Ok(slot.swap.view())
    }

    /// Stop polling and releasing for a swap. Secrets already revealed stay
    /// revealed.
    pub async fn cancel(&self, key: &str) -> CoordinatorResult<SwapView> {
        let shared = self.slot(key).await?;
        let mut slot = shared.lock().await;
        Self::check_usable(&slot)?;

        if slot.swap.state.is_terminal() || slot.swap.cancelled {
            return Ok(slot.swap.view());
        }

        if slot.swap.state.is_submitted() {
            let mut staged = slot.swap.clone();
            staged.cancelled = true;
            staged.updated_at = Utc::now();
            self.ledger.save(&staged).await?;
            slot.swap = staged;
        } else {
            self.advance(&mut slot, SwapState::Failed, |swap| {
                swap.cancelled = true;
                swap.last_error = Some("cancelled before submission".to_string());
            })
            .await?;
        }

        info!(swap_id = %slot.swap.swap_id, state = %slot.swap.state, "Swap cancelled");
        Ok(slot.swap.view())
    }

    pub async fn status(&self, key: &str) -> CoordinatorResult<SwapView> {
        if let Some(shared) = self.registry.get(key) {
            return Ok(shared.lock().await.swap.view());
        }
        Ok(self.ledger.load(key).await?.view())
    }

    pub async fn history(&self, key: &str) -> CoordinatorResult<Vec<TransitionRecord>> {
        let view = self.status(key).await?;
        self.ledger.history(view.swap_id).await
    }

    /// Current fill statuses straight from the order book. Ready fills are
    /// recorded with the vault.
    pub async fn ready_fills(&self, key: &str) -> CoordinatorResult<Vec<FillStatus>> {
        let view = self.status(key).await?;
        let order_hash = view.order_hash.ok_or_else(|| {
            CoordinatorError::NotFound(format!("order hash for swap {}", view.swap_id))
        })?;

        let fills = self.monitor.poll(&order_hash).await?;
        if view.state.is_polling() {
            self.vault.authorize(view.swap_id, &fills);
        }
        Ok(fills)
    }

    /// Reload unfinished swaps from the ledger and take custody of their
    /// secrets again. Returns how many swaps resumed.
    pub async fn recover(&self) -> CoordinatorResult<usize> {
        let swaps = self.ledger.list_incomplete().await?;
        let mut resumed = 0;

        for swap in swaps {
            let swap_id = swap.swap_id;
            let state = swap.state;
            let problem = swap.check_invariants().err();
            let shared = self.adopt(swap);

            if let Some(message) = problem {
                let mut slot = shared.lock().await;
                let err = CoordinatorError::LedgerInconsistency {
                    swap_id: swap_id.to_string(),
                    message,
                };
                self.halt(&mut slot, err);
                continue;
            }

            debug!(swap_id = %swap_id, state = %state, "Resumed swap");
            resumed += 1;
        }

        crate::metrics::set_active_swaps(self.registry.len());
        info!(resumed, "Recovered unfinished swaps");
        Ok(resumed)
    }

    /// Main scheduling loop
    pub async fn run(&self) -> CoordinatorResult<()> {
        let mut poll_interval = interval(self.config.poll_interval);

        // Cleanup interval
        let mut cleanup_interval = interval(Duration::from_secs(300));

        info!("Order coordinator started");

        loop {
            if *self.shutdown.read().await {
                break;
            }

            tokio::select! {
                _ = poll_interval.tick() => {
                    self.poll_active().await;
                }

                _ = cleanup_interval.tick() => {
                    self.cleanup().await;
                }
            }
        }

        info!("Order coordinator stopped");
        Ok(())
    }

    /// Poll every live swap once, concurrently. Returns how many were polled.
    pub async fn poll_active(&self) -> usize {
        let now = Utc::now();
        let mut due = Vec::new();

        for (swap_id, shared) in self.registry.slots() {
            // A locked slot is mid-transition; it is picked up next tick
            let Ok(slot) = shared.try_lock() else {
                continue;
            };
            let live = slot.halted.is_none() && !slot.swap.state.is_terminal();
            if live && (!slot.swap.cancelled || slot.swap.is_expired_at(now)) {
                due.push(swap_id.to_string());
            }
        }

        let results = join_all(due.iter().map(|key| self.poll_once(key))).await;
        for (key, result) in due.iter().zip(results) {
            match result {
                Ok(outcome) if !outcome.newly_released.is_empty() => {
                    debug!(swap = %key, released = ?outcome.newly_released, "Released secrets");
                }
                Ok(_) => {}
                Err(e) if e.is_retryable() => warn!(swap = %key, "Poll failed: {}", e),
                Err(e) => error!(swap = %key, "Poll failed: {}", e),
            }
        }

        due.len()
    }

    /// Stop the coordinator
    pub async fn stop(&self) {
        *self.shutdown.write().await = true;
        info!("Order coordinator shutdown initiated");
    }

    /// Drop terminal swaps from memory; the ledger keeps them
    async fn cleanup(&self) {
        for (swap_id, shared) in self.registry.slots() {
            let finished = match shared.try_lock() {
                Ok(slot) => slot.swap.state.is_terminal() && slot.in_flight.is_empty(),
                Err(_) => false,
            };
            if finished {
                self.registry.remove(&swap_id);
                self.vault.forget(swap_id);
            }
        }
        crate::metrics::set_active_swaps(self.registry.len());
    }

    async fn slot(&self, key: &str) -> CoordinatorResult<SharedSlot> {
        if let Some(shared) = self.registry.get(key) {
            return Ok(shared);
        }
        let swap = self.ledger.load(key).await?;
        Ok(self.adopt(swap))
    }

    fn adopt(&self, swap: Swap) -> SharedSlot {
        let swap_id = swap.swap_id;
        let restore = (!swap.state.is_terminal() && !swap.secrets.is_empty())
            .then(|| (swap.secrets.clone(), swap.released.clone()));

        let (shared, inserted) = self.registry.insert(SwapSlot::new(swap));
        if let (true, Some((secrets, released))) = (inserted, restore) {
            self.vault.restore(swap_id, secrets, &released);
        }
        shared
    }

    fn check_usable(slot: &SwapSlot) -> CoordinatorResult<()> {
        match &slot.halted {
            Some(reason) => Err(CoordinatorError::LedgerInconsistency {
                swap_id: slot.swap.swap_id.to_string(),
                message: reason.clone(),
            }),
            None => Ok(()),
        }
    }

    /// Checks shared by both halves of a poll. Returns an outcome when the
    /// cycle must stop here.
    async fn settle_clock(
        &self,
        slot: &mut SwapSlot,
        now: DateTime<Utc>,
    ) -> CoordinatorResult<Option<PollOutcome>> {
        Self::check_usable(slot)?;

        if slot.swap.state.is_terminal() {
            return Ok(Some(PollOutcome::idle(&slot.swap)));
        }
        if slot.swap.is_expired_at(now) {
            self.expire(slot).await?;
            return Ok(Some(PollOutcome::idle(&slot.swap)));
        }
        if slot.swap.cancelled {
            return Err(CoordinatorError::Cancelled(slot.swap.key()));
        }
        Ok(None)
    }

    fn order_hash_of(&self, slot: &mut SwapSlot) -> CoordinatorResult<String> {
        match slot.swap.order_hash.clone() {
            Some(hash) => Ok(hash),
            None => {
                let err = CoordinatorError::LedgerInconsistency {
                    swap_id: slot.swap.swap_id.to_string(),
                    message: format!("state {} without order hash", slot.swap.state),
                };
                Err(self.halt(slot, err))
            }
        }
    }

    /// Reveal and forward one claimed index. Returns `false` when the swap
    /// can no longer release secrets.
    async fn deliver(
        &self,
        shared: &SharedSlot,
        order_hash: &str,
        index: u32,
        now: DateTime<Utc>,
    ) -> CoordinatorResult<bool> {
        let (swap_id, secret) = {
            let mut slot = shared.lock().await;

            let blocked = slot.halted.is_some()
                || slot.swap.cancelled
                || slot.swap.state.is_terminal();
            if blocked {
                slot.in_flight.remove(&index);
                return Ok(false);
            }
            if slot.swap.is_expired_at(Self::later(now)) {
                slot.in_flight.remove(&index);
                self.expire(&mut slot).await?;
                return Ok(false);
            }

            let swap_id = slot.swap.swap_id;
            match self.vault.reveal(swap_id, index) {
                Ok(secret) => (swap_id, secret),
                Err(e) => {
                    slot.in_flight.remove(&index);
                    return Err(e);
                }
            }
        };

        let result = self
            .config
            .retry
            .run("submit secret", || {
                self.order_book.submit_secret(order_hash, &secret)
            })
            .await;

        let mut slot = shared.lock().await;
        slot.in_flight.remove(&index);

        match result {
            Ok(()) => {
                let mut staged = slot.swap.clone();
                if let Some(flag) = staged.released.get_mut(index as usize) {
                    *flag = true;
                }
                staged.updated_at = Utc::now();
                staged.last_error = None;
                self.ledger.save(&staged).await?;
                slot.swap = staged;

                crate::metrics::record_secret_released();
                info!(
                    swap_id = %swap_id,
                    order_hash,
                    index,
                    "Secret forwarded to order book"
                );
                Ok(true)
            }
            Err(exhausted) => {
                let err = exhausted.last_error;
                warn!(
                    swap_id = %swap_id,
                    index,
                    attempts = exhausted.attempts,
                    "Secret submission failed: {}",
                    err
                );
                self.note_error(&mut slot, &err).await;
                Err(err)
            }
        }
    }

    async fn unclaim(shared: &SharedSlot, indices: impl Iterator<Item = u32>) {
        let mut slot = shared.lock().await;
        for index in indices {
            slot.in_flight.remove(&index);
        }
    }

    async fn finish_releases(&self, slot: &mut SwapSlot) -> CoordinatorResult<()> {
        if slot.swap.state == SwapState::AwaitingFills && slot.swap.all_released() {
            self.advance(slot, SwapState::SecretsReleased, |_| {}).await?;
        }
        Ok(())
    }

    async fn poll_failed(
        &self,
        slot: &mut SwapSlot,
        err: CoordinatorError,
    ) -> CoordinatorResult<PollOutcome> {
        if !err.is_retryable() {
            if err.fails_swap() {
                return self.fail_swap(slot, err).await;
            }
            return Err(err);
        }

        slot.poll_failures += 1;
        crate::metrics::record_poll_failure();

        if slot.poll_failures >= self.config.max_consecutive_poll_failures.max(1) {
            error!(
                swap_id = %slot.swap.swap_id,
                failures = slot.poll_failures,
                "Order book unreachable, giving up on swap"
            );
            return self.fail_swap(slot, err).await;
        }

        warn!(
            swap_id = %slot.swap.swap_id,
            failures = slot.poll_failures,
            "Escrow poll failed: {}",
            err
        );
        Err(err)
    }

    /// Apply a transition write-ahead: the ledger commit happens before the
    /// in-memory swap changes.
    async fn advance<F>(
        &self,
        slot: &mut SwapSlot,
        next: SwapState,
        update: F,
    ) -> CoordinatorResult<()>
    where
        F: FnOnce(&mut Swap),
    {
        let mut staged = slot.swap.clone();
        update(&mut staged);
        let from = staged.transition(next, Utc::now())?;

        self.ledger.commit_transition(&staged, Some(from)).await?;
        slot.swap = staged;

        crate::metrics::record_transition(next.as_str());
        info!(
            swap_id = %slot.swap.swap_id,
            from = %from,
            to = %next,
            "Swap transitioned"
        );

        if next.is_terminal() {
            self.vault.forget(slot.swap.swap_id);
        }
        Ok(())
    }

    async fn fail_swap<T>(&self, slot: &mut SwapSlot, err: CoordinatorError) -> CoordinatorResult<T> {
        warn!(swap_id = %slot.swap.swap_id, "Failing swap: {}", err);
        let reason = err.to_string();
        self.advance(slot, SwapState::Failed, |swap| {
            swap.last_error = Some(reason);
        })
        .await?;
        Err(err)
    }

    async fn expire(&self, slot: &mut SwapSlot) -> CoordinatorResult<()> {
        info!(
            swap_id = %slot.swap.swap_id,
            expires_at = %slot.swap.expires_at,
            "Swap expired"
        );
        self.advance(slot, SwapState::Expired, |_| {}).await
    }

    async fn note_error(&self, slot: &mut SwapSlot, err: &CoordinatorError) {
        let mut staged = slot.swap.clone();
        staged.last_error = Some(err.to_string());
        staged.updated_at = Utc::now();

        match self.ledger.save(&staged).await {
            Ok(()) => slot.swap = staged,
            Err(e) => warn!(swap_id = %slot.swap.swap_id, "Failed to record error: {}", e),
        }
    }

    fn halt(&self, slot: &mut SwapSlot, err: CoordinatorError) -> CoordinatorError {
        error!(swap_id = %slot.swap.swap_id, "Halting swap: {}", err);
        slot.halted = Some(err.to_string());
        crate::metrics::record_ledger_inconsistency();
        err
    }

    fn later(now: DateTime<Utc>) -> DateTime<Utc> {
        now.max(Utc::now())
    }
}
