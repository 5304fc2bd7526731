//! Durable swap record

use super::{Preset, SwapState};
use crate::error::CoordinatorResult;
use crate::orderbook::{OrderPayload, Quote, SwapParams};
use crate::secrets::{Hash32, HashLock, HashLockBuilder, Secret};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One swap as persisted in the ledger.
///
/// Invariants once secrets exist: `secrets`, `secret_hashes` and `released`
/// all have `secrets_count` entries and `secret_hashes[i]` is the hash of
/// `secrets[i]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Swap {
    pub swap_id: Uuid,
    pub order_hash: Option<String>,
    pub quote: Quote,
    pub params: SwapParams,
    pub preset: Preset,
    pub secrets_count: u32,
    pub secrets: Vec<Secret>,
    pub secret_hashes: Vec<Hash32>,
    pub hash_lock: Option<HashLock>,
    pub released: Vec<bool>,
    pub state: SwapState,
    #[serde(default)]
    pub cancelled: bool,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Swap {
    /// New swap at `Quoted`
    pub fn quoted(
        params: SwapParams,
        quote: Quote,
        preset: Preset,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            swap_id: Uuid::new_v4(),
            order_hash: None,
            quote,
            params,
            preset,
            secrets_count: 0,
            secrets: Vec::new(),
            secret_hashes: Vec::new(),
            hash_lock: None,
            released: Vec::new(),
            state: SwapState::Quoted,
            cancelled: false,
            last_error: None,
            created_at: now,
            updated_at: now,
            expires_at,
        }
    }

    /// Ledger key: the order hash once assigned, the swap id before
    pub fn key(&self) -> String {
        self.order_hash
            .clone()
            .unwrap_or_else(|| self.swap_id.to_string())
    }

    pub fn src_chain_id(&self) -> u64 {
        self.params.src_chain_id
    }

    pub fn dst_chain_id(&self) -> u64 {
        self.params.dst_chain_id
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        !self.state.is_terminal() && now >= self.expires_at
    }

    /// Move to `next`, returning the previous state
    pub fn transition(
        &mut self,
        next: SwapState,
        now: DateTime<Utc>,
    ) -> CoordinatorResult<SwapState> {
        self.state.check_transition(next)?;
        let previous = self.state;
        self.state = next;
        self.updated_at = now;
        Ok(previous)
    }

    /// Attach secrets and the lock derived from them
    pub fn attach_secrets(&mut self, secrets: Vec<Secret>, hash_lock: HashLock) {
        self.secrets_count = secrets.len() as u32;
        self.secret_hashes = hash_lock.secret_hashes();
        self.released = vec![false; secrets.len()];
        self.secrets = secrets;
        self.hash_lock = Some(hash_lock);
    }

    pub fn released_indices(&self) -> Vec<u32> {
        self.released
            .iter()
            .enumerate()
            .filter(|(_, r)| **r)
            .map(|(i, _)| i as u32)
            .collect()
    }

    pub fn all_released(&self) -> bool {
        !self.released.is_empty() && self.released.iter().all(|r| *r)
    }

    pub fn order_payload(&self, maker: &str) -> Option<OrderPayload> {
        let hash_lock = self.hash_lock.as_ref()?;
        Some(OrderPayload {
            quote_id: self.quote.quote_id.clone(),
            preset: self.preset,
            src_chain_id: self.params.src_chain_id,
            dst_chain_id: self.params.dst_chain_id,
            maker: maker.to_string(),
            hash_lock: hash_lock.commitment(),
            secret_hashes: self.secret_hashes.clone(),
            src_token_address: self.params.src_token_address.clone(),
            dst_token_address: self.params.dst_token_address.clone(),
            amount: self.params.amount.clone(),
        })
    }

    /// Verify the record is internally consistent. Returns a description of
    /// the first violation.
    pub fn check_invariants(&self) -> Result<(), String> {
        if self.secrets.is_empty() {
            let allowed = matches!(
                self.state,
                SwapState::Quoted | SwapState::Expired | SwapState::Failed
            );
            if !allowed {
                return Err(format!("state {} without secrets", self.state));
            }
            if !self.secret_hashes.is_empty() || self.hash_lock.is_some() {
                return Err("hash lock present without secrets".to_string());
            }
            return Ok(());
        }

        let count = self.secrets_count as usize;
        if self.secrets.len() != count
            || self.secret_hashes.len() != count
            || self.released.len() != count
        {
            return Err(format!(
                "expected {} secrets, hashes and release flags, found {}/{}/{}",
                count,
                self.secrets.len(),
                self.secret_hashes.len(),
                self.released.len()
            ));
        }

        for (i, (secret, hash)) in self.secrets.iter().zip(&self.secret_hashes).enumerate() {
            if secret.hash() != *hash {
                return Err(format!("secret hash {} does not match its secret", i));
            }
        }

        let rebuilt = HashLockBuilder::build(&self.secrets).map_err(|e| e.to_string())?;
        if self.hash_lock.as_ref() != Some(&rebuilt) {
            return Err("stored hash lock does not match secrets".to_string());
        }

        if self.state.is_submitted() && self.order_hash.is_none() {
            return Err(format!("state {} without order hash", self.state));
        }

        Ok(())
    }

    /// Caller-facing summary, without secret material
    pub fn view(&self) -> SwapView {
        SwapView {
            swap_id: self.swap_id,
            order_hash: self.order_hash.clone(),
            state: self.state,
            preset: self.preset,
            quote_id: self.quote.quote_id.clone(),
            src_chain_id: self.params.src_chain_id,
            dst_chain_id: self.params.dst_chain_id,
            secrets_count: self.secrets_count,
            hash_lock: self.hash_lock.as_ref().map(HashLock::commitment),
            secret_hashes: self.secret_hashes.clone(),
            released: self.released_indices(),
            cancelled: self.cancelled,
            last_error: self.last_error.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            expires_at: self.expires_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapView {
    pub swap_id: Uuid,
    pub order_hash: Option<String>,
    pub state: SwapState,
    pub preset: Preset,
    pub quote_id: String,
    pub src_chain_id: u64,
    pub dst_chain_id: u64,
    pub secrets_count: u32,
    pub hash_lock: Option<Hash32>,
    pub secret_hashes: Vec<Hash32>,
    pub released: Vec<u32>,
    pub cancelled: bool,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn test_quoted_swap_is_consistent() {
        let swap = quoted_swap(1);
        assert_eq!(swap.state, SwapState::Quoted);
        assert_eq!(swap.key(), swap.swap_id.to_string());
        assert!(swap.check_invariants().is_ok());
    }

    #[test]
    fn test_built_swap_invariants() {
        let swap = built_swap(3);
        assert!(swap.check_invariants().is_ok());
        assert_eq!(swap.secret_hashes.len(), 3);
        assert_eq!(swap.released, vec![false; 3]);
        assert!(!swap.all_released());
    }

    #[test]
    fn test_tampered_hash_detected() {
        let mut swap = built_swap(2);
        swap.secret_hashes.swap(0, 1);
        assert!(swap.check_invariants().is_err());

        let mut swap = built_swap(2);
        swap.secrets.pop();
        assert!(swap.check_invariants().is_err());
    }

    #[test]
    fn test_submitted_requires_order_hash() {
        let mut swap = built_swap(1);
        swap.transition(SwapState::Submitted, Utc::now()).unwrap();
        assert!(swap.check_invariants().is_err());
        swap.order_hash = Some("0xorder".to_string());
        assert!(swap.check_invariants().is_ok());
        assert_eq!(swap.key(), "0xorder");
    }

    #[test]
    fn test_view_hides_secrets() {
        let swap = built_swap(2);
        let json = serde_json::to_string(&swap.view()).unwrap();
        for secret in &swap.secrets {
            assert!(!json.contains(&secret.expose_hex()));
        }
        assert!(json.contains(&swap.secret_hashes[0].to_hex()));
    }

    #[test]
    fn test_payload_uses_commitment() {
        let swap = built_swap(3);
        let payload = swap.order_payload("0xmaker").unwrap();
        assert_eq!(
            payload.hash_lock,
            swap.hash_lock.as_ref().unwrap().commitment()
        );
        assert_eq!(payload.secret_hashes, swap.secret_hashes);
        assert_eq!(payload.src_chain_id, 1);
        assert!(quoted_swap(1).order_payload("0xmaker").is_none());
    }
}
