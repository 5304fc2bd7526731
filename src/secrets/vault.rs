//! In-process custody of swap secrets
//!
//! A secret leaves the vault only for a fill index the escrow monitor has
//! reported `ready_for_secret`. Disclosure is one-way: once revealed the
//! index stays disclosed and later reveals return the same value.

use super::types::Secret;
use crate::error::{CoordinatorError, CoordinatorResult};
use crate::swap::FillStatus;

use dashmap::DashMap;
use std::collections::BTreeSet;
use tracing::{debug, info};
use uuid::Uuid;

struct Custody {
    secrets: Vec<Secret>,
    authorized: BTreeSet<u32>,
    disclosed: Vec<bool>,
}

/// Secret custody for all swaps handled by this coordinator
pub struct SecretVault {
    custody: DashMap<Uuid, Custody>,
}

impl SecretVault {
    pub fn new() -> Self {
        Self {
            custody: DashMap::new(),
        }
    }

    /// Produce `count` independent random secrets
    pub fn generate(&self, count: usize) -> CoordinatorResult<Vec<Secret>> {
        if count == 0 {
            return Err(CoordinatorError::InvalidSecretCount { count });
        }
        Ok((0..count).map(|_| Secret::random()).collect())
    }

    /// Generate secrets for a swap and keep custody of them.
    ///
    /// Re-issuing for a swap already in custody returns the existing secrets
    /// so a retried order build yields the same hash lock.
    pub fn issue(&self, swap_id: Uuid, count: usize) -> CoordinatorResult<Vec<Secret>> {
        if let Some(existing) = self.custody.get(&swap_id) {
            if existing.secrets.len() == count {
                return Ok(existing.secrets.clone());
            }
            return Err(CoordinatorError::LedgerInconsistency {
                swap_id: swap_id.to_string(),
                message: format!(
                    "vault holds {} secrets, order needs {}",
                    existing.secrets.len(),
                    count
                ),
            });
        }

        let secrets = self.generate(count)?;
        self.custody.insert(
            swap_id,
            Custody {
                secrets: secrets.clone(),
                authorized: BTreeSet::new(),
                disclosed: vec![false; count],
            },
        );
        debug!(swap_id = %swap_id, count, "Issued swap secrets");
        Ok(secrets)
    }

    /// Take custody again after a restart. Released indices count as
    /// disclosed.
    pub fn restore(&self, swap_id: Uuid, secrets: Vec<Secret>, released: &[bool]) {
        let disclosed: Vec<bool> = (0..secrets.len())
            .map(|i| released.get(i).copied().unwrap_or(false))
            .collect();
        let authorized = disclosed
            .iter()
            .enumerate()
            .filter(|(_, d)| **d)
            .map(|(i, _)| i as u32)
            .collect();

        self.custody.insert(
            swap_id,
            Custody {
                secrets,
                authorized,
                disclosed,
            },
        );
    }

    /// Record fills observed ready by the escrow monitor
    pub fn authorize(&self, swap_id: Uuid, fills: &[FillStatus]) {
        if let Some(mut custody) = self.custody.get_mut(&swap_id) {
            let count = custody.secrets.len() as u32;
            for fill in fills.iter().filter(|f| f.ready_for_secret) {
                if fill.fill_index < count {
                    custody.authorized.insert(fill.fill_index);
                }
            }
        }
    }

    /// Hand out the secret for one fill
    pub fn reveal(&self, swap_id: Uuid, index: u32) -> CoordinatorResult<Secret> {
        let mut custody = self
            .custody
            .get_mut(&swap_id)
            .ok_or_else(|| CoordinatorError::NotFound(swap_id.to_string()))?;

        let slot = index as usize;
        if slot >= custody.secrets.len() {
            return Err(CoordinatorError::PrematureRelease {
                swap_id: swap_id.to_string(),
                index,
            });
        }

        if custody.disclosed[slot] {
            debug!(swap_id = %swap_id, index, "Secret already disclosed");
            return Ok(custody.secrets[slot].clone());
        }

        if !custody.authorized.contains(&index) {
            return Err(CoordinatorError::PrematureRelease {
                swap_id: swap_id.to_string(),
                index,
            });
        }

        custody.disclosed[slot] = true;
        info!(target: "audit", swap_id = %swap_id, index, "Secret disclosed");
        Ok(custody.secrets[slot].clone())
    }

    pub fn is_disclosed(&self, swap_id: Uuid, index: u32) -> bool {
        self.custody
            .get(&swap_id)
            .and_then(|c| c.disclosed.get(index as usize).copied())
            .unwrap_or(false)
    }

    pub fn disclosed_count(&self, swap_id: Uuid) -> usize {
        self.custody
            .get(&swap_id)
            .map(|c| c.disclosed.iter().filter(|d| **d).count())
            .unwrap_or(0)
    }

    /// Drop custody once a swap is terminal; the ledger keeps the copy
    pub fn forget(&self, swap_id: Uuid) {
        self.custody.remove(&swap_id);
    }
}

impl Default for SecretVault {
    fn default() -> Self {
        Self::new()
    }
}
