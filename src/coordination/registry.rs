//! In-memory registry of swaps handled by this coordinator

use crate::swap::Swap;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Live state for one swap, guarded by its own mutex
#[derive(Debug)]
pub struct SwapSlot {
    pub swap: Swap,
    /// Indices claimed by a release currently talking to the order book
    pub in_flight: BTreeSet<u32>,
    /// Set when the swap must not be touched until an operator intervenes
    pub halted: Option<String>,
    /// Consecutive polls that ended in `MonitorUnavailable`
    pub poll_failures: u32,
}

impl SwapSlot {
    pub fn new(swap: Swap) -> Self {
        Self {
            swap,
            in_flight: BTreeSet::new(),
            halted: None,
            poll_failures: 0,
        }
    }
}

pub type SharedSlot = Arc<Mutex<SwapSlot>>;

/// Swap slots keyed by swap id, with a secondary order hash index
pub struct SwapRegistry {
    slots: DashMap<Uuid, SharedSlot>,
    order_index: DashMap<String, Uuid>,
}

impl SwapRegistry {
    pub fn new() -> Self {
        Self {
            slots: DashMap::new(),
            order_index: DashMap::new(),
        }
    }

    /// Register a slot unless one already exists for the swap id.
    /// Returns the registered slot and whether it was newly inserted.
    pub fn insert(&self, slot: SwapSlot) -> (SharedSlot, bool) {
        let swap_id = slot.swap.swap_id;
        let order_hash = slot.swap.order_hash.clone();

        let (shared, inserted) = match self.slots.entry(swap_id) {
            Entry::Occupied(existing) => (existing.get().clone(), false),
            Entry::Vacant(vacant) => {
                let shared = Arc::new(Mutex::new(slot));
                vacant.insert(shared.clone());
                (shared, true)
            }
        };

        if inserted {
            if let Some(hash) = order_hash {
                self.order_index.insert(hash, swap_id);
            }
        }

        (shared, inserted)
    }

    pub fn index_order(&self, order_hash: &str, swap_id: Uuid) {
        self.order_index.insert(order_hash.to_string(), swap_id);
    }

    /// Look up by swap id or order hash
    pub fn get(&self, key: &str) -> Option<SharedSlot> {
        let swap_id = match Uuid::parse_str(key) {
            Ok(id) if self.slots.contains_key(&id) => id,
            _ => *self.order_index.get(key)?,
        };
        self.slots.get(&swap_id).map(|slot| slot.clone())
    }

    pub fn remove(&self, swap_id: &Uuid) {
        if let Some((_, slot)) = self.slots.remove(swap_id) {
            if let Ok(slot) = slot.try_lock() {
                if let Some(hash) = &slot.swap.order_hash {
                    self.order_index.remove(hash);
                }
            }
        }
    }

    /// Snapshot of all registered slots
    pub fn slots(&self) -> Vec<(Uuid, SharedSlot)> {
        self.slots
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl Default for SwapRegistry {
    fn default() -> Self {
        Self::new()
    }
}
