//! Slot registry and session state.
//!
//! Per the combined-state design: a single mutex protects slot occupancy,
//! per-slot ready/name state, and the process-wide travel-mode flag. This is
//! deliberately one lock rather than several finer-grained ones — every
//! mutation here is cheap (map insert/remove, bool flip, short string copy)
//! and broadcasting the resulting snapshot always happens after the lock is
//! released, so there is no reason to pay for finer granularity.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{HubError, HubResult};
use crate::protocol::Snapshot;
use crate::protocol_constants::MAX_SLOTS;
use crate::utils::normalize_display_name;

#[derive(Debug, Clone, Default)]
struct SlotState {
    ready: bool,
    name: String,
}

struct Inner {
    slots: BTreeMap<u8, SlotState>,
    travel_mode: bool,
}

impl Inner {
    fn new() -> Self {
        Self {
            slots: BTreeMap::new(),
            travel_mode: false,
        }
    }
}

/// Owns the fixed pool of 8 identity slots and their ready/name/travel state.
pub struct SessionRegistry {
    inner: Mutex<Inner>,
}

impl SessionRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(Inner::new()),
        })
    }

    /// Assigns the lowest-numbered free slot. Fails once all 8 are occupied.
    pub fn acquire(&self) -> HubResult<u8> {
        let mut inner = self.inner.lock();
        for id in 1..=MAX_SLOTS {
            if !inner.slots.contains_key(&id) {
                inner.slots.insert(id, SlotState::default());
                return Ok(id);
            }
        }
        Err(HubError::SlotsExhausted(MAX_SLOTS))
    }

    /// Releases a slot. Idempotent: releasing an already-free slot is a no-op.
    pub fn release(&self, id: u8) {
        self.inner.lock().slots.remove(&id);
    }

    /// Returns the currently occupied slot ids, in ascending order.
    #[must_use]
    pub fn occupied(&self) -> Vec<u8> {
        self.inner.lock().slots.keys().copied().collect()
    }

    /// Sets the ready flag for an occupied slot. No-op if the slot is free.
    pub fn set_ready(&self, id: u8, value: bool) {
        if let Some(slot) = self.inner.lock().slots.get_mut(&id) {
            slot.ready = value;
        }
    }

    /// Sets the display name for an occupied slot, trimmed and truncated to
    /// 32 code points. No-op if the slot is free.
    pub fn set_name(&self, id: u8, name: &str) {
        let normalized = normalize_display_name(name);
        if let Some(slot) = self.inner.lock().slots.get_mut(&id) {
            slot.name = normalized;
        }
    }

    /// Returns the display name for a slot, or `""` if free.
    #[must_use]
    pub fn name(&self, id: u8) -> String {
        self.inner
            .lock()
            .slots
            .get(&id)
            .map(|s| s.name.clone())
            .unwrap_or_default()
    }

    /// Clears every occupied slot's ready flag.
    pub fn reset_all_ready(&self) {
        let mut inner = self.inner.lock();
        for slot in inner.slots.values_mut() {
            slot.ready = false;
        }
    }

    /// True iff at least one slot is occupied and every occupied slot is ready.
    #[must_use]
    pub fn all_ready(&self) -> bool {
        let inner = self.inner.lock();
        !inner.slots.is_empty() && inner.slots.values().all(|s| s.ready)
    }

    /// Produces the canonical snapshot: ready flags and names for slots 1..=8,
    /// with `false`/`""` defaults for unoccupied slots.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        let inner = self.inner.lock();
        let mut agents = BTreeMap::new();
        let mut names = BTreeMap::new();
        for id in 1..=MAX_SLOTS {
            let slot = inner.slots.get(&id);
            agents.insert(id.to_string(), slot.map(|s| s.ready).unwrap_or(false));
            names.insert(
                id.to_string(),
                slot.map(|s| s.name.clone()).unwrap_or_default(),
            );
        }
        Snapshot { agents, names }
    }

    /// Sets travel mode and resets all ready flags, for `travel_request`.
    pub fn start_travel(&self) {
        let mut inner = self.inner.lock();
        inner.travel_mode = true;
        for slot in inner.slots.values_mut() {
            slot.ready = false;
        }
    }

    /// Clears travel mode and resets all ready flags, for `execute_travel`
    /// and `reset_raid`.
    pub fn end_travel(&self) {
        let mut inner = self.inner.lock();
        inner.travel_mode = false;
        for slot in inner.slots.values_mut() {
            slot.ready = false;
        }
    }

    #[must_use]
    pub fn is_travel_mode(&self) -> bool {
        self.inner.lock().travel_mode
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_returns_lowest_free_id() {
        let registry = SessionRegistry::new();
        assert_eq!(registry.acquire().unwrap(), 1);
        assert_eq!(registry.acquire().unwrap(), 2);
        registry.release(1);
        assert_eq!(registry.acquire().unwrap(), 1);
    }

    #[test]
    fn acquire_fails_when_full() {
        let registry = SessionRegistry::new();
        for _ in 0..8 {
            registry.acquire().unwrap();
        }
        assert!(matches!(
            registry.acquire(),
            Err(HubError::SlotsExhausted(8))
        ));
    }

    #[test]
    fn release_is_idempotent() {
        let registry = SessionRegistry::new();
        registry.release(1);
        registry.release(1);
        assert_eq!(registry.occupied(), Vec::<u8>::new());
    }

    #[test]
    fn snapshot_covers_full_range_with_defaults() {
        let registry = SessionRegistry::new();
        let id = registry.acquire().unwrap();
        registry.set_ready(id, true);
        registry.set_name(id, "  Foo  ");
        let snapshot = registry.snapshot();
        assert_eq!(snapshot.agents.len(), 8);
        assert_eq!(snapshot.names.len(), 8);
        assert_eq!(snapshot.agents["1"], true);
        assert_eq!(snapshot.names["1"], "Foo");
        assert_eq!(snapshot.agents["2"], false);
        assert_eq!(snapshot.names["2"], "");
    }

    #[test]
    fn all_ready_false_when_no_slots_occupied() {
        let registry = SessionRegistry::new();
        assert!(!registry.all_ready());
    }

    #[test]
    fn all_ready_true_when_every_occupied_slot_ready() {
        let registry = SessionRegistry::new();
        let a = registry.acquire().unwrap();
        let b = registry.acquire().unwrap();
        registry.set_ready(a, true);
        assert!(!registry.all_ready());
        registry.set_ready(b, true);
        assert!(registry.all_ready());
    }

    #[test]
    fn start_travel_sets_mode_and_clears_ready() {
        let registry = SessionRegistry::new();
        let a = registry.acquire().unwrap();
        registry.set_ready(a, true);
        registry.start_travel();
        assert!(registry.is_travel_mode());
        assert!(!registry.all_ready());
    }

    #[test]
    fn end_travel_is_idempotent() {
        let registry = SessionRegistry::new();
        registry.start_travel();
        registry.end_travel();
        let first = registry.is_travel_mode();
        registry.end_travel();
        let second = registry.is_travel_mode();
        assert_eq!(first, second);
        assert!(!second);
    }

    #[test]
    fn name_returns_empty_string_for_free_slot() {
        let registry = SessionRegistry::new();
        assert_eq!(registry.name(3), "");
    }

    #[test]
    fn set_name_on_free_slot_is_noop() {
        let registry = SessionRegistry::new();
        registry.set_name(1, "ghost");
        assert_eq!(registry.snapshot().names["1"], "");
    }
}
