// SPDX-License-Identifier: Apache-2.0
//! Persistent node state.
//!
//! State lives outside the program, keyed by [`StateKey`], so it survives
//! program swaps: a key present in both programs with a matching node kind
//! carries its slot forward, anything else reinitializes. Only the
//! evaluator mutates slots, and only during its frame tick; the UI reads
//! through [`StateStore::snapshot`].

use std::collections::BTreeMap;

use crate::ir::StateKey;
use crate::value::Value;

/// One node's persistent state.
#[derive(Debug, Clone, PartialEq)]
pub enum StateSlot {
    /// Held value (delay lines, sample-and-hold latches).
    Held(Value),
    /// Running integral.
    Accum(f64),
    /// Previous sample for edge/wrap detection.
    Prev(f64),
    /// Pulse-division counter.
    Counter(u32),
}

/// Store of persistent state slots.
#[derive(Debug, Clone, Default)]
pub struct StateStore {
    entries: BTreeMap<StateKey, StateSlot>,
}

impl StateStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads a slot.
    #[must_use]
    pub fn get(&self, key: &StateKey) -> Option<&StateSlot> {
        self.entries.get(key)
    }

    /// Writes a slot.
    pub fn set(&mut self, key: StateKey, slot: StateSlot) {
        self.entries.insert(key, slot);
    }

    /// Removes a slot.
    pub fn remove(&mut self, key: &StateKey) -> Option<StateSlot> {
        self.entries.remove(key)
    }

    /// Number of live slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no slots exist.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Read-only snapshot for UI inspection. Never exposes partially
    /// written state: the evaluator only calls this between frames.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<StateKey, StateSlot> {
        self.entries.clone()
    }

    /// Keys in ascending order.
    pub fn keys(&self) -> impl Iterator<Item = &StateKey> {
        self.entries.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ident::make_block_id;

    #[test]
    fn slots_round_trip_by_key() {
        let mut store = StateStore::new();
        let key = StateKey::new(make_block_id("i"), "integrate");
        store.set(key, StateSlot::Accum(2.5));
        assert_eq!(store.get(&key), Some(&StateSlot::Accum(2.5)));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn snapshot_is_detached() {
        let mut store = StateStore::new();
        let key = StateKey::new(make_block_id("d"), "delay");
        store.set(key, StateSlot::Held(Value::Number(1.0)));
        let snap = store.snapshot();
        store.set(key, StateSlot::Held(Value::Number(9.0)));
        assert_eq!(snap.get(&key), Some(&StateSlot::Held(Value::Number(1.0))));
    }
}
