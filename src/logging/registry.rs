// SPDX-License-Identifier: Apache-2.0 OR MIT
// Producer registry: calling context -> producer slot

use parking_lot::Mutex;
use std::collections::HashMap;
use std::hash::Hash;

use super::context::ContextKey;

/// A producer slot handed out by the registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProducerSlot {
    /// Index of the producer channel in the aggregator
    pub index: usize,
    /// Name prefixed to every message from this slot
    pub display_name: String,
    /// Several contexts write through this slot; pushes must hold the
    /// registry lock (see [`ProducerRegistry::with_shared_lock`])
    pub shared: bool,
}

/// Keys that may stand for more than one concurrent writer
pub trait SharedKey {
    fn is_shared(&self) -> bool;
}

impl SharedKey for ContextKey {
    fn is_shared(&self) -> bool {
        matches!(self, ContextKey::Anonymous)
    }
}

/// Registry mapping a context key to its producer slot
///
/// The map is only locked for the lookup-or-insert itself. Once a writer
/// holds its slot it pushes without the lock, except for shared slots, whose
/// pushes are serialized through the same lock.
pub struct ProducerRegistry<K> {
    slots: Mutex<HashMap<K, ProducerSlot>>,
}

impl<K: Eq + Hash + SharedKey> ProducerRegistry<K> {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Return the slot for `key`, creating it on first use
    ///
    /// `create` runs at most once per key, inside the critical section, so
    /// two first writers for the same key cannot create two slots. The first
    /// writer's `name` sticks.
    pub fn get_or_create<E>(
        &self,
        key: K,
        name: &str,
        create: impl FnOnce() -> Result<usize, E>,
    ) -> Result<ProducerSlot, E> {
        let mut slots = self.slots.lock();
        if let Some(slot) = slots.get(&key) {
            return Ok(slot.clone());
        }

        let slot = ProducerSlot {
            index: create()?,
            display_name: name.to_string(),
            shared: key.is_shared(),
        };
        slots.insert(key, slot.clone());
        Ok(slot)
    }

    /// Look up an existing slot without creating one
    pub fn get(&self, key: &K) -> Option<ProducerSlot> {
        self.slots.lock().get(key).cloned()
    }

    /// Run `push` while holding the registry lock
    ///
    /// Used for shared slots, whose channel has more than one writer.
    pub fn with_shared_lock<R>(&self, push: impl FnOnce() -> R) -> R {
        let _guard = self.slots.lock();
        push()
    }

    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of all slots, ordered by producer index
    pub fn slots(&self) -> Vec<ProducerSlot> {
        let mut slots: Vec<_> = self.slots.lock().values().cloned().collect();
        slots.sort_by_key(|slot| slot.index);
        slots
    }
}

impl<K: Eq + Hash + SharedKey> Default for ProducerRegistry<K> {
    fn default() -> Self {
        Self::new()
    }
}
