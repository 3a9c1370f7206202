//! Wrapper slot pool - the flyweight allocator.
//!
//! Manages the lifecycle of wrapper slots:
//! - free slot pool for O(1) reuse, grown lazily and never shrunk
//! - at most one bound slot per record at any instant
//! - held records pin their slot, excluding it from fetch/return churn
//!
//! Slots carry no record state of their own beyond the wrapper-local
//! override map; everything else reads and writes through the bound record.

use log::debug;
use rustc_hash::FxHashMap;

use crate::store::RecordArena;
use crate::types::{RecordId, SlotId};

#[derive(Debug, Default)]
pub(crate) struct WrapperSlot {
    bound: Option<RecordId>,
    /// Values the caller explicitly stores on the wrapper instead of the
    /// record. Cleared on every rebind.
    locals: FxHashMap<String, String>,
}

#[derive(Debug, Default)]
pub(crate) struct SlotPool {
    slots: Vec<WrapperSlot>,
    free: Vec<SlotId>,
}

impl SlotPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a wrapper slot to `record` and return it.
    ///
    /// A held record always yields its pinned slot; a record that already
    /// has a bound slot yields that same slot (the two handles alias one
    /// wrapper). Otherwise a slot is popped from the free list, allocating
    /// a new one when the list is empty.
    pub fn fetch(&mut self, arena: &mut RecordArena, record: RecordId) -> SlotId {
        if let Some(rec) = arena.get(record) {
            if let Some(slot) = rec.held.or(rec.bound) {
                return slot;
            }
        }

        let slot = match self.free.pop() {
            Some(slot) => slot,
            None => {
                let slot = SlotId(self.slots.len() as u32);
                self.slots.push(WrapperSlot::default());
                debug!("flyweight pool grown to {} slots", self.slots.len());
                slot
            }
        };

        let entry = &mut self.slots[slot.index()];
        entry.bound = Some(record);
        entry.locals.clear();
        if let Some(rec) = arena.get_mut(record) {
            rec.bound = Some(slot);
        }
        slot
    }

    /// Return a slot to the free list.
    ///
    /// No-op when the bound record holds the slot. Panics when the slot is
    /// already unbound: that is a double return, a contract violation rather
    /// than a recoverable error.
    pub fn put_back(&mut self, arena: &mut RecordArena, slot: SlotId) {
        let record = self.slots[slot.index()]
            .bound
            .expect("flyweight wrapper returned to the pool twice");

        if let Some(rec) = arena.get_mut(record) {
            if rec.held == Some(slot) {
                return;
            }
            rec.bound = None;
        }
        self.unbind(slot);
    }

    /// Unbind slots whose records were detached out from under them.
    pub fn unbind_detached(&mut self, slots: &[SlotId]) {
        for &slot in slots {
            if self.slots[slot.index()].bound.is_some() {
                self.unbind(slot);
            }
        }
    }

    fn unbind(&mut self, slot: SlotId) {
        let entry = &mut self.slots[slot.index()];
        entry.bound = None;
        entry.locals.clear();
        self.free.push(slot);
    }

    pub fn bound_of(&self, slot: SlotId) -> Option<RecordId> {
        self.slots.get(slot.index()).and_then(|s| s.bound)
    }

    pub fn local(&self, slot: SlotId, key: &str) -> Option<String> {
        self.slots[slot.index()].locals.get(key).cloned()
    }

    pub fn set_local(&mut self, slot: SlotId, key: String, value: String) {
        self.slots[slot.index()].locals.insert(key, value);
    }

    pub fn locals(&self, slot: SlotId) -> impl Iterator<Item = (&String, &String)> {
        self.slots[slot.index()].locals.iter()
    }

    /// Total slots ever allocated (live + free).
    pub fn size(&self) -> usize {
        self.slots.len()
    }

    /// Slots currently on the free list.
    pub fn free_len(&self) -> usize {
        self.free.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RawRecord;

    fn arena_with(n: usize) -> (RecordArena, Vec<RecordId>) {
        let mut arena = RecordArena::new();
        let sentinel = arena.sentinel();
        let raw = (0..n).map(|i| RawRecord::new(format!("r{i}"))).collect();
        let ids = arena.attach(sentinel, raw, false).unwrap();
        (arena, ids)
    }

    #[test]
    fn test_fetch_and_reuse() {
        let (mut arena, ids) = arena_with(2);
        let mut pool = SlotPool::new();

        let slot_a = pool.fetch(&mut arena, ids[0]);
        assert_eq!(pool.size(), 1);
        pool.put_back(&mut arena, slot_a);

        // The freed slot is reused for an unrelated record.
        let slot_b = pool.fetch(&mut arena, ids[1]);
        assert_eq!(slot_a, slot_b);
        assert_eq!(pool.size(), 1);
        assert_eq!(pool.bound_of(slot_b), Some(ids[1]));
    }

    #[test]
    fn test_rebind_clears_locals() {
        let (mut arena, ids) = arena_with(2);
        let mut pool = SlotPool::new();

        let slot = pool.fetch(&mut arena, ids[0]);
        pool.set_local(slot, "color".to_string(), "red".to_string());
        pool.put_back(&mut arena, slot);

        let slot = pool.fetch(&mut arena, ids[1]);
        assert_eq!(pool.local(slot, "color"), None);
    }

    #[test]
    fn test_bound_record_yields_same_slot() {
        let (mut arena, ids) = arena_with(1);
        let mut pool = SlotPool::new();

        let first = pool.fetch(&mut arena, ids[0]);
        let second = pool.fetch(&mut arena, ids[0]);
        assert_eq!(first, second);
        assert_eq!(pool.size(), 1);
    }

    #[test]
    fn test_held_record_survives_put_back() {
        let (mut arena, ids) = arena_with(1);
        let mut pool = SlotPool::new();

        let slot = pool.fetch(&mut arena, ids[0]);
        arena.get_mut(ids[0]).unwrap().held = Some(slot);

        pool.put_back(&mut arena, slot);
        assert_eq!(pool.bound_of(slot), Some(ids[0]));
        assert_eq!(pool.free_len(), 0);

        // Released records go back to normal churn.
        arena.get_mut(ids[0]).unwrap().held = None;
        pool.put_back(&mut arena, slot);
        assert_eq!(pool.bound_of(slot), None);
        assert_eq!(pool.free_len(), 1);
    }

    #[test]
    #[should_panic(expected = "returned to the pool twice")]
    fn test_double_return_panics() {
        let (mut arena, ids) = arena_with(1);
        let mut pool = SlotPool::new();

        let slot = pool.fetch(&mut arena, ids[0]);
        pool.put_back(&mut arena, slot);
        pool.put_back(&mut arena, slot);
    }
}
