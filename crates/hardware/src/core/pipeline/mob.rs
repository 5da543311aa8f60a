//! Memory Order Buffer (MOB) for load/store ordering.
//!
//! Stores do not write `MEMORY` until their ROB entry commits; the MOB holds
//! pending stores until that happens. Loads may forward from a same-address
//! store still sitting in the MOB instead of waiting for it to commit. It
//! provides:
//! 1. **Allocation:** reserve a slot when a memory instruction enters the backend.
//! 2. **Resolution:** fill in the effective address (and, for stores, data)
//!    once the LSU computes it.
//! 3. **Disambiguation:** tell a load whether an older store's address is
//!    still unknown, which would make forwarding unsafe to decide.
//! 4. **Forwarding:** serve a load from the youngest older resolved store to
//!    the same address.
//! 5. **Commit:** perform the deferred write when a store retires.

use crate::core::pipeline::rob::RobTag;

/// Whether an MOB entry is a load or a store.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MobKind {
    /// A read from memory.
    Load,
    /// A deferred write to memory.
    Store,
}

/// A single entry in the Memory Order Buffer.
#[derive(Clone, Debug)]
pub struct MobEntry {
    /// ROB tag of the owning instruction; also its age for ordering.
    pub tag: RobTag,
    /// Load or store.
    pub kind: MobKind,
    /// Effective address, once resolved by the LSU.
    pub addr: Option<usize>,
    /// Store data (stores) or forwarded/loaded result (loads), once known.
    pub data: Option<i64>,
    /// Whether this slot is occupied.
    pub valid: bool,
}

impl Default for MobEntry {
    fn default() -> Self {
        Self {
            tag: RobTag(0),
            kind: MobKind::Load,
            addr: None,
            data: None,
            valid: false,
        }
    }
}

/// Memory Order Buffer: a fixed-capacity, age-ordered queue of in-flight
/// loads and stores.
pub struct Mob {
    entries: Vec<MobEntry>,
    head: usize,
    tail: usize,
    count: usize,
}

impl Mob {
    /// Creates an empty MOB with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let mut entries = Vec::with_capacity(capacity);
        entries.resize_with(capacity, MobEntry::default);
        Self {
            entries,
            head: 0,
            tail: 0,
            count: 0,
        }
    }

    /// Total capacity.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    /// Number of occupied entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.count
    }

    /// True if the MOB is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// True if the MOB is full.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.count == self.entries.len()
    }

    /// Allocates an unresolved entry for a load or store. Returns `false` if
    /// the MOB is full.
    pub fn allocate(&mut self, tag: RobTag, kind: MobKind) -> bool {
        if self.is_full() {
            return false;
        }
        self.entries[self.tail] = MobEntry {
            tag,
            kind,
            addr: None,
            data: None,
            valid: true,
        };
        self.tail = (self.tail + 1) % self.entries.len();
        self.count += 1;
        true
    }

    /// Resolves a store's effective address and data.
    pub fn resolve_store(&mut self, tag: RobTag, addr: usize, data: i64) {
        if let Some(entry) = self.find_mut(tag) {
            entry.addr = Some(addr);
            entry.data = Some(data);
        }
    }

    /// Resolves a load's effective address. Its result is filled in
    /// separately by [`Mob::forward`] or a direct memory read.
    pub fn resolve_load_address(&mut self, tag: RobTag, addr: usize) {
        if let Some(entry) = self.find_mut(tag) {
            entry.addr = Some(addr);
        }
    }

    /// True if any store older than `tag` still has an unresolved address.
    /// While this holds, a load must not dispatch: it cannot yet tell
    /// whether that store will turn out to alias its own address.
    pub fn older_store_unresolved(&self, tag: RobTag) -> bool {
        self.iter_valid().any(|e| {
            e.tag < tag && e.kind == MobKind::Store && e.addr.is_none()
        })
    }

    /// Store-to-load forwarding: the value of the youngest store older than
    /// `tag` at the same resolved address, if any.
    pub fn forward(&self, tag: RobTag, addr: usize) -> Option<i64> {
        self.iter_valid()
            .filter(|e| e.tag < tag && e.kind == MobKind::Store && e.addr == Some(addr))
            .max_by_key(|e| e.tag)
            .and_then(|e| e.data)
    }

    /// Records a load's result once it is known (forwarded or read from memory).
    pub fn complete_load(&mut self, tag: RobTag, value: i64) {
        if let Some(entry) = self.find_mut(tag) {
            entry.data = Some(value);
        }
    }

    /// Removes a load's entry once its result has been consumed; loads carry
    /// no commit-time obligation, so nothing downstream depends on keeping
    /// them in the buffer.
    pub fn retire_load(&mut self, tag: RobTag) {
        self.remove(tag);
    }

    /// Commits a store: removes its entry and returns `(address, data)` for
    /// the caller to write into architectural memory.
    pub fn commit_store(&mut self, tag: RobTag) -> Option<(usize, i64)> {
        let entry = self.find(tag)?;
        let result = match (entry.addr, entry.data) {
            (Some(addr), Some(data)) => (addr, data),
            _ => return None,
        };
        self.remove(tag);
        Some(result)
    }

    /// Discards every entry. Used on a taken-branch flush alongside the ROB:
    /// every MOB entry belongs to a still in-flight instruction, and a
    /// commit-time flush always clears everything younger than the
    /// committing (oldest) entry, which by definition is all of them.
    pub fn flush_all(&mut self) {
        for entry in &mut self.entries {
            entry.valid = false;
        }
        self.head = 0;
        self.tail = 0;
        self.count = 0;
    }

    fn iter_valid(&self) -> impl Iterator<Item = &MobEntry> {
        self.entries.iter().filter(|e| e.valid)
    }

    fn find(&self, tag: RobTag) -> Option<&MobEntry> {
        self.iter_valid().find(|e| e.tag == tag)
    }

    fn find_mut(&mut self, tag: RobTag) -> Option<&mut MobEntry> {
        self.entries.iter_mut().find(|e| e.valid && e.tag == tag)
    }

    fn remove(&mut self, tag: RobTag) {
        let mut idx = self.head;
        for _ in 0..self.count {
            if self.entries[idx].valid && self.entries[idx].tag == tag {
                self.entries[idx].valid = false;
                self.count -= 1;
                break;
            }
            idx = (idx + 1) % self.entries.len();
        }
        while self.count > 0 && !self.entries[self.head].valid {
            self.head = (self.head + 1) % self.entries.len();
        }
        if self.count == 0 {
            self.head = self.tail;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_then_load_forwards_before_commit() {
        let mut mob = Mob::new(4);
        let store = RobTag(1);
        let load = RobTag(2);
        mob.allocate(store, MobKind::Store);
        mob.allocate(load, MobKind::Load);
        mob.resolve_store(store, 20, 10);

        assert!(!mob.older_store_unresolved(load));
        assert_eq!(mob.forward(load, 20), Some(10));
        assert_eq!(mob.forward(load, 21), None);
    }

    #[test]
    fn unresolved_older_store_blocks_disambiguation() {
        let mut mob = Mob::new(4);
        let store = RobTag(1);
        let load = RobTag(2);
        mob.allocate(store, MobKind::Store);
        mob.allocate(load, MobKind::Load);

        assert!(mob.older_store_unresolved(load));
        mob.resolve_store(store, 4, 7);
        assert!(!mob.older_store_unresolved(load));
    }

    #[test]
    fn forwarding_picks_the_youngest_matching_store() {
        let mut mob = Mob::new(4);
        let s1 = RobTag(1);
        let s2 = RobTag(2);
        let load = RobTag(3);
        mob.allocate(s1, MobKind::Store);
        mob.allocate(s2, MobKind::Store);
        mob.allocate(load, MobKind::Load);
        mob.resolve_store(s1, 8, 100);
        mob.resolve_store(s2, 8, 200);

        assert_eq!(mob.forward(load, 8), Some(200));
    }

    #[test]
    fn commit_store_removes_entry_and_reports_write() {
        let mut mob = Mob::new(4);
        let store = RobTag(1);
        mob.allocate(store, MobKind::Store);
        mob.resolve_store(store, 16, 42);

        let (addr, data) = mob.commit_store(store).unwrap();
        assert_eq!(addr, 16);
        assert_eq!(data, 42);
        assert!(mob.is_empty());
    }

    #[test]
    fn full_mob_refuses_allocation() {
        let mut mob = Mob::new(2);
        assert!(mob.allocate(RobTag(1), MobKind::Load));
        assert!(mob.allocate(RobTag(2), MobKind::Store));
        assert!(mob.is_full());
        assert!(!mob.allocate(RobTag(3), MobKind::Load));
    }

    #[test]
    fn load_retires_independently_of_surrounding_stores() {
        let mut mob = Mob::new(4);
        let store = RobTag(1);
        let load = RobTag(2);
        mob.allocate(store, MobKind::Store);
        mob.allocate(load, MobKind::Load);
        mob.retire_load(load);
        assert_eq!(mob.len(), 1);
        mob.resolve_store(store, 0, 0);
        assert_eq!(mob.commit_store(store), Some((0, 0)));
        assert!(mob.is_empty());
    }

    #[test]
    fn flush_all_drops_everything_in_flight() {
        let mut mob = Mob::new(4);
        mob.allocate(RobTag(1), MobKind::Store);
        mob.allocate(RobTag(2), MobKind::Load);
        mob.flush_all();
        assert!(mob.is_empty());
        assert_eq!(mob.capacity(), 4);
    }

    #[test]
    fn circular_wraparound_survives_many_fill_drain_cycles() {
        let mut mob = Mob::new(2);
        for i in 1..=10i64 {
            let tag = RobTag(i as u64);
            mob.allocate(tag, MobKind::Store);
            mob.resolve_store(tag, 0, i);
            assert_eq!(mob.commit_store(tag), Some((0, i)));
        }
        assert!(mob.is_empty());
    }
}
