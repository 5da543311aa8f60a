//! Reservation stations: per-execution-unit wait queues where instructions
//! sit until their operands arrive over the CDB.
//!
//! Each slot holds either a concrete value or a pending ROB tag for each of
//! its (up to two) register operands. A tag broadcast on the CDB replaces
//! every matching pending operand, across every slot, with the concrete
//! value in the same cycle.

use crate::core::pipeline::rob::RobTag;
use crate::isa::Instruction;

/// One register operand as tracked by a reservation station: either the
/// concrete value or the ROB tag that will eventually produce it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operand {
    /// The value is already known.
    Value(i64),
    /// Still waiting on this producer.
    Pending(RobTag),
}

impl Operand {
    /// The concrete value, if this operand has resolved.
    pub fn value(self) -> Option<i64> {
        match self {
            Self::Value(v) => Some(v),
            Self::Pending(_) => None,
        }
    }

    fn resolve_if_matches(&mut self, tag: RobTag, value: i64) {
        if *self == Self::Pending(tag) {
            *self = Self::Value(value);
        }
    }
}

/// An instruction waiting in a reservation station.
#[derive(Clone, Copy, Debug)]
pub struct RsEntry {
    /// The entry's ROB tag, used both for CDB tag matching and as the
    /// dispatch age (lower tag is older).
    pub tag: RobTag,
    /// The instruction itself (opcode, immediate, destination, ...).
    pub inst: Instruction,
    /// First register operand, if the instruction has one.
    pub op1: Option<Operand>,
    /// Second register operand, if the instruction has one.
    pub op2: Option<Operand>,
}

impl RsEntry {
    /// True once every present operand has resolved to a concrete value.
    pub fn is_ready(&self) -> bool {
        self.op1.is_none_or(|o| o.value().is_some()) && self.op2.is_none_or(|o| o.value().is_some())
    }

    fn on_broadcast(&mut self, tag: RobTag, value: i64) {
        if let Some(op) = &mut self.op1 {
            op.resolve_if_matches(tag, value);
        }
        if let Some(op) = &mut self.op2 {
            op.resolve_if_matches(tag, value);
        }
    }
}

/// A fixed-depth wait queue feeding one execution unit.
pub struct ReservationStation {
    slots: Vec<Option<RsEntry>>,
}

impl ReservationStation {
    /// Creates an empty station with the given number of slots.
    pub fn new(depth: usize) -> Self {
        Self {
            slots: vec![None; depth],
        }
    }

    /// True if every slot is occupied.
    pub fn is_full(&self) -> bool {
        self.slots.iter().all(Option::is_some)
    }

    /// Places `entry` into the first free slot. Returns `false` if the
    /// station is full.
    pub fn insert(&mut self, entry: RsEntry) -> bool {
        if let Some(slot) = self.slots.iter_mut().find(|s| s.is_none()) {
            *slot = Some(entry);
            true
        } else {
            false
        }
    }

    /// Applies a CDB broadcast to every occupied slot.
    pub fn broadcast(&mut self, tag: RobTag, value: i64) {
        for slot in self.slots.iter_mut().flatten() {
            slot.on_broadcast(tag, value);
        }
    }

    /// Selects the oldest ready entry (lowest ROB tag; ties broken by slot
    /// index) for which `gate` returns true, removes it from the station,
    /// and returns it. `gate` exists so the LSU station can withhold a load
    /// behind an older store with an unresolved address without blocking
    /// other ready entries from being considered first.
    pub fn select_dispatch(&mut self, gate: impl Fn(&RsEntry) -> bool) -> Option<RsEntry> {
        let idx = self
            .slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|e| (i, e)))
            .filter(|(_, e)| e.is_ready() && gate(e))
            .min_by_key(|(i, e)| (e.tag, *i))
            .map(|(i, _)| i)?;
        self.slots[idx].take()
    }

    /// Empties the station. Used on a branch-induced flush: every
    /// in-flight entry is necessarily younger than a committing branch.
    pub fn flush_all(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::Opcode;

    fn entry(tag: u64, op1: Operand, op2: Operand) -> RsEntry {
        RsEntry {
            tag: RobTag(tag),
            inst: Instruction::new(Opcode::Add),
            op1: Some(op1),
            op2: Some(op2),
        }
    }

    #[test]
    fn broadcast_resolves_matching_pending_operands_only() {
        let mut rs = ReservationStation::new(2);
        rs.insert(entry(1, Operand::Pending(RobTag(9)), Operand::Value(3)));
        rs.broadcast(RobTag(9), 42);
        let dispatched = rs.select_dispatch(|_| true).unwrap();
        assert_eq!(dispatched.op1, Some(Operand::Value(42)));
    }

    #[test]
    fn dispatch_picks_oldest_ready_first() {
        let mut rs = ReservationStation::new(4);
        rs.insert(entry(5, Operand::Value(1), Operand::Value(1)));
        rs.insert(entry(2, Operand::Value(1), Operand::Value(1)));
        rs.insert(entry(8, Operand::Value(1), Operand::Value(1)));
        let first = rs.select_dispatch(|_| true).unwrap();
        assert_eq!(first.tag, RobTag(2));
    }

    #[test]
    fn not_ready_entries_never_dispatch() {
        let mut rs = ReservationStation::new(2);
        rs.insert(entry(1, Operand::Pending(RobTag(9)), Operand::Value(3)));
        assert!(rs.select_dispatch(|_| true).is_none());
    }

    #[test]
    fn gate_withholds_a_ready_entry_without_blocking_station() {
        let mut rs = ReservationStation::new(2);
        rs.insert(entry(1, Operand::Value(1), Operand::Value(1)));
        assert!(rs.select_dispatch(|e| e.tag != RobTag(1)).is_none());
        assert!(rs.select_dispatch(|_| true).is_some());
    }

    #[test]
    fn full_station_refuses_insertion() {
        let mut rs = ReservationStation::new(1);
        assert!(rs.insert(entry(1, Operand::Value(0), Operand::Value(0))));
        assert!(!rs.insert(entry(2, Operand::Value(0), Operand::Value(0))));
    }

    #[test]
    fn flush_all_empties_every_slot() {
        let mut rs = ReservationStation::new(2);
        rs.insert(entry(1, Operand::Value(0), Operand::Value(0)));
        rs.flush_all();
        assert!(!rs.is_full());
        rs.insert(entry(2, Operand::Value(0), Operand::Value(0)));
        rs.insert(entry(3, Operand::Value(0), Operand::Value(0)));
        assert!(rs.is_full());
    }
}
