//! Reorder Buffer (ROB) for out-of-order commit.
//!
//! The ROB is a circular buffer that tracks in-flight instructions from
//! decode through commit. It provides:
//! 1. **Allocation:** assigns a unique tag to every instruction entering the backend.
//! 2. **Completion:** marks an entry ready once its execution unit produces a result.
//! 3. **In-order commit:** retires entries from the head, one per cycle.
//! 4. **Flush:** discards every entry younger than a misprediction.

use crate::common::RegId;
use crate::isa::Instruction;

/// Unique tag identifying an in-flight instruction. Never wraps: programs in
/// this simulator are short-lived, so a plain `u64` counter is simpler than
/// the wrapping scheme a long-running CPU simulator would need, and it keeps
/// every age comparison across the ROB, MOB, and reservation stations a
/// plain `<`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RobTag(pub u64);

/// Lifecycle state of a ROB entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum RobState {
    /// Entry allocated but its execution unit has not yet completed.
    #[default]
    Issued,
    /// Execution complete, result available, waiting to commit.
    Completed,
}

/// Outcome recorded for a branch/jump entry once its execution unit resolves it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BranchOutcome {
    /// Whether the branch redirects control flow.
    pub taken: bool,
    /// The instruction index to redirect fetch to, if taken.
    pub target: usize,
}

/// A single entry in the Reorder Buffer.
#[derive(Clone, Debug)]
pub struct RobEntry {
    /// Unique tag for this entry.
    pub tag: RobTag,
    /// Fetch-time program counter (0-based instruction index).
    pub pc: usize,
    /// The instruction this entry tracks.
    pub inst: Instruction,
    /// Destination register, if any.
    pub dest: Option<RegId>,
    /// Speculative result, valid once `state == Completed`.
    pub result: i64,
    /// Branch resolution, set only for branch/jump entries once completed.
    pub branch: Option<BranchOutcome>,
    /// Lifecycle state.
    pub state: RobState,
    /// Whether this slot is occupied.
    pub valid: bool,
}

impl Default for RobEntry {
    fn default() -> Self {
        Self {
            tag: RobTag(0),
            pc: 0,
            inst: Instruction::new(crate::isa::Opcode::Halt),
            dest: None,
            result: 0,
            branch: None,
            state: RobState::Issued,
            valid: false,
        }
    }
}

/// Reorder Buffer: circular buffer enabling in-order commit of out-of-order
/// results.
pub struct Rob {
    entries: Vec<RobEntry>,
    head: usize,
    tail: usize,
    count: usize,
    next_tag: u64,
}

impl Rob {
    /// Creates an empty ROB with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let mut entries = Vec::with_capacity(capacity);
        entries.resize_with(capacity, RobEntry::default);
        Self {
            entries,
            head: 0,
            tail: 0,
            count: 0,
            next_tag: 0,
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

    /// True when no entries are occupied.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// True when `tail + 1 == head` (mod capacity): no room to allocate.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.count == self.entries.len()
    }

    /// Allocates a new entry for `inst`, fetched from `pc`, writing `dest`.
    /// Returns `None` if the ROB is full.
    pub fn allocate(&mut self, pc: usize, inst: Instruction, dest: Option<RegId>) -> Option<RobTag> {
        if self.is_full() {
            return None;
        }
        let tag = RobTag(self.next_tag);
        self.next_tag += 1;

        self.entries[self.tail] = RobEntry {
            tag,
            pc,
            inst,
            dest,
            result: 0,
            branch: None,
            state: RobState::Issued,
            valid: true,
        };
        self.tail = (self.tail + 1) % self.entries.len();
        self.count += 1;
        Some(tag)
    }

    /// Marks an entry complete with its computed result.
    pub fn complete(&mut self, tag: RobTag, result: i64) {
        if let Some(entry) = self.find_entry_mut(tag) {
            entry.result = result;
            entry.state = RobState::Completed;
        }
    }

    /// Marks a branch/jump entry complete with its resolved outcome.
    pub fn complete_branch(&mut self, tag: RobTag, outcome: BranchOutcome) {
        if let Some(entry) = self.find_entry_mut(tag) {
            entry.branch = Some(outcome);
            entry.state = RobState::Completed;
        }
    }

    /// The oldest entry, if any is occupied.
    pub fn peek_head(&self) -> Option<&RobEntry> {
        if self.count == 0 {
            None
        } else {
            Some(&self.entries[self.head])
        }
    }

    /// Commits (retires) the head entry. Returns `None` if the ROB is empty
    /// or the head has not yet completed.
    pub fn commit_head(&mut self) -> Option<RobEntry> {
        if self.count == 0 {
            return None;
        }
        if self.entries[self.head].state == RobState::Issued {
            return None;
        }
        let committed = self.entries[self.head].clone();
        self.entries[self.head].valid = false;
        self.head = (self.head + 1) % self.entries.len();
        self.count -= 1;
        Some(committed)
    }

    /// Discards every entry currently held. Used on a taken-branch flush:
    /// because commit is strictly in order, the branch that triggers a
    /// flush is always at the ROB head, so every other occupied entry is
    /// necessarily younger and must go.
    pub fn flush_all(&mut self) {
        for entry in &mut self.entries {
            entry.valid = false;
        }
        self.head = 0;
        self.tail = 0;
        self.count = 0;
    }

    fn find_entry_mut(&mut self, tag: RobTag) -> Option<&mut RobEntry> {
        let mut idx = self.head;
        for _ in 0..self.count {
            if self.entries[idx].valid && self.entries[idx].tag == tag {
                return Some(&mut self.entries[idx]);
            }
            idx = (idx + 1) % self.entries.len();
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::Opcode;

    fn addi() -> Instruction {
        let mut i = Instruction::new(Opcode::Addi);
        i.dest = Some(1);
        i.src1 = Some(0);
        i.imm = Some(5);
        i
    }

    #[test]
    fn allocate_and_commit_in_order() {
        let mut rob = Rob::new(4);
        assert!(rob.is_empty());
        let tag = rob.allocate(0, addi(), Some(1)).unwrap();
        assert!(rob.commit_head().is_none(), "issued entries cannot commit");
        rob.complete(tag, 5);
        let entry = rob.commit_head().unwrap();
        assert_eq!(entry.result, 5);
        assert!(rob.is_empty());
    }

    #[test]
    fn full_rob_refuses_allocation() {
        let mut rob = Rob::new(2);
        rob.allocate(0, addi(), Some(1)).unwrap();
        rob.allocate(1, addi(), Some(2)).unwrap();
        assert!(rob.is_full());
        assert!(rob.allocate(2, addi(), Some(3)).is_none());
    }

    #[test]
    fn commit_waits_for_head_even_when_younger_entries_complete_first() {
        let mut rob = Rob::new(4);
        let t1 = rob.allocate(0, addi(), Some(1)).unwrap();
        let t2 = rob.allocate(1, addi(), Some(2)).unwrap();
        rob.complete(t2, 200);
        assert!(rob.commit_head().is_none());
        rob.complete(t1, 100);
        assert_eq!(rob.commit_head().unwrap().result, 100);
        assert_eq!(rob.commit_head().unwrap().result, 200);
    }

    #[test]
    fn flush_all_empties_the_buffer() {
        let mut rob = Rob::new(4);
        rob.allocate(0, addi(), Some(1));
        rob.allocate(1, addi(), Some(2));
        assert_eq!(rob.len(), 2);
        rob.flush_all();
        assert!(rob.is_empty());
        assert_eq!(rob.capacity(), 4);
    }

    #[test]
    fn circular_wraparound_survives_many_fill_drain_cycles() {
        let mut rob = Rob::new(2);
        for i in 0..10i64 {
            let tag = rob.allocate(i as usize, addi(), Some(1)).unwrap();
            rob.complete(tag, i);
            assert_eq!(rob.commit_head().unwrap().result, i);
        }
    }

    #[test]
    fn branch_outcome_is_visible_at_commit() {
        let mut rob = Rob::new(4);
        let mut jmp = Instruction::new(Opcode::Jmp);
        jmp.target = Some(10);
        let tag = rob.allocate(0, jmp, None).unwrap();
        rob.complete_branch(
            tag,
            BranchOutcome {
                taken: true,
                target: 10,
            },
        );
        let entry = rob.commit_head().unwrap();
        assert_eq!(entry.branch, Some(BranchOutcome { taken: true, target: 10 }));
    }
}
