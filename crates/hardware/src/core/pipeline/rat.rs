//! Register Alias Table: maps each architectural register to the ROB tag of
//! its latest in-flight producer, or `None` if the architectural value is
//! current. A `Some` entry doubles as the scoreboard busy bit — there is no
//! separate busy-bit array, since "has a pending producer" and "is busy" are
//! the same fact here.
//!
//! Unlike a register file modeling a real ISA, `r0` is an ordinary writable
//! register with no hardwired-zero special case, so every slot, including
//! index 0, is treated uniformly.

use crate::common::{RegId, NUM_REGS};
use crate::core::pipeline::rob::RobTag;

/// Rename map from architectural register to pending producer tag.
pub struct Rat {
    producer: [Option<RobTag>; NUM_REGS],
}

impl Default for Rat {
    fn default() -> Self {
        Self::new()
    }
}

impl Rat {
    /// Creates a RAT with every register pointing at its architectural value.
    pub fn new() -> Self {
        Self {
            producer: [None; NUM_REGS],
        }
    }

    /// Records that `reg`'s next value will come from `tag`.
    pub fn set_producer(&mut self, reg: RegId, tag: RobTag) {
        self.producer[reg as usize] = Some(tag);
    }

    /// The ROB tag that will produce `reg`'s next value, or `None` if the
    /// architectural register file already holds the current value.
    pub fn get_producer(&self, reg: RegId) -> Option<RobTag> {
        self.producer[reg as usize]
    }

    /// True if `reg` has a pending producer (the scoreboard busy bit).
    pub fn is_busy(&self, reg: RegId) -> bool {
        self.producer[reg as usize].is_some()
    }

    /// Clears `reg`'s pending producer, but only if it still names `tag`.
    /// Guards against a committing instruction clobbering a tag set by a
    /// later rename of the same register (write-after-write hazard).
    pub fn clear_if_match(&mut self, reg: RegId, tag: RobTag) {
        let slot = &mut self.producer[reg as usize];
        if *slot == Some(tag) {
            *slot = None;
        }
    }

    /// Clears every producer entry: all speculative state is gone.
    pub fn flush(&mut self) {
        self.producer = [None; NUM_REGS];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_rat_has_no_pending_producers() {
        let rat = Rat::new();
        for r in 0..NUM_REGS as RegId {
            assert_eq!(rat.get_producer(r), None);
            assert!(!rat.is_busy(r));
        }
    }

    #[test]
    fn r0_is_renamed_like_any_other_register() {
        let mut rat = Rat::new();
        rat.set_producer(0, RobTag(1));
        assert_eq!(rat.get_producer(0), Some(RobTag(1)));
        assert!(rat.is_busy(0));
    }

    #[test]
    fn clear_if_match_respects_waw_ordering() {
        let mut rat = Rat::new();
        let old = RobTag(10);
        let new = RobTag(20);
        rat.set_producer(3, old);
        rat.set_producer(3, new);
        assert_eq!(rat.get_producer(3), Some(new));

        rat.clear_if_match(3, old);
        assert_eq!(rat.get_producer(3), Some(new), "stale commit must not clear a newer rename");

        rat.clear_if_match(3, new);
        assert_eq!(rat.get_producer(3), None);
    }

    #[test]
    fn flush_clears_every_register() {
        let mut rat = Rat::new();
        rat.set_producer(1, RobTag(1));
        rat.set_producer(2, RobTag(2));
        rat.flush();
        for r in 0..NUM_REGS as RegId {
            assert_eq!(rat.get_producer(r), None);
        }
    }
}
