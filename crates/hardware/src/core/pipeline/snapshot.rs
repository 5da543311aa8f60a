//! A read-only view of machine state at a point in time.
//!
//! Shared by two consumers: [`crate::sim::observer`] hands one to whatever
//! [`Observer`](crate::sim::observer::Observer) the caller installed once
//! per cycle, and [`IllegalState`](crate::common::error::IllegalState)
//! embeds one so a fatal assertion is a self-contained bug report rather
//! than a bare message.

use crate::common::NUM_REGS;
use crate::core::pipeline::rob::RobEntry;

/// A read-only view of machine state after one cycle has ticked, or at the
/// moment a fatal assertion fired.
#[derive(Clone, Debug)]
pub struct MachineSnapshot {
    /// The cycle number that just completed (0-based).
    pub cycle: u64,
    /// Fetch program counter going into the next cycle.
    pub pc: usize,
    /// Architectural register file.
    pub registers: [i64; NUM_REGS],
    /// Reorder buffer occupancy / capacity.
    pub rob_occupancy: usize,
    /// Reorder buffer capacity.
    pub rob_capacity: usize,
    /// Memory order buffer occupancy.
    pub mob_occupancy: usize,
    /// Memory order buffer capacity.
    pub mob_capacity: usize,
    /// The instruction retired this cycle, if commit fired.
    pub retired: Option<RobEntry>,
    /// Whether a branch misprediction flushed the backend this cycle.
    pub flushed: bool,
    /// Whether HALT retired this cycle.
    pub halted: bool,
}
