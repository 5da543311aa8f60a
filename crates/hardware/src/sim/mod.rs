//! Simulation: the top-level driver that owns the CPU and pipeline
//! side-by-side, and the observer hook used to inspect machine state once
//! per cycle without coupling the core to any particular presentation.

/// Read-only per-cycle snapshot and the trait that consumes it.
pub mod observer;
/// `Simulator`: owns `Cpu` + `Engine`, runs the tick loop to completion.
pub mod simulator;

pub use observer::{MachineSnapshot, Observer};
pub use simulator::{RunOutcome, Simulator};
