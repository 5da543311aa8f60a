//! Out-of-order pipeline: the reorder buffer, register alias table, memory
//! order buffer, reservation stations, execution units, and the engine that
//! drives them through one cycle at a time in writeback→execute→decode→fetch
//! order.

/// The out-of-order engine: owns every pipeline structure and ticks them.
pub mod engine;
/// Execution units: multi-cycle functional units behind each reservation station.
pub mod execution_unit;
/// Memory Order Buffer: load/store ordering and store-to-load forwarding.
pub mod mob;
/// Register Alias Table: rename map doubling as the scoreboard busy vector.
pub mod rat;
/// Reservation stations: per-unit wait queues with CDB tag matching.
pub mod reservation_station;
/// Reorder Buffer: in-order commit of out-of-order results.
pub mod rob;
/// Machine-state snapshot shared by the observer hook and fatal assertions.
pub mod snapshot;

pub use engine::{Engine, TickOutcome};
pub use snapshot::MachineSnapshot;
