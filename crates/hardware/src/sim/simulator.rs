//! Simulator: owns the CPU and the out-of-order engine side-by-side and
//! drives the cycle loop — one `tick` per cycle, no wall-clock timing, no
//! suspension points.

use crate::common::error::IllegalState;
use crate::config::Config;
use crate::core::pipeline::TickOutcome;
use crate::core::{Cpu, Engine};
use crate::isa::Program;
use crate::sim::observer::{MachineSnapshot, Observer};
use crate::stats::SimStats;

/// Why [`Simulator::run`] stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunOutcome {
    /// HALT retired; the program finished normally.
    Halted,
    /// `max_cycles` elapsed without HALT retiring — a safety bound against
    /// runaway or non-terminating programs.
    CycleBudgetExhausted,
}

/// Top-level simulator: architectural state + out-of-order pipeline.
pub struct Simulator {
    /// Architectural state: registers, memory, and the static program.
    pub cpu: Cpu,
    /// The out-of-order pipeline engine.
    pub engine: Engine,
    /// Running totals for this simulation.
    pub stats: SimStats,
}

impl Simulator {
    /// Builds a simulator ready to execute `program` from instruction 0.
    pub fn new(program: Program, config: &Config) -> Self {
        Self {
            cpu: Cpu::new(program.instructions, program.labels, config),
            engine: Engine::new(config),
            stats: SimStats::default(),
        }
    }

    /// Advances the simulator by exactly one cycle, notifying `observer`
    /// with the resulting [`MachineSnapshot`] regardless of whether any
    /// instruction retired.
    pub fn tick(&mut self, observer: &mut dyn Observer) -> Result<TickOutcome, IllegalState> {
        let outcome = self.engine.tick(&mut self.cpu)?;

        self.stats.record_cycle();
        if let Some(entry) = &outcome.retired {
            self.stats.record_retire(entry.inst.opcode);
        }
        if outcome.flushed {
            self.stats.record_flush();
        }

        observer.on_cycle(&MachineSnapshot {
            cycle: self.stats.cycles,
            pc: self.cpu.pc,
            registers: self.cpu.registers,
            rob_occupancy: self.engine.rob_occupancy(),
            rob_capacity: self.engine.rob_capacity(),
            mob_occupancy: self.engine.mob_occupancy(),
            mob_capacity: self.engine.mob_capacity(),
            retired: outcome.retired.clone(),
            flushed: outcome.flushed,
            halted: outcome.halted,
        });

        Ok(outcome)
    }

    /// Runs until HALT retires or `max_cycles` elapses, whichever comes
    /// first, notifying `observer` each cycle.
    pub fn run(&mut self, max_cycles: u64, observer: &mut dyn Observer) -> Result<RunOutcome, IllegalState> {
        loop {
            if self.engine.is_halted() {
                return Ok(RunOutcome::Halted);
            }
            if self.stats.cycles >= max_cycles {
                return Ok(RunOutcome::CycleBudgetExhausted);
            }
            self.tick(observer)?;
        }
    }
}
