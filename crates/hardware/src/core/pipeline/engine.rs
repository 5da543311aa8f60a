//! The out-of-order execution engine.
//!
//! Owns every speculative structure (ROB, RAT, MOB, reservation stations,
//! execution units) and the single-entry fetch→decode instruction buffer.
//! [`Engine::tick`] runs the four stages in reverse pipeline order —
//! writeback, execute, decode, fetch — so that a value written this cycle
//! is visible to every logically-earlier stage in the same cycle, and so
//! that a completed execution-unit result only reaches writeback on the
//! cycle after it was computed (see [`execution_unit`](super::execution_unit)).
//!
//! A flush is always a [`Rob::flush_all`]: because commit is strictly
//! in-order, the only place a flush originates is a taken branch sitting at
//! the ROB head, which means every other entry anywhere in the backend is
//! necessarily younger and must go too. There is no `flush_after` — nothing
//! survives a flush except the architectural state already committed.

use crate::common::error::IllegalState;
use crate::common::RegId;
use crate::config::Config;
use crate::core::cpu::Cpu;
use crate::core::pipeline::execution_unit::ExecutionUnit;
use crate::core::pipeline::mob::{Mob, MobKind};
use crate::core::pipeline::rat::Rat;
use crate::core::pipeline::reservation_station::{Operand, ReservationStation, RsEntry};
use crate::core::pipeline::rob::{Rob, RobEntry};
use crate::core::pipeline::snapshot::MachineSnapshot;
use crate::isa::{Instruction, UnitClass};

/// One (reservation station, execution unit) pair: a single execution lane.
struct Lane {
    rs: ReservationStation,
    unit: ExecutionUnit,
}

impl Lane {
    fn new(rs_depth: usize) -> Self {
        Self {
            rs: ReservationStation::new(rs_depth),
            unit: ExecutionUnit::new(),
        }
    }
}

/// What happened during one call to [`Engine::tick`], for the simulator's
/// bookkeeping and statistics.
#[derive(Debug, Default)]
pub struct TickOutcome {
    /// The instruction retired this cycle, if commit fired.
    pub retired: Option<RobEntry>,
    /// Whether a branch misprediction flushed the backend this cycle.
    pub flushed: bool,
    /// Whether HALT retired this cycle, ending the simulation.
    pub halted: bool,
}

/// The out-of-order pipeline controller.
pub struct Engine {
    rob: Rob,
    rat: Rat,
    mob: Mob,
    alu: Vec<Lane>,
    lsu: Vec<Lane>,
    bru: Vec<Lane>,
    /// Single-entry buffer between fetch and decode.
    buffer: Option<(usize, Instruction)>,
    /// Set once decode has handed a HALT to the BRU; fetch stops until a
    /// flush proves that HALT was itself speculative and clears this.
    fetch_halted: bool,
    /// Set once HALT retires; every stage stops for good.
    halted: bool,
    latencies: crate::config::Latencies,
    /// Cycle counter, used only to tag trace events with a cycle number.
    cycle: u64,
}

impl Engine {
    /// Builds an idle engine sized per `config`.
    pub fn new(config: &Config) -> Self {
        Self {
            rob: Rob::new(config.rob_capacity),
            rat: Rat::new(),
            mob: Mob::new(config.mob_capacity),
            alu: (0..config.units.alu).map(|_| Lane::new(config.rs_depth)).collect(),
            lsu: (0..config.units.lsu).map(|_| Lane::new(config.rs_depth)).collect(),
            bru: (0..config.units.bru).map(|_| Lane::new(config.rs_depth)).collect(),
            buffer: None,
            fetch_halted: false,
            halted: false,
            latencies: config.latencies,
            cycle: 0,
        }
    }

    /// True once HALT has retired; the simulator should stop calling `tick`.
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Number of in-flight reorder buffer entries, for debug dumps and the
    /// per-cycle observer snapshot.
    pub fn rob_occupancy(&self) -> usize {
        self.rob.len()
    }

    /// Reorder buffer capacity.
    pub fn rob_capacity(&self) -> usize {
        self.rob.capacity()
    }

    /// Number of in-flight memory order buffer entries.
    pub fn mob_occupancy(&self) -> usize {
        self.mob.len()
    }

    /// Memory order buffer capacity.
    pub fn mob_capacity(&self) -> usize {
        self.mob.capacity()
    }

    /// Builds a snapshot of the current machine state, for attaching to a
    /// fatal error at the point it is discovered.
    fn illegal_state(&self, cpu: &Cpu, err: IllegalState) -> IllegalState {
        err.with_snapshot(MachineSnapshot {
            cycle: self.cycle,
            pc: cpu.pc,
            registers: cpu.registers,
            rob_occupancy: self.rob.len(),
            rob_capacity: self.rob.capacity(),
            mob_occupancy: self.mob.len(),
            mob_capacity: self.mob.capacity(),
            retired: None,
            flushed: false,
            halted: self.halted,
        })
    }

    /// Runs one cycle: writeback (CDB broadcast + commit), execute, decode, fetch.
    pub fn tick(&mut self, cpu: &mut Cpu) -> Result<TickOutcome, IllegalState> {
        if self.halted {
            return Ok(TickOutcome::default());
        }
        self.cycle += 1;
        tracing::trace!(cycle = self.cycle, "tick start");

        let outcome = self.writeback(cpu)?;

        if outcome.halted {
            self.halted = true;
            tracing::debug!(cycle = self.cycle, "HALT retired, engine stopping");
            return Ok(outcome);
        }
        if outcome.flushed {
            tracing::debug!(cycle = self.cycle, pc = cpu.pc, "flush: redirecting fetch");
            self.flush();
        }

        self.execute(cpu)?;
        self.decode(cpu);
        self.fetch(cpu);

        Ok(outcome)
    }

    fn lanes_mut(&mut self, class: UnitClass) -> &mut Vec<Lane> {
        match class {
            UnitClass::Alu => &mut self.alu,
            UnitClass::Lsu => &mut self.lsu,
            UnitClass::Bru => &mut self.bru,
        }
    }

    /// Broadcasts completed execution-unit results over the CDB, then
    /// attempts to commit the ROB head.
    fn writeback(&mut self, cpu: &mut Cpu) -> Result<TickOutcome, IllegalState> {
        for class in [UnitClass::Alu, UnitClass::Lsu, UnitClass::Bru] {
            let lanes = self.lanes_mut(class);
            let completions: Vec<_> = lanes.iter_mut().filter_map(|l| l.unit.take_completed()).collect();
            for completed in completions {
                tracing::trace!(
                    cycle = self.cycle,
                    tag = completed.tag.0,
                    value = completed.value,
                    "CDB broadcast"
                );
                if let Some(branch) = completed.branch {
                    self.rob.complete_branch(completed.tag, branch);
                } else {
                    self.rob.complete(completed.tag, completed.value);
                }
                for class in [UnitClass::Alu, UnitClass::Lsu, UnitClass::Bru] {
                    for lane in self.lanes_mut(class) {
                        lane.rs.broadcast(completed.tag, completed.value);
                    }
                }
            }
        }

        let mut outcome = TickOutcome::default();
        let ready_to_commit = matches!(
            self.rob.peek_head(),
            Some(entry) if entry.state == crate::core::pipeline::rob::RobState::Completed
        );
        if ready_to_commit {
            let entry = self.rob.commit_head().expect("checked ready above");
            self.apply_commit(cpu, &entry)?;
            tracing::trace!(
                cycle = self.cycle,
                tag = entry.tag.0,
                opcode = entry.inst.opcode.mnemonic(),
                "commit"
            );
            outcome.halted = entry.inst.opcode.is_halt();
            outcome.flushed = entry.branch.is_some_and(|b| b.taken);
            if outcome.flushed {
                cpu.pc = entry.branch.expect("checked above").target;
            }
            outcome.retired = Some(entry);
        }
        Ok(outcome)
    }

    fn apply_commit(&mut self, cpu: &mut Cpu, entry: &RobEntry) -> Result<(), IllegalState> {
        if let Some(dest) = entry.dest
            && self.rat.get_producer(dest) == Some(entry.tag)
        {
            cpu.registers[dest as usize] = entry.result;
            self.rat.clear_if_match(dest, entry.tag);
        }
        if entry.inst.opcode.is_store()
            && let Some((addr, data)) = self.mob.commit_store(entry.tag)
        {
            if addr >= cpu.memory.len() {
                let err = IllegalState::new(format!(
                    "committed store address {addr} out of range (0..{})",
                    cpu.memory.len()
                ));
                return Err(self.illegal_state(cpu, err));
            }
            cpu.memory[addr] = data;
        }
        if entry.inst.opcode.is_load() {
            self.mob.retire_load(entry.tag);
        }
        Ok(())
    }

    /// Discards every piece of speculative state: a branch at the ROB head
    /// just committed taken, so everything else in flight is younger.
    fn flush(&mut self) {
        self.rob.flush_all();
        self.mob.flush_all();
        for class in [UnitClass::Alu, UnitClass::Lsu, UnitClass::Bru] {
            for lane in self.lanes_mut(class) {
                lane.rs.flush_all();
                lane.unit.flush();
            }
        }
        self.rat.flush();
        self.buffer = None;
        self.fetch_halted = false;
    }

    /// Advances every execution unit, then lets each reservation station
    /// dispatch into a now-free (or already-free) unit of its class.
    fn execute(&mut self, cpu: &mut Cpu) -> Result<(), IllegalState> {
        let mut fault = None;
        {
            let memory = &mut cpu.memory;
            let mob = &mut self.mob;
            let lanes = self.alu.iter_mut().chain(self.lsu.iter_mut()).chain(self.bru.iter_mut());
            for lane in lanes {
                if let Err(err) = lane.unit.execute(memory, mob) {
                    fault = Some(err);
                    break;
                }
            }
        }
        if let Some(err) = fault {
            return Err(self.illegal_state(cpu, err));
        }

        self.dispatch(UnitClass::Alu);
        self.dispatch(UnitClass::Lsu);
        self.dispatch(UnitClass::Bru);
        Ok(())
    }

    fn dispatch(&mut self, class: UnitClass) {
        let mob = &self.mob;
        let lanes = match class {
            UnitClass::Alu => &mut self.alu,
            UnitClass::Lsu => &mut self.lsu,
            UnitClass::Bru => &mut self.bru,
        };
        for lane in lanes {
            if lane.unit.is_busy() {
                continue;
            }
            let gate = |entry: &RsEntry| {
                !(entry.inst.opcode.is_load() && mob.older_store_unresolved(entry.tag))
            };
            if let Some(entry) = lane.rs.select_dispatch(gate) {
                let src1 = entry.op1.and_then(Operand::value).unwrap_or(0);
                let src2 = entry.op2.and_then(Operand::value).unwrap_or(0);
                let latency = entry.inst.opcode.latency(&self.latencies);
                tracing::trace!(
                    cycle = self.cycle,
                    tag = entry.tag.0,
                    opcode = entry.inst.opcode.mnemonic(),
                    latency,
                    "RS dispatch"
                );
                lane.unit.dispatch(entry.tag, entry.inst, src1, src2, latency);
            }
        }
    }

    /// Renames and issues the buffered instruction, if resources allow.
    fn decode(&mut self, cpu: &mut Cpu) {
        let Some((pc, inst)) = self.buffer else {
            return;
        };
        if self.rob.is_full() {
            return;
        }
        let class = inst.opcode.unit_class();
        let lane_idx = self.lanes_mut(class).iter().position(|l| !l.rs.is_full());
        let Some(lane_idx) = lane_idx else {
            return;
        };
        if inst.opcode.is_memory_access() && self.mob.is_full() {
            return;
        }

        self.buffer = None;

        let resolve = |reg: RegId, rat: &Rat, cpu: &Cpu| match rat.get_producer(reg) {
            Some(tag) => Operand::Pending(tag),
            None => Operand::Value(cpu.registers[reg as usize]),
        };
        let op1 = inst.src1.map(|r| resolve(r, &self.rat, cpu));
        let op2 = inst.src2.map(|r| resolve(r, &self.rat, cpu));

        let tag = self
            .rob
            .allocate(pc, inst, inst.dest)
            .expect("checked not full above");
        if let Some(dest) = inst.dest {
            self.rat.set_producer(dest, tag);
        }
        if inst.opcode.is_memory_access() {
            let kind = if inst.opcode.is_load() { MobKind::Load } else { MobKind::Store };
            self.mob.allocate(tag, kind);
        }

        tracing::trace!(
            cycle = self.cycle,
            tag = tag.0,
            pc,
            opcode = inst.opcode.mnemonic(),
            "decode/rename"
        );

        let lane = &mut self.lanes_mut(class)[lane_idx];
        lane.rs.insert(RsEntry { tag, inst, op1, op2 });
    }

    /// Supplies the decode buffer with at most one instruction per cycle.
    /// No branch prediction: fetch simply continues sequentially past an
    /// unresolved branch (predict-not-taken), relying on a commit-time
    /// flush to undo the speculation if it was wrong.
    fn fetch(&mut self, cpu: &mut Cpu) {
        if self.halted || self.fetch_halted || self.buffer.is_some() {
            return;
        }
        let Some(&inst) = cpu.instructions.get(cpu.pc) else {
            if self.rob.is_empty() {
                self.halted = true;
                tracing::debug!(
                    cycle = self.cycle,
                    "instruction stream exhausted with nothing in flight, engine stopping"
                );
            }
            return;
        };
        if inst.opcode.is_halt() {
            self.fetch_halted = true;
        }
        tracing::trace!(cycle = self.cycle, pc = cpu.pc, opcode = inst.opcode.mnemonic(), "fetch");
        self.buffer = Some((cpu.pc, inst));
        cpu.pc += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::assemble;

    fn run(source: &str, config: &Config) -> (Cpu, Engine, Vec<TickOutcome>) {
        let program = assemble(source).expect("valid program");
        let mut cpu = Cpu::new(program.instructions, program.labels, config);
        let mut engine = Engine::new(config);
        let mut history = Vec::new();
        for _ in 0..10_000 {
            let outcome = engine.tick(&mut cpu).expect("no illegal state");
            let halted = engine.is_halted();
            history.push(outcome);
            if halted {
                break;
            }
        }
        (cpu, engine, history)
    }

    #[test]
    fn straight_line_arithmetic_retires_cleanly() {
        let config = Config::default();
        let (cpu, engine, history) = run(
            "ADDI r1, r0, 5\nADDI r2, r0, 7\nADD r3, r1, r2\nHALT\n",
            &config,
        );
        assert!(engine.is_halted());
        assert_eq!(cpu.registers[3], 12);
        let retired = history.iter().filter(|o| o.retired.is_some()).count();
        assert_eq!(retired, 4);
        let flushes = history.iter().filter(|o| o.flushed).count();
        assert_eq!(flushes, 0);
    }

    #[test]
    fn store_to_load_forwarding_resolves_before_commit() {
        let config = Config::default();
        let (cpu, engine, _) = run("LDC r1, 10\nSTC r1, [20]\nLD r2, [20]\nHALT\n", &config);
        assert!(engine.is_halted());
        assert_eq!(cpu.registers[2], 10);
        assert_eq!(cpu.memory[20], 10);
    }

    #[test]
    fn repeated_rename_of_same_register_chains_through_rat() {
        let config = Config::default();
        let (cpu, engine, _) = run(
            "ADDI r1,r0,1\nADDI r1,r1,1\nADDI r1,r1,1\nHALT\n",
            &config,
        );
        assert!(engine.is_halted());
        assert_eq!(cpu.registers[1], 3);
    }

    #[test]
    fn mispredicted_not_taken_branch_flushes_the_decoded_instruction_after_it() {
        let config = Config::default();
        let (cpu, engine, history) = run("BEQ r0,r0,END\nADDI r1,r0,99\nEND: HALT\n", &config);
        assert!(engine.is_halted());
        assert_eq!(cpu.registers[1], 0);
        assert!(history.iter().any(|o| o.flushed));
    }

    #[test]
    fn store_then_load_to_same_address_forwards_even_though_load_issues_first() {
        let config = Config::default();
        let (cpu, engine, _) = run(
            "ADDI r1,r0,7\nST r1,[r0,4]\nLD r2,[r0,4]\nHALT\n",
            &config,
        );
        assert!(engine.is_halted());
        assert_eq!(cpu.registers[2], 7);
    }

    #[test]
    fn empty_program_halts_immediately_and_retires_nothing() {
        let config = Config::default();
        let program = assemble("").expect("valid empty program");
        let mut cpu = Cpu::new(program.instructions, program.labels, &config);
        let mut engine = Engine::new(&config);
        let outcome = engine.tick(&mut cpu).expect("no illegal state");
        assert!(engine.is_halted());
        assert!(outcome.retired.is_none());
    }

    #[test]
    fn halt_only_program_retires_exactly_once() {
        let config = Config::default();
        let (_, engine, history) = run("HALT\n", &config);
        assert!(engine.is_halted());
        assert_eq!(history.iter().filter(|o| o.retired.is_some()).count(), 1);
    }

    #[test]
    fn loads_retire_from_the_mob_so_a_long_loop_does_not_deadlock_decode() {
        // mob_capacity is deliberately smaller than the number of LDs issued
        // over the program's lifetime: if a committed LD's MOB entry were
        // never freed, the MOB would fill permanently and decode would stall
        // forever on a program with no other blocking resource.
        let mut config = Config::default();
        config.mob_capacity = 2;
        let source = "\
            LD r1,[0]\n\
            LD r1,[0]\n\
            LD r1,[0]\n\
            LD r1,[0]\n\
            LD r1,[0]\n\
            LD r1,[0]\n\
            LD r1,[0]\n\
            LD r1,[0]\n\
            HALT\n\
        ";
        let (cpu, engine, history) = run(source, &config);
        assert!(engine.is_halted(), "decode deadlocked on a permanently full MOB");
        assert_eq!(cpu.registers[1], 0);
        let retired = history.iter().filter(|o| o.retired.is_some()).count();
        assert_eq!(retired, 9);
    }
}
