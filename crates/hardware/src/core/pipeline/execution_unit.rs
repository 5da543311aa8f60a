//! Execution units: the multi-cycle functional units that consume a
//! dispatched, fully-ready reservation-station entry and, after their
//! declared latency elapses, hand a result to writeback over the CDB.
//!
//! Each unit holds a single pipeline register. While
//! `remaining > 1` the unit is simply counting down. When `remaining`
//! reaches `1`, the unit computes its result immediately — but that result
//! is only visible to writeback on the *next* cycle, modeled by the engine
//! running writeback before execute within one tick (see [`super::engine`]).

use crate::common::error::IllegalState;
use crate::core::pipeline::mob::Mob;
use crate::core::pipeline::rob::{BranchOutcome, RobTag};
use crate::isa::{Instruction, Opcode};

/// A result handed off to writeback once an instruction finishes executing.
#[derive(Clone, Copy, Debug)]
pub struct Completed {
    /// The completing instruction's ROB tag.
    pub tag: RobTag,
    /// The computed value (ALU result, loaded word, or don't-care for
    /// instructions with no destination register).
    pub value: i64,
    /// Resolution, for branch/jump instructions only.
    pub branch: Option<BranchOutcome>,
}

/// The instruction currently occupying a unit's pipeline register.
#[derive(Clone, Copy, Debug)]
struct InFlight {
    tag: RobTag,
    inst: Instruction,
    src1: i64,
    src2: i64,
    remaining: u32,
}

/// One functional unit: dispatch target for a reservation station, holding
/// at most one in-flight instruction at a time.
pub struct ExecutionUnit {
    busy: Option<InFlight>,
    completed: Option<Completed>,
}

impl Default for ExecutionUnit {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionUnit {
    /// Creates an idle unit.
    pub fn new() -> Self {
        Self {
            busy: None,
            completed: None,
        }
    }

    /// True if the unit cannot accept a new dispatch this cycle.
    pub fn is_busy(&self) -> bool {
        self.busy.is_some()
    }

    /// Accepts a dispatched instruction. `src1`/`src2` are the already
    /// resolved operand values (0 for roles the opcode does not use).
    /// Callers must check [`ExecutionUnit::is_busy`] first.
    pub fn dispatch(&mut self, tag: RobTag, inst: Instruction, src1: i64, src2: i64, latency: u32) {
        self.busy = Some(InFlight {
            tag,
            inst,
            src1,
            src2,
            remaining: latency.max(1),
        });
    }

    /// Takes this cycle's completed result, if execute produced one last
    /// cycle. Called by writeback before execute runs, which is what gives
    /// the CDB its one-cycle broadcast delay.
    pub fn take_completed(&mut self) -> Option<Completed> {
        self.completed.take()
    }

    /// Discards any in-flight or completed work. Used on a branch-induced
    /// flush, since every instruction currently occupying a unit is younger
    /// than a committing branch.
    pub fn flush(&mut self) {
        self.busy = None;
        self.completed = None;
    }

    /// Advances the pipeline register by one cycle: counts down, and on the
    /// cycle the counter reaches zero, computes the instruction's result.
    /// `memory` and `mob` are consulted so loads can forward or fall through
    /// to a real memory read; an out-of-range address is a fatal assertion,
    /// not a recoverable error.
    pub fn execute(&mut self, memory: &mut [i64], mob: &mut Mob) -> Result<(), IllegalState> {
        let Some(inflight) = &mut self.busy else {
            return Ok(());
        };
        inflight.remaining -= 1;
        if inflight.remaining > 0 {
            return Ok(());
        }
        let inflight = self.busy.take().expect("checked Some above");
        let tag = inflight.tag;
        let opcode = inflight.inst.opcode.mnemonic();
        let completed = compute(inflight, memory, mob)?;
        tracing::trace!(tag = tag.0, opcode, value = completed.value, "execution completion");
        self.completed = Some(completed);
        Ok(())
    }
}

fn checked_addr(addr: i64, len: usize) -> Result<usize, IllegalState> {
    usize::try_from(addr)
        .ok()
        .filter(|&a| a < len)
        .ok_or_else(|| IllegalState::new(format!("memory address {addr} out of range (0..{len})")))
}

fn compute(inflight: InFlight, memory: &mut [i64], mob: &mut Mob) -> Result<Completed, IllegalState> {
    let InFlight {
        tag, inst, src1, src2, ..
    } = inflight;
    let imm = inst.imm.unwrap_or(0);

    Ok(match inst.opcode {
        Opcode::Add => value(tag, src1.wrapping_add(src2)),
        Opcode::Addi => value(tag, src1.wrapping_add(imm)),
        Opcode::Sub | Opcode::Cmp => value(tag, src1.wrapping_sub(src2)),
        Opcode::Subi => value(tag, src1.wrapping_sub(imm)),
        Opcode::Mul => value(tag, src1.wrapping_mul(src2)),
        Opcode::Div => value(tag, if src2 == 0 { 0 } else { src1.wrapping_div(src2) }),
        Opcode::And => value(tag, src1 & src2),
        Opcode::Andi => value(tag, src1 & imm),
        Opcode::Or => value(tag, src1 | src2),
        Opcode::Ori => value(tag, src1 | imm),
        Opcode::Xor => value(tag, src1 ^ src2),
        Opcode::Xori => value(tag, src1 ^ imm),
        Opcode::Ldc => value(tag, imm),
        Opcode::Mov => value(tag, src1),
        Opcode::Ld => {
            // src1 carries the base register's value (r0 when the source
            // form omitted a base); imm is the offset.
            let addr = checked_addr(src1.wrapping_add(imm), memory.len())?;
            let loaded = mob.forward(tag, addr).unwrap_or(memory[addr]);
            mob.resolve_load_address(tag, addr);
            mob.complete_load(tag, loaded);
            value(tag, loaded)
        }
        Opcode::St | Opcode::Stc => {
            // src1 is the value being stored, src2 the base register's value.
            let addr = checked_addr(src2.wrapping_add(imm), memory.len())?;
            mob.resolve_store(tag, addr, src1);
            value(tag, 0)
        }
        Opcode::Beq => branch(tag, src1 == src2, &inst),
        Opcode::Bne => branch(tag, src1 != src2, &inst),
        Opcode::Blt => branch(tag, src1 < src2, &inst),
        Opcode::Bgt => branch(tag, src1 > src2, &inst),
        Opcode::Jmp => branch(tag, true, &inst),
        Opcode::Halt => value(tag, 0),
    })
}

fn value(tag: RobTag, result: i64) -> Completed {
    Completed {
        tag,
        value: result,
        branch: None,
    }
}

fn branch(tag: RobTag, taken: bool, inst: &Instruction) -> Completed {
    Completed {
        tag,
        value: 0,
        branch: Some(BranchOutcome {
            taken,
            target: inst.target.unwrap_or(0),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn instr(opcode: Opcode) -> Instruction {
        Instruction::new(opcode)
    }

    #[test]
    fn counts_down_then_produces_a_result_one_cycle_later() {
        let mut unit = ExecutionUnit::new();
        let mut memory = vec![0i64; Config::default().memory_words];
        let mut mob = Mob::new(4);
        unit.dispatch(RobTag(1), instr(Opcode::Add), 2, 3, 3);

        unit.execute(&mut memory, &mut mob).unwrap();
        assert!(unit.take_completed().is_none(), "still counting down");
        unit.execute(&mut memory, &mut mob).unwrap();
        assert!(unit.take_completed().is_none());
        unit.execute(&mut memory, &mut mob).unwrap();
        let done = unit.take_completed().expect("latency elapsed");
        assert_eq!(done.value, 5);
    }

    #[test]
    fn load_forwards_from_an_older_resolved_store() {
        let mut unit = ExecutionUnit::new();
        let mut memory = vec![0i64; 64];
        let mut mob = Mob::new(4);
        mob.allocate(RobTag(1), crate::core::pipeline::mob::MobKind::Store);
        mob.resolve_store(RobTag(1), 20, 10);
        mob.allocate(RobTag(2), crate::core::pipeline::mob::MobKind::Load);

        let mut ld = instr(Opcode::Ld);
        ld.src1 = Some(0);
        ld.imm = Some(20);
        unit.dispatch(RobTag(2), ld, 0, 0, 1);
        unit.execute(&mut memory, &mut mob).unwrap();
        let done = unit.take_completed().unwrap();
        assert_eq!(done.value, 10);
    }

    #[test]
    fn load_falls_through_to_memory_when_no_store_matches() {
        let mut unit = ExecutionUnit::new();
        let mut memory = vec![0i64; 64];
        memory[5] = 77;
        let mut mob = Mob::new(4);
        mob.allocate(RobTag(1), crate::core::pipeline::mob::MobKind::Load);

        let mut ld = instr(Opcode::Ld);
        ld.src1 = Some(0);
        ld.imm = Some(5);
        unit.dispatch(RobTag(1), ld, 0, 0, 1);
        unit.execute(&mut memory, &mut mob).unwrap();
        assert_eq!(unit.take_completed().unwrap().value, 77);
    }

    #[test]
    fn branch_reports_taken_and_target() {
        let mut unit = ExecutionUnit::new();
        let mut memory = vec![0i64; 16];
        let mut mob = Mob::new(4);
        let mut beq = instr(Opcode::Beq);
        beq.target = Some(9);
        unit.dispatch(RobTag(1), beq, 4, 4, 1);
        unit.execute(&mut memory, &mut mob).unwrap();
        let done = unit.take_completed().unwrap();
        assert_eq!(
            done.branch,
            Some(BranchOutcome {
                taken: true,
                target: 9
            })
        );
    }

    #[test]
    fn out_of_range_load_address_raises_illegal_state() {
        let mut unit = ExecutionUnit::new();
        let mut memory = vec![0i64; 4];
        let mut mob = Mob::new(4);
        mob.allocate(RobTag(1), crate::core::pipeline::mob::MobKind::Load);
        let mut ld = instr(Opcode::Ld);
        ld.src1 = Some(0);
        ld.imm = Some(100);
        unit.dispatch(RobTag(1), ld, 0, 0, 1);
        assert!(unit.execute(&mut memory, &mut mob).is_err());
    }

    #[test]
    fn flush_discards_in_flight_and_completed_work() {
        let mut unit = ExecutionUnit::new();
        let mut memory = vec![0i64; 16];
        let mut mob = Mob::new(4);
        unit.dispatch(RobTag(1), instr(Opcode::Add), 1, 1, 1);
        unit.execute(&mut memory, &mut mob).unwrap();
        unit.flush();
        assert!(unit.take_completed().is_none());
        assert!(!unit.is_busy());
    }
}
