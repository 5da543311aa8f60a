//! Architectural state: the part of the machine the pipeline reads and
//! writes but which survives independently of any particular in-flight
//! instruction. The pipeline itself lives in [`crate::core::pipeline`] and
//! is owned by [`crate::sim::simulator::Simulator`], not by `Cpu`.

use std::collections::HashMap;

use crate::common::NUM_REGS;
use crate::config::Config;
use crate::isa::Instruction;

/// Architectural registers, memory, and the static program being executed.
pub struct Cpu {
    /// Architectural register file. `r0` is an ordinary writable register.
    pub registers: [i64; NUM_REGS],
    /// Flat, word-addressed main memory.
    pub memory: Vec<i64>,
    /// Fetch program counter: a 0-based index into `instructions`.
    pub pc: usize,
    /// The static, assembled program (immutable instruction cache).
    pub instructions: Vec<Instruction>,
    /// Label name to instruction-index map, carried for diagnostics.
    pub labels: HashMap<String, usize>,
}

impl Cpu {
    /// Builds a fresh machine ready to execute `instructions` from address 0.
    pub fn new(instructions: Vec<Instruction>, labels: HashMap<String, usize>, config: &Config) -> Self {
        Self {
            registers: [0; NUM_REGS],
            memory: vec![0; config.memory_words],
            pc: 0,
            instructions,
            labels,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_cpu_has_zeroed_registers_and_memory() {
        let cpu = Cpu::new(Vec::new(), HashMap::new(), &Config::default());
        assert!(cpu.registers.iter().all(|&r| r == 0));
        assert_eq!(cpu.memory.len(), Config::default().memory_words);
        assert_eq!(cpu.pc, 0);
    }
}
