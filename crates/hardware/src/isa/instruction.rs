//! Static instruction representation produced by the assembler and consumed
//! by fetch/decode. One [`Instruction`] shape covers every opcode; which
//! fields are meaningful depends on the opcode's class (see [`Opcode`]'s
//! doc comments).

use crate::common::RegId;
use crate::config::Latencies;

/// The functional unit class an opcode dispatches to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UnitClass {
    /// Arithmetic/logic unit: register-register and register-immediate ops.
    Alu,
    /// Load/store unit: memory ops plus the register-copy pseudo-ops LDC/MOV.
    Lsu,
    /// Branch unit: conditional/unconditional control transfer.
    Bru,
}

/// One opcode in the instruction set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Opcode {
    /// `ADD rd, rs1, rs2` — rd := rs1 + rs2.
    Add,
    /// `SUB rd, rs1, rs2` — rd := rs1 - rs2.
    Sub,
    /// `MUL rd, rs1, rs2` — rd := rs1 * rs2.
    Mul,
    /// `DIV rd, rs1, rs2` — rd := rs1 / rs2 (integer division).
    Div,
    /// `AND rd, rs1, rs2`.
    And,
    /// `OR rd, rs1, rs2`.
    Or,
    /// `XOR rd, rs1, rs2`.
    Xor,
    /// `CMP rd, rs1, rs2` — rd := rs1 - rs2, kept distinct from SUB for
    /// tracing/statistics identity even though the arithmetic is identical.
    Cmp,
    /// `ADDI rd, rs1, imm`.
    Addi,
    /// `SUBI rd, rs1, imm`.
    Subi,
    /// `ANDI rd, rs1, imm`.
    Andi,
    /// `ORI rd, rs1, imm`.
    Ori,
    /// `XORI rd, rs1, imm`.
    Xori,
    /// `LD rd, [offset]` or `LD rd, [base, offset]` — rd := MEMORY\[base+offset\].
    /// Allocates a load entry in the memory order buffer.
    Ld,
    /// `LDC rd, imm` — rd := imm. Dispatches through the LSU reservation
    /// station for latency/resource modeling but never touches memory or
    /// the MOB.
    Ldc,
    /// `ST rs, [offset]` or `ST rs, [base, offset]` — MEMORY\[base+offset\] := rs,
    /// deferred to commit. Allocates a store entry in the memory order buffer.
    St,
    /// `STC rs, [offset]` — store to a base-r0 address; otherwise identical
    /// to ST. Allocates a store entry in the memory order buffer.
    Stc,
    /// `MOV rd, rs` — rd := rs. Dispatches through the LSU reservation
    /// station like LDC but never touches memory or the MOB.
    Mov,
    /// `BEQ rs1, rs2, label` — branch if rs1 == rs2.
    Beq,
    /// `BNE rs1, rs2, label` — branch if rs1 != rs2.
    Bne,
    /// `BLT rs1, rs2, label` — branch if rs1 < rs2.
    Blt,
    /// `BGT rs1, rs2, label` — branch if rs1 > rs2.
    Bgt,
    /// `JMP label` — unconditional branch, always taken.
    Jmp,
    /// `HALT` — no operands; signals shutdown at commit.
    Halt,
}

impl Opcode {
    /// The mnemonic as it appears in assembly source.
    pub fn mnemonic(self) -> &'static str {
        match self {
            Self::Add => "ADD",
            Self::Sub => "SUB",
            Self::Mul => "MUL",
            Self::Div => "DIV",
            Self::And => "AND",
            Self::Or => "OR",
            Self::Xor => "XOR",
            Self::Cmp => "CMP",
            Self::Addi => "ADDI",
            Self::Subi => "SUBI",
            Self::Andi => "ANDI",
            Self::Ori => "ORI",
            Self::Xori => "XORI",
            Self::Ld => "LD",
            Self::Ldc => "LDC",
            Self::St => "ST",
            Self::Stc => "STC",
            Self::Mov => "MOV",
            Self::Beq => "BEQ",
            Self::Bne => "BNE",
            Self::Blt => "BLT",
            Self::Bgt => "BGT",
            Self::Jmp => "JMP",
            Self::Halt => "HALT",
        }
    }

    /// Parses a mnemonic, case-sensitively, as written in assembly source.
    pub fn from_mnemonic(text: &str) -> Option<Self> {
        Some(match text {
            "ADD" => Self::Add,
            "SUB" => Self::Sub,
            "MUL" => Self::Mul,
            "DIV" => Self::Div,
            "AND" => Self::And,
            "OR" => Self::Or,
            "XOR" => Self::Xor,
            "CMP" => Self::Cmp,
            "ADDI" => Self::Addi,
            "SUBI" => Self::Subi,
            "ANDI" => Self::Andi,
            "ORI" => Self::Ori,
            "XORI" => Self::Xori,
            "LD" => Self::Ld,
            "LDC" => Self::Ldc,
            "ST" => Self::St,
            "STC" => Self::Stc,
            "MOV" => Self::Mov,
            "BEQ" => Self::Beq,
            "BNE" => Self::Bne,
            "BLT" => Self::Blt,
            "BGT" => Self::Bgt,
            "JMP" => Self::Jmp,
            "HALT" => Self::Halt,
            _ => return None,
        })
    }

    /// Which reservation station / execution unit this opcode dispatches to.
    pub fn unit_class(self) -> UnitClass {
        match self {
            Self::Add
            | Self::Sub
            | Self::Mul
            | Self::Div
            | Self::And
            | Self::Or
            | Self::Xor
            | Self::Cmp
            | Self::Addi
            | Self::Subi
            | Self::Andi
            | Self::Ori
            | Self::Xori => UnitClass::Alu,
            Self::Ld | Self::Ldc | Self::St | Self::Stc | Self::Mov => UnitClass::Lsu,
            Self::Beq | Self::Bne | Self::Blt | Self::Bgt | Self::Jmp | Self::Halt => {
                UnitClass::Bru
            }
        }
    }

    /// True for LD/ST/STC, the opcodes that allocate a real memory order
    /// buffer entry. LDC and MOV share the LSU reservation station purely
    /// for resource/latency modeling and never touch the MOB.
    pub fn is_memory_access(self) -> bool {
        matches!(self, Self::Ld | Self::St | Self::Stc)
    }

    /// True for ST/STC: memory writes, deferred to commit.
    pub fn is_store(self) -> bool {
        matches!(self, Self::St | Self::Stc)
    }

    /// True for LD: the only memory read.
    pub fn is_load(self) -> bool {
        matches!(self, Self::Ld)
    }

    /// True for the conditional/unconditional control-transfer opcodes.
    pub fn is_branch(self) -> bool {
        matches!(
            self,
            Self::Beq | Self::Bne | Self::Blt | Self::Bgt | Self::Jmp
        )
    }

    /// True for HALT.
    pub fn is_halt(self) -> bool {
        matches!(self, Self::Halt)
    }

    /// Declared execution latency in cycles, per the configured [`Latencies`].
    pub fn latency(self, latencies: &Latencies) -> u32 {
        match self {
            Self::Mul => latencies.mul,
            Self::Div => latencies.div,
            Self::Ld => latencies.load,
            Self::Ldc | Self::St | Self::Stc | Self::Mov => latencies.store,
            Self::Halt => 1,
            _ if self.is_branch() => latencies.branch,
            _ => latencies.alu,
        }
    }
}

/// A fully decoded, statically resolved instruction as produced by the
/// assembler. Branch/jump targets are 0-based indices into the program;
/// register operands name architectural registers directly (renaming
/// happens later, at decode time in the pipeline, not here).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Instruction {
    /// The opcode.
    pub opcode: Opcode,
    /// Destination register, for opcodes that write one (`None` for stores,
    /// branches, and HALT).
    pub dest: Option<RegId>,
    /// First source register: left operand for ALU/branch ops, the source
    /// register for MOV, the base register for memory ops, the value
    /// register for ST/STC.
    pub src1: Option<RegId>,
    /// Second source register: right operand for ALU/branch ops, the base
    /// register for explicit `[base, offset]` memory forms.
    pub src2: Option<RegId>,
    /// Immediate operand: the right-hand value for `*I` ALU ops, the
    /// constant loaded by LDC, or the offset for memory ops.
    pub imm: Option<i64>,
    /// Resolved branch/jump target, a 0-based instruction index.
    pub target: Option<usize>,
}

impl Instruction {
    /// Convenience constructor filling every field as absent; callers set
    /// only the fields their opcode needs.
    pub fn new(opcode: Opcode) -> Self {
        Self {
            opcode,
            dest: None,
            src1: None,
            src2: None,
            imm: None,
            target: None,
        }
    }
}
