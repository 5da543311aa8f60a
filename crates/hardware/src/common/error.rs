//! Error and fatal-assertion types for the simulator.
//!
//! Two independent error surfaces exist: assembly errors are ordinary,
//! recoverable failures discovered before simulation starts, while illegal
//! runtime states are programming bugs in the engine itself and are raised
//! as fatal assertions carrying a full state snapshot. Resource exhaustion
//! (ROB/RS/MOB full) and branch misprediction are *not* represented here —
//! both are normal back-pressure / control flow, not errors.

use std::fmt;

use crate::core::pipeline::MachineSnapshot;

/// Failure to turn assembly text into an instruction stream.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum AssemblyError {
    /// An opcode token did not match any known instruction.
    #[error("line {line}: unknown opcode {opcode:?}")]
    UnknownOpcode {
        /// 1-based source line number.
        line: usize,
        /// The offending token.
        opcode: String,
    },

    /// An operand could not be parsed as a register, immediate, or label.
    #[error("line {line}: malformed operand {operand:?}")]
    MalformedOperand {
        /// 1-based source line number.
        line: usize,
        /// The offending token.
        operand: String,
    },

    /// An instruction had the wrong number of operands for its opcode.
    #[error("line {line}: {opcode} expects {expected} operand(s), found {found}")]
    WrongOperandCount {
        /// 1-based source line number.
        line: usize,
        /// The opcode mnemonic.
        opcode: String,
        /// Number of operands the opcode requires.
        expected: usize,
        /// Number of operands actually supplied.
        found: usize,
    },

    /// A branch or jump referenced a label that was never defined.
    #[error("line {line}: unresolved label {label:?}")]
    UnresolvedLabel {
        /// 1-based source line number.
        line: usize,
        /// The undefined label name.
        label: String,
    },

    /// The same label was defined more than once.
    #[error("line {line}: duplicate label {label:?}")]
    DuplicateLabel {
        /// 1-based source line number.
        line: usize,
        /// The repeated label name.
        label: String,
    },
}

/// A fatal, engine-internal programming error: a data-model invariant was
/// violated. These are never expected to occur; when one does, it carries a
/// full [`MachineSnapshot`] of the state at the moment it was detected, so a
/// bug report is self-contained.
///
/// Raised with just a message at the point of detection via [`Self::new`];
/// the engine attaches the snapshot once it has regained the full
/// Engine/Cpu context needed to build one, before the error leaves
/// `core::pipeline`. `snapshot` is therefore only ever `None` transiently.
#[derive(Clone, Debug, thiserror::Error)]
#[error("illegal runtime state: {message}")]
pub struct IllegalState {
    /// Human-readable description of the violated invariant.
    pub message: String,
    /// Full machine state at the moment this was detected.
    pub snapshot: Option<MachineSnapshot>,
}

impl IllegalState {
    /// Builds an [`IllegalState`] from any displayable reason, with no
    /// snapshot attached yet.
    pub fn new(reason: impl fmt::Display) -> Self {
        Self {
            message: reason.to_string(),
            snapshot: None,
        }
    }

    /// Attaches the machine state at the point this error is about to cross
    /// out of the engine.
    pub fn with_snapshot(mut self, snapshot: MachineSnapshot) -> Self {
        self.snapshot = Some(snapshot);
        self
    }
}
