//! Two-pass text assembler: resolves labels and lowers assembly source into
//! a static [`Instruction`] program plus a label→index map. This is the
//! "external collaborator" the pipeline consumes but never calls back into;
//! it has no notion of cycles, reservation stations, or the ROB.

use std::collections::HashMap;

use crate::common::error::AssemblyError;
use crate::common::RegId;
use crate::isa::instruction::{Instruction, Opcode};

/// The result of assembling a program: the decoded instruction stream and
/// the label → instruction-index map fetch consults for branch resolution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Program {
    /// Instructions in program order, 0-based index == fetch PC.
    pub instructions: Vec<Instruction>,
    /// Every label defined in the source, mapped to the index of the
    /// instruction immediately following it.
    pub labels: HashMap<String, usize>,
}

/// Assembles `source` into a [`Program`].
pub fn assemble(source: &str) -> Result<Program, AssemblyError> {
    let mut labels = HashMap::new();
    let mut pending: Vec<(usize, String)> = Vec::new();
    let mut index = 0usize;

    for (offset, raw) in source.lines().enumerate() {
        let line = offset + 1;
        let text = strip_comment(raw).trim();
        if text.is_empty() {
            continue;
        }
        if let Some(name) = text.strip_suffix(':') {
            let name = name.trim().to_string();
            if labels.insert(name.clone(), index).is_some() {
                return Err(AssemblyError::DuplicateLabel { line, label: name });
            }
            continue;
        }
        pending.push((line, text.to_string()));
        index += 1;
    }

    let instructions = pending
        .into_iter()
        .map(|(line, text)| parse_instruction(line, &text, &labels))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Program { instructions, labels })
}

fn strip_comment(line: &str) -> &str {
    match line.find(';') {
        Some(idx) => &line[..idx],
        None => line,
    }
}

fn parse_instruction(
    line: usize,
    text: &str,
    labels: &HashMap<String, usize>,
) -> Result<Instruction, AssemblyError> {
    let (mnemonic, rest) = match text.split_once(char::is_whitespace) {
        Some((m, r)) => (m, r.trim()),
        None => (text, ""),
    };
    let opcode = Opcode::from_mnemonic(mnemonic).ok_or_else(|| AssemblyError::UnknownOpcode {
        line,
        opcode: mnemonic.to_string(),
    })?;
    let operands = split_top_level_commas(rest);

    let expect = |n: usize| -> Result<(), AssemblyError> {
        if operands.len() == n {
            Ok(())
        } else {
            Err(AssemblyError::WrongOperandCount {
                line,
                opcode: opcode.mnemonic().to_string(),
                expected: n,
                found: operands.len(),
            })
        }
    };

    let mut inst = Instruction::new(opcode);
    match opcode {
        Opcode::Add
        | Opcode::Sub
        | Opcode::Mul
        | Opcode::Div
        | Opcode::And
        | Opcode::Or
        | Opcode::Xor
        | Opcode::Cmp => {
            expect(3)?;
            inst.dest = Some(parse_register(line, &operands[0])?);
            inst.src1 = Some(parse_register(line, &operands[1])?);
            inst.src2 = Some(parse_register(line, &operands[2])?);
        }
        Opcode::Addi | Opcode::Subi | Opcode::Andi | Opcode::Ori | Opcode::Xori => {
            expect(3)?;
            inst.dest = Some(parse_register(line, &operands[0])?);
            inst.src1 = Some(parse_register(line, &operands[1])?);
            inst.imm = Some(parse_immediate(line, &operands[2])?);
        }
        Opcode::Ld => {
            expect(2)?;
            inst.dest = Some(parse_register(line, &operands[0])?);
            let (base, offset) = parse_bracket(line, &operands[1])?;
            inst.src1 = Some(base);
            inst.imm = Some(offset);
        }
        Opcode::Ldc => {
            expect(2)?;
            inst.dest = Some(parse_register(line, &operands[0])?);
            inst.imm = Some(parse_immediate(line, &operands[1])?);
        }
        Opcode::St | Opcode::Stc => {
            expect(2)?;
            inst.src1 = Some(parse_register(line, &operands[0])?);
            let (base, offset) = parse_bracket(line, &operands[1])?;
            inst.src2 = Some(base);
            inst.imm = Some(offset);
        }
        Opcode::Mov => {
            expect(2)?;
            inst.dest = Some(parse_register(line, &operands[0])?);
            inst.src1 = Some(parse_register(line, &operands[1])?);
        }
        Opcode::Beq | Opcode::Bne | Opcode::Blt | Opcode::Bgt => {
            expect(3)?;
            inst.src1 = Some(parse_register(line, &operands[0])?);
            inst.src2 = Some(parse_register(line, &operands[1])?);
            inst.target = Some(parse_label(line, &operands[2], labels)?);
        }
        Opcode::Jmp => {
            expect(1)?;
            inst.target = Some(parse_label(line, &operands[0], labels)?);
        }
        Opcode::Halt => {
            expect(0)?;
        }
    }

    Ok(inst)
}

/// Splits on commas at bracket depth zero, so `[r1, 20]` survives as one
/// token while `r2, [r1, 20]` still splits into two.
fn split_top_level_commas(rest: &str) -> Vec<String> {
    if rest.is_empty() {
        return Vec::new();
    }
    let mut tokens = Vec::new();
    let mut depth = 0i32;
    let mut current = String::new();
    for ch in rest.chars() {
        match ch {
            '[' => {
                depth += 1;
                current.push(ch);
            }
            ']' => {
                depth -= 1;
                current.push(ch);
            }
            ',' if depth == 0 => {
                tokens.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(ch),
        }
    }
    if !current.trim().is_empty() {
        tokens.push(current.trim().to_string());
    }
    tokens
}

fn parse_register(line: usize, token: &str) -> Result<RegId, AssemblyError> {
    let digits = token.strip_prefix('r').ok_or_else(|| AssemblyError::MalformedOperand {
        line,
        operand: token.to_string(),
    })?;
    let id: usize = digits.parse().map_err(|_| AssemblyError::MalformedOperand {
        line,
        operand: token.to_string(),
    })?;
    if id >= crate::common::NUM_REGS {
        return Err(AssemblyError::MalformedOperand {
            line,
            operand: token.to_string(),
        });
    }
    Ok(id as RegId)
}

fn parse_immediate(line: usize, token: &str) -> Result<i64, AssemblyError> {
    token.parse::<i64>().map_err(|_| AssemblyError::MalformedOperand {
        line,
        operand: token.to_string(),
    })
}

fn parse_label(
    line: usize,
    token: &str,
    labels: &HashMap<String, usize>,
) -> Result<usize, AssemblyError> {
    labels
        .get(token)
        .copied()
        .ok_or_else(|| AssemblyError::UnresolvedLabel {
            line,
            label: token.to_string(),
        })
}

/// Parses a bracketed address expression: `[offset]` (implicit base r0) or
/// `[base, offset]`. Returns `(base, offset)`.
fn parse_bracket(line: usize, token: &str) -> Result<(RegId, i64), AssemblyError> {
    let inner = token
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .ok_or_else(|| AssemblyError::MalformedOperand {
            line,
            operand: token.to_string(),
        })?;
    let parts: Vec<&str> = inner.split(',').map(str::trim).collect();
    match parts.as_slice() {
        [offset] => Ok((0, parse_immediate(line, offset)?)),
        [base, offset] => Ok((parse_register(line, base)?, parse_immediate(line, offset)?)),
        _ => Err(AssemblyError::MalformedOperand {
            line,
            operand: token.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assembles_straight_line_program() {
        let src = "ADDI r1, r0, 5\nADDI r2, r0, 7\nADD r3, r1, r2\nHALT\n";
        let program = assemble(src).expect("valid program");
        assert_eq!(program.instructions.len(), 4);
        assert_eq!(program.instructions[2].opcode, Opcode::Add);
        assert_eq!(program.instructions[2].dest, Some(3));
        assert_eq!(program.instructions[2].src1, Some(1));
        assert_eq!(program.instructions[2].src2, Some(2));
    }

    #[test]
    fn resolves_forward_label() {
        let src = "BEQ r0, r0, END\nADDI r1, r0, 99\nEND: HALT\n";
        let program = assemble(src).expect("valid program");
        assert_eq!(program.labels.get("END"), Some(&2));
        assert_eq!(program.instructions[0].target, Some(2));
    }

    #[test]
    fn parses_implicit_and_explicit_base_memory_forms() {
        let src = "LD r2, [20]\nST r1, [r0, 4]\n";
        let program = assemble(src).expect("valid program");
        assert_eq!(program.instructions[0].src1, Some(0));
        assert_eq!(program.instructions[0].imm, Some(20));
        assert_eq!(program.instructions[1].src2, Some(0));
        assert_eq!(program.instructions[1].imm, Some(4));
    }

    #[test]
    fn rejects_unknown_opcode() {
        let err = assemble("FOO r1, r2\n").unwrap_err();
        assert!(matches!(err, AssemblyError::UnknownOpcode { line: 1, .. }));
    }

    #[test]
    fn rejects_unresolved_label() {
        let err = assemble("JMP NOWHERE\n").unwrap_err();
        assert!(matches!(err, AssemblyError::UnresolvedLabel { line: 1, .. }));
    }

    #[test]
    fn rejects_wrong_operand_count() {
        let err = assemble("ADD r1, r2\n").unwrap_err();
        assert!(matches!(err, AssemblyError::WrongOperandCount { line: 1, .. }));
    }

    #[test]
    fn ignores_comments_and_blank_lines() {
        let src = "; a comment\n\nHALT ; trailing comment\n";
        let program = assemble(src).expect("valid program");
        assert_eq!(program.instructions.len(), 1);
        assert_eq!(program.instructions[0].opcode, Opcode::Halt);
    }
}
