//! Simple assembler for BasicML programs.
//!
//! Syntax:
//! ```text
//! ; Comment
//! LOOP:           ; Define a label
//!     READ N      ; Read into the cell labelled N
//!     WRITE 12    ; Write cell 12
//!     BRANCH LOOP ; Jump to label
//!     HALT        ; Halt
//! N:  DAT 0       ; Define data value
//! ```
//!
//! Code is emitted from address 0, one word per instruction or data line.

use crate::cpu::decode::{encode, Instruction, Opcode};
use crate::word::{Word, OPERAND_RADIX};
use std::collections::HashMap;
use thiserror::Error;

/// Assemble source code to a list of words.
pub fn assemble(source: &str) -> Result<Vec<Word>, AssemblerError> {
    let mut asm = Assembler::new();
    asm.assemble(source)
}

/// A label use waiting for pass 2.
struct PendingRef {
    index: usize,
    opcode: Opcode,
    label: String,
    line: usize,
}

/// The assembler state.
struct Assembler {
    /// Symbol table (label -> address).
    symbols: HashMap<String, usize>,
    /// Forward references resolved after pass 1.
    pending: Vec<PendingRef>,
    /// Output words.
    output: Vec<Word>,
}

impl Assembler {
    fn new() -> Self {
        Self {
            symbols: HashMap::new(),
            pending: Vec::new(),
            output: Vec::new(),
        }
    }

    fn assemble(&mut self, source: &str) -> Result<Vec<Word>, AssemblerError> {
        // Pass 1: Collect labels and generate code
        for (line_num, line) in source.lines().enumerate() {
            self.process_line(line, line_num + 1)?;
        }

        // Pass 2: Resolve label references
        self.resolve_references()?;

        Ok(std::mem::take(&mut self.output))
    }

    fn process_line(&mut self, line: &str, line_num: usize) -> Result<(), AssemblerError> {
        // Remove comments
        let line = match line.find(';') {
            Some(idx) => &line[..idx],
            None => line,
        };
        let mut line = line.trim();

        if let Some(colon_idx) = line.find(':') {
            let label = line[..colon_idx].trim().to_uppercase();
            if label.is_empty() || label.contains(char::is_whitespace) {
                return Err(AssemblerError::SyntaxError {
                    line: line_num,
                    message: format!("bad label '{}'", &line[..colon_idx]),
                });
            }
            if self.symbols.insert(label.clone(), self.output.len()).is_some() {
                return Err(AssemblerError::DuplicateLabel { line: line_num, label });
            }
            line = line[colon_idx + 1..].trim();
        }

        if line.is_empty() {
            return Ok(());
        }

        self.process_instruction(line, line_num)
    }

    fn process_instruction(&mut self, line: &str, line_num: usize) -> Result<(), AssemblerError> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() > 2 {
            return Err(AssemblerError::SyntaxError {
                line: line_num,
                message: format!("unexpected '{}'", parts[2]),
            });
        }

        let mnemonic = parts[0].to_uppercase();
        let operand = parts.get(1).copied();

        if mnemonic == "DAT" || mnemonic == "DATA" {
            let text = operand.ok_or_else(|| AssemblerError::SyntaxError {
                line: line_num,
                message: "DAT requires value".into(),
            })?;
            let value = text.parse::<Word>().map_err(|_| AssemblerError::SyntaxError {
                line: line_num,
                message: format!("invalid data value '{}'", text),
            })?;
            self.output.push(value);
            return Ok(());
        }

        let opcode = parse_mnemonic(&mnemonic).ok_or_else(|| AssemblerError::UnknownMnemonic {
            line: line_num,
            mnemonic: mnemonic.clone(),
        })?;

        let operand = match (opcode, operand) {
            (_, Some(text)) => self.parse_address(opcode, text, line_num)?,
            (Opcode::Halt, None) => 0,
            (_, None) => {
                return Err(AssemblerError::SyntaxError {
                    line: line_num,
                    message: format!("{} requires an address", opcode),
                })
            }
        };

        self.output.push(encode(&Instruction::new(opcode, operand)));
        Ok(())
    }

    fn parse_address(&mut self, opcode: Opcode, text: &str, line_num: usize) -> Result<usize, AssemblerError> {
        if text.starts_with(|c: char| c.is_ascii_digit()) {
            let addr = text.parse::<usize>().map_err(|_| AssemblerError::SyntaxError {
                line: line_num,
                message: format!("invalid address '{}'", text),
            })?;
            return check_address(addr, line_num);
        }

        // Label reference, patched in pass 2
        self.pending.push(PendingRef {
            index: self.output.len(),
            opcode,
            label: text.to_uppercase(),
            line: line_num,
        });
        Ok(0)
    }

    fn resolve_references(&mut self) -> Result<(), AssemblerError> {
        for pending in &self.pending {
            let addr = *self.symbols.get(&pending.label).ok_or_else(|| AssemblerError::UndefinedLabel {
                line: pending.line,
                label: pending.label.clone(),
            })?;
            let addr = check_address(addr, pending.line)?;
            self.output[pending.index] = encode(&Instruction::new(pending.opcode, addr));
        }
        Ok(())
    }
}

fn parse_mnemonic(mnemonic: &str) -> Option<Opcode> {
    Opcode::from_mnemonic(mnemonic).or(match mnemonic {
        "SUB" => Some(Opcode::Subtract),
        "DIV" => Some(Opcode::Divide),
        "MUL" => Some(Opcode::Multiply),
        "BR" | "JMP" => Some(Opcode::Branch),
        "BRNEG" => Some(Opcode::BranchNeg),
        "BRZERO" => Some(Opcode::BranchZero),
        "HLT" => Some(Opcode::Halt),
        _ => None,
    })
}

fn check_address(addr: usize, line: usize) -> Result<usize, AssemblerError> {
    if addr as i64 >= OPERAND_RADIX {
        return Err(AssemblerError::AddressOutOfRange { line, addr });
    }
    Ok(addr)
}

/// Errors that can occur during assembly.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssemblerError {
    #[error("syntax error on line {line}: {message}")]
    SyntaxError { line: usize, message: String },

    #[error("unknown mnemonic on line {line}: {mnemonic}")]
    UnknownMnemonic { line: usize, mnemonic: String },

    #[error("undefined label on line {line}: {label}")]
    UndefinedLabel { line: usize, label: String },

    #[error("duplicate label on line {line}: {label}")]
    DuplicateLabel { line: usize, label: String },

    #[error("address out of range on line {line}: {addr}")]
    AddressOutOfRange { line: usize, addr: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assemble_simple() {
        let source = r#"
            READ 20
            LOAD 20
            ADD 21
            STORE 22
            WRITE 22
            HALT
        "#;

        let result = assemble(source).unwrap();
        assert_eq!(result, vec![10020, 20020, 30021, 21022, 11022, 43000]);
    }

    #[test]
    fn test_assemble_with_labels() {
        let source = r#"
        START:
            LOAD N
            BRANCHZERO END
            branch start
        END: HALT
        N:   DAT -17
        "#;

        let result = assemble(source).unwrap();
        assert_eq!(result, vec![20004, 42003, 40000, 43000, -17]);
    }

    #[test]
    fn test_assemble_aliases() {
        let result = assemble("SUB 1\nMUL 2\nDIV 3\nBRNEG 4\nHLT").unwrap();
        assert_eq!(result, vec![31001, 33002, 32003, 41004, 43000]);
    }

    #[test]
    fn test_undefined_label() {
        let err = assemble("BRANCH NOWHERE").unwrap_err();
        assert_eq!(err, AssemblerError::UndefinedLabel { line: 1, label: "NOWHERE".into() });
    }

    #[test]
    fn test_duplicate_label() {
        let err = assemble("A: HALT\nA: HALT").unwrap_err();
        assert_eq!(err, AssemblerError::DuplicateLabel { line: 2, label: "A".into() });
    }

    #[test]
    fn test_missing_operand() {
        assert!(matches!(assemble("LOAD"), Err(AssemblerError::SyntaxError { line: 1, .. })));
    }

    #[test]
    fn test_unknown_mnemonic() {
        assert!(matches!(assemble("JUMP 3"), Err(AssemblerError::UnknownMnemonic { .. })));
    }

    #[test]
    fn test_address_out_of_range() {
        assert_eq!(
            assemble("LOAD 1000"),
            Err(AssemblerError::AddressOutOfRange { line: 1, addr: 1000 })
        );
    }
}
