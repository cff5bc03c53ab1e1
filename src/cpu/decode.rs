//! Instruction decoder for BasicML.
//!
//! A word decodes by magnitude into `opcode = |w| / 1000` and
//! `operand = |w| % 1000`. The opcode set is closed; anything outside it
//! is a decode error rather than a silent no-op.

use crate::word::{compose, opcode_of, operand_of, Word};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// BasicML operation codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Opcode {
    // ==================== I/O ====================
    /// Read a line of input into memory: `[addr] := input`
    Read,
    /// Write a memory word to the output: `output := [addr]`
    Write,

    // ==================== Load/Store ====================
    /// `A := [addr]`
    Load,
    /// `[addr] := A`
    Store,

    // ==================== Arithmetic ====================
    /// `A := A + [addr]`
    Add,
    /// `A := A - [addr]`
    Subtract,
    /// `A := A / [addr]`
    Divide,
    /// `A := A * [addr]`
    Multiply,

    // ==================== Control ====================
    /// `PC := addr`
    Branch,
    /// `if A < 0 then PC := addr`
    BranchNeg,
    /// `if A = 0 then PC := addr`
    BranchZero,
    /// Stop the program.
    Halt,
}

impl Opcode {
    pub const ALL: [Opcode; 12] = [
        Opcode::Read,
        Opcode::Write,
        Opcode::Load,
        Opcode::Store,
        Opcode::Add,
        Opcode::Subtract,
        Opcode::Divide,
        Opcode::Multiply,
        Opcode::Branch,
        Opcode::BranchNeg,
        Opcode::BranchZero,
        Opcode::Halt,
    ];

    /// Look up an opcode by its numeric code.
    pub fn from_code(code: i64) -> Option<Self> {
        Some(match code {
            10 => Opcode::Read,
            11 => Opcode::Write,
            20 => Opcode::Load,
            21 => Opcode::Store,
            30 => Opcode::Add,
            31 => Opcode::Subtract,
            32 => Opcode::Divide,
            33 => Opcode::Multiply,
            40 => Opcode::Branch,
            41 => Opcode::BranchNeg,
            42 => Opcode::BranchZero,
            43 => Opcode::Halt,
            _ => return None,
        })
    }

    pub const fn code(self) -> i64 {
        match self {
            Opcode::Read => 10,
            Opcode::Write => 11,
            Opcode::Load => 20,
            Opcode::Store => 21,
            Opcode::Add => 30,
            Opcode::Subtract => 31,
            Opcode::Divide => 32,
            Opcode::Multiply => 33,
            Opcode::Branch => 40,
            Opcode::BranchNeg => 41,
            Opcode::BranchZero => 42,
            Opcode::Halt => 43,
        }
    }

    pub const fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Read => "READ",
            Opcode::Write => "WRITE",
            Opcode::Load => "LOAD",
            Opcode::Store => "STORE",
            Opcode::Add => "ADD",
            Opcode::Subtract => "SUBTRACT",
            Opcode::Divide => "DIVIDE",
            Opcode::Multiply => "MULTIPLY",
            Opcode::Branch => "BRANCH",
            Opcode::BranchNeg => "BRANCHNEG",
            Opcode::BranchZero => "BRANCHZERO",
            Opcode::Halt => "HALT",
        }
    }

    /// Case-insensitive mnemonic lookup.
    pub fn from_mnemonic(text: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|op| op.mnemonic().eq_ignore_ascii_case(text))
    }

    /// Control instructions set the program counter themselves and are
    /// never followed by an automatic increment.
    pub const fn is_control(self) -> bool {
        matches!(
            self,
            Opcode::Branch | Opcode::BranchNeg | Opcode::BranchZero | Opcode::Halt
        )
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

/// A decoded instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    pub opcode: Opcode,
    pub operand: usize,
}

impl Instruction {
    pub const fn new(opcode: Opcode, operand: usize) -> Self {
        Self { opcode, operand }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.opcode {
            Opcode::Halt => write!(f, "HALT"),
            op => write!(f, "{} {:03}", op, self.operand),
        }
    }
}

/// Decode a word into an instruction.
pub fn decode(word: Word) -> Result<Instruction, DecodeError> {
    let code = opcode_of(word);
    let opcode = Opcode::from_code(code).ok_or(DecodeError::InvalidOpcode(code))?;
    Ok(Instruction::new(opcode, operand_of(word)))
}

/// Encode an instruction back to a (positive) word.
pub fn encode(instr: &Instruction) -> Word {
    compose(instr.opcode.code(), instr.operand)
}

/// Errors that can occur during instruction decoding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("invalid instruction: opcode {0} is not defined")]
    InvalidOpcode(i64),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_halt() {
        let instr = decode(43000).unwrap();
        assert_eq!(instr, Instruction::new(Opcode::Halt, 0));
    }

    #[test]
    fn test_decode_ignores_sign() {
        assert_eq!(decode(-20056).unwrap(), Instruction::new(Opcode::Load, 56));
    }

    #[test]
    fn test_decode_unknown_opcode() {
        assert_eq!(decode(99001), Err(DecodeError::InvalidOpcode(99)));
        assert_eq!(decode(0), Err(DecodeError::InvalidOpcode(0)));
    }

    #[test]
    fn test_every_opcode_survives_encoding() {
        for op in Opcode::ALL {
            assert_eq!(Opcode::from_code(op.code()), Some(op));
            assert_eq!(Opcode::from_mnemonic(&op.mnemonic().to_lowercase()), Some(op));

            let instr = Instruction::new(op, 249);
            assert_eq!(decode(encode(&instr)).unwrap(), instr);
        }
    }

    #[test]
    fn test_control_group() {
        let control: Vec<_> = Opcode::ALL.into_iter().filter(|op| op.is_control()).collect();
        assert_eq!(
            control,
            vec![Opcode::Branch, Opcode::BranchNeg, Opcode::BranchZero, Opcode::Halt]
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(Instruction::new(Opcode::Write, 7).to_string(), "WRITE 007");
        assert_eq!(Instruction::new(Opcode::Halt, 12).to_string(), "HALT");
    }
}
