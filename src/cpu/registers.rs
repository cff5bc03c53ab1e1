//! BasicML registers.
//!
//! The machine has a single arithmetic register, the accumulator, plus
//! the program counter and the instruction register used by the
//! fetch-decode-execute cycle.

use crate::word::Word;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Raised when accumulator arithmetic leaves the `i64` range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("accumulator overflow")]
pub struct Overflow;

/// The arithmetic register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Accumulator {
    value: Word,
}

impl Accumulator {
    pub const fn new() -> Self {
        Self { value: 0 }
    }

    #[inline]
    pub fn value(&self) -> Word {
        self.value
    }

    #[inline]
    pub fn set(&mut self, value: Word) {
        self.value = value;
    }

    /// `value += operand`. Leaves the value untouched on overflow.
    pub fn add(&mut self, operand: Word) -> Result<(), Overflow> {
        self.value = self.value.checked_add(operand).ok_or(Overflow)?;
        Ok(())
    }

    /// `value -= operand`. Leaves the value untouched on overflow.
    pub fn subtract(&mut self, operand: Word) -> Result<(), Overflow> {
        self.value = self.value.checked_sub(operand).ok_or(Overflow)?;
        Ok(())
    }
}

/// The BasicML register file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Registers {
    pub accumulator: Accumulator,

    /// Address of the next instruction to fetch.
    pub pc: usize,

    /// Word most recently fetched.
    pub ir: Word,
}

impl Registers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Increment the program counter by 1.
    /// Returns the old value.
    pub fn advance_pc(&mut self) -> usize {
        let old = self.pc;
        self.pc += 1;
        old
    }

    /// Set the program counter to an absolute address.
    pub fn jump(&mut self, addr: usize) {
        self.pc = addr;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accumulator_add_subtract() {
        let mut acc = Accumulator::new();
        acc.set(10045);
        acc.subtract(1234).unwrap();
        assert_eq!(acc.value(), 8811);

        acc.add(-8812).unwrap();
        assert_eq!(acc.value(), -1);
    }

    #[test]
    fn test_accumulator_overflow_keeps_value() {
        let mut acc = Accumulator::new();
        acc.set(Word::MAX);

        assert_eq!(acc.add(1), Err(Overflow));
        assert_eq!(acc.value(), Word::MAX);

        acc.set(Word::MIN);
        assert_eq!(acc.subtract(1), Err(Overflow));
        assert_eq!(acc.value(), Word::MIN);
    }

    #[test]
    fn test_advance_pc() {
        let mut regs = Registers::new();
        regs.pc = 10;

        let old = regs.advance_pc();
        assert_eq!(old, 10);
        assert_eq!(regs.pc, 11);

        regs.jump(3);
        assert_eq!(regs.pc, 3);
    }
}
