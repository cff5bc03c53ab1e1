//! BasicML words.
//!
//! Every memory cell holds one signed word. Instructions are words whose
//! magnitude is laid out as `OOOAAA`: the thousands and up select the
//! opcode, the low three digits select an operand address. The sign of a
//! word never takes part in decoding.

pub mod codec;

pub use codec::{encode_program, format_word, CodecError, EncodedProgram, WordFormat};

/// One signed memory cell.
pub type Word = i64;

/// Multiplier separating the opcode digits from the operand digits.
pub const OPERAND_RADIX: i64 = 1000;

/// Extract the opcode from an instruction word.
#[inline]
pub fn opcode_of(word: Word) -> i64 {
    (word.unsigned_abs() / OPERAND_RADIX as u64) as i64
}

/// Extract the operand address from an instruction word.
#[inline]
pub fn operand_of(word: Word) -> usize {
    (word.unsigned_abs() % OPERAND_RADIX as u64) as usize
}

/// Build an instruction word from an opcode and an operand.
#[inline]
pub fn compose(opcode: i64, operand: usize) -> Word {
    opcode * OPERAND_RADIX + operand as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_uses_magnitude() {
        assert_eq!(opcode_of(10007), 10);
        assert_eq!(operand_of(10007), 7);
        assert_eq!(opcode_of(-10007), 10);
        assert_eq!(operand_of(-10007), 7);
    }

    #[test]
    fn test_compose() {
        assert_eq!(compose(43, 0), 43000);
        assert_eq!(compose(21, 249), 21249);
    }

    #[test]
    fn test_extreme_word_does_not_panic() {
        // |i64::MIN| does not fit in i64; the split must still work
        assert_eq!(opcode_of(Word::MIN), 9_223_372_036_854_775);
        assert_eq!(operand_of(Word::MIN), 808);
    }
}
