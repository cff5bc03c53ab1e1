//! Disassembler for BasicML programs.
//!
//! Converts words back to readable mnemonics. Words that do not decode
//! are shown as data.

use crate::cpu::decode::decode;
use crate::word::Word;

/// Disassemble a single word to text.
pub fn disassemble_word(word: Word) -> String {
    match decode(word) {
        Ok(instr) => instr.to_string(),
        Err(_) => format!("DAT {}", word),
    }
}

/// Disassemble a slice of words into a numbered listing.
pub fn disassemble(words: &[Word]) -> String {
    let mut output = String::new();
    output.push_str("; BasicML Disassembly\n");
    output.push_str("; ------------------\n\n");

    for (addr, &word) in words.iter().enumerate() {
        output.push_str(&format!("{:03}: {:<16} ; {:+07}\n", addr, disassemble_word(word), word));
    }

    output
}
