//! Textual instruction codec.
//!
//! Programs arrive as one instruction per line, `DDDD` (compact) or
//! `DDDDDD` (extended) with an optional leading `+`/`-`. The first line
//! fixes the width for the whole program. Compact lines are widened to
//! the extended layout (`0OO0AA`) before parsing, so both forms decode
//! the same way at fetch time.

use super::{Word, OPERAND_RADIX};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Digit-length class of a program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WordFormat {
    /// Four digits: two opcode digits, two operand digits.
    Compact,
    /// Six digits: three opcode digits, three operand digits.
    Extended,
}

impl WordFormat {
    /// Number of digits in the unsigned core of a line.
    pub const fn digits(self) -> usize {
        match self {
            WordFormat::Compact => 4,
            WordFormat::Extended => 6,
        }
    }

    fn from_digits(digits: usize) -> Option<Self> {
        match digits {
            4 => Some(WordFormat::Compact),
            6 => Some(WordFormat::Extended),
            _ => None,
        }
    }
}

/// Result of encoding a whole program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedProgram {
    pub words: Vec<Word>,
    /// `None` only for an empty program.
    pub format: Option<WordFormat>,
}

/// Convert program lines to words, all-or-nothing.
pub fn encode_program<S: AsRef<str>>(lines: &[S]) -> Result<EncodedProgram, CodecError> {
    let mut words = Vec::with_capacity(lines.len());
    let mut expected: Option<usize> = None;
    let mut format = None;

    for (index, raw) in lines.iter().enumerate() {
        let line = index + 1;
        let text = raw.as_ref();
        let (negative, core) = split_sign(text);

        let expected_len = *expected.get_or_insert(core.len());
        if core.len() != expected_len {
            return Err(CodecError::LengthMismatch {
                line,
                expected: expected_len,
                found: core.len(),
            });
        }

        let class = WordFormat::from_digits(core.len())
            .ok_or(CodecError::BadLength { line, found: core.len() })?;
        format = Some(class);

        if !core.bytes().all(|b| b.is_ascii_digit()) {
            return Err(CodecError::NotNumeric { line, text: text.to_string() });
        }

        let magnitude = match class {
            WordFormat::Compact => {
                let opcode: i64 = parse_digits(&core[..2]);
                let operand: i64 = parse_digits(&core[2..]);
                opcode * OPERAND_RADIX + operand
            }
            WordFormat::Extended => parse_digits(core),
        };

        words.push(if negative { -magnitude } else { magnitude });
    }

    Ok(EncodedProgram { words, format })
}

/// Render a word back into program-line form.
pub fn format_word(word: Word, format: WordFormat) -> Result<String, CodecError> {
    let sign = if word < 0 { '-' } else { '+' };
    let magnitude = word.unsigned_abs();

    match format {
        WordFormat::Extended => {
            if magnitude > 999_999 {
                return Err(CodecError::NotRepresentable { word, format });
            }
            Ok(format!("{}{:06}", sign, magnitude))
        }
        WordFormat::Compact => {
            let opcode = magnitude / OPERAND_RADIX as u64;
            let operand = magnitude % OPERAND_RADIX as u64;
            if opcode > 99 || operand > 99 {
                return Err(CodecError::NotRepresentable { word, format });
            }
            Ok(format!("{}{:02}{:02}", sign, opcode, operand))
        }
    }
}

fn split_sign(text: &str) -> (bool, &str) {
    match text.as_bytes().first() {
        Some(b'+') => (false, &text[1..]),
        Some(b'-') => (true, &text[1..]),
        _ => (false, text),
    }
}

// Callers have already checked the digits; at most six of them fit easily.
fn parse_digits(digits: &str) -> i64 {
    digits
        .bytes()
        .fold(0i64, |acc, b| acc * 10 + i64::from(b - b'0'))
}

/// Errors raised while encoding or formatting program lines.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("line {line}: length mismatch, program instructions must all be {expected} digits (found {found})")]
    LengthMismatch { line: usize, expected: usize, found: usize },

    #[error("line {line}: bad instruction length {found}, expected 4 or 6 digits with optional '+' or '-'")]
    BadLength { line: usize, found: usize },

    #[error("line {line}: '{text}' is not a number")]
    NotNumeric { line: usize, text: String },

    #[error("word {word} cannot be written in {format:?} form")]
    NotRepresentable { word: Word, format: WordFormat },
}
