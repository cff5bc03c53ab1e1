//! BasicML program files.
//!
//! A program file is plain text:
//! - One instruction per line, `DDDD` or `DDDDDD` with optional sign
//! - Surrounding whitespace is ignored
//! - Blank lines and lines starting with `;` or `#` are skipped
//! - Anything after a `;` on an instruction line is a comment

use crate::word::{encode_program, format_word, CodecError, EncodedProgram, Word, WordFormat};
use std::io::Write;
use std::path::Path;
use thiserror::Error;

/// A loaded program file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgramFile {
    /// Instruction lines, stripped of whitespace and comments.
    pub lines: Vec<String>,
}

impl ProgramFile {
    /// Parse program text.
    pub fn parse(source: &str) -> Self {
        let lines = source
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with(';') && !line.starts_with('#'))
            .map(|line| match line.find(';') {
                Some(idx) => line[..idx].trim_end().to_string(),
                None => line.to_string(),
            })
            .collect();

        Self { lines }
    }

    /// Get the number of instructions.
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Run the lines through the word codec.
    pub fn encode(&self) -> Result<EncodedProgram, CodecError> {
        encode_program(&self.lines)
    }
}

/// Load a program file from disk.
pub fn load_program_file<P: AsRef<Path>>(path: P) -> Result<ProgramFile, ProgramFileError> {
    let source = std::fs::read_to_string(path.as_ref())
        .map_err(|e| ProgramFileError::IoError(e.to_string()))?;
    Ok(ProgramFile::parse(&source))
}

/// Save words to disk, one formatted line each.
pub fn save_program_file<P: AsRef<Path>>(
    path: P,
    words: &[Word],
    format: WordFormat,
) -> Result<(), ProgramFileError> {
    // Format everything first so a bad word leaves no half-written file
    let lines = words
        .iter()
        .map(|&word| format_word(word, format))
        .collect::<Result<Vec<_>, _>>()?;

    let mut file = std::fs::File::create(path.as_ref())
        .map_err(|e| ProgramFileError::IoError(e.to_string()))?;

    for line in lines {
        writeln!(file, "{}", line).map_err(|e| ProgramFileError::IoError(e.to_string()))?;
    }

    Ok(())
}

/// The narrowest format every word fits in.
pub fn preferred_format(words: &[Word]) -> WordFormat {
    if words.iter().all(|&w| format_word(w, WordFormat::Compact).is_ok()) {
        WordFormat::Compact
    } else {
        WordFormat::Extended
    }
}

/// Errors that can occur during program file operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProgramFileError {
    #[error("I/O error: {0}")]
    IoError(String),

    #[error(transparent)]
    Codec(#[from] CodecError),
}
