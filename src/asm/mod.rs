//! Program files, assembler and disassembler for BasicML.
//!
//! This module provides:
//! - Reading and writing program files (one signed word per line)
//! - A small two-pass assembler (mnemonics → words)
//! - A disassembler (words → readable listing)

pub mod assembler;
pub mod disasm;
pub mod program;

pub use assembler::{assemble, AssemblerError};
pub use disasm::{disassemble, disassemble_word};
pub use program::{load_program_file, save_program_file, ProgramFile, ProgramFileError};
