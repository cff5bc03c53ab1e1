//! # UVSim
//!
//! A virtual machine for BasicML, a small accumulator-based machine
//! language used to teach how a stored-program computer works.
//!
//! Each instruction is a signed word: the high digits select one of
//! twelve operations, the low three digits an address. Programs are
//! loaded from text, executed one instruction at a time, and may pause
//! on READ until their host supplies a line of input.

pub mod log;
pub mod word;
pub mod cpu;
pub mod asm;
pub mod config;

#[cfg(feature = "tui")]
pub mod tui;

// Re-export commonly used types
pub use word::{Word, WordFormat, CodecError};
pub use cpu::{Cpu, CpuConfig, CpuState, CpuError, Memory, Registers, Instruction, Opcode};
pub use cpu::io::{InputSource, OutputSink, ScriptedInput, StdinInput, StdoutSink};
pub use asm::{assemble, disassemble, AssemblerError, ProgramFile, load_program_file, save_program_file};
pub use config::MachineConfig;

#[cfg(feature = "tui")]
pub use tui::run_debugger;
