//! CPU emulation for the BasicML machine.
//!
//! This module implements the complete machine:
//! - word-addressed memory (250 cells by default)
//! - a single accumulator plus program counter and instruction register
//! - a 12-instruction set with single-address architecture
//! - pluggable input/output, with READ suspending on its input source

pub mod memory;
pub mod registers;
pub mod decode;
pub mod execute;
pub mod io;

pub use memory::{Memory, MemoryError, LoadError};
pub use registers::{Accumulator, Registers, Overflow};
pub use decode::{Instruction, Opcode, DecodeError};
pub use execute::{Cpu, CpuConfig, CpuError, CpuState, ConfigError, Snapshot};
pub use io::{InputSource, OutputSink, InputError};
