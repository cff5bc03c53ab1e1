//! BasicML memory subsystem.
//!
//! A fixed number of signed word cells, addressed from 0. Capacity is
//! chosen at construction (historically 100 or 250 words) and never
//! changes afterwards.

use crate::word::{encode_program, CodecError, Word, WordFormat};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default number of memory cells.
pub const DEFAULT_CAPACITY: usize = 250;

/// Word-addressed memory.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Memory {
    cells: Vec<Word>,
}

impl Memory {
    /// Create a memory with `capacity` zeroed cells.
    pub fn new(capacity: usize) -> Self {
        Self {
            cells: vec![0; capacity],
        }
    }

    /// Number of cells.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.cells.len()
    }

    /// Read a cell.
    ///
    /// # Panics
    /// Panics if `addr` is out of range. The engine validates operands
    /// before it gets here.
    #[inline]
    pub fn get(&self, addr: usize) -> Word {
        self.cells[addr]
    }

    /// Write a cell.
    ///
    /// # Panics
    /// Panics if `addr` is out of range.
    #[inline]
    pub fn set(&mut self, addr: usize, value: Word) {
        self.cells[addr] = value;
    }

    /// Bounds-checked read.
    pub fn read(&self, addr: usize) -> Result<Word, MemoryError> {
        self.cells
            .get(addr)
            .copied()
            .ok_or(MemoryError::AddressOutOfRange { addr, capacity: self.capacity() })
    }

    /// Bounds-checked write.
    pub fn write(&mut self, addr: usize, value: Word) -> Result<(), MemoryError> {
        let capacity = self.capacity();
        let cell = self
            .cells
            .get_mut(addr)
            .ok_or(MemoryError::AddressOutOfRange { addr, capacity })?;
        *cell = value;
        Ok(())
    }

    /// Clear all memory to zeros.
    pub fn clear(&mut self) {
        self.cells.fill(0);
    }

    /// Encode program lines and load them from address 0.
    ///
    /// Memory is cleared first. On error nothing is written.
    pub fn load_program<S: AsRef<str>>(&mut self, lines: &[S]) -> Result<Option<WordFormat>, LoadError> {
        let encoded = encode_program(lines)?;
        self.load_words(&encoded.words)?;
        Ok(encoded.format)
    }

    /// Load already-encoded words from address 0, clearing the rest.
    pub fn load_words(&mut self, program: &[Word]) -> Result<(), MemoryError> {
        if program.len() > self.capacity() {
            return Err(MemoryError::ProgramTooLarge {
                size: program.len(),
                available: self.capacity(),
            });
        }

        self.clear();
        self.cells[..program.len()].copy_from_slice(program);
        Ok(())
    }

    /// All cells in address order.
    pub fn words(&self) -> &[Word] {
        &self.cells
    }

    /// Dump memory contents (for debugging).
    pub fn dump(&self, start: usize, count: usize) -> Vec<(usize, Word)> {
        let end = start.saturating_add(count).min(self.capacity());
        (start.min(end)..end).map(|i| (i, self.cells[i])).collect()
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl std::fmt::Debug for Memory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let non_zero = self.cells.iter().filter(|&&cell| cell != 0).count();

        f.debug_struct("Memory")
            .field("non_zero_cells", &non_zero)
            .field("total_cells", &self.capacity())
            .finish()
    }
}

/// Errors that can occur during memory operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoryError {
    #[error("memory address {addr} out of range (0-{})", .capacity.saturating_sub(1))]
    AddressOutOfRange { addr: usize, capacity: usize },

    #[error("program size {size} exceeds memory capacity {available}")]
    ProgramTooLarge { size: usize, available: usize },
}

/// Errors raised while loading a textual program.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Memory(#[from] MemoryError),
}
