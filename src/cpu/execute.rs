//! CPU execution engine for BasicML.
//!
//! Implements the fetch-decode-execute cycle and all instruction behaviors.

use crate::cpu::decode::{self, DecodeError, Instruction, Opcode};
use crate::cpu::io::{InputError, InputSource, OutputSink};
use crate::cpu::memory::{LoadError, MemoryError, DEFAULT_CAPACITY};
use crate::cpu::registers::Overflow;
use crate::cpu::{Memory, Registers};
use crate::word::{operand_of, Word, WordFormat};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Line written to the output when a READ starts waiting.
pub const AWAITING_INPUT: &str = "Awaiting user input...";

/// Line written to the output by HALT.
pub const PROGRAM_FINISHED: &str = "Program finished";

/// CPU execution state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CpuState {
    /// Program counter is below the address bound.
    Running,
    /// Program counter has reached the address bound.
    Halted,
}

/// Memory size and the address bound used for operand validation.
///
/// The bound doubles as the HALT sentinel. It defaults to the capacity
/// and may be lowered, never raised past it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuConfig {
    pub capacity: usize,
    pub address_bound: usize,
}

impl CpuConfig {
    pub const fn new(capacity: usize) -> Self {
        Self {
            capacity,
            address_bound: capacity,
        }
    }

    pub const fn with_bound(mut self, address_bound: usize) -> Self {
        self.address_bound = address_bound;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        if self.address_bound == 0 || self.address_bound > self.capacity {
            return Err(ConfigError::BoundOutOfRange {
                bound: self.address_bound,
                capacity: self.capacity,
            });
        }
        Ok(())
    }
}

impl Default for CpuConfig {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// Serializable copy of the machine state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub state: CpuState,
    pub pc: usize,
    pub accumulator: Word,
    pub ir: Word,
    pub cycles: u64,
    pub memory: Vec<Word>,
}

/// The BasicML CPU.
pub struct Cpu<I, O> {
    /// CPU registers.
    pub regs: Registers,
    /// Main memory.
    pub mem: Memory,
    /// Instruction count (for profiling).
    pub cycles: u64,
    config: CpuConfig,
    input: I,
    output: O,
    /// Last executed instruction (for debugging).
    last_instr: Option<Instruction>,
}

impl<I: InputSource, O: OutputSink> Cpu<I, O> {
    /// Create a CPU with zeroed memory of the configured size.
    pub fn new(config: CpuConfig, input: I, output: O) -> Result<Self, ConfigError> {
        Self::with_memory(Memory::new(config.capacity), config.address_bound, input, output)
    }

    /// Create a CPU over an existing memory, keeping its contents.
    pub fn with_memory(mem: Memory, address_bound: usize, input: I, output: O) -> Result<Self, ConfigError> {
        let config = CpuConfig::new(mem.capacity()).with_bound(address_bound);
        config.validate()?;

        Ok(Self {
            regs: Registers::new(),
            mem,
            cycles: 0,
            config,
            input,
            output,
            last_instr: None,
        })
    }

    /// Reset registers and clear memory.
    pub fn reset(&mut self) {
        self.restart();
        self.mem.clear();
    }

    /// Reset registers, keeping memory as it is.
    pub fn restart(&mut self) {
        self.regs.reset();
        self.cycles = 0;
        self.last_instr = None;
    }

    /// Load program lines from address 0 and restart.
    ///
    /// A rejected program leaves both memory and registers untouched.
    pub fn load_program<S: AsRef<str>>(&mut self, lines: &[S]) -> Result<Option<WordFormat>, LoadError> {
        let format = self.mem.load_program(lines)?;
        self.restart();
        Ok(format)
    }

    /// Execute a single instruction.
    ///
    /// Returns the instruction that was executed, or an error. READ awaits
    /// the input source; every other instruction completes immediately.
    pub async fn step(&mut self) -> Result<Instruction, CpuError> {
        if !self.is_running() {
            return Err(CpuError::NotRunning(self.state()));
        }

        // Fetch
        let word = self.mem.read(self.regs.pc)?;
        self.regs.ir = word;

        // Validate the operand before anything else looks at it
        let operand = operand_of(word);
        if operand >= self.config.address_bound {
            return Err(CpuError::InvalidAddress {
                addr: operand,
                bound: self.config.address_bound,
            });
        }

        // Decode
        let instr = decode::decode(word)?;

        // Execute
        self.execute(instr).await?;

        if !instr.opcode.is_control() {
            self.regs.advance_pc();
        }

        self.cycles += 1;
        self.last_instr = Some(instr);

        Ok(instr)
    }

    /// Run until halt or error.
    ///
    /// Returns the number of instructions executed.
    pub async fn run(&mut self) -> Result<u64, CpuError> {
        let start_cycles = self.cycles;

        while self.is_running() {
            self.step().await?;
        }

        Ok(self.cycles - start_cycles)
    }

    /// Run for at most `max_cycles` instructions.
    pub async fn run_limited(&mut self, max_cycles: u64) -> Result<u64, CpuError> {
        let start_cycles = self.cycles;
        let limit = self.cycles.saturating_add(max_cycles);

        while self.is_running() && self.cycles < limit {
            self.step().await?;
        }

        Ok(self.cycles - start_cycles)
    }

    /// Execute a decoded instruction.
    async fn execute(&mut self, instr: Instruction) -> Result<(), CpuError> {
        let addr = instr.operand;

        match instr.opcode {
            // ==================== I/O ====================

            Opcode::Read => {
                self.output.write_line(AWAITING_INPUT);
                let line = self.input.read_line().await?;
                let value = line
                    .trim()
                    .parse::<Word>()
                    .map_err(|_| CpuError::InvalidInput(line.clone()))?;
                self.mem.set(addr, value);
            }

            Opcode::Write => {
                let value = self.mem.get(addr);
                self.output.write_line(&format!("Output: {}", value));
            }

            // ==================== Load/Store ====================

            Opcode::Load => {
                let value = self.mem.get(addr);
                self.regs.accumulator.set(value);
            }

            Opcode::Store => {
                let value = self.regs.accumulator.value();
                self.mem.set(addr, value);
            }

            // ==================== Arithmetic ====================

            Opcode::Add => {
                let value = self.mem.get(addr);
                self.regs.accumulator.add(value)?;
            }

            Opcode::Subtract => {
                let value = self.mem.get(addr);
                self.regs.accumulator.subtract(value)?;
            }

            Opcode::Divide => {
                let divisor = self.mem.get(addr);
                if divisor == 0 {
                    return Err(CpuError::DivisionByZero);
                }
                // Truncates toward zero; only MIN / -1 can overflow
                let quotient = self
                    .regs
                    .accumulator
                    .value()
                    .checked_div(divisor)
                    .ok_or(Overflow)?;
                self.regs.accumulator.set(quotient);
            }

            Opcode::Multiply => {
                let value = self.mem.get(addr);
                let product = self
                    .regs
                    .accumulator
                    .value()
                    .checked_mul(value)
                    .ok_or(Overflow)?;
                self.regs.accumulator.set(product);
            }

            // ==================== Control ====================

            Opcode::Branch => {
                self.regs.jump(addr);
            }

            // A branch not taken leaves the counter where it is.
            Opcode::BranchNeg => {
                if self.regs.accumulator.value() < 0 {
                    self.regs.jump(addr);
                }
            }

            Opcode::BranchZero => {
                if self.regs.accumulator.value() == 0 {
                    self.regs.jump(addr);
                }
            }

            Opcode::Halt => {
                self.regs.jump(self.config.address_bound);
                self.output.write_line(PROGRAM_FINISHED);
            }
        }

        Ok(())
    }

    /// Capture registers and memory.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            state: self.state(),
            pc: self.regs.pc,
            accumulator: self.regs.accumulator.value(),
            ir: self.regs.ir,
            cycles: self.cycles,
            memory: self.mem.words().to_vec(),
        }
    }
}

impl<I, O> Cpu<I, O> {
    pub fn config(&self) -> CpuConfig {
        self.config
    }

    /// Maximum valid address + 1; also the HALT sentinel.
    pub fn address_bound(&self) -> usize {
        self.config.address_bound
    }

    pub fn state(&self) -> CpuState {
        if self.regs.pc < self.config.address_bound {
            CpuState::Running
        } else {
            CpuState::Halted
        }
    }

    /// Get the last executed instruction.
    pub fn last_instruction(&self) -> Option<Instruction> {
        self.last_instr
    }

    /// Check if the CPU is halted.
    pub fn is_halted(&self) -> bool {
        self.state() == CpuState::Halted
    }

    /// Check if the CPU is running.
    pub fn is_running(&self) -> bool {
        self.state() == CpuState::Running
    }

    pub fn input_mut(&mut self) -> &mut I {
        &mut self.input
    }

    pub fn output(&self) -> &O {
        &self.output
    }

    pub fn output_mut(&mut self) -> &mut O {
        &mut self.output
    }

    /// Tear the CPU down, handing back its memory and I/O.
    pub fn into_parts(self) -> (Memory, I, O) {
        (self.mem, self.input, self.output)
    }
}

impl<I, O> std::fmt::Debug for Cpu<I, O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cpu")
            .field("state", &self.state())
            .field("cycles", &self.cycles)
            .field("regs", &self.regs)
            .field("config", &self.config)
            .finish()
    }
}

/// Errors that can occur during CPU execution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CpuError {
    #[error("CPU not running: {0:?}")]
    NotRunning(CpuState),

    #[error("invalid address '{addr}', expected an address less than {bound}")]
    InvalidAddress { addr: usize, bound: usize },

    #[error(transparent)]
    InvalidInstruction(#[from] DecodeError),

    #[error("invalid input '{0}', expected an integer")]
    InvalidInput(String),

    #[error("input error: {0}")]
    Input(#[from] InputError),

    #[error("memory error: {0}")]
    Memory(#[from] MemoryError),

    #[error("division by zero")]
    DivisionByZero,

    #[error("arithmetic overflow")]
    Overflow(#[from] Overflow),
}

/// Rejected machine configurations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("memory capacity must be at least one word")]
    ZeroCapacity,

    #[error("address bound {bound} must be between 1 and the memory capacity {capacity}")]
    BoundOutOfRange { bound: usize, capacity: usize },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::io::{channel_input, ScriptedInput};

    type TestCpu = Cpu<ScriptedInput, Vec<String>>;

    fn machine(program: &[&str], input: &[&str]) -> TestCpu {
        let mut cpu = Cpu::new(
            CpuConfig::default(),
            ScriptedInput::new(input.iter().copied()),
            Vec::new(),
        )
        .unwrap();
        cpu.load_program(program).unwrap();
        cpu
    }

    #[tokio::test]
    async fn test_cpu_halt() {
        let mut cpu = machine(&["+4300"], &[]);

        let executed = cpu.run().await.unwrap();

        assert_eq!(executed, 1);
        assert!(cpu.is_halted());
        assert_eq!(cpu.regs.pc, 250);
        assert_eq!(cpu.output(), &vec![PROGRAM_FINISHED.to_string()]);
        assert_eq!(cpu.step().await, Err(CpuError::NotRunning(CpuState::Halted)));
    }

    #[tokio::test]
    async fn test_halt_uses_configured_bound() {
        let config = CpuConfig::new(250).with_bound(100);
        let mut cpu = Cpu::new(config, ScriptedInput::default(), Vec::<String>::new()).unwrap();
        cpu.load_program(&["+4399"]).unwrap();

        cpu.step().await.unwrap();
        assert_eq!(cpu.regs.pc, 100);
        assert!(cpu.is_halted());
    }

    #[tokio::test]
    async fn test_cpu_load_store() {
        let mut cpu = machine(&["+2010", "+2111"], &[]);
        cpu.mem.set(10, -9007);

        cpu.step().await.unwrap();
        cpu.step().await.unwrap();

        assert_eq!(cpu.mem.get(11), -9007);
        assert_eq!(cpu.regs.pc, 2);
    }

    #[tokio::test]
    async fn test_cpu_arithmetic() {
        let mut cpu = machine(&["+3156"], &[]);
        cpu.regs.accumulator.set(10045);
        cpu.mem.set(56, 1234);

        cpu.step().await.unwrap();
        assert_eq!(cpu.regs.accumulator.value(), 8811);

        let mut cpu = machine(&["+2010", "+3011", "+3311", "+3212"], &[]);
        cpu.mem.set(10, 10);
        cpu.mem.set(11, 5);
        cpu.mem.set(12, -4);
        cpu.run_limited(4).await.unwrap();

        // (10 + 5) * 5 / -4, truncated toward zero
        assert_eq!(cpu.regs.accumulator.value(), -18);
    }

    #[tokio::test]
    async fn test_divide_by_zero() {
        let mut cpu = machine(&["+3220"], &[]);
        cpu.regs.accumulator.set(7);

        assert_eq!(cpu.step().await, Err(CpuError::DivisionByZero));
        assert_eq!(cpu.regs.accumulator.value(), 7);
        assert_eq!(cpu.regs.pc, 0);
    }

    #[tokio::test]
    async fn test_multiply_overflow() {
        let mut cpu = machine(&["+3320"], &[]);
        cpu.regs.accumulator.set(Word::MAX);
        cpu.mem.set(20, 2);

        assert_eq!(cpu.step().await, Err(CpuError::Overflow(Overflow)));
        assert_eq!(cpu.regs.accumulator.value(), Word::MAX);
    }

    #[tokio::test]
    async fn test_branch_does_not_increment() {
        let mut cpu = machine(&["+4005"], &[]);

        cpu.step().await.unwrap();
        assert_eq!(cpu.regs.pc, 5);
    }

    #[tokio::test]
    async fn test_branch_neg() {
        let mut cpu = machine(&["+4107"], &[]);
        cpu.regs.accumulator.set(-5);
        cpu.step().await.unwrap();
        assert_eq!(cpu.regs.pc, 7);

        let mut cpu = machine(&["+4107"], &[]);
        cpu.regs.accumulator.set(10);
        cpu.step().await.unwrap();
        assert_eq!(cpu.regs.pc, 0);
    }

    #[tokio::test]
    async fn test_branch_zero() {
        let mut cpu = machine(&["+4207"], &[]);
        cpu.step().await.unwrap();
        assert_eq!(cpu.regs.pc, 7);

        let mut cpu = machine(&["+4207"], &[]);
        cpu.regs.accumulator.set(-1);
        cpu.step().await.unwrap();
        assert_eq!(cpu.regs.pc, 0);
    }

    #[tokio::test]
    async fn test_untaken_branch_refetches_same_address() {
        let mut cpu = machine(&["+4207", "+4300"], &[]);
        cpu.regs.accumulator.set(1);

        let executed = cpu.run_limited(5).await.unwrap();

        assert_eq!(executed, 5);
        assert_eq!(cpu.regs.pc, 0);
        assert!(cpu.is_running());
    }

    #[tokio::test]
    async fn test_invalid_address_has_no_effect() {
        let mut cpu = machine(&["+020250"], &[]);
        cpu.regs.accumulator.set(3);

        let err = cpu.step().await.unwrap_err();

        assert_eq!(err, CpuError::InvalidAddress { addr: 250, bound: 250 });
        assert_eq!(cpu.regs.accumulator.value(), 3);
        assert_eq!(cpu.regs.pc, 0);
        assert_eq!(cpu.cycles, 0);
    }

    #[tokio::test]
    async fn test_invalid_address_checked_for_control() {
        let mut cpu = machine(&["+040300"], &[]);

        let err = cpu.step().await.unwrap_err();
        assert_eq!(err, CpuError::InvalidAddress { addr: 300, bound: 250 });
        assert_eq!(cpu.regs.pc, 0);
    }

    #[tokio::test]
    async fn test_lowered_bound_rejects_operand() {
        let config = CpuConfig::new(250).with_bound(100);
        let mut cpu = Cpu::new(config, ScriptedInput::default(), Vec::<String>::new()).unwrap();
        cpu.load_program(&["+020150"]).unwrap();

        assert_eq!(
            cpu.step().await,
            Err(CpuError::InvalidAddress { addr: 150, bound: 100 })
        );
    }

    #[tokio::test]
    async fn test_invalid_instruction() {
        let mut cpu = machine(&["+9901"], &[]);
        cpu.regs.accumulator.set(12);

        let err = cpu.step().await.unwrap_err();

        assert_eq!(err, CpuError::InvalidInstruction(DecodeError::InvalidOpcode(99)));
        assert_eq!(cpu.regs.accumulator.value(), 12);
        assert_eq!(cpu.mem.get(1), 0);
    }

    #[tokio::test]
    async fn test_read() {
        let mut cpu = machine(&["+010200"], &["5"]);

        cpu.step().await.unwrap();

        assert_eq!(cpu.mem.get(200), 5);
        assert_eq!(cpu.regs.pc, 1);
        assert_eq!(cpu.output(), &vec![AWAITING_INPUT.to_string()]);
    }

    #[tokio::test]
    async fn test_read_accepts_sign_and_whitespace() {
        let mut cpu = machine(&["+1010", "+1011"], &[" -12 ", "+7"]);

        cpu.run_limited(2).await.unwrap();

        assert_eq!(cpu.mem.get(10), -12);
        assert_eq!(cpu.mem.get(11), 7);
    }

    #[tokio::test]
    async fn test_invalid_read() {
        let mut cpu = machine(&["+010200"], &["five"]);
        cpu.mem.set(200, 17);

        let err = cpu.step().await.unwrap_err();

        assert_eq!(err, CpuError::InvalidInput("five".into()));
        assert_eq!(cpu.mem.get(200), 17);
        assert_eq!(cpu.regs.pc, 0);
    }

    #[tokio::test]
    async fn test_read_without_input() {
        let mut cpu = machine(&["+1010"], &[]);

        assert_eq!(cpu.step().await, Err(CpuError::Input(InputError::Exhausted)));
    }

    #[tokio::test]
    async fn test_write() {
        let mut cpu = machine(&["+1107"], &[]);
        cpu.mem.set(7, 9007);

        cpu.step().await.unwrap();

        assert_eq!(cpu.output(), &vec!["Output: 9007".to_string()]);
    }

    #[tokio::test]
    async fn test_run_sum_program() {
        let program = ["+1020", "+1021", "+2020", "+3021", "+2122", "+1122", "+4300"];
        let mut cpu = machine(&program, &["3", "4"]);

        let executed = cpu.run().await.unwrap();

        assert_eq!(executed, 7);
        assert_eq!(
            cpu.output(),
            &vec![
                AWAITING_INPUT.to_string(),
                AWAITING_INPUT.to_string(),
                "Output: 7".to_string(),
                PROGRAM_FINISHED.to_string(),
            ]
        );
        assert_eq!(cpu.last_instruction(), Some(Instruction::new(Opcode::Halt, 0)));
    }

    #[tokio::test]
    async fn test_run_stops_on_error() {
        let mut cpu = machine(&["+2010", "+0000", "+4300"], &[]);

        let err = cpu.run().await.unwrap_err();

        assert_eq!(err, CpuError::InvalidInstruction(DecodeError::InvalidOpcode(0)));
        assert_eq!(cpu.regs.pc, 1);
        assert_eq!(cpu.cycles, 1);
    }

    #[tokio::test]
    async fn test_read_suspends_until_fulfilled() {
        let (input, mut requests) = channel_input();
        let mut cpu = Cpu::new(CpuConfig::default(), input, Vec::<String>::new()).unwrap();
        cpu.load_program(&["+1050", "+4300"]).unwrap();

        let task = tokio::spawn(async move {
            let result = cpu.run().await;
            (cpu, result)
        });

        let request = requests.recv().await.unwrap();
        assert!(!task.is_finished());
        request.fulfill("123").unwrap();

        let (cpu, result) = task.await.unwrap();
        assert_eq!(result, Ok(2));
        assert_eq!(cpu.mem.get(50), 123);
    }

    #[tokio::test]
    async fn test_restart_keeps_memory() {
        let mut cpu = machine(&["+2005", "+4300"], &[]);
        cpu.mem.set(5, 9);
        cpu.run().await.unwrap();

        cpu.restart();

        assert!(cpu.is_running());
        assert_eq!(cpu.regs.accumulator.value(), 0);
        assert_eq!(cpu.mem.get(0), 20005);
        assert_eq!(cpu.mem.get(5), 9);
    }

    #[tokio::test]
    async fn test_rejected_reload_keeps_state() {
        let mut cpu = machine(&["+2005", "+4300"], &[]);
        cpu.step().await.unwrap();

        assert!(cpu.load_program(&["+2005", "+020005"]).is_err());
        assert_eq!(cpu.regs.pc, 1);
        assert_eq!(cpu.mem.get(0), 20005);
    }

    #[test]
    fn test_config_validation() {
        assert!(CpuConfig::default().validate().is_ok());
        assert_eq!(CpuConfig::new(0).validate(), Err(ConfigError::ZeroCapacity));
        assert_eq!(
            CpuConfig::new(100).with_bound(250).validate(),
            Err(ConfigError::BoundOutOfRange { bound: 250, capacity: 100 })
        );
    }

    #[tokio::test]
    async fn test_snapshot() {
        let mut cpu = machine(&["+2002", "+4300", "+0042"], &[]);
        cpu.run().await.unwrap();

        let snapshot = cpu.snapshot();
        assert_eq!(snapshot.state, CpuState::Halted);
        assert_eq!(snapshot.accumulator, 42);
        assert_eq!(snapshot.cycles, 2);
        assert_eq!(snapshot.memory.len(), 250);
        assert_eq!(snapshot.memory[2], 42);
    }
}
