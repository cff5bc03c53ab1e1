//! UVSim - CLI Entry Point
//!
//! Commands:
//! - `uvsim run <program>` - Run a program file or ASM source
//! - `uvsim debug <program>` - Interactive debugger
//! - `uvsim asm <source>` - Assemble to a program file
//! - `uvsim disasm <program>` - Disassemble a program file
//! - `uvsim check <program>` - Validate a program without running it

use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use uvsim::asm::program::preferred_format;
use uvsim::cpu::io::{InputSource, OutputSink};
use uvsim::{error, info, warn};
use uvsim::{
    assemble, disassemble, load_program_file, save_program_file, Cpu, CpuConfig, MachineConfig,
    ScriptedInput, StdinInput, StdoutSink, Word, WordFormat,
};

#[derive(Parser)]
#[command(name = "uvsim")]
#[command(version = "0.1.0")]
#[command(about = "A virtual machine for the BasicML accumulator machine language")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a program until it halts
    Run {
        /// Path to the program file or ASM source to execute
        program: PathBuf,
        #[command(flatten)]
        machine: MachineArgs,
        /// Answer READ instructions from these lines instead of stdin
        #[arg(short, long = "input", value_name = "LINE")]
        input: Vec<String>,
        /// Write the final machine state as JSON
        #[arg(long, value_name = "FILE")]
        dump: Option<PathBuf>,
    },
    /// Interactive debugger
    Debug {
        /// Path to the program file or ASM source to debug
        program: PathBuf,
        #[command(flatten)]
        machine: MachineArgs,
    },
    /// Assemble source to a program file
    Asm {
        /// Path to the source file
        source: PathBuf,
        /// Output program file
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Always write six-digit words
        #[arg(long)]
        extended: bool,
    },
    /// Disassemble a program file to readable text
    Disasm {
        /// Path to the program file
        program: PathBuf,
    },
    /// Check that a program loads without running it
    Check {
        /// Path to the program file or ASM source
        program: PathBuf,
        #[command(flatten)]
        machine: MachineArgs,
    },
}

/// Machine settings shared by the commands that build a CPU.
#[derive(Args)]
struct MachineArgs {
    /// JSON machine configuration; flags override its values
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Memory capacity in words
    #[arg(short, long)]
    memory: Option<usize>,
    /// Address bound used for operand checks and as the HALT target
    #[arg(short, long)]
    bound: Option<usize>,
    /// Maximum number of instructions to execute
    #[arg(long)]
    max_cycles: Option<u64>,
    /// Show trace output
    #[arg(short, long)]
    trace: bool,
}

impl MachineArgs {
    fn resolve(&self) -> Result<MachineConfig, String> {
        let mut config = match &self.config {
            Some(path) => MachineConfig::load(path).map_err(|e| e.to_string())?,
            None => MachineConfig::default(),
        };

        if let Some(memory) = self.memory {
            config.memory = memory;
        }
        if let Some(bound) = self.bound {
            config.address_bound = Some(bound);
        }
        if let Some(max_cycles) = self.max_cycles {
            config.max_cycles = max_cycles;
        }
        config.trace |= self.trace;

        config.cpu_config().map_err(|e| e.to_string())?;
        Ok(config)
    }
}

/// A program as read from disk.
enum Program {
    /// Program file lines, still to go through the word codec.
    Lines(Vec<String>),
    /// Words produced by the assembler.
    Words(Vec<Word>),
}

impl Program {
    fn len(&self) -> usize {
        match self {
            Program::Lines(lines) => lines.len(),
            Program::Words(words) => words.len(),
        }
    }

    fn into_words(self) -> Result<Vec<Word>, String> {
        match self {
            Program::Lines(lines) => uvsim::word::encode_program(&lines[..])
                .map(|encoded| encoded.words)
                .map_err(|e| e.to_string()),
            Program::Words(words) => Ok(words),
        }
    }
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Some(Commands::Run { program, machine, input, dump }) => {
            run_program(&program, &machine, input, dump.as_deref())
        }
        Some(Commands::Debug { program, machine }) => debug_program(&program, &machine),
        Some(Commands::Asm { source, output, extended }) => assemble_file(&source, output, extended),
        Some(Commands::Disasm { program }) => disassemble_file(&program),
        Some(Commands::Check { program, machine }) => check_program(&program, &machine),
        None => {
            println!("UVSim v0.1.0");
            println!("A BasicML virtual machine");
            println!();
            println!("Use --help for available commands");
            Ok(())
        }
    };

    if let Err(e) = result {
        error!("{}", e);
        std::process::exit(1);
    }
}

/// Read a program, assembling it first when it is ASM source.
fn read_program(path: &Path) -> Result<Program, String> {
    if path.extension().is_some_and(|ext| ext == "asm") {
        let source = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read file: {}", e))?;
        let words = assemble(&source).map_err(|e| format!("Assembly error: {}", e))?;
        info!("📝 Assembled {} words from {}", words.len(), path.display());
        Ok(Program::Words(words))
    } else {
        let file = load_program_file(path)
            .map_err(|e| format!("Failed to load program: {}", e))?;
        info!("📂 Loaded {} lines from {}", file.len(), path.display());
        Ok(Program::Lines(file.lines))
    }
}

/// Build a CPU over the configured memory and load `program` into it.
fn build_cpu<I, O>(program: Program, config: CpuConfig, input: I, output: O) -> Result<Cpu<I, O>, String>
where
    I: InputSource,
    O: OutputSink,
{
    let mut cpu = Cpu::new(config, input, output).map_err(|e| e.to_string())?;
    match program {
        Program::Lines(lines) => {
            let format = cpu
                .load_program(&lines[..])
                .map_err(|e| format!("Failed to load program: {}", e))?;
            if let Some(format) = format {
                info!("Word format: {:?} ({} digits)", format, format.digits());
            }
        }
        Program::Words(words) => {
            cpu.mem
                .load_words(&words)
                .map_err(|e| format!("Failed to load program: {}", e))?;
            cpu.restart();
        }
    }
    Ok(cpu)
}

fn run_program(path: &Path, machine: &MachineArgs, input: Vec<String>, dump: Option<&Path>) -> Result<(), String> {
    let config = machine.resolve()?;
    let cpu_config = config.cpu_config().map_err(|e| e.to_string())?;

    info!("🔧 Running: {}", path.display());

    let program = read_program(path)?;
    if program.len() == 0 {
        return Err("No instructions to execute".into());
    }

    let source: Box<dyn InputSource> = if input.is_empty() {
        Box::new(StdinInput::new())
    } else {
        Box::new(ScriptedInput::new(input))
    };
    let mut cpu = build_cpu(program, cpu_config, source, StdoutSink)?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| e.to_string())?;

    let max_cycles = config.max_cycles;
    let trace = config.trace;
    let outcome = runtime.block_on(async {
        while cpu.is_running() && cpu.cycles < max_cycles {
            let pc = cpu.regs.pc;
            let instr = cpu.step().await?;
            if trace {
                info!(
                    "{:03}: {:<16} ACC={:+}",
                    pc,
                    instr.to_string(),
                    cpu.regs.accumulator.value()
                );
            }
        }
        Ok::<_, uvsim::CpuError>(())
    });

    let snapshot = cpu.snapshot();
    info!(
        "Cycles: {}  State: {:?}  PC: {:03}  ACC: {:+}",
        snapshot.cycles, snapshot.state, snapshot.pc, snapshot.accumulator
    );

    if let Some(dump) = dump {
        let json = serde_json::to_string_pretty(&snapshot).map_err(|e| e.to_string())?;
        std::fs::write(dump, json).map_err(|e| format!("Failed to write dump: {}", e))?;
        info!("✓ Saved state to {}", dump.display());
    }

    if let Err(e) = outcome {
        return Err(format!("Error during execution: {}", e));
    }

    if cpu.is_running() {
        warn!("⚠️  Reached max cycles limit ({}). Use --max-cycles to increase.", max_cycles);
    }

    Ok(())
}

#[cfg(feature = "tui")]
fn debug_program(path: &Path, machine: &MachineArgs) -> Result<(), String> {
    let config = machine.resolve()?;
    let cpu_config = config.cpu_config().map_err(|e| e.to_string())?;

    info!("🔍 Loading: {}", path.display());

    let words = read_program(path)?.into_words()?;
    if words.is_empty() {
        return Err("No instructions to execute".into());
    }

    info!("🚀 Launching debugger...");
    uvsim::run_debugger(words, cpu_config).map_err(|e| format!("Debugger error: {}", e))
}

#[cfg(not(feature = "tui"))]
fn debug_program(_path: &Path, _machine: &MachineArgs) -> Result<(), String> {
    Err("Debugger not available: built without the `tui` feature".into())
}

fn assemble_file(source_path: &Path, output: Option<PathBuf>, extended: bool) -> Result<(), String> {
    let out_path = output.unwrap_or_else(|| source_path.with_extension("bml"));

    info!("📝 Assembling: {} → {}", source_path.display(), out_path.display());

    let source = std::fs::read_to_string(source_path)
        .map_err(|e| format!("Failed to read file: {}", e))?;
    let words = assemble(&source).map_err(|e| format!("Assembly error: {}", e))?;

    info!("✓ Assembled {} words", words.len());

    let format = if extended {
        WordFormat::Extended
    } else {
        preferred_format(&words)
    };
    save_program_file(&out_path, &words, format)
        .map_err(|e| format!("Failed to save program: {}", e))?;

    info!("✓ Saved to {}", out_path.display());
    Ok(())
}

fn disassemble_file(path: &Path) -> Result<(), String> {
    info!("📖 Disassembling: {}", path.display());

    let words = read_program(path)?.into_words()?;
    println!("{}", disassemble(&words));
    Ok(())
}

fn check_program(path: &Path, machine: &MachineArgs) -> Result<(), String> {
    let config = machine.resolve()?;
    let cpu_config = config.cpu_config().map_err(|e| e.to_string())?;

    let program = read_program(path)?;
    let size = program.len();
    let cpu = build_cpu(program, cpu_config, ScriptedInput::default(), Vec::<String>::new())?;

    println!(
        "✓ {}: {} words fit in {} cells (address bound {})",
        path.display(),
        size,
        cpu.mem.capacity(),
        cpu.address_bound()
    );
    Ok(())
}
