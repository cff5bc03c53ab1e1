//! Machine session driven from the debugger.
//!
//! The CPU lives in its own task on a tokio runtime. The UI thread talks
//! to it only through channels: commands in, state snapshots, output lines
//! and input requests out. A READ therefore never blocks the UI; the
//! session just sits on the pending request until the user answers it.

use crate::cpu::io::{channel_input, channel_output, ChannelInput, ChannelOutput, InputRequest};
use crate::cpu::{ConfigError, Cpu, CpuConfig, CpuError, Instruction, MemoryError, Snapshot};
use crate::word::Word;
use std::collections::HashSet;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver, UnboundedSender};
use tokio::sync::watch;

type SessionCpu = Cpu<ChannelInput, ChannelOutput>;

/// Requests from the UI to the session task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Execute one instruction and pause.
    Step,
    /// Execute until halt, error, breakpoint or pause.
    Run,
    Pause,
    /// Reload the original program and restart.
    Reset,
    ToggleBreakpoint(usize),
}

/// What the UI renders: the machine plus session bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionView {
    pub snapshot: Snapshot,
    pub running: bool,
    pub last: Option<Instruction>,
    pub breakpoints: HashSet<usize>,
    pub error: Option<String>,
}

/// UI-side ends of the session channels.
pub struct SessionHandle {
    commands: UnboundedSender<Command>,
    pub view: watch::Receiver<SessionView>,
    pub requests: UnboundedReceiver<InputRequest>,
    pub output: UnboundedReceiver<String>,
}

impl SessionHandle {
    /// Send a command; `false` if the session has ended.
    pub fn send(&self, command: Command) -> bool {
        self.commands.send(command).is_ok()
    }
}

/// Build the machine and start its task on `runtime`.
pub fn spawn_session(runtime: &Handle, config: CpuConfig, program: Vec<Word>) -> Result<SessionHandle, SessionError> {
    let (input, requests) = channel_input();
    let (output, output_rx) = channel_output();

    let mut cpu = Cpu::new(config, input, output)?;
    cpu.mem.load_words(&program)?;

    let (commands_tx, commands_rx) = mpsc::unbounded_channel();
    let session = Session {
        cpu,
        program,
        running: false,
        resuming: false,
        breakpoints: HashSet::new(),
        error: None,
    };
    let (view_tx, view_rx) = watch::channel(session.view());

    runtime.spawn(session.drive(commands_rx, view_tx));

    Ok(SessionHandle {
        commands: commands_tx,
        view: view_rx,
        requests,
        output: output_rx,
    })
}

enum StepOutcome {
    Done(Result<Instruction, CpuError>),
    /// A command arrived while the step was still waiting on input.
    Interrupted(Option<Command>),
}

struct Session {
    cpu: SessionCpu,
    program: Vec<Word>,
    running: bool,
    /// Set on Run so the breakpoint we are parked on does not stop us again.
    resuming: bool,
    breakpoints: HashSet<usize>,
    error: Option<String>,
}

impl Session {
    async fn drive(mut self, mut commands: UnboundedReceiver<Command>, view: watch::Sender<SessionView>) {
        loop {
            let command = if self.running {
                match commands.try_recv() {
                    Ok(command) => Some(command),
                    Err(TryRecvError::Empty) => None,
                    Err(TryRecvError::Disconnected) => return,
                }
            } else {
                match commands.recv().await {
                    Some(command) => Some(command),
                    None => return,
                }
            };

            if let Some(command) = command {
                self.dispatch(command, &mut commands).await;
            }

            if self.running {
                if self.breakpoints.contains(&self.cpu.regs.pc) && !self.resuming {
                    self.running = false;
                } else {
                    self.resuming = false;
                    if let Some(command) = self.step(&mut commands).await {
                        self.dispatch(command, &mut commands).await;
                    }
                }
                tokio::task::yield_now().await;
            }

            if view.send(self.view()).is_err() {
                return;
            }
        }
    }

    /// Apply a command and whatever command interrupts it in turn.
    async fn dispatch(&mut self, command: Command, commands: &mut UnboundedReceiver<Command>) {
        let mut pending = Some(command);
        while let Some(command) = pending.take() {
            pending = self.apply(command, commands).await;
        }
    }

    /// Apply one command. Returns a follow-up command if a step was interrupted.
    async fn apply(&mut self, command: Command, commands: &mut UnboundedReceiver<Command>) -> Option<Command> {
        match command {
            Command::Step => {
                self.running = false;
                return self.step(commands).await;
            }
            Command::Run => {
                if self.cpu.is_running() && self.error.is_none() {
                    self.running = true;
                    self.resuming = true;
                }
            }
            Command::Pause => self.running = false,
            Command::Reset => {
                self.running = false;
                self.error = None;
                // The program fitted when the session started
                let _ = self.cpu.mem.load_words(&self.program);
                self.cpu.restart();
            }
            Command::ToggleBreakpoint(addr) => {
                if !self.breakpoints.remove(&addr) {
                    self.breakpoints.insert(addr);
                }
            }
        }
        None
    }

    /// Execute one instruction unless a command cuts a pending READ short.
    async fn step(&mut self, commands: &mut UnboundedReceiver<Command>) -> Option<Command> {
        if !self.cpu.is_running() || self.error.is_some() {
            self.running = false;
            return None;
        }

        let outcome = tokio::select! {
            biased;
            result = self.cpu.step() => StepOutcome::Done(result),
            command = commands.recv() => StepOutcome::Interrupted(command),
        };

        match outcome {
            StepOutcome::Done(Ok(_)) => {
                if !self.cpu.is_running() {
                    self.running = false;
                }
                None
            }
            StepOutcome::Done(Err(e)) => {
                self.running = false;
                self.error = Some(e.to_string());
                None
            }
            // Step was dropped before it changed anything; READ will run again
            StepOutcome::Interrupted(command) => command,
        }
    }

    fn view(&self) -> SessionView {
        SessionView {
            snapshot: self.cpu.snapshot(),
            running: self.running,
            last: self.cpu.last_instruction(),
            breakpoints: self.breakpoints.clone(),
            error: self.error.clone(),
        }
    }
}

/// Errors raised while starting a session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Memory(#[from] MemoryError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::io::InputError;
    use crate::cpu::CpuState;

    async fn wait_for<F: Fn(&SessionView) -> bool>(handle: &mut SessionHandle, done: F) -> SessionView {
        loop {
            {
                let view = handle.view.borrow_and_update();
                if done(&*view) {
                    return (*view).clone();
                }
            }
            handle.view.changed().await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_run_to_halt() {
        let program = vec![20003, 11003, 43000, 77];
        let mut handle = spawn_session(&Handle::current(), CpuConfig::default(), program).unwrap();

        assert!(handle.send(Command::Run));
        let view = wait_for(&mut handle, |v| v.snapshot.state == CpuState::Halted).await;

        assert_eq!(view.snapshot.accumulator, 77);
        assert_eq!(handle.output.recv().await.unwrap(), "Output: 77");
        assert_eq!(handle.output.recv().await.unwrap(), "Program finished");
    }

    #[tokio::test]
    async fn test_read_waits_for_request() {
        let program = vec![10010, 43000];
        let mut handle = spawn_session(&Handle::current(), CpuConfig::default(), program).unwrap();

        assert!(handle.send(Command::Run));
        let request = handle.requests.recv().await.unwrap();
        assert_eq!(handle.view.borrow().snapshot.pc, 0);

        request.fulfill("31").unwrap();
        let view = wait_for(&mut handle, |v| v.snapshot.state == CpuState::Halted).await;
        assert_eq!(view.snapshot.memory[10], 31);
    }

    #[tokio::test]
    async fn test_reset_interrupts_pending_read() {
        let program = vec![10010, 43000];
        let mut handle = spawn_session(&Handle::current(), CpuConfig::default(), program).unwrap();

        assert!(handle.send(Command::Step));
        let mut request = handle.requests.recv().await.unwrap();
        assert!(handle.send(Command::Reset));

        request.cancelled().await;
        assert_eq!(request.fulfill("1"), Err(InputError::Cancelled));

        let view = wait_for(&mut handle, |v| !v.running).await;
        assert_eq!(view.snapshot.pc, 0);
        assert_eq!(view.snapshot.memory[10], 0);
    }

    #[tokio::test]
    async fn test_error_stops_run() {
        let program = vec![99000];
        let mut handle = spawn_session(&Handle::current(), CpuConfig::default(), program).unwrap();

        assert!(handle.send(Command::Run));
        let view = wait_for(&mut handle, |v| v.error.is_some()).await;

        assert!(!view.running);
        assert_eq!(view.snapshot.pc, 0);
    }

    #[tokio::test]
    async fn test_breakpoint_pauses_run() {
        let program = vec![20005, 20005, 20005, 43000];
        let mut handle = spawn_session(&Handle::current(), CpuConfig::default(), program).unwrap();

        assert!(handle.send(Command::ToggleBreakpoint(2)));
        assert!(handle.send(Command::Run));
        let view = wait_for(&mut handle, |v| v.snapshot.pc == 2 && !v.running).await;

        assert_eq!(view.snapshot.state, CpuState::Running);
        assert!(view.breakpoints.contains(&2));
    }

    #[test]
    fn test_oversized_program_rejected() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let result = spawn_session(runtime.handle(), CpuConfig::new(2), vec![0, 0, 0]);

        assert!(matches!(result, Err(SessionError::Memory(_))));
    }
}
