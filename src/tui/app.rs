//! Debugger application state and logic.

use super::session::{spawn_session, Command, SessionHandle, SessionView};
use crate::asm::disasm::disassemble_word;
use crate::cpu::io::InputSlot;
use crate::cpu::{CpuConfig, CpuState};
use crate::word::Word;
use tokio::sync::mpsc::error::TryRecvError;

/// Lines of console history kept for display.
const CONSOLE_HISTORY: usize = 500;

/// Debugger application state.
pub struct DebuggerApp {
    /// Channels to the machine task.
    session: SessionHandle,
    /// Latest machine state.
    pub view: SessionView,
    /// Program output and echoed input.
    pub console: Vec<String>,
    /// READ request waiting for the user, if any.
    pub input: InputSlot,
    /// Text typed so far for the pending READ.
    pub input_buffer: String,
    /// Should we quit?
    pub should_quit: bool,
    /// Status message to display.
    pub status: String,
    /// Memory view scroll offset.
    pub mem_scroll: usize,
}

impl DebuggerApp {
    /// Create a debugger around a running session.
    pub fn new(session: SessionHandle) -> Self {
        let view = session.view.borrow().clone();

        Self {
            session,
            view,
            console: Vec::new(),
            input: InputSlot::new(),
            input_buffer: String::new(),
            should_quit: false,
            status: "Ready. Press 's' to step, 'r' to run, 'q' to quit.".into(),
            mem_scroll: 0,
        }
    }

    /// Pull everything the session has published since the last frame.
    pub fn sync(&mut self) {
        // View first: any output that preceded it is then already queued
        let changed = self.session.view.has_changed().unwrap_or(false);
        if changed {
            self.view = self.session.view.borrow_and_update().clone();
        }

        loop {
            match self.session.output.try_recv() {
                Ok(line) => self.push_console(line),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.status = "Machine task stopped.".into();
                    break;
                }
            }
        }

        while let Ok(request) = self.session.requests.try_recv() {
            if self.input.offer(request).is_ok() {
                self.input_buffer.clear();
                self.status = "Program is waiting for input. Type a number and press Enter.".into();
            }
        }

        if changed {
            self.update_status();
        }
    }

    fn update_status(&mut self) {
        if let Some(error) = &self.view.error {
            self.status = format!("Error: {}", error);
        } else if self.view.snapshot.state == CpuState::Halted {
            self.status = format!("Halted after {} cycles", self.view.snapshot.cycles);
        } else if !self.view.running && self.view.breakpoints.contains(&self.view.snapshot.pc) {
            self.status = format!("Breakpoint at PC={:03}", self.view.snapshot.pc);
        } else if let Some(instr) = self.view.last {
            if !self.input.is_pending() {
                self.status = format!("PC={:03}  last: {}", self.view.snapshot.pc, instr);
            }
        }
    }

    fn push_console(&mut self, line: String) {
        self.console.push(line);
        if self.console.len() > CONSOLE_HISTORY {
            let excess = self.console.len() - CONSOLE_HISTORY;
            self.console.drain(..excess);
        }
    }

    /// Whether keystrokes currently go to the input line.
    pub fn awaiting_input(&mut self) -> bool {
        self.input.is_pending()
    }

    /// Answer the pending READ with the typed text.
    pub fn submit_input(&mut self) {
        let line = std::mem::take(&mut self.input_buffer);
        self.push_console(format!("Console Input: {}", line));
        match self.input.provide(line) {
            Ok(()) => self.status = "Input sent.".into(),
            Err(e) => self.status = format!("Input not delivered: {}", e),
        }
    }

    pub fn step(&mut self) {
        self.send(Command::Step);
    }

    /// Run until halt, breakpoint, or error.
    pub fn run(&mut self) {
        self.send(Command::Run);
        self.status = "Running...".into();
    }

    pub fn pause(&mut self) {
        self.send(Command::Pause);
        self.status = "Paused.".into();
    }

    /// Toggle breakpoint at the current PC.
    pub fn toggle_breakpoint(&mut self) {
        let pc = self.view.snapshot.pc;
        self.send(Command::ToggleBreakpoint(pc));
        if self.view.breakpoints.contains(&pc) {
            self.status = format!("Removed breakpoint at PC={:03}", pc);
        } else {
            self.status = format!("Set breakpoint at PC={:03}", pc);
        }
    }

    /// Reload the program and start over.
    pub fn reset(&mut self) {
        self.send(Command::Reset);
        self.input.abandon();
        self.input_buffer.clear();
        self.console.clear();
        self.status = "Reset. Ready.".into();
    }

    fn send(&mut self, command: Command) {
        if !self.session.send(command) {
            self.status = "Machine task stopped.".into();
        }
    }

    pub fn scroll_up(&mut self) {
        self.mem_scroll = self.mem_scroll.saturating_sub(1);
    }

    pub fn scroll_down(&mut self) {
        if self.mem_scroll + 1 < self.view.snapshot.memory.len() {
            self.mem_scroll += 1;
        }
    }

    /// Get disassembly around current PC.
    pub fn get_disassembly(&self, lines: usize) -> Vec<(usize, String, bool)> {
        let memory = &self.view.snapshot.memory;
        let pc = self.view.snapshot.pc;
        let start = pc.saturating_sub(lines / 2);

        (start..memory.len())
            .take(lines)
            .map(|addr| (addr, disassemble_word(memory[addr]), addr == pc))
            .collect()
    }
}

/// Run the debugger with a program.
pub fn run_debugger(program: Vec<Word>, config: CpuConfig) -> std::io::Result<()> {
    use crossterm::{
        event::{self, Event, KeyCode, KeyEventKind},
        terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
        ExecutableCommand,
    };
    use ratatui::prelude::*;
    use std::io::stdout;
    use std::time::Duration;

    // The machine runs on its own runtime threads; this thread only draws
    let runtime = tokio::runtime::Runtime::new()?;
    let session = spawn_session(runtime.handle(), config, program)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    // Create app
    let mut app = DebuggerApp::new(session);

    // Main loop
    loop {
        app.sync();

        // Draw
        terminal.draw(|frame| {
            super::ui::draw(frame, &mut app);
        })?;

        // Handle input
        if event::poll(Duration::from_millis(50))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    if app.awaiting_input() {
                        match key.code {
                            KeyCode::Enter => app.submit_input(),
                            KeyCode::Backspace => {
                                app.input_buffer.pop();
                            }
                            KeyCode::Char(c) => app.input_buffer.push(c),
                            KeyCode::Esc => app.reset(),
                            _ => {}
                        }
                    } else {
                        match key.code {
                            KeyCode::Char('q') => app.should_quit = true,
                            KeyCode::Char('s') => app.step(),
                            KeyCode::Char('r') => app.run(),
                            KeyCode::Char('p') => app.pause(),
                            KeyCode::Char('b') => app.toggle_breakpoint(),
                            KeyCode::Char('x') => app.reset(),
                            KeyCode::Up => app.scroll_up(),
                            KeyCode::Down => app.scroll_down(),
                            _ => {}
                        }
                    }
                }
            }
        }

        if app.should_quit {
            break;
        }
    }

    // Restore terminal
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    // Dropping the session closes its channels; the task ends on its own
    drop(app);
    runtime.shutdown_timeout(Duration::from_millis(100));

    Ok(())
}
