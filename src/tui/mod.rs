//! TUI debugger for the BasicML machine.
//!
//! Provides an interactive terminal-based debugger with:
//! - Live accumulator / program counter view
//! - Memory view
//! - Step/run/breakpoint controls
//! - Disassembly view
//! - A console line that answers READ requests without stalling the UI

mod app;
mod session;
mod ui;

pub use app::{DebuggerApp, run_debugger};
pub use session::{spawn_session, Command, SessionError, SessionHandle, SessionView};
