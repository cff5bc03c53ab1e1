//! Screen layout for the BasicML debugger.
//!
//! ```text
//! ┌ Program ──────────┐┌ Machine ┐┌ Memory ┐
//! │                   ││         ││        │
//! └───────────────────┘└─────────┘│        │
//! ┌ Console ─────────────────────┐│        │
//! └──────────────────────────────┘└────────┘
//!  status line / key help
//! ```

use super::app::DebuggerApp;
use crate::cpu::CpuState;
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, List, ListItem, Paragraph};

const KEYS: &str = "s step  r run  p pause  b breakpoint  x reset  ↑↓ memory  q quit";
const INPUT_KEYS: &str = "type a number  Enter send  Backspace erase  Esc reset";

/// Render one frame.
pub fn draw(frame: &mut Frame, app: &mut DebuggerApp) {
    let [main, footer] = Layout::vertical([Constraint::Min(12), Constraint::Length(2)])
        .areas(frame.area());
    let [left, memory] = Layout::horizontal([Constraint::Min(40), Constraint::Length(22)])
        .areas(main);
    let [upper, console] = Layout::vertical([Constraint::Percentage(60), Constraint::Percentage(40)])
        .areas(left);
    let [program, machine] = Layout::horizontal([Constraint::Min(28), Constraint::Length(24)])
        .areas(upper);

    render_program(frame, program, app);
    render_machine(frame, machine, app);
    render_memory(frame, memory, app);
    render_console(frame, console, app);
    render_footer(frame, footer, app);
}

fn panel(title: &str, accent: Color) -> Block<'_> {
    Block::default()
        .title(format!(" {} ", title))
        .borders(Borders::ALL)
        .border_style(Style::new().fg(accent))
}

fn pc_style() -> Style {
    Style::new().fg(Color::Yellow).bold()
}

/// Listing around the program counter, breakpoints marked in the gutter.
fn render_program(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let rows = area.height.saturating_sub(2) as usize;

    let items: Vec<ListItem> = app
        .get_disassembly(rows)
        .into_iter()
        .map(|(addr, text, at_pc)| {
            let gutter = match (app.view.breakpoints.contains(&addr), at_pc) {
                (true, true) => "●▶",
                (true, false) => "● ",
                (false, true) => " ▶",
                (false, false) => "  ",
            };
            let item = ListItem::new(format!("{} {:03}  {}", gutter, addr, text));

            if at_pc {
                item.style(pc_style())
            } else if app.view.breakpoints.contains(&addr) {
                item.style(Style::new().fg(Color::Red))
            } else {
                item
            }
        })
        .collect();

    frame.render_widget(List::new(items).block(panel("Program", Color::Cyan)), area);
}

/// Accumulator, counters and run state.
fn render_machine(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let snap = &app.view.snapshot;

    let (state, state_color) = match (&app.view.error, snap.state, app.view.running) {
        (Some(_), _, _) => ("error", Color::Red),
        (None, CpuState::Halted, _) => ("halted", Color::Magenta),
        (None, CpuState::Running, true) => ("running", Color::Green),
        (None, CpuState::Running, false) => ("paused", Color::White),
    };

    let field = |name: &'static str, value: String, color: Color| {
        Line::from(vec![
            Span::styled(format!("{:<6}", name), Style::new().fg(Color::DarkGray)),
            Span::styled(value, Style::new().fg(color)),
        ])
    };

    let lines = vec![
        field("ACC", format!("{:+}", snap.accumulator), Color::White),
        field("PC", format!("{:03}", snap.pc), Color::Yellow),
        field("IR", format!("{:+07}", snap.ir), Color::White),
        field("CYCLE", snap.cycles.to_string(), Color::Cyan),
        field("STATE", state.to_string(), state_color),
        Line::default(),
        field(
            "LAST",
            app.view.last.map(|instr| instr.to_string()).unwrap_or_else(|| "-".into()),
            Color::Gray,
        ),
    ];

    frame.render_widget(Paragraph::new(lines).block(panel("Machine", Color::Green)), area);
}

/// Scrollable cell list; zero cells are dimmed.
fn render_memory(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let cells = &app.view.snapshot.memory;
    let rows = area.height.saturating_sub(2) as usize;
    let first = app.mem_scroll.min(cells.len());

    let items: Vec<ListItem> = cells
        .iter()
        .enumerate()
        .skip(first)
        .take(rows)
        .map(|(addr, &word)| {
            let style = match (addr == app.view.snapshot.pc, word) {
                (true, _) => pc_style(),
                (false, 0) => Style::new().fg(Color::DarkGray),
                (false, _) => Style::new(),
            };
            ListItem::new(format!("{:03} {:+07}", addr, word)).style(style)
        })
        .collect();

    frame.render_widget(List::new(items).block(panel("Memory", Color::Magenta)), area);
}

/// Program output, with an input prompt while a READ is waiting.
fn render_console(frame: &mut Frame, area: Rect, app: &mut DebuggerApp) {
    let waiting = app.awaiting_input();
    let history = area.height.saturating_sub(3) as usize;
    let first = app.console.len().saturating_sub(history);

    let mut lines: Vec<Line> = app.console[first..]
        .iter()
        .map(|line| Line::raw(line.as_str()))
        .collect();

    lines.push(if waiting {
        Line::from(vec![
            Span::styled("READ> ", Style::new().fg(Color::Green).bold()),
            Span::raw(app.input_buffer.as_str()),
            Span::styled("█", Style::new().fg(Color::Green)),
        ])
    } else {
        Line::styled("READ> (no input requested)", Style::new().fg(Color::DarkGray))
    });

    let accent = if waiting { Color::Green } else { Color::Blue };
    frame.render_widget(Paragraph::new(lines).block(panel("Console", accent)), area);
}

fn render_footer(frame: &mut Frame, area: Rect, app: &mut DebuggerApp) {
    let keys = if app.awaiting_input() { INPUT_KEYS } else { KEYS };
    let lines = vec![
        Line::raw(app.status.as_str()),
        Line::styled(keys, Style::new().fg(Color::DarkGray)),
    ];

    frame.render_widget(Paragraph::new(lines), area);
}
