//! Terminal front end for the operator console.
//!
//! Keys:
//!
//! | key            | action                          |
//! |----------------|---------------------------------|
//! | `g`            | go to target / cancel manual run|
//! | `h`            | home (re-zero encoder)          |
//! | `s`, space     | stop                            |
//! | `f`            | toggle force complete           |
//! | `+` / `-`      | target +/- 0.1 degree           |
//! | `]` / `[`      | target +/- 1.0 degree           |
//! | `e`            | type an exact target            |
//! | `l`            | engineering login               |
//! | `q`, Ctrl-C    | quit                            |

use std::io;
use std::time::{Duration, Instant};

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::{
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Paragraph},
    DefaultTerminal, Frame,
};
use tracing::debug;

use crate::access::AccessLevel;
use crate::console::{ConsoleController, ConsoleView, GoToState};
use crate::health::OutcomeKind;

const FINE_STEP: f64 = 0.1;
const COARSE_STEP: f64 = 1.0;

/// What the keyboard is currently typing into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    /// Exact target entry
    Target(String),
    LoginUser(String),
    LoginPassword { user: String, password: String },
}

/// Console controller plus keyboard state.
pub struct ConsoleApp {
    console: ConsoleController,
    mode: InputMode,
    quit: bool,
}

impl ConsoleApp {
    pub fn new(console: ConsoleController) -> Self {
        Self {
            console,
            mode: InputMode::Normal,
            quit: false,
        }
    }

    pub fn console(&self) -> &ConsoleController {
        &self.console
    }

    pub fn mode(&self) -> &InputMode {
        &self.mode
    }

    pub fn should_quit(&self) -> bool {
        self.quit
    }

    pub fn handle_key(&mut self, key: KeyEvent) {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            self.quit = true;
            return;
        }

        let mode = std::mem::replace(&mut self.mode, InputMode::Normal);
        self.mode = match mode {
            InputMode::Normal => {
                self.handle_command(key.code);
                std::mem::replace(&mut self.mode, InputMode::Normal)
            }
            InputMode::Target(text) => match edit_text(text, key.code) {
                Edit::Typing(text) => InputMode::Target(text),
                Edit::Cancel => InputMode::Normal,
                Edit::Submit(text) => {
                    match text.trim().parse::<f64>() {
                        Ok(target) if target.is_finite() => {
                            self.console.edit_requested_position(target)
                        }
                        _ => debug!("Ignoring target entry {text:?}"),
                    }
                    InputMode::Normal
                }
            },
            InputMode::LoginUser(user) => match edit_text(user, key.code) {
                Edit::Typing(user) => InputMode::LoginUser(user),
                Edit::Cancel => InputMode::Normal,
                Edit::Submit(user) => InputMode::LoginPassword {
                    user,
                    password: String::new(),
                },
            },
            InputMode::LoginPassword { user, password } => match edit_text(password, key.code) {
                Edit::Typing(password) => InputMode::LoginPassword { user, password },
                Edit::Cancel => InputMode::Normal,
                Edit::Submit(password) => {
                    // Result is reflected in the status line
                    let _ = self.console.login(&user, &password);
                    InputMode::Normal
                }
            },
        };
    }

    fn handle_command(&mut self, code: KeyCode) {
        match code {
            KeyCode::Char('g') => self.console.go_to(),
            KeyCode::Char('h') => self.console.home(),
            KeyCode::Char('s') | KeyCode::Char(' ') => self.console.stop(),
            KeyCode::Char('f') => {
                // A refusal is shown in the status line
                if let Err(e) = self.console.toggle_force_complete() {
                    debug!("Force complete refused: {e}");
                }
            }
            KeyCode::Char('+') | KeyCode::Char('=') => {
                self.console.step_requested_position(FINE_STEP)
            }
            KeyCode::Char('-') => self.console.step_requested_position(-FINE_STEP),
            KeyCode::Char(']') => self.console.step_requested_position(COARSE_STEP),
            KeyCode::Char('[') => self.console.step_requested_position(-COARSE_STEP),
            KeyCode::Char('e') => self.mode = InputMode::Target(String::new()),
            KeyCode::Char('l') => self.mode = InputMode::LoginUser(String::new()),
            KeyCode::Char('q') | KeyCode::Esc => self.quit = true,
            _ => {}
        }
    }
}

enum Edit {
    Typing(String),
    Submit(String),
    Cancel,
}

fn edit_text(mut text: String, code: KeyCode) -> Edit {
    match code {
        KeyCode::Enter => Edit::Submit(text),
        KeyCode::Esc => Edit::Cancel,
        KeyCode::Backspace => {
            text.pop();
            Edit::Typing(text)
        }
        KeyCode::Char(c) => {
            text.push(c);
            Edit::Typing(text)
        }
        _ => Edit::Typing(text),
    }
}

/// Display loop: tick the console, draw, and wait up to `period` for input.
pub fn run(terminal: &mut DefaultTerminal, app: &mut ConsoleApp, period: Duration) -> io::Result<()> {
    while !app.should_quit() {
        let view = app.console.tick(Instant::now());
        terminal.draw(|frame| render(frame, &view, app.mode()))?;

        if event::poll(period)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    app.handle_key(key);
                }
            }
        }
    }
    Ok(())
}

fn indicator(label: &str, active: bool, color: Color) -> Span<'static> {
    let style = if active {
        Style::default().bg(color).fg(Color::Black)
    } else {
        Style::default().fg(Color::DarkGray)
    };
    Span::styled(format!(" {label} "), style)
}

pub fn render(frame: &mut Frame, view: &ConsoleView, mode: &InputMode) {
    let [positions, indicators, link, status] = Layout::vertical([
        Constraint::Length(7),
        Constraint::Length(3),
        Constraint::Length(3),
        Constraint::Min(3),
    ])
    .areas(frame.area());

    render_positions(frame, positions, view);

    let go_to = match view.go_to {
        GoToState::Idle => Span::raw(" GO TO "),
        GoToState::Running => indicator("GO TO", true, Color::Green),
        GoToState::Settling => indicator("GO TO", true, Color::Yellow),
    };
    let stop = Span::styled(" STOP ", Style::default().bg(Color::Red).fg(Color::White));
    let lights = Line::from(vec![
        indicator("ROBOT REQUEST", view.indicators.robot_request, Color::Green),
        Span::raw(" "),
        indicator("IN PROGRESS", view.indicators.in_progress, Color::Green),
        Span::raw(" "),
        indicator("COMPLETE", view.indicators.complete, Color::Green),
        Span::raw("   "),
        go_to,
        Span::raw(" "),
        stop,
        Span::raw(" "),
        indicator("FORCE COMPLETE", view.force_complete, Color::Magenta),
    ]);
    frame.render_widget(
        Paragraph::new(lights).block(Block::bordered().title("Motion")),
        indicators,
    );

    let outcome_color = match view.outcome {
        OutcomeKind::Completed => Color::Green,
        OutcomeKind::NotRun | OutcomeKind::Skipped | OutcomeKind::Transient => Color::Yellow,
        OutcomeKind::Fatal => Color::Red,
    };
    let access = match view.access {
        AccessLevel::Operator => "operator",
        AccessLevel::Engineering => "engineering",
    };
    let link_line = Line::from(vec![
        indicator("CONNECTED", view.connection_ok, Color::Green),
        Span::raw(format!("  heartbeat {:>2}  ", view.heartbeat_seconds)),
        Span::styled(view.outcome.label(), Style::default().fg(outcome_color)),
        Span::raw(format!(
            "  failures {}  home {}  access {access}",
            view.consecutive_failures,
            if view.home_pending { "pending" } else { "-" },
        )),
    ]);
    frame.render_widget(
        Paragraph::new(link_line).block(Block::bordered().title("PLC")),
        link,
    );

    let prompt = match mode {
        InputMode::Normal => Line::from(
            "g go  h home  s stop  f force  +/- 0.1  [/] 1.0  e enter  l login  q quit",
        ),
        InputMode::Target(text) => Line::from(format!("Target degrees: {text}_")),
        InputMode::LoginUser(user) => Line::from(format!("Username: {user}_")),
        InputMode::LoginPassword { password, .. } => {
            Line::from(format!("Password: {}_", "*".repeat(password.chars().count())))
        }
    };
    let lines = vec![
        Line::from(Span::styled(
            view.status.clone(),
            Style::default().add_modifier(Modifier::BOLD),
        )),
        prompt,
    ];
    frame.render_widget(
        Paragraph::new(lines).block(Block::bordered().title("Status")),
        status,
    );
}

fn render_positions(frame: &mut Frame, area: Rect, view: &ConsoleView) {
    let lines = vec![
        Line::from(format!("Current position     {:>9.2} deg", view.current_position)),
        Line::from(format!("Target               {:>9.2} deg", view.target)),
        Line::from(format!("Commanded position   {:>9.2} deg", view.command_position)),
        Line::from(format!("Requested position   {:>9.2} deg", view.requested_position)),
        Line::from(format!(
            "Robot requested      {:>9.2} deg",
            view.robot_requested_position
        )),
    ];
    frame.render_widget(
        Paragraph::new(lines).block(Block::bordered().title("Positioner")),
        area,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::Credentials;
    use crate::state::{DeviceState, StateReader};
    use ratatui::backend::TestBackend;
    use ratatui::Terminal;

    fn app() -> (ConsoleApp, StateReader) {
        let (_feedback, commands, reader) = DeviceState::new();
        (ConsoleApp::new(ConsoleController::new(commands)), reader)
    }

    fn press(app: &mut ConsoleApp, code: KeyCode) {
        app.handle_key(KeyEvent::new(code, KeyModifiers::NONE));
    }

    fn type_str(app: &mut ConsoleApp, text: &str) {
        for c in text.chars() {
            press(app, KeyCode::Char(c));
        }
    }

    #[test]
    fn test_command_keys() {
        let (mut app, reader) = app();
        press(&mut app, KeyCode::Char(']'));
        press(&mut app, KeyCode::Char('+'));
        assert!((app.console().target() - 1.1).abs() < 1e-9);

        press(&mut app, KeyCode::Char('g'));
        assert!(reader.commands().manual_run);
        press(&mut app, KeyCode::Char(' '));
        assert!(!reader.commands().manual_run);

        press(&mut app, KeyCode::Char('h'));
        assert_eq!(reader.commands().home_requests, 1);

        press(&mut app, KeyCode::Char('f'));
        assert!(reader.commands().force_complete);

        assert!(!app.should_quit());
        press(&mut app, KeyCode::Char('q'));
        assert!(app.should_quit());
    }

    #[test]
    fn test_exact_target_entry() {
        let (mut app, reader) = app();
        press(&mut app, KeyCode::Char('e'));
        type_str(&mut app, "12.55");
        press(&mut app, KeyCode::Backspace);
        assert_eq!(app.mode(), &InputMode::Target("12.5".to_string()));

        press(&mut app, KeyCode::Enter);
        assert_eq!(app.mode(), &InputMode::Normal);
        assert_eq!(app.console().target(), 12.5);

        // Typed text does not leak into commands
        assert_eq!(reader.commands().home_requests, 0);

        press(&mut app, KeyCode::Char('e'));
        type_str(&mut app, "abc");
        press(&mut app, KeyCode::Enter);
        assert_eq!(app.console().target(), 12.5);
    }

    #[test]
    fn test_login_prompt() {
        let (_feedback, commands, reader) = DeviceState::new();
        let console = ConsoleController::new(commands).with_credentials(Credentials {
            username: "eng".to_string(),
            password: "pw".to_string(),
        });
        let mut app = ConsoleApp::new(console);

        press(&mut app, KeyCode::Char('f'));
        assert!(!reader.commands().force_complete);
        assert_eq!(app.console().status(), "Engineering access required");

        press(&mut app, KeyCode::Char('l'));
        type_str(&mut app, "eng");
        press(&mut app, KeyCode::Enter);
        type_str(&mut app, "pw");
        press(&mut app, KeyCode::Enter);
        assert_eq!(app.console().access_level(), AccessLevel::Engineering);

        press(&mut app, KeyCode::Char('f'));
        assert!(reader.commands().force_complete);
    }

    #[test]
    fn test_ctrl_c_quits_from_any_mode() {
        let (mut app, _reader) = app();
        press(&mut app, KeyCode::Char('e'));
        app.handle_key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL));
        assert!(app.should_quit());
    }

    #[test]
    fn test_render_shows_commanded_position_apart_from_target() {
        let (mut app, _reader) = app();
        press(&mut app, KeyCode::Char(']'));
        press(&mut app, KeyCode::Char('g'));
        press(&mut app, KeyCode::Char(']'));
        let view = app.console.tick(Instant::now());

        let mut terminal = Terminal::new(TestBackend::new(100, 20)).unwrap();
        terminal
            .draw(|frame| render(frame, &view, app.mode()))
            .unwrap();

        let text: String = terminal
            .backend()
            .buffer()
            .content
            .iter()
            .map(|cell| cell.symbol())
            .collect();
        assert!(text.contains(&format!("Commanded position   {:>9.2} deg", 1.0)), "{text}");
        assert!(text.contains(&format!("Target               {:>9.2} deg", 2.0)), "{text}");
    }

    #[test]
    fn test_render_shows_positions_and_status() {
        let (mut app, _reader) = app();
        press(&mut app, KeyCode::Char(']'));
        press(&mut app, KeyCode::Char('g'));
        let view = app.console.tick(Instant::now());

        let mut terminal = Terminal::new(TestBackend::new(100, 20)).unwrap();
        terminal
            .draw(|frame| render(frame, &view, app.mode()))
            .unwrap();

        let buffer = terminal.backend().buffer();
        let text: String = buffer
            .content
            .iter()
            .map(|cell| cell.symbol())
            .collect();
        assert!(text.contains("1.00 deg"), "{text}");
        assert!(text.contains("Requesting motion to 1.0 degrees"));
        assert!(text.contains("IN PROGRESS"));
    }
}
