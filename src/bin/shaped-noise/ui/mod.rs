//! Control surface for shaped-noise
//!
//! Shows the live parameters and session state, and maps keys to parameter
//! store writes. Input is polled; each poll waits at most `POLL_INTERVAL`,
//! which bounds how long a key press or shutdown takes to be noticed.

mod meter;
mod waveform;

use std::sync::Arc;
use std::time::Duration;

use color_eyre::eyre::Result as EyreResult;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use ratatui::{
    layout::{Constraint, Direction, Layout},
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    DefaultTerminal, Frame,
};
use rtrb::Consumer;

use shaped_noise::{
    config::DeviceNames,
    io::session::{SessionMonitor, SessionState},
    synth::ParamStore,
    BLOCK_SIZE,
};

use meter::{render_meter, AudioStats};
use waveform::render_waveform;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

pub const VOLUME_STEP: f32 = 0.05;
pub const HIGHPASS_STEP_HZ: f32 = 10.0;
pub const LOWPASS_STEP_HZ: f32 = 100.0;

/// Samples kept for the scope
const VIS_BUFFER_SIZE: usize = BLOCK_SIZE;

pub struct ControlSurface {
    params: Arc<ParamStore>,
    monitor: Arc<SessionMonitor>,
    /// Recent output from the producer thread
    scope_rx: Consumer<f32>,
    scope: Vec<f32>,
    devices: DeviceNames,
    should_quit: bool,
}

impl ControlSurface {
    pub fn new(
        params: Arc<ParamStore>,
        monitor: Arc<SessionMonitor>,
        scope_rx: Consumer<f32>,
        devices: DeviceNames,
    ) -> Self {
        Self {
            params,
            monitor,
            scope_rx,
            scope: vec![0.0; VIS_BUFFER_SIZE],
            devices,
            should_quit: false,
        }
    }

    pub fn run(&mut self, terminal: &mut DefaultTerminal) -> EyreResult<()> {
        while !self.should_quit && self.params.is_running() {
            self.poll_scope();

            terminal.draw(|frame| self.render(frame))?;

            if event::poll(POLL_INTERVAL)? {
                if let Event::Key(key) = event::read()? {
                    if key.kind == KeyEventKind::Press {
                        self.should_quit = apply_key(&self.params, key.code);
                    }
                }
            }
        }
        Ok(())
    }

    /// Keep the most recent `VIS_BUFFER_SIZE` samples.
    fn poll_scope(&mut self) {
        let available = self.scope_rx.slots();
        if available == 0 {
            return;
        }
        let Ok(chunk) = self.scope_rx.read_chunk(available) else {
            return;
        };
        let (first, second) = chunk.as_slices();
        self.scope.extend_from_slice(first);
        self.scope.extend_from_slice(second);
        chunk.commit_all();

        if self.scope.len() > VIS_BUFFER_SIZE {
            let excess = self.scope.len() - VIS_BUFFER_SIZE;
            self.scope.drain(0..excess);
        }
    }

    fn render(&self, frame: &mut Frame) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(7), // Parameters
                Constraint::Length(3), // Level meter
                Constraint::Min(6),    // Waveform
                Constraint::Length(1), // Help bar
            ])
            .split(frame.area());

        self.render_params(frame, chunks[0]);
        render_meter(frame, chunks[1], &AudioStats::from_buffer(&self.scope));
        render_waveform(frame, chunks[2], &self.scope);

        let help = Paragraph::new(
            " [+/-] Volume  [W/S] Highpass  [E/D] Lowpass  [Tab] Device  [Q] Quit",
        )
        .style(Style::default().fg(Color::DarkGray));
        frame.render_widget(help, chunks[3]);
    }

    fn render_params(&self, frame: &mut Frame, area: ratatui::layout::Rect) {
        let snapshot = self.params.snapshot();
        let state = self.monitor.state();

        let state_color = match state {
            SessionState::Streaming => Color::Green,
            SessionState::Failed => Color::Red,
            _ => Color::Yellow,
        };

        let lines = vec![
            field("Volume       ", format!("{:.2}", snapshot.volume)),
            field("Highpass Hz  ", format!("{:.0} Hz", snapshot.highpass_hz)),
            field("Lowpass Hz   ", format!("{:.0} Hz", snapshot.lowpass_hz)),
            field(
                "Output Device",
                format!(
                    "{} ({})",
                    snapshot.device.label(),
                    self.devices.name(snapshot.device)
                ),
            ),
            Line::from(vec![
                Span::styled("Session      : ", Style::default().fg(Color::DarkGray)),
                Span::styled(state.label(), Style::default().fg(state_color)),
            ]),
        ];

        let block = Block::default()
            .title(" Shaped Noise Generator ")
            .borders(Borders::ALL);
        frame.render_widget(Paragraph::new(lines).block(block), area);
    }
}

fn field(label: &'static str, value: String) -> Line<'static> {
    Line::from(vec![
        Span::styled(format!("{label}: "), Style::default().fg(Color::DarkGray)),
        Span::styled(value, Style::default().fg(Color::Cyan)),
    ])
}

/// Apply one key press to the parameter store. Returns true on quit.
fn apply_key(params: &ParamStore, key: KeyCode) -> bool {
    match key {
        KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => {
            params.stop();
            return true;
        }
        KeyCode::Char('+') | KeyCode::Char('=') => {
            params.adjust_volume(VOLUME_STEP);
        }
        KeyCode::Char('-') => {
            params.adjust_volume(-VOLUME_STEP);
        }
        KeyCode::Char('w') | KeyCode::Char('W') => {
            params.adjust_highpass_hz(HIGHPASS_STEP_HZ);
        }
        KeyCode::Char('s') | KeyCode::Char('S') => {
            params.adjust_highpass_hz(-HIGHPASS_STEP_HZ);
        }
        KeyCode::Char('e') | KeyCode::Char('E') => {
            params.adjust_lowpass_hz(LOWPASS_STEP_HZ);
        }
        KeyCode::Char('d') | KeyCode::Char('D') => {
            params.adjust_lowpass_hz(-LOWPASS_STEP_HZ);
        }
        KeyCode::Tab => {
            params.toggle_device();
        }
        _ => {}
    }
    false
}
