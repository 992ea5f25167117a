//! Level meter widget - peak and RMS of the most recent output

use ratatui::{
    layout::Rect,
    style::{Color, Style},
    widgets::{Block, Borders, Gauge},
    Frame,
};

/// Audio statistics for display
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioStats {
    pub peak: f32,
    pub rms: f32,
}

impl AudioStats {
    /// Compute audio stats from a buffer
    pub fn from_buffer(buffer: &[f32]) -> Self {
        if buffer.is_empty() {
            return Self { peak: 0.0, rms: 0.0 };
        }
        let peak = buffer.iter().fold(0.0f32, |acc, &x| acc.max(x.abs()));
        let rms = (buffer.iter().map(|&x| x * x).sum::<f32>() / buffer.len() as f32).sqrt();
        Self { peak, rms }
    }
}

pub fn render_meter(frame: &mut Frame, area: Rect, stats: &AudioStats) {
    let color = if stats.peak >= 0.99 {
        Color::Red
    } else {
        Color::Magenta
    };

    let gauge = Gauge::default()
        .block(Block::default().title(" Level ").borders(Borders::ALL))
        .gauge_style(Style::default().fg(color))
        .ratio(stats.peak.clamp(0.0, 1.0) as f64)
        .label(format!("Peak: {:.2}  RMS: {:.2}", stats.peak, stats.rms));

    frame.render_widget(gauge, area);
}
