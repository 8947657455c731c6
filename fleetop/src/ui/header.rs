//! Top header: host, OS, connection status and uptime.

use ratatui::{
    layout::Rect,
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
};

use crate::session::ConnectionStatus;
use crate::stats::Stats;

pub fn draw_header(
    f: &mut ratatui::Frame<'_>,
    area: Rect,
    host: &str,
    m: Option<&Stats>,
    status: ConnectionStatus,
) {
    let status_fg = match status {
        ConnectionStatus::Connected => Color::Green,
        ConnectionStatus::Snmp => Color::Cyan,
        ConnectionStatus::Disconnected => Color::Red,
    };
    let mut spans = vec![Span::raw(format!("fleetop | host: {host}"))];
    if let Some(mm) = m {
        if !mm.system.hr_name.is_empty() {
            spans.push(Span::raw(format!(" | {}", mm.system.hr_name)));
        }
        if let Some(up) = &mm.uptime {
            spans.push(Span::raw(format!(" | up {up}")));
        }
    }
    spans.push(Span::raw(" | "));
    spans.push(Span::styled(status.to_string(), Style::default().fg(status_fg)));
    spans.push(Span::raw("  (press 'q' to go back)"));
    f.render_widget(
        Paragraph::new(Line::from(spans)).block(Block::default().borders(Borders::BOTTOM)),
        area,
    );
}
