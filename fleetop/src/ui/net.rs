//! Download/upload sparklines fed by the session's [`RateMeter`].

use std::collections::VecDeque;

use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Style},
    widgets::{Block, Borders, Sparkline},
};

use crate::history::RateMeter;

fn tail(hist: &VecDeque<u64>, width: u16) -> Vec<u64> {
    let keep = width.saturating_sub(2) as usize;
    hist.iter().skip(hist.len().saturating_sub(keep)).copied().collect()
}

fn spark(
    f: &mut ratatui::Frame<'_>,
    area: Rect,
    label: &str,
    hist: &VecDeque<u64>,
    peak: u64,
    color: Color,
) {
    let now = hist.back().copied().unwrap_or(0);
    let data = tail(hist, area.width);
    f.render_widget(
        Sparkline::default()
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(format!("{label} {now} KB/s (peak {peak})")),
            )
            .data(&data)
            .style(Style::default().fg(color)),
        area,
    );
}

/// Two stacked panels, rx over tx.
pub fn draw_net_rates(f: &mut ratatui::Frame<'_>, area: Rect, meter: &RateMeter) {
    let halves = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Ratio(1, 2), Constraint::Ratio(1, 2)])
        .split(area);
    spark(f, halves[0], "Download", &meter.rx_hist, meter.rx_peak, Color::Green);
    spark(f, halves[1], "Upload", &meter.tx_hist, meter.tx_peak, Color::Blue);
}
