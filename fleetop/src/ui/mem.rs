//! Memory and swap gauges, colored by their limit sections.

use ratatui::{
    layout::Rect,
    style::Style,
    widgets::{Block, Borders, Gauge},
};

use crate::limits::Limits;
use crate::stats::Stats;
use crate::ui::{theme::alert_color, util::human};

fn usage_gauge(
    f: &mut ratatui::Frame<'_>,
    area: Rect,
    title: &str,
    section: &str,
    (used, total, pct): (u64, u64, f64),
    limits: &Limits,
) {
    let g = Gauge::default()
        .block(Block::default().borders(Borders::ALL).title(title.to_string()))
        .gauge_style(Style::default().fg(alert_color(limits.alert(section, pct))))
        .percent(pct.clamp(0.0, 100.0) as u16)
        .label(format!("{} / {}  ({pct:.1}%)", human(used), human(total)));
    f.render_widget(g, area);
}

pub fn draw_mem(f: &mut ratatui::Frame<'_>, area: Rect, m: Option<&Stats>, limits: &Limits) {
    let usage = m
        .map(|s| (s.mem.used, s.mem.total, s.mem.percent))
        .unwrap_or_default();
    usage_gauge(f, area, "Memory", "mem", usage, limits);
}

pub fn draw_swap(f: &mut ratatui::Frame<'_>, area: Rect, m: Option<&Stats>, limits: &Limits) {
    let usage = m
        .map(|s| (s.memswap.used, s.memswap.total, s.memswap.percent))
        .unwrap_or_default();
    usage_gauge(f, area, "Swap", "memswap", usage, limits);
}
