//! CPU average sparkline + per-core mini bars, colored by the cpu limits.

use std::collections::VecDeque;

use ratatui::style::Modifier;
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::Style,
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Sparkline},
};

use crate::history::PerCoreHistory;
use crate::limits::Limits;
use crate::stats::Stats;
use crate::ui::theme::alert_color;

pub fn draw_cpu_avg_graph(
    f: &mut ratatui::Frame<'_>,
    area: Rect,
    hist: &VecDeque<u64>,
    m: Option<&Stats>,
    limits: &Limits,
) {
    let (title, fg) = match m {
        Some(mm) => {
            let mut t = format!("CPU avg (now: {:>5.1}%)", mm.cpu.total);
            if let Some(load) = &mm.load {
                t.push_str(&format!(
                    "  load {:.2} {:.2} {:.2}",
                    load.min1, load.min5, load.min15
                ));
            }
            (t, alert_color(limits.alert("cpu", mm.cpu.total)))
        }
        None => ("CPU avg".into(), alert_color(crate::limits::Alert::Ok)),
    };
    let max_points = area.width.saturating_sub(2) as usize;
    let start = hist.len().saturating_sub(max_points);
    let data: Vec<u64> = hist.iter().skip(start).cloned().collect();
    let spark = Sparkline::default()
        .block(Block::default().borders(Borders::ALL).title(title))
        .data(&data)
        .max(100)
        .style(Style::default().fg(fg));
    f.render_widget(spark, area);
}

pub fn draw_per_core_bars(
    f: &mut ratatui::Frame<'_>,
    area: Rect,
    m: Option<&Stats>,
    per_core_hist: &PerCoreHistory,
    limits: &Limits,
) {
    f.render_widget(
        Block::default().borders(Borders::ALL).title("Per-core"),
        area,
    );
    let Some(mm) = m else { return };

    let inner = Rect {
        x: area.x + 1,
        y: area.y + 1,
        width: area.width.saturating_sub(2),
        height: area.height.saturating_sub(2),
    };
    if inner.height == 0 {
        return;
    }

    let show_n = (inner.height as usize).min(mm.percpu.len());
    let constraints: Vec<Constraint> = (0..show_n).map(|_| Constraint::Length(1)).collect();
    let vchunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints(constraints)
        .split(inner);

    for (i, core) in mm.percpu.iter().take(show_n).enumerate() {
        let hchunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Min(6), Constraint::Length(12)])
            .split(vchunks[i]);

        let curr = core.total.clamp(0.0, 100.0);
        let older = per_core_hist
            .deques
            .get(i)
            .and_then(|d| d.iter().rev().nth(20).copied())
            .map(f64::from)
            .unwrap_or(curr);
        let trend = if curr > older + 0.2 {
            "↑"
        } else if curr + 0.2 < older {
            "↓"
        } else {
            "╌"
        };
        let fg = alert_color(limits.alert("cpu", curr));

        let hist: Vec<u64> = per_core_hist
            .deques
            .get(i)
            .map(|d| {
                let max_points = hchunks[0].width as usize;
                let start = d.len().saturating_sub(max_points);
                d.iter().skip(start).map(|&v| v as u64).collect()
            })
            .unwrap_or_default();

        f.render_widget(
            Sparkline::default()
                .data(&hist)
                .max(100)
                .style(Style::default().fg(fg)),
            hchunks[0],
        );

        let label = format!("cpu{:<2}{}{:>5.1}%", core.cpu_number, trend, curr);
        let line = Line::from(Span::styled(
            label,
            Style::default().fg(fg).add_modifier(Modifier::BOLD),
        ));
        f.render_widget(Paragraph::new(line).right_aligned(), hchunks[1]);
    }
}
