//! Process table with per-cell coloring, sorting, and a scrollbar.

use std::cmp::Ordering;

use crossterm::event::{KeyCode, KeyEvent};
use ratatui::style::Modifier;
use ratatui::{
    layout::{Constraint, Rect},
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table},
};

use crate::limits::Limits;
use crate::stats::{ProcessInfo, Stats};
use crate::ui::theme::{alert_color, SB_ARROW, SB_THUMB, SB_TRACK};
use crate::ui::util::human;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProcSortBy {
    #[default]
    CpuDesc,
    MemDesc,
}

const COLS: [Constraint; 6] = [
    Constraint::Length(8),      // PID
    Constraint::Length(10),     // User
    Constraint::Percentage(40), // Name
    Constraint::Length(7),      // CPU %
    Constraint::Length(10),     // RSS
    Constraint::Length(7),      // Mem %
];

/// Indices of `procs` in display order.
pub fn sorted_indices(procs: &[ProcessInfo], sort_by: ProcSortBy) -> Vec<usize> {
    let mut idxs: Vec<usize> = (0..procs.len()).collect();
    let key = |p: &ProcessInfo| match sort_by {
        ProcSortBy::CpuDesc => p.cpu_percent,
        ProcSortBy::MemDesc => p.memory_percent,
    };
    idxs.sort_by(|&a, &b| {
        key(&procs[b])
            .partial_cmp(&key(&procs[a]))
            .unwrap_or(Ordering::Equal)
    });
    idxs
}

pub fn draw_top_processes(
    f: &mut ratatui::Frame<'_>,
    area: Rect,
    m: Option<&Stats>,
    limits: &Limits,
    scroll_offset: usize,
    sort_by: ProcSortBy,
) {
    let Some(mm) = m else { return };
    let total = if mm.processcount.total > 0 {
        mm.processcount.total as usize
    } else {
        mm.processlist.len()
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .title(format!("Processes ({total} total, 'c'/'m' to sort)"));
    f.render_widget(block, area);

    // Inner area and content area (reserve 2 columns for scrollbar)
    let inner = Rect {
        x: area.x + 1,
        y: area.y + 1,
        width: area.width.saturating_sub(2),
        height: area.height.saturating_sub(2),
    };
    if inner.height < 1 || inner.width < 3 {
        return;
    }
    let content = Rect {
        x: inner.x,
        y: inner.y,
        width: inner.width.saturating_sub(2),
        height: inner.height,
    };

    let idxs = sorted_indices(&mm.processlist, sort_by);

    let total_rows = idxs.len();
    let viewport_rows = content.height.saturating_sub(1) as usize;
    let max_off = total_rows.saturating_sub(viewport_rows);
    let offset = scroll_offset.min(max_off);
    let show_n = total_rows.saturating_sub(offset).min(viewport_rows);

    let rows_iter = idxs.iter().skip(offset).take(show_n).map(|&ix| {
        let p = &mm.processlist[ix];
        let cpu_fg = alert_color(limits.alert("cpu", p.cpu_percent));
        let mem_fg = alert_color(limits.alert("mem", p.memory_percent));
        Row::new(vec![
            Cell::from(p.pid.to_string()).style(Style::default().fg(Color::DarkGray)),
            Cell::from(p.username.clone().unwrap_or_default()),
            Cell::from(p.name.clone()),
            Cell::from(format!("{:>5.1}", p.cpu_percent.clamp(0.0, 999.9)))
                .style(Style::default().fg(cpu_fg)),
            Cell::from(human(p.memory_rss)),
            Cell::from(format!("{:>5.1}", p.memory_percent)).style(Style::default().fg(mem_fg)),
        ])
    });

    let cpu_hdr = match sort_by {
        ProcSortBy::CpuDesc => "CPU% •",
        _ => "CPU%",
    };
    let mem_hdr = match sort_by {
        ProcSortBy::MemDesc => "MEM% •",
        _ => "MEM%",
    };
    let header = Row::new(vec!["PID", "USER", "NAME", cpu_hdr, "RSS", mem_hdr])
        .style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD));

    let table = Table::new(rows_iter, COLS.to_vec())
        .header(header)
        .column_spacing(1);
    f.render_widget(table, content);

    let scroll_area = Rect {
        x: inner.x + inner.width.saturating_sub(1),
        y: inner.y,
        width: 1,
        height: inner.height,
    };
    if scroll_area.height >= 3 {
        let track = (scroll_area.height - 2) as usize;
        let total = total_rows.max(1);
        let view = viewport_rows.clamp(1, total);
        let max_off = total.saturating_sub(view);

        let thumb_len = (track * view).div_ceil(total).max(1).min(track);
        let thumb_top = if max_off == 0 {
            0
        } else {
            ((track - thumb_len) * offset + max_off / 2) / max_off
        };

        let mut lines: Vec<Line> = Vec::with_capacity(scroll_area.height as usize);
        lines.push(Line::from(Span::styled("▲", Style::default().fg(SB_ARROW))));
        for i in 0..track {
            let (glyph, color) = if i >= thumb_top && i < thumb_top + thumb_len {
                ("█", SB_THUMB)
            } else {
                ("│", SB_TRACK)
            };
            lines.push(Line::from(Span::styled(glyph, Style::default().fg(color))));
        }
        lines.push(Line::from(Span::styled("▼", Style::default().fg(SB_ARROW))));
        f.render_widget(Paragraph::new(lines), scroll_area);
    }
}

/// Keyboard scrolling and sort toggles. Returns a new sort order when one was picked.
pub fn processes_handle_key(
    scroll_offset: &mut usize,
    key: KeyEvent,
    page_size: usize,
    total_rows: usize,
) -> Option<ProcSortBy> {
    let max_off = total_rows.saturating_sub(page_size);
    match key.code {
        KeyCode::Up => *scroll_offset = scroll_offset.saturating_sub(1),
        KeyCode::Down => *scroll_offset = (*scroll_offset + 1).min(max_off),
        KeyCode::PageUp => *scroll_offset = scroll_offset.saturating_sub(page_size.max(1)),
        KeyCode::PageDown => *scroll_offset = (*scroll_offset + page_size.max(1)).min(max_off),
        KeyCode::Home => *scroll_offset = 0,
        KeyCode::End => *scroll_offset = max_off,
        KeyCode::Char('c') => return Some(ProcSortBy::CpuDesc),
        KeyCode::Char('m') => return Some(ProcSortBy::MemDesc),
        _ => {}
    }
    None
}
