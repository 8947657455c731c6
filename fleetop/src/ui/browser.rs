//! Server overview: one row per server with status and the configured summary columns.

use std::sync::Arc;

use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table},
};

use crate::browser::BrowserState;
use crate::servers::columns::Column;
use crate::servers::{ServerRecord, ServerStatus};
use crate::ui::theme::{alert_color, status_color};
use crate::ui::util::truncate_middle;

/// Rows kept for the header lines and the table header.
pub const CHROME_ROWS: u16 = 3;

const STATUSES: [ServerStatus; 5] = [
    ServerStatus::Online,
    ServerStatus::Snmp,
    ServerStatus::Protected,
    ServerStatus::Offline,
    ServerStatus::Unknown,
];

pub fn headline(count: usize, scanning: bool) -> String {
    match count {
        0 if scanning => "Scanning the network...".to_string(),
        0 => "No server available".to_string(),
        1 => "1 server available".to_string(),
        n => format!("{n} servers available"),
    }
}

pub fn status_counts(servers: &[Arc<ServerRecord>]) -> Vec<(ServerStatus, usize)> {
    STATUSES
        .iter()
        .map(|s| (*s, servers.iter().filter(|r| r.status() == *s).count()))
        .filter(|(_, n)| *n > 0)
        .collect()
}

pub fn draw_overview(
    f: &mut ratatui::Frame<'_>,
    servers: &[Arc<ServerRecord>],
    columns: &[Column],
    state: &BrowserState,
    scanning: bool,
) {
    let area = f.area();
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Min(1),
        ])
        .split(area);

    let mut title = headline(servers.len(), scanning);
    let pages = state.page_count(servers.len());
    if pages > 1 {
        title.push_str(&format!(
            " | page {}/{pages}",
            state.current_page + 1
        ));
    }
    title.push_str(&format!(" | sort: {}", state.sort_mode.label()));
    f.render_widget(
        Paragraph::new(Line::from(Span::styled(
            title,
            Style::default().add_modifier(Modifier::BOLD),
        ))),
        rows[0],
    );

    let mut counts: Vec<Span> = Vec::new();
    for (status, n) in status_counts(servers) {
        if !counts.is_empty() {
            counts.push(Span::raw("  "));
        }
        counts.push(Span::styled(
            format!("{status}: {n}"),
            Style::default().fg(status_color(status)),
        ));
    }
    counts.push(Span::styled(
        "   (Enter connect, 1/2/3 sort, q quit)",
        Style::default().fg(Color::DarkGray),
    ));
    f.render_widget(Paragraph::new(Line::from(counts)), rows[1]);

    draw_table(f, rows[2], servers, columns, state);
}

fn draw_table(
    f: &mut ratatui::Frame<'_>,
    area: Rect,
    servers: &[Arc<ServerRecord>],
    columns: &[Column],
    state: &BrowserState,
) {
    let mut widths = vec![
        Constraint::Length(20), // name
        Constraint::Length(10), // status
        Constraint::Length(22), // ip:port
        Constraint::Length(5),  // proto
    ];
    widths.extend(columns.iter().map(|_| Constraint::Length(12)));

    let mut header = vec![
        "NAME".to_string(),
        "STATUS".to_string(),
        "ADDRESS".to_string(),
        "PROTO".to_string(),
    ];
    header.extend(columns.iter().map(|c| {
        let (plugin, field) = c.headers();
        format!("{plugin} {field}")
    }));

    let page = state.visible(servers);
    let table_rows = page.iter().enumerate().map(|(i, rec)| {
        let snap = rec.snapshot();
        let mut cells = vec![
            Cell::from(truncate_middle(rec.display_name(), 20)),
            Cell::from(snap.status.as_str()).style(Style::default().fg(status_color(snap.status))),
            Cell::from(format!("{}:{}", rec.ip, rec.port)),
            Cell::from(rec.protocol.as_str()),
        ];
        cells.extend(columns.iter().map(|c| {
            let cell = Cell::from(c.render(&snap));
            match c.alert(&snap) {
                Some(a) => cell.style(Style::default().fg(alert_color(a))),
                None => cell,
            }
        }));
        let row = Row::new(cells);
        if i == state.cursor_position {
            row.style(Style::default().add_modifier(Modifier::REVERSED))
        } else {
            row
        }
    });

    let table = Table::new(table_rows, widths)
        .header(
            Row::new(header)
                .style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
        )
        .block(Block::default().borders(Borders::NONE))
        .column_spacing(1);
    f.render_widget(table, area);
}
