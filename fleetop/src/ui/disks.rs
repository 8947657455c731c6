//! File-system cards with per-mount gauge and title line.

use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::Style,
    widgets::{Block, Borders, Gauge},
};

use crate::limits::Limits;
use crate::stats::Stats;
use crate::ui::theme::alert_color;
use crate::ui::util::{fs_icon, human, truncate_middle};

pub fn draw_disks(f: &mut ratatui::Frame<'_>, area: Rect, m: Option<&Stats>, limits: &Limits) {
    f.render_widget(
        Block::default().borders(Borders::ALL).title("File systems"),
        area,
    );
    let Some(mm) = m else { return };

    let inner = Rect {
        x: area.x + 1,
        y: area.y + 1,
        width: area.width.saturating_sub(2),
        height: area.height.saturating_sub(2),
    };
    if inner.height < 3 {
        return;
    }

    let per_card_h = 3u16;
    let max_cards = (inner.height / per_card_h).min(mm.fs.len() as u16) as usize;
    let constraints: Vec<Constraint> = (0..max_cards)
        .map(|_| Constraint::Length(per_card_h))
        .collect();
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints(constraints)
        .split(inner);

    for (slot, fs) in rows.iter().zip(&mm.fs) {
        let pct = fs.percent.clamp(0.0, 100.0);
        let color = alert_color(limits.alert("fs", pct));
        let title = format!(
            "{} {}   {} / {}  ({:.0}%)",
            fs_icon(&fs.device_name, &fs.fs_type),
            truncate_middle(&fs.mnt_point, (slot.width.saturating_sub(6)) as usize / 2),
            human(fs.used),
            human(fs.size),
            pct
        );
        f.render_widget(Block::default().borders(Borders::ALL).title(title), *slot);

        let inner_card = Rect {
            x: slot.x + 1,
            y: slot.y + 1,
            width: slot.width.saturating_sub(2),
            height: slot.height.saturating_sub(2),
        };
        if inner_card.height == 0 {
            continue;
        }
        let gauge_rect = Rect {
            x: inner_card.x,
            y: inner_card.y + inner_card.height / 2,
            width: inner_card.width,
            height: 1,
        };
        f.render_widget(
            Gauge::default()
                .percent(pct as u16)
                .gauge_style(Style::default().fg(color)),
            gauge_rect,
        );
    }
}
