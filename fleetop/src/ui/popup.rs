//! Centered modal boxes drawn over the overview.

use ratatui::{
    layout::{Alignment, Rect},
    style::{Color, Modifier, Style},
    text::Line,
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
};

pub fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let w = width.min(area.width);
    let h = height.min(area.height);
    Rect {
        x: area.x + (area.width - w) / 2,
        y: area.y + (area.height - h) / 2,
        width: w,
        height: h,
    }
}

/// Message box; the caller waits for a key.
pub fn draw_message(f: &mut ratatui::Frame<'_>, title: &str, lines: &[String]) {
    let width = lines
        .iter()
        .map(|l| l.chars().count())
        .max()
        .unwrap_or(0)
        .max(title.chars().count())
        .saturating_add(4)
        .min(u16::MAX as usize) as u16;
    let rect = centered(f.area(), width.max(30), lines.len() as u16 + 4);
    let mut text: Vec<Line> = lines.iter().map(|l| Line::from(l.as_str())).collect();
    text.push(Line::from(""));
    text.push(Line::from("Press any key...").style(Style::default().fg(Color::DarkGray)));
    f.render_widget(Clear, rect);
    f.render_widget(
        Paragraph::new(text)
            .wrap(Wrap { trim: false })
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(title.to_string())
                    .title_style(Style::default().add_modifier(Modifier::BOLD)),
            ),
        rect,
    );
}

/// Masked single-line input.
pub fn draw_password_input(f: &mut ratatui::Frame<'_>, prompt: &str, typed: usize) {
    let rect = centered(f.area(), (prompt.chars().count() as u16 + 6).max(40), 5);
    let text = vec![
        Line::from(prompt.to_string()),
        Line::from("*".repeat(typed)).alignment(Alignment::Left),
    ];
    f.render_widget(Clear, rect);
    f.render_widget(
        Paragraph::new(text).block(
            Block::default()
                .borders(Borders::ALL)
                .title("Password (Enter to confirm, Esc to cancel)"),
        ),
        rect,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn centered_fits_inside() {
        let r = centered(Rect::new(0, 0, 80, 24), 40, 6);
        assert_eq!(r, Rect::new(20, 9, 40, 6));
        let small = centered(Rect::new(0, 0, 10, 4), 40, 6);
        assert_eq!(small, Rect::new(0, 0, 10, 4));
    }
}
