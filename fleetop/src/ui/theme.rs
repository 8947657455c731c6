//! Shared UI colors: scrollbar look, alert levels and server status.

use ratatui::style::Color;

use crate::limits::Alert;
use crate::servers::ServerStatus;

pub const SB_ARROW: Color = Color::Rgb(170, 170, 180);
pub const SB_TRACK: Color = Color::Rgb(170, 170, 180);
pub const SB_THUMB: Color = Color::Rgb(170, 170, 180);

pub fn alert_color(a: Alert) -> Color {
    match a {
        Alert::Ok => Color::Green,
        Alert::Careful => Color::Cyan,
        Alert::Warning => Color::Yellow,
        Alert::Critical => Color::Red,
    }
}

pub fn status_color(s: ServerStatus) -> Color {
    match s {
        ServerStatus::Online => Color::Green,
        ServerStatus::Snmp => Color::Cyan,
        ServerStatus::Protected => Color::Yellow,
        ServerStatus::Offline => Color::Red,
        ServerStatus::Unknown => Color::DarkGray,
    }
}
