//! Overview navigation over several pages, driven through key handling.

use crossterm::event::KeyCode;
use fleetop::browser::{BrowserAction, BrowserState, SortMode};

fn absolute(s: &BrowserState) -> usize {
    s.current_page * s.page_size + s.cursor_position
}

#[test]
fn down_visits_every_row_then_wraps() {
    let len = 7;
    let mut s = BrowserState::new(3);
    let mut seen = vec![absolute(&s)];
    for _ in 0..len {
        s.handle_key(KeyCode::Down, len);
        seen.push(absolute(&s));
    }
    assert_eq!(seen, [0, 1, 2, 3, 4, 5, 6, 0]);
    assert_eq!((s.current_page, s.cursor_position), (0, 0));
}

#[test]
fn up_from_top_lands_on_last_row() {
    let len = 7;
    let mut s = BrowserState::new(3);
    s.handle_key(KeyCode::Up, len);
    assert_eq!((s.current_page, s.cursor_position), (2, 0));
    let mut seen = vec![absolute(&s)];
    for _ in 0..6 {
        s.handle_key(KeyCode::Char('k'), len);
        seen.push(absolute(&s));
    }
    assert_eq!(seen, [6, 5, 4, 3, 2, 1, 0]);
}

#[test]
fn cursor_never_leaves_the_list() {
    let len = 7;
    let mut s = BrowserState::new(3);
    let keys = [
        KeyCode::Down,
        KeyCode::PageDown,
        KeyCode::Down,
        KeyCode::PageDown,
        KeyCode::Up,
        KeyCode::PageUp,
        KeyCode::Char('j'),
        KeyCode::PageUp,
        KeyCode::Up,
    ];
    for k in keys.iter().cycle().take(200) {
        s.handle_key(*k, len);
        assert!(absolute(&s) < len, "{s:?}");
        assert!(s.cursor_position < s.page_lines(s.current_page, len));
    }
}

#[test]
fn enter_on_last_page_connects_to_absolute_row() {
    let len = 7;
    let mut s = BrowserState::new(3);
    s.handle_key(KeyCode::PageDown, len);
    s.handle_key(KeyCode::PageDown, len);
    assert_eq!(s.handle_key(KeyCode::Enter, len), BrowserAction::Connect(6));
    assert_eq!(s.active_server, Some(6));
}

#[test]
fn sorting_resets_to_first_row() {
    let len = 7;
    let mut s = BrowserState::new(3);
    s.handle_key(KeyCode::PageDown, len);
    s.handle_key(KeyCode::Down, len);
    s.handle_key(KeyCode::Char('3'), len);
    assert_eq!(s.sort_mode, SortMode::Descending);
    assert_eq!(absolute(&s), 0);
    assert_eq!(s.handle_key(KeyCode::Char('q'), len), BrowserAction::Quit);
}
