//! Server browser: the overview state machine and the loop that drives it.
//!
//! [`BrowserState`] is pure (paging, cursor, sort, selection) so it can be tested without a
//! terminal. [`BrowserSession`] owns the terminal, refreshes poll workers, and hands control
//! to a [`ClientSession`] when a server is selected.

use std::{cmp::Reverse, path::PathBuf, sync::Arc, time::Duration};

use anyhow::Result;
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use tracing::{debug, info, warn};

use crate::app::App;
use crate::export::Export;
use crate::limits::Limits;
use crate::password::digest;
use crate::poller::Poller;
use crate::servers::{Protocol, ServerField, ServerList, ServerRecord, ServerStatus};
use crate::session::{ClientMode, ClientSession, SessionConfig, SessionError, SESSION_TIMEOUT};
use crate::terminal::Tui;
use crate::timer::Timer;
use crate::ui::{browser::draw_overview, browser::CHROME_ROWS, popup};

/// Keyboard is polled at this interval while waiting out a refresh.
pub const KEY_POLL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortMode {
    #[default]
    None,
    Ascending,
    Descending,
}

impl SortMode {
    pub fn label(self) -> &'static str {
        match self {
            SortMode::None => "none",
            SortMode::Ascending => "status asc",
            SortMode::Descending => "status desc",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrowserAction {
    None,
    Quit,
    /// Index into the working (possibly sorted) list.
    Connect(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowserState {
    pub current_page: usize,
    pub page_size: usize,
    pub cursor_position: usize,
    pub active_server: Option<usize>,
    pub sort_mode: SortMode,
}

impl BrowserState {
    pub fn new(page_size: usize) -> Self {
        Self {
            current_page: 0,
            page_size: page_size.max(1),
            cursor_position: 0,
            active_server: None,
            sort_mode: SortMode::None,
        }
    }

    /// Page size follows the terminal height; keep the cursor on a valid row.
    pub fn set_page_size(&mut self, page_size: usize, len: usize) {
        let page_size = page_size.max(1);
        if page_size == self.page_size {
            return;
        }
        let absolute = self.current_page * self.page_size + self.cursor_position;
        self.page_size = page_size;
        self.current_page = absolute / page_size;
        self.cursor_position = absolute % page_size;
        self.clamp(len);
    }

    pub fn page_count(&self, len: usize) -> usize {
        len.div_ceil(self.page_size).max(1)
    }

    /// Rows on `page`; the last page holds the remainder (a full page when it divides evenly).
    pub fn page_lines(&self, page: usize, len: usize) -> usize {
        if len == 0 {
            return 0;
        }
        if page + 1 < self.page_count(len) {
            self.page_size
        } else {
            match len % self.page_size {
                0 => self.page_size,
                r => r,
            }
        }
    }

    /// The list shrank (discovery removal): pull page and cursor back in range.
    pub fn clamp(&mut self, len: usize) {
        let pages = self.page_count(len);
        if self.current_page >= pages {
            self.current_page = pages - 1;
        }
        let lines = self.page_lines(self.current_page, len);
        if self.cursor_position >= lines {
            self.cursor_position = lines.saturating_sub(1);
        }
    }

    pub fn cursor_down(&mut self, len: usize) {
        if len == 0 {
            return;
        }
        if self.cursor_position + 1 < self.page_lines(self.current_page, len) {
            self.cursor_position += 1;
        } else {
            self.current_page = (self.current_page + 1) % self.page_count(len);
            self.cursor_position = 0;
        }
    }

    pub fn cursor_up(&mut self, len: usize) {
        if len == 0 {
            return;
        }
        if self.cursor_position > 0 {
            self.cursor_position -= 1;
        } else if self.current_page == 0 {
            self.current_page = self.page_count(len) - 1;
            self.cursor_position = (len - 1) % self.page_size;
        } else {
            self.current_page -= 1;
            self.cursor_position = self.page_size - 1;
        }
    }

    pub fn page_down(&mut self, len: usize) {
        self.current_page = (self.current_page + 1) % self.page_count(len);
        self.cursor_position = 0;
    }

    pub fn page_up(&mut self, len: usize) {
        let pages = self.page_count(len);
        self.current_page = (self.current_page + pages - 1) % pages;
        self.cursor_position = 0;
    }

    pub fn set_sort(&mut self, mode: SortMode) {
        self.sort_mode = mode;
        self.current_page = 0;
        self.cursor_position = 0;
    }

    /// Enter: remember the row under the cursor.
    pub fn select(&mut self, len: usize) -> Option<usize> {
        let idx = self.current_page * self.page_size + self.cursor_position;
        self.active_server = (idx < len).then_some(idx);
        self.active_server
    }

    /// Back to the overview.
    pub fn release(&mut self) {
        self.active_server = None;
    }

    pub fn handle_key(&mut self, code: KeyCode, len: usize) -> BrowserAction {
        match code {
            KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => return BrowserAction::Quit,
            KeyCode::Down | KeyCode::Char('j') => self.cursor_down(len),
            KeyCode::Up | KeyCode::Char('k') => self.cursor_up(len),
            KeyCode::PageDown => self.page_down(len),
            KeyCode::PageUp => self.page_up(len),
            KeyCode::Char('1') => self.set_sort(SortMode::None),
            KeyCode::Char('2') => self.set_sort(SortMode::Ascending),
            KeyCode::Char('3') => self.set_sort(SortMode::Descending),
            KeyCode::Enter => {
                if let Some(idx) = self.select(len) {
                    return BrowserAction::Connect(idx);
                }
            }
            _ => {}
        }
        BrowserAction::None
    }

    /// Working copy in display order. Statuses are read once per record, so concurrent
    /// poller writes cannot make the ordering inconsistent mid-sort.
    pub fn sorted(&self, mut servers: Vec<Arc<ServerRecord>>) -> Vec<Arc<ServerRecord>> {
        match self.sort_mode {
            SortMode::None => {}
            SortMode::Ascending => servers.sort_by_cached_key(|r| r.status().sort_priority()),
            SortMode::Descending => {
                servers.sort_by_cached_key(|r| Reverse(r.status().sort_priority()))
            }
        }
        servers
    }

    /// Rows of the current page.
    pub fn visible<'a, T>(&self, servers: &'a [T]) -> &'a [T] {
        let start = (self.current_page * self.page_size).min(servers.len());
        let end = (start + self.page_size).min(servers.len());
        &servers[start..end]
    }
}

/// Position of `record` in the merged (unsorted) list, the index space writes are routed by.
pub fn merged_index(all: &[Arc<ServerRecord>], record: &Arc<ServerRecord>) -> Option<usize> {
    all.iter().position(|r| Arc::ptr_eq(r, record))
}

/// Status a finished session leaves on its record.
pub fn outcome_status(outcome: &Result<ClientMode, SessionError>) -> ServerStatus {
    match outcome {
        Ok(ClientMode::Glances) => ServerStatus::Online,
        Ok(ClientMode::Snmp) => ServerStatus::Snmp,
        Err(_) => ServerStatus::Offline,
    }
}

/// Store `status` on `record` if it is still listed (discovery may have dropped it while
/// the session ran). Returns whether anything was written.
pub fn write_back(list: &ServerList, record: &Arc<ServerRecord>, status: ServerStatus) -> bool {
    match merged_index(&list.get_servers_list(), record) {
        Some(i) => list.set_in_selected(i, ServerField::Status(status)),
        None => false,
    }
}

/// Knobs the browser passes down to each session.
#[derive(Debug, Clone)]
pub struct BrowserSettings {
    pub refresh: Duration,
    pub log_file: PathBuf,
    pub limits: Limits,
    pub snmp_community: String,
    pub snmp_port: u16,
    pub export_json: Option<PathBuf>,
}

pub struct BrowserSession {
    list: ServerList,
    poller: Poller,
    state: BrowserState,
    settings: BrowserSettings,
}

impl BrowserSession {
    pub fn new(list: ServerList, settings: BrowserSettings) -> Self {
        let poller = Poller::new(&list);
        Self {
            list,
            poller,
            state: BrowserState::new(1),
            settings,
        }
    }

    pub async fn run(mut self) -> Result<()> {
        let mut tui = Tui::enter()?;
        let mut refresh = Timer::new(Duration::ZERO);
        let res = loop {
            if refresh.finished() {
                self.poller.update_servers_stats(&self.list);
                refresh.reset(Some(self.settings.refresh));
            }

            let servers = self.state.sorted(self.list.get_servers_list());
            let height = tui.terminal().size()?.height;
            self.state
                .set_page_size(height.saturating_sub(CHROME_ROWS) as usize, servers.len());
            self.state.clamp(servers.len());
            let scanning = self.list.discovery_active() && self.list.discovered().is_empty();
            let columns = self.list.columns().to_vec();
            tui.terminal()
                .draw(|f| draw_overview(f, &servers, &columns, &self.state, scanning))?;

            let mut action = BrowserAction::None;
            while event::poll(Duration::ZERO)? {
                if let Event::Key(k) = event::read()? {
                    if k.kind != KeyEventKind::Press {
                        continue;
                    }
                    if k.code == KeyCode::Char('c') && k.modifiers.contains(KeyModifiers::CONTROL)
                    {
                        action = BrowserAction::Quit;
                        break;
                    }
                    action = self.state.handle_key(k.code, servers.len());
                    if action != BrowserAction::None {
                        break;
                    }
                }
            }

            match action {
                BrowserAction::Quit => break Ok(()),
                BrowserAction::Connect(i) => {
                    if let Some(record) = servers.get(i).cloned() {
                        if let Err(e) = self.connect(&mut tui, &record).await {
                            break Err(e);
                        }
                    }
                    self.state.release();
                    refresh.reset(Some(Duration::ZERO));
                }
                BrowserAction::None => tokio::time::sleep(KEY_POLL).await,
            }
        };

        drop(tui);
        info!("Leaving the browser, joining poll workers");
        self.poller.shutdown().await;
        self.list.close();
        res
    }

    /// Drill into one server. The overview terminal is released for the session and
    /// re-entered afterwards.
    async fn connect(&mut self, tui: &mut Tui, record: &Arc<ServerRecord>) -> Result<()> {
        let Some(index) = merged_index(&self.list.get_servers_list(), record) else {
            return Ok(());
        };

        if record.protocol == Protocol::Rest {
            let url = record.uri();
            info!("{} speaks REST, not opening a session", record.key);
            self.modal(
                tui,
                "REST server",
                &[
                    format!("{} is served over REST.", record.display_name()),
                    format!("Open {url} in a browser."),
                ],
            )
            .await?;
            return Ok(());
        }

        // Configured password first; ask when there is none or it was already rejected.
        if record.password().is_none() {
            let mut clear = self.list.passwords().lookup(&record.name).map(str::to_string);
            if clear.is_none() || record.status() == ServerStatus::Protected {
                let prompt = format!("Password needed for {}:", record.display_name());
                clear = self.prompt_password(tui, &prompt).await?;
            }
            if let Some(clear) = clear {
                self.list
                    .set_in_selected(index, ServerField::Password(Some(digest(&clear))));
            }
        }

        let mut config = SessionConfig::for_record(record, self.settings.refresh);
        config.timeout = SESSION_TIMEOUT;
        config.snmp_community = self.settings.snmp_community.clone();
        config.snmp_port = self.settings.snmp_port;

        let mut exports: Vec<Box<dyn Export>> = Vec::new();
        if let Some(path) = &self.settings.export_json {
            match crate::export::JsonLinesExport::open(path) {
                Ok(e) => exports.push(Box::new(e)),
                Err(e) => warn!("cannot open export file {}: {e}", path.display()),
            }
        }

        tui.leave()?;
        info!("Connecting to {} ({})", record.display_name(), record.uri());
        let outcome = ClientSession::new(config, self.settings.limits.clone())
            .with_display(Box::new(App::new(record.display_name())))
            .with_exports(exports)
            .run()
            .await;
        *tui = Tui::enter()?;

        if !write_back(&self.list, record, outcome_status(&outcome)) {
            debug!("{} left the list during its session", record.key);
        }
        if let Err(e) = outcome {
            warn!("Session with {} failed: {e}", record.uri());
            self.modal(
                tui,
                "Connection failed",
                &[
                    format!("Cannot connect to {}", record.display_name()),
                    e.to_string(),
                    format!("See {} for details.", self.settings.log_file.display()),
                ],
            )
            .await?;
        }
        Ok(())
    }

    /// Show a message over the overview until any key is pressed.
    async fn modal(&mut self, tui: &mut Tui, title: &str, lines: &[String]) -> Result<()> {
        loop {
            let servers = self.state.sorted(self.list.get_servers_list());
            let columns = self.list.columns().to_vec();
            tui.terminal().draw(|f| {
                draw_overview(f, &servers, &columns, &self.state, false);
                popup::draw_message(f, title, lines);
            })?;
            while event::poll(Duration::ZERO)? {
                if let Event::Key(k) = event::read()? {
                    if k.kind == KeyEventKind::Press {
                        return Ok(());
                    }
                }
            }
            tokio::time::sleep(KEY_POLL).await;
        }
    }

    async fn prompt_password(&mut self, tui: &mut Tui, prompt: &str) -> Result<Option<String>> {
        let mut typed = String::new();
        loop {
            let servers = self.state.sorted(self.list.get_servers_list());
            let columns = self.list.columns().to_vec();
            let n = typed.chars().count();
            tui.terminal().draw(|f| {
                draw_overview(f, &servers, &columns, &self.state, false);
                popup::draw_password_input(f, prompt, n);
            })?;
            while event::poll(Duration::ZERO)? {
                let Event::Key(k) = event::read()? else {
                    continue;
                };
                if k.kind != KeyEventKind::Press {
                    continue;
                }
                match k.code {
                    KeyCode::Enter => return Ok(Some(typed)),
                    KeyCode::Esc => return Ok(None),
                    KeyCode::Char('c') if k.modifiers.contains(KeyModifiers::CONTROL) => {
                        return Ok(None)
                    }
                    KeyCode::Backspace => {
                        typed.pop();
                    }
                    KeyCode::Char(c) => typed.push(c),
                    _ => {}
                }
            }
            tokio::time::sleep(KEY_POLL).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::servers::Origin;

    fn rec(key: &str, status: ServerStatus) -> Arc<ServerRecord> {
        let r = ServerRecord::new(key, key, "10.0.0.1", 61209, Protocol::Rpc, Origin::Static);
        r.set_status(status);
        Arc::new(r)
    }

    #[test]
    fn last_page_holds_the_remainder() {
        let s = BrowserState::new(3);
        assert_eq!(s.page_count(7), 3);
        assert_eq!(s.page_lines(2, 7), 1);
        assert_eq!(s.page_lines(1, 6), 3, "evenly divided list keeps a full last page");
        assert_eq!(s.page_lines(0, 0), 0);
    }

    #[test]
    fn down_and_up_cross_pages() {
        let mut s = BrowserState::new(3);
        s.cursor_down(7);
        s.cursor_down(7);
        assert_eq!((s.current_page, s.cursor_position), (0, 2));
        s.cursor_down(7);
        assert_eq!((s.current_page, s.cursor_position), (1, 0));
        s.cursor_up(7);
        assert_eq!((s.current_page, s.cursor_position), (0, 2));
    }

    #[test]
    fn page_keys_wrap_and_reset_cursor() {
        let mut s = BrowserState::new(3);
        s.cursor_down(7);
        s.page_up(7);
        assert_eq!((s.current_page, s.cursor_position), (2, 0));
        s.page_down(7);
        assert_eq!((s.current_page, s.cursor_position), (0, 0));
    }

    #[test]
    fn sort_keys_reset_position_and_order_by_priority() {
        let mut s = BrowserState::new(3);
        s.page_down(7);
        assert_eq!(s.handle_key(KeyCode::Char('2'), 7), BrowserAction::None);
        assert_eq!((s.current_page, s.cursor_position), (0, 0));
        assert_eq!(s.sort_mode, SortMode::Ascending);

        let list = vec![
            rec("on", ServerStatus::Online),
            rec("unk", ServerStatus::Unknown),
            rec("snmp", ServerStatus::Snmp),
            rec("off", ServerStatus::Offline),
        ];
        let keys = |v: &[Arc<ServerRecord>]| v.iter().map(|r| r.key.clone()).collect::<Vec<_>>();
        assert_eq!(keys(&s.sorted(list.clone())), ["unk", "off", "snmp", "on"]);
        s.handle_key(KeyCode::Char('3'), 4);
        assert_eq!(keys(&s.sorted(list.clone())), ["on", "snmp", "off", "unk"]);
        s.handle_key(KeyCode::Char('1'), 4);
        assert_eq!(keys(&s.sorted(list)), ["on", "unk", "snmp", "off"]);
    }

    #[test]
    fn enter_selects_absolute_index() {
        let mut s = BrowserState::new(3);
        s.page_down(7);
        s.cursor_down(7);
        assert_eq!(s.handle_key(KeyCode::Enter, 7), BrowserAction::Connect(4));
        assert_eq!(s.active_server, Some(4));
        s.release();
        assert_eq!(s.active_server, None);
        assert_eq!(BrowserState::new(3).handle_key(KeyCode::Enter, 0), BrowserAction::None);
    }

    #[test]
    fn quit_keys() {
        let mut s = BrowserState::new(3);
        assert_eq!(s.handle_key(KeyCode::Char('q'), 7), BrowserAction::Quit);
        assert_eq!(s.handle_key(KeyCode::Esc, 7), BrowserAction::Quit);
    }

    #[test]
    fn shrinking_list_clamps_cursor() {
        let mut s = BrowserState::new(3);
        s.page_up(7);
        assert_eq!(s.current_page, 2);
        s.clamp(4);
        assert_eq!((s.current_page, s.cursor_position), (1, 0));
        s.clamp(0);
        assert_eq!((s.current_page, s.cursor_position), (0, 0));
    }

    #[test]
    fn resize_keeps_the_selected_row() {
        let mut s = BrowserState::new(3);
        s.page_down(7);
        s.cursor_down(7); // absolute 4
        s.set_page_size(5, 7);
        assert_eq!((s.current_page, s.cursor_position), (0, 4));
    }

    #[test]
    fn visible_slice_and_merged_index() {
        let list: Vec<_> = (0..7).map(|i| rec(&format!("s{i}"), ServerStatus::Unknown)).collect();
        let mut s = BrowserState::new(3);
        s.page_up(7);
        assert_eq!(s.visible(&list).len(), 1);
        assert_eq!(merged_index(&list, &list[6]), Some(6));
        let stranger = rec("s6", ServerStatus::Unknown);
        assert_eq!(merged_index(&list, &stranger), None);
    }

    fn fleet() -> ServerList {
        use crate::password::PasswordVault;
        use crate::servers::columns::{parse_columns, DEFAULT_COLUMNS};
        use crate::servers::discovery::DiscoveryRegistry;
        use crate::servers::static_list::StaticRegistry;

        let alpha = ServerRecord::new(
            "alpha:61209",
            "alpha",
            "10.0.0.1",
            61209,
            Protocol::Rpc,
            Origin::Static,
        );
        let list = ServerList::new(
            StaticRegistry::from_records(vec![alpha]),
            DiscoveryRegistry::disabled(),
            PasswordVault::default(),
            parse_columns(DEFAULT_COLUMNS),
        );
        list.discovered().add_server(
            "beta:61209._fleetop._tcp.local.",
            "10.0.0.2".parse().unwrap(),
            61209,
            Protocol::Rpc,
        );
        list
    }

    #[test]
    fn session_outcome_maps_to_status() {
        assert_eq!(outcome_status(&Ok(ClientMode::Glances)), ServerStatus::Online);
        assert_eq!(outcome_status(&Ok(ClientMode::Snmp)), ServerStatus::Snmp);
        let failed = Err(SessionError::BadCredentials {
            uri: "http://10.0.0.1:61209".into(),
        });
        assert_eq!(outcome_status(&failed), ServerStatus::Offline);
    }

    #[test]
    fn write_back_targets_the_same_record() {
        let list = fleet();
        let beta = list.get(1).unwrap();
        assert!(write_back(&list, &beta, ServerStatus::Snmp));
        assert_eq!(beta.status(), ServerStatus::Snmp);
        assert_eq!(list.get(0).unwrap().status(), ServerStatus::Unknown);

        let alpha = list.get(0).unwrap();
        assert!(write_back(&list, &alpha, ServerStatus::Offline));
        assert_eq!(alpha.status(), ServerStatus::Offline);
    }

    #[test]
    fn write_back_skips_a_vanished_record() {
        let list = fleet();
        let beta = list.get(1).unwrap();
        list.discovered()
            .remove_server("beta:61209._fleetop._tcp.local.");
        assert!(!write_back(&list, &beta, ServerStatus::Online));
        assert_eq!(beta.status(), ServerStatus::Unknown);
        assert_eq!(list.get(0).unwrap().status(), ServerStatus::Unknown);

        // Re-announced under the same key: a new record, so the stale handle still misses.
        list.discovered().add_server(
            "beta:61209._fleetop._tcp.local.",
            "10.0.0.2".parse().unwrap(),
            61209,
            Protocol::Rpc,
        );
        assert!(!write_back(&list, &beta, ServerStatus::Online));
        assert_eq!(list.get(1).unwrap().status(), ServerStatus::Unknown);
    }
}
