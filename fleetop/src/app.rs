//! Session view: folds each refresh into chart history, draws the dashboard, and waits out
//! the refresh interval while handling keys.

use std::{
    collections::VecDeque,
    io,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use tokio::time::sleep;

use crate::history::{push_capped, PerCoreHistory, RateMeter, HISTORY_CAP};
use crate::limits::Limits;
use crate::session::{ConnectionStatus, SessionDisplay};
use crate::stats::Stats;
use crate::terminal::Tui;
use crate::ui::cpu::{draw_cpu_avg_graph, draw_per_core_bars};
use crate::ui::disks::draw_disks;
use crate::ui::header::draw_header;
use crate::ui::mem::{draw_mem, draw_swap};
use crate::ui::net::draw_net_rates;
use crate::ui::processes::{draw_top_processes, processes_handle_key, ProcSortBy};

/// Key polling granularity inside a refresh wait.
const TICK: Duration = Duration::from_millis(50);

pub struct App {
    tui: Option<Tui>,
    host: String,
    status: ConnectionStatus,
    limits: Limits,

    last_stats: Option<Stats>,
    cpu_hist: VecDeque<u64>,
    per_core_hist: PerCoreHistory,
    net: RateMeter,

    pub procs_scroll_offset: usize,
    pub procs_sort_by: ProcSortBy,
    last_procs_area: Option<Rect>,
}

impl App {
    pub fn new(host: &str) -> Self {
        Self {
            tui: None,
            host: host.to_string(),
            status: ConnectionStatus::Disconnected,
            limits: Limits::default(),
            last_stats: None,
            cpu_hist: VecDeque::with_capacity(HISTORY_CAP),
            per_core_hist: PerCoreHistory::new(60),
            net: RateMeter::default(),
            procs_scroll_offset: 0,
            procs_sort_by: ProcSortBy::CpuDesc,
            last_procs_area: None,
        }
    }

    fn ingest(&mut self, stats: &Stats, status: ConnectionStatus) {
        self.status = status;
        if status == ConnectionStatus::Disconnected && self.last_stats.is_some() {
            // Keep the last good frame on screen; the header shows the outage.
            return;
        }
        let v = stats.cpu.total.clamp(0.0, 100.0).round() as u64;
        push_capped(&mut self.cpu_hist, v, HISTORY_CAP);

        let per_core: Vec<f64> = stats.percpu.iter().map(|c| c.total).collect();
        self.per_core_hist.push_samples(&per_core);

        let rx_total = stats.network.iter().map(|n| n.bytes_recv_gauge).sum::<u64>();
        let tx_total = stats.network.iter().map(|n| n.bytes_sent_gauge).sum::<u64>();
        self.net.push(rx_total, tx_total, Instant::now());

        self.last_stats = Some(stats.clone());
    }

    fn redraw(&mut self) -> io::Result<()> {
        let Some(mut tui) = self.tui.take() else {
            return Ok(());
        };
        let res = tui.terminal().draw(|f| self.draw(f)).map(|_| ());
        self.tui = Some(tui);
        res
    }

    /// Returns true when the key asks to leave the session.
    fn on_key(&mut self, code: KeyCode, modifiers: KeyModifiers) -> bool {
        if matches!(code, KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc)
            || (code == KeyCode::Char('c') && modifiers.contains(KeyModifiers::CONTROL))
        {
            return true;
        }
        let total_rows = self
            .last_stats
            .as_ref()
            .map(|s| s.processlist.len())
            .unwrap_or(0);
        // borders (2) + header (1)
        let page = self
            .last_procs_area
            .map(|a| a.height.saturating_sub(3).max(1) as usize)
            .unwrap_or(1);
        let key = crossterm::event::KeyEvent::new(code, modifiers);
        if let Some(sort) = processes_handle_key(&mut self.procs_scroll_offset, key, page, total_rows)
        {
            self.procs_sort_by = sort;
            self.procs_scroll_offset = 0;
        }
        false
    }

    pub fn draw(&mut self, f: &mut ratatui::Frame<'_>) {
        let area = f.area();
        let stats = self.last_stats.as_ref();

        // header, cpu row, memory, swap, bottom
        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1),
                Constraint::Ratio(1, 3),
                Constraint::Length(3),
                Constraint::Length(3),
                Constraint::Min(10),
            ])
            .split(area);

        draw_header(f, rows[0], &self.host, stats, self.status);

        let top_lr = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(66), Constraint::Percentage(34)])
            .split(rows[1]);
        draw_cpu_avg_graph(f, top_lr[0], &self.cpu_hist, stats, &self.limits);
        draw_per_core_bars(f, top_lr[1], stats, &self.per_core_hist, &self.limits);

        draw_mem(f, rows[2], stats, &self.limits);
        draw_swap(f, rows[3], stats, &self.limits);

        let bottom_lr = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
            .split(rows[4]);

        let left_stack = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(4), Constraint::Length(10)])
            .split(bottom_lr[0]);

        draw_disks(f, left_stack[0], stats, &self.limits);
        draw_net_rates(f, left_stack[1], &self.net);

        let procs_area = bottom_lr[1];
        self.last_procs_area = Some(procs_area);
        draw_top_processes(
            f,
            procs_area,
            stats,
            &self.limits,
            self.procs_scroll_offset,
            self.procs_sort_by,
        );
    }
}

#[async_trait]
impl SessionDisplay for App {
    fn init(&mut self) -> io::Result<()> {
        if self.tui.is_none() {
            self.tui = Some(Tui::enter()?);
        }
        Ok(())
    }

    async fn update(
        &mut self,
        stats: &Stats,
        limits: &Limits,
        status: ConnectionStatus,
        wait: Duration,
    ) -> io::Result<bool> {
        if self.limits != *limits {
            self.limits = limits.clone();
        }
        self.ingest(stats, status);
        self.redraw()?;

        let deadline = Instant::now() + wait;
        loop {
            let mut dirty = false;
            while event::poll(Duration::ZERO)? {
                match event::read()? {
                    Event::Key(k) if k.kind == KeyEventKind::Press => {
                        if self.on_key(k.code, k.modifiers) {
                            return Ok(true);
                        }
                        dirty = true;
                    }
                    Event::Resize(_, _) => dirty = true,
                    _ => {}
                }
            }
            if dirty {
                self.redraw()?;
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(false);
            }
            sleep(TICK.min(deadline - now)).await;
        }
    }

    fn end(&mut self) {
        // Dropping the guard restores the terminal.
        self.tui = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::{NetIface, PerCpu};

    fn sample(total: f64, rx: u64) -> Stats {
        let mut s = Stats::default();
        s.cpu.total = total;
        s.percpu = vec![PerCpu {
            cpu_number: 0,
            total,
            ..Default::default()
        }];
        s.network = vec![NetIface {
            interface_name: "eth0".into(),
            bytes_recv_gauge: rx,
            bytes_sent_gauge: 0,
        }];
        s
    }

    #[test]
    fn ingest_feeds_histories() {
        let mut app = App::new("alpha");
        app.ingest(&sample(42.4, 0), ConnectionStatus::Connected);
        app.ingest(&sample(150.0, 10), ConnectionStatus::Connected);
        assert_eq!(app.cpu_hist, [42, 100]);
        assert_eq!(app.per_core_hist.deques[0].len(), 2);
        assert_eq!(app.net.rx_hist.len(), 2);
    }

    #[test]
    fn outage_keeps_last_frame() {
        let mut app = App::new("alpha");
        app.ingest(&sample(10.0, 0), ConnectionStatus::Connected);
        app.ingest(&Stats::default(), ConnectionStatus::Disconnected);
        assert_eq!(app.status, ConnectionStatus::Disconnected);
        assert_eq!(app.cpu_hist.len(), 1);
        assert_eq!(app.last_stats.as_ref().map(|s| s.cpu.total), Some(10.0));
    }

    #[test]
    fn keys_quit_and_sort() {
        let mut app = App::new("alpha");
        assert!(app.on_key(KeyCode::Char('q'), KeyModifiers::NONE));
        assert!(app.on_key(KeyCode::Char('c'), KeyModifiers::CONTROL));
        assert!(!app.on_key(KeyCode::Char('m'), KeyModifiers::NONE));
        assert_eq!(app.procs_sort_by, ProcSortBy::MemDesc);
    }
}
