//! Bounded history buffers for the session charts.

use std::collections::VecDeque;
use std::time::Instant;

/// Samples kept per chart; wider than any sane terminal.
pub const HISTORY_CAP: usize = 600;

pub fn push_capped<T>(dq: &mut VecDeque<T>, v: T, cap: usize) {
    if dq.len() == cap {
        dq.pop_front();
    }
    dq.push_back(v);
}

// One deque per core, rebuilt when the core count changes
pub struct PerCoreHistory {
    pub deques: Vec<VecDeque<u16>>,
    cap: usize,
}

impl PerCoreHistory {
    pub fn new(cap: usize) -> Self {
        Self {
            deques: Vec::new(),
            cap,
        }
    }

    pub fn ensure_cores(&mut self, n: usize) {
        if self.deques.len() == n {
            return;
        }
        self.deques = (0..n).map(|_| VecDeque::with_capacity(self.cap)).collect();
    }

    // Percentages, clamped into 0..=100
    pub fn push_samples(&mut self, samples: &[f64]) {
        self.ensure_cores(samples.len());
        for (i, v) in samples.iter().enumerate() {
            let val = v.clamp(0.0, 100.0).round() as u16;
            push_capped(&mut self.deques[i], val, self.cap);
        }
    }
}

/// Turns cumulative rx/tx byte counters into KB/s samples.
#[derive(Debug, Default)]
pub struct RateMeter {
    last: Option<(u64, u64, Instant)>,
    pub rx_hist: VecDeque<u64>,
    pub tx_hist: VecDeque<u64>,
    pub rx_peak: u64,
    pub tx_peak: u64,
}

impl RateMeter {
    pub fn push(&mut self, rx_total: u64, tx_total: u64, now: Instant) -> (u64, u64) {
        let (rx_kb, tx_kb) = match self.last {
            Some((prx, ptx, pts)) => {
                let dt = now.duration_since(pts).as_secs_f64().max(1e-6);
                let rx = (rx_total.saturating_sub(prx) as f64 / dt / 1024.0).round() as u64;
                let tx = (tx_total.saturating_sub(ptx) as f64 / dt / 1024.0).round() as u64;
                (rx, tx)
            }
            None => (0, 0),
        };
        self.last = Some((rx_total, tx_total, now));
        push_capped(&mut self.rx_hist, rx_kb, HISTORY_CAP);
        push_capped(&mut self.tx_hist, tx_kb, HISTORY_CAP);
        self.rx_peak = self.rx_peak.max(rx_kb);
        self.tx_peak = self.tx_peak.max(tx_kb);
        (rx_kb, tx_kb)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn capped_push_drops_oldest() {
        let mut dq = VecDeque::new();
        for v in 0..5 {
            push_capped(&mut dq, v, 3);
        }
        assert_eq!(dq, [2, 3, 4]);
    }

    #[test]
    fn per_core_resets_on_topology_change() {
        let mut h = PerCoreHistory::new(4);
        h.push_samples(&[10.0, 120.0]);
        assert_eq!(h.deques[1].back(), Some(&100));
        h.push_samples(&[1.0, 2.0, 3.0]);
        assert_eq!(h.deques.len(), 3);
        assert_eq!(h.deques[0].len(), 1);
    }

    #[test]
    fn rates_from_counters() {
        let mut m = RateMeter::default();
        let t0 = Instant::now();
        assert_eq!(m.push(1_000, 0, t0), (0, 0));
        let t1 = t0 + Duration::from_secs(2);
        assert_eq!(m.push(1_000 + 4096, 2048, t1), (2, 1));
        // Counter reset on the peer must not underflow.
        assert_eq!(m.push(0, 0, t1 + Duration::from_secs(1)), (0, 0));
        assert_eq!(m.rx_peak, 2);
    }
}
