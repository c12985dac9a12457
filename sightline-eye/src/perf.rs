//! Rolling throughput/latency tracker for live frames

use metrics::{counter, gauge, histogram};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::time::Instant;
use tracing::info;

/// Averages over the current window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PerfSnapshot {
    pub avg_fps: f64,
    pub avg_total_ms: f64,
}

#[derive(Debug)]
struct Window {
    stamps: VecDeque<Instant>,
    totals: VecDeque<f64>,
    frames: u64,
}

/// Fixed-capacity ring of recent frame timestamps and latencies.
#[derive(Debug)]
pub struct PerfTracker {
    capacity: usize,
    log_every: usize,
    window: Mutex<Window>,
}

impl PerfTracker {
    pub fn new(capacity: usize, log_every: usize) -> Self {
        let capacity = capacity.max(2);
        Self {
            capacity,
            log_every: log_every.max(1),
            window: Mutex::new(Window {
                stamps: VecDeque::with_capacity(capacity),
                totals: VecDeque::with_capacity(capacity),
                frames: 0,
            }),
        }
    }

    pub fn record(&self, total_ms: f64, label: &str) -> PerfSnapshot {
        self.record_at(Instant::now(), total_ms, label)
    }

    /// [`record`](Self::record) with an explicit timestamp.
    pub fn record_at(&self, now: Instant, total_ms: f64, label: &str) -> PerfSnapshot {
        let mut w = self.window.lock();
        if w.stamps.len() == self.capacity {
            w.stamps.pop_front();
            w.totals.pop_front();
        }
        w.stamps.push_back(now);
        w.totals.push_back(total_ms);
        w.frames += 1;

        let n = w.stamps.len();
        let avg_fps = match (w.stamps.front(), w.stamps.back()) {
            (Some(first), Some(last)) if n > 1 => {
                let elapsed = last.duration_since(*first).as_secs_f64();
                if elapsed > 0.0 {
                    (n - 1) as f64 / elapsed
                } else {
                    0.0
                }
            }
            _ => 0.0,
        };
        let avg_total_ms = w.totals.iter().sum::<f64>() / n as f64;
        let snapshot = PerfSnapshot {
            avg_fps: (avg_fps * 10.0).round() / 10.0,
            avg_total_ms: (avg_total_ms * 10.0).round() / 10.0,
        };

        if w.frames % self.log_every as u64 == 0 {
            info!(
                "[{}] {} frames | avg {:.1} fps | avg {:.1} ms/frame",
                label, w.frames, snapshot.avg_fps, snapshot.avg_total_ms
            );
        }
        drop(w);

        counter!("sightline_live_frames_total").increment(1);
        histogram!("sightline_frame_total_ms").record(total_ms);
        gauge!("sightline_live_fps").set(snapshot.avg_fps);
        snapshot
    }

    pub fn frames(&self) -> u64 {
        self.window.lock().frames
    }
}
