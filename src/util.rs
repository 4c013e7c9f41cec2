// Rolling throughput accounting for the sender worker

use std::collections::VecDeque;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::time::{Duration, Instant};

/// Wall-clock epoch milliseconds.
pub fn epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// Wall-clock epoch seconds with sub-second precision, the unit the
/// wearable schemas use for `time`/`timeReceived`.
pub fn epoch_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

/// Rolling per-second average of counted events over a fixed window.
///
/// Samples older than the window are dropped, except the most recent one
/// which anchors the elapsed-time baseline.
pub struct RollingTimeAverage {
    window: Duration,
    total: f64,
    points: VecDeque<(Instant, f64)>,
}

impl RollingTimeAverage {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            total: 0.0,
            points: VecDeque::new(),
        }
    }

    pub fn add(&mut self, count: f64) {
        self.points.push_back((Instant::now(), count));
        self.total += count;
    }

    pub fn has_average(&self) -> bool {
        !self.points.is_empty()
    }

    /// Events per second over the window. Returns the raw total when no
    /// time has elapsed yet.
    pub fn average(&mut self) -> f64 {
        let now = Instant::now();
        while self.points.len() > 1 {
            match self.points.front() {
                Some((at, _)) if now.duration_since(*at) > self.window => {
                    if let Some((_, count)) = self.points.pop_front() {
                        self.total -= count;
                    }
                }
                _ => break,
            }
        }

        match self.points.front() {
            None => 0.0,
            Some((first, _)) => {
                let elapsed = now.duration_since(*first).as_secs_f64();
                if elapsed <= 0.0 {
                    self.total
                } else {
                    self.total / elapsed
                }
            }
        }
    }
}
