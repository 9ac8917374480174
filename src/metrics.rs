//! Request counters, a ring buffer of recent response durations, and a
//! non-blocking event bus (`LogEntry` / `MonitorEvent`) for external
//! consumers (dashboards, log sinks). The request path never blocks on
//! either channel: every send is a `try_send`, and a full channel just
//! drops the event.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::interval;

const RING_SIZE: usize = 100;
const METRICS_EVENT_EVERY: u64 = 10;
const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub timestamp: String,
    pub method: String,
    pub url: String,
    pub profile: String,
    pub status: u16,
    pub duration_ms: u64,
    pub session_id: String,
    pub remote_addr: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MonitorEvent {
    Request {
        timestamp: String,
        data: LogEntry,
    },
    RequestError {
        timestamp: String,
        data: LogEntry,
    },
    Metrics {
        timestamp: String,
        data: MetricsSnapshot,
    },
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct MetricsSnapshot {
    pub total: u64,
    pub successful: u64,
    pub failed: u64,
    pub total_bytes: u64,
    pub avg_response_ms: f64,
    pub requests_per_second: f64,
    pub error_rate_percent: f64,
    pub uptime_secs: u64,
}

struct RingBuffer {
    slots: [Duration; RING_SIZE],
    len: usize,
    next: usize,
}

impl RingBuffer {
    fn new() -> Self {
        Self {
            slots: [Duration::ZERO; RING_SIZE],
            len: 0,
            next: 0,
        }
    }

    fn push(&mut self, d: Duration) {
        self.slots[self.next] = d;
        self.next = (self.next + 1) % RING_SIZE;
        if self.len < RING_SIZE {
            self.len += 1;
        }
    }

    fn average(&self) -> Duration {
        if self.len == 0 {
            return Duration::ZERO;
        }
        let total: Duration = self.slots[..self.len].iter().sum();
        total / self.len as u32
    }
}

struct DerivedState {
    ring: RingBuffer,
    avg_response: Duration,
    requests_per_second: f64,
    error_rate_percent: f64,
}

pub struct ServerMetrics {
    total: AtomicU64,
    successful: AtomicU64,
    failed: AtomicU64,
    total_bytes: AtomicU64,
    derived: Mutex<DerivedState>,
    start_time: Instant,
    log_tx: Option<mpsc::Sender<LogEntry>>,
    monitor_tx: Option<mpsc::Sender<MonitorEvent>>,
}

impl ServerMetrics {
    pub fn new() -> (Arc<Self>, mpsc::Receiver<LogEntry>, mpsc::Receiver<MonitorEvent>) {
        let (log_tx, log_rx) = mpsc::channel(DEFAULT_CHANNEL_CAPACITY);
        let (monitor_tx, monitor_rx) = mpsc::channel(DEFAULT_CHANNEL_CAPACITY);
        let metrics = Arc::new(Self {
            total: AtomicU64::new(0),
            successful: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            total_bytes: AtomicU64::new(0),
            derived: Mutex::new(DerivedState {
                ring: RingBuffer::new(),
                avg_response: Duration::ZERO,
                requests_per_second: 0.0,
                error_rate_percent: 0.0,
            }),
            start_time: Instant::now(),
            log_tx: Some(log_tx),
            monitor_tx: Some(monitor_tx),
        });
        (metrics, log_rx, monitor_rx)
    }

    /// Record one completed request. Never blocks: channel sends are
    /// best-effort and dropped silently on backpressure.
    pub fn record(&self, status: u16, duration: Duration, bytes: u64) {
        let total = self.total.fetch_add(1, Ordering::Relaxed) + 1;
        if (200..400).contains(&status) {
            self.successful.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
        self.total_bytes.fetch_add(bytes, Ordering::Relaxed);

        {
            let mut derived = self.derived.lock();
            derived.ring.push(duration);
            derived.avg_response = derived.ring.average();
            let uptime = self.start_time.elapsed().as_secs_f64().max(1e-6);
            derived.requests_per_second = total as f64 / uptime;
            let failed = self.failed.load(Ordering::Relaxed);
            derived.error_rate_percent = failed as f64 / total as f64 * 100.0;
        }

        if total % METRICS_EVENT_EVERY == 0 {
            self.emit_metrics_event();
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let derived = self.derived.lock();
        MetricsSnapshot {
            total: self.total.load(Ordering::Relaxed),
            successful: self.successful.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            total_bytes: self.total_bytes.load(Ordering::Relaxed),
            avg_response_ms: derived.avg_response.as_secs_f64() * 1000.0,
            requests_per_second: derived.requests_per_second,
            error_rate_percent: derived.error_rate_percent,
            uptime_secs: self.start_time.elapsed().as_secs(),
        }
    }

    pub fn emit_log(&self, entry: LogEntry) {
        if let Some(tx) = &self.log_tx {
            let _ = tx.try_send(entry);
        }
    }

    pub fn emit_request_event(&self, entry: LogEntry, is_error: bool) {
        let Some(tx) = &self.monitor_tx else { return };
        let timestamp = chrono::Utc::now().to_rfc3339();
        let event = if is_error {
            MonitorEvent::RequestError { timestamp, data: entry }
        } else {
            MonitorEvent::Request { timestamp, data: entry }
        };
        let _ = tx.try_send(event);
    }

    fn emit_metrics_event(&self) {
        let Some(tx) = &self.monitor_tx else { return };
        let event = MonitorEvent::Metrics {
            timestamp: chrono::Utc::now().to_rfc3339(),
            data: self.snapshot(),
        };
        let _ = tx.try_send(event);
    }

    /// Spawn a background task that emits a `metrics` event on a fixed
    /// cadence, independent of request volume (for dashboards that want a
    /// heartbeat even during idle periods).
    pub fn start_periodic_emission(self: &Arc<Self>, period: Duration) -> tokio::task::JoinHandle<()> {
        let metrics = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = interval(period);
            loop {
                ticker.tick().await;
                metrics.emit_metrics_event();
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_successes_and_failures() {
        let (metrics, _log_rx, _mon_rx) = ServerMetrics::new();
        metrics.record(200, Duration::from_millis(10), 100);
        metrics.record(404, Duration::from_millis(20), 50);
        metrics.record(500, Duration::from_millis(30), 0);

        let snap = metrics.snapshot();
        assert_eq!(snap.total, 3);
        assert_eq!(snap.successful, 1);
        assert_eq!(snap.failed, 2);
        assert_eq!(snap.total_bytes, 150);
    }

    #[test]
    fn average_response_time_is_mean_of_recorded_durations() {
        let (metrics, _log_rx, _mon_rx) = ServerMetrics::new();
        let durations_ms = [10u64, 20, 30, 40];
        for d in durations_ms {
            metrics.record(200, Duration::from_millis(d), 10);
        }
        let snap = metrics.snapshot();
        let expected_mean = durations_ms.iter().sum::<u64>() as f64 / durations_ms.len() as f64;
        assert!((snap.avg_response_ms - expected_mean).abs() < 0.5);
    }

    #[test]
    fn ring_buffer_caps_at_100_and_keeps_the_most_recent() {
        let (metrics, _log_rx, _mon_rx) = ServerMetrics::new();
        for i in 0..150u64 {
            metrics.record(200, Duration::from_millis(i), 1);
        }
        let snap = metrics.snapshot();
        assert_eq!(snap.total, 150);
        // mean of the last 100 durations: 50..149
        let expected_mean = (50..150u64).sum::<u64>() as f64 / 100.0;
        assert!((snap.avg_response_ms - expected_mean).abs() < 0.5);
    }

    #[test]
    fn error_rate_is_percentage_of_failed() {
        let (metrics, _log_rx, _mon_rx) = ServerMetrics::new();
        metrics.record(200, Duration::from_millis(1), 0);
        metrics.record(200, Duration::from_millis(1), 0);
        metrics.record(500, Duration::from_millis(1), 0);
        metrics.record(502, Duration::from_millis(1), 0);
        let snap = metrics.snapshot();
        assert!((snap.error_rate_percent - 50.0).abs() < 0.01);
    }

    #[tokio::test]
    async fn log_emission_is_non_blocking_when_channel_is_full() {
        let (metrics, mut log_rx, _mon_rx) = ServerMetrics::new();
        // Fill the channel past capacity; none of these sends may block
        // since `emit_log` only ever uses `try_send`.
        for i in 0..DEFAULT_CHANNEL_CAPACITY + 50 {
            metrics.emit_log(LogEntry {
                timestamp: "t".into(),
                method: "GET".into(),
                url: format!("https://example.com/{i}"),
                profile: "chrome".into(),
                status: 200,
                duration_ms: 1,
                session_id: "".into(),
                remote_addr: "127.0.0.1:0".into(),
            });
        }
        // draining confirms entries were actually queued, not merely dropped
        let mut drained = 0;
        while log_rx.try_recv().is_ok() {
            drained += 1;
        }
        assert!(drained > 0);
        assert!(drained <= DEFAULT_CHANNEL_CAPACITY);
    }

    #[test]
    fn every_tenth_request_emits_a_metrics_event() {
        let (metrics, _log_rx, mut mon_rx) = ServerMetrics::new();
        for _ in 0..9 {
            metrics.record(200, Duration::from_millis(1), 1);
        }
        assert!(mon_rx.try_recv().is_err());
        metrics.record(200, Duration::from_millis(1), 1);
        let event = mon_rx.try_recv().expect("expected a metrics event on the 10th request");
        assert!(matches!(event, MonitorEvent::Metrics { .. }));
    }
}
