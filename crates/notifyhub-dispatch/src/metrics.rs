//! Worker pool / dispatch metrics: atomic counters plus a sliding-window
//! percentile collector.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;

#[derive(Debug, Clone)]
struct Sample {
    timestamp: Instant,
    duration_ms: u64,
    success: bool,
}

#[derive(Debug, Clone)]
pub struct MetricsConfig {
    pub max_samples: usize,
    pub short_window: Duration,
    pub long_window: Duration,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            max_samples: 10_000,
            short_window: Duration::from_secs(300),
            long_window: Duration::from_secs(1800),
        }
    }
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ProcessingTimeMetrics {
    pub avg_ms: f64,
    pub min_ms: u64,
    pub max_ms: u64,
    pub p50_ms: u64,
    pub p95_ms: u64,
    pub p99_ms: u64,
    pub sample_count: u64,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct DispatchMetricsSnapshot {
    pub enqueued: u64,
    pub dequeued: u64,
    pub retried: u64,
    pub dead_lettered: u64,
    pub processed: u64,
    pub errored: u64,
    pub queue_size: u64,
    pub active_workers: u64,
    pub idle_workers: u64,
    pub uptime_seconds: f64,
    pub throughput_per_sec: f64,
    pub error_rate: f64,
    pub processing_time: ProcessingTimeMetrics,
}

/// Worker-pool-wide metrics collector. One instance shared by a `Client`.
pub struct MetricsCollector {
    config: MetricsConfig,
    started_at: Instant,
    enqueued: AtomicU64,
    dequeued: AtomicU64,
    retried: AtomicU64,
    dead_lettered: AtomicU64,
    processed: AtomicU64,
    errored: AtomicU64,
    active_workers: AtomicU64,
    idle_workers: AtomicU64,
    samples: RwLock<VecDeque<Sample>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::with_config(MetricsConfig::default())
    }

    pub fn with_config(config: MetricsConfig) -> Self {
        Self {
            config,
            started_at: Instant::now(),
            enqueued: AtomicU64::new(0),
            dequeued: AtomicU64::new(0),
            retried: AtomicU64::new(0),
            dead_lettered: AtomicU64::new(0),
            processed: AtomicU64::new(0),
            errored: AtomicU64::new(0),
            active_workers: AtomicU64::new(0),
            idle_workers: AtomicU64::new(0),
            samples: RwLock::new(VecDeque::new()),
        }
    }

    pub fn record_enqueued(&self) {
        self.enqueued.fetch_add(1, Ordering::Relaxed);
    }
    pub fn record_dequeued(&self) {
        self.dequeued.fetch_add(1, Ordering::Relaxed);
    }
    pub fn record_retried(&self) {
        self.retried.fetch_add(1, Ordering::Relaxed);
    }
    pub fn record_dead_lettered(&self) {
        self.dead_lettered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_outcome(&self, duration: Duration, success: bool) {
        if success {
            self.processed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.errored.fetch_add(1, Ordering::Relaxed);
        }
        self.add_sample(duration.as_millis() as u64, success);
    }

    pub fn set_worker_gauges(&self, active: u64, idle: u64) {
        self.active_workers.store(active, Ordering::Relaxed);
        self.idle_workers.store(idle, Ordering::Relaxed);
    }

    fn add_sample(&self, duration_ms: u64, success: bool) {
        let mut samples = self.samples.write();
        let cutoff = Instant::now() - self.config.long_window;
        while samples.front().map(|s| s.timestamp < cutoff).unwrap_or(false) {
            samples.pop_front();
        }
        samples.push_back(Sample {
            timestamp: Instant::now(),
            duration_ms,
            success,
        });
        while samples.len() > self.config.max_samples {
            samples.pop_front();
        }
    }

    pub fn snapshot(&self, queue_size: u64) -> DispatchMetricsSnapshot {
        let processed = self.processed.load(Ordering::Relaxed);
        let errored = self.errored.load(Ordering::Relaxed);
        let total = processed + errored;
        let uptime = self.started_at.elapsed().as_secs_f64().max(1e-6);

        let samples = self.samples.read();
        let durations: Vec<u64> = samples.iter().map(|s| s.duration_ms).collect();

        DispatchMetricsSnapshot {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            dequeued: self.dequeued.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            dead_lettered: self.dead_lettered.load(Ordering::Relaxed),
            processed,
            errored,
            queue_size,
            active_workers: self.active_workers.load(Ordering::Relaxed),
            idle_workers: self.idle_workers.load(Ordering::Relaxed),
            uptime_seconds: uptime,
            throughput_per_sec: processed as f64 / uptime,
            error_rate: if total > 0 { errored as f64 / total as f64 } else { 0.0 },
            processing_time: processing_time_metrics(&durations),
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

fn processing_time_metrics(durations: &[u64]) -> ProcessingTimeMetrics {
    if durations.is_empty() {
        return ProcessingTimeMetrics::default();
    }
    let mut sorted = durations.to_vec();
    sorted.sort_unstable();

    let sum: u64 = sorted.iter().sum();
    let count = sorted.len() as u64;

    ProcessingTimeMetrics {
        avg_ms: sum as f64 / count as f64,
        min_ms: sorted[0],
        max_ms: sorted[sorted.len() - 1],
        p50_ms: percentile(&sorted, 50.0),
        p95_ms: percentile(&sorted, 95.0),
        p99_ms: percentile(&sorted, 99.0),
        sample_count: count,
    }
}

fn percentile(sorted: &[u64], pct: f64) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let rank = (pct / 100.0 * (sorted.len() - 1) as f64).round() as usize;
    sorted[rank.min(sorted.len() - 1)]
}
