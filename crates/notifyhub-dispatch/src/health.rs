//! Health aggregation: rolling error-rate window + threshold rules.

use std::time::Instant;

use parking_lot::RwLock;
use serde::Serialize;

use crate::metrics::DispatchMetricsSnapshot;
use crate::warning::WarningService;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone)]
pub struct HealthThresholds {
    pub unhealthy_error_rate: f64,
    pub degraded_error_rate: f64,
    pub unhealthy_queue_size: u64,
    pub degraded_queue_size: u64,
    pub min_active_workers: u64,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            unhealthy_error_rate: 0.20,
            degraded_error_rate: 0.05,
            unhealthy_queue_size: 10_000,
            degraded_queue_size: 5_000,
            min_active_workers: 1,
        }
    }
}

/// Sliding window of recent subsystem errors, capped at the 10 most recent
/// per SPEC_FULL.md's "last 10 subsystem errors appended" requirement.
#[derive(Default)]
struct ErrorLog {
    entries: RwLock<Vec<(Instant, String)>>,
}

impl ErrorLog {
    fn push(&self, message: String) {
        let mut entries = self.entries.write();
        entries.push((Instant::now(), message));
        if entries.len() > 10 {
            let excess = entries.len() - 10;
            entries.drain(0..excess);
        }
    }

    fn recent(&self) -> Vec<String> {
        self.entries.read().iter().map(|(_, m)| m.clone()).collect()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub error_rate: f64,
    pub queue_size: u64,
    pub active_workers: u64,
    pub uptime_seconds: f64,
    pub recent_errors: Vec<String>,
    /// Active (unacknowledged, non-stale) warnings from the warning log,
    /// newest first.
    pub issues: Vec<String>,
}

pub struct HealthService {
    thresholds: HealthThresholds,
    errors: ErrorLog,
    warnings: WarningService,
}

impl HealthService {
    pub fn new(thresholds: HealthThresholds) -> Self {
        Self {
            thresholds,
            errors: ErrorLog::default(),
            warnings: WarningService::default(),
        }
    }

    pub fn record_error(&self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    pub fn warnings(&self) -> &WarningService {
        &self.warnings
    }

    pub fn evaluate(&self, metrics: &DispatchMetricsSnapshot) -> HealthReport {
        let status = if metrics.error_rate > self.thresholds.unhealthy_error_rate
            || metrics.queue_size > self.thresholds.unhealthy_queue_size
            || metrics.active_workers < self.thresholds.min_active_workers
            || self.warnings.has_critical()
        {
            HealthStatus::Unhealthy
        } else if metrics.error_rate > self.thresholds.degraded_error_rate
            || metrics.queue_size > self.thresholds.degraded_queue_size
        {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };

        HealthReport {
            status,
            error_rate: metrics.error_rate,
            queue_size: metrics.queue_size,
            active_workers: metrics.active_workers,
            uptime_seconds: metrics.uptime_seconds,
            recent_errors: self.errors.recent(),
            issues: self.warnings.active(24 * 60).into_iter().map(|w| w.message).collect(),
        }
    }
}

impl Default for HealthService {
    fn default() -> Self {
        Self::new(HealthThresholds::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(error_rate: f64, queue_size: u64, active_workers: u64) -> DispatchMetricsSnapshot {
        DispatchMetricsSnapshot {
            error_rate,
            queue_size,
            active_workers,
            uptime_seconds: 100.0,
            ..Default::default()
        }
    }

    #[test]
    fn healthy_below_all_thresholds() {
        let service = HealthService::default();
        let report = service.evaluate(&snapshot(0.0, 10, 5));
        assert_eq!(report.status, HealthStatus::Healthy);
    }

    #[test]
    fn degraded_above_degraded_error_rate() {
        let service = HealthService::default();
        let report = service.evaluate(&snapshot(0.10, 10, 5));
        assert_eq!(report.status, HealthStatus::Degraded);
    }

    #[test]
    fn unhealthy_above_unhealthy_error_rate() {
        let service = HealthService::default();
        let report = service.evaluate(&snapshot(0.25, 10, 5));
        assert_eq!(report.status, HealthStatus::Unhealthy);
    }

    #[test]
    fn unhealthy_when_active_workers_below_minimum() {
        let service = HealthService::default();
        let report = service.evaluate(&snapshot(0.0, 10, 0));
        assert_eq!(report.status, HealthStatus::Unhealthy);
    }

    #[test]
    fn recent_errors_capped_at_ten() {
        let service = HealthService::default();
        for i in 0..15 {
            service.record_error(format!("error {i}"));
        }
        let report = service.evaluate(&snapshot(0.0, 0, 1));
        assert_eq!(report.recent_errors.len(), 10);
        assert_eq!(report.recent_errors[0], "error 5");
    }
}
