//! In-memory warning/event log, feeding [`crate::health::HealthReport`]'s
//! `issues` list: category/severity/acknowledgment, with stale entries
//! cleaned up on capacity. No notification-channel abstraction belongs in
//! this crate; senders already own outbound delivery.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningCategory {
    Routing,
    Processing,
    Configuration,
    SenderConnectivity,
    QueueConnectivity,
    PoolCapacity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningSeverity {
    Info,
    Warn,
    Error,
    Critical,
}

#[derive(Debug, Clone, Serialize)]
pub struct Warning {
    pub id: String,
    pub category: WarningCategory,
    pub severity: WarningSeverity,
    pub message: String,
    pub source: String,
    pub created_at: DateTime<Utc>,
    pub acknowledged: bool,
    pub acknowledged_at: Option<DateTime<Utc>>,
}

impl Warning {
    fn new(category: WarningCategory, severity: WarningSeverity, message: String, source: String) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            category,
            severity,
            message,
            source,
            created_at: Utc::now(),
            acknowledged: false,
            acknowledged_at: None,
        }
    }

    fn age_minutes(&self) -> i64 {
        (Utc::now() - self.created_at).num_minutes()
    }
}

#[derive(Debug, Clone)]
pub struct WarningServiceConfig {
    pub max_warning_age_hours: i64,
    pub max_warnings: usize,
    pub auto_acknowledge_hours: i64,
}

impl Default for WarningServiceConfig {
    fn default() -> Self {
        Self {
            max_warning_age_hours: 24,
            max_warnings: 1_000,
            auto_acknowledge_hours: 8,
        }
    }
}

/// Process-local warning store. One instance shared by a `Client`'s
/// `HealthService`.
pub struct WarningService {
    warnings: RwLock<HashMap<String, Warning>>,
    config: WarningServiceConfig,
}

impl WarningService {
    pub fn new(config: WarningServiceConfig) -> Self {
        Self {
            warnings: RwLock::new(HashMap::new()),
            config,
        }
    }

    pub fn warn(&self, category: WarningCategory, severity: WarningSeverity, message: impl Into<String>, source: impl Into<String>) -> String {
        let warning = Warning::new(category, severity, message.into(), source.into());
        let id = warning.id.clone();

        let mut warnings = self.warnings.write();
        if warnings.len() >= self.config.max_warnings {
            cleanup_oldest(&mut warnings);
        }
        warnings.insert(id.clone(), warning);
        id
    }

    pub fn get_all(&self) -> Vec<Warning> {
        self.warnings.read().values().cloned().collect()
    }

    /// Unacknowledged warnings no older than `max_age_minutes`, newest
    /// first — the set surfaced in a health report's `issues`.
    pub fn active(&self, max_age_minutes: i64) -> Vec<Warning> {
        let mut active: Vec<Warning> = self
            .warnings
            .read()
            .values()
            .filter(|w| !w.acknowledged && w.age_minutes() <= max_age_minutes)
            .cloned()
            .collect();
        active.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        active
    }

    pub fn has_critical(&self) -> bool {
        self.warnings
            .read()
            .values()
            .any(|w| w.severity == WarningSeverity::Critical && !w.acknowledged)
    }

    pub fn acknowledge(&self, id: &str) -> bool {
        let mut warnings = self.warnings.write();
        if let Some(warning) = warnings.get_mut(id) {
            warning.acknowledged = true;
            warning.acknowledged_at = Some(Utc::now());
            true
        } else {
            false
        }
    }

    /// Auto-acknowledges stale warnings and evicts anything past the max
    /// age entirely. Intended to run on a periodic tick alongside the
    /// queue's delayed-lane mover.
    pub fn cleanup(&self) {
        let auto_ack_minutes = self.config.auto_acknowledge_hours * 60;
        {
            let mut warnings = self.warnings.write();
            for warning in warnings.values_mut() {
                if !warning.acknowledged && warning.age_minutes() > auto_ack_minutes {
                    warning.acknowledged = true;
                    warning.acknowledged_at = Some(Utc::now());
                }
            }
        }
        let max_age_minutes = self.config.max_warning_age_hours * 60;
        self.warnings.write().retain(|_, w| w.age_minutes() <= max_age_minutes);
    }
}

impl Default for WarningService {
    fn default() -> Self {
        Self::new(WarningServiceConfig::default())
    }
}

fn cleanup_oldest(warnings: &mut HashMap<String, Warning>) {
    let to_remove = warnings.len() / 10;
    if to_remove == 0 {
        return;
    }
    let mut sorted: Vec<_> = warnings.iter().map(|(id, w)| (id.clone(), w.created_at)).collect();
    sorted.sort_by_key(|(_, created_at)| *created_at);
    for (id, _) in sorted.into_iter().take(to_remove) {
        warnings.remove(&id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warn_and_list() {
        let service = WarningService::default();
        let id = service.warn(WarningCategory::Processing, WarningSeverity::Error, "boom", "dispatcher");
        let all = service.get_all();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, id);
    }

    #[test]
    fn acknowledge_removes_from_active() {
        let service = WarningService::default();
        let id = service.warn(WarningCategory::QueueConnectivity, WarningSeverity::Warn, "slow", "queue");
        assert_eq!(service.active(60).len(), 1);

        assert!(service.acknowledge(&id));
        assert_eq!(service.active(60).len(), 0);
    }

    #[test]
    fn has_critical_reflects_unacknowledged_critical_warnings() {
        let service = WarningService::default();
        assert!(!service.has_critical());
        let id = service.warn(WarningCategory::PoolCapacity, WarningSeverity::Critical, "pool exhausted", "pool");
        assert!(service.has_critical());
        service.acknowledge(&id);
        assert!(!service.has_critical());
    }

    #[test]
    fn active_excludes_acknowledged_and_stale() {
        let service = WarningService::default();
        let id = service.warn(WarningCategory::Routing, WarningSeverity::Info, "fyi", "router");
        assert_eq!(service.active(60).len(), 1);
        service.acknowledge(&id);
        assert_eq!(service.active(60).len(), 0);
    }
}
