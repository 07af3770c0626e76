//! Health reporting for the booking store and its dependants.

use booking_core::store::BookingStore;
use booking_core::{BookingId, StoreError};
use serde::Serialize;
use std::time::{Duration, Instant};

/// Health check status levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Fully operational
    Healthy,
    /// Operational but slow or partially failing
    Degraded,
    /// Not operational
    Unhealthy,
}

impl HealthStatus {
    /// Check if status is healthy
    #[must_use]
    pub const fn is_healthy(self) -> bool {
        matches!(self, Self::Healthy)
    }

    /// Check if status is unhealthy
    #[must_use]
    pub const fn is_unhealthy(self) -> bool {
        matches!(self, Self::Unhealthy)
    }

    /// The worse of two statuses.
    #[must_use]
    pub const fn worst(self, other: Self) -> Self {
        match (self, other) {
            (Self::Unhealthy, _) | (_, Self::Unhealthy) => Self::Unhealthy,
            (Self::Degraded, _) | (_, Self::Degraded) => Self::Degraded,
            _ => Self::Healthy,
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded => write!(f, "degraded"),
            Self::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// Result of checking one component.
#[derive(Debug, Clone, Serialize)]
pub struct HealthCheck {
    /// Component name
    pub component: String,
    /// Its status
    pub status: HealthStatus,
    /// Details when not healthy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Probe latency in milliseconds
    pub latency_ms: u64,
}

/// Aggregated health report.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    /// Worst status of all checks
    pub status: HealthStatus,
    /// Individual component checks
    pub checks: Vec<HealthCheck>,
    /// When the report was generated
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl HealthReport {
    /// Build a report from individual checks.
    #[must_use]
    pub fn new(checks: Vec<HealthCheck>) -> Self {
        let status = checks
            .iter()
            .map(|c| c.status)
            .fold(HealthStatus::Healthy, HealthStatus::worst);

        Self {
            status,
            checks,
            timestamp: chrono::Utc::now(),
        }
    }
}

/// Probes above this latency report `Degraded`.
pub const SLOW_PROBE: Duration = Duration::from_secs(1);

const PROBE_ID: &str = "health-probe";

/// Probe the booking store with a read of a booking that does not exist.
///
/// `NotFound` is the expected answer; `Unavailable` means the store is down.
pub async fn check_booking_store(store: &dyn BookingStore) -> HealthCheck {
    let started = Instant::now();
    let probe = store.get(BookingId::new(PROBE_ID)).await;
    let elapsed = started.elapsed();
    let latency_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);

    let (status, message) = match probe {
        Ok(_) | Err(StoreError::NotFound(_)) if elapsed > SLOW_PROBE => {
            (HealthStatus::Degraded, Some(format!("probe took {latency_ms}ms")))
        },
        Ok(_) | Err(StoreError::NotFound(_)) => (HealthStatus::Healthy, None),
        Err(StoreError::Unavailable(reason)) => (HealthStatus::Unhealthy, Some(reason)),
        Err(other) => (HealthStatus::Degraded, Some(other.to_string())),
    };

    HealthCheck {
        component: "booking_store".to_string(),
        status,
        message,
        latency_ms,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worst_status_wins() {
        assert_eq!(HealthStatus::Healthy.worst(HealthStatus::Degraded), HealthStatus::Degraded);
        assert_eq!(HealthStatus::Unhealthy.worst(HealthStatus::Degraded), HealthStatus::Unhealthy);
        assert_eq!(HealthStatus::Healthy.worst(HealthStatus::Healthy), HealthStatus::Healthy);
    }

    #[test]
    fn report_takes_worst_check() {
        let check = |status| HealthCheck {
            component: "c".into(),
            status,
            message: None,
            latency_ms: 0,
        };
        let report = HealthReport::new(vec![check(HealthStatus::Healthy), check(HealthStatus::Degraded)]);
        assert_eq!(report.status, HealthStatus::Degraded);
        assert!(HealthReport::new(Vec::new()).status.is_healthy());
    }
}
