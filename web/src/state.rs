//! Shared handler state.

use booking_core::environment::Clock;
use booking_core::store::BookingStore;
use booking_runtime::TransitionEngine;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

/// Everything the HTTP handlers need. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    /// Transition engine.
    pub engine: Arc<TransitionEngine>,
    /// Booking store, for creation, reads and health probes.
    pub bookings: Arc<dyn BookingStore>,
    /// Clock used to validate new bookings' schedules.
    pub clock: Arc<dyn Clock>,
    /// Prometheus exposition handle.
    pub metrics: PrometheusHandle,
}

impl AppState {
    /// Bundle the handler dependencies.
    #[must_use]
    pub fn new(
        engine: Arc<TransitionEngine>,
        bookings: Arc<dyn BookingStore>,
        clock: Arc<dyn Clock>,
        metrics: PrometheusHandle,
    ) -> Self {
        Self {
            engine,
            bookings,
            clock,
            metrics,
        }
    }
}
