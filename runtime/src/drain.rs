//! Background draining of the intent log.
//!
//! An [`IntentDrain`] repeatedly asks the [`IntentLog`] for intents its
//! consumer has not applied, hands them to the consumer and marks each one
//! applied once the consumer succeeds. Different bookings are drained
//! concurrently; a single booking's intents strictly in log order, stopping
//! at the first failure so later intents never overtake an earlier one.
//!
//! Rounds page through the log by booking id. Each round resumes after the
//! last booking the previous round was offered and wraps around once it
//! reaches the end, so a booking that keeps failing is retried once per pass
//! instead of occupying every batch.

use crate::metrics::IntentMetrics;
use crate::retry::RetryPolicy;
use booking_core::ledger::LedgerError;
use booking_core::notification::NotifyError;
use booking_core::store::{IntentLog, PendingIntents};
use booking_core::{BookingId, Intent, StoreError};
use futures::future::join_all;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;

/// What a consumer did with one intent. Every variant counts as processed:
/// the intent is marked applied and never offered to the consumer again.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The side effect was performed.
    Applied,
    /// The side effect had already been performed.
    Duplicate,
    /// The intent is not this consumer's concern.
    Skipped,
    /// The side effect cannot ever succeed and was abandoned.
    Dropped,
}

/// A consumer failure. The intent stays unapplied and is offered again.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConsumerError {
    /// Ledger store failure.
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// Notification delivery failed after retries.
    #[error("Delivery failed: {0}")]
    Delivery(#[from] NotifyError),
}

/// Errors that abort a whole drain round.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DrainError {
    /// The intent log could not be read.
    #[error("Intent log unavailable: {0}")]
    Log(#[from] StoreError),
}

/// Boxed future returned by [`IntentConsumer::consume`].
pub type ConsumeFuture<'a> =
    Pin<Box<dyn Future<Output = Result<ApplyOutcome, ConsumerError>> + Send + 'a>>;

/// Something that applies intents idempotently.
pub trait IntentConsumer: Send + Sync {
    /// Name recorded in each intent's `applied_by` set.
    fn name(&self) -> &'static str;

    /// Process one intent.
    ///
    /// Must be safe to call again for an intent already processed: the
    /// drain may crash between consuming and marking.
    fn consume<'a>(&'a self, intent: &'a Intent) -> ConsumeFuture<'a>;
}

/// Totals for one or more drain rounds.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Bookings that had pending intents.
    pub bookings: usize,
    /// Intents applied.
    pub applied: usize,
    /// Intents found already applied.
    pub duplicates: usize,
    /// Intents outside the consumer's concern.
    pub skipped: usize,
    /// Intents abandoned as permanently failing.
    pub dropped: usize,
    /// Bookings whose drain stopped on a failure.
    pub failed: usize,
}

impl DrainReport {
    /// Intents marked applied, whatever the outcome.
    #[must_use]
    pub const fn processed(&self) -> usize {
        self.applied + self.duplicates + self.skipped + self.dropped
    }

    fn count(&mut self, consumer: &'static str, outcome: ApplyOutcome) {
        match outcome {
            ApplyOutcome::Applied => {
                IntentMetrics::record_applied(consumer);
                self.applied += 1;
            },
            ApplyOutcome::Duplicate => self.duplicates += 1,
            ApplyOutcome::Skipped => self.skipped += 1,
            ApplyOutcome::Dropped => self.dropped += 1,
        }
    }

    fn absorb(&mut self, other: Self) {
        self.bookings += other.bookings;
        self.applied += other.applied;
        self.duplicates += other.duplicates;
        self.skipped += other.skipped;
        self.dropped += other.dropped;
        self.failed += other.failed;
    }
}

/// Drives one consumer over the intent log.
pub struct IntentDrain {
    log: Arc<dyn IntentLog>,
    consumer: Arc<dyn IntentConsumer>,
    batch_size: usize,
    poll_interval: Duration,
    backoff: RetryPolicy,
    // Last booking offered; `None` starts a new pass.
    cursor: Mutex<Option<BookingId>>,
}

impl IntentDrain {
    /// Create a drain that reads up to `batch_size` intents per round.
    #[must_use]
    pub fn new(log: Arc<dyn IntentLog>, consumer: Arc<dyn IntentConsumer>, batch_size: usize) -> Self {
        Self {
            log,
            consumer,
            batch_size: batch_size.max(1),
            poll_interval: Duration::from_secs(1),
            backoff: RetryPolicy::builder()
                .initial_delay(Duration::from_millis(500))
                .max_delay(Duration::from_secs(30))
                .jitter(0.2)
                .build(),
            cursor: Mutex::new(None),
        }
    }

    /// Delay between rounds while the loop is running.
    #[must_use]
    pub const fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Backoff used while the intent log is unreachable.
    #[must_use]
    pub fn with_backoff(mut self, backoff: RetryPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Consumer name.
    #[must_use]
    pub fn consumer_name(&self) -> &'static str {
        self.consumer.name()
    }

    /// Run a single round.
    ///
    /// # Errors
    ///
    /// [`DrainError::Log`] if the pending intents could not be read. Failures
    /// of individual intents are counted in the report instead.
    pub async fn drain_once(&self) -> Result<DrainReport, DrainError> {
        let pending = self.next_page().await?;

        let rounds = join_all(pending.into_iter().map(|group| self.drain_booking(group))).await;

        let mut report = DrainReport::default();
        for round in rounds {
            report.absorb(round);
        }
        if report.bookings > 0 {
            tracing::debug!(
                consumer = self.consumer.name(),
                bookings = report.bookings,
                processed = report.processed(),
                failed = report.failed,
                "Drain round finished"
            );
        }
        Ok(report)
    }

    /// Run rounds until a full pass over the log makes no progress.
    ///
    /// A pass starts at the lowest booking id and ends when the cursor wraps
    /// around. Stopping on an idle pass keeps a permanently failing intent
    /// from spinning forever.
    ///
    /// # Errors
    ///
    /// [`DrainError::Log`] from any round.
    pub async fn drain_until_idle(&self) -> Result<DrainReport, DrainError> {
        let mut total = DrainReport::default();
        let mut full_pass = self.cursor.lock().await.is_none();
        let mut progressed = false;
        loop {
            let round = self.drain_once().await?;
            progressed |= round.processed() > 0;
            total.absorb(round);

            if self.cursor.lock().await.is_none() {
                if full_pass && !progressed {
                    return Ok(total);
                }
                full_pass = true;
                progressed = false;
            }
        }
    }

    /// Spawn the polling loop. It stops when `shutdown` fires or its sender
    /// is dropped.
    #[must_use]
    pub fn spawn(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let consumer = self.consumer.name();
            tracing::info!(consumer, "Intent drain started");
            let mut consecutive_failures = 0usize;

            loop {
                let delay = match self.drain_once().await {
                    Ok(_) => {
                        consecutive_failures = 0;
                        self.poll_interval
                    },
                    Err(err) => {
                        let delay = self.backoff.jittered_delay(consecutive_failures);
                        consecutive_failures += 1;
                        tracing::warn!(
                            consumer,
                            error = %err,
                            consecutive_failures,
                            "Drain round failed, backing off"
                        );
                        delay
                    },
                };

                tokio::select! {
                    _ = shutdown.recv() => break,
                    () = tokio::time::sleep(delay) => {},
                }
            }

            tracing::info!(consumer, "Intent drain stopped");
        })
    }

    /// Read the next page and move the cursor past it.
    async fn next_page(&self) -> Result<Vec<PendingIntents>, DrainError> {
        let consumer = self.consumer.name();
        let mut cursor = self.cursor.lock().await;

        let pending = self.log.unapplied(consumer, cursor.clone(), self.batch_size).await?;

        // A short page means the end of the log: the next round starts over.
        let offered: usize = pending.iter().map(|group| group.intents.len()).sum();
        *cursor = if offered < self.batch_size {
            None
        } else {
            pending.last().map(|group| group.booking_id.clone())
        };
        Ok(pending)
    }

    async fn drain_booking(&self, group: PendingIntents) -> DrainReport {
        let consumer = self.consumer.name();
        let mut report = DrainReport {
            bookings: 1,
            ..DrainReport::default()
        };

        for intent in &group.intents {
            let outcome = match self.consumer.consume(intent).await {
                Ok(outcome) => outcome,
                Err(err) => {
                    tracing::error!(
                        consumer,
                        booking_id = %group.booking_id,
                        intent_id = %intent.id,
                        error = %err,
                        "Intent failed, holding back the rest of this booking"
                    );
                    IntentMetrics::record_failure(consumer);
                    report.failed = 1;
                    break;
                },
            };

            if let Err(err) = self.mark(&group.booking_id, intent).await {
                tracing::warn!(
                    consumer,
                    booking_id = %group.booking_id,
                    intent_id = %intent.id,
                    error = %err,
                    "Intent processed but not marked; it will be offered again"
                );
                IntentMetrics::record_failure(consumer);
                report.failed = 1;
                break;
            }

            report.count(consumer, outcome);
        }

        report
    }

    async fn mark(&self, booking_id: &BookingId, intent: &Intent) -> Result<(), StoreError> {
        self.log
            .mark_applied(booking_id.clone(), intent.id.clone(), self.consumer.name())
            .await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use metrics_exporter_prometheus::PrometheusBuilder;

    #[test]
    fn only_applied_outcomes_reach_the_applied_counter() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        let mut report = DrainReport::default();

        ::metrics::with_local_recorder(&recorder, || {
            for outcome in [
                ApplyOutcome::Skipped,
                ApplyOutcome::Dropped,
                ApplyOutcome::Duplicate,
                ApplyOutcome::Applied,
            ] {
                report.count("ledger", outcome);
            }
        });

        assert_eq!(report.processed(), 4);
        assert_eq!((report.applied, report.skipped, report.dropped, report.duplicates), (1, 1, 1, 1));
        let rendered = handle.render();
        assert!(rendered.contains(r#"booking_intents_applied_total{consumer="ledger"} 1"#));
    }
}
