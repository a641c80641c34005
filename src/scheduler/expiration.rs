use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use futures_util::FutureExt;
use hourglass_rs::{SafeTimeProvider, TimeSource};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::{timeout, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::SchedulerConfig;
use crate::errors::{OfferError, RepositoryError, Result};
use crate::events::{Event, EventStore};
use crate::notifications::{ExpirationNotifier, NotificationError};
use crate::offers::{Offer, OfferRepository};

pub const WARNINGS_SENT: &str = "offers.expiration_warnings.sent";
pub const WARNINGS_FAILED: &str = "offers.expiration_warnings.failed";

/// counts for a single run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpirationRunReport {
    pub scanned: u64,
    pub notified: u64,
    pub failed: u64,
}

/// cumulative counters across runs
#[derive(Debug, Default)]
pub struct SchedulerMetrics {
    runs: AtomicU64,
    sent: AtomicU64,
    failed: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub runs: u64,
    pub sent: u64,
    pub failed: u64,
}

impl SchedulerMetrics {
    fn record(&self, report: &ExpirationRunReport) {
        self.runs.fetch_add(1, Ordering::Relaxed);
        self.sent.fetch_add(report.notified, Ordering::Relaxed);
        self.failed.fetch_add(report.failed, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            runs: self.runs.load(Ordering::Relaxed),
            sent: self.sent.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// warns institutions about submitted offers that expire within the lookahead window
pub struct ExpirationWarningJob<O> {
    offers: Arc<O>,
    notifier: Arc<dyn ExpirationNotifier>,
    config: SchedulerConfig,
    metrics: SchedulerMetrics,
    events: Mutex<EventStore>,
}

impl<O: OfferRepository> ExpirationWarningJob<O> {
    pub fn new(offers: Arc<O>, notifier: Arc<dyn ExpirationNotifier>, config: SchedulerConfig) -> Self {
        Self {
            offers,
            notifier,
            config,
            metrics: SchedulerMetrics::default(),
            events: Mutex::new(EventStore::new()),
        }
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn take_events(&self) -> Vec<Event> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).take_events()
    }

    /// one run against the provider's clock
    pub async fn run_expiration_check(&self, time: &SafeTimeProvider) -> Result<ExpirationRunReport> {
        let now = time.now();
        self.run_expiration_check_at(now).await
    }

    /// one run at a fixed instant
    ///
    /// each offer is handled on its own; a failed, slow or panicking
    /// notification is counted and the run moves on
    pub async fn run_expiration_check_at(&self, now: DateTime<Utc>) -> Result<ExpirationRunReport> {
        let window_end = now + Duration::hours(self.config.lookahead_hours);
        let expiring = self.offers.list_expiring(now, window_end)?;

        let mut report = ExpirationRunReport {
            scanned: expiring.len() as u64,
            ..Default::default()
        };

        for offer in expiring {
            let offer_id = offer.id;
            let attempt = AssertUnwindSafe(self.warn_institution(offer, now)).catch_unwind();
            match attempt.await {
                Ok(Ok(())) => report.notified += 1,
                Ok(Err(err)) => {
                    warn!(%offer_id, error = %err, "expiration warning failed");
                    report.failed += 1;
                }
                Err(panic) => {
                    error!(%offer_id, reason = panic_message(panic.as_ref()), "expiration warning panicked");
                    report.failed += 1;
                }
            }
        }

        self.metrics.record(&report);
        info!(counter = WARNINGS_SENT, value = report.notified, "expiration warnings sent");
        info!(counter = WARNINGS_FAILED, value = report.failed, "expiration warnings failed");
        Ok(report)
    }

    /// tick every configured interval until `shutdown` flips to true
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_secs = self.config.interval.as_secs(), "expiration warning job started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let now = SafeTimeProvider::new(TimeSource::System).now();
                    if let Err(err) = self.run_expiration_check_at(now).await {
                        error!(error = %err, "expiration check failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("expiration warning job stopped");
    }

    async fn warn_institution(&self, offer: Offer, now: DateTime<Utc>) -> std::result::Result<(), WarningError> {
        let limit = self.config.notification_timeout;
        match timeout(limit, self.notifier.notify_institution_of_expiration(&offer)).await {
            Ok(delivered) => delivered?,
            Err(_) => return Err(NotificationError::TimedOut(limit).into()),
        }

        let stored = self.mark_notified(offer, now)?;
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .emit(Event::ExpirationWarningSent {
                offer_id: stored.id,
                institution_id: stored.institution_id,
                expires_at: stored.expires_at,
                timestamp: now,
            });
        debug!(offer_id = %stored.id, "institution warned of expiry");
        Ok(())
    }

    /// persist the flag, retrying once against a fresh row on a version conflict
    fn mark_notified(&self, offer: Offer, now: DateTime<Utc>) -> Result<Offer> {
        let id = offer.id;
        match self.offers.update(notified(offer, now)) {
            Ok(stored) => Ok(stored),
            Err(RepositoryError::VersionConflict { .. }) => {
                let latest = self
                    .offers
                    .fetch(id)?
                    .ok_or(OfferError::NotFound { entity: "offer", id })?;
                if latest.notified {
                    return Ok(latest);
                }
                Ok(self.offers.update(notified(latest, now))?)
            }
            Err(err) => Err(err.into()),
        }
    }
}

/// why a single offer was not warned
#[derive(Error, Debug)]
enum WarningError {
    #[error(transparent)]
    Notification(#[from] NotificationError),

    #[error("warning sent but not recorded: {0}")]
    Store(#[from] OfferError),
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

fn notified(offer: Offer, now: DateTime<Utc>) -> Offer {
    Offer {
        notified: true,
        updated_at: now,
        ..offer
    }
}
