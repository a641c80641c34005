use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use super::applications::{Application, ApplicationRepository};
use super::calculation_log::{CalculationLog, CalculationLogRepository};
use super::model::Offer;
use super::store::OfferRepository;
use crate::config::OfferPolicy;
use crate::errors::{OfferError, RepositoryError, Result};
use crate::events::{Event, EventStore};
use crate::notifications::{BorrowerNotifier, LogNotifier};
use crate::rate_cards::RateCardRepository;
use crate::types::{ApplicationId, OfferId};

/// calculation log write that exhausted its attempts
///
/// holds the entry built at commit time, so a later change to the offer
/// cannot alter what gets written
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingLog {
    pub log: CalculationLog,
    pub deferred_at: DateTime<Utc>,
}

/// offer lifecycle operations over explicit repositories
///
/// submission lives in `submission.rs`, the remaining transitions in
/// `lifecycle.rs`
pub struct OfferService<O, C, A, L> {
    pub(crate) offers: Arc<O>,
    pub(crate) cards: Arc<C>,
    pub(crate) applications: Arc<A>,
    pub(crate) logs: Arc<L>,
    pub(crate) policy: OfferPolicy,
    pub(crate) borrower_notifier: Arc<dyn BorrowerNotifier>,
    pending_logs: Mutex<Vec<PendingLog>>,
    events: Mutex<EventStore>,
}

impl<O, C, A, L> OfferService<O, C, A, L>
where
    O: OfferRepository,
    C: RateCardRepository,
    A: ApplicationRepository,
    L: CalculationLogRepository,
{
    pub fn new(offers: Arc<O>, cards: Arc<C>, applications: Arc<A>, logs: Arc<L>, policy: OfferPolicy) -> Self {
        Self {
            offers,
            cards,
            applications,
            logs,
            policy,
            borrower_notifier: Arc::new(LogNotifier),
            pending_logs: Mutex::new(Vec::new()),
            events: Mutex::new(EventStore::new()),
        }
    }

    pub fn with_borrower_notifier(mut self, notifier: Arc<dyn BorrowerNotifier>) -> Self {
        self.borrower_notifier = notifier;
        self
    }

    pub fn policy(&self) -> &OfferPolicy {
        &self.policy
    }

    pub fn offers(&self) -> &Arc<O> {
        &self.offers
    }

    pub fn take_events(&self) -> Vec<Event> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).take_events()
    }

    /// log writes waiting for `replay_pending_logs`
    pub fn pending_logs(&self) -> Vec<PendingLog> {
        self.pending_logs.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// write deferred calculation logs, keeping the ones that fail again
    pub fn replay_pending_logs(&self) -> usize {
        let pending = std::mem::take(&mut *self.pending_logs.lock().unwrap_or_else(|e| e.into_inner()));
        let mut written = 0;
        let mut still_pending = Vec::new();

        for entry in pending {
            match self.logs.append(entry.log.clone()) {
                Ok(_) => written += 1,
                Err(err) => {
                    warn!(
                        offer_id = %entry.log.offer_id,
                        offer_version = entry.log.offer_version,
                        error = %err,
                        "calculation log replay failed"
                    );
                    still_pending.push(entry);
                }
            }
        }

        if !still_pending.is_empty() {
            self.pending_logs
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .extend(still_pending);
        }
        info!(written, "replayed deferred calculation logs");
        written
    }

    pub(crate) fn emit(&self, event: Event) {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).emit(event);
    }

    pub(crate) fn load_application(&self, id: ApplicationId) -> Result<Application> {
        self.applications
            .fetch(id)?
            .ok_or(OfferError::NotFound { entity: "application", id })
    }

    pub(crate) fn load_offer(&self, id: OfferId) -> Result<Offer> {
        self.offers.fetch(id)?.ok_or(OfferError::NotFound { entity: "offer", id })
    }

    /// append the calculation log for a persisted offer, deferring it when storage keeps failing
    pub(crate) fn record_calculation(&self, offer: &Offer, now: DateTime<Utc>) -> bool {
        let attempts = self.policy.log_write_attempts.max(1);
        let log = CalculationLog::from_offer(offer, now);
        let mut last_error = None;

        for attempt in 1..=attempts {
            match self.logs.append(log.clone()) {
                Ok(_) => return true,
                Err(err) => {
                    warn!(offer_id = %offer.id, attempt, error = %err, "calculation log write failed");
                    last_error = Some(err);
                }
            }
        }

        let error = last_error.map(|e| e.to_string()).unwrap_or_default();
        error!(offer_id = %offer.id, attempts, %error, "calculation log deferred");
        self.pending_logs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(PendingLog { log, deferred_at: now });
        self.emit(Event::CalculationLogDeferred {
            offer_id: offer.id,
            attempts,
            error,
            timestamp: now,
        });
        false
    }

    /// read-path expiry check, persisting the transition when the offer is overdue
    pub(crate) fn expire_if_due(&self, offer: Offer, now: DateTime<Utc>) -> Result<Offer> {
        let mut current = offer;

        for _ in 0..2 {
            if current.status.is_terminal() || !current.is_expired_at(now) {
                return Ok(current);
            }

            let mut next = current.clone();
            let to = next.expired_status();
            let from = next.transition(to, now)?;

            match self.offers.update(next) {
                Ok(stored) => {
                    info!(offer_id = %stored.id, status = %stored.status, "offer expired");
                    self.emit(Event::OfferStatusChanged {
                        offer_id: stored.id,
                        old_status: from,
                        new_status: stored.status,
                        reason: format!("expired at {}", stored.expires_at),
                        timestamp: now,
                    });
                    return Ok(stored);
                }
                Err(RepositoryError::VersionConflict { .. }) => {
                    current = self.load_offer(current.id)?;
                }
                Err(err) => return Err(err.into()),
            }
        }

        Err(OfferError::VersionConflict {
            id: current.id,
            expected: current.version,
            found: current.version + 1,
        })
    }

    /// expire on read and reject offers that are past their expiry
    pub(crate) fn ensure_live(&self, offer: Offer, now: DateTime<Utc>) -> Result<Offer> {
        let offer = self.expire_if_due(offer, now)?;
        if offer.status.is_expired() {
            return Err(OfferError::OfferExpired {
                offer_id: offer.id,
                expired_at: offer.expires_at,
            });
        }
        Ok(offer)
    }
}
