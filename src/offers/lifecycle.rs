use chrono::{DateTime, Duration, Utc};
use hourglass_rs::SafeTimeProvider;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::applications::{Application, ApplicationRepository};
use super::calculation_log::CalculationLogRepository;
use super::model::{Offer, ResubmitTerms};
use super::service::OfferService;
use super::store::OfferRepository;
use crate::calculation::{self, LoanQuote};
use crate::errors::{OfferError, Result};
use crate::events::Event;
use crate::rate_cards::RateCardRepository;
use crate::types::{
    ApplicationId, ApplicationStatus, BorrowerId, CalculationType, InstitutionId, OfferId, OfferStatus,
};

/// outcome of an institution declining an application
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeclineResult {
    pub application_id: ApplicationId,
    pub status: ApplicationStatus,
    pub declined_at: DateTime<Utc>,
    pub reason: Option<String>,
}

/// offers written by a final acceptance
#[derive(Debug, Clone, PartialEq)]
pub struct AcceptanceResult {
    pub accepted: Offer,
    pub rejected: Vec<Offer>,
}

/// result of one overdue-offer sweep
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExpirySweep {
    pub expired: Vec<OfferId>,
    pub failed: usize,
}

impl<O, C, A, L> OfferService<O, C, A, L>
where
    O: OfferRepository,
    C: RateCardRepository,
    A: ApplicationRepository,
    L: CalculationLogRepository,
{
    /// new calculated offer priced from an expired one; the old row is left as is
    pub fn resubmit_offer(
        &self,
        offer_id: OfferId,
        institution_id: InstitutionId,
        terms: &ResubmitTerms,
        time: &SafeTimeProvider,
    ) -> Result<Offer> {
        let now = time.now();
        let previous = self.load_offer(offer_id)?;
        if previous.institution_id != institution_id {
            return Err(OfferError::Forbidden {
                actor: institution_id,
                resource: "offer",
                id: offer_id,
            });
        }
        self.validate_resubmit_terms(terms)?;

        let previous = self.expire_if_due(previous, now)?;
        if !previous.status.is_expired() {
            return Err(OfferError::InvalidState {
                current: previous.status.to_string(),
                expected: "EXPIRED or EXPIRED_WITH_SELECTION".to_string(),
            });
        }

        let monthly_payment = calculation::monthly_payment(previous.principal, previous.term_months, terms.apr)?;
        let quote = LoanQuote {
            principal: previous.principal,
            term_months: previous.term_months,
            apr: terms.apr,
            monthly_payment,
            origination_fee: terms.origination_fee.unwrap_or(previous.origination_fee),
            insurance_cost: terms.insurance_cost.or(previous.insurance_cost),
            total_cost: calculation::total_cost(monthly_payment, previous.term_months, previous.principal),
        };

        let validity_days = terms
            .validity_period_days
            .unwrap_or(self.policy.default_validity_days);
        let mut offer = Offer::from_quote(
            previous.application_id,
            institution_id,
            &quote,
            CalculationType::Override,
            now,
        );
        offer.rate_card_id = previous.rate_card_id;
        offer.processing_time_days = terms.processing_time_days.unwrap_or(previous.processing_time_days);
        offer.validity_period_days = validity_days;
        offer.expires_at = now + Duration::days(validity_days as i64);
        offer.required_documents = previous.required_documents.clone();
        offer.submission_notes = terms.notes.clone();
        offer.previous_offer_id = Some(previous.id);

        let stored = self.offers.insert(offer)?;
        self.record_calculation(&stored, now);
        self.emit(Event::OfferResubmitted {
            offer_id: stored.id,
            previous_offer_id: previous.id,
            application_id: stored.application_id,
            institution_id,
            apr: stored.apr,
            timestamp: now,
        });
        info!(offer_id = %stored.id, previous_offer_id = %previous.id, apr = %stored.apr, "offer resubmitted");
        Ok(stored)
    }

    /// withdraw a submitted offer; repeating on a withdrawn offer is a no-op
    pub fn withdraw_offer(&self, institution_id: InstitutionId, offer_id: OfferId, time: &SafeTimeProvider) -> Result<Offer> {
        let now = time.now();
        let offer = self.load_offer(offer_id)?;
        if offer.institution_id != institution_id {
            return Err(OfferError::Forbidden {
                actor: institution_id,
                resource: "offer",
                id: offer_id,
            });
        }
        if offer.status == OfferStatus::Withdrawn {
            debug!(%offer_id, "offer already withdrawn");
            return Ok(offer);
        }

        let mut offer = self.ensure_live(offer, now)?;
        if offer.status != OfferStatus::Submitted {
            return Err(OfferError::InvalidState {
                current: offer.status.to_string(),
                expected: OfferStatus::Submitted.to_string(),
            });
        }

        let from = offer.transition(OfferStatus::Withdrawn, now)?;
        let stored = self.offers.update(offer)?;
        self.emit(Event::OfferStatusChanged {
            offer_id,
            old_status: from,
            new_status: stored.status,
            reason: "withdrawn by institution".to_string(),
            timestamp: now,
        });
        info!(%offer_id, %institution_id, "offer withdrawn");
        Ok(stored)
    }

    /// institution turns down an application before offers are shown
    pub fn decline_application(
        &self,
        institution_id: InstitutionId,
        application_id: ApplicationId,
        reason: Option<&str>,
        time: &SafeTimeProvider,
    ) -> Result<DeclineResult> {
        let now = time.now();
        let reason = reason.map(str::trim).filter(|r| !r.is_empty());
        if let Some(reason) = reason {
            let max = self.policy.decline_reason_max_chars;
            if reason.chars().count() > max {
                return Err(OfferError::validation(
                    "reason",
                    format!("decline reason longer than {max} characters"),
                ));
            }
        }

        let mut application = self.load_application(application_id)?;
        if !application.status.is_declinable() {
            return Err(OfferError::InvalidState {
                current: format!("{:?}", application.status),
                expected: "an application without offers".to_string(),
            });
        }

        application.status = ApplicationStatus::Rejected;
        application.updated_at = now;
        let application = self.applications.update(application)?;

        let reason = reason.map(str::to_string);
        if let Err(err) = self
            .borrower_notifier
            .notify_application_declined(&application, reason.as_deref().unwrap_or("not specified"))
        {
            warn!(%application_id, error = %err, "borrower decline notification failed");
        }

        self.emit(Event::ApplicationDeclined {
            application_id,
            institution_id,
            reason: reason.clone(),
            timestamp: now,
        });
        info!(%application_id, %institution_id, "application declined");

        Ok(DeclineResult {
            application_id,
            status: application.status,
            declined_at: now,
            reason,
        })
    }

    /// borrower marks one submitted offer, clearing any earlier selection
    pub fn select_offer(
        &self,
        application_id: ApplicationId,
        borrower_id: BorrowerId,
        offer_id: OfferId,
        time: &SafeTimeProvider,
    ) -> Result<Offer> {
        let now = time.now();
        let (_, offer) = self.borrower_offer(application_id, borrower_id, offer_id, now)?;

        let mut batch = Vec::new();
        let mut deselected = None;
        for other in self.offers.list_for_application(application_id)? {
            if other.id != offer_id && !other.status.is_terminal() && other.borrower_selected_at.is_some() {
                deselected = Some(other.id);
                batch.push(Offer {
                    borrower_selected_at: None,
                    updated_at: now,
                    ..other
                });
            }
        }
        batch.push(Offer {
            borrower_selected_at: Some(now),
            updated_at: now,
            ..offer
        });

        let written = self.offers.update_batch(batch)?;
        let selected = written
            .into_iter()
            .find(|o| o.id == offer_id)
            .ok_or(OfferError::NotFound { entity: "offer", id: offer_id })?;

        self.emit(Event::OfferSelected {
            offer_id,
            application_id,
            borrower_id,
            deselected,
            timestamp: now,
        });
        info!(%offer_id, %application_id, "offer selected");
        Ok(selected)
    }

    /// final acceptance; sibling submitted offers are rejected in the same write
    pub fn accept_offer(
        &self,
        application_id: ApplicationId,
        borrower_id: BorrowerId,
        offer_id: OfferId,
        time: &SafeTimeProvider,
    ) -> Result<AcceptanceResult> {
        let now = time.now();
        let (mut application, offer) = self.borrower_offer(application_id, borrower_id, offer_id, now)?;
        if application.status >= ApplicationStatus::Accepted {
            return Err(OfferError::InvalidState {
                current: format!("{:?}", application.status),
                expected: "an application open for acceptance".to_string(),
            });
        }

        let mut accepted = offer;
        let mut changes = vec![(accepted.transition(OfferStatus::Accepted, now)?, OfferStatus::Accepted)];
        let mut batch = Vec::new();
        for mut sibling in self.offers.list_for_application(application_id)? {
            if sibling.id == offer_id || sibling.status != OfferStatus::Submitted {
                continue;
            }
            changes.push((sibling.transition(OfferStatus::Rejected, now)?, OfferStatus::Rejected));
            batch.push(sibling);
        }
        batch.insert(0, accepted);

        let mut written = self.offers.update_batch(batch)?;
        let accepted = written.remove(0);

        application.status = ApplicationStatus::Accepted;
        application.updated_at = now;
        self.applications.update(application)?;

        for (offer, (from, to)) in std::iter::once(&accepted).chain(written.iter()).zip(changes) {
            self.emit(Event::OfferStatusChanged {
                offer_id: offer.id,
                old_status: from,
                new_status: to,
                reason: if to == OfferStatus::Accepted {
                    "accepted by borrower".to_string()
                } else {
                    format!("sibling offer {offer_id} accepted")
                },
                timestamp: now,
            });
        }
        self.emit(Event::ApplicationAccepted {
            application_id,
            offer_id,
            timestamp: now,
        });
        info!(%offer_id, %application_id, rejected = written.len(), "offer accepted");

        Ok(AcceptanceResult {
            accepted,
            rejected: written,
        })
    }

    /// offer by id, expired on read when overdue
    pub fn get_offer(&self, offer_id: OfferId, time: &SafeTimeProvider) -> Result<Offer> {
        let offer = self.load_offer(offer_id)?;
        self.expire_if_due(offer, time.now())
    }

    /// every offer of an application, cheapest apr first
    pub fn get_offers_for_application(&self, application_id: ApplicationId, time: &SafeTimeProvider) -> Result<Vec<Offer>> {
        let now = time.now();
        self.load_application(application_id)?;

        let mut offers = self
            .offers
            .list_for_application(application_id)?
            .into_iter()
            .map(|offer| self.expire_if_due(offer, now))
            .collect::<Result<Vec<_>>>()?;
        offers.sort_by(|a, b| a.apr.cmp(&b.apr).then(a.created_at.cmp(&b.created_at)));
        Ok(offers)
    }

    pub fn is_offer_expired(&self, offer: &Offer, now: DateTime<Utc>) -> bool {
        offer.status.is_expired() || (!offer.status.is_terminal() && offer.is_expired_at(now))
    }

    /// move every overdue offer to its expired status
    pub fn expire_overdue_offers(&self, time: &SafeTimeProvider) -> Result<ExpirySweep> {
        let now = time.now();
        let mut sweep = ExpirySweep::default();

        for offer in self.offers.list_overdue(now)? {
            let offer_id = offer.id;
            match self.expire_if_due(offer, now) {
                Ok(stored) if stored.status.is_expired() => sweep.expired.push(offer_id),
                Ok(stored) => debug!(%offer_id, status = %stored.status, "offer settled before expiry"),
                Err(err) => {
                    warn!(%offer_id, error = %err, "could not expire offer");
                    sweep.failed += 1;
                }
            }
        }

        if !sweep.expired.is_empty() || sweep.failed > 0 {
            info!(expired = sweep.expired.len(), failed = sweep.failed, "overdue offers swept");
        }
        Ok(sweep)
    }

    /// application owned by the borrower plus a live submitted offer on it
    fn borrower_offer(
        &self,
        application_id: ApplicationId,
        borrower_id: BorrowerId,
        offer_id: OfferId,
        now: DateTime<Utc>,
    ) -> Result<(Application, Offer)> {
        let application = self.load_application(application_id)?;
        if application.borrower_id != borrower_id {
            return Err(OfferError::Forbidden {
                actor: borrower_id,
                resource: "application",
                id: application_id,
            });
        }

        let offer = self.load_offer(offer_id)?;
        if offer.application_id != application_id {
            return Err(OfferError::NotFound { entity: "offer", id: offer_id });
        }
        let offer = self.ensure_live(offer, now)?;
        if offer.status != OfferStatus::Submitted {
            return Err(OfferError::InvalidState {
                current: offer.status.to_string(),
                expected: OfferStatus::Submitted.to_string(),
            });
        }
        Ok((application, offer))
    }

    fn validate_resubmit_terms(&self, terms: &ResubmitTerms) -> Result<()> {
        let policy = &self.policy;
        let apr = terms.apr.as_percentage();
        if !policy.resubmission_apr.contains(apr) {
            return Err(OfferError::InvalidOverride {
                field: "apr",
                value: apr,
                min: policy.resubmission_apr.min,
                max: policy.resubmission_apr.max,
            });
        }
        if matches!(terms.origination_fee, Some(fee) if fee.is_negative()) {
            return Err(OfferError::validation("origination_fee", "fee cannot be negative"));
        }
        if matches!(terms.insurance_cost, Some(cost) if cost.is_negative()) {
            return Err(OfferError::validation("insurance_cost", "insurance cost cannot be negative"));
        }
        if let Some(days) = terms.processing_time_days {
            if !policy.processing_time_days.contains(days) {
                return Err(OfferError::InvalidOverride {
                    field: "processing_time_days",
                    value: Decimal::from(days),
                    min: Decimal::from(policy.processing_time_days.min),
                    max: Decimal::from(policy.processing_time_days.max),
                });
            }
        }
        if let Some(days) = terms.validity_period_days {
            if !policy.validity_period_days.contains(days) {
                return Err(OfferError::InvalidOverride {
                    field: "validity_period_days",
                    value: Decimal::from(days),
                    min: Decimal::from(policy.validity_period_days.min),
                    max: Decimal::from(policy.validity_period_days.max),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::config::OfferPolicy;
    use crate::decimal::{Money, Rate};
    use crate::notifications::{BorrowerNotifier, NotificationError};
    use crate::offers::{
        InMemoryApplicationStore, InMemoryCalculationLogStore, InMemoryOfferStore, OfferOverrides,
    };
    use crate::rate_cards::{InMemoryRateCardStore, RateCard, RateCardSpec};
    use crate::types::{Currency, LoanType};
    use chrono::TimeZone;
    use hourglass_rs::TimeSource;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    type Service = OfferService<InMemoryOfferStore, InMemoryRateCardStore, InMemoryApplicationStore, InMemoryCalculationLogStore>;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    struct Fixture {
        service: Service,
        cards: Arc<InMemoryRateCardStore>,
        applications: Arc<InMemoryApplicationStore>,
        time: SafeTimeProvider,
    }

    fn fixture() -> Fixture {
        let cards = Arc::new(InMemoryRateCardStore::new());
        let applications = Arc::new(InMemoryApplicationStore::new());
        let service = OfferService::new(
            Arc::new(InMemoryOfferStore::new()),
            cards.clone(),
            applications.clone(),
            Arc::new(InMemoryCalculationLogStore::new()),
            OfferPolicy::default(),
        );
        Fixture {
            service,
            cards,
            applications,
            time: SafeTimeProvider::new(TimeSource::Test(start())),
        }
    }

    impl Fixture {
        fn bank(&self, base_apr: u32) -> InstitutionId {
            let institution_id = Uuid::new_v4();
            let spec = RateCardSpec {
                loan_type: LoanType::Personal,
                currency: Currency::Eur,
                min_loan_amount: Money::from_major(1_000),
                max_loan_amount: Money::from_major(100_000),
                base_apr: Rate::from_percentage(base_apr),
                apr_adjustment_range: Rate::from_percentage(2),
                origination_fee_percent: dec!(2),
                insurance_percent: Some(dec!(0.5)),
                processing_time_days: 5,
            };
            self.cards
                .open_version(RateCard::open(institution_id, &spec, start()), None, start())
                .unwrap();
            institution_id
        }

        fn application(&self) -> Application {
            let app = Application::new(
                Uuid::new_v4(),
                LoanType::Personal,
                Currency::Eur,
                Money::from_major(10_000),
                36,
                start(),
            );
            self.applications.insert(app).unwrap()
        }

        fn submit(&self, bank: InstitutionId, app: &Application) -> Offer {
            self.service
                .submit_offer(bank, app.id, Uuid::new_v4(), &OfferOverrides::default(), &self.time)
                .unwrap()
                .0
        }

        fn advance(&self, duration: Duration) {
            self.time.test_control().unwrap().advance(duration);
        }
    }

    #[test]
    fn test_withdraw_is_idempotent() {
        let f = fixture();
        let bank = f.bank(10);
        let app = f.application();
        let offer = f.submit(bank, &app);

        let first = f.service.withdraw_offer(bank, offer.id, &f.time).unwrap();
        let second = f.service.withdraw_offer(bank, offer.id, &f.time).unwrap();
        assert_eq!(first.status, OfferStatus::Withdrawn);
        assert_eq!(first, second);
    }

    #[test]
    fn test_withdraw_foreign_offer_is_forbidden() {
        let f = fixture();
        let bank = f.bank(10);
        let app = f.application();
        let offer = f.submit(bank, &app);

        let err = f.service.withdraw_offer(Uuid::new_v4(), offer.id, &f.time).unwrap_err();
        assert!(matches!(err, OfferError::Forbidden { resource: "offer", .. }));
        assert!(matches!(
            f.service.withdraw_offer(bank, Uuid::new_v4(), &f.time),
            Err(OfferError::NotFound { entity: "offer", .. })
        ));
    }

    #[test]
    fn test_withdraw_accepted_offer_fails_with_state_error() {
        let f = fixture();
        let bank = f.bank(10);
        let app = f.application();
        let offer = f.submit(bank, &app);
        f.service.accept_offer(app.id, app.borrower_id, offer.id, &f.time).unwrap();

        let err = f.service.withdraw_offer(bank, offer.id, &f.time).unwrap_err();
        assert!(matches!(err, OfferError::InvalidState { .. }));
    }

    #[test]
    fn test_withdraw_after_expiry_reports_expired() {
        let f = fixture();
        let bank = f.bank(10);
        let app = f.application();
        let offer = f.submit(bank, &app);
        f.advance(Duration::days(2));

        let err = f.service.withdraw_offer(bank, offer.id, &f.time).unwrap_err();
        assert_eq!(err.error_code(), "OFFER_EXPIRED");
    }

    #[test]
    fn test_accept_rejects_submitted_siblings() {
        let f = fixture();
        let (a, b, c) = (f.bank(9), f.bank(10), f.bank(11));
        let app = f.application();
        let chosen = f.submit(a, &app);
        let sibling_b = f.submit(b, &app);
        let sibling_c = f.submit(c, &app);
        f.service.withdraw_offer(c, sibling_c.id, &f.time).unwrap();

        let result = f.service.accept_offer(app.id, app.borrower_id, chosen.id, &f.time).unwrap();
        assert_eq!(result.accepted.status, OfferStatus::Accepted);
        assert_eq!(result.rejected.len(), 1);
        assert_eq!(result.rejected[0].id, sibling_b.id);

        let stored = f.service.offers().fetch(sibling_b.id).unwrap().unwrap();
        assert_eq!(stored.status, OfferStatus::Rejected);
        let withdrawn = f.service.offers().fetch(sibling_c.id).unwrap().unwrap();
        assert_eq!(withdrawn.status, OfferStatus::Withdrawn);
        let app = f.applications.fetch(app.id).unwrap().unwrap();
        assert_eq!(app.status, ApplicationStatus::Accepted);
    }

    #[test]
    fn test_only_owner_can_accept() {
        let f = fixture();
        let bank = f.bank(10);
        let app = f.application();
        let offer = f.submit(bank, &app);

        let err = f
            .service
            .accept_offer(app.id, Uuid::new_v4(), offer.id, &f.time)
            .unwrap_err();
        assert!(matches!(err, OfferError::Forbidden { resource: "application", .. }));
    }

    #[test]
    fn test_selection_moves_between_offers() {
        let f = fixture();
        let (a, b) = (f.bank(9), f.bank(10));
        let app = f.application();
        let first = f.submit(a, &app);
        let second = f.submit(b, &app);

        f.service.select_offer(app.id, app.borrower_id, first.id, &f.time).unwrap();
        let selected = f.service.select_offer(app.id, app.borrower_id, second.id, &f.time).unwrap();
        assert_eq!(selected.borrower_selected_at, Some(start()));

        let first = f.service.offers().fetch(first.id).unwrap().unwrap();
        assert_eq!(first.borrower_selected_at, None);

        let events = f.service.take_events();
        assert!(events.iter().any(|e| matches!(
            e,
            Event::OfferSelected { deselected: Some(id), .. } if *id == first.id
        )));
    }

    #[test]
    fn test_selected_offer_expires_with_selection() {
        let f = fixture();
        let bank = f.bank(10);
        let app = f.application();
        let offer = f.submit(bank, &app);
        f.service.select_offer(app.id, app.borrower_id, offer.id, &f.time).unwrap();

        f.advance(Duration::days(1) + Duration::seconds(1));
        let stored = f.service.get_offer(offer.id, &f.time).unwrap();
        assert_eq!(stored.status, OfferStatus::ExpiredWithSelection);
    }

    #[test]
    fn test_offer_is_live_until_the_expiry_instant() {
        let f = fixture();
        let bank = f.bank(10);
        let app = f.application();
        let offer = f.submit(bank, &app);

        f.advance(Duration::days(1));
        assert!(!f.service.is_offer_expired(&offer, f.time.now()));
        assert_eq!(f.service.get_offer(offer.id, &f.time).unwrap().status, OfferStatus::Submitted);
        assert!(f.service.is_offer_expired(&offer, f.time.now() + Duration::seconds(1)));
    }

    #[test]
    fn test_offers_sorted_by_apr() {
        let f = fixture();
        let (high, low, mid) = (f.bank(14), f.bank(7), f.bank(10));
        let app = f.application();
        for bank in [high, low, mid] {
            f.submit(bank, &app);
        }

        let offers = f.service.get_offers_for_application(app.id, &f.time).unwrap();
        let institutions: Vec<_> = offers.iter().map(|o| o.institution_id).collect();
        assert_eq!(institutions, vec![low, mid, high]);
    }

    #[test]
    fn test_resubmission_creates_a_new_row() {
        let f = fixture();
        let bank = f.bank(10);
        let app = f.application();
        let original = f.submit(bank, &app);
        f.advance(Duration::days(3));

        let terms = ResubmitTerms {
            validity_period_days: Some(5),
            ..ResubmitTerms::at_apr(Rate::from_percentage(9))
        };
        let renewed = f.service.resubmit_offer(original.id, bank, &terms, &f.time).unwrap();

        assert_ne!(renewed.id, original.id);
        assert_eq!(renewed.status, OfferStatus::Calculated);
        assert_eq!(renewed.previous_offer_id, Some(original.id));
        assert_eq!(renewed.calculation_type, CalculationType::Override);
        assert_eq!(renewed.origination_fee, original.origination_fee);
        assert_eq!(renewed.insurance_cost, original.insurance_cost);
        assert_eq!(renewed.expires_at, f.time.now() + Duration::days(5));

        let stored = f.service.offers().fetch(original.id).unwrap().unwrap();
        assert_eq!(stored.status, OfferStatus::Expired);
        assert_eq!(stored.monthly_payment, original.monthly_payment);
        assert_eq!(stored.apr, original.apr);
    }

    #[test]
    fn test_resubmission_requires_an_expired_offer() {
        let f = fixture();
        let bank = f.bank(10);
        let app = f.application();
        let offer = f.submit(bank, &app);
        let terms = ResubmitTerms::at_apr(Rate::from_percentage(9));

        assert!(matches!(
            f.service.resubmit_offer(offer.id, bank, &terms, &f.time),
            Err(OfferError::InvalidState { .. })
        ));
        assert!(matches!(
            f.service.resubmit_offer(offer.id, Uuid::new_v4(), &terms, &f.time),
            Err(OfferError::Forbidden { .. })
        ));
        assert!(matches!(
            f.service.resubmit_offer(Uuid::new_v4(), bank, &terms, &f.time),
            Err(OfferError::NotFound { .. })
        ));

        f.advance(Duration::days(2));
        let too_high = ResubmitTerms::at_apr(Rate::from_percentage(51));
        assert!(matches!(
            f.service.resubmit_offer(offer.id, bank, &too_high, &f.time),
            Err(OfferError::InvalidOverride { field: "apr", .. })
        ));
    }

    #[test]
    fn test_decline_before_offers() {
        let f = fixture();
        let app = f.application();
        let bank = Uuid::new_v4();

        let result = f
            .service
            .decline_application(bank, app.id, Some("  income not verifiable "), &f.time)
            .unwrap();
        assert_eq!(result.status, ApplicationStatus::Rejected);
        assert_eq!(result.reason.as_deref(), Some("income not verifiable"));
        assert_eq!(result.declined_at, start());
        assert_eq!(
            f.applications.fetch(app.id).unwrap().unwrap().status,
            ApplicationStatus::Rejected
        );
    }

    #[test]
    fn test_decline_after_offers_is_rejected() {
        let f = fixture();
        let bank = f.bank(10);
        let app = f.application();
        f.submit(bank, &app);

        let err = f.service.decline_application(bank, app.id, None, &f.time).unwrap_err();
        assert!(matches!(err, OfferError::InvalidState { .. }));
    }

    #[test]
    fn test_decline_reason_length() {
        let f = fixture();
        let app = f.application();
        let reason = "x".repeat(501);

        let err = f
            .service
            .decline_application(Uuid::new_v4(), app.id, Some(reason.as_str()), &f.time)
            .unwrap_err();
        assert!(matches!(err, OfferError::Validation { field: "reason", .. }));
        assert!(f
            .service
            .decline_application(Uuid::new_v4(), app.id, Some("x".repeat(500).as_str()), &f.time)
            .is_ok());
    }

    struct FailingBorrowerNotifier {
        calls: Mutex<u32>,
    }

    impl BorrowerNotifier for FailingBorrowerNotifier {
        fn notify_application_declined(&self, _: &Application, _: &str) -> std::result::Result<(), NotificationError> {
            *self.calls.lock().unwrap() += 1;
            Err(NotificationError::Transport("smtp down".into()))
        }
    }

    #[test]
    fn test_decline_survives_notification_failure() {
        let notifier = Arc::new(FailingBorrowerNotifier { calls: Mutex::new(0) });
        let applications = Arc::new(InMemoryApplicationStore::new());
        let service = OfferService::new(
            Arc::new(InMemoryOfferStore::new()),
            Arc::new(InMemoryRateCardStore::new()),
            applications.clone(),
            Arc::new(InMemoryCalculationLogStore::new()),
            OfferPolicy::default(),
        )
        .with_borrower_notifier(notifier.clone());
        let time = SafeTimeProvider::new(TimeSource::Test(start()));
        let app = applications
            .insert(Application::new(
                Uuid::new_v4(),
                LoanType::Auto,
                Currency::Mdl,
                Money::from_major(50_000),
                60,
                start(),
            ))
            .unwrap();

        let result = service.decline_application(Uuid::new_v4(), app.id, None, &time).unwrap();
        assert_eq!(result.status, ApplicationStatus::Rejected);
        assert_eq!(*notifier.calls.lock().unwrap(), 1);
    }

    #[test]
    fn test_sweep_expires_overdue_offers() {
        let f = fixture();
        let (a, b) = (f.bank(9), f.bank(10));
        let app = f.application();
        let selected = f.submit(a, &app);
        let plain = f.submit(b, &app);
        f.service.select_offer(app.id, app.borrower_id, selected.id, &f.time).unwrap();

        f.advance(Duration::days(2));
        let sweep = f.service.expire_overdue_offers(&f.time).unwrap();
        assert_eq!(sweep.expired.len(), 2);
        assert_eq!(sweep.failed, 0);

        let offers = f.service.offers();
        assert_eq!(
            offers.fetch(selected.id).unwrap().unwrap().status,
            OfferStatus::ExpiredWithSelection
        );
        assert_eq!(offers.fetch(plain.id).unwrap().unwrap().status, OfferStatus::Expired);
        assert!(f.service.expire_overdue_offers(&f.time).unwrap().expired.is_empty());
    }
}
