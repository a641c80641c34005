use std::sync::{Arc, Mutex};

use hourglass_rs::SafeTimeProvider;
use tracing::{debug, info};

use super::model::{RateCard, RateCardSpec};
use super::store::RateCardRepository;
use crate::errors::{OfferError, Result};
use crate::events::{Event, EventStore};
use crate::types::{Currency, InstitutionId, LoanType, RateCardId};

/// institution-facing operations over versioned rate cards
pub struct RateCardService<R> {
    cards: Arc<R>,
    events: Mutex<EventStore>,
}

impl<R> RateCardService<R>
where
    R: RateCardRepository,
{
    pub fn new(cards: Arc<R>) -> Self {
        Self {
            cards,
            events: Mutex::new(EventStore::new()),
        }
    }

    /// open a card, closing any active one on the same loan type and currency
    pub fn create_rate_card(
        &self,
        institution_id: InstitutionId,
        spec: &RateCardSpec,
        time: &SafeTimeProvider,
    ) -> Result<RateCard> {
        spec.validate()?;
        self.open(institution_id, spec, None, time)
    }

    /// close `rate_card_id` and open its replacement
    pub fn update_rate_card(
        &self,
        institution_id: InstitutionId,
        rate_card_id: RateCardId,
        spec: &RateCardSpec,
        time: &SafeTimeProvider,
    ) -> Result<RateCard> {
        spec.validate()?;

        let existing = self.cards.fetch(rate_card_id)?.ok_or(OfferError::NotFound {
            entity: "rate card",
            id: rate_card_id,
        })?;
        if existing.institution_id != institution_id {
            return Err(OfferError::Forbidden {
                actor: institution_id,
                resource: "rate card",
                id: rate_card_id,
            });
        }
        if !existing.is_active() {
            return Err(OfferError::InvalidState {
                current: "closed".to_string(),
                expected: "active".to_string(),
            });
        }

        self.open(institution_id, spec, Some(rate_card_id), time)
    }

    pub fn get_active_rate_cards(&self, institution_id: InstitutionId) -> Result<Vec<RateCard>> {
        Ok(self.cards.list_active(institution_id)?)
    }

    /// institutions that can be quoted right now
    pub fn institutions_with_active_cards(&self) -> Result<Vec<InstitutionId>> {
        Ok(self.cards.active_institutions()?)
    }

    pub fn get_active_rate_card(
        &self,
        institution_id: InstitutionId,
        loan_type: LoanType,
        currency: Currency,
    ) -> Result<RateCard> {
        self.cards
            .find_active(institution_id, loan_type, currency)?
            .ok_or(OfferError::NoActiveRateCard {
                institution_id,
                loan_type,
                currency,
            })
    }

    pub fn take_events(&self) -> Vec<Event> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).take_events()
    }

    fn open(
        &self,
        institution_id: InstitutionId,
        spec: &RateCardSpec,
        supersedes: Option<RateCardId>,
        time: &SafeTimeProvider,
    ) -> Result<RateCard> {
        let now = time.now();
        let card = RateCard::open(institution_id, spec, now);
        let closed = self.cards.open_version(card.clone(), supersedes, now)?;

        let mut events = self.events.lock().unwrap_or_else(|e| e.into_inner());
        for old in &closed {
            debug!(rate_card_id = %old.id, %institution_id, "rate card closed");
            events.emit(Event::RateCardClosed {
                rate_card_id: old.id,
                institution_id,
                superseded_by: card.id,
                timestamp: now,
            });
        }
        events.emit(Event::RateCardOpened {
            rate_card_id: card.id,
            institution_id,
            loan_type: card.loan_type,
            currency: card.currency,
            base_apr: card.base_apr,
            timestamp: now,
        });

        info!(
            rate_card_id = %card.id,
            %institution_id,
            loan_type = %card.loan_type,
            currency = %card.currency,
            base_apr = %card.base_apr,
            closed = closed.len(),
            "rate card opened"
        );
        Ok(card)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decimal::{Money, Rate};
    use crate::rate_cards::InMemoryRateCardStore;
    use chrono::{Duration, TimeZone, Utc};
    use hourglass_rs::TimeSource;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn spec(base_apr: u32) -> RateCardSpec {
        RateCardSpec {
            loan_type: LoanType::Personal,
            currency: Currency::Eur,
            min_loan_amount: Money::from_major(1_000),
            max_loan_amount: Money::from_major(100_000),
            base_apr: Rate::from_percentage(base_apr),
            apr_adjustment_range: Rate::from_percentage(1),
            origination_fee_percent: dec!(1.5),
            insurance_percent: Some(dec!(0.5)),
            processing_time_days: 5,
        }
    }

    fn service() -> RateCardService<InMemoryRateCardStore> {
        RateCardService::new(Arc::new(InMemoryRateCardStore::new()))
    }

    #[test]
    fn test_update_closes_previous_card() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let time = SafeTimeProvider::new(TimeSource::Test(start));
        let control = time.test_control().unwrap();
        let service = service();
        let bank_a = Uuid::new_v4();

        let original = service.create_rate_card(bank_a, &spec(9), &time).unwrap();
        control.advance(Duration::days(3));
        let updated = service.update_rate_card(bank_a, original.id, &spec(8), &time).unwrap();

        let active = service.get_active_rate_cards(bank_a).unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, updated.id);

        let closed = service.cards.fetch(original.id).unwrap().unwrap();
        assert_eq!(closed.valid_to, Some(start + Duration::days(3)));

        let events = service.take_events();
        assert!(events.iter().any(|e| matches!(
            e,
            Event::RateCardClosed { rate_card_id, superseded_by, .. }
                if *rate_card_id == original.id && *superseded_by == updated.id
        )));
    }

    #[test]
    fn test_institutions_with_active_cards() {
        let time = SafeTimeProvider::new(TimeSource::Test(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()));
        let service = service();
        assert!(service.institutions_with_active_cards().unwrap().is_empty());

        let (bank_a, bank_b) = (Uuid::new_v4(), Uuid::new_v4());
        service.create_rate_card(bank_a, &spec(9), &time).unwrap();
        service.create_rate_card(bank_a, &spec(10), &time).unwrap();
        service.create_rate_card(bank_b, &spec(11), &time).unwrap();

        let mut institutions = service.institutions_with_active_cards().unwrap();
        institutions.sort();
        let mut expected = vec![bank_a, bank_b];
        expected.sort();
        assert_eq!(institutions, expected);
    }

    #[test]
    fn test_create_replaces_active_card_on_same_key() {
        let time = SafeTimeProvider::new(TimeSource::Test(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()));
        let service = service();
        let bank = Uuid::new_v4();

        service.create_rate_card(bank, &spec(9), &time).unwrap();
        let second = service.create_rate_card(bank, &spec(10), &time).unwrap();

        let active = service.get_active_rate_card(bank, LoanType::Personal, Currency::Eur).unwrap();
        assert_eq!(active.id, second.id);
    }

    #[test]
    fn test_update_rejects_foreign_and_closed_cards() {
        let time = SafeTimeProvider::new(TimeSource::Test(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()));
        let service = service();
        let bank = Uuid::new_v4();
        let other = Uuid::new_v4();

        let card = service.create_rate_card(bank, &spec(9), &time).unwrap();
        assert!(matches!(
            service.update_rate_card(other, card.id, &spec(8), &time),
            Err(OfferError::Forbidden { .. })
        ));

        service.update_rate_card(bank, card.id, &spec(8), &time).unwrap();
        assert!(matches!(
            service.update_rate_card(bank, card.id, &spec(7), &time),
            Err(OfferError::InvalidState { .. })
        ));
        assert!(matches!(
            service.update_rate_card(bank, Uuid::new_v4(), &spec(7), &time),
            Err(OfferError::NotFound { .. })
        ));
    }

    #[test]
    fn test_missing_card_is_a_precondition_failure() {
        let service = service();
        let err = service
            .get_active_rate_card(Uuid::new_v4(), LoanType::Home, Currency::Usd)
            .unwrap_err();
        assert_eq!(err.error_code(), "NO_ACTIVE_RATE_CARD");
    }
}
