use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};

use super::model::{RateCard, RateCardKey};
use crate::errors::RepositoryError;
use crate::types::{Currency, InstitutionId, LoanType, RateCardId};

/// storage contract for versioned rate cards
pub trait RateCardRepository: Send + Sync {
    /// atomically close `supersedes` and any active card on the new card's key, then insert it
    fn open_version(
        &self,
        card: RateCard,
        supersedes: Option<RateCardId>,
        at: DateTime<Utc>,
    ) -> Result<Vec<RateCard>, RepositoryError>;

    fn fetch(&self, id: RateCardId) -> Result<Option<RateCard>, RepositoryError>;

    fn find_active(
        &self,
        institution_id: InstitutionId,
        loan_type: LoanType,
        currency: Currency,
    ) -> Result<Option<RateCard>, RepositoryError>;

    /// active cards of one institution ordered by loan type then currency
    fn list_active(&self, institution_id: InstitutionId) -> Result<Vec<RateCard>, RepositoryError>;

    /// institutions holding at least one active card
    fn active_institutions(&self) -> Result<Vec<InstitutionId>, RepositoryError>;
}

#[derive(Debug, Default)]
pub struct InMemoryRateCardStore {
    cards: RwLock<HashMap<RateCardId, RateCard>>,
}

impl InMemoryRateCardStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// every version ever stored for a key, oldest first
    pub fn history(&self, key: RateCardKey) -> Result<Vec<RateCard>, RepositoryError> {
        let cards = self.cards.read().map_err(poisoned)?;
        let mut versions: Vec<RateCard> = cards.values().filter(|c| c.key() == key).cloned().collect();
        versions.sort_by_key(|c| c.valid_from);
        Ok(versions)
    }
}

fn poisoned<T>(_: T) -> RepositoryError {
    RepositoryError::Unavailable("rate card store lock poisoned".to_string())
}

impl RateCardRepository for InMemoryRateCardStore {
    fn open_version(
        &self,
        card: RateCard,
        supersedes: Option<RateCardId>,
        at: DateTime<Utc>,
    ) -> Result<Vec<RateCard>, RepositoryError> {
        let mut cards = self.cards.write().map_err(poisoned)?;

        if let Some(id) = supersedes {
            match cards.get(&id) {
                None => return Err(RepositoryError::NotFound { id }),
                Some(old) if !old.is_active() => return Err(RepositoryError::Immutable { id }),
                Some(_) => {}
            }
        }

        let key = card.key();
        let to_close: Vec<RateCardId> = cards
            .values()
            .filter(|c| c.is_active() && (c.key() == key || Some(c.id) == supersedes))
            .map(|c| c.id)
            .collect();

        let mut closed = Vec::with_capacity(to_close.len());
        for id in to_close {
            if let Some(old) = cards.get_mut(&id) {
                old.close(at);
                closed.push(old.clone());
            }
        }

        cards.insert(card.id, card);
        Ok(closed)
    }

    fn fetch(&self, id: RateCardId) -> Result<Option<RateCard>, RepositoryError> {
        let cards = self.cards.read().map_err(poisoned)?;
        Ok(cards.get(&id).cloned())
    }

    fn find_active(
        &self,
        institution_id: InstitutionId,
        loan_type: LoanType,
        currency: Currency,
    ) -> Result<Option<RateCard>, RepositoryError> {
        let key = RateCardKey {
            institution_id,
            loan_type,
            currency,
        };
        let cards = self.cards.read().map_err(poisoned)?;
        Ok(cards.values().find(|c| c.is_active() && c.key() == key).cloned())
    }

    fn list_active(&self, institution_id: InstitutionId) -> Result<Vec<RateCard>, RepositoryError> {
        let cards = self.cards.read().map_err(poisoned)?;
        let mut active: Vec<RateCard> = cards
            .values()
            .filter(|c| c.is_active() && c.institution_id == institution_id)
            .cloned()
            .collect();
        active.sort_by_key(|c| (c.loan_type, c.currency));
        Ok(active)
    }

    fn active_institutions(&self) -> Result<Vec<InstitutionId>, RepositoryError> {
        let cards = self.cards.read().map_err(poisoned)?;
        let mut ids: Vec<InstitutionId> = cards
            .values()
            .filter(|c| c.is_active())
            .map(|c| c.institution_id)
            .collect();
        ids.sort();
        ids.dedup();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decimal::{Money, Rate};
    use crate::rate_cards::RateCardSpec;
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn spec(loan_type: LoanType) -> RateCardSpec {
        RateCardSpec {
            loan_type,
            currency: Currency::Eur,
            min_loan_amount: Money::from_major(1_000),
            max_loan_amount: Money::from_major(50_000),
            base_apr: Rate::from_percentage(9),
            apr_adjustment_range: Rate::ZERO,
            origination_fee_percent: dec!(1),
            insurance_percent: None,
            processing_time_days: 3,
        }
    }

    #[test]
    fn test_opening_a_version_closes_the_active_one() {
        let store = InMemoryRateCardStore::new();
        let bank = Uuid::new_v4();
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let t1 = t0 + Duration::days(1);

        let first = RateCard::open(bank, &spec(LoanType::Personal), t0);
        assert!(store.open_version(first.clone(), None, t0).unwrap().is_empty());

        let second = RateCard::open(bank, &spec(LoanType::Personal), t1);
        let closed = store.open_version(second.clone(), None, t1).unwrap();
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].id, first.id);
        assert_eq!(closed[0].valid_to, Some(t1));

        let active = store.find_active(bank, LoanType::Personal, Currency::Eur).unwrap().unwrap();
        assert_eq!(active.id, second.id);
        assert_eq!(store.history(second.key()).unwrap().len(), 2);
    }

    #[test]
    fn test_closed_cards_cannot_be_superseded() {
        let store = InMemoryRateCardStore::new();
        let bank = Uuid::new_v4();
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

        let first = RateCard::open(bank, &spec(LoanType::Auto), t0);
        store.open_version(first.clone(), None, t0).unwrap();
        store
            .open_version(RateCard::open(bank, &spec(LoanType::Auto), t0), Some(first.id), t0)
            .unwrap();

        let err = store
            .open_version(RateCard::open(bank, &spec(LoanType::Auto), t0), Some(first.id), t0)
            .unwrap_err();
        assert_eq!(err, RepositoryError::Immutable { id: first.id });
    }

    #[test]
    fn test_list_active_is_ordered() {
        let store = InMemoryRateCardStore::new();
        let bank = Uuid::new_v4();
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        for loan_type in [LoanType::Auto, LoanType::Personal, LoanType::Home] {
            store.open_version(RateCard::open(bank, &spec(loan_type), t0), None, t0).unwrap();
        }

        let types: Vec<LoanType> = store.list_active(bank).unwrap().iter().map(|c| c.loan_type).collect();
        assert_eq!(types, vec![LoanType::Personal, LoanType::Home, LoanType::Auto]);
        assert_eq!(store.active_institutions().unwrap(), vec![bank]);
    }
}
