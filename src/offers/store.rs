use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};

use super::model::Offer;
use crate::errors::RepositoryError;
use crate::types::{ApplicationId, InstitutionId, OfferId, OfferStatus};

/// storage contract for offers
///
/// writes are optimistic: an update carries the version it was read at and
/// fails with `VersionConflict` when the stored row has moved on
pub trait OfferRepository: Send + Sync {
    /// store a new offer; at most one non-terminal offer per institution and application
    fn insert(&self, offer: Offer) -> Result<Offer, RepositoryError>;

    /// versioned update, returns the stored row with its new version
    fn update(&self, offer: Offer) -> Result<Offer, RepositoryError>;

    /// versioned update of several rows, all or nothing
    fn update_batch(&self, offers: Vec<Offer>) -> Result<Vec<Offer>, RepositoryError>;

    fn fetch(&self, id: OfferId) -> Result<Option<Offer>, RepositoryError>;

    /// the non-terminal offer for an institution and application
    fn find_active(
        &self,
        institution_id: InstitutionId,
        application_id: ApplicationId,
    ) -> Result<Option<Offer>, RepositoryError>;

    fn list_for_application(&self, application_id: ApplicationId) -> Result<Vec<Offer>, RepositoryError>;

    /// submitted, not yet notified, expiring within `[from, to]`
    fn list_expiring(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<Offer>, RepositoryError>;

    /// non-terminal offers whose expiry is before `now`
    fn list_overdue(&self, now: DateTime<Utc>) -> Result<Vec<Offer>, RepositoryError>;
}

#[derive(Debug, Default)]
pub struct InMemoryOfferStore {
    offers: RwLock<HashMap<OfferId, Offer>>,
}

impl InMemoryOfferStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.offers.read().map(|o| o.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned<T>(_: T) -> RepositoryError {
    RepositoryError::Unavailable("offer store lock poisoned".to_string())
}

fn check_write(stored: &Offer, incoming: &Offer) -> Result<(), RepositoryError> {
    if stored.version != incoming.version {
        return Err(RepositoryError::VersionConflict {
            id: stored.id,
            expected: incoming.version,
            found: stored.version,
        });
    }
    if stored.status.is_terminal() && stored.status != incoming.status {
        return Err(RepositoryError::Immutable { id: stored.id });
    }
    Ok(())
}

fn sorted_by_expiry(mut offers: Vec<Offer>) -> Vec<Offer> {
    offers.sort_by_key(|o| (o.expires_at, o.id));
    offers
}

impl OfferRepository for InMemoryOfferStore {
    fn insert(&self, mut offer: Offer) -> Result<Offer, RepositoryError> {
        let mut offers = self.offers.write().map_err(poisoned)?;

        if !offer.status.is_terminal() {
            let existing = offers.values().find(|o| {
                !o.status.is_terminal()
                    && o.institution_id == offer.institution_id
                    && o.application_id == offer.application_id
            });
            if let Some(existing) = existing {
                return Err(RepositoryError::DuplicateActive {
                    institution_id: offer.institution_id,
                    application_id: offer.application_id,
                    existing: existing.id,
                });
            }
        }

        offer.version = 1;
        offers.insert(offer.id, offer.clone());
        Ok(offer)
    }

    fn update(&self, offer: Offer) -> Result<Offer, RepositoryError> {
        let mut offers = self.offers.write().map_err(poisoned)?;
        let stored = offers.get_mut(&offer.id).ok_or(RepositoryError::NotFound { id: offer.id })?;
        check_write(stored, &offer)?;

        let version = stored.version + 1;
        *stored = Offer { version, ..offer };
        Ok(stored.clone())
    }

    fn update_batch(&self, batch: Vec<Offer>) -> Result<Vec<Offer>, RepositoryError> {
        let mut offers = self.offers.write().map_err(poisoned)?;

        for offer in &batch {
            let stored = offers.get(&offer.id).ok_or(RepositoryError::NotFound { id: offer.id })?;
            check_write(stored, offer)?;
        }

        let mut written = Vec::with_capacity(batch.len());
        for offer in batch {
            let version = offer.version + 1;
            let stored = Offer { version, ..offer };
            offers.insert(stored.id, stored.clone());
            written.push(stored);
        }
        Ok(written)
    }

    fn fetch(&self, id: OfferId) -> Result<Option<Offer>, RepositoryError> {
        let offers = self.offers.read().map_err(poisoned)?;
        Ok(offers.get(&id).cloned())
    }

    fn find_active(
        &self,
        institution_id: InstitutionId,
        application_id: ApplicationId,
    ) -> Result<Option<Offer>, RepositoryError> {
        let offers = self.offers.read().map_err(poisoned)?;
        Ok(offers
            .values()
            .find(|o| {
                !o.status.is_terminal()
                    && o.institution_id == institution_id
                    && o.application_id == application_id
            })
            .cloned())
    }

    fn list_for_application(&self, application_id: ApplicationId) -> Result<Vec<Offer>, RepositoryError> {
        let offers = self.offers.read().map_err(poisoned)?;
        let mut found: Vec<Offer> = offers
            .values()
            .filter(|o| o.application_id == application_id)
            .cloned()
            .collect();
        found.sort_by_key(|o| (o.created_at, o.id));
        Ok(found)
    }

    fn list_expiring(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<Offer>, RepositoryError> {
        let offers = self.offers.read().map_err(poisoned)?;
        Ok(sorted_by_expiry(
            offers
                .values()
                .filter(|o| {
                    o.status == OfferStatus::Submitted
                        && !o.notified
                        && o.expires_at >= from
                        && o.expires_at <= to
                })
                .cloned()
                .collect(),
        ))
    }

    fn list_overdue(&self, now: DateTime<Utc>) -> Result<Vec<Offer>, RepositoryError> {
        let offers = self.offers.read().map_err(poisoned)?;
        Ok(sorted_by_expiry(
            offers
                .values()
                .filter(|o| !o.status.is_terminal() && o.expires_at < now)
                .cloned()
                .collect(),
        ))
    }
}
