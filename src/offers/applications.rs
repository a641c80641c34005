use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::OfferPolicy;
use crate::decimal::Money;
use crate::errors::{OfferError, RepositoryError, Result};
use crate::types::{ApplicationId, ApplicationStatus, BorrowerId, Currency, LoanType};

/// value snapshot of a loan application as the engine sees it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    pub id: ApplicationId,
    pub borrower_id: BorrowerId,
    pub loan_type: LoanType,
    pub currency: Currency,
    pub principal: Money,
    pub term_months: u32,
    pub status: ApplicationStatus,
    pub updated_at: DateTime<Utc>,
}

impl Application {
    pub fn new(
        borrower_id: BorrowerId,
        loan_type: LoanType,
        currency: Currency,
        principal: Money,
        term_months: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            borrower_id,
            loan_type,
            currency,
            principal,
            term_months,
            status: ApplicationStatus::Submitted,
            updated_at: now,
        }
    }

    /// amount and term usable for pricing
    pub fn validate_terms(&self, policy: &OfferPolicy) -> Result<()> {
        if !self.principal.is_positive() {
            return Err(OfferError::validation(
                "principal",
                format!("loan amount must be positive, got {}", self.principal),
            ));
        }
        if !policy.term_months.contains(self.term_months) {
            return Err(OfferError::validation(
                "term_months",
                format!(
                    "term {} outside {}-{} months",
                    self.term_months, policy.term_months.min, policy.term_months.max
                ),
            ));
        }
        Ok(())
    }
}

/// lookup and update of applications by id
pub trait ApplicationRepository: Send + Sync {
    fn fetch(&self, id: ApplicationId) -> std::result::Result<Option<Application>, RepositoryError>;
    fn update(&self, application: Application) -> std::result::Result<Application, RepositoryError>;
}

#[derive(Debug, Default)]
pub struct InMemoryApplicationStore {
    applications: RwLock<HashMap<ApplicationId, Application>>,
}

impl InMemoryApplicationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, application: Application) -> std::result::Result<Application, RepositoryError> {
        let mut applications = self.applications.write().map_err(poisoned)?;
        applications.insert(application.id, application.clone());
        Ok(application)
    }
}

fn poisoned<T>(_: T) -> RepositoryError {
    RepositoryError::Unavailable("application store lock poisoned".to_string())
}

impl ApplicationRepository for InMemoryApplicationStore {
    fn fetch(&self, id: ApplicationId) -> std::result::Result<Option<Application>, RepositoryError> {
        let applications = self.applications.read().map_err(poisoned)?;
        Ok(applications.get(&id).cloned())
    }

    fn update(&self, application: Application) -> std::result::Result<Application, RepositoryError> {
        let mut applications = self.applications.write().map_err(poisoned)?;
        match applications.get_mut(&application.id) {
            Some(stored) => {
                *stored = application.clone();
                Ok(application)
            }
            None => Err(RepositoryError::NotFound { id: application.id }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_terms_validation() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let policy = OfferPolicy::default();
        let mut app = Application::new(
            Uuid::new_v4(),
            LoanType::Personal,
            Currency::Eur,
            Money::from_major(10_000),
            36,
            now,
        );
        assert!(app.validate_terms(&policy).is_ok());

        app.term_months = 481;
        assert!(matches!(
            app.validate_terms(&policy),
            Err(OfferError::Validation { field: "term_months", .. })
        ));

        app.term_months = 36;
        app.principal = Money::ZERO;
        assert!(app.validate_terms(&policy).is_err());
    }

    #[test]
    fn test_update_requires_existing_record() {
        let store = InMemoryApplicationStore::new();
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let app = Application::new(Uuid::new_v4(), LoanType::Home, Currency::Usd, Money::from_major(200_000), 360, now);
        assert!(matches!(
            store.update(app.clone()),
            Err(RepositoryError::NotFound { .. })
        ));

        store.insert(app.clone()).unwrap();
        let mut changed = app.clone();
        changed.status = ApplicationStatus::UnderReview;
        store.update(changed).unwrap();
        assert_eq!(store.fetch(app.id).unwrap().unwrap().status, ApplicationStatus::UnderReview);
    }
}
