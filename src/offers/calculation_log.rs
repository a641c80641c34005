use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use super::model::Offer;
use crate::errors::RepositoryError;
use crate::types::{ApplicationId, CalculationType, InstitutionId, OfferId};

/// method recorded for every rate-card annuity calculation
pub const CALCULATION_METHOD: &str = "RATE_CARD_ANNUITY";

/// write-once audit record of a pricing calculation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculationLog {
    pub id: Uuid,
    pub application_id: ApplicationId,
    pub institution_id: InstitutionId,
    pub offer_id: OfferId,
    /// offer version the figures were read from
    pub offer_version: u64,
    pub calculation_method: String,
    pub calculation_type: CalculationType,
    pub input_parameters: Value,
    pub calculated_values: Value,
    pub timestamp: DateTime<Utc>,
}

impl CalculationLog {
    /// rebuild the entry from an offer's persisted calculation fields
    pub fn from_offer(offer: &Offer, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            application_id: offer.application_id,
            institution_id: offer.institution_id,
            offer_id: offer.id,
            offer_version: offer.version,
            calculation_method: CALCULATION_METHOD.to_string(),
            calculation_type: offer.calculation_type,
            input_parameters: json!({
                "principal": offer.principal,
                "term_months": offer.term_months,
                "apr_percent": offer.apr.as_percentage(),
                "rate_card_id": offer.rate_card_id,
                "processing_time_days": offer.processing_time_days,
                "validity_period_days": offer.validity_period_days,
            }),
            calculated_values: json!({
                "monthly_payment": offer.monthly_payment,
                "total_cost": offer.total_cost,
                "origination_fee": offer.origination_fee,
                "insurance_cost": offer.insurance_cost,
            }),
            timestamp,
        }
    }
}

/// append-only storage for calculation logs
pub trait CalculationLogRepository: Send + Sync {
    /// write once per (offer, version); a repeat is accepted and reports `false`
    fn append(&self, log: CalculationLog) -> Result<bool, RepositoryError>;

    fn list_for_application(&self, application_id: ApplicationId) -> Result<Vec<CalculationLog>, RepositoryError>;

    fn list_for_offer(&self, offer_id: OfferId) -> Result<Vec<CalculationLog>, RepositoryError>;
}

#[derive(Debug, Default)]
pub struct InMemoryCalculationLogStore {
    logs: RwLock<Vec<CalculationLog>>,
}

impl InMemoryCalculationLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.logs.read().map(|l| l.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned<T>(_: T) -> RepositoryError {
    RepositoryError::Unavailable("calculation log store lock poisoned".to_string())
}

impl CalculationLogRepository for InMemoryCalculationLogStore {
    fn append(&self, log: CalculationLog) -> Result<bool, RepositoryError> {
        let mut logs = self.logs.write().map_err(poisoned)?;
        let duplicate = logs
            .iter()
            .any(|l| l.offer_id == log.offer_id && l.offer_version == log.offer_version);
        if duplicate {
            return Ok(false);
        }
        logs.push(log);
        Ok(true)
    }

    fn list_for_application(&self, application_id: ApplicationId) -> Result<Vec<CalculationLog>, RepositoryError> {
        let logs = self.logs.read().map_err(poisoned)?;
        Ok(logs.iter().filter(|l| l.application_id == application_id).cloned().collect())
    }

    fn list_for_offer(&self, offer_id: OfferId) -> Result<Vec<CalculationLog>, RepositoryError> {
        let logs = self.logs.read().map_err(poisoned)?;
        Ok(logs.iter().filter(|l| l.offer_id == offer_id).cloned().collect())
    }
}
