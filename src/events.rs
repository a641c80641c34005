use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::decimal::{Money, Rate};
use crate::types::{
    ApplicationId, BorrowerId, CalculationType, Currency, InstitutionId, LoanType, OfferId,
    OfferStatus, OfficerId, RateCardId,
};

/// all events emitted by the engine, forming the audit trail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    // rate card events
    RateCardOpened {
        rate_card_id: RateCardId,
        institution_id: InstitutionId,
        loan_type: LoanType,
        currency: Currency,
        base_apr: Rate,
        timestamp: DateTime<Utc>,
    },
    RateCardClosed {
        rate_card_id: RateCardId,
        institution_id: InstitutionId,
        superseded_by: RateCardId,
        timestamp: DateTime<Utc>,
    },

    // offer events
    OfferCalculated {
        offer_id: OfferId,
        application_id: ApplicationId,
        institution_id: InstitutionId,
        apr: Rate,
        monthly_payment: Money,
        calculation_type: CalculationType,
        timestamp: DateTime<Utc>,
    },
    OfferSubmitted {
        offer_id: OfferId,
        application_id: ApplicationId,
        institution_id: InstitutionId,
        officer_id: OfficerId,
        apr: Rate,
        overridden: bool,
        expires_at: DateTime<Utc>,
        timestamp: DateTime<Utc>,
    },
    OfferResubmitted {
        offer_id: OfferId,
        previous_offer_id: OfferId,
        application_id: ApplicationId,
        institution_id: InstitutionId,
        apr: Rate,
        timestamp: DateTime<Utc>,
    },
    OfferSelected {
        offer_id: OfferId,
        application_id: ApplicationId,
        borrower_id: BorrowerId,
        deselected: Option<OfferId>,
        timestamp: DateTime<Utc>,
    },
    OfferStatusChanged {
        offer_id: OfferId,
        old_status: OfferStatus,
        new_status: OfferStatus,
        reason: String,
        timestamp: DateTime<Utc>,
    },
    ExpirationWarningSent {
        offer_id: OfferId,
        institution_id: InstitutionId,
        expires_at: DateTime<Utc>,
        timestamp: DateTime<Utc>,
    },

    // application events
    ApplicationDeclined {
        application_id: ApplicationId,
        institution_id: InstitutionId,
        reason: Option<String>,
        timestamp: DateTime<Utc>,
    },
    ApplicationAccepted {
        application_id: ApplicationId,
        offer_id: OfferId,
        timestamp: DateTime<Utc>,
    },

    // calculation log events
    CalculationLogDeferred {
        offer_id: OfferId,
        attempts: u32,
        error: String,
        timestamp: DateTime<Utc>,
    },
}

/// event store for collecting events during operations
#[derive(Debug, Default)]
pub struct EventStore {
    events: Vec<Event>,
}

impl EventStore {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn emit(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}
