use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::calculation::LoanQuote;
use crate::decimal::{Money, Rate};
use crate::errors::{OfferError, Result};
use crate::types::{
    ApplicationId, CalculationType, InstitutionId, OfferId, OfferStatus, OfficerId, RateCardId,
};

/// priced loan proposal of one institution for one application
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Offer {
    pub id: OfferId,
    pub application_id: ApplicationId,
    pub institution_id: InstitutionId,
    pub status: OfferStatus,

    // calculation inputs, persisted so the log can be rebuilt
    pub principal: Money,
    pub term_months: u32,
    pub rate_card_id: Option<RateCardId>,
    pub calculation_type: CalculationType,

    // figures
    pub apr: Rate,
    pub monthly_payment: Money,
    pub total_cost: Money,
    pub origination_fee: Money,
    pub insurance_cost: Option<Money>,
    pub processing_time_days: u32,
    pub validity_period_days: u32,
    pub required_documents: Vec<String>,

    // timeline
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub borrower_selected_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,

    pub submitted_by_officer_id: Option<OfficerId>,
    pub submission_notes: Option<String>,
    /// offer this one was resubmitted from
    pub previous_offer_id: Option<OfferId>,
    /// expiration warning already delivered
    pub notified: bool,
    /// optimistic concurrency counter, assigned by the store
    pub version: u64,
}

impl Offer {
    /// new calculated offer carrying the quote's figures
    pub fn from_quote(
        application_id: ApplicationId,
        institution_id: InstitutionId,
        quote: &LoanQuote,
        calculation_type: CalculationType,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            application_id,
            institution_id,
            status: OfferStatus::Calculated,
            principal: quote.principal,
            term_months: quote.term_months,
            rate_card_id: None,
            calculation_type,
            apr: quote.apr,
            monthly_payment: quote.monthly_payment,
            total_cost: quote.total_cost,
            origination_fee: quote.origination_fee,
            insurance_cost: quote.insurance_cost,
            processing_time_days: 0,
            validity_period_days: 0,
            required_documents: Vec::new(),
            created_at: now,
            expires_at: now,
            submitted_at: None,
            borrower_selected_at: None,
            updated_at: now,
            submitted_by_officer_id: None,
            submission_notes: None,
            previous_offer_id: None,
            notified: false,
            version: 0,
        }
    }

    /// replace figures with a fresh quote
    pub fn apply_quote(&mut self, quote: &LoanQuote) {
        self.principal = quote.principal;
        self.term_months = quote.term_months;
        self.apr = quote.apr;
        self.monthly_payment = quote.monthly_payment;
        self.total_cost = quote.total_cost;
        self.origination_fee = quote.origination_fee;
        self.insurance_cost = quote.insurance_cost;
    }

    /// strictly past the expiry timestamp
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// status an overdue offer moves to
    pub fn expired_status(&self) -> OfferStatus {
        if self.borrower_selected_at.is_some() {
            OfferStatus::ExpiredWithSelection
        } else {
            OfferStatus::Expired
        }
    }

    /// move along the state machine, returning the previous status
    pub fn transition(&mut self, to: OfferStatus, now: DateTime<Utc>) -> Result<OfferStatus> {
        use OfferStatus::*;

        let allowed = match self.status {
            Calculated => matches!(to, Submitted | Expired | ExpiredWithSelection),
            Submitted => matches!(
                to,
                Accepted | Rejected | Withdrawn | Expired | ExpiredWithSelection
            ),
            _ => false,
        };
        if !allowed {
            return Err(OfferError::InvalidState {
                current: self.status.to_string(),
                expected: format!("a status that can move to {to}"),
            });
        }

        let from = self.status;
        self.status = to;
        self.updated_at = now;
        Ok(from)
    }

    /// whether the borrower sees this offer
    pub fn is_visible_to_borrower(&self) -> bool {
        self.status != OfferStatus::Calculated
    }
}

/// figures an institution may change when submitting
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OfferOverrides {
    pub apr: Option<Rate>,
    pub origination_fee_percent: Option<Decimal>,
    pub insurance_percent: Option<Decimal>,
    pub processing_time_days: Option<u32>,
    pub validity_period_days: Option<u32>,
    /// explicit expiry, wins over validity days
    pub expires_at: Option<DateTime<Utc>>,
    pub required_documents: Option<Vec<String>>,
    pub notes: Option<String>,
}

impl OfferOverrides {
    /// any pricing figure replaced
    pub fn changes_pricing(&self) -> bool {
        self.apr.is_some() || self.origination_fee_percent.is_some() || self.insurance_percent.is_some()
    }
}

/// new terms for a resubmitted offer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResubmitTerms {
    pub apr: Rate,
    /// defaults to the previous offer's fee
    pub origination_fee: Option<Money>,
    /// defaults to the previous offer's insurance cost
    pub insurance_cost: Option<Money>,
    pub processing_time_days: Option<u32>,
    pub validity_period_days: Option<u32>,
    pub notes: Option<String>,
}

impl ResubmitTerms {
    pub fn at_apr(apr: Rate) -> Self {
        Self {
            apr,
            origination_fee: None,
            insurance_cost: None,
            processing_time_days: None,
            validity_period_days: None,
            notes: None,
        }
    }
}
