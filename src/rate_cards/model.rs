use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decimal::{Money, Rate};
use crate::errors::{OfferError, Result};
use crate::types::{Currency, InstitutionId, LoanType, RateCardId};

/// terms longer than this carry half the adjustment range on top of base apr
pub const LONG_TERM_MONTHS: u32 = 120;

/// uniqueness key for active cards
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RateCardKey {
    pub institution_id: InstitutionId,
    pub loan_type: LoanType,
    pub currency: Currency,
}

/// versioned pricing rules of one institution for a loan type and currency
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateCard {
    pub id: RateCardId,
    pub institution_id: InstitutionId,
    pub loan_type: LoanType,
    pub currency: Currency,
    pub min_loan_amount: Money,
    pub max_loan_amount: Money,
    pub base_apr: Rate,
    pub apr_adjustment_range: Rate,
    pub origination_fee_percent: Decimal,
    pub insurance_percent: Option<Decimal>,
    pub processing_time_days: u32,
    pub valid_from: DateTime<Utc>,
    /// none while the card is active
    pub valid_to: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RateCard {
    /// open a new active version from a validated spec
    pub fn open(institution_id: InstitutionId, spec: &RateCardSpec, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            institution_id,
            loan_type: spec.loan_type,
            currency: spec.currency,
            min_loan_amount: spec.min_loan_amount,
            max_loan_amount: spec.max_loan_amount,
            base_apr: spec.base_apr,
            apr_adjustment_range: spec.apr_adjustment_range,
            origination_fee_percent: spec.origination_fee_percent,
            insurance_percent: spec.insurance_percent,
            processing_time_days: spec.processing_time_days,
            valid_from: now,
            valid_to: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn key(&self) -> RateCardKey {
        RateCardKey {
            institution_id: self.institution_id,
            loan_type: self.loan_type,
            currency: self.currency,
        }
    }

    pub fn is_active(&self) -> bool {
        self.valid_to.is_none()
    }

    /// principal within the card's lending range
    pub fn covers(&self, principal: Money) -> bool {
        principal >= self.min_loan_amount && principal <= self.max_loan_amount
    }

    /// quoted apr for a term
    pub fn apr_for_term(&self, term_months: u32) -> Rate {
        if term_months > LONG_TERM_MONTHS {
            self.base_apr + Rate::from_decimal(self.apr_adjustment_range.as_decimal() / Decimal::TWO)
        } else {
            self.base_apr
        }
    }

    pub(crate) fn close(&mut self, now: DateTime<Utc>) {
        self.valid_to = Some(now);
        self.updated_at = now;
    }
}

/// caller-supplied fields for creating or updating a card
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateCardSpec {
    pub loan_type: LoanType,
    pub currency: Currency,
    pub min_loan_amount: Money,
    pub max_loan_amount: Money,
    pub base_apr: Rate,
    pub apr_adjustment_range: Rate,
    pub origination_fee_percent: Decimal,
    pub insurance_percent: Option<Decimal>,
    pub processing_time_days: u32,
}

impl RateCardSpec {
    pub fn validate(&self) -> Result<()> {
        if !self.min_loan_amount.is_positive() {
            return Err(OfferError::validation(
                "min_loan_amount",
                "minimum loan amount must be greater than zero",
            ));
        }
        if !self.max_loan_amount.is_positive() {
            return Err(OfferError::validation(
                "max_loan_amount",
                "maximum loan amount must be greater than zero",
            ));
        }
        if self.min_loan_amount > self.max_loan_amount {
            return Err(OfferError::validation(
                "min_loan_amount",
                format!(
                    "minimum {} exceeds maximum {}",
                    self.min_loan_amount, self.max_loan_amount
                ),
            ));
        }
        if self.base_apr.is_negative() {
            return Err(OfferError::validation("base_apr", "base apr cannot be negative"));
        }
        if self.apr_adjustment_range.is_negative() {
            return Err(OfferError::validation(
                "apr_adjustment_range",
                "apr adjustment range cannot be negative",
            ));
        }
        if self.origination_fee_percent < Decimal::ZERO {
            return Err(OfferError::validation(
                "origination_fee_percent",
                "origination fee percent cannot be negative",
            ));
        }
        if matches!(self.insurance_percent, Some(pct) if pct < Decimal::ZERO) {
            return Err(OfferError::validation(
                "insurance_percent",
                "insurance percent cannot be negative",
            ));
        }
        if self.processing_time_days == 0 {
            return Err(OfferError::validation(
                "processing_time_days",
                "processing time must be at least one day",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn spec() -> RateCardSpec {
        RateCardSpec {
            loan_type: LoanType::Personal,
            currency: Currency::Eur,
            min_loan_amount: Money::from_major(1_000),
            max_loan_amount: Money::from_major(50_000),
            base_apr: Rate::from_percent(dec!(8.5)),
            apr_adjustment_range: Rate::from_percentage(2),
            origination_fee_percent: dec!(1.5),
            insurance_percent: Some(dec!(0.5)),
            processing_time_days: 5,
        }
    }

    #[test]
    fn test_long_terms_carry_half_the_adjustment() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let card = RateCard::open(Uuid::new_v4(), &spec(), now);
        assert_eq!(card.apr_for_term(120).as_percentage(), dec!(8.5));
        assert_eq!(card.apr_for_term(121).as_percentage(), dec!(9.5));
    }

    #[test]
    fn test_covers_inclusive_range() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let card = RateCard::open(Uuid::new_v4(), &spec(), now);
        assert!(card.covers(Money::from_major(1_000)));
        assert!(card.covers(Money::from_major(50_000)));
        assert!(!card.covers(Money::from_major(50_001)));
        assert!(card.is_active());
    }

    #[test]
    fn test_spec_validation() {
        assert!(spec().validate().is_ok());

        let mut inverted = spec();
        inverted.min_loan_amount = Money::from_major(60_000);
        assert!(matches!(
            inverted.validate(),
            Err(OfferError::Validation { field: "min_loan_amount", .. })
        ));

        let mut negative_fee = spec();
        negative_fee.origination_fee_percent = dec!(-0.1);
        assert!(negative_fee.validate().is_err());

        let mut no_insurance = spec();
        no_insurance.insurance_percent = None;
        assert!(no_insurance.validate().is_ok());
    }
}
