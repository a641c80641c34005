use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// unique identifier for an offer
pub type OfferId = Uuid;

/// unique identifier for a loan application
pub type ApplicationId = Uuid;

/// unique identifier for a lending institution
pub type InstitutionId = Uuid;

/// unique identifier for a borrower
pub type BorrowerId = Uuid;

/// unique identifier for a rate card version
pub type RateCardId = Uuid;

/// unique identifier for an institution officer
pub type OfficerId = Uuid;

/// loan products priced by rate cards
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoanType {
    Personal,
    Home,
    Auto,
}

impl LoanType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoanType::Personal => "PERSONAL",
            LoanType::Home => "HOME",
            LoanType::Auto => "AUTO",
        }
    }
}

impl fmt::Display for LoanType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// supported lending currencies
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Currency {
    Eur,
    Usd,
    Mdl,
}

impl Currency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Currency::Eur => "EUR",
            Currency::Usd => "USD",
            Currency::Mdl => "MDL",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// offer status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OfferStatus {
    /// system quote, not yet shown to the borrower
    Calculated,
    /// confirmed by the institution and visible to the borrower
    Submitted,
    /// chosen by the borrower
    Accepted,
    /// lost to a sibling offer
    Rejected,
    /// expiry passed without a selection
    Expired,
    /// expiry passed while the borrower had it selected
    ExpiredWithSelection,
    /// pulled by the institution
    Withdrawn,
}

impl OfferStatus {
    /// terminal statuses never change again
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OfferStatus::Calculated | OfferStatus::Submitted)
    }

    /// statuses a resubmission may start from
    pub fn is_expired(&self) -> bool {
        matches!(self, OfferStatus::Expired | OfferStatus::ExpiredWithSelection)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OfferStatus::Calculated => "CALCULATED",
            OfferStatus::Submitted => "SUBMITTED",
            OfferStatus::Accepted => "ACCEPTED",
            OfferStatus::Rejected => "REJECTED",
            OfferStatus::Expired => "EXPIRED",
            OfferStatus::ExpiredWithSelection => "EXPIRED_WITH_SELECTION",
            OfferStatus::Withdrawn => "WITHDRAWN",
        }
    }
}

impl fmt::Display for OfferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// application status, declared in workflow order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApplicationStatus {
    Draft,
    Submitted,
    UnderReview,
    /// at least one offer has been shown to the borrower
    OffersAvailable,
    Accepted,
    Rejected,
    Expired,
    Completed,
}

impl ApplicationStatus {
    /// institutions may still decline before offers are shown
    pub fn is_declinable(&self) -> bool {
        *self < ApplicationStatus::OffersAvailable
    }
}

/// how a logged calculation was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CalculationType {
    /// system quote from the institution's rate card
    Mock,
    /// institution submission at rate card figures
    Real,
    /// institution changed at least one figure
    Override,
}
