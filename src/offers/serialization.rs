/// serialization support for offers as shown to borrowers and institutions
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::model::Offer;
use crate::decimal::Money;
use crate::types::{ApplicationId, CalculationType, InstitutionId, OfferId, OfferStatus};

/// serializable view of an offer
#[derive(Debug, Serialize, Deserialize)]
pub struct OfferView {
    pub id: OfferId,
    pub application_id: ApplicationId,
    pub institution_id: InstitutionId,
    pub status: OfferStatus,
    pub expired: bool,
    pub figures: FiguresView,
    pub terms: TermsView,
    pub timeline: TimelineView,
    pub metadata: MetadataView,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FiguresView {
    pub principal: Money,
    /// percent units
    pub apr: Decimal,
    pub monthly_payment: Money,
    pub total_cost: Money,
    pub origination_fee: Money,
    pub insurance_cost: Option<Money>,
    pub total_repayment: Money,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TermsView {
    pub term_months: u32,
    pub processing_time_days: u32,
    pub validity_period_days: u32,
    pub required_documents: Vec<String>,
    pub submission_notes: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TimelineView {
    pub created_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub borrower_selected_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MetadataView {
    pub calculation_type: CalculationType,
    pub previous_offer_id: Option<OfferId>,
    pub version: u64,
}

impl OfferView {
    pub fn from_offer(offer: &Offer, now: DateTime<Utc>) -> Self {
        OfferView {
            id: offer.id,
            application_id: offer.application_id,
            institution_id: offer.institution_id,
            status: offer.status,
            expired: offer.status.is_expired() || (!offer.status.is_terminal() && offer.is_expired_at(now)),
            figures: FiguresView {
                principal: offer.principal,
                apr: offer.apr.as_percentage(),
                monthly_payment: offer.monthly_payment,
                total_cost: offer.total_cost,
                origination_fee: offer.origination_fee,
                insurance_cost: offer.insurance_cost,
                total_repayment: offer.monthly_payment * Decimal::from(offer.term_months),
            },
            terms: TermsView {
                term_months: offer.term_months,
                processing_time_days: offer.processing_time_days,
                validity_period_days: offer.validity_period_days,
                required_documents: offer.required_documents.clone(),
                submission_notes: offer.submission_notes.clone(),
            },
            timeline: TimelineView {
                created_at: offer.created_at,
                submitted_at: offer.submitted_at,
                borrower_selected_at: offer.borrower_selected_at,
                expires_at: offer.expires_at,
                updated_at: offer.updated_at,
            },
            metadata: MetadataView {
                calculation_type: offer.calculation_type,
                previous_offer_id: offer.previous_offer_id,
                version: offer.version,
            },
        }
    }

    /// convert to pretty-printed json string
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calculation::LoanQuote;
    use crate::decimal::Rate;
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    #[test]
    fn test_view_renders_wire_names_and_cents() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let quote = LoanQuote::compute(Money::from_major(10_000), 36, Rate::from_percentage(10), dec!(2), None)
            .unwrap();
        let mut offer = Offer::from_quote(Uuid::new_v4(), Uuid::new_v4(), &quote, CalculationType::Real, now);
        offer.expires_at = now + Duration::days(1);

        let view = OfferView::from_offer(&offer, now);
        assert!(!view.expired);
        assert_eq!(view.figures.total_repayment.to_string(), "11616.12");

        let json: serde_json::Value = serde_json::from_str(&view.to_json_pretty().unwrap()).unwrap();
        assert_eq!(json["status"], "CALCULATED");
        assert_eq!(json["figures"]["monthly_payment"], "322.67");
        assert_eq!(json["metadata"]["calculation_type"], "REAL");

        assert!(OfferView::from_offer(&offer, now + Duration::days(2)).expired);
    }
}
