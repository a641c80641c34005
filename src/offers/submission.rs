use chrono::{DateTime, Duration, Utc};
use hourglass_rs::SafeTimeProvider;
use rust_decimal::Decimal;
use tracing::{debug, error, info, warn};

use super::applications::{Application, ApplicationRepository};
use super::calculation_log::CalculationLogRepository;
use super::model::{Offer, OfferOverrides};
use super::service::OfferService;
use super::store::OfferRepository;
use crate::calculation::{self, LoanQuote};
use crate::errors::{OfferError, RepositoryError, Result};
use crate::events::Event;
use crate::rate_cards::{RateCard, RateCardRepository};
use crate::types::{ApplicationId, ApplicationStatus, CalculationType, InstitutionId, OfferStatus, OfficerId};

impl<O, C, A, L> OfferService<O, C, A, L>
where
    O: OfferRepository,
    C: RateCardRepository,
    A: ApplicationRepository,
    L: CalculationLogRepository,
{
    /// quote every institution with a matching active rate card
    ///
    /// a failure for one institution is logged and the rest continue
    pub fn calculate_offers(&self, application_id: ApplicationId, time: &SafeTimeProvider) -> Result<Vec<Offer>> {
        let now = time.now();
        let application = self.load_application(application_id)?;
        application.validate_terms(&self.policy)?;

        let mut quoted = Vec::new();
        for institution_id in self.cards.active_institutions()? {
            match self.quote_institution(institution_id, &application, now) {
                Ok(Some(offer)) => quoted.push(offer),
                Ok(None) => {}
                Err(err) => {
                    error!(%institution_id, %application_id, error = %err, "offer calculation failed");
                }
            }
        }

        info!(%application_id, quoted = quoted.len(), "offers calculated");
        Ok(quoted)
    }

    /// submit an offer for (institution, application), at most once
    ///
    /// returns the offer and whether this call created or promoted it
    pub fn submit_offer(
        &self,
        institution_id: InstitutionId,
        application_id: ApplicationId,
        officer_id: OfficerId,
        overrides: &OfferOverrides,
        time: &SafeTimeProvider,
    ) -> Result<(Offer, bool)> {
        let now = time.now();
        let application = self.load_application(application_id)?;
        application.validate_terms(&self.policy)?;
        if application.status > ApplicationStatus::OffersAvailable {
            return Err(OfferError::InvalidState {
                current: format!("{:?}", application.status),
                expected: "an application still open for offers".to_string(),
            });
        }
        self.validate_overrides(overrides, now)?;

        let (offer, created) = match self.offers.find_active(institution_id, application_id)? {
            Some(existing) => self.resolve_existing(existing, officer_id, overrides, now)?,
            None => self.submit_new(institution_id, &application, officer_id, overrides, now)?,
        };
        if created {
            self.mark_offers_available(application, now);
        }
        Ok((offer, created))
    }

    fn submit_new(
        &self,
        institution_id: InstitutionId,
        application: &Application,
        officer_id: OfficerId,
        overrides: &OfferOverrides,
        now: DateTime<Utc>,
    ) -> Result<(Offer, bool)> {
        let application_id = application.id;

        let card = self
            .cards
            .find_active(institution_id, application.loan_type, application.currency)?
            .ok_or(OfferError::NoActiveRateCard {
                institution_id,
                loan_type: application.loan_type,
                currency: application.currency,
            })?;
        if !card.covers(application.principal) {
            return Err(OfferError::validation(
                "principal",
                format!(
                    "{} outside rate card range {}-{}",
                    application.principal, card.min_loan_amount, card.max_loan_amount
                ),
            ));
        }

        let quote = LoanQuote::compute(
            application.principal,
            application.term_months,
            overrides.apr.unwrap_or_else(|| card.apr_for_term(application.term_months)),
            overrides.origination_fee_percent.unwrap_or(card.origination_fee_percent),
            overrides.insurance_percent.or(card.insurance_percent),
        )?;
        let calculation_type = if overrides.changes_pricing() {
            CalculationType::Override
        } else {
            CalculationType::Real
        };

        let mut offer = Offer::from_quote(application_id, institution_id, &quote, calculation_type, now);
        offer.rate_card_id = Some(card.id);
        self.apply_submission(&mut offer, officer_id, overrides, card.processing_time_days, now);
        offer.transition(OfferStatus::Submitted, now)?;

        match self.offers.insert(offer) {
            Ok(stored) => {
                self.record_calculation(&stored, now);
                self.emit_submitted(&stored, overrides.changes_pricing(), now);
                info!(
                    offer_id = %stored.id,
                    %institution_id,
                    %application_id,
                    apr = %stored.apr,
                    monthly_payment = %stored.monthly_payment,
                    "offer submitted"
                );
                Ok((stored, true))
            }
            Err(RepositoryError::DuplicateActive { existing, .. }) => {
                debug!(%institution_id, %application_id, offer_id = %existing, "concurrent submission, using stored offer");
                let existing = self.load_offer(existing)?;
                self.resolve_existing(existing, officer_id, overrides, now)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// the borrower can now see offers, so the application leaves the declinable range
    fn mark_offers_available(&self, mut application: Application, now: DateTime<Utc>) {
        if application.status >= ApplicationStatus::OffersAvailable {
            return;
        }
        application.status = ApplicationStatus::OffersAvailable;
        application.updated_at = now;
        if let Err(err) = self.applications.update(application) {
            warn!(error = %err, "could not mark application as having offers");
        }
    }

    fn quote_institution(
        &self,
        institution_id: InstitutionId,
        application: &Application,
        now: DateTime<Utc>,
    ) -> Result<Option<Offer>> {
        let Some(card) = self
            .cards
            .find_active(institution_id, application.loan_type, application.currency)?
        else {
            warn!(
                %institution_id,
                loan_type = %application.loan_type,
                currency = %application.currency,
                "no active rate card, skipping institution"
            );
            return Ok(None);
        };
        if !card.covers(application.principal) {
            debug!(%institution_id, principal = %application.principal, "principal outside rate card range");
            return Ok(None);
        }
        if self.offers.find_active(institution_id, application.id)?.is_some() {
            debug!(%institution_id, application_id = %application.id, "institution already holds an offer");
            return Ok(None);
        }

        let offer = self.quote_from_card(&card, application, now)?;
        match self.offers.insert(offer) {
            Ok(stored) => {
                self.record_calculation(&stored, now);
                self.emit(Event::OfferCalculated {
                    offer_id: stored.id,
                    application_id: stored.application_id,
                    institution_id,
                    apr: stored.apr,
                    monthly_payment: stored.monthly_payment,
                    calculation_type: stored.calculation_type,
                    timestamp: now,
                });
                Ok(Some(stored))
            }
            Err(RepositoryError::DuplicateActive { .. }) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn quote_from_card(&self, card: &RateCard, application: &Application, now: DateTime<Utc>) -> Result<Offer> {
        let quote = LoanQuote::compute(
            application.principal,
            application.term_months,
            card.apr_for_term(application.term_months),
            card.origination_fee_percent,
            card.insurance_percent,
        )?;

        let hours = self.policy.quote_validity_hours;
        let mut offer = Offer::from_quote(application.id, card.institution_id, &quote, CalculationType::Mock, now);
        offer.rate_card_id = Some(card.id);
        offer.processing_time_days = card.processing_time_days;
        offer.validity_period_days = (hours / 24).max(1) as u32;
        offer.expires_at = now + Duration::hours(hours);
        offer.required_documents = self.policy.quote_required_documents.clone();
        Ok(offer)
    }

    fn resolve_existing(
        &self,
        existing: Offer,
        officer_id: OfficerId,
        overrides: &OfferOverrides,
        now: DateTime<Utc>,
    ) -> Result<(Offer, bool)> {
        let existing = self.ensure_live(existing, now)?;

        match existing.status {
            OfferStatus::Submitted => Ok((existing, false)),
            OfferStatus::Calculated => match self.promote(existing.clone(), officer_id, overrides, now) {
                Ok(promoted) => Ok((promoted, true)),
                Err(OfferError::VersionConflict { .. }) => {
                    let latest = self.load_offer(existing.id)?;
                    if latest.status == OfferStatus::Submitted {
                        debug!(offer_id = %latest.id, "lost promotion race, returning submitted offer");
                        Ok((latest, false))
                    } else {
                        Err(OfferError::VersionConflict {
                            id: existing.id,
                            expected: existing.version,
                            found: latest.version,
                        })
                    }
                }
                Err(err) => Err(err),
            },
            other => Err(OfferError::InvalidState {
                current: other.to_string(),
                expected: "CALCULATED or SUBMITTED".to_string(),
            }),
        }
    }

    /// turn a calculated quote into a submitted offer
    fn promote(
        &self,
        mut offer: Offer,
        officer_id: OfficerId,
        overrides: &OfferOverrides,
        now: DateTime<Utc>,
    ) -> Result<Offer> {
        if overrides.changes_pricing() {
            let apr = overrides.apr.unwrap_or(offer.apr);
            let monthly_payment = calculation::monthly_payment(offer.principal, offer.term_months, apr)?;
            let quote = LoanQuote {
                principal: offer.principal,
                term_months: offer.term_months,
                apr,
                monthly_payment,
                origination_fee: overrides
                    .origination_fee_percent
                    .map(|pct| calculation::origination_fee(offer.principal, pct))
                    .unwrap_or(offer.origination_fee),
                insurance_cost: overrides
                    .insurance_percent
                    .map(|pct| calculation::insurance_cost(offer.principal, offer.term_months, Some(pct)))
                    .or(offer.insurance_cost),
                total_cost: calculation::total_cost(monthly_payment, offer.term_months, offer.principal),
            };
            offer.apply_quote(&quote);
            offer.calculation_type = CalculationType::Override;
        } else if offer.calculation_type == CalculationType::Mock {
            offer.calculation_type = CalculationType::Real;
        }

        let processing_days = offer.processing_time_days;
        self.apply_submission(&mut offer, officer_id, overrides, processing_days, now);
        offer.transition(OfferStatus::Submitted, now)?;

        let stored = self.offers.update(offer)?;
        self.record_calculation(&stored, now);
        self.emit_submitted(&stored, overrides.changes_pricing(), now);
        info!(offer_id = %stored.id, apr = %stored.apr, "calculated offer submitted");
        Ok(stored)
    }

    fn apply_submission(
        &self,
        offer: &mut Offer,
        officer_id: OfficerId,
        overrides: &OfferOverrides,
        processing_days: u32,
        now: DateTime<Utc>,
    ) {
        let validity_days = overrides
            .validity_period_days
            .unwrap_or(self.policy.default_validity_days);

        offer.processing_time_days = overrides.processing_time_days.unwrap_or(processing_days);
        offer.validity_period_days = validity_days;
        offer.expires_at = overrides
            .expires_at
            .unwrap_or_else(|| now + Duration::days(validity_days as i64));
        offer.required_documents = overrides
            .required_documents
            .clone()
            .unwrap_or_else(|| self.policy.default_required_documents.clone());
        offer.submitted_at = Some(now);
        offer.submitted_by_officer_id = Some(officer_id);
        offer.submission_notes = overrides.notes.clone();
        offer.updated_at = now;
    }

    fn emit_submitted(&self, offer: &Offer, overridden: bool, now: DateTime<Utc>) {
        if let Some(officer_id) = offer.submitted_by_officer_id {
            self.emit(Event::OfferSubmitted {
                offer_id: offer.id,
                application_id: offer.application_id,
                institution_id: offer.institution_id,
                officer_id,
                apr: offer.apr,
                overridden,
                expires_at: offer.expires_at,
                timestamp: now,
            });
        }
    }

    /// reject overrides outside the policy ranges before anything is written
    fn validate_overrides(&self, overrides: &OfferOverrides, now: DateTime<Utc>) -> Result<()> {
        let policy = &self.policy;

        if let Some(apr) = overrides.apr {
            let value = apr.as_percentage();
            if !policy.submission_apr.contains(value) {
                return Err(OfferError::InvalidOverride {
                    field: "apr",
                    value,
                    min: policy.submission_apr.min,
                    max: policy.submission_apr.max,
                });
            }
        }
        if let Some(value) = overrides.origination_fee_percent {
            if !policy.origination_fee_percent.contains(value) {
                return Err(OfferError::InvalidOverride {
                    field: "origination_fee_percent",
                    value,
                    min: policy.origination_fee_percent.min,
                    max: policy.origination_fee_percent.max,
                });
            }
        }
        if let Some(value) = overrides.insurance_percent {
            if !policy.insurance_percent.contains(value) {
                return Err(OfferError::InvalidOverride {
                    field: "insurance_percent",
                    value,
                    min: policy.insurance_percent.min,
                    max: policy.insurance_percent.max,
                });
            }
        }
        if let Some(days) = overrides.processing_time_days {
            if !policy.processing_time_days.contains(days) {
                return Err(OfferError::InvalidOverride {
                    field: "processing_time_days",
                    value: Decimal::from(days),
                    min: Decimal::from(policy.processing_time_days.min),
                    max: Decimal::from(policy.processing_time_days.max),
                });
            }
        }
        if let Some(days) = overrides.validity_period_days {
            if !policy.validity_period_days.contains(days) {
                return Err(OfferError::InvalidOverride {
                    field: "validity_period_days",
                    value: Decimal::from(days),
                    min: Decimal::from(policy.validity_period_days.min),
                    max: Decimal::from(policy.validity_period_days.max),
                });
            }
        }
        if let Some(expires_at) = overrides.expires_at {
            if expires_at <= now {
                return Err(OfferError::validation(
                    "expires_at",
                    format!("expiry {expires_at} is not in the future"),
                ));
            }
        }
        if matches!(&overrides.required_documents, Some(docs) if docs.is_empty()) {
            return Err(OfferError::validation(
                "required_documents",
                "at least one document must be listed",
            ));
        }
        Ok(())
    }
}
