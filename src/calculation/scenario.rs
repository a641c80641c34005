use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::engine::LoanQuote;
use super::rate_limiter::RateLimiter;
use crate::config::ScenarioConfig;
use crate::decimal::{Money, Rate};
use crate::errors::{OfferError, Result};
use crate::rate_cards::RateCardRepository;
use crate::types::InstitutionId;

/// what-if pricing request from an unauthenticated caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioRequest {
    pub principal: Money,
    pub term_months: u32,
    pub institution_id: Option<InstitutionId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioQuote {
    pub apr: Rate,
    pub monthly_payment: Money,
    pub total_cost: Money,
    pub origination_fee: Money,
    pub insurance_cost: Money,
    /// institution whose card priced the scenario, none for the default card
    pub institution_id: Option<InstitutionId>,
    pub calculated_at: DateTime<Utc>,
}

/// public calculator, rate limited per caller
pub struct ScenarioCalculator<C> {
    cards: Arc<C>,
    config: ScenarioConfig,
    limiter: RateLimiter,
}

impl<C: RateCardRepository> ScenarioCalculator<C> {
    pub fn new(cards: Arc<C>, config: ScenarioConfig) -> Self {
        let limiter = RateLimiter::new(config.calls_per_minute).with_max_tracked(config.max_tracked_callers);
        Self { cards, config, limiter }
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub async fn calculate_scenario(
        &self,
        request: &ScenarioRequest,
        caller: &str,
        now: DateTime<Utc>,
    ) -> Result<ScenarioQuote> {
        if let Err(retry_after_secs) = self.limiter.check(caller, now).await {
            warn!(caller, retry_after_secs, "scenario rate limit exceeded");
            return Err(OfferError::RateLimited {
                caller: caller.to_string(),
                retry_after_secs,
            });
        }
        self.validate(request)?;

        let quote = match request.institution_id {
            Some(institution_id) => {
                let card = self
                    .cards
                    .list_active(institution_id)?
                    .into_iter()
                    .next()
                    .ok_or(OfferError::NotFound {
                        entity: "rate card",
                        id: institution_id,
                    })?;
                LoanQuote::compute(
                    request.principal,
                    request.term_months,
                    card.apr_for_term(request.term_months),
                    card.origination_fee_percent,
                    card.insurance_percent,
                )?
            }
            None => LoanQuote::compute(
                request.principal,
                request.term_months,
                Rate::from_percent(self.config.default_apr),
                self.config.default_origination_fee_percent,
                Some(self.config.default_insurance_percent),
            )?,
        };

        debug!(
            caller,
            principal = %request.principal,
            term_months = request.term_months,
            monthly_payment = %quote.monthly_payment,
            "scenario calculated"
        );
        Ok(ScenarioQuote {
            apr: quote.apr,
            monthly_payment: quote.monthly_payment,
            total_cost: quote.total_cost,
            origination_fee: quote.origination_fee,
            insurance_cost: quote.insurance_cost.unwrap_or(Money::ZERO),
            institution_id: request.institution_id,
            calculated_at: now,
        })
    }

    fn validate(&self, request: &ScenarioRequest) -> Result<()> {
        let principal = self.config.principal;
        if !principal.contains(request.principal) {
            return Err(OfferError::validation(
                "principal",
                format!("loan amount must be between {} and {}", principal.min, principal.max),
            ));
        }
        let term = self.config.term_months;
        if !term.contains(request.term_months) {
            return Err(OfferError::validation(
                "term_months",
                format!("term must be between {} and {} months", term.min, term.max),
            ));
        }
        Ok(())
    }
}
