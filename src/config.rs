use std::env;
use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::decimal::Money;

/// inclusive range used for policy checks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bounds<T> {
    pub min: T,
    pub max: T,
}

impl<T: PartialOrd + Copy> Bounds<T> {
    pub fn new(min: T, max: T) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: T) -> bool {
        value >= self.min && value <= self.max
    }
}

/// engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    pub policy: OfferPolicy,
    pub scheduler: SchedulerConfig,
    pub scenario: ScenarioConfig,
    pub telemetry: TelemetryConfig,
}

/// limits and defaults applied to offers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfferPolicy {
    /// apr accepted on institution submissions, percent units
    pub submission_apr: Bounds<Decimal>,
    /// apr accepted on resubmissions, percent units
    pub resubmission_apr: Bounds<Decimal>,
    pub origination_fee_percent: Bounds<Decimal>,
    pub insurance_percent: Bounds<Decimal>,
    pub processing_time_days: Bounds<u32>,
    pub validity_period_days: Bounds<u32>,
    pub term_months: Bounds<u32>,
    /// validity of a submitted offer when the institution sets none
    pub default_validity_days: u32,
    /// validity of a system quote
    pub quote_validity_hours: i64,
    pub default_required_documents: Vec<String>,
    pub quote_required_documents: Vec<String>,
    pub decline_reason_max_chars: usize,
    /// attempts at writing a calculation log before it is deferred
    pub log_write_attempts: u32,
}

impl Default for OfferPolicy {
    fn default() -> Self {
        Self {
            submission_apr: Bounds::new(dec!(4.0), dec!(20.0)),
            resubmission_apr: Bounds::new(dec!(0.5), dec!(50.0)),
            origination_fee_percent: Bounds::new(dec!(0), dec!(10)),
            insurance_percent: Bounds::new(dec!(0), dec!(5)),
            processing_time_days: Bounds::new(1, 90),
            validity_period_days: Bounds::new(1, 90),
            term_months: Bounds::new(6, 480),
            default_validity_days: 1,
            quote_validity_hours: 24,
            default_required_documents: ["paystubs", "tax_returns", "bank_statements", "government_id"]
                .iter()
                .map(|d| d.to_string())
                .collect(),
            quote_required_documents: vec!["Standard documents required".to_string()],
            decline_reason_max_chars: 500,
            log_write_attempts: 3,
        }
    }
}

/// expiration warning job settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub interval: Duration,
    pub lookahead_hours: i64,
    /// upper bound on one notification attempt
    pub notification_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3_600),
            lookahead_hours: 24,
            notification_timeout: Duration::from_secs(10),
        }
    }
}

/// public scenario calculator settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioConfig {
    pub calls_per_minute: u32,
    /// caller buckets kept before idle ones are swept
    pub max_tracked_callers: usize,
    pub principal: Bounds<Money>,
    pub term_months: Bounds<u32>,
    /// pricing used when no institution is named, percent units
    pub default_apr: Decimal,
    pub default_origination_fee_percent: Decimal,
    pub default_insurance_percent: Decimal,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            calls_per_minute: 100,
            max_tracked_callers: 10_000,
            principal: Bounds::new(Money::from_major(1_000), Money::from_major(5_000_000)),
            term_months: Bounds::new(6, 480),
            default_apr: dec!(8.5),
            default_origination_fee_percent: dec!(1.5),
            default_insurance_percent: dec!(0.5),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("invalid value for {name}: '{value}'")]
    InvalidValue { name: &'static str, value: String },

    #[error("invalid range for {name}: min {min} exceeds max {max}")]
    InvalidRange {
        name: &'static str,
        min: String,
        max: String,
    },
}

impl EngineConfig {
    /// defaults overridden by `.env` and process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let mut config = EngineConfig::default();

        let policy = &mut config.policy;
        policy.submission_apr.min = var_or("OFFER_MIN_APR", policy.submission_apr.min)?;
        policy.submission_apr.max = var_or("OFFER_MAX_APR", policy.submission_apr.max)?;
        policy.default_validity_days = var_or("OFFER_DEFAULT_VALIDITY_DAYS", policy.default_validity_days)?;
        policy.quote_validity_hours = var_or("OFFER_QUOTE_VALIDITY_HOURS", policy.quote_validity_hours)?;
        policy.log_write_attempts = var_or("OFFER_LOG_WRITE_ATTEMPTS", policy.log_write_attempts)?;
        check_range("OFFER_MIN_APR/OFFER_MAX_APR", policy.submission_apr)?;

        let scheduler = &mut config.scheduler;
        scheduler.interval = Duration::from_secs(var_or(
            "EXPIRATION_CHECK_INTERVAL_SECS",
            scheduler.interval.as_secs(),
        )?);
        scheduler.lookahead_hours = var_or("EXPIRATION_LOOKAHEAD_HOURS", scheduler.lookahead_hours)?;
        scheduler.notification_timeout = Duration::from_millis(var_or(
            "EXPIRATION_NOTIFICATION_TIMEOUT_MS",
            scheduler.notification_timeout.as_millis() as u64,
        )?);

        let scenario = &mut config.scenario;
        scenario.calls_per_minute = var_or("SCENARIO_CALLS_PER_MINUTE", scenario.calls_per_minute)?;
        scenario.max_tracked_callers = var_or("SCENARIO_MAX_TRACKED_CALLERS", scenario.max_tracked_callers)?;
        scenario.default_apr = var_or("SCENARIO_DEFAULT_APR", scenario.default_apr)?;

        config.telemetry.log_level = env::var("LOG_LEVEL").unwrap_or(config.telemetry.log_level);

        Ok(config)
    }
}

fn var_or<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { name, value }),
        Err(_) => Ok(default),
    }
}

fn check_range<T: PartialOrd + Copy + ToString>(name: &'static str, bounds: Bounds<T>) -> Result<(), ConfigError> {
    if bounds.min > bounds.max {
        return Err(ConfigError::InvalidRange {
            name,
            min: bounds.min.to_string(),
            max: bounds.max.to_string(),
        });
    }
    Ok(())
}
