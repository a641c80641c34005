pub mod calculation;
pub mod config;
pub mod decimal;
pub mod errors;
pub mod events;
pub mod notifications;
pub mod offers;
pub mod rate_cards;
pub mod scheduler;
pub mod telemetry;
pub mod types;

// re-export key types
pub use calculation::{LoanQuote, RateLimiter, ScenarioCalculator, ScenarioQuote, ScenarioRequest};
pub use config::{ConfigError, EngineConfig, OfferPolicy, ScenarioConfig, SchedulerConfig, TelemetryConfig};
pub use decimal::{Money, Rate};
pub use errors::{ErrorKind, OfferError, RepositoryError, Result};
pub use events::{Event, EventStore};
pub use notifications::{BorrowerNotifier, ExpirationNotifier, LogNotifier, NotificationError};
pub use offers::{
    AcceptanceResult, Application, ApplicationRepository, CalculationLog, CalculationLogRepository,
    DeclineResult, ExpirySweep, InMemoryApplicationStore, InMemoryCalculationLogStore, InMemoryOfferStore,
    Offer, OfferOverrides, OfferRepository, OfferService, OfferView, PendingLog, ResubmitTerms,
};
pub use rate_cards::{InMemoryRateCardStore, RateCard, RateCardRepository, RateCardService, RateCardSpec};
pub use scheduler::{ExpirationRunReport, ExpirationWarningJob, MetricsSnapshot};
pub use types::{
    ApplicationId, ApplicationStatus, BorrowerId, CalculationType, Currency, InstitutionId, LoanType, OfferId,
    OfferStatus, OfficerId, RateCardId,
};

// re-export external dependencies that users will need
pub use chrono;
pub use hourglass_rs::{SafeTimeProvider, TimeSource};
pub use rust_decimal::Decimal;
pub use uuid::Uuid;
