pub mod applications;
pub mod calculation_log;
pub mod lifecycle;
pub mod model;
pub mod serialization;
pub mod service;
pub mod store;
pub mod submission;

pub use applications::{Application, ApplicationRepository, InMemoryApplicationStore};
pub use calculation_log::{
    CalculationLog, CalculationLogRepository, InMemoryCalculationLogStore, CALCULATION_METHOD,
};
pub use lifecycle::{AcceptanceResult, DeclineResult, ExpirySweep};
pub use model::{Offer, OfferOverrides, ResubmitTerms};
pub use serialization::OfferView;
pub use service::{OfferService, PendingLog};
pub use store::{InMemoryOfferStore, OfferRepository};
