pub mod model;
pub mod service;
pub mod store;

pub use model::{RateCard, RateCardKey, RateCardSpec, LONG_TERM_MONTHS};
pub use service::RateCardService;
pub use store::{InMemoryRateCardStore, RateCardRepository};
