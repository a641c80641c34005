pub mod engine;
pub mod rate_limiter;
pub mod scenario;

pub use engine::{insurance_cost, monthly_payment, origination_fee, total_cost, LoanQuote};
pub use rate_limiter::RateLimiter;
pub use scenario::{ScenarioCalculator, ScenarioQuote, ScenarioRequest};
