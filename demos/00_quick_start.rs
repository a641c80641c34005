/// quick start - price a loan and try the public scenario calculator
use std::sync::Arc;

use chrono::Utc;
use loan_offer_engine::{
    InMemoryRateCardStore, LoanQuote, Money, Rate, ScenarioCalculator, ScenarioConfig, ScenarioRequest,
};
use rust_decimal_macros::dec;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 10,000 over 36 months at 10% apr with a 2% origination fee
    let quote = LoanQuote::compute(Money::from_major(10_000), 36, Rate::from_percentage(10), dec!(2), None)?;
    println!("monthly payment: {}", quote.monthly_payment);
    println!("origination fee: {}", quote.origination_fee);
    println!("total cost:      {}", quote.total_cost);

    // what-if pricing with the default card
    let calculator = ScenarioCalculator::new(Arc::new(InMemoryRateCardStore::new()), ScenarioConfig::default());
    let request = ScenarioRequest {
        principal: Money::from_major(25_000),
        term_months: 60,
        institution_id: None,
    };
    let scenario = calculator.calculate_scenario(&request, "127.0.0.1", Utc::now()).await?;
    println!("\n{}", serde_json::to_string_pretty(&scenario)?);

    Ok(())
}
