/// expiration scheduler - warn institutions about offers that are about to lapse
use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use loan_offer_engine::telemetry;
use loan_offer_engine::{
    Application, Currency, EngineConfig, ExpirationWarningJob, InMemoryApplicationStore, InMemoryCalculationLogStore,
    InMemoryOfferStore, InMemoryRateCardStore, LoanType, LogNotifier, Money, OfferOverrides, OfferService, Rate,
    RateCardService, RateCardSpec, SafeTimeProvider, TimeSource, Uuid,
};
use rust_decimal_macros::dec;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = EngineConfig::from_env()?;
    telemetry::init(&config.telemetry)?;

    let time = SafeTimeProvider::new(TimeSource::Test(Utc.with_ymd_and_hms(2024, 7, 1, 8, 0, 0).unwrap()));
    let store = Arc::new(InMemoryOfferStore::new());
    let cards = Arc::new(InMemoryRateCardStore::new());
    let applications = Arc::new(InMemoryApplicationStore::new());
    let offers = OfferService::new(
        store.clone(),
        cards.clone(),
        applications.clone(),
        Arc::new(InMemoryCalculationLogStore::new()),
        config.policy.clone(),
    );

    let spec = RateCardSpec {
        loan_type: LoanType::Home,
        currency: Currency::Usd,
        min_loan_amount: Money::from_major(50_000),
        max_loan_amount: Money::from_major(900_000),
        base_apr: Rate::from_percent(dec!(6.25)),
        apr_adjustment_range: Rate::from_percentage(1),
        origination_fee_percent: dec!(0.75),
        insurance_percent: None,
        processing_time_days: 20,
    };

    // three banks submit one-day offers on three applications
    for _ in 0..3 {
        let bank = Uuid::new_v4();
        RateCardService::new(cards.clone()).create_rate_card(bank, &spec, &time)?;
        let application = applications.insert(Application::new(
            Uuid::new_v4(),
            LoanType::Home,
            Currency::Usd,
            Money::from_major(300_000),
            360,
            time.now(),
        ))?;
        offers.submit_offer(bank, application.id, Uuid::new_v4(), &OfferOverrides::default(), &time)?;
    }

    let job = ExpirationWarningJob::new(store, Arc::new(LogNotifier), config.scheduler.clone());

    // first run warns all three, the second finds nothing left to do
    let first = job.run_expiration_check(&time).await?;
    println!("first run:  {first:?}");
    time.test_control().unwrap().advance(Duration::hours(1));
    let second = job.run_expiration_check(&time).await?;
    println!("second run: {second:?}");
    println!("totals:     {:?}", job.metrics());

    Ok(())
}
