/// offer lifecycle - quote, submit, select, accept and resubmit with controlled time
use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use loan_offer_engine::{
    Application, Currency, InMemoryApplicationStore, InMemoryCalculationLogStore, InMemoryOfferStore,
    InMemoryRateCardStore, LoanType, Money, OfferOverrides, OfferPolicy, OfferService, OfferView, Rate,
    RateCardService, RateCardSpec, ResubmitTerms, SafeTimeProvider, TimeSource, Uuid,
};
use rust_decimal_macros::dec;

fn card(base_apr: u32) -> RateCardSpec {
    RateCardSpec {
        loan_type: LoanType::Personal,
        currency: Currency::Eur,
        min_loan_amount: Money::from_major(1_000),
        max_loan_amount: Money::from_major(75_000),
        base_apr: Rate::from_percentage(base_apr),
        apr_adjustment_range: Rate::from_percentage(2),
        origination_fee_percent: dec!(1.5),
        insurance_percent: Some(dec!(0.4)),
        processing_time_days: 5,
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== offer lifecycle example ===\n");

    let time = SafeTimeProvider::new(TimeSource::Test(Utc.with_ymd_and_hms(2024, 4, 1, 9, 0, 0).unwrap()));
    let controller = time.test_control().unwrap();

    let cards = Arc::new(InMemoryRateCardStore::new());
    let applications = Arc::new(InMemoryApplicationStore::new());
    let rate_cards = RateCardService::new(cards.clone());
    let offers = OfferService::new(
        Arc::new(InMemoryOfferStore::new()),
        cards,
        applications.clone(),
        Arc::new(InMemoryCalculationLogStore::new()),
        OfferPolicy::default(),
    );

    // two banks publish pricing
    let (bank_a, bank_b) = (Uuid::new_v4(), Uuid::new_v4());
    rate_cards.create_rate_card(bank_a, &card(9), &time)?;
    rate_cards.create_rate_card(bank_b, &card(11), &time)?;

    // borrower applies
    let application = applications.insert(Application::new(
        Uuid::new_v4(),
        LoanType::Personal,
        Currency::Eur,
        Money::from_major(15_000),
        48,
        time.now(),
    ))?;

    let quotes = offers.calculate_offers(application.id, &time)?;
    println!("system quotes: {}", quotes.len());

    // bank a confirms its quote, bank b undercuts
    let officer = Uuid::new_v4();
    let (offer_a, created) = offers.submit_offer(bank_a, application.id, officer, &OfferOverrides::default(), &time)?;
    println!("bank a submitted (created: {created}) at {}", offer_a.apr);
    let overrides = OfferOverrides {
        apr: Some(Rate::from_percent(dec!(8.75))),
        validity_period_days: Some(3),
        ..Default::default()
    };
    let (offer_b, _) = offers.submit_offer(bank_b, application.id, officer, &overrides, &time)?;
    println!("bank b submitted at {}", offer_b.apr);

    // a repeat is idempotent
    let (again, created) = offers.submit_offer(bank_a, application.id, officer, &OfferOverrides::default(), &time)?;
    println!("repeat submission returns {} (created: {created})", again.id == offer_a.id);

    // bank a's offer lapses after one day, then gets resubmitted
    controller.advance(Duration::days(2));
    let renewed = offers.resubmit_offer(offer_a.id, bank_a, &ResubmitTerms::at_apr(Rate::from_percentage(8)), &time)?;
    println!("\nbank a resubmitted as {} (previous {})", renewed.id, offer_a.id);

    // borrower picks the cheapest live offer
    let ranked = offers.get_offers_for_application(application.id, &time)?;
    for offer in &ranked {
        println!("  {} {} {}", offer.institution_id, offer.status, offer.apr);
    }
    offers.select_offer(application.id, application.borrower_id, offer_b.id, &time)?;
    let accepted = offers.accept_offer(application.id, application.borrower_id, offer_b.id, &time)?;
    println!("\naccepted offer, {} siblings rejected", accepted.rejected.len());

    println!("\n{}", OfferView::from_offer(&accepted.accepted, time.now()).to_json_pretty()?);
    println!("\nevents recorded: {}", offers.take_events().len());

    Ok(())
}
