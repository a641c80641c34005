use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::decimal::{round_half_up, Money, Rate, MONEY_SCALE, RATE_SCALE};
use crate::errors::{OfferError, Result};

/// priced loan terms derived from principal, term and rate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanQuote {
    pub principal: Money,
    pub term_months: u32,
    pub apr: Rate,
    pub monthly_payment: Money,
    pub origination_fee: Money,
    pub insurance_cost: Option<Money>,
    pub total_cost: Money,
}

impl LoanQuote {
    /// price a loan with the four engine functions
    pub fn compute(
        principal: Money,
        term_months: u32,
        apr: Rate,
        origination_fee_percent: Decimal,
        insurance_percent: Option<Decimal>,
    ) -> Result<Self> {
        if !principal.is_positive() {
            return Err(OfferError::CalculationError {
                message: format!("principal must be positive, got {principal}"),
            });
        }
        if origination_fee_percent < Decimal::ZERO {
            return Err(OfferError::CalculationError {
                message: format!("negative origination fee percent {origination_fee_percent}"),
            });
        }

        let monthly_payment = monthly_payment(principal, term_months, apr)?;
        let insurance_cost = match insurance_percent {
            Some(pct) if pct < Decimal::ZERO => {
                return Err(OfferError::CalculationError {
                    message: format!("negative insurance percent {pct}"),
                })
            }
            Some(pct) => Some(insurance_cost(principal, term_months, Some(pct))),
            None => None,
        };

        Ok(Self {
            principal,
            term_months,
            apr,
            monthly_payment,
            origination_fee: origination_fee(principal, origination_fee_percent),
            insurance_cost,
            total_cost: total_cost(monthly_payment, term_months, principal),
        })
    }

    /// everything the borrower pays over the life of the loan
    pub fn total_repayment(&self) -> Money {
        self.monthly_payment * Decimal::from(self.term_months)
    }
}

/// level monthly payment for an amortizing loan
///
/// zero rate falls back to straight-line principal / months
pub fn monthly_payment(principal: Money, term_months: u32, apr: Rate) -> Result<Money> {
    if term_months == 0 {
        return Err(OfferError::CalculationError {
            message: "term must be at least one month".to_string(),
        });
    }
    if apr.is_negative() {
        return Err(OfferError::CalculationError {
            message: format!("negative apr {apr}"),
        });
    }

    let months = Decimal::from(term_months);
    let r = apr.monthly_rate();

    if r.is_zero() {
        return Ok(Money::from_decimal(principal.as_decimal() / months));
    }

    // P * r * (1 + r)^n / ((1 + r)^n - 1)
    let base = Decimal::ONE + r;
    let mut compound = Decimal::ONE;
    for _ in 0..term_months {
        compound = compound.checked_mul(base).ok_or_else(|| OfferError::CalculationError {
            message: format!("compound factor overflow at {term_months} months"),
        })?;
    }

    let numerator = principal
        .as_decimal()
        .checked_mul(r)
        .and_then(|v| v.checked_mul(compound))
        .ok_or_else(|| OfferError::CalculationError {
            message: "payment numerator overflow".to_string(),
        })?;
    let denominator = compound - Decimal::ONE;
    if denominator.is_zero() {
        return Err(OfferError::CalculationError {
            message: format!("rate {apr} too small to amortize"),
        });
    }

    Ok(Money::from_decimal(numerator / denominator))
}

/// principal * percent / 100
pub fn origination_fee(principal: Money, fee_percent: Decimal) -> Money {
    principal.percentage(fee_percent)
}

/// principal * percent / 100 * (months / 12), zero without a percent
pub fn insurance_cost(principal: Money, term_months: u32, insurance_percent: Option<Decimal>) -> Money {
    let Some(pct) = insurance_percent else {
        return Money::ZERO;
    };

    let annual = round_half_up(principal.as_decimal() * pct / Decimal::ONE_HUNDRED, RATE_SCALE);
    let years = round_half_up(Decimal::from(term_months) / Decimal::from(12), RATE_SCALE);
    Money::from_decimal(round_half_up(annual * years, MONEY_SCALE))
}

/// monthly payment * months - principal
pub fn total_cost(monthly_payment: Money, term_months: u32, principal: Money) -> Money {
    monthly_payment * Decimal::from(term_months) - principal
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_reference_scenario() {
        let principal = Money::from_major(10_000);
        let payment = monthly_payment(principal, 36, Rate::from_percentage(10)).unwrap();
        assert_eq!(payment.to_string(), "322.67");

        let fee = origination_fee(principal, dec!(2));
        assert_eq!(fee.to_string(), "200.00");

        let cost = total_cost(payment, 36, principal);
        assert_eq!(cost.to_string(), "1616.12");
    }

    #[test]
    fn test_zero_rate_is_straight_line() {
        let principal = Money::from_major(12_000);
        let payment = monthly_payment(principal, 24, Rate::ZERO).unwrap();
        assert_eq!(payment, Money::from_major(500));

        let uneven = monthly_payment(Money::from_major(1_000), 3, Rate::ZERO).unwrap();
        assert_eq!(uneven.to_string(), "333.33");
    }

    #[test]
    fn test_repayment_never_below_principal() {
        let principals = [1_000, 9_999, 250_000, 5_000_000];
        let terms = [6, 12, 36, 120, 360, 480];
        let aprs = [dec!(0), dec!(0.5), dec!(4), dec!(12.75), dec!(50)];

        for p in principals {
            for n in terms {
                for apr in aprs {
                    let principal = Money::from_major(p);
                    let payment = monthly_payment(principal, n, Rate::from_percent(apr)).unwrap();
                    let repaid = payment * Decimal::from(n);
                    // straight-line rounding may shave at most a cent per period
                    let tolerance = Money::CENT * Decimal::from(n);
                    assert!(
                        repaid + tolerance >= principal,
                        "p={p} n={n} apr={apr}: {repaid} < {principal}"
                    );
                    if !apr.is_zero() {
                        assert!(repaid > principal);
                    }
                }
            }
        }
    }

    #[test]
    fn test_calculations_are_deterministic() {
        let principal = Money::from_str_exact("25432.17").unwrap();
        let apr = Rate::from_percent(dec!(7.35));
        let first = LoanQuote::compute(principal, 84, apr, dec!(1.5), Some(dec!(0.5))).unwrap();
        let second = LoanQuote::compute(principal, 84, apr, dec!(1.5), Some(dec!(0.5))).unwrap();
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[test]
    fn test_insurance_cost() {
        let principal = Money::from_major(10_000);
        assert_eq!(insurance_cost(principal, 36, Some(dec!(0.5))).to_string(), "150.00");
        assert_eq!(insurance_cost(principal, 18, Some(dec!(0.5))).to_string(), "75.00");
        assert_eq!(insurance_cost(principal, 36, None), Money::ZERO);
    }

    #[test]
    fn test_quote_without_insurance() {
        let quote = LoanQuote::compute(Money::from_major(10_000), 36, Rate::from_percentage(10), dec!(2), None)
            .unwrap();
        assert_eq!(quote.insurance_cost, None);
        assert_eq!(quote.origination_fee, Money::from_major(200));
        assert_eq!(quote.total_repayment(), quote.principal + quote.total_cost);
    }

    #[test]
    fn test_invalid_inputs_are_calculation_errors() {
        let principal = Money::from_major(1_000);
        assert!(matches!(
            monthly_payment(principal, 0, Rate::from_percentage(5)),
            Err(OfferError::CalculationError { .. })
        ));
        assert!(matches!(
            monthly_payment(principal, 12, Rate::from_percent(dec!(-1))),
            Err(OfferError::CalculationError { .. })
        ));
        assert!(LoanQuote::compute(Money::ZERO, 12, Rate::ZERO, dec!(1), None).is_err());
    }
}
