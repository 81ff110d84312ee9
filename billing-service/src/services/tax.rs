//! Tax computation on invoice amounts.
//!
//! `tax = round(base * rate / 100)` to two decimal places, midpoints away from
//! zero; `total = base + tax` exactly.

use crate::services::store::BillingStore;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use service_core::error::AppError;
use tracing::warn;
use uuid::Uuid;

pub const MONEY_SCALE: u32 = 2;
/// Matches the `NUMERIC(5, 2)` rate columns.
pub const RATE_SCALE: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TaxCalculation {
    pub base_amount: Decimal,
    pub tax_rate: Decimal,
    pub tax_amount: Decimal,
    pub total_amount: Decimal,
}

/// Reject negative amounts and amounts finer than cents.
pub fn validate_amount(amount: Decimal, field: &str) -> Result<(), AppError> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "{} must not be negative",
            field
        )));
    }
    if amount.normalize().scale() > MONEY_SCALE {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "{} must have at most {} decimal places",
            field,
            MONEY_SCALE
        )));
    }
    Ok(())
}

/// Reject percentages outside `[0, 100]` or finer than hundredths.
pub fn validate_rate(rate: Decimal) -> Result<(), AppError> {
    if rate < Decimal::ZERO || rate > Decimal::ONE_HUNDRED {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "tax rate must be between 0 and 100"
        )));
    }
    if rate.normalize().scale() > RATE_SCALE {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "tax rate must have at most {} decimal places",
            RATE_SCALE
        )));
    }
    Ok(())
}

pub fn calculate_tax(base_amount: Decimal, rate: Decimal) -> Result<TaxCalculation, AppError> {
    validate_amount(base_amount, "base amount")?;
    validate_rate(rate)?;

    let tax_amount = (base_amount * rate / Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero);

    let mut base = base_amount;
    base.rescale(MONEY_SCALE);
    let mut tax = tax_amount;
    tax.rescale(MONEY_SCALE);

    Ok(TaxCalculation {
        base_amount: base,
        tax_rate: rate,
        tax_amount: tax,
        total_amount: base + tax,
    })
}

/// Calculate tax for an explicitly selected rate record.
///
/// No selection is an input error. A selection that does not resolve to a rate
/// falls back to zero tax.
pub async fn calculate_with_rate(
    store: &dyn BillingStore,
    base_amount: Decimal,
    tax_rate_id: Option<Uuid>,
) -> Result<(TaxCalculation, Option<Uuid>), AppError> {
    let tax_rate_id = tax_rate_id.ok_or_else(|| {
        AppError::BadRequest(anyhow::anyhow!("tax rate must be selected"))
    })?;

    match store.get_tax_rate(tax_rate_id).await? {
        Some(rate) => Ok((calculate_tax(base_amount, rate.rate)?, Some(rate.tax_rate_id))),
        None => {
            warn!(tax_rate_id = %tax_rate_id, "Tax rate not found, applying zero tax");
            Ok((calculate_tax(base_amount, Decimal::ZERO)?, None))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn sixteen_percent_of_5000() {
        let calc = calculate_tax(d("5000"), d("16")).unwrap();
        assert_eq!(calc.tax_amount, d("800"));
        assert_eq!(calc.total_amount, d("5800"));
        assert_eq!(calc.total_amount.to_string(), "5800.00");
    }

    #[test]
    fn midpoint_rounds_away_from_zero() {
        // 0.125 -> 0.13
        let calc = calculate_tax(d("1.25"), d("10")).unwrap();
        assert_eq!(calc.tax_amount, d("0.13"));
        assert_eq!(calc.total_amount, d("1.38"));
    }

    #[test]
    fn total_is_base_plus_rounded_tax() {
        let bases = ["0", "0.01", "19.99", "333.33", "1000000.05"];
        let rates = ["0", "7.5", "12.75", "16", "33.33", "100"];
        for b in bases {
            for r in rates {
                let calc = calculate_tax(d(b), d(r)).unwrap();
                assert_eq!(calc.total_amount, calc.base_amount + calc.tax_amount);
                let exact = d(b) * d(r) / Decimal::ONE_HUNDRED;
                assert!((calc.tax_amount - exact).abs() <= d("0.005"));
            }
        }
    }

    #[test]
    fn zero_rate_means_no_tax() {
        let calc = calculate_tax(d("250.50"), Decimal::ZERO).unwrap();
        assert_eq!(calc.tax_amount, Decimal::ZERO);
        assert_eq!(calc.total_amount, d("250.50"));
    }

    #[test]
    fn negative_base_is_rejected() {
        let err = calculate_tax(d("-1"), d("16")).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[test]
    fn sub_cent_base_is_rejected() {
        assert!(calculate_tax(d("10.001"), d("16")).is_err());
        assert!(calculate_tax(d("10.100"), d("16")).is_ok());
    }

    #[test]
    fn rate_finer_than_hundredths_is_rejected() {
        let err = validate_rate(d("12.345")).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
        assert!(validate_rate(d("12.340")).is_ok());
        assert!(calculate_tax(d("100"), d("7.125")).is_err());
    }

    #[test]
    fn rate_outside_percentage_range_is_rejected() {
        assert!(calculate_tax(d("100"), d("-0.01")).is_err());
        assert!(calculate_tax(d("100"), d("100.01")).is_err());
    }
}
