use chrono::{Datelike, NaiveDate};
use rust_decimal::{Decimal, RoundingStrategy};

use crate::error::BillingError;

/// Round a currency amount to 2 decimal places, halves away from zero.
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// `a * b`, failing instead of overflowing on out-of-range input.
pub fn checked_product(a: Decimal, b: Decimal) -> Result<Decimal, BillingError> {
    a.checked_mul(b)
        .ok_or_else(|| BillingError::Validation(format!("amount out of range: {a} x {b}")))
}

pub fn first_day_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

pub fn days_in_month(date: NaiveDate) -> u32 {
    let first = first_day_of_month(date);
    let next_first = if first.month() == 12 {
        NaiveDate::from_ymd_opt(first.year() + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(first.year(), first.month() + 1, 1)
    };
    next_first
        .map(|next| (next - first).num_days() as u32)
        .unwrap_or(31)
}

/// The billing anchor for a calendar month: its last day.
pub fn billing_date_for(year: i32, month: u32) -> Result<NaiveDate, BillingError> {
    if !(1..=12).contains(&month) {
        return Err(BillingError::Validation(format!(
            "month must be between 1 and 12, got {month}"
        )));
    }
    let first = NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or_else(|| BillingError::Validation(format!("invalid billing month {year}-{month}")))?;
    first
        .with_day(days_in_month(first))
        .ok_or_else(|| BillingError::Validation(format!("invalid billing month {year}-{month}")))
}

/// `YYYY-MM` label of the billed month.
pub fn billing_period_label(billing_date: NaiveDate) -> String {
    billing_date.format("%Y-%m").to_string()
}

/// Portion of `monthly_fee` owed for the month ending on `billing_date` by a
/// resident who moved in on `move_in_date`.
///
/// Both the move-in day and the billing day count as occupied. A stay that
/// covers the whole month returns `monthly_fee` untouched; a move-in after
/// `billing_date` owes nothing.
pub fn prorated_amount(
    monthly_fee: Decimal,
    billing_date: NaiveDate,
    move_in_date: Option<NaiveDate>,
) -> Decimal {
    let Some(move_in) = move_in_date else {
        return monthly_fee;
    };

    let days_in_month = days_in_month(billing_date);
    let period_start = first_day_of_month(billing_date).max(move_in);
    if period_start > billing_date {
        return Decimal::ZERO;
    }

    let days_used = (billing_date - period_start).num_days() + 1;
    if days_used == i64::from(days_in_month) {
        return monthly_fee;
    }

    let daily_rate = monthly_fee / Decimal::from(days_in_month);
    round_money(daily_rate * Decimal::from(days_used))
}

/// Whether a charge for the month ending on `billing_date` is partial.
///
/// True iff the move-in falls strictly after the first day of the billing month.
pub fn is_prorated(billing_date: NaiveDate, move_in_date: Option<NaiveDate>) -> bool {
    move_in_date.is_some_and(|move_in| move_in > first_day_of_month(billing_date))
}

/// Days the resident is billed for in the month ending on `billing_date`.
pub fn occupied_days(billing_date: NaiveDate, move_in_date: Option<NaiveDate>) -> u32 {
    let period_start = match move_in_date {
        Some(move_in) => first_day_of_month(billing_date).max(move_in),
        None => first_day_of_month(billing_date),
    };
    if period_start > billing_date {
        return 0;
    }
    ((billing_date - period_start).num_days() + 1) as u32
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    use super::{
        billing_date_for, billing_period_label, checked_product, days_in_month, is_prorated,
        occupied_days, prorated_amount, round_money,
    };
    use crate::error::BillingError;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn mid_month_move_in_charges_remaining_days() {
        let amount = prorated_amount(dec!(2000000), date(2024, 12, 31), Some(date(2024, 12, 15)));
        assert_eq!(amount, dec!(1096774.19));
    }

    #[test]
    fn move_in_after_billing_month_owes_nothing() {
        let amount = prorated_amount(dec!(2000000), date(2024, 12, 31), Some(date(2025, 1, 1)));
        assert_eq!(amount, Decimal::ZERO);
    }

    #[test]
    fn leap_february_uses_29_day_denominator() {
        let amount = prorated_amount(dec!(2900000), date(2024, 2, 29), Some(date(2024, 2, 15)));
        assert_eq!(amount, dec!(1500000.00));
    }

    #[test]
    fn non_leap_february_uses_28_day_denominator() {
        // 14 of 28 days
        let amount = prorated_amount(dec!(2800000), date(2023, 2, 28), Some(date(2023, 2, 15)));
        assert_eq!(amount, dec!(1400000.00));
    }

    #[test]
    fn move_in_on_first_is_full_month() {
        let fee = dec!(2000000);
        assert_eq!(
            prorated_amount(fee, date(2024, 12, 31), Some(date(2024, 12, 1))),
            fee
        );
        assert!(!is_prorated(date(2024, 12, 31), Some(date(2024, 12, 1))));
    }

    #[test]
    fn earlier_move_in_is_full_month_exactly() {
        let fee = dec!(1234567.891);
        assert_eq!(
            prorated_amount(fee, date(2024, 12, 31), Some(date(2023, 6, 20))),
            fee
        );
        assert_eq!(prorated_amount(fee, date(2024, 12, 31), None), fee);
    }

    #[test]
    fn move_in_on_last_day_charges_one_day() {
        let amount = prorated_amount(dec!(3100000), date(2024, 12, 31), Some(date(2024, 12, 31)));
        assert_eq!(amount, dec!(100000.00));
        assert!(is_prorated(date(2024, 12, 31), Some(date(2024, 12, 31))));
    }

    #[test]
    fn partial_amount_is_monotonic_in_move_in_date() {
        let fee = dec!(2000000);
        let billing = date(2024, 10, 31);
        let mut previous = Decimal::ZERO;
        for day in (2..=31).rev() {
            let amount = prorated_amount(fee, billing, Some(date(2024, 10, day)));
            assert!(amount > Decimal::ZERO && amount < fee, "day {day}: {amount}");
            assert!(amount >= previous, "day {day}: {amount} < {previous}");
            previous = amount;
        }
    }

    #[test]
    fn no_move_in_date_is_not_prorated() {
        assert!(!is_prorated(date(2024, 12, 31), None));
        assert_eq!(occupied_days(date(2024, 12, 31), None), 31);
        assert_eq!(occupied_days(date(2024, 12, 31), Some(date(2024, 12, 15))), 17);
        assert_eq!(occupied_days(date(2024, 12, 31), Some(date(2025, 1, 2))), 0);
    }

    #[test]
    fn computes_billing_dates_and_month_lengths() {
        assert_eq!(billing_date_for(2024, 2).expect("valid"), date(2024, 2, 29));
        assert_eq!(billing_date_for(2023, 2).expect("valid"), date(2023, 2, 28));
        assert_eq!(billing_date_for(2024, 12).expect("valid"), date(2024, 12, 31));
        assert!(billing_date_for(2024, 13).is_err());
        assert!(billing_date_for(2024, 0).is_err());
        assert_eq!(days_in_month(date(2024, 4, 10)), 30);
        assert_eq!(billing_period_label(date(2024, 3, 31)), "2024-03");
    }

    #[test]
    fn rounds_half_away_from_zero() {
        assert_eq!(round_money(dec!(10.005)), dec!(10.01));
        assert_eq!(round_money(dec!(10.004)), dec!(10.00));
    }

    #[test]
    fn product_out_of_range_is_a_validation_error() {
        assert_eq!(checked_product(dec!(12.5), dec!(4)).expect("in range"), dec!(50.0));
        assert!(matches!(
            checked_product(Decimal::MAX, dec!(2)),
            Err(BillingError::Validation(_))
        ));
    }
}
