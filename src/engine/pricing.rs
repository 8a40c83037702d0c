use rust_decimal::{Decimal, RoundingStrategy};

use crate::model::StayRange;

use super::EngineError;

/// Monetary amounts carry two decimal places.
pub const MONEY_SCALE: u32 = 2;

/// Round half-up to cents. Applied once to a final amount, never per line.
/// The result always carries exactly two decimal places.
pub fn round_money(amount: Decimal) -> Decimal {
    let mut rounded = amount.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(MONEY_SCALE);
    rounded
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceBreakdown {
    pub nights: i64,
    pub room_total: Decimal,
    pub extras_total: Decimal,
    pub total: Decimal,
}

/// `rate × nights + Σ extras`, rounded at the end.
pub fn price_breakdown(
    nightly_rate: Decimal,
    stay: &StayRange,
    extra_prices: impl IntoIterator<Item = Decimal>,
) -> Result<PriceBreakdown, EngineError> {
    if nightly_rate < Decimal::ZERO {
        return Err(EngineError::Precondition("nightly rate is negative"));
    }
    let nights = stay.nights();
    if nights < 1 {
        return Err(EngineError::Precondition("stay has no nights"));
    }

    let mut extras_total = Decimal::ZERO;
    for price in extra_prices {
        if price < Decimal::ZERO {
            return Err(EngineError::Precondition("extra service price is negative"));
        }
        extras_total = extras_total
            .checked_add(price)
            .ok_or(EngineError::Precondition("extras total overflows"))?;
    }

    let room_total = nightly_rate
        .checked_mul(Decimal::from(nights))
        .ok_or(EngineError::Precondition("room total overflows"))?;
    let total = room_total
        .checked_add(extras_total)
        .ok_or(EngineError::Precondition("booking total overflows"))?;

    Ok(PriceBreakdown {
        nights,
        room_total,
        extras_total,
        total: round_money(total),
    })
}

pub fn compute_total(
    nightly_rate: Decimal,
    stay: &StayRange,
    extra_prices: impl IntoIterator<Item = Decimal>,
) -> Result<Decimal, EngineError> {
    price_breakdown(nightly_rate, stay, extra_prices).map(|p| p.total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn stay(a: (i32, u32, u32), b: (i32, u32, u32)) -> StayRange {
        StayRange::new(
            NaiveDate::from_ymd_opt(a.0, a.1, a.2).unwrap(),
            NaiveDate::from_ymd_opt(b.0, b.1, b.2).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn three_nights_with_one_extra() {
        let s = stay((2025, 11, 5), (2025, 11, 8));
        let total = compute_total(dec!(100), &s, [dec!(20)]).unwrap();
        assert_eq!(total, dec!(320.00));
        assert_eq!(total.to_string(), "320.00");
    }

    #[test]
    fn breakdown_parts() {
        let s = stay((2025, 11, 5), (2025, 11, 8));
        let p = price_breakdown(dec!(89.90), &s, [dec!(15), dec!(4.50)]).unwrap();
        assert_eq!(p.nights, 3);
        assert_eq!(p.room_total, dec!(269.70));
        assert_eq!(p.extras_total, dec!(19.50));
        assert_eq!(p.total, dec!(289.20));
    }

    #[test]
    fn no_extras() {
        let s = stay((2025, 11, 5), (2025, 11, 6));
        assert_eq!(compute_total(dec!(75), &s, std::iter::empty()).unwrap(), dec!(75.00));
    }

    #[test]
    fn rounds_once_at_the_end() {
        // Per-line rounding would give 0.01 + 0.01 + 0.01 = 0.03.
        let s = stay((2025, 11, 5), (2025, 11, 6));
        let total = compute_total(dec!(0), &s, [dec!(0.005), dec!(0.005), dec!(0.005)]).unwrap();
        assert_eq!(total, dec!(0.02));
    }

    #[test]
    fn rounds_half_up() {
        let s = stay((2025, 11, 5), (2025, 11, 6));
        assert_eq!(compute_total(dec!(10.125), &s, std::iter::empty()).unwrap(), dec!(10.13));
        assert_eq!(compute_total(dec!(10.124), &s, std::iter::empty()).unwrap(), dec!(10.12));
    }

    #[test]
    fn zero_rate_is_allowed() {
        let s = stay((2025, 11, 5), (2025, 11, 7));
        assert_eq!(compute_total(Decimal::ZERO, &s, [dec!(12)]).unwrap(), dec!(12.00));
    }

    #[test]
    fn negative_inputs_are_precondition_violations() {
        let s = stay((2025, 11, 5), (2025, 11, 7));
        assert!(matches!(
            compute_total(dec!(-1), &s, std::iter::empty()),
            Err(EngineError::Precondition(_))
        ));
        assert!(matches!(
            compute_total(dec!(100), &s, [dec!(-5)]),
            Err(EngineError::Precondition(_))
        ));
    }

    proptest! {
        #[test]
        fn extras_order_does_not_matter(
            rate in 0u32..100_000, nights in 1u64..30,
            e1 in 0u32..100_000, e2 in 0u32..100_000, e3 in 0u32..100_000
        ) {
            let check_in = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
            let s = StayRange::new(check_in, check_in + chrono::Days::new(nights)).unwrap();
            let rate = Decimal::new(rate as i64, 2);
            let (e1, e2, e3) = (Decimal::new(e1 as i64, 2), Decimal::new(e2 as i64, 2), Decimal::new(e3 as i64, 2));
            let forward = compute_total(rate, &s, [e1, e2, e3]).unwrap();
            let backward = compute_total(rate, &s, [e3, e2, e1]).unwrap();
            prop_assert_eq!(forward, backward);
            prop_assert_eq!(forward, compute_total(rate, &s, [e1, e2, e3]).unwrap());
        }
    }
}
