use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::model::Booking;

use super::pricing::round_money;
use super::EngineError;

/// Fee charged when cancelling `min_days` or more days before check-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CancellationTier {
    pub min_days: i64,
    pub fee_percent: Decimal,
}

/// Outcome of applying the policy to one booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CancellationQuote {
    /// Whole days from today to check-in, never below zero.
    pub days_before_check_in: i64,
    pub fee_percent: Decimal,
    pub fee: Decimal,
    pub refund: Decimal,
}

/// Tiered cancellation fees. Tiers are kept sorted by `min_days`
/// descending, the last one always starts at day 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancellationPolicy {
    tiers: Vec<CancellationTier>,
}

impl Default for CancellationPolicy {
    fn default() -> Self {
        Self::standard()
    }
}

impl CancellationPolicy {
    /// Free from 30 days out, 20% from 7, 50% from 1, full price on the day.
    pub fn standard() -> Self {
        Self {
            tiers: vec![
                CancellationTier { min_days: 30, fee_percent: dec!(0) },
                CancellationTier { min_days: 7, fee_percent: dec!(20) },
                CancellationTier { min_days: 1, fee_percent: dec!(50) },
                CancellationTier { min_days: 0, fee_percent: dec!(100) },
            ],
        }
    }

    /// Build a custom policy. The fee may never grow as check-in moves
    /// further away, and day 0 must be covered.
    pub fn new(mut tiers: Vec<CancellationTier>) -> Result<Self, EngineError> {
        tiers.sort_by(|a, b| b.min_days.cmp(&a.min_days));
        if tiers.windows(2).any(|w| w[0].min_days == w[1].min_days) {
            return Err(EngineError::Precondition("cancellation tiers repeat a day threshold"));
        }
        if tiers.last().is_none_or(|t| t.min_days != 0) {
            return Err(EngineError::Precondition("cancellation tiers must start at day 0"));
        }
        if tiers
            .iter()
            .any(|t| t.fee_percent < Decimal::ZERO || t.fee_percent > dec!(100))
        {
            return Err(EngineError::Precondition("cancellation fee percent must be within 0..=100"));
        }
        if tiers.windows(2).any(|w| w[0].fee_percent > w[1].fee_percent) {
            return Err(EngineError::Precondition(
                "cancellation fee must not grow with days before check-in",
            ));
        }
        Ok(Self { tiers })
    }

    pub fn tiers(&self) -> &[CancellationTier] {
        &self.tiers
    }

    /// Fee percentage for cancelling `days` before check-in.
    pub fn fee_percent(&self, days: i64) -> Decimal {
        let days = days.max(0);
        self.tiers
            .iter()
            .find(|t| days >= t.min_days)
            .map_or(dec!(100), |t| t.fee_percent)
    }

    /// Fee and refund for cancelling a stay starting `check_in`, as of `today`.
    /// An unset total is a broken invariant, not a free cancellation.
    pub fn quote(
        &self,
        check_in: NaiveDate,
        total_price: Option<Decimal>,
        today: NaiveDate,
    ) -> Result<CancellationQuote, EngineError> {
        let total = total_price.ok_or(EngineError::Precondition("booking has no total price"))?;
        if total < Decimal::ZERO {
            return Err(EngineError::Precondition("booking total price is negative"));
        }

        let days_before_check_in = (check_in - today).num_days().max(0);
        let fee_percent = self.fee_percent(days_before_check_in);
        let fee = round_money(total * fee_percent / dec!(100));
        let refund = round_money((total - fee).max(Decimal::ZERO));

        Ok(CancellationQuote {
            days_before_check_in,
            fee_percent,
            fee,
            refund,
        })
    }

    pub fn compute_fee(&self, booking: &Booking, today: NaiveDate) -> Result<CancellationQuote, EngineError> {
        self.quote(booking.stay.check_in(), booking.total_price, today)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 10, 1).unwrap()
    }

    fn in_days(n: i64) -> NaiveDate {
        today() + chrono::Duration::days(n)
    }

    #[test]
    fn ten_days_out_charges_twenty_percent() {
        let q = CancellationPolicy::standard()
            .quote(in_days(10), Some(dec!(300)), today())
            .unwrap();
        assert_eq!(q.fee, dec!(60.00));
        assert_eq!(q.refund, dec!(240.00));
        assert_eq!(q.days_before_check_in, 10);
    }

    #[test]
    fn two_days_out_charges_half() {
        let q = CancellationPolicy::standard()
            .quote(in_days(2), Some(dec!(300)), today())
            .unwrap();
        assert_eq!(q.fee, dec!(150.00));
        assert_eq!(q.refund, dec!(150.00));
    }

    #[test]
    fn tier_boundaries() {
        let p = CancellationPolicy::standard();
        assert_eq!(p.fee_percent(45), dec!(0));
        assert_eq!(p.fee_percent(30), dec!(0));
        assert_eq!(p.fee_percent(29), dec!(20));
        assert_eq!(p.fee_percent(7), dec!(20));
        assert_eq!(p.fee_percent(6), dec!(50));
        assert_eq!(p.fee_percent(1), dec!(50));
        assert_eq!(p.fee_percent(0), dec!(100));
        assert_eq!(p.fee_percent(-4), dec!(100));
    }

    #[test]
    fn on_check_in_day_nothing_is_refunded() {
        let q = CancellationPolicy::standard()
            .quote(today(), Some(dec!(300)), today())
            .unwrap();
        assert_eq!(q.fee, dec!(300.00));
        assert_eq!(q.refund, dec!(0.00));
    }

    #[test]
    fn after_check_in_day_counts_as_zero_days() {
        let q = CancellationPolicy::standard()
            .quote(in_days(-3), Some(dec!(120)), today())
            .unwrap();
        assert_eq!(q.days_before_check_in, 0);
        assert_eq!(q.refund, dec!(0.00));
    }

    #[test]
    fn free_cancellation_refunds_everything() {
        let q = CancellationPolicy::standard()
            .quote(in_days(30), Some(dec!(320)), today())
            .unwrap();
        assert_eq!(q.fee, dec!(0.00));
        assert_eq!(q.refund, dec!(320.00));
    }

    #[test]
    fn fee_rounds_half_up() {
        let q = CancellationPolicy::standard()
            .quote(in_days(10), Some(dec!(0.125)), today())
            .unwrap();
        // 20% of 0.125 = 0.025 -> 0.03
        assert_eq!(q.fee, dec!(0.03));
        assert_eq!(q.refund, dec!(0.10));
    }

    #[test]
    fn missing_total_is_a_precondition_violation() {
        let err = CancellationPolicy::standard()
            .quote(in_days(10), None, today())
            .unwrap_err();
        assert!(matches!(err, EngineError::Precondition(_)));
    }

    #[test]
    fn negative_total_is_a_precondition_violation() {
        let err = CancellationPolicy::standard()
            .quote(in_days(10), Some(dec!(-1)), today())
            .unwrap_err();
        assert!(matches!(err, EngineError::Precondition(_)));
    }

    #[test]
    fn custom_policy_is_sorted() {
        let p = CancellationPolicy::new(vec![
            CancellationTier { min_days: 0, fee_percent: dec!(80) },
            CancellationTier { min_days: 14, fee_percent: dec!(0) },
        ])
        .unwrap();
        assert_eq!(p.tiers()[0].min_days, 14);
        assert_eq!(p.fee_percent(13), dec!(80));
        assert_eq!(p.fee_percent(14), dec!(0));
    }

    #[test]
    fn custom_policy_rejects_bad_tables() {
        // no day-0 tier
        assert!(CancellationPolicy::new(vec![CancellationTier { min_days: 3, fee_percent: dec!(10) }]).is_err());
        // fee grows further out
        assert!(
            CancellationPolicy::new(vec![
                CancellationTier { min_days: 0, fee_percent: dec!(10) },
                CancellationTier { min_days: 10, fee_percent: dec!(50) },
            ])
            .is_err()
        );
        // over 100%
        assert!(CancellationPolicy::new(vec![CancellationTier { min_days: 0, fee_percent: dec!(150) }]).is_err());
        // duplicate threshold
        assert!(
            CancellationPolicy::new(vec![
                CancellationTier { min_days: 0, fee_percent: dec!(100) },
                CancellationTier { min_days: 0, fee_percent: dec!(50) },
            ])
            .is_err()
        );
        assert!(CancellationPolicy::new(Vec::new()).is_err());
    }

    proptest! {
        #[test]
        fn fee_never_increases_with_more_notice(days in -5i64..400, extra in 0i64..100, cents in 0i64..10_000_000) {
            let p = CancellationPolicy::standard();
            let total = Some(Decimal::new(cents, 2));
            let near = p.quote(in_days(days), total, today()).unwrap();
            let far = p.quote(in_days(days + extra), total, today()).unwrap();
            prop_assert!(far.fee <= near.fee);
            prop_assert_eq!(near.fee + near.refund, total.unwrap().round_dp(2));
        }
    }
}
