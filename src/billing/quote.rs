use chrono::{DateTime, Months, TimeDelta, Utc};
use serde::Serialize;

use super::{BillingCycle, PackageTier};

/// The package state of a business at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subscription {
    pub tier: PackageTier,
    pub cycle: Option<BillingCycle>,
    pub ends_at: Option<DateTime<Utc>>,
}

impl Subscription {
    pub fn basic() -> Self {
        Self {
            tier: PackageTier::Basic,
            cycle: None,
            ends_at: None,
        }
    }

    /// A paid tier whose current period has not run out.
    pub fn is_active_paid(&self, now: DateTime<Utc>) -> bool {
        self.tier.is_paid() && self.cycle.is_some() && self.ends_at.is_some_and(|end| end > now)
    }

    /// The tier whose features apply at `now`. A paid tier keeps working for
    /// `grace` after its period ends and counts as Basic from then on, whether
    /// or not the scheduler has lapsed it yet.
    pub fn effective_tier(&self, now: DateTime<Utc>, grace: TimeDelta) -> PackageTier {
        if !self.tier.is_paid() {
            return self.tier;
        }
        match self.ends_at.map(|end| end.checked_add_signed(grace)) {
            Some(Some(limit)) if now >= limit => PackageTier::Basic,
            Some(_) => self.tier,
            None => PackageTier::Basic,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QuoteError {
    #[error("The selected package is your current package.")]
    SamePackage,
    #[error("The {target} package is not an upgrade from {current}.")]
    NotAnUpgrade {
        current: PackageTier,
        target: PackageTier,
    },
    #[error("The {target} package is not a downgrade from {current}.")]
    NotADowngrade {
        current: PackageTier,
        target: PackageTier,
    },
    #[error("The Basic package is free and cannot be renewed.")]
    NothingToRenew,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PriceQuote {
    pub tier: PackageTier,
    pub cycle: BillingCycle,
    pub full_price_cents: i64,
    pub credit_cents: i64,
    pub amount_cents: i64,
}

/// Prices an upgrade, crediting the unused part of an active paid period.
pub fn quote_upgrade(
    current: &Subscription,
    target: PackageTier,
    cycle: BillingCycle,
    now: DateTime<Utc>,
) -> Result<PriceQuote, QuoteError> {
    if target == current.tier {
        return Err(QuoteError::SamePackage);
    }
    if target < current.tier {
        return Err(QuoteError::NotAnUpgrade {
            current: current.tier,
            target,
        });
    }

    let full_price_cents = target.price_cents(cycle);
    let credit_cents = unused_credit_cents(current, now);

    Ok(PriceQuote {
        tier: target,
        cycle,
        full_price_cents,
        credit_cents,
        amount_cents: (full_price_cents - credit_cents).max(0),
    })
}

/// Full price of another period of the current paid tier.
pub fn quote_renewal(current: &Subscription) -> Result<PriceQuote, QuoteError> {
    let cycle = match current.cycle {
        Some(cycle) if current.tier.is_paid() => cycle,
        _ => return Err(QuoteError::NothingToRenew),
    };
    let price = current.tier.price_cents(cycle);

    Ok(PriceQuote {
        tier: current.tier,
        cycle,
        full_price_cents: price,
        credit_cents: 0,
        amount_cents: price,
    })
}

/// Value of the remaining part of the current period, rounded down to the cent.
pub fn unused_credit_cents(current: &Subscription, now: DateTime<Utc>) -> i64 {
    if !current.is_active_paid(now) {
        return 0;
    }
    let (Some(cycle), Some(ends_at)) = (current.cycle, current.ends_at) else {
        return 0;
    };
    let Some(starts_at) = cycle.period_start(ends_at) else {
        return 0;
    };

    let period = (ends_at - starts_at).num_seconds();
    let remaining = (ends_at - now).num_seconds().min(period);
    if period <= 0 || remaining <= 0 {
        return 0;
    }

    let price = current.tier.price_cents(cycle) as i128;
    (price * remaining as i128 / period as i128) as i64
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DowngradePlan {
    Immediate,
    Scheduled { effective_at: DateTime<Utc> },
}

/// Downgrades wait for the end of a paid period; otherwise they apply now.
pub fn plan_downgrade(
    current: &Subscription,
    target: PackageTier,
    now: DateTime<Utc>,
) -> Result<DowngradePlan, QuoteError> {
    if target == current.tier {
        return Err(QuoteError::SamePackage);
    }
    if target > current.tier {
        return Err(QuoteError::NotADowngrade {
            current: current.tier,
            target,
        });
    }

    match current.ends_at {
        Some(effective_at) if current.is_active_paid(now) => {
            Ok(DowngradePlan::Scheduled { effective_at })
        }
        _ => Ok(DowngradePlan::Immediate),
    }
}

impl BillingCycle {
    pub fn months(&self) -> u32 {
        match self {
            BillingCycle::Monthly => 1,
            BillingCycle::Annual => 12,
        }
    }

    pub fn period_end(&self, starts_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        starts_at.checked_add_months(Months::new(self.months()))
    }

    pub fn period_start(&self, ends_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        ends_at.checked_sub_months(Months::new(self.months()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    fn silver_monthly_ending(ends_at: DateTime<Utc>) -> Subscription {
        Subscription {
            tier: PackageTier::Silver,
            cycle: Some(BillingCycle::Monthly),
            ends_at: Some(ends_at),
        }
    }

    #[test]
    fn upgrade_from_basic_is_full_price() {
        let quote = quote_upgrade(
            &Subscription::basic(),
            PackageTier::Gold,
            BillingCycle::Annual,
            at(2025, 3, 1),
        )
        .unwrap();
        assert_eq!(quote.credit_cents, 0);
        assert_eq!(quote.amount_cents, 1_000_000);
    }

    #[test]
    fn upgrade_credits_unused_half_period() {
        // April has 30 days; 15 remain.
        let current = silver_monthly_ending(at(2025, 5, 1));
        let quote =
            quote_upgrade(&current, PackageTier::Gold, BillingCycle::Monthly, at(2025, 4, 16))
                .unwrap();
        assert_eq!(quote.credit_cents, 25_000);
        assert_eq!(quote.amount_cents, 100_000 - 25_000);
    }

    #[test]
    fn lapsed_subscription_gets_no_credit() {
        let current = silver_monthly_ending(at(2025, 5, 1));
        let quote =
            quote_upgrade(&current, PackageTier::Gold, BillingCycle::Monthly, at(2025, 5, 2))
                .unwrap();
        assert_eq!(quote.credit_cents, 0);
        assert_eq!(quote.amount_cents, 100_000);
    }

    #[test]
    fn amount_is_never_negative() {
        let current = Subscription {
            tier: PackageTier::Silver,
            cycle: Some(BillingCycle::Annual),
            ends_at: Some(at(2026, 1, 1)),
        };
        let quote =
            quote_upgrade(&current, PackageTier::Gold, BillingCycle::Monthly, at(2025, 1, 2))
                .unwrap();
        assert!(quote.credit_cents > quote.full_price_cents);
        assert_eq!(quote.amount_cents, 0);
    }

    #[test]
    fn credit_rounds_down() {
        let ends_at = at(2025, 5, 1);
        let now = ends_at - Duration::seconds(1);
        let credit = unused_credit_cents(&silver_monthly_ending(ends_at), now);
        assert_eq!(credit, 0);
    }

    #[test]
    fn rejects_sideways_and_downward_upgrades() {
        let current = silver_monthly_ending(at(2025, 5, 1));
        let now = at(2025, 4, 10);
        assert_eq!(
            quote_upgrade(&current, PackageTier::Silver, BillingCycle::Monthly, now),
            Err(QuoteError::SamePackage)
        );
        assert!(matches!(
            quote_upgrade(&current, PackageTier::Bronze, BillingCycle::Monthly, now),
            Err(QuoteError::NotAnUpgrade { .. })
        ));
    }

    #[test]
    fn downgrade_during_paid_period_is_scheduled() {
        let ends_at = at(2025, 5, 1);
        let current = silver_monthly_ending(ends_at);
        assert_eq!(
            plan_downgrade(&current, PackageTier::Bronze, at(2025, 4, 10)),
            Ok(DowngradePlan::Scheduled {
                effective_at: ends_at
            })
        );
    }

    #[test]
    fn downgrade_after_lapse_is_immediate() {
        let current = silver_monthly_ending(at(2025, 5, 1));
        assert_eq!(
            plan_downgrade(&current, PackageTier::Basic, at(2025, 6, 1)),
            Ok(DowngradePlan::Immediate)
        );
    }

    #[test]
    fn downgrade_must_go_down() {
        let current = silver_monthly_ending(at(2025, 5, 1));
        assert!(matches!(
            plan_downgrade(&current, PackageTier::Gold, at(2025, 4, 10)),
            Err(QuoteError::NotADowngrade { .. })
        ));
    }

    #[test]
    fn renewal_needs_a_paid_tier() {
        assert_eq!(
            quote_renewal(&Subscription::basic()),
            Err(QuoteError::NothingToRenew)
        );
        let quote = quote_renewal(&silver_monthly_ending(at(2025, 5, 1))).unwrap();
        assert_eq!(quote.amount_cents, 50_000);
    }

    #[test]
    fn paid_features_last_through_the_grace_window() {
        let ends_at = at(2025, 5, 1);
        let current = silver_monthly_ending(ends_at);
        let grace = Duration::days(7);

        assert_eq!(current.effective_tier(at(2025, 4, 30), grace), PackageTier::Silver);
        assert_eq!(current.effective_tier(at(2025, 5, 7), grace), PackageTier::Silver);
        assert_eq!(current.effective_tier(at(2025, 5, 8), grace), PackageTier::Basic);
        assert_eq!(current.effective_tier(ends_at, Duration::zero()), PackageTier::Basic);
    }

    #[test]
    fn paid_tier_without_a_period_counts_as_basic() {
        let current = Subscription {
            tier: PackageTier::Gold,
            cycle: None,
            ends_at: None,
        };
        assert_eq!(current.effective_tier(at(2025, 1, 1), Duration::days(7)), PackageTier::Basic);
        assert_eq!(
            Subscription::basic().effective_tier(at(2025, 1, 1), Duration::days(7)),
            PackageTier::Basic
        );
    }

    #[test]
    fn periods_use_calendar_months() {
        let start = at(2025, 1, 31);
        assert_eq!(BillingCycle::Monthly.period_end(start), Some(at(2025, 2, 28)));
        assert_eq!(BillingCycle::Annual.period_end(start), Some(at(2026, 1, 31)));
    }
}
