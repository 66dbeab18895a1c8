//! Package tiers and the billing rules around them.
//!
//! `tier` and `quote` are pure; `changes` writes package transitions to the
//! database and `scheduler` applies the ones that fall due over time.

pub mod changes;
pub mod quote;
pub mod scheduler;
pub mod tier;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use changes::{
    apply_downgrade, apply_paid_change, cancel_scheduled_downgrade, schedule_downgrade,
};
pub use quote::{
    DowngradePlan, PriceQuote, QuoteError, Subscription, plan_downgrade, quote_renewal,
    quote_upgrade,
};
pub use scheduler::{apply_due_package_changes, spawn_package_scheduler};
pub use tier::{PackageFeatures, PackageInfo, PackageTier, package_catalogue};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BillingCycle {
    Monthly,
    Annual,
}

impl BillingCycle {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingCycle::Monthly => "monthly",
            BillingCycle::Annual => "annual",
        }
    }
}

impl fmt::Display for BillingCycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown billing cycle: {0}")]
pub struct UnknownCycle(pub String);

impl FromStr for BillingCycle {
    type Err = UnknownCycle;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "monthly" => Ok(BillingCycle::Monthly),
            "annual" | "yearly" => Ok(BillingCycle::Annual),
            _ => Err(UnknownCycle(s.to_string())),
        }
    }
}

/// Why a payment was raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentKind {
    Upgrade,
    Renewal,
}

impl PaymentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentKind::Upgrade => "upgrade",
            PaymentKind::Renewal => "renewal",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "upgrade" => Some(PaymentKind::Upgrade),
            "renewal" => Some(PaymentKind::Renewal),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_accepts_yearly_alias() {
        assert_eq!("Yearly".parse::<BillingCycle>(), Ok(BillingCycle::Annual));
        assert_eq!("monthly".parse::<BillingCycle>(), Ok(BillingCycle::Monthly));
        assert!("weekly".parse::<BillingCycle>().is_err());
    }

    #[test]
    fn payment_kind_round_trips_through_text() {
        for kind in [PaymentKind::Upgrade, PaymentKind::Renewal] {
            assert_eq!(PaymentKind::parse(kind.as_str()), Some(kind));
        }
    }
}
