use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    billing::{BillingCycle, PackageTier, PriceQuote},
    payfast::Checkout,
    routes::payment::model::Payment,
    validation::ValidationErrors,
};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct UpgradeRequest {
    pub package: String,
    pub billing_cycle: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DowngradeRequest {
    pub package: String,
}

fn parse_package(errors: &mut ValidationErrors, package: &str) -> Option<PackageTier> {
    if !errors.required("package", package) {
        return None;
    }
    match package.parse() {
        Ok(tier) => Some(tier),
        Err(_) => {
            errors.add("package", "The selected package is invalid.");
            None
        }
    }
}

impl UpgradeRequest {
    pub fn validate(&self) -> Result<(PackageTier, BillingCycle), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let tier = parse_package(&mut errors, &self.package);

        let cycle = if errors.required("billing_cycle", &self.billing_cycle) {
            match self.billing_cycle.parse() {
                Ok(cycle) => Some(cycle),
                Err(_) => {
                    errors.add("billing_cycle", "The billing cycle must be monthly or annual.");
                    None
                }
            }
        } else {
            None
        };

        match (tier, cycle) {
            (Some(tier), Some(cycle)) if errors.is_empty() => Ok((tier, cycle)),
            _ => Err(errors),
        }
    }
}

impl DowngradeRequest {
    pub fn validate(&self) -> Result<PackageTier, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        match parse_package(&mut errors, &self.package) {
            Some(tier) => Ok(tier),
            None => Err(errors),
        }
    }
}

/// A raised payment and, when money is due, the gateway form to pay it.
#[derive(Debug, Serialize)]
pub struct PaymentCheckout {
    pub payment: Payment,
    pub quote: PriceQuote,
    pub checkout: Option<Checkout>,
}

#[derive(Debug, Serialize)]
pub struct DowngradeOutcome {
    pub package: PackageTier,
    pub scheduled: bool,
    pub effective_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upgrade_request_parses_tier_and_cycle() {
        let req = UpgradeRequest {
            package: "Gold".into(),
            billing_cycle: "yearly".into(),
        };
        assert_eq!(req.validate(), Ok((PackageTier::Gold, BillingCycle::Annual)));
    }

    #[test]
    fn upgrade_request_reports_each_bad_field() {
        let req = UpgradeRequest {
            package: "platinum".into(),
            billing_cycle: "weekly".into(),
        };
        let errors = req.validate().unwrap_err();
        assert!(errors.has("package"));
        assert!(errors.has("billing_cycle"));

        let errors = UpgradeRequest::default().validate().unwrap_err();
        assert!(errors.has("package"));
        assert!(errors.has("billing_cycle"));
    }

    #[test]
    fn downgrade_request_needs_a_known_package() {
        assert_eq!(
            DowngradeRequest {
                package: "bronze".into()
            }
            .validate(),
            Ok(PackageTier::Bronze)
        );
        assert!(DowngradeRequest::default().validate().unwrap_err().has("package"));
    }
}
