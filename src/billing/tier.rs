use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::BillingCycle;

/// Subscription level of a business. Declaration order is rank order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageTier {
    Basic,
    Bronze,
    Silver,
    Gold,
}

pub const ALL_TIERS: [PackageTier; 4] = [
    PackageTier::Basic,
    PackageTier::Bronze,
    PackageTier::Silver,
    PackageTier::Gold,
];

/// What a tier unlocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PackageFeatures {
    pub show_contact: bool,
    pub products: bool,
    /// `None` means unlimited.
    pub product_limit: Option<u32>,
    pub adverts_per_period: u32,
    pub social: bool,
}

impl PackageTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            PackageTier::Basic => "basic",
            PackageTier::Bronze => "bronze",
            PackageTier::Silver => "silver",
            PackageTier::Gold => "gold",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            PackageTier::Basic => "Basic",
            PackageTier::Bronze => "Bronze",
            PackageTier::Silver => "Silver",
            PackageTier::Gold => "Gold",
        }
    }

    pub fn is_paid(&self) -> bool {
        *self != PackageTier::Basic
    }

    /// Price in cents.
    pub fn price_cents(&self, cycle: BillingCycle) -> i64 {
        let monthly = match self {
            PackageTier::Basic => 0,
            PackageTier::Bronze => 200_00,
            PackageTier::Silver => 500_00,
            PackageTier::Gold => 1000_00,
        };
        match cycle {
            BillingCycle::Monthly => monthly,
            // Annual billing is ten months' price.
            BillingCycle::Annual => monthly * 10,
        }
    }

    pub fn features(&self) -> PackageFeatures {
        match self {
            PackageTier::Basic => PackageFeatures {
                show_contact: false,
                products: false,
                product_limit: Some(0),
                adverts_per_period: 0,
                social: false,
            },
            PackageTier::Bronze => PackageFeatures {
                show_contact: true,
                products: false,
                product_limit: Some(0),
                adverts_per_period: 0,
                social: false,
            },
            PackageTier::Silver => PackageFeatures {
                show_contact: true,
                products: true,
                product_limit: Some(20),
                adverts_per_period: 1,
                social: false,
            },
            PackageTier::Gold => PackageFeatures {
                show_contact: true,
                products: true,
                product_limit: None,
                adverts_per_period: 4,
                social: true,
            },
        }
    }

    /// Whether a business with `current` products may add one more.
    pub fn allows_another_product(&self, current: i64) -> bool {
        let features = self.features();
        if !features.products {
            return false;
        }
        match features.product_limit {
            Some(limit) => current < limit as i64,
            None => true,
        }
    }
}

impl fmt::Display for PackageTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown package tier: {0}")]
pub struct UnknownTier(pub String);

impl FromStr for PackageTier {
    type Err = UnknownTier;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "basic" => Ok(PackageTier::Basic),
            "bronze" => Ok(PackageTier::Bronze),
            "silver" => Ok(PackageTier::Silver),
            "gold" => Ok(PackageTier::Gold),
            _ => Err(UnknownTier(s.to_string())),
        }
    }
}

/// Public description of a tier, as served by `GET /packages`.
#[derive(Debug, Serialize)]
pub struct PackageInfo {
    pub tier: PackageTier,
    pub name: &'static str,
    pub monthly_price_cents: i64,
    pub annual_price_cents: i64,
    pub features: PackageFeatures,
}

pub fn package_catalogue() -> Vec<PackageInfo> {
    ALL_TIERS
        .iter()
        .map(|tier| PackageInfo {
            tier: *tier,
            name: tier.display_name(),
            monthly_price_cents: tier.price_cents(BillingCycle::Monthly),
            annual_price_cents: tier.price_cents(BillingCycle::Annual),
            features: tier.features(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rank_follows_declaration_order() {
        assert!(PackageTier::Basic < PackageTier::Bronze);
        assert!(PackageTier::Bronze < PackageTier::Silver);
        assert!(PackageTier::Silver < PackageTier::Gold);
    }

    #[test]
    fn parses_case_insensitively() {
        assert_eq!("GOLD".parse::<PackageTier>(), Ok(PackageTier::Gold));
        assert_eq!(" silver ".parse::<PackageTier>(), Ok(PackageTier::Silver));
        assert!("platinum".parse::<PackageTier>().is_err());
    }

    #[test]
    fn only_silver_and_gold_have_products() {
        let with_products: Vec<_> = ALL_TIERS
            .iter()
            .filter(|t| t.features().products)
            .collect();
        assert_eq!(with_products, vec![&PackageTier::Silver, &PackageTier::Gold]);
    }

    #[test]
    fn contact_hidden_only_on_basic() {
        assert!(!PackageTier::Basic.features().show_contact);
        assert!(PackageTier::Bronze.features().show_contact);
    }

    #[test]
    fn social_is_gold_only() {
        assert!(PackageTier::Gold.features().social);
        assert!(!PackageTier::Silver.features().social);
    }

    #[test]
    fn product_limits() {
        assert!(!PackageTier::Bronze.allows_another_product(0));
        assert!(PackageTier::Silver.allows_another_product(19));
        assert!(!PackageTier::Silver.allows_another_product(20));
        assert!(PackageTier::Gold.allows_another_product(10_000));
    }

    #[test]
    fn annual_prices() {
        assert_eq!(PackageTier::Basic.price_cents(BillingCycle::Annual), 0);
        assert_eq!(PackageTier::Silver.price_cents(BillingCycle::Monthly), 50_000);
        assert_eq!(PackageTier::Gold.price_cents(BillingCycle::Annual), 1_000_000);
    }

    #[test]
    fn catalogue_lists_every_tier() {
        let catalogue = package_catalogue();
        assert_eq!(catalogue.len(), 4);
        assert_eq!(catalogue[3].features.adverts_per_period, 4);
    }
}
