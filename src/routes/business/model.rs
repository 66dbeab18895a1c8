use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::{
    billing::{BillingCycle, PackageTier, Subscription},
    error::{AppError, AppResult},
    utils::escape_like,
    validation::{ValidationErrors, non_blank},
};

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Business {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub category: String,
    pub district: String,
    pub description: String,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub website: Option<String>,
    pub facebook_url: Option<String>,
    pub instagram_url: Option<String>,
    pub linkedin_url: Option<String>,
    pub status: String,
    pub rejection_reason: Option<String>,
    pub package_tier: String,
    pub billing_cycle: Option<String>,
    pub subscription_ends_at: Option<DateTime<Utc>>,
    pub pending_package_tier: Option<String>,
    pub adverts_remaining: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub(crate) const BUSINESS_COLUMNS: &str = "id, user_id, name, category, district, description, \
    address, phone, email, website, facebook_url, instagram_url, linkedin_url, status, \
    rejection_reason, package_tier, billing_cycle, subscription_ends_at, pending_package_tier, \
    adverts_remaining, created_at, updated_at";

impl Business {
    /// Unknown tier text is treated as Basic so features fail closed.
    pub fn tier(&self) -> PackageTier {
        self.package_tier.parse().unwrap_or(PackageTier::Basic)
    }

    pub fn cycle(&self) -> Option<BillingCycle> {
        self.billing_cycle.as_deref().and_then(|c| c.parse().ok())
    }

    /// Tier used for feature gating; see [`Subscription::effective_tier`].
    pub fn effective_tier(&self, now: DateTime<Utc>, grace: TimeDelta) -> PackageTier {
        self.subscription().effective_tier(now, grace)
    }

    pub fn subscription(&self) -> Subscription {
        Subscription {
            tier: self.tier(),
            cycle: self.cycle(),
            ends_at: self.subscription_ends_at,
        }
    }

    pub fn is_approved(&self) -> bool {
        self.status == "approved"
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct BusinessRequest {
    pub name: String,
    pub category: String,
    pub district: String,
    pub description: String,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub website: Option<String>,
    pub facebook_url: Option<String>,
    pub instagram_url: Option<String>,
    pub linkedin_url: Option<String>,
}

impl BusinessRequest {
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if errors.required("name", &self.name) {
            errors.length("name", &self.name, 2, 150);
        }
        if errors.required("category", &self.category) {
            errors.max_length("category", &self.category, 100);
        }
        if errors.required("district", &self.district) {
            errors.max_length("district", &self.district, 100);
        }
        if errors.required("description", &self.description) {
            errors.length("description", &self.description, 20, 5000);
        }
        if let Some(phone) = self.phone.as_deref().filter(|p| !p.trim().is_empty()) {
            let digits = phone.chars().filter(char::is_ascii_digit).count();
            let allowed = phone
                .chars()
                .all(|c| c.is_ascii_digit() || " +()-".contains(c));
            if !allowed || !(9..=15).contains(&digits) {
                errors.add("phone", "The phone format is invalid.");
            }
        }
        if let Some(email) = self.email.as_deref().filter(|e| !e.trim().is_empty()) {
            errors.email("email", email);
        }
        errors.optional_url("website", self.website.as_deref());
        errors.optional_url("facebook_url", self.facebook_url.as_deref());
        errors.optional_url("instagram_url", self.instagram_url.as_deref());
        errors.optional_url("linkedin_url", self.linkedin_url.as_deref());
        errors.into_result()
    }

    /// Trims text and drops blank optionals before storage.
    fn normalized(self) -> Self {
        Self {
            name: self.name.trim().to_string(),
            category: self.category.trim().to_string(),
            district: self.district.trim().to_string(),
            description: self.description.trim().to_string(),
            address: non_blank(self.address),
            phone: non_blank(self.phone),
            email: non_blank(self.email).map(|e| e.to_lowercase()),
            website: non_blank(self.website),
            facebook_url: non_blank(self.facebook_url),
            instagram_url: non_blank(self.instagram_url),
            linkedin_url: non_blank(self.linkedin_url),
        }
    }
}

/// A directory entry as the public sees it. Contact details and social links
/// are only filled in when the business's tier includes them.
#[derive(Debug, Serialize)]
pub struct BusinessListing {
    pub id: Uuid,
    pub name: String,
    pub category: String,
    pub district: String,
    pub description: String,
    pub package_tier: PackageTier,
    pub rating_average: Option<f64>,
    pub review_count: i64,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub website: Option<String>,
    pub facebook_url: Option<String>,
    pub instagram_url: Option<String>,
    pub linkedin_url: Option<String>,
}

#[derive(Debug, FromRow)]
pub struct BusinessWithRating {
    #[sqlx(flatten)]
    pub business: Business,
    pub rating_average: Option<f64>,
    pub review_count: i64,
}

impl BusinessListing {
    /// The public view of `row`, with contact and social fields shown only
    /// when the business's effective tier includes them.
    pub fn at(row: BusinessWithRating, now: DateTime<Utc>, grace: TimeDelta) -> Self {
        let tier = row.business.effective_tier(now, grace);
        let features = tier.features();
        let b = row.business;
        let contact = |v: Option<String>| if features.show_contact { v } else { None };
        let social = |v: Option<String>| if features.social { v } else { None };

        Self {
            id: b.id,
            name: b.name,
            category: b.category,
            district: b.district,
            description: b.description,
            package_tier: tier,
            rating_average: row.rating_average.map(|r| (r * 10.0).round() / 10.0),
            review_count: row.review_count,
            address: contact(b.address),
            phone: contact(b.phone),
            email: contact(b.email),
            website: contact(b.website),
            facebook_url: social(b.facebook_url),
            instagram_url: social(b.instagram_url),
            linkedin_url: social(b.linkedin_url),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct DirectoryFilter {
    pub category: Option<String>,
    pub district: Option<String>,
    pub search: Option<String>,
}

const RATING_JOIN: &str = r#"
    LEFT JOIN LATERAL (
        SELECT AVG(r.rating)::FLOAT8 AS rating_average, COUNT(r.id) AS review_count
        FROM reviews r
        WHERE r.business_id = b.id AND r.status = 'approved'
    ) stats ON TRUE
"#;

const DIRECTORY_WHERE: &str = r#"
    WHERE b.status = 'approved'
      AND ($1::TEXT IS NULL OR b.category ILIKE $1 ESCAPE '\')
      AND ($2::TEXT IS NULL OR b.district ILIKE $2 ESCAPE '\')
      AND ($3::TEXT IS NULL OR b.name ILIKE $3 ESCAPE '\' OR b.description ILIKE $3 ESCAPE '\')
"#;

fn prefixed_columns(prefix: &str) -> String {
    BUSINESS_COLUMNS
        .split(',')
        .map(|c| format!("{}.{}", prefix, c.trim()))
        .collect::<Vec<_>>()
        .join(", ")
}

impl Business {
    pub async fn create(pool: &PgPool, user_id: Uuid, req: BusinessRequest) -> AppResult<Self> {
        let req = req.normalized();
        let result = sqlx::query_as::<_, Business>(&format!(
            r#"
            INSERT INTO businesses (
                id, user_id, name, category, district, description, address, phone, email,
                website, facebook_url, instagram_url, linkedin_url
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING {BUSINESS_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(&req.name)
        .bind(&req.category)
        .bind(&req.district)
        .bind(&req.description)
        .bind(&req.address)
        .bind(&req.phone)
        .bind(&req.email)
        .bind(&req.website)
        .bind(&req.facebook_url)
        .bind(&req.instagram_url)
        .bind(&req.linkedin_url)
        .fetch_one(pool)
        .await;

        match result {
            Ok(business) => {
                tracing::info!("User {} registered business {}", user_id, business.id);
                Ok(business)
            }
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(AppError::invalid(
                "business",
                "You have already registered a business.",
            )),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn update_for_user(
        pool: &PgPool,
        user_id: Uuid,
        req: BusinessRequest,
    ) -> AppResult<Self> {
        let req = req.normalized();
        sqlx::query_as::<_, Business>(&format!(
            r#"
            UPDATE businesses
            SET name = $2, category = $3, district = $4, description = $5, address = $6,
                phone = $7, email = $8, website = $9, facebook_url = $10,
                instagram_url = $11, linkedin_url = $12, updated_at = NOW()
            WHERE user_id = $1
            RETURNING {BUSINESS_COLUMNS}
            "#
        ))
        .bind(user_id)
        .bind(&req.name)
        .bind(&req.category)
        .bind(&req.district)
        .bind(&req.description)
        .bind(&req.address)
        .bind(&req.phone)
        .bind(&req.email)
        .bind(&req.website)
        .bind(&req.facebook_url)
        .bind(&req.instagram_url)
        .bind(&req.linkedin_url)
        .fetch_optional(pool)
        .await?
        .ok_or_else(no_business)
    }

    pub async fn find_by_user(pool: &PgPool, user_id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Business>(&format!(
            "SELECT {BUSINESS_COLUMNS} FROM businesses WHERE user_id = $1"
        ))
        .bind(user_id)
        .fetch_optional(pool)
        .await
    }

    /// The caller's business, or 404 if they have not registered one.
    pub async fn require_for_user(pool: &PgPool, user_id: Uuid) -> AppResult<Self> {
        Self::find_by_user(pool, user_id)
            .await?
            .ok_or_else(no_business)
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Business>(&format!(
            "SELECT {BUSINESS_COLUMNS} FROM businesses WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// An approved business with its rating, or 404.
    pub async fn find_public(pool: &PgPool, id: Uuid) -> AppResult<BusinessWithRating> {
        sqlx::query_as::<_, BusinessWithRating>(&format!(
            r#"
            SELECT {}, stats.rating_average, stats.review_count
            FROM businesses b
            {RATING_JOIN}
            WHERE b.id = $1 AND b.status = 'approved'
            "#,
            prefixed_columns("b")
        ))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Business not found.".into()))
    }

    pub async fn directory(
        pool: &PgPool,
        filter: &DirectoryFilter,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<BusinessWithRating>, i64), sqlx::Error> {
        let category = non_blank(filter.category.clone()).map(|s| escape_like(&s));
        let district = non_blank(filter.district.clone()).map(|s| escape_like(&s));
        let search = non_blank(filter.search.clone()).map(|s| format!("%{}%", escape_like(&s)));

        let rows = sqlx::query_as::<_, BusinessWithRating>(&format!(
            r#"
            SELECT {}, stats.rating_average, stats.review_count
            FROM businesses b
            {RATING_JOIN}
            {DIRECTORY_WHERE}
            ORDER BY CASE b.package_tier
                        WHEN 'gold' THEN 3 WHEN 'silver' THEN 2 WHEN 'bronze' THEN 1 ELSE 0
                     END DESC,
                     b.name ASC
            LIMIT $4 OFFSET $5
            "#,
            prefixed_columns("b")
        ))
        .bind(&category)
        .bind(&district)
        .bind(&search)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?;

        let total: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM businesses b {DIRECTORY_WHERE}"
        ))
        .bind(&category)
        .bind(&district)
        .bind(&search)
        .fetch_one(pool)
        .await?;

        Ok((rows, total))
    }

    pub async fn list_by_status(
        pool: &PgPool,
        status: &str,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Self>, i64), sqlx::Error> {
        let businesses = sqlx::query_as::<_, Business>(&format!(
            r#"
            SELECT {BUSINESS_COLUMNS} FROM businesses
            WHERE status = $1
            ORDER BY created_at ASC
            LIMIT $2 OFFSET $3
            "#
        ))
        .bind(status)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?;

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM businesses WHERE status = $1")
            .bind(status)
            .fetch_one(pool)
            .await?;

        Ok((businesses, total))
    }

    pub async fn set_status(
        pool: &PgPool,
        id: Uuid,
        status: &str,
        rejection_reason: Option<&str>,
    ) -> AppResult<Self> {
        sqlx::query_as::<_, Business>(&format!(
            r#"
            UPDATE businesses
            SET status = $2, rejection_reason = $3, updated_at = NOW()
            WHERE id = $1
            RETURNING {BUSINESS_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(status)
        .bind(rejection_reason)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Business not found.".into()))
    }
}

fn no_business() -> AppError {
    AppError::NotFound("You have not registered a business yet.".into())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_request() -> BusinessRequest {
        BusinessRequest {
            name: "Lowveld Coffee Roasters".into(),
            category: "Food & Drink".into(),
            district: "Ehlanzeni".into(),
            description: "Small-batch coffee roasted daily in Mbombela.".into(),
            phone: Some("+27 13 555 0101".into()),
            website: Some("https://lowveldcoffee.example".into()),
            ..Default::default()
        }
    }

    fn business(tier: &str) -> Business {
        let now = Utc::now();
        Business {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            name: "Lowveld Coffee Roasters".into(),
            category: "Food & Drink".into(),
            district: "Ehlanzeni".into(),
            description: "Small-batch coffee".into(),
            address: Some("12 Brown St".into()),
            phone: Some("013 555 0101".into()),
            email: Some("hello@lowveldcoffee.example".into()),
            website: Some("https://lowveldcoffee.example".into()),
            facebook_url: Some("https://facebook.com/lowveldcoffee".into()),
            instagram_url: None,
            linkedin_url: None,
            status: "approved".into(),
            rejection_reason: None,
            package_tier: tier.into(),
            billing_cycle: Some("monthly".into()),
            subscription_ends_at: Some(now + TimeDelta::days(20)),
            pending_package_tier: None,
            adverts_remaining: 0,
            created_at: now,
            updated_at: now,
        }
    }

    fn listing(tier: &str) -> BusinessListing {
        let row = BusinessWithRating {
            business: business(tier),
            rating_average: Some(4.26),
            review_count: 7,
        };
        BusinessListing::at(row, Utc::now(), TimeDelta::days(7))
    }

    #[test]
    fn valid_business_passes() {
        assert!(valid_request().validate().is_ok());
    }

    #[test]
    fn required_fields_and_urls_are_checked() {
        let req = BusinessRequest {
            website: Some("lowveldcoffee.example".into()),
            ..Default::default()
        };
        let errors = req.validate().unwrap_err();
        for field in ["name", "category", "district", "description", "website"] {
            assert!(errors.has(field), "missing error for {field}");
        }
    }

    #[test]
    fn phone_must_look_like_a_number() {
        let req = BusinessRequest {
            phone: Some("call me".into()),
            ..valid_request()
        };
        assert!(req.validate().unwrap_err().has("phone"));
    }

    #[test]
    fn basic_listing_hides_contact_and_social() {
        let l = listing("basic");
        assert!(l.phone.is_none() && l.email.is_none() && l.address.is_none());
        assert!(l.website.is_none() && l.facebook_url.is_none());
    }

    #[test]
    fn bronze_listing_shows_contact_only() {
        let l = listing("bronze");
        assert_eq!(l.phone.as_deref(), Some("013 555 0101"));
        assert!(l.facebook_url.is_none());
    }

    #[test]
    fn gold_listing_shows_social_links() {
        let l = listing("gold");
        assert!(l.facebook_url.is_some());
        assert_eq!(l.rating_average, Some(4.3));
        assert_eq!(l.review_count, 7);
    }

    #[test]
    fn listing_past_grace_is_shown_as_basic() {
        let mut gold = business("gold");
        gold.subscription_ends_at = Some(Utc::now() - TimeDelta::days(8));
        let row = BusinessWithRating {
            business: gold,
            rating_average: None,
            review_count: 0,
        };
        let l = BusinessListing::at(row, Utc::now(), TimeDelta::days(7));
        assert_eq!(l.package_tier, PackageTier::Basic);
        assert!(l.phone.is_none() && l.facebook_url.is_none());
    }

    #[test]
    fn unknown_tier_fails_closed() {
        assert_eq!(business("platinum").tier(), PackageTier::Basic);
    }
}
