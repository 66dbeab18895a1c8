use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    validation::{ValidationErrors, non_blank},
};

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Advert {
    pub id: Uuid,
    pub business_id: Uuid,
    pub title: String,
    pub description: String,
    pub image_url: Option<String>,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, FromRow)]
pub struct ActiveAdvert {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub advert: Advert,
    pub business_name: String,
}

const ADVERT_COLUMNS: &str =
    "id, business_id, title, description, image_url, starts_at, ends_at, created_at";

pub const MAX_ADVERT_DAYS: i64 = 30;
/// Clock skew tolerated on a start time sent by the browser.
const START_SKEW: Duration = Duration::hours(1);

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AdvertRequest {
    pub title: String,
    pub description: String,
    pub image_url: Option<String>,
    /// Defaults to now.
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
}

impl AdvertRequest {
    pub fn starts_at(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.starts_at.unwrap_or(now)
    }

    pub fn validate(&self, now: DateTime<Utc>) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if errors.required("title", &self.title) {
            errors.length("title", &self.title, 3, 120);
        }
        if errors.required("description", &self.description) {
            errors.length("description", &self.description, 10, 1000);
        }
        errors.optional_url("image_url", self.image_url.as_deref());

        match self.ends_at {
            None => errors.add("ends_at", "The ends at field is required."),
            Some(ends_at) => check_window(&mut errors, self.starts_at(now), ends_at, now),
        }
        errors.into_result()
    }
}

fn check_window(
    errors: &mut ValidationErrors,
    starts_at: DateTime<Utc>,
    ends_at: DateTime<Utc>,
    now: DateTime<Utc>,
) {
    if starts_at < now - START_SKEW {
        errors.add("starts_at", "The start date may not be in the past.");
    }
    if ends_at <= starts_at {
        errors.add("ends_at", "The end date must be after the start date.");
    } else if ends_at - starts_at > Duration::days(MAX_ADVERT_DAYS) {
        errors.add(
            "ends_at",
            format!("An advert may run for at most {} days.", MAX_ADVERT_DAYS),
        );
    }
    if ends_at <= now {
        errors.add("ends_at", "The end date must be in the future.");
    }
}

impl Advert {
    /// Spends one advert from the allowance. Fails rather than going below zero.
    pub async fn consume_allowance(conn: &mut PgConnection, business_id: Uuid) -> AppResult<i32> {
        sqlx::query_scalar::<_, i32>(
            r#"
            UPDATE businesses
            SET adverts_remaining = adverts_remaining - 1, updated_at = NOW()
            WHERE id = $1 AND adverts_remaining > 0
            RETURNING adverts_remaining
            "#,
        )
        .bind(business_id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| {
            AppError::Forbidden("You have no adverts remaining for this billing period.".into())
        })
    }

    pub async fn create(
        conn: &mut PgConnection,
        business_id: Uuid,
        req: &AdvertRequest,
        now: DateTime<Utc>,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Advert>(&format!(
            r#"
            INSERT INTO adverts (id, business_id, title, description, image_url, starts_at, ends_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {ADVERT_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(business_id)
        .bind(req.title.trim())
        .bind(req.description.trim())
        .bind(non_blank(req.image_url.clone()))
        .bind(req.starts_at(now))
        .bind(req.ends_at)
        .fetch_one(conn)
        .await
    }

    pub async fn list_for_business(
        pool: &PgPool,
        business_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Advert>(&format!(
            "SELECT {ADVERT_COLUMNS} FROM adverts WHERE business_id = $1 ORDER BY starts_at DESC"
        ))
        .bind(business_id)
        .fetch_all(pool)
        .await
    }

    pub async fn list_active(
        pool: &PgPool,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<ActiveAdvert>, sqlx::Error> {
        sqlx::query_as::<_, ActiveAdvert>(
            r#"
            SELECT a.id, a.business_id, a.title, a.description, a.image_url,
                   a.starts_at, a.ends_at, a.created_at, b.name AS business_name
            FROM adverts a
            JOIN businesses b ON b.id = a.business_id
            WHERE b.status = 'approved' AND a.starts_at <= $1 AND a.ends_at > $1
            ORDER BY a.starts_at DESC
            LIMIT $2
            "#,
        )
        .bind(now)
        .bind(limit)
        .fetch_all(pool)
        .await
    }

    pub async fn delete(pool: &PgPool, business_id: Uuid, advert_id: Uuid) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM adverts WHERE id = $1 AND business_id = $2")
            .bind(advert_id)
            .bind(business_id)
            .execute(pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Advert not found.".into()));
        }
        Ok(())
    }
}
