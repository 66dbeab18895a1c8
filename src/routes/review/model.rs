use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    validation::ValidationErrors,
};

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Review {
    pub id: Uuid,
    pub business_id: Uuid,
    pub user_id: Uuid,
    pub rating: i16,
    pub comment: String,
    pub status: String,
    pub reply: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A review with the names needed to display or moderate it.
#[derive(Debug, Serialize, FromRow)]
pub struct ReviewWithNames {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub review: Review,
    pub reviewer_name: String,
    pub business_name: String,
}

const REVIEW_COLUMNS: &str = "id, business_id, user_id, rating, comment, status, reply, created_at";

const REVIEW_WITH_NAMES: &str = r#"
    SELECT r.id, r.business_id, r.user_id, r.rating, r.comment, r.status, r.reply, r.created_at,
           u.name AS reviewer_name, b.name AS business_name
    FROM reviews r
    JOIN users u ON u.id = r.user_id
    JOIN businesses b ON b.id = r.business_id
"#;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ReviewRequest {
    pub rating: Option<i16>,
    pub comment: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ReplyRequest {
    pub reply: String,
}

impl ReviewRequest {
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        match self.rating {
            Some(1..=5) => {}
            Some(_) => errors.add("rating", "The rating must be between 1 and 5."),
            None => errors.add("rating", "The rating field is required."),
        }
        if errors.required("comment", &self.comment) {
            errors.length("comment", &self.comment, 10, 1000);
        }
        errors.into_result()
    }
}

impl ReplyRequest {
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if errors.required("reply", &self.reply) {
            errors.length("reply", &self.reply, 2, 1000);
        }
        errors.into_result()
    }
}

impl Review {
    pub async fn create(
        pool: &PgPool,
        business_id: Uuid,
        user_id: Uuid,
        req: &ReviewRequest,
    ) -> AppResult<Self> {
        let result = sqlx::query_as::<_, Review>(&format!(
            r#"
            INSERT INTO reviews (id, business_id, user_id, rating, comment)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {REVIEW_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(business_id)
        .bind(user_id)
        .bind(req.rating.unwrap_or_default())
        .bind(req.comment.trim())
        .fetch_one(pool)
        .await;

        match result {
            Ok(review) => Ok(review),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(AppError::invalid(
                "review",
                "You have already reviewed this business.",
            )),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Review>(&format!(
            "SELECT {REVIEW_COLUMNS} FROM reviews WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    pub async fn list_approved(
        pool: &PgPool,
        business_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<ReviewWithNames>, i64), sqlx::Error> {
        let sql = format!(
            r#"
            {REVIEW_WITH_NAMES}
            WHERE r.business_id = $1 AND r.status = 'approved'
            ORDER BY r.created_at DESC
            LIMIT $2 OFFSET $3
            "#
        );
        let reviews = sqlx::query_as::<_, ReviewWithNames>(&sql)
            .bind(business_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool);
        let total = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM reviews WHERE business_id = $1 AND status = 'approved'",
        )
        .bind(business_id)
        .fetch_one(pool);

        futures_util::try_join!(reviews, total)
    }

    pub async fn list_by_status(
        pool: &PgPool,
        status: &str,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<ReviewWithNames>, i64), sqlx::Error> {
        let reviews = sqlx::query_as::<_, ReviewWithNames>(&format!(
            r#"
            {REVIEW_WITH_NAMES}
            WHERE r.status = $1
            ORDER BY r.created_at ASC
            LIMIT $2 OFFSET $3
            "#
        ))
        .bind(status)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?;

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM reviews WHERE status = $1")
            .bind(status)
            .fetch_one(pool)
            .await?;

        Ok((reviews, total))
    }

    pub async fn set_status(pool: &PgPool, id: Uuid, status: &str) -> AppResult<Self> {
        sqlx::query_as::<_, Review>(&format!(
            "UPDATE reviews SET status = $2 WHERE id = $1 RETURNING {REVIEW_COLUMNS}"
        ))
        .bind(id)
        .bind(status)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Review not found.".into()))
    }

    pub async fn set_reply(pool: &PgPool, id: Uuid, reply: &str) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Review>(&format!(
            "UPDATE reviews SET reply = $2 WHERE id = $1 RETURNING {REVIEW_COLUMNS}"
        ))
        .bind(id)
        .bind(reply.trim())
        .fetch_one(pool)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rating_must_be_one_to_five() {
        for rating in [0, 6, -1] {
            let req = ReviewRequest {
                rating: Some(rating),
                comment: "Friendly staff and great coffee.".into(),
            };
            assert!(req.validate().unwrap_err().has("rating"), "accepted {rating}");
        }

        let req = ReviewRequest {
            rating: Some(5),
            comment: "Friendly staff and great coffee.".into(),
        };
        assert!(req.validate().is_ok());
    }

    #[test]
    fn comment_needs_some_substance() {
        let req = ReviewRequest {
            rating: Some(4),
            comment: "ok".into(),
        };
        assert!(req.validate().unwrap_err().has("comment"));
    }

    #[test]
    fn missing_rating_is_reported() {
        let errors = ReviewRequest::default().validate().unwrap_err();
        assert!(errors.has("rating"));
        assert!(errors.has("comment"));
    }
}
