use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    validation::{ValidationErrors, non_blank},
};

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Product {
    pub id: Uuid,
    pub business_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub price_cents: i64,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const PRODUCT_COLUMNS: &str =
    "id, business_id, name, description, price_cents, image_url, created_at, updated_at";

const MAX_PRICE_CENTS: i64 = 100_000_000;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ProductRequest {
    pub name: String,
    pub description: Option<String>,
    /// Rand amount, e.g. `49.99`.
    pub price: Option<f64>,
    pub image_url: Option<String>,
}

impl ProductRequest {
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if errors.required("name", &self.name) {
            errors.length("name", &self.name, 2, 150);
        }
        if let Some(description) = &self.description {
            errors.max_length("description", description, 2000);
        }
        match self.price_cents() {
            None => errors.add("price", "The price field is required."),
            Some(cents) if !(0..=MAX_PRICE_CENTS).contains(&cents) => {
                errors.add("price", "The price must be between 0 and 1000000.")
            }
            Some(_) => {}
        }
        errors.optional_url("image_url", self.image_url.as_deref());
        errors.into_result()
    }

    pub fn price_cents(&self) -> Option<i64> {
        self.price
            .filter(|p| p.is_finite())
            .map(|p| (p * 100.0).round() as i64)
    }
}

impl Product {
    pub async fn list_for_business(
        pool: &PgPool,
        business_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Product>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE business_id = $1 ORDER BY name ASC"
        ))
        .bind(business_id)
        .fetch_all(pool)
        .await
    }

    pub async fn count_for_business(
        conn: &mut PgConnection,
        business_id: Uuid,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM products WHERE business_id = $1")
            .bind(business_id)
            .fetch_one(conn)
            .await
    }

    pub async fn create(
        conn: &mut PgConnection,
        business_id: Uuid,
        req: &ProductRequest,
    ) -> AppResult<Self> {
        let product = sqlx::query_as::<_, Product>(&format!(
            r#"
            INSERT INTO products (id, business_id, name, description, price_cents, image_url)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {PRODUCT_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(business_id)
        .bind(req.name.trim())
        .bind(non_blank(req.description.clone()))
        .bind(req.price_cents().unwrap_or_default())
        .bind(non_blank(req.image_url.clone()))
        .fetch_one(conn)
        .await?;

        Ok(product)
    }

    pub async fn update(
        pool: &PgPool,
        business_id: Uuid,
        product_id: Uuid,
        req: &ProductRequest,
    ) -> AppResult<Self> {
        sqlx::query_as::<_, Product>(&format!(
            r#"
            UPDATE products
            SET name = $3, description = $4, price_cents = $5, image_url = $6, updated_at = NOW()
            WHERE id = $1 AND business_id = $2
            RETURNING {PRODUCT_COLUMNS}
            "#
        ))
        .bind(product_id)
        .bind(business_id)
        .bind(req.name.trim())
        .bind(non_blank(req.description.clone()))
        .bind(req.price_cents().unwrap_or_default())
        .bind(non_blank(req.image_url.clone()))
        .fetch_optional(pool)
        .await?
        .ok_or_else(not_found)
    }

    pub async fn delete(pool: &PgPool, business_id: Uuid, product_id: Uuid) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM products WHERE id = $1 AND business_id = $2")
            .bind(product_id)
            .bind(business_id)
            .execute(pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(not_found());
        }
        Ok(())
    }
}

fn not_found() -> AppError {
    AppError::NotFound("Product not found.".into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn price_converts_to_cents() {
        let req = ProductRequest {
            price: Some(49.99),
            ..Default::default()
        };
        assert_eq!(req.price_cents(), Some(4999));
    }

    #[test]
    fn price_is_required_and_non_negative() {
        let missing = ProductRequest {
            name: "Espresso beans 1kg".into(),
            ..Default::default()
        };
        assert!(missing.validate().unwrap_err().has("price"));

        let negative = ProductRequest {
            name: "Espresso beans 1kg".into(),
            price: Some(-1.0),
            ..Default::default()
        };
        assert!(negative.validate().unwrap_err().has("price"));
    }

    #[test]
    fn free_products_are_allowed() {
        let req = ProductRequest {
            name: "Tasting session".into(),
            price: Some(0.0),
            ..Default::default()
        };
        assert!(req.validate().is_ok());
    }
}
