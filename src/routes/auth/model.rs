use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::{header::USER_AGENT, request::Parts},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    middleware::client_ip,
    utils::escape_like,
    validation::ValidationErrors,
};

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn is_suspended(&self) -> bool {
        self.status == "suspended"
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub password_confirmation: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub password: String,
    pub password_confirmation: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: User,
    pub token: String,
    pub expires_at: i64,
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub user: User,
    pub business_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct SessionInfo {
    pub id: String,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub created_at: i64,
    pub expires_at: i64,
    pub current: bool,
}

#[derive(Debug, Serialize)]
pub struct RevokedSessions {
    pub revoked: usize,
}

/// Bounds in characters. bcrypt only reads the first 72 bytes, so long
/// multi-byte passwords are hashed on their prefix.
pub const PASSWORD_MIN: usize = 8;
pub const PASSWORD_MAX: usize = 72;

fn validate_new_password(errors: &mut ValidationErrors, password: &str, confirmation: &str) {
    if errors.required("password", password) {
        let len = password.chars().count();
        if !(PASSWORD_MIN..=PASSWORD_MAX).contains(&len) {
            errors.add(
                "password",
                format!(
                    "The password must be between {} and {} characters.",
                    PASSWORD_MIN, PASSWORD_MAX
                ),
            );
        } else if password != confirmation {
            errors.add("password", "The password confirmation does not match.");
        }
    }
}

impl RegisterRequest {
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if errors.required("name", &self.name) {
            errors.length("name", &self.name, 2, 100);
        }
        if errors.required("email", &self.email) {
            errors.email("email", &self.email);
        }
        validate_new_password(&mut errors, &self.password, &self.password_confirmation);
        errors.into_result()
    }
}

impl LoginRequest {
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        errors.required("email", &self.email);
        errors.required("password", &self.password);
        errors.into_result()
    }
}

impl ChangePasswordRequest {
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        errors.required("current_password", &self.current_password);
        validate_new_password(&mut errors, &self.password, &self.password_confirmation);
        errors.into_result()
    }
}

/// Where a request came from, recorded on new sessions.
#[derive(Debug, Clone, Default)]
pub struct ClientContext {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl<S: Send + Sync> FromRequestParts<S> for ClientContext {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ci| ci.0);
        Ok(ClientContext {
            ip_address: client_ip(&parts.headers, peer),
            user_agent: parts
                .headers
                .get(USER_AGENT)
                .and_then(|h| h.to_str().ok())
                .map(|ua| ua.chars().take(255).collect()),
        })
    }
}

const USER_COLUMNS: &str = "id, name, email, password_hash, role, status, created_at";

impl User {
    pub async fn create(
        pool: &PgPool,
        name: &str,
        email: &str,
        password_hash: &str,
    ) -> AppResult<Self> {
        let result = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (id, name, email, password_hash)
            VALUES ($1, $2, $3, $4)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(name.trim())
        .bind(email.trim().to_lowercase())
        .bind(password_hash)
        .fetch_one(pool)
        .await;

        match result {
            Ok(user) => {
                tracing::info!("Registered user {}", user.id);
                Ok(user)
            }
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(AppError::invalid(
                "email",
                "The email has already been taken.",
            )),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn find_by_email(pool: &PgPool, email: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email.trim().to_lowercase())
        .fetch_optional(pool)
        .await
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn update_password(
        pool: &PgPool,
        id: Uuid,
        password_hash: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE users SET password_hash = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(password_hash)
            .execute(pool)
            .await?;
        Ok(())
    }

    pub async fn set_status(pool: &PgPool, id: Uuid, status: &str) -> AppResult<Self> {
        sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users SET status = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(status)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found.".into()))
    }

    pub async fn list(
        pool: &PgPool,
        search: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Self>, i64), sqlx::Error> {
        let pattern = search.map(|s| format!("%{}%", escape_like(s.trim())));

        let users = sqlx::query_as::<_, User>(&format!(
            r#"
            SELECT {USER_COLUMNS} FROM users
            WHERE ($1::TEXT IS NULL OR name ILIKE $1 ESCAPE '\' OR email ILIKE $1 ESCAPE '\')
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#
        ))
        .bind(&pattern)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?;

        let total: i64 = sqlx::query_scalar(
            r"SELECT COUNT(*) FROM users WHERE ($1::TEXT IS NULL OR name ILIKE $1 ESCAPE '\' OR email ILIKE $1 ESCAPE '\')",
        )
        .bind(&pattern)
        .fetch_one(pool)
        .await?;

        Ok((users, total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn register(password: &str, confirmation: &str) -> RegisterRequest {
        RegisterRequest {
            name: "Sipho Dlamini".into(),
            email: "sipho@example.co.za".into(),
            password: password.into(),
            password_confirmation: confirmation.into(),
        }
    }

    #[test]
    fn valid_registration_passes() {
        assert!(register("s3cure-pass", "s3cure-pass").validate().is_ok());
    }

    #[test]
    fn short_password_is_rejected() {
        let errors = register("short", "short").validate().unwrap_err();
        assert!(errors.has("password"));
    }

    #[test]
    fn password_length_counts_characters() {
        let accented = "é".repeat(40);
        assert!(register(&accented, &accented).validate().is_ok());

        let too_long = "é".repeat(PASSWORD_MAX + 1);
        assert!(register(&too_long, &too_long).validate().unwrap_err().has("password"));
    }

    #[test]
    fn password_confirmation_must_match() {
        let errors = register("s3cure-pass", "s3cure-pasS").validate().unwrap_err();
        assert_eq!(
            errors.first_message(),
            Some("The password confirmation does not match.")
        );
    }

    #[test]
    fn empty_registration_reports_every_field() {
        let errors = RegisterRequest::default().validate().unwrap_err();
        for field in ["name", "email", "password"] {
            assert!(errors.has(field), "missing error for {field}");
        }
    }

    #[test]
    fn change_password_needs_current_password() {
        let req = ChangePasswordRequest {
            current_password: String::new(),
            password: "new-password".into(),
            password_confirmation: "new-password".into(),
        };
        assert!(req.validate().unwrap_err().has("current_password"));
    }
}
