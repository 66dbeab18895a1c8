use axum::{
    Extension,
    extract::{Json, Path, Query, State},
    response::IntoResponse,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    AppState,
    error::{AppError, AppResult},
    routes::business::model::Business,
    utils::{Claims, MAX_PER_PAGE, created, message_to_api_response, success_to_api_response},
};

use super::model::{Advert, AdvertRequest};

#[derive(Debug, Deserialize)]
pub struct ActiveQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct CreatedAdvert {
    pub advert: Advert,
    pub adverts_remaining: i32,
}

pub async fn create_advert(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<AdvertRequest>,
) -> AppResult<impl IntoResponse> {
    let now = Utc::now();
    req.validate(now)?;

    let business = Business::require_for_user(&state.pool, claims.sub).await?;
    let tier = business.effective_tier(now, state.config.subscription_grace());
    if tier.features().adverts_per_period == 0 {
        return Err(AppError::Forbidden(format!(
            "Adverts are available on the Silver and Gold packages. Your business is on {}.",
            tier
        )));
    }
    if !business.is_approved() {
        return Err(AppError::Forbidden(
            "Your business must be approved before it can advertise.".into(),
        ));
    }

    let mut tx = state.pool.begin().await?;
    let adverts_remaining = Advert::consume_allowance(&mut tx, business.id).await?;
    let advert = Advert::create(&mut tx, business.id, &req, now).await?;
    tx.commit().await?;

    tracing::info!(
        "Business {} created advert {} ({} left this period)",
        business.id,
        advert.id,
        adverts_remaining
    );
    Ok(created(
        "Advert created.",
        CreatedAdvert {
            advert,
            adverts_remaining,
        },
    ))
}

pub async fn list_my_adverts(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> AppResult<impl IntoResponse> {
    let business = Business::require_for_user(&state.pool, claims.sub).await?;
    let adverts = Advert::list_for_business(&state.pool, business.id).await?;
    Ok(success_to_api_response(adverts))
}

/// Deleting does not give the advert back to the allowance.
pub async fn delete_advert(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(advert_id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    let business = Business::require_for_user(&state.pool, claims.sub).await?;
    Advert::delete(&state.pool, business.id, advert_id).await?;
    Ok(message_to_api_response("Advert deleted.", ()))
}

pub async fn active_adverts(
    State(state): State<AppState>,
    Query(query): Query<ActiveQuery>,
) -> AppResult<impl IntoResponse> {
    let limit = query.limit.unwrap_or(20).clamp(1, MAX_PER_PAGE as i64);
    let adverts = Advert::list_active(&state.pool, Utc::now(), limit).await?;
    Ok(success_to_api_response(adverts))
}
