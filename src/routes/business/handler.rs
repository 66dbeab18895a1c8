use axum::{
    Extension,
    extract::{Json, Path, Query, State},
    response::IntoResponse,
};
use chrono::Utc;
use uuid::Uuid;

use crate::{
    AppState,
    error::AppResult,
    utils::{
        Claims, PageQuery, Paginated, created, message_to_api_response, success_to_api_response,
    },
};

use super::model::{Business, BusinessListing, BusinessRequest, DirectoryFilter};

pub async fn register_business(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<BusinessRequest>,
) -> AppResult<impl IntoResponse> {
    req.validate()?;
    let business = Business::create(&state.pool, claims.sub, req).await?;

    Ok(created(
        "Business registered and awaiting approval.",
        business,
    ))
}

pub async fn my_business(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> AppResult<impl IntoResponse> {
    let business = Business::require_for_user(&state.pool, claims.sub).await?;
    Ok(success_to_api_response(business))
}

pub async fn update_my_business(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<BusinessRequest>,
) -> AppResult<impl IntoResponse> {
    req.validate()?;
    let business = Business::update_for_user(&state.pool, claims.sub, req).await?;
    Ok(message_to_api_response("Business updated.", business))
}

pub async fn list_businesses(
    State(state): State<AppState>,
    Query(filter): Query<DirectoryFilter>,
    Query(page): Query<PageQuery>,
) -> AppResult<impl IntoResponse> {
    let (rows, total) =
        Business::directory(&state.pool, &filter, page.limit(), page.offset()).await?;
    let (now, grace) = (Utc::now(), state.config.subscription_grace());
    let items = rows
        .into_iter()
        .map(|row| BusinessListing::at(row, now, grace))
        .collect();

    Ok(success_to_api_response(Paginated::new(items, &page, total)))
}

pub async fn show_business(
    State(state): State<AppState>,
    Path(business_id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    let row = Business::find_public(&state.pool, business_id).await?;
    Ok(success_to_api_response(BusinessListing::at(
        row,
        Utc::now(),
        state.config.subscription_grace(),
    )))
}
