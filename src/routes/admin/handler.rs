use axum::{
    Extension,
    extract::{Json, Path, Query, State},
    response::IntoResponse,
};
use uuid::Uuid;

use crate::{
    AppState,
    cache::SessionCacheOperations,
    error::{AppError, AppResult},
    routes::{auth::model::User, business::model::Business, review::model::Review},
    utils::{Claims, PageQuery, Paginated, message_to_api_response, success_to_api_response},
};

use super::model::{RejectRequest, StatusQuery, UserQuery};

pub async fn list_businesses(
    State(state): State<AppState>,
    Query(filter): Query<StatusQuery>,
    Query(page): Query<PageQuery>,
) -> AppResult<impl IntoResponse> {
    let status = filter.status()?;
    let (businesses, total) =
        Business::list_by_status(&state.pool, status, page.limit(), page.offset()).await?;
    Ok(success_to_api_response(Paginated::new(businesses, &page, total)))
}

pub async fn approve_business(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(business_id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    let business = Business::set_status(&state.pool, business_id, "approved", None).await?;
    tracing::info!("Admin {} approved business {}", claims.sub, business.id);
    Ok(message_to_api_response("Business approved.", business))
}

pub async fn reject_business(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(business_id): Path<Uuid>,
    Json(req): Json<RejectRequest>,
) -> AppResult<impl IntoResponse> {
    req.validate()?;
    let business =
        Business::set_status(&state.pool, business_id, "rejected", Some(req.reason.trim())).await?;
    tracing::info!("Admin {} rejected business {}", claims.sub, business.id);
    Ok(message_to_api_response("Business rejected.", business))
}

pub async fn list_reviews(
    State(state): State<AppState>,
    Query(filter): Query<StatusQuery>,
    Query(page): Query<PageQuery>,
) -> AppResult<impl IntoResponse> {
    let status = filter.status()?;
    let (reviews, total) =
        Review::list_by_status(&state.pool, status, page.limit(), page.offset()).await?;
    Ok(success_to_api_response(Paginated::new(reviews, &page, total)))
}

pub async fn approve_review(
    State(state): State<AppState>,
    Path(review_id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    let review = Review::set_status(&state.pool, review_id, "approved").await?;
    Ok(message_to_api_response("Review approved.", review))
}

pub async fn reject_review(
    State(state): State<AppState>,
    Path(review_id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    let review = Review::set_status(&state.pool, review_id, "rejected").await?;
    Ok(message_to_api_response("Review rejected.", review))
}

pub async fn list_users(
    State(state): State<AppState>,
    Query(filter): Query<UserQuery>,
    Query(page): Query<PageQuery>,
) -> AppResult<impl IntoResponse> {
    let search = filter.search.as_deref().filter(|s| !s.trim().is_empty());
    let (users, total) = User::list(&state.pool, search, page.limit(), page.offset()).await?;
    Ok(success_to_api_response(Paginated::new(users, &page, total)))
}

/// Suspension also signs the user out everywhere.
pub async fn suspend_user(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(user_id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    if user_id == claims.sub {
        return Err(AppError::invalid("user", "You cannot suspend your own account."));
    }

    let user = User::set_status(&state.pool, user_id, "suspended").await?;
    let revoked = SessionCacheOperations::remove_user_sessions(&state.redis, user.id, None).await?;
    tracing::info!(
        "Admin {} suspended user {} ({} sessions revoked)",
        claims.sub,
        user.id,
        revoked
    );
    Ok(message_to_api_response("User suspended.", user))
}

pub async fn activate_user(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(user_id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    let user = User::set_status(&state.pool, user_id, "active").await?;
    tracing::info!("Admin {} reactivated user {}", claims.sub, user.id);
    Ok(message_to_api_response("User activated.", user))
}
