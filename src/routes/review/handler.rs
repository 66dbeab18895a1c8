use axum::{
    Extension,
    extract::{Json, Path, Query, State},
    response::IntoResponse,
};
use chrono::Utc;
use uuid::Uuid;

use crate::{
    AppState,
    error::{AppError, AppResult},
    routes::business::model::Business,
    utils::{Claims, PageQuery, Paginated, created, message_to_api_response, success_to_api_response},
};

use super::model::{ReplyRequest, Review, ReviewRequest};

pub async fn create_review(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(business_id): Path<Uuid>,
    Json(req): Json<ReviewRequest>,
) -> AppResult<impl IntoResponse> {
    req.validate()?;

    let business = Business::find_by_id(&state.pool, business_id)
        .await?
        .filter(Business::is_approved)
        .ok_or_else(|| AppError::NotFound("Business not found.".into()))?;
    if business.user_id == claims.sub {
        return Err(AppError::Forbidden(
            "You cannot review your own business.".into(),
        ));
    }

    let review = Review::create(&state.pool, business.id, claims.sub, &req).await?;
    tracing::info!("User {} reviewed business {}", claims.sub, business.id);

    Ok(created(
        "Thank you! Your review will appear once it has been approved.",
        review,
    ))
}

pub async fn business_reviews(
    State(state): State<AppState>,
    Path(business_id): Path<Uuid>,
    Query(page): Query<PageQuery>,
) -> AppResult<impl IntoResponse> {
    let (reviews, total) =
        Review::list_approved(&state.pool, business_id, page.limit(), page.offset()).await?;
    Ok(success_to_api_response(Paginated::new(reviews, &page, total)))
}

/// Owners on a tier with social features may answer published reviews.
pub async fn reply_to_review(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(review_id): Path<Uuid>,
    Json(req): Json<ReplyRequest>,
) -> AppResult<impl IntoResponse> {
    req.validate()?;

    let business = Business::require_for_user(&state.pool, claims.sub).await?;
    let review = Review::find_by_id(&state.pool, review_id)
        .await?
        .filter(|r| r.business_id == business.id && r.status == "approved")
        .ok_or_else(|| AppError::NotFound("Review not found.".into()))?;

    let tier = business.effective_tier(Utc::now(), state.config.subscription_grace());
    if !tier.features().social {
        return Err(AppError::Forbidden(format!(
            "Replying to reviews is available on the Gold package. Your business is on {}.",
            tier
        )));
    }

    let review = Review::set_reply(&state.pool, review.id, &req.reply).await?;
    Ok(message_to_api_response("Reply saved.", review))
}
