use axum::{
    Extension,
    extract::{Json, Path, State},
    response::IntoResponse,
};
use chrono::Utc;
use uuid::Uuid;

use crate::{
    AppState,
    billing::PackageTier,
    error::{AppError, AppResult},
    routes::business::model::Business,
    utils::{Claims, created, message_to_api_response, success_to_api_response},
};

use super::model::{Product, ProductRequest};

/// The business's effective tier, if it includes product listings.
fn require_products(state: &AppState, business: &Business) -> AppResult<PackageTier> {
    let tier = business.effective_tier(Utc::now(), state.config.subscription_grace());
    if tier.features().products {
        Ok(tier)
    } else {
        Err(AppError::Forbidden(format!(
            "Product listings are available on the Silver and Gold packages. Your business is on {}.",
            tier
        )))
    }
}

pub async fn list_my_products(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> AppResult<impl IntoResponse> {
    let business = Business::require_for_user(&state.pool, claims.sub).await?;
    let products = Product::list_for_business(&state.pool, business.id).await?;
    Ok(success_to_api_response(products))
}

pub async fn create_product(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ProductRequest>,
) -> AppResult<impl IntoResponse> {
    req.validate()?;
    let business = Business::require_for_user(&state.pool, claims.sub).await?;
    let tier = require_products(&state, &business)?;

    // The business row lock serializes concurrent creates against the limit.
    let mut tx = state.pool.begin().await?;
    sqlx::query("SELECT id FROM businesses WHERE id = $1 FOR UPDATE")
        .bind(business.id)
        .execute(&mut *tx)
        .await?;

    let count = Product::count_for_business(&mut tx, business.id).await?;
    if !tier.allows_another_product(count) {
        let limit = tier.features().product_limit.unwrap_or_default();
        return Err(AppError::Forbidden(format!(
            "Your {} package allows up to {} products.",
            tier, limit
        )));
    }

    let product = Product::create(&mut tx, business.id, &req).await?;
    tx.commit().await?;

    tracing::info!("Business {} added product {}", business.id, product.id);
    Ok(created("Product created.", product))
}

pub async fn update_product(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(product_id): Path<Uuid>,
    Json(req): Json<ProductRequest>,
) -> AppResult<impl IntoResponse> {
    req.validate()?;
    let business = Business::require_for_user(&state.pool, claims.sub).await?;
    require_products(&state, &business)?;

    let product = Product::update(&state.pool, business.id, product_id, &req).await?;
    Ok(message_to_api_response("Product updated.", product))
}

pub async fn delete_product(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(product_id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    let business = Business::require_for_user(&state.pool, claims.sub).await?;
    require_products(&state, &business)?;

    Product::delete(&state.pool, business.id, product_id).await?;
    Ok(message_to_api_response("Product deleted.", ()))
}

/// Public catalogue; empty unless the business is approved and its tier lists products.
pub async fn business_products(
    State(state): State<AppState>,
    Path(business_id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    let products = match Business::find_by_id(&state.pool, business_id).await? {
        Some(b)
            if b.is_approved()
                && b.effective_tier(Utc::now(), state.config.subscription_grace())
                    .features()
                    .products =>
        {
            Product::list_for_business(&state.pool, b.id).await?
        }
        _ => Vec::new(),
    };
    Ok(success_to_api_response(products))
}
