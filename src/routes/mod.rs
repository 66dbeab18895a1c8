pub mod admin;
pub mod advert;
pub mod auth;
pub mod business;
pub mod package;
pub mod payment;
pub mod product;
pub mod review;

use axum::{
    Router,
    middleware::{from_fn, from_fn_with_state},
    routing::{delete, get, post, put},
};

use crate::{
    AppState,
    middleware::{admin_middleware, auth_middleware},
};

/// All API routes under `api_base_uri`, with authentication applied per group.
/// Rate limiting, error logging and CORS are layered on by the binary.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/packages", get(package::list_packages))
        .route("/businesses", get(business::list_businesses))
        .route("/businesses/{id}", get(business::show_business))
        .route("/businesses/{id}/products", get(product::business_products))
        .route("/businesses/{id}/reviews", get(review::business_reviews))
        .route("/adverts", get(advert::active_adverts))
        .route("/payfast/notify", post(payment::payfast_notify));

    let protected_routes = Router::new()
        .route("/auth/logout", post(auth::logout))
        .route("/auth/logout-others", post(auth::logout_others))
        .route("/auth/me", get(auth::me))
        .route("/auth/password", put(auth::change_password))
        .route("/auth/sessions", get(auth::list_sessions))
        .route("/auth/sessions/{id}", delete(auth::revoke_session))
        .route("/packages/upgrade", post(package::upgrade_package))
        .route(
            "/packages/downgrade",
            post(package::downgrade_package).delete(package::cancel_downgrade),
        )
        .route("/packages/renew", post(package::renew_package))
        .route("/businesses/register", post(business::register_business))
        .route(
            "/businesses/mine",
            get(business::my_business).put(business::update_my_business),
        )
        .route("/businesses/{id}/reviews", post(review::create_review))
        .route(
            "/products",
            get(product::list_my_products).post(product::create_product),
        )
        .route(
            "/products/{id}",
            put(product::update_product).delete(product::delete_product),
        )
        .route(
            "/adverts/mine",
            get(advert::list_my_adverts).post(advert::create_advert),
        )
        .route("/adverts/{id}", delete(advert::delete_advert))
        .route("/reviews/{id}/reply", put(review::reply_to_review))
        .route("/payments", get(payment::list_my_payments))
        .route("/payments/{id}", get(payment::show_payment))
        .route("/payments/{id}/cancel", post(payment::cancel_payment))
        .layer(from_fn_with_state(state.clone(), auth_middleware));

    let admin_routes = Router::new()
        .route("/admin/businesses", get(admin::list_businesses))
        .route("/admin/businesses/{id}/approve", post(admin::approve_business))
        .route("/admin/businesses/{id}/reject", post(admin::reject_business))
        .route("/admin/reviews", get(admin::list_reviews))
        .route("/admin/reviews/{id}/approve", post(admin::approve_review))
        .route("/admin/reviews/{id}/reject", post(admin::reject_review))
        .route("/admin/users", get(admin::list_users))
        .route("/admin/users/{id}/suspend", post(admin::suspend_user))
        .route("/admin/users/{id}/activate", post(admin::activate_user))
        .layer(from_fn(admin_middleware))
        .layer(from_fn_with_state(state.clone(), auth_middleware));

    let api = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(admin_routes);

    let base = state.config.api_base_uri.trim_end_matches('/').to_string();
    let router = if base.is_empty() {
        api
    } else {
        Router::new().nest(&base, api)
    };

    router.with_state(state)
}
