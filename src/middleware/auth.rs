use axum::{
    body::Body,
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};

use crate::{
    AppState,
    cache::SessionCacheOperations,
    error::AppError,
    utils::{Claims, verify_token},
};

/// Validates the bearer token and its session, then exposes the `Claims` as
/// a request extension.
pub async fn auth_middleware(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let (mut parts, body) = req.into_parts();
    let claims = authenticate(&state, &mut parts).await?;

    parts.extensions.insert(claims);
    Ok(next.run(Request::from_parts(parts, body)).await)
}

async fn authenticate(state: &AppState, parts: &mut Parts) -> Result<Claims, AppError> {
    let TypedHeader(Authorization(bearer)) =
        TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
            .await
            .map_err(|_| AppError::Unauthorized("Unauthenticated.".into()))?;

    let claims = verify_token(bearer.token(), &state.config).map_err(|e| {
        tracing::debug!("Rejected token: {}", e);
        AppError::Unauthorized("Unauthenticated.".into())
    })?;

    // A token is only good while its session exists.
    let session = SessionCacheOperations::get_session(&state.redis, &claims.jti).await?;
    match session {
        Some(session) if session.user_id == claims.sub => Ok(claims),
        _ => Err(AppError::Unauthorized("Session expired or revoked.".into())),
    }
}

/// Must run inside `auth_middleware`.
pub async fn admin_middleware(req: Request<Body>, next: Next) -> Result<Response, AppError> {
    match req.extensions().get::<Claims>() {
        Some(claims) if claims.is_admin() => Ok(next.run(req).await),
        Some(_) => Err(AppError::Forbidden(
            "This action is restricted to administrators.".into(),
        )),
        None => Err(AppError::Unauthorized("Unauthenticated.".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Extension, Router, http::StatusCode, routing::get};
    use tower::ServiceExt;
    use uuid::Uuid;

    fn claims(role: &str) -> Claims {
        Claims {
            sub: Uuid::new_v4(),
            jti: Uuid::new_v4().to_string(),
            role: role.into(),
            exp: 0,
            iat: 0,
        }
    }

    fn admin_app(claims: Option<Claims>) -> Router {
        let router = Router::new()
            .route("/admin", get(|| async { "ok" }))
            .layer(axum::middleware::from_fn(admin_middleware));
        match claims {
            Some(c) => router.layer(Extension(c)),
            None => router,
        }
    }

    async fn status_of(app: Router) -> StatusCode {
        let req = Request::builder().uri("/admin").body(Body::empty()).unwrap();
        app.oneshot(req).await.unwrap().status()
    }

    #[tokio::test]
    async fn admin_guard_lets_admins_through() {
        assert_eq!(status_of(admin_app(Some(claims("admin")))).await, StatusCode::OK);
    }

    #[tokio::test]
    async fn admin_guard_forbids_regular_users() {
        assert_eq!(
            status_of(admin_app(Some(claims("user")))).await,
            StatusCode::FORBIDDEN
        );
    }

    #[tokio::test]
    async fn admin_guard_without_claims_is_unauthenticated() {
        assert_eq!(status_of(admin_app(None)).await, StatusCode::UNAUTHORIZED);
    }
}
