use axum::{
    Extension,
    extract::{Json, Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::{
    AppState,
    cache::{CachedSession, LoginAttempts, LoginThrottle, SessionCacheOperations},
    error::{AppError, AppResult},
    routes::business::model::Business,
    utils::{
        Claims, created, generate_token, hash_password, message_to_api_response,
        success_to_api_response, verify_password,
    },
};

use super::model::{
    AuthResponse, ChangePasswordRequest, ClientContext, LoginRequest, MeResponse,
    RegisterRequest, RevokedSessions, SessionInfo, User,
};

/// Issues a token and records its session.
async fn start_session(
    state: &AppState,
    user: User,
    client: ClientContext,
) -> AppResult<AuthResponse> {
    let issued = generate_token(user.id, &user.role, &state.config)?;

    SessionCacheOperations::store_session(
        &state.redis,
        &CachedSession {
            session_id: issued.session_id,
            user_id: user.id,
            user_agent: client.user_agent,
            ip_address: client.ip_address,
            created_at: chrono::Utc::now().timestamp(),
            expires_at: issued.expires_at,
        },
    )
    .await?;

    Ok(AuthResponse {
        user,
        token: issued.token,
        expires_at: issued.expires_at,
    })
}

pub async fn register(
    State(state): State<AppState>,
    client: ClientContext,
    Json(req): Json<RegisterRequest>,
) -> AppResult<impl IntoResponse> {
    req.validate()?;

    let password_hash = hash_password(&req.password)?;
    let user = User::create(&state.pool, &req.name, &req.email, &password_hash).await?;
    let auth = start_session(&state, user, client).await?;

    Ok(created("Registration successful.", auth))
}

pub async fn login(
    State(state): State<AppState>,
    client: ClientContext,
    Json(req): Json<LoginRequest>,
) -> AppResult<impl IntoResponse> {
    req.validate()?;

    let throttle = LoginThrottle::from_config(&state.config);
    let (failures, retry_in) = LoginAttempts::failures(&state.redis, &req.email).await?;
    if throttle.is_locked(failures) {
        return Err(locked_out(retry_in));
    }

    let user = User::find_by_email(&state.pool, &req.email).await?;
    let verified = match &user {
        Some(user) => verify_password(&req.password, &user.password_hash)?,
        None => false,
    };

    let user = match user {
        Some(user) if verified => user,
        _ => {
            let failures =
                LoginAttempts::record_failure(&state.redis, &req.email, &throttle).await?;
            tracing::info!("Failed login attempt {} for {}", failures, req.email);
            if throttle.is_locked(failures) {
                return Err(locked_out(throttle.window.as_secs()));
            }
            return Err(AppError::Unauthorized(format!(
                "These credentials do not match our records. {} attempt(s) remaining.",
                throttle.attempts_left(failures)
            )));
        }
    };

    if user.is_suspended() {
        return Err(AppError::Forbidden("This account has been suspended.".into()));
    }

    LoginAttempts::clear(&state.redis, &req.email).await?;
    let auth = start_session(&state, user, client).await?;

    Ok(message_to_api_response("Login successful.", auth))
}

fn locked_out(retry_in: u64) -> AppError {
    AppError::TooManyRequests(format!(
        "Too many login attempts. Please try again in {} seconds.",
        retry_in
    ))
}

pub async fn logout(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> AppResult<impl IntoResponse> {
    SessionCacheOperations::remove_session(&state.redis, claims.sub, &claims.jti).await?;
    Ok(message_to_api_response("Logged out.", ()))
}

pub async fn logout_others(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> AppResult<impl IntoResponse> {
    let revoked =
        SessionCacheOperations::remove_user_sessions(&state.redis, claims.sub, Some(&claims.jti))
            .await?;
    Ok(message_to_api_response(
        "Other sessions logged out.",
        RevokedSessions { revoked },
    ))
}

pub async fn me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> AppResult<impl IntoResponse> {
    let user = User::find_by_id(&state.pool, claims.sub)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found.".into()))?;
    let business_id = Business::find_by_user(&state.pool, user.id)
        .await?
        .map(|b| b.id);

    Ok(success_to_api_response(MeResponse { user, business_id }))
}

pub async fn change_password(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ChangePasswordRequest>,
) -> AppResult<impl IntoResponse> {
    req.validate()?;

    let user = User::find_by_id(&state.pool, claims.sub)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found.".into()))?;
    if !verify_password(&req.current_password, &user.password_hash)? {
        return Err(AppError::invalid(
            "current_password",
            "The current password is incorrect.",
        ));
    }

    let password_hash = hash_password(&req.password)?;
    User::update_password(&state.pool, user.id, &password_hash).await?;
    let revoked =
        SessionCacheOperations::remove_user_sessions(&state.redis, user.id, Some(&claims.jti))
            .await?;

    Ok(message_to_api_response(
        "Password updated.",
        RevokedSessions { revoked },
    ))
}

pub async fn list_sessions(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> AppResult<impl IntoResponse> {
    let sessions = SessionCacheOperations::get_user_sessions(&state.redis, claims.sub)
        .await?
        .into_iter()
        .map(|s| SessionInfo {
            current: s.session_id == claims.jti,
            id: s.session_id,
            user_agent: s.user_agent,
            ip_address: s.ip_address,
            created_at: s.created_at,
            expires_at: s.expires_at,
        })
        .collect::<Vec<_>>();

    Ok(success_to_api_response(sessions))
}

pub async fn revoke_session(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(session_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    match SessionCacheOperations::get_session(&state.redis, &session_id).await? {
        Some(session) if session.user_id == claims.sub => {
            SessionCacheOperations::remove_session(&state.redis, claims.sub, &session_id).await?;
            Ok((StatusCode::OK, message_to_api_response("Session revoked.", ())))
        }
        _ => Err(AppError::NotFound("Session not found.".into())),
    }
}
