use axum::{
    Extension,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use chrono::Utc;
use uuid::Uuid;

use crate::{
    AppState,
    billing::apply_paid_change,
    error::{AppError, AppResult},
    payfast::{ItnNotification, ItnStatus, confirm_with_gateway},
    routes::business::model::Business,
    utils::{Claims, PageQuery, Paginated, message_to_api_response, success_to_api_response},
};

use super::model::{COMPLETED, FAILED, Payment, itn_transition};

pub async fn list_my_payments(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(page): Query<PageQuery>,
) -> AppResult<impl IntoResponse> {
    let business = Business::require_for_user(&state.pool, claims.sub).await?;
    let (payments, total) =
        Payment::list_for_business(&state.pool, business.id, page.limit(), page.offset()).await?;
    Ok(success_to_api_response(Paginated::new(payments, &page, total)))
}

pub async fn show_payment(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(payment_id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    let business = Business::require_for_user(&state.pool, claims.sub).await?;
    let payment = Payment::find_for_business(&state.pool, business.id, payment_id).await?;
    Ok(success_to_api_response(payment))
}

pub async fn cancel_payment(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(payment_id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    let business = Business::require_for_user(&state.pool, claims.sub).await?;
    let payment = Payment::cancel_pending(&state.pool, business.id, payment_id).await?;
    tracing::info!("Payment {} cancelled by its owner", payment.id);
    Ok(message_to_api_response("Payment cancelled.", payment))
}

/// PayFast ITN webhook. The signature is checked before anything is looked up.
pub async fn payfast_notify(
    State(state): State<AppState>,
    body: String,
) -> AppResult<impl IntoResponse> {
    let itn = ItnNotification::parse(&body);
    let payfast = &state.config.payfast;

    itn.verify(payfast).map_err(|e| {
        tracing::warn!("Rejected ITN: {}", e);
        AppError::BadRequest("Invalid notification.".into())
    })?;

    if payfast.validate_remote && !confirm_with_gateway(&state.http, payfast, &itn).await? {
        tracing::warn!("Gateway did not confirm ITN for {:?}", itn.get("m_payment_id"));
        return Err(AppError::BadRequest("Notification not confirmed by gateway.".into()));
    }

    let payment_id = itn
        .m_payment_id()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;
    let payment_id = Uuid::parse_str(payment_id)
        .map_err(|_| AppError::NotFound("Payment not found.".into()))?;

    let mut tx = state.pool.begin().await?;
    let payment = Payment::lock(&mut tx, payment_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Payment not found.".into()))?;

    if !itn
        .amount_matches(payment.amount_cents)
        .map_err(|e| AppError::BadRequest(e.to_string()))?
    {
        tracing::warn!(
            "ITN amount {:?} does not match payment {} ({} cents)",
            itn.get("amount_gross"),
            payment.id,
            payment.amount_cents
        );
        return Err(AppError::BadRequest("Amount mismatch.".into()));
    }

    let status = itn
        .status()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    if !payment.is_pending() {
        if status == Some(ItnStatus::Complete) && payment.status != COMPLETED {
            tracing::warn!(
                "Gateway completed payment {} which is already {}; needs a refund",
                payment.id,
                payment.status
            );
        } else {
            tracing::info!(
                "Ignoring ITN for payment {} already {}",
                payment.id,
                payment.status
            );
        }
        return Ok(message_to_api_response("Notification already processed.", ()));
    }

    let Some(mut new_status) = itn_transition(&payment.status, status) else {
        tracing::info!(
            "ITN for payment {} left it pending ({:?})",
            payment.id,
            itn.get("payment_status")
        );
        return Ok(message_to_api_response("Notification received.", ()));
    };

    let now = Utc::now();
    if new_status == COMPLETED {
        let applied = apply_paid_change(
            &mut tx,
            payment.business_id,
            payment.kind()?,
            payment.tier()?,
            payment.cycle()?,
            now,
        )
        .await?;
        if applied.is_none() {
            tracing::warn!(
                "Payment {} settled after the business changed package; marked failed for refund",
                payment.id
            );
            new_status = FAILED;
        }
    }

    let payload = itn.to_json().to_string();
    Payment::record_notification(&mut tx, payment.id, new_status, itn.pf_payment_id(), &payload, now)
        .await?;
    tx.commit().await?;

    tracing::info!("Payment {} is now {}", payment.id, new_status);
    Ok(message_to_api_response("Notification processed.", ()))
}
