use axum::{
    Extension,
    extract::{Json, State},
    response::IntoResponse,
};
use chrono::{DateTime, Utc};

use crate::{
    AppState,
    billing::{
        DowngradePlan, PaymentKind, PriceQuote, apply_downgrade, apply_paid_change,
        cancel_scheduled_downgrade, package_catalogue, plan_downgrade, quote_renewal,
        quote_upgrade, schedule_downgrade,
    },
    error::{AppError, AppResult},
    payfast::{CheckoutRequest, build_checkout},
    routes::{auth::model::User, business::model::Business, payment::model::Payment},
    utils::{Claims, created, message_to_api_response, success_to_api_response},
};

use super::model::{DowngradeOutcome, DowngradeRequest, PaymentCheckout, UpgradeRequest};

pub async fn list_packages() -> impl IntoResponse {
    success_to_api_response(package_catalogue())
}

pub async fn upgrade_package(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpgradeRequest>,
) -> AppResult<impl IntoResponse> {
    let (target, cycle) = req.validate()?;
    let now = Utc::now();

    let business = Business::require_for_user(&state.pool, claims.sub).await?;
    let quote = quote_upgrade(&business.subscription(), target, cycle, now)?;

    let raised = raise_payment(&state, &business, &claims, PaymentKind::Upgrade, quote, now).await?;
    let message = if raised.checkout.is_some() {
        "Complete the payment to activate your package."
    } else {
        "Your package has been upgraded."
    };
    Ok(created(message, raised))
}

pub async fn renew_package(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> AppResult<impl IntoResponse> {
    let now = Utc::now();
    let business = Business::require_for_user(&state.pool, claims.sub).await?;
    let quote = quote_renewal(&business.subscription())?;

    let raised = raise_payment(&state, &business, &claims, PaymentKind::Renewal, quote, now).await?;
    Ok(created("Complete the payment to renew your package.", raised))
}

/// Records the payment and returns the gateway form, or applies the change
/// straight away when the credit covers the whole price.
async fn raise_payment(
    state: &AppState,
    business: &Business,
    claims: &Claims,
    kind: PaymentKind,
    quote: PriceQuote,
    now: DateTime<Utc>,
) -> AppResult<PaymentCheckout> {
    let mut tx = state.pool.begin().await?;
    let superseded = Payment::cancel_open_for_business(&mut tx, business.id).await?;
    if superseded > 0 {
        tracing::info!(
            "Business {}: {} earlier pending payment(s) cancelled",
            business.id,
            superseded
        );
    }
    let payment = Payment::create(&mut tx, business.id, kind, &quote, now).await?;
    if quote.amount_cents == 0
        && apply_paid_change(&mut tx, business.id, kind, quote.tier, quote.cycle, now)
            .await?
            .is_none()
    {
        return Err(AppError::invalid(
            "package",
            "Your package changed while this request was made. Please try again.",
        ));
    }
    tx.commit().await?;

    tracing::info!(
        "Business {} raised {} payment {} for {} ({} cents)",
        business.id,
        kind.as_str(),
        payment.invoice_number,
        quote.tier,
        quote.amount_cents
    );

    if !payment.is_pending() {
        return Ok(PaymentCheckout {
            payment,
            quote,
            checkout: None,
        });
    }

    let user = User::find_by_id(&state.pool, claims.sub)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Account no longer exists.".into()))?;
    let item_name = format!("{} package ({})", quote.tier.display_name(), quote.cycle);
    let checkout = build_checkout(
        &state.config.payfast,
        &CheckoutRequest {
            payment_id: payment.id,
            amount_cents: payment.amount_cents,
            item_name: &item_name,
            name_first: &user.name,
            email_address: &user.email,
        },
    );

    Ok(PaymentCheckout {
        payment,
        quote,
        checkout: Some(checkout),
    })
}

pub async fn downgrade_package(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<DowngradeRequest>,
) -> AppResult<impl IntoResponse> {
    let target = req.validate()?;
    let now = Utc::now();

    let business = Business::require_for_user(&state.pool, claims.sub).await?;
    let plan = plan_downgrade(&business.subscription(), target, now)?;

    let mut conn = state.pool.acquire().await?;
    let outcome = match plan {
        DowngradePlan::Immediate => {
            apply_downgrade(&mut conn, business.id, target).await?;
            DowngradeOutcome {
                package: target,
                scheduled: false,
                effective_at: None,
            }
        }
        DowngradePlan::Scheduled { effective_at } => {
            schedule_downgrade(&mut conn, business.id, target).await?;
            DowngradeOutcome {
                package: target,
                scheduled: true,
                effective_at: Some(effective_at),
            }
        }
    };

    let message = if outcome.scheduled {
        "Your downgrade will take effect at the end of the current period."
    } else {
        "Your package has been changed."
    };
    Ok(message_to_api_response(message, outcome))
}

pub async fn cancel_downgrade(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> AppResult<impl IntoResponse> {
    let business = Business::require_for_user(&state.pool, claims.sub).await?;

    let mut conn = state.pool.acquire().await?;
    if !cancel_scheduled_downgrade(&mut conn, business.id).await? {
        return Err(AppError::invalid("package", "No downgrade is scheduled."));
    }
    Ok(message_to_api_response("Scheduled downgrade cancelled.", ()))
}
