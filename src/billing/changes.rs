use chrono::{DateTime, Utc};
use sqlx::PgConnection;
use uuid::Uuid;

use super::{BillingCycle, PackageTier, PaymentKind};
use crate::error::{AppError, AppResult};

/// Whether a payment raised for `paid` still makes sense for a business now on
/// `current`. Upgrades must still go up; renewals must be for the current tier.
pub fn paid_change_applies(kind: PaymentKind, paid: PackageTier, current: PackageTier) -> bool {
    match kind {
        PaymentKind::Upgrade => paid > current,
        PaymentKind::Renewal => paid == current,
    }
}

/// Activates a paid tier after its payment completed. Upgrades start a fresh
/// period now; renewals extend from the later of now and the current end.
/// Resets the advert allowance and drops any scheduled downgrade.
/// Returns the new period end, or `None` when the business has moved on since
/// the payment was raised and nothing was changed.
pub async fn apply_paid_change(
    conn: &mut PgConnection,
    business_id: Uuid,
    kind: PaymentKind,
    tier: PackageTier,
    cycle: BillingCycle,
    now: DateTime<Utc>,
) -> AppResult<Option<DateTime<Utc>>> {
    let (current_tier, current_end) = sqlx::query_as::<_, (String, Option<DateTime<Utc>>)>(
        "SELECT package_tier, subscription_ends_at FROM businesses WHERE id = $1 FOR UPDATE",
    )
    .bind(business_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::NotFound("Business not found.".into()))?;

    let current_tier = current_tier.parse().unwrap_or(PackageTier::Basic);
    if !paid_change_applies(kind, tier, current_tier) {
        tracing::warn!(
            "Business {} is on {}; not applying stale {} to {}",
            business_id,
            current_tier,
            kind.as_str(),
            tier
        );
        return Ok(None);
    }

    let starts_at = match (kind, current_end) {
        (PaymentKind::Renewal, Some(end)) if end > now => end,
        _ => now,
    };
    let ends_at = cycle
        .period_end(starts_at)
        .ok_or_else(|| AppError::Internal("subscription period out of range".into()))?;

    sqlx::query(
        r#"
        UPDATE businesses
        SET package_tier = $2,
            billing_cycle = $3,
            subscription_ends_at = $4,
            pending_package_tier = NULL,
            adverts_remaining = $5,
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(business_id)
    .bind(tier.as_str())
    .bind(cycle.as_str())
    .bind(ends_at)
    .bind(tier.features().adverts_per_period as i32)
    .execute(&mut *conn)
    .await?;

    tracing::info!(
        "Business {} {} to {} ({}) until {}",
        business_id,
        if kind == PaymentKind::Renewal { "renewed" } else { "upgraded" },
        tier,
        cycle,
        ends_at
    );

    Ok(Some(ends_at))
}

/// Moves a business down to `target`. The paid period end is kept so a lower
/// paid tier stays covered; Basic clears the subscription entirely. Unused
/// adverts are capped at the new tier's allowance.
pub async fn apply_downgrade(
    conn: &mut PgConnection,
    business_id: Uuid,
    target: PackageTier,
) -> AppResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE businesses
        SET package_tier = $2,
            pending_package_tier = NULL,
            adverts_remaining = LEAST(adverts_remaining, $3),
            billing_cycle = CASE WHEN $2 = 'basic' THEN NULL ELSE billing_cycle END,
            subscription_ends_at = CASE WHEN $2 = 'basic' THEN NULL ELSE subscription_ends_at END,
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(business_id)
    .bind(target.as_str())
    .bind(target.features().adverts_per_period as i32)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Business not found.".into()));
    }

    tracing::info!("Business {} moved down to {}", business_id, target);
    Ok(())
}

/// Records a downgrade to run at the end of the paid period.
pub async fn schedule_downgrade(
    conn: &mut PgConnection,
    business_id: Uuid,
    target: PackageTier,
) -> AppResult<()> {
    sqlx::query(
        "UPDATE businesses SET pending_package_tier = $2, updated_at = NOW() WHERE id = $1",
    )
    .bind(business_id)
    .bind(target.as_str())
    .execute(&mut *conn)
    .await?;

    tracing::info!("Business {} scheduled downgrade to {}", business_id, target);
    Ok(())
}

/// Clears a scheduled downgrade. Returns whether one was pending.
pub async fn cancel_scheduled_downgrade(
    conn: &mut PgConnection,
    business_id: Uuid,
) -> AppResult<bool> {
    let result = sqlx::query(
        r#"
        UPDATE businesses
        SET pending_package_tier = NULL, updated_at = NOW()
        WHERE id = $1 AND pending_package_tier IS NOT NULL
        "#,
    )
    .bind(business_id)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upgrade_paid_after_a_higher_one_is_stale() {
        // Silver and Gold raised from Basic; Gold settled first.
        assert!(paid_change_applies(PaymentKind::Upgrade, PackageTier::Gold, PackageTier::Basic));
        assert!(!paid_change_applies(PaymentKind::Upgrade, PackageTier::Silver, PackageTier::Gold));
        assert!(!paid_change_applies(PaymentKind::Upgrade, PackageTier::Gold, PackageTier::Gold));
    }

    #[test]
    fn renewal_only_applies_to_the_current_tier() {
        assert!(paid_change_applies(PaymentKind::Renewal, PackageTier::Silver, PackageTier::Silver));
        assert!(!paid_change_applies(PaymentKind::Renewal, PackageTier::Silver, PackageTier::Gold));
        assert!(!paid_change_applies(PaymentKind::Renewal, PackageTier::Bronze, PackageTier::Basic));
    }
}
