use chrono::{DateTime, TimeDelta, Utc};
use sqlx::PgPool;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

use super::{PackageTier, apply_downgrade};
use crate::config::Config;
use crate::error::AppResult;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PackageSweep {
    pub downgraded: usize,
    pub lapsed: usize,
}

/// Applies scheduled downgrades whose period has ended, then drops paid
/// subscriptions that stayed unrenewed past the grace period back to Basic.
/// A downgrade to a lower paid tier therefore has the grace window to renew.
pub async fn apply_due_package_changes(
    pool: &PgPool,
    now: DateTime<Utc>,
    grace: TimeDelta,
) -> AppResult<PackageSweep> {
    let mut tx = pool.begin().await?;
    let mut sweep = PackageSweep::default();

    let due: Vec<(Uuid, String)> = sqlx::query_as(
        r#"
        SELECT id, pending_package_tier
        FROM businesses
        WHERE pending_package_tier IS NOT NULL
          AND subscription_ends_at <= $1
        FOR UPDATE SKIP LOCKED
        "#,
    )
    .bind(now)
    .fetch_all(&mut *tx)
    .await?;

    for (business_id, pending) in due {
        let target = pending.parse::<PackageTier>().unwrap_or_else(|e| {
            tracing::warn!("Business {}: {}, falling back to basic", business_id, e);
            PackageTier::Basic
        });
        apply_downgrade(&mut tx, business_id, target).await?;
        sweep.downgraded += 1;
    }

    let lapsed: Vec<Uuid> = sqlx::query_scalar(
        r#"
        SELECT id
        FROM businesses
        WHERE package_tier <> 'basic'
          AND pending_package_tier IS NULL
          AND subscription_ends_at <= $1
        FOR UPDATE SKIP LOCKED
        "#,
    )
    .bind(now.checked_sub_signed(grace).unwrap_or(DateTime::<Utc>::MIN_UTC))
    .fetch_all(&mut *tx)
    .await?;

    for business_id in lapsed {
        apply_downgrade(&mut tx, business_id, PackageTier::Basic).await?;
        sweep.lapsed += 1;
    }

    tx.commit().await?;
    Ok(sweep)
}

pub fn spawn_package_scheduler(pool: PgPool, config: &Config) -> JoinHandle<()> {
    let period = config.package_scheduler_interval();
    let grace = config.subscription_grace();

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match apply_due_package_changes(&pool, Utc::now(), grace).await {
                Ok(sweep) if sweep.downgraded + sweep.lapsed > 0 => tracing::info!(
                    "Package sweep: {} downgraded, {} lapsed",
                    sweep.downgraded,
                    sweep.lapsed
                ),
                Ok(_) => tracing::debug!("Package sweep: nothing due"),
                Err(e) => tracing::error!("Package sweep failed: {}", e),
            }
        }
    })
}
