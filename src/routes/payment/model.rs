use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

use crate::{
    billing::{BillingCycle, PackageTier, PaymentKind, PriceQuote},
    error::{AppError, AppResult},
    payfast::ItnStatus,
};

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Payment {
    pub id: Uuid,
    pub business_id: Uuid,
    pub invoice_number: String,
    pub kind: String,
    pub package_tier: String,
    pub billing_cycle: String,
    pub amount_cents: i64,
    pub status: String,
    pub pf_payment_id: Option<String>,
    #[serde(skip_serializing)]
    pub itn_payload: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

const PAYMENT_COLUMNS: &str = "id, business_id, invoice_number, kind, package_tier, \
    billing_cycle, amount_cents, status, pf_payment_id, itn_payload, created_at, completed_at";

/// `pending` is the only state an ITN may move a payment out of.
pub const PENDING: &str = "pending";
pub const COMPLETED: &str = "completed";
pub const FAILED: &str = "failed";
pub const CANCELLED: &str = "cancelled";

/// `INV-20250301-9F2C41AB`: creation date plus the head of the payment id.
pub fn invoice_number(id: Uuid, now: DateTime<Utc>) -> String {
    let simple = id.simple().to_string().to_ascii_uppercase();
    format!("INV-{}-{}", now.format("%Y%m%d"), &simple[..8])
}

/// The status an ITN moves a payment to, or `None` when it changes nothing:
/// settled payments ignore further notifications, and gateway `PENDING` or
/// unknown statuses leave a pending payment as it is.
pub fn itn_transition(current: &str, itn: Option<ItnStatus>) -> Option<&'static str> {
    if current != PENDING {
        return None;
    }
    match itn? {
        ItnStatus::Complete => Some(COMPLETED),
        ItnStatus::Failed => Some(FAILED),
        ItnStatus::Cancelled => Some(CANCELLED),
        ItnStatus::Pending => None,
    }
}

impl Payment {
    pub fn kind(&self) -> AppResult<PaymentKind> {
        PaymentKind::parse(&self.kind)
            .ok_or_else(|| AppError::Internal(format!("payment {} has kind {}", self.id, self.kind)))
    }

    pub fn tier(&self) -> AppResult<PackageTier> {
        self.package_tier
            .parse()
            .map_err(|e: crate::billing::tier::UnknownTier| AppError::Internal(e.to_string()))
    }

    pub fn cycle(&self) -> AppResult<BillingCycle> {
        self.billing_cycle
            .parse()
            .map_err(|e: crate::billing::UnknownCycle| AppError::Internal(e.to_string()))
    }

    pub fn is_pending(&self) -> bool {
        self.status == PENDING
    }

    /// Inserts a payment for `quote`. Zero-amount payments are written as
    /// completed since nothing goes through the gateway.
    pub async fn create(
        conn: &mut PgConnection,
        business_id: Uuid,
        kind: PaymentKind,
        quote: &PriceQuote,
        now: DateTime<Utc>,
    ) -> Result<Self, sqlx::Error> {
        let id = Uuid::new_v4();
        let (status, completed_at) = if quote.amount_cents == 0 {
            (COMPLETED, Some(now))
        } else {
            (PENDING, None)
        };

        sqlx::query_as::<_, Payment>(&format!(
            r#"
            INSERT INTO payments
                (id, business_id, invoice_number, kind, package_tier, billing_cycle,
                 amount_cents, status, created_at, completed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {PAYMENT_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(business_id)
        .bind(invoice_number(id, now))
        .bind(kind.as_str())
        .bind(quote.tier.as_str())
        .bind(quote.cycle.as_str())
        .bind(quote.amount_cents)
        .bind(status)
        .bind(now)
        .bind(completed_at)
        .fetch_one(&mut *conn)
        .await
    }

    /// Cancels every pending payment of the business, so only the newest
    /// checkout can still settle. Returns how many were cancelled.
    pub async fn cancel_open_for_business(
        conn: &mut PgConnection,
        business_id: Uuid,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE payments SET status = 'cancelled' WHERE business_id = $1 AND status = 'pending'",
        )
        .bind(business_id)
        .execute(&mut *conn)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn list_for_business(
        pool: &PgPool,
        business_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Self>, i64), sqlx::Error> {
        let payments = sqlx::query_as::<_, Payment>(&format!(
            r#"
            SELECT {PAYMENT_COLUMNS} FROM payments
            WHERE business_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#
        ))
        .bind(business_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?;

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM payments WHERE business_id = $1")
            .bind(business_id)
            .fetch_one(pool)
            .await?;

        Ok((payments, total))
    }

    pub async fn find_for_business(pool: &PgPool, business_id: Uuid, id: Uuid) -> AppResult<Self> {
        sqlx::query_as::<_, Payment>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = $1 AND business_id = $2"
        ))
        .bind(id)
        .bind(business_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Payment not found.".into()))
    }

    pub async fn cancel_pending(pool: &PgPool, business_id: Uuid, id: Uuid) -> AppResult<Self> {
        let cancelled = sqlx::query_as::<_, Payment>(&format!(
            r#"
            UPDATE payments SET status = 'cancelled'
            WHERE id = $1 AND business_id = $2 AND status = 'pending'
            RETURNING {PAYMENT_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(business_id)
        .fetch_optional(pool)
        .await?;

        match cancelled {
            Some(payment) => Ok(payment),
            None => {
                // Distinguish a missing payment from one that already settled.
                let existing = Self::find_for_business(pool, business_id, id).await?;
                Err(AppError::invalid(
                    "payment",
                    format!("Only pending payments can be cancelled; this one is {}.", existing.status),
                ))
            }
        }
    }

    pub async fn lock(conn: &mut PgConnection, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Payment>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
    }

    /// Stores the outcome of a gateway notification.
    pub async fn record_notification(
        conn: &mut PgConnection,
        id: Uuid,
        status: &str,
        pf_payment_id: Option<&str>,
        payload: &str,
        now: DateTime<Utc>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE payments
            SET status = $2,
                pf_payment_id = COALESCE($3, pf_payment_id),
                itn_payload = $4,
                completed_at = CASE WHEN $2 = 'completed' THEN $5 ELSE completed_at END
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(status)
        .bind(pf_payment_id)
        .bind(payload)
        .bind(now)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn invoice_number_uses_date_and_id_prefix() {
        let id = Uuid::parse_str("9f2c41ab-1234-4bcd-8ef0-0123456789ab").unwrap();
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        assert_eq!(invoice_number(id, now), "INV-20250301-9F2C41AB");
    }

    #[test]
    fn pending_payment_follows_the_gateway() {
        assert_eq!(itn_transition(PENDING, Some(ItnStatus::Complete)), Some(COMPLETED));
        assert_eq!(itn_transition(PENDING, Some(ItnStatus::Failed)), Some(FAILED));
        assert_eq!(itn_transition(PENDING, Some(ItnStatus::Cancelled)), Some(CANCELLED));
    }

    #[test]
    fn gateway_pending_or_unknown_status_changes_nothing() {
        assert_eq!(itn_transition(PENDING, Some(ItnStatus::Pending)), None);
        assert_eq!(itn_transition(PENDING, None), None);
    }

    #[test]
    fn settled_payments_ignore_further_notifications() {
        for settled in [COMPLETED, FAILED, CANCELLED] {
            for itn in [
                Some(ItnStatus::Complete),
                Some(ItnStatus::Failed),
                Some(ItnStatus::Cancelled),
                Some(ItnStatus::Pending),
                None,
            ] {
                assert_eq!(itn_transition(settled, itn), None, "{settled} moved by {itn:?}");
            }
        }
    }
}
