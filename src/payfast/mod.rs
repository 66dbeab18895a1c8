//! PayFast redirect checkout and ITN (Instant Transaction Notification) handling.

pub mod itn;
pub mod signature;

use serde::Serialize;
use uuid::Uuid;

use crate::config::PayfastConfig;

pub use itn::{ItnError, ItnNotification, ItnStatus, confirm_with_gateway};

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CheckoutField {
    pub name: String,
    pub value: String,
}

/// What the SPA needs to post the customer to the gateway.
#[derive(Debug, Clone, Serialize)]
pub struct Checkout {
    pub action_url: String,
    pub fields: Vec<CheckoutField>,
}

pub struct CheckoutRequest<'a> {
    pub payment_id: Uuid,
    pub amount_cents: i64,
    pub item_name: &'a str,
    pub name_first: &'a str,
    pub email_address: &'a str,
}

/// Builds the signed checkout form. Field order is the gateway's documented
/// order, which the signature depends on.
pub fn build_checkout(config: &PayfastConfig, req: &CheckoutRequest<'_>) -> Checkout {
    let payment_id = req.payment_id.to_string();
    let amount = format_amount(req.amount_cents);

    let ordered: [(&str, &str); 10] = [
        ("merchant_id", &config.merchant_id),
        ("merchant_key", &config.merchant_key),
        ("return_url", &config.return_url),
        ("cancel_url", &config.cancel_url),
        ("notify_url", &config.notify_url),
        ("name_first", req.name_first),
        ("email_address", req.email_address),
        ("m_payment_id", &payment_id),
        ("amount", &amount),
        ("item_name", req.item_name),
    ];

    let params = signature::checkout_param_string(ordered.iter().copied());
    let signature = signature::sign(&params, config.passphrase.as_deref());

    let mut fields: Vec<CheckoutField> = ordered
        .iter()
        .filter(|(_, v)| !v.trim().is_empty())
        .map(|(k, v)| CheckoutField {
            name: k.to_string(),
            value: v.trim().to_string(),
        })
        .collect();
    fields.push(CheckoutField {
        name: "signature".into(),
        value: signature,
    });

    Checkout {
        action_url: config.process_url(),
        fields,
    }
}

/// `12345` → `"123.45"`.
pub fn format_amount(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let cents = cents.unsigned_abs();
    format!("{}{}.{:02}", sign, cents / 100, cents % 100)
}

/// `"123.45"` → `12345`. Accepts at most two decimals.
pub fn parse_amount_cents(s: &str) -> Option<i64> {
    let s = s.trim();
    let (negative, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let (whole, frac) = digits.split_once('.').unwrap_or((digits, ""));
    if whole.is_empty() || frac.len() > 2 || !whole.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    if !frac.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    let whole: i64 = whole.parse().ok()?;
    let frac: i64 = match frac.len() {
        0 => 0,
        1 => frac.parse::<i64>().ok()? * 10,
        _ => frac.parse().ok()?,
    };
    let cents = whole.checked_mul(100)?.checked_add(frac)?;
    Some(if negative { -cents } else { cents })
}
