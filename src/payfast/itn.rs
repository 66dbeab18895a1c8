use serde_json::{Map, Value};
use thiserror::Error;

use super::signature::{param_string, sign, signatures_match};
use super::parse_amount_cents;
use crate::config::PayfastConfig;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ItnError {
    #[error("missing ITN field: {0}")]
    MissingField(&'static str),
    #[error("ITN signature mismatch")]
    InvalidSignature,
    #[error("ITN merchant does not match")]
    MerchantMismatch,
    #[error("ITN amount is not a valid amount: {0}")]
    InvalidAmount(String),
}

/// `payment_status` as reported by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItnStatus {
    Complete,
    Failed,
    Cancelled,
    Pending,
}

impl ItnStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "COMPLETE" => Some(ItnStatus::Complete),
            "FAILED" => Some(ItnStatus::Failed),
            "CANCELLED" => Some(ItnStatus::Cancelled),
            "PENDING" => Some(ItnStatus::Pending),
            _ => None,
        }
    }
}

/// A parsed Instant Transaction Notification, fields kept in received order.
#[derive(Debug, Clone)]
pub struct ItnNotification {
    pairs: Vec<(String, String)>,
}

impl ItnNotification {
    /// Parses an `application/x-www-form-urlencoded` body.
    pub fn parse(body: &str) -> Self {
        let pairs = body
            .split('&')
            .filter(|part| !part.is_empty())
            .map(|part| {
                let (k, v) = part.split_once('=').unwrap_or((part, ""));
                (form_decode(k), form_decode(v))
            })
            .collect();
        Self { pairs }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    fn require(&self, key: &'static str) -> Result<&str, ItnError> {
        self.get(key)
            .filter(|v| !v.trim().is_empty())
            .ok_or(ItnError::MissingField(key))
    }

    pub fn m_payment_id(&self) -> Result<&str, ItnError> {
        self.require("m_payment_id")
    }

    pub fn pf_payment_id(&self) -> Option<&str> {
        self.get("pf_payment_id").filter(|v| !v.is_empty())
    }

    pub fn status(&self) -> Result<Option<ItnStatus>, ItnError> {
        Ok(ItnStatus::parse(self.require("payment_status")?))
    }

    pub fn amount_gross_cents(&self) -> Result<i64, ItnError> {
        let raw = self.require("amount_gross")?;
        parse_amount_cents(raw).ok_or_else(|| ItnError::InvalidAmount(raw.to_string()))
    }

    /// The string the gateway signed: every field before `signature`.
    pub fn param_string(&self) -> String {
        param_string(
            self.pairs
                .iter()
                .take_while(|(k, _)| k != "signature")
                .map(|(k, v)| (k.as_str(), v.as_str())),
        )
    }

    /// Checks the signature and that the notification is addressed to us.
    pub fn verify(&self, config: &PayfastConfig) -> Result<(), ItnError> {
        let given = self.require("signature")?;
        let expected = sign(&self.param_string(), config.passphrase.as_deref());
        if !signatures_match(&expected, given) {
            return Err(ItnError::InvalidSignature);
        }

        if self.require("merchant_id")? != config.merchant_id {
            return Err(ItnError::MerchantMismatch);
        }
        Ok(())
    }

    /// Gateway amounts may differ from ours by at most one cent.
    pub fn amount_matches(&self, expected_cents: i64) -> Result<bool, ItnError> {
        Ok((self.amount_gross_cents()? - expected_cents).abs() <= 1)
    }

    /// The notification as a JSON object, for the payment audit column.
    pub fn to_json(&self) -> Value {
        let map: Map<String, Value> = self
            .pairs
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        Value::Object(map)
    }
}

fn form_decode(s: &str) -> String {
    let spaced = s.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|c| c.into_owned())
        .unwrap_or(spaced)
}

/// Asks the gateway whether it really sent this notification.
pub async fn confirm_with_gateway(
    client: &reqwest::Client,
    config: &PayfastConfig,
    itn: &ItnNotification,
) -> Result<bool, reqwest::Error> {
    let body = client
        .post(config.validate_url())
        .header(reqwest::header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(itn.param_string())
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;

    Ok(body.trim() == "VALID")
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::super::signature::{param_string, sign};

    /// Builds a signed ITN body the way the gateway would.
    pub fn signed_itn_body(pairs: &[(&str, &str)], passphrase: Option<&str>) -> String {
        let params = param_string(pairs.iter().copied());
        format!("{}&signature={}", params, sign(&params, passphrase))
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::signed_itn_body;
    use super::*;
    use crate::utils::test_support::test_config;

    fn sample_pairs<'a>(merchant_id: &'a str) -> Vec<(&'a str, &'a str)> {
        vec![
            ("m_payment_id", "5f1c8a2e-93c4-4b7e-a0d2-3f7a9c1e2b44"),
            ("pf_payment_id", "1089250"),
            ("payment_status", "COMPLETE"),
            ("item_name", "Gold package (monthly)"),
            ("item_description", ""),
            ("amount_gross", "1000.00"),
            ("amount_fee", "-23.00"),
            ("amount_net", "977.00"),
            ("name_first", "Thandi"),
            ("email_address", "thandi@example.co.za"),
            ("merchant_id", merchant_id),
        ]
    }

    #[test]
    fn parses_form_body_in_order() {
        let itn = ItnNotification::parse("a=1&item_name=Gold+package+%28monthly%29&empty=");
        assert_eq!(itn.get("item_name"), Some("Gold package (monthly)"));
        assert_eq!(itn.get("empty"), Some(""));
        assert_eq!(itn.param_string(), "a=1&item_name=Gold+package+%28monthly%29&empty=");
    }

    #[test]
    fn accepts_correctly_signed_notification() {
        let config = test_config().payfast;
        let body = signed_itn_body(&sample_pairs(&config.merchant_id), config.passphrase.as_deref());
        let itn = ItnNotification::parse(&body);

        assert_eq!(itn.verify(&config), Ok(()));
        assert_eq!(itn.status(), Ok(Some(ItnStatus::Complete)));
        assert_eq!(itn.amount_gross_cents(), Ok(100_000));
        assert_eq!(itn.pf_payment_id(), Some("1089250"));
    }

    #[test]
    fn values_are_signed_untrimmed() {
        let config = test_config().payfast;
        let mut pairs = sample_pairs(&config.merchant_id);
        pairs[4] = ("item_description", "Gold package ");
        let body = signed_itn_body(&pairs, config.passphrase.as_deref());
        let itn = ItnNotification::parse(&body);

        assert_eq!(itn.get("item_description"), Some("Gold package "));
        assert_eq!(itn.verify(&config), Ok(()));
    }

    #[test]
    fn rejects_tampered_amount() {
        let config = test_config().payfast;
        let body = signed_itn_body(&sample_pairs(&config.merchant_id), config.passphrase.as_deref())
            .replace("amount_gross=1000.00", "amount_gross=1.00");
        let itn = ItnNotification::parse(&body);

        assert_eq!(itn.verify(&config), Err(ItnError::InvalidSignature));
    }

    #[test]
    fn rejects_wrong_passphrase() {
        let config = test_config().payfast;
        let body = signed_itn_body(&sample_pairs(&config.merchant_id), Some("not-it"));
        assert_eq!(
            ItnNotification::parse(&body).verify(&config),
            Err(ItnError::InvalidSignature)
        );
    }

    #[test]
    fn rejects_other_merchant() {
        let config = test_config().payfast;
        let body = signed_itn_body(&sample_pairs("99999999"), config.passphrase.as_deref());
        assert_eq!(
            ItnNotification::parse(&body).verify(&config),
            Err(ItnError::MerchantMismatch)
        );
    }

    #[test]
    fn missing_signature_is_reported() {
        let config = test_config().payfast;
        let itn = ItnNotification::parse("m_payment_id=abc&payment_status=COMPLETE");
        assert_eq!(itn.verify(&config), Err(ItnError::MissingField("signature")));
    }

    #[test]
    fn amount_tolerance_is_one_cent() {
        let itn = ItnNotification::parse("amount_gross=500.01");
        assert_eq!(itn.amount_matches(50_000), Ok(true));
        assert_eq!(itn.amount_matches(49_999), Ok(false));
    }

    #[test]
    fn unknown_status_maps_to_none() {
        assert_eq!(ItnStatus::parse("cancelled"), Some(ItnStatus::Cancelled));
        assert_eq!(ItnStatus::parse("REFUNDED"), None);
    }

    #[test]
    fn json_payload_keeps_every_field() {
        let itn = ItnNotification::parse("a=1&b=two+words");
        assert_eq!(itn.to_json(), serde_json::json!({ "a": "1", "b": "two words" }));
    }
}
