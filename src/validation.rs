use std::collections::BTreeMap;

use serde::Serialize;

/// Field-keyed validation messages, serialized as `{"field": ["message", ...]}`.
#[derive(Debug, Default, Clone, Serialize, PartialEq)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<String, Vec<String>>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn has(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    /// The first message recorded, used as the envelope's summary message.
    pub fn first_message(&self) -> Option<&str> {
        self.0
            .values()
            .next()
            .and_then(|msgs| msgs.first())
            .map(String::as_str)
    }

    pub fn required(&mut self, field: &str, value: &str) -> bool {
        if value.trim().is_empty() {
            self.add(field, format!("The {} field is required.", label(field)));
            return false;
        }
        true
    }

    pub fn length(&mut self, field: &str, value: &str, min: usize, max: usize) {
        let len = value.trim().chars().count();
        if len < min || len > max {
            self.add(
                field,
                format!(
                    "The {} must be between {} and {} characters.",
                    label(field),
                    min,
                    max
                ),
            );
        }
    }

    pub fn max_length(&mut self, field: &str, value: &str, max: usize) {
        if value.chars().count() > max {
            self.add(
                field,
                format!("The {} may not be greater than {} characters.", label(field), max),
            );
        }
    }

    pub fn email(&mut self, field: &str, value: &str) {
        if !is_valid_email(value) {
            self.add(field, format!("The {} must be a valid email address.", label(field)));
        }
    }

    pub fn url(&mut self, field: &str, value: &str) {
        let value = value.trim();
        let ok = (value.starts_with("http://") || value.starts_with("https://"))
            && value.len() > "https://".len()
            && !value.contains(char::is_whitespace);
        if !ok {
            self.add(field, format!("The {} format is invalid.", label(field)));
        }
    }

    pub fn optional_url(&mut self, field: &str, value: Option<&str>) {
        if let Some(v) = value.filter(|v| !v.trim().is_empty()) {
            self.url(field, v);
        }
    }

    pub fn into_result(self) -> Result<(), Self> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

fn label(field: &str) -> String {
    field.replace('_', " ")
}

pub fn is_valid_email(value: &str) -> bool {
    let value = value.trim();
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !value.contains(char::is_whitespace)
}

/// Treats blank optional strings as absent.
pub fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_field_reports_humanized_label() {
        let mut errors = ValidationErrors::new();
        assert!(!errors.required("password_confirmation", "   "));
        assert_eq!(
            errors.first_message(),
            Some("The password confirmation field is required.")
        );
    }

    #[test]
    fn email_rules() {
        assert!(is_valid_email("owner@shop.co.za"));
        assert!(!is_valid_email("owner.shop.co.za"));
        assert!(!is_valid_email("owner@shop"));
        assert!(!is_valid_email("a b@shop.com"));
        assert!(!is_valid_email("@shop.com"));
    }

    #[test]
    fn optional_url_skips_blank_values() {
        let mut errors = ValidationErrors::new();
        errors.optional_url("website", Some("  "));
        errors.optional_url("facebook_url", None);
        assert!(errors.is_empty());

        errors.optional_url("website", Some("www.example.com"));
        assert!(errors.has("website"));
    }

    #[test]
    fn length_counts_characters_not_bytes() {
        let mut errors = ValidationErrors::new();
        errors.length("name", "Ñá", 2, 4);
        assert!(errors.is_empty());
    }

    #[test]
    fn serializes_as_plain_map() {
        let mut errors = ValidationErrors::new();
        errors.add("email", "taken");
        let json = serde_json::to_value(&errors).unwrap();
        assert_eq!(json, serde_json::json!({ "email": ["taken"] }));
    }
}
