use serde::Deserialize;

use crate::validation::ValidationErrors;

pub const MODERATION_STATUSES: [&str; 3] = ["pending", "approved", "rejected"];

#[derive(Debug, Default, Deserialize)]
pub struct StatusQuery {
    pub status: Option<String>,
}

impl StatusQuery {
    /// Defaults to the moderation queue.
    pub fn status(&self) -> Result<&str, ValidationErrors> {
        let status = self.status.as_deref().map(str::trim).unwrap_or("pending");
        if MODERATION_STATUSES.contains(&status) {
            Ok(status)
        } else {
            let mut errors = ValidationErrors::new();
            errors.add("status", "The status must be pending, approved or rejected.");
            Err(errors)
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct UserQuery {
    pub search: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RejectRequest {
    pub reason: String,
}

impl RejectRequest {
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if errors.required("reason", &self.reason) {
            errors.length("reason", &self.reason, 5, 500);
        }
        errors.into_result()
    }
}
