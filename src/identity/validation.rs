//! Validation of app/instance identity components
//!
//! Components that feed client-id derivation must stay inside a small
//! broker-safe alphabet. Normalization lowercases so the same logical
//! identity always derives the same client id.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::ConfigError;

static COMPONENT_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9-]+$").expect("static pattern"));

/// Validate and normalize a client-id component (app name or instance id).
///
/// Rules: non-empty after trimming, only letters, digits and `-`,
/// normalized to lowercase.
pub fn validate_component(value: &str, field: &'static str) -> Result<String, ConfigError> {
    let normalized = value.trim();
    if normalized.is_empty() {
        return Err(ConfigError::InvalidIdentityComponent {
            field,
            reason: "value must not be empty".to_string(),
        });
    }

    if !COMPONENT_PATTERN.is_match(normalized) {
        return Err(ConfigError::InvalidIdentityComponent {
            field,
            reason: "only letters, digits and '-' are allowed".to_string(),
        });
    }

    Ok(normalized.to_lowercase())
}
