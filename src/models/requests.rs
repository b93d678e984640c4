//! Request DTOs for the cache server API
//!
//! Defines the query parameters accepted alongside raw payload bodies.

use std::time::Duration;

use serde::Deserialize;

use crate::cache::MAX_KEY_LENGTH;

/// Query parameters for the SET operation (PUT /cache/:key)
///
/// # Fields
/// - `ttl`: Optional TTL in seconds (uses default if not specified)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SetParams {
    /// Optional TTL in seconds
    #[serde(default)]
    pub ttl: Option<u64>,
}

impl SetParams {
    /// Resolves the TTL, falling back to `default`.
    pub fn ttl_or(&self, default: Duration) -> Duration {
        self.ttl.map(Duration::from_secs).unwrap_or(default)
    }
}

/// Validates a cache key taken from a request path.
///
/// Returns an error message if validation fails, None if valid.
pub fn validate_key(key: &str) -> Option<String> {
    if key.is_empty() {
        return Some("Key cannot be empty".to_string());
    }
    if key.len() > MAX_KEY_LENGTH {
        return Some(format!(
            "Key exceeds maximum length of {} bytes",
            MAX_KEY_LENGTH
        ));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_params_deserialize() {
        let params: SetParams = serde_json::from_str(r#"{"ttl": 60}"#).unwrap();
        assert_eq!(params.ttl, Some(60));

        let params: SetParams = serde_json::from_str("{}").unwrap();
        assert!(params.ttl.is_none());
    }

    #[test]
    fn test_ttl_or_default() {
        let default = Duration::from_secs(300);
        assert_eq!(SetParams::default().ttl_or(default), default);
        assert_eq!(
            SetParams { ttl: Some(5) }.ttl_or(default),
            Duration::from_secs(5)
        );
    }

    #[test]
    fn test_validate_empty_key() {
        assert!(validate_key("").is_some());
    }

    #[test]
    fn test_validate_long_key() {
        assert!(validate_key(&"k".repeat(MAX_KEY_LENGTH + 1)).is_some());
    }

    #[test]
    fn test_validate_valid_key() {
        assert!(validate_key("team~report").is_none());
    }
}
