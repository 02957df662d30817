//! API configuration
//! Credentials and the base URL come from the process environment.

use url::Url;

use crate::{Error, Result};

/// Environment variable holding the API key
pub const API_KEY_ENV_VAR: &str = "OPENJUSTICE_API_KEY";
/// Environment variable holding the base URL
pub const API_URL_ENV_VAR: &str = "OPENJUSTICE_API_URL";
/// Unprefixed fallbacks, checked after the prefixed names
pub const FALLBACK_API_KEY_ENV_VAR: &str = "API_KEY";
pub const FALLBACK_API_URL_ENV_VAR: &str = "API_URL";

/// Staging endpoint used when no URL is configured
pub const DEFAULT_API_URL: &str = "https://api.staging.openjustice.ai";

/// Credentials and base URL for one call chain
#[derive(Clone)]
pub struct ApiConfig {
    pub api_key: String,
    pub api_url: Url,
}

impl std::fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiConfig")
            .field("api_key", &"<redacted>")
            .field("api_url", &self.api_url.as_str())
            .finish()
    }
}

impl ApiConfig {
    /// Build a configuration from explicit values
    pub fn new(api_key: impl Into<String>, api_url: &str) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(Error::configuration(
                "API key not found. Set OPENJUSTICE_API_KEY in the environment or .env file.",
            ));
        }

        let api_url = Url::parse(api_url.trim())
            .map_err(|e| Error::configuration(format!("Invalid API URL '{}': {}", api_url, e)))?;
        if api_url.cannot_be_a_base() {
            return Err(Error::configuration(format!(
                "Invalid API URL '{}': not a base URL",
                api_url
            )));
        }

        Ok(Self { api_key, api_url })
    }

    /// Read the configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Resolve the configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let first_set = |names: &[&str]| {
            names
                .iter()
                .filter_map(|name| lookup(*name))
                .find(|value| !value.trim().is_empty())
        };

        let api_key = first_set(&[API_KEY_ENV_VAR, FALLBACK_API_KEY_ENV_VAR]).unwrap_or_default();
        let api_url = first_set(&[API_URL_ENV_VAR, FALLBACK_API_URL_ENV_VAR])
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());

        Self::new(api_key, &api_url)
    }

    /// Absolute URL for an API path such as `conversation/send-message`
    pub fn endpoint(&self, path: &str) -> Result<Url> {
        let joined = format!(
            "{}/{}",
            self.api_url.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        Url::parse(&joined)
            .map_err(|e| Error::configuration(format!("Invalid endpoint '{}': {}", joined, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| vars.get(name).cloned()
    }

    #[test]
    fn test_missing_key_is_configuration_error() {
        let result = ApiConfig::from_lookup(lookup(&[]));
        assert!(matches!(result, Err(Error::Configuration { .. })));
    }

    #[test]
    fn test_blank_key_is_configuration_error() {
        let result = ApiConfig::from_lookup(lookup(&[(API_KEY_ENV_VAR, "   ")]));
        assert!(matches!(result, Err(Error::Configuration { .. })));
    }

    #[test]
    fn test_default_url() {
        let config = ApiConfig::from_lookup(lookup(&[(API_KEY_ENV_VAR, "key")])).unwrap();
        assert_eq!(config.api_key, "key");
        assert_eq!(config.api_url.as_str(), "https://api.staging.openjustice.ai/");
    }

    #[test]
    fn test_prefixed_names_win_over_fallbacks() {
        let config = ApiConfig::from_lookup(lookup(&[
            (API_KEY_ENV_VAR, "primary"),
            (FALLBACK_API_KEY_ENV_VAR, "secondary"),
            (FALLBACK_API_URL_ENV_VAR, "http://localhost:8080"),
        ]))
        .unwrap();
        assert_eq!(config.api_key, "primary");
        assert_eq!(config.api_url.as_str(), "http://localhost:8080/");
    }

    #[test]
    fn test_invalid_url() {
        let result = ApiConfig::new("key", "not a url");
        assert!(matches!(result, Err(Error::Configuration { .. })));
    }

    #[test]
    fn test_endpoint_joins_paths() {
        let config = ApiConfig::new("key", "https://example.com/api/").unwrap();
        let url = config.endpoint("conversation/send-message").unwrap();
        assert_eq!(url.as_str(), "https://example.com/api/conversation/send-message");
    }

    #[test]
    fn test_debug_redacts_key() {
        let config = ApiConfig::new("secret-key", DEFAULT_API_URL).unwrap();
        assert!(!format!("{:?}", config).contains("secret-key"));
    }
}
