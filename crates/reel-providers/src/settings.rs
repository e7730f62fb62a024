//! Provider credentials and endpoints from the environment.

use crate::error::{ProviderError, ProviderResult};

/// Connection settings for one provider.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderSettings {
    pub api_key: String,
    pub base_url: String,
    /// Default model when a request does not name one
    pub model: Option<String>,
    /// Submit path override
    pub endpoint: Option<String>,
    /// Query path override; may contain `{taskId}`
    pub query_endpoint: Option<String>,
}

impl ProviderSettings {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: None,
            endpoint: None,
            query_endpoint: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_endpoints(mut self, endpoint: impl Into<String>, query: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self.query_endpoint = Some(query.into());
        self
    }

    /// Read `<NAME>_API_KEY`, `<NAME>_BASE_URL`, `<NAME>_MODEL`,
    /// `<NAME>_ENDPOINT` and `<NAME>_QUERY_ENDPOINT`.
    pub fn from_env(name: &str, default_base_url: &str) -> ProviderResult<Self> {
        let prefix = name.to_ascii_uppercase();
        let var = |suffix: &str| {
            std::env::var(format!("{}_{}", prefix, suffix))
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let api_key = var("API_KEY").ok_or_else(|| ProviderError::NotConfigured(name.to_string()))?;
        let mut settings = Self::new(api_key, var("BASE_URL").unwrap_or_else(|| default_base_url.to_string()));
        settings.model = var("MODEL");
        settings.endpoint = var("ENDPOINT");
        settings.query_endpoint = var("QUERY_ENDPOINT");
        Ok(settings)
    }

    /// Model for a request: the request's own, else the configured default, else `fallback`.
    pub fn model_for(&self, requested: Option<&str>, fallback: &str) -> String {
        requested
            .filter(|m| !m.trim().is_empty())
            .map(str::to_string)
            .or_else(|| self.model.clone())
            .unwrap_or_else(|| fallback.to_string())
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_env_reads_prefixed_vars() {
        std::env::set_var("REELTESTVENDOR_API_KEY", "sk-test");
        std::env::set_var("REELTESTVENDOR_BASE_URL", "https://vendor.example.com/v1/");
        std::env::set_var("REELTESTVENDOR_QUERY_ENDPOINT", "/tasks/{taskId}");

        let settings = ProviderSettings::from_env("reeltestvendor", "https://default").unwrap();
        assert_eq!(settings.api_key, "sk-test");
        assert_eq!(settings.base_url, "https://vendor.example.com/v1");
        assert_eq!(settings.query_endpoint.as_deref(), Some("/tasks/{taskId}"));
        assert!(settings.endpoint.is_none());
    }

    #[test]
    fn test_missing_key_is_not_configured() {
        assert!(matches!(
            ProviderSettings::from_env("reelabsentvendor", "https://default"),
            Err(ProviderError::NotConfigured(_))
        ));
    }

    #[test]
    fn test_model_precedence() {
        let settings = ProviderSettings::new("k", "https://x").with_model("configured");
        assert_eq!(settings.model_for(Some("requested"), "fallback"), "requested");
        assert_eq!(settings.model_for(Some(" "), "fallback"), "configured");
        assert_eq!(ProviderSettings::new("k", "https://x").model_for(None, "fallback"), "fallback");
    }
}
