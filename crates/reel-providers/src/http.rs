//! Shared JSON-over-HTTP plumbing for adapters.

use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::error::{ProviderError, ProviderResult};

/// Per-request deadline for provider API calls.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Bearer-authenticated HTTP client bound to one provider.
#[derive(Debug, Clone)]
pub struct ProviderHttp {
    provider: &'static str,
    client: reqwest::Client,
    api_key: String,
}

impl ProviderHttp {
    pub fn new(provider: &'static str, api_key: impl Into<String>) -> ProviderResult<Self> {
        Self::with_timeout(provider, api_key, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(
        provider: &'static str,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> ProviderResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::transport(provider, e))?;
        Ok(Self {
            provider,
            client,
            api_key: api_key.into(),
        })
    }

    pub fn provider(&self) -> &'static str {
        self.provider
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    pub async fn post_json<B: Serialize + ?Sized>(&self, url: &str, body: &B) -> ProviderResult<Value> {
        debug!(provider = self.provider, url = %url, "Submitting provider request");
        let request = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .json(body);
        self.send(request).await
    }

    pub async fn post_multipart(
        &self,
        url: &str,
        form: reqwest::multipart::Form,
    ) -> ProviderResult<Value> {
        debug!(provider = self.provider, url = %url, "Submitting multipart provider request");
        let request = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .multipart(form);
        self.send(request).await
    }

    pub async fn get_json(&self, url: &str) -> ProviderResult<Value> {
        let request = self.client.get(url).bearer_auth(&self.api_key);
        self.send(request).await
    }

    /// Plain GET without credentials, for vendor-hosted reference images.
    pub async fn get_bytes(&self, url: &str) -> ProviderResult<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ProviderError::transport(self.provider, e))?;
        if !response.status().is_success() {
            return Err(ProviderError::InvalidReference(format!(
                "{} returned HTTP {}",
                url,
                response.status().as_u16()
            )));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ProviderError::transport(self.provider, e))?;
        Ok(bytes.to_vec())
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> ProviderResult<Value> {
        let response = request
            .send()
            .await
            .map_err(|e| ProviderError::transport(self.provider, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::transport(self.provider, e))?;

        if !status.is_success() {
            return Err(ProviderError::Http {
                provider: self.provider.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body).map_err(|e| {
            ProviderError::invalid_response(self.provider, format!("{}, body: {}", e, body))
        })
    }
}
