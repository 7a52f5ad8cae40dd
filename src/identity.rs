//! Legal acceptance (ATP) state, owned by an external identity service
//!
//! This crate only relays calls; the acceptance payloads are opaque JSON.

use crate::config::IdentityConfig;
use crate::{Error, Result};
use async_trait::async_trait;

/// Client of the identity service's acceptance endpoints
#[async_trait]
pub trait IdentityService: Send + Sync {
    /// Current acceptance state of a user
    async fn check_atp(&self, user_id: &str) -> Result<serde_json::Value>;

    /// Record that a user accepted the terms
    async fn accept_atp(&self, user_id: &str) -> Result<serde_json::Value>;
}

/// Identity service reached over HTTP
///
/// Calls `POST {base_url}/users/{user_id}/atp/check` and `.../atp/accept`.
pub struct HttpIdentityService {
    client: reqwest::Client,
    base_url: String,
}

impl HttpIdentityService {
    /// Create a client for `base_url`
    pub fn new(base_url: impl Into<String>, timeout: std::time::Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn call(&self, user_id: &str, op: &str) -> Result<serde_json::Value> {
        let url = format!(
            "{}/users/{}/atp/{}",
            self.base_url,
            urlencoding::encode(user_id),
            op
        );

        let response = self
            .client
            .post(&url)
            .send()
            .await
            .map_err(|e| Error::ExternalService(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(user_id, op, status = status.as_u16(), "Identity service call failed");
            return Err(Error::ExternalService(format!(
                "HTTP {} from identity service",
                status.as_u16()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| Error::ExternalService(format!("invalid response: {}", e)))
    }
}

#[async_trait]
impl IdentityService for HttpIdentityService {
    async fn check_atp(&self, user_id: &str) -> Result<serde_json::Value> {
        self.call(user_id, "check").await
    }

    async fn accept_atp(&self, user_id: &str) -> Result<serde_json::Value> {
        self.call(user_id, "accept").await
    }
}

/// Stand-in used when no identity service is configured
#[derive(Clone, Copy, Debug, Default)]
pub struct UnavailableIdentityService;

#[async_trait]
impl IdentityService for UnavailableIdentityService {
    async fn check_atp(&self, _user_id: &str) -> Result<serde_json::Value> {
        Err(Error::ExternalService("identity service not configured".into()))
    }

    async fn accept_atp(&self, _user_id: &str) -> Result<serde_json::Value> {
        Err(Error::ExternalService("identity service not configured".into()))
    }
}

/// Build the identity client described by `config`
pub fn from_config(config: &IdentityConfig) -> Result<std::sync::Arc<dyn IdentityService>> {
    Ok(match &config.base_url {
        Some(base_url) => std::sync::Arc::new(HttpIdentityService::new(base_url, config.timeout)?),
        None => std::sync::Arc::new(UnavailableIdentityService),
    })
}
