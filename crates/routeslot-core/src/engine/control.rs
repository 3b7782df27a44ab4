use super::errors::ControlApiError;
use crate::config::EngineConfig;
use reqwest::{Client, ClientBuilder, Method, RequestBuilder};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::json;
use std::time::Duration;
use tracing::trace;

/// Answer of `GET /version`, used as the readiness check.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct EngineVersion {
    pub version: String,
    #[serde(default)]
    pub meta: bool,
}

/// A selector group as reported by `GET /proxies/{name}`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ProxyGroup {
    #[serde(rename = "type")]
    pub group_type: String,
    #[serde(default)]
    pub now: Option<String>,
    #[serde(default)]
    pub all: Vec<String>,
}

/// Client for the routing engine's REST control API.
#[derive(Clone)]
pub struct EngineControlClient {
    client: Client,
    base_url: String,
    secret: Option<String>,
}

impl EngineControlClient {
    /// # Errors
    /// Returns [`ControlApiError::Client`] if the HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        secret: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ControlApiError> {
        let client = ClientBuilder::new()
            .connect_timeout(Duration::from_secs(2))
            .timeout(timeout)
            .no_proxy()
            .redirect(reqwest::redirect::Policy::none())
            .user_agent("routeslot/0.1.0")
            .build()
            .map_err(|e| ControlApiError::Client(e.to_string()))?;

        Ok(Self { client, base_url: base_url.into().trim_end_matches('/').to_string(), secret })
    }

    /// # Errors
    /// Returns [`ControlApiError::Client`] if the HTTP client cannot be built.
    pub fn from_config(config: &EngineConfig) -> Result<Self, ControlApiError> {
        Self::new(config.controller_url(), config.controller_secret.clone(), Duration::from_secs(5))
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.client.request(method, format!("{}{path}", self.base_url));
        match &self.secret {
            Some(secret) => builder.bearer_auth(secret),
            None => builder,
        }
    }

    async fn send(
        &self,
        method: &'static str,
        path: &str,
        builder: RequestBuilder,
    ) -> Result<reqwest::Response, ControlApiError> {
        trace!(method, path, "control API request");
        let response = builder
            .send()
            .await
            .map_err(|e| ControlApiError::from_reqwest(method, path, &e))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(ControlApiError::Status { method, path: path.to_string(), status: status.as_u16(), body })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ControlApiError> {
        let response = self.send("GET", path, self.request(Method::GET, path)).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ControlApiError::from_reqwest("GET", path, &e))?;
        serde_json::from_slice(&bytes).map_err(|e| ControlApiError::Decode {
            path: path.to_string(),
            message: e.to_string(),
        })
    }

    /// Readiness check.
    ///
    /// # Errors
    /// Network, status, or decode failures.
    pub async fn version(&self) -> Result<EngineVersion, ControlApiError> {
        self.get_json("/version").await
    }

    /// Asks the engine to re-fetch a proxy provider now.
    ///
    /// # Errors
    /// Network or status failures.
    pub async fn refresh_provider(&self, provider: &str) -> Result<(), ControlApiError> {
        let path = format!("/providers/proxies/{provider}");
        self.send("PUT", &path, self.request(Method::PUT, &path)).await?;
        Ok(())
    }

    /// Reads a selector group.
    ///
    /// # Errors
    /// Network, status, or decode failures.
    pub async fn group(&self, group: &str) -> Result<ProxyGroup, ControlApiError> {
        self.get_json(&format!("/proxies/{group}")).await
    }

    /// Switches a selector group to `proxy`.
    ///
    /// # Errors
    /// Network or status failures.
    pub async fn select(&self, group: &str, proxy: &str) -> Result<(), ControlApiError> {
        let path = format!("/proxies/{group}");
        let builder = self.request(Method::PUT, &path).json(&json!({ "name": proxy }));
        self.send("PUT", &path, builder).await?;
        Ok(())
    }
}
