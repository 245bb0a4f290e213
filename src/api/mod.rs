//! HTTP client for the remote authentication API
//!
//! Wraps reqwest behind a small surface that injects the current bearer
//! token at send time, races every request against a cancellation token,
//! and normalizes failures into session errors.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::ApiConfig;
use crate::error::{errors, SessionResult};

mod auth;

pub use auth::{AuthResponse, Credentials, RegisterRequest};

/// Timeout applied to every outbound request
const REQUEST_TIMEOUT_SECONDS: u64 = 30;

/// Source of the current bearer token
///
/// Implemented by the session store so that requests always carry the
/// token as it is at send time, not as it was when the client was built.
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Current bearer token, if a session is active
    async fn bearer_token(&self) -> Option<String>;
}

/// Client for the authentication endpoints
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    tokens: Arc<dyn TokenSource>,
}

impl ApiClient {
    /// Create a client rooted at the given base URL
    pub fn new(base_url: impl Into<String>, tokens: Arc<dyn TokenSource>) -> SessionResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECONDS))
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            tokens,
        })
    }

    /// Create a client from the API section of the configuration
    pub fn from_config(config: &ApiConfig, tokens: Arc<dyn TokenSource>) -> SessionResult<Self> {
        Self::new(config.auth_base(), tokens)
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.http.get(self.url(path))
    }

    fn post(&self, path: &str) -> RequestBuilder {
        self.http.post(self.url(path))
    }

    /// Attach the bearer token, send, and decode the JSON response
    ///
    /// Cancellation wins the race against the in-flight request. A caller
    /// that observes a cancelled error can assume the response was never
    /// consumed.
    async fn execute<T: DeserializeOwned>(
        &self,
        operation: &str,
        request: RequestBuilder,
        cancel: &CancellationToken,
    ) -> SessionResult<T> {
        let request = match self.tokens.bearer_token().await {
            Some(token) => request.header("Authorization", format!("Bearer {}", token)),
            None => request,
        };

        let response = tokio::select! {
            _ = cancel.cancelled() => {
                debug!(operation, "Request cancelled before completion");
                return Err(errors::request_cancelled(operation));
            }
            result = request.send() => result?,
        };

        if !response.status().is_success() {
            let status = response.status();
            let detail = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(errors::from_status(operation, status, detail));
        }

        Ok(response.json::<T>().await?)
    }
}
