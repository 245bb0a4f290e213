//! Authentication endpoints

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::api::ApiClient;
use crate::error::SessionResult;
use crate::session::state::UserProfile;

/// Login request body
#[derive(Debug, Clone, Serialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

/// Registration request body
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub username: String,
    pub first_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub second_name: Option<String>,
    pub last_name: String,
}

/// Response shared by login, register, and refresh
#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserProfile,
}

impl ApiClient {
    /// Exchange credentials for a token and profile
    pub async fn login(
        &self,
        credentials: &Credentials,
        cancel: &CancellationToken,
    ) -> SessionResult<AuthResponse> {
        let response: AuthResponse = self
            .execute("login", self.post("login").json(credentials), cancel)
            .await?;

        debug!(username = %response.user.username, "Login accepted");
        Ok(response)
    }

    /// Create an account; the server signs the new user in directly
    pub async fn register(
        &self,
        request: &RegisterRequest,
        cancel: &CancellationToken,
    ) -> SessionResult<AuthResponse> {
        let response: AuthResponse = self
            .execute("register", self.post("register").json(request), cancel)
            .await?;

        debug!(username = %response.user.username, "Registration accepted");
        Ok(response)
    }

    /// Trade the current token for a fresh one
    ///
    /// The bearer token is attached by the client; the caller only decides
    /// when to refresh.
    pub async fn refresh(&self, cancel: &CancellationToken) -> SessionResult<AuthResponse> {
        let response: AuthResponse = self
            .execute("refresh_session", self.get("refresh"), cancel)
            .await?;

        debug!("Refresh accepted");
        Ok(response)
    }
}
