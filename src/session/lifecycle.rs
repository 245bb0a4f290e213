//! Session lifecycle: authentication flows and periodic token refresh
//!
//! `SessionLifecycle` owns the phase machine and is the only component
//! allowed to decide when the store is written or cleared. It applies the
//! rules for failed and cancelled attempts so the store, the phase, and
//! the persisted state never disagree.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::api::{ApiClient, AuthResponse, Credentials, RegisterRequest};
use crate::config::RefreshConfig;
use crate::error::{with_retry, RetryPolicy, SessionResult};
use crate::events::{SessionEvent, SessionEvents};
use crate::session::state::SessionPhase;
use crate::session::store::SessionStore;

pub struct SessionLifecycle {
    store: Arc<SessionStore>,
    api: Arc<ApiClient>,
    phase: RwLock<SessionPhase>,
    events: SessionEvents,
    refresh_interval: Duration,
    retry_policy: RetryPolicy,
}

impl SessionLifecycle {
    /// Create a lifecycle around an existing store and API client
    pub fn new(
        store: Arc<SessionStore>,
        api: Arc<ApiClient>,
        config: &RefreshConfig,
        events: SessionEvents,
    ) -> Self {
        Self {
            store,
            api,
            phase: RwLock::new(SessionPhase::Unauthenticated),
            events,
            refresh_interval: Duration::from_secs(config.interval_seconds),
            retry_policy: RetryPolicy::fixed_delay(1, Duration::from_millis(config.retry_delay_ms)),
        }
    }

    /// Current phase of the session
    pub async fn phase(&self) -> SessionPhase {
        self.phase.read().await.clone()
    }

    /// Load persisted state and align the phase with it
    pub async fn hydrate(&self) {
        self.store.hydrate().await;
        self.settle_phase_from_store().await;
    }

    /// Run the login flow end to end
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        cancel: &CancellationToken,
    ) -> SessionResult<()> {
        let attempt_id = Uuid::new_v4().to_string();
        info!(%attempt_id, "Login started");
        self.set_phase(SessionPhase::Authenticating {
            attempt_id: attempt_id.clone(),
        })
        .await;

        let credentials = Credentials {
            email: email.to_string(),
            password: password.to_string(),
        };
        let result = self.api.login(&credentials, cancel).await;
        self.complete_authentication(&attempt_id, result).await
    }

    /// Create an account and sign the new user in
    pub async fn register(
        &self,
        request: RegisterRequest,
        cancel: &CancellationToken,
    ) -> SessionResult<()> {
        let attempt_id = Uuid::new_v4().to_string();
        info!(%attempt_id, username = %request.username, "Registration started");
        self.set_phase(SessionPhase::Authenticating {
            attempt_id: attempt_id.clone(),
        })
        .await;

        let result = self.api.register(&request, cancel).await;
        self.complete_authentication(&attempt_id, result).await
    }

    /// Clear the session and return to the unauthenticated phase
    pub async fn logout(&self) {
        self.clear_session().await;
        info!("Logged out");
    }

    /// Refresh the session token once, retrying transient failures per policy
    ///
    /// Skipped until the store has hydrated and holds a token. On success
    /// the store and phase carry the fresh token; a terminal failure clears
    /// the session so a stale token is never reused. A cancelled refresh
    /// leaves the store exactly as it was.
    pub async fn refresh_now(&self, cancel: &CancellationToken) -> SessionResult<()> {
        if !self.store.is_initialized().await {
            debug!("Skipping refresh before hydration");
            return Ok(());
        }
        let previous_token = match self.store.token().await {
            Some(token) => token,
            None => {
                debug!("Skipping refresh without an active session");
                return Ok(());
            }
        };

        self.set_phase(SessionPhase::Refreshing { previous_token }).await;

        let result = with_retry("refresh_session", &self.retry_policy, || async {
            self.api.refresh(cancel).await
        })
        .await;

        match result {
            Ok(response) => match self.apply_auth_response(response).await {
                Ok(()) => {
                    debug!("Session refreshed");
                    Ok(())
                }
                Err(err) => {
                    warn!(error = %err, "Rejected refresh response");
                    self.clear_session().await;
                    Err(err)
                }
            },
            Err(err) if err.is_cancelled() => {
                debug!("Refresh cancelled");
                self.settle_phase_from_store().await;
                Err(err)
            }
            Err(err) => {
                error!(error = %err, "Refresh failed, clearing session");
                self.clear_session().await;
                Err(err)
            }
        }
    }

    /// Drive periodic refresh until the token is cancelled
    ///
    /// A zero interval disables polling; the poller then only waits for
    /// shutdown.
    pub async fn run_refresh_poller(&self, cancel: CancellationToken) {
        if self.refresh_interval.is_zero() {
            info!("Refresh polling disabled");
            cancel.cancelled().await;
            debug!("Refresh poller stopped");
            return;
        }

        info!(
            interval_seconds = self.refresh_interval.as_secs(),
            "Refresh poller started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Refresh poller stopped");
                    break;
                }
                _ = tokio::time::sleep(self.refresh_interval) => {
                    if let Err(err) = self.refresh_now(&cancel).await {
                        if err.is_cancelled() {
                            debug!("Refresh poller stopped mid-refresh");
                            break;
                        }
                        // A terminal failure already cleared the session;
                        // later ticks no-op until the next login.
                    }
                }
            }
        }
    }

    /// Apply the outcome of a login or registration attempt
    ///
    /// A cancelled attempt leaves the store untouched and settles the phase
    /// from whatever the store still holds; any other failure clears the
    /// session so state and phase agree.
    async fn complete_authentication(
        &self,
        attempt_id: &str,
        result: SessionResult<AuthResponse>,
    ) -> SessionResult<()> {
        match result {
            Ok(response) => match self.apply_auth_response(response).await {
                Ok(()) => {
                    info!(%attempt_id, "Authentication succeeded");
                    Ok(())
                }
                Err(err) => {
                    warn!(%attempt_id, error = %err, "Rejected authentication response");
                    self.clear_session().await;
                    Err(err)
                }
            },
            Err(err) if err.is_cancelled() => {
                debug!(%attempt_id, "Authentication cancelled");
                self.settle_phase_from_store().await;
                Err(err)
            }
            Err(err) => {
                warn!(%attempt_id, error = %err, "Authentication failed");
                self.clear_session().await;
                Err(err)
            }
        }
    }

    /// Store the token and profile, then move to the authenticated phase
    async fn apply_auth_response(&self, response: AuthResponse) -> SessionResult<()> {
        let token = response.token.clone();
        self.store.login(response.token, response.user).await?;
        self.set_phase(SessionPhase::Authenticated { token }).await;
        Ok(())
    }

    /// Clear the store and move to the unauthenticated phase
    async fn clear_session(&self) {
        self.store.logout().await;
        self.set_phase(SessionPhase::Unauthenticated).await;
    }

    /// Align the phase with whatever the store currently holds
    async fn settle_phase_from_store(&self) {
        match self.store.token().await {
            Some(token) => self.set_phase(SessionPhase::Authenticated { token }).await,
            None => self.set_phase(SessionPhase::Unauthenticated).await,
        }
    }

    async fn set_phase(&self, phase: SessionPhase) {
        {
            let mut current = self.phase.write().await;
            *current = phase.clone();
        }
        self.events.publish(SessionEvent::PhaseChanged { phase });
    }
}
