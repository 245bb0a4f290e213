use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};

use crate::api::TokenSource;
use crate::error::{errors, SessionResult};
use crate::events::{SessionEvent, SessionEvents};
use crate::session::state::{Preferences, Session, UserProfile};
use crate::session::storage::SessionStorage;

/// Holds the current session and funnels every mutation through defined actions
///
/// In-memory state is the source of truth. The persisted copy is a
/// best-effort mirror refreshed through an explicit flush after each
/// mutation; flush failures are logged and never revert memory.
pub struct SessionStore {
    session: RwLock<Session>,
    storage: SessionStorage,
    events: SessionEvents,
}

impl SessionStore {
    /// Create an empty store backed by the given storage
    pub fn new(storage: SessionStorage, events: SessionEvents) -> Self {
        Self {
            session: RwLock::new(Session::default()),
            storage,
            events,
        }
    }

    /// Apply a token and matching profile atomically, then persist
    ///
    /// The token and user fields are set inside one critical section so no
    /// reader can observe a token without its profile. An empty token is
    /// rejected before any state changes.
    pub async fn login(&self, token: String, profile: UserProfile) -> SessionResult<()> {
        if token.trim().is_empty() {
            return Err(errors::auth_token_invalid("response carried an empty token"));
        }

        let email = profile.email.clone();
        {
            let mut session = self.session.write().await;
            session.auth.token = Some(token);
            session.auth.email = email.clone();
            session.user = Some(UserProfile {
                loaded_at: Utc::now(),
                ..profile
            });
        }

        self.persist().await;
        self.events.publish(SessionEvent::SessionEstablished { email });
        debug!("Applied token and profile to session");

        Ok(())
    }

    /// Clear the token and profile atomically, then persist the cleared state
    pub async fn logout(&self) {
        {
            let mut session = self.session.write().await;
            session.auth.clear();
            session.user = None;
        }

        self.persist().await;
        self.events.publish(SessionEvent::SessionCleared);
        debug!("Cleared session");
    }

    /// Update the profile fields and their loaded-at timestamp
    ///
    /// Ignored while unauthenticated, so a profile can never outlive its
    /// token.
    pub async fn set_user(&self, profile: UserProfile) {
        let username = profile.username.clone();
        {
            let mut session = self.session.write().await;
            if !session.auth.has_valid_token() {
                debug!("Ignoring profile update without an active session");
                return;
            }
            session.user = Some(UserProfile {
                loaded_at: Utc::now(),
                ..profile
            });
        }

        self.persist().await;
        self.events.publish(SessionEvent::UserUpdated { username });
    }

    /// Set the UI theme; silently ignores values outside the supported set
    pub async fn set_theme(&self, theme: &str) {
        if !Preferences::is_allowed_theme(theme) {
            debug!(theme, "Ignoring unsupported theme");
            return;
        }

        {
            let mut session = self.session.write().await;
            session.preferences.theme = theme.to_string();
        }

        self.persist().await;
        self.events.publish(SessionEvent::PreferencesChanged {
            theme: theme.to_string(),
        });
    }

    /// Load persisted slices and mark the store initialized
    ///
    /// Completes even when storage is empty or unreadable, in which case
    /// the session stays unauthenticated. Calling it again with unchanged
    /// storage yields the same state.
    pub async fn hydrate(&self) {
        let (auth, preferences, user) = tokio::join!(
            self.storage.read_auth(),
            self.storage.read_preferences(),
            self.storage.read_user(),
        );

        let auth = auth.unwrap_or_else(|err| {
            warn!(error = %err, "Could not restore auth slice");
            None
        });
        let preferences = preferences.unwrap_or_else(|err| {
            warn!(error = %err, "Could not restore preferences slice");
            None
        });
        let user = user.unwrap_or_else(|err| {
            warn!(error = %err, "Could not restore user slice");
            None
        });

        let restored_session = {
            let mut session = self.session.write().await;

            if let Some(preferences) = preferences {
                session.preferences = preferences;
            }

            let mut restored = false;
            if let Some(auth) = auth {
                if auth.has_valid_token() {
                    session.auth = auth;
                    restored = true;
                } else {
                    debug!("Persisted auth slice holds no usable token");
                }
            }

            // The profile is only restored alongside a restored token
            if restored {
                if let Some(user) = user {
                    session.user = Some(user);
                }
            }

            session.initialized = true;
            restored
        };

        self.events.publish(SessionEvent::Hydrated { restored_session });
        info!(restored_session, "Session state hydrated from storage");
    }

    /// Replace the whole in-memory session with an explicit snapshot, then persist
    pub async fn restore(&self, snapshot: Session) {
        let established = snapshot.auth.has_valid_token();
        let email = snapshot.auth.email.clone();

        {
            let mut session = self.session.write().await;
            *session = snapshot;
        }

        self.persist().await;
        if established {
            self.events.publish(SessionEvent::SessionEstablished { email });
        } else {
            self.events.publish(SessionEvent::SessionCleared);
        }
        debug!("Restored session from snapshot");
    }

    /// Write every slice of the current in-memory session to storage
    pub async fn flush(&self) -> SessionResult<()> {
        let snapshot = self.session.read().await.clone();
        self.storage.write_auth(&snapshot.auth).await?;
        self.storage.write_preferences(&snapshot.preferences).await?;
        self.storage.write_user(snapshot.user.as_ref()).await?;
        Ok(())
    }

    /// Current bearer token, if any
    pub async fn token(&self) -> Option<String> {
        self.session.read().await.auth.token.clone()
    }

    /// Current user profile, if any
    pub async fn user(&self) -> Option<UserProfile> {
        self.session.read().await.user.clone()
    }

    /// Current UI preferences
    pub async fn preferences(&self) -> Preferences {
        self.session.read().await.preferences.clone()
    }

    /// Whether persisted state has been loaded
    pub async fn is_initialized(&self) -> bool {
        self.session.read().await.initialized
    }

    /// Clone of the full session state
    pub async fn snapshot(&self) -> Session {
        self.session.read().await.clone()
    }

    /// Subscribe to session change notifications
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Flush with best-effort semantics: failures are logged, never propagated
    async fn persist(&self) {
        if let Err(err) = self.flush().await {
            warn!(error = %err, "Failed to persist session state");
        }
    }
}

#[async_trait]
impl TokenSource for SessionStore {
    async fn bearer_token(&self) -> Option<String> {
        self.token().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::session::state::AuthRecord;

    fn test_store() -> (tempfile::TempDir, SessionStore) {
        let temp = tempfile::tempdir().unwrap();
        let storage = SessionStorage::new(temp.path());
        let store = SessionStore::new(storage, SessionEvents::default());
        (temp, store)
    }

    fn profile(username: &str) -> UserProfile {
        UserProfile {
            username: username.to_string(),
            email: Some(format!("{}@example.com", username)),
            first_name: Some("Jane".to_string()),
            second_name: None,
            last_name: Some("Doe".to_string()),
            is_active: true,
            phone_number: None,
            loaded_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_login_sets_token_and_user_together() {
        let (_temp, store) = test_store();

        store.login("abc".to_string(), profile("u")).await.unwrap();

        let snapshot = store.snapshot().await;
        assert_eq!(snapshot.auth.token.as_deref(), Some("abc"));
        assert_eq!(snapshot.auth.email.as_deref(), Some("u@example.com"));
        assert_eq!(snapshot.user.unwrap().username, "u");
    }

    #[tokio::test]
    async fn test_login_rejects_empty_token() {
        let (_temp, store) = test_store();

        let err = store
            .login(String::new(), profile("u"))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::AuthTokenInvalid);

        let snapshot = store.snapshot().await;
        assert!(snapshot.auth.token.is_none());
        assert!(snapshot.user.is_none());
    }

    #[tokio::test]
    async fn test_logout_clears_token_and_user() {
        let (_temp, store) = test_store();
        store.login("abc".to_string(), profile("u")).await.unwrap();

        store.logout().await;

        let snapshot = store.snapshot().await;
        assert!(snapshot.auth.token.is_none());
        assert!(snapshot.auth.email.is_none());
        assert!(snapshot.user.is_none());
    }

    #[tokio::test]
    async fn test_set_theme_ignores_unsupported_values() {
        let (_temp, store) = test_store();

        store.set_theme("dark").await;
        assert_eq!(store.preferences().await.theme, "dark");

        store.set_theme("purple").await;
        assert_eq!(store.preferences().await.theme, "dark");
    }

    #[tokio::test]
    async fn test_set_user_requires_an_active_session() {
        let (_temp, store) = test_store();

        store.set_user(profile("u")).await;
        assert!(store.user().await.is_none());

        store.login("abc".to_string(), profile("u")).await.unwrap();
        store.set_user(profile("renamed")).await;
        assert_eq!(store.user().await.unwrap().username, "renamed");
    }

    #[tokio::test]
    async fn test_set_user_refreshes_loaded_at() {
        let (_temp, store) = test_store();
        store.login("abc".to_string(), profile("u")).await.unwrap();
        let first = store.user().await.unwrap().loaded_at;

        store.set_user(profile("u")).await;
        let second = store.user().await.unwrap().loaded_at;

        assert!(second >= first);
    }

    #[tokio::test]
    async fn test_hydrate_with_empty_storage_initializes_unauthenticated() {
        let (_temp, store) = test_store();
        assert!(!store.is_initialized().await);

        store.hydrate().await;

        assert!(store.is_initialized().await);
        assert!(store.token().await.is_none());
        assert!(store.user().await.is_none());
    }

    #[tokio::test]
    async fn test_hydrate_restores_a_persisted_session() {
        let temp = tempfile::tempdir().unwrap();

        let first = SessionStore::new(
            SessionStorage::new(temp.path()),
            SessionEvents::default(),
        );
        first.login("abc".to_string(), profile("u")).await.unwrap();
        first.set_theme("dark").await;

        let second = SessionStore::new(
            SessionStorage::new(temp.path()),
            SessionEvents::default(),
        );
        second.hydrate().await;

        let snapshot = second.snapshot().await;
        assert!(snapshot.initialized);
        assert_eq!(snapshot.auth.token.as_deref(), Some("abc"));
        assert_eq!(snapshot.auth.email.as_deref(), Some("u@example.com"));
        assert_eq!(snapshot.user.unwrap().username, "u");
        assert_eq!(snapshot.preferences.theme, "dark");
    }

    #[tokio::test]
    async fn test_hydrate_is_idempotent() {
        let temp = tempfile::tempdir().unwrap();
        let seed = SessionStore::new(
            SessionStorage::new(temp.path()),
            SessionEvents::default(),
        );
        seed.login("abc".to_string(), profile("u")).await.unwrap();

        let store = SessionStore::new(
            SessionStorage::new(temp.path()),
            SessionEvents::default(),
        );
        store.hydrate().await;
        let once = store.snapshot().await;

        store.hydrate().await;
        let twice = store.snapshot().await;

        assert_eq!(once, twice);
    }

    #[tokio::test]
    async fn test_hydrate_ignores_a_blank_persisted_token() {
        let temp = tempfile::tempdir().unwrap();
        let storage = SessionStorage::new(temp.path());
        storage
            .write_auth(&AuthRecord {
                token: Some("   ".to_string()),
                email: Some("u@example.com".to_string()),
            })
            .await
            .unwrap();

        let store = SessionStore::new(storage, SessionEvents::default());
        store.hydrate().await;

        assert!(store.is_initialized().await);
        assert!(store.token().await.is_none());
    }

    #[tokio::test]
    async fn test_storage_failure_does_not_block_memory_updates() {
        let temp = tempfile::tempdir().unwrap();
        // Point the data directory at a file so every write fails
        let blocker = temp.path().join("blocker");
        std::fs::write(&blocker, "x").unwrap();

        let store = SessionStore::new(SessionStorage::new(&blocker), SessionEvents::default());
        store.login("abc".to_string(), profile("u")).await.unwrap();

        assert_eq!(store.token().await.as_deref(), Some("abc"));
        assert!(store.flush().await.is_err());
    }

    #[tokio::test]
    async fn test_restore_applies_a_full_snapshot() {
        let (_temp, store) = test_store();

        let mut snapshot = Session::default();
        snapshot.initialized = true;
        snapshot.auth.token = Some("abc".to_string());
        snapshot.auth.email = Some("u@example.com".to_string());
        snapshot.user = Some(profile("u"));

        store.restore(snapshot.clone()).await;
        assert_eq!(store.snapshot().await, snapshot);
    }

    #[tokio::test]
    async fn test_mutations_publish_events() {
        let temp = tempfile::tempdir().unwrap();
        let events = SessionEvents::default();
        let store = SessionStore::new(SessionStorage::new(temp.path()), events.clone());
        let mut receiver = store.subscribe();

        store.login("abc".to_string(), profile("u")).await.unwrap();
        store.set_theme("dark").await;
        store.logout().await;

        assert!(matches!(
            receiver.recv().await.unwrap(),
            SessionEvent::SessionEstablished { .. }
        ));
        assert!(matches!(
            receiver.recv().await.unwrap(),
            SessionEvent::PreferencesChanged { .. }
        ));
        assert!(matches!(
            receiver.recv().await.unwrap(),
            SessionEvent::SessionCleared
        ));
    }

    #[tokio::test]
    async fn test_store_serves_as_token_source() {
        let (_temp, store) = test_store();
        assert!(store.bearer_token().await.is_none());

        store.login("abc".to_string(), profile("u")).await.unwrap();
        assert_eq!(store.bearer_token().await.as_deref(), Some("abc"));
    }
}
