use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Themes a user may select
pub const ALLOWED_THEMES: [&str; 2] = ["light", "dark"];

/// Persisted authentication slice: the bearer token and the email it was issued for
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthRecord {
    pub token: Option<String>,
    pub email: Option<String>,
}

impl AuthRecord {
    /// Check whether a usable bearer token is held
    pub fn has_valid_token(&self) -> bool {
        self.token
            .as_deref()
            .map(|token| !token.trim().is_empty())
            .unwrap_or(false)
    }

    /// Clear both fields together
    pub fn clear(&mut self) {
        self.token = None;
        self.email = None;
    }
}

/// UI preferences, independent of auth validity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preferences {
    #[serde(default = "default_theme")]
    pub theme: String,
}

impl Preferences {
    /// Whether a theme value is one of the supported set
    pub fn is_allowed_theme(theme: &str) -> bool {
        ALLOWED_THEMES.contains(&theme)
    }
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            theme: default_theme(),
        }
    }
}

fn default_theme() -> String {
    "light".to_string()
}

/// User profile as returned by the authentication API
///
/// Wire field names are camelCase; partial responses are tolerated, with
/// absent fields falling back to their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub username: String,

    #[serde(default)]
    pub email: Option<String>,

    #[serde(default)]
    pub first_name: Option<String>,

    #[serde(default)]
    pub second_name: Option<String>,

    #[serde(default)]
    pub last_name: Option<String>,

    #[serde(default)]
    pub is_active: bool,

    #[serde(default)]
    pub phone_number: Option<String>,

    /// When this profile was last applied locally
    #[serde(default = "Utc::now")]
    pub loaded_at: DateTime<Utc>,
}

/// Complete session state snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// True once persisted state has been loaded at startup
    pub initialized: bool,
    /// Current authentication slice
    pub auth: AuthRecord,
    /// Current UI preferences
    pub preferences: Preferences,
    /// Current user profile, present only while a token is held
    pub user: Option<UserProfile>,
}

/// Lifecycle states of the authentication session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum SessionPhase {
    /// No valid session is held
    Unauthenticated,

    /// A login or registration request is in flight
    Authenticating { attempt_id: String },

    /// A valid token is held
    Authenticated { token: String },

    /// A periodic refresh is in flight; the previous token remains usable
    Refreshing { previous_token: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_or_blank_tokens_are_invalid() {
        let mut auth = AuthRecord::default();
        assert!(!auth.has_valid_token());

        auth.token = Some(String::new());
        assert!(!auth.has_valid_token());

        auth.token = Some("   ".to_string());
        assert!(!auth.has_valid_token());

        auth.token = Some("abc".to_string());
        assert!(auth.has_valid_token());
    }

    #[test]
    fn test_default_session_is_unauthenticated() {
        let session = Session::default();
        assert!(!session.initialized);
        assert!(session.auth.token.is_none());
        assert!(session.user.is_none());
        assert_eq!(session.preferences.theme, "light");
    }

    #[test]
    fn test_theme_validation() {
        assert!(Preferences::is_allowed_theme("light"));
        assert!(Preferences::is_allowed_theme("dark"));
        assert!(!Preferences::is_allowed_theme("purple"));
        assert!(!Preferences::is_allowed_theme(""));
    }

    #[test]
    fn test_profile_tolerates_partial_payloads() {
        let profile: UserProfile = serde_json::from_str(r#"{"username":"u"}"#).unwrap();
        assert_eq!(profile.username, "u");
        assert!(profile.email.is_none());
        assert!(profile.first_name.is_none());
        assert!(!profile.is_active);
    }

    #[test]
    fn test_profile_parses_camel_case_fields() {
        let profile: UserProfile = serde_json::from_str(
            r#"{
                "username": "jdoe",
                "email": "jdoe@example.com",
                "firstName": "Jane",
                "secondName": null,
                "lastName": "Doe",
                "isActive": true,
                "phoneNumber": "+40700000000"
            }"#,
        )
        .unwrap();

        assert_eq!(profile.first_name.as_deref(), Some("Jane"));
        assert!(profile.second_name.is_none());
        assert_eq!(profile.last_name.as_deref(), Some("Doe"));
        assert!(profile.is_active);
        assert_eq!(profile.phone_number.as_deref(), Some("+40700000000"));
    }
}
