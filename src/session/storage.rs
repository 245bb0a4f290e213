use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};
use tokio::fs;
use tracing::debug;

use crate::error::{errors, SessionResult};
use crate::session::state::{AuthRecord, Preferences, UserProfile};

// Persisted slice names, one JSON file each
const AUTH_SLICE: &str = "auth";
const PREFERENCES_SLICE: &str = "preferences";
const USER_SLICE: &str = "user";

/// File-backed persistence for session slices
///
/// Each slice is stored as one JSON file in the data directory. Reading a
/// slice that was never written yields `None`; all IO and serialization
/// failures map to storage errors so callers can log them without
/// interrupting in-memory state.
#[derive(Debug, Clone)]
pub struct SessionStorage {
    data_dir: PathBuf,
}

impl SessionStorage {
    /// Create a storage handle rooted at the given data directory
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
        }
    }

    /// Persist the auth slice
    pub async fn write_auth(&self, auth: &AuthRecord) -> SessionResult<()> {
        self.write_slice(AUTH_SLICE, auth).await
    }

    /// Read the persisted auth slice
    pub async fn read_auth(&self) -> SessionResult<Option<AuthRecord>> {
        self.read_slice(AUTH_SLICE).await
    }

    /// Persist the preferences slice
    pub async fn write_preferences(&self, preferences: &Preferences) -> SessionResult<()> {
        self.write_slice(PREFERENCES_SLICE, preferences).await
    }

    /// Read the persisted preferences slice
    pub async fn read_preferences(&self) -> SessionResult<Option<Preferences>> {
        self.read_slice(PREFERENCES_SLICE).await
    }

    /// Persist the user slice; a cleared profile is stored as `null`
    pub async fn write_user(&self, user: Option<&UserProfile>) -> SessionResult<()> {
        self.write_slice(USER_SLICE, &user).await
    }

    /// Read the persisted user slice
    pub async fn read_user(&self) -> SessionResult<Option<UserProfile>> {
        let user = self.read_slice::<Option<UserProfile>>(USER_SLICE).await?;
        Ok(user.flatten())
    }

    /// Get the path for a slice file
    fn slice_path(&self, slice: &str) -> PathBuf {
        self.data_dir.join(format!("{}.json", slice))
    }

    /// Serialize one slice and write it to its file
    async fn write_slice<T: Serialize>(&self, slice: &str, value: &T) -> SessionResult<()> {
        // Ensure the data directory exists
        fs::create_dir_all(&self.data_dir)
            .await
            .map_err(|e| errors::storage_write_failed(slice, e))?;

        let json = serde_json::to_string_pretty(value)
            .map_err(|e| errors::storage_write_failed(slice, e))?;

        let path = self.slice_path(slice);
        fs::write(&path, json)
            .await
            .map_err(|e| errors::storage_write_failed(slice, e))?;
        debug!(slice, path = %path.display(), "Persisted session slice");

        Ok(())
    }

    /// Read one slice back from its file
    async fn read_slice<T: DeserializeOwned>(&self, slice: &str) -> SessionResult<Option<T>> {
        let path = self.slice_path(slice);
        if !path.exists() {
            return Ok(None);
        }

        let json = fs::read_to_string(&path)
            .await
            .map_err(|e| errors::storage_read_failed(slice, e))?;

        let value = serde_json::from_str(&json)
            .map_err(|e| errors::storage_read_failed(slice, e))?;
        debug!(slice, "Restored session slice");

        Ok(Some(value))
    }
}
