//! Storage Configuration - typed remote-storage settings
//!
//! Every field is optional. Without an access key id the session never
//! touches remote storage.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Remote-storage credentials and switches passed into every operation.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// S3 region (e.g. "eu-west-1")
    pub region: Option<String>,

    pub access_key_id: Option<String>,

    pub secret_access_key: Option<String>,

    /// Only set on the session when supplied
    pub session_token: Option<String>,

    /// Custom S3-compatible endpoint (localstack, minio)
    pub endpoint: Option<String>,

    /// Install the remote-storage runtime eagerly when the session opens,
    /// instead of activating it on first remote access
    pub install_extension: bool,
}

impl StorageConfig {
    /// Read configuration from the process environment.
    ///
    /// Empty variables are treated as absent. `IS_OFFLINE` accepts
    /// `1`, `true`, `yes` or `on` (case-insensitive).
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`StorageConfig::from_env`] with an injectable variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Self {
            region: get("AWS_REGION"),
            access_key_id: get("AWS_ACCESS_KEY_ID"),
            secret_access_key: get("AWS_SECRET_ACCESS_KEY"),
            session_token: get("AWS_SESSION_TOKEN"),
            endpoint: get("AWS_ENDPOINT_URL"),
            install_extension: get("IS_OFFLINE").map(|v| is_truthy(&v)).unwrap_or(false),
        }
    }

    pub fn with_credentials(
        mut self,
        region: impl Into<String>,
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
    ) -> Self {
        self.region = Some(region.into());
        self.access_key_id = Some(access_key_id.into());
        self.secret_access_key = Some(secret_access_key.into());
        self
    }

    pub fn with_session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(token.into());
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_install_extension(mut self, install: bool) -> Self {
        self.install_extension = install;
        self
    }

    /// Remote storage is set up only when an access key id is present.
    pub fn remote_enabled(&self) -> bool {
        self.access_key_id.as_deref().map(|k| !k.is_empty()).unwrap_or(false)
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

impl fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "***");
        f.debug_struct("StorageConfig")
            .field("region", &self.region)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &redact(&self.secret_access_key))
            .field("session_token", &redact(&self.session_token))
            .field("endpoint", &self.endpoint)
            .field("install_extension", &self.install_extension)
            .finish()
    }
}
