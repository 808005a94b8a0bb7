//! Object storage credentials
//!
//! Credentials are resolved on every request so rotated keys (and session
//! tokens issued to a workload identity) take effect without a restart.

use crate::error::{Result, SeparationError};
use stemsplit_common::config::ObjectStorageConfig;

/// HMAC access key pair, plus optional session token
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

pub trait CredentialProvider: Send + Sync {
    fn credentials(&self) -> Result<Credentials>;
}

/// Reads credentials from environment variables named in the config
#[derive(Debug, Clone)]
pub struct EnvCredentialProvider {
    access_key_env: String,
    secret_key_env: String,
    session_token_env: String,
}

impl EnvCredentialProvider {
    pub fn new(
        access_key_env: impl Into<String>,
        secret_key_env: impl Into<String>,
        session_token_env: impl Into<String>,
    ) -> Self {
        Self {
            access_key_env: access_key_env.into(),
            secret_key_env: secret_key_env.into(),
            session_token_env: session_token_env.into(),
        }
    }

    pub fn from_config(config: &ObjectStorageConfig) -> Self {
        Self::new(
            config.access_key_env.clone(),
            config.secret_key_env.clone(),
            config.session_token_env.clone(),
        )
    }

    fn required(&self, name: &str) -> Result<String> {
        std::env::var(name)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| {
                SeparationError::StorageUnavailable(format!(
                    "credential environment variable {} is not set",
                    name
                ))
            })
    }
}

impl CredentialProvider for EnvCredentialProvider {
    fn credentials(&self) -> Result<Credentials> {
        Ok(Credentials {
            access_key_id: self.required(&self.access_key_env)?,
            secret_access_key: self.required(&self.secret_key_env)?,
            session_token: std::env::var(&self.session_token_env)
                .ok()
                .filter(|v| !v.trim().is_empty()),
        })
    }
}

/// Fixed credentials, for tests and embedded use
#[derive(Debug, Clone)]
pub struct StaticCredentialProvider(pub Credentials);

impl CredentialProvider for StaticCredentialProvider {
    fn credentials(&self) -> Result<Credentials> {
        Ok(self.0.clone())
    }
}
