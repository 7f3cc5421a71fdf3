//! Runtime configuration for the QA batch harness.
//!
//! Everything is an explicit struct passed into the client and pipeline at
//! construction; nothing reads the environment after startup. Credentials are
//! required from the environment on purpose: the upstream API is undocumented
//! and there is no safe default account to fall back to.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::PipelineError;

const DEFAULT_BASE_URL: &str = "https://app-adt-11.azurewebsites.net";
const DEFAULT_TOKEN_PATH: &str = "/auth/token";
const DEFAULT_MESSAGE_PATH: &str = "/message";

/// Token endpoint timeout. Auth either answers quickly or not at all.
pub const TOKEN_TIMEOUT: Duration = Duration::from_secs(15);
/// Message endpoint timeout. Answer generation downstream is slow.
pub const MESSAGE_TIMEOUT: Duration = Duration::from_secs(120);

/// Account used against the token endpoint.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub client_id: String,
}

impl Credentials {
    /// Read credentials from `API_USERNAME` / `API_PASSWORD` / `API_CLIENT_ID`.
    ///
    /// Username and password have no fallback; a missing value is a
    /// configuration error, not a silent default.
    pub fn from_env() -> Result<Self, PipelineError> {
        let username = require_env("API_USERNAME")?;
        let password = require_env("API_PASSWORD")?;
        let client_id = env::var("API_CLIENT_ID").unwrap_or_else(|_| "Bearer".to_string());

        Ok(Self {
            username,
            password,
            client_id,
        })
    }
}

fn require_env(key: &str) -> Result<String, PipelineError> {
    match env::var(key) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(PipelineError::Validation(format!(
            "{} must be set in the environment",
            key
        ))),
    }
}

/// Remote API endpoints plus the credentials used against them.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub base_url: String,
    pub token_path: String,
    pub message_path: String,
    pub credentials: Credentials,
}

impl ApiConfig {
    pub fn from_env() -> Result<Self, PipelineError> {
        Ok(Self {
            base_url: env::var("API_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
            token_path: env::var("API_TOKEN_PATH")
                .unwrap_or_else(|_| DEFAULT_TOKEN_PATH.to_string()),
            message_path: env::var("API_MESSAGE_PATH")
                .unwrap_or_else(|_| DEFAULT_MESSAGE_PATH.to_string()),
            credentials: Credentials::from_env()?,
        })
    }

    pub fn with_credentials(base_url: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            base_url: base_url.into(),
            token_path: DEFAULT_TOKEN_PATH.to_string(),
            message_path: DEFAULT_MESSAGE_PATH.to_string(),
            credentials,
        }
    }

    pub fn token_url(&self) -> String {
        format!("{}{}", self.base_url, self.token_path)
    }

    pub fn message_url(&self) -> String {
        format!("{}{}", self.base_url, self.message_path)
    }
}

/// Local directories for run artifacts.
#[derive(Debug, Clone)]
pub struct RunDirs {
    /// Processed spreadsheets (and uploads persisted by the server).
    pub output: PathBuf,
    /// Per-row JSON snapshots.
    pub messages: PathBuf,
}

impl RunDirs {
    pub fn from_env() -> Self {
        Self {
            output: env::var("QA_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("output")),
            messages: env::var("QA_MESSAGES_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("messages")),
        }
    }

    /// Create both directories if they do not exist yet.
    pub fn ensure(&self) -> Result<(), PipelineError> {
        std::fs::create_dir_all(&self.output)?;
        std::fs::create_dir_all(&self.messages)?;
        Ok(())
    }
}
