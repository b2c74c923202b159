//! Configuration loading from `.env` files.

use std::{env, path::PathBuf};

use anyhow::{Context, Result};

/// Runtime settings derived from environment variables.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Root directory for all storage.
    pub store_root: PathBuf,
    /// HTTP bind address, e.g. `127.0.0.1:7780`. Only `serve` needs it.
    pub bind_http: Option<String>,
    /// Reject events with a bad id or signature before they reach disk.
    pub verify_sig: bool,
    /// Default signing key (hex) for `new-game` and `play`.
    pub secret_key: Option<String>,
}

impl Settings {
    /// Load settings from the specified `.env` file.
    pub fn from_env(path: &str) -> Result<Self> {
        dotenvy::from_filename(path).context("reading env file")?;
        let store_root = PathBuf::from(env::var("STORE_ROOT").context("STORE_ROOT is not set")?);
        let bind_http = non_empty(env::var("BIND_HTTP").ok());
        let verify_sig = env::var("VERIFY_SIG").unwrap_or_else(|_| "0".into()) == "1";
        let secret_key = non_empty(env::var("SECRET_KEY").ok());
        Ok(Self {
            store_root,
            bind_http,
            verify_sig,
            secret_key,
        })
    }

    /// The HTTP bind address, or an error naming the missing variable.
    pub fn require_bind_http(&self) -> Result<&str> {
        self.bind_http.as_deref().context("BIND_HTTP is not set")
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
