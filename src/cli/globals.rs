use crate::session::{AuthProvider, FileStorage, HttpBackend, RefreshPolicy};
use anyhow::{Context, Result};
use std::{path::PathBuf, sync::Arc, time::Duration};

/// Arguments shared by every subcommand.
#[derive(Debug, Clone)]
pub struct GlobalArgs {
    pub api_url: String,
    pub token_file: PathBuf,
    pub timeout: Duration,
}

impl GlobalArgs {
    #[must_use]
    pub fn new(api_url: String, token_file: PathBuf, timeout: Duration) -> Self {
        Self {
            api_url,
            token_file,
            timeout,
        }
    }

    /// Build the provider every action talks to: HTTP backend, token file,
    /// default refresh policy bounded by `timeout`.
    ///
    /// # Errors
    /// Returns an error if the API URL is not a usable http(s) URL.
    pub fn provider(&self) -> Result<AuthProvider> {
        let backend = HttpBackend::new(&self.api_url, self.timeout)
            .with_context(|| format!("invalid API URL: {}", self.api_url))?;
        let storage = FileStorage::new(self.token_file.clone());
        let policy = RefreshPolicy::default().with_request_timeout(self.timeout);

        Ok(AuthProvider::new(Arc::new(backend), Arc::new(storage), policy))
    }
}
