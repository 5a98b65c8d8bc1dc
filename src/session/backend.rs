//! Client for the dashboard backend's authentication endpoints. Responses are
//! mapped onto `Error` so callers can tell rejected credentials apart from
//! transport or server failures. Request bodies and bearer headers carry
//! secrets and are never logged.

use super::{error::truncate_message, Credentials, Error, Grant, Result, Token, UserIdentity};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

pub const LOGIN_PATH: &str = "/auth/login";
pub const REFRESH_PATH: &str = "/auth/refresh";
pub const ME_PATH: &str = "/auth/me";
pub const LOGOUT_PATH: &str = "/auth/logout";

/// Authentication operations offered by the backend.
#[async_trait]
pub trait AuthBackend: Send + Sync {
    /// Exchange credentials for a token and identity.
    async fn login(&self, credentials: &Credentials) -> Result<Grant>;

    /// Trade the current token for a fresh one.
    async fn refresh(&self, token: &Token) -> Result<Grant>;

    /// Resolve the identity behind a token, failing with `Unauthorized` when
    /// the token is no longer accepted.
    async fn validate(&self, token: &Token) -> Result<UserIdentity>;

    /// Revoke the token server side.
    async fn logout(&self, token: &Token) -> Result<()>;
}

#[derive(Deserialize)]
struct GrantResponse {
    token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    expires_in: u64,
    user: UserIdentity,
}

impl From<GrantResponse> for Grant {
    fn from(response: GrantResponse) -> Self {
        Grant {
            token: Token::expiring_in(response.token, response.refresh_token, response.expires_in),
            user: response.user,
        }
    }
}

/// `reqwest` implementation of [`AuthBackend`].
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl HttpBackend {
    /// # Errors
    /// Returns `Error::Config` if `base_url` is not an http(s) URL or the HTTP
    /// client cannot be built.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let url = Url::parse(base_url.trim())
            .map_err(|err| Error::Config(format!("invalid API URL {base_url}: {err}")))?;

        match url.scheme() {
            "http" | "https" => {}
            scheme => {
                return Err(Error::Config(format!(
                    "unsupported API URL scheme {scheme}"
                )))
            }
        }

        if url.host().is_none() {
            return Err(Error::Config(format!("API URL {base_url} has no host")));
        }

        let client = Client::builder()
            .user_agent(crate::APP_USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|err| Error::Config(format!("failed to build HTTP client: {err}")))?;

        Ok(Self {
            client,
            base_url: url.as_str().trim_end_matches('/').to_string(),
            timeout,
        })
    }

    #[must_use]
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn transport_error(&self, err: reqwest::Error) -> Error {
        if err.is_timeout() {
            Error::Timeout(self.timeout.as_secs())
        } else {
            Error::from(err)
        }
    }

    async fn grant(&self, response: Response) -> Result<Grant> {
        let body: GrantResponse = response
            .json()
            .await
            .map_err(|err| Error::Parse(format!("grant: {err}")))?;
        Ok(body.into())
    }
}

/// Maps a non-success response. `login` decides whether 401/403 means the
/// credentials were wrong or an existing token was rejected.
async fn rejection(response: Response, login: bool) -> Error {
    let status = response.status();

    if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN)
        || (login && status == StatusCode::BAD_REQUEST)
    {
        return if login {
            Error::InvalidCredentials
        } else {
            Error::Unauthorized
        };
    }

    let body = response.text().await.unwrap_or_default();

    Error::Http {
        status: status.as_u16(),
        message: truncate_message(&body),
    }
}

#[async_trait]
impl AuthBackend for HttpBackend {
    #[instrument(skip(self, credentials), fields(email = %credentials.email))]
    async fn login(&self, credentials: &Credentials) -> Result<Grant> {
        let url = self.endpoint(LOGIN_PATH);

        let response = self
            .client
            .post(&url)
            .json(&json!({
                "email": credentials.email,
                "password": credentials.password.expose_secret(),
            }))
            .send()
            .await
            .map_err(|err| self.transport_error(err))?;

        if !response.status().is_success() {
            return Err(rejection(response, true).await);
        }

        debug!("login accepted");

        self.grant(response).await
    }

    #[instrument(skip(self, token))]
    async fn refresh(&self, token: &Token) -> Result<Grant> {
        let url = self.endpoint(REFRESH_PATH);

        let refresh_token = token.refresh().unwrap_or_else(|| token.access());

        let response = self
            .client
            .post(&url)
            .bearer_auth(token.access().expose_secret())
            .json(&json!({ "refresh_token": refresh_token.expose_secret() }))
            .send()
            .await
            .map_err(|err| self.transport_error(err))?;

        if !response.status().is_success() {
            return Err(rejection(response, false).await);
        }

        self.grant(response).await
    }

    #[instrument(skip(self, token))]
    async fn validate(&self, token: &Token) -> Result<UserIdentity> {
        let url = self.endpoint(ME_PATH);

        let response = self
            .client
            .get(&url)
            .bearer_auth(token.access().expose_secret())
            .send()
            .await
            .map_err(|err| self.transport_error(err))?;

        if !response.status().is_success() {
            return Err(rejection(response, false).await);
        }

        response
            .json::<UserIdentity>()
            .await
            .map_err(|err| Error::Parse(format!("identity: {err}")))
    }

    #[instrument(skip(self, token))]
    async fn logout(&self, token: &Token) -> Result<()> {
        let url = self.endpoint(LOGOUT_PATH);

        let response = self
            .client
            .post(&url)
            .bearer_auth(token.access().expose_secret())
            .send()
            .await
            .map_err(|err| self.transport_error(err))?;

        // Already revoked counts as done.
        if response.status().is_success() || response.status() == StatusCode::UNAUTHORIZED {
            return Ok(());
        }

        Err(rejection(response, false).await)
    }
}
