use thiserror::Error;

/// Maximum number of error body characters kept from a backend response.
pub(crate) const MAX_ERROR_CHARS: usize = 200;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("session rejected as unauthorized")]
    Unauthorized,
    #[error("network error: {0}")]
    Network(String),
    #[error("request timed out after {0} seconds")]
    Timeout(u64),
    #[error("request failed ({status}): {message}")]
    Http { status: u16, message: String },
    #[error("invalid response: {0}")]
    Parse(String),
    #[error("token storage error: {0}")]
    Storage(String),
    #[error("config error: {0}")]
    Config(String),
    #[error("superseded by a newer session change")]
    Superseded,
}

impl Error {
    /// Errors worth retrying: the backend may answer differently next time.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Network(_) | Error::Timeout(_) => true,
            Error::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// The backend rejected the credentials, as opposed to failing to answer.
    #[must_use]
    pub fn is_credential(&self) -> bool {
        matches!(self, Error::InvalidCredentials)
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Error::Parse(err.to_string())
        } else {
            Error::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Parse(err.to_string())
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

pub(crate) fn truncate_message(body: &str) -> String {
    body.trim().chars().take(MAX_ERROR_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_errors() {
        assert!(Error::Network("reset".to_string()).is_transient());
        assert!(Error::Timeout(10).is_transient());
        assert!(Error::Http {
            status: 503,
            message: String::new()
        }
        .is_transient());
        assert!(!Error::Http {
            status: 404,
            message: String::new()
        }
        .is_transient());
        assert!(!Error::Unauthorized.is_transient());
        assert!(!Error::InvalidCredentials.is_transient());
    }

    #[test]
    fn credential_errors_are_distinct_from_server_failures() {
        assert!(Error::InvalidCredentials.is_credential());
        assert!(!Error::Network("down".to_string()).is_credential());
        assert!(!Error::Http {
            status: 500,
            message: "boom".to_string()
        }
        .is_credential());
    }

    #[test]
    fn truncate_message_limits_length() {
        let body = "x".repeat(500);
        assert_eq!(truncate_message(&body).len(), MAX_ERROR_CHARS);
        assert_eq!(truncate_message("  short \n"), "short");
    }
}
