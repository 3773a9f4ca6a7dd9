/// Errors from the HTTP layer (gateway and login).
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The server returned a non-2xx status code.
    #[error("{message} ({status})")]
    Api {
        /// HTTP status code.
        status: u16,
        /// The `error` field of the response body, or the raw body.
        message: String,
    },
}

impl GatewayError {
    /// Whether the server rejected the credential.
    ///
    /// The server marks authentication failures with a 401 and a message
    /// mentioning the token.
    pub fn is_unauthorized(&self) -> bool {
        match self {
            GatewayError::Api { status, message } => *status == 401 || message.contains("Token"),
            GatewayError::Request(_) => false,
        }
    }
}

/// Errors surfaced to callers of the client core.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Input rejected before any local or remote change.
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// Missing or malformed configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<airdrop_core::error::CoreError> for ClientError {
    fn from(err: airdrop_core::error::CoreError) -> Self {
        match err {
            airdrop_core::error::CoreError::Validation(msg) => ClientError::Validation(msg),
            other => ClientError::Validation(other.to_string()),
        }
    }
}
