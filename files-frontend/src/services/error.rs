use service_core::error::AppError;
use service_core::retry::RetryClass;
use thiserror::Error;

/// Failure taxonomy for the token broker and its collaborators.
///
/// "Needs interactive" is deliberately NOT represented here: silent
/// acquisition models it as a normal outcome (`SilentOutcome`), because
/// the caller reacts by issuing a redirect, not by failing the request.
/// The `InteractionRequired` variant below exists only so the
/// `TokenProvider` seam can surface a consent revoked between the flow
/// controller's acquisition and a downstream client's use of the token.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// Network or service failure that may succeed on retry.
    #[error("transient failure talking to {service}: {message}")]
    Transient {
        service: &'static str,
        message: String,
    },

    /// Misconfigured client credentials or resource identifier. Never retried.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Capability discovery failed; retry policy belongs to the caller.
    #[error("capability resolution failed for '{capability}': {message}")]
    Resolution {
        capability: String,
        message: String,
    },

    /// CSRF state missing, expired, or already consumed. Always an
    /// authentication failure, never "proceed anyway".
    #[error("invalid or expired authorization state")]
    InvalidState,

    /// Silent acquisition needed user interaction at the token-provider
    /// seam. The flow controller converts this back into a redirect.
    #[error("silent acquisition requires user interaction")]
    InteractionRequired,

    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),
}

impl RetryClass for BrokerError {
    fn is_transient(&self) -> bool {
        matches!(self, BrokerError::Transient { .. })
    }
}

impl From<BrokerError> for AppError {
    fn from(err: BrokerError) -> Self {
        match err {
            BrokerError::Transient { .. } => AppError::BadGateway(err.to_string()),
            BrokerError::Configuration(msg) => AppError::ConfigError(anyhow::anyhow!(msg)),
            BrokerError::Resolution { .. } => AppError::BadGateway(err.to_string()),
            BrokerError::InvalidState => {
                AppError::AuthError(anyhow::anyhow!("invalid or expired authorization state"))
            }
            BrokerError::InteractionRequired => {
                AppError::AuthError(anyhow::anyhow!("authorization required"))
            }
            BrokerError::Store(e) => AppError::DatabaseError(anyhow::Error::new(e)),
        }
    }
}
