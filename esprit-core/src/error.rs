use thiserror::Error;

/// Errors the dispatch core can surface to its caller.
///
/// Every variant carries a short human-readable `message` plus an optional
/// `details` field for provider diagnostics (status text, raw body, …).
/// None of these should ever reach a user as a stack trace — callers are
/// expected to render `message` (and `details` only in verbose mode).
#[derive(Debug, Error)]
pub enum EspritError {
    #[error("{message}")]
    AuthenticationMissing { message: String, details: Option<String> },

    #[error("{message}")]
    AuthenticationExpired { message: String, details: Option<String> },

    #[error("{message}")]
    RateLimited { message: String, details: Option<String> },

    #[error("{message}")]
    ProviderUnreachable { message: String, details: Option<String> },

    #[error("{message}")]
    ProtocolError { message: String, details: Option<String> },

    #[error("{message}")]
    RequestFailed { message: String, details: Option<String> },

    #[error("{message}")]
    Aborted { message: String, details: Option<String> },
}

impl EspritError {
    pub fn auth_missing(message: impl Into<String>) -> Self {
        Self::AuthenticationMissing { message: message.into(), details: None }
    }

    pub fn auth_expired(message: impl Into<String>) -> Self {
        Self::AuthenticationExpired { message: message.into(), details: None }
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::RateLimited { message: message.into(), details: None }
    }

    pub fn provider_unreachable(message: impl Into<String>) -> Self {
        Self::ProviderUnreachable { message: message.into(), details: None }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::ProtocolError { message: message.into(), details: None }
    }

    pub fn request_failed(message: impl Into<String>) -> Self {
        Self::RequestFailed { message: message.into(), details: None }
    }

    pub fn aborted(message: impl Into<String>) -> Self {
        Self::Aborted { message: message.into(), details: None }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        let d = Some(details.into());
        match &mut self {
            Self::AuthenticationMissing { details: slot, .. }
            | Self::AuthenticationExpired { details: slot, .. }
            | Self::RateLimited { details: slot, .. }
            | Self::ProviderUnreachable { details: slot, .. }
            | Self::ProtocolError { details: slot, .. }
            | Self::RequestFailed { details: slot, .. }
            | Self::Aborted { details: slot, .. } => *slot = d,
        }
        self
    }

    /// The HTTP status code this error was raised from, when known.
    /// Carried separately by callers that need it for retry decisions —
    /// kept out of the enum itself so construction doesn't require one.
    pub fn details(&self) -> Option<&str> {
        match self {
            Self::AuthenticationMissing { details, .. }
            | Self::AuthenticationExpired { details, .. }
            | Self::RateLimited { details, .. }
            | Self::ProviderUnreachable { details, .. }
            | Self::ProtocolError { details, .. }
            | Self::RequestFailed { details, .. }
            | Self::Aborted { details, .. } => details.as_deref(),
        }
    }
}

pub type Result<T> = std::result::Result<T, EspritError>;
