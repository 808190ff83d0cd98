use thiserror::Error;

/// Type alias for Result with DriveError
pub type Result<T> = std::result::Result<T, DriveError>;

/// Error types for the Drive provisioning layer
#[derive(Error, Debug)]
pub enum DriveError {
    /// Network failure while talking to the OAuth token endpoint
    #[error("Token endpoint unreachable: {0}")]
    AuthTransport(String),

    /// Stored credentials cannot be refreshed; the interactive flow must run again
    #[error("Re-authentication required: {0}")]
    ReauthRequired(String),

    /// The user denied consent or the authorization code was rejected
    #[error("Authorization failed: {0}")]
    AuthorizationFailed(String),

    /// Drive returned a non-2xx response
    #[error("Drive API error (HTTP {status}): {body}")]
    RemoteApi { status: u16, body: String },

    /// Resource not found (404) where absence is a valid outcome
    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    /// Network-related error talking to Drive (connection issues, TLS, etc.)
    #[error("Network error: {0}")]
    Transport(String),

    /// A 2xx response whose body could not be understood
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// IO error (file operations, etc.)
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// Discriminant of [`DriveError`], for callers that branch on the kind of
/// failure instead of matching message text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    AuthTransport,
    ReauthRequired,
    AuthorizationFailed,
    RemoteApi,
    ResourceNotFound,
    Transport,
    InvalidResponse,
    Config,
    Io,
    Serialization,
}

impl DriveError {
    /// Build an API error from a non-2xx status and the raw response body
    pub fn remote(status: u16, body: impl Into<String>) -> Self {
        DriveError::RemoteApi {
            status,
            body: body.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            DriveError::AuthTransport(_) => ErrorKind::AuthTransport,
            DriveError::ReauthRequired(_) => ErrorKind::ReauthRequired,
            DriveError::AuthorizationFailed(_) => ErrorKind::AuthorizationFailed,
            DriveError::RemoteApi { .. } => ErrorKind::RemoteApi,
            DriveError::ResourceNotFound(_) => ErrorKind::ResourceNotFound,
            DriveError::Transport(_) => ErrorKind::Transport,
            DriveError::InvalidResponse(_) => ErrorKind::InvalidResponse,
            DriveError::ConfigError(_) => ErrorKind::Config,
            DriveError::IoError(_) => ErrorKind::Io,
            DriveError::SerializationError(_) => ErrorKind::Serialization,
        }
    }

    /// HTTP status carried by the error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            DriveError::RemoteApi { status, .. } => Some(*status),
            DriveError::ResourceNotFound(_) => Some(404),
            _ => None,
        }
    }

    /// Check if the error is transient and a caller-side retry may succeed
    ///
    /// Nothing in this crate retries on its own; this only informs the caller.
    pub fn is_transient(&self) -> bool {
        match self {
            DriveError::AuthTransport(_) | DriveError::Transport(_) => true,
            DriveError::RemoteApi { status, .. } => *status == 429 || (500..=599).contains(status),
            _ => false,
        }
    }

    /// Check if the error is permanent and should not be retried
    pub fn is_permanent(&self) -> bool {
        !self.is_transient()
    }

    /// Whether the caller has to restart the interactive authorization flow
    pub fn needs_reauth(&self) -> bool {
        matches!(self, DriveError::ReauthRequired(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_errors() {
        let throttled = DriveError::remote(429, "rateLimitExceeded");
        assert!(throttled.is_transient());
        assert!(!throttled.is_permanent());

        let server_error = DriveError::remote(503, "backendError");
        assert!(server_error.is_transient());

        let network_error = DriveError::Transport("connection reset".to_string());
        assert!(network_error.is_transient());

        let token_endpoint = DriveError::AuthTransport("dns failure".to_string());
        assert!(token_endpoint.is_transient());
    }

    #[test]
    fn test_permanent_errors() {
        let forbidden = DriveError::remote(403, "insufficientPermissions");
        assert!(forbidden.is_permanent());

        let not_found = DriveError::ResourceNotFound("folder-1".to_string());
        assert!(not_found.is_permanent());

        let reauth = DriveError::ReauthRequired("invalid_grant".to_string());
        assert!(reauth.is_permanent());
        assert!(reauth.needs_reauth());
    }

    #[test]
    fn test_kind_discriminant() {
        assert_eq!(DriveError::remote(500, "x").kind(), ErrorKind::RemoteApi);
        assert_eq!(
            DriveError::ReauthRequired("x".into()).kind(),
            ErrorKind::ReauthRequired
        );
        assert_eq!(
            DriveError::AuthTransport("x".into()).kind(),
            ErrorKind::AuthTransport
        );
        assert_eq!(
            DriveError::ConfigError("x".into()).kind(),
            ErrorKind::Config
        );
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk");
        assert_eq!(DriveError::from(io).kind(), ErrorKind::Io);
    }

    #[test]
    fn test_error_display_keeps_body() {
        let error = DriveError::remote(400, r#"{"error":{"message":"Invalid query"}}"#);
        let display = format!("{}", error);
        assert!(display.contains("HTTP 400"));
        assert!(display.contains("Invalid query"));
        assert_eq!(error.status(), Some(400));
    }
}
