//! Error types for the orderpulse dashboard core.
//!
//! Fetch failures are split into hard failures that abort a refresh cycle
//! (`Auth`) and soft failures that only degrade the affected table
//! (`SchemaUnavailable`, `TransientFetch`). Configuration failures halt the
//! loop before any fetch is issued.

use thiserror::Error;

/// The primary error type for orderpulse operations.
#[derive(Error, Debug, Clone)]
pub enum DashboardError {
    /// Credential or permission problem reaching the warehouse
    #[error("Authentication error: {message}. {remediation}")]
    Auth { message: String, remediation: String },

    /// A view, table, or column does not exist upstream (yet)
    #[error("Schema unavailable: {message}")]
    SchemaUnavailable { message: String },

    /// Network failure, timeout, or other retryable fetch problem
    #[error("Transient fetch failure: {message}")]
    TransientFetch { message: String },

    /// Malformed or out-of-range configuration
    #[error("Configuration error for '{key}': {message}. {remediation}")]
    Configuration {
        key: String,
        message: String,
        remediation: String,
    },

    /// Arrow error
    #[error("Arrow error: {message}")]
    Arrow { message: String },

    /// I/O error
    #[error("I/O error: {message}")]
    Io { message: String },

    /// JSON error
    #[error("JSON error: {message}")]
    Json { message: String },

    /// The presentation consumer failed to render a frame
    #[error("Presentation error: {message}")]
    Presentation { message: String },

    /// Invalid argument
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    /// Internal error (bug in the dashboard core)
    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Default remediation hint attached to authentication failures.
pub const AUTH_REMEDIATION: &str = "Check the warehouse credentials: configure a service account \
     or application default credentials with read access to the dataset, \
     then trigger a manual refresh";

impl DashboardError {
    /// Create an authentication error with the default remediation hint.
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth {
            message: message.into(),
            remediation: AUTH_REMEDIATION.to_string(),
        }
    }

    /// Create a schema-unavailable error.
    pub fn schema_unavailable(message: impl Into<String>) -> Self {
        Self::SchemaUnavailable {
            message: message.into(),
        }
    }

    /// Create a transient fetch error.
    pub fn transient(message: impl Into<String>) -> Self {
        Self::TransientFetch {
            message: message.into(),
        }
    }

    /// Create a configuration error.
    pub fn configuration(
        key: impl Into<String>,
        message: impl Into<String>,
        remediation: impl Into<String>,
    ) -> Self {
        Self::Configuration {
            key: key.into(),
            message: message.into(),
            remediation: remediation.into(),
        }
    }

    /// Create a presentation error.
    pub fn presentation(message: impl Into<String>) -> Self {
        Self::Presentation {
            message: message.into(),
        }
    }

    /// Create an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether this failure must abort the current refresh cycle.
    pub fn is_hard(&self) -> bool {
        matches!(self, Self::Auth { .. } | Self::Configuration { .. })
    }

    /// Whether this failure is recovered locally by degrading one table.
    pub fn is_soft(&self) -> bool {
        matches!(
            self,
            Self::SchemaUnavailable { .. } | Self::TransientFetch { .. }
        )
    }

    /// Short label for the failure kind, used in warnings and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Auth { .. } => "auth",
            Self::SchemaUnavailable { .. } => "schema_unavailable",
            Self::TransientFetch { .. } => "transient_fetch",
            Self::Configuration { .. } => "configuration",
            Self::Arrow { .. } => "arrow",
            Self::Io { .. } => "io",
            Self::Json { .. } => "json",
            Self::Presentation { .. } => "presentation",
            Self::InvalidArgument { .. } => "invalid_argument",
            Self::Internal { .. } => "internal",
        }
    }
}

impl From<arrow::error::ArrowError> for DashboardError {
    fn from(err: arrow::error::ArrowError) -> Self {
        Self::Arrow {
            message: err.to_string(),
        }
    }
}

impl From<std::io::Error> for DashboardError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for DashboardError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json {
            message: err.to_string(),
        }
    }
}

/// Result type alias for orderpulse operations.
pub type Result<T> = std::result::Result<T, DashboardError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DashboardError::schema_unavailable("view v_age_preferences not found");
        assert_eq!(
            err.to_string(),
            "Schema unavailable: view v_age_preferences not found"
        );
    }

    #[test]
    fn test_auth_carries_remediation() {
        let err = DashboardError::auth("403 Forbidden");
        let text = err.to_string();
        assert!(text.starts_with("Authentication error: 403 Forbidden."));
        assert!(text.contains("manual refresh"));
    }

    #[test]
    fn test_classification() {
        assert!(DashboardError::auth("x").is_hard());
        assert!(!DashboardError::auth("x").is_soft());
        assert!(DashboardError::schema_unavailable("x").is_soft());
        assert!(DashboardError::transient("x").is_soft());
        assert!(!DashboardError::transient("x").is_hard());
        assert!(DashboardError::configuration("k", "m", "r").is_hard());
        assert_eq!(DashboardError::transient("x").kind(), "transient_fetch");
    }
}
