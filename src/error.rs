//! Client error handling
//!
//! Every fallible client operation maps into [`ClientError`]:
//! 1. Validation errors (local, raised before any network request)
//! 2. Authentication errors (missing, expired or unrefreshable tokens)
//! 3. Network errors (transport failures)
//! 4. Server errors (non-2xx answers carrying a message, passed through verbatim)

use std::error::Error as StdError;
use std::fmt;

// ============================================================================
// 1. DOMAIN-SPECIFIC ERROR TYPES
// ============================================================================

/// Local input validation errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    EmptyField(&'static str),
    InvalidFormat(&'static str),
    NotPositive(&'static str),
    BelowMinimum { minimum: u64, amount: u64 },
    InvalidAadhaar,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::EmptyField(field) => write!(f, "{} is empty", field),
            ValidationError::InvalidFormat(field) => write!(f, "{} has invalid format", field),
            ValidationError::NotPositive(field) => write!(f, "{} must be greater than zero", field),
            ValidationError::BelowMinimum { minimum, amount } => write!(
                f,
                "Bid of {} Connects is below the current minimum of {} Connects",
                amount, minimum
            ),
            ValidationError::InvalidAadhaar => {
                write!(f, "Aadhaar number must be exactly 12 digits")
            }
        }
    }
}

impl StdError for ValidationError {}

/// Authentication errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// No access token is stored.
    MissingToken,
    /// No refresh token is stored.
    MissingRefreshToken,
    /// The refresh endpoint refused the stored refresh token.
    RefreshRejected { status: u16 },
    /// A 401 could not be recovered by refreshing; stored tokens were cleared.
    AuthenticationFailed,
    /// The result belongs to a session that was replaced while the request was in flight.
    Superseded,
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::MissingToken => write!(f, "Authentication token not found"),
            AuthError::MissingRefreshToken => write!(f, "Refresh token not found"),
            AuthError::RefreshRejected { status } => {
                write!(f, "Token refresh rejected (status {})", status)
            }
            AuthError::AuthenticationFailed => write!(f, "Authentication failed"),
            AuthError::Superseded => write!(f, "Session changed while the request was in flight"),
        }
    }
}

impl StdError for AuthError {}

// ============================================================================
// 2. UNIFIED CLIENT ERROR TYPE
// ============================================================================

#[derive(Debug)]
pub enum ClientError {
    Validation(ValidationError),
    Auth(AuthError),
    /// Transport failure or an unreadable response body.
    Network(String),
    /// Non-2xx (or `success: false`) answer with the server-supplied message.
    Server { status: u16, message: String },
    Config(String),
}

impl ClientError {
    /// Text suitable for showing to the user.
    ///
    /// Server messages are returned untouched; transport failures collapse to
    /// a generic "Network error".
    pub fn user_message(&self) -> String {
        match self {
            ClientError::Server { message, .. } => message.clone(),
            ClientError::Network(_) => "Network error".to_string(),
            other => other.to_string(),
        }
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, ClientError::Auth(_))
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, ClientError::Validation(_))
    }
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::Validation(e) => write!(f, "{}", e),
            ClientError::Auth(e) => write!(f, "{}", e),
            ClientError::Network(msg) => write!(f, "Network error: {}", msg),
            ClientError::Server { status, message } => {
                write!(f, "Server error ({}): {}", status, message)
            }
            ClientError::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl StdError for ClientError {}

// ============================================================================
// FROM IMPLEMENTATIONS
// ============================================================================

impl From<ValidationError> for ClientError {
    fn from(err: ValidationError) -> Self {
        ClientError::Validation(err)
    }
}

impl From<AuthError> for ClientError {
    fn from(err: AuthError) -> Self {
        ClientError::Auth(err)
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        ClientError::Network(err.to_string())
    }
}

impl From<config::ConfigError> for ClientError {
    fn from(err: config::ConfigError) -> Self {
        ClientError::Config(err.to_string())
    }
}

// ============================================================================
// 3. ERROR CONTEXT ENRICHMENT
// ============================================================================

/// Error context for structured failure logging
#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub request_id: String,
    pub user_id: Option<String>,
    pub operation: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl ErrorContext {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            user_id: None,
            operation: operation.into(),
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn with_user_id(mut self, user_id: impl ToString) -> Self {
        self.user_id = Some(user_id.to_string());
        self
    }

    pub fn log_error(&self, error: &ClientError) {
        let context = serde_json::json!({
            "request_id": self.request_id,
            "operation": self.operation,
            "user_id": self.user_id,
            "timestamp": self.timestamp.to_rfc3339(),
        });

        match error {
            ClientError::Validation(_) => {
                tracing::debug!(error = %error, context = ?context, "Validation error");
            }
            ClientError::Auth(_) => {
                tracing::warn!(error = %error, context = ?context, "Authentication error");
            }
            ClientError::Network(_) => {
                tracing::warn!(error = %error, context = ?context, "Network error");
            }
            ClientError::Server { status, .. } if *status >= 500 => {
                tracing::error!(error = %error, context = ?context, "Server error");
            }
            ClientError::Server { .. } => {
                tracing::warn!(error = %error, context = ?context, "Request refused by server");
            }
            ClientError::Config(_) => {
                tracing::error!(error = %error, context = ?context, "Configuration error");
            }
        }
    }
}
