// Error handling module
// Defines the client error type and user-facing status classification

use thiserror::Error;

/// User-facing classification of a failed call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Transport could not reach the server at all
    Offline,
    BadRequest,
    SessionExpired,
    Forbidden,
    NotFound,
    RateLimited,
    /// 5xx, or no status at all
    Unavailable,
    Other,
}

impl ErrorClass {
    /// Classify by HTTP status (`None` means no response was received)
    pub fn from_status(status: Option<u16>) -> Self {
        match status {
            None => ErrorClass::Unavailable,
            Some(400) => ErrorClass::BadRequest,
            Some(401) => ErrorClass::SessionExpired,
            Some(403) => ErrorClass::Forbidden,
            Some(404) => ErrorClass::NotFound,
            Some(429) => ErrorClass::RateLimited,
            Some(s) if s >= 500 => ErrorClass::Unavailable,
            Some(_) => ErrorClass::Other,
        }
    }

    /// Sanitized message safe to show to the user
    pub fn message(self) -> &'static str {
        match self {
            ErrorClass::Offline => "No internet connection. Check your network and try again.",
            ErrorClass::BadRequest => "Invalid request. Please check your input.",
            ErrorClass::SessionExpired => "Your session has expired. Please log in again.",
            ErrorClass::Forbidden => "You do not have permission to perform this action.",
            ErrorClass::NotFound => "The requested resource was not found.",
            ErrorClass::RateLimited => "Too many requests. Please slow down and try again.",
            ErrorClass::Unavailable => "Service is temporarily unavailable. Please try again later.",
            ErrorClass::Other => "Request failed. Please try again.",
        }
    }
}

/// Errors returned by the API client
///
/// `Display` always yields the sanitized user message. Raw response bodies
/// and transport details stay reachable through the fields and `source()`.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Server answered with a non-success status
    #[error("{message}")]
    Status {
        status: u16,
        message: &'static str,
        body: String,
    },

    /// No response was received
    #[error("{message}")]
    Network {
        message: &'static str,
        #[source]
        source: reqwest::Error,
    },

    /// Refresh-token exchange failed; the local session has been cleared
    #[error("{0}")]
    Refresh(#[source] Box<ApiError>),

    /// Success response whose body could not be decoded
    #[error("{}", ErrorClass::Other.message())]
    Decode {
        status: u16,
        #[source]
        source: anyhow::Error,
    },

    /// Local failure (storage, request construction)
    #[error("{}", ErrorClass::Unavailable.message())]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    /// Build an error for a non-success response
    pub fn status(status: u16, body: String) -> Self {
        ApiError::Status {
            status,
            message: ErrorClass::from_status(Some(status)).message(),
            body,
        }
    }

    /// Build an error for a transport failure
    pub fn network(source: reqwest::Error) -> Self {
        let class = if source.is_connect() {
            ErrorClass::Offline
        } else {
            ErrorClass::from_status(None)
        };
        ApiError::Network {
            message: class.message(),
            source,
        }
    }

    /// HTTP status of the failure, if a response was received
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } | ApiError::Decode { status, .. } => Some(*status),
            ApiError::Refresh(inner) => inner.status_code(),
            ApiError::Network { .. } | ApiError::Internal(_) => None,
        }
    }

    /// Classification used for the user message
    pub fn class(&self) -> ErrorClass {
        match self {
            ApiError::Network { source, .. } if source.is_connect() => ErrorClass::Offline,
            ApiError::Refresh(inner) => inner.class(),
            ApiError::Decode { .. } => ErrorClass::Other,
            _ => ErrorClass::from_status(self.status_code()),
        }
    }

    /// Sanitized message for display
    pub fn user_message(&self) -> &'static str {
        self.class().message()
    }

    /// True when the failure is server-class (no status or 5xx)
    ///
    /// A body that fails to decode after a success status is not.
    pub fn is_server_failure(&self) -> bool {
        self.status_code().map_or(true, |s| s >= 500)
    }

    /// True when the error came from a failed refresh-token exchange
    pub fn is_refresh_failure(&self) -> bool {
        matches!(self, ApiError::Refresh(_))
    }
}

/// Result type alias for API operations
pub type Result<T> = std::result::Result<T, ApiError>;
