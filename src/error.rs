use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, error, warn};

/// Structured error type for session operations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionError {
    /// Error code for programmatic handling
    pub code: ErrorCode,
    /// Human-readable error message
    pub message: String,
    /// Optional context for additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    /// Severity level
    pub severity: ErrorSeverity,
    /// Error category for retry policies and handling strategies
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<ErrorCategory>,
}

impl SessionError {
    /// Create a new error builder with the specified error code
    pub fn new(code: ErrorCode) -> SessionErrorBuilder {
        SessionErrorBuilder {
            code,
            message: String::new(),
            context: None,
            severity: ErrorSeverity::Error,
            category: None,
        }
    }

    /// Whether this error belongs to a retryable category
    pub fn is_retryable(&self) -> bool {
        self.category.map(|cat| cat.is_retryable()).unwrap_or(false)
    }

    /// Whether this error is a cancellation rather than a real failure
    pub fn is_cancelled(&self) -> bool {
        self.category == Some(ErrorCategory::Cancelled)
    }
}

/// Builder for creating SessionError instances
pub struct SessionErrorBuilder {
    code: ErrorCode,
    message: String,
    context: Option<String>,
    severity: ErrorSeverity,
    category: Option<ErrorCategory>,
}

impl SessionErrorBuilder {
    /// Set the error message
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Set the error context
    pub fn context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Set the error severity
    pub fn severity(mut self, severity: ErrorSeverity) -> Self {
        self.severity = severity;
        self
    }

    /// Set the error category
    pub fn category(mut self, category: ErrorCategory) -> Self {
        self.category = Some(category);
        self
    }

    /// Build the final SessionError
    pub fn build(self) -> SessionError {
        SessionError {
            code: self.code,
            message: self.message,
            context: self.context,
            severity: self.severity,
            category: self.category,
        }
    }
}

/// Error codes for different types of errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    // API request errors
    ApiRequestFailed,
    ApiResponseInvalid,
    ValidationRejected,
    ServiceUnavailable,

    // Authentication errors
    AuthTokenInvalid,
    AuthRejected,

    // Network errors
    NetworkTimeout,
    NetworkUnreachable,

    // Cancellation
    RequestCancelled,

    // Storage errors
    StorageReadFailed,
    StorageWriteFailed,
}

/// Session error types using thiserror
#[derive(Error, Debug, Clone)]
pub enum SessionErrorKind {
    // API request errors
    #[error("API request failed during {operation}: {reason}")]
    ApiRequestFailed { operation: String, reason: String },

    #[error("API response could not be decoded: {reason}")]
    ApiResponseInvalid { reason: String },

    #[error("Request rejected with HTTP {status}: {detail}")]
    ValidationRejected { status: u16, detail: String },

    #[error("Service failed with HTTP {status}: {detail}")]
    ServiceUnavailable { status: u16, detail: String },

    // Authentication errors
    #[error("Authentication token is invalid: {reason}")]
    AuthTokenInvalid { reason: String },

    #[error("Authorization rejected with HTTP {status}: {detail}")]
    AuthRejected { status: u16, detail: String },

    // Network errors
    #[error("Network timeout during {operation}")]
    NetworkTimeout { operation: String },

    #[error("Network unreachable during {operation}: {reason}")]
    NetworkUnreachable { operation: String, reason: String },

    // Cancellation
    #[error("Operation '{operation}' was cancelled")]
    RequestCancelled { operation: String },

    // Storage errors
    #[error("Failed to read persisted '{slice}' state: {reason}")]
    StorageReadFailed { slice: String, reason: String },

    #[error("Failed to write persisted '{slice}' state: {reason}")]
    StorageWriteFailed { slice: String, reason: String },
}

/// Severity levels for errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorSeverity {
    /// Informational messages that don't impact functionality
    Info,
    /// Warnings that might impact functionality but don't stop operation
    Warning,
    /// Errors that impact functionality but allow continued operation
    Error,
    /// Critical errors that prevent the application from functioning properly
    Critical,
}

/// Error categories for different retry strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Temporary network issues, timeouts, connection resets - usually retryable
    Network,
    /// Server-side failures (5xx) - retryable
    Service,
    /// Input rejected by the server (4xx other than 401) - not retryable without input changes
    Validation,
    /// Bearer token rejected - fatal to the session, never retried
    Authorization,
    /// Local persistence failures - best-effort, not retried
    Storage,
    /// Operation aborted by its cancellation token - not a real failure
    Cancelled,
    /// Internal errors in our code - generally not retryable
    Internal,
}

impl ErrorCategory {
    /// Returns true if errors in this category are generally retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network | Self::Service => true,

            Self::Validation
            | Self::Authorization
            | Self::Storage
            | Self::Cancelled
            | Self::Internal => false,
        }
    }
}

/// Retry policy for error recovery
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts
    pub max_retries: usize,
    /// Base delay between retries
    pub base_delay: Duration,
    /// Backoff factor for exponential backoff
    pub backoff_factor: f64,
    /// Maximum delay between retries
    pub max_delay: Option<Duration>,
    /// Whether to add jitter to the delay
    pub use_jitter: bool,
}

impl RetryPolicy {
    /// Create a new retry policy with no retries
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::from_millis(0),
            backoff_factor: 1.0,
            max_delay: None,
            use_jitter: false,
        }
    }

    /// Create a new retry policy with a fixed delay between retries
    pub fn fixed_delay(max_retries: usize, delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay: delay,
            backoff_factor: 1.0,
            max_delay: None,
            use_jitter: false,
        }
    }

    /// Create a new retry policy with exponential backoff
    pub fn exponential_backoff(
        max_retries: usize,
        base_delay: Duration,
        backoff_factor: f64,
        max_delay: Option<Duration>,
    ) -> Self {
        Self {
            max_retries,
            base_delay,
            backoff_factor,
            max_delay,
            use_jitter: true,
        }
    }

    /// Calculate the delay for a specific retry attempt
    pub fn calculate_delay(&self, attempt: usize) -> Duration {
        if attempt == 0 || attempt > self.max_retries {
            return Duration::from_millis(0);
        }

        // Calculate the base delay with exponential backoff
        let mut delay_ms =
            self.base_delay.as_millis() as f64 * self.backoff_factor.powf((attempt - 1) as f64);

        // Apply jitter if enabled (±25%)
        if self.use_jitter {
            // Use a simple deterministic jitter based on the attempt number
            // This avoids needing to import a random number generator
            let jitter_factor = 0.75 + ((attempt as f64 * 0.15) % 0.5);
            delay_ms *= jitter_factor;
        }

        // Cap at max_delay if specified
        if let Some(max_delay) = self.max_delay {
            delay_ms = delay_ms.min(max_delay.as_millis() as f64);
        }

        Duration::from_millis(delay_ms as u64)
    }
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(context) = &self.context {
            write!(f, "{}: {} ({})", self.code, self.message, context)
        } else {
            write!(f, "{}: {}", self.code, self.message)
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCode::ApiRequestFailed => write!(f, "API_REQUEST_FAILED"),
            ErrorCode::ApiResponseInvalid => write!(f, "API_RESPONSE_INVALID"),
            ErrorCode::ValidationRejected => write!(f, "VALIDATION_REJECTED"),
            ErrorCode::ServiceUnavailable => write!(f, "SERVICE_UNAVAILABLE"),
            ErrorCode::AuthTokenInvalid => write!(f, "AUTH_TOKEN_INVALID"),
            ErrorCode::AuthRejected => write!(f, "AUTH_REJECTED"),
            ErrorCode::NetworkTimeout => write!(f, "NETWORK_TIMEOUT"),
            ErrorCode::NetworkUnreachable => write!(f, "NETWORK_UNREACHABLE"),
            ErrorCode::RequestCancelled => write!(f, "REQUEST_CANCELLED"),
            ErrorCode::StorageReadFailed => write!(f, "STORAGE_READ_FAILED"),
            ErrorCode::StorageWriteFailed => write!(f, "STORAGE_WRITE_FAILED"),
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Network => write!(f, "Network"),
            ErrorCategory::Service => write!(f, "Service"),
            ErrorCategory::Validation => write!(f, "Validation"),
            ErrorCategory::Authorization => write!(f, "Authorization"),
            ErrorCategory::Storage => write!(f, "Storage"),
            ErrorCategory::Cancelled => write!(f, "Cancelled"),
            ErrorCategory::Internal => write!(f, "Internal"),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<SessionErrorKind> for SessionError {
    fn from(err: SessionErrorKind) -> Self {
        let (code, message, context, category, severity) = match &err {
            SessionErrorKind::ApiRequestFailed { operation, reason } => (
                ErrorCode::ApiRequestFailed,
                format!("API request failed during {}", operation),
                Some(reason.clone()),
                ErrorCategory::Network,
                ErrorSeverity::Error,
            ),

            SessionErrorKind::ApiResponseInvalid { reason } => (
                ErrorCode::ApiResponseInvalid,
                "API response could not be decoded".to_string(),
                Some(reason.clone()),
                ErrorCategory::Internal,
                ErrorSeverity::Error,
            ),

            SessionErrorKind::ValidationRejected { status, detail } => (
                ErrorCode::ValidationRejected,
                format!("Request rejected with HTTP {}", status),
                Some(detail.clone()),
                ErrorCategory::Validation,
                ErrorSeverity::Warning,
            ),

            SessionErrorKind::ServiceUnavailable { status, detail } => (
                ErrorCode::ServiceUnavailable,
                format!("Service failed with HTTP {}", status),
                Some(detail.clone()),
                ErrorCategory::Service,
                ErrorSeverity::Error,
            ),

            SessionErrorKind::AuthTokenInvalid { reason } => (
                ErrorCode::AuthTokenInvalid,
                "Authentication token is invalid".to_string(),
                Some(reason.clone()),
                ErrorCategory::Validation,
                ErrorSeverity::Error,
            ),

            SessionErrorKind::AuthRejected { status, detail } => (
                ErrorCode::AuthRejected,
                format!("Authorization rejected with HTTP {}", status),
                Some(detail.clone()),
                ErrorCategory::Authorization,
                ErrorSeverity::Error,
            ),

            SessionErrorKind::NetworkTimeout { operation } => (
                ErrorCode::NetworkTimeout,
                format!("Network timeout during {}", operation),
                None,
                ErrorCategory::Network,
                ErrorSeverity::Error,
            ),

            SessionErrorKind::NetworkUnreachable { operation, reason } => (
                ErrorCode::NetworkUnreachable,
                format!("Network unreachable during {}", operation),
                Some(reason.clone()),
                ErrorCategory::Network,
                ErrorSeverity::Error,
            ),

            SessionErrorKind::RequestCancelled { operation } => (
                ErrorCode::RequestCancelled,
                format!("Operation '{}' was cancelled", operation),
                None,
                ErrorCategory::Cancelled,
                ErrorSeverity::Info,
            ),

            SessionErrorKind::StorageReadFailed { slice, reason } => (
                ErrorCode::StorageReadFailed,
                format!("Failed to read persisted '{}' state", slice),
                Some(reason.clone()),
                ErrorCategory::Storage,
                ErrorSeverity::Warning,
            ),

            SessionErrorKind::StorageWriteFailed { slice, reason } => (
                ErrorCode::StorageWriteFailed,
                format!("Failed to write persisted '{}' state", slice),
                Some(reason.clone()),
                ErrorCategory::Storage,
                ErrorSeverity::Warning,
            ),
        };

        let mut builder = SessionError::new(code)
            .message(message)
            .category(category)
            .severity(severity);
        if let Some(context) = context {
            builder = builder.context(context);
        }
        builder.build()
    }
}

impl From<reqwest::Error> for SessionError {
    fn from(err: reqwest::Error) -> Self {
        let operation = err
            .url()
            .map(|url| url.path().to_string())
            .unwrap_or_else(|| "request".to_string());

        if err.is_timeout() {
            SessionErrorKind::NetworkTimeout { operation }.into()
        } else if err.is_decode() {
            SessionErrorKind::ApiResponseInvalid {
                reason: err.to_string(),
            }
            .into()
        } else if err.is_connect() {
            SessionErrorKind::NetworkUnreachable {
                operation,
                reason: err.to_string(),
            }
            .into()
        } else {
            SessionErrorKind::ApiRequestFailed {
                operation,
                reason: err.to_string(),
            }
            .into()
        }
    }
}

/// Custom Result type for session operations
pub type SessionResult<T> = Result<T, SessionError>;

/// Helper constructors for common session errors
pub mod errors {
    use super::*;
    use http::StatusCode;

    /// Map a non-success HTTP status to a session error
    pub fn from_status(
        operation: &str,
        status: StatusCode,
        detail: impl Into<String>,
    ) -> SessionError {
        let detail = detail.into();
        match status {
            StatusCode::UNAUTHORIZED => SessionErrorKind::AuthRejected {
                status: status.as_u16(),
                detail,
            }
            .into(),
            s if s.is_client_error() => SessionErrorKind::ValidationRejected {
                status: s.as_u16(),
                detail,
            }
            .into(),
            s if s.is_server_error() => SessionErrorKind::ServiceUnavailable {
                status: s.as_u16(),
                detail,
            }
            .into(),
            s => SessionErrorKind::ApiRequestFailed {
                operation: operation.to_string(),
                reason: format!("unexpected HTTP {}: {}", s, detail),
            }
            .into(),
        }
    }

    /// Create a cancellation error for an aborted operation
    pub fn request_cancelled(operation: impl Into<String>) -> SessionError {
        SessionErrorKind::RequestCancelled {
            operation: operation.into(),
        }
        .into()
    }

    /// Create an invalid token error
    pub fn auth_token_invalid(reason: impl fmt::Display) -> SessionError {
        SessionErrorKind::AuthTokenInvalid {
            reason: reason.to_string(),
        }
        .into()
    }

    /// Create a storage read error
    pub fn storage_read_failed(slice: &str, err: impl fmt::Display) -> SessionError {
        SessionErrorKind::StorageReadFailed {
            slice: slice.to_string(),
            reason: err.to_string(),
        }
        .into()
    }

    /// Create a storage write error
    pub fn storage_write_failed(slice: &str, err: impl fmt::Display) -> SessionError {
        SessionErrorKind::StorageWriteFailed {
            slice: slice.to_string(),
            reason: err.to_string(),
        }
        .into()
    }
}

/// Helper for executing a function with automatic retries according to a retry policy
pub async fn with_retry<F, Fut, T>(
    operation_name: &str,
    retry_policy: &RetryPolicy,
    f: F,
) -> SessionResult<T>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: std::future::Future<Output = SessionResult<T>> + Send,
{
    let mut attempt = 0;
    let max_retries = retry_policy.max_retries;

    loop {
        attempt += 1;
        match f().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(
                        operation = operation_name,
                        attempt, "Operation succeeded after {} attempts", attempt
                    );
                }
                return Ok(value);
            }
            Err(err) => {
                // Check if we should retry based on error category
                if !err.is_retryable() || attempt > max_retries {
                    if attempt > 1 {
                        error!(
                            operation = operation_name,
                            attempt,
                            error = %err,
                            "Operation failed after {} attempts",
                            attempt
                        );
                    }
                    return Err(err);
                }

                // Calculate delay for this attempt
                let delay = retry_policy.calculate_delay(attempt);

                // Log the retry
                if err.severity == ErrorSeverity::Critical {
                    error!(
                        operation = operation_name,
                        attempt,
                        max_retries,
                        error = %err,
                        retry_after_ms = delay.as_millis(),
                        "Critical error, retrying operation"
                    );
                } else if err.severity == ErrorSeverity::Error {
                    warn!(
                        operation = operation_name,
                        attempt,
                        max_retries,
                        error = %err,
                        retry_after_ms = delay.as_millis(),
                        "Operation failed, retrying"
                    );
                } else {
                    debug!(
                        operation = operation_name,
                        attempt,
                        max_retries,
                        error = %err,
                        retry_after_ms = delay.as_millis(),
                        "Retrying operation"
                    );
                }

                // Wait before retrying
                sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_status_mapping() {
        let unauthorized = errors::from_status("refresh_session", StatusCode::UNAUTHORIZED, "nope");
        assert_eq!(unauthorized.code, ErrorCode::AuthRejected);
        assert_eq!(unauthorized.category, Some(ErrorCategory::Authorization));
        assert!(!unauthorized.is_retryable());

        let conflict = errors::from_status("register", StatusCode::CONFLICT, "duplicate email");
        assert_eq!(conflict.code, ErrorCode::ValidationRejected);
        assert_eq!(conflict.category, Some(ErrorCategory::Validation));
        assert!(!conflict.is_retryable());

        let unavailable =
            errors::from_status("login", StatusCode::SERVICE_UNAVAILABLE, "maintenance");
        assert_eq!(unavailable.code, ErrorCode::ServiceUnavailable);
        assert!(unavailable.is_retryable());
    }

    #[test]
    fn test_cancelled_is_not_a_failure() {
        let err = errors::request_cancelled("login");
        assert!(err.is_cancelled());
        assert!(!err.is_retryable());
        assert_eq!(err.severity, ErrorSeverity::Info);
    }

    #[test]
    fn test_display_includes_context() {
        let err = errors::storage_write_failed("auth", "disk full");
        let rendered = err.to_string();
        assert!(rendered.contains("STORAGE_WRITE_FAILED"));
        assert!(rendered.contains("disk full"));
    }

    #[test]
    fn test_fixed_delay_policy() {
        let policy = RetryPolicy::fixed_delay(2, Duration::from_millis(250));
        assert_eq!(policy.calculate_delay(0), Duration::from_millis(0));
        assert_eq!(policy.calculate_delay(1), Duration::from_millis(250));
        assert_eq!(policy.calculate_delay(2), Duration::from_millis(250));
        // Beyond max_retries there is no delay
        assert_eq!(policy.calculate_delay(3), Duration::from_millis(0));
    }

    #[test]
    fn test_exponential_backoff_policy_respects_cap() {
        let policy = RetryPolicy::exponential_backoff(
            5,
            Duration::from_millis(100),
            10.0,
            Some(Duration::from_millis(500)),
        );
        assert!(policy.calculate_delay(4) <= Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_with_retry_recovers_from_transient_failure() {
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();
        let policy = RetryPolicy::fixed_delay(1, Duration::from_millis(1));

        let result = with_retry("transient", &policy, || {
            let counter = counter_clone.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(SessionError::from(SessionErrorKind::NetworkTimeout {
                        operation: "refresh".to_string(),
                    }))
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_with_retry_does_not_retry_authorization_failures() {
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();
        let policy = RetryPolicy::fixed_delay(1, Duration::from_millis(1));

        let result: SessionResult<()> = with_retry("rejected", &policy, || {
            let counter = counter_clone.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(errors::from_status(
                    "refresh_session",
                    StatusCode::UNAUTHORIZED,
                    "token expired",
                ))
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_with_retry_gives_up_after_max_retries() {
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();
        let policy = RetryPolicy::fixed_delay(1, Duration::from_millis(1));

        let result: SessionResult<()> = with_retry("flaky", &policy, || {
            let counter = counter_clone.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(SessionError::from(SessionErrorKind::NetworkUnreachable {
                    operation: "refresh".to_string(),
                    reason: "connection refused".to_string(),
                }))
            }
        })
        .await;

        assert!(result.is_err());
        // Initial attempt plus exactly one retry
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_no_retry_policy_makes_a_single_attempt() {
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();
        let policy = RetryPolicy::no_retry();

        let result: SessionResult<()> = with_retry("one_shot", &policy, || {
            let counter = counter_clone.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(SessionError::from(SessionErrorKind::NetworkTimeout {
                    operation: "refresh".to_string(),
                }))
            }
        })
        .await;

        assert!(result.is_err());
        // A retryable error still stops after the first attempt
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
