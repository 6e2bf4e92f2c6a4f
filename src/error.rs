/// Error Handling Module
///
/// One error system for the whole auth core:
/// 1. Domain-specific error types (validation, invite, auth, storage, config)
/// 2. A unified `AppError` used for control flow (`?` everywhere)
/// 3. HTTP response mapping with structured logging

use actix_web::{error::ResponseError, http::header, http::StatusCode, HttpResponse};
use std::error::Error as StdError;
use std::fmt;

/// ============================================================================
/// 1. DOMAIN-SPECIFIC ERROR TYPES
/// ============================================================================

/// Username / password policy violations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    EmptyField(String),
    TooLong(String, usize),
    InvalidUsername,
    WeakPassword,
    InvalidFormat(String),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::EmptyField(field) => write!(f, "{} is required", field),
            ValidationError::TooLong(field, max) => {
                write!(f, "{} is too long (maximum {} characters)", field, max)
            }
            ValidationError::InvalidUsername => write!(
                f,
                "Username must contain only English letters and numbers, maximum 12 characters"
            ),
            ValidationError::WeakPassword => write!(
                f,
                "Password must be at least 9 characters long and contain uppercase, lowercase, numbers, and special symbols"
            ),
            ValidationError::InvalidFormat(field) => write!(f, "{} has invalid format", field),
        }
    }
}

impl StdError for ValidationError {}

/// Invite token failures during registration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    NotFound,
    AlreadyUsed,
    Expired,
    /// The username is locked out after repeated invalid invite tokens
    TooManyAttempts { retry_after_secs: u64 },
}

impl fmt::Display for TokenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenError::NotFound => write!(f, "Invalid token"),
            TokenError::AlreadyUsed => write!(f, "Token already used"),
            TokenError::Expired => write!(f, "Token expired"),
            TokenError::TooManyAttempts { .. } => write!(
                f,
                "Too many invalid token attempts. Registration is temporarily blocked for this username."
            ),
        }
    }
}

impl StdError for TokenError {}

/// Authentication and session token errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    InvalidCredentials,
    TooManyAttempts { retry_after_secs: u64 },
    MissingToken,
    TokenInvalid,
    TokenExpired,
    Forbidden,
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::InvalidCredentials => write!(f, "Invalid username or password"),
            AuthError::TooManyAttempts { .. } => write!(
                f,
                "Too many failed attempts. Account temporarily blocked."
            ),
            AuthError::MissingToken => write!(f, "Access denied. No token provided."),
            AuthError::TokenInvalid => write!(f, "Invalid token"),
            AuthError::TokenExpired => write!(f, "Token has expired"),
            AuthError::Forbidden => write!(f, "Insufficient permissions"),
        }
    }
}

impl StdError for AuthError {}

/// File-backed store errors. Reads degrade to empty data instead of failing,
/// so only writes surface here.
#[derive(Debug)]
pub enum StorageError {
    Write(String),
    Serialize(String),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::Write(msg) => write!(f, "Storage write failed: {}", msg),
            StorageError::Serialize(msg) => write!(f, "Storage serialization failed: {}", msg),
        }
    }
}

impl StdError for StorageError {}

/// Configuration errors
#[derive(Debug)]
pub enum ConfigError {
    MissingRequired(String),
    InvalidValue(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::MissingRequired(msg) => write!(f, "Missing required config: {}", msg),
            ConfigError::InvalidValue(msg) => write!(f, "Invalid config value: {}", msg),
        }
    }
}

impl StdError for ConfigError {}

/// ============================================================================
/// 2. UNIFIED APPLICATION ERROR TYPE
/// ============================================================================

#[derive(Debug)]
pub enum AppError {
    Validation(ValidationError),
    Token(TokenError),
    /// Username already registered
    Duplicate(String),
    Auth(AuthError),
    Storage(StorageError),
    Config(ConfigError),
    Internal(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Validation(e) => write!(f, "{}", e),
            AppError::Token(e) => write!(f, "{}", e),
            AppError::Duplicate(_) => write!(f, "Username already exists"),
            AppError::Auth(e) => write!(f, "{}", e),
            AppError::Storage(e) => write!(f, "{}", e),
            AppError::Config(e) => write!(f, "{}", e),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl StdError for AppError {}

impl AppError {
    /// Seconds until a lockout ends, for lockout errors only
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            AppError::Auth(AuthError::TooManyAttempts { retry_after_secs })
            | AppError::Token(TokenError::TooManyAttempts { retry_after_secs }) => {
                Some(*retry_after_secs)
            }
            _ => None,
        }
    }
}

// ============================================================================
// FROM IMPLEMENTATIONS
// ============================================================================

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::Validation(err)
    }
}

impl From<TokenError> for AppError {
    fn from(err: TokenError) -> Self {
        AppError::Token(err)
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        AppError::Auth(err)
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        AppError::Storage(err)
    }
}

impl From<ConfigError> for AppError {
    fn from(err: ConfigError) -> Self {
        AppError::Config(err)
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        AppError::Internal(format!("Blocking task failed: {}", err))
    }
}

// ============================================================================
// 3. HTTP RESPONSE MAPPING
// ============================================================================

/// JSON body of every error response
#[derive(Debug, serde::Serialize)]
pub struct ErrorResponse {
    /// Human-readable error message
    pub error: String,
    /// Error code for client-side handling
    pub code: String,
    /// Request id for correlating with server logs
    pub request_id: String,
}

impl ErrorResponse {
    pub fn new(error: String, code: String, request_id: String) -> Self {
        Self {
            error,
            code,
            request_id,
        }
    }
}

/// Trait for converting errors to HTTP responses with proper logging
pub trait ErrorHandler {
    fn error_response(&self, request_id: &str) -> (StatusCode, ErrorResponse);
    fn log_error(&self, request_id: &str);
}

impl ErrorHandler for AppError {
    fn error_response(&self, request_id: &str) -> (StatusCode, ErrorResponse) {
        let (status, code, message) = match self {
            AppError::Validation(e) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", e.to_string()),

            AppError::Token(e) => {
                let code = match e {
                    TokenError::NotFound => "INVALID_INVITE",
                    TokenError::AlreadyUsed => "INVITE_USED",
                    TokenError::Expired => "INVITE_EXPIRED",
                    TokenError::TooManyAttempts { .. } => "INVITE_ATTEMPTS_EXCEEDED",
                };
                (StatusCode::BAD_REQUEST, code, e.to_string())
            }

            AppError::Duplicate(_) => (StatusCode::BAD_REQUEST, "USERNAME_TAKEN", self.to_string()),

            AppError::Auth(e) => match e {
                AuthError::InvalidCredentials => {
                    (StatusCode::UNAUTHORIZED, "INVALID_CREDENTIALS", e.to_string())
                }
                AuthError::TooManyAttempts { .. } => {
                    (StatusCode::UNAUTHORIZED, "TOO_MANY_ATTEMPTS", e.to_string())
                }
                AuthError::MissingToken => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", e.to_string()),
                AuthError::TokenInvalid | AuthError::TokenExpired => (
                    StatusCode::FORBIDDEN,
                    "TOKEN_INVALID",
                    "Invalid or expired token.".to_string(),
                ),
                AuthError::Forbidden => (StatusCode::FORBIDDEN, "FORBIDDEN", e.to_string()),
            },

            AppError::Storage(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "STORAGE_ERROR",
                "Storage error occurred".to_string(),
            ),

            AppError::Config(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "CONFIG_ERROR",
                "Server configuration error".to_string(),
            ),

            AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "Internal server error".to_string(),
            ),
        };

        (
            status,
            ErrorResponse::new(message, code.to_string(), request_id.to_string()),
        )
    }

    fn log_error(&self, request_id: &str) {
        match self {
            AppError::Validation(_) | AppError::Token(_) | AppError::Duplicate(_) => {
                tracing::info!(request_id = request_id, error = %self, "Rejected request");
            }
            AppError::Auth(e) => {
                tracing::warn!(request_id = request_id, error = %e, "Authentication error");
            }
            AppError::Storage(e) => {
                tracing::error!(request_id = request_id, error = %e, "Storage error");
            }
            AppError::Config(e) => {
                tracing::error!(request_id = request_id, error = %e, "Configuration error");
            }
            AppError::Internal(msg) => {
                tracing::error!(request_id = request_id, error = %msg, "Internal error");
            }
        }
    }
}

/// Implement ResponseError for Actix-web integration
impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let request_id = uuid::Uuid::new_v4().to_string();
        self.log_error(&request_id);

        let (status, body) = <Self as ErrorHandler>::error_response(self, &request_id);

        let mut builder = HttpResponse::build(status);
        if let Some(secs) = self.retry_after_secs() {
            builder.insert_header((header::RETRY_AFTER, secs.to_string()));
        }
        builder.json(body)
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::Token(_) | AppError::Duplicate(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::Auth(e) => match e {
                AuthError::TokenInvalid | AuthError::TokenExpired | AuthError::Forbidden => {
                    StatusCode::FORBIDDEN
                }
                _ => StatusCode::UNAUTHORIZED,
            },
            AppError::Storage(_) | AppError::Config(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

// ============================================================================
// 4. ERROR CONTEXT
// ============================================================================

/// Per-operation context attached to log lines
#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub request_id: String,
    pub operation: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl ErrorContext {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            operation: operation.into(),
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn log_error(&self, error: &AppError) {
        tracing::warn!(
            request_id = %self.request_id,
            operation = %self.operation,
            error = %error,
            "Operation failed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::MessageBody;

    #[test]
    fn test_validation_error_display() {
        let err = ValidationError::EmptyField("username".to_string());
        assert_eq!(err.to_string(), "username is required");
    }

    #[test]
    fn test_app_error_conversion() {
        let app_err: AppError = TokenError::Expired.into();
        assert!(matches!(app_err, AppError::Token(TokenError::Expired)));
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            AppError::Validation(ValidationError::WeakPassword).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::Token(TokenError::AlreadyUsed).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::Duplicate("alice".to_string()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::Auth(AuthError::InvalidCredentials).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AppError::Auth(AuthError::MissingToken).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AppError::Auth(AuthError::TokenExpired).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AppError::Storage(StorageError::Write("disk full".to_string())).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_invalid_and_expired_tokens_look_identical() {
        let (s1, r1) = ErrorHandler::error_response(&AppError::Auth(AuthError::TokenInvalid), "a");
        let (s2, r2) = ErrorHandler::error_response(&AppError::Auth(AuthError::TokenExpired), "b");

        assert_eq!(s1, s2);
        assert_eq!(r1.error, r2.error);
        assert_eq!(r1.code, r2.code);
    }

    #[test]
    fn test_lockout_sets_retry_after_header() {
        let err = AppError::Auth(AuthError::TooManyAttempts { retry_after_secs: 120 });
        let response = ResponseError::error_response(&err);

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get(header::RETRY_AFTER).unwrap(),
            "120"
        );
    }

    #[test]
    fn test_storage_details_not_leaked() {
        let err = AppError::Storage(StorageError::Write("/secret/path/users.json".to_string()));
        let response = ResponseError::error_response(&err);
        let body = response.into_body().try_into_bytes().unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();

        assert!(!text.contains("/secret/path"));
        assert!(text.contains("STORAGE_ERROR"));
    }
}
