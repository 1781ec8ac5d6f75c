//! Unified error types for killboard sync.
//!
//! Error codes:
//! - ESI_001-005: Upstream API errors
//! - VALID_001-005: Validation errors
//! - DB_001-004: Store errors
//! - QUEUE_001-003: Broker errors

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Upstream (ESI / zKillboard) error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamErrorCode {
    /// ESI_001: Entity does not exist upstream
    NotFound,
    /// ESI_002: Upstream rejected the call for rate/error limits
    RateLimited,
    /// ESI_003: Upstream returned a 5xx or other unexpected status
    Server,
    /// ESI_004: Network or transport failure
    Transport,
    /// ESI_005: Response did not match the expected shape
    Decode,
}

impl UpstreamErrorCode {
    /// Get the error code string.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound => "ESI_001",
            Self::RateLimited => "ESI_002",
            Self::Server => "ESI_003",
            Self::Transport => "ESI_004",
            Self::Decode => "ESI_005",
        }
    }
}

/// Validation error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationErrorCode {
    /// VALID_001: Killmail carries no attackers
    NoAttackers,
    /// VALID_002: Killmail victim is missing required data
    InvalidVictim,
    /// VALID_003: Queue payload could not be decoded
    MalformedMessage,
    /// VALID_004: Filter request is inconsistent
    InvalidFilter,
    /// VALID_005: Killmail hash is not 40 lowercase hex characters
    InvalidHash,
}

impl ValidationErrorCode {
    /// Get the error code string.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NoAttackers => "VALID_001",
            Self::InvalidVictim => "VALID_002",
            Self::MalformedMessage => "VALID_003",
            Self::InvalidFilter => "VALID_004",
            Self::InvalidHash => "VALID_005",
        }
    }
}

/// Store error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbErrorCode {
    /// DB_001: Query failed
    QueryFailed,
    /// DB_002: Transaction could not be committed
    TransactionFailed,
    /// DB_003: Unique constraint violated
    UniqueViolation,
    /// DB_004: Row rejected by a check, not-null or foreign key constraint, or bad data
    ConstraintViolation,
}

impl DbErrorCode {
    /// Get the error code string.
    pub fn code(&self) -> &'static str {
        match self {
            Self::QueryFailed => "DB_001",
            Self::TransactionFailed => "DB_002",
            Self::UniqueViolation => "DB_003",
            Self::ConstraintViolation => "DB_004",
        }
    }
}

/// Broker error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueErrorCode {
    /// QUEUE_001: Broker unreachable
    Unavailable,
    /// QUEUE_002: Publish failed
    PublishFailed,
    /// QUEUE_003: Acknowledgment failed
    AckFailed,
}

impl QueueErrorCode {
    /// Get the error code string.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unavailable => "QUEUE_001",
            Self::PublishFailed => "QUEUE_002",
            Self::AckFailed => "QUEUE_003",
        }
    }
}

/// How a failure should be handled by a consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Terminal: the thing does not exist upstream. Acknowledge and drop.
    NotFound,
    /// Retryable: requeue and try again later.
    Transient,
    /// Bad data: never persisted, never retried.
    Validation,
    /// The record already exists; benign under concurrent consumers.
    Duplicate,
    /// Anything else.
    Fatal,
}

/// Unified error type for killboard sync.
#[derive(Debug, Error)]
pub enum Error {
    /// Upstream error with code.
    #[error("[{code}] {message}")]
    Upstream {
        code: &'static str,
        kind: UpstreamErrorCode,
        message: String,
        status: Option<u16>,
    },

    /// Validation error with code.
    #[error("[{code}] {message}")]
    ValidationWithCode {
        code: &'static str,
        kind: ValidationErrorCode,
        message: String,
    },

    /// Store error with code.
    #[error("[{code}] {message}")]
    Database {
        code: &'static str,
        kind: DbErrorCode,
        message: String,
    },

    /// Broker error with code.
    #[error("[{code}] {message}")]
    Queue {
        code: &'static str,
        kind: QueueErrorCode,
        message: String,
    },

    #[error("validation error: {0}")]
    Validation(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create an upstream error.
    pub fn upstream(kind: UpstreamErrorCode, msg: impl Into<String>, status: Option<u16>) -> Self {
        Self::Upstream {
            code: kind.code(),
            kind,
            message: msg.into(),
            status,
        }
    }

    /// Create an upstream "does not exist" error.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::upstream(UpstreamErrorCode::NotFound, msg, Some(404))
    }

    /// Create a validation error with code.
    pub fn validation_code(kind: ValidationErrorCode, msg: impl Into<String>) -> Self {
        Self::ValidationWithCode {
            code: kind.code(),
            kind,
            message: msg.into(),
        }
    }

    /// Create a store error.
    pub fn database(kind: DbErrorCode, msg: impl Into<String>) -> Self {
        Self::Database {
            code: kind.code(),
            kind,
            message: msg.into(),
        }
    }

    /// Create a broker error.
    pub fn queue(kind: QueueErrorCode, msg: impl Into<String>) -> Self {
        Self::Queue {
            code: kind.code(),
            kind,
            message: msg.into(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Classify this error for consumer disposition.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Upstream { kind, .. } => match kind {
                UpstreamErrorCode::NotFound => ErrorClass::NotFound,
                _ => ErrorClass::Transient,
            },
            Self::ValidationWithCode { .. } | Self::Validation(_) | Self::Serialization(_) => {
                ErrorClass::Validation
            }
            Self::Database { kind, .. } => match kind {
                DbErrorCode::UniqueViolation => ErrorClass::Duplicate,
                // Connection drops and serialization failures clear up on retry.
                DbErrorCode::QueryFailed | DbErrorCode::TransactionFailed => ErrorClass::Transient,
                // The same row fails the same way on every redelivery.
                DbErrorCode::ConstraintViolation => ErrorClass::Fatal,
            },
            Self::Queue { .. } => ErrorClass::Transient,
            Self::Config(_) | Self::Internal(_) => ErrorClass::Fatal,
        }
    }

    /// Whether a redelivery could succeed.
    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Transient
    }

    /// Get the error code if this is a coded error.
    pub fn error_code(&self) -> Option<&'static str> {
        match self {
            Self::Upstream { code, .. } => Some(code),
            Self::ValidationWithCode { code, .. } => Some(code),
            Self::Database { code, .. } => Some(code),
            Self::Queue { code, .. } => Some(code),
            _ => None,
        }
    }

    /// Upstream HTTP status, when the error came from a response.
    pub fn upstream_status(&self) -> Option<u16> {
        match self {
            Self::Upstream { status, .. } => *status,
            _ => None,
        }
    }
}
