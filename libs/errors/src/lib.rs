//! Unified error handling for the Home Heat Control engine
//!
//! A single error type shared by the register codec, the point registry, the
//! connection layer and the write path. Decoding never produces an error; raw
//! values outside every known code resolve to a sentinel value instead.

use thiserror::Error;

// ============================================================================
// HeatError - Main error type
// ============================================================================

/// Main error type for the heat control engine
#[derive(Debug, Error)]
pub enum HeatError {
    // ======================================
    // Configuration Errors
    // ======================================
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid configuration: {field}: {reason}")]
    InvalidConfig { field: String, reason: String },

    #[error("Duplicate point key: {0}")]
    DuplicatePoint(String),

    #[error("Invalid register width for point {key}: {width}")]
    InvalidWidth { key: String, width: u16 },

    // ======================================
    // Transport & Communication Errors
    // ======================================
    #[error("Connection failed: {endpoint}: {reason}")]
    ConnectionFailed { endpoint: String, reason: String },

    #[error("Not connected")]
    NotConnected,

    #[error("Timeout waiting for response from {0}")]
    Timeout(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Modbus exception: {function}: {code}")]
    ModbusException { function: String, code: String },

    #[error("Malformed response: expected {expected} registers, got {actual}")]
    MalformedResponse { expected: usize, actual: usize },

    // ======================================
    // Write Path Errors
    // ======================================
    #[error("Point not found: {0}")]
    PointNotFound(String),

    #[error("Point is not writable: {0}")]
    NotWritable(String),

    #[error("Invalid option for {key}: {option}")]
    InvalidOption { key: String, option: String },

    #[error("Invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },

    // ======================================
    // Catch-all
    // ======================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using HeatError
pub type HeatResult<T> = Result<T, HeatError>;

impl HeatError {
    /// Stable machine-readable code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::InvalidConfig { .. } => "INVALID_CONFIG",
            Self::DuplicatePoint(_) => "DUPLICATE_POINT",
            Self::InvalidWidth { .. } => "INVALID_WIDTH",
            Self::ConnectionFailed { .. } => "CONNECTION_FAILED",
            Self::NotConnected => "NOT_CONNECTED",
            Self::Timeout(_) => "TIMEOUT",
            Self::Transport(_) => "TRANSPORT_ERROR",
            Self::ModbusException { .. } => "MODBUS_EXCEPTION",
            Self::MalformedResponse { .. } => "MALFORMED_RESPONSE",
            Self::PointNotFound(_) => "POINT_NOT_FOUND",
            Self::NotWritable(_) => "NOT_WRITABLE",
            Self::InvalidOption { .. } => "INVALID_OPTION",
            Self::InvalidValue { .. } => "INVALID_VALUE",
            Self::Io(_) => "IO_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Transport-level failure: the link should be considered down afterwards.
    ///
    /// Modbus exceptions and malformed responses arrive over a healthy socket and
    /// do not count.
    pub fn is_link_failure(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_)
                | Self::ConnectionFailed { .. }
                | Self::NotConnected
                | Self::Transport(_)
                | Self::Io(_)
        )
    }

    /// The link could not be (re)established; nothing else on it will succeed
    /// until the next attempt.
    pub fn is_connect_failure(&self) -> bool {
        matches!(self, Self::ConnectionFailed { .. })
    }

    /// Startup-fatal configuration problem
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_)
                | Self::InvalidConfig { .. }
                | Self::DuplicatePoint(_)
                | Self::InvalidWidth { .. }
        )
    }
}

// Helper macros for creating errors
#[macro_export]
macro_rules! config_error {
    ($msg:expr) => {
        $crate::HeatError::Configuration($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::HeatError::Configuration(format!($fmt, $($arg)*))
    };
}

#[macro_export]
macro_rules! invalid_config {
    ($field:expr, $reason:expr) => {
        $crate::HeatError::InvalidConfig {
            field: $field.to_string(),
            reason: $reason.to_string(),
        }
    };
}
