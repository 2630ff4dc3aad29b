//! Error Envelope
//!
//! Structured error values returned by every backend method instead of
//! panicking or bubbling opaque errors. The same envelope renders as an AWS
//! error document or a GCP error object at the dispatch boundary.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default HTTP status for errors that do not name one
pub const DEFAULT_HTTP_STATUS: u16 = 400;

/// Request/response shape of the emulated provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// EC2 query API, XML responses
    Aws,
    /// Compute Engine REST API, JSON responses
    Gcp,
}

/// Dialect-agnostic error categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    MissingParameter,
    NotFound,
    AlreadyExists,
    DependencyViolation,
    InvalidParameterValue,
}

impl ErrorKind {
    /// Generic AWS error code. Resource-specific codes such as
    /// `InvalidVpcID.NotFound` come from the resource registry instead.
    pub fn aws_code(self) -> &'static str {
        match self {
            Self::MissingParameter => "MissingParameter",
            Self::NotFound => "InvalidID.NotFound",
            Self::AlreadyExists => "InvalidParameterValue",
            Self::DependencyViolation => "DependencyViolation",
            Self::InvalidParameterValue => "InvalidParameterValue",
        }
    }

    /// Canonical GCP status string
    pub fn gcp_status(self) -> &'static str {
        match self {
            Self::MissingParameter | Self::InvalidParameterValue => "INVALID_ARGUMENT",
            Self::NotFound => "NOT_FOUND",
            Self::AlreadyExists => "ALREADY_EXISTS",
            Self::DependencyViolation => "FAILED_PRECONDITION",
        }
    }

    /// HTTP status used by the given dialect
    pub fn http_status(self, dialect: Dialect) -> u16 {
        match dialect {
            Dialect::Aws => 400,
            Dialect::Gcp => match self {
                Self::NotFound => 404,
                Self::AlreadyExists => 409,
                _ => 400,
            },
        }
    }

    /// Code for this kind in the given dialect
    pub fn code(self, dialect: Dialect) -> &'static str {
        match dialect {
            Dialect::Aws => self.aws_code(),
            Dialect::Gcp => self.gcp_status(),
        }
    }
}

/// Structured error value
///
/// Success payloads never have this shape: backends return
/// `Result<Success, ErrorEnvelope>` and the error side is the only place a
/// `code` appears.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{code}: {message}")]
#[serde(rename_all = "camelCase")]
pub struct ErrorEnvelope {
    pub code: String,
    pub message: String,
    pub http_status: u16,
}

impl ErrorEnvelope {
    /// Build an envelope for a kind using that dialect's default code
    pub fn of(dialect: Dialect, kind: ErrorKind, message: impl Into<String>) -> Self {
        create_error(kind.code(dialect), message, kind.http_status(dialect))
    }

    /// Same as [`ErrorEnvelope::of`] but with a provider-specific code
    pub fn with_code(
        dialect: Dialect,
        kind: ErrorKind,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        create_error(code, message, kind.http_status(dialect))
    }

    pub fn missing_parameter(dialect: Dialect, name: &str) -> Self {
        let message = match dialect {
            Dialect::Aws => format!("The request must contain the parameter {}", name),
            Dialect::Gcp => format!("Required field '{}' not specified", name),
        };
        Self::of(dialect, ErrorKind::MissingParameter, message)
    }

    pub fn invalid_value(dialect: Dialect, message: impl Into<String>) -> Self {
        Self::of(dialect, ErrorKind::InvalidParameterValue, message)
    }

    /// Envelope for a failed precondition that is not a dependency edge
    /// (e.g. shrinking a disk)
    pub fn precondition(dialect: Dialect, message: impl Into<String>) -> Self {
        Self::of(dialect, ErrorKind::DependencyViolation, message)
    }

    /// Map the envelope back to its kind, if it carries a known code
    pub fn kind(&self) -> Option<ErrorKind> {
        match self.code.as_str() {
            "MissingParameter" => Some(ErrorKind::MissingParameter),
            "DependencyViolation" | "FAILED_PRECONDITION" => Some(ErrorKind::DependencyViolation),
            "ALREADY_EXISTS" => Some(ErrorKind::AlreadyExists),
            "NOT_FOUND" => Some(ErrorKind::NotFound),
            "InvalidParameterValue" | "INVALID_ARGUMENT" => {
                Some(ErrorKind::InvalidParameterValue)
            }
            code if code.ends_with(".NotFound") => Some(ErrorKind::NotFound),
            code if code.ends_with(".Duplicate") => Some(ErrorKind::AlreadyExists),
            _ => None,
        }
    }
}

/// Result of a backend call
pub type Outcome<T> = std::result::Result<T, ErrorEnvelope>;

/// Construct an error envelope
pub fn create_error(code: impl Into<String>, message: impl Into<String>, http_status: u16) -> ErrorEnvelope {
    ErrorEnvelope {
        code: code.into(),
        message: message.into(),
        http_status,
    }
}

/// Check whether a backend outcome is an error envelope
pub fn is_error<T>(outcome: &Outcome<T>) -> bool {
    outcome.is_err()
}
