//! Error types and error codes for Notegate
//!
//! This module defines:
//! - `GateError`: the admission-layer error taxonomy
//! - `ErrorCode`: structured error codes for API responses
//!
//! Admission failures (`RateLimited`, `QuotaExceeded`, `ResourceBusy`) are
//! terminal for a request and never retried by this layer. `StoreUnavailable`
//! fails closed during admission checks and degrades to a cache bypass during
//! cache reads; the policy lives at the call sites, not here.

use serde::{Deserialize, Serialize};

/// Admission-layer error taxonomy
#[derive(thiserror::Error, Debug)]
pub enum GateError {
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("rate limit exceeded for route '{0}'")]
    RateLimited(String),

    #[error("daily write quota of {0} exhausted")]
    QuotaExceeded(u32),

    #[error("resource '{0}' is busy")]
    ResourceBusy(String),

    #[error("state store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("encoding error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl GateError {
    /// Whether the error is an admission rejection rather than a fault.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            GateError::RateLimited(_)
                | GateError::QuotaExceeded(_)
                | GateError::ResourceBusy(_)
                | GateError::Unauthorized(_)
        )
    }
}

/// Error code structure for API responses
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ErrorCode<'a> {
    pub code: i32,
    pub message: &'a str,
}

pub const SUCCESS: ErrorCode<'static> = ErrorCode {
    code: 0,
    message: "success",
};

pub const UNAUTHORIZED: ErrorCode<'static> = ErrorCode {
    code: 40100,
    message: "unauthorized",
};

pub const ACCESS_DENIED: ErrorCode<'static> = ErrorCode {
    code: 40300,
    message: "access denied",
};

pub const RESOURCE_NOT_FOUND: ErrorCode<'static> = ErrorCode {
    code: 40400,
    message: "resource not found",
};

pub const RESOURCE_BUSY: ErrorCode<'static> = ErrorCode {
    code: 40900,
    message: "resource busy",
};

pub const RATE_LIMITED: ErrorCode<'static> = ErrorCode {
    code: 42900,
    message: "rate limit exceeded",
};

pub const QUOTA_EXCEEDED: ErrorCode<'static> = ErrorCode {
    code: 42901,
    message: "daily quota exceeded",
};

pub const SERVER_ERROR: ErrorCode<'static> = ErrorCode {
    code: 50000,
    message: "server error",
};

pub const STORE_UNAVAILABLE: ErrorCode<'static> = ErrorCode {
    code: 50300,
    message: "state store unavailable",
};

impl GateError {
    /// Stable numeric code carried in API envelopes for this error.
    pub fn code(&self) -> ErrorCode<'static> {
        match self {
            GateError::Unauthorized(_) => UNAUTHORIZED,
            GateError::RateLimited(_) => RATE_LIMITED,
            GateError::QuotaExceeded(_) => QUOTA_EXCEEDED,
            GateError::ResourceBusy(_) => RESOURCE_BUSY,
            GateError::StoreUnavailable(_) => STORE_UNAVAILABLE,
            GateError::NotFound(_) => RESOURCE_NOT_FOUND,
            GateError::Forbidden(_) => ACCESS_DENIED,
            GateError::Serde(_) | GateError::Internal(_) => SERVER_ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gate_error_display() {
        let err = GateError::RateLimited("/notes".to_string());
        assert_eq!(format!("{}", err), "rate limit exceeded for route '/notes'");

        let err = GateError::QuotaExceeded(100);
        assert_eq!(format!("{}", err), "daily write quota of 100 exhausted");

        let err = GateError::StoreUnavailable("connection refused".to_string());
        assert_eq!(
            format!("{}", err),
            "state store unavailable: connection refused"
        );
    }

    #[test]
    fn test_rejection_classification() {
        assert!(GateError::RateLimited("/notes".into()).is_rejection());
        assert!(GateError::QuotaExceeded(10).is_rejection());
        assert!(GateError::ResourceBusy("note:1".into()).is_rejection());
        assert!(!GateError::StoreUnavailable("down".into()).is_rejection());
        assert!(!GateError::Internal("bug".into()).is_rejection());
    }

    #[test]
    fn test_error_code_mapping() {
        assert_eq!(GateError::Unauthorized("no token".into()).code().code, 40100);
        assert_eq!(GateError::RateLimited("/notes".into()).code().code, 42900);
        assert_eq!(GateError::QuotaExceeded(5).code().code, 42901);
        assert_eq!(SUCCESS.code, 0);
        assert_eq!(SUCCESS.message, "success");
    }
}
