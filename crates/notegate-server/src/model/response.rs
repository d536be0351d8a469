//! HTTP response envelopes and error mapping
//!
//! Every response carries the `{code, message, data}` envelope; rejections
//! use the stable numeric codes from `notegate-common` so clients can
//! distinguish rate limiting from quota exhaustion without parsing
//! messages. Store internals never leak into response bodies.

use actix_web::{HttpResponse, http::StatusCode};
use serde::{Deserialize, Serialize};

use notegate_common::{GateError, error};

/// Generic result wrapper for API responses
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiResult<T> {
    pub code: i32,
    pub message: String,
    pub data: T,
}

impl<T: Serialize> ApiResult<T> {
    pub fn success(data: T) -> Self {
        Self {
            code: error::SUCCESS.code,
            message: error::SUCCESS.message.to_string(),
            data,
        }
    }

    pub fn http_success(data: T) -> HttpResponse {
        HttpResponse::Ok().json(Self::success(data))
    }

    pub fn http_created(message: &str, data: T) -> HttpResponse {
        HttpResponse::Created().json(Self {
            code: error::SUCCESS.code,
            message: message.to_string(),
            data,
        })
    }
}

/// HTTP status an admission-layer error maps to.
fn http_status(err: &GateError) -> StatusCode {
    match err {
        GateError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        GateError::RateLimited(_) | GateError::QuotaExceeded(_) => StatusCode::TOO_MANY_REQUESTS,
        GateError::ResourceBusy(_) => StatusCode::CONFLICT,
        GateError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        GateError::NotFound(_) => StatusCode::NOT_FOUND,
        GateError::Forbidden(_) => StatusCode::FORBIDDEN,
        GateError::Serde(_) | GateError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Build the rejection/error response for a `GateError`.
pub fn gate_error_response(err: &GateError) -> HttpResponse {
    let status = http_status(err);
    // Internal faults keep their detail in the logs, not the response
    let message = match err {
        GateError::Serde(_) | GateError::Internal(_) => "internal error".to_string(),
        GateError::StoreUnavailable(_) => "state store unavailable".to_string(),
        other => other.to_string(),
    };
    HttpResponse::build(status).json(ApiResult::<Option<String>> {
        code: err.code().code,
        message,
        data: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            http_status(&GateError::Unauthorized("x".into())),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            http_status(&GateError::RateLimited("/notes".into())),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            http_status(&GateError::QuotaExceeded(100)),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            http_status(&GateError::ResourceBusy("note:1".into())),
            StatusCode::CONFLICT
        );
        assert_eq!(
            http_status(&GateError::StoreUnavailable("down".into())),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            http_status(&GateError::NotFound("note 1".into())),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn test_store_detail_does_not_leak() {
        let err = GateError::StoreUnavailable("redis://10.0.0.3:6379 refused".into());
        let response = gate_error_response(&err);
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        // Body built from the generic message, not the store address
        let body = actix_web::body::to_bytes(response.into_body());
        let body = futures::executor::block_on(body).unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("state store unavailable"));
        assert!(!text.contains("10.0.0.3"));
    }
}
