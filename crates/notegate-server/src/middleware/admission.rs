//! Admission pipeline middleware
//!
//! Runs every inbound request through the per-request decision sequence:
//! public allow-list → identity → rate limit → (writes only) daily quota.
//! Rejections terminate the request immediately with a distinguishable
//! status; they are never retried here, since automatic retry would defeat
//! admission control. A store failure during a check fails closed: the
//! request is denied rather than silently admitted.
//!
//! Mutations the handler already committed before failing are left as
//! committed; this layer performs no compensating rollback.

use std::rc::Rc;

use actix_service::forward_ready;
use actix_utils::future::{Ready, ok};
use actix_web::{
    Error, HttpMessage,
    body::EitherBody,
    dev::{Service, ServiceRequest, ServiceResponse, Transform},
    http::Method,
    web::Data,
};
use futures::future::LocalBoxFuture;
use tracing::warn;

use notegate_common::GateError;

use crate::{
    identity::{self, Identity},
    metrics,
    model::{app_state::AppState, response::gate_error_response},
};

const ACCESS_TOKEN: &str = "accessToken";
const AUTHORIZATION_HEADER: &str = "Authorization";
const BEARER_PREFIX: &str = "Bearer ";

/// Admission pipeline middleware transformer
pub struct Admission;

impl<S, B> Transform<S, ServiceRequest> for Admission
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = AdmissionMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(AdmissionMiddleware {
            service: Rc::new(service),
        })
    }
}

pub struct AdmissionMiddleware<S> {
    service: Rc<S>,
}

/// Extract the bearer token from a request, in priority order:
/// 1. `accessToken` HTTP header
/// 2. `Authorization: Bearer <token>` header
/// 3. `accessToken` query parameter
fn extract_token(req: &ServiceRequest) -> Option<String> {
    if let Some(header_val) = req.headers().get(ACCESS_TOKEN)
        && let Ok(s) = header_val.to_str()
    {
        let trimmed = s.trim();
        if !trimmed.is_empty() {
            return Some(trimmed.to_string());
        }
    }

    if let Some(header_val) = req.headers().get(AUTHORIZATION_HEADER)
        && let Ok(s) = header_val.to_str()
        && let Some(token) = s.trim().strip_prefix(BEARER_PREFIX)
    {
        let token = token.trim();
        if !token.is_empty() {
            return Some(token.to_string());
        }
    }

    if let Some(query) = req.uri().query() {
        for pair in query.split('&') {
            if let Some((key, value)) = pair.split_once('=')
                && key == ACCESS_TOKEN
                && !value.is_empty()
            {
                return Some(value.to_string());
            }
        }
    }

    None
}

/// Whether the request mutates state and therefore consumes quota.
fn is_write_method(method: &Method) -> bool {
    *method == Method::POST
        || *method == Method::PUT
        || *method == Method::PATCH
        || *method == Method::DELETE
}

/// Terminal rejection: record the outcome and build the response.
fn reject<B>(
    req: ServiceRequest,
    err: GateError,
    outcome: &'static str,
) -> ServiceResponse<EitherBody<B>> {
    metrics::record_admission(outcome);
    let response = gate_error_response(&err);
    req.into_response(response).map_into_right_body()
}

impl<S, B> Service<ServiceRequest> for AdmissionMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);

        Box::pin(async move {
            if Method::OPTIONS == *req.method() {
                return service.call(req).await.map(ServiceResponse::map_into_left_body);
            }

            let Some(state) = req.app_data::<Data<AppState>>().cloned() else {
                tracing::error!("AppState not found in request app_data");
                let err = GateError::Internal("application state missing".to_string());
                return Ok(reject(req, err, "internal"));
            };

            let path = req.path().to_string();
            if state.configuration.is_public_path(&path) {
                return service.call(req).await.map(ServiceResponse::map_into_left_body);
            }

            // Identity: the route requires a validated user identifier
            let Some(token) = extract_token(&req) else {
                let err = GateError::Unauthorized("missing bearer token".to_string());
                return Ok(reject(req, err, "unauthorized"));
            };
            let secret = state.configuration.token_secret();
            let user_id = match identity::decode_token_cached(&token, &secret) {
                Ok(claims) => claims.sub,
                Err(err) => {
                    let err = GateError::Unauthorized(format!("invalid token: {err}"));
                    return Ok(reject(req, err, "unauthorized"));
                }
            };

            // Rate limit: one token per request, fail closed on store errors
            match state.rate_limiter.admit(&user_id, &path).await {
                Ok(true) => {}
                Ok(false) => {
                    let route = state.rate_limiter.route_key(&path);
                    return Ok(reject(req, GateError::RateLimited(route), "rate_limited"));
                }
                Err(err) => {
                    warn!(%path, %err, "Rate limit check failed, denying request");
                    return Ok(reject(req, err, "store_unavailable"));
                }
            }

            // Daily quota: writes only, same fail-closed policy
            if is_write_method(req.method()) {
                match state.quota.consume(&user_id).await {
                    Ok(true) => {}
                    Ok(false) => {
                        let err = GateError::QuotaExceeded(state.quota.daily_limit());
                        return Ok(reject(req, err, "quota_exceeded"));
                    }
                    Err(err) => {
                        warn!(%path, %err, "Quota check failed, denying request");
                        return Ok(reject(req, err, "store_unavailable"));
                    }
                }
            }

            metrics::record_admission("admitted");
            req.extensions_mut().insert(Identity { user_id });

            service.call(req).await.map(ServiceResponse::map_into_left_body)
        })
    }
}
