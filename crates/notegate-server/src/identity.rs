//! Bearer-token identity extraction
//!
//! The identity collaborator supplies a validated user identifier per
//! request; this layer treats it as an opaque string. Tokens are JWTs
//! whose `sub` claim is that identifier; decode results are memoized so
//! repeated requests with the same token skip signature verification.

use std::future::{Ready, ready};
use std::sync::LazyLock;
use std::time::Duration;

use actix_web::{FromRequest, HttpMessage, HttpRequest, dev::Payload};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use moka::sync::Cache;
use serde::{Deserialize, Serialize};

/// JWT claims carried by a bearer token
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TokenClaims {
    pub sub: String,
    pub exp: i64,
}

/// The validated identity the admission pipeline attaches to a request
#[derive(Clone, Debug)]
pub struct Identity {
    pub user_id: String,
}

impl FromRequest for Identity {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        match req.extensions().get::<Identity>() {
            Some(identity) => ready(Ok(identity.clone())),
            // Only reachable on routes not behind the admission pipeline
            None => ready(Err(actix_web::error::ErrorUnauthorized(
                "missing identity",
            ))),
        }
    }
}

/// Token cache to avoid repeated validation of the same token
static TOKEN_CACHE: LazyLock<Cache<String, TokenClaims>> = LazyLock::new(|| {
    Cache::builder()
        .max_capacity(10_000)
        .time_to_live(Duration::from_secs(300))
        .build()
});

/// Decode and validate a token with caching
pub fn decode_token_cached(
    token: &str,
    secret_key: &str,
) -> jsonwebtoken::errors::Result<TokenClaims> {
    if let Some(cached) = TOKEN_CACHE.get(token) {
        let now = chrono::Utc::now().timestamp();
        if cached.exp > now {
            return Ok(cached);
        }
        TOKEN_CACHE.invalidate(token);
    }

    let claims = decode_token(token, secret_key)?;
    TOKEN_CACHE.insert(token.to_string(), claims.clone());
    Ok(claims)
}

/// Decode and validate a token without caching
pub fn decode_token(token: &str, secret_key: &str) -> jsonwebtoken::errors::Result<TokenClaims> {
    let decoding_key = DecodingKey::from_secret(secret_key.as_bytes());
    let data = decode::<TokenClaims>(token, &decoding_key, &Validation::default())?;
    Ok(data.claims)
}

/// Encode a token for a user id (test fixtures and operator tooling)
pub fn encode_token(
    sub: &str,
    secret_key: &str,
    expire_seconds: i64,
) -> jsonwebtoken::errors::Result<String> {
    let exp = chrono::Utc::now()
        .checked_add_signed(chrono::Duration::seconds(expire_seconds))
        .unwrap_or_else(chrono::Utc::now)
        .timestamp();

    let claims = TokenClaims {
        sub: sub.to_string(),
        exp,
    };
    let encoding_key = EncodingKey::from_secret(secret_key.as_bytes());
    encode(&Header::default(), &claims, &encoding_key)
}
