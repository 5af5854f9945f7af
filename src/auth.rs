//! Authentication: per-customer API keys, looked up against persistence.
//!
//! Every customer gets a uuid v4 `api_key` on registration (§6 "POST /api/customers").
//! Requests authenticate with `Authorization: Bearer <key>` or `X-API-Key: <key>`;
//! the middleware injects the resolved [`Customer`] as a request extension, and
//! handlers read it instead of re-querying persistence.

use crate::persistence::PersistencePort;
use crate::types::Customer;
use axum::{
    body::Body,
    extract::Request,
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

/// Mints a fresh API key for a new customer. Grounded on the original
/// system's `str(uuid.uuid4())` convention.
pub fn generate_api_key() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Hashes a plaintext password for storage. Never log or persist the plaintext.
pub fn hash_password(password: &str) -> Result<String, bcrypt::BcryptError> {
    bcrypt::hash(password, bcrypt::DEFAULT_COST)
}

/// Verifies a plaintext password against a stored hash.
pub fn verify_password(password: &str, hash: &str) -> bool {
    bcrypt::verify(password, hash).unwrap_or(false)
}

/// Returns the API key from `Authorization: Bearer <key>` or `X-API-Key: <key>`.
fn get_api_key_from_request(req: &Request) -> Option<String> {
    if let Some(v) = req.headers().get(header::AUTHORIZATION) {
        if let Ok(s) = v.to_str() {
            let s = s.trim();
            if s.len() >= 7 && s.get(..7).map(|p| p.eq_ignore_ascii_case("bearer ")).unwrap_or(false) {
                return Some(s.get(7..).unwrap_or("").trim().to_string());
            }
        }
    }
    if let Some(v) = req.headers().get("X-API-Key") {
        if let Ok(s) = v.to_str() {
            return Some(s.trim().to_string());
        }
    }
    None
}

/// Auth middleware: requires a valid API key, looks up the owning customer,
/// and injects it as a [`Customer`] request extension. Returns 401 if the
/// key is missing or unknown.
pub async fn require_api_key(
    mut req: Request<Body>,
    next: Next,
    persistence: Arc<dyn PersistencePort>,
) -> Response {
    let key = match get_api_key_from_request(&req) {
        Some(k) if !k.is_empty() => k,
        _ => {
            return (StatusCode::UNAUTHORIZED, "missing Authorization or X-API-Key header").into_response();
        }
    };

    match persistence.get_customer_by_api_key(&key).await {
        Ok(Some(customer)) => {
            req.extensions_mut().insert(customer);
            next.run(req).await
        }
        Ok(None) => (StatusCode::UNAUTHORIZED, "invalid API key").into_response(),
        Err(_) => (StatusCode::INTERNAL_SERVER_ERROR, "auth lookup failed").into_response(),
    }
}
