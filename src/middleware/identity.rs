//! Identity middleware.
//!
//! `optional_identity` runs on every API route: it builds the per-request
//! [`Identity`], derives the [`TenantKey`] and injects both as extensions.
//! Authentication failures degrade to anonymous here; `require_identity`
//! layers the strict policy on top for routes that must reject
//! unauthenticated traffic.

use axum::{
    body::{to_bytes, Body, Bytes},
    extract::Request,
    http::{header, HeaderMap, Method},
    middleware::Next,
    response::Response,
};
use serde_json::Value;
use tracing::debug;

use crate::auth;
use crate::error::ApiError;
use crate::identity::{self, Identity};
use crate::tenant::TenantKey;

/// Bodies above this size are passed through without compId sniffing.
const MAX_SNIFF_BODY_BYTES: usize = 64 * 1024;

/// Extract the identity and tenant key, never failing the request over
/// authentication. Small JSON bodies are buffered so the component id can be
/// recovered from the payload, then handed to the handler untouched.
pub async fn optional_identity(request: Request, next: Next) -> Result<Response, ApiError> {
    let (mut parts, body) = request.into_parts();

    let query_pairs: Vec<(String, String)> = parts
        .uri
        .query()
        .map(|q| url::form_urlencoded::parse(q.as_bytes()).into_owned().collect())
        .unwrap_or_default();

    let (identity, body) = if wants_body_sniff(&parts.method, &parts.headers) {
        let bytes: Bytes = to_bytes(body, MAX_SNIFF_BODY_BYTES)
            .await
            .map_err(|_| ApiError::bad_request("Failed to read request body"))?;
        let body_json: Option<Value> = serde_json::from_slice(&bytes).ok();
        let identity = build_identity(&parts.headers, &query_pairs, body_json.as_ref());
        (identity, Body::from(bytes))
    } else {
        (build_identity(&parts.headers, &query_pairs, None), body)
    };

    let tenant_key = TenantKey::for_identity(&identity);
    parts.extensions.insert(identity);
    parts.extensions.insert(tenant_key);

    Ok(next.run(Request::from_parts(parts, body)).await)
}

/// Strict gate for routes that must not serve unauthenticated traffic.
/// Relies on `optional_identity` having run first.
pub async fn require_identity(request: Request, next: Next) -> Result<Response, ApiError> {
    let identity = request.extensions().get::<Identity>().ok_or_else(|| {
        ApiError::internal_server_error("Identity extraction must run before authentication")
    })?;

    identity.require_authenticated()?;
    Ok(next.run(request).await)
}

fn build_identity(
    headers: &HeaderMap,
    query_pairs: &[(String, String)],
    body: Option<&Value>,
) -> Identity {
    let comp_id = identity::comp_id_from_sources(headers, query_pairs, body);

    match bearer_token(headers) {
        Some(token) => match auth::verify_cached(&token) {
            Ok(verified) => Identity::authenticated(
                verified.instance_id,
                verified.entitlement_tier,
                comp_id,
            ),
            Err(err) => {
                // Optional mode: a bad credential is the same as no
                // credential. The widget keeps rendering with defaults.
                debug!("instance token rejected: {}", err);
                Identity::anonymous(comp_id)
            }
        },
        None => Identity::anonymous(comp_id),
    }
}

/// Extract the bearer token from the Authorization header.
fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let auth_header = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = auth_header.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        return None;
    }
    Some(token.to_string())
}

/// Only buffer bodies that plausibly carry a JSON payload with a compId:
/// mutating method, JSON content type, known length within the cap.
fn wants_body_sniff(method: &Method, headers: &HeaderMap) -> bool {
    if !matches!(*method, Method::POST | Method::PUT | Method::PATCH) {
        return false;
    }

    let is_json = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.contains("json"))
        .unwrap_or(false);
    if !is_json {
        return false;
    }

    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok())
        .map(|len| len <= MAX_SNIFF_BODY_BYTES)
        .unwrap_or(false)
}
