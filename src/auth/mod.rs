use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config;
use crate::identity::EntitlementTier;

pub mod cache;

/// Claims carried by a Wix app instance token (HS256, signed with the app
/// secret from the dev center).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceClaims {
    pub instance_id: String,
    /// Paid-plan product purchased for this instance, absent on free sites.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor_product_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_owner_id: Option<String>,
    pub exp: i64,
    pub iat: i64,
}

impl InstanceClaims {
    pub fn new(instance_id: impl Into<String>, vendor_product_id: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            instance_id: instance_id.into(),
            vendor_product_id,
            site_owner_id: None,
            exp: (now + Duration::hours(1)).timestamp(),
            iat: now.timestamp(),
        }
    }
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("app secret not configured")]
    MissingSecret,

    #[error("instance token expired")]
    Expired,

    #[error("invalid instance token: {0}")]
    Invalid(String),
}

/// Outcome of a successful verification. A cache hit must be
/// indistinguishable from a fresh verification, so everything derived from
/// the claims lives here.
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedInstance {
    pub instance_id: String,
    pub entitlement_tier: EntitlementTier,
    /// Unix timestamp the token itself expires at.
    pub expires_at: i64,
}

/// Verify an instance token against an explicit secret.
pub fn verify_with_secret(token: &str, secret: &str) -> Result<VerifiedInstance, TokenError> {
    if secret.is_empty() {
        return Err(TokenError::MissingSecret);
    }

    let decoding_key = DecodingKey::from_secret(secret.as_bytes());
    let validation = Validation::default();

    let token_data =
        decode::<InstanceClaims>(token, &decoding_key, &validation).map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => TokenError::Expired,
            _ => TokenError::Invalid(e.to_string()),
        })?;

    let claims = token_data.claims;
    Ok(VerifiedInstance {
        entitlement_tier: EntitlementTier::from_vendor_product(claims.vendor_product_id.as_deref()),
        instance_id: claims.instance_id,
        expires_at: claims.exp,
    })
}

/// Verify an instance token against the configured app secret.
pub fn verify_instance_token(token: &str) -> Result<VerifiedInstance, TokenError> {
    verify_with_secret(token, &config::config().wix.app_secret)
}

/// Cached variant of [`verify_with_secret`]. Entries are keyed by a
/// fingerprint of the raw token and live for `ttl_secs`, clamped to the
/// token's own expiry so a hit never outlives a fresh verification.
pub fn verify_cached_with_secret(
    token: &str,
    secret: &str,
    ttl_secs: u64,
) -> Result<VerifiedInstance, TokenError> {
    let fingerprint = cache::fingerprint(token);
    if let Some(hit) = cache::lookup(&fingerprint) {
        return Ok(hit);
    }

    let verified = verify_with_secret(token, secret)?;
    let remaining = (verified.expires_at - Utc::now().timestamp()).max(0) as u64;
    cache::store(fingerprint, verified.clone(), ttl_secs.min(remaining));
    Ok(verified)
}

/// Cached verification with config-supplied secret and TTL.
pub fn verify_cached(token: &str) -> Result<VerifiedInstance, TokenError> {
    let wix = &config::config().wix;
    verify_cached_with_secret(token, &wix.app_secret, wix.token_cache_ttl_secs)
}

/// Sign a set of instance claims. Real tokens come from Wix; this exists for
/// local tooling and tests.
pub fn issue_with_secret(claims: &InstanceClaims, secret: &str) -> Result<String, TokenError> {
    if secret.is_empty() {
        return Err(TokenError::MissingSecret);
    }

    let encoding_key = EncodingKey::from_secret(secret.as_bytes());
    encode(&Header::default(), claims, &encoding_key).map_err(|e| TokenError::Invalid(e.to_string()))
}

/// Sign claims with the configured app secret.
pub fn issue_instance_token(claims: &InstanceClaims) -> Result<String, TokenError> {
    issue_with_secret(claims, &config::config().wix.app_secret)
}
