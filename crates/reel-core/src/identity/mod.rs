//! Decoding of identity-provider assertions.
//!
//! The login widget hands over a signed ID token. Signature verification is
//! the provider's business; the client only reads the payload.

use base64::prelude::{Engine as _, BASE64_URL_SAFE_NO_PAD};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::models::Identity;

#[derive(Debug, Error)]
pub enum AssertionError {
    #[error("Assertion is not a JWT")]
    NotJwt,
    #[error("Assertion payload is not valid base64: {0}")]
    Encoding(#[from] base64::DecodeError),
    #[error("Assertion payload is not a JSON object: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Assertion is missing the '{0}' claim")]
    MissingClaim(&'static str),
    #[error("Assertion was issued for a different client")]
    AudienceMismatch,
}

pub type AssertionResult<T> = Result<T, AssertionError>;

/// Decode the payload of a JWT ID token into an [`Identity`].
///
/// `sub` and `exp` become the subject id and expiry; every other claim is kept.
pub fn decode_id_token(credential: &str) -> AssertionResult<Identity> {
    let mut parts = credential.trim().split('.');
    let (Some(_header), Some(payload), Some(_signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(AssertionError::NotJwt);
    };
    if payload.is_empty() {
        return Err(AssertionError::NotJwt);
    }

    // Some providers pad the segments anyway.
    let bytes = BASE64_URL_SAFE_NO_PAD.decode(payload.trim_end_matches('='))?;
    let mut claims: Map<String, Value> = serde_json::from_slice(&bytes)?;

    let subject_id = match claims.remove("sub") {
        Some(Value::String(sub)) if !sub.trim().is_empty() => sub,
        _ => return Err(AssertionError::MissingClaim("sub")),
    };
    let expires_at = claims
        .remove("exp")
        .as_ref()
        .and_then(expiry_seconds)
        .ok_or(AssertionError::MissingClaim("exp"))?;

    let mut identity = Identity::new(subject_id, expires_at);
    identity.claims = claims;
    Ok(identity)
}

/// Check the `aud` claim against the configured client id.
///
/// Tokens without an audience are accepted.
pub fn ensure_audience(identity: &Identity, client_id: &str) -> AssertionResult<()> {
    let matches = match identity.claims.get("aud") {
        None => true,
        Some(Value::String(aud)) => aud == client_id,
        Some(Value::Array(values)) => values.iter().any(|value| value == client_id),
        Some(_) => false,
    };
    if matches {
        Ok(())
    } else {
        Err(AssertionError::AudienceMismatch)
    }
}

#[allow(clippy::cast_possible_truncation)]
fn expiry_seconds(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_f64().filter(|exp| exp.is_finite()).map(|exp| exp as i64))
}
