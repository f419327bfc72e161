//! Authentication of mini-app identity payloads.
//!
//! The mini-app forwards an url-encoded key/value payload signed by the
//! platform. The signing key is `SHA-256(shared secret)`; the signature is an
//! HMAC-SHA256 over the remaining pairs sorted by key and joined as
//! newline-separated `key=value` lines.

use chrono::{DateTime, Duration, TimeZone, Utc};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::error::AuthError;
use crate::types::{Participant, UserId};

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_FIELD: &str = "hash";
pub const ISSUED_AT_FIELD: &str = "auth_date";
pub const IDENTITY_FIELD: &str = "user";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user_id: UserId,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub issued_at: DateTime<Utc>,
}

impl AuthenticatedUser {
    pub fn participant(&self) -> Participant {
        Participant {
            user_id: self.user_id,
            username: self.username.clone(),
            first_name: self.first_name.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct IdentityClaim {
    id: i64,
    username: Option<String>,
    first_name: Option<String>,
}

pub fn signing_key(secret: &str) -> [u8; 32] {
    Sha256::digest(secret.as_bytes()).into()
}

/// Canonical string covered by the signature. The signature field itself is
/// never part of it.
pub fn data_check_string<K, V>(pairs: &[(K, V)]) -> String
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut fields: Vec<(&str, &str)> = pairs
        .iter()
        .map(|(k, v)| (k.as_ref(), v.as_ref()))
        .filter(|(k, _)| *k != SIGNATURE_FIELD)
        .collect();
    fields.sort_by(|a, b| a.0.cmp(b.0));
    fields
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("\n")
}

fn compute_signature(secret: &str, data_check: &str) -> Vec<u8> {
    // HMAC-SHA256 accepts any key length, so this cannot fail
    let mut mac = HmacSha256::new_from_slice(&signing_key(secret))
        .expect("HMAC-SHA256 accepts any key length");
    mac.update(data_check.as_bytes());
    mac.finalize().into_bytes().to_vec()
}

/// Hex signature for a set of fields.
pub fn sign_fields<K, V>(secret: &str, pairs: &[(K, V)]) -> String
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    hex::encode(compute_signature(secret, &data_check_string(pairs)))
}

/// Builds a complete signed, url-encoded payload. Used by tooling and tests
/// to produce what the platform would hand the mini-app.
pub fn sign_init_data(secret: &str, pairs: &[(&str, &str)]) -> String {
    let signature = sign_fields(secret, pairs);
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (k, v) in pairs {
        serializer.append_pair(k, v);
    }
    serializer.append_pair(SIGNATURE_FIELD, &signature);
    serializer.finish()
}

/// Verifies authenticity and freshness of a signed payload and returns the
/// identity it asserts.
pub fn validate_init_data(
    init_data: &str,
    secret: &str,
    now: DateTime<Utc>,
    max_age: Duration,
) -> Result<AuthenticatedUser, AuthError> {
    let pairs: Vec<(String, String)> = form_urlencoded::parse(init_data.as_bytes())
        .into_owned()
        .collect();

    let supplied = pairs
        .iter()
        .find(|(k, _)| k == SIGNATURE_FIELD)
        .map(|(_, v)| v.as_str())
        .filter(|v| !v.is_empty())
        .ok_or(AuthError::MissingSignature)?;

    let expected = compute_signature(secret, &data_check_string(&pairs));
    let supplied = hex::decode(supplied).map_err(|_| AuthError::BadSignature)?;
    if !bool::from(expected.as_slice().ct_eq(supplied.as_slice())) {
        return Err(AuthError::BadSignature);
    }

    let issued_at = field(&pairs, ISSUED_AT_FIELD)
        .and_then(|v| v.parse::<i64>().ok())
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
        .ok_or(AuthError::Stale)?;
    if now - issued_at > max_age {
        return Err(AuthError::Stale);
    }

    let identity: IdentityClaim = field(&pairs, IDENTITY_FIELD)
        .and_then(|raw| serde_json::from_str(raw).ok())
        .ok_or(AuthError::MalformedIdentity)?;

    Ok(AuthenticatedUser {
        user_id: identity.id,
        username: identity.username.filter(|v| !v.is_empty()),
        first_name: identity.first_name.filter(|v| !v.is_empty()),
        issued_at,
    })
}

fn field<'a>(pairs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    pairs
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}
