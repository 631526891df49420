//! Short-lived bearer tokens.
//!
//! HS256 JWTs carrying the user id, valid for 600 seconds. A token is
//! accepted anywhere a password is, so workers can avoid re-sending
//! credentials on every poll.

use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::config::TOKEN_DURATION_SECS;
use crate::error::{AppError, AppResult};

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    /// User id.
    sub: i32,
    /// Expiry, seconds since the epoch.
    exp: u64,
}

/// Issue a token for a user, valid for [`TOKEN_DURATION_SECS`].
pub fn issue(user_id: i32, secret: &str, now_epoch_secs: u64) -> AppResult<String> {
    let claims = Claims {
        sub: user_id,
        exp: now_epoch_secs + TOKEN_DURATION_SECS,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(format!("Failed to sign token: {}", e)))
}

/// Verify a token and return the user id; None for anything invalid or
/// expired.
pub fn verify(token: &str, secret: &str) -> Option<i32> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .ok()
    .map(|data| data.claims.sub)
}
