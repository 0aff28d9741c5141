//! Opaque upload tokens.
//!
//! The token is a signed JWT, but nothing outside this module treats it as
//! anything but an opaque string: handlers decode it once to recover the
//! `upload_id` and otherwise pass it around unexamined, matching the
//! protocol's "opaque to the controller" requirement on the client side.

use crate::error::{ServerError, ServerResult};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadClaims {
    pub upload_id: String,
    pub file_name: String,
    pub file_size: u64,
    pub file_type: String,
    pub created_at: i64,
    /// JWT standard expiry claim (seconds since epoch).
    pub exp: i64,
}

pub fn issue(
    secret: &str,
    upload_id: &str,
    file_name: &str,
    file_size: u64,
    file_type: &str,
    created_at: i64,
    ttl_secs: i64,
) -> ServerResult<String> {
    let claims = UploadClaims {
        upload_id: upload_id.to_string(),
        file_name: file_name.to_string(),
        file_size,
        file_type: file_type.to_string(),
        created_at,
        exp: created_at + ttl_secs,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(ServerError::from)
}

pub fn verify(secret: &str, token: &str) -> ServerResult<UploadClaims> {
    let data = decode::<UploadClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| ServerError::Unauthorized(format!("invalid upload token: {e}")))?;
    Ok(data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_claims() {
        let token = issue("secret", "up-1", "a.bin", 1024, "application/octet-stream", 1_700_000_000, 86_400).unwrap();
        let claims = verify("secret", &token).unwrap();
        assert_eq!(claims.upload_id, "up-1");
        assert_eq!(claims.file_size, 1024);
    }

    #[test]
    fn rejects_token_signed_with_a_different_secret() {
        let token = issue("secret-a", "up-1", "a.bin", 1024, "application/octet-stream", 1_700_000_000, 86_400).unwrap();
        assert!(verify("secret-b", &token).is_err());
    }
}
