//! Password hashing and session tokens.
//!
//! Passwords are stored as bcrypt hashes. API sessions are carried in HS256 JWTs whose
//! subject is the user's email address.

use crate::error::{AppResult, LabError};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// bcrypt work factor for new hashes.
pub const BCRYPT_COST: u32 = 10;

pub const AUTHORIZATION_HEADER: &str = "Authorization";
pub const TOKEN_PREFIX: &str = "Bearer ";

/// JWT payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Email of the logged in user
    pub sub: String,
    /// Expiry, seconds since the Unix epoch
    pub exp: i64,
}

pub fn hash_password(password: &str) -> AppResult<String> {
    Ok(bcrypt::hash(password, BCRYPT_COST)?)
}

/// True when `stored` looks like a bcrypt hash rather than a legacy plaintext password.
pub fn is_hashed(stored: &str) -> bool {
    stored.starts_with("$2") && stored.len() == 60
}

/// Check `password` against a stored bcrypt hash.
pub fn verify_password(password: &str, hash: &str) -> AppResult<bool> {
    Ok(bcrypt::verify(password, hash)?)
}

pub fn encode_token(email: &str, secret: &str, expire_seconds: i64) -> AppResult<String> {
    let exp = chrono::Utc::now()
        .checked_add_signed(chrono::Duration::seconds(expire_seconds))
        .ok_or_else(|| LabError::Auth("token expiry out of range".to_string()))?
        .timestamp();

    let claims = Claims {
        sub: email.to_string(),
        exp,
    };
    Ok(encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?)
}

pub fn decode_token(token: &str, secret: &str) -> AppResult<Claims> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )?;
    Ok(data.claims)
}

/// Token from an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header: &str) -> Option<&str> {
    header
        .strip_prefix(TOKEN_PREFIX)
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_round_trip() {
        let hash = hash_password("Welcome1").unwrap();
        assert!(is_hashed(&hash));
        assert!(verify_password("Welcome1", &hash).unwrap());
        assert!(!verify_password("welcome1", &hash).unwrap());
    }

    #[test]
    fn plaintext_is_not_a_hash() {
        assert!(!is_hashed("demo"));
        assert!(!is_hashed("$2short"));
    }

    #[test]
    fn token_carries_email() {
        let token = encode_token("admin@hp4280a.com", "secret", 60).unwrap();
        let claims = decode_token(&token, "secret").unwrap();
        assert_eq!(claims.sub, "admin@hp4280a.com");
        assert!(decode_token(&token, "other").is_err());
    }

    #[test]
    fn expired_token_is_rejected() {
        let token = encode_token("a@b.c", "secret", -3600).unwrap();
        assert!(matches!(decode_token(&token, "secret"), Err(LabError::Auth(_))));
    }

    #[test]
    fn bearer_header_parsing() {
        assert_eq!(bearer_token("Bearer abc"), Some("abc"));
        assert_eq!(bearer_token("Bearer  "), None);
        assert_eq!(bearer_token("Basic abc"), None);
    }
}
