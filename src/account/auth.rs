//! Password hashing and session token signing

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use super::types::AccountId;
use crate::error::ServiceError;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone)]
pub enum AuthError {
    InvalidPassword,
}

/// Hash a password using Argon2id. The PHC string embeds the salt.
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    let password_hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|_| AuthError::InvalidPassword)?
        .to_string();

    Ok(password_hash)
}

/// Verify a password against a hash
pub fn verify_password(password: &str, password_hash: &str) -> Result<(), AuthError> {
    let parsed_hash =
        PasswordHash::new(password_hash).map_err(|_| AuthError::InvalidPassword)?;

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| AuthError::InvalidPassword)
}

#[derive(Serialize, Deserialize, Debug)]
struct SessionClaims {
    uid: AccountId,
    exp: i64, // unix seconds, absolute expiry
}

/// Stateless bearer credential: `hex(claims_json) . hex(hmac_sha256(claims_json))`.
/// Validation needs no store lookup.
#[derive(Clone)]
pub struct SessionSigner {
    key: Vec<u8>,
    ttl: Duration,
}

impl SessionSigner {
    pub fn new(secret: &str, ttl_days: i64) -> Self {
        Self {
            key: secret.as_bytes().to_vec(),
            ttl: Duration::days(ttl_days),
        }
    }

    pub fn issue(&self, account_id: AccountId) -> String {
        self.issue_at(account_id, Utc::now())
    }

    pub fn issue_at(&self, account_id: AccountId, now: DateTime<Utc>) -> String {
        let claims = SessionClaims {
            uid: account_id,
            exp: (now + self.ttl).timestamp(),
        };
        // Claims are a flat struct of plain integers; serialization cannot fail.
        let payload = serde_json::to_vec(&claims).unwrap_or_default();
        let mut mac = HmacSha256::new_from_slice(&self.key)
            .expect("hmac accepts any key length");
        mac.update(&payload);
        let sig = mac.finalize().into_bytes();

        format!("{}.{}", hex::encode(&payload), hex::encode(sig))
    }

    pub fn validate(&self, token: &str) -> Result<AccountId, ServiceError> {
        self.validate_at(token, Utc::now())
    }

    pub fn validate_at(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<AccountId, ServiceError> {
        let (payload_hex, sig_hex) = token
            .split_once('.')
            .ok_or(ServiceError::InvalidSession)?;
        let payload = hex::decode(payload_hex).map_err(|_| ServiceError::InvalidSession)?;
        let sig = hex::decode(sig_hex).map_err(|_| ServiceError::InvalidSession)?;

        let mut mac = HmacSha256::new_from_slice(&self.key)
            .expect("hmac accepts any key length");
        mac.update(&payload);
        // Constant-time comparison
        mac.verify_slice(&sig)
            .map_err(|_| ServiceError::InvalidSession)?;

        let claims: SessionClaims =
            serde_json::from_slice(&payload).map_err(|_| ServiceError::InvalidSession)?;
        if now.timestamp() >= claims.exp {
            return Err(ServiceError::SessionExpired);
        }
        Ok(claims.uid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_hashing() {
        let password = "my_secure_password_123";
        let hash = hash_password(password).unwrap();

        // Verify correct password
        assert!(verify_password(password, &hash).is_ok());

        // Verify wrong password
        assert!(verify_password("wrong_password", &hash).is_err());
    }

    #[test]
    fn test_session_roundtrip() {
        let signer = SessionSigner::new("unit-test-secret", 7);
        let token = signer.issue(42);
        assert_eq!(signer.validate(&token).unwrap(), 42);
    }

    #[test]
    fn test_session_expiry() {
        let signer = SessionSigner::new("unit-test-secret", 7);
        let issued = Utc::now();
        let token = signer.issue_at(7, issued);

        // One second before expiry: still valid
        let almost = issued + Duration::days(7) - Duration::seconds(1);
        assert_eq!(signer.validate_at(&token, almost).unwrap(), 7);

        // At expiry: rejected with the expiry-specific error
        let expired = issued + Duration::days(7);
        assert_eq!(
            signer.validate_at(&token, expired),
            Err(ServiceError::SessionExpired)
        );
    }

    #[test]
    fn test_session_tamper_rejected() {
        let signer = SessionSigner::new("unit-test-secret", 7);
        let other = SessionSigner::new("different-secret", 7);

        let token = signer.issue(1);
        assert_eq!(other.validate(&token), Err(ServiceError::InvalidSession));

        // Flip a payload byte; the signature no longer matches
        let mut tampered = token.clone();
        tampered.replace_range(0..2, "ff");
        assert_eq!(
            signer.validate(&tampered),
            Err(ServiceError::InvalidSession)
        );

        assert_eq!(
            signer.validate("not-a-token"),
            Err(ServiceError::InvalidSession)
        );
    }
}
