use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("password hashing failed: {0}")]
    Hash(String),
    #[error("token signing key rejected: {0}")]
    Key(String),
    #[error("token is malformed")]
    Malformed,
    #[error("token signature mismatch")]
    BadSignature,
    #[error("token expired")]
    Expired,
}

pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| AuthError::Hash(err.to_string()))
}

pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    PasswordHash::new(stored_hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

/// Issues and checks bearer tokens of the form
/// `<student-id>.<expires-unix-seconds>.<hex hmac-sha256>`.
#[derive(Clone)]
pub struct TokenSigner {
    secret: Vec<u8>,
    ttl: Duration,
}

impl TokenSigner {
    pub fn new(secret: &str, ttl_days: i64) -> Self {
        Self {
            secret: secret.as_bytes().to_vec(),
            ttl: Duration::days(ttl_days.max(1)),
        }
    }

    fn mac(&self, payload: &str) -> Result<Hmac<Sha256>, AuthError> {
        let mut mac = Hmac::<Sha256>::new_from_slice(&self.secret)
            .map_err(|err| AuthError::Key(err.to_string()))?;
        mac.update(payload.as_bytes());
        Ok(mac)
    }

    pub fn issue(&self, student_id: Uuid) -> Result<String, AuthError> {
        self.issue_at(student_id, Utc::now())
    }

    pub fn issue_at(&self, student_id: Uuid, now: DateTime<Utc>) -> Result<String, AuthError> {
        let expires = (now + self.ttl).timestamp();
        let payload = format!("{student_id}.{expires}");
        let signature = hex::encode(self.mac(&payload)?.finalize().into_bytes());
        Ok(format!("{payload}.{signature}"))
    }

    pub fn verify(&self, token: &str) -> Result<Uuid, AuthError> {
        self.verify_at(token, Utc::now())
    }

    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<Uuid, AuthError> {
        let mut parts = token.trim().splitn(3, '.');
        let (Some(id), Some(expires), Some(signature)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(AuthError::Malformed);
        };
        let student_id = Uuid::parse_str(id).map_err(|_| AuthError::Malformed)?;
        let expires_at = expires.parse::<i64>().map_err(|_| AuthError::Malformed)?;
        let signature = hex::decode(signature).map_err(|_| AuthError::Malformed)?;

        self.mac(&format!("{id}.{expires}"))?
            .verify_slice(&signature)
            .map_err(|_| AuthError::BadSignature)?;

        if now.timestamp() >= expires_at {
            return Err(AuthError::Expired);
        }
        Ok(student_id)
    }
}
