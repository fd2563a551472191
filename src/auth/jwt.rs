use std::time::Duration;

use axum::extract::FromRef;
use jsonwebtoken::{decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::debug;

use crate::config::JwtConfig;
use crate::error::AppError;
use crate::state::AppState;
use crate::users::repo_types::User;

/// Signed claim set. The subject is the user's email (the username
/// everywhere in this system).
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub iat: usize,
    pub exp: usize,
    pub iss: String,
}

/// Holds the symmetric signing/verification keys plus token parameters.
/// Tokens are self-contained: no session store, no revocation short of
/// rotating the secret.
#[derive(Clone)]
pub struct JwtKeys {
    pub encoding: EncodingKey,
    pub decoding: DecodingKey,
    pub issuer: String,
    pub ttl: Duration,
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        JwtKeys::new(&state.config.jwt)
    }
}

impl JwtKeys {
    pub fn new(config: &JwtConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding: DecodingKey::from_secret(config.secret.as_bytes()),
            issuer: config.issuer.clone(),
            ttl: Duration::from_secs((config.ttl_minutes as u64) * 60),
        }
    }

    /// Issue a token for the given subject (email).
    pub fn sign_subject(&self, subject: &str) -> Result<String, AppError> {
        let now = OffsetDateTime::now_utc();
        let exp = now + TimeDuration::seconds(self.ttl.as_secs() as i64);
        let claims = Claims {
            sub: subject.to_owned(),
            iat: now.unix_timestamp() as usize,
            exp: exp.unix_timestamp() as usize,
            iss: self.issuer.clone(),
        };
        let token = encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| AppError::Internal(anyhow::Error::new(e)))?;
        debug!(subject = %subject, "jwt signed");
        Ok(token)
    }

    /// Issue a token for an authenticated user; the subject is the email.
    pub fn sign_principal(&self, user: &User) -> Result<String, AppError> {
        self.sign_subject(&user.email)
    }

    /// Verify signature, issuer and expiry; return the subject.
    /// Malformed input is a `TokenInvalid` failure, never a panic.
    pub fn subject_of(&self, token: &str) -> Result<String, AppError> {
        if token.trim().is_empty() {
            return Err(AppError::TokenInvalid);
        }
        let mut validation = Validation::default();
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        match decode::<Claims>(token, &self.decoding, &validation) {
            Ok(data) => Ok(data.claims.sub),
            Err(e) => match e.kind() {
                ErrorKind::ExpiredSignature => Err(AppError::TokenExpired),
                _ => Err(AppError::TokenInvalid),
            },
        }
    }

    /// Defensive wrapper used on request paths: swallows every parsing and
    /// verification failure into `false`.
    pub fn is_valid(&self, token: &str) -> bool {
        self.subject_of(token).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_keys() -> JwtKeys {
        JwtKeys::new(&JwtConfig {
            secret: "test-secret-key-for-unit-tests".into(),
            issuer: "test-issuer".into(),
            ttl_minutes: 60 * 24,
        })
    }

    #[test]
    fn sign_and_extract_subject() {
        let keys = make_keys();
        let token = keys.sign_subject("a@x.com").expect("sign");
        assert_eq!(token.split('.').count(), 3);
        assert_eq!(keys.subject_of(&token).expect("verify"), "a@x.com");
        assert!(keys.is_valid(&token));
    }

    #[test]
    fn expired_token_is_reported_as_expired() {
        let keys = make_keys();
        let past = OffsetDateTime::now_utc() - TimeDuration::hours(2);
        let claims = Claims {
            sub: "a@x.com".into(),
            iat: past.unix_timestamp() as usize,
            exp: (past + TimeDuration::minutes(5)).unix_timestamp() as usize,
            iss: "test-issuer".into(),
        };
        let token = encode(&Header::default(), &claims, &keys.encoding).expect("encode");
        let err = keys.subject_of(&token).unwrap_err();
        assert!(matches!(err, AppError::TokenExpired));
        assert!(!keys.is_valid(&token));
    }

    #[test]
    fn tampered_token_is_invalid() {
        let keys = make_keys();
        let other = JwtKeys::new(&JwtConfig {
            secret: "a-completely-different-secret".into(),
            issuer: "test-issuer".into(),
            ttl_minutes: 60,
        });
        let token = other.sign_subject("a@x.com").expect("sign");
        assert!(matches!(
            keys.subject_of(&token).unwrap_err(),
            AppError::TokenInvalid
        ));
    }

    #[test]
    fn wrong_issuer_is_invalid() {
        let keys = make_keys();
        let other = JwtKeys::new(&JwtConfig {
            secret: "test-secret-key-for-unit-tests".into(),
            issuer: "someone-else".into(),
            ttl_minutes: 60,
        });
        let token = other.sign_subject("a@x.com").expect("sign");
        assert!(matches!(
            keys.subject_of(&token).unwrap_err(),
            AppError::TokenInvalid
        ));
    }

    #[test]
    fn is_valid_never_panics_on_garbage() {
        let keys = make_keys();
        assert!(!keys.is_valid(""));
        assert!(!keys.is_valid("   "));
        assert!(!keys.is_valid("invalid.jwt.token"));
        assert!(!keys.is_valid("a.b"));
        assert!(!keys.is_valid("\u{0000}\u{ffff}"));
        let token = keys.sign_subject("a@x.com").expect("sign");
        assert!(!keys.is_valid(&token[..token.len() - 2]));
    }
}
