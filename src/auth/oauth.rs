//! OAuth provider token verification and identity extraction.
//!
//! The verifier is the boundary to the provider: it checks the raw ID token's
//! signature, audience and issuer and hands back the verified claim set. The
//! extractor then maps the provider-specific claim names onto a canonical
//! identity tuple.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::config::AppConfig;
use crate::error::{AppError, Result};
use crate::users::repo_types::AuthProvider;

const GOOGLE_JWKS_URL: &str = "https://www.googleapis.com/oauth2/v3/certs";
const GOOGLE_ISSUERS: [&str; 2] = ["https://accounts.google.com", "accounts.google.com"];
const HTTP_TIMEOUT: Duration = Duration::from_secs(5);
const JWKS_CACHE_TTL: Duration = Duration::from_secs(300);

/// Canonical identity extracted from a provider's claim set.
#[derive(Debug, Clone)]
pub struct OAuthUserInfo {
    pub id: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub picture: Option<String>,
}

/// Map a provider's raw claims onto the canonical identity tuple, keyed
/// case-insensitively on the registration id. An unrecognized provider is a
/// hard stop: guessing the field mapping would corrupt identity data.
pub fn extract_user_info(
    registration_id: &str,
    claims: &serde_json::Value,
) -> Result<OAuthUserInfo> {
    match AuthProvider::from_registration_id(registration_id) {
        Some(AuthProvider::Google) => extract_google(claims),
        _ => Err(AppError::UnsupportedProvider(registration_id.to_string())),
    }
}

fn extract_google(claims: &serde_json::Value) -> Result<OAuthUserInfo> {
    // Google puts the stable user id in "sub"; a verified token always has it.
    let id = claims
        .get("sub")
        .and_then(serde_json::Value::as_str)
        .ok_or(AppError::InvalidProviderToken)?
        .to_owned();
    let field = |name: &str| {
        claims
            .get(name)
            .and_then(serde_json::Value::as_str)
            .map(str::to_owned)
    };
    Ok(OAuthUserInfo {
        id,
        name: field("name"),
        email: field("email"),
        picture: field("picture"),
    })
}

/// Provider token verification collaborator. The orchestrator treats this as
/// a black box and never bypasses it.
#[async_trait]
pub trait ProviderTokenVerifier: Send + Sync {
    /// Verify the raw ID token against this application's client id and
    /// return the claim payload.
    async fn verify_id_token(&self, raw_token: &str) -> Result<serde_json::Value>;
}

#[derive(Deserialize)]
struct Jwks {
    keys: Vec<Jwk>,
}

#[derive(Deserialize)]
struct Jwk {
    kid: String,
    n: String,
    e: String,
}

struct JwksCache {
    keys_by_kid: HashMap<String, DecodingKey>,
    expires_at: Instant,
}

/// Verifier for Google-issued ID tokens, validating RS256 signatures against
/// Google's published JWKS (cached), plus audience and issuer.
pub struct GoogleIdTokenVerifier {
    http: reqwest::Client,
    client_id: String,
    jwks: RwLock<Option<JwksCache>>,
}

impl GoogleIdTokenVerifier {
    pub fn new(config: &AppConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;
        Ok(Self {
            http,
            client_id: config.google_client_id.clone(),
            jwks: RwLock::new(None),
        })
    }

    async fn key_for(&self, kid: &str) -> Result<DecodingKey> {
        {
            let cache = self.jwks.read().await;
            if let Some(entry) = cache.as_ref() {
                if entry.expires_at > Instant::now() {
                    if let Some(key) = entry.keys_by_kid.get(kid) {
                        return Ok(key.clone());
                    }
                }
            }
        }

        // Miss or stale entry: refetch. An unknown kid after a fresh fetch
        // means the token was not signed by Google.
        let jwks: Jwks = self
            .http
            .get(GOOGLE_JWKS_URL)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| AppError::Internal(anyhow::Error::new(e)))?
            .json()
            .await
            .map_err(|e| AppError::Internal(anyhow::Error::new(e)))?;

        let mut keys_by_kid = HashMap::new();
        for jwk in jwks.keys {
            match DecodingKey::from_rsa_components(&jwk.n, &jwk.e) {
                Ok(key) => {
                    keys_by_kid.insert(jwk.kid, key);
                }
                Err(e) => warn!(kid = %jwk.kid, error = %e, "skipping unusable JWK"),
            }
        }
        debug!(keys = keys_by_kid.len(), "refreshed Google JWKS");

        let key = keys_by_kid.get(kid).cloned();
        *self.jwks.write().await = Some(JwksCache {
            keys_by_kid,
            expires_at: Instant::now() + JWKS_CACHE_TTL,
        });
        key.ok_or(AppError::InvalidProviderToken)
    }
}

#[async_trait]
impl ProviderTokenVerifier for GoogleIdTokenVerifier {
    async fn verify_id_token(&self, raw_token: &str) -> Result<serde_json::Value> {
        if raw_token.trim().is_empty() {
            return Err(AppError::InvalidProviderToken);
        }
        let header = decode_header(raw_token).map_err(|_| AppError::InvalidProviderToken)?;
        let kid = header.kid.ok_or(AppError::InvalidProviderToken)?;
        let key = self.key_for(&kid).await?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(std::slice::from_ref(&self.client_id));
        validation.set_issuer(&GOOGLE_ISSUERS);

        let data = decode::<serde_json::Value>(raw_token, &key, &validation).map_err(|e| {
            warn!(error = %e, "Google ID token rejected");
            AppError::InvalidProviderToken
        })?;
        Ok(data.claims)
    }
}

/// Verifier stub used by `AppState::fake()` and tests: returns a fixed claim
/// set, or rejects everything.
pub struct StaticTokenVerifier {
    claims: Option<serde_json::Value>,
}

impl StaticTokenVerifier {
    pub fn accepting(claims: serde_json::Value) -> Self {
        Self {
            claims: Some(claims),
        }
    }

    pub fn rejecting() -> Self {
        Self { claims: None }
    }
}

#[async_trait]
impl ProviderTokenVerifier for StaticTokenVerifier {
    async fn verify_id_token(&self, raw_token: &str) -> Result<serde_json::Value> {
        if raw_token.trim().is_empty() {
            return Err(AppError::InvalidProviderToken);
        }
        self.claims.clone().ok_or(AppError::InvalidProviderToken)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn google_claims() -> serde_json::Value {
        json!({
            "sub": "108256943125",
            "name": "Ada Lovelace",
            "email": "ada@x.com",
            "picture": "https://lh3.googleusercontent.com/a/photo",
            "email_verified": true,
        })
    }

    #[test]
    fn google_claims_map_to_canonical_fields() {
        let info = extract_user_info("google", &google_claims()).expect("extract");
        assert_eq!(info.id, "108256943125");
        assert_eq!(info.name.as_deref(), Some("Ada Lovelace"));
        assert_eq!(info.email.as_deref(), Some("ada@x.com"));
        assert_eq!(
            info.picture.as_deref(),
            Some("https://lh3.googleusercontent.com/a/photo")
        );
    }

    #[test]
    fn registration_id_is_case_insensitive() {
        assert!(extract_user_info("GOOGLE", &google_claims()).is_ok());
        assert!(extract_user_info("Google", &google_claims()).is_ok());
    }

    #[test]
    fn unknown_provider_fails_fast() {
        let err = extract_user_info("github", &google_claims()).unwrap_err();
        assert!(matches!(err, AppError::UnsupportedProvider(ref p) if p == "github"));
    }

    #[test]
    fn recognized_but_unimplemented_provider_is_unsupported() {
        let err = extract_user_info("facebook", &google_claims()).unwrap_err();
        assert!(matches!(err, AppError::UnsupportedProvider(_)));
    }

    #[test]
    fn missing_subject_claim_is_an_invalid_token() {
        let err = extract_user_info("google", &json!({"email": "a@x.com"})).unwrap_err();
        assert!(matches!(err, AppError::InvalidProviderToken));
    }

    #[tokio::test]
    async fn static_verifier_rejects_empty_tokens() {
        let verifier = StaticTokenVerifier::accepting(google_claims());
        assert!(verifier.verify_id_token("").await.is_err());
        assert!(verifier.verify_id_token("anything").await.is_ok());
    }
}
