//! Authentication orchestrator: registration, local login, OAuth login.

use axum::extract::FromRef;
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, warn};

use crate::auth::dto::{AuthResponse, LoginRequest, RegisterRequest};
use crate::auth::jwt::JwtKeys;
use crate::auth::oauth::extract_user_info;
use crate::auth::password::{hash_password, verify_password};
use crate::error::{AppError, Result};
use crate::state::AppState;
use crate::users::repo_types::{AuthProvider, NewUser, User, UserRole};

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Allowed provider transitions for an existing account:
/// same provider is a no-op, LOCAL upgrades one-way to the incoming OAuth
/// provider, anything else is a mismatch.
pub(crate) fn provider_transition(
    current: AuthProvider,
    incoming: AuthProvider,
) -> Result<bool> {
    if current == incoming {
        Ok(false)
    } else if current == AuthProvider::Local {
        Ok(true)
    } else {
        Err(AppError::ProviderMismatch(current))
    }
}

/// Register a new LOCAL user. Writes the user and the automatic renter
/// association in one transaction.
pub async fn register(state: &AppState, req: RegisterRequest) -> Result<AuthResponse> {
    let role = match req.role {
        None => UserRole::Renter,
        // Admins are provisioned out-of-band, never self-service.
        Some(UserRole::Admin) => {
            return Err(AppError::Validation(
                "role ADMIN cannot be requested at registration".into(),
            ))
        }
        Some(role) => role,
    };

    if state.store.exists_by_email(&req.email).await? {
        warn!(email = %req.email, "email already registered");
        return Err(AppError::EmailAlreadyRegistered);
    }

    let password_hash = hash_password(&req.password).map_err(AppError::Internal)?;

    // The store's unique constraint backstops the pre-check under races.
    let user = state
        .store
        .create(NewUser {
            full_name: req.full_name,
            email: req.email,
            password_hash: Some(password_hash),
            contact_number: req.contact_number,
            role,
            auth_provider: AuthProvider::Local,
            oauth_id: None,
            profile_picture: None,
            email_verified: false,
        })
        .await?;

    let token = JwtKeys::from_ref(state).sign_principal(&user)?;
    info!(user_id = user.id, email = %user.email, "user registered");
    Ok(auth_response(token, &user))
}

/// Local login. Unknown email, wrong password, OAuth-only accounts and
/// deactivated accounts are all indistinguishable to the caller.
pub async fn login(state: &AppState, req: LoginRequest) -> Result<AuthResponse> {
    let user = match state.store.find_by_email(&req.email).await? {
        Some(user) => user,
        None => {
            warn!(email = %req.email, "login for unknown email");
            return Err(AppError::InvalidCredentials);
        }
    };

    if !user.is_active {
        warn!(user_id = user.id, "login for deactivated account");
        return Err(AppError::InvalidCredentials);
    }

    let password_hash = match user.password_hash.as_deref() {
        Some(hash) => hash,
        None => {
            warn!(user_id = user.id, "password login for OAuth account");
            return Err(AppError::InvalidCredentials);
        }
    };

    if !verify_password(&req.password, password_hash).map_err(AppError::Internal)? {
        warn!(user_id = user.id, "login with invalid password");
        return Err(AppError::InvalidCredentials);
    }

    let token = JwtKeys::from_ref(state).sign_principal(&user)?;
    info!(user_id = user.id, email = %user.email, "user logged in");
    Ok(auth_response(token, &user))
}

/// OAuth login: verify the provider token, extract the canonical identity,
/// then log in, upgrade, or provision the user.
pub async fn oauth_login(
    state: &AppState,
    registration_id: &str,
    raw_token: &str,
) -> Result<AuthResponse> {
    let provider = AuthProvider::from_registration_id(registration_id)
        .ok_or_else(|| AppError::UnsupportedProvider(registration_id.to_string()))?;

    let claims = state.verifier.verify_id_token(raw_token).await?;
    let identity = extract_user_info(registration_id, &claims)?;

    // Providers are not consistent about email casing; canonicalize the same
    // way the local flows do before any lookup.
    let email = identity
        .email
        .as_deref()
        .map(|e| e.trim().to_lowercase())
        .filter(|e| !e.is_empty())
        .ok_or(AppError::EmailMissingFromProvider)?;
    let email_verified = claims
        .get("email_verified")
        .and_then(serde_json::Value::as_bool)
        .unwrap_or(true);

    // Prefer the stable provider id; fall back to the email for accounts
    // that predate the OAuth link.
    let existing = match state.store.find_by_oauth_id(&identity.id).await? {
        Some(user) => Some(user),
        None => state.store.find_by_email(&email).await?,
    };

    let user = match existing {
        Some(mut user) => {
            if !user.is_active {
                warn!(user_id = user.id, "OAuth login for deactivated account");
                return Err(AppError::InvalidCredentials);
            }
            let upgraded = provider_transition(user.auth_provider, provider)?;
            if upgraded {
                // One-way upgrade: attach the external id and drop the local
                // password so the LOCAL invariant keeps holding.
                user.auth_provider = provider;
                user.password_hash = None;
                info!(user_id = user.id, provider = %provider, "account upgraded to OAuth provider");
            }
            if user.oauth_id.is_none() {
                user.oauth_id = Some(identity.id.clone());
            }
            // Refresh display data from the provider on every login.
            if let Some(name) = &identity.name {
                user.full_name = name.clone();
            }
            if identity.picture.is_some() {
                user.profile_picture = identity.picture.clone();
            }
            user.email_verified = email_verified;
            state.store.update(&user).await?
        }
        None => {
            let user = state
                .store
                .create(NewUser {
                    full_name: identity.name.clone().unwrap_or_else(|| email.clone()),
                    email,
                    password_hash: None,
                    contact_number: String::new(),
                    role: UserRole::Renter,
                    auth_provider: provider,
                    oauth_id: Some(identity.id.clone()),
                    profile_picture: identity.picture.clone(),
                    email_verified: true,
                })
                .await?;
            info!(user_id = user.id, provider = %provider, "user provisioned via OAuth");
            user
        }
    };

    let token = JwtKeys::from_ref(state).sign_principal(&user)?;
    Ok(auth_response(token, &user))
}

fn auth_response(token: String, user: &User) -> AuthResponse {
    AuthResponse {
        token,
        user_id: user.id,
        email: user.email.clone(),
        role: user.role,
    }
}
