use axum::extract::State;
use axum::Json;
use tracing::instrument;

use crate::auth::dto::{AuthResponse, GoogleLoginRequest, LoginRequest, RegisterRequest};
use crate::auth::services;
use crate::error::{AppError, Result};
use crate::state::AppState;

const MIN_PASSWORD_LEN: usize = 8;

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn validate_password(password: &str) -> Result<()> {
    if password.len() < MIN_PASSWORD_LEN {
        return Err(AppError::Validation(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

#[instrument(skip(state, req), fields(email = %req.email))]
pub async fn register(
    State(state): State<AppState>,
    Json(mut req): Json<RegisterRequest>,
) -> Result<Json<AuthResponse>> {
    req.email = normalize_email(&req.email);
    if !services::is_valid_email(&req.email) {
        return Err(AppError::Validation("invalid email address".into()));
    }
    validate_password(&req.password)?;
    if req.full_name.trim().is_empty() {
        return Err(AppError::Validation("full name must not be empty".into()));
    }

    let resp = services::register(&state, req).await?;
    Ok(Json(resp))
}

#[instrument(skip(state, req), fields(email = %req.email))]
pub async fn login(
    State(state): State<AppState>,
    Json(mut req): Json<LoginRequest>,
) -> Result<Json<AuthResponse>> {
    req.email = normalize_email(&req.email);
    let resp = services::login(&state, req).await?;
    Ok(Json(resp))
}

#[instrument(skip_all)]
pub async fn google_login(
    State(state): State<AppState>,
    Json(req): Json<GoogleLoginRequest>,
) -> Result<Json<AuthResponse>> {
    if req.token.trim().is_empty() {
        return Err(AppError::Validation("token must not be empty".into()));
    }
    let resp = services::oauth_login(&state, "google", &req.token).await?;
    Ok(Json(resp))
}
