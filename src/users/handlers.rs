use axum::extract::{Path, State};
use axum::Json;
use tracing::instrument;

use crate::auth::roles::{authorize, Capability, Principal};
use crate::error::{AppError, Result};
use crate::state::AppState;
use crate::users::dto::{
    ChangePasswordRequest, MessageResponse, ReviewVerificationRequest, RolesResponse,
    SubmitVerificationRequest, UpdateUserRequest, UserDto,
};
use crate::users::services;

fn require(principal: &Principal, capability: Capability) -> Result<()> {
    if authorize(principal, capability) {
        Ok(())
    } else {
        Err(AppError::Forbidden)
    }
}

#[instrument(skip(state, principal), fields(user_id = principal.id))]
pub async fn me(State(state): State<AppState>, principal: Principal) -> Result<Json<UserDto>> {
    let dto = services::get_user(&state, principal.id).await?;
    Ok(Json(dto))
}

#[instrument(skip(principal), fields(user_id = principal.id))]
pub async fn my_roles(principal: Principal) -> Json<RolesResponse> {
    Json(RolesResponse {
        roles: principal.roles,
    })
}

#[instrument(skip(state, principal))]
pub async fn list_users(
    State(state): State<AppState>,
    principal: Principal,
) -> Result<Json<Vec<UserDto>>> {
    require(&principal, Capability::Admin)?;
    let users = services::list_users(&state).await?;
    Ok(Json(users))
}

#[instrument(skip(state, principal))]
pub async fn get_user(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<i64>,
) -> Result<Json<UserDto>> {
    require(&principal, Capability::SelfOrAdmin(id))?;
    let dto = services::get_user(&state, id).await?;
    Ok(Json(dto))
}

#[instrument(skip(state, principal, req))]
pub async fn update_user(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<i64>,
    Json(req): Json<UpdateUserRequest>,
) -> Result<Json<UserDto>> {
    require(&principal, Capability::SelfOrAdmin(id))?;
    if let Some(email) = req.email.as_deref() {
        if !crate::auth::services::is_valid_email(email.trim()) {
            return Err(AppError::Validation("invalid email address".into()));
        }
    }
    let dto = services::update_user(&state, id, req).await?;
    Ok(Json(dto))
}

#[instrument(skip(state, principal, req))]
pub async fn change_password(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<i64>,
    Json(req): Json<ChangePasswordRequest>,
) -> Result<Json<MessageResponse>> {
    require(&principal, Capability::SelfOnly(id))?;
    if req.new_password.len() < 8 {
        return Err(AppError::Validation(
            "password must be at least 8 characters".into(),
        ));
    }
    services::change_password(&state, id, req).await?;
    Ok(Json(MessageResponse::new("password changed")))
}

#[instrument(skip(state, principal))]
pub async fn deactivate_user(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<i64>,
) -> Result<Json<MessageResponse>> {
    require(&principal, Capability::SelfOrAdmin(id))?;
    services::deactivate_user(&state, id).await?;
    Ok(Json(MessageResponse::new("account deactivated")))
}

#[instrument(skip(state, principal))]
pub async fn reactivate_user(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<i64>,
) -> Result<Json<UserDto>> {
    require(&principal, Capability::Admin)?;
    let dto = services::reactivate_user(&state, id).await?;
    Ok(Json(dto))
}

#[instrument(skip(state, principal))]
pub async fn delete_user_permanently(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<i64>,
) -> Result<Json<MessageResponse>> {
    require(&principal, Capability::Admin)?;
    services::delete_user_permanently(&state, id).await?;
    Ok(Json(MessageResponse::new("account deleted")))
}

#[instrument(skip(state, principal, req), fields(user_id = principal.id))]
pub async fn submit_owner_verification(
    State(state): State<AppState>,
    principal: Principal,
    Json(req): Json<SubmitVerificationRequest>,
) -> Result<Json<MessageResponse>> {
    services::submit_owner_verification(&state, principal.id, req.documents).await?;
    Ok(Json(MessageResponse::new("verification submitted")))
}

#[instrument(skip(state, principal, req))]
pub async fn review_owner_verification(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<i64>,
    Json(req): Json<ReviewVerificationRequest>,
) -> Result<Json<MessageResponse>> {
    require(&principal, Capability::Admin)?;
    services::review_owner_verification(&state, id, req.approved, req.notes).await?;
    let message = if req.approved {
        "verification approved"
    } else {
        "verification rejected"
    };
    Ok(Json(MessageResponse::new(message)))
}
