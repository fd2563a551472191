//! Profile management and the vehicle-owner verification state machine.

use tracing::{info, warn};

use crate::auth::password::{hash_password, verify_password};
use crate::auth::roles::resolve_roles;
use crate::error::{AppError, Result};
use crate::state::AppState;
use crate::users::dto::{ChangePasswordRequest, UpdateUserRequest, UserDto};
use crate::users::repo_types::{User, VehicleOwner, VerificationStatus};

async fn load_user(state: &AppState, id: i64) -> Result<User> {
    state
        .store
        .find_by_id(id)
        .await?
        .ok_or(AppError::UserNotFound(id))
}

async fn to_dto(state: &AppState, user: User) -> Result<UserDto> {
    let roles = resolve_roles(state.store.as_ref(), &user).await?;
    let verification_status = state
        .store
        .find_owner(user.id)
        .await?
        .map(|owner| owner.verification_status);
    Ok(UserDto::from_user(user, roles, verification_status))
}

pub async fn get_user(state: &AppState, id: i64) -> Result<UserDto> {
    let user = load_user(state, id).await?;
    to_dto(state, user).await
}

pub async fn list_users(state: &AppState) -> Result<Vec<UserDto>> {
    let users = state.store.list().await?;
    let mut dtos = Vec::with_capacity(users.len());
    for user in users {
        dtos.push(to_dto(state, user).await?);
    }
    Ok(dtos)
}

pub async fn update_user(state: &AppState, id: i64, req: UpdateUserRequest) -> Result<UserDto> {
    let mut user = load_user(state, id).await?;

    if let Some(email) = req.email {
        let email = email.trim().to_lowercase();
        if email != user.email {
            if state.store.exists_by_email(&email).await? {
                return Err(AppError::EmailAlreadyRegistered);
            }
            user.email = email;
            user.email_verified = false;
        }
    }
    if let Some(full_name) = req.full_name {
        if full_name.trim().is_empty() {
            return Err(AppError::Validation("full name must not be empty".into()));
        }
        user.full_name = full_name;
    }
    if let Some(contact_number) = req.contact_number {
        user.contact_number = contact_number;
    }
    if let Some(profile_picture) = req.profile_picture {
        user.profile_picture = Some(profile_picture);
    }

    let user = state.store.update(&user).await?;
    info!(user_id = user.id, "user profile updated");
    to_dto(state, user).await
}

pub async fn change_password(
    state: &AppState,
    id: i64,
    req: ChangePasswordRequest,
) -> Result<()> {
    let mut user = load_user(state, id).await?;

    let current_hash = match user.password_hash.as_deref() {
        Some(hash) if !user.is_oauth() => hash,
        _ => {
            warn!(user_id = user.id, "password change for OAuth account");
            return Err(AppError::OAuthNotPermittedForPasswordChange);
        }
    };

    if !verify_password(&req.current_password, current_hash).map_err(AppError::Internal)? {
        return Err(AppError::PasswordMismatch);
    }

    user.password_hash = Some(hash_password(&req.new_password).map_err(AppError::Internal)?);
    state.store.update(&user).await?;
    info!(user_id = user.id, "password changed");
    Ok(())
}

/// Soft delete: the row stays, logins and token use stop working.
pub async fn deactivate_user(state: &AppState, id: i64) -> Result<()> {
    let mut user = load_user(state, id).await?;
    user.is_active = false;
    state.store.update(&user).await?;
    info!(user_id = id, "user deactivated");
    Ok(())
}

pub async fn reactivate_user(state: &AppState, id: i64) -> Result<UserDto> {
    let mut user = load_user(state, id).await?;
    user.is_active = true;
    let user = state.store.update(&user).await?;
    info!(user_id = id, "user reactivated");
    to_dto(state, user).await
}

pub async fn delete_user_permanently(state: &AppState, id: i64) -> Result<()> {
    load_user(state, id).await?;
    state.store.delete(id).await?;
    info!(user_id = id, "user permanently deleted");
    Ok(())
}

/// Submit (or resubmit) owner verification documents. Allowed from
/// NOT_SUBMITTED and REJECTED; a PENDING or APPROVED application cannot be
/// replaced.
pub async fn submit_owner_verification(
    state: &AppState,
    user_id: i64,
    documents: serde_json::Value,
) -> Result<VehicleOwner> {
    load_user(state, user_id).await?;

    let owner = match state.store.find_owner(user_id).await? {
        None => {
            state
                .store
                .insert_owner(user_id, documents, VerificationStatus::Pending)
                .await?
        }
        Some(mut owner) => match owner.verification_status {
            VerificationStatus::NotSubmitted | VerificationStatus::Rejected => {
                owner.verification_documents = Some(documents);
                owner.verification_status = VerificationStatus::Pending;
                owner.verification_notes = None;
                state.store.update_owner(&owner).await?
            }
            VerificationStatus::Pending => {
                return Err(AppError::Validation(
                    "a verification application is already pending review".into(),
                ))
            }
            VerificationStatus::Approved => {
                return Err(AppError::Validation(
                    "owner account is already verified".into(),
                ))
            }
        },
    };

    info!(user_id, "owner verification submitted");
    Ok(owner)
}

/// Admin review of a pending application. Only PENDING applications can be
/// decided.
pub async fn review_owner_verification(
    state: &AppState,
    user_id: i64,
    approved: bool,
    notes: Option<String>,
) -> Result<VehicleOwner> {
    load_user(state, user_id).await?;

    let mut owner = state.store.find_owner(user_id).await?.ok_or_else(|| {
        AppError::Validation("no verification application to review".into())
    })?;

    if owner.verification_status != VerificationStatus::Pending {
        return Err(AppError::Validation(
            "no pending verification application to review".into(),
        ));
    }

    owner.verification_status = if approved {
        VerificationStatus::Approved
    } else {
        VerificationStatus::Rejected
    };
    owner.verification_notes = notes;
    let owner = state.store.update_owner(&owner).await?;
    info!(user_id, approved, "owner verification reviewed");
    Ok(owner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::dto::RegisterRequest;
    use crate::auth::services::{login, register};
    use crate::users::repo_types::{AuthProvider, NewUser, UserRole};
    use serde_json::json;

    async fn seed_local_user(state: &AppState, email: &str) -> i64 {
        register(
            state,
            RegisterRequest {
                full_name: "Ada Lovelace".into(),
                email: email.into(),
                password: "Secret123!".into(),
                contact_number: "+1234567890".into(),
                role: None,
            },
        )
        .await
        .expect("register")
        .user_id
    }

    async fn seed_oauth_user(state: &AppState, email: &str) -> i64 {
        state
            .store
            .create(NewUser {
                full_name: "Ada Lovelace".into(),
                email: email.into(),
                password_hash: None,
                contact_number: String::new(),
                role: UserRole::Renter,
                auth_provider: AuthProvider::Google,
                oauth_id: Some("google-uid-1".into()),
                profile_picture: None,
                email_verified: true,
            })
            .await
            .expect("seed")
            .id
    }

    #[tokio::test]
    async fn get_user_includes_resolved_roles() {
        let state = AppState::fake();
        let id = seed_local_user(&state, "a@x.com").await;

        let dto = get_user(&state, id).await.expect("get");
        assert_eq!(dto.roles.len(), 1);
        assert!(dto.roles.contains(&UserRole::Renter));
        assert!(dto.verification_status.is_none());

        let err = get_user(&state, 999).await.unwrap_err();
        assert!(matches!(err, AppError::UserNotFound(_)));
    }

    #[tokio::test]
    async fn update_user_rejects_taken_email() {
        let state = AppState::fake();
        seed_local_user(&state, "a@x.com").await;
        let id = seed_local_user(&state, "b@x.com").await;

        let err = update_user(
            &state,
            id,
            UpdateUserRequest {
                full_name: None,
                email: Some("a@x.com".into()),
                contact_number: None,
                profile_picture: None,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::EmailAlreadyRegistered));
    }

    #[tokio::test]
    async fn update_user_email_change_resets_verification() {
        let state = AppState::fake();
        let id = seed_oauth_user(&state, "a@x.com").await;

        let dto = update_user(
            &state,
            id,
            UpdateUserRequest {
                full_name: Some("Ada King".into()),
                email: Some("New@X.com".into()),
                contact_number: Some("+9876543210".into()),
                profile_picture: None,
            },
        )
        .await
        .expect("update");
        assert_eq!(dto.email, "new@x.com");
        assert_eq!(dto.full_name, "Ada King");
        assert!(!dto.email_verified);
    }

    #[tokio::test]
    async fn change_password_flow() {
        let state = AppState::fake();
        let id = seed_local_user(&state, "a@x.com").await;

        let err = change_password(
            &state,
            id,
            ChangePasswordRequest {
                current_password: "WrongPass1!".into(),
                new_password: "NewSecret1!".into(),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::PasswordMismatch));

        change_password(
            &state,
            id,
            ChangePasswordRequest {
                current_password: "Secret123!".into(),
                new_password: "NewSecret1!".into(),
            },
        )
        .await
        .expect("change password");

        let err = login(
            &state,
            crate::auth::dto::LoginRequest {
                email: "a@x.com".into(),
                password: "Secret123!".into(),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::InvalidCredentials));
        login(
            &state,
            crate::auth::dto::LoginRequest {
                email: "a@x.com".into(),
                password: "NewSecret1!".into(),
            },
        )
        .await
        .expect("login with new password");
    }

    #[tokio::test]
    async fn oauth_account_cannot_change_password() {
        let state = AppState::fake();
        let id = seed_oauth_user(&state, "a@x.com").await;

        let err = change_password(
            &state,
            id,
            ChangePasswordRequest {
                current_password: "irrelevant".into(),
                new_password: "NewSecret1!".into(),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::OAuthNotPermittedForPasswordChange));
    }

    #[tokio::test]
    async fn deactivate_and_reactivate() {
        let state = AppState::fake();
        let id = seed_local_user(&state, "a@x.com").await;

        deactivate_user(&state, id).await.expect("deactivate");
        let user = state.store.find_by_id(id).await.unwrap().unwrap();
        assert!(!user.is_active);

        let dto = reactivate_user(&state, id).await.expect("reactivate");
        assert!(dto.is_active);
        login(
            &state,
            crate::auth::dto::LoginRequest {
                email: "a@x.com".into(),
                password: "Secret123!".into(),
            },
        )
        .await
        .expect("login after reactivation");
    }

    #[tokio::test]
    async fn permanent_delete_removes_user() {
        let state = AppState::fake();
        let id = seed_local_user(&state, "a@x.com").await;

        delete_user_permanently(&state, id).await.expect("delete");
        assert!(state.store.find_by_id(id).await.unwrap().is_none());

        let err = delete_user_permanently(&state, id).await.unwrap_err();
        assert!(matches!(err, AppError::UserNotFound(_)));
    }

    #[tokio::test]
    async fn verification_state_machine() {
        let state = AppState::fake();
        let id = seed_local_user(&state, "owner@x.com").await;
        let docs = json!({"license": "doc-1", "registration": "doc-2"});

        // First submission opens a PENDING application.
        let owner = submit_owner_verification(&state, id, docs.clone())
            .await
            .expect("submit");
        assert_eq!(owner.verification_status, VerificationStatus::Pending);

        // A pending application cannot be resubmitted.
        let err = submit_owner_verification(&state, id, docs.clone())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        // Reject, then resubmit.
        let owner = review_owner_verification(&state, id, false, Some("blurry scan".into()))
            .await
            .expect("reject");
        assert_eq!(owner.verification_status, VerificationStatus::Rejected);
        assert_eq!(owner.verification_notes.as_deref(), Some("blurry scan"));

        let owner = submit_owner_verification(&state, id, docs.clone())
            .await
            .expect("resubmit");
        assert_eq!(owner.verification_status, VerificationStatus::Pending);
        assert!(owner.verification_notes.is_none());

        // Approve; approved accounts cannot resubmit and cannot be re-reviewed.
        let owner = review_owner_verification(&state, id, true, None)
            .await
            .expect("approve");
        assert_eq!(owner.verification_status, VerificationStatus::Approved);

        let err = submit_owner_verification(&state, id, docs).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        let err = review_owner_verification(&state, id, false, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn approval_grants_owner_role() {
        let state = AppState::fake();
        let id = seed_local_user(&state, "owner@x.com").await;
        submit_owner_verification(&state, id, json!({"license": "doc"}))
            .await
            .expect("submit");
        review_owner_verification(&state, id, true, None)
            .await
            .expect("approve");

        let dto = get_user(&state, id).await.expect("get");
        assert!(dto.roles.contains(&UserRole::VehicleOwner));
        assert!(dto.roles.contains(&UserRole::Renter));
        assert_eq!(dto.verification_status, Some(VerificationStatus::Approved));
    }

    #[tokio::test]
    async fn review_without_application_is_rejected() {
        let state = AppState::fake();
        let id = seed_local_user(&state, "a@x.com").await;

        // The user exists but has nothing to review.
        let err = review_owner_verification(&state, id, true, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        // An unknown user is a genuine 404.
        let err = review_owner_verification(&state, 999, true, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::UserNotFound(_)));
    }
}
