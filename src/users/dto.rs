use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::users::repo_types::{AuthProvider, User, UserRole, VerificationStatus};

/// Public view of a user, with the resolved effective roles attached.
#[derive(Debug, Serialize)]
pub struct UserDto {
    pub id: i64,
    pub full_name: String,
    pub email: String,
    pub contact_number: String,
    pub role: UserRole,
    pub roles: BTreeSet<UserRole>,
    pub auth_provider: AuthProvider,
    pub profile_picture: Option<String>,
    pub email_verified: bool,
    pub is_active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification_status: Option<VerificationStatus>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl UserDto {
    pub fn from_user(
        user: User,
        roles: BTreeSet<UserRole>,
        verification_status: Option<VerificationStatus>,
    ) -> Self {
        Self {
            id: user.id,
            full_name: user.full_name,
            email: user.email,
            contact_number: user.contact_number,
            role: user.role,
            roles,
            auth_provider: user.auth_provider,
            profile_picture: user.profile_picture,
            email_verified: user.email_verified,
            is_active: user.is_active,
            verification_status,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub contact_number: Option<String>,
    pub profile_picture: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct SubmitVerificationRequest {
    pub documents: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct ReviewVerificationRequest {
    pub approved: bool,
    pub notes: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RolesResponse {
    pub roles: BTreeSet<UserRole>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
