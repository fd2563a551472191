use serde::{Deserialize, Serialize};

use crate::users::repo_types::UserRole;

/// Request body for user registration. `role` is optional and defaults to
/// RENTER; ADMIN cannot be requested here.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub full_name: String,
    pub email: String,
    pub password: String,
    pub contact_number: String,
    #[serde(default)]
    pub role: Option<UserRole>,
}

/// Request body for local login.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Request body for Google OAuth login: the raw ID token from the client.
#[derive(Debug, Deserialize)]
pub struct GoogleLoginRequest {
    pub token: String,
}

/// Response returned after register, login or OAuth login. Reports the
/// primary role, not the full role set.
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user_id: i64,
    pub email: String,
    pub role: UserRole,
}
