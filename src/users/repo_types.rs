use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;

/// Primary/display role on the user record. The source of truth for
/// authorization is the association tables, unioned with this field.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(type_name = "user_role", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    Renter,
    VehicleOwner,
    Admin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "auth_provider", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthProvider {
    Local,
    Google,
    Facebook,
    Apple,
}

impl AuthProvider {
    /// Maps an OAuth registration id ("google", "GOOGLE", ...) to a provider.
    /// LOCAL is not an OAuth registration and never matches.
    pub fn from_registration_id(registration_id: &str) -> Option<Self> {
        match registration_id.to_ascii_lowercase().as_str() {
            "google" => Some(AuthProvider::Google),
            "facebook" => Some(AuthProvider::Facebook),
            "apple" => Some(AuthProvider::Apple),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AuthProvider::Local => "LOCAL",
            AuthProvider::Google => "GOOGLE",
            AuthProvider::Facebook => "FACEBOOK",
            AuthProvider::Apple => "APPLE",
        }
    }
}

impl std::fmt::Display for AuthProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Vehicle owner verification workflow:
/// NOT_SUBMITTED -> PENDING -> {APPROVED, REJECTED}; REJECTED -> PENDING on
/// resubmission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "verification_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationStatus {
    NotSubmitted,
    Pending,
    Approved,
    Rejected,
}

/// User record in the database.
///
/// Invariants: `password_hash` is set iff `auth_provider == LOCAL`;
/// a non-LOCAL provider implies `oauth_id` is set.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,
    pub full_name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub contact_number: String,
    pub role: UserRole,
    pub auth_provider: AuthProvider,
    pub oauth_id: Option<String>,
    pub profile_picture: Option<String>,
    pub email_verified: bool,
    pub is_active: bool,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl User {
    pub fn is_oauth(&self) -> bool {
        self.auth_provider != AuthProvider::Local
    }
}

/// Fields required to insert a new user. The store also creates the
/// automatic renter association in the same transaction.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub full_name: String,
    pub email: String,
    pub password_hash: Option<String>,
    pub contact_number: String,
    pub role: UserRole,
    pub auth_provider: AuthProvider,
    pub oauth_id: Option<String>,
    pub profile_picture: Option<String>,
    pub email_verified: bool,
}

/// Vehicle owner association row, one-to-one with a user.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct VehicleOwner {
    pub id: i64,
    pub user_id: i64,
    pub verification_documents: Option<serde_json::Value>,
    pub verification_status: VerificationStatus,
    pub verification_notes: Option<String>,
}
