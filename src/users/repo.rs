use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;

use crate::error::{AppError, Result};
use crate::users::repo_types::{NewUser, User, UserRole, VehicleOwner, VerificationStatus};

const USER_COLUMNS: &str = "id, full_name, email, password_hash, contact_number, role, \
                            auth_provider, oauth_id, profile_picture, email_verified, \
                            is_active, created_at, updated_at";

const OWNER_COLUMNS: &str =
    "id, user_id, verification_documents, verification_status, verification_notes";

/// Persistence collaborator for users and their role association rows.
///
/// The store enforces email uniqueness as a backstop: a duplicate insert that
/// slips past the pre-check surfaces as `EmailAlreadyRegistered`.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_id(&self, id: i64) -> Result<Option<User>>;
    async fn find_by_email(&self, email: &str) -> Result<Option<User>>;
    async fn exists_by_email(&self, email: &str) -> Result<bool>;
    async fn find_by_oauth_id(&self, oauth_id: &str) -> Result<Option<User>>;
    async fn list(&self) -> Result<Vec<User>>;

    /// Insert the user plus the automatic renter association.
    /// Both rows commit or neither does.
    async fn create(&self, new_user: NewUser) -> Result<User>;
    async fn update(&self, user: &User) -> Result<User>;
    /// Hard delete; role association rows go with the user.
    async fn delete(&self, id: i64) -> Result<()>;

    async fn is_renter(&self, user_id: i64) -> Result<bool>;
    async fn is_admin(&self, user_id: i64) -> Result<bool>;
    async fn find_owner(&self, user_id: i64) -> Result<Option<VehicleOwner>>;
    async fn insert_owner(
        &self,
        user_id: i64,
        documents: serde_json::Value,
        status: VerificationStatus,
    ) -> Result<VehicleOwner>;
    async fn update_owner(&self, owner: &VehicleOwner) -> Result<VehicleOwner>;
}

fn map_unique_violation(err: sqlx::Error) -> AppError {
    if let sqlx::Error::Database(db_err) = &err {
        // Only the email constraint maps to the business error; an oauth_id
        // collision is not a duplicate registration.
        if db_err.code().as_deref() == Some("23505")
            && db_err.constraint() == Some("users_email_key")
        {
            return AppError::EmailAlreadyRegistered;
        }
    }
    AppError::Database(err.to_string())
}

/// PostgreSQL-backed store.
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_id(&self, id: i64) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn exists_by_email(&self, email: &str) -> Result<bool> {
        let exists: (bool,) =
            sqlx::query_as("SELECT EXISTS (SELECT 1 FROM users WHERE email = $1)")
                .bind(email)
                .fetch_one(&self.db)
                .await?;
        Ok(exists.0)
    }

    async fn find_by_oauth_id(&self, oauth_id: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE oauth_id = $1"
        ))
        .bind(oauth_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn list(&self) -> Result<Vec<User>> {
        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY id"
        ))
        .fetch_all(&self.db)
        .await?;
        Ok(users)
    }

    async fn create(&self, new_user: NewUser) -> Result<User> {
        let mut tx = self.db.begin().await?;

        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users
                (full_name, email, password_hash, contact_number, role,
                 auth_provider, oauth_id, profile_picture, email_verified)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&new_user.full_name)
        .bind(&new_user.email)
        .bind(&new_user.password_hash)
        .bind(&new_user.contact_number)
        .bind(new_user.role)
        .bind(new_user.auth_provider)
        .bind(&new_user.oauth_id)
        .bind(&new_user.profile_picture)
        .bind(new_user.email_verified)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_unique_violation)?;

        // Every new user is a renter by default.
        sqlx::query("INSERT INTO renters (user_id) VALUES ($1)")
            .bind(user.id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(user)
    }

    async fn update(&self, user: &User) -> Result<User> {
        let updated = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users SET
                full_name = $2, email = $3, password_hash = $4, contact_number = $5,
                role = $6, auth_provider = $7, oauth_id = $8, profile_picture = $9,
                email_verified = $10, is_active = $11, updated_at = now()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(user.id)
        .bind(&user.full_name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.contact_number)
        .bind(user.role)
        .bind(user.auth_provider)
        .bind(&user.oauth_id)
        .bind(&user.profile_picture)
        .bind(user.email_verified)
        .bind(user.is_active)
        .fetch_one(&self.db)
        .await
        .map_err(map_unique_violation)?;
        Ok(updated)
    }

    async fn delete(&self, id: i64) -> Result<()> {
        // Association rows cascade at the schema level.
        sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    async fn is_renter(&self, user_id: i64) -> Result<bool> {
        let exists: (bool,) =
            sqlx::query_as("SELECT EXISTS (SELECT 1 FROM renters WHERE user_id = $1)")
                .bind(user_id)
                .fetch_one(&self.db)
                .await?;
        Ok(exists.0)
    }

    async fn is_admin(&self, user_id: i64) -> Result<bool> {
        let exists: (bool,) =
            sqlx::query_as("SELECT EXISTS (SELECT 1 FROM admins WHERE user_id = $1)")
                .bind(user_id)
                .fetch_one(&self.db)
                .await?;
        Ok(exists.0)
    }

    async fn find_owner(&self, user_id: i64) -> Result<Option<VehicleOwner>> {
        let owner = sqlx::query_as::<_, VehicleOwner>(&format!(
            "SELECT {OWNER_COLUMNS} FROM vehicle_owners WHERE user_id = $1"
        ))
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(owner)
    }

    async fn insert_owner(
        &self,
        user_id: i64,
        documents: serde_json::Value,
        status: VerificationStatus,
    ) -> Result<VehicleOwner> {
        let owner = sqlx::query_as::<_, VehicleOwner>(&format!(
            r#"
            INSERT INTO vehicle_owners (user_id, verification_documents, verification_status)
            VALUES ($1, $2, $3)
            RETURNING {OWNER_COLUMNS}
            "#
        ))
        .bind(user_id)
        .bind(documents)
        .bind(status)
        .fetch_one(&self.db)
        .await?;
        Ok(owner)
    }

    async fn update_owner(&self, owner: &VehicleOwner) -> Result<VehicleOwner> {
        let updated = sqlx::query_as::<_, VehicleOwner>(&format!(
            r#"
            UPDATE vehicle_owners SET
                verification_documents = $2, verification_status = $3, verification_notes = $4
            WHERE id = $1
            RETURNING {OWNER_COLUMNS}
            "#
        ))
        .bind(owner.id)
        .bind(&owner.verification_documents)
        .bind(owner.verification_status)
        .bind(&owner.verification_notes)
        .fetch_one(&self.db)
        .await?;
        Ok(updated)
    }
}

/// In-memory store used by `AppState::fake()` and unit tests. Mirrors the
/// uniqueness and cascade behaviour of the SQL schema.
#[derive(Default)]
pub struct MemoryUserStore {
    inner: Mutex<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    next_user_id: i64,
    next_owner_id: i64,
    users: Vec<User>,
    renters: HashSet<i64>,
    admins: HashSet<i64>,
    owners: Vec<VehicleOwner>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admin rows are provisioned out-of-band; this is that band.
    pub fn grant_admin(&self, user_id: i64) {
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        inner.admins.insert(user_id);
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_id(&self, id: i64) -> Result<Option<User>> {
        let inner = self.inner.lock().expect("store mutex poisoned");
        Ok(inner.users.iter().find(|u| u.id == id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let inner = self.inner.lock().expect("store mutex poisoned");
        Ok(inner.users.iter().find(|u| u.email == email).cloned())
    }

    async fn exists_by_email(&self, email: &str) -> Result<bool> {
        let inner = self.inner.lock().expect("store mutex poisoned");
        Ok(inner.users.iter().any(|u| u.email == email))
    }

    async fn find_by_oauth_id(&self, oauth_id: &str) -> Result<Option<User>> {
        let inner = self.inner.lock().expect("store mutex poisoned");
        Ok(inner
            .users
            .iter()
            .find(|u| u.oauth_id.as_deref() == Some(oauth_id))
            .cloned())
    }

    async fn list(&self) -> Result<Vec<User>> {
        let inner = self.inner.lock().expect("store mutex poisoned");
        Ok(inner.users.clone())
    }

    async fn create(&self, new_user: NewUser) -> Result<User> {
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        if inner.users.iter().any(|u| u.email == new_user.email) {
            return Err(AppError::EmailAlreadyRegistered);
        }
        if let Some(oauth_id) = &new_user.oauth_id {
            if inner
                .users
                .iter()
                .any(|u| u.oauth_id.as_deref() == Some(oauth_id))
            {
                return Err(AppError::Database("duplicate oauth_id".into()));
            }
        }
        inner.next_user_id += 1;
        let now = OffsetDateTime::now_utc();
        let user = User {
            id: inner.next_user_id,
            full_name: new_user.full_name,
            email: new_user.email,
            password_hash: new_user.password_hash,
            contact_number: new_user.contact_number,
            role: new_user.role,
            auth_provider: new_user.auth_provider,
            oauth_id: new_user.oauth_id,
            profile_picture: new_user.profile_picture,
            email_verified: new_user.email_verified,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        let id = user.id;
        inner.users.push(user.clone());
        inner.renters.insert(id);
        Ok(user)
    }

    async fn update(&self, user: &User) -> Result<User> {
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        if inner
            .users
            .iter()
            .any(|u| u.id != user.id && u.email == user.email)
        {
            return Err(AppError::EmailAlreadyRegistered);
        }
        let slot = inner
            .users
            .iter_mut()
            .find(|u| u.id == user.id)
            .ok_or(AppError::UserNotFound(user.id))?;
        let mut updated = user.clone();
        updated.updated_at = OffsetDateTime::now_utc();
        *slot = updated.clone();
        Ok(updated)
    }

    async fn delete(&self, id: i64) -> Result<()> {
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        inner.users.retain(|u| u.id != id);
        inner.renters.remove(&id);
        inner.admins.remove(&id);
        inner.owners.retain(|o| o.user_id != id);
        Ok(())
    }

    async fn is_renter(&self, user_id: i64) -> Result<bool> {
        let inner = self.inner.lock().expect("store mutex poisoned");
        Ok(inner.renters.contains(&user_id))
    }

    async fn is_admin(&self, user_id: i64) -> Result<bool> {
        let inner = self.inner.lock().expect("store mutex poisoned");
        Ok(inner.admins.contains(&user_id))
    }

    async fn find_owner(&self, user_id: i64) -> Result<Option<VehicleOwner>> {
        let inner = self.inner.lock().expect("store mutex poisoned");
        Ok(inner.owners.iter().find(|o| o.user_id == user_id).cloned())
    }

    async fn insert_owner(
        &self,
        user_id: i64,
        documents: serde_json::Value,
        status: VerificationStatus,
    ) -> Result<VehicleOwner> {
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        inner.next_owner_id += 1;
        let owner = VehicleOwner {
            id: inner.next_owner_id,
            user_id,
            verification_documents: Some(documents),
            verification_status: status,
            verification_notes: None,
        };
        inner.owners.push(owner.clone());
        Ok(owner)
    }

    async fn update_owner(&self, owner: &VehicleOwner) -> Result<VehicleOwner> {
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        let slot = inner
            .owners
            .iter_mut()
            .find(|o| o.id == owner.id)
            .ok_or_else(|| AppError::Validation("unknown vehicle owner record".into()))?;
        *slot = owner.clone();
        Ok(owner.clone())
    }
}
