//! Role resolution and capability checks.
//!
//! Authorization is decided by explicit capability checks at each entry
//! point, over a `Principal` built once per request. The role set is the
//! union of the user's primary role and the association-table rows.

use std::collections::BTreeSet;

use crate::error::Result;
use crate::users::repo::UserStore;
use crate::users::repo_types::{User, UserRole, VerificationStatus};

/// The authenticated identity attached to a request.
#[derive(Debug, Clone)]
pub struct Principal {
    pub id: i64,
    pub email: String,
    pub roles: BTreeSet<UserRole>,
    /// True only for vehicle owners whose verification is APPROVED.
    pub verified_owner: bool,
}

/// What an entry point requires of the principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Admin,
    Renter,
    VehicleOwner,
    VerifiedOwner,
    /// The user themselves, or an admin.
    SelfOrAdmin(i64),
    /// The user themselves only (admins excluded).
    SelfOnly(i64),
}

/// Pure capability check; no ambient state.
pub fn authorize(principal: &Principal, capability: Capability) -> bool {
    match capability {
        Capability::Admin => principal.roles.contains(&UserRole::Admin),
        Capability::Renter => principal.roles.contains(&UserRole::Renter),
        Capability::VehicleOwner => principal.roles.contains(&UserRole::VehicleOwner),
        Capability::VerifiedOwner => principal.verified_owner,
        Capability::SelfOrAdmin(user_id) => {
            principal.id == user_id || principal.roles.contains(&UserRole::Admin)
        }
        Capability::SelfOnly(user_id) => principal.id == user_id,
    }
}

/// Build the request principal for a user: role set plus owner verification
/// state. Pure read, idempotent.
pub async fn build_principal(store: &dyn UserStore, user: &User) -> Result<Principal> {
    let owner = store.find_owner(user.id).await?;

    let mut roles = BTreeSet::new();
    roles.insert(user.role);
    if store.is_renter(user.id).await? {
        roles.insert(UserRole::Renter);
    }
    if owner.is_some() {
        roles.insert(UserRole::VehicleOwner);
    }
    if store.is_admin(user.id).await? {
        roles.insert(UserRole::Admin);
    }

    let verified_owner = owner
        .map(|o| o.verification_status == VerificationStatus::Approved)
        .unwrap_or(false);

    Ok(Principal {
        id: user.id,
        email: user.email.clone(),
        roles,
        verified_owner,
    })
}

/// Full role set for a user, as shown on profile reads.
pub async fn resolve_roles(store: &dyn UserStore, user: &User) -> Result<BTreeSet<UserRole>> {
    Ok(build_principal(store, user).await?.roles)
}
