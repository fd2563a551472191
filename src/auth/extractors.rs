use axum::async_trait;
use axum::extract::{FromRef, FromRequestParts};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;

use crate::auth::jwt::JwtKeys;
use crate::auth::roles::{build_principal, Principal};
use crate::error::AppError;
use crate::state::AppState;

/// Extracts the authenticated [`Principal`] from the `Authorization: Bearer`
/// header, resolving roles from the association tables on every request.
#[async_trait]
impl FromRequestParts<AppState> for Principal {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or(AppError::TokenInvalid)?;
        let token = header
            .strip_prefix("Bearer ")
            .ok_or(AppError::TokenInvalid)?;

        let keys = JwtKeys::from_ref(state);
        let subject = keys.subject_of(token)?;

        // A token can outlive its account.
        let user = state
            .store
            .find_by_email(&subject)
            .await?
            .ok_or(AppError::TokenInvalid)?;
        if !user.is_active {
            return Err(AppError::Forbidden);
        }

        build_principal(state.store.as_ref(), &user).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::repo_types::{AuthProvider, NewUser, UserRole};
    use axum::http::Request;

    async fn seed_user(state: &AppState, email: &str) -> i64 {
        state
            .store
            .create(NewUser {
                full_name: "Test User".into(),
                email: email.into(),
                password_hash: None,
                contact_number: String::new(),
                role: UserRole::Renter,
                auth_provider: AuthProvider::Local,
                oauth_id: None,
                profile_picture: None,
                email_verified: false,
            })
            .await
            .expect("seed user")
            .id
    }

    fn parts_with_auth(value: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri("/users/me");
        if let Some(value) = value {
            builder = builder.header(AUTHORIZATION, value);
        }
        builder.body(()).expect("request").into_parts().0
    }

    #[tokio::test]
    async fn bearer_token_resolves_principal() {
        let state = AppState::fake();
        let id = seed_user(&state, "a@x.com").await;
        let token = JwtKeys::from_ref(&state).sign_subject("a@x.com").unwrap();

        let mut parts = parts_with_auth(Some(&format!("Bearer {token}")));
        let principal = Principal::from_request_parts(&mut parts, &state)
            .await
            .expect("principal");
        assert_eq!(principal.id, id);
        assert_eq!(principal.email, "a@x.com");
        assert!(principal.roles.contains(&UserRole::Renter));
    }

    #[tokio::test]
    async fn missing_and_malformed_headers_are_rejected() {
        let state = AppState::fake();
        seed_user(&state, "a@x.com").await;

        let mut parts = parts_with_auth(None);
        let err = Principal::from_request_parts(&mut parts, &state)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::TokenInvalid));

        let mut parts = parts_with_auth(Some("Basic abc"));
        let err = Principal::from_request_parts(&mut parts, &state)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::TokenInvalid));
    }

    #[tokio::test]
    async fn token_for_deleted_user_is_rejected() {
        let state = AppState::fake();
        let token = JwtKeys::from_ref(&state).sign_subject("ghost@x.com").unwrap();

        let mut parts = parts_with_auth(Some(&format!("Bearer {token}")));
        let err = Principal::from_request_parts(&mut parts, &state)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::TokenInvalid));
    }

    #[tokio::test]
    async fn deactivated_user_is_forbidden() {
        let state = AppState::fake();
        let id = seed_user(&state, "a@x.com").await;
        let mut user = state.store.find_by_id(id).await.unwrap().unwrap();
        user.is_active = false;
        state.store.update(&user).await.unwrap();

        let token = JwtKeys::from_ref(&state).sign_subject("a@x.com").unwrap();
        let mut parts = parts_with_auth(Some(&format!("Bearer {token}")));
        let err = Principal::from_request_parts(&mut parts, &state)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden));
    }
}
