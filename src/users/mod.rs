pub mod dto;
pub mod handlers;
pub mod repo;
pub mod repo_types;
pub mod services;

use axum::routing::{delete, get, post};
use axum::Router;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users", get(handlers::list_users))
        .route("/users/me", get(handlers::me))
        .route("/users/me/roles", get(handlers::my_roles))
        .route(
            "/users/me/owner-verification",
            post(handlers::submit_owner_verification),
        )
        .route(
            "/users/:id",
            get(handlers::get_user)
                .put(handlers::update_user)
                .delete(handlers::deactivate_user),
        )
        .route("/users/:id/password", post(handlers::change_password))
        .route("/users/:id/reactivate", post(handlers::reactivate_user))
        .route(
            "/users/:id/permanent",
            delete(handlers::delete_user_permanently),
        )
        .route(
            "/users/:id/owner-verification/review",
            post(handlers::review_owner_verification),
        )
}
