pub mod dto;
pub mod extractors;
pub mod handlers;
pub mod jwt;
pub mod oauth;
pub mod password;
pub mod roles;
pub mod services;

use axum::routing::post;
use axum::Router;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(handlers::register))
        .route("/auth/login", post(handlers::login))
        .route("/auth/google", post(handlers::google_login))
}
