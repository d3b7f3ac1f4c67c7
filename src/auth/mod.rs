use crate::state::AppState;
use axum::Router;

pub mod claims;
pub mod dto;
pub mod extractors;
pub mod handlers;
pub mod jwt;
pub mod password;
pub mod services;
pub mod throttle;

pub use services::{require_role, AuthGate};

pub fn router() -> Router<AppState> {
    Router::new().merge(handlers::auth_routes())
}
