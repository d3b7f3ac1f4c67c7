use crate::state::AppState;
use axum::Router;

pub mod dto;
pub mod handlers;
pub mod model;
pub mod services;
pub mod store;
pub mod validation;

pub use model::{Repair, RepairStatus, StoredRepair};
pub use store::{SecureStore, StoreError, WriteReport};

pub fn router() -> Router<AppState> {
    Router::new().merge(handlers::repair_routes())
}
