use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tracing::{info, instrument};

use crate::{
    auth::{
        dto::{LoginRequest, LoginResponse, PublicUser},
        extractors::{AuthUser, ClientIdentity},
    },
    error::{AppError, AppJson, AppResult, FieldError},
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/auth/me", get(get_me))
}

fn validate_login(payload: &LoginRequest) -> AppResult<()> {
    let mut errors = Vec::new();
    if payload.username.trim().chars().count() < 3 {
        errors.push(FieldError::new("username", "must contain at least 3 characters"));
    }
    if payload.password.chars().count() < 6 {
        errors.push(FieldError::new("password", "must contain at least 6 characters"));
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(AppError::Validation(errors))
    }
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    ClientIdentity(client): ClientIdentity,
    AppJson(payload): AppJson<LoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    validate_login(&payload)?;
    let (token, user) = state
        .auth
        .login(&client, payload.username.trim(), &payload.password)
        .await?;
    Ok(Json(LoginResponse {
        success: true,
        token,
        user,
    }))
}

/// Tokens are stateless; logging out only means the client drops its token.
#[instrument(skip_all)]
pub async fn logout(AuthUser(claims): AuthUser) -> Json<Value> {
    info!(username = %claims.username, "logout");
    Json(json!({ "success": true, "message": "logged out" }))
}

#[instrument(skip_all)]
pub async fn get_me(AuthUser(claims): AuthUser) -> Json<PublicUser> {
    Json(PublicUser {
        id: claims.sub,
        username: claims.username,
        role: claims.role,
    })
}
