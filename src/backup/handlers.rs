use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tracing::{info, instrument};

use crate::{
    auth::extractors::AdminUser,
    backup::BackupInfo,
    error::AppResult,
    repairs::dto::ApiResponse,
    state::AppState,
};

pub fn backup_routes() -> Router<AppState> {
    Router::new()
        .route("/backups", get(list_backups))
        .route("/backups/create", post(create_backup))
        .route("/backups/:filename/restore", post(restore_backup))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedBackup {
    pub filename: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoredBackup {
    pub filename: String,
    pub record_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_state_backup: Option<String>,
}

#[instrument(skip_all)]
pub async fn list_backups(
    State(state): State<AppState>,
    AdminUser(_claims): AdminUser,
) -> AppResult<Json<ApiResponse<Vec<BackupInfo>>>> {
    let backups = state.store.list_backups()?;
    Ok(Json(ApiResponse::ok(backups)))
}

#[instrument(skip_all)]
pub async fn create_backup(
    State(state): State<AppState>,
    AdminUser(claims): AdminUser,
) -> AppResult<Json<ApiResponse<CreatedBackup>>> {
    let path = state
        .store
        .snapshot(&format!("manual_{}", claims.username))
        .await?;
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    info!(%filename, user = %claims.username, "manual backup created");
    Ok(Json(
        ApiResponse::ok(CreatedBackup { filename }).with_message("backup created"),
    ))
}

#[instrument(skip_all, fields(filename = %filename))]
pub async fn restore_backup(
    State(state): State<AppState>,
    AdminUser(claims): AdminUser,
    Path(filename): Path<String>,
) -> AppResult<Json<ApiResponse<RestoredBackup>>> {
    let (record_count, report) = state.store.restore_from_backup(&filename).await?;
    info!(%filename, record_count, user = %claims.username, "backup restored by admin");
    Ok(Json(
        ApiResponse::ok(RestoredBackup {
            filename,
            record_count,
            previous_state_backup: report.backup,
        })
        .with_message("backup restored")
        .with_backup_warning(report.backup_warning),
    ))
}
