use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::Serialize;
use tracing::instrument;

use crate::{
    auth::extractors::AuthUser,
    error::{AppError, AppJson, AppResult},
    repairs::{
        dto::{
            ApiResponse, CreateRepairRequest, InvoiceResponse, ListQuery, StatusChangeResponse,
            UpdateStatusRequest,
        },
        model::{Repair, RepairStatus},
        services::{self, RepairFilter},
        validation::{validate_comment, validate_new_repair},
    },
    state::AppState,
};

pub fn repair_routes() -> Router<AppState> {
    Router::new()
        .route("/repairs", get(list_repairs).post(create_repair))
        .route("/repairs/:id/status", put(update_status))
        .route("/repairs/:id", delete(delete_repair))
        .route("/repairs/:id/invoice", post(send_invoice))
}

fn parse_status(field: &'static str, raw: &str) -> AppResult<RepairStatus> {
    raw.trim()
        .parse::<RepairStatus>()
        .map_err(|msg| AppError::validation(field, msg))
}

#[derive(Debug, Serialize)]
pub struct DeletedRepair {
    pub id: String,
}

#[instrument(skip_all)]
pub async fn list_repairs(
    State(state): State<AppState>,
    AuthUser(_claims): AuthUser,
    Query(query): Query<ListQuery>,
) -> AppResult<Json<ApiResponse<Vec<Repair>>>> {
    let status = match query.status.as_deref().filter(|s| !s.trim().is_empty()) {
        Some(raw) => Some(parse_status("status", raw)?),
        None => None,
    };
    let filter = RepairFilter {
        status,
        email: query.email.filter(|s| !s.trim().is_empty()),
        phone: query.phone.filter(|s| !s.trim().is_empty()),
    };
    let repairs = services::list_repairs(&state.store, &filter).await?;
    Ok(Json(ApiResponse::ok(repairs)))
}

#[instrument(skip_all)]
pub async fn create_repair(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    AppJson(payload): AppJson<CreateRepairRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<Repair>>)> {
    let input = validate_new_repair(payload)?;
    let (repair, report) = services::create_repair(&state.store, input, &claims.username).await?;
    Ok((
        StatusCode::CREATED,
        Json(
            ApiResponse::ok(repair)
                .with_message("repair created")
                .with_backup_warning(report.backup_warning),
        ),
    ))
}

#[instrument(skip_all, fields(repair_id = %id))]
pub async fn update_status(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Path(id): Path<String>,
    AppJson(payload): AppJson<UpdateStatusRequest>,
) -> AppResult<Json<StatusChangeResponse>> {
    let status = parse_status("status", &payload.status)?;
    let final_comment = validate_comment(payload.final_comment)?;
    let change = services::change_status(
        &state.store,
        state.notifier.as_ref(),
        &id,
        status,
        final_comment,
        &claims.username,
    )
    .await?;
    Ok(Json(StatusChangeResponse::new(
        change.repair,
        change.notification,
    )))
}

#[instrument(skip_all, fields(repair_id = %id))]
pub async fn delete_repair(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Path(id): Path<String>,
) -> AppResult<Json<ApiResponse<DeletedRepair>>> {
    let report = services::delete_repair(&state.store, &id, &claims.username).await?;
    Ok(Json(
        ApiResponse::ok(DeletedRepair { id })
            .with_message("repair deleted")
            .with_backup_warning(report.backup_warning),
    ))
}

#[instrument(skip_all, fields(repair_id = %id))]
pub async fn send_invoice(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Path(id): Path<String>,
) -> AppResult<Json<InvoiceResponse>> {
    let invoiced = services::issue_invoice(
        &state.store,
        state.notifier.as_ref(),
        &id,
        &claims.username,
    )
    .await?;
    Ok(Json(InvoiceResponse::new(
        invoiced.invoice_number,
        invoiced.repair,
        invoiced.notification,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parsing_is_field_scoped() {
        assert_eq!(parse_status("status", " done ").unwrap(), RepairStatus::Done);
        let Err(AppError::Validation(errors)) = parse_status("status", "finished") else {
            panic!("expected validation error");
        };
        assert_eq!(errors[0].field, "status");
    }
}
