//! Request-boundary error taxonomy.
//!
//! Every handler returns `Result<_, AppError>`. Storage failures carry their
//! cause for the server log only; the client sees an opaque message.

use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequest, Request},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::backup::BackupError;
use crate::repairs::store::StoreError;

/// A single failed input constraint.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("invalid input")]
    Validation(Vec<FieldError>),

    #[error("invalid credentials or token")]
    Unauthorized,

    #[error("insufficient permissions")]
    Forbidden,

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("{0}")]
    Conflict(String),

    #[error("too many attempts, retry later")]
    TooManyAttempts,

    #[error("storage failure: {0}")]
    Storage(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation(vec![FieldError::new(field, message)])
    }

    pub fn repair_not_found(id: &str) -> Self {
        Self::NotFound {
            entity: "repair",
            id: id.to_string(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::NotFound { .. } => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::TooManyAttempts => StatusCode::TOO_MANY_REQUESTS,
            AppError::Storage(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Backup(b) => AppError::from(b),
            other => AppError::Storage(other.to_string()),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::validation("body", rejection.body_text())
    }
}

/// `Json` whose rejections use the `AppError` envelope instead of axum's
/// plain-text reply.
#[derive(Debug, Clone, Copy, Default)]
pub struct AppJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for AppJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(Self(value))
    }
}

impl From<BackupError> for AppError {
    fn from(e: BackupError) -> Self {
        match e {
            BackupError::NotFound(name) => AppError::NotFound {
                entity: "backup",
                id: name,
            },
            BackupError::InvalidName(name) => {
                AppError::validation("filename", format!("invalid backup name: {name}"))
            }
            other => AppError::Storage(other.to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Vec<FieldError>>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (error, details) = match self {
            AppError::Validation(details) => ("invalid input".to_string(), Some(details)),
            AppError::Storage(cause) => {
                tracing::error!(error = %cause, "storage failure");
                ("internal server error".to_string(), None)
            }
            AppError::Internal(cause) => {
                tracing::error!(error = %cause, "internal failure");
                ("internal server error".to_string(), None)
            }
            other => (other.to_string(), None),
        };
        (
            status,
            Json(ErrorBody {
                success: false,
                error,
                details,
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_taxonomy_to_status_codes() {
        assert_eq!(AppError::validation("email", "bad").status(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::Forbidden.status(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::repair_not_found("x").status(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::Conflict("no".into()).status(), StatusCode::CONFLICT);
        assert_eq!(AppError::TooManyAttempts.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            AppError::Storage("disk".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn missing_backup_surfaces_as_not_found() {
        let err = AppError::from(StoreError::Backup(BackupError::NotFound("x.json".into())));
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn storage_error_body_hides_cause() {
        let response = AppError::Storage("/secret/path/repairs.json: denied".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(!text.contains("/secret/path"));
        assert!(text.contains("internal server error"));
    }

    #[tokio::test]
    async fn validation_error_lists_fields() {
        let response = AppError::Validation(vec![
            FieldError::new("email", "invalid email"),
            FieldError::new("price", "out of range"),
        ])
        .into_response();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["details"][1]["field"], "price");
    }

    #[derive(Debug, serde::Deserialize)]
    struct StatusBody {
        #[allow(dead_code)]
        status: String,
    }

    #[tokio::test]
    async fn json_body_missing_field_is_validation() {
        let req = axum::http::Request::builder()
            .method("PUT")
            .header("content-type", "application/json")
            .body(axum::body::Body::from(r#"{"finalComment":"x"}"#))
            .unwrap();
        let err = AppJson::<StatusBody>::from_request(req, &()).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        match err {
            AppError::Validation(details) => {
                assert_eq!(details[0].field, "body");
                assert!(details[0].message.contains("status"));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn json_body_without_content_type_is_validation() {
        let req = axum::http::Request::builder()
            .method("POST")
            .body(axum::body::Body::from(r#"{"status":"en_cours"}"#))
            .unwrap();
        let err = AppJson::<StatusBody>::from_request(req, &()).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}
