use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::{Value, json};
use utoipa::ToSchema;

use crate::models::UnknownVariant;

pub type DieselError = diesel::result::Error;

/// Envelope shared by every successful and failed response.
#[derive(Serialize, ToSchema, Debug)]
pub struct StdResponse<T, M> {
    pub data: Option<T>,
    pub message: Option<M>,
}

impl<T: Serialize, M: Serialize> IntoResponse for StdResponse<T, M> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Malformed or out-of-range input.
    #[error("{0}")]
    BadRequest(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error(
        "Not enough stock for product #{product_id}: requested {requested}, only {available} available"
    )]
    StockExceeded {
        product_id: i32,
        available: i32,
        requested: i32,
    },

    /// Overlap, operating hours, past time or lead-time ceiling.
    #[error("{reason}")]
    ScheduleConflict {
        reason: String,
        boundary: Option<String>,
    },

    #[error("Missing or invalid credentials")]
    Unauthorized,

    #[error("{0}")]
    ForbiddenResource(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::StockExceeded { .. } => StatusCode::CONFLICT,
            AppError::ScheduleConflict { .. } => StatusCode::CONFLICT,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::ForbiddenResource(_) => StatusCode::FORBIDDEN,
            AppError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn details(&self) -> Option<Value> {
        match self {
            AppError::StockExceeded {
                product_id,
                available,
                requested,
            } => Some(json!({
                "product_id": product_id,
                "available": available,
                "requested": requested,
            })),
            AppError::ScheduleConflict {
                boundary: Some(boundary),
                ..
            } => Some(json!({ "boundary": boundary })),
            _ => None,
        }
    }
}

impl From<DieselError> for AppError {
    fn from(err: DieselError) -> Self {
        match err {
            DieselError::NotFound => AppError::NotFound("Record".into()),
            _ => AppError::Other(err.into()),
        }
    }
}

impl From<UnknownVariant> for AppError {
    fn from(err: UnknownVariant) -> Self {
        AppError::BadRequest(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            AppError::Other(err) => {
                tracing::error!("Unexpected error: {:?}", err);
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        let body = StdResponse {
            data: self.details(),
            message: Some(message),
        };

        (status, body).into_response()
    }
}
