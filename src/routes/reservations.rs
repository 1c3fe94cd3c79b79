use anyhow::{Context, Result};
use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use chrono::Utc;
use utoipa_axum::router::OpenApiRouter;

use crate::{
    infra::{
        app_error::{AppError, StdResponse},
        app_state::AppState,
        auth::{Action, CurrentUser},
        middleware,
    },
    models::{ReservationEntity, ReservationStatus},
    routes::UpdateStatusReq,
    services::reservations,
};

/// Admin reservation back-office.
pub fn routes_with_openapi(state: &AppState) -> OpenApiRouter<AppState> {
    OpenApiRouter::new().nest(
        "/reservations",
        OpenApiRouter::new()
            .routes(utoipa_axum::routes!(get_reservations))
            .routes(utoipa_axum::routes!(update_reservation_status))
            .route_layer(axum::middleware::from_fn_with_state(
                state.clone(),
                middleware::authenticate,
            )),
    )
}

#[utoipa::path(
    get,
    path = "/",
    tags = ["Reservations"],
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "List all reservations", body = StdResponse<Vec<ReservationEntity>, String>)
    )
)]
async fn get_reservations(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    user.authorize(Action::ManageReservations)?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let rows = reservations::list_all(conn).await?;

    Ok(StdResponse {
        data: Some(rows),
        message: Some("Get reservations successfully"),
    })
}

/// Confirm or cancel a reservation. Confirming occupies its table;
/// cancelling frees it unless another confirmed booking holds it now.
#[utoipa::path(
    patch,
    path = "/{id}/status",
    tags = ["Reservations"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Reservation ID to update")
    ),
    request_body = UpdateStatusReq,
    responses(
        (status = 200, description = "Reservation status updated", body = StdResponse<ReservationEntity, String>),
        (status = 400, description = "Unknown status"),
        (status = 404, description = "Reservation not found"),
        (status = 409, description = "Re-opening would overlap another reservation")
    )
)]
async fn update_reservation_status(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(payload): Json<UpdateStatusReq>,
) -> Result<impl IntoResponse, AppError> {
    user.authorize(Action::ManageReservations)?;
    let next: ReservationStatus = payload.status.parse()?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let reservation = reservations::update_status(conn, id, next, Utc::now()).await?;

    Ok(StdResponse {
        data: Some(reservation),
        message: Some("Reservation status updated successfully"),
    })
}
